pub mod cli;
pub mod client;
pub mod config;
pub mod debug_recorder;
pub mod protocol;
pub mod screen;
pub mod telemetry;
pub mod timer;
pub mod transport;
