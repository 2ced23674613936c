use clap::{Args, Parser, builder::BoolishValueParser};
use std::path::PathBuf;

use crate::config::{Config, DEFAULT_PATH, DEFAULT_SERVER};
use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "nmux",
    about = "Attach to an nmux editor session from the terminal (Ctrl-] quits)",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "NMUX_SERVER",
        default_value = DEFAULT_SERVER,
        value_name = "HOST:PORT",
        help = "Address of the nmux server"
    )]
    pub server: String,

    #[arg(
        long,
        default_value = DEFAULT_PATH,
        help = "Websocket endpoint path on the server"
    )]
    pub path: String,

    #[arg(
        long,
        env = "NMUX_DEBUG",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new(),
        value_name = "BOOL",
        help = "Hexdump every inbound message at trace level"
    )]
    pub debug: Option<bool>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Record inbound and outbound traffic as JSON lines"
    )]
    pub record: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "NMUX_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "NMUX_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

impl Cli {
    pub fn to_config(&self) -> Config {
        Config {
            path: self.path.clone(),
            debug: self.debug.unwrap_or(false),
            record: self.record.clone(),
            ..Config::default()
        }
        .with_server(Some(self.server.clone()))
    }
}
