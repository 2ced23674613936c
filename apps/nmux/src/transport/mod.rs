//! Duplex message transport to the host.
//!
//! A [`Dialer`] opens one link per connection attempt. Links report their
//! lifecycle asynchronously as [`TransportEvent`]s tagged with the
//! generation they were dialed under, so the connection manager can drop
//! events from links it has already abandoned.

pub mod connection;
pub mod websocket;

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState, MAX_RETRY_ATTEMPTS, retry_delay};

pub type Generation = u64;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),
    #[error("transport channel closed")]
    ChannelClosed,
    #[error("transport not open")]
    NotOpen,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEventKind {
    Open,
    Message(Vec<u8>),
    /// `clean` is true when the closing handshake completed.
    Closed { clean: bool },
    Error(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: Generation,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn new(generation: Generation, kind: TransportEventKind) -> Self {
        Self { generation, kind }
    }
}

pub trait Link {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Starts a clean close. Completion is reported as a `Closed` event.
    fn close(&mut self);
}

pub trait Dialer {
    type Link: Link;

    /// Starts connecting. The outcome arrives later as an `Open` or an
    /// unclean `Closed` event for `generation`.
    fn dial(&mut self, generation: Generation) -> Self::Link;
}
