use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::transport::{Dialer, Generation, Link, TransportEvent, TransportEventKind};

/// Consecutive unclean closes tolerated before giving up for good.
pub const MAX_RETRY_ATTEMPTS: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open { reconnected: bool },
    Message(Vec<u8>),
    /// A clean close. No retry follows.
    Closed,
    Error(String),
    RetryScheduled { attempt: u32, delay: Duration },
    GaveUp { attempts: u32 },
}

/// Backoff before retry number `attempt`: `1000 * log10(attempt)` ms.
pub fn retry_delay(attempt: u32) -> Duration {
    let seconds = f64::from(attempt.max(1)).log10();
    Duration::from_secs_f64(seconds)
}

/// Keeps one link to the host alive, reconnecting after unclean closes with
/// a logarithmic backoff.
pub struct ConnectionManager<D: Dialer> {
    dialer: D,
    link: Option<D::Link>,
    generation: Generation,
    state: ConnectionState,
    retry_attempts: u32,
    retry_at: Option<Instant>,
    gave_up: bool,
    opened_before: bool,
}

impl<D: Dialer> ConnectionManager<D> {
    pub fn new(dialer: D) -> Self {
        Self {
            dialer,
            link: None,
            generation: 0,
            state: ConnectionState::Closed,
            retry_attempts: 0,
            retry_at: None,
            gave_up: false,
            opened_before: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.retry_at
    }

    pub fn has_given_up(&self) -> bool {
        self.gave_up
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Dials unless a link exists, a retry sequence is in progress, or the
    /// manager has given up. Returns whether a dial was started.
    pub fn connect(&mut self) -> bool {
        if self.gave_up
            || self.state != ConnectionState::Closed
            || self.retry_attempts != 0
            || self.retry_at.is_some()
        {
            trace!(
                target = "client::connection",
                state = self.state.as_str(),
                attempts = self.retry_attempts,
                "connect ignored"
            );
            return false;
        }
        self.dial();
        true
    }

    pub fn send(&mut self, bytes: &[u8]) -> bool {
        let link = match (&self.link, self.state) {
            (Some(link), ConnectionState::Open) => link,
            _ => {
                warn!(
                    target = "client::connection",
                    state = self.state.as_str(),
                    "send while not connected"
                );
                return false;
            }
        };
        match link.send(bytes) {
            Ok(()) => true,
            Err(err) => {
                warn!(target = "client::connection", error = %err, "send failed");
                false
            }
        }
    }

    /// Starts a clean close of the current link and cancels any pending
    /// retry. A later `connect()` starts a fresh attempt sequence.
    pub fn close(&mut self) {
        self.retry_at = None;
        self.retry_attempts = 0;
        if let Some(link) = self.link.as_mut() {
            self.state = ConnectionState::Closing;
            link.close();
        }
    }

    /// Fires a scheduled retry once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.retry_at {
            Some(at) if now >= at => {
                self.retry_at = None;
                info!(
                    target = "client::connection",
                    attempt = self.retry_attempts,
                    "reconnecting"
                );
                self.dial();
                true
            }
            _ => false,
        }
    }

    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) -> Vec<ConnectionEvent> {
        if event.generation != self.generation {
            trace!(
                target = "client::connection",
                generation = event.generation,
                current = self.generation,
                "dropping event from stale link"
            );
            return Vec::new();
        }
        match event.kind {
            TransportEventKind::Open => {
                let reconnected = self.opened_before || self.retry_attempts > 0;
                self.state = ConnectionState::Open;
                self.retry_attempts = 0;
                self.retry_at = None;
                self.opened_before = true;
                if reconnected {
                    info!(target = "client::connection", "reconnected");
                } else {
                    info!(target = "client::connection", "connected");
                }
                vec![ConnectionEvent::Open { reconnected }]
            }
            TransportEventKind::Message(bytes) => vec![ConnectionEvent::Message(bytes)],
            TransportEventKind::Error(message) => {
                debug!(target = "client::connection", error = %message, "transport error");
                vec![ConnectionEvent::Error(message)]
            }
            TransportEventKind::Closed { clean } => {
                self.link = None;
                self.state = ConnectionState::Closed;
                if clean {
                    info!(target = "client::connection", "connection closed");
                    return vec![ConnectionEvent::Closed];
                }
                self.schedule_retry(now)
            }
        }
    }

    fn schedule_retry(&mut self, now: Instant) -> Vec<ConnectionEvent> {
        if self.retry_attempts >= MAX_RETRY_ATTEMPTS {
            self.gave_up = true;
            self.retry_at = None;
            error!(
                target = "client::connection",
                attempts = self.retry_attempts,
                "giving up on reconnecting"
            );
            return vec![ConnectionEvent::GaveUp {
                attempts: self.retry_attempts,
            }];
        }
        self.retry_attempts += 1;
        let delay = retry_delay(self.retry_attempts);
        self.retry_at = Some(now + delay);
        warn!(
            target = "client::connection",
            attempt = self.retry_attempts,
            delay_ms = delay.as_millis() as u64,
            "connection lost; retry scheduled"
        );
        vec![ConnectionEvent::RetryScheduled {
            attempt: self.retry_attempts,
            delay,
        }]
    }

    fn dial(&mut self) {
        if let Some(mut stale) = self.link.take() {
            stale.close();
        }
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        debug!(target = "client::connection", generation = self.generation, "dialing");
        self.link = Some(self.dialer.dial(self.generation));
    }
}
