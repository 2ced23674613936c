use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::debug_recorder::DebugRecorder;
use crate::protocol::{ClientFrame, MessageDecoder, MessageOutcome, Operation, encode_client_frame};
use crate::screen::{PointerActivity, ScreenModel, Surface};
use crate::telemetry::{self, PerfGuard, logging::hexdump};
use crate::transport::{ConnectionEvent, ConnectionManager, Dialer, TransportEvent};

/// Quiet period before a local resize is reported to the host.
pub const RESIZE_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerStatus {
    Running,
    Closed,
    GaveUp { attempts: u32 },
}

#[derive(Default)]
pub struct ControllerOptions {
    /// Hexdump each inbound payload at trace level.
    pub debug: bool,
    pub recorder: Option<DebugRecorder>,
}

/// Wires the connection, the decoder and the screen model together.
/// Everything runs on the caller's thread, one event at a time.
pub struct ClientController<D: Dialer, S: Surface> {
    connection: ConnectionManager<D>,
    decoder: MessageDecoder,
    screen: ScreenModel<S>,
    options: ControllerOptions,
    started: Instant,
    local_size: Option<(u16, u16)>,
    resize_due: Option<Instant>,
    status: ControllerStatus,
}

impl<D: Dialer, S: Surface> ClientController<D, S> {
    pub fn new(dialer: D, surface: S, options: ControllerOptions) -> Self {
        Self {
            connection: ConnectionManager::new(dialer),
            decoder: MessageDecoder::new(),
            screen: ScreenModel::new(surface),
            options,
            started: Instant::now(),
            local_size: None,
            resize_due: None,
            status: ControllerStatus::Running,
        }
    }

    pub fn screen(&self) -> &ScreenModel<S> {
        &self.screen
    }

    pub fn screen_mut(&mut self) -> &mut ScreenModel<S> {
        &mut self.screen
    }

    pub fn connection(&self) -> &ConnectionManager<D> {
        &self.connection
    }

    pub fn status(&self) -> ControllerStatus {
        self.status
    }

    /// Opens the first connection. Frame times are measured from here.
    pub fn start(&mut self, now: Instant) -> bool {
        self.started = now;
        self.connection.connect()
    }

    pub fn shutdown(&mut self) {
        self.connection.close();
    }

    fn frame_ms(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.started).as_millis() as u64
    }

    pub fn on_transport_event(&mut self, event: TransportEvent, now: Instant) -> ControllerStatus {
        for event in self.connection.handle_event(event, now) {
            self.on_connection_event(event);
        }
        self.status
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Open { reconnected } => {
                self.decoder.connection_opened();
                self.record_connection(if reconnected { "reconnected" } else { "open" }, None);
                self.status = ControllerStatus::Running;
                self.resize_due = None;
                self.send_resize();
            }
            ConnectionEvent::Message(bytes) => self.handle_message(&bytes),
            ConnectionEvent::Closed => {
                self.record_connection("closed", None);
                self.status = ControllerStatus::Closed;
            }
            ConnectionEvent::Error(message) => {
                self.record_connection("error", Some(message));
            }
            ConnectionEvent::RetryScheduled { attempt, delay } => {
                self.record_connection("retry", Some(format!("attempt {attempt} in {}ms", delay.as_millis())));
            }
            ConnectionEvent::GaveUp { attempts } => {
                self.record_connection("gave_up", Some(format!("{attempts} attempts")));
                self.status = ControllerStatus::GaveUp { attempts };
            }
        }
    }

    fn handle_message(&mut self, bytes: &[u8]) {
        let _guard = PerfGuard::new("client_apply_message");
        telemetry::record_bytes("client_message_bytes", bytes.len());
        if self.options.debug {
            trace!(target = "client::payload", len = bytes.len(), "\n{}", hexdump(bytes));
        }

        let recording = self.options.recorder.is_some();
        let mut applied: Vec<Operation> = Vec::new();
        self.screen.begin_message();
        let screen = &mut self.screen;
        let outcome = self.decoder.decode(bytes, |op| {
            if let Operation::Log { text } = op {
                info!(target = "client::host", "[server log] {text}");
            }
            screen.apply(op);
            if recording {
                applied.push(op.clone());
            }
        });

        let label = match &outcome {
            MessageOutcome::Complete { applied } => {
                trace!(target = "client::decode", ops = applied, "message applied");
                "complete"
            }
            MessageOutcome::Discarded { leading } => {
                debug!(target = "client::decode", leading, "message before handshake resize discarded");
                "discarded"
            }
            MessageOutcome::Aborted { applied, error } => {
                warn!(target = "client::decode", applied, error = %error, "message truncated");
                "aborted"
            }
            MessageOutcome::UnknownOp { applied, tag } => {
                warn!(target = "client::decode", applied, tag, "unknown operation");
                "unknown_op"
            }
        };
        if let Some(recorder) = self.options.recorder.as_mut() {
            if let Err(err) = recorder.record_inbound(bytes.len(), label, &applied) {
                debug!(target = "client::recorder", error = %err, "recording failed");
            }
        }
    }

    /// Per-frame housekeeping: due retries, debounced resizes, and blink.
    pub fn on_frame(&mut self, now: Instant) -> ControllerStatus {
        self.connection.poll(now);
        if let Some(due) = self.resize_due {
            if now >= due {
                self.resize_due = None;
                self.send_resize();
            }
        }
        let frame_ms = self.frame_ms(now);
        self.screen.tick(frame_ms);
        self.status
    }

    /// Forwards a resolved key name. A failed send is taken as a hint that
    /// the link is down and starts a connection attempt.
    pub fn on_key(&mut self, key: &str) {
        if key.is_empty() {
            return;
        }
        let frame = ClientFrame::Keyboard { key: key.to_string() };
        if !self.send_frame(&frame) {
            self.connection.connect();
        }
    }

    pub fn on_local_resize(&mut self, cols: u16, rows: u16, now: Instant) {
        if cols == 0 || rows == 0 {
            return;
        }
        self.local_size = Some((cols, rows));
        self.resize_due = Some(now + RESIZE_DEBOUNCE);
    }

    pub fn on_pointer(&mut self, activity: PointerActivity) {
        self.screen.pointer_event(activity);
    }

    fn send_resize(&mut self) {
        if let Some((cols, rows)) = self.local_size {
            self.send_frame(&ClientFrame::Resize { cols, rows });
        }
    }

    fn send_frame(&mut self, frame: &ClientFrame) -> bool {
        let bytes = encode_client_frame(frame);
        let sent = self.connection.send(&bytes);
        if sent {
            trace!(target = "client::outgoing", ?frame, "frame sent");
            if let Some(recorder) = self.options.recorder.as_mut() {
                if let Err(err) = recorder.record_outbound(frame) {
                    debug!(target = "client::recorder", error = %err, "recording failed");
                }
            }
        }
        sent
    }

    fn record_connection(&mut self, event: &str, detail: Option<String>) {
        match (event, detail.as_deref()) {
            ("gave_up", detail) => error!(target = "client::connection", ?detail, "connection abandoned"),
            (_, Some(detail)) => debug!(target = "client::connection", event, detail, "connection event"),
            (_, None) => debug!(target = "client::connection", event, "connection event"),
        }
        if let Some(recorder) = self.options.recorder.as_mut() {
            if let Err(err) = recorder.record_connection(event, detail) {
                debug!(target = "client::recorder", error = %err, "recording failed");
            }
        }
    }
}
