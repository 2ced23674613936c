pub mod controller;
pub mod input;
pub mod view;

use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, info};

use crate::config::Config;
use crate::debug_recorder::DebugRecorder;
use crate::screen::CellSurface;
use crate::transport::websocket::{WebSocketDialer, shared_runtime};
use crate::transport::{Dialer, TransportError, TransportEvent};

pub use controller::{ClientController, ControllerOptions, ControllerStatus};
pub use input::{MouseTracker, ResolvedMouse, resolve_key};
pub use view::TerminalView;

/// One display frame.
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("terminal error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot open recording: {0}")]
    Recorder(String),
}

/// Ctrl-] leaves the client. Every other key goes to the host.
fn is_quit(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char(']') && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Runs the interactive client until the user quits or reconnection is
/// abandoned.
pub fn run_terminal(config: &Config) -> Result<ControllerStatus, ClientError> {
    let url = config
        .socket_url()
        .map_err(|err| ClientError::Config(format!("{}: {err}", config.server)))?;
    let mut recorder = config
        .record
        .as_ref()
        .map(DebugRecorder::new)
        .transpose()
        .map_err(|err| ClientError::Recorder(err.to_string()))?;
    if let Some(recorder) = recorder.as_mut() {
        recorder
            .record_comment(&format!("session {url}"))
            .map_err(|err| ClientError::Recorder(err.to_string()))?;
    }

    let (events_tx, events_rx) = mpsc::channel();
    let dialer = WebSocketDialer::new(url.clone(), events_tx, shared_runtime()?);
    let mut controller = ClientController::new(
        dialer,
        CellSurface::new(),
        ControllerOptions {
            debug: config.debug,
            recorder,
        },
    );

    let mut view = TerminalView::enter()?;
    info!(target = "client::loop", %url, "client loop started");
    let result = drive(&mut controller, &mut view, &events_rx);
    controller.shutdown();
    let teardown = view.leave();
    debug!(target = "client::loop", "client loop stopped");

    match (result, teardown) {
        (Err(err), _) => Err(err),
        (Ok(_), Err(err)) => Err(err),
        (Ok(status), Ok(())) => Ok(status),
    }
}

fn drive<D: Dialer>(
    controller: &mut ClientController<D, CellSurface>,
    view: &mut TerminalView,
    events: &Receiver<TransportEvent>,
) -> Result<ControllerStatus, ClientError> {
    let now = Instant::now();
    let (cols, rows) = view.size()?;
    controller.on_local_resize(cols, rows, now);
    controller.start(now);
    let mut mouse = MouseTracker::new();

    loop {
        let frame_deadline = Instant::now() + FRAME_INTERVAL;

        while event::poll(Duration::ZERO)? {
            match event::read()? {
                Event::Key(key) if is_quit(&key) => return Ok(controller.status()),
                Event::Key(key) => {
                    if let Some(name) = resolve_key(&key) {
                        controller.on_key(&name);
                    }
                }
                Event::Mouse(event) => {
                    if let Some(resolved) = mouse.resolve(&event) {
                        controller.on_pointer(resolved.activity);
                        controller.on_key(&resolved.key);
                    }
                }
                Event::Resize(cols, rows) => controller.on_local_resize(cols, rows, Instant::now()),
                _ => {}
            }
        }

        loop {
            let now = Instant::now();
            if now >= frame_deadline {
                break;
            }
            match events.recv_timeout(frame_deadline - now) {
                Ok(event) => {
                    controller.on_transport_event(event, Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::ChannelClosed.into()),
            }
        }

        let status = controller.on_frame(Instant::now());
        view.render(controller.screen().surface())?;
        if let ControllerStatus::GaveUp { .. } = status {
            return Ok(status);
        }
    }
}
