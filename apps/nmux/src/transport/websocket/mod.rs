use std::sync::mpsc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use once_cell::sync::OnceCell;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc as tokio_mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};
use url::Url;

use crate::transport::{Dialer, Generation, Link, TransportError, TransportEvent, TransportEventKind};

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle to the process-wide I/O runtime, built on first use.
pub fn shared_runtime() -> Result<Handle, TransportError> {
    RUNTIME
        .get_or_try_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .thread_name("nmux-io")
                .enable_all()
                .build()
        })
        .map(|runtime| runtime.handle().clone())
        .map_err(|err| TransportError::Setup(err.to_string()))
}

enum Outbound {
    Data(Vec<u8>),
    Close,
}

/// Dials binary websocket links. Link events are delivered on a std channel
/// so a synchronous loop can consume them.
pub struct WebSocketDialer {
    url: Url,
    events: mpsc::Sender<TransportEvent>,
    runtime: Handle,
}

impl WebSocketDialer {
    pub fn new(url: Url, events: mpsc::Sender<TransportEvent>, runtime: Handle) -> Self {
        Self { url, events, runtime }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Dialer for WebSocketDialer {
    type Link = WebSocketLink;

    fn dial(&mut self, generation: Generation) -> WebSocketLink {
        let (outbound_tx, outbound_rx) = tokio_mpsc::unbounded_channel();
        let task = self
            .runtime
            .spawn(run_link(self.url.clone(), generation, outbound_rx, self.events.clone()));
        WebSocketLink {
            outbound: outbound_tx,
            task,
        }
    }
}

pub struct WebSocketLink {
    outbound: tokio_mpsc::UnboundedSender<Outbound>,
    task: tokio::task::JoinHandle<()>,
}

impl Link for WebSocketLink {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.outbound
            .send(Outbound::Data(bytes.to_vec()))
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn close(&mut self) {
        if self.outbound.send(Outbound::Close).is_err() {
            self.task.abort();
        }
    }
}

async fn run_link(
    url: Url,
    generation: Generation,
    mut outbound: tokio_mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
) {
    let emit = |kind: TransportEventKind| events.send(TransportEvent::new(generation, kind)).is_ok();

    let stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(err) => {
            debug!(target = "client::websocket", %url, error = %err, "connect failed");
            emit(TransportEventKind::Error(err.to_string()));
            emit(TransportEventKind::Closed { clean: false });
            return;
        }
    };
    debug!(target = "client::websocket", %url, generation, "websocket open");
    if !emit(TransportEventKind::Open) {
        return;
    }

    let (mut sink, mut source) = stream.split();
    let mut closing = false;
    let clean = loop {
        tokio::select! {
            next = outbound.recv(), if !closing => match next {
                Some(Outbound::Data(bytes)) => {
                    if let Err(err) = sink.send(Message::Binary(bytes)).await {
                        emit(TransportEventKind::Error(err.to_string()));
                        break false;
                    }
                }
                Some(Outbound::Close) | None => {
                    closing = true;
                    if sink.send(Message::Close(None)).await.is_err() {
                        break false;
                    }
                }
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Binary(bytes))) => {
                    if !emit(TransportEventKind::Message(bytes)) {
                        break false;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(target = "client::websocket", ?frame, "close frame received");
                    break true;
                }
                Some(Ok(Message::Text(text))) => {
                    trace!(target = "client::websocket", len = text.len(), "ignoring text frame");
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    emit(TransportEventKind::Error(err.to_string()));
                    break false;
                }
                None => break closing,
            },
        }
    };
    // Flushes any queued close reply.
    let _ = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.close()).await;
    emit(TransportEventKind::Closed { clean });
}
