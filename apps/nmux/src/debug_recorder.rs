use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use crate::protocol::{ClientFrame, Operation};

/// One JSON line in a recording. Timestamps are milliseconds since the
/// recorder was opened.
#[derive(Serialize)]
#[serde(tag = "type")]
pub enum DebugEvent<'a> {
    #[serde(rename = "inbound_message")]
    InboundMessage {
        elapsed_ms: u64,
        len: usize,
        outcome: &'a str,
        operations: &'a [Operation],
    },

    #[serde(rename = "outbound_frame")]
    OutboundFrame {
        elapsed_ms: u64,
        frame: &'a ClientFrame,
    },

    #[serde(rename = "connection")]
    Connection {
        elapsed_ms: u64,
        /// e.g. `open`, `reconnected`, `closed`, `retry`, `gave_up`.
        event: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    #[serde(rename = "comment")]
    Comment { elapsed_ms: u64, text: &'a str },
}

pub struct DebugRecorder {
    writer: BufWriter<File>,
    started: Instant,
}

impl DebugRecorder {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            started: Instant::now(),
        })
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn record_event(&mut self, event: DebugEvent<'_>) -> Result<()> {
        let json = serde_json::to_string(&event)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn record_inbound(&mut self, len: usize, outcome: &str, operations: &[Operation]) -> Result<()> {
        let elapsed_ms = self.elapsed_ms();
        self.record_event(DebugEvent::InboundMessage {
            elapsed_ms,
            len,
            outcome,
            operations,
        })
    }

    pub fn record_outbound(&mut self, frame: &ClientFrame) -> Result<()> {
        let elapsed_ms = self.elapsed_ms();
        self.record_event(DebugEvent::OutboundFrame { elapsed_ms, frame })
    }

    pub fn record_connection(&mut self, event: &str, detail: Option<String>) -> Result<()> {
        let elapsed_ms = self.elapsed_ms();
        self.record_event(DebugEvent::Connection {
            elapsed_ms,
            event,
            detail,
        })
    }

    pub fn record_comment(&mut self, text: &str) -> Result<()> {
        let elapsed_ms = self.elapsed_ms();
        self.record_event(DebugEvent::Comment { elapsed_ms, text })
    }
}
