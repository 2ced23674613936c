pub mod decoder;
pub mod wire;

use serde::Serialize;

pub use decoder::{HandshakeGate, MessageDecoder, MessageOutcome, OpDecoder};
pub use wire::{ByteCursor, WireError};

/// Wire tags. The numbering is shared with the host; tags marked reserved
/// are defined by the host but never sent to display clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum OpTag {
    Resize = 1,
    Clear = 2,
    Keyboard = 3,
    Cursor = 4,
    Palette = 5,
    Style = 6,
    Put = 7,
    PutRep = 8,
    Title = 9,
    Icon = 10,
    Bell = 11,
    Scroll = 12,
    Flush = 13,
    Log = 14,
}

impl OpTag {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => OpTag::Resize,
            2 => OpTag::Clear,
            3 => OpTag::Keyboard,
            4 => OpTag::Cursor,
            5 => OpTag::Palette,
            6 => OpTag::Style,
            7 => OpTag::Put,
            8 => OpTag::PutRep,
            9 => OpTag::Title,
            10 => OpTag::Icon,
            11 => OpTag::Bell,
            12 => OpTag::Scroll,
            13 => OpTag::Flush,
            14 => OpTag::Log,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Cell attribute bits.
pub mod attr {
    pub const REVERSE: u8 = 1 << 0;
    pub const ITALIC: u8 = 1 << 1;
    pub const BOLD: u8 = 1 << 2;
    pub const UNDERLINE: u8 = 1 << 3;
    pub const UNDERCURL: u8 = 1 << 4;
}

/// Editor mode and state bits carried by `Flush`.
pub mod mode {
    pub const BUSY: u32 = 1 << 0;
    pub const MOUSE_ON: u32 = 1 << 1;
    pub const NORMAL: u32 = 1 << 2;
    pub const INSERT: u32 = 1 << 3;
    pub const REPLACE: u32 = 1 << 4;
    pub const REDRAW: u32 = 1 << 5;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaletteUpdate {
    pub id: u32,
    pub attr: u8,
    /// Raw eint32; values that are negative as i32 mean "default".
    pub fg: u32,
    pub bg: u32,
    pub sp: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Resize {
        cols: u32,
        rows: u32,
    },
    SetPalette {
        entries: Vec<PaletteUpdate>,
    },
    SetStyle {
        id: u32,
    },
    Put {
        index: u32,
        text: String,
    },
    PutRepeated {
        index: u32,
        ch: char,
        count: u32,
    },
    Scroll {
        fill: u32,
        delta: i16,
        top: u32,
        bottom: u32,
        left: u32,
        right: u32,
    },
    Clear {
        id: u32,
        attr: u8,
        fg: u32,
        bg: u32,
        sp: u32,
    },
    Flush {
        mode: u32,
        x: u32,
        y: u32,
        id: u32,
        ch: char,
    },
    Log {
        text: String,
    },
    Unknown {
        tag: u8,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Resize { .. } => "resize",
            Operation::SetPalette { .. } => "palette",
            Operation::SetStyle { .. } => "style",
            Operation::Put { .. } => "put",
            Operation::PutRepeated { .. } => "put_rep",
            Operation::Scroll { .. } => "scroll",
            Operation::Clear { .. } => "clear",
            Operation::Flush { .. } => "flush",
            Operation::Log { .. } => "log",
            Operation::Unknown { .. } => "unknown",
        }
    }
}

/// Frames sent from the display client to the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ClientFrame {
    /// A resolved key name such as `<C-A-Left>`. The frame length is the
    /// message length, so there is no length prefix.
    Keyboard { key: String },
    Resize { cols: u16, rows: u16 },
}

pub fn encode_client_frame(frame: &ClientFrame) -> Vec<u8> {
    match frame {
        ClientFrame::Keyboard { key } => {
            let mut buf = Vec::with_capacity(key.len() + 1);
            buf.push(OpTag::Keyboard.as_u8());
            buf.extend(key.chars().map(|ch| if ch.is_ascii() { ch as u8 } else { b'?' }));
            buf
        }
        ClientFrame::Resize { cols, rows } => {
            let mut buf = Vec::with_capacity(5);
            buf.push(OpTag::Resize.as_u8());
            wire::write_u16(&mut buf, *cols);
            wire::write_u16(&mut buf, *rows);
            buf
        }
    }
}

/// Host-side encoding of a message. The client never sends these; the
/// encoder exists for fixtures and for replaying recorded sessions.
pub fn encode_operations(ops: &[Operation]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    for op in ops {
        encode_operation(&mut buf, op);
    }
    buf
}

fn encode_operation(buf: &mut Vec<u8>, op: &Operation) {
    use wire::{write_eint32, write_string, write_u16, write_u24};
    match op {
        Operation::Resize { cols, rows } => {
            buf.push(OpTag::Resize.as_u8());
            write_eint32(buf, *cols);
            write_eint32(buf, *rows);
        }
        Operation::SetPalette { entries } => {
            buf.push(OpTag::Palette.as_u8());
            write_eint32(buf, entries.len() as u32);
            for entry in entries {
                write_eint32(buf, entry.id);
                buf.push(entry.attr);
                write_eint32(buf, entry.fg);
                write_eint32(buf, entry.bg);
                write_eint32(buf, entry.sp);
            }
        }
        Operation::SetStyle { id } => {
            buf.push(OpTag::Style.as_u8());
            write_eint32(buf, *id);
        }
        Operation::Put { index, text } => {
            buf.push(OpTag::Put.as_u8());
            write_eint32(buf, *index);
            write_string(buf, text);
        }
        Operation::PutRepeated { index, ch, count } => {
            buf.push(OpTag::PutRep.as_u8());
            write_eint32(buf, *index);
            write_eint32(buf, *count);
            write_eint32(buf, *ch as u32);
        }
        Operation::Scroll {
            fill,
            delta,
            top,
            bottom,
            left,
            right,
        } => {
            buf.push(OpTag::Scroll.as_u8());
            write_u24(buf, *fill);
            write_u16(buf, *delta as u16);
            write_eint32(buf, *top);
            write_eint32(buf, *bottom);
            write_eint32(buf, *left);
            write_eint32(buf, *right);
        }
        Operation::Clear {
            id,
            attr,
            fg,
            bg,
            sp,
        } => {
            buf.push(OpTag::Clear.as_u8());
            write_eint32(buf, *id);
            buf.push(*attr);
            write_u24(buf, *fg);
            write_u24(buf, *bg);
            write_u24(buf, *sp);
        }
        Operation::Flush { mode, x, y, id, ch } => {
            buf.push(OpTag::Flush.as_u8());
            write_eint32(buf, *mode);
            write_eint32(buf, *x);
            write_eint32(buf, *y);
            write_eint32(buf, *id);
            write_eint32(buf, *ch as u32);
        }
        Operation::Log { text } => {
            buf.push(OpTag::Log.as_u8());
            write_string(buf, text);
        }
        Operation::Unknown { tag } => buf.push(*tag),
    }
}
