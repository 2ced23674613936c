use tracing::trace;

use super::wire::{ByteCursor, WireError, code_point};
use super::{OpTag, Operation, PaletteUpdate};

/// Smallest encoding of one palette entry: id, attr, fg, bg, sp.
const PALETTE_ENTRY_MIN_BYTES: usize = 5;

/// Lazily decodes the operations in one message.
///
/// Iteration ends when the cursor is exhausted, after the first decode
/// error, or after an unknown tag. There is no resynchronisation: bytes
/// after a failure are left unread.
pub struct OpDecoder<'a> {
    cursor: &'a mut ByteCursor,
    done: bool,
}

impl<'a> OpDecoder<'a> {
    pub fn new(cursor: &'a mut ByteCursor) -> Self {
        Self {
            cursor,
            done: false,
        }
    }

    fn decode_next(&mut self) -> Result<Operation, WireError> {
        let cursor = &mut *self.cursor;
        let tag = cursor.read_u8()?;
        let Some(tag) = OpTag::from_u8(tag) else {
            return Ok(Operation::Unknown { tag });
        };
        let op = match tag {
            OpTag::Resize => {
                let cols = cursor.read_eint32()?;
                let rows = cursor.read_eint32()?;
                Operation::Resize { cols, rows }
            }
            OpTag::Palette => {
                let count = cursor.read_eint32()? as usize;
                let mut entries =
                    Vec::with_capacity(count.min(cursor.remaining() / PALETTE_ENTRY_MIN_BYTES));
                for _ in 0..count {
                    let id = cursor.read_eint32()?;
                    let attr = cursor.read_u8()?;
                    let fg = cursor.read_eint32()?;
                    let bg = cursor.read_eint32()?;
                    let sp = cursor.read_eint32()?;
                    entries.push(PaletteUpdate {
                        id,
                        attr,
                        fg,
                        bg,
                        sp,
                    });
                }
                Operation::SetPalette { entries }
            }
            OpTag::Style => Operation::SetStyle {
                id: cursor.read_eint32()?,
            },
            OpTag::Put => {
                let index = cursor.read_eint32()?;
                let text = cursor.read_string()?;
                Operation::Put { index, text }
            }
            OpTag::PutRep => {
                let index = cursor.read_eint32()?;
                let count = cursor.read_eint32()?;
                let ch = code_point(cursor.read_eint32()?);
                Operation::PutRepeated { index, ch, count }
            }
            OpTag::Scroll => {
                let fill = cursor.read_u24()?;
                let delta = cursor.read_i16()?;
                let top = cursor.read_eint32()?;
                let bottom = cursor.read_eint32()?;
                let left = cursor.read_eint32()?;
                let right = cursor.read_eint32()?;
                Operation::Scroll {
                    fill,
                    delta,
                    top,
                    bottom,
                    left,
                    right,
                }
            }
            OpTag::Clear => {
                let id = cursor.read_eint32()?;
                let attr = cursor.read_u8()?;
                let fg = cursor.read_u24()?;
                let bg = cursor.read_u24()?;
                let sp = cursor.read_u24()?;
                Operation::Clear {
                    id,
                    attr,
                    fg,
                    bg,
                    sp,
                }
            }
            OpTag::Flush => {
                let mode = cursor.read_eint32()?;
                let x = cursor.read_eint32()?;
                let y = cursor.read_eint32()?;
                let id = cursor.read_eint32()?;
                let ch = code_point(cursor.read_eint32()?);
                Operation::Flush { mode, x, y, id, ch }
            }
            OpTag::Log => Operation::Log {
                text: cursor.read_string()?,
            },
            OpTag::Keyboard | OpTag::Cursor | OpTag::Title | OpTag::Icon | OpTag::Bell => {
                Operation::Unknown { tag: tag.as_u8() }
            }
        };
        Ok(op)
    }
}

impl Iterator for OpDecoder<'_> {
    type Item = Result<Operation, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.cursor.remaining() == 0 {
            return None;
        }
        let result = self.decode_next();
        match &result {
            Ok(Operation::Unknown { .. }) | Err(_) => self.done = true,
            Ok(op) => trace!(target = "client::decode", op = op.name(), "decoded operation"),
        }
        Some(result)
    }
}

/// Requires the first operation on a fresh connection to be a resize so the
/// client never paints into a grid of unknown size.
#[derive(Clone, Copy, Debug)]
pub struct HandshakeGate {
    awaiting_resize: bool,
}

impl Default for HandshakeGate {
    fn default() -> Self {
        Self {
            awaiting_resize: true,
        }
    }
}

impl HandshakeGate {
    /// Called whenever a connection (re)opens.
    pub fn arm(&mut self) {
        self.awaiting_resize = true;
    }

    pub fn is_armed(&self) -> bool {
        self.awaiting_resize
    }

    fn admit(&mut self, op: &Operation) -> bool {
        if !self.awaiting_resize {
            return true;
        }
        if matches!(op, Operation::Resize { .. }) {
            self.awaiting_resize = false;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    Complete { applied: usize },
    /// The connection had not seen its resize yet and the message led with
    /// something else. Nothing was applied.
    Discarded { leading: &'static str },
    Aborted { applied: usize, error: WireError },
    UnknownOp { applied: usize, tag: u8 },
}

/// Decodes whole messages, handing each operation to `apply` in order.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    gate: HandshakeGate,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&mut self) {
        self.gate.arm();
    }

    pub fn awaiting_resize(&self) -> bool {
        self.gate.is_armed()
    }

    pub fn decode<F>(&mut self, bytes: &[u8], mut apply: F) -> MessageOutcome
    where
        F: FnMut(&Operation),
    {
        let mut cursor = ByteCursor::new(bytes);
        let mut applied = 0;
        for (position, result) in OpDecoder::new(&mut cursor).enumerate() {
            let op = match result {
                Ok(op) => op,
                Err(error) => return MessageOutcome::Aborted { applied, error },
            };
            if position == 0 && !self.gate.admit(&op) {
                return MessageOutcome::Discarded { leading: op.name() };
            }
            if let Operation::Unknown { tag } = op {
                return MessageOutcome::UnknownOp { applied, tag };
            }
            apply(&op);
            applied += 1;
        }
        MessageOutcome::Complete { applied }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_operations;

    fn decode_all(bytes: Vec<u8>) -> Vec<Result<Operation, WireError>> {
        let mut cursor = ByteCursor::new(bytes);
        OpDecoder::new(&mut cursor).collect()
    }

    fn sample_ops() -> Vec<Operation> {
        vec![
            Operation::Resize { cols: 80, rows: 24 },
            Operation::SetPalette {
                entries: vec![
                    PaletteUpdate {
                        id: 3,
                        attr: 0,
                        fg: 0xff0000,
                        bg: u32::MAX,
                        sp: u32::MAX,
                    },
                    PaletteUpdate {
                        id: 4,
                        attr: 1,
                        fg: 0x00ff00,
                        bg: 0x000000,
                        sp: 0x0000ff,
                    },
                ],
            },
            Operation::SetStyle { id: 3 },
            Operation::Put {
                index: 200,
                text: "ls -la".to_string(),
            },
            Operation::PutRepeated {
                index: 206,
                ch: ' ',
                count: 74,
            },
            Operation::Scroll {
                fill: 0x000000,
                delta: -1,
                top: 1,
                bottom: 22,
                left: 0,
                right: 79,
            },
            Operation::Log {
                text: "host says hi".to_string(),
            },
            Operation::Flush {
                mode: crate::protocol::mode::INSERT,
                x: 6,
                y: 2,
                id: 3,
                ch: ' ',
            },
        ]
    }

    #[test_timeout::timeout]
    fn decodes_every_operation_kind_in_order() {
        let ops = sample_ops();
        let decoded: Vec<Operation> = decode_all(encode_operations(&ops))
            .into_iter()
            .map(|result| result.expect("decode"))
            .collect();
        assert_eq!(decoded, ops);
    }

    #[test_timeout::timeout]
    fn clear_uses_fixed_width_colors() {
        let bytes = vec![2, 1, 0, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff];
        let decoded = decode_all(bytes);
        assert_eq!(
            decoded,
            vec![Ok(Operation::Clear {
                id: 1,
                attr: 0,
                fg: 0xffffff,
                bg: 0,
                sp: 0xffffff,
            })]
        );
    }

    #[test_timeout::timeout]
    fn unknown_tag_stops_decoding() {
        let mut bytes = encode_operations(&[Operation::SetStyle { id: 1 }]);
        bytes.push(0x63);
        bytes.extend(encode_operations(&[Operation::SetStyle { id: 2 }]));
        let decoded = decode_all(bytes);
        assert_eq!(
            decoded,
            vec![
                Ok(Operation::SetStyle { id: 1 }),
                Ok(Operation::Unknown { tag: 0x63 }),
            ]
        );
    }

    #[test_timeout::timeout]
    fn reserved_tags_are_reported_as_unknown() {
        let decoded = decode_all(vec![OpTag::Bell.as_u8(), 6, 1]);
        assert_eq!(decoded, vec![Ok(Operation::Unknown { tag: 11 })]);
    }

    #[test_timeout::timeout]
    fn truncated_operation_yields_one_error() {
        let mut bytes = encode_operations(&[Operation::Put {
            index: 0,
            text: "abc".to_string(),
        }]);
        bytes.truncate(bytes.len() - 1);
        let decoded = decode_all(bytes);
        assert_eq!(decoded.len(), 1);
        assert!(matches!(decoded[0], Err(WireError::UnexpectedEof { .. })));
    }

    #[test_timeout::timeout]
    fn huge_palette_count_does_not_preallocate() {
        let mut bytes = vec![OpTag::Palette.as_u8()];
        crate::protocol::wire::write_eint32(&mut bytes, u32::MAX);
        let decoded = decode_all(bytes);
        assert!(matches!(decoded[..], [Err(WireError::UnexpectedEof { .. })]));
    }

    #[test_timeout::timeout]
    fn first_message_must_lead_with_resize() {
        let mut decoder = MessageDecoder::new();
        let mut seen = Vec::new();
        let outcome = decoder.decode(
            &encode_operations(&[
                Operation::SetStyle { id: 1 },
                Operation::Resize { cols: 10, rows: 2 },
            ]),
            |op| seen.push(op.clone()),
        );
        assert_eq!(outcome, MessageOutcome::Discarded { leading: "style" });
        assert!(seen.is_empty());
        assert!(decoder.awaiting_resize());

        let outcome = decoder.decode(
            &encode_operations(&[
                Operation::Resize { cols: 10, rows: 2 },
                Operation::SetStyle { id: 1 },
            ]),
            |op| seen.push(op.clone()),
        );
        assert_eq!(outcome, MessageOutcome::Complete { applied: 2 });
        assert_eq!(seen.len(), 2);
        assert!(!decoder.awaiting_resize());

        let outcome = decoder.decode(
            &encode_operations(&[Operation::SetStyle { id: 1 }]),
            |op| seen.push(op.clone()),
        );
        assert_eq!(outcome, MessageOutcome::Complete { applied: 1 });
    }

    #[test_timeout::timeout]
    fn reopening_rearms_the_gate() {
        let mut decoder = MessageDecoder::new();
        decoder.decode(
            &encode_operations(&[Operation::Resize { cols: 4, rows: 4 }]),
            |_| {},
        );
        assert!(!decoder.awaiting_resize());
        decoder.connection_opened();
        let outcome = decoder.decode(
            &encode_operations(&[Operation::Put {
                index: 0,
                text: "x".to_string(),
            }]),
            |_| panic!("nothing should apply"),
        );
        assert_eq!(outcome, MessageOutcome::Discarded { leading: "put" });
    }

    #[test_timeout::timeout]
    fn operations_before_a_failure_are_still_applied() {
        let mut decoder = MessageDecoder::new();
        let mut bytes = encode_operations(&[
            Operation::Resize { cols: 4, rows: 4 },
            Operation::SetStyle { id: 9 },
        ]);
        bytes.push(OpTag::Put.as_u8());
        let mut applied = Vec::new();
        let outcome = decoder.decode(&bytes, |op| applied.push(op.name()));
        assert!(matches!(
            outcome,
            MessageOutcome::Aborted {
                applied: 2,
                error: WireError::UnexpectedEof { .. }
            }
        ));
        assert_eq!(applied, vec!["resize", "style"]);

        let mut bytes = encode_operations(&[Operation::SetStyle { id: 9 }]);
        bytes.push(200);
        let outcome = decoder.decode(&bytes, |_| {});
        assert_eq!(outcome, MessageOutcome::UnknownOp { applied: 1, tag: 200 });
    }
}
