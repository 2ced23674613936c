//! Integer and string codecs for the screen-operation stream.
//!
//! Most integers on the wire are "eint32": 1-5 bytes, seven bits per byte,
//! with bit 7 flagging that another byte follows. The fifth byte carries a
//! full eight bits. Fixed-width big-endian integers are used for the few
//! binary-exact fields (attributes, 24-bit colors, the scroll delta).

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected end of input (needed {needed} bytes at offset {offset})")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
}

const EINT32_MAX_BYTES: usize = 5;

/// Owned, growable byte buffer with a read position.
///
/// Reads never go past the end of the buffer; a short read fails with
/// [`WireError::UnexpectedEof`] and leaves the position untouched.
#[derive(Clone, Debug, Default)]
pub struct ByteCursor {
    bytes: Vec<u8>,
    pos: usize,
    last: usize,
}

impl ByteCursor {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            pos: 0,
            last: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Unread bytes from the current position.
    pub fn to_end(&self) -> &[u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }

    /// Appends newly arrived bytes. A fully consumed cursor drops its old
    /// contents and starts over at position zero.
    pub fn append(&mut self, more: &[u8]) {
        if self.pos == self.bytes.len() {
            self.bytes.clear();
            self.pos = 0;
            self.last = 0;
        }
        self.bytes.extend_from_slice(more);
    }

    /// Rewinds over the last fixed-width read. Only meant for one-token
    /// lookahead; variable-width reads clear the marker so this is a no-op
    /// after them.
    pub fn unread(&mut self) {
        self.pos = self.pos.saturating_sub(self.last);
        self.last = 0;
    }

    fn take(&mut self, width: usize) -> Result<&[u8], WireError> {
        if self.remaining() < width {
            return Err(WireError::UnexpectedEof {
                offset: self.pos,
                needed: width,
            });
        }
        let start = self.pos;
        self.pos += width;
        self.last = width;
        Ok(&self.bytes[start..self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, WireError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u24(&mut self) -> Result<u32, WireError> {
        let b = self.take(3)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_eint32(&mut self) -> Result<u32, WireError> {
        let start = self.pos;
        let mut value: u32 = 0;
        for i in 0..EINT32_MAX_BYTES {
            let Some(&byte) = self.bytes.get(start + i) else {
                self.pos = start;
                return Err(WireError::UnexpectedEof {
                    offset: start,
                    needed: i + 1,
                });
            };
            if i == EINT32_MAX_BYTES - 1 {
                value |= (byte as u32) << 28;
                self.pos = start + EINT32_MAX_BYTES;
                break;
            }
            value |= ((byte & 0x7f) as u32) << (7 * i);
            if byte & 0x80 == 0 {
                self.pos = start + i + 1;
                break;
            }
        }
        self.last = 0;
        Ok(value)
    }

    /// eint32 length followed by that many eint32 code points.
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let start = self.pos;
        let result = self.read_string_inner();
        if result.is_err() {
            self.pos = start;
        }
        self.last = 0;
        result
    }

    fn read_string_inner(&mut self) -> Result<String, WireError> {
        let len = self.read_eint32()? as usize;
        // Every code point needs at least one byte.
        if len > self.remaining() {
            return Err(WireError::UnexpectedEof {
                offset: self.pos,
                needed: len,
            });
        }
        let mut out = String::with_capacity(len);
        for _ in 0..len {
            out.push(code_point(self.read_eint32()?));
        }
        Ok(out)
    }
}

pub(crate) fn code_point(value: u32) -> char {
    char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER)
}

pub fn write_eint32(buf: &mut Vec<u8>, value: u32) {
    let mut value = value;
    for _ in 0..EINT32_MAX_BYTES - 1 {
        if value < 0x80 {
            buf.push(value as u8);
            return;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

pub fn write_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn write_u24(buf: &mut Vec<u8>, value: u32) {
    let b = value.to_be_bytes();
    buf.extend_from_slice(&b[1..]);
}

pub fn write_string(buf: &mut Vec<u8>, text: &str) {
    write_eint32(buf, text.chars().count() as u32);
    for ch in text.chars() {
        write_eint32(buf, ch as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(value: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_eint32(&mut buf, value);
        buf
    }

    #[test_timeout::timeout]
    fn eint32_width_boundaries() {
        let cases = [
            (127, 1),
            (128, 2),
            (16_383, 2),
            (16_384, 3),
            (2_097_151, 3),
            (2_097_152, 4),
            (268_435_455, 4),
            (268_435_456, 5),
            (u32::MAX, 5),
            (0, 1),
        ];
        for (value, width) in cases {
            let bytes = encoded(value);
            assert_eq!(bytes.len(), width, "width of {value}");
            let mut cursor = ByteCursor::new(bytes);
            assert_eq!(cursor.read_eint32().expect("decode"), value);
            assert_eq!(cursor.remaining(), 0);
        }
    }

    #[test_timeout::timeout]
    fn eint32_sampled_values_survive_encoding() {
        let mut value: u32 = 1;
        while value < u32::MAX / 3 {
            let mut cursor = ByteCursor::new(encoded(value));
            assert_eq!(cursor.read_eint32().expect("decode"), value);
            value = value * 3 + 1;
        }
    }

    #[test_timeout::timeout]
    fn eint32_fifth_byte_uses_all_bits() {
        // Hosts emit 0xffffffff (color "default", -1) with a fifth byte of
        // 0x0f; a full byte there must still decode.
        let mut cursor = ByteCursor::new(vec![0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert_eq!(cursor.read_eint32().expect("decode") as i32, -1);

        let mut cursor = ByteCursor::new(vec![0x80, 0x80, 0x80, 0x80, 0xff]);
        assert_eq!(cursor.read_eint32().expect("decode"), 0xf000_0000);
    }

    #[test_timeout::timeout]
    fn fixed_width_reads_are_big_endian() {
        let mut cursor = ByteCursor::new(vec![0x01, 0x02]);
        assert_eq!(cursor.read_u16().expect("u16"), 258);

        let mut cursor = ByteCursor::new(vec![0x80, 0x00]);
        assert_eq!(cursor.read_i16().expect("i16"), -32768);

        let mut cursor = ByteCursor::new(vec![0xff, 0xfe]);
        assert_eq!(cursor.read_i16().expect("i16"), -2);

        let mut cursor = ByteCursor::new(vec![0x12, 0x34, 0x56, 0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(cursor.read_u24().expect("u24"), 0x123456);
        assert_eq!(cursor.read_u32().expect("u32"), 0xdeadbeef);
    }

    #[test_timeout::timeout]
    fn truncated_reads_fail_without_moving() {
        let mut cursor = ByteCursor::new(vec![0x01]);
        assert_eq!(
            cursor.read_u16(),
            Err(WireError::UnexpectedEof {
                offset: 0,
                needed: 2
            })
        );
        assert_eq!(cursor.position(), 0);

        let mut cursor = ByteCursor::new(vec![0x80, 0x80]);
        assert!(matches!(
            cursor.read_eint32(),
            Err(WireError::UnexpectedEof { offset: 0, .. })
        ));
        assert_eq!(cursor.position(), 0);

        let mut cursor = ByteCursor::new(Vec::new());
        assert!(cursor.read_u8().is_err());
    }

    #[test_timeout::timeout]
    fn strings_are_code_point_runs() {
        let mut buf = Vec::new();
        write_string(&mut buf, "héllo ✓");
        let mut cursor = ByteCursor::new(buf);
        assert_eq!(cursor.read_string().expect("string"), "héllo ✓");
        assert_eq!(cursor.remaining(), 0);
    }

    #[test_timeout::timeout]
    fn truncated_string_rewinds() {
        let mut buf = Vec::new();
        write_eint32(&mut buf, 4);
        write_eint32(&mut buf, 'a' as u32);
        let mut cursor = ByteCursor::new(buf);
        assert!(cursor.read_string().is_err());
        assert_eq!(cursor.position(), 0);
    }

    #[test_timeout::timeout]
    fn unread_rewinds_only_fixed_reads() {
        let mut cursor = ByteCursor::new(vec![0x07, 0x00, 0x2a, 0x05]);
        assert_eq!(cursor.read_u8().expect("tag"), 7);
        cursor.unread();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.read_u8().expect("tag"), 7);
        assert_eq!(cursor.read_u16().expect("u16"), 0x2a);
        assert_eq!(cursor.read_eint32().expect("eint"), 5);
        cursor.unread();
        assert_eq!(cursor.position(), 4);
    }

    #[test_timeout::timeout]
    fn append_accumulates_partial_buffers() {
        let mut cursor = ByteCursor::new(vec![0x81]);
        assert!(cursor.read_eint32().is_err());
        cursor.append(&[0x01]);
        assert_eq!(cursor.read_eint32().expect("eint"), 129);
        assert_eq!(cursor.remaining(), 0);

        cursor.append(&[0x05, 0x06]);
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.read_u8().expect("u8"), 5);
        cursor.append(&[0x07]);
        assert_eq!(cursor.to_end(), &[0x06, 0x07]);
    }
}
