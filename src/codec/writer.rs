use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};

/// Maximum value the 30-bit size field of the header can express.
const MAX_BODY_SIZE: usize = 0x3FFF_FFFF;

/// Big-endian binary writer for the track wire format.
///
/// The body is buffered until [`commit`](Self::commit), which prepends the
/// 4-byte header: low 30 bits carry the body size, the high 2 bits carry the
/// flags nibble.
#[derive(Debug, Default)]
pub struct TrackWriter {
    buf: BytesMut,
}

impl TrackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    /// Write a length-prefixed modified-UTF-8 string.
    ///
    /// Encoding runs over UTF-16 code units, so NUL and code points in
    /// [0x80, 0x7FF] take 2 bytes, everything else in the BMP takes 3, and
    /// supplementary-plane characters become two 3-byte surrogate units.
    /// The 2-byte prefix is the encoded *byte* length.
    pub fn write_utf(&mut self, value: &str) -> Result<()> {
        let byte_len: usize = value
            .encode_utf16()
            .map(|unit| match unit {
                0x0001..=0x007F => 1,
                0 | 0x0080..=0x07FF => 2,
                _ => 3,
            })
            .sum();
        if byte_len > usize::from(u16::MAX) {
            return Err(Error::Codec(format!(
                "string is too long ({byte_len} bytes, max 65535)"
            )));
        }

        self.buf.put_u16(byte_len as u16);
        for unit in value.encode_utf16() {
            match unit {
                0x0001..=0x007F => self.buf.put_u8(unit as u8),
                0 | 0x0080..=0x07FF => {
                    self.buf.put_u8(0xC0 | ((unit >> 6) & 0x1F) as u8);
                    self.buf.put_u8(0x80 | (unit & 0x3F) as u8);
                }
                _ => {
                    self.buf.put_u8(0xE0 | ((unit >> 12) & 0x0F) as u8);
                    self.buf.put_u8(0x80 | ((unit >> 6) & 0x3F) as u8);
                    self.buf.put_u8(0x80 | (unit & 0x3F) as u8);
                }
            }
        }
        Ok(())
    }

    /// A presence byte followed by the string when present.
    pub fn write_nullable_text(&mut self, value: Option<&str>) -> Result<()> {
        self.write_bool(value.is_some());
        if let Some(value) = value {
            self.write_utf(value)?;
        }
        Ok(())
    }

    /// Finish the message: header with `flags` in the top 2 bits, then the
    /// buffered body.
    pub fn commit(self, flags: u8) -> Result<Vec<u8>> {
        let size = self.buf.len();
        if size > MAX_BODY_SIZE {
            return Err(Error::Codec(format!(
                "message body too large ({size} bytes)"
            )));
        }

        let header = (size as u32) | (u32::from(flags & 0x03) << 30);
        let mut out = Vec::with_capacity(4 + size);
        out.extend_from_slice(&header.to_be_bytes());
        out.extend_from_slice(&self.buf);
        Ok(out)
    }
}
