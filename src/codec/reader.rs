use crate::error::{Error, Result};

/// Big-endian binary reader for the track wire format.
///
/// Construction parses and validates the 4-byte header; the declared body
/// size must match the bytes actually present or the message is rejected
/// outright. Every read is bounds-checked against the body.
#[derive(Debug)]
pub struct TrackReader<'a> {
    body: &'a [u8],
    pos: usize,
    flags: u8,
}

impl<'a> TrackReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::Codec("message is shorter than its header".into()));
        }
        let header = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let size = (header & 0x3FFF_FFFF) as usize;
        let flags = (header >> 30) as u8;

        let body = &data[4..];
        if body.len() != size {
            return Err(Error::Codec(format!(
                "declared body size {size} does not match actual size {}",
                body.len()
            )));
        }
        Ok(Self {
            body,
            pos: 0,
            flags,
        })
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Bytes of the body not yet consumed.
    pub fn remaining(&self) -> usize {
        self.body.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(Error::Codec(format!(
                "read of {len} bytes overruns message body ({} left)",
                self.remaining()
            )));
        }
        let slice = &self.body[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_be_bytes(raw))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(raw))
    }

    /// Read a length-prefixed modified-UTF-8 string.
    ///
    /// Decodes to UTF-16 code units first so surrogate pairs written as two
    /// 3-byte sequences reassemble into their supplementary-plane character.
    pub fn read_utf(&mut self) -> Result<String> {
        let byte_len = usize::from(self.read_u16()?);
        let raw = self.take(byte_len)?;

        let mut units = Vec::with_capacity(byte_len);
        let mut i = 0;
        while i < raw.len() {
            let first = raw[i];
            match first {
                0x00..=0x7F => {
                    units.push(u16::from(first));
                    i += 1;
                }
                0xC0..=0xDF => {
                    if i + 1 >= raw.len() {
                        return Err(Error::Codec("truncated 2-byte sequence".into()));
                    }
                    let second = raw[i + 1];
                    if second & 0xC0 != 0x80 {
                        return Err(Error::Codec("malformed 2-byte sequence".into()));
                    }
                    units.push((u16::from(first & 0x1F) << 6) | u16::from(second & 0x3F));
                    i += 2;
                }
                0xE0..=0xEF => {
                    if i + 2 >= raw.len() {
                        return Err(Error::Codec("truncated 3-byte sequence".into()));
                    }
                    let second = raw[i + 1];
                    let third = raw[i + 2];
                    if second & 0xC0 != 0x80 || third & 0xC0 != 0x80 {
                        return Err(Error::Codec("malformed 3-byte sequence".into()));
                    }
                    units.push(
                        (u16::from(first & 0x0F) << 12)
                            | (u16::from(second & 0x3F) << 6)
                            | u16::from(third & 0x3F),
                    );
                    i += 3;
                }
                _ => {
                    return Err(Error::Codec(format!(
                        "invalid leading byte 0x{first:02X} in string"
                    )));
                }
            }
        }

        String::from_utf16(&units)
            .map_err(|_| Error::Codec("unpaired surrogate in string".into()))
    }

    /// A presence byte followed by the string when present.
    pub fn read_nullable_text(&mut self) -> Result<Option<String>> {
        if self.read_bool()? {
            Ok(Some(self.read_utf()?))
        } else {
            Ok(None)
        }
    }
}
