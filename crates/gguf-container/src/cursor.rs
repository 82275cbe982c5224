//! Bounds-checked little-endian cursor over a byte slice.

use crate::config::ReaderConfig;
use crate::error::{ContainerError, Result};

/// Explicit read position threaded through every decode call.
///
/// Every read either consumes exactly the bytes it decodes or fails with
/// [`ContainerError::MalformedValue`] and leaves the position untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    max_string_len: u64,
    max_array_len: u64,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_limits(data, &ReaderConfig::default())
    }

    pub fn with_limits(data: &'a [u8], config: &ReaderConfig) -> Self {
        Self {
            data,
            pos: 0,
            max_string_len: config.max_string_len,
            max_array_len: config.max_array_len,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn max_array_len(&self) -> u64 {
        self.max_array_len
    }

    /// Consumes `n` bytes and returns them as a borrowed slice.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(ContainerError::malformed(
                self.pos,
                format!("need {n} bytes, {} remaining", self.remaining()),
            ));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let at = self.pos;
        let bytes = self.take(N)?;
        bytes.try_into().map_err(|_| ContainerError::malformed(at, "short fixed-width read"))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let at = self.pos;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => {
                self.pos = at;
                Err(ContainerError::malformed(at, format!("invalid bool byte {other:#04x}")))
            }
        }
    }

    /// Reads a `u64 length || bytes` string. The bytes must be valid UTF-8.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.pos;
        let len = self.read_u64()?;
        if len > self.max_string_len {
            self.pos = start;
            return Err(ContainerError::malformed(
                start,
                format!("string length {len} exceeds limit {}", self.max_string_len),
            ));
        }
        if len > self.remaining() as u64 {
            let remaining = self.remaining();
            self.pos = start;
            return Err(ContainerError::malformed(
                start,
                format!("string length {len} runs past end of data ({remaining} bytes left)"),
            ));
        }
        let bytes = self.take(len as usize)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_owned()),
            Err(e) => {
                self.pos = start;
                Err(ContainerError::malformed(start, format!("string is not valid UTF-8: {e}")))
            }
        }
    }
}
