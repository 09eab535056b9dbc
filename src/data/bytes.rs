//! Little-endian byte cursor shared by the node payload and page codecs.

use thiserror::Error;

/// Errors raised while decoding persisted bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },
    #[error("invalid UTF-8 in persisted string")]
    InvalidUtf8,
    #[error("unknown node kind tag: {0}")]
    UnknownNodeKind(u8),
    #[error("unknown page tag: {0}")]
    UnknownPageTag(u8),
    #[error("unknown slot tag: {0}")]
    UnknownSlotTag(u8),
    #[error("unknown hash kind tag: {0}")]
    UnknownHashKind(u8),
    #[error("invalid node key encoding: {0}")]
    InvalidNodeKey(i64),
    #[error("{0} trailing bytes after decoded value")]
    TrailingBytes(usize),
}

/// Errors raised while encoding values for persistence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("length {0} does not fit a u32 prefix")]
    TooLarge(usize),
}

/// Reads fixed-width little-endian values from a byte slice.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Fails if any input is left over.
    pub fn finish(&self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::TrailingBytes(n)),
        }
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    pub fn bytes32(&mut self) -> Result<[u8; 32], DecodeError> {
        self.array()
    }

    /// Reads a `u32` length prefix followed by that many bytes.
    pub fn blob(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    pub fn string(&mut self) -> Result<String, DecodeError> {
        let raw = self.blob()?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }
}

/// Appends `len` as a `u32` length or count prefix.
pub fn put_len(out: &mut Vec<u8>, len: usize) -> Result<(), EncodeError> {
    let prefix = u32::try_from(len).map_err(|_| EncodeError::TooLarge(len))?;
    out.extend_from_slice(&prefix.to_le_bytes());
    Ok(())
}

/// Appends a `u32` length prefix and the bytes.
pub fn put_blob(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), EncodeError> {
    put_len(out, bytes.len())?;
    out.extend_from_slice(bytes);
    Ok(())
}
