//! Streaming gzip encoding into an in-memory accumulator.
//!
//! Every call produces one complete gzip member, so a window's accumulator
//! is a concatenation of members. Readers must use a multi-member decoder
//! (`flate2::read::MultiGzDecoder`, `gzip -d`, `zcat`).

use super::error::BufferError;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::io::{self, Read, Write};

const RECORD_SEPARATOR: &[u8] = b"\n";

/// In-memory byte buffer that holds a window's gzip members.
#[derive(Debug, Default)]
pub struct Accumulator {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes that would grow the buffer past `limit` bytes fail.
    #[cfg(test)]
    pub(crate) fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }
}

impl Write for Accumulator {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self
            .limit
            .is_some_and(|limit| self.bytes.len() + buf.len() > limit)
        {
            return Err(io::Error::other("Accumulator limit reached"));
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: Compression,
}

impl Compressor {
    pub fn new() -> Self {
        Self {
            level: Compression::best(),
        }
    }

    pub fn level(&self) -> Compression {
        self.level
    }

    /// Appends `record` as one gzip member, adding a trailing newline unless
    /// the record already ends with one. Returns the number of compressed
    /// bytes appended.
    ///
    /// On failure `target` is truncated back to its original length.
    pub fn write_record(
        &self,
        target: &mut Accumulator,
        record: &str,
    ) -> Result<usize, BufferError> {
        let mark = target.len();
        match self.encode_member(&mut *target, record.as_bytes()) {
            Ok(()) => Ok(target.len() - mark),
            Err(e) => {
                target.truncate(mark);
                Err(BufferError::Compression(e))
            }
        }
    }

    fn encode_member<W: Write>(&self, target: W, record: &[u8]) -> io::Result<()> {
        let mut encoder = GzEncoder::new(target, self.level);
        encoder.write_all(record)?;
        if !record.ends_with(RECORD_SEPARATOR) {
            encoder.write_all(RECORD_SEPARATOR)?;
        }
        encoder.finish()?;
        Ok(())
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a concatenated-member gzip payload back into text.
pub fn decompress(payload: &[u8]) -> Result<String, BufferError> {
    let mut decoder = MultiGzDecoder::new(payload);
    let mut text = String::new();
    decoder.read_to_string(&mut text)?;
    Ok(text)
}
