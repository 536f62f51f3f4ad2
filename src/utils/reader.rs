use std::io::{ErrorKind, Read};

use crate::utils::error::{PngError, PngResult};

/// Big-endian reader that remembers how far into the stream it is.
///
/// Short reads surface as [`PngError::TruncatedStream`] carrying the
/// position where the read started.
#[derive(Debug)]
pub struct ByteReader<R: Read> {
    reader: R,
    position: u64,
}

impl<R: Read> ByteReader<R> {
    pub fn new(reader: R) -> Self {
        ByteReader { reader, position: 0 }
    }

    /// Creates a reader whose positions start at `position` instead of zero.
    pub fn with_position(reader: R, position: u64) -> Self {
        ByteReader { reader, position }
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fills `buf` completely.
    ///
    /// # Errors
    /// - `TruncatedStream` if the source ends first
    /// - `IoError` for any other failure of the source
    pub fn read_exact(&mut self, buf: &mut [u8]) -> PngResult<()> {
        let start = self.position;

        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => PngError::TruncatedStream { offset: start },
            _ => PngError::IoError(e),
        })?;

        self.position += buf.len() as u64;

        Ok(())
    }

    /// Reads exactly `length` bytes into a new buffer.
    pub fn read_vec(&mut self, length: usize) -> PngResult<Vec<u8>> {
        let mut buf = vec![0u8; length];
        self.read_exact(&mut buf)?;

        Ok(buf)
    }

    pub fn read_u32(&mut self) -> PngResult<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;

        Ok(u32::from_be_bytes(buf))
    }

    /// Reads a big-endian u32, or returns `None` if the stream is already
    /// exhausted. A partial value is still a truncation error.
    pub fn try_read_u32(&mut self) -> PngResult<Option<u32>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;

        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(PngError::IoError(e)),
            }
        }

        match filled {
            0 => Ok(None),
            4 => {
                self.position += 4;
                Ok(Some(u32::from_be_bytes(buf)))
            }
            _ => Err(PngError::TruncatedStream { offset: self.position }),
        }
    }
}

/// Big-endian field access into an in-memory chunk payload.
pub(crate) fn be_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub(crate) fn be_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}
