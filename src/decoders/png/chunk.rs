use std::fmt::{self, Display, Formatter};
use std::io::Read;

use log::debug;

use crate::utils::error::{PngError, PngResult, StructuralReason};
use crate::utils::reader::ByteReader;

/// Largest chunk length the PNG format allows.
pub const MAX_CHUNK_LENGTH: u32 = (1 << 31) - 1;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    // Critical chunks
    Ihdr, // Image header
    Plte, // Palette
    Idat, // Image data
    Iend, // End of image

    // Ancillary chunks
    Trns, // Transparency

    // Animation chunks
    Actl, // Animation control
    Fctl, // Frame control
    Fdat, // Frame data

    Other([u8; 4]),
}

impl ChunkType {
    pub fn from_tag(tag: [u8; 4]) -> ChunkType {
        match &tag {
            b"IHDR" => ChunkType::Ihdr,
            b"PLTE" => ChunkType::Plte,
            b"IDAT" => ChunkType::Idat,
            b"IEND" => ChunkType::Iend,
            b"tRNS" => ChunkType::Trns,
            b"acTL" => ChunkType::Actl,
            b"fcTL" => ChunkType::Fctl,
            b"fdAT" => ChunkType::Fdat,
            _ => ChunkType::Other(tag),
        }
    }

    pub fn tag(&self) -> [u8; 4] {
        match self {
            ChunkType::Ihdr => *b"IHDR",
            ChunkType::Plte => *b"PLTE",
            ChunkType::Idat => *b"IDAT",
            ChunkType::Iend => *b"IEND",
            ChunkType::Trns => *b"tRNS",
            ChunkType::Actl => *b"acTL",
            ChunkType::Fctl => *b"fcTL",
            ChunkType::Fdat => *b"fdAT",
            ChunkType::Other(tag) => *tag,
        }
    }

    /// Critical chunks have an uppercase first letter.
    pub fn is_critical(&self) -> bool {
        self.tag()[0] & 0x20 == 0
    }
}

impl Display for ChunkType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.tag()))
    }
}

/// One record read from the stream. Only lives for a single step of the
/// validator.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_type: ChunkType,
    pub data: Vec<u8>,
    /// Stream position of the length field.
    pub offset: u64,
}

struct CrcCalculator {
    table: [u32; 256],
}

impl CrcCalculator {
    const fn new() -> Self {
        let mut table = [0u32; 256];
        let mut n = 0;
        while n < 256 {
            let mut c = n as u32;
            let mut k = 0;
            while k < 8 {
                if c & 1 == 1 {
                    c = 0xedb88320u32 ^ (c >> 1);
                } else {
                    c >>= 1;
                }
                k += 1;
            }
            table[n] = c;
            n += 1;
        }
        Self { table }
    }

    fn update_crc(&self, crc: u32, buf: &[u8]) -> u32 {
        let mut c = crc;
        for &b in buf {
            c = self.table[((c ^ u32::from(b)) & 0xff) as usize] ^ (c >> 8);
        }
        c
    }
}

static CRC: CrcCalculator = CrcCalculator::new();

/// CRC-32 over the chunk tag followed by its payload.
pub fn chunk_crc(tag: &[u8; 4], data: &[u8]) -> u32 {
    let crc = CRC.update_crc(0xffffffff, tag);
    CRC.update_crc(crc, data) ^ 0xffffffff
}

/// Pulls length-prefixed, CRC-checked chunks off a byte stream.
pub struct ChunkReader<R: Read> {
    reader: ByteReader<R>,
    max_length: Option<u64>,
}

impl<R: Read> ChunkReader<R> {
    pub fn new(reader: ByteReader<R>) -> Self {
        ChunkReader { reader, max_length: None }
    }

    /// Rejects chunks whose payload would need more than `max_length` bytes.
    pub fn with_max_length(mut self, max_length: Option<u64>) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// Consumes the 8-byte signature that opens every PNG stream.
    pub fn read_signature(&mut self) -> PngResult<()> {
        let mut signature = [0u8; 8];
        self.reader.read_exact(&mut signature)?;

        if signature != PNG_SIGNATURE {
            return Err(PngError::UnsupportedFormat(format!(
                "not a PNG signature: {:02X?}",
                signature
            )));
        }

        Ok(())
    }

    /// Reads the next chunk, or `None` when the stream ends on a chunk
    /// boundary.
    pub fn next_chunk(&mut self) -> PngResult<Option<Chunk>> {
        let offset = self.reader.position();

        let length = match self.reader.try_read_u32()? {
            Some(length) => length,
            None => return Ok(None),
        };

        let mut tag = [0u8; 4];
        self.reader.read_exact(&mut tag)?;
        let chunk_type = ChunkType::from_tag(tag);

        if length > MAX_CHUNK_LENGTH {
            return Err(PngError::Structural {
                chunk_type,
                offset,
                reason: StructuralReason::ChunkTooLarge(length),
            });
        }

        if let Some(max_length) = self.max_length {
            if length as u64 > max_length {
                return Err(PngError::LimitsExceeded(format!(
                    "{} chunk at {:08X} needs {} bytes",
                    chunk_type, offset, length
                )));
            }
        }

        let data = self.reader.read_vec(length as usize)?;
        let expected = self.reader.read_u32()?;
        let calculated = chunk_crc(&tag, &data);

        if calculated != expected {
            return Err(PngError::Checksum {
                chunk_type,
                offset,
                expected,
                calculated,
            });
        }

        debug!("{} chunk at {:08X}, {} bytes", chunk_type, offset, length);

        Ok(Some(Chunk {
            chunk_type,
            data,
            offset,
        }))
    }
}
