use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

use crate::decoders::png::chunk::ChunkType;

/// Why a chunk was rejected by the structural validator.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralReason {
    /// The chunk may occur only once and was seen again.
    Duplicate,
    /// The chunk appeared at a position its type does not allow.
    Misplaced,
    /// The chunk is not allowed for this image's color type.
    Forbidden,
    /// Two fcTL chunks without image data in between.
    ConsecutiveFrameControl,
    /// fdAT without an open fcTL.
    MissingFrameControl,
    /// fcTL or fdAT in a stream without acTL.
    MissingAnimationControl,
    /// A second, separate group of IDAT chunks.
    NonContinuous,
    /// A critical chunk this decoder does not know.
    UnknownCritical,
    /// A mandatory chunk never appeared.
    MissingChunk,
    /// The payload has the wrong size or content for its type.
    InvalidPayload(String),
    /// The declared length exceeds 2^31 - 1.
    ChunkTooLarge(u32),
}

impl Display for StructuralReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StructuralReason::Duplicate => write!(f, "chunk appears more than once"),
            StructuralReason::Misplaced => write!(f, "chunk is out of order"),
            StructuralReason::Forbidden => write!(f, "chunk is not allowed for this color type"),
            StructuralReason::ConsecutiveFrameControl => write!(f, "frame control without frame data"),
            StructuralReason::MissingFrameControl => write!(f, "frame data without frame control"),
            StructuralReason::MissingAnimationControl => write!(f, "animation chunk without acTL"),
            StructuralReason::NonContinuous => write!(f, "image data chunks are not consecutive"),
            StructuralReason::UnknownCritical => write!(f, "unknown critical chunk"),
            StructuralReason::MissingChunk => write!(f, "mandatory chunk is missing"),
            StructuralReason::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
            StructuralReason::ChunkTooLarge(length) => write!(f, "chunk length {} exceeds 2^31-1", length),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderReason {
    InvalidDimensions { width: u32, height: u32 },
    InvalidColorType(u8),
    InvalidBitDepth { color_type: u8, bit_depth: u8 },
    InvalidCompressionMethod(u8),
    InvalidFilterMethod(u8),
    InvalidInterlaceMethod(u8),
}

impl Display for HeaderReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HeaderReason::InvalidDimensions { width, height } => {
                write!(f, "invalid image dimensions: {}x{}", width, height)
            }
            HeaderReason::InvalidColorType(value) => write!(f, "invalid color type: {}", value),
            HeaderReason::InvalidBitDepth { color_type, bit_depth } => {
                write!(f, "bit depth {} is not allowed for color type {}", bit_depth, color_type)
            }
            HeaderReason::InvalidCompressionMethod(value) => write!(f, "invalid compression method: {}", value),
            HeaderReason::InvalidFilterMethod(value) => write!(f, "invalid filter method: {}", value),
            HeaderReason::InvalidInterlaceMethod(value) => write!(f, "invalid interlace method: {}", value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameReason {
    ZeroFrames,
    SequenceNumber { expected: u32, found: u32 },
    FirstFrameNotFullCanvas,
    InvalidRegion { x_offset: u32, y_offset: u32, width: u32, height: u32 },
    InvalidDisposeOp(u8),
    InvalidBlendOp(u8),
    InvalidFilterType(u8),
    PaletteIndex(u8),
}

impl Display for FrameReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FrameReason::ZeroFrames => write!(f, "animation declares zero frames"),
            FrameReason::SequenceNumber { expected, found } => {
                write!(f, "sequence number {} where {} was expected", found, expected)
            }
            FrameReason::FirstFrameNotFullCanvas => write!(f, "first frame does not cover the full canvas"),
            FrameReason::InvalidRegion { x_offset, y_offset, width, height } => {
                write!(f, "frame region {}x{}+{}+{} is outside the canvas", width, height, x_offset, y_offset)
            }
            FrameReason::InvalidDisposeOp(value) => write!(f, "invalid dispose op: {}", value),
            FrameReason::InvalidBlendOp(value) => write!(f, "invalid blend op: {}", value),
            FrameReason::InvalidFilterType(value) => write!(f, "invalid scanline filter type: {}", value),
            FrameReason::PaletteIndex(value) => write!(f, "palette index {} out of range", value),
        }
    }
}

#[derive(Debug)]
pub enum PngError {
    IoError(io::Error),
    UnsupportedFormat(String),
    Checksum { chunk_type: ChunkType, offset: u64, expected: u32, calculated: u32 },
    TruncatedStream { offset: u64 },
    Structural { chunk_type: ChunkType, offset: u64, reason: StructuralReason },
    HeaderValidation { offset: u64, reason: HeaderReason },
    FrameValidation { offset: Option<u64>, reason: FrameReason },
    FrameCountMismatch { declared: u32, frame_controls: usize, payloads: usize },
    MissingData,
    Decompression(String),
    LimitsExceeded(String),
    Cancelled,
}

impl Error for PngError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PngError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for PngError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PngError::IoError(err) => write!(f, "I/O error: {}", err),
            PngError::UnsupportedFormat(format) => write!(f, "Unsupported image format: {}", format),
            PngError::Checksum { chunk_type, offset, expected, calculated } => write!(
                f,
                "{}:{:08X}: CRC mismatch, expected 0x{:08x}, calculated 0x{:08x}",
                chunk_type, offset, expected, calculated
            ),
            PngError::TruncatedStream { offset } => write!(f, "{:08X}: unexpected end of stream", offset),
            PngError::Structural { chunk_type, offset, reason } => {
                write!(f, "{}:{:08X}: {}", chunk_type, offset, reason)
            }
            PngError::HeaderValidation { offset, reason } => write!(f, "IHDR:{:08X}: {}", offset, reason),
            PngError::FrameValidation { offset: Some(offset), reason } => write!(f, "{:08X}: {}", offset, reason),
            PngError::FrameValidation { offset: None, reason } => write!(f, "{}", reason),
            PngError::FrameCountMismatch { declared, frame_controls, payloads } => write!(
                f,
                "acTL declares {} frames, found {} frame controls and {} frame payloads",
                declared, frame_controls, payloads
            ),
            PngError::MissingData => write!(f, "no image data chunks"),
            PngError::Decompression(msg) => write!(f, "Decompression failed: {}", msg),
            PngError::LimitsExceeded(msg) => write!(f, "Limits exceeded: {}", msg),
            PngError::Cancelled => write!(f, "Decoding was cancelled"),
        }
    }
}

impl From<io::Error> for PngError {
    fn from(error: io::Error) -> Self {
        PngError::IoError(error)
    }
}

// Result type alias for decoder operations
pub type PngResult<T> = Result<T, PngError>;
