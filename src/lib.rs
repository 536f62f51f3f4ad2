mod compositor;
mod decoders;
mod utils;

pub use compositor::{CompositedFrame, DisposalTiming, FrameCompositor, Playback};
pub use decoders::png::chunk::{chunk_crc, Chunk, ChunkReader, ChunkType, PNG_SIGNATURE};
pub use decoders::png::types::{
    AnimationControl, BlendOp, ColorType, DisposeOp, FilterType, FrameControl, ImageHeader, InterlaceMethod,
    Transparency,
};
pub use decoders::png::unfilter::{paeth_predictor, unfilter_scanlines};
pub use decoders::png::validator::{Flow, ParsedPng, StructureValidator};
pub use decoders::png::{PngDecoder, PngInfo};
pub use utils::error::{FrameReason, HeaderReason, PngError, PngResult, StructuralReason};
pub use utils::image::{Image, ImageFrame};
pub use utils::logger::Logger;
pub use utils::options::{CancellationToken, DecodeOptions, Limits};
pub use utils::reader::ByteReader;
pub use utils::writer::{OutputFormat, Writer};

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Entry point for decoding one PNG or APNG source.
pub struct PngFrames<R: Read + Seek> {
    decoder: PngDecoder<R>,
}

impl PngFrames<File> {
    pub fn open<P: AsRef<Path>>(path: P) -> PngResult<PngFrames<BufReader<File>>> {
        let file = File::open(path)?;
        PngFrames::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> PngFrames<R> {
    /// Checks the signature and rewinds, so the decoder sees the whole
    /// stream.
    pub fn new(reader: R) -> PngResult<PngFrames<R>> {
        Self::with_options(reader, DecodeOptions::default())
    }

    pub fn with_options(mut reader: R, options: DecodeOptions) -> PngResult<PngFrames<R>> {
        if !PngFrames::is_png(&mut reader)? {
            return Err(PngError::UnsupportedFormat("missing PNG signature".to_string()));
        }

        Ok(PngFrames {
            decoder: PngDecoder::with_options(reader, options),
        })
    }

    pub fn decode(&mut self) -> PngResult<Image> {
        self.decoder.decode()
    }

    /// Header, palette and animation metadata. `None` until the stream has
    /// been read by [`decode`](Self::decode).
    pub fn info(&self) -> Option<PngInfo> {
        self.decoder.info()
    }

    pub fn decoder(&mut self) -> &mut PngDecoder<R> {
        &mut self.decoder
    }

    fn is_png(reader: &mut R) -> PngResult<bool> {
        let start = reader.stream_position()?;
        let mut header = [0u8; 8];
        let mut filled = 0;

        while filled < header.len() {
            match reader.read(&mut header[filled..])? {
                0 => break,
                n => filled += n,
            }
        }

        reader.seek(SeekFrom::Start(start))?;

        Ok(filled == header.len() && header == PNG_SIGNATURE)
    }
}
