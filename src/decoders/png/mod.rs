pub mod adam7;
pub mod chunk;
pub mod expand;
pub mod types;
pub mod unfilter;
pub mod validator;

use std::io::{self, Read};

use flate2::read::ZlibDecoder;
use log::{debug, info, warn};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::utils::error::{PngError, PngResult};
use crate::utils::image::{Image, ImageFrame};
use crate::utils::options::DecodeOptions;
use crate::utils::reader::ByteReader;

use chunk::ChunkReader;
use types::{AnimationControl, BlendOp, DisposeOp, FrameControl, ImageHeader, InterlaceMethod, Transparency};
use validator::{Flow, ParsedPng, StructureValidator};

/// How much inflated data past the frame is read while looking for the end
/// of the zlib stream.
const MAX_SURPLUS_BYTES: u64 = 64 * 1024;

/// Metadata of a scanned PNG, available once the chunk stream has been
/// validated.
#[derive(Debug, Clone)]
pub struct PngInfo {
    pub header: ImageHeader,
    pub palette_size: Option<usize>,
    pub transparency: Option<Transparency>,
    pub animation: Option<AnimationControl>,
    pub frame_controls: Vec<FrameControl>,
    pub idat_is_frame: bool,
}

/// Work item for one frame: where it goes and the zlib stream holding it.
struct FrameJob<'a> {
    x_offset: u32,
    y_offset: u32,
    width: u32,
    height: u32,
    delay: u32,
    dispose_op: DisposeOp,
    blend_op: BlendOp,
    payload: &'a [u8],
}

pub struct PngDecoder<R: Read> {
    reader: ChunkReader<R>,
    options: DecodeOptions,
    parsed: Option<ParsedPng>,
}

impl<R: Read> PngDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, DecodeOptions::default())
    }

    pub fn with_options(reader: R, options: DecodeOptions) -> Self {
        let reader = ChunkReader::new(ByteReader::new(reader)).with_max_length(options.limits.max_alloc);

        PngDecoder {
            reader,
            options,
            parsed: None,
        }
    }

    /// Canvas width, or 0 before the stream has been read.
    pub fn width(&self) -> u32 {
        self.parsed.as_ref().map(|p| p.header.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.parsed.as_ref().map(|p| p.header.height).unwrap_or(0)
    }

    pub fn info(&self) -> Option<PngInfo> {
        self.parsed.as_ref().map(|parsed| PngInfo {
            header: parsed.header.clone(),
            palette_size: parsed.palette.as_ref().map(|p| p.len()),
            transparency: parsed.transparency.clone(),
            animation: parsed.animation.clone(),
            frame_controls: parsed.frame_controls.clone(),
            idat_is_frame: parsed.idat_is_frame,
        })
    }

    /// Reads and validates every chunk up to IEND without inflating
    /// anything. Later calls reuse the first result.
    pub fn read_info(&mut self) -> PngResult<&ParsedPng> {
        if self.parsed.is_none() {
            let parsed = self.scan()?;
            self.parsed = Some(parsed);
        }

        self.parsed.as_ref().ok_or(PngError::MissingData)
    }

    fn scan(&mut self) -> PngResult<ParsedPng> {
        self.options.cancel.check()?;
        self.reader.read_signature()?;

        let mut validator = StructureValidator::new(self.options.limits.clone());

        loop {
            self.options.cancel.check()?;

            match self.reader.next_chunk()? {
                Some(chunk) => {
                    if validator.accept(chunk)? == Flow::End {
                        break;
                    }
                }
                None => break,
            }
        }

        validator.finish(self.reader.position())
    }

    /// Decodes every frame into RGBA8. Frames keep their own rectangles;
    /// use [`Image::composite`] for full-canvas output.
    pub fn decode(&mut self) -> PngResult<Image> {
        self.read_info()?;

        let parsed = self.parsed.as_ref().ok_or(PngError::MissingData)?;
        let options = &self.options;
        let header = &parsed.header;
        let jobs = frame_jobs(parsed);

        // Frame rectangles plus the compositor's canvas and snapshot.
        let frame_bytes: u64 = jobs.iter().map(|job| job.width as u64 * job.height as u64 * 4).sum();
        let canvas_bytes = header.width as u64 * header.height as u64 * 4;
        options.limits.check_alloc(frame_bytes.saturating_add(2 * canvas_bytes))?;

        #[cfg(feature = "rayon")]
        let frames = jobs
            .par_iter()
            .map(|job| decode_frame(parsed, options, job))
            .collect::<PngResult<Vec<_>>>()?;

        #[cfg(not(feature = "rayon"))]
        let frames = jobs
            .iter()
            .map(|job| decode_frame(parsed, options, job))
            .collect::<PngResult<Vec<_>>>()?;

        let loop_count = parsed.animation.as_ref().map(|a| a.num_plays).unwrap_or(0);

        info!(
            "Decoded {}x{} PNG, {} frame(s), loop count {}",
            header.width,
            header.height,
            frames.len(),
            loop_count
        );

        Ok(Image::new(header.width, header.height, loop_count, frames))
    }
}

/// Inflates, unfilters and expands one frame. Called from rayon workers
/// when the `rayon` feature is on.
fn decode_frame(parsed: &ParsedPng, options: &DecodeOptions, job: &FrameJob) -> PngResult<ImageFrame> {
    options.cancel.check()?;

    let header = &parsed.header;
    let bits_per_pixel = header.bits_per_pixel();
    let expected = match header.interlace {
        InterlaceMethod::None => unfilter::filtered_len(job.width, job.height, bits_per_pixel),
        InterlaceMethod::Adam7 => adam7::interlaced_len(job.width, job.height, bits_per_pixel),
    };

    options.limits.check_alloc(expected as u64)?;

    let decompression = |e: io::Error| PngError::Decompression(e.to_string());
    let mut inflated = Vec::with_capacity(expected);
    let mut zlib = ZlibDecoder::new(job.payload);

    zlib.by_ref().take(expected as u64).read_to_end(&mut inflated).map_err(decompression)?;

    // Run on to the end of the stream so the Adler-32 trailer is verified.
    let surplus = io::copy(&mut zlib.take(MAX_SURPLUS_BYTES), &mut io::sink()).map_err(decompression)?;
    match surplus {
        0 => {}
        MAX_SURPLUS_BYTES => warn!("Frame data runs past {} surplus bytes, checksum not verified", surplus),
        _ => debug!("Ignoring {} surplus bytes of frame data", surplus),
    }

    let raw = match header.interlace {
        InterlaceMethod::None => unfilter::unfilter_scanlines(&inflated, job.width, job.height, bits_per_pixel)?,
        InterlaceMethod::Adam7 => adam7::deinterlace(&inflated, job.width, job.height, bits_per_pixel)?,
    };

    let pixels = expand::expand_to_rgba(
        &raw,
        job.width,
        job.height,
        header,
        parsed.palette.as_deref(),
        parsed.transparency.as_ref(),
    )?;

    debug!(
        "Frame {}x{}+{}+{}: {} compressed bytes, {} inflated",
        job.width,
        job.height,
        job.x_offset,
        job.y_offset,
        job.payload.len(),
        inflated.len()
    );

    Ok(ImageFrame::new(job.width, job.height, pixels, job.delay)
        .with_offset(job.x_offset, job.y_offset)
        .with_dispose_op(job.dispose_op)
        .with_blend_op(job.blend_op))
}

fn frame_jobs(parsed: &ParsedPng) -> Vec<FrameJob<'_>> {
    if !parsed.is_animated() {
        return parsed
            .payloads
            .iter()
            .take(1)
            .map(|payload| FrameJob {
                x_offset: 0,
                y_offset: 0,
                width: parsed.header.width,
                height: parsed.header.height,
                delay: 0,
                dispose_op: DisposeOp::None,
                blend_op: BlendOp::Source,
                payload,
            })
            .collect();
    }

    parsed
        .frame_controls
        .iter()
        .zip(parsed.frame_payloads())
        .map(|(fctl, payload)| FrameJob {
            x_offset: fctl.x_offset,
            y_offset: fctl.y_offset,
            width: fctl.width,
            height: fctl.height,
            delay: fctl.delay_ms(),
            dispose_op: fctl.dispose_op,
            blend_op: fctl.blend_op,
            payload,
        })
        .collect()
}
