use log::{debug, warn};

use crate::utils::error::{FrameReason, PngError, PngResult, StructuralReason};
use crate::utils::options::Limits;
use crate::utils::reader::be_u32;

use super::chunk::{Chunk, ChunkType};
use super::types::{decode_palette, AnimationControl, ColorType, FrameControl, ImageHeader, Transparency};

/// Whether the scan should keep pulling chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    End,
}

/// Everything the validator collected from one well-formed stream.
#[derive(Debug, Clone)]
pub struct ParsedPng {
    pub header: ImageHeader,
    pub palette: Option<Vec<[u8; 3]>>,
    pub transparency: Option<Transparency>,
    pub animation: Option<AnimationControl>,
    pub frame_controls: Vec<FrameControl>,
    /// Concatenated zlib streams. The first slot is the IDAT data, the
    /// rest come from fdAT runs.
    pub payloads: Vec<Vec<u8>>,
    /// The IDAT data is also the first animation frame.
    pub idat_is_frame: bool,
}

impl ParsedPng {
    pub fn is_animated(&self) -> bool {
        self.animation.is_some()
    }

    /// Payloads that belong to animation frames, paired one-to-one with
    /// `frame_controls`. For a still image this is the IDAT data alone.
    pub fn frame_payloads(&self) -> &[Vec<u8>] {
        if self.is_animated() && !self.idat_is_frame {
            &self.payloads[1..]
        } else {
            &self.payloads
        }
    }
}

/// Chunk-by-chunk state machine enforcing PNG and APNG ordering rules.
///
/// Feed chunks in stream order through [`accept`](Self::accept) until it
/// returns [`Flow::End`], then call [`finish`](Self::finish).
pub struct StructureValidator {
    limits: Limits,
    header: Option<ImageHeader>,
    palette: Option<Vec<[u8; 3]>>,
    transparency: Option<Transparency>,
    animation: Option<AnimationControl>,
    frame_controls: Vec<FrameControl>,
    payloads: Vec<Vec<u8>>,
    previous: Option<ChunkType>,
    next_sequence: u32,
    frame_control_open: bool,
    idat_seen: bool,
    idat_is_frame: bool,
    iend_seen: bool,
}

impl StructureValidator {
    pub fn new(limits: Limits) -> Self {
        StructureValidator {
            limits,
            header: None,
            palette: None,
            transparency: None,
            animation: None,
            frame_controls: Vec::new(),
            payloads: Vec::new(),
            previous: None,
            next_sequence: 0,
            frame_control_open: false,
            idat_seen: false,
            idat_is_frame: false,
            iend_seen: false,
        }
    }

    pub fn header(&self) -> Option<&ImageHeader> {
        self.header.as_ref()
    }

    pub fn accept(&mut self, chunk: Chunk) -> PngResult<Flow> {
        let chunk_type = chunk.chunk_type;

        if self.header.is_none() && chunk_type != ChunkType::Ihdr {
            return Err(structural(&chunk, StructuralReason::Misplaced));
        }

        match chunk_type {
            ChunkType::Ihdr => self.read_header(&chunk)?,
            ChunkType::Plte => self.read_palette(&chunk)?,
            ChunkType::Trns => self.read_transparency(&chunk)?,
            ChunkType::Actl => self.read_animation_control(&chunk)?,
            ChunkType::Fctl => self.read_frame_control(&chunk)?,
            ChunkType::Idat => self.read_image_data(chunk)?,
            ChunkType::Fdat => self.read_frame_data(chunk)?,
            ChunkType::Iend => {
                self.iend_seen = true;
                return Ok(Flow::End);
            }
            ChunkType::Other(_) if chunk_type.is_critical() => {
                return Err(structural(&chunk, StructuralReason::UnknownCritical));
            }
            ChunkType::Other(_) => debug!("Skipping ancillary {} chunk at {:08X}", chunk_type, chunk.offset),
        }

        self.previous = Some(chunk_type);

        Ok(Flow::Continue)
    }

    /// Runs the whole-stream checks and hands back the collected data.
    /// `end_offset` is where the scan stopped and is used to locate
    /// missing-chunk errors.
    pub fn finish(self, end_offset: u64) -> PngResult<ParsedPng> {
        let missing = |chunk_type| PngError::Structural {
            chunk_type,
            offset: end_offset,
            reason: StructuralReason::MissingChunk,
        };

        let header = self.header.ok_or_else(|| missing(ChunkType::Ihdr))?;

        if !self.iend_seen {
            return Err(missing(ChunkType::Iend));
        }

        if header.color_type == ColorType::Indexed && self.palette.is_none() {
            return Err(missing(ChunkType::Plte));
        }

        if let Some(animation) = &self.animation {
            let default_images = if self.idat_is_frame { 0 } else { 1 };
            let frame_payloads = self.payloads.len().checked_sub(default_images);

            if animation.num_frames as usize != self.frame_controls.len()
                || frame_payloads != Some(animation.num_frames as usize)
            {
                return Err(PngError::FrameCountMismatch {
                    declared: animation.num_frames,
                    frame_controls: self.frame_controls.len(),
                    payloads: frame_payloads.unwrap_or(0),
                });
            }
        }

        if self.payloads.is_empty() {
            return Err(PngError::MissingData);
        }

        Ok(ParsedPng {
            header,
            palette: self.palette,
            transparency: self.transparency,
            animation: self.animation,
            frame_controls: self.frame_controls,
            payloads: self.payloads,
            idat_is_frame: self.idat_is_frame,
        })
    }

    fn read_header(&mut self, chunk: &Chunk) -> PngResult<()> {
        if self.header.is_some() {
            return Err(structural(chunk, StructuralReason::Duplicate));
        }

        let header = ImageHeader::from_chunk(chunk)?;
        self.limits.check_dimensions(header.width, header.height)?;

        debug!(
            "IHDR: {}x{}, {:?} at {} bits, {:?}",
            header.width, header.height, header.color_type, header.bit_depth, header.interlace
        );

        self.header = Some(header);

        Ok(())
    }

    fn read_palette(&mut self, chunk: &Chunk) -> PngResult<()> {
        if self.palette.is_some() {
            return Err(structural(chunk, StructuralReason::Duplicate));
        }

        if self.idat_seen {
            return Err(structural(chunk, StructuralReason::Misplaced));
        }

        let header = self.require_header(chunk)?;

        if matches!(header.color_type, ColorType::Grayscale | ColorType::GrayscaleAlpha) {
            return Err(structural(chunk, StructuralReason::Forbidden));
        }

        let palette = decode_palette(chunk, header)?;
        debug!("PLTE: {} entries", palette.len());
        self.palette = Some(palette);

        Ok(())
    }

    fn read_transparency(&mut self, chunk: &Chunk) -> PngResult<()> {
        if self.transparency.is_some() {
            return Err(structural(chunk, StructuralReason::Duplicate));
        }

        let header = self.require_header(chunk)?;

        if self.idat_seen || (header.color_type == ColorType::Indexed && self.palette.is_none()) {
            return Err(structural(chunk, StructuralReason::Misplaced));
        }

        let transparency = Transparency::from_chunk(chunk, header, self.palette.as_deref())?;
        self.transparency = Some(transparency);

        Ok(())
    }

    fn read_animation_control(&mut self, chunk: &Chunk) -> PngResult<()> {
        if self.animation.is_some() {
            return Err(structural(chunk, StructuralReason::Duplicate));
        }

        if self.idat_seen {
            return Err(structural(chunk, StructuralReason::Misplaced));
        }

        let animation = AnimationControl::from_chunk(chunk)?;
        debug!("acTL: {} frames, {} plays", animation.num_frames, animation.num_plays);
        self.animation = Some(animation);

        Ok(())
    }

    fn read_frame_control(&mut self, chunk: &Chunk) -> PngResult<()> {
        if self.animation.is_none() {
            return Err(structural(chunk, StructuralReason::MissingAnimationControl));
        }

        if self.frame_control_open {
            return Err(structural(chunk, StructuralReason::ConsecutiveFrameControl));
        }

        let frame_control = FrameControl::from_chunk(chunk)?;
        self.check_sequence(chunk, frame_control.sequence_number)?;

        let header = self.require_header(chunk)?;
        let (width, height) = (header.width, header.height);

        if !frame_control.fits_within(width, height) {
            return Err(PngError::FrameValidation {
                offset: Some(chunk.offset),
                reason: FrameReason::InvalidRegion {
                    x_offset: frame_control.x_offset,
                    y_offset: frame_control.y_offset,
                    width: frame_control.width,
                    height: frame_control.height,
                },
            });
        }

        if self.frame_controls.is_empty() && !self.idat_seen && !frame_control.covers_canvas(width, height) {
            return Err(PngError::FrameValidation {
                offset: Some(chunk.offset),
                reason: FrameReason::FirstFrameNotFullCanvas,
            });
        }

        debug!(
            "fcTL #{}: {}x{}+{}+{}, {} ms, {:?}/{:?}",
            frame_control.sequence_number,
            frame_control.width,
            frame_control.height,
            frame_control.x_offset,
            frame_control.y_offset,
            frame_control.delay_ms(),
            frame_control.dispose_op,
            frame_control.blend_op
        );

        self.frame_controls.push(frame_control);
        self.frame_control_open = true;

        Ok(())
    }

    fn read_image_data(&mut self, chunk: Chunk) -> PngResult<()> {
        if self.previous == Some(ChunkType::Idat) {
            if let Some(payload) = self.payloads.last_mut() {
                payload.extend_from_slice(&chunk.data);
            }
            return Ok(());
        }

        if !self.payloads.is_empty() {
            return Err(structural(&chunk, StructuralReason::NonContinuous));
        }

        if self.animation.is_some() {
            self.idat_is_frame = self.frame_controls.len() == 1;
            self.frame_control_open = false;
        }

        self.idat_seen = true;
        self.payloads.push(chunk.data);

        Ok(())
    }

    fn read_frame_data(&mut self, chunk: Chunk) -> PngResult<()> {
        if self.animation.is_none() {
            return Err(structural(&chunk, StructuralReason::MissingAnimationControl));
        }

        let continues_run = self.previous == Some(ChunkType::Fdat);

        if !self.frame_control_open && !continues_run {
            return Err(structural(&chunk, StructuralReason::MissingFrameControl));
        }

        let sequence_number = be_u32(&chunk.data, 0).ok_or_else(|| {
            structural(&chunk, StructuralReason::InvalidPayload("fdAT is shorter than 4 bytes".into()))
        })?;
        self.check_sequence(&chunk, sequence_number)?;

        if !self.idat_seen {
            warn!("fdAT at {:08X} precedes the default image", chunk.offset);
        }

        let mut data = chunk.data;
        data.drain(..4);

        match self.payloads.last_mut() {
            Some(payload) if continues_run => payload.extend_from_slice(&data),
            _ => self.payloads.push(data),
        }

        self.frame_control_open = false;

        Ok(())
    }

    fn check_sequence(&mut self, chunk: &Chunk, found: u32) -> PngResult<()> {
        if found != self.next_sequence {
            return Err(PngError::FrameValidation {
                offset: Some(chunk.offset),
                reason: FrameReason::SequenceNumber {
                    expected: self.next_sequence,
                    found,
                },
            });
        }

        self.next_sequence += 1;

        Ok(())
    }

    fn require_header(&self, chunk: &Chunk) -> PngResult<&ImageHeader> {
        self.header
            .as_ref()
            .ok_or_else(|| structural(chunk, StructuralReason::Misplaced))
    }
}

fn structural(chunk: &Chunk, reason: StructuralReason) -> PngError {
    PngError::Structural {
        chunk_type: chunk.chunk_type,
        offset: chunk.offset,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stream {
        offset: u64,
        sequence: u32,
        chunks: Vec<Chunk>,
    }

    impl Stream {
        fn new() -> Self {
            Stream {
                offset: 8,
                sequence: 0,
                chunks: Vec::new(),
            }
        }

        fn push(mut self, chunk_type: ChunkType, data: Vec<u8>) -> Self {
            let length = data.len() as u64;
            self.chunks.push(Chunk {
                chunk_type,
                data,
                offset: self.offset,
            });
            self.offset += 12 + length;
            self
        }

        fn ihdr(self, width: u32, height: u32, color_type: u8, bit_depth: u8) -> Self {
            let mut data = Vec::new();
            data.extend_from_slice(&width.to_be_bytes());
            data.extend_from_slice(&height.to_be_bytes());
            data.extend_from_slice(&[bit_depth, color_type, 0, 0, 0]);
            self.push(ChunkType::Ihdr, data)
        }

        fn actl(self, num_frames: u32) -> Self {
            let mut data = num_frames.to_be_bytes().to_vec();
            data.extend_from_slice(&0u32.to_be_bytes());
            self.push(ChunkType::Actl, data)
        }

        fn fctl(mut self, width: u32, height: u32, x: u32, y: u32) -> Self {
            let mut data = Vec::new();
            for value in [self.sequence, width, height, x, y] {
                data.extend_from_slice(&value.to_be_bytes());
            }
            data.extend_from_slice(&[0, 1, 0, 10, 0, 0]);
            self.sequence += 1;
            self.push(ChunkType::Fctl, data)
        }

        fn idat(self, data: &[u8]) -> Self {
            self.push(ChunkType::Idat, data.to_vec())
        }

        fn fdat(mut self, data: &[u8]) -> Self {
            let mut payload = self.sequence.to_be_bytes().to_vec();
            payload.extend_from_slice(data);
            self.sequence += 1;
            self.push(ChunkType::Fdat, payload)
        }

        fn iend(self) -> Self {
            self.push(ChunkType::Iend, Vec::new())
        }

        fn validate(self) -> PngResult<ParsedPng> {
            let mut validator = StructureValidator::new(Limits::default());

            for chunk in self.chunks {
                if validator.accept(chunk)? == Flow::End {
                    break;
                }
            }

            validator.finish(self.offset)
        }
    }

    #[test]
    fn still_image_has_one_payload() -> PngResult<()> {
        let parsed = Stream::new().ihdr(2, 2, 6, 8).idat(&[1, 2]).idat(&[3]).iend().validate()?;

        assert!(!parsed.is_animated());
        assert_eq!(parsed.payloads, vec![vec![1, 2, 3]]);
        assert_eq!(parsed.frame_payloads().len(), 1);

        Ok(())
    }

    #[test]
    fn idat_after_frame_control_is_first_frame() -> PngResult<()> {
        let parsed = Stream::new()
            .ihdr(4, 4, 6, 8)
            .actl(2)
            .fctl(4, 4, 0, 0)
            .idat(&[1])
            .fctl(2, 2, 1, 1)
            .fdat(&[2])
            .iend()
            .validate()?;

        assert!(parsed.idat_is_frame);
        assert_eq!(parsed.frame_controls.len(), 2);
        assert_eq!(parsed.frame_payloads(), &[vec![1u8], vec![2u8]]);

        Ok(())
    }

    #[test]
    fn hidden_default_image_is_not_a_frame() -> PngResult<()> {
        let parsed = Stream::new()
            .ihdr(4, 4, 6, 8)
            .actl(1)
            .idat(&[9])
            .fctl(4, 4, 0, 0)
            .fdat(&[1])
            .fdat(&[2])
            .iend()
            .validate()?;

        assert!(!parsed.idat_is_frame);
        assert_eq!(parsed.frame_payloads(), &[vec![1u8, 2]]);

        Ok(())
    }

    #[test]
    fn second_ihdr_is_duplicate() {
        let result = Stream::new().ihdr(1, 1, 6, 8).ihdr(1, 1, 6, 8).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural {
                chunk_type: ChunkType::Ihdr,
                offset: 33,
                reason: StructuralReason::Duplicate,
            })
        ));
    }

    #[test]
    fn first_chunk_must_be_header() {
        let result = Stream::new().idat(&[0]).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { chunk_type: ChunkType::Idat, reason: StructuralReason::Misplaced, .. })
        ));
    }

    #[test]
    fn consecutive_frame_controls_are_rejected() {
        let result = Stream::new().ihdr(4, 4, 6, 8).actl(1).fctl(4, 4, 0, 0).fctl(4, 4, 0, 0).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { reason: StructuralReason::ConsecutiveFrameControl, .. })
        ));
    }

    #[test]
    fn sequence_numbers_must_increase_by_one() {
        let mut stream = Stream::new().ihdr(4, 4, 6, 8).actl(2).fctl(4, 4, 0, 0).idat(&[0]);
        stream.sequence = 5;
        let result = stream.fctl(4, 4, 0, 0).validate();

        assert!(matches!(
            result,
            Err(PngError::FrameValidation {
                reason: FrameReason::SequenceNumber { expected: 1, found: 5 },
                ..
            })
        ));
    }

    #[test]
    fn frame_data_needs_frame_control() {
        let result = Stream::new().ihdr(4, 4, 6, 8).actl(1).idat(&[0]).fdat(&[1]).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { reason: StructuralReason::MissingFrameControl, .. })
        ));
    }

    #[test]
    fn split_image_data_is_non_continuous() {
        let result = Stream::new()
            .ihdr(1, 1, 6, 8)
            .idat(&[0])
            .push(ChunkType::Other(*b"tEXt"), b"a\0b".to_vec())
            .idat(&[0])
            .validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { reason: StructuralReason::NonContinuous, .. })
        ));
    }

    #[test]
    fn first_frame_must_cover_canvas() {
        let result = Stream::new().ihdr(4, 4, 6, 8).actl(1).fctl(2, 2, 0, 0).validate();

        assert!(matches!(
            result,
            Err(PngError::FrameValidation { reason: FrameReason::FirstFrameNotFullCanvas, .. })
        ));
    }

    #[test]
    fn frame_outside_canvas_is_rejected() {
        let result = Stream::new()
            .ihdr(4, 4, 6, 8)
            .actl(2)
            .fctl(4, 4, 0, 0)
            .idat(&[0])
            .fctl(2, 2, 3, 0)
            .validate();

        assert!(matches!(
            result,
            Err(PngError::FrameValidation { reason: FrameReason::InvalidRegion { x_offset: 3, .. }, .. })
        ));
    }

    #[test]
    fn declared_frame_count_must_match() {
        let result = Stream::new()
            .ihdr(4, 4, 6, 8)
            .actl(3)
            .fctl(4, 4, 0, 0)
            .idat(&[0])
            .fctl(4, 4, 0, 0)
            .fdat(&[1])
            .iend()
            .validate();

        assert!(matches!(
            result,
            Err(PngError::FrameCountMismatch { declared: 3, frame_controls: 2, payloads: 2 })
        ));
    }

    #[test]
    fn frame_count_is_checked_before_missing_data() {
        let result = Stream::new().ihdr(4, 4, 6, 8).actl(1).iend().validate();

        assert!(matches!(result, Err(PngError::FrameCountMismatch { declared: 1, .. })));
    }

    #[test]
    fn no_image_data_is_missing_data() {
        let result = Stream::new().ihdr(4, 4, 6, 8).iend().validate();

        assert!(matches!(result, Err(PngError::MissingData)));
    }

    #[test]
    fn missing_iend_is_reported() {
        let result = Stream::new().ihdr(1, 1, 6, 8).idat(&[0]).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { chunk_type: ChunkType::Iend, reason: StructuralReason::MissingChunk, .. })
        ));
    }

    #[test]
    fn indexed_needs_palette() {
        let result = Stream::new().ihdr(1, 1, 3, 8).idat(&[0]).iend().validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { chunk_type: ChunkType::Plte, reason: StructuralReason::MissingChunk, .. })
        ));
    }

    #[test]
    fn palette_is_forbidden_for_grayscale() {
        let result = Stream::new().ihdr(1, 1, 0, 8).push(ChunkType::Plte, vec![0, 0, 0]).validate();

        assert!(matches!(result, Err(PngError::Structural { reason: StructuralReason::Forbidden, .. })));
    }

    #[test]
    fn unknown_critical_chunk_is_rejected() {
        let result = Stream::new().ihdr(1, 1, 6, 8).push(ChunkType::Other(*b"ZZZZ"), Vec::new()).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { reason: StructuralReason::UnknownCritical, .. })
        ));
    }

    #[test]
    fn frame_control_without_animation_control() {
        let result = Stream::new().ihdr(4, 4, 6, 8).fctl(4, 4, 0, 0).validate();

        assert!(matches!(
            result,
            Err(PngError::Structural { reason: StructuralReason::MissingAnimationControl, .. })
        ));
    }

    #[test]
    fn header_respects_dimension_limits() {
        let mut validator = StructureValidator::new(Limits {
            max_image_width: Some(2),
            ..Limits::default()
        });
        let stream = Stream::new().ihdr(3, 1, 6, 8);

        let result = stream.chunks.into_iter().try_for_each(|chunk| validator.accept(chunk).map(|_| ()));

        assert!(matches!(result, Err(PngError::LimitsExceeded(_))));
    }
}
