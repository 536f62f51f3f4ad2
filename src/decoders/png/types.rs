use crate::utils::error::{FrameReason, HeaderReason, PngError, PngResult, StructuralReason};
use crate::utils::reader::{be_u16, be_u32};

use super::chunk::{Chunk, ChunkType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorType {
    Grayscale = 0,
    Rgb = 2,
    Indexed = 3,
    GrayscaleAlpha = 4,
    Rgba = 6,
}

impl ColorType {
    pub fn from_u8(value: u8) -> Option<ColorType> {
        match value {
            0 => Some(ColorType::Grayscale),
            2 => Some(ColorType::Rgb),
            3 => Some(ColorType::Indexed),
            4 => Some(ColorType::GrayscaleAlpha),
            6 => Some(ColorType::Rgba),
            _ => None,
        }
    }

    pub fn channels(&self) -> u8 {
        match self {
            ColorType::Grayscale | ColorType::Indexed => 1,
            ColorType::GrayscaleAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::Rgba => 4,
        }
    }

    pub fn allowed_bit_depths(&self) -> &'static [u8] {
        match self {
            ColorType::Grayscale => &[1, 2, 4, 8, 16],
            ColorType::Rgb => &[8, 16],
            ColorType::Indexed => &[1, 2, 4, 8],
            ColorType::GrayscaleAlpha => &[8, 16],
            ColorType::Rgba => &[8, 16],
        }
    }

    pub fn has_alpha(&self) -> bool {
        matches!(self, ColorType::GrayscaleAlpha | ColorType::Rgba)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlaceMethod {
    None = 0,
    Adam7 = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl FilterType {
    pub fn from_u8(value: u8) -> Option<FilterType> {
        match value {
            0 => Some(FilterType::None),
            1 => Some(FilterType::Sub),
            2 => Some(FilterType::Up),
            3 => Some(FilterType::Average),
            4 => Some(FilterType::Paeth),
            _ => None,
        }
    }
}

/// What happens to a frame's region once it has been shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeOp {
    None = 0,
    Background = 1,
    Previous = 2,
}

/// How a frame's pixels are combined with the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Source = 0,
    Over = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: ColorType,
    pub compression_method: u8,
    pub filter_method: u8,
    pub interlace: InterlaceMethod,
}

impl ImageHeader {
    pub fn bits_per_pixel(&self) -> usize {
        self.bit_depth as usize * self.color_type.channels() as usize
    }

    /// Decodes and validates the 13-byte IHDR payload.
    pub fn from_chunk(chunk: &Chunk) -> PngResult<ImageHeader> {
        let data = &chunk.data;
        if data.len() != 13 {
            return Err(invalid_payload(chunk, format!("IHDR must be 13 bytes, got {}", data.len())));
        }

        let invalid = |reason| PngError::HeaderValidation { offset: chunk.offset, reason };

        let width = be_u32(data, 0).unwrap_or(0);
        let height = be_u32(data, 4).unwrap_or(0);
        let bit_depth = data[8];
        let color_type = data[9];
        let compression_method = data[10];
        let filter_method = data[11];
        let interlace_method = data[12];

        if width == 0 || height == 0 {
            return Err(invalid(HeaderReason::InvalidDimensions { width, height }));
        }

        let color = ColorType::from_u8(color_type).ok_or_else(|| invalid(HeaderReason::InvalidColorType(color_type)))?;

        if !color.allowed_bit_depths().contains(&bit_depth) {
            return Err(invalid(HeaderReason::InvalidBitDepth { color_type, bit_depth }));
        }

        if compression_method != 0 {
            return Err(invalid(HeaderReason::InvalidCompressionMethod(compression_method)));
        }

        if filter_method != 0 {
            return Err(invalid(HeaderReason::InvalidFilterMethod(filter_method)));
        }

        let interlace = match interlace_method {
            0 => InterlaceMethod::None,
            1 => InterlaceMethod::Adam7,
            _ => return Err(invalid(HeaderReason::InvalidInterlaceMethod(interlace_method))),
        };

        Ok(ImageHeader {
            width,
            height,
            bit_depth,
            color_type: color,
            compression_method,
            filter_method,
            interlace,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationControl {
    pub num_frames: u32,
    /// Zero means the animation loops forever.
    pub num_plays: u32,
}

impl AnimationControl {
    pub fn from_chunk(chunk: &Chunk) -> PngResult<AnimationControl> {
        if chunk.data.len() != 8 {
            return Err(invalid_payload(chunk, format!("acTL must be 8 bytes, got {}", chunk.data.len())));
        }

        let num_frames = be_u32(&chunk.data, 0).unwrap_or(0);
        let num_plays = be_u32(&chunk.data, 4).unwrap_or(0);

        if num_frames == 0 {
            return Err(PngError::FrameValidation {
                offset: Some(chunk.offset),
                reason: FrameReason::ZeroFrames,
            });
        }

        Ok(AnimationControl { num_frames, num_plays })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameControl {
    pub sequence_number: u32,
    pub width: u32,
    pub height: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub delay_num: u16,
    /// Never zero once decoded; a stored zero becomes 100.
    pub delay_den: u16,
    pub dispose_op: DisposeOp,
    pub blend_op: BlendOp,
}

impl FrameControl {
    /// Decodes the 26-byte fcTL payload. Region checks against the canvas
    /// are left to the validator, which knows the header.
    pub fn from_chunk(chunk: &Chunk) -> PngResult<FrameControl> {
        let data = &chunk.data;
        if data.len() != 26 {
            return Err(invalid_payload(chunk, format!("fcTL must be 26 bytes, got {}", data.len())));
        }

        let invalid = |reason| PngError::FrameValidation { offset: Some(chunk.offset), reason };

        let dispose_op = match data[24] {
            0 => DisposeOp::None,
            1 => DisposeOp::Background,
            2 => DisposeOp::Previous,
            n => return Err(invalid(FrameReason::InvalidDisposeOp(n))),
        };

        let blend_op = match data[25] {
            0 => BlendOp::Source,
            1 => BlendOp::Over,
            n => return Err(invalid(FrameReason::InvalidBlendOp(n))),
        };

        let delay_den = match be_u16(data, 22).unwrap_or(0) {
            0 => 100,
            den => den,
        };

        Ok(FrameControl {
            sequence_number: be_u32(data, 0).unwrap_or(0),
            width: be_u32(data, 4).unwrap_or(0),
            height: be_u32(data, 8).unwrap_or(0),
            x_offset: be_u32(data, 12).unwrap_or(0),
            y_offset: be_u32(data, 16).unwrap_or(0),
            delay_num: be_u16(data, 20).unwrap_or(0),
            delay_den,
            dispose_op,
            blend_op,
        })
    }

    /// Display time in whole milliseconds.
    pub fn delay_ms(&self) -> u32 {
        self.delay_num as u32 * 1000 / self.delay_den.max(1) as u32
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = self.x_offset.checked_add(self.width);
        let bottom = self.y_offset.checked_add(self.height);

        self.width > 0
            && self.height > 0
            && matches!(right, Some(right) if right <= width)
            && matches!(bottom, Some(bottom) if bottom <= height)
    }

    pub fn covers_canvas(&self, width: u32, height: u32) -> bool {
        self.x_offset == 0 && self.y_offset == 0 && self.width == width && self.height == height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transparency {
    Grayscale(u16),
    Rgb(u16, u16, u16),
    Palette(Vec<u8>),
}

impl Transparency {
    pub fn from_chunk(chunk: &Chunk, header: &ImageHeader, palette: Option<&[[u8; 3]]>) -> PngResult<Transparency> {
        let data = &chunk.data;

        match header.color_type {
            ColorType::Grayscale => match be_u16(data, 0) {
                Some(value) if data.len() == 2 => Ok(Transparency::Grayscale(value)),
                _ => Err(invalid_payload(chunk, "grayscale tRNS must be 2 bytes".into())),
            },
            ColorType::Rgb => match (be_u16(data, 0), be_u16(data, 2), be_u16(data, 4)) {
                (Some(r), Some(g), Some(b)) if data.len() == 6 => Ok(Transparency::Rgb(r, g, b)),
                _ => Err(invalid_payload(chunk, "RGB tRNS must be 6 bytes".into())),
            },
            ColorType::Indexed => {
                let entries = palette.map(|p| p.len()).unwrap_or(0);
                if data.len() > entries {
                    return Err(invalid_payload(
                        chunk,
                        format!("tRNS has {} entries for a palette of {}", data.len(), entries),
                    ));
                }

                Ok(Transparency::Palette(data.clone()))
            }
            ColorType::GrayscaleAlpha | ColorType::Rgba => Err(PngError::Structural {
                chunk_type: ChunkType::Trns,
                offset: chunk.offset,
                reason: StructuralReason::Forbidden,
            }),
        }
    }
}

/// Decodes a PLTE payload into RGB triples.
pub fn decode_palette(chunk: &Chunk, header: &ImageHeader) -> PngResult<Vec<[u8; 3]>> {
    let length = chunk.data.len();
    let entries = length / 3;

    if length % 3 != 0 || entries == 0 || entries > 256 {
        return Err(invalid_payload(chunk, format!("PLTE length {} is invalid", length)));
    }

    if header.color_type == ColorType::Indexed && entries > 1 << header.bit_depth {
        return Err(invalid_payload(
            chunk,
            format!("{} palette entries exceed bit depth {}", entries, header.bit_depth),
        ));
    }

    Ok(chunk.data.chunks_exact(3).map(|rgb| [rgb[0], rgb[1], rgb[2]]).collect())
}

fn invalid_payload(chunk: &Chunk, msg: String) -> PngError {
    PngError::Structural {
        chunk_type: chunk.chunk_type,
        offset: chunk.offset,
        reason: StructuralReason::InvalidPayload(msg),
    }
}
