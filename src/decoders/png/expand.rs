use crate::utils::error::{FrameReason, PngError, PngResult};

use super::types::{ColorType, ImageHeader, Transparency};
use super::unfilter::stride;

/// Reads sample number `index` of a raw scanline at the given bit depth.
fn sample(row: &[u8], index: usize, bit_depth: u8) -> u16 {
    match bit_depth {
        16 => u16::from_be_bytes([row[index * 2], row[index * 2 + 1]]),
        8 => row[index] as u16,
        _ => {
            let bits = bit_depth as usize;
            let bit_offset = index * bits;
            let shift = 8 - bits - bit_offset % 8;
            let mask = (1u16 << bits) - 1;

            (row[bit_offset / 8] as u16 >> shift) & mask
        }
    }
}

/// Scales a sample of `bit_depth` bits to 0..=255. Wide samples keep their
/// high byte.
fn to_u8(value: u16, bit_depth: u8) -> u8 {
    match bit_depth {
        16 => (value >> 8) as u8,
        8 => value as u8,
        _ => (value * 255 / ((1u16 << bit_depth) - 1)) as u8,
    }
}

/// Converts unfiltered samples of any PNG color type into RGBA8.
///
/// `raw` holds `height` rows of `stride(width, bits_per_pixel)` bytes. Color
/// types without alpha come out opaque unless a tRNS key matches.
pub fn expand_to_rgba(
    raw: &[u8],
    width: u32,
    height: u32,
    header: &ImageHeader,
    palette: Option<&[[u8; 3]]>,
    transparency: Option<&Transparency>,
) -> PngResult<Vec<u8>> {
    let bit_depth = header.bit_depth;
    let row_len = stride(width, header.bits_per_pixel());
    let mut output = Vec::with_capacity(width as usize * height as usize * 4);

    for row in raw.chunks_exact(row_len).take(height as usize) {
        for x in 0..width as usize {
            let pixel = match header.color_type {
                ColorType::Rgb => {
                    let r = sample(row, x * 3, bit_depth);
                    let g = sample(row, x * 3 + 1, bit_depth);
                    let b = sample(row, x * 3 + 2, bit_depth);
                    let alpha = match transparency {
                        Some(Transparency::Rgb(kr, kg, kb)) if (r, g, b) == (*kr, *kg, *kb) => 0,
                        _ => 255,
                    };

                    [to_u8(r, bit_depth), to_u8(g, bit_depth), to_u8(b, bit_depth), alpha]
                }
                ColorType::Rgba => [
                    to_u8(sample(row, x * 4, bit_depth), bit_depth),
                    to_u8(sample(row, x * 4 + 1, bit_depth), bit_depth),
                    to_u8(sample(row, x * 4 + 2, bit_depth), bit_depth),
                    to_u8(sample(row, x * 4 + 3, bit_depth), bit_depth),
                ],
                ColorType::Grayscale => {
                    let value = sample(row, x, bit_depth);
                    let gray = to_u8(value, bit_depth);
                    let alpha = match transparency {
                        Some(Transparency::Grayscale(key)) if value == *key => 0,
                        _ => 255,
                    };

                    [gray, gray, gray, alpha]
                }
                ColorType::GrayscaleAlpha => {
                    let gray = to_u8(sample(row, x * 2, bit_depth), bit_depth);
                    let alpha = to_u8(sample(row, x * 2 + 1, bit_depth), bit_depth);

                    [gray, gray, gray, alpha]
                }
                ColorType::Indexed => {
                    let index = sample(row, x, bit_depth) as usize;
                    let [r, g, b] = palette
                        .and_then(|p| p.get(index))
                        .copied()
                        .ok_or_else(|| PngError::FrameValidation {
                            offset: None,
                            reason: FrameReason::PaletteIndex(index as u8),
                        })?;
                    let alpha = match transparency {
                        Some(Transparency::Palette(alphas)) => alphas.get(index).copied().unwrap_or(255),
                        _ => 255,
                    };

                    [r, g, b, alpha]
                }
            };

            output.extend_from_slice(&pixel);
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::png::types::InterlaceMethod;

    fn header(color_type: ColorType, bit_depth: u8) -> ImageHeader {
        ImageHeader {
            width: 2,
            height: 1,
            bit_depth,
            color_type,
            compression_method: 0,
            filter_method: 0,
            interlace: InterlaceMethod::None,
        }
    }

    #[test]
    fn rgb_gets_opaque_alpha() -> PngResult<()> {
        let out = expand_to_rgba(&[1, 2, 3, 4, 5, 6], 2, 1, &header(ColorType::Rgb, 8), None, None)?;

        assert_eq!(out, vec![1, 2, 3, 255, 4, 5, 6, 255]);

        Ok(())
    }

    #[test]
    fn rgb_color_key_becomes_transparent() -> PngResult<()> {
        let key = Transparency::Rgb(4, 5, 6);
        let out = expand_to_rgba(&[1, 2, 3, 4, 5, 6], 2, 1, &header(ColorType::Rgb, 8), None, Some(&key))?;

        assert_eq!(out, vec![1, 2, 3, 255, 4, 5, 6, 0]);

        Ok(())
    }

    #[test]
    fn sixteen_bit_keeps_high_byte() -> PngResult<()> {
        let raw = [0x12, 0x34, 0xAB, 0xCD, 0xFF, 0x00, 0x80, 0x01];
        let out = expand_to_rgba(&raw, 1, 1, &header(ColorType::Rgba, 16), None, None)?;

        assert_eq!(out, vec![0x12, 0xAB, 0xFF, 0x80]);

        Ok(())
    }

    #[test]
    fn two_bit_gray_scales_to_full_range() -> PngResult<()> {
        let out = expand_to_rgba(&[0b1101_0000], 2, 1, &header(ColorType::Grayscale, 2), None, None)?;

        assert_eq!(out, vec![255, 255, 255, 255, 85, 85, 85, 255]);

        Ok(())
    }

    #[test]
    fn indexed_uses_palette_and_alpha_table() -> PngResult<()> {
        let palette = [[10, 20, 30], [40, 50, 60]];
        let alphas = Transparency::Palette(vec![128]);
        let indexed = header(ColorType::Indexed, 1);
        let out = expand_to_rgba(&[0b1000_0000], 2, 1, &indexed, Some(&palette[..]), Some(&alphas))?;

        assert_eq!(out, vec![40, 50, 60, 255, 10, 20, 30, 128]);

        Ok(())
    }

    #[test]
    fn out_of_range_index_fails() {
        let palette = [[10, 20, 30]];
        let result = expand_to_rgba(&[0, 5], 2, 1, &header(ColorType::Indexed, 8), Some(&palette[..]), None);

        assert!(matches!(
            result,
            Err(PngError::FrameValidation { reason: FrameReason::PaletteIndex(5), .. })
        ));
    }
}
