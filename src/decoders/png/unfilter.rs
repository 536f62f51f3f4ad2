use crate::utils::error::{FrameReason, PngError, PngResult};

use super::types::FilterType;

/// Bytes per complete scanline, filter byte excluded.
pub fn stride(width: u32, bits_per_pixel: usize) -> usize {
    (width as usize * bits_per_pixel + 7) / 8
}

/// Size of the filtered data for a `width` x `height` rectangle.
pub fn filtered_len(width: u32, height: u32, bits_per_pixel: usize) -> usize {
    (stride(width, bits_per_pixel) + 1) * height as usize
}

/// Picks whichever of left (`a`), up (`b`) and upper-left (`c`) is closest
/// to `a + b - c`, preferring `a`, then `b`.
pub fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a = a as i16;
    let b = b as i16;
    let c = c as i16;

    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();

    if pa <= pb && pa <= pc {
        a as u8
    } else if pb <= pc {
        b as u8
    } else {
        c as u8
    }
}

/// Reconstructed byte `left` bytes to the left and `up` rows above
/// (`row`, `i`). Anything outside the rectangle reads as zero.
#[inline]
fn neighbor(out: &[u8], stride: usize, row: usize, i: usize, left: usize, up: usize) -> u8 {
    if i < left || row < up {
        return 0;
    }

    out[(row - up) * stride + i - left]
}

/// Reverses the per-scanline filters of one frame rectangle.
///
/// `data` is the inflated stream: every row is a filter type byte followed
/// by `stride` filtered bytes. The returned buffer holds `height` rows of
/// raw samples with the filter bytes removed.
pub fn unfilter_scanlines(data: &[u8], width: u32, height: u32, bits_per_pixel: usize) -> PngResult<Vec<u8>> {
    let stride = stride(width, bits_per_pixel);
    let bpp = ((bits_per_pixel + 7) / 8).max(1);
    let expected = filtered_len(width, height, bits_per_pixel);

    if data.len() < expected {
        return Err(PngError::Decompression(format!(
            "image data is {} bytes, expected {}",
            data.len(),
            expected
        )));
    }

    let mut out = vec![0u8; stride * height as usize];

    for (row, scanline) in data[..expected].chunks_exact(stride + 1).enumerate() {
        let filter_type = FilterType::from_u8(scanline[0]).ok_or_else(|| PngError::FrameValidation {
            offset: None,
            reason: FrameReason::InvalidFilterType(scanline[0]),
        })?;

        let filtered = &scanline[1..];
        let row_start = row * stride;

        for (i, &byte) in filtered.iter().enumerate() {
            let predicted = match filter_type {
                FilterType::None => 0,
                FilterType::Sub => neighbor(&out, stride, row, i, bpp, 0),
                FilterType::Up => neighbor(&out, stride, row, i, 0, 1),
                FilterType::Average => {
                    let left = neighbor(&out, stride, row, i, bpp, 0) as u16;
                    let above = neighbor(&out, stride, row, i, 0, 1) as u16;
                    ((left + above) / 2) as u8
                }
                FilterType::Paeth => paeth_predictor(
                    neighbor(&out, stride, row, i, bpp, 0),
                    neighbor(&out, stride, row, i, 0, 1),
                    neighbor(&out, stride, row, i, bpp, 1),
                ),
            };

            out[row_start + i] = byte.wrapping_add(predicted);
        }
    }

    Ok(out)
}
