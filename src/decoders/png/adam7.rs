use crate::utils::error::{PngError, PngResult};

use super::unfilter::{filtered_len, stride, unfilter_scanlines};

const ADAM7_COL_START: [usize; 7] = [0, 4, 0, 2, 0, 1, 0];
const ADAM7_ROW_START: [usize; 7] = [0, 0, 4, 0, 2, 0, 1];
const ADAM7_COL_DELTA: [usize; 7] = [8, 8, 4, 4, 2, 2, 1];
const ADAM7_ROW_DELTA: [usize; 7] = [8, 8, 8, 4, 4, 2, 2];

fn pass_size(pass: usize, width: u32, height: u32) -> (usize, usize) {
    let pass_width = (width as usize + ADAM7_COL_DELTA[pass] - 1 - ADAM7_COL_START[pass]) / ADAM7_COL_DELTA[pass];
    let pass_height = (height as usize + ADAM7_ROW_DELTA[pass] - 1 - ADAM7_ROW_START[pass]) / ADAM7_ROW_DELTA[pass];

    (pass_width, pass_height)
}

/// Size of the filtered data of all seven passes together.
pub fn interlaced_len(width: u32, height: u32, bits_per_pixel: usize) -> usize {
    (0..7)
        .map(|pass| match pass_size(pass, width, height) {
            (0, _) | (_, 0) => 0,
            (pass_width, pass_height) => filtered_len(pass_width as u32, pass_height as u32, bits_per_pixel),
        })
        .sum()
}

/// Unfilters the seven reduced images and scatters them into one
/// non-interlaced buffer of `height` rows.
pub fn deinterlace(data: &[u8], width: u32, height: u32, bits_per_pixel: usize) -> PngResult<Vec<u8>> {
    let out_stride = stride(width, bits_per_pixel);
    let mut output = vec![0u8; out_stride * height as usize];
    let mut data_offset = 0;

    for pass in 0..7 {
        let (pass_width, pass_height) = pass_size(pass, width, height);

        if pass_width == 0 || pass_height == 0 {
            continue;
        }

        let pass_len = filtered_len(pass_width as u32, pass_height as u32, bits_per_pixel);
        let pass_data = data.get(data_offset..data_offset + pass_len).ok_or_else(|| {
            PngError::Decompression(format!(
                "interlace pass {} needs {} bytes past offset {}",
                pass + 1,
                pass_len,
                data_offset
            ))
        })?;

        let unfiltered = unfilter_scanlines(pass_data, pass_width as u32, pass_height as u32, bits_per_pixel)?;
        let pass_stride = stride(pass_width as u32, bits_per_pixel);

        for row in 0..pass_height {
            let out_y = row * ADAM7_ROW_DELTA[pass] + ADAM7_ROW_START[pass];
            let in_row = &unfiltered[row * pass_stride..(row + 1) * pass_stride];
            let out_row = &mut output[out_y * out_stride..(out_y + 1) * out_stride];

            for col in 0..pass_width {
                let out_x = col * ADAM7_COL_DELTA[pass] + ADAM7_COL_START[pass];

                if bits_per_pixel < 8 {
                    let pixels_per_byte = 8 / bits_per_pixel;
                    let bit_mask = ((1u16 << bits_per_pixel) - 1) as u8;

                    let in_shift = (pixels_per_byte - 1 - col % pixels_per_byte) * bits_per_pixel;
                    let sample = (in_row[col / pixels_per_byte] >> in_shift) & bit_mask;

                    let out_shift = (pixels_per_byte - 1 - out_x % pixels_per_byte) * bits_per_pixel;
                    let out_byte = &mut out_row[out_x / pixels_per_byte];
                    *out_byte &= !(bit_mask << out_shift);
                    *out_byte |= sample << out_shift;
                } else {
                    let bytes_per_pixel = bits_per_pixel / 8;
                    let in_pos = col * bytes_per_pixel;
                    let out_pos = out_x * bytes_per_pixel;

                    out_row[out_pos..out_pos + bytes_per_pixel]
                        .copy_from_slice(&in_row[in_pos..in_pos + bytes_per_pixel]);
                }
            }
        }

        data_offset += pass_len;
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_sizes_cover_every_pixel() {
        for (width, height) in [(1u32, 1u32), (3, 5), (8, 8), (9, 17)] {
            let total: usize = (0..7)
                .map(|pass| {
                    let (w, h) = pass_size(pass, width, height);
                    w * h
                })
                .sum();

            assert_eq!(total, (width * height) as usize);
        }
    }

    #[test]
    fn interlaced_len_skips_empty_passes() {
        // passes 1, 6 and 7 are the only non-empty ones for 2x2
        assert_eq!(interlaced_len(2, 2, 8), 2 + 2 + 3);
    }

    #[test]
    fn scatters_passes_into_place() -> PngResult<()> {
        // 2x2 gray8: pass 1 has (0,0), pass 6 has (1,0), pass 7 has row 1
        let data = [0, 10, 0, 20, 0, 30, 40];
        let out = deinterlace(&data, 2, 2, 8)?;

        assert_eq!(out, vec![10, 20, 30, 40]);

        Ok(())
    }

    #[test]
    fn packs_sub_byte_samples() -> PngResult<()> {
        // 2x1 at 1 bit: pass 1 holds x=0, pass 6 holds x=1
        let data = [0, 0b1000_0000, 0, 0b1000_0000];
        let out = deinterlace(&data, 2, 1, 1)?;

        assert_eq!(out, vec![0b1100_0000]);

        Ok(())
    }
}
