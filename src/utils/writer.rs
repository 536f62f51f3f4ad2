use std::fs::File;
use std::io::{BufWriter, Error, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::compositor::{CompositedFrame, DisposalTiming};
use crate::utils::image::Image;

/// File formats the writer can produce from RGBA8 canvases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Ppm,
    Pam,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Ppm => "ppm",
            OutputFormat::Pam => "pam",
            OutputFormat::Png => "png",
        }
    }
}

pub struct Writer {}

impl Writer {
    /// Composites `image` and writes one file per frame next to
    /// `output_path`, named `<stem>_frame_<n>.<ext>`. A still image is
    /// written to `output_path` itself. Returns the written paths.
    pub fn write_frames(
        output_path: &Path,
        image: &Image,
        format: OutputFormat,
        timing: DisposalTiming,
    ) -> Result<Vec<PathBuf>, Error> {
        let frames = image.composite(timing);

        if frames.len() == 1 {
            Writer::write(output_path, image.width(), image.height(), &frames[0], format)?;
            return Ok(vec![output_path.to_path_buf()]);
        }

        let output_dir = output_path.parent().unwrap_or_else(|| Path::new("."));
        let file_stem = output_path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| Error::new(ErrorKind::InvalidInput, "output path has no file name"))?;

        frames
            .iter()
            .enumerate()
            .map(|(i, frame)| {
                let path = output_dir.join(format!("{}_frame_{}.{}", file_stem, i, format.extension()));
                Writer::write(&path, image.width(), image.height(), frame, format)?;
                Ok(path)
            })
            .collect()
    }

    fn write(path: &Path, width: u32, height: u32, frame: &CompositedFrame, format: OutputFormat) -> Result<(), Error> {
        match format {
            OutputFormat::Ppm => Writer::write_ppm(path, width, height, &frame.pixels),
            OutputFormat::Pam => Writer::write_pam(path, width, height, &frame.pixels),
            OutputFormat::Png => Writer::write_png(path, width, height, &frame.pixels),
        }
    }

    /// Binary P6 file. Alpha is dropped.
    pub fn write_ppm(output_path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<(), Error> {
        Writer::validate_pixel_count(width, height, rgba)?;

        let mut file = BufWriter::new(File::create(output_path)?);

        file.write_all(b"P6\n")?;
        file.write_all(format!("{} {}\n", width, height).as_bytes())?;
        file.write_all(b"255\n")?;

        for pixel in rgba.chunks_exact(4) {
            file.write_all(&pixel[..3])?;
        }

        file.flush()
    }

    /// P7 file with an RGB_ALPHA tuple type, keeping transparency.
    pub fn write_pam(output_path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<(), Error> {
        Writer::validate_pixel_count(width, height, rgba)?;

        let mut file = BufWriter::new(File::create(output_path)?);

        file.write_all(b"P7\n")?;
        file.write_all(format!("WIDTH {}\n", width).as_bytes())?;
        file.write_all(format!("HEIGHT {}\n", height).as_bytes())?;
        file.write_all(b"DEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n")?;
        file.write_all(rgba)?;

        file.flush()
    }

    pub fn write_png(output_path: &Path, width: u32, height: u32, rgba: &[u8]) -> Result<(), Error> {
        Writer::validate_pixel_count(width, height, rgba)?;

        ::image::save_buffer_with_format(
            output_path,
            rgba,
            width,
            height,
            ::image::ExtendedColorType::Rgba8,
            ::image::ImageFormat::Png,
        )
        .map_err(|e| Error::new(ErrorKind::Other, e))
    }

    fn validate_pixel_count(width: u32, height: u32, rgba: &[u8]) -> Result<(), Error> {
        let expected_size = width as usize * height as usize * 4;

        if expected_size != rgba.len() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "Invalid pixel data size for {}x{} RGBA image: expected {} bytes, got {}",
                    width,
                    height,
                    expected_size,
                    rgba.len()
                ),
            ));
        }

        Ok(())
    }
}
