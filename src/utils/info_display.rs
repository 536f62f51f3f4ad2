use std::fmt::{self, Display, Formatter};

use crate::decoders::png::types::{InterlaceMethod, Transparency};
use crate::decoders::png::PngInfo;

impl Display for PngInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let header = &self.header;

        writeln!(f, "Dimensions: {}x{}", header.width, header.height)?;
        writeln!(f, "Color type: {:?}", header.color_type)?;
        writeln!(f, "Bit depth: {}", header.bit_depth)?;
        writeln!(
            f,
            "Interlace: {}",
            match header.interlace {
                InterlaceMethod::None => "none",
                InterlaceMethod::Adam7 => "Adam7",
            }
        )?;

        if let Some(size) = self.palette_size {
            writeln!(f, "Palette entries: {}", size)?;
        }

        match &self.transparency {
            Some(Transparency::Grayscale(key)) => writeln!(f, "Transparent gray: {}", key)?,
            Some(Transparency::Rgb(r, g, b)) => writeln!(f, "Transparent color: {} {} {}", r, g, b)?,
            Some(Transparency::Palette(alphas)) => writeln!(f, "Palette alpha entries: {}", alphas.len())?,
            None => {}
        }

        let animation = match &self.animation {
            Some(animation) => animation,
            None => return writeln!(f, "Animated: no"),
        };

        writeln!(f, "Animated: {} frames", animation.num_frames)?;
        match animation.num_plays {
            0 => writeln!(f, "Plays: forever")?,
            n => writeln!(f, "Plays: {}", n)?,
        }
        writeln!(f, "Default image is first frame: {}", self.idat_is_frame)?;

        for fctl in &self.frame_controls {
            writeln!(
                f,
                "  #{:<3} {}x{} at ({}, {}), {} ms, dispose {:?}, blend {:?}",
                fctl.sequence_number,
                fctl.width,
                fctl.height,
                fctl.x_offset,
                fctl.y_offset,
                fctl.delay_ms(),
                fctl.dispose_op,
                fctl.blend_op
            )?;
        }

        Ok(())
    }
}
