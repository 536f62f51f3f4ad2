//! Turns stored APNG frames into the full-canvas pictures a player shows.

use log::debug;

use crate::decoders::png::types::{BlendOp, DisposeOp};
use crate::utils::image::{Image, ImageFrame};

/// When a frame's dispose op takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalTiming {
    /// APNG semantics: a frame's dispose op is applied to its own rectangle
    /// after it has been shown, before the next frame is drawn. The canvas
    /// starts out transparent black on every loop.
    #[default]
    PreviousFrame,
    /// Each frame's dispose op is applied to the whole canvas right before
    /// that frame is drawn, and the canvas carries over between loops.
    OwnFrame,
}

/// One displayable picture: a copy of the canvas and how long to show it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositedFrame {
    pub pixels: Vec<u8>,
    /// Milliseconds.
    pub delay: u32,
}

/// Frame rectangle clipped to the canvas.
#[derive(Debug, Clone, Copy)]
struct Region {
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

pub struct FrameCompositor {
    width: usize,
    height: usize,
    timing: DisposalTiming,
    current: Vec<u8>,
    snapshot: Vec<u8>,
    pending: Option<(Region, DisposeOp)>,
    composed: usize,
}

impl FrameCompositor {
    pub fn new(width: u32, height: u32, timing: DisposalTiming) -> Self {
        let len = width as usize * height as usize * 4;

        FrameCompositor {
            width: width as usize,
            height: height as usize,
            timing,
            current: vec![0; len],
            snapshot: vec![0; len],
            pending: None,
            composed: 0,
        }
    }

    pub fn timing(&self) -> DisposalTiming {
        self.timing
    }

    /// The canvas as it looks after the last composed frame.
    pub fn canvas(&self) -> &[u8] {
        &self.current
    }

    /// Clears both buffers back to transparent black.
    pub fn reset(&mut self) {
        self.current.fill(0);
        self.snapshot.fill(0);
        self.pending = None;
        self.composed = 0;
    }

    /// Disposes as configured, draws `frame` and returns a copy of the
    /// resulting canvas.
    pub fn compose(&mut self, frame: &ImageFrame) -> CompositedFrame {
        let region = self.clip(frame);

        match self.timing {
            DisposalTiming::PreviousFrame => {
                if let Some((previous, dispose_op)) = self.pending.take() {
                    self.dispose_region(previous, dispose_op);
                }

                let dispose_op = match frame.dispose_op() {
                    DisposeOp::Previous if self.composed == 0 => DisposeOp::Background,
                    DisposeOp::Previous => {
                        self.snapshot.copy_from_slice(&self.current);
                        DisposeOp::Previous
                    }
                    op => op,
                };

                self.draw(frame, region);
                self.pending = Some((region, dispose_op));
            }
            DisposalTiming::OwnFrame => {
                match frame.dispose_op() {
                    DisposeOp::None => self.snapshot.copy_from_slice(&self.current),
                    DisposeOp::Background => {
                        self.snapshot.copy_from_slice(&self.current);
                        self.current.fill(0);
                    }
                    DisposeOp::Previous => std::mem::swap(&mut self.current, &mut self.snapshot),
                }

                self.draw(frame, region);
            }
        }

        self.composed += 1;

        CompositedFrame {
            pixels: self.current.clone(),
            delay: frame.delay(),
        }
    }

    fn clip(&self, frame: &ImageFrame) -> Region {
        let x = frame.x_offset() as usize;
        let y = frame.y_offset() as usize;

        Region {
            x,
            y,
            width: (frame.width() as usize).min(self.width.saturating_sub(x)),
            height: (frame.height() as usize).min(self.height.saturating_sub(y)),
        }
    }

    fn dispose_region(&mut self, region: Region, dispose_op: DisposeOp) {
        if region.width == 0 || region.height == 0 {
            return;
        }

        for row in region.y..region.y + region.height {
            let start = (row * self.width + region.x) * 4;
            let end = start + region.width * 4;

            match dispose_op {
                DisposeOp::None => return,
                DisposeOp::Background => self.current[start..end].fill(0),
                DisposeOp::Previous => self.current[start..end].copy_from_slice(&self.snapshot[start..end]),
            }
        }
    }

    fn draw(&mut self, frame: &ImageFrame, region: Region) {
        let src_stride = frame.width() as usize * 4;

        if src_stride == 0 || region.width == 0 || region.height == 0 {
            debug!("Frame at {}x{} lies outside the canvas", region.x, region.y);
            return;
        }

        for (row, src_row) in frame.pixels().chunks_exact(src_stride).take(region.height).enumerate() {
            let start = ((region.y + row) * self.width + region.x) * 4;
            let dst_row = &mut self.current[start..start + region.width * 4];
            let src_row = &src_row[..region.width * 4];

            match frame.blend_op() {
                BlendOp::Source => dst_row.copy_from_slice(src_row),
                BlendOp::Over => {
                    for (dst, src) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                        let alpha = src[3] as f32 / 255.0;

                        for i in 0..3 {
                            dst[i] = (src[i] as f32 * alpha + dst[i] as f32 * (1.0 - alpha)) as u8;
                        }
                        dst[3] = 255;
                    }
                }
            }
        }
    }
}

/// Iterator over composited frames that repeats the animation
/// `loop_count` times, or forever when it is zero.
pub struct Playback<'a> {
    image: &'a Image,
    compositor: FrameCompositor,
    index: usize,
    loops_done: u32,
}

impl<'a> Playback<'a> {
    pub fn new(image: &'a Image, timing: DisposalTiming) -> Self {
        Playback {
            image,
            compositor: FrameCompositor::new(image.width(), image.height(), timing),
            index: 0,
            loops_done: 0,
        }
    }

    /// Completed passes over the frame list.
    pub fn loops_done(&self) -> u32 {
        self.loops_done
    }
}

impl Iterator for Playback<'_> {
    type Item = CompositedFrame;

    fn next(&mut self) -> Option<CompositedFrame> {
        let frames = self.image.frames();
        let loop_count = self.image.loop_count();

        if frames.is_empty() || (loop_count != 0 && self.loops_done >= loop_count) {
            return None;
        }

        if self.index == 0 && self.loops_done > 0 && self.compositor.timing() == DisposalTiming::PreviousFrame {
            self.compositor.reset();
        }

        let composited = self.compositor.compose(&frames[self.index]);

        self.index += 1;
        if self.index == frames.len() {
            self.index = 0;
            self.loops_done += 1;
        }

        Some(composited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    fn solid(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        color.repeat((width * height) as usize)
    }

    fn pixel(canvas: &[u8], width: usize, x: usize, y: usize) -> [u8; 4] {
        let i = (y * width + x) * 4;
        [canvas[i], canvas[i + 1], canvas[i + 2], canvas[i + 3]]
    }

    fn red_then_blue_corner() -> Vec<ImageFrame> {
        vec![
            ImageFrame::new(2, 2, solid(2, 2, RED), 100).with_dispose_op(DisposeOp::Background),
            ImageFrame::new(1, 1, solid(1, 1, BLUE), 100),
        ]
    }

    #[test]
    fn background_disposal_clears_before_next_frame() {
        let image = Image::new(2, 2, 0, red_then_blue_corner());
        let frames = image.composite(DisposalTiming::PreviousFrame);

        assert_eq!(frames[0].pixels, solid(2, 2, RED));

        let last = &frames[1].pixels;
        assert_eq!(pixel(last, 2, 0, 0), BLUE);
        assert_eq!(pixel(last, 2, 1, 0), CLEAR);
        assert_eq!(pixel(last, 2, 0, 1), CLEAR);
        assert_eq!(pixel(last, 2, 1, 1), CLEAR);
    }

    #[test]
    fn own_frame_timing_applies_op_before_drawing() {
        // The red frame's Background op wipes the empty canvas before red is
        // drawn, so red survives under the blue corner.
        let image = Image::new(2, 2, 0, red_then_blue_corner());
        let frames = image.composite(DisposalTiming::OwnFrame);

        let last = &frames[1].pixels;
        assert_eq!(pixel(last, 2, 0, 0), BLUE);
        assert_eq!(pixel(last, 2, 1, 1), RED);
    }

    #[test]
    fn previous_disposal_restores_region() {
        let frames = vec![
            ImageFrame::new(2, 2, solid(2, 2, RED), 10),
            ImageFrame::new(1, 1, solid(1, 1, BLUE), 10)
                .with_offset(1, 1)
                .with_dispose_op(DisposeOp::Previous),
            ImageFrame::new(1, 1, solid(1, 1, BLUE), 10),
        ];
        let composited = Image::new(2, 2, 0, frames).composite(DisposalTiming::PreviousFrame);

        assert_eq!(pixel(&composited[1].pixels, 2, 1, 1), BLUE);

        let last = &composited[2].pixels;
        assert_eq!(pixel(last, 2, 0, 0), BLUE);
        assert_eq!(pixel(last, 2, 1, 1), RED);
    }

    #[test]
    fn previous_on_first_frame_acts_as_background() {
        let frames = vec![
            ImageFrame::new(2, 2, solid(2, 2, RED), 10).with_dispose_op(DisposeOp::Previous),
            ImageFrame::new(1, 1, solid(1, 1, BLUE), 10),
        ];
        let composited = Image::new(2, 2, 0, frames).composite(DisposalTiming::PreviousFrame);

        assert_eq!(pixel(&composited[1].pixels, 2, 1, 1), CLEAR);
    }

    #[test]
    fn own_frame_previous_swaps_buffers() {
        let frames = vec![
            ImageFrame::new(1, 1, solid(1, 1, RED), 10),
            ImageFrame::new(1, 1, solid(1, 1, BLUE), 10),
            ImageFrame::new(1, 1, vec![0, 0, 0, 0], 10)
                .with_dispose_op(DisposeOp::Previous)
                .with_blend_op(BlendOp::Over),
        ];
        let composited = Image::new(1, 1, 0, frames).composite(DisposalTiming::OwnFrame);

        // snapshot holds red, taken when blue's None op ran
        assert_eq!(composited[2].pixels, vec![255, 0, 0, 255]);
    }

    #[test]
    fn over_blend_mixes_and_forces_opaque() {
        let frames = vec![
            ImageFrame::new(1, 1, vec![200, 100, 0, 255], 10),
            ImageFrame::new(1, 1, vec![0, 0, 255, 51], 10).with_blend_op(BlendOp::Over),
        ];
        let composited = Image::new(1, 1, 0, frames).composite(DisposalTiming::PreviousFrame);

        // alpha 0.2: 200*0.8 = 160, 100*0.8 = 80, 255*0.2 = 51
        assert_eq!(composited[1].pixels, vec![160, 80, 51, 255]);
    }

    #[test]
    fn source_blend_copies_alpha() {
        let frames = vec![
            ImageFrame::new(1, 1, solid(1, 1, RED), 10),
            ImageFrame::new(1, 1, vec![1, 2, 3, 4], 10),
        ];
        let composited = Image::new(1, 1, 0, frames).composite(DisposalTiming::PreviousFrame);

        assert_eq!(composited[1].pixels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn playback_stops_after_loop_count() {
        let image = Image::new(2, 2, 2, red_then_blue_corner());
        let mut playback = image.playback(DisposalTiming::PreviousFrame);

        let first_pass: Vec<_> = playback.by_ref().take(2).collect();
        assert_eq!(playback.loops_done(), 1);

        let frames: Vec<_> = first_pass.into_iter().chain(playback.by_ref()).collect();
        assert_eq!(playback.loops_done(), 2);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[2], frames[0]);
        assert_eq!(frames[3], frames[1]);
    }

    #[test]
    fn playback_with_zero_loops_repeats() {
        let image = Image::new(2, 2, 0, red_then_blue_corner());

        assert_eq!(image.playback(DisposalTiming::OwnFrame).take(7).count(), 7);
    }

    #[test]
    fn out_of_canvas_frames_are_clipped() {
        let mut compositor = FrameCompositor::new(2, 2, DisposalTiming::PreviousFrame);
        let frame = ImageFrame::new(2, 2, solid(2, 2, BLUE), 0).with_offset(1, 1);

        let composited = compositor.compose(&frame);

        assert_eq!(pixel(&composited.pixels, 2, 1, 1), BLUE);
        assert_eq!(pixel(&composited.pixels, 2, 0, 0), CLEAR);
        assert_eq!(compositor.canvas(), &composited.pixels[..]);
    }

    #[test]
    fn disposing_a_frame_beside_the_canvas_is_a_no_op() {
        for dispose_op in [DisposeOp::Background, DisposeOp::Previous] {
            let mut compositor = FrameCompositor::new(2, 2, DisposalTiming::PreviousFrame);
            compositor.compose(&ImageFrame::new(2, 2, solid(2, 2, RED), 0));

            let beside = ImageFrame::new(1, 1, solid(1, 1, BLUE), 0)
                .with_offset(5, 0)
                .with_dispose_op(dispose_op);
            assert_eq!(compositor.compose(&beside).pixels, solid(2, 2, RED));

            let below = ImageFrame::new(1, 1, solid(1, 1, BLUE), 0)
                .with_offset(0, 7)
                .with_dispose_op(dispose_op);
            assert_eq!(compositor.compose(&below).pixels, solid(2, 2, RED));

            let last = compositor.compose(&ImageFrame::new(1, 1, solid(1, 1, BLUE), 0));
            assert_eq!(pixel(&last.pixels, 2, 0, 0), BLUE);
            assert_eq!(pixel(&last.pixels, 2, 1, 1), RED);
        }
    }
}
