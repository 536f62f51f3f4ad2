use crate::compositor::{CompositedFrame, DisposalTiming, FrameCompositor, Playback};
use crate::decoders::png::types::{BlendOp, DisposeOp};

/// A decoded PNG or APNG: the canvas size, the play count and the frames
/// as they are stored in the file, each covering only its own rectangle.
#[derive(Debug, Clone)]
pub struct Image {
    width: u32,
    height: u32,
    loop_count: u32,
    frames: Vec<ImageFrame>,
}

impl Image {
    pub fn new(width: u32, height: u32, loop_count: u32, frames: Vec<ImageFrame>) -> Image {
        Image {
            width,
            height,
            loop_count,
            frames,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// How many times the animation plays. Zero means forever.
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn frames(&self) -> &[ImageFrame] {
        &self.frames
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    /// RGBA pixels of the first stored frame. Empty for an image without
    /// frames.
    pub fn pixels(&self) -> &[u8] {
        self.frames.first().map(|frame| frame.pixels()).unwrap_or(&[])
    }

    /// Runs every frame through a fresh compositor once, giving the
    /// full-canvas buffers a player would show.
    pub fn composite(&self, timing: DisposalTiming) -> Vec<CompositedFrame> {
        let mut compositor = FrameCompositor::new(self.width, self.height, timing);

        self.frames.iter().map(|frame| compositor.compose(frame)).collect()
    }

    /// Endless or `loop_count`-bounded sequence of composited frames.
    pub fn playback(&self, timing: DisposalTiming) -> Playback<'_> {
        Playback::new(self, timing)
    }
}

/// One frame as stored in the file: a rectangle of RGBA8 pixels at an
/// offset inside the canvas plus its display instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    x_offset: u32,
    y_offset: u32,
    width: u32,
    height: u32,
    delay: u32,
    dispose_op: DisposeOp,
    blend_op: BlendOp,
    pixels: Vec<u8>,
}

impl ImageFrame {
    /// Frame at the canvas origin, shown for `delay` milliseconds, replacing
    /// whatever was below it.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, delay: u32) -> ImageFrame {
        ImageFrame {
            x_offset: 0,
            y_offset: 0,
            width,
            height,
            delay,
            dispose_op: DisposeOp::None,
            blend_op: BlendOp::Source,
            pixels,
        }
    }

    pub fn with_offset(mut self, x_offset: u32, y_offset: u32) -> ImageFrame {
        self.x_offset = x_offset;
        self.y_offset = y_offset;
        self
    }

    pub fn with_dispose_op(mut self, dispose_op: DisposeOp) -> ImageFrame {
        self.dispose_op = dispose_op;
        self
    }

    pub fn with_blend_op(mut self, blend_op: BlendOp) -> ImageFrame {
        self.blend_op = blend_op;
        self
    }

    pub fn x_offset(&self) -> u32 {
        self.x_offset
    }

    pub fn y_offset(&self) -> u32 {
        self.y_offset
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Display time in milliseconds.
    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn dispose_op(&self) -> DisposeOp {
        self.dispose_op
    }

    pub fn blend_op(&self) -> BlendOp {
        self.blend_op
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The same pixels without the alpha channel.
    pub fn as_rgb8(&self) -> Vec<u8> {
        self.pixels.chunks_exact(4).flat_map(|px| [px[0], px[1], px[2]]).collect()
    }
}
