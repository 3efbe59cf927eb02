#[cfg(test)]
use tint_protocol::ChromaFrame;

/// A local media source that can be sampled into an RGBA raster buffer.
///
/// Implementations wrap whatever produces pixels (a camera, a capture
/// pipeline, a synthetic generator). The capture loop only ever talks to
/// this trait.
pub(crate) trait FrameSource: Send {
    /// Natural dimensions of the source. (0, 0) until the source has
    /// produced its first frame; the capture loop skips ticks until the
    /// dimensions are nonzero.
    fn dimensions(&self) -> (u32, u32);

    /// Copy the current frame into `buf` as tightly packed RGBA.
    /// `buf.len()` is always `width * height * 4` for the dimensions
    /// reported by the preceding `dimensions()` call.
    fn sample_into(&mut self, buf: &mut [u8]) -> anyhow::Result<()>;
}

/// Deterministic animated gradient, used when no real capture device is
/// wired in. Red follows the column, green the row, blue the frame counter,
/// so consecutive ticks produce distinct chroma summaries.
pub(crate) struct TestPatternSource {
    width: u32,
    height: u32,
    frame: u64,
}

impl TestPatternSource {
    pub(crate) fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn sample_into(&mut self, buf: &mut [u8]) -> anyhow::Result<()> {
        let blue = (self.frame % 256) as u8;
        let mut i = 0;
        for y in 0..self.height {
            for x in 0..self.width {
                buf[i] = (x * 255 / self.width.max(1)) as u8;
                buf[i + 1] = (y * 255 / self.height.max(1)) as u8;
                buf[i + 2] = blue;
                buf[i + 3] = 0xFF;
                i += 4;
            }
        }
        self.frame += 1;
        Ok(())
    }
}

/// A source filled with one solid color. Test-only: uniform input makes the
/// expected chroma summary exact.
#[cfg(test)]
pub(crate) struct UniformSource {
    pub width: u32,
    pub height: u32,
    pub color: ChromaFrame,
}

#[cfg(test)]
impl FrameSource for UniformSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn sample_into(&mut self, buf: &mut [u8]) -> anyhow::Result<()> {
        for px in buf.chunks_exact_mut(4) {
            px[0] = self.color.r;
            px[1] = self.color.g;
            px[2] = self.color.b;
            px[3] = 0xFF;
        }
        Ok(())
    }
}
