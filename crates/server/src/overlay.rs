use tint_protocol::{ChromaFrame, OverlayConfig};

/// Centered filled rectangle painted in the frame's summarized color,
/// sized as a proportion of the frame dimensions.
pub(crate) struct RectangleOverlay {
    width_proportion: f32,
    height_proportion: f32,
}

impl RectangleOverlay {
    pub(crate) fn new(config: &OverlayConfig) -> Self {
        Self {
            width_proportion: config.width_proportion,
            height_proportion: config.height_proportion,
        }
    }

    /// Paint the rectangle in place on a tightly packed RGBA buffer.
    /// Alpha is left untouched.
    pub(crate) fn paint(&self, rgba: &mut [u8], width: u32, height: u32, color: ChromaFrame) {
        let rect_w = (width as f32 * self.width_proportion) as u32;
        let rect_h = (height as f32 * self.height_proportion) as u32;
        let x0 = (width - rect_w) / 2;
        let y0 = (height - rect_h) / 2;

        for y in y0..y0 + rect_h {
            for x in x0..x0 + rect_w {
                // usize arithmetic: y * width * 4 can overflow u32.
                let i = (y as usize * width as usize + x as usize) * 4;
                rgba[i] = color.r;
                rgba[i + 1] = color.g;
                rgba[i + 2] = color.b;
            }
        }
    }
}
