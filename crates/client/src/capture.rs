use std::time::Duration;

use tint_protocol::ChromaFrame;
use tracing::{debug, info, trace, warn};

use crate::channel::{MetadataSender, SendOutcome};
use crate::source::FrameSource;

/// Average each color component independently across every pixel of a
/// tightly packed RGBA buffer, rounding half-up. Returns `None` for an
/// empty buffer.
pub(crate) fn average_rgba(rgba: &[u8]) -> Option<ChromaFrame> {
    let pixels = (rgba.len() / 4) as u64;
    if pixels == 0 {
        return None;
    }
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    for px in rgba.chunks_exact(4) {
        r += px[0] as u64;
        g += px[1] as u64;
        b += px[2] as u64;
    }
    let round = |sum: u64| ((sum + pixels / 2) / pixels) as u8;
    Some(ChromaFrame::new(round(r), round(g), round(b)))
}

/// One sampled frame, borrowed from the sampler's reusable surface.
pub(crate) struct Sample<'a> {
    pub rgba: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub chroma: ChromaFrame,
}

/// Drives a `FrameSource` into an off-screen raster surface.
///
/// The surface is owned exclusively by the sampler and reused across ticks;
/// it is reallocated only when the source dimensions change.
pub(crate) struct Sampler {
    source: Box<dyn FrameSource>,
    surface: Vec<u8>,
    dims: (u32, u32),
}

impl Sampler {
    pub(crate) fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            surface: Vec::new(),
            dims: (0, 0),
        }
    }

    /// Sample the current frame and derive its chroma summary. Returns
    /// `None` when the tick must be skipped: the source has not produced a
    /// frame yet (zero dimensions) or sampling failed.
    pub(crate) fn tick(&mut self) -> Option<Sample<'_>> {
        let (width, height) = self.source.dimensions();
        if width == 0 || height == 0 {
            trace!("source has no frame yet, skipping tick");
            return None;
        }

        if (width, height) != self.dims {
            // usize arithmetic: width * height * 4 can overflow u32.
            self.surface.resize(width as usize * height as usize * 4, 0);
            self.dims = (width, height);
            debug!(width, height, "raster surface resized");
        }

        if let Err(e) = self.source.sample_into(&mut self.surface) {
            warn!(error = %e, "frame sample failed, skipping tick");
            return None;
        }

        let chroma = average_rgba(&self.surface)?;
        Some(Sample {
            rgba: &self.surface,
            width,
            height,
            chroma,
        })
    }
}

/// P2P-path capture loop: sample at a fixed period and push the chroma
/// summary over the metadata channel, best effort.
///
/// The loop is started when the data channel opens and terminates itself
/// once the channel reports closing or closed. Frames produced while the
/// channel is not open are dropped, never buffered: a stale summary is
/// worse than a lost one.
pub(crate) async fn run_metadata_loop<S: MetadataSender>(
    mut sampler: Sampler,
    channel: S,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(period_ms = period.as_millis() as u64, "metadata capture loop started");

    loop {
        ticker.tick().await;
        if channel.is_closed() {
            info!("metadata channel closed, capture loop stopping");
            break;
        }
        let Some(sample) = sampler.tick() else {
            continue;
        };
        let chroma = sample.chroma;
        match channel.send(chroma).await {
            SendOutcome::Sent => trace!(%chroma, "metadata frame sent"),
            SendOutcome::Dropped(reason) => debug!(%chroma, %reason, "metadata frame dropped"),
        }
    }
}
