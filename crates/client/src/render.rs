use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

/// A decoded remote frame, ready for display.
pub(crate) struct RemoteFrame {
    pub width: u32,
    pub height: u32,
    #[allow(dead_code)]
    pub rgba: Vec<u8>,
}

/// Where remote video ends up. The P2P path reports stream identities; the
/// relay path hands over fully decoded frames.
pub(crate) trait RenderSink: Send + Sync {
    /// Called exactly once per distinct remote stream identity.
    fn attach_stream(&self, stream_id: &str);

    fn present_frame(&self, frame: RemoteFrame);
}

/// Headless sink that reports activity through the log. Stands in until a
/// display surface is wired up.
pub(crate) struct LogSink {
    frames: AtomicU64,
}

impl LogSink {
    pub(crate) fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
        }
    }
}

impl RenderSink for LogSink {
    fn attach_stream(&self, stream_id: &str) {
        info!(stream_id, "remote stream attached");
    }

    fn present_frame(&self, frame: RemoteFrame) {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if n == 1 || n % 50 == 0 {
            info!(frames = n, width = frame.width, height = frame.height, "remote frames presented");
        } else {
            debug!(width = frame.width, height = frame.height, "remote frame presented");
        }
    }
}
