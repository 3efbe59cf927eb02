//! Server-relayed path: one WebSocket carries both directions. Outbound
//! messages are a chroma header followed by a JPEG frame; inbound messages
//! are processed JPEG frames with no header.

use std::sync::Arc;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageReader, Limits};
use tint_protocol::{MAX_FRAME_DIMENSION, RelayMessage};
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, trace, warn};

use crate::capture::Sampler;
use crate::render::{RemoteFrame, RenderSink};

/// One connect-and-stream attempt. The reconnection policy lives in the
/// supervisor; implementations only report how the attempt ended.
pub(crate) trait RelaySession {
    /// Connect, stream until the connection ends, return.
    ///
    /// Ok means the server closed the connection normally; Err means the
    /// attempt failed (unreachable server, transport fault mid-stream).
    /// Either way the supervisor schedules the next attempt.
    async fn run_once(&mut self) -> anyhow::Result<()>;
}

pub(crate) struct RelayClient {
    url: String,
    interval: std::time::Duration,
    jpeg_quality: u8,
    sampler: Sampler,
    render: Arc<dyn RenderSink>,
    /// RGBA to RGB conversion scratch, reused across frames.
    rgb_scratch: Vec<u8>,
}

impl RelayClient {
    pub(crate) fn new(
        url: String,
        interval: std::time::Duration,
        jpeg_quality: u8,
        sampler: Sampler,
        render: Arc<dyn RenderSink>,
    ) -> Self {
        Self {
            url,
            interval,
            jpeg_quality,
            sampler,
            render,
            rgb_scratch: Vec::new(),
        }
    }
}

impl RelaySession for RelayClient {
    async fn run_once(&mut self) -> anyhow::Result<()> {
        let (socket, _) = connect_async(&self.url)
            .await
            .context("relay connection failed")?;
        info!(url = %self.url, "relay connection established");
        let (mut ws_tx, mut ws_rx) = socket.split();

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(sample) = self.sampler.tick() else {
                        continue;
                    };
                    let chroma = sample.chroma;
                    let jpeg = match encode_jpeg(
                        sample.rgba,
                        sample.width,
                        sample.height,
                        self.jpeg_quality,
                        &mut self.rgb_scratch,
                    ) {
                        Ok(jpeg) => jpeg,
                        Err(e) => {
                            // No partial message: header and payload go out
                            // together or not at all.
                            debug!(error = %e, "frame encode failed, skipping tick");
                            continue;
                        }
                    };
                    let msg = RelayMessage::encode(chroma, &jpeg);
                    trace!(%chroma, bytes = msg.len(), "relay frame sent");
                    ws_tx
                        .send(Message::Binary(msg.into()))
                        .await
                        .context("relay send failed")?;
                }
                msg = ws_rx.next() => match msg {
                    Some(Ok(Message::Binary(data))) => {
                        match decode_bounded(&data) {
                            Ok(img) => {
                                let (width, height) = (img.width(), img.height());
                                self.render.present_frame(RemoteFrame {
                                    width,
                                    height,
                                    rgba: img.to_rgba8().into_raw(),
                                });
                            }
                            Err(e) => {
                                warn!(error = %e, bytes = data.len(), "undecodable relay frame skipped");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("relay connection closed by server");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        return Err(anyhow::Error::from(e).context("relay receive failed"));
                    }
                    Some(Ok(_)) => {} // text/ping/pong ignored on the relay socket
                },
            }
        }
    }
}

/// Encode a tightly packed RGBA surface as JPEG. The encoder takes RGB, so
/// the alpha channel is stripped into `scratch` first.
fn encode_jpeg(
    rgba: &[u8],
    width: u32,
    height: u32,
    quality: u8,
    scratch: &mut Vec<u8>,
) -> anyhow::Result<Vec<u8>> {
    scratch.clear();
    scratch.reserve(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        scratch.extend_from_slice(&px[..3]);
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(scratch, width, height, ExtendedColorType::Rgb8)
        .context("jpeg encode failed")?;
    Ok(out)
}

/// Decode an inbound frame with the dimension bound enforced at decode
/// time, before the decoder allocates a raster for whatever size the
/// payload header declares.
fn decode_bounded(data: &[u8]) -> anyhow::Result<image::DynamicImage> {
    let mut reader = ImageReader::new(std::io::Cursor::new(data))
        .with_guessed_format()
        .context("unrecognized image format")?;
    let mut limits = Limits::no_limits();
    limits.max_image_width = Some(MAX_FRAME_DIMENSION);
    limits.max_image_height = Some(MAX_FRAME_DIMENSION);
    reader.limits(limits);
    reader.decode().context("image decode failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tint_protocol::ChromaFrame;

    use crate::capture::average_rgba;
    use crate::source::UniformSource;

    fn uniform_rgba(width: u32, height: u32, color: ChromaFrame) -> Vec<u8> {
        let mut buf = Vec::new();
        for _ in 0..width * height {
            buf.extend_from_slice(&[color.r, color.g, color.b, 0xFF]);
        }
        buf
    }

    #[test]
    fn encoded_jpeg_decodes_to_same_dimensions() {
        let rgba = uniform_rgba(32, 24, ChromaFrame::new(200, 40, 40));
        let mut scratch = Vec::new();
        let jpeg = encode_jpeg(&rgba, 32, 24, 80, &mut scratch).expect("encode");

        let img = image::load_from_memory(&jpeg).expect("decode");
        assert_eq!((img.width(), img.height()), (32, 24));
    }

    #[test]
    fn encoded_jpeg_preserves_uniform_color_approximately() {
        // Lossy codec: the round-tripped average must land near the input.
        let color = ChromaFrame::new(200, 40, 40);
        let rgba = uniform_rgba(16, 16, color);
        let mut scratch = Vec::new();
        let jpeg = encode_jpeg(&rgba, 16, 16, 80, &mut scratch).expect("encode");

        let decoded = image::load_from_memory(&jpeg).expect("decode").to_rgba8();
        let avg = average_rgba(decoded.as_raw()).expect("average");
        assert!(avg.r > 180, "red kept: {avg}");
        assert!(avg.g < 70, "green kept: {avg}");
        assert!(avg.b < 70, "blue kept: {avg}");
    }

    #[test]
    fn scratch_is_reused_without_growing_unbounded() {
        let rgba = uniform_rgba(8, 8, ChromaFrame::new(1, 2, 3));
        let mut scratch = Vec::new();
        encode_jpeg(&rgba, 8, 8, 80, &mut scratch).expect("encode");
        let cap = scratch.capacity();
        for _ in 0..5 {
            encode_jpeg(&rgba, 8, 8, 80, &mut scratch).expect("encode");
        }
        assert_eq!(scratch.capacity(), cap);
        assert_eq!(scratch.len(), 8 * 8 * 3);
    }

    #[test]
    fn inbound_frame_with_oversized_dimensions_is_rejected() {
        let rgba = uniform_rgba(8, 8, ChromaFrame::new(0, 0, 0));
        let mut scratch = Vec::new();
        let mut jpeg = encode_jpeg(&rgba, 8, 8, 80, &mut scratch).expect("encode");

        // Patch the SOF0 height/width fields to 65535x65535.
        let sof = jpeg
            .windows(2)
            .position(|w| w == [0xFF, 0xC0])
            .expect("baseline SOF0 marker");
        jpeg[sof + 5..sof + 9].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);

        assert!(decode_bounded(&jpeg).is_err());
        assert!(decode_bounded(&encode_jpeg(&rgba, 8, 8, 80, &mut scratch).expect("encode")).is_ok());
    }

    #[test]
    fn relay_message_carries_sampled_chroma() {
        let color = ChromaFrame::new(9, 90, 200);
        let mut sampler = Sampler::new(Box::new(UniformSource {
            width: 4,
            height: 4,
            color,
        }));
        let sample = sampler.tick().expect("sample");
        let mut scratch = Vec::new();
        let jpeg = encode_jpeg(sample.rgba, 4, 4, 80, &mut scratch).expect("encode");
        let msg = RelayMessage::encode(sample.chroma, &jpeg);

        let decoded = RelayMessage::decode(&msg).expect("decode");
        assert_eq!(decoded.chroma, color);
        assert_eq!(decoded.payload, jpeg);
    }
}
