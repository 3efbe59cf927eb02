use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::ws::{Message, WebSocket};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageReader, Limits};
use tint_protocol::{MAX_FRAME_DIMENSION, RelayMessage};

use crate::AppState;

/// Handle one relay client connection.
///
/// Each inbound binary message is a chroma header plus a JPEG frame; the
/// reply is the processed frame only, no header. Malformed messages are
/// logged and skipped without dropping the connection.
pub(crate) async fn handle_socket(mut socket: WebSocket, who: SocketAddr, state: Arc<AppState>) {
    tracing::info!(%who, "Relay client connected");
    let mut frames: u64 = 0;

    while let Some(result) = socket.recv().await {
        match result {
            Ok(Message::Binary(data)) => {
                let reply = match process_frame(&data, &state) {
                    Ok(jpeg) => jpeg,
                    Err(e) => {
                        tracing::warn!(%who, bytes = data.len(), "Frame skipped: {e:#}");
                        continue;
                    }
                };
                frames += 1;
                if frames == 1 {
                    tracing::info!(%who, "First frame processed");
                }
                if socket.send(Message::Binary(reply.into())).await.is_err() {
                    tracing::debug!(%who, "Relay send failed");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::info!(%who, "Relay client closed the connection");
                break;
            }
            Err(e) => {
                tracing::debug!(%who, "Relay WebSocket error: {e}");
                break;
            }
            _ => {} // text/ping/pong ignored on the relay socket
        }
    }

    tracing::info!(%who, frames, "Relay client disconnected");
}

/// Decode the message, paint the overlay in the summarized color, and
/// re-encode the frame as JPEG.
pub(crate) fn process_frame(data: &[u8], state: &AppState) -> anyhow::Result<Vec<u8>> {
    let msg = RelayMessage::decode(data).context("invalid frame header")?;
    let img = decode_bounded(&msg.payload).context("undecodable frame payload")?;
    let (width, height) = (img.width(), img.height());
    let mut rgba = img.to_rgba8().into_raw();

    state.overlay.paint(&mut rgba, width, height, msg.chroma);

    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);
    for px in rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
    }
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, state.jpeg_quality)
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .context("jpeg re-encode failed")?;
    Ok(out)
}

/// Decode an image with the frame dimension bound enforced before the
/// decoder allocates. A tiny payload can declare enormous dimensions, so
/// the limit must apply at decode time, not after.
fn decode_bounded(payload: &[u8]) -> anyhow::Result<image::DynamicImage> {
    let mut reader = ImageReader::new(std::io::Cursor::new(payload))
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
    use crate::overlay::RectangleOverlay;
    use tint_protocol::{ChromaFrame, OverlayConfig, TintConfig};

    fn test_state() -> AppState {
        let config = TintConfig::default();
        AppState {
            overlay: RectangleOverlay::new(&OverlayConfig {
                width_proportion: 0.5,
                height_proportion: 0.5,
            }),
            jpeg_quality: config.capture.jpeg_quality,
            max_message_bytes: config.relay.max_message_bytes,
        }
    }

    fn uniform_jpeg(width: u32, height: u32, color: ChromaFrame) -> Vec<u8> {
        let rgb: Vec<u8> = (0..width * height)
            .flat_map(|_| [color.r, color.g, color.b])
            .collect();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 90)
            .encode(&rgb, width, height, ExtendedColorType::Rgb8)
            .expect("encode");
        out
    }

    fn pixel(img: &image::RgbaImage, x: u32, y: u32) -> [u8; 3] {
        let p = img.get_pixel(x, y);
        [p[0], p[1], p[2]]
    }

    #[test]
    fn reply_carries_overlay_and_no_header() {
        // Blue input frame, red chroma summary. The lossy codec shifts
        // values, so assertions use wide tolerances.
        let jpeg = uniform_jpeg(32, 32, ChromaFrame::new(0, 0, 230));
        let msg = RelayMessage::encode(ChromaFrame::new(255, 0, 0), &jpeg);

        let reply = process_frame(&msg, &test_state()).expect("process");
        let img = image::load_from_memory(&reply).expect("reply is a bare image");
        assert_eq!((img.width(), img.height()), (32, 32));

        let img = img.to_rgba8();
        let [r, _, b] = pixel(&img, 16, 16);
        assert!(r > 180 && b < 80, "center painted red, got r={r} b={b}");
        let [r, _, b] = pixel(&img, 1, 1);
        assert!(b > 150 && r < 80, "corner still blue, got r={r} b={b}");
    }

    #[test]
    fn short_message_is_rejected() {
        assert!(process_frame(&[1, 2], &test_state()).is_err());
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let msg = RelayMessage::encode(ChromaFrame::new(1, 2, 3), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(process_frame(&msg, &test_state()).is_err());
    }

    #[test]
    fn oversized_declared_dimensions_are_rejected() {
        // A few hundred bytes of JPEG can claim 65535x65535; the decoder
        // must refuse before allocating the raster.
        let mut jpeg = uniform_jpeg(8, 8, ChromaFrame::new(0, 0, 0));
        let sof = jpeg
            .windows(2)
            .position(|w| w == [0xFF, 0xC0])
            .expect("baseline SOF0 marker");
        // Height and width fields sit 5..9 bytes past the marker.
        jpeg[sof + 5..sof + 9].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);

        let msg = RelayMessage::encode(ChromaFrame::new(1, 2, 3), &jpeg);
        assert!(process_frame(&msg, &test_state()).is_err());
    }
}
