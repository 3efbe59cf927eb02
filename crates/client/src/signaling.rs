//! Driver for the P2P path: owns the peer connection and the control
//! WebSocket, feeds their callbacks into the `Session` state machine and
//! executes the effects it returns.

use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tint_protocol::{SignalMessage, TintConfig};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_H264, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::capture::{self, Sampler};
use crate::channel::{METADATA_CHANNEL_LABEL, MetadataChannel};
use crate::error::SessionError;
use crate::render::RenderSink;
use crate::session::{Session, SessionEffect, SessionEvent};
use crate::source::FrameSource;

type ControlSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Run one P2P session to completion.
///
/// Returns when the operator shuts down (Ok), or when establishment fails
/// or the control socket closes (Err). There is no auto-retry: a failed
/// session requires an explicit new start. The peer connection is closed
/// on every exit path, including establishment failures part-way through.
pub(crate) async fn run_p2p(
    config: &TintConfig,
    open_source: impl FnOnce() -> anyhow::Result<Box<dyn FrameSource>>,
    render: Arc<dyn RenderSink>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let mut session = Session::new();

    for effect in session.handle(SessionEvent::StartRequested) {
        debug_assert_eq!(effect, SessionEffect::AcquireMedia);
    }
    let source = open_source().map_err(SessionError::MediaAcquisition)?;
    info!("local media source opened");
    let sampler = std::sync::Mutex::new(Some(Sampler::new(source)));

    for effect in session.handle(SessionEvent::MediaAcquired) {
        debug_assert_eq!(effect, SessionEffect::CreateOffer);
    }
    let (pc, dc) = build_peer(&config.ice.stun_urls).await?;

    // Remote track arrivals become session events; the select loop below
    // consumes them on the driver's own thread of control.
    let (stream_tx, mut stream_rx) = mpsc::channel::<String>(8);
    pc.on_track(Box::new(move |track, _receiver, _transceiver| {
        let tx = stream_tx.clone();
        Box::pin(async move {
            let _ = tx.try_send(track.stream_id());
        })
    }));

    // The capture loop starts the moment the metadata channel opens and
    // terminates itself when the channel closes.
    let period = config.capture.interval();
    let dc_for_loop = Arc::clone(&dc);
    dc.on_open(Box::new(move || {
        let taken = sampler.lock().unwrap_or_else(|e| e.into_inner()).take();
        let channel = MetadataChannel::new(Arc::clone(&dc_for_loop));
        Box::pin(async move {
            match taken {
                Some(s) => {
                    tokio::spawn(capture::run_metadata_loop(s, channel, period));
                }
                None => warn!("metadata channel reopened, capture loop already started"),
            }
        })
    }));

    let mut control: Option<ControlSink> = None;
    let result = establish_and_drive(
        &mut session,
        config,
        &pc,
        &mut stream_rx,
        render.as_ref(),
        &mut control,
        shutdown,
    )
    .await;

    // Close both transports, also when establishment failed part-way and
    // the control socket never opened; each attempt proceeds even if the
    // other failed or the resource is already closed.
    for effect in session.handle(SessionEvent::TeardownRequested) {
        if effect == SessionEffect::CloseTransports {
            if let Err(e) = pc.close().await {
                debug!(error = %e, "peer connection close");
            }
            if let Some(ws_tx) = control.as_mut() {
                if let Err(e) = ws_tx.close().await {
                    debug!(error = %e, "control socket close");
                }
            }
        }
    }
    debug!(state = ?session.state(), "session torn down");

    result
}

/// Create the offer, connect the control socket, and run the session's
/// event loop. The caller owns teardown: every failure returns here first
/// so the peer connection and control socket are closed in one place.
async fn establish_and_drive(
    session: &mut Session,
    config: &TintConfig,
    pc: &RTCPeerConnection,
    stream_rx: &mut mpsc::Receiver<String>,
    render: &dyn RenderSink,
    control: &mut Option<ControlSink>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let offer = pc.create_offer(None).await?;
    let offer_sdp = offer.sdp.clone();
    pc.set_local_description(offer).await?;
    // Control socket is not open yet; the session holds the offer until it is.
    for effect in session.handle(SessionEvent::OfferCreated { sdp: offer_sdp }) {
        debug!(?effect, "unexpected effect before control open");
    }

    let url = config.signaling.url();
    info!(url, "connecting to signaling endpoint");
    let (socket, _) = connect_async(&url)
        .await
        .map_err(SessionError::SignalingTransport)?;
    let (ws_tx, mut ws_rx) = socket.split();
    let ws_tx = control.insert(ws_tx);

    for effect in session.handle(SessionEvent::ControlOpen) {
        if let SessionEffect::SendOffer { sdp } = effect {
            let text = serde_json::to_string(&SignalMessage::Offer { sdp })?;
            ws_tx
                .send(Message::Text(text.into()))
                .await
                .map_err(SessionError::SignalingTransport)?;
            info!("offer transmitted, awaiting answer");
        }
    }

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let event = match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(SignalMessage::Answer { sdp }) => SessionEvent::AnswerReceived { sdp },
                        Ok(other) => {
                            debug!(?other, "ignoring control message");
                            SessionEvent::UnknownControlMessage
                        }
                        Err(e) => {
                            warn!(error = %e, "malformed control message ignored");
                            SessionEvent::UnknownControlMessage
                        }
                    };
                    for effect in session.handle(event) {
                        if let SessionEffect::ApplyAnswer { sdp } = effect {
                            let answer = RTCSessionDescription::answer(sdp)?;
                            pc.set_remote_description(answer).await?;
                            info!("answer applied, session connected");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!("control socket closed, tearing session down");
                    return Err(SessionError::TransportClosed);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "control socket error, tearing session down");
                    return Err(SessionError::TransportClosed);
                }
                Some(Ok(_)) => {} // binary/ping/pong on the control channel
            },
            Some(stream_id) = stream_rx.recv() => {
                for effect in session.handle(SessionEvent::RemoteStream { stream_id }) {
                    if let SessionEffect::ExposeRemoteStream { stream_id } = effect {
                        render.attach_stream(&stream_id);
                    }
                }
            },
            _ = shutdown.changed() => {
                info!("shutdown requested, tearing session down");
                return Ok(());
            }
        }
    }
}

/// Construct the peer connection with the local video track and the
/// metadata data channel attached, before the offer is created.
async fn build_peer(
    stun_urls: &[String],
) -> Result<(Arc<RTCPeerConnection>, Arc<RTCDataChannel>), SessionError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: stun_urls.to_vec(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let pc = Arc::new(api.new_peer_connection(config).await?);

    let dc = match attach_media(&pc).await {
        Ok(dc) => dc,
        Err(e) => {
            // A half-built peer still runs ICE tasks; close before bailing.
            if let Err(close_err) = pc.close().await {
                debug!(error = %close_err, "peer connection close");
            }
            return Err(SessionError::Peer(e));
        }
    };

    pc.on_peer_connection_state_change(Box::new(move |state| {
        match state {
            RTCPeerConnectionState::Failed => warn!("peer connection failed"),
            RTCPeerConnectionState::Disconnected => warn!("peer connection disconnected"),
            _ => info!(?state, "peer connection state changed"),
        }
        Box::pin(async {})
    }));

    Ok((pc, dc))
}

/// Attach the local video track and create the metadata data channel.
async fn attach_media(pc: &RTCPeerConnection) -> Result<Arc<RTCDataChannel>, webrtc::Error> {
    // Local media section for the offer. Sample writing is owned by the
    // encoding collaborator, not this driver.
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_string(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_string(),
        "tint".to_string(),
    ));
    pc.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await?;

    // Unreliable but ordered: a lost summary is acceptable, a stale one is
    // not, so retransmissions are disabled outright.
    pc.create_data_channel(
        METADATA_CHANNEL_LABEL,
        Some(RTCDataChannelInit {
            ordered: Some(true),
            max_retransmits: Some(0),
            ..Default::default()
        }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::LogSink;
    use crate::source::TestPatternSource;

    #[tokio::test]
    async fn unreachable_signaling_endpoint_fails_after_peer_setup() {
        // Peer construction succeeds, the control connect does not. The
        // driver must surface the transport error and still reach the
        // teardown path that closes the peer connection.
        let mut config = TintConfig::default();
        config.signaling.port = 1; // nothing listens here
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let render: Arc<dyn RenderSink> = Arc::new(LogSink::new());

        let result = run_p2p(
            &config,
            || Ok(Box::new(TestPatternSource::new(4, 4)) as Box<dyn FrameSource>),
            render,
            &mut shutdown_rx,
        )
        .await;

        assert!(matches!(result, Err(SessionError::SignalingTransport(_))));
    }
}
