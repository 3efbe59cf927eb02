/// Failures of the P2P session lifecycle.
///
/// Establishment failures surface to the operator; everything that can go
/// wrong inside a single capture tick is absorbed where it happens (see
/// `SendOutcome` in `channel.rs`) and never reaches this type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    /// Local capture device unavailable. Fatal to session start.
    #[error("failed to open media source: {0}")]
    MediaAcquisition(#[source] anyhow::Error),

    /// Control channel unreachable. Fatal to session start.
    #[error("signaling transport failed: {0}")]
    SignalingTransport(#[source] tokio_tungstenite::tungstenite::Error),

    /// Peer connection setup or description exchange failed.
    #[error("peer connection error: {0}")]
    Peer(#[from] webrtc::Error),

    /// Control message could not be serialized.
    #[error("signal encoding failed: {0}")]
    Signal(#[from] serde_json::Error),

    /// Control socket closed. The session is torn down and must be
    /// restarted explicitly; the P2P path has no reconnection policy.
    #[error("signaling transport closed")]
    TransportClosed,
}
