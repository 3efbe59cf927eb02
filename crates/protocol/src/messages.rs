use serde::{Deserialize, Serialize};

/// Signaling messages exchanged over the control WebSocket.
///
/// The wire format is JSON text with a `type` tag. Message types we do not
/// recognize deserialize to `Unknown` instead of failing: the control
/// channel is forward compatible and a newer peer may send types this
/// client has never heard of.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    /// SDP offer, sent once by the caller when the control socket opens
    Offer { sdp: String },
    /// SDP answer, received once from the remote peer
    Answer { sdp: String },
    /// Any unrecognized message type (tolerated, never an error)
    #[serde(other)]
    Unknown,
}
