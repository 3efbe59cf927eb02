use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tint_protocol::ChromaFrame;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

/// Label of the metadata data channel, fixed by the signaling protocol.
pub(crate) const METADATA_CHANNEL_LABEL: &str = "color";

/// Outcome of a best-effort metadata send. A drop is an absorbed failure,
/// not an error: one lost frame must never halt the capture loop.
#[derive(Debug)]
pub(crate) enum SendOutcome {
    Sent,
    Dropped(DropReason),
}

#[derive(Debug)]
pub(crate) enum DropReason {
    /// Channel not in the open state; the frame is discarded, not buffered.
    NotOpen,
    /// Transport-level send fault, caught and absorbed.
    Transport(webrtc::Error),
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotOpen => write!(f, "channel not open"),
            DropReason::Transport(e) => write!(f, "transport fault: {e}"),
        }
    }
}

/// What the capture loop needs from the metadata transport. Abstracted so
/// the loop's drop policy can be exercised without a live peer connection.
pub(crate) trait MetadataSender {
    /// True once the channel is closing or closed; the capture loop
    /// self-terminates on this.
    fn is_closed(&self) -> bool;

    async fn send(&self, chroma: ChromaFrame) -> SendOutcome;
}

/// Best-effort side channel carrying chroma summaries over the peer
/// connection's unreliable-ordered data channel.
pub(crate) struct MetadataChannel {
    dc: Arc<RTCDataChannel>,
}

impl MetadataChannel {
    pub(crate) fn new(dc: Arc<RTCDataChannel>) -> Self {
        Self { dc }
    }
}

impl MetadataSender for MetadataChannel {
    fn is_closed(&self) -> bool {
        matches!(
            self.dc.ready_state(),
            RTCDataChannelState::Closing | RTCDataChannelState::Closed
        )
    }

    async fn send(&self, chroma: ChromaFrame) -> SendOutcome {
        if self.dc.ready_state() != RTCDataChannelState::Open {
            return SendOutcome::Dropped(DropReason::NotOpen);
        }
        match self
            .dc
            .send(&Bytes::copy_from_slice(&chroma.to_bytes()))
            .await
        {
            Ok(_) => SendOutcome::Sent,
            Err(e) => SendOutcome::Dropped(DropReason::Transport(e)),
        }
    }
}
