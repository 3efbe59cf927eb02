//! Binary relay message framing for WebSocket transport.
//!
//! Outbound messages are a fixed 3-byte chroma header followed by the
//! compressed frame payload, concatenated with no delimiter:
//! ```text
//! [0]    average red
//! [1]    average green
//! [2]    average blue
//! [3..]  JPEG payload (variable length, may be empty)
//! ```
//! Inbound messages on the relay path carry no header: the endpoint replies
//! with a processed full frame, not a summary.

pub const CHROMA_HEADER_SIZE: usize = 3;

/// Per-frame color summary: the average of each color component across
/// every pixel of the sampled frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaFrame {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ChromaFrame {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_bytes(self) -> [u8; CHROMA_HEADER_SIZE] {
        [self.r, self.g, self.b]
    }

    pub fn from_bytes(bytes: [u8; CHROMA_HEADER_SIZE]) -> Self {
        Self {
            r: bytes[0],
            g: bytes[1],
            b: bytes[2],
        }
    }
}

impl std::fmt::Display for ChromaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// One outbound relay message: chroma header plus encoded image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub chroma: ChromaFrame,
    pub payload: Vec<u8>,
}

impl RelayMessage {
    /// Serialize header + payload into a single binary message.
    pub fn encode(chroma: ChromaFrame, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHROMA_HEADER_SIZE + payload.len());
        buf.extend_from_slice(&chroma.to_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    /// Parse a binary message into header and payload. The payload boundary
    /// is fixed at the header length; an empty payload is valid.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < CHROMA_HEADER_SIZE {
            return Err(FrameError::TooShort(buf.len()));
        }
        Ok(Self {
            chroma: ChromaFrame::from_bytes([buf[0], buf[1], buf[2]]),
            payload: buf[CHROMA_HEADER_SIZE..].to_vec(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("message too short: {0} bytes (need at least {CHROMA_HEADER_SIZE})")]
    TooShort(usize),
}
