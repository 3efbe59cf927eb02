//! Signaling handshake state machine.
//!
//! Every transport callback of the P2P path (socket open, inbound control
//! message, remote track arrival, teardown) is reduced to a named event.
//! `Session::handle` is a pure transition function returning the side
//! effects the driver must execute; the driver in `signaling.rs` owns the
//! actual transports.

use std::collections::HashSet;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Idle,
    AwaitingLocalMedia,
    Offering,
    AwaitingAnswer,
    Connected,
    Closed,
}

#[derive(Debug)]
pub(crate) enum SessionEvent {
    /// Operator asked for a session.
    StartRequested,
    /// Local media source opened successfully.
    MediaAcquired,
    /// Local SDP offer created and set.
    OfferCreated { sdp: String },
    /// Control socket reported open.
    ControlOpen,
    /// Inbound control message of type "answer".
    AnswerReceived { sdp: String },
    /// Inbound control message of any unrecognized type.
    UnknownControlMessage,
    /// A remote track arrived carrying this stream identity.
    RemoteStream { stream_id: String },
    /// Explicit teardown (operator stop or control socket closure).
    TeardownRequested,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SessionEffect {
    AcquireMedia,
    CreateOffer,
    SendOffer { sdp: String },
    ApplyAnswer { sdp: String },
    /// Expose the remote stream to the render sink. Emitted at most once
    /// per distinct stream identity.
    ExposeRemoteStream { stream_id: String },
    CloseTransports,
}

pub(crate) struct Session {
    state: SessionState,
    control_open: bool,
    /// Offer created before the control socket confirmed readiness; sent
    /// as soon as it does.
    pending_offer: Option<String>,
    exposed_streams: HashSet<String>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Idle,
            control_open: false,
            pending_offer: None,
            exposed_streams: HashSet::new(),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn handle(&mut self, event: SessionEvent) -> Vec<SessionEffect> {
        match event {
            SessionEvent::StartRequested => {
                if self.state != SessionState::Idle {
                    debug!(state = ?self.state, "start requested outside idle, ignoring");
                    return vec![];
                }
                self.state = SessionState::AwaitingLocalMedia;
                vec![SessionEffect::AcquireMedia]
            }
            SessionEvent::MediaAcquired => {
                if self.state != SessionState::AwaitingLocalMedia {
                    debug!(state = ?self.state, "media acquired outside handshake, ignoring");
                    return vec![];
                }
                self.state = SessionState::Offering;
                vec![SessionEffect::CreateOffer]
            }
            SessionEvent::OfferCreated { sdp } => {
                if self.state != SessionState::Offering {
                    debug!(state = ?self.state, "offer created outside offering, ignoring");
                    return vec![];
                }
                if self.control_open {
                    self.state = SessionState::AwaitingAnswer;
                    vec![SessionEffect::SendOffer { sdp }]
                } else {
                    self.pending_offer = Some(sdp);
                    vec![]
                }
            }
            SessionEvent::ControlOpen => {
                self.control_open = true;
                match (self.state, self.pending_offer.take()) {
                    (SessionState::Offering, Some(sdp)) => {
                        self.state = SessionState::AwaitingAnswer;
                        vec![SessionEffect::SendOffer { sdp }]
                    }
                    _ => vec![],
                }
            }
            SessionEvent::AnswerReceived { sdp } => {
                if self.state != SessionState::AwaitingAnswer {
                    debug!(state = ?self.state, "answer in unexpected state, ignoring");
                    return vec![];
                }
                self.state = SessionState::Connected;
                vec![SessionEffect::ApplyAnswer { sdp }]
            }
            // Tolerant parsing: unrecognized control messages are not an
            // error in any state.
            SessionEvent::UnknownControlMessage => vec![],
            SessionEvent::RemoteStream { stream_id } => {
                if self.state == SessionState::Closed {
                    return vec![];
                }
                if self.exposed_streams.insert(stream_id.clone()) {
                    vec![SessionEffect::ExposeRemoteStream { stream_id }]
                } else {
                    debug!(stream_id, "stream already exposed, ignoring redundant track");
                    vec![]
                }
            }
            SessionEvent::TeardownRequested => {
                if self.state == SessionState::Closed {
                    return vec![];
                }
                self.state = SessionState::Closed;
                self.control_open = false;
                self.pending_offer = None;
                vec![SessionEffect::CloseTransports]
            }
        }
    }
}
