//! Call signaling state machine.
//!
//! [`CallState::transition`] is a pure function of the current state and one
//! [`CallEvent`]. It never touches media, the network or the UI; instead it
//! returns the [`Effect`]s the coordinator has to carry out. Effects that
//! wait on an external capability (capturing media, negotiating descriptions)
//! report back with a follow-up event such as [`CallEvent::MediaReady`] or
//! [`CallEvent::NegotiationFailed`].

use crate::config::GlarePolicy;
use crate::errors::CallError;
use crate::peer::types::{IceCandidate, LinkState, SessionDescription, TrackKind};
use crate::session::{CallStatus, Role};
use crate::signaling::{RejectReason, SignalingMessage};
use log::{debug, info};
use serde::Serialize;

/// Inbound offer waiting for the local user to accept or reject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOffer {
    pub caller_id: String,
    pub offer: SessionDescription,
    /// Remote candidates that arrived before there was a connection to apply them to.
    pub candidates: Vec<IceCandidate>,
}

/// Local operation whose capability calls are still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Starting,
    Accepting,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    Start,
    /// Start a call addressed to a known client id.
    Call(String),
    Accept,
    Reject,
    End,
    ToggleMedia(TrackKind),
    Received(SignalingMessage),
    MediaReady,
    MediaFailed(CallError),
    OfferReady(SessionDescription),
    AnswerReady(SessionDescription),
    NegotiationFailed(CallError),
    LocalCandidate(IceCandidate),
    RemoteTrack(TrackKind),
    Link(LinkState),
    SendFailed {
        message: SignalingMessage,
        error: CallError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AcquireMedia,
    /// Build the peer connection, attach local tracks, create and set the local offer.
    CreateOffer,
    /// Build the peer connection, attach local tracks, apply the remote offer and
    /// its held candidates, create and set the local answer.
    CreateAnswer {
        offer: SessionDescription,
        candidates: Vec<IceCandidate>,
    },
    /// Build the peer connection if missing, then apply the remote answer.
    ApplyAnswer(SessionDescription),
    ApplyCandidate(IceCandidate),
    ToggleTrack(TrackKind),
    Send(SignalingMessage),
    /// Stop local media and close the peer connection.
    Release,
    Notify(Notice),
}

/// Notification for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    StatusChanged { status: CallStatus },
    IncomingCall { caller_id: String },
    Rejected { reason: RejectReason, message: String },
    RemoteHangup,
    RemoteStream { kind: TrackKind },
    Link { state: LinkState },
    TrackToggled { kind: TrackKind, enabled: bool },
    Error { error: CallError, message: String },
    Info { message: String },
}

impl Notice {
    pub fn error(error: CallError) -> Self {
        let message = error.user_message();
        Notice::Error { error, message }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Notice::Info {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: CallState,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallState {
    pub local_id: String,
    pub glare: GlarePolicy,
    pub status: CallStatus,
    pub role: Role,
    pub pending: Option<PendingOffer>,
    pub op: Option<Operation>,
    /// The other client: the one we dialed, or the caller ringing us.
    pub remote_id: Option<String>,
}

impl CallState {
    pub fn new(local_id: impl Into<String>, glare: GlarePolicy) -> Self {
        Self {
            local_id: local_id.into(),
            glare,
            status: CallStatus::Idle,
            role: Role::None,
            pending: None,
            op: None,
            remote_id: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == CallStatus::Idle && self.op.is_none()
    }

    pub fn transition(&self, event: CallEvent) -> Transition {
        let mut next = self.clone();
        let mut effects = Vec::new();
        next.apply(event, &mut effects);
        Transition { next, effects }
    }

    fn apply(&mut self, event: CallEvent, fx: &mut Vec<Effect>) {
        match event {
            CallEvent::Start => self.on_start(None, fx),
            CallEvent::Call(target) => self.on_start(Some(target), fx),
            CallEvent::Accept => self.on_accept(fx),
            CallEvent::Reject => self.on_reject(fx),
            CallEvent::End => {
                if self.is_idle() {
                    debug!("End requested with no call in progress");
                } else {
                    self.teardown(true, fx);
                }
            }
            CallEvent::ToggleMedia(kind) => fx.push(Effect::ToggleTrack(kind)),
            CallEvent::Received(msg) => self.on_message(msg, fx),
            CallEvent::MediaReady => self.on_media_ready(fx),
            CallEvent::MediaFailed(err) => self.on_media_failed(err, fx),
            CallEvent::OfferReady(offer) => {
                if self.op != Some(Operation::Starting) {
                    debug!("Dropping offer produced outside of call start");
                    return;
                }
                self.op = None;
                self.role = Role::Initiator;
                self.set_status(CallStatus::Calling, fx);
                fx.push(Effect::Send(SignalingMessage::CallRequest {
                    caller_id: self.local_id.clone(),
                    callee_id: self.remote_id.clone(),
                    offer,
                }));
            }
            CallEvent::AnswerReady(answer) => {
                if self.op != Some(Operation::Accepting) {
                    debug!("Dropping answer produced outside of call accept");
                    return;
                }
                self.op = None;
                self.role = Role::Responder;
                self.pending = None;
                fx.push(Effect::Send(SignalingMessage::CallAnswer { answer }));
                self.set_status(CallStatus::Connected, fx);
            }
            CallEvent::NegotiationFailed(err) => self.on_negotiation_failed(err, fx),
            CallEvent::LocalCandidate(candidate) => match (self.status, self.op) {
                (CallStatus::Calling | CallStatus::Connected, _) | (_, Some(_)) => {
                    fx.push(Effect::Send(SignalingMessage::IceCandidate(candidate)));
                }
                _ => debug!("Dropping local candidate, no call in progress"),
            },
            CallEvent::RemoteTrack(kind) => {
                if matches!(self.status, CallStatus::Calling | CallStatus::Connected) {
                    info!("Received remote {kind} stream");
                    fx.push(Effect::Notify(Notice::RemoteStream { kind }));
                }
            }
            CallEvent::Link(state) => {
                if !self.is_idle() {
                    fx.push(Effect::Notify(Notice::Link { state }));
                }
            }
            CallEvent::SendFailed { message, error } => {
                let fatal = matches!(
                    message,
                    SignalingMessage::CallRequest { .. } | SignalingMessage::CallAnswer { .. }
                );
                if fatal && !self.is_idle() {
                    // the peer never learned about our side of the call
                    self.teardown(false, fx);
                }
                fx.push(Effect::Notify(Notice::error(error)));
            }
        }
    }

    fn on_start(&mut self, target: Option<String>, fx: &mut Vec<Effect>) {
        if !self.is_idle() {
            fx.push(Effect::Notify(Notice::info("A call is already in progress")));
            return;
        }
        if target.as_deref() == Some(self.local_id.as_str()) {
            fx.push(Effect::Notify(Notice::info("Cannot call yourself")));
            return;
        }
        self.remote_id = target;
        self.op = Some(Operation::Starting);
        fx.push(Effect::AcquireMedia);
    }

    fn on_accept(&mut self, fx: &mut Vec<Effect>) {
        if self.status != CallStatus::Ringing || self.op.is_some() || self.pending.is_none() {
            fx.push(Effect::Notify(Notice::info("There is no incoming call to accept")));
            return;
        }
        self.op = Some(Operation::Accepting);
        fx.push(Effect::AcquireMedia);
    }

    fn on_reject(&mut self, fx: &mut Vec<Effect>) {
        if self.status != CallStatus::Ringing || self.op.is_some() {
            fx.push(Effect::Notify(Notice::info("There is no incoming call to reject")));
            return;
        }
        fx.push(Effect::Send(SignalingMessage::rejected(RejectReason::Declined)));
        self.teardown(false, fx);
    }

    fn on_media_ready(&mut self, fx: &mut Vec<Effect>) {
        match self.op {
            Some(Operation::Starting) => fx.push(Effect::CreateOffer),
            Some(Operation::Accepting) => match self.pending.take() {
                Some(pending) => fx.push(Effect::CreateAnswer {
                    offer: pending.offer,
                    candidates: pending.candidates,
                }),
                None => {
                    fx.push(Effect::Send(SignalingMessage::rejected(RejectReason::Error)));
                    self.teardown(false, fx);
                }
            },
            None => {
                debug!("Media became ready with nothing waiting for it, releasing");
                fx.push(Effect::Release);
            }
        }
    }

    fn on_media_failed(&mut self, err: CallError, fx: &mut Vec<Effect>) {
        match self.op {
            Some(Operation::Starting) => {
                self.op = None;
                self.remote_id = None;
                fx.push(Effect::Release);
            }
            Some(Operation::Accepting) => {
                fx.push(Effect::Send(SignalingMessage::rejected(RejectReason::Error)));
                self.teardown(false, fx);
            }
            None => return,
        }
        fx.push(Effect::Notify(Notice::error(err)));
    }

    fn on_negotiation_failed(&mut self, err: CallError, fx: &mut Vec<Effect>) {
        match (self.status, self.op) {
            (_, Some(Operation::Starting)) => {
                // nothing was sent yet, the peer does not know about this call
                self.op = None;
                self.remote_id = None;
                fx.push(Effect::Release);
            }
            (CallStatus::Idle, None) => return,
            _ => self.teardown(true, fx),
        }
        fx.push(Effect::Notify(Notice::error(err)));
    }

    fn on_message(&mut self, msg: SignalingMessage, fx: &mut Vec<Effect>) {
        match msg {
            SignalingMessage::CallRequest {
                caller_id,
                callee_id,
                offer,
            } => self.on_request(caller_id, callee_id, offer, fx),
            SignalingMessage::CallAnswer { answer } => {
                if self.status != CallStatus::Calling {
                    debug!("Ignoring call answer while {}", self.status);
                    return;
                }
                fx.push(Effect::ApplyAnswer(answer));
                self.set_status(CallStatus::Connected, fx);
            }
            SignalingMessage::CallRejected { reason } => {
                if self.status != CallStatus::Calling {
                    debug!("Ignoring call rejection ({reason}) while {}", self.status);
                    return;
                }
                info!("Call rejected by remote: {reason}");
                fx.push(Effect::Notify(Notice::Rejected {
                    reason,
                    message: reason.describe().to_string(),
                }));
                self.teardown(false, fx);
            }
            SignalingMessage::IceCandidate(candidate) => match self.status {
                CallStatus::Idle | CallStatus::Ended => {
                    debug!("Dropping remote candidate, no call in progress")
                }
                CallStatus::Ringing => {
                    if let Some(pending) = self.pending.as_mut() {
                        pending.candidates.push(candidate);
                    }
                }
                CallStatus::Calling | CallStatus::Connected => {
                    fx.push(Effect::ApplyCandidate(candidate))
                }
            },
            SignalingMessage::CallEnded => {
                if self.is_idle() {
                    debug!("Remote ended a call we are not part of");
                    return;
                }
                info!("Other user ended the call");
                fx.push(Effect::Notify(Notice::RemoteHangup));
                self.teardown(false, fx);
            }
        }
    }

    fn on_request(
        &mut self,
        caller_id: String,
        callee_id: Option<String>,
        offer: SessionDescription,
        fx: &mut Vec<Effect>,
    ) {
        if caller_id == self.local_id {
            debug!("Ignoring our own call request");
            return;
        }
        if callee_id.as_deref().is_some_and(|callee| callee != self.local_id) {
            debug!("Ignoring call request from {caller_id} addressed to another client");
            return;
        }
        if self.is_idle() {
            self.ring(caller_id, offer, fx);
            return;
        }

        // glare only with the client we are dialing ourselves
        let glare = self.status == CallStatus::Calling
            && self.op.is_none()
            && self.glare == GlarePolicy::TieBreak
            && self.remote_id.as_deref() == Some(caller_id.as_str());
        if glare && self.local_id.as_str() < caller_id.as_str() {
            info!("Glare with {caller_id}: yielding to the incoming call");
            fx.push(Effect::Release);
            self.role = Role::None;
            self.ring(caller_id, offer, fx);
            return;
        }

        if glare {
            info!("Glare with {caller_id}: keeping our outgoing call");
        } else {
            info!("Rejecting call from {caller_id}: busy ({})", self.status);
        }
        fx.push(Effect::Send(SignalingMessage::rejected(RejectReason::Busy)));
    }

    fn ring(&mut self, caller_id: String, offer: SessionDescription, fx: &mut Vec<Effect>) {
        info!("Incoming call from {caller_id}");
        self.remote_id = Some(caller_id.clone());
        self.pending = Some(PendingOffer {
            caller_id: caller_id.clone(),
            offer,
            candidates: Vec::new(),
        });
        fx.push(Effect::Notify(Notice::IncomingCall { caller_id }));
        self.set_status(CallStatus::Ringing, fx);
    }

    /// Back to idle. `notify_peer` sends `call_ended` first.
    fn teardown(&mut self, notify_peer: bool, fx: &mut Vec<Effect>) {
        if notify_peer {
            fx.push(Effect::Send(SignalingMessage::CallEnded));
        }
        fx.push(Effect::Release);
        let was_active = self.status != CallStatus::Idle;
        self.role = Role::None;
        self.pending = None;
        self.op = None;
        self.remote_id = None;
        if was_active {
            self.set_status(CallStatus::Ended, fx);
        }
        self.set_status(CallStatus::Idle, fx);
    }

    fn set_status(&mut self, status: CallStatus, fx: &mut Vec<Effect>) {
        if self.status == status {
            return;
        }
        debug!("Call status {} -> {}", self.status, status);
        self.status = status;
        fx.push(Effect::Notify(Notice::StatusChanged { status }));
    }
}
