//! Async driver around [`CallState`].
//!
//! One task owns the state machine and the [`Session`]. UI intents and
//! inbound signaling arrive as commands through a [`CallHandle`]; peer
//! connection callbacks arrive on a second channel. Every input is handled
//! to completion, follow-up events included, before the next one is read.

use crate::config::CallConfig;
use crate::errors::{CallError, Result};
use crate::machine::{CallEvent, CallState, Effect, Notice, Transition};
use crate::peer::types::{IceCandidate, SessionDescription, TrackKind};
use crate::peer::{LocalStream, MediaCapture, PeerConnection, PeerEvent, PeerEvents, PeerFactory};
use crate::session::{CallStatus, Session};
use crate::signaling::SignalingMessage;
use crate::transport::SignalingTransport;
use crate::utils::random_id;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

const COMMAND_QUEUE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Start a call addressed to one client id.
    Call(String),
    Accept,
    Reject,
    End,
    Toggle(TrackKind),
    /// Inbound message from the signaling transport.
    Deliver(SignalingMessage),
}

impl From<Command> for CallEvent {
    fn from(command: Command) -> Self {
        match command {
            Command::Start => CallEvent::Start,
            Command::Call(target) => CallEvent::Call(target),
            Command::Accept => CallEvent::Accept,
            Command::Reject => CallEvent::Reject,
            Command::End => CallEvent::End,
            Command::Toggle(kind) => CallEvent::ToggleMedia(kind),
            Command::Deliver(message) => CallEvent::Received(message),
        }
    }
}

struct Request {
    command: Command,
    done: oneshot::Sender<CallStatus>,
}

/// Cloneable handle for the UI layer and the transport subscription.
///
/// Every method resolves once the command has been fully processed and
/// returns the call status at that point.
#[derive(Clone)]
pub struct CallHandle {
    tx: mpsc::Sender<Request>,
    status: watch::Receiver<CallStatus>,
    local_id: Arc<str>,
}

impl CallHandle {
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn status(&self) -> CallStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<CallStatus> {
        self.status.clone()
    }

    pub async fn submit(&self, command: Command) -> Result<CallStatus> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Request { command, done })
            .await
            .map_err(|_| CallError::Closed)?;
        rx.await.map_err(|_| CallError::Closed)
    }

    pub async fn start_call(&self) -> Result<CallStatus> {
        self.submit(Command::Start).await
    }

    /// Like [`CallHandle::start_call`], but only `target` will ring.
    pub async fn call(&self, target: impl Into<String>) -> Result<CallStatus> {
        self.submit(Command::Call(target.into())).await
    }

    pub async fn accept_call(&self) -> Result<CallStatus> {
        self.submit(Command::Accept).await
    }

    pub async fn reject_call(&self) -> Result<CallStatus> {
        self.submit(Command::Reject).await
    }

    pub async fn end_call(&self) -> Result<CallStatus> {
        self.submit(Command::End).await
    }

    pub async fn toggle_audio(&self) -> Result<CallStatus> {
        self.submit(Command::Toggle(TrackKind::Audio)).await
    }

    pub async fn toggle_video(&self) -> Result<CallStatus> {
        self.submit(Command::Toggle(TrackKind::Video)).await
    }

    pub async fn deliver(&self, message: SignalingMessage) -> Result<CallStatus> {
        self.submit(Command::Deliver(message)).await
    }
}

pub struct CallCoordinator<M, F, T>
where
    M: MediaCapture,
    F: PeerFactory,
    F::Peer: PeerConnection<Stream = M::Stream>,
    T: SignalingTransport,
{
    config: CallConfig,
    state: CallState,
    session: Session<M::Stream, F::Peer>,
    media: M,
    peers: F,
    transport: T,
    requests: mpsc::Receiver<Request>,
    peer_tx: mpsc::UnboundedSender<(u64, PeerEvent)>,
    peer_rx: mpsc::UnboundedReceiver<(u64, PeerEvent)>,
    notices: mpsc::UnboundedSender<Notice>,
    status_tx: watch::Sender<CallStatus>,
}

impl<M, F, T> CallCoordinator<M, F, T>
where
    M: MediaCapture,
    F: PeerFactory,
    F::Peer: PeerConnection<Stream = M::Stream>,
    T: SignalingTransport,
{
    pub fn new(
        config: CallConfig,
        media: M,
        peers: F,
        transport: T,
    ) -> (Self, CallHandle, mpsc::UnboundedReceiver<Notice>) {
        Self::with_id(random_id(), config, media, peers, transport)
    }

    /// Like [`CallCoordinator::new`] with a fixed client id.
    pub fn with_id(
        local_id: impl Into<String>,
        config: CallConfig,
        media: M,
        peers: F,
        transport: T,
    ) -> (Self, CallHandle, mpsc::UnboundedReceiver<Notice>) {
        let local_id = local_id.into();
        let (tx, requests) = mpsc::channel(COMMAND_QUEUE);
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(CallStatus::Idle);

        let handle = CallHandle {
            tx,
            status: status_rx,
            local_id: Arc::from(local_id.as_str()),
        };
        let coordinator = Self {
            state: CallState::new(local_id, config.glare),
            config,
            session: Session::new(),
            media,
            peers,
            transport,
            requests,
            peer_tx,
            peer_rx,
            notices,
            status_tx,
        };
        (coordinator, handle, notice_rx)
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    pub fn session(&self) -> &Session<M::Stream, F::Peer> {
        &self.session
    }

    /// Runs until every [`CallHandle`] is dropped, then releases what the call still holds.
    pub async fn run(mut self) {
        info!("Call coordinator {} running", self.state.local_id);
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request { command, done }) => {
                        let status = self.dispatch(command).await;
                        let _ = done.send(status);
                    }
                    None => break,
                },
                Some((generation, event)) = self.peer_rx.recv() => {
                    self.on_peer_event(generation, event).await;
                }
            }
        }
        self.session.release().await;
        info!("Call coordinator {} stopped", self.state.local_id);
    }

    /// Processes one command to completion without the event loop.
    pub async fn dispatch(&mut self, command: Command) -> CallStatus {
        self.handle(command.into()).await;
        self.state.status
    }

    /// Handles peer connection events that are already queued.
    pub async fn drain_peer_events(&mut self) {
        while let Ok((generation, event)) = self.peer_rx.try_recv() {
            self.on_peer_event(generation, event).await;
        }
    }

    async fn on_peer_event(&mut self, generation: u64, event: PeerEvent) {
        if !self.session.is_current(generation) {
            debug!("Dropping {event:?} from a closed peer connection");
            return;
        }
        let event = match event {
            PeerEvent::LocalCandidate(candidate) => {
                self.session.note_local_candidate(&candidate.candidate);
                CallEvent::LocalCandidate(candidate)
            }
            PeerEvent::RemoteTrack(kind) => CallEvent::RemoteTrack(kind),
            PeerEvent::Link(state) => CallEvent::Link(state),
        };
        self.handle(event).await;
    }

    async fn handle(&mut self, event: CallEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let Transition { next, effects } = self.state.transition(event);
            self.state = next;
            self.status_tx.send_replace(self.state.status);
            for effect in effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<CallEvent> {
        match effect {
            Effect::AcquireMedia => match self.media.get_user_media(&self.config.media).await {
                Ok(stream) => {
                    self.session.set_media(stream);
                    Some(CallEvent::MediaReady)
                }
                Err(e) => {
                    warn!("Error accessing media devices: {e}");
                    Some(CallEvent::MediaFailed(e))
                }
            },
            Effect::CreateOffer => Some(match self.create_offer().await {
                Ok(offer) => {
                    info!("Offer created");
                    CallEvent::OfferReady(offer)
                }
                Err(e) => CallEvent::NegotiationFailed(negotiation(e)),
            }),
            Effect::CreateAnswer { offer, candidates } => {
                Some(match self.create_answer(offer, candidates).await {
                    Ok(answer) => {
                        info!("Answer created");
                        CallEvent::AnswerReady(answer)
                    }
                    Err(e) => CallEvent::NegotiationFailed(negotiation(e)),
                })
            }
            Effect::ApplyAnswer(answer) => self
                .apply_answer(answer)
                .await
                .err()
                .map(|e| CallEvent::NegotiationFailed(negotiation(e))),
            Effect::ApplyCandidate(candidate) => {
                self.apply_candidate(candidate).await;
                None
            }
            Effect::ToggleTrack(kind) => {
                self.toggle(kind);
                None
            }
            Effect::Send(message) => match self.transport.publish(&message).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to send {}: {e}", message.event_name());
                    Some(CallEvent::SendFailed { message, error: e })
                }
            },
            Effect::Release => {
                self.session.release().await;
                None
            }
            Effect::Notify(notice) => {
                self.notify(notice);
                None
            }
        }
    }

    /// Creates the peer connection for the current generation and attaches local tracks.
    async fn open_peer(&mut self) -> Result<&F::Peer> {
        if !self.session.has_peer() {
            let events = PeerEvents::new(self.session.generation(), self.peer_tx.clone());
            let peer = self.peers.new_peer(events).await?;
            if let Some(media) = self.session.media() {
                if let Err(e) = peer.add_tracks(media).await {
                    peer.close().await;
                    return Err(e);
                }
            }
            self.session.set_peer(peer);
        }
        self.session
            .peer()
            .ok_or_else(|| CallError::Negotiation("peer connection missing".into()))
    }

    async fn create_offer(&mut self) -> Result<SessionDescription> {
        let peer = self.open_peer().await?;
        let offer = peer.create_offer().await?;
        peer.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    async fn create_answer(
        &mut self,
        offer: SessionDescription,
        candidates: Vec<IceCandidate>,
    ) -> Result<SessionDescription> {
        let peer = self.open_peer().await?;
        peer.set_remote_description(offer).await?;
        for candidate in candidates {
            if let Err(e) = peer.add_ice_candidate(candidate).await {
                warn!("Ignoring held candidate: {e}");
            }
        }
        let answer = peer.create_answer().await?;
        peer.set_local_description(answer.clone()).await?;
        Ok(answer)
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<()> {
        let peer = self.open_peer().await?;
        peer.set_remote_description(answer).await
    }

    async fn apply_candidate(&mut self, candidate: IceCandidate) {
        match self.session.peer() {
            Some(peer) => match peer.add_ice_candidate(candidate).await {
                Ok(()) => debug!("ICE candidate added"),
                Err(e) => warn!("Ignoring remote candidate: {e}"),
            },
            None => debug!("No peer connection yet, dropping remote candidate"),
        }
    }

    fn toggle(&mut self, kind: TrackKind) {
        let notice = match self.session.media_mut() {
            None => Notice::info("Start a call before toggling media"),
            Some(media) => match media.is_enabled(kind) {
                Some(enabled) => {
                    media.set_enabled(kind, !enabled);
                    info!("Local {kind} track {}", if enabled { "disabled" } else { "enabled" });
                    Notice::TrackToggled {
                        kind,
                        enabled: !enabled,
                    }
                }
                None => Notice::info(format!("No local {kind} track")),
            },
        };
        self.notify(notice);
    }

    fn notify(&self, notice: Notice) {
        if let Notice::Error { message, .. } = &notice {
            info!("{message}");
        }
        // nobody listening is fine
        let _ = self.notices.send(notice);
    }
}

fn negotiation(err: CallError) -> CallError {
    match err {
        CallError::Negotiation(_) => err,
        other => CallError::Negotiation(other.to_string()),
    }
}
