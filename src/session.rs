use crate::peer::ice::CandidateTally;
use crate::peer::{LocalStream, PeerConnection};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    #[default]
    Idle,
    Calling,
    Ringing,
    Connected,
    /// Announced when a call finishes; the session is back to idle right after.
    Ended,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallStatus::Idle => "idle",
            CallStatus::Calling => "calling",
            CallStatus::Ringing => "ringing",
            CallStatus::Connected => "connected",
            CallStatus::Ended => "ended",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    None,
    Initiator,
    Responder,
}

/// Resources held for the current call.
///
/// The session is the only owner of the local media stream and the peer
/// connection; [`Session::release`] drops both and moves to a new
/// generation so late callbacks from the old connection are ignored.
pub struct Session<S, P> {
    generation: u64,
    media: Option<S>,
    peer: Option<P>,
    candidates: CandidateTally,
}

impl<S, P> Default for Session<S, P> {
    fn default() -> Self {
        Self {
            generation: 0,
            media: None,
            peer: None,
            candidates: CandidateTally::default(),
        }
    }
}

impl<S: LocalStream, P: PeerConnection> Session<S, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn media(&self) -> Option<&S> {
        self.media.as_ref()
    }

    pub fn media_mut(&mut self) -> Option<&mut S> {
        self.media.as_mut()
    }

    pub fn set_media(&mut self, stream: S) {
        if let Some(mut old) = self.media.replace(stream) {
            old.stop();
        }
    }

    pub fn peer(&self) -> Option<&P> {
        self.peer.as_ref()
    }

    pub fn set_peer(&mut self, peer: P) {
        self.peer = Some(peer);
    }

    pub fn has_peer(&self) -> bool {
        self.peer.is_some()
    }

    pub fn holds_resources(&self) -> bool {
        self.media.is_some() || self.peer.is_some()
    }

    pub fn note_local_candidate(&mut self, candidate: &str) {
        self.candidates.record(candidate);
    }

    /// Close the peer connection and stop local tracks. Safe to call twice.
    pub async fn release(&mut self) {
        if let Some(peer) = self.peer.take() {
            peer.close().await;
            debug!("Peer connection closed");
        }
        if let Some(mut media) = self.media.take() {
            media.stop();
            debug!("Local media tracks stopped");
        }
        if self.candidates.total() > 0 {
            self.candidates.log_summary();
        }
        self.candidates = CandidateTally::default();
        self.generation += 1;
    }
}
