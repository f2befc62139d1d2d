//! Capabilities the coordinator drives, and their webrtc-rs implementation.
//!
//! The coordinator only ever talks to [`MediaCapture`], [`PeerFactory`] and
//! [`PeerConnection`]; everything webrtc specific stays in this module.

pub mod connection;
pub mod ice;
pub mod media;
pub mod state;
pub mod types;

use crate::config::MediaConstraints;
use crate::errors::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

pub use connection::{WebRtcPeer, WebRtcPeerFactory};
pub use media::{DeviceAvailability, WebRtcMedia, WebRtcStream};
pub use types::{IceCandidate, LinkState, SdpKind, ServerConfig, SessionDescription, TrackKind};

/// Owned set of captured audio/video tracks.
pub trait LocalStream: Send + Sync + 'static {
    fn kinds(&self) -> Vec<TrackKind>;

    /// `None` when the stream has no track of that kind.
    fn is_enabled(&self, kind: TrackKind) -> Option<bool>;

    /// Returns false when the stream has no track of that kind.
    fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> bool;

    /// Stops every track. Called once when the session releases the stream.
    fn stop(&mut self);
}

#[async_trait]
pub trait MediaCapture: Send + Sync + 'static {
    type Stream: LocalStream;

    /// Fails with `CallError::MediaAccess` on denied permission or missing device.
    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<Self::Stream>;
}

#[async_trait]
pub trait PeerConnection: Send + Sync + 'static {
    type Stream: LocalStream;

    async fn add_tracks(&self, stream: &Self::Stream) -> Result<()>;
    async fn create_offer(&self) -> Result<SessionDescription>;
    async fn create_answer(&self) -> Result<SessionDescription>;
    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;
    async fn close(&self);
}

#[async_trait]
pub trait PeerFactory: Send + Sync + 'static {
    type Peer: PeerConnection;

    async fn new_peer(&self, events: PeerEvents) -> Result<Self::Peer>;
}

/// Asynchronous notifications raised by a peer connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    RemoteTrack(TrackKind),
    Link(LinkState),
}

/// Sink handed to a new peer connection. Every event is tagged with the call
/// generation the peer was created for, so events from a connection that has
/// since been torn down can be told apart.
#[derive(Debug, Clone)]
pub struct PeerEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, PeerEvent)>,
}

impl PeerEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, PeerEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: PeerEvent) {
        // receiver gone means the coordinator stopped; nothing left to notify
        let _ = self.tx.send((self.generation, event));
    }
}
