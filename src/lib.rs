//! peercall: signaling coordinator for two-party audio/video calls.
//!
//! The [`CallCoordinator`] keeps exactly one call at a time and walks it
//! through `idle → calling/ringing → connected → idle`, exchanging
//! `call_request`, `call_answer`, `call_rejected`, `ice_candidate` and
//! `call_ended` messages over any [`SignalingTransport`]. Media capture and
//! the peer connection are capabilities ([`MediaCapture`], [`PeerFactory`]);
//! [`peer`] implements them on top of webrtc-rs.
//!
//! ```rust,ignore
//! let config = peercall::CallConfig::default();
//! let ((transport, inbox), _remote) = ChannelTransport::pair(config.wire_format);
//! let (coordinator, handle, mut notices) = CallCoordinator::new(
//!     config.clone(),
//!     WebRtcMedia::new(DeviceAvailability::all()),
//!     WebRtcPeerFactory::new(&config)?,
//!     transport,
//! );
//! tokio::spawn(coordinator.run());
//! inbox.forward_to(handle.clone());
//! handle.start_call().await?;
//! ```

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod errors;
pub mod logger;
pub mod machine;
pub mod peer;
pub mod session;
pub mod signaling;
pub mod transport;
pub mod utils;

#[cfg(feature = "desktop")]
pub mod commands;

pub use codec::WireFormat;
pub use config::{CallConfig, GlarePolicy, MediaConstraints};
pub use coordinator::{CallCoordinator, CallHandle, Command};
pub use errors::{CallError, Result};
pub use machine::{CallEvent, CallState, Effect, Notice};
pub use peer::{
    DeviceAvailability, IceCandidate, LinkState, LocalStream, MediaCapture, PeerConnection,
    PeerEvent, PeerEvents, PeerFactory, SessionDescription, TrackKind, WebRtcMedia,
    WebRtcPeerFactory,
};
pub use session::{CallStatus, Role};
pub use signaling::{RejectReason, SignalingMessage};
pub use transport::{ChannelTransport, Inbox, SignalingTransport};

#[cfg(feature = "desktop")]
pub use commands::init;
