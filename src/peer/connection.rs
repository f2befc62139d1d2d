use crate::config::CallConfig;
use crate::errors::{CallError, Result};
use crate::logger::dump_candidate;
use crate::peer::media::WebRtcStream;
use crate::peer::state::{LinkMonitor, StateProbe};
use crate::peer::types::{IceCandidate, SdpKind, ServerConfig, SessionDescription, TrackKind};
use crate::peer::{PeerConnection, PeerEvent, PeerEvents, PeerFactory};
use crate::utils::add_ice_url_scheme;
use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::rtcp_mux_policy::RTCRtcpMuxPolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

/// webrtc API with the default codecs and interceptors registered.
pub fn build_api() -> Result<API> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

/// Maps configured servers to webrtc ICE servers.
pub fn ice_servers(servers: &[ServerConfig]) -> Vec<RTCIceServer> {
    servers
        .iter()
        .map(|config| RTCIceServer {
            urls: vec![add_ice_url_scheme(config)],
            username: config.username.clone().unwrap_or_default(),
            credential: config.credential.clone().unwrap_or_default(),
        })
        .collect()
}

fn rtc_config(config: &CallConfig) -> RTCConfiguration {
    RTCConfiguration {
        ice_servers: ice_servers(&config.ice_servers),
        ice_candidate_pool_size: config.ice_candidate_pool_size,
        bundle_policy: RTCBundlePolicy::MaxBundle,
        rtcp_mux_policy: RTCRtcpMuxPolicy::Require,
        ..Default::default()
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let rtc = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp)?,
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp)?,
    };
    Ok(rtc)
}

fn from_rtc(desc: RTCSessionDescription) -> Result<SessionDescription> {
    match desc.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(desc.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(desc.sdp)),
        other => Err(CallError::Negotiation(format!(
            "unexpected description type {other}"
        ))),
    }
}

/// Creates one webrtc peer connection per call.
pub struct WebRtcPeerFactory {
    api: API,
    config: CallConfig,
}

impl WebRtcPeerFactory {
    pub fn new(config: &CallConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            api: build_api()?,
            config: config.clone(),
        })
    }

    fn grace_period(&self) -> Duration {
        self.config.grace_period()
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    type Peer = WebRtcPeer;

    async fn new_peer(&self, events: PeerEvents) -> Result<WebRtcPeer> {
        let pc = Arc::new(self.api.new_peer_connection(rtc_config(&self.config)).await?);
        debug!("PeerConnection created (generation {})", events.generation());

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE candidate gathering completed");
                    return;
                };
                dump_candidate("LOCAL", &candidate);
                match candidate.to_json() {
                    Ok(init) => events.emit(PeerEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_mline_index: init.sdp_mline_index,
                    })),
                    Err(e) => warn!("Could not serialize local candidate: {e}"),
                }
            })
        }));

        pc.on_ice_gathering_state_change(Box::new(move |state| {
            debug!("ICE gathering state changed to: {state:?}");
            Box::pin(async {})
        }));

        let track_events = events.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(TrackKind::Audio),
                RTPCodecType::Video => Some(TrackKind::Video),
                _ => None,
            };
            if let Some(kind) = kind {
                track_events.emit(PeerEvent::RemoteTrack(kind));
            }
            Box::pin(async {})
        }));

        let weak = Arc::downgrade(&pc);
        let probe: StateProbe = Arc::new(move || {
            weak.upgrade()
                .map(|pc| pc.connection_state())
                .unwrap_or(RTCPeerConnectionState::Closed)
        });
        let monitor = LinkMonitor::new(events, self.grace_period(), probe);
        let state_monitor = Arc::clone(&monitor);
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let monitor = Arc::clone(&state_monitor);
            Box::pin(async move { monitor.on_state(state).await })
        }));

        Ok(WebRtcPeer { pc, monitor })
    }
}

pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    monitor: Arc<LinkMonitor>,
}

impl WebRtcPeer {
    pub fn inner(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }
}

#[async_trait]
impl PeerConnection for WebRtcPeer {
    type Stream = WebRtcStream;

    async fn add_tracks(&self, stream: &WebRtcStream) -> Result<()> {
        for track in stream.sample_tracks() {
            let sender = self
                .pc
                .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
                .await?;
            // RTCP has to be read for interceptors like NACK to work
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        from_rtc(self.pc.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        from_rtc(self.pc.create_answer(None).await?)
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(desc)?).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| CallError::CandidateApply(e.to_string()))
    }

    async fn close(&self) {
        self.monitor.cancel().await;
        if let Err(e) = self.pc.close().await {
            warn!("Error closing peer connection: {e}");
        }
    }
}
