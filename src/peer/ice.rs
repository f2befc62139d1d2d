use crate::errors::{CallError, Result};
use crate::peer::connection::build_api;
use crate::peer::types::{IceServerKind, ServerConfig};
use crate::utils::add_ice_url_scheme;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
}

impl CandidateType {
    /// Reads the `typ` attribute of an SDP candidate line.
    pub fn parse(candidate: &str) -> Option<Self> {
        let mut parts = candidate.split_whitespace();
        while let Some(part) = parts.next() {
            if part == "typ" {
                return match parts.next()? {
                    "host" => Some(CandidateType::Host),
                    "srflx" => Some(CandidateType::ServerReflexive),
                    "prflx" => Some(CandidateType::PeerReflexive),
                    "relay" => Some(CandidateType::Relay),
                    _ => None,
                };
            }
        }
        None
    }
}

/// Per-call count of gathered local candidates by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateTally {
    pub host: usize,
    pub srflx: usize,
    pub prflx: usize,
    pub relay: usize,
    pub unknown: usize,
}

impl CandidateTally {
    pub fn record(&mut self, candidate: &str) {
        match CandidateType::parse(candidate) {
            Some(CandidateType::Host) => self.host += 1,
            Some(CandidateType::ServerReflexive) => self.srflx += 1,
            Some(CandidateType::PeerReflexive) => self.prflx += 1,
            Some(CandidateType::Relay) => self.relay += 1,
            None => self.unknown += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.host + self.srflx + self.prflx + self.relay + self.unknown
    }

    pub fn log_summary(&self) {
        info!(
            "Candidate analysis: {} host, {} srflx, {} prflx, {} relay",
            self.host, self.srflx, self.prflx, self.relay
        );
        if self.relay == 0 {
            warn!("No TURN relay candidates found! Connection through NAT may fail.");
        }
    }
}

/// Checks that an ICE server answers by gathering against it alone.
///
/// STUN servers must yield a server-reflexive candidate, TURN servers a relay
/// candidate, before `wait` runs out.
pub async fn check_server_availability(server: &ServerConfig, wait: Duration) -> Result<bool> {
    let url = add_ice_url_scheme(server);
    debug!("Probing ICE server {} ({url})", server.id);

    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls: vec![url],
            username: server.username.clone().unwrap_or_default(),
            credential: server.credential.clone().unwrap_or_default(),
        }],
        ..Default::default()
    };
    let api = build_api()?;
    let pc = api.new_peer_connection(config).await?;

    let wanted = match server.kind {
        IceServerKind::Stun => CandidateType::ServerReflexive,
        IceServerKind::Turn => CandidateType::Relay,
    };

    let (found_tx, mut found_rx) = mpsc::channel::<bool>(4);
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let tx = found_tx.clone();
        Box::pin(async move {
            let Some(candidate) = candidate else { return };
            if let Ok(init) = candidate.to_json() {
                if CandidateType::parse(&init.candidate) == Some(wanted) {
                    let _ = tx.send(true).await;
                }
            }
        })
    }));
    pc.on_ice_gathering_state_change(Box::new(move |state| {
        let tx = done_tx.clone();
        Box::pin(async move {
            if state == RTCIceGathererState::Complete {
                let _ = tx.send(()).await;
            }
        })
    }));

    // a data channel gives the offer something to gather for
    pc.create_data_channel("probe", None).await?;
    let offer = pc.create_offer(None).await?;
    pc.set_local_description(offer).await?;

    let outcome = tokio::select! {
        found = timeout(wait, found_rx.recv()) => matches!(found, Ok(Some(true))),
        _ = done_rx.recv() => {
            // gathering may finish right after the matching candidate
            matches!(found_rx.try_recv(), Ok(true))
        }
    };

    if let Err(e) = pc.close().await {
        warn!("Failed to close probe connection: {e}");
    }
    info!(
        "ICE server {} {}",
        server.id,
        if outcome { "is reachable" } else { "did not respond" }
    );
    Ok(outcome)
}

/// Validates then probes; configuration errors are reported, not probed.
pub async fn probe(server: &ServerConfig, wait: Duration) -> Result<bool> {
    crate::config::validate_ice_servers(std::slice::from_ref(server))?;
    if wait.is_zero() {
        return Err(CallError::Config("probe timeout must be positive".into()));
    }
    check_server_availability(server, wait).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candidate_types() {
        let host = "candidate:1 1 udp 2130706431 192.168.1.5 54321 typ host";
        let srflx = "candidate:2 1 udp 1694498815 203.0.113.7 40000 typ srflx raddr 0.0.0.0 rport 0";
        let relay = "candidate:3 1 udp 16777215 198.51.100.2 3478 typ relay raddr 203.0.113.7 rport 40000";
        assert_eq!(CandidateType::parse(host), Some(CandidateType::Host));
        assert_eq!(CandidateType::parse(srflx), Some(CandidateType::ServerReflexive));
        assert_eq!(CandidateType::parse(relay), Some(CandidateType::Relay));
        assert_eq!(CandidateType::parse("candidate:4 1 udp 1 1.2.3.4 1"), None);
    }

    #[test]
    fn tally_counts_by_type() {
        let mut tally = CandidateTally::default();
        tally.record("candidate:1 1 udp 2130706431 192.168.1.5 54321 typ host");
        tally.record("candidate:1 2 udp 2130706430 192.168.1.5 54322 typ host");
        tally.record("candidate:2 1 udp 1694498815 203.0.113.7 40000 typ srflx");
        tally.record("garbage");
        assert_eq!(tally.host, 2);
        assert_eq!(tally.srflx, 1);
        assert_eq!(tally.unknown, 1);
        assert_eq!(tally.total(), 4);
    }

    #[tokio::test]
    async fn probe_rejects_turn_without_credentials() {
        let server = ServerConfig {
            id: "relay".into(),
            kind: IceServerKind::Turn,
            url: "relay.example.org:3478".into(),
            username: None,
            credential: None,
        };
        let err = probe(&server, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CallError::Config(_)));
    }
}
