use crate::peer::types::LinkState;
use crate::peer::{PeerEvent, PeerEvents};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// Reports the current connection state when the grace period runs out.
pub type StateProbe = Arc<dyn Fn() -> RTCPeerConnectionState + Send + Sync>;

/// Turns raw peer connection state changes into [`LinkState`] events.
///
/// A disconnected or failed link is reported as interrupted right away and
/// only reported failed once the grace period passes without it coming back.
pub struct LinkMonitor {
    events: PeerEvents,
    grace: Duration,
    probe: StateProbe,
    pending: Mutex<Option<JoinHandle<()>>>,
    interrupted: Mutex<bool>,
}

impl LinkMonitor {
    pub fn new(events: PeerEvents, grace: Duration, probe: StateProbe) -> Arc<Self> {
        Arc::new(Self {
            events,
            grace,
            probe,
            pending: Mutex::new(None),
            interrupted: Mutex::new(false),
        })
    }

    pub async fn on_state(self: &Arc<Self>, state: RTCPeerConnectionState) {
        debug!("Peer connection state changed to: {state:?}");
        match state {
            RTCPeerConnectionState::Connected => {
                if let Some(handle) = self.pending.lock().await.take() {
                    debug!("Aborting pending link failure check");
                    handle.abort();
                }
                let mut interrupted = self.interrupted.lock().await;
                if *interrupted {
                    *interrupted = false;
                    info!("Peer link recovered");
                    self.events.emit(PeerEvent::Link(LinkState::Recovered));
                }
                self.events.emit(PeerEvent::Link(LinkState::Connected));
            }
            RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                let mut pending = self.pending.lock().await;
                if pending.is_some() {
                    debug!("Grace period already running");
                    return;
                }
                *self.interrupted.lock().await = true;
                warn!("Peer link {state:?}, waiting {}s for recovery", self.grace.as_secs());
                self.events.emit(PeerEvent::Link(LinkState::Interrupted));

                let monitor = Arc::clone(self);
                *pending = Some(tokio::spawn(async move {
                    sleep(monitor.grace).await;
                    let now = (monitor.probe)();
                    if now != RTCPeerConnectionState::Connected {
                        warn!("Peer link did not recover (state={now:?})");
                        monitor.events.emit(PeerEvent::Link(LinkState::Failed));
                    }
                    monitor.pending.lock().await.take();
                }));
            }
            RTCPeerConnectionState::Closed => {
                self.cancel().await;
                self.events.emit(PeerEvent::Link(LinkState::Closed));
            }
            _ => {}
        }
    }

    /// Stops a running grace period without reporting anything.
    pub async fn cancel(&self) {
        if let Some(handle) = self.pending.lock().await.take() {
            handle.abort();
        }
    }
}
