#![allow(dead_code)]

use async_trait::async_trait;
use peercall::config::MediaConstraints;
use peercall::{
    CallCoordinator, CallError, CallHandle, CallStatus, IceCandidate, LocalStream, MediaCapture,
    Notice, PeerConnection, PeerEvent, PeerEvents, PeerFactory, Result, SessionDescription,
    SignalingMessage, SignalingTransport, TrackKind,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared record of what the fake capabilities were asked to do.
#[derive(Default)]
pub struct Ledger {
    pub calls: Mutex<Vec<String>>,
    pub open_streams: AtomicUsize,
    pub open_peers: AtomicUsize,
    pub peers_created: AtomicUsize,
    pub last_events: Mutex<Option<PeerEvents>>,
}

impl Ledger {
    fn push(&self, entry: impl Into<String>) {
        self.calls.lock().unwrap().push(entry.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn holds_nothing(&self) -> bool {
        self.open_streams.load(Ordering::SeqCst) == 0 && self.open_peers.load(Ordering::SeqCst) == 0
    }
}

pub struct FakeMedia {
    ledger: Arc<Ledger>,
    pub deny: Arc<AtomicBool>,
}

pub struct FakeStream {
    ledger: Arc<Ledger>,
    audio: bool,
    video: bool,
    stopped: bool,
}

impl LocalStream for FakeStream {
    fn kinds(&self) -> Vec<TrackKind> {
        vec![TrackKind::Audio, TrackKind::Video]
    }

    fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        Some(match kind {
            TrackKind::Audio => self.audio,
            TrackKind::Video => self.video,
        })
    }

    fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> bool {
        match kind {
            TrackKind::Audio => self.audio = enabled,
            TrackKind::Video => self.video = enabled,
        }
        true
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.ledger.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl MediaCapture for FakeMedia {
    type Stream = FakeStream;

    async fn get_user_media(&self, _constraints: &MediaConstraints) -> Result<FakeStream> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(CallError::MediaAccess("permission denied".into()));
        }
        self.ledger.open_streams.fetch_add(1, Ordering::SeqCst);
        self.ledger.push("get_user_media");
        Ok(FakeStream {
            ledger: Arc::clone(&self.ledger),
            audio: true,
            video: true,
            stopped: false,
        })
    }
}

pub struct FakePeerFactory {
    ledger: Arc<Ledger>,
}

pub struct FakePeer {
    id: usize,
    ledger: Arc<Ledger>,
    events: PeerEvents,
    remote_set: AtomicBool,
    closed: AtomicBool,
}

pub const BAD_SDP: &str = "bad-sdp";

pub fn host_candidate(n: usize) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2130706431 10.0.0.{n} 5000{n} typ host"),
        sdp_mid: Some("0".into()),
        sdp_mline_index: Some(0),
    }
}

#[async_trait]
impl PeerFactory for FakePeerFactory {
    type Peer = FakePeer;

    async fn new_peer(&self, events: PeerEvents) -> Result<FakePeer> {
        let id = self.ledger.peers_created.fetch_add(1, Ordering::SeqCst) + 1;
        self.ledger.open_peers.fetch_add(1, Ordering::SeqCst);
        self.ledger.push(format!("new_peer#{id}"));
        *self.ledger.last_events.lock().unwrap() = Some(events.clone());
        Ok(FakePeer {
            id,
            ledger: Arc::clone(&self.ledger),
            events,
            remote_set: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    type Stream = FakeStream;

    async fn add_tracks(&self, _stream: &FakeStream) -> Result<()> {
        self.ledger.push(format!("add_tracks#{}", self.id));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(format!("offer-from-peer-{}", self.id)))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::answer(format!("answer-from-peer-{}", self.id)))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        self.ledger.push(format!("set_local#{}:{}", self.id, desc.sdp));
        // gathering starts once the local description is set
        self.events
            .emit(PeerEvent::LocalCandidate(host_candidate(self.id)));
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        if desc.sdp == BAD_SDP {
            return Err(CallError::Negotiation("malformed remote description".into()));
        }
        self.ledger.push(format!("set_remote#{}:{}", self.id, desc.sdp));
        self.remote_set.store(true, Ordering::SeqCst);
        self.events.emit(PeerEvent::RemoteTrack(TrackKind::Video));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        if !self.remote_set.load(Ordering::SeqCst) {
            return Err(CallError::CandidateApply("remote description not set".into()));
        }
        self.ledger
            .push(format!("add_candidate#{}:{}", self.id, candidate.candidate));
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.ledger.open_peers.fetch_sub(1, Ordering::SeqCst);
            self.ledger.push(format!("close#{}", self.id));
        }
    }
}

/// Transport that just remembers what was published.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<SignalingMessage>>>,
    pub broken: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<SignalingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<SignalingMessage> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }
}

#[async_trait]
impl SignalingTransport for RecordingTransport {
    async fn publish(&self, message: &SignalingMessage) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(CallError::Transport("socket closed".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct Fakes {
    pub ledger: Arc<Ledger>,
    pub media: FakeMedia,
    pub peers: FakePeerFactory,
}

pub fn fakes() -> Fakes {
    let ledger = Arc::new(Ledger::default());
    Fakes {
        media: FakeMedia {
            ledger: Arc::clone(&ledger),
            deny: Arc::new(AtomicBool::new(false)),
        },
        peers: FakePeerFactory {
            ledger: Arc::clone(&ledger),
        },
        ledger,
    }
}

pub type TestCoordinator<T> = CallCoordinator<FakeMedia, FakePeerFactory, T>;

/// Coordinator driven by hand through `dispatch`, publishing into a recorder.
pub struct Client {
    pub coordinator: TestCoordinator<RecordingTransport>,
    pub handle: CallHandle,
    pub notices: mpsc::UnboundedReceiver<Notice>,
    pub transport: RecordingTransport,
    pub ledger: Arc<Ledger>,
    pub deny_media: Arc<AtomicBool>,
}

pub fn client(id: &str) -> Client {
    let Fakes {
        ledger,
        media,
        peers,
    } = fakes();
    let deny_media = Arc::clone(&media.deny);
    let transport = RecordingTransport::default();
    let (coordinator, handle, notices) = CallCoordinator::with_id(
        id,
        peercall::CallConfig::default(),
        media,
        peers,
        transport.clone(),
    );
    Client {
        coordinator,
        handle,
        notices,
        transport,
        ledger,
        deny_media,
    }
}

pub fn drain_notices(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}

pub async fn wait_status(handle: &CallHandle, status: CallStatus) {
    let mut rx = handle.watch_status();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {status}, still {}", handle.status()))
        .expect("coordinator stopped");
}

pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn expect_notice(
    rx: &mut mpsc::UnboundedReceiver<Notice>,
    what: &str,
    matches: impl Fn(&Notice) -> bool,
) -> Notice {
    let search = async {
        while let Some(notice) = rx.recv().await {
            if matches(&notice) {
                return notice;
            }
        }
        panic!("notice channel closed before {what}");
    };
    tokio::time::timeout(Duration::from_secs(5), search)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

pub fn request_from(caller_id: &str) -> SignalingMessage {
    SignalingMessage::CallRequest {
        caller_id: caller_id.into(),
        callee_id: None,
        offer: SessionDescription::offer(format!("offer-from-{caller_id}")),
    }
}
