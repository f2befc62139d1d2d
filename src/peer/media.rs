use crate::config::MediaConstraints;
use crate::errors::{CallError, Result};
use crate::peer::types::TrackKind;
use crate::peer::{LocalStream, MediaCapture};
use crate::utils::random_id;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

/// Which capture devices the host exposes, and whether the user allowed access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAvailability {
    pub permission_granted: bool,
    pub microphone: bool,
    pub camera: bool,
}

impl DeviceAvailability {
    pub fn all() -> Self {
        Self {
            permission_granted: true,
            microphone: true,
            camera: true,
        }
    }
}

/// Media capture backed by sample tracks.
///
/// The host application owns the actual devices and encoders; it pushes
/// encoded VP8/Opus frames into the returned [`WebRtcStream`].
pub struct WebRtcMedia {
    devices: DeviceAvailability,
}

impl WebRtcMedia {
    pub fn new(devices: DeviceAvailability) -> Self {
        Self { devices }
    }
}

#[async_trait]
impl MediaCapture for WebRtcMedia {
    type Stream = WebRtcStream;

    async fn get_user_media(&self, constraints: &MediaConstraints) -> Result<WebRtcStream> {
        if !self.devices.permission_granted {
            return Err(CallError::MediaAccess("permission denied".into()));
        }
        if constraints.video && !self.devices.camera {
            return Err(CallError::MediaAccess("no camera found".into()));
        }
        if constraints.audio && !self.devices.microphone {
            return Err(CallError::MediaAccess("no microphone found".into()));
        }

        let stream_id = format!("peercall-{}", random_id());
        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(LocalTrack::new(TrackKind::Video, MIME_TYPE_VP8, &stream_id));
        }
        if constraints.audio {
            tracks.push(LocalTrack::new(TrackKind::Audio, MIME_TYPE_OPUS, &stream_id));
        }
        info!(
            "Local media acquired: stream={stream_id} video={} ({}x{}) audio={}",
            constraints.video, constraints.ideal_width, constraints.ideal_height, constraints.audio
        );

        Ok(WebRtcStream {
            id: stream_id,
            tracks,
            stopped: false,
        })
    }
}

#[derive(Debug)]
struct LocalTrack {
    kind: TrackKind,
    enabled: bool,
    track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    fn new(kind: TrackKind, mime_type: &str, stream_id: &str) -> Self {
        let track = TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_owned(),
                ..Default::default()
            },
            kind.to_string(),
            stream_id.to_owned(),
        );
        Self {
            kind,
            enabled: true,
            track: Arc::new(track),
        }
    }
}

#[derive(Debug)]
pub struct WebRtcStream {
    id: String,
    tracks: Vec<LocalTrack>,
    stopped: bool,
}

impl WebRtcStream {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn sample_tracks(&self) -> impl Iterator<Item = Arc<TrackLocalStaticSample>> + '_ {
        self.tracks.iter().map(|t| Arc::clone(&t.track))
    }

    /// Pushes one encoded frame. Frames for a disabled or stopped track are dropped.
    pub async fn write_frame(&self, kind: TrackKind, data: Bytes, duration: Duration) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        let Some(local) = self.tracks.iter().find(|t| t.kind == kind) else {
            return Err(CallError::MediaAccess(format!("stream has no {kind} track")));
        };
        if !local.enabled {
            return Ok(());
        }
        local
            .track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| CallError::MediaAccess(e.to_string()))
    }
}

impl LocalStream for WebRtcStream {
    fn kinds(&self) -> Vec<TrackKind> {
        self.tracks.iter().map(|t| t.kind).collect()
    }

    fn is_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.tracks.iter().find(|t| t.kind == kind).map(|t| t.enabled)
    }

    fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> bool {
        match self.tracks.iter_mut().find(|t| t.kind == kind) {
            Some(track) => {
                track.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn stop(&mut self) {
        debug!("Stopping local stream {}", self.id);
        self.stopped = true;
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn denied_permission_is_media_error() {
        let media = WebRtcMedia::new(DeviceAvailability {
            permission_granted: false,
            ..DeviceAvailability::all()
        });
        let err = media
            .get_user_media(&MediaConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(err, CallError::MediaAccess("permission denied".into()));
    }

    #[tokio::test]
    async fn missing_camera_only_matters_for_video() {
        let media = WebRtcMedia::new(DeviceAvailability {
            camera: false,
            ..DeviceAvailability::all()
        });
        assert!(media.get_user_media(&MediaConstraints::default()).await.is_err());

        let audio_only = MediaConstraints {
            video: false,
            ..MediaConstraints::default()
        };
        let stream = media.get_user_media(&audio_only).await.unwrap();
        assert_eq!(stream.kinds(), vec![TrackKind::Audio]);
    }

    #[tokio::test]
    async fn toggling_and_stopping_tracks() {
        let media = WebRtcMedia::new(DeviceAvailability::all());
        let mut stream = media.get_user_media(&MediaConstraints::default()).await.unwrap();
        assert_eq!(stream.kinds(), vec![TrackKind::Video, TrackKind::Audio]);
        assert_eq!(stream.is_enabled(TrackKind::Audio), Some(true));

        assert!(stream.set_enabled(TrackKind::Audio, false));
        assert_eq!(stream.is_enabled(TrackKind::Audio), Some(false));
        // muted track swallows frames
        stream
            .write_frame(TrackKind::Audio, Bytes::from_static(&[0u8; 4]), Duration::from_millis(20))
            .await
            .unwrap();

        stream.stop();
        assert!(stream.is_stopped());
        assert!(stream.kinds().is_empty());
        assert!(!stream.set_enabled(TrackKind::Video, true));
    }
}
