use crate::config::DEFAULT_LOG_LEVEL;
use log::debug;
use std::io::Write;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;

/// Installs the process logger: `RUST: [timestamp] message`.
///
/// `RUST_LOG` overrides the build default. Calling it twice is harmless.
pub fn init() {
    let default_filter = format!("peercall={DEFAULT_LOG_LEVEL},webrtc=warn");
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format(|buf, record| {
            let now = chrono::Local::now();
            writeln!(
                buf,
                "RUST: [{}] {:<5} {}",
                now.format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}

/// Logs a trickled ICE candidate as it appears.
pub fn dump_candidate(label: &str, cand: &RTCIceCandidate) {
    if let Ok(init) = cand.to_json() {
        debug!(
            "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?}",
            init.candidate, init.sdp_mid, init.sdp_mline_index
        );
    }
}
