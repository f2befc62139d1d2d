use crate::peer::types::{IceServerKind, ServerConfig};
use rand::Rng;

/// Random client identifier, 16 hex digits.
pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefix the ICE server URL with its scheme when the user left it out.
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    let url = config.url.trim();
    if url.starts_with("turn:") || url.starts_with("turns:") || url.starts_with("stun:") {
        return url.to_string();
    }
    let scheme = match config.kind {
        IceServerKind::Turn => "turn:",
        IceServerKind::Stun => "stun:",
    };
    format!("{scheme}{url}")
}
