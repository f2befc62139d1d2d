// Call configuration.
// Logging defaults differ between debug and release builds.

use crate::codec::WireFormat;
use crate::errors::{CallError, Result};
use crate::peer::types::{IceServerKind, ServerConfig};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[cfg(debug_assertions)]
pub const DEFAULT_LOG_LEVEL: &str = "debug";

#[cfg(not(debug_assertions))]
pub const DEFAULT_LOG_LEVEL: &str = "warn";

pub const DEFAULT_STUN_URLS: [&str; 5] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
];

/// What to do when a call request arrives while we are calling out ourselves.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlarePolicy {
    /// Greater client id keeps its call; the other side yields and rings.
    #[default]
    TieBreak,
    /// Treat it like any other busy case.
    RejectBusy,
}

/// Capture constraints handed to the media capability.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CallConfig {
    pub ice_servers: Vec<ServerConfig>,
    pub ice_candidate_pool_size: u8,
    pub media: MediaConstraints,
    pub glare: GlarePolicy,
    /// How long an interrupted link may stay down before it is reported failed.
    pub grace_period_secs: u64,
    pub wire_format: WireFormat,
}

impl Default for CallConfig {
    fn default() -> Self {
        let ice_servers = DEFAULT_STUN_URLS
            .iter()
            .enumerate()
            .map(|(i, url)| ServerConfig::stun(format!("default-stun-{i}"), *url))
            .collect();

        Self {
            ice_servers,
            ice_candidate_pool_size: 10,
            media: MediaConstraints::default(),
            glare: GlarePolicy::default(),
            grace_period_secs: 10,
            wire_format: WireFormat::Json,
        }
    }
}

impl CallConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: CallConfig =
            toml::from_str(raw).map_err(|e| CallError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading call config from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CallError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CallError::Config(e.to_string()))
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_ice_servers(&self.ice_servers)?;
        if !self.media.audio && !self.media.video {
            return Err(CallError::Config(
                "media constraints must request audio or video".into(),
            ));
        }
        Ok(())
    }
}

/// Rejects empty URLs and TURN servers without credentials.
pub fn validate_ice_servers(servers: &[ServerConfig]) -> Result<()> {
    for server in servers {
        if server.url.trim().is_empty() {
            return Err(CallError::Config(format!(
                "ICE server '{}' has an empty URL",
                server.id
            )));
        }
        if server.kind == IceServerKind::Turn
            && (server.username.is_none() || server.credential.is_none())
        {
            return Err(CallError::Config(format!(
                "TURN server '{}' requires username and credential",
                server.id
            )));
        }
    }
    Ok(())
}
