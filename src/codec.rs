use crate::errors::{CallError, Result};
use crate::signaling::SignalingMessage;
use base64::{engine::general_purpose, Engine as _};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Text encoding used for signaling messages on the transport.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Plain JSON envelope.
    #[default]
    Json,
    /// gzip'd JSON in URL-safe base64, for size-limited text channels.
    Compact,
}

pub fn encode(msg: &SignalingMessage, format: WireFormat) -> Result<String> {
    let json = serde_json::to_string(msg)?;
    match format {
        WireFormat::Json => Ok(json),
        WireFormat::Compact => compress(json.as_bytes()),
    }
}

/// Decodes either format; JSON is recognised by its leading brace.
pub fn decode(raw: &str) -> Result<SignalingMessage> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        return Ok(serde_json::from_str(raw)?);
    }
    let json = decompress(raw)?;
    Ok(serde_json::from_slice(&json)?)
}

fn compress(bytes: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(bytes)
        .map_err(|e| CallError::Codec(e.to_string()))?;
    let gz = encoder
        .finish()
        .map_err(|e| CallError::Codec(e.to_string()))?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(gz))
}

fn decompress(token: &str) -> Result<Vec<u8>> {
    let gz = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| CallError::Codec(format!("bad base64: {e}")))?;
    let mut out = Vec::new();
    GzDecoder::new(gz.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| CallError::Codec(format!("bad gzip: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::types::SessionDescription;

    fn request() -> SignalingMessage {
        SignalingMessage::CallRequest {
            caller_id: "a1b2c3d4e5f60718".into(),
            callee_id: None,
            offer: SessionDescription::offer("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n".repeat(20)),
        }
    }

    #[test]
    fn compact_token_is_smaller_and_decodes() {
        let msg = request();
        let json = encode(&msg, WireFormat::Json).unwrap();
        let token = encode(&msg, WireFormat::Compact).unwrap();
        assert!(token.len() < json.len());
        assert!(!token.contains('+') && !token.contains('/'));
        assert_eq!(decode(&token).unwrap(), msg);
        assert_eq!(decode(&json).unwrap(), msg);
    }

    #[test]
    fn garbage_is_a_codec_error() {
        assert!(matches!(decode("not a token!"), Err(CallError::Codec(_))));
        assert!(matches!(decode("{\"event\":\"nope\"}"), Err(CallError::Codec(_))));
    }
}
