//! Signaling messages exchanged between the two call participants.
//!
//! On the wire every message is a JSON object of the form
//! `{"event": "<name>", "data": {...}}`; `call_ended` carries no data.

use crate::peer::types::{IceCandidate, SessionDescription};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RejectReason {
    /// The callee is already in a call.
    Busy,
    /// The callee declined the call.
    Declined,
    /// The callee accepted but could not set up its side.
    Error,
}

impl RejectReason {
    pub fn describe(&self) -> &'static str {
        match self {
            RejectReason::Busy => "The other user is busy",
            RejectReason::Declined => "The other user declined the call",
            RejectReason::Error => "The other user could not join the call",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::Busy => "busy",
            RejectReason::Declined => "declined",
            RejectReason::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SignalingMessage {
    CallRequest {
        caller_id: String,
        /// Set when the call is placed to a known client; others ignore it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        callee_id: Option<String>,
        offer: SessionDescription,
    },
    CallAnswer {
        answer: SessionDescription,
    },
    CallRejected {
        reason: RejectReason,
    },
    IceCandidate(IceCandidate),
    CallEnded,
}

impl SignalingMessage {
    /// Event name as it appears on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalingMessage::CallRequest { .. } => "call_request",
            SignalingMessage::CallAnswer { .. } => "call_answer",
            SignalingMessage::CallRejected { .. } => "call_rejected",
            SignalingMessage::IceCandidate(_) => "ice_candidate",
            SignalingMessage::CallEnded => "call_ended",
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        SignalingMessage::CallRejected { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn answer_uses_event_envelope() {
        let msg = SignalingMessage::CallAnswer {
            answer: SessionDescription::answer("v=0"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"event": "call_answer", "data": {"answer": {"type": "answer", "sdp": "v=0"}}})
        );
        assert_eq!(msg.event_name(), "call_answer");
    }

    #[test]
    fn request_callee_is_optional() {
        let open = SignalingMessage::CallRequest {
            caller_id: "aaaa".into(),
            callee_id: None,
            offer: SessionDescription::offer("v=0"),
        };
        let value = serde_json::to_value(&open).unwrap();
        assert!(value["data"].get("callee_id").is_none());

        let raw = r#"{"event":"call_request","data":{"caller_id":"aaaa","callee_id":"ffff","offer":{"type":"offer","sdp":"v=0"}}}"#;
        match serde_json::from_str::<SignalingMessage>(raw).unwrap() {
            SignalingMessage::CallRequest { callee_id, .. } => {
                assert_eq!(callee_id.as_deref(), Some("ffff"))
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn ended_needs_no_payload() {
        let msg: SignalingMessage = serde_json::from_str(r#"{"event":"call_ended"}"#).unwrap();
        assert_eq!(msg, SignalingMessage::CallEnded);
    }

    #[test]
    fn rejection_reason_is_lowercase() {
        let raw = r#"{"event":"call_rejected","data":{"reason":"busy"}}"#;
        let msg: SignalingMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg, SignalingMessage::rejected(RejectReason::Busy));
    }

    #[test]
    fn candidate_optional_fields_default() {
        let raw = r#"{"event":"ice_candidate","data":{"candidate":"candidate:1 1 udp 2130706431 10.0.0.2 50000 typ host"}}"#;
        match serde_json::from_str::<SignalingMessage>(raw).unwrap() {
            SignalingMessage::IceCandidate(c) => {
                assert!(c.sdp_mid.is_none());
                assert!(c.sdp_mline_index.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
