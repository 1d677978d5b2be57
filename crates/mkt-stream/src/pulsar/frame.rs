//! Pulsar WebSocket producer frames.
//!
//! Outbound: `{"payload": "<base64>", "context": "<seq>"}`.
//! Inbound ack: `{"result": "ok", "messageId": "...", "context": "<seq>"}`,
//! or a non-`ok` result with an `errorMsg`.

use base64::Engine;
use serde::Deserialize;

/// Encode one send request as a text frame.
pub fn encode_send(payload: &[u8], context: &str) -> String {
    serde_json::json!({
        "payload": base64::engine::general_purpose::STANDARD.encode(payload),
        "context": context,
    })
    .to_string()
}

#[derive(Debug, Deserialize)]
struct RawAck {
    result: String,
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    context: Option<String>,
    #[serde(rename = "errorMsg")]
    error_msg: Option<String>,
}

/// A decoded broker response to one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Ok { context: String, message_id: String },
    Rejected { context: String, reason: String },
}

impl Ack {
    pub fn context(&self) -> &str {
        match self {
            Self::Ok { context, .. } | Self::Rejected { context, .. } => context,
        }
    }
}

/// Parse a broker text frame. Frames without a context cannot be matched to
/// a request and yield `None`.
pub fn parse_ack(text: &str) -> Option<Ack> {
    let raw: RawAck = serde_json::from_str(text).ok()?;
    let context = raw.context?;
    if raw.result == "ok" {
        Some(Ack::Ok { context, message_id: raw.message_id.unwrap_or_default() })
    } else {
        let reason = match raw.error_msg {
            Some(msg) if !msg.is_empty() => format!("{}: {msg}", raw.result),
            _ => raw.result,
        };
        Some(Ack::Rejected { context, reason })
    }
}
