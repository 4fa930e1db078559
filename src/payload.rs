//! Decoding of frame payloads and complete answer bodies

use crate::transport::TransportError;
use crate::types::{null_as_default, Citation, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::trace;

/// Structured terminal answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerBody {
    #[serde(alias = "response")]
    pub answer: String,
    /// `null` and a missing key both mean no citations
    #[serde(default, alias = "sources", deserialize_with = "null_as_default")]
    pub citations: Vec<Citation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
}

/// What a `data:` payload turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPayload {
    /// Final answer; completes the turn
    Structured(AnswerBody),
    /// Intermediate reasoning text, kept verbatim
    Fragment(String),
    /// The server reported that generation broke
    ServerError(String),
}

/// Decode a payload. Anything that is not an object carrying an answer is a
/// fragment: free text must never be forced through schema validation.
pub fn decode_payload(payload: &str) -> DecodedPayload {
    let map = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        _ => return fragment(payload),
    };

    if !has_answer_field(&map) {
        if let Some(Value::String(message)) = map.get("error") {
            return DecodedPayload::ServerError(message.clone());
        }
    }

    match answer_from_map(map) {
        Ok(body) => DecodedPayload::Structured(body),
        Err(_) => fragment(payload),
    }
}

fn fragment(payload: &str) -> DecodedPayload {
    trace!("{}: keeping payload as fragment", ErrorKind::DecodeAmbiguity);
    DecodedPayload::Fragment(payload.to_string())
}

fn has_answer_field(map: &Map<String, Value>) -> bool {
    map.contains_key("answer") || map.contains_key("response")
}

/// Our field name first, then the backend's name for the same field
const ANSWER_KEYS: [(&str, &str); 2] = [("answer", "response"), ("citations", "sources")];
const CITATION_KEYS: [(&str, &str); 1] = [("index", "chunk_index")];

/// Keep a single value per field. When both names are present ours wins.
fn prefer_canonical_keys(map: &mut Map<String, Value>, keys: &[(&str, &str)]) {
    for (canonical, alias) in keys {
        if let Some(value) = map.remove(*alias) {
            map.entry(*canonical).or_insert(value);
        }
    }
}

fn answer_from_map(mut map: Map<String, Value>) -> Result<AnswerBody, serde_json::Error> {
    prefer_canonical_keys(&mut map, &ANSWER_KEYS);
    if let Some(Value::Array(citations)) = map.get_mut("citations") {
        for citation in citations.iter_mut() {
            if let Value::Object(citation) = citation {
                prefer_canonical_keys(citation, &CITATION_KEYS);
            }
        }
    }
    serde_json::from_value(Value::Object(map))
}

fn answer_from_value(value: Value) -> Result<AnswerBody, serde_json::Error> {
    match value {
        Value::Object(map) => answer_from_map(map),
        other => serde_json::from_value(other),
    }
}

/// Backend response envelope of the non-streaming endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode the body returned by the non-streaming transport.
///
/// Accepts either the answer object itself or the backend envelope
/// `{"success": .., "message": .., "data": {..}}`.
pub fn decode_complete_body(body: &str) -> Result<AnswerBody, TransportError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TransportError::MalformedBody(format!("Invalid JSON: {e}")))?;

    let Some(map) = value.as_object() else {
        return Err(TransportError::MalformedBody(
            "Expected a JSON object".to_string(),
        ));
    };

    let answer = if map.contains_key("success") && !has_answer_field(map) {
        let envelope: Envelope = serde_json::from_value(value)
            .map_err(|e| TransportError::MalformedBody(format!("Invalid envelope: {e}")))?;
        if !envelope.success {
            return Err(TransportError::Rejected(
                envelope.message.unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        let data = envelope
            .data
            .ok_or_else(|| TransportError::MalformedBody("Envelope without data".to_string()))?;
        answer_from_value(data)
    } else {
        answer_from_value(value)
    };

    answer.map_err(|e| TransportError::MalformedBody(format!("Invalid answer: {e}")))
}
