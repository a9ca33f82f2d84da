//! services/package_generator/src/handler/protocol.rs
//!
//! Defines the wire format of the Lambda SQS trigger and of the session messages
//! the voice-session service puts on the queue.

use chrono::{DateTime, Utc};
use conversation_package_core::domain::SessionCompletionEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

//=========================================================================================
// Lambda SQS event / partial batch response
//=========================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SqsEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<SqsMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqsMessage {
    pub message_id: String,
    #[serde(default)]
    pub body: Option<String>,
}

/// Reports the messages the queue should redeliver. Everything else is deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqsBatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}

//=========================================================================================
// Session message parsing
//=========================================================================================

/// Why an inbound message could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedMessage {
    #[error("message has no body")]
    EmptyBody,
    #[error("message body is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("message body is not a JSON object")]
    NotAnObject,
    #[error("message is missing a string sessionId")]
    MissingSessionId,
}

/// Keys that may carry the language, in order of preference. Older senders
/// used the snake_case or short form.
const LANGUAGE_KEYS: [&str; 3] = ["targetLanguage", "target_language", "language"];

/// Parses a queue message body into a `SessionCompletionEvent`.
///
/// Only `sessionId` is mandatory; attribution gaps are left for the pipeline to
/// skip. `now` stands in for a missing or unparsable `createdAt`.
pub fn parse_session_message(
    body: &str,
    now: DateTime<Utc>,
) -> Result<SessionCompletionEvent, MalformedMessage> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| MalformedMessage::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(MalformedMessage::NotAnObject)?;

    let session_id = string_field(obj, "sessionId")
        .filter(|id| !id.trim().is_empty())
        .ok_or(MalformedMessage::MissingSessionId)?;

    let target_language = LANGUAGE_KEYS
        .iter()
        .find_map(|key| string_field(obj, key))
        .filter(|language| !language.trim().is_empty());

    Ok(SessionCompletionEvent {
        session_id,
        user_id: string_field(obj, "userId"),
        target_language,
        created_at: timestamp_field(obj, "createdAt").unwrap_or(now),
        expires_at: timestamp_field(obj, "expiresAt"),
        ttl: obj.get("ttl").and_then(Value::as_i64),
    })
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn timestamp_field(obj: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    obj.get(key)
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
}
