//! Message codec: parse, validate, sanitize, and re-emit every wire message.
//!
//! Inbound frames are decoded from an untyped [`serde_json::Value`] rather
//! than derived `Deserialize` enums, field by field, so that each field can
//! independently trim → truncate → clamp → default per §4.2 of the spec
//! instead of failing the whole frame on one malformed field. The one
//! exception that aborts decoding is `intervals.items`, which the spec
//! requires to be rejected explicitly as `"Invalid intervals data"`.
//!
//! Outbound messages go through a single `#[derive(Serialize)]` enum so the
//! wire `type` tag and field names can never drift from what a handler
//! constructs.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_ALERT, DEFAULT_INTERVAL_DURATION_SECS, MAX_AVATAR_URL_LEN, MAX_DESCRIPTION_LEN,
    MAX_INTERVAL_DURATION_SECS, MAX_NAME_LEN, MAX_REMAINING_MS, MIN_INTERVAL_DURATION_SECS,
};
use crate::error::DispatchError;
use crate::model::{Interval, IntervalList, TimerStatePublic, UserExternal};

static SESSION_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9-]{3,64}$").expect("static regex is valid"));

static CLIENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-f0-9-]{36}$").expect("static regex is valid"));

/// A decoded, sanitized inbound message ready for the broker to act on.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    SessionJoin {
        session_id: String,
        session: SessionFields,
        timer: TimerStatePublic,
        user: UserFields,
    },
    SessionUpdate {
        session: SessionFields,
        timer: Option<TimerStatePublic>,
    },
    TimerUpdate {
        timer: TimerStatePublic,
    },
    UserUpdate {
        user: UserFields,
    },
    UserList,
    Ping,
}

/// Sanitized `{name, description, intervals}` triple shared by `session_join`
/// and `session_update`.
#[derive(Debug, Clone, Default)]
pub struct SessionFields {
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
}

/// Sanitized `{clientId, name, avatarUrl}` triple. `client_id` has already
/// been passed through [`format_client_id`] by the time this struct exists.
#[derive(Debug, Clone, Default)]
pub struct UserFields {
    pub client_id: String,
    pub name: String,
    pub avatar_url: String,
}

/// Decodes one inbound text frame.
///
/// Returns [`DispatchError::ParseError`] if the frame is not a JSON object
/// or lacks a `type` field, [`DispatchError::UnknownMessageType`] if `type`
/// doesn't name a known message, and [`DispatchError::Validation`] if a
/// required field fails validation (currently only `intervals.items`).
pub fn decode(text: &str) -> Result<InboundMessage, DispatchError> {
    let value: Value = serde_json::from_str(text).map_err(|_| DispatchError::ParseError)?;
    let obj = value.as_object().ok_or(DispatchError::ParseError)?;
    let msg_type = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DispatchError::ParseError)?;

    match msg_type {
        "session_join" => {
            let session_id = obj
                .get("sessionId")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Ok(InboundMessage::SessionJoin {
                session_id,
                session: parse_session_fields(obj.get("session"))?,
                timer: parse_timer_fields(obj.get("timer")),
                user: parse_user_fields(obj.get("user")),
            })
        }
        "session_update" => Ok(InboundMessage::SessionUpdate {
            session: parse_session_fields(obj.get("session"))?,
            timer: obj.get("timer").map(|_| parse_timer_fields(obj.get("timer"))),
        }),
        "timer_update" => Ok(InboundMessage::TimerUpdate {
            timer: parse_timer_fields(obj.get("timer")),
        }),
        "user_update" => Ok(InboundMessage::UserUpdate {
            user: parse_user_fields(obj.get("user")),
        }),
        "user_list" => Ok(InboundMessage::UserList),
        "ping" => Ok(InboundMessage::Ping),
        _ => Err(DispatchError::UnknownMessageType),
    }
}

fn parse_session_fields(value: Option<&Value>) -> Result<SessionFields, DispatchError> {
    let obj = value.and_then(Value::as_object);
    let name = obj.and_then(|o| o.get("name")).and_then(Value::as_str).unwrap_or("");
    let description = obj
        .and_then(|o| o.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("");

    let intervals = match obj.and_then(|o| o.get("intervals")) {
        None => IntervalList::default(),
        Some(raw) => {
            let iv_obj = raw
                .as_object()
                .ok_or_else(|| DispatchError::Validation("Invalid intervals data".to_string()))?;
            let items_val = iv_obj
                .get("items")
                .ok_or_else(|| DispatchError::Validation("Invalid intervals data".to_string()))?;
            let items_arr = items_val
                .as_array()
                .ok_or_else(|| DispatchError::Validation("Invalid intervals data".to_string()))?;
            let items = items_arr.iter().map(parse_interval).collect();
            let last_updated = iv_obj.get("lastUpdated").and_then(Value::as_i64).unwrap_or(0);
            IntervalList { last_updated, items }
        }
    };

    Ok(SessionFields {
        name: sanitize_name(name),
        description: sanitize_description(description),
        intervals,
    })
}

fn parse_interval(value: &Value) -> Interval {
    let obj = value.as_object();
    let name = obj.and_then(|o| o.get("name")).and_then(Value::as_str).unwrap_or("");
    let duration = obj
        .and_then(|o| o.get("duration"))
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_INTERVAL_DURATION_SECS);
    let alert = obj.and_then(|o| o.get("alert")).and_then(Value::as_str).unwrap_or("");
    let custom_css = obj
        .and_then(|o| o.get("customCSS"))
        .and_then(Value::as_str)
        .unwrap_or("");

    Interval {
        name: sanitize_name(name),
        duration: duration.clamp(MIN_INTERVAL_DURATION_SECS, MAX_INTERVAL_DURATION_SECS),
        alert: sanitize_alert(alert),
        custom_css: custom_css.to_string(),
    }
}

fn parse_timer_fields(value: Option<&Value>) -> TimerStatePublic {
    let obj = value.and_then(Value::as_object);
    let repeat = obj.and_then(|o| o.get("repeat")).and_then(Value::as_bool).unwrap_or(false);
    let interval = obj
        .and_then(|o| o.get("interval"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize;
    let remaining = obj
        .and_then(|o| o.get("remaining"))
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_INTERVAL_DURATION_SECS * 1_000);
    let is_running = obj
        .and_then(|o| o.get("isRunning"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let is_paused = obj
        .and_then(|o| o.get("isPaused"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    TimerStatePublic {
        repeat,
        interval,
        remaining: remaining.clamp(0, MAX_REMAINING_MS),
        is_running,
        is_paused,
    }
}

fn parse_user_fields(value: Option<&Value>) -> UserFields {
    let obj = value.and_then(Value::as_object);
    let client_id = obj.and_then(|o| o.get("clientId")).and_then(Value::as_str).unwrap_or("");
    let name = obj.and_then(|o| o.get("name")).and_then(Value::as_str).unwrap_or("");
    let avatar_url = obj
        .and_then(|o| o.get("avatarUrl"))
        .and_then(Value::as_str)
        .unwrap_or("");

    UserFields {
        client_id: format_client_id(client_id),
        name: sanitize_name(name),
        avatar_url: sanitize_avatar_url(avatar_url),
    }
}

fn trim_truncate(raw: &str, max_chars: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() > max_chars {
        trimmed.chars().take(max_chars).collect()
    } else {
        trimmed.to_string()
    }
}

pub fn sanitize_name(raw: &str) -> String {
    trim_truncate(raw, MAX_NAME_LEN)
}

pub fn sanitize_description(raw: &str) -> String {
    trim_truncate(raw, MAX_DESCRIPTION_LEN)
}

pub fn sanitize_avatar_url(raw: &str) -> String {
    trim_truncate(raw, MAX_AVATAR_URL_LEN)
}

pub fn sanitize_alert(raw: &str) -> String {
    let trimmed = trim_truncate(raw, MAX_NAME_LEN);
    if trimmed.is_empty() {
        DEFAULT_ALERT.to_string()
    } else {
        trimmed
    }
}

/// Trims and lowercases a candidate session id. Does not enforce the regex —
/// callers decide whether to reject or accept the canonicalized result.
pub fn canonicalize_session_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Whether a canonicalized session id satisfies the wire format.
pub fn is_valid_session_id(candidate: &str) -> bool {
    SESSION_ID_RE.is_match(candidate)
}

/// Returns `raw` unchanged if it already looks like a client id, otherwise
/// mints a fresh UUID v4 — the "generate a UUID v4 if invalid" rule from
/// §4.4's `session_join` algorithm.
pub fn format_client_id(raw: &str) -> String {
    if CLIENT_ID_RE.is_match(raw) {
        raw.to_string()
    } else {
        Uuid::new_v4().to_string()
    }
}

/// Hex-encoded SHA-256 of a raw `clientId`, used to externalize it on every
/// outbound message. Never the inverse operation — there is no un-hash.
pub fn hash_client_id(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("writing to a String cannot fail");
    }
    out
}

/// Metadata-only form of a session, used by `session_updated`'s payload
/// (the full roster only goes out on `session_joined`/`users_connected`).
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetaExternal {
    pub name: String,
    pub description: String,
    pub intervals: IntervalList,
}

/// Every outbound message shape, tagged by `type` exactly as the wire table
/// in §6 names it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "clientId")]
        client_id: String,
    },
    SessionJoined {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "clientId")]
        client_id: String,
        session: crate::model::SessionExternal,
    },
    SessionUpdated {
        #[serde(rename = "sessionId")]
        session_id: String,
        session: SessionMetaExternal,
    },
    TimerUpdated {
        #[serde(rename = "sessionId")]
        session_id: String,
        timer: TimerStatePublic,
    },
    UserConnected {
        #[serde(rename = "sessionId")]
        session_id: String,
        user: UserExternal,
    },
    UserDisconnected {
        #[serde(rename = "sessionId")]
        session_id: String,
        user: UserExternal,
    },
    UserUpdated {
        #[serde(rename = "sessionId")]
        session_id: String,
        user: UserExternal,
    },
    UsersConnected {
        #[serde(rename = "sessionId")]
        session_id: String,
        users: HashMap<String, UserExternal>,
    },
    Pong {},
    Error {
        message: String,
    },
}

/// Serializes an outbound message. Encoding a message built from already
/// sanitized types cannot fail in practice; the fallback string exists only
/// to keep the function total rather than panicking a live connection.
pub fn encode(message: &OutboundMessage) -> String {
    serde_json::to_string(message).unwrap_or_else(|_| {
        r#"{"type":"error","message":"Internal encoding error"}"#.to_string()
    })
}

/// Builds the `error` reply for a [`DispatchError`].
pub fn encode_error(err: &DispatchError) -> String {
    encode(&OutboundMessage::Error {
        message: err.wire_message(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(decode("not json"), Err(DispatchError::ParseError)));
    }

    #[test]
    fn test_decode_rejects_missing_type() {
        assert!(matches!(decode(r#"{"foo":"bar"}"#), Err(DispatchError::ParseError)));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(matches!(
            decode(r#"{"type":"frobnicate"}"#),
            Err(DispatchError::UnknownMessageType)
        ));
    }

    #[test]
    fn test_decode_ping() {
        assert!(matches!(decode(r#"{"type":"ping"}"#), Ok(InboundMessage::Ping)));
    }

    #[test]
    fn test_decode_session_update_rejects_non_array_items() {
        let raw = r#"{"type":"session_update","session":{"intervals":{"items":"nope"}}}"#;
        match decode(raw) {
            Err(DispatchError::Validation(msg)) => assert_eq!(msg, "Invalid intervals data"),
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_session_update_accepts_missing_intervals() {
        let raw = r#"{"type":"session_update","session":{"name":"Focus"}}"#;
        let Ok(InboundMessage::SessionUpdate { session, .. }) = decode(raw) else {
            panic!("expected SessionUpdate");
        };
        assert_eq!(session.name, "Focus");
        assert!(session.intervals.items.is_empty());
    }

    #[test]
    fn test_decode_session_join_sanitizes_fields() {
        let raw = r#"{
            "type":"session_join",
            "sessionId":"  Team-Standup  ",
            "session":{"name":"  Focus  ","description":"","intervals":{"items":[]}},
            "timer":{},
            "user":{"clientId":"not-a-uuid","name":"Ada","avatarUrl":""}
        }"#;
        let Ok(InboundMessage::SessionJoin { session_id, session, user, .. }) = decode(raw) else {
            panic!("expected SessionJoin");
        };
        assert_eq!(session_id, "  Team-Standup  ");
        assert_eq!(canonicalize_session_id(&session_id), "team-standup");
        assert_eq!(session.name, "Focus");
        assert_eq!(user.name, "Ada");
        // Invalid clientId gets replaced with a fresh UUID v4, not echoed back.
        assert_ne!(user.client_id, "not-a-uuid");
        assert_eq!(user.client_id.len(), 36);
    }

    #[test]
    fn test_parse_interval_clamps_duration_and_defaults_alert() {
        let value: Value = serde_json::from_str(r#"{"name":"Work","duration":999999}"#).unwrap();
        let interval = parse_interval(&value);
        assert_eq!(interval.duration, MAX_INTERVAL_DURATION_SECS);
        assert_eq!(interval.alert, DEFAULT_ALERT);
    }

    #[test]
    fn test_name_truncation_is_idempotent() {
        let long = "x".repeat(200);
        let once = sanitize_name(&long);
        let twice = sanitize_name(&once);
        assert_eq!(once, twice);
        assert_eq!(once.chars().count(), MAX_NAME_LEN);
    }

    #[test]
    fn test_format_client_id_preserves_valid_uuid() {
        let uuid = "11111111-1111-4111-8111-111111111111";
        assert_eq!(format_client_id(uuid), uuid);
    }

    #[test]
    fn test_hash_client_id_is_64_hex_chars_and_not_reversible_by_inspection() {
        let raw = "11111111-1111-4111-8111-111111111111";
        let hashed = hash_client_id(raw);
        assert_eq!(hashed.len(), 64);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(hashed, raw);
    }

    #[test]
    fn test_session_id_regex() {
        assert!(is_valid_session_id("team-standup-1"));
        assert!(!is_valid_session_id("ab"));
        assert!(!is_valid_session_id("Has-Caps"));
    }

    #[test]
    fn test_encode_error_matches_wire_message() {
        let json = encode_error(&DispatchError::SessionNotFound);
        assert_eq!(json, r#"{"type":"error","message":"Session not found"}"#);
    }
}
