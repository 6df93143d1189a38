//! Core protocol types for the presence wire format.
//!
//! Every type here travels "on the wire": it is serialized to bytes, sent
//! over the presence channel (or the disconnect endpoint), and deserialized
//! by the server.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque identifier of an authenticated principal.
///
/// Admin backends hand out either numeric ids (`7`) or string ids (document
/// ids, UUIDs). The client never interprets the value; it only echoes it
/// back to the server, so both shapes are kept exactly as received.
///
/// `#[serde(untagged)]` makes `UserId::Number(7)` serialize as just `7` and
/// `UserId::Text("abc")` as just `"abc"`: the same JSON the server sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    /// A numeric id, e.g. a database row id.
    Number(u64),
    /// Any other id, kept verbatim.
    Text(String),
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::Text(id.to_owned())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

// ---------------------------------------------------------------------------
// PresenceMessage
// ---------------------------------------------------------------------------

/// Frames exchanged over the presence channel.
///
/// `#[serde(tag = "type")]` produces internally tagged JSON:
///   `{ "type": "GoingOffline", "user_id": 7, "reason": "logout" }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PresenceMessage {
    // -- Registration --
    /// Client → Server: "this channel belongs to `user_id`, mark them online."
    ///
    /// `session_nonce` is fresh per channel so the server can tell an offline
    /// notice for an old channel from one for the current channel.
    Register {
        user_id: UserId,
        session_nonce: String,
        version: u32,
    },

    /// Server → Client: registration accepted, the user is online.
    Registered { user_id: UserId, server_time: u64 },

    // -- Teardown --
    /// Client → Server: "I'm going offline", sent right before the client
    /// closes the channel. The server must also treat an abrupt close without
    /// this notice as offline.
    GoingOffline { user_id: UserId, reason: String },

    // -- Keep-alive --
    /// Client → Server: "still here."
    Heartbeat { client_time: u64 },

    /// Server → Client: heartbeat echo with the server clock.
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Errors --
    /// Server → Client: the server rejected something (bad version,
    /// unknown user, ...). `code` follows HTTP status semantics.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single frame on the presence channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-channel sequence number, starting at 0 with `Register`.
    pub seq: u64,
    /// Milliseconds since the channel was opened.
    pub timestamp: u64,
    /// The actual message.
    pub message: PresenceMessage,
}

// ---------------------------------------------------------------------------
// DisconnectNotice
// ---------------------------------------------------------------------------

/// Body of the out-of-band offline notice: `{ "id": <user id> }`.
///
/// Used when the channel can't carry a `GoingOffline` frame anymore: the
/// durable spool and the blocking fallback both post exactly this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    pub id: UserId,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_numeric_serializes_as_plain_number() {
        let json = serde_json::to_string(&UserId::from(7)).unwrap();
        assert_eq!(json, "7");
    }

    #[test]
    fn test_user_id_text_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::from("u-1")).unwrap();
        assert_eq!(json, "\"u-1\"");
    }

    #[test]
    fn test_user_id_deserializes_both_shapes() {
        let n: UserId = serde_json::from_str("42").unwrap();
        let s: UserId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(n, UserId::Number(42));
        assert_eq!(s, UserId::Text("42".into()));
        // Same digits, different shapes: not the same principal.
        assert_ne!(n, s);
    }

    #[test]
    fn test_user_id_display_is_raw_value() {
        assert_eq!(UserId::from(7).to_string(), "7");
        assert_eq!(UserId::from("abc").to_string(), "abc");
    }

    #[test]
    fn test_disconnect_notice_json_format() {
        let notice = DisconnectNotice { id: UserId::from(7) };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json, serde_json::json!({ "id": 7 }));
    }

    #[test]
    fn test_going_offline_json_format() {
        let msg = PresenceMessage::GoingOffline {
            user_id: UserId::from(7),
            reason: "logout".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "GoingOffline");
        assert_eq!(json["user_id"], 7);
        assert_eq!(json["reason"], "logout");
    }

    #[test]
    fn test_registered_parses_from_server_json() {
        let raw = r#"{"type":"Registered","user_id":"abc","server_time":99}"#;
        let msg: PresenceMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            msg,
            PresenceMessage::Registered {
                user_id: UserId::from("abc"),
                server_time: 99,
            }
        );
    }

    #[test]
    fn test_error_frame_json_format() {
        let msg = PresenceMessage::Error {
            code: 426,
            message: "upgrade required".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 426);
    }

    #[test]
    fn test_envelope_nests_message_object() {
        let envelope = Envelope {
            seq: 4,
            timestamp: 1200,
            message: PresenceMessage::HeartbeatAck {
                client_time: 1100,
                server_time: 5000,
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["seq"], 4);
        assert_eq!(json["message"]["type"], "HeartbeatAck");
    }
}
