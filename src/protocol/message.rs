//! Envelope types exchanged with the engine.
//!
//! The engine offers no request/response pairing of its own; every reply
//! echoes the `cmd_id` of the command it answers.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, from_str, from_value};

use crate::error::{Error, Result};
use crate::identifiers::CommandId;

use super::Command;

// ============================================================================
// Request
// ============================================================================

/// A command envelope from the bridge to the engine.
///
/// # Format
///
/// ```json
/// { "cmd": "startSharer", "cmd_id": 0, "payload": { ... } }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Command name.
    pub cmd: &'static str,

    /// Correlation id echoed by the reply.
    pub cmd_id: CommandId,

    /// Command payload (`null` for payload-less commands).
    pub payload: Value,
}

impl Request {
    /// Builds the envelope for `command` under `cmd_id`.
    #[inline]
    #[must_use]
    pub fn new(cmd_id: CommandId, command: &Command) -> Self {
        Self {
            cmd: command.name(),
            cmd_id,
            payload: command.payload(),
        }
    }
}

// ============================================================================
// Response
// ============================================================================

/// A reply from the engine.
///
/// # Format
///
/// ```json
/// { "cmd_id": 0, "success": true, "payload": { "sharer_id": 1 } }
/// ```
///
/// A missing `success` counts as failure and a missing `payload` as `null`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Response {
    /// Matches the command's `cmd_id`.
    pub cmd_id: CommandId,

    /// Whether the engine executed the command.
    #[serde(default)]
    pub success: bool,

    /// Reply data.
    #[serde(default)]
    pub payload: Value,
}

impl Response {
    /// Creates a successful reply.
    #[inline]
    #[must_use]
    pub fn success(cmd_id: CommandId, payload: Value) -> Self {
        Self {
            cmd_id,
            success: true,
            payload,
        }
    }

    /// Creates a failed reply.
    #[inline]
    #[must_use]
    pub fn failure(cmd_id: CommandId, payload: Value) -> Self {
        Self {
            cmd_id,
            success: false,
            payload,
        }
    }

    /// Converts the reply into a result for the named command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteFailure`] carrying the payload when the engine
    /// reported failure.
    pub fn into_result(self, command: &str) -> Result<Value> {
        if self.success {
            Ok(self.payload)
        } else {
            Err(Error::remote_failure(command, self.payload))
        }
    }
}

// ============================================================================
// Incoming
// ============================================================================

/// Any message the engine can send.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Reply to a correlated command.
    Response(Response),
    /// Unsolicited log line.
    Log(String),
}

impl Incoming {
    /// Parses a raw engine message.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the text is not JSON
    /// - [`Error::Protocol`] if the message is neither a log line nor a reply
    ///   carrying a `cmd_id`
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = from_str(text)?;
        Self::from_value(value)
    }

    /// Classifies an already-decoded engine message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for anything that is not a log line or a
    /// well-formed reply.
    pub fn from_value(value: Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::protocol("engine message is not an object"));
        };

        if let Some(log) = object.get("log") {
            let line = match log {
                Value::String(line) => line.clone(),
                other => other.to_string(),
            };
            return Ok(Self::Log(line));
        }

        if matches!(object.get("cmd_id"), None | Some(Value::Null)) {
            return Err(Error::protocol("can't handle message without cmd_id"));
        }

        from_value::<Response>(value)
            .map(Self::Response)
            .map_err(|e| Error::protocol(format!("invalid reply envelope: {e}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::SharerId;

    #[test]
    fn test_request_serialization() {
        let command = Command::StopSharer {
            sharer_id: SharerId::from("S1"),
        };
        let request = Request::new(CommandId::new(2), &command);
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            json,
            json!({"cmd": "stopSharer", "cmd_id": 2, "payload": {"sharer_id": "S1"}})
        );
    }

    #[test]
    fn test_request_null_payload() {
        let request = Request::new(CommandId::new(5), &Command::StopReceiver);
        let json = serde_json::to_string(&request).expect("serialize");
        assert_eq!(json, r#"{"cmd":"stopReceiver","cmd_id":5,"payload":null}"#);
    }

    #[test]
    fn test_parse_success_response() {
        let incoming = Incoming::parse(r#"{"cmd_id":0,"success":true,"payload":{"sharer_id":"S1"}}"#)
            .expect("parse");

        let Incoming::Response(response) = incoming else {
            panic!("expected a response");
        };
        assert_eq!(response.cmd_id, CommandId::new(0));
        let payload = response.into_result("startSharer").expect("success");
        assert_eq!(payload["sharer_id"], "S1");
    }

    #[test]
    fn test_parse_failure_response() {
        let incoming =
            Incoming::parse(r#"{"cmd_id":4,"success":false,"payload":{"error":"no sharer"}}"#)
                .expect("parse");

        let Incoming::Response(response) = incoming else {
            panic!("expected a response");
        };
        let err = response.into_result("stopSharer").unwrap_err();
        assert!(err.is_remote_failure());
    }

    #[test]
    fn test_missing_success_is_failure() {
        let incoming = Incoming::parse(r#"{"cmd_id":1}"#).expect("parse");
        assert_eq!(
            incoming,
            Incoming::Response(Response::failure(CommandId::new(1), Value::Null))
        );
    }

    #[test]
    fn test_parse_log_line() {
        let incoming = Incoming::parse(r#"{"log":"encoder started"}"#).expect("parse");
        assert_eq!(incoming, Incoming::Log("encoder started".to_string()));
    }

    #[test]
    fn test_missing_cmd_id_is_protocol_error() {
        let err = Incoming::parse(r#"{"success":true}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        let err = Incoming::parse(r#"{"cmd_id":null,"success":true}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_non_object_and_invalid_json() {
        assert!(matches!(
            Incoming::parse("[1,2]").unwrap_err(),
            Error::Protocol { .. }
        ));
        assert!(matches!(
            Incoming::parse("not json").unwrap_err(),
            Error::Json(_)
        ));
    }
}
