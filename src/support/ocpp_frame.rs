//! OCPP-J message framing
//!
//! The OCPP-J (JSON over WebSocket) envelope is shared by every OCPP version
//! this gateway speaks:
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`
//!
//! The codec validates the envelope only; payloads travel through as raw
//! [`serde_json::Value`] objects for the router and handlers to interpret.

use serde_json::Value;
use thiserror::Error;

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OcppFrame {
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        unique_id: String,
        payload: Value,
    },
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

/// Frame-level decode failures. All of them map to a dropped inbound
/// message: a frame we cannot attribute to a uniqueId cannot be answered.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("frame must be a json array")]
    NotAnArray,
    #[error("frame has {got} elements, expected at least {expected}")]
    TooShort { expected: usize, got: usize },
    #[error("message type must be an integer")]
    BadMessageType,
    #[error("unsupported message type {0}")]
    UnsupportedMessageType(u64),
    #[error("uniqueId must be a non-empty string")]
    BadUniqueId,
    #[error("action must be a non-empty string")]
    BadAction,
    #[error("payload must be a json object")]
    BadPayload,
}

impl OcppFrame {
    /// Decode a raw text message into a frame.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let root: Value = serde_json::from_str(text)?;
        let arr = root.as_array().ok_or(FrameError::NotAnArray)?;
        if arr.is_empty() {
            return Err(FrameError::TooShort {
                expected: 3,
                got: 0,
            });
        }

        let msg_type = arr[0].as_u64().ok_or(FrameError::BadMessageType)?;
        match msg_type {
            MSG_TYPE_CALL => Self::decode_call(arr),
            MSG_TYPE_CALL_RESULT => Self::decode_call_result(arr),
            MSG_TYPE_CALL_ERROR => Self::decode_call_error(arr),
            other => Err(FrameError::UnsupportedMessageType(other)),
        }
    }

    fn unique_id_at(arr: &[Value]) -> Result<String, FrameError> {
        let id = arr
            .get(1)
            .and_then(Value::as_str)
            .ok_or(FrameError::BadUniqueId)?;
        if id.is_empty() {
            return Err(FrameError::BadUniqueId);
        }
        Ok(id.to_string())
    }

    fn decode_call(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::TooShort {
                expected: 4,
                got: arr.len(),
            });
        }
        let unique_id = Self::unique_id_at(arr)?;
        let action = arr[2].as_str().ok_or(FrameError::BadAction)?;
        if action.is_empty() {
            return Err(FrameError::BadAction);
        }
        if !arr[3].is_object() {
            return Err(FrameError::BadPayload);
        }
        Ok(Self::Call {
            unique_id,
            action: action.to_string(),
            payload: arr[3].clone(),
        })
    }

    fn decode_call_result(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 3 {
            return Err(FrameError::TooShort {
                expected: 3,
                got: arr.len(),
            });
        }
        let unique_id = Self::unique_id_at(arr)?;
        if !arr[2].is_object() {
            return Err(FrameError::BadPayload);
        }
        Ok(Self::CallResult {
            unique_id,
            payload: arr[2].clone(),
        })
    }

    fn decode_call_error(arr: &[Value]) -> Result<Self, FrameError> {
        if arr.len() < 4 {
            return Err(FrameError::TooShort {
                expected: 4,
                got: arr.len(),
            });
        }
        let unique_id = Self::unique_id_at(arr)?;
        let error_code = arr[2].as_str().unwrap_or("GenericError").to_string();
        let error_description = arr[3].as_str().unwrap_or("").to_string();
        let error_details = arr
            .get(4)
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    /// Encode this frame to its wire representation.
    pub fn encode(&self) -> String {
        let arr = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                MSG_TYPE_CALL.into(),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                MSG_TYPE_CALL_RESULT.into(),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                MSG_TYPE_CALL_ERROR.into(),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };
        // serializing a Value cannot fail
        serde_json::to_string(&arr).unwrap_or_default()
    }

    /// Build an outbound CALL with a freshly assigned correlation id.
    pub fn call(unique_id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self::Call {
            unique_id: unique_id.into(),
            action: action.into(),
            payload,
        }
    }

    /// Build a CALLRESULT answering `unique_id`.
    pub fn call_result(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    /// Build a CALLERROR answering `unique_id` with empty details.
    pub fn call_error(
        unique_id: impl Into<String>,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error_code.into(),
            error_description: error_description.into(),
            error_details: Value::Object(Default::default()),
        }
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_call() {
        let frame =
            OcppFrame::decode(r#"[2,"u-1","StatusNotification",{"evseId":1,"connectorId":1}]"#)
                .unwrap();
        match frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                assert_eq!(unique_id, "u-1");
                assert_eq!(action, "StatusNotification");
                assert_eq!(payload["evseId"], 1);
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn decode_call_result() {
        let frame = OcppFrame::decode(r#"[3,"u-2",{"status":"Accepted"}]"#).unwrap();
        assert_eq!(
            frame,
            OcppFrame::call_result("u-2", json!({"status": "Accepted"}))
        );
    }

    #[test]
    fn decode_call_error() {
        let frame =
            OcppFrame::decode(r#"[4,"u-3","NotImplemented","unknown action",{}]"#).unwrap();
        match frame {
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                ..
            } => {
                assert_eq!(unique_id, "u-3");
                assert_eq!(error_code, "NotImplemented");
                assert_eq!(error_description, "unknown action");
            }
            other => panic!("expected CallError, got {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            OcppFrame::decode("not json"),
            Err(FrameError::InvalidJson(_))
        ));
        assert!(matches!(
            OcppFrame::decode(r#"{"a":1}"#),
            Err(FrameError::NotAnArray)
        ));
        assert!(matches!(
            OcppFrame::decode(r#"[5,"u","X",{}]"#),
            Err(FrameError::UnsupportedMessageType(5))
        ));
        assert!(matches!(
            OcppFrame::decode(r#"["2","u","X",{}]"#),
            Err(FrameError::BadMessageType)
        ));
    }

    #[test]
    fn decode_rejects_empty_unique_id() {
        assert!(matches!(
            OcppFrame::decode(r#"[2,"","Heartbeat",{}]"#),
            Err(FrameError::BadUniqueId)
        ));
        assert!(matches!(
            OcppFrame::decode(r#"[3,42,{}]"#),
            Err(FrameError::BadUniqueId)
        ));
    }

    #[test]
    fn decode_rejects_short_call() {
        assert!(matches!(
            OcppFrame::decode(r#"[2,"u","Heartbeat"]"#),
            Err(FrameError::TooShort { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn decode_rejects_non_object_payload() {
        assert!(matches!(
            OcppFrame::decode(r#"[2,"u","Heartbeat",[1,2]]"#),
            Err(FrameError::BadPayload)
        ));
    }

    #[test]
    fn call_roundtrip_preserves_payload() {
        let original = OcppFrame::call(
            "corr-9",
            "RemoteStartTransaction",
            json!({"connectorId": 1, "idTag": "ABC123"}),
        );
        let decoded = OcppFrame::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn call_error_roundtrip() {
        let original = OcppFrame::call_error("corr-1", "InternalError", "boom");
        let decoded = OcppFrame::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }
}
