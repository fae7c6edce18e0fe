//! Operator API payloads

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::domain::command::CommandSnapshot;

#[derive(Debug, Deserialize, ToSchema)]
pub struct EnqueueCommandRequest {
    /// Target station id.
    pub station_id: String,
    /// OCPP action name, e.g. `RemoteStartTransaction`.
    pub action: String,
    /// Raw CALL payload object.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandSnapshotDto {
    pub id: String,
    pub station_id: String,
    pub action: String,
    /// queued | pending | accepted | rejected | failed | timeout
    pub status: String,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub last_response: Option<Value>,
}

impl From<CommandSnapshot> for CommandSnapshotDto {
    fn from(snapshot: CommandSnapshot) -> Self {
        Self {
            id: snapshot.id,
            station_id: snapshot.station_id,
            action: snapshot.action,
            status: snapshot.status.to_string(),
            attempts: snapshot.attempts,
            max_attempts: snapshot.max_attempts,
            last_message_id: snapshot.last_message_id,
            last_error: snapshot.last_error,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            payload: snapshot.payload,
            last_response: snapshot.last_response,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDto {
    pub error: String,
}

impl ApiErrorDto {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
