//! Data Transfer Objects for API requests and responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use common::serde_helpers::deserialize_optional_id;

// ============================================================================
// Device routes
// ============================================================================

/// Text message for a device
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct SendTextRequest {
    /// Phone number or chat id
    #[schema(example = "923001234567")]
    pub to: String,
    #[schema(example = "Hello from wasrv")]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartResponse {
    #[schema(example = "starting")]
    pub status: String,
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RemoveResponse {
    #[schema(example = "removed")]
    pub status: String,
    pub device: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendResponse {
    #[schema(example = "sent")]
    pub status: String,
    pub to: String,
    /// `text`, `image` or `document`
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendMediaResponse {
    #[schema(example = "sent")]
    pub status: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Name of the uploaded file
    pub filename: String,
}

// ============================================================================
// API-key routes
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct V1SendMessageRequest {
    #[schema(example = "03001234567")]
    pub to: String,
    pub message: String,
    /// Preferred instance; the most recently updated one is used otherwise
    #[serde(deserialize_with = "deserialize_optional_id")]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct LegacySendMessageRequest {
    #[serde(deserialize_with = "deserialize_optional_id")]
    pub instance_id: Option<String>,
    pub to: String,
    pub message: String,
}

/// `{success, message, data}` envelope of the API-key routes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiReply<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

impl<T> ApiReply<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageSentData {
    /// Recipient as `<digits>@s.whatsapp.net`
    pub to: String,
    pub message: String,
    pub instance_id: String,
    pub instance_name: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MediaSentData {
    pub to: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub filename: String,
    pub caption: String,
    pub instance_id: String,
    pub instance_name: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceSummary {
    pub instance_id: String,
    pub name: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceDeletedData {
    pub instance_id: String,
    pub instance_name: String,
    pub deleted_at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LegacyInstanceSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// Legacy listing carries the rows under `instances` instead of `data`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LegacyInstancesReply {
    pub success: bool,
    pub message: String,
    pub instances: Vec<LegacyInstanceSummary>,
}
