//! Wire types for the encoding platform's REST API.
//!
//! Every response is wrapped in an envelope (`{"status": ..., "data": {"result": ...}}`);
//! field names are camelCase on the wire. Resource ids are only present on
//! responses, so they are skipped when serializing a create request.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Successful response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope<T> {
    pub data: ResponseData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseData<T> {
    pub result: T,
}

/// Error response envelope, returned with a non-2xx HTTP status.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub data: ErrorData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub developer_message: Option<String>,
    #[serde(default)]
    pub details: Vec<Message>,
    #[serde(default)]
    pub retry_hint: Option<RetryHint>,
}

/// Whether the platform considers a failure worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryHint {
    Retry,
    NoRetry,
    Undefined,
}

/// Lifecycle status of a remote encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Created,
    Queued,
    Running,
    Finished,
    Error,
    Canceled,
    TransferError,
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    /// Query-string form used when filtering encoding lists.
    pub fn as_query(&self) -> &'static str {
        match self {
            RemoteStatus::Created => "CREATED",
            RemoteStatus::Queued => "QUEUED",
            RemoteStatus::Running => "RUNNING",
            RemoteStatus::Finished => "FINISHED",
            RemoteStatus::Error => "ERROR",
            RemoteStatus::Canceled => "CANCELED",
            RemoteStatus::TransferError => "TRANSFER_ERROR",
            RemoteStatus::Unknown => "UNKNOWN",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            RemoteStatus::Error | RemoteStatus::Canceled | RemoteStatus::TransferError
        )
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Error,
    Warning,
    Info,
    Debug,
    Trace,
    #[serde(other)]
    Unknown,
}

/// A diagnostic message attached to a task or an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub text: String,
}

fn default_message_type() -> MessageType {
    MessageType::Info
}

/// Details of the failure that ended a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub retry_hint: Option<RetryHint>,
}

/// Result of `GET /encoding/encodings/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub status: RemoteStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub error: Option<ErrorDetails>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Task {
    /// Texts of all ERROR-typed messages, in the order the platform reported them.
    pub fn error_messages(&self) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.message_type == MessageType::Error)
            .map(|m| m.text.clone())
            .collect()
    }
}

/// Paginated list response; only the total count is used by the dispatcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResponse {
    #[serde(default)]
    pub total_count: Option<u64>,
}

/// Minimal view of any created resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceId {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bucket_name: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PresetConfiguration {
    VodStandard,
    VodHighQuality,
    VodSpeed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct H264VideoConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub preset_configuration: PresetConfiguration,
    pub height: u32,
    pub bitrate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AacAudioConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub bitrate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Encoding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamSelectionMode {
    Auto,
    VideoRelative,
    AudioRelative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInput {
    pub input_id: String,
    pub input_path: String,
    pub selection_mode: StreamSelectionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub input_streams: Vec<StreamInput>,
    pub codec_config_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclPermission {
    PublicRead,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclEntry {
    pub permission: AclPermission,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingOutput {
    pub output_id: String,
    pub output_path: String,
    pub acl: Vec<AclEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxingStream {
    pub stream_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fmp4Muxing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub segment_length: f64,
    pub outputs: Vec<EncodingOutput>,
    pub streams: Vec<MuxingStream>,
}

/// Body of the start call; all options keep their platform defaults.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartEncodingRequest {}
