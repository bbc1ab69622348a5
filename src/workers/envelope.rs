/// Worker IPC envelope
///
/// Every line on a worker's stdin/stdout is one JSON object:
/// `{ "type": ..., "payload": ..., "requestId": ... }`
///
/// `type` is one of:
/// - `start`    parent -> child, carries the job payload
/// - `result`   child -> parent, terminal success
/// - `error`    child -> parent, terminal failure `{ message, stack }`
/// - `progress` child -> parent, non-terminal `{ event, data }`
/// - `progress:<event>` custom progress tag, payload is the event data
///
/// Lines are decoded into [`WorkerMessage`] at the boundary; nothing past this
/// module looks at the `type` string.
use crate::errors::{BotError, BotResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// MESSAGE TYPE CODES
// ============================================================================

pub const TYPE_START: &str = "start";
pub const TYPE_RESULT: &str = "result";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_PROGRESS: &str = "progress";
/// Prefix of custom progress-shaped message types
pub const PROGRESS_PREFIX: &str = "progress:";

// ============================================================================
// MESSAGE TYPES
// ============================================================================

/// Error carried across the process boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RemoteError {
    pub fn from_error(err: &BotError) -> Self {
        Self {
            message: err.to_string(),
            stack: Some(err.stack()),
        }
    }

    /// Re-raise in the parent with the original message preserved
    pub fn into_error(self) -> BotError {
        BotError::Worker {
            message: self.message,
            stack: self.stack,
        }
    }
}

/// Non-terminal event streamed by a worker
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub event: String,
    pub data: Value,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    Start {
        request_id: String,
        payload: Value,
    },
    Result {
        request_id: String,
        payload: Value,
    },
    Error {
        request_id: String,
        error: RemoteError,
    },
    Progress(ProgressEvent),
}

/// Raw wire shape
#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireProgress {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    data: Value,
}

impl WorkerMessage {
    pub fn start(request_id: impl Into<String>, payload: Value) -> Self {
        WorkerMessage::Start {
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn result(request_id: impl Into<String>, payload: Value) -> Self {
        WorkerMessage::Result {
            request_id: request_id.into(),
            payload,
        }
    }

    pub fn error(request_id: impl Into<String>, error: RemoteError) -> Self {
        WorkerMessage::Error {
            request_id: request_id.into(),
            error,
        }
    }

    pub fn progress(request_id: Option<String>, event: impl Into<String>, data: Value) -> Self {
        WorkerMessage::Progress(ProgressEvent {
            event: event.into(),
            data,
            request_id,
        })
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            WorkerMessage::Start { request_id, .. }
            | WorkerMessage::Result { request_id, .. }
            | WorkerMessage::Error { request_id, .. } => Some(request_id),
            WorkerMessage::Progress(event) => event.request_id.as_deref(),
        }
    }

    /// `result` and `error` end a request
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerMessage::Result { .. } | WorkerMessage::Error { .. })
    }

    /// Decode one line from the channel
    pub fn decode(line: &str) -> BotResult<WorkerMessage> {
        let wire: WireEnvelope = serde_json::from_str(line.trim())
            .map_err(|e| BotError::parse(format!("invalid worker envelope: {}", e)))?;

        let require_id = |id: Option<String>| {
            id.filter(|id| !id.is_empty()).ok_or_else(|| {
                BotError::parse(format!("'{}' envelope without requestId", wire.kind))
            })
        };

        match wire.kind.as_str() {
            TYPE_START => Ok(WorkerMessage::Start {
                request_id: require_id(wire.request_id.clone())?,
                payload: wire.payload,
            }),
            TYPE_RESULT => Ok(WorkerMessage::Result {
                request_id: require_id(wire.request_id.clone())?,
                payload: wire.payload,
            }),
            TYPE_ERROR => Ok(WorkerMessage::Error {
                request_id: require_id(wire.request_id.clone())?,
                error: decode_remote_error(wire.payload),
            }),
            TYPE_PROGRESS => {
                // payload without an `event` name is the data itself
                let named = serde_json::from_value::<WireProgress>(wire.payload.clone())
                    .ok()
                    .and_then(|p| p.event.map(|event| (event, p.data)));
                let (event, data) =
                    named.unwrap_or_else(|| (TYPE_PROGRESS.to_string(), wire.payload));
                Ok(WorkerMessage::Progress(ProgressEvent {
                    event,
                    data,
                    request_id: wire.request_id,
                }))
            }
            other => match other.strip_prefix(PROGRESS_PREFIX) {
                Some(event) if !event.is_empty() => Ok(WorkerMessage::Progress(ProgressEvent {
                    event: event.to_string(),
                    data: wire.payload,
                    request_id: wire.request_id,
                })),
                _ => Err(BotError::parse(format!("unknown envelope type '{}'", other))),
            },
        }
    }

    /// Encode as a single line (no trailing newline)
    pub fn encode(&self) -> BotResult<String> {
        let wire = match self {
            WorkerMessage::Start {
                request_id,
                payload,
            } => WireEnvelope {
                kind: TYPE_START.to_string(),
                payload: payload.clone(),
                request_id: Some(request_id.clone()),
            },
            WorkerMessage::Result {
                request_id,
                payload,
            } => WireEnvelope {
                kind: TYPE_RESULT.to_string(),
                payload: payload.clone(),
                request_id: Some(request_id.clone()),
            },
            WorkerMessage::Error { request_id, error } => WireEnvelope {
                kind: TYPE_ERROR.to_string(),
                payload: serde_json::to_value(error)?,
                request_id: Some(request_id.clone()),
            },
            WorkerMessage::Progress(event) => WireEnvelope {
                kind: TYPE_PROGRESS.to_string(),
                payload: serde_json::to_value(WireProgress {
                    event: Some(event.event.clone()),
                    data: event.data.clone(),
                })?,
                request_id: event.request_id.clone(),
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

/// Error payloads are normally `{message, stack}`; a bare string is accepted
fn decode_remote_error(payload: Value) -> RemoteError {
    match payload {
        Value::String(message) => RemoteError {
            message,
            stack: None,
        },
        other => serde_json::from_value::<RemoteError>(other.clone()).unwrap_or(RemoteError {
            message: other.to_string(),
            stack: None,
        }),
    }
}
