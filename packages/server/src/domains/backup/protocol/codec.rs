//! Decoding and structural validation of inbound status messages.
//!
//! The accepted shape is:
//!
//! ```text
//! { "type": 0..=7, "tag": string, ...variant fields }
//!
//! 0 Handshake, 5 FinishSuccess, 6 PageDone, 7 PagePostponed: no extra fields
//! 1 Preflight:     total >= 0
//! 2 Progress:      status in {0,2,3,4,5}, or status == 1 with done >= 0, postponed >= 0
//! 3 ErrorFatal,
//! 4 ErrorNonfatal: errorKind 0..=14; kinds {2,3,4,8,13} also need name: string
//! ```
//!
//! Workers post the message JSON-encoded a second time (a JSON string whose
//! contents are the object). Both forms are accepted.

use serde_json::{Map, Value};
use thiserror::Error;

use super::message::{
    ErrorKind, Message, MessageKind, MessageType, ProgressUpdate, WorkerError, WorkerStatus,
};

#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload is not well-formed JSON.
    #[error("malformed status message: {0}")]
    Malformed(String),

    /// Well-formed, but does not match the message schema.
    #[error("status message violates schema: {reason}")]
    SchemaViolation { reason: String, raw: String },
}

impl CodecError {
    /// Raw payload, when it was well-formed enough to keep.
    pub fn raw(&self) -> Option<&str> {
        match self {
            CodecError::Malformed(_) => None,
            CodecError::SchemaViolation { raw, .. } => Some(raw),
        }
    }
}

/// Decode raw bytes into a typed [`Message`]. Pure; never touches state.
pub fn decode(raw: &[u8]) -> Result<Message, CodecError> {
    let mut value: Value =
        serde_json::from_slice(raw).map_err(|e| CodecError::Malformed(e.to_string()))?;

    if let Value::String(inner) = &value {
        value = serde_json::from_str(inner).map_err(|e| CodecError::Malformed(e.to_string()))?;
    }

    validate(&value).map_err(|reason| CodecError::SchemaViolation {
        reason,
        raw: String::from_utf8_lossy(raw).into_owned(),
    })
}

fn validate(value: &Value) -> Result<Message, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "message must be an object".to_string())?;

    let code = int_field(obj, "type")?.ok_or("missing required field 'type'")?;
    let message_type =
        MessageType::from_code(code).ok_or_else(|| format!("'type' {} is outside 0..=7", code))?;

    let tag = match obj.get("tag") {
        Some(Value::String(tag)) => tag.clone(),
        Some(_) => return Err("'tag' must be a string".into()),
        None => return Err("missing required field 'tag'".into()),
    };

    let kind = match message_type {
        MessageType::Handshake => MessageKind::Handshake,
        MessageType::FinishSuccess => MessageKind::FinishSuccess,
        MessageType::PageDone => MessageKind::PageDone,
        MessageType::PagePostponed => MessageKind::PagePostponed,
        MessageType::Preflight => MessageKind::Preflight {
            total: required_count(obj, "total")?,
        },
        MessageType::Progress => MessageKind::Progress(progress(obj)?),
        MessageType::ErrorFatal => MessageKind::ErrorFatal(worker_error(obj)?),
        MessageType::ErrorNonfatal => MessageKind::ErrorNonfatal(worker_error(obj)?),
    };

    Ok(Message { tag, kind })
}

fn progress(obj: &Map<String, Value>) -> Result<ProgressUpdate, String> {
    let code = int_field(obj, "status")?.ok_or("Progress requires 'status'")?;
    let status = WorkerStatus::from_code(code)
        .ok_or_else(|| format!("'status' {} is outside 0..=8", code))?;

    match status {
        WorkerStatus::PagesMain => Ok(ProgressUpdate::PagesMain {
            done: required_count(obj, "done")?,
            postponed: required_count(obj, "postponed")?,
        }),
        WorkerStatus::BuildingSitemap
        | WorkerStatus::ForumsMain
        | WorkerStatus::PagesPending
        | WorkerStatus::FilesPending
        | WorkerStatus::Compressing => Ok(ProgressUpdate::Phase(status)),
        // Terminal and placeholder phases are never reported through Progress
        WorkerStatus::FatalError | WorkerStatus::Other | WorkerStatus::Done => Err(format!(
            "Progress cannot report status {:?}",
            status
        )),
    }
}

fn worker_error(obj: &Map<String, Value>) -> Result<WorkerError, String> {
    let code = int_field(obj, "errorKind")?.ok_or("error messages require 'errorKind'")?;
    let kind = ErrorKind::from_code(code)
        .ok_or_else(|| format!("'errorKind' {} is outside 0..=14", code))?;

    let name = match obj.get("name") {
        Some(Value::String(name)) => Some(name.clone()),
        Some(_) if kind.requires_name() => return Err("'name' must be a string".into()),
        _ => None,
    };
    if kind.requires_name() && name.is_none() {
        return Err(format!("errorKind {:?} requires 'name'", kind));
    }

    Ok(WorkerError { kind, name })
}

/// Integer field lookup. `Ok(None)` when absent, `Err` when present but not an integer.
fn int_field(obj: &Map<String, Value>, field: &str) -> Result<Option<i64>, String> {
    match obj.get(field) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| format!("'{}' must be an integer", field)),
    }
}

fn required_count(obj: &Map<String, Value>, field: &str) -> Result<u64, String> {
    let value = int_field(obj, field)?.ok_or_else(|| format!("missing required field '{}'", field))?;
    u64::try_from(value).map_err(|_| format!("'{}' must be >= 0", field))
}
