use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const UNRECOGNIZED_MESSAGE: &str =
    "The sensation requested was not found inside of sensations available.";
pub const DISCONNECTED_MESSAGE: &str = "The application is not connected to your Owo Vest.";
pub const BUSY_MESSAGE: &str = "Another sensation is still playing.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerErrorKind {
    Disconnected,
    Unrecognized,
    InvalidSensation,
    DeviceError,
    Busy,
    Internal,
}

impl fmt::Display for TriggerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TriggerErrorKind::Disconnected => "Disconnected",
            TriggerErrorKind::Unrecognized => "Unrecognized",
            TriggerErrorKind::InvalidSensation => "InvalidSensation",
            TriggerErrorKind::DeviceError => "DeviceError",
            TriggerErrorKind::Busy => "Busy",
            TriggerErrorKind::Internal => "Internal",
        };
        f.write_str(label)
    }
}

/// Payload of the `triggerError` event. `uuid` carries the request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerError {
    #[serde(rename = "type")]
    pub kind: TriggerErrorKind,
    pub uuid: String,
    pub message: String,
}

impl TriggerError {
    pub fn new(
        kind: TriggerErrorKind,
        request_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            uuid: request_id.into(),
            message: message.into(),
        }
    }

    pub fn unrecognized(request_id: impl Into<String>) -> Self {
        Self::new(TriggerErrorKind::Unrecognized, request_id, UNRECOGNIZED_MESSAGE)
    }

    pub fn disconnected(request_id: impl Into<String>) -> Self {
        Self::new(TriggerErrorKind::Disconnected, request_id, DISCONNECTED_MESSAGE)
    }

    pub fn busy(request_id: impl Into<String>) -> Self {
        Self::new(TriggerErrorKind::Busy, request_id, BUSY_MESSAGE)
    }
}

#[derive(Debug, Error)]
#[error("{kind} ({request_id}): {message}")]
pub struct TriggerException {
    pub kind: TriggerErrorKind,
    pub request_id: String,
    pub message: String,
}

impl TriggerException {
    pub fn new(
        kind: TriggerErrorKind,
        request_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            request_id: request_id.into(),
            message: message.into(),
        }
    }
}

impl From<TriggerException> for TriggerError {
    fn from(value: TriggerException) -> Self {
        Self {
            kind: value.kind,
            uuid: value.request_id,
            message: value.message,
        }
    }
}

impl From<TriggerError> for TriggerException {
    fn from(value: TriggerError) -> Self {
        Self {
            kind: value.kind,
            request_id: value.uuid,
            message: value.message,
        }
    }
}
