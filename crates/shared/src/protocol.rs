use serde::{Deserialize, Serialize};

use crate::error::TriggerError;

/// Events delivered to the relay over the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum InboundEvent {
    Trigger {
        keyword: String,
        #[serde(rename = "requestId")]
        request_id: String,
    },
    Test,
    Stop {
        #[serde(default)]
        reason: String,
    },
}

/// Events emitted by the relay back onto the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum OutboundEvent {
    TriggerResponse {
        #[serde(rename = "requestId")]
        request_id: String,
    },
    TriggerError(TriggerError),
    SensationParsingError {
        uuid: String,
    },
    OwoConnected,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::TriggerResponse { .. } => "triggerResponse",
            OutboundEvent::TriggerError(_) => "triggerError",
            OutboundEvent::SensationParsingError { .. } => "sensationParsingError",
            OutboundEvent::OwoConnected => "owoConnected",
        }
    }
}
