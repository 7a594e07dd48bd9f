//! Wire protocol between a checklist client and the session dispatcher.
//!
//! Every WebSocket text message carries exactly one frame of the form
//! `{"event": "<name>", "data": { ... }}`. The server sends `sop_update`
//! frames, the client sends `checklist_update` frames.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the server -> client event.
pub const SOP_UPDATE: &str = "sop_update";
/// Name of the client -> server event.
pub const CHECKLIST_UPDATE: &str = "checklist_update";

/// Opaque identifier of the session a checklist belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One checklist item as sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub description: String,
    #[serde(default)]
    pub checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
}

impl Step {
    pub fn new(step_id: impl Into<String>, description: impl Into<String>, checked: bool) -> Self {
        Self {
            step_id: step_id.into(),
            description: description.into(),
            checked,
            checked_at: None,
        }
    }
}

/// Full checklist snapshot for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SopUpdate {
    pub session_id: SessionId,
    /// Older dispatchers publish the step list under `sop`.
    #[serde(alias = "sop")]
    pub checklist: Vec<Step>,
    /// Detected service name, when the dispatcher knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl SopUpdate {
    pub fn new(session_id: impl Into<SessionId>, checklist: Vec<Step>) -> Self {
        Self {
            session_id: session_id.into(),
            checklist,
            service: None,
            confidence: None,
        }
    }
}

/// A single checkbox change made by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistUpdate {
    pub session_id: SessionId,
    pub step_id: String,
    pub checked: bool,
    /// RFC 3339 UTC timestamp taken when the event was emitted. Empty when
    /// the sender left it out.
    #[serde(default)]
    pub timestamp: String,
}

impl ChecklistUpdate {
    /// Build an update stamped with the current UTC time.
    pub fn now(session_id: SessionId, step_id: impl Into<String>, checked: bool) -> Self {
        Self {
            session_id,
            step_id: step_id.into(),
            checked,
            timestamp: utc_timestamp(),
        }
    }
}

/// Current time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Events the server pushes to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "sop_update")]
    SopUpdate(SopUpdate),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::SopUpdate(_) => SOP_UPDATE,
        }
    }
}

/// Events clients push to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    #[serde(rename = "checklist_update")]
    ChecklistUpdate(ChecklistUpdate),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::ChecklistUpdate(_) => CHECKLIST_UPDATE,
        }
    }
}

pub fn encode_frame<T: Serialize>(event: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

pub fn decode_frame<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(text)
}
