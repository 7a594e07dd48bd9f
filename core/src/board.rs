//! In-memory store of per-session SOP checklists, used by the dispatcher.

use crate::error::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sopcheck_protocol::{ChecklistUpdate, SessionId, SopUpdate, Step};
use std::collections::BTreeMap;
use std::path::Path;

/// Catalog file: the procedures each session starts with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SopCatalog {
    pub sessions: Vec<CatalogSession>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSession {
    pub session_id: SessionId,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    pub steps: Vec<CatalogStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStep {
    pub step_id: String,
    pub step_number: u32,
    pub description: String,
}

impl SopCatalog {
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let catalog: SopCatalog = serde_json::from_str(content)?;
        for session in &catalog.sessions {
            let mut seen = std::collections::HashSet::new();
            for step in &session.steps {
                if !seen.insert(step.step_id.as_str()) {
                    return Err(SyncError::Catalog(format!(
                        "duplicate step {} in session {}",
                        step.step_id, session.session_id
                    )));
                }
            }
        }
        Ok(catalog)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardStep {
    pub step_id: String,
    pub step_number: u32,
    pub description: String,
    pub checked: bool,
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
struct SessionChecklist {
    service: Option<String>,
    confidence: Option<f64>,
    steps: Vec<BoardStep>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionBoard {
    sessions: BTreeMap<SessionId, SessionChecklist>,
}

impl SessionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: SopCatalog) -> Self {
        let mut board = Self::new();
        for session in catalog.sessions {
            let mut steps: Vec<BoardStep> = session
                .steps
                .into_iter()
                .map(|s| BoardStep {
                    step_id: s.step_id,
                    step_number: s.step_number,
                    description: s.description,
                    checked: false,
                    checked_at: None,
                })
                .collect();
            steps.sort_by_key(|s| s.step_number);
            board.sessions.insert(
                session.session_id,
                SessionChecklist {
                    service: session.service,
                    confidence: session.confidence,
                    steps,
                },
            );
        }
        board
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn steps(&self, session_id: &SessionId) -> Option<&[BoardStep]> {
        self.sessions.get(session_id).map(|s| s.steps.as_slice())
    }

    /// Record a checkbox change and return the session's new snapshot.
    pub fn apply(&mut self, update: &ChecklistUpdate) -> Result<SopUpdate> {
        let session = self
            .sessions
            .get_mut(&update.session_id)
            .ok_or_else(|| SyncError::UnknownSession(update.session_id.to_string()))?;
        let step = session
            .steps
            .iter_mut()
            .find(|s| s.step_id == update.step_id)
            .ok_or_else(|| SyncError::UnknownStep {
                session_id: update.session_id.to_string(),
                step_id: update.step_id.clone(),
            })?;

        step.checked = update.checked;
        step.checked_at = if update.checked {
            Some(parse_timestamp(&update.timestamp).unwrap_or_else(Utc::now))
        } else {
            None
        };
        tracing::info!(
            session = %update.session_id,
            step = %update.step_id,
            checked = update.checked,
            "step updated"
        );

        self.snapshot(&update.session_id)
            .ok_or_else(|| SyncError::UnknownSession(update.session_id.to_string()))
    }

    pub fn snapshot(&self, session_id: &SessionId) -> Option<SopUpdate> {
        let session = self.sessions.get(session_id)?;
        Some(SopUpdate {
            session_id: session_id.clone(),
            checklist: session.steps.iter().map(to_wire_step).collect(),
            service: session.service.clone(),
            confidence: session.confidence,
        })
    }

    pub fn snapshots(&self) -> Vec<SopUpdate> {
        self.sessions
            .keys()
            .filter_map(|id| self.snapshot(id))
            .collect()
    }

    /// True when every step of the session is checked.
    pub fn is_normal_flow(&self, session_id: &SessionId) -> Option<bool> {
        self.sessions
            .get(session_id)
            .map(|s| s.steps.iter().all(|step| step.checked))
    }
}

fn to_wire_step(step: &BoardStep) -> Step {
    Step {
        step_id: step.step_id.clone(),
        description: step.description.clone(),
        checked: step.checked,
        checked_at: step
            .checked_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}

/// `None` for an absent or unparseable timestamp.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
