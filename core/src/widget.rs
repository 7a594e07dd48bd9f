//! Checklist view kept in sync with the dispatcher.
//!
//! The widget owns the rendered container. Inbound `sop_update` events for
//! its own session rebuild the container from scratch; user toggles flip a
//! checkbox and emit a `checklist_update` without waiting for a reply.

use crate::event_sender::EventSink;
use sopcheck_protocol::{ChecklistUpdate, InboundEvent, OutboundEvent, SessionId, SopUpdate, Step};

pub const CONTAINER_ID: &str = "checklist-container";

/// Style marker put on the label of a step the server reports as checked.
pub const CHECKED_CLASS: &str = "checked";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkbox {
    pub id: String,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub html_for: String,
    pub text: String,
    pub classes: Vec<&'static str>,
}

impl Label {
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| *c == class)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRow {
    pub checkbox: Checkbox,
    pub label: Label,
    pub checked_at: Option<String>,
}

impl StepRow {
    fn from_step(step: &Step) -> Self {
        let mut classes = Vec::new();
        if step.checked {
            classes.push(CHECKED_CLASS);
        }
        Self {
            checkbox: Checkbox {
                id: step.step_id.clone(),
                checked: step.checked,
            },
            label: Label {
                html_for: step.step_id.clone(),
                text: step.description.clone(),
                classes,
            },
            checked_at: step.checked_at.clone(),
        }
    }

    pub fn step_id(&self) -> &str {
        &self.checkbox.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecklistContainer {
    id: &'static str,
    rows: Vec<StepRow>,
}

impl Default for ChecklistContainer {
    fn default() -> Self {
        Self {
            id: CONTAINER_ID,
            rows: Vec::new(),
        }
    }
}

impl ChecklistContainer {
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn rows(&self) -> &[StepRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn checked_count(&self) -> usize {
        self.rows.iter().filter(|r| r.checkbox.checked).count()
    }

    fn clear(&mut self) {
        self.rows.clear();
    }

    fn append(&mut self, row: StepRow) {
        self.rows.push(row);
    }

    fn row_mut(&mut self, step_id: &str) -> Option<&mut StepRow> {
        self.rows.iter_mut().find(|r| r.checkbox.id == step_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The update belonged to another session.
    Ignored,
}

pub struct ChecklistSyncWidget<S> {
    session_id: SessionId,
    sink: S,
    container: ChecklistContainer,
    service: Option<String>,
    confidence: Option<f64>,
}

impl<S: EventSink> ChecklistSyncWidget<S> {
    pub fn new(session_id: SessionId, sink: S) -> Self {
        Self {
            session_id,
            sink,
            container: ChecklistContainer::default(),
            service: None,
            confidence: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn container(&self) -> &ChecklistContainer {
        &self.container
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn handle_event(&mut self, event: InboundEvent) -> UpdateOutcome {
        match event {
            InboundEvent::SopUpdate(update) => self.apply_sop_update(update),
        }
    }

    pub fn apply_sop_update(&mut self, update: SopUpdate) -> UpdateOutcome {
        if update.session_id != self.session_id {
            tracing::trace!(session = %update.session_id, "dropping sop_update for other session");
            return UpdateOutcome::Ignored;
        }

        self.container.clear();
        for step in &update.checklist {
            self.container.append(StepRow::from_step(step));
        }
        self.service = update.service;
        self.confidence = update.confidence;

        tracing::debug!(
            session = %self.session_id,
            steps = self.container.len(),
            "rendered checklist"
        );
        UpdateOutcome::Applied
    }

    /// Flip the checkbox of `step_id` and emit the new state.
    pub fn toggle(&mut self, step_id: &str) -> Option<ChecklistUpdate> {
        let checked = !self.container.rows.iter().find(|r| r.checkbox.id == step_id)?.checkbox.checked;
        self.set_checked(step_id, checked)
    }

    /// Set the checkbox of `step_id` and emit one `checklist_update`.
    ///
    /// Returns `None` when no rendered row has that id. Send failures are
    /// logged and otherwise ignored.
    pub fn set_checked(&mut self, step_id: &str, checked: bool) -> Option<ChecklistUpdate> {
        let row = self.container.row_mut(step_id)?;
        row.checkbox.checked = checked;

        let update = ChecklistUpdate::now(self.session_id.clone(), step_id, checked);
        if let Err(e) = self.sink.emit(OutboundEvent::ChecklistUpdate(update.clone())) {
            tracing::warn!("failed to emit checklist_update for {step_id}: {e}");
        }
        Some(update)
    }
}
