//! Action history: the bounded audit log plus the undo/redo stacks.
//!
//! Undo entries hold the inverse command produced when the action was applied.
//! Applying an inverse yields the command that re-does it, so both stacks only
//! ever store typed commands, never state snapshots.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::{apply_command, now_millis, Timeline, TimelineCommand, TimelineError};

string_id!(
    /// Identifier of a recorded action.
    ActionId
);

pub const DEFAULT_MAX_HISTORY_SIZE: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    AddLayer,
    RemoveLayer,
    UpdateLayer,
    ReorderLayers,
    AddClip,
    RemoveClip,
    UpdateClip,
    MoveClip,
    TrimClip,
    SplitClip,
    MergeClips,
    UnmergeClips,
    DeleteWithGapFill,
    InsertWithRipple,
    SetPlayhead,
    SetDuration,
    SetZoom,
    SetSelection,
    AddMarker,
    RemoveMarker,
    UpdateMarker,
    Batch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Recorded,
    Undone,
    Redone,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    #[serde(default)]
    pub affected_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHistoryItem {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub description: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub status: ActionStatus,
    /// The inverse command recorded when the action was applied.
    pub captured_state_delta: TimelineCommand,
    #[serde(default)]
    pub metadata: ActionMetadata,
}

/// One entry of the undo or redo stack: the command to apply next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoEntry {
    pub action_id: ActionId,
    pub description: String,
    pub command: TimelineCommand,
}

/// Outcome of an undo/redo request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HistoryStep {
    Applied {
        action_id: ActionId,
        description: String,
    },
    /// Nothing to undo (or redo). Not an error.
    Empty,
}

impl HistoryStep {
    pub fn is_applied(&self) -> bool {
        matches!(self, HistoryStep::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRedoAvailability {
    pub can_undo: bool,
    pub can_redo: bool,
    pub undo_count: usize,
    pub redo_count: usize,
}

/// Query over the action log. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionFilter {
    #[serde(default)]
    pub action_type: Option<ActionType>,
    /// Case-insensitive substring of the description.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub since: Option<i64>,
    #[serde(default)]
    pub until: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ActionFilter {
    fn matches(&self, item: &ActionHistoryItem) -> bool {
        if self.action_type.is_some_and(|t| t != item.action_type) {
            return false;
        }
        if self.since.is_some_and(|since| item.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| item.timestamp > until) {
            return false;
        }
        match &self.text {
            Some(text) => item
                .description
                .to_lowercase()
                .contains(&text.to_lowercase()),
            None => true,
        }
    }
}

/// Serializable view of the history, split the way the snapshot stores it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryParts {
    pub action_history: Vec<ActionHistoryItem>,
    pub undo_stack: Vec<UndoEntry>,
    pub redo_stack: Vec<UndoEntry>,
    pub max_history_size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionHistory {
    action_history: VecDeque<ActionHistoryItem>,
    undo_stack: VecDeque<UndoEntry>,
    redo_stack: Vec<UndoEntry>,
    max_history_size: usize,
}

impl Default for ActionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_SIZE)
    }
}

impl ActionHistory {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            action_history: VecDeque::new(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_history_size: max_history_size.max(1),
        }
    }

    pub fn from_parts(parts: HistoryParts) -> Self {
        let mut history = Self::new(parts.max_history_size);
        history.action_history = parts.action_history.into();
        history.undo_stack = parts.undo_stack.into();
        history.redo_stack = parts.redo_stack;
        history.enforce_cap();
        history
    }

    pub fn to_parts(&self) -> HistoryParts {
        HistoryParts {
            action_history: self.action_history.iter().cloned().collect(),
            undo_stack: self.undo_stack.iter().cloned().collect(),
            redo_stack: self.redo_stack.clone(),
            max_history_size: self.max_history_size,
        }
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size.max(1);
        self.enforce_cap();
    }

    /// Applies `command` and records it. On failure nothing is recorded and the
    /// timeline is unchanged.
    pub fn execute(
        &mut self,
        timeline: &mut Timeline,
        command: TimelineCommand,
    ) -> Result<ActionHistoryItem, TimelineError> {
        let command = command.with_generated_ids();
        let action_type = command.action_type();
        let description = command.describe();
        let affected_ids = command.affected_ids();
        let inverse = apply_command(timeline, command)?;
        debug!(?action_type, %description, "applied command");

        let item = ActionHistoryItem {
            id: ActionId::new(),
            action_type,
            description,
            timestamp: now_millis(),
            status: ActionStatus::Recorded,
            captured_state_delta: inverse,
            metadata: ActionMetadata { affected_ids },
        };
        self.record(item.clone());
        Ok(item)
    }

    /// Appends an already-applied action. Any pending redo is discarded.
    pub fn record(&mut self, item: ActionHistoryItem) {
        self.undo_stack.push_back(UndoEntry {
            action_id: item.id.clone(),
            description: item.description.clone(),
            command: item.captured_state_delta.clone(),
        });
        self.action_history.push_back(item);
        self.redo_stack.clear();
        self.enforce_cap();
    }

    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<HistoryStep, TimelineError> {
        let Some(entry) = self.undo_stack.pop_back() else {
            return Ok(HistoryStep::Empty);
        };
        match apply_command(timeline, entry.command.clone()) {
            Ok(redo) => {
                debug!(action_id = %entry.action_id, "undo");
                self.set_status(&entry.action_id, ActionStatus::Undone);
                let step = HistoryStep::Applied {
                    action_id: entry.action_id.clone(),
                    description: entry.description.clone(),
                };
                self.redo_stack.push(UndoEntry {
                    command: redo,
                    ..entry
                });
                Ok(step)
            }
            Err(err) => {
                self.undo_stack.push_back(entry);
                Err(TimelineError::StateConflict(format!(
                    "undo no longer applies: {}",
                    err
                )))
            }
        }
    }

    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<HistoryStep, TimelineError> {
        let Some(entry) = self.redo_stack.pop() else {
            return Ok(HistoryStep::Empty);
        };
        match apply_command(timeline, entry.command.clone()) {
            Ok(undo) => {
                debug!(action_id = %entry.action_id, "redo");
                self.set_status(&entry.action_id, ActionStatus::Redone);
                let step = HistoryStep::Applied {
                    action_id: entry.action_id.clone(),
                    description: entry.description.clone(),
                };
                self.undo_stack.push_back(UndoEntry {
                    command: undo,
                    ..entry
                });
                Ok(step)
            }
            Err(err) => {
                self.redo_stack.push(entry);
                Err(TimelineError::StateConflict(format!(
                    "redo no longer applies: {}",
                    err
                )))
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn availability(&self) -> UndoRedoAvailability {
        UndoRedoAvailability {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            undo_count: self.undo_stack.len(),
            redo_count: self.redo_stack.len(),
        }
    }

    /// Oldest first.
    pub fn items(&self) -> impl Iterator<Item = &ActionHistoryItem> {
        self.action_history.iter()
    }

    pub fn len(&self) -> usize {
        self.action_history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.action_history.is_empty()
    }

    /// Matching items, newest first.
    pub fn filter(&self, filter: &ActionFilter) -> Vec<ActionHistoryItem> {
        self.action_history
            .iter()
            .rev()
            .filter(|item| filter.matches(item))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Drops undo and redo stacks. The audit log is kept.
    pub fn clear_stacks(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn clear(&mut self) {
        self.clear_stacks();
        self.action_history.clear();
    }

    fn set_status(&mut self, id: &ActionId, status: ActionStatus) {
        if let Some(item) = self.action_history.iter_mut().find(|i| &i.id == id) {
            item.status = status;
        }
    }

    fn enforce_cap(&mut self) {
        while self.action_history.len() > self.max_history_size {
            self.action_history.pop_front();
        }
        while self.undo_stack.len() > self.max_history_size {
            self.undo_stack.pop_front();
        }
        self.redo_stack.truncate(self.max_history_size);
    }
}
