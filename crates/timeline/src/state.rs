use serde::{Deserialize, Serialize};
use tracing::info;

use crate::time_map::{self, ClipBoundary, SourceSegment};
use crate::{
    now_millis, ActionFilter, ActionHistory, ActionHistoryItem, Checkpoint, CheckpointId,
    CheckpointManager, CheckpointPolicy, HistoryParts, HistoryStep, ImportMode, Seconds, Timeline,
    TimelineCommand, TimelineError, TrimId, TrimOperation, TrimQueue, UndoEntry,
    UndoRedoAvailability, DEFAULT_MAX_HISTORY_SIZE,
};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Aggregate root of one open project: the document plus its history,
/// checkpoints and pending trims.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimelineState {
    timeline: Timeline,
    history: ActionHistory,
    checkpoints: CheckpointManager,
    trims: TrimQueue,
    pub last_saved_checkpoint_id: Option<CheckpointId>,
    pub has_unsaved_changes: bool,
}

impl TimelineState {
    pub fn new(timeline: Timeline) -> Self {
        Self {
            timeline,
            ..Self::default()
        }
    }

    pub fn with_limits(mut self, max_history_size: usize, policy: CheckpointPolicy) -> Self {
        self.history.set_max_history_size(max_history_size);
        self.checkpoints.set_policy(policy);
        self
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn execute(&mut self, command: TimelineCommand) -> Result<ActionHistoryItem, TimelineError> {
        let item = self.history.execute(&mut self.timeline, command)?;
        self.has_unsaved_changes = true;
        Ok(item)
    }

    pub fn undo(&mut self) -> Result<HistoryStep, TimelineError> {
        let step = self.history.undo(&mut self.timeline)?;
        if step.is_applied() {
            self.has_unsaved_changes = true;
        }
        Ok(step)
    }

    pub fn redo(&mut self) -> Result<HistoryStep, TimelineError> {
        let step = self.history.redo(&mut self.timeline)?;
        if step.is_applied() {
            self.has_unsaved_changes = true;
        }
        Ok(step)
    }

    pub fn undo_redo_availability(&self) -> UndoRedoAvailability {
        self.history.availability()
    }

    pub fn action_history(&self, filter: &ActionFilter) -> Vec<ActionHistoryItem> {
        self.history.filter(filter)
    }

    /// Snapshots the current document. Clears the unsaved flag.
    pub fn save_checkpoint(
        &mut self,
        project_id: &str,
        description: &str,
        is_auto_save: bool,
    ) -> Checkpoint {
        let checkpoint = Checkpoint::capture(
            project_id,
            description,
            is_auto_save,
            &self.timeline,
            self.history.len(),
        );
        self.checkpoints.insert(checkpoint.clone());
        self.last_saved_checkpoint_id = Some(checkpoint.id.clone());
        self.has_unsaved_changes = false;
        checkpoint
    }

    /// Replaces the document with the checkpoint's state. Not undoable: both
    /// history stacks and any pending trims are dropped.
    pub fn restore_checkpoint(&mut self, id: &CheckpointId) -> Result<(), TimelineError> {
        let mut restored = self.checkpoints.get(id)?.full_state.clone();
        restored.normalize();
        restored.validate()?;
        self.timeline = restored;
        self.history.clear_stacks();
        self.trims.clear();
        self.last_saved_checkpoint_id = Some(id.clone());
        self.has_unsaved_changes = false;
        info!(%id, "checkpoint restored");
        Ok(())
    }

    /// Hard reset to `timeline`, keeping checkpoints and the audit log.
    pub fn reset_to(&mut self, mut timeline: Timeline) -> Result<(), TimelineError> {
        timeline.normalize();
        timeline.validate()?;
        self.timeline = timeline;
        self.history.clear_stacks();
        self.trims.clear();
        self.has_unsaved_changes = false;
        Ok(())
    }

    pub fn delete_checkpoint(&mut self, id: &CheckpointId) -> Result<Checkpoint, TimelineError> {
        let removed = self.checkpoints.delete(id)?;
        if self.last_saved_checkpoint_id.as_ref() == Some(id) {
            self.last_saved_checkpoint_id = None;
        }
        Ok(removed)
    }

    pub fn clear_auto_saves(&mut self) -> usize {
        let removed = self.checkpoints.clear_auto_saves();
        if let Some(id) = &self.last_saved_checkpoint_id {
            if self.checkpoints.get(id).is_err() {
                self.last_saved_checkpoint_id = None;
            }
        }
        removed
    }

    pub fn search_checkpoints(&self, query: &str) -> Vec<&Checkpoint> {
        self.checkpoints.search(query)
    }

    pub fn export_checkpoints(&self, project_id: &str) -> Result<String, TimelineError> {
        self.checkpoints.export(project_id)
    }

    pub fn import_checkpoints(
        &mut self,
        json: &str,
        mode: ImportMode,
    ) -> Result<usize, TimelineError> {
        self.checkpoints.import(json, mode)
    }

    pub fn set_checkpoint_policy(&mut self, policy: CheckpointPolicy) {
        self.checkpoints.set_policy(policy);
    }

    pub fn set_max_history_size(&mut self, max_history_size: usize) {
        self.history.set_max_history_size(max_history_size);
    }

    pub fn queue_trim(&mut self, operation: TrimOperation) -> Result<TrimId, TimelineError> {
        self.trims.push(&self.timeline, operation)
    }

    pub fn pending_trims(&self) -> &[TrimOperation] {
        self.trims.pending()
    }

    /// Applies every queued trim as a single history entry.
    pub fn commit_trims(&mut self) -> Result<ActionHistoryItem, TimelineError> {
        let batch = self.trims.plan(&self.timeline)?;
        let item = self.execute(batch)?;
        self.trims.clear();
        Ok(item)
    }

    pub fn discard_trims(&mut self) -> usize {
        self.trims.clear()
    }

    pub fn effective_duration(&self) -> Seconds {
        time_map::effective_duration(&self.timeline.layers)
    }

    pub fn map_timeline_to_source(&self, time: Seconds) -> Seconds {
        time_map::timeline_to_source(time, &self.timeline.layers)
    }

    pub fn map_source_to_timeline(&self, source_time: Seconds) -> Seconds {
        time_map::source_to_timeline(source_time, &self.timeline.layers)
    }

    pub fn next_clip_boundary(&self, source_time: Seconds) -> Option<ClipBoundary> {
        time_map::next_clip_boundary(source_time, &self.timeline.layers)
    }

    pub fn source_segments(&self) -> Vec<SourceSegment> {
        time_map::source_segments(&self.timeline.layers)
    }

    pub fn to_snapshot(&self, project_id: &str) -> ProjectSnapshot {
        let HistoryParts {
            action_history,
            undo_stack,
            redo_stack,
            max_history_size,
        } = self.history.to_parts();
        ProjectSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            project_id: project_id.to_string(),
            saved_at: now_millis(),
            timeline_state: PersistedTimelineState {
                timeline: self.timeline.clone(),
                undo_stack,
                redo_stack,
                last_saved_checkpoint_id: self.last_saved_checkpoint_id.clone(),
                has_unsaved_changes: self.has_unsaved_changes,
                max_history_size,
                pending_trims: self.trims.pending().to_vec(),
            },
            action_history,
            checkpoints: self.checkpoints.list().to_vec(),
        }
    }

    pub fn from_snapshot(snapshot: ProjectSnapshot) -> Result<Self, TimelineError> {
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(TimelineError::Serialization(format!(
                "snapshot format {} is newer than supported format {}",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        let persisted = snapshot.timeline_state;
        let mut timeline = persisted.timeline;
        timeline.normalize();
        timeline.validate()?;

        Ok(Self {
            timeline,
            history: ActionHistory::from_parts(HistoryParts {
                action_history: snapshot.action_history,
                undo_stack: persisted.undo_stack,
                redo_stack: persisted.redo_stack,
                max_history_size: persisted.max_history_size,
            }),
            checkpoints: CheckpointManager::from_checkpoints(
                snapshot.checkpoints,
                CheckpointPolicy::default(),
            ),
            trims: TrimQueue::from_operations(persisted.pending_trims),
            last_saved_checkpoint_id: persisted.last_saved_checkpoint_id,
            has_unsaved_changes: persisted.has_unsaved_changes,
        })
    }
}

fn default_max_history_size() -> usize {
    DEFAULT_MAX_HISTORY_SIZE
}

/// The persisted `timelineState` record: the document fields flattened next to
/// the undo machinery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimelineState {
    #[serde(flatten)]
    pub timeline: Timeline,
    #[serde(default)]
    pub undo_stack: Vec<UndoEntry>,
    #[serde(default)]
    pub redo_stack: Vec<UndoEntry>,
    #[serde(default)]
    pub last_saved_checkpoint_id: Option<CheckpointId>,
    #[serde(default)]
    pub has_unsaved_changes: bool,
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    #[serde(default)]
    pub pending_trims: Vec<TrimOperation>,
}

/// Durable record of a project, keyed by project id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
    #[serde(default)]
    pub format_version: u32,
    pub project_id: String,
    #[serde(default)]
    pub saved_at: i64,
    pub timeline_state: PersistedTimelineState,
    #[serde(default)]
    pub action_history: Vec<ActionHistoryItem>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl ProjectSnapshot {
    pub fn to_json(&self) -> Result<String, TimelineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, TimelineError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.timeline_state.has_unsaved_changes
    }

    /// Most recent checkpoint by creation time. On equal timestamps the one
    /// listed first is the newer, matching [`CheckpointManager::latest`].
    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().rev().max_by_key(|c| c.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Clip, Layer, MediaKind};

    fn state() -> TimelineState {
        TimelineState::new(Timeline {
            layers: vec![Layer::main_video("Main").with_id("main")],
            duration: 120.0,
            ..Timeline::default()
        })
    }

    fn add(start: f64, end: f64) -> TimelineCommand {
        TimelineCommand::AddClip {
            layer_id: "main".into(),
            clip: Clip::new(MediaKind::Video, start, end).with_source("clip.mp4"),
        }
    }

    #[test]
    fn commands_mark_unsaved_and_checkpoints_clear_it() {
        let mut state = state();
        assert!(!state.has_unsaved_changes);
        state.execute(add(0.0, 30.0)).unwrap();
        assert!(state.has_unsaved_changes);

        let checkpoint = state.save_checkpoint("p1", "first cut", false);
        assert!(!state.has_unsaved_changes);
        assert_eq!(state.last_saved_checkpoint_id, Some(checkpoint.id.clone()));
        assert_eq!(checkpoint.metadata.clip_count, 1);
        assert_eq!(checkpoint.metadata.action_count, 1);
    }

    #[test]
    fn empty_undo_does_not_mark_unsaved() {
        let mut state = state();
        assert_eq!(state.undo(), Ok(HistoryStep::Empty));
        assert!(!state.has_unsaved_changes);
    }

    #[test]
    fn restoring_unknown_checkpoint_fails() {
        let mut state = state();
        let id = CheckpointId::from("missing");
        assert_eq!(
            state.restore_checkpoint(&id),
            Err(TimelineError::CheckpointNotFound(id))
        );
    }

    #[test]
    fn commit_trims_is_one_history_entry() {
        let mut state = state();
        state.execute(add(0.0, 100.0)).unwrap();
        state
            .queue_trim(TrimOperation::split("main", 25.0))
            .unwrap();
        state
            .queue_trim(TrimOperation::split("main", 75.0))
            .unwrap();
        state.commit_trims().unwrap();

        assert!(state.pending_trims().is_empty());
        assert_eq!(state.timeline().clip_count(), 3);
        assert_eq!(state.history().len(), 2);

        state.undo().unwrap();
        assert_eq!(state.timeline().clip_count(), 1);
    }

    #[test]
    fn snapshot_json_round_trips() {
        let mut state = state();
        state.execute(add(0.0, 30.0)).unwrap();
        state.save_checkpoint("p1", "saved", false);
        state.execute(add(30.0, 45.0)).unwrap();
        state.undo().unwrap();
        state
            .queue_trim(TrimOperation::split("main", 10.0))
            .unwrap();

        let json = state.to_snapshot("p1").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["projectId"], "p1");
        assert_eq!(value["timelineState"]["layers"][0]["isMainVideo"], true);
        assert!(value["timelineState"]["undoStack"].is_array());

        let restored =
            TimelineState::from_snapshot(ProjectSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn latest_checkpoint_prefers_list_order_on_equal_timestamps() {
        let mut state = state();
        state.save_checkpoint("p1", "manual", false);
        state.execute(add(0.0, 10.0)).unwrap();
        state.save_checkpoint("p1", "Auto-save", true);

        let mut snapshot = state.to_snapshot("p1");
        for checkpoint in &mut snapshot.checkpoints {
            checkpoint.timestamp = 42;
        }
        let latest = snapshot.latest_checkpoint().unwrap();
        assert_eq!(latest.description, "Auto-save");
        assert!(latest.is_auto_save);

        let restored = TimelineState::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.checkpoints().latest().unwrap().description, "Auto-save");
    }

    #[test]
    fn newer_snapshot_format_is_rejected() {
        let mut snapshot = state().to_snapshot("p1");
        snapshot.format_version = SNAPSHOT_FORMAT_VERSION + 1;
        assert!(matches!(
            TimelineState::from_snapshot(snapshot),
            Err(TimelineError::Serialization(_))
        ));
    }
}
