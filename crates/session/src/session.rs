use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use project::SnapshotStore;
use timeline::{
    ActionFilter, ActionHistoryItem, Checkpoint, CheckpointId, ClipBoundary, HistoryStep,
    ImportMode, Seconds, SourceSegment, Timeline, TimelineCommand, TimelineError, TimelineState,
    TrimId, TrimOperation, UndoRedoAvailability,
};

use crate::recovery::{self, RecoveryEvent, RecoveryManager, RecoveryOption, RecoveryOutcome};
use crate::{
    CommandResponse, RecoveryResolution, Result, ScheduledTask, SessionConfig, SessionError,
    TaskSlot,
};

const AUTO_SAVE_DESCRIPTION: &str = "Auto-save";
const QUICK_SAVE_DESCRIPTION: &str = "Quick save";

struct Inner {
    project_id: String,
    config: SessionConfig,
    state: Mutex<TimelineState>,
    store: Arc<dyn SnapshotStore>,
    /// Held from snapshot capture until the blocking write returns, so writes
    /// land in the order they were taken even when the caller is aborted.
    write_gate: Arc<tokio::sync::Mutex<()>>,
    debounce: TaskSlot,
    auto_save: TaskSlot,
    pending_recovery: Mutex<Option<RecoveryEvent>>,
}

/// One editing session for one project.
///
/// Commands run synchronously against the owned [`TimelineState`]. Storage is
/// only touched by the debounced writer, the auto-save timer and explicit
/// [`EditorSession::flush`]. Timers need a running Tokio runtime.
pub struct EditorSession {
    inner: Arc<Inner>,
}

impl EditorSession {
    /// Loads the project's persisted state and reconciles it.
    pub async fn open(
        project_id: impl Into<String>,
        store: Arc<dyn SnapshotStore>,
        config: SessionConfig,
    ) -> Result<(Self, RecoveryOutcome)> {
        config.validate()?;
        let project_id = project_id.into();
        let manager = RecoveryManager::new(store.clone(), config.clone());
        let load_id = project_id.clone();
        let (state, outcome) = tokio::task::spawn_blocking(move || manager.load(&load_id))
            .await
            .map_err(|err| SessionError::Persistence(err.to_string()))??;

        let pending = match &outcome {
            RecoveryOutcome::PromptRequired(event) => Some(event.clone()),
            _ => None,
        };
        let session = Self {
            inner: Arc::new(Inner {
                project_id,
                config,
                state: Mutex::new(state),
                store,
                write_gate: Arc::new(tokio::sync::Mutex::new(())),
                debounce: TaskSlot::new(),
                auto_save: TaskSlot::new(),
                pending_recovery: Mutex::new(pending),
            }),
        };
        if matches!(outcome, RecoveryOutcome::SilentRestore { .. }) {
            session.after_change();
        } else {
            session.sync_auto_save();
        }
        info!(project_id = %session.inner.project_id, ?outcome, "session opened");
        Ok((session, outcome))
    }

    pub fn project_id(&self) -> &str {
        &self.inner.project_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn execute(&self, command: TimelineCommand) -> CommandResponse<ActionHistoryItem> {
        let result = self.inner.state.lock().execute(command);
        self.respond(result.map_err(SessionError::from), true)
    }

    pub fn undo(&self) -> CommandResponse<HistoryStep> {
        self.step(TimelineState::undo, "undo")
    }

    pub fn redo(&self) -> CommandResponse<HistoryStep> {
        self.step(TimelineState::redo, "redo")
    }

    /// Only one undo/redo may run at a time; an overlapping call is refused.
    fn step(
        &self,
        op: fn(&mut TimelineState) -> std::result::Result<HistoryStep, TimelineError>,
        name: &str,
    ) -> CommandResponse<HistoryStep> {
        let result = match self.inner.state.try_lock() {
            Some(mut state) => op(&mut state).map_err(SessionError::from),
            None => Err(SessionError::from(TimelineError::StateConflict(format!(
                "{} already in progress",
                name
            )))),
        };
        let changed = matches!(result, Ok(HistoryStep::Applied { .. }));
        self.respond(result, changed)
    }

    pub fn save_checkpoint(&self, description: &str, is_auto_save: bool) -> CommandResponse<Checkpoint> {
        let checkpoint = self.inner.state.lock().save_checkpoint(
            &self.inner.project_id,
            description,
            is_auto_save,
        );
        self.respond(Ok(checkpoint), true)
    }

    pub fn quick_save(&self) -> CommandResponse<Checkpoint> {
        self.save_checkpoint(QUICK_SAVE_DESCRIPTION, false)
    }

    pub fn restore_checkpoint(&self, id: &CheckpointId) -> CommandResponse<()> {
        let result = self.inner.state.lock().restore_checkpoint(id);
        self.respond(result.map_err(SessionError::from), true)
    }

    pub fn delete_checkpoint(&self, id: &CheckpointId) -> CommandResponse<Checkpoint> {
        let result = self.inner.state.lock().delete_checkpoint(id);
        self.respond(result.map_err(SessionError::from), true)
    }

    pub fn clear_auto_saves(&self) -> CommandResponse<usize> {
        let removed = self.inner.state.lock().clear_auto_saves();
        self.respond(Ok(removed), true)
    }

    pub fn export_checkpoints(&self) -> CommandResponse<String> {
        let result = self
            .inner
            .state
            .lock()
            .export_checkpoints(&self.inner.project_id);
        self.respond(result.map_err(SessionError::from), false)
    }

    pub fn import_checkpoints(&self, json: &str, mode: ImportMode) -> CommandResponse<usize> {
        let result = self.inner.state.lock().import_checkpoints(json, mode);
        self.respond(result.map_err(SessionError::from), true)
    }

    pub fn queue_trim(&self, operation: TrimOperation) -> CommandResponse<TrimId> {
        let result = self.inner.state.lock().queue_trim(operation);
        self.respond(result.map_err(SessionError::from), true)
    }

    pub fn commit_trims(&self) -> CommandResponse<ActionHistoryItem> {
        let result = self.inner.state.lock().commit_trims();
        self.respond(result.map_err(SessionError::from), true)
    }

    pub fn discard_trims(&self) -> CommandResponse<usize> {
        let dropped = self.inner.state.lock().discard_trims();
        self.respond(Ok(dropped), dropped > 0)
    }

    /// Applies the caller's answer to a pending [`RecoveryEvent`]. The
    /// auto-save timer stays off until this is called.
    pub fn resolve_recovery(&self, option: RecoveryOption) -> CommandResponse<RecoveryResolution> {
        let pending = self.inner.pending_recovery.lock().take();
        let result = match pending {
            Some(event) => {
                let result = recovery::resolve(&mut self.inner.state.lock(), &event, option);
                info!(project_id = %event.project_id, ?option, "recovery resolved");
                result
            }
            None => Err(SessionError::from(TimelineError::StateConflict(
                "no recovery decision pending".to_string(),
            ))),
        };
        self.respond(result, true)
    }

    pub fn pending_recovery(&self) -> Option<RecoveryEvent> {
        self.inner.pending_recovery.lock().clone()
    }

    pub fn timeline(&self) -> Timeline {
        self.inner.state.lock().timeline().clone()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.state.lock().has_unsaved_changes
    }

    pub fn effective_duration(&self) -> Seconds {
        self.inner.state.lock().effective_duration()
    }

    pub fn map_timeline_to_source(&self, time: Seconds) -> Seconds {
        self.inner.state.lock().map_timeline_to_source(time)
    }

    pub fn map_source_to_timeline(&self, source_time: Seconds) -> Seconds {
        self.inner.state.lock().map_source_to_timeline(source_time)
    }

    pub fn next_clip_boundary(&self, source_time: Seconds) -> Option<ClipBoundary> {
        self.inner.state.lock().next_clip_boundary(source_time)
    }

    pub fn source_segments(&self) -> Vec<SourceSegment> {
        self.inner.state.lock().source_segments()
    }

    pub fn undo_redo_availability(&self) -> UndoRedoAvailability {
        self.inner.state.lock().undo_redo_availability()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.inner.state.lock().checkpoints().list().to_vec()
    }

    pub fn search_checkpoints(&self, query: &str) -> Vec<Checkpoint> {
        self.inner
            .state
            .lock()
            .search_checkpoints(query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn action_history(&self, filter: &ActionFilter) -> Vec<ActionHistoryItem> {
        self.inner.state.lock().action_history(filter)
    }

    pub fn pending_trims(&self) -> Vec<TrimOperation> {
        self.inner.state.lock().pending_trims().to_vec()
    }

    pub fn is_auto_save_active(&self) -> bool {
        self.inner.auto_save.is_active()
    }

    /// Writes the current snapshot now, superseding any pending debounced write.
    pub async fn flush(&self) -> Result<()> {
        self.inner.debounce.cancel();
        self.inner.persist().await
    }

    /// Stops the timers and writes a final snapshot.
    pub async fn close(self) -> Result<()> {
        self.inner.auto_save.cancel();
        self.flush().await
    }

    fn respond<T>(&self, result: Result<T>, changed: bool) -> CommandResponse<T> {
        match &result {
            Ok(_) if changed => self.after_change(),
            Ok(_) => {}
            Err(err) => debug!(error = %err, "command rejected"),
        }
        CommandResponse::from(result)
    }

    /// Schedules a debounced write and starts or stops the auto-save timer.
    fn after_change(&self) {
        let weak = Arc::downgrade(&self.inner);
        self.inner.debounce.replace(ScheduledTask::after(
            self.inner.config.persist_debounce(),
            async move {
                if let Some(inner) = weak.upgrade() {
                    if let Err(err) = inner.persist().await {
                        warn!(error = %err, "debounced snapshot write failed");
                    }
                }
            },
        ));
        self.sync_auto_save();
    }

    fn sync_auto_save(&self) {
        let awaiting_decision = self.inner.pending_recovery.lock().is_some();
        if self.has_unsaved_changes() && !awaiting_decision {
            let weak = Arc::downgrade(&self.inner);
            let period = self.inner.config.auto_save_interval();
            let started = self
                .inner
                .auto_save
                .ensure_running(|| ScheduledTask::spawn(auto_save_loop(weak, period)));
            if started {
                debug!(project_id = %self.inner.project_id, "auto-save timer started");
            }
        } else if self.inner.auto_save.is_active() {
            self.inner.auto_save.cancel();
            debug!(project_id = %self.inner.project_id, "auto-save timer stopped");
        }
    }
}

impl Drop for EditorSession {
    fn drop(&mut self) {
        self.inner.debounce.cancel();
        self.inner.auto_save.cancel();
    }
}

/// Saves an auto checkpoint every `period` until nothing is left unsaved.
async fn auto_save_loop(weak: Weak<Inner>, period: std::time::Duration) {
    loop {
        tokio::time::sleep(period).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let saved = {
            let mut state = inner.state.lock();
            if state.has_unsaved_changes {
                Some(state.save_checkpoint(&inner.project_id, AUTO_SAVE_DESCRIPTION, true))
            } else {
                None
            }
        };
        match saved {
            Some(checkpoint) => {
                info!(project_id = %inner.project_id, checkpoint = %checkpoint.id, "auto-saved");
                inner.debounce.cancel();
                if let Err(err) = inner.persist().await {
                    warn!(error = %err, "auto-save snapshot write failed");
                }
            }
            None => return,
        }
        if !inner.state.lock().has_unsaved_changes {
            return;
        }
    }
}

impl Inner {
    async fn persist(&self) -> Result<()> {
        let gate = self.write_gate.clone().lock_owned().await;
        let json = {
            let state = self.state.lock();
            state.to_snapshot(&self.project_id).to_json()?
        };
        let store = self.store.clone();
        let project_id = self.project_id.clone();
        let bytes = json.len();
        tokio::task::spawn_blocking(move || {
            let _gate = gate;
            store.save(&project_id, &json)
        })
        .await
        .map_err(|err| SessionError::Persistence(err.to_string()))?
        .map_err(|err| SessionError::Persistence(format!("{:#}", err)))?;
        debug!(project_id = %self.project_id, bytes, "snapshot persisted");
        Ok(())
    }
}
