//! Startup reconciliation of persisted project state.
//!
//! A persisted record with unsaved changes means the previous session ended
//! without a checkpoint covering its latest edits. If the newest checkpoint is
//! an auto-save it is restored silently; otherwise the caller is asked to pick
//! restore, discard or continue.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use project::SnapshotStore;
use timeline::{CheckpointId, ProjectSnapshot, Timeline, TimelineState};

use crate::{Result, SessionConfig, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOption {
    /// Apply the latest checkpoint.
    Restore,
    /// Reset to the last saved checkpoint, dropping the unsaved edits.
    Discard,
    /// Keep the recovered state as is.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSummary {
    pub id: CheckpointId,
    pub description: String,
    pub timestamp: i64,
    pub is_auto_save: bool,
}

/// Raised when a persisted record with unsaved changes needs a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEvent {
    pub project_id: String,
    pub saved_at: i64,
    pub latest_checkpoint: Option<CheckpointSummary>,
    pub last_saved_checkpoint_id: Option<CheckpointId>,
    pub options: Vec<RecoveryOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RecoveryOutcome {
    /// Nothing persisted for this project.
    Fresh,
    /// Persisted state had no unsaved changes and was loaded as is.
    Clean,
    /// Unsaved state was replaced by the newest auto-save without asking.
    SilentRestore { checkpoint_id: CheckpointId },
    /// The caller must choose one of the event's options.
    PromptRequired(RecoveryEvent),
    /// The record could not be read as a snapshot; an empty timeline was used.
    Corrupt { message: String },
}

/// What a resolved recovery decision did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RecoveryResolution {
    Restored { checkpoint_id: CheckpointId },
    ResetToEmpty,
    Continued,
}

pub struct RecoveryManager {
    store: Arc<dyn SnapshotStore>,
    config: SessionConfig,
}

impl RecoveryManager {
    pub fn new(store: Arc<dyn SnapshotStore>, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Loads the project's persisted state. Storage failures are returned as
    /// errors; an unreadable record falls back to an empty timeline.
    pub fn load(&self, project_id: &str) -> Result<(TimelineState, RecoveryOutcome)> {
        let raw = self
            .store
            .load(project_id)
            .map_err(|err| SessionError::Persistence(format!("{:#}", err)))?;
        let Some(raw) = raw else {
            info!(project_id, "no persisted state, starting fresh");
            return Ok((self.empty_state(), RecoveryOutcome::Fresh));
        };

        let snapshot = match parse_snapshot(&raw) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(project_id, error = %err, "persisted state unreadable, starting empty");
                return Ok((
                    self.empty_state(),
                    RecoveryOutcome::Corrupt {
                        message: err.to_string(),
                    },
                ));
            }
        };
        let saved_at = snapshot.saved_at;
        let needs_recovery = snapshot.has_unsaved_changes();
        let latest = snapshot.latest_checkpoint().map(|c| CheckpointSummary {
            id: c.id.clone(),
            description: c.description.clone(),
            timestamp: c.timestamp,
            is_auto_save: c.is_auto_save,
        });

        let mut state = match TimelineState::from_snapshot(snapshot) {
            Ok(state) => state.with_limits(
                self.config.max_history_size,
                self.config.checkpoint_policy(),
            ),
            Err(err) => {
                warn!(project_id, error = %err, "persisted state invalid, starting empty");
                return Ok((
                    self.empty_state(),
                    RecoveryOutcome::Corrupt {
                        message: err.to_string(),
                    },
                ));
            }
        };

        if !needs_recovery {
            info!(project_id, "loaded clean state");
            return Ok((state, RecoveryOutcome::Clean));
        }

        match latest {
            Some(checkpoint) if checkpoint.is_auto_save => {
                match state.restore_checkpoint(&checkpoint.id) {
                    Ok(()) => {
                        info!(
                            project_id,
                            checkpoint = %checkpoint.id,
                            "recovered silently from auto-save"
                        );
                        Ok((
                            state,
                            RecoveryOutcome::SilentRestore {
                                checkpoint_id: checkpoint.id,
                            },
                        ))
                    }
                    Err(err) => {
                        warn!(
                            project_id,
                            checkpoint = %checkpoint.id,
                            error = %err,
                            "auto-save checkpoint unusable, starting empty"
                        );
                        Ok((
                            self.empty_state(),
                            RecoveryOutcome::Corrupt {
                                message: err.to_string(),
                            },
                        ))
                    }
                }
            }
            latest => {
                info!(project_id, "unsaved changes found, recovery decision required");
                let event = RecoveryEvent {
                    project_id: project_id.to_string(),
                    saved_at,
                    latest_checkpoint: latest,
                    last_saved_checkpoint_id: state.last_saved_checkpoint_id.clone(),
                    options: vec![
                        RecoveryOption::Restore,
                        RecoveryOption::Discard,
                        RecoveryOption::Continue,
                    ],
                };
                Ok((state, RecoveryOutcome::PromptRequired(event)))
            }
        }
    }

    fn empty_state(&self) -> TimelineState {
        TimelineState::new(Timeline::default()).with_limits(
            self.config.max_history_size,
            self.config.checkpoint_policy(),
        )
    }
}

fn parse_snapshot(raw: &str) -> Result<ProjectSnapshot> {
    ProjectSnapshot::from_json(raw).map_err(|err| SessionError::Recovery(err.to_string()))
}

/// Applies the caller's choice to a state loaded with [`RecoveryOutcome::PromptRequired`].
///
/// `restore` and `discard` act on the checkpoints named in `event`, the ones
/// the caller was shown, as long as they still exist.
pub fn resolve(
    state: &mut TimelineState,
    event: &RecoveryEvent,
    option: RecoveryOption,
) -> Result<RecoveryResolution> {
    match option {
        RecoveryOption::Restore => {
            let offered = event
                .latest_checkpoint
                .as_ref()
                .map(|c| c.id.clone())
                .filter(|id| state.checkpoints().get(id).is_ok());
            match offered {
                Some(id) => {
                    state.restore_checkpoint(&id)?;
                    Ok(RecoveryResolution::Restored { checkpoint_id: id })
                }
                None => resolve(state, event, RecoveryOption::Discard),
            }
        }
        RecoveryOption::Discard => {
            let known_good = event
                .last_saved_checkpoint_id
                .clone()
                .filter(|id| state.checkpoints().get(id).is_ok());
            match known_good {
                Some(id) => {
                    state.restore_checkpoint(&id)?;
                    Ok(RecoveryResolution::Restored { checkpoint_id: id })
                }
                None => {
                    state.reset_to(Timeline::default())?;
                    Ok(RecoveryResolution::ResetToEmpty)
                }
            }
        }
        RecoveryOption::Continue => Ok(RecoveryResolution::Continued),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use project::MemoryStore;
    use timeline::{Clip, Layer, MediaKind, TimelineCommand};

    fn manager(store: Arc<MemoryStore>) -> RecoveryManager {
        RecoveryManager::new(store, SessionConfig::default())
    }

    fn edited_state() -> TimelineState {
        let mut state = TimelineState::new(Timeline {
            layers: vec![Layer::main_video("Main").with_id("main")],
            ..Timeline::default()
        });
        state
            .execute(TimelineCommand::AddClip {
                layer_id: "main".into(),
                clip: Clip::new(MediaKind::Video, 0.0, 10.0).with_id("c1"),
            })
            .unwrap();
        state
    }

    fn persist(store: &MemoryStore, state: &TimelineState) {
        let json = state.to_snapshot("p1").to_json().unwrap();
        store.save("p1", &json).unwrap();
    }

    #[test]
    fn nothing_persisted_is_fresh() {
        let store = Arc::new(MemoryStore::new());
        let (state, outcome) = manager(store).load("p1").unwrap();
        assert_eq!(outcome, RecoveryOutcome::Fresh);
        assert_eq!(state.timeline(), &Timeline::default());
    }

    #[test]
    fn clean_state_loads_as_is() {
        let store = Arc::new(MemoryStore::new());
        let mut state = edited_state();
        state.save_checkpoint("p1", "manual", false);
        persist(&store, &state);

        let (loaded, outcome) = manager(store).load("p1").unwrap();
        assert_eq!(outcome, RecoveryOutcome::Clean);
        assert_eq!(loaded.timeline(), state.timeline());
    }

    #[test]
    fn auto_save_is_restored_silently() {
        let store = Arc::new(MemoryStore::new());
        let mut state = edited_state();
        let auto = state.save_checkpoint("p1", "Auto-save", true);
        state
            .execute(TimelineCommand::SetPlayhead { time: 4.0 })
            .unwrap();
        persist(&store, &state);

        let (loaded, outcome) = manager(store).load("p1").unwrap();
        assert_eq!(
            outcome,
            RecoveryOutcome::SilentRestore {
                checkpoint_id: auto.id.clone()
            }
        );
        assert_eq!(loaded.timeline(), &auto.full_state);
        assert!(!loaded.has_unsaved_changes);
    }

    #[test]
    fn manual_checkpoint_requires_a_decision() {
        let store = Arc::new(MemoryStore::new());
        let mut state = edited_state();
        let manual = state.save_checkpoint("p1", "Rough cut", false);
        state
            .execute(TimelineCommand::SetPlayhead { time: 4.0 })
            .unwrap();
        persist(&store, &state);

        let (mut loaded, outcome) = manager(store).load("p1").unwrap();
        let RecoveryOutcome::PromptRequired(event) = outcome else {
            panic!("expected a prompt, got {:?}", outcome);
        };
        assert_eq!(event.latest_checkpoint.as_ref().unwrap().id, manual.id);
        assert_eq!(event.options.len(), 3);
        assert_eq!(loaded.timeline().playhead_time, 4.0);

        let resolution = resolve(&mut loaded, &event, RecoveryOption::Discard).unwrap();
        assert_eq!(
            resolution,
            RecoveryResolution::Restored {
                checkpoint_id: manual.id
            }
        );
        assert_eq!(loaded.timeline().playhead_time, 0.0);
        assert!(!loaded.has_unsaved_changes);
    }

    #[test]
    fn discard_without_checkpoints_resets_to_empty() {
        let store = Arc::new(MemoryStore::new());
        persist(&store, &edited_state());

        let (mut loaded, outcome) = manager(store).load("p1").unwrap();
        let RecoveryOutcome::PromptRequired(event) = outcome else {
            panic!("expected a prompt, got {:?}", outcome);
        };
        assert_eq!(
            resolve(&mut loaded, &event, RecoveryOption::Restore).unwrap(),
            RecoveryResolution::ResetToEmpty
        );
        assert_eq!(loaded.timeline(), &Timeline::default());
    }

    #[test]
    fn invalid_auto_save_falls_back_to_empty() {
        let store = Arc::new(MemoryStore::new());
        let mut state = edited_state();
        state.save_checkpoint("p1", "Auto-save", true);
        state
            .execute(TimelineCommand::SetPlayhead { time: 4.0 })
            .unwrap();
        let mut snapshot = state.to_snapshot("p1");
        snapshot.checkpoints[0].full_state.layers[0]
            .clips
            .push(Clip::new(MediaKind::Video, 5.0, 15.0).with_id("bad"));
        store.save("p1", &snapshot.to_json().unwrap()).unwrap();

        let (loaded, outcome) = manager(store).load("p1").unwrap();
        let RecoveryOutcome::Corrupt { message } = outcome else {
            panic!("expected a fallback, got {:?}", outcome);
        };
        assert!(message.contains("overlap"), "{}", message);
        assert_eq!(loaded.timeline(), &Timeline::default());
    }

    #[test]
    fn restore_uses_the_checkpoint_named_in_the_event() {
        let store = Arc::new(MemoryStore::new());
        let mut state = edited_state();
        let manual = state.save_checkpoint("p1", "Rough cut", false);
        state
            .execute(TimelineCommand::SetPlayhead { time: 4.0 })
            .unwrap();
        persist(&store, &state);

        let (mut loaded, outcome) = manager(store).load("p1").unwrap();
        let RecoveryOutcome::PromptRequired(event) = outcome else {
            panic!("expected a prompt, got {:?}", outcome);
        };
        // A newer checkpoint taken after the prompt was raised is not what the caller chose.
        loaded.save_checkpoint("p1", "Auto-save", true);

        assert_eq!(
            resolve(&mut loaded, &event, RecoveryOption::Restore).unwrap(),
            RecoveryResolution::Restored {
                checkpoint_id: manual.id
            }
        );
        assert_eq!(loaded.timeline().playhead_time, 0.0);
    }

    #[test]
    fn corrupt_record_falls_back_to_empty() {
        let store = Arc::new(MemoryStore::new());
        store.save("p1", r#"{"projectId": 12}"#).unwrap();
        let (state, outcome) = manager(store).load("p1").unwrap();
        assert!(matches!(outcome, RecoveryOutcome::Corrupt { .. }));
        assert_eq!(state.timeline(), &Timeline::default());
    }
}
