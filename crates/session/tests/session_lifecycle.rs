use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use parking_lot::Mutex;

use project::{MemoryStore, SnapshotStore};
use session::{
    EditorSession, RecoveryOption, RecoveryOutcome, RecoveryResolution, SessionConfig,
};
use timeline::{
    CheckpointId, Clip, ErrorKind, HistoryStep, Layer, MediaKind, Timeline, TimelineCommand,
    TimelineState,
};

struct FailingStore;

impl SnapshotStore for FailingStore {
    fn save(&self, _project_id: &str, _json: &str) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    fn load(&self, _project_id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn delete(&self, _project_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Records writes in the order they land. The first write blocks until released.
struct GatedStore {
    saves: Mutex<Vec<String>>,
    started: AtomicBool,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl GatedStore {
    fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let store = Self {
            saves: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            release: Mutex::new(Some(rx)),
        };
        (store, tx)
    }
}

impl SnapshotStore for GatedStore {
    fn save(&self, _project_id: &str, json: &str) -> anyhow::Result<()> {
        let release = self.release.lock().take();
        if let Some(release) = release {
            self.started.store(true, Ordering::SeqCst);
            let _ = release.recv();
        }
        self.saves.lock().push(json.to_string());
        Ok(())
    }

    fn load(&self, _project_id: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn delete(&self, _project_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn add_main_layer() -> TimelineCommand {
    TimelineCommand::AddLayer {
        layer: Layer::main_video("Main").with_id("main"),
        index: None,
    }
}

fn add_clip(id: &str, start: f64, end: f64) -> TimelineCommand {
    TimelineCommand::AddClip {
        layer_id: "main".into(),
        clip: Clip::new(MediaKind::Video, start, end).with_id(id),
    }
}

async fn open(store: Arc<dyn SnapshotStore>, config: SessionConfig) -> (EditorSession, RecoveryOutcome) {
    EditorSession::open("p1", store, config).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn fresh_project_has_no_timer_running() {
    let store = Arc::new(MemoryStore::new());
    let (session, outcome) = open(store.clone(), SessionConfig::default()).await;
    assert_eq!(outcome, RecoveryOutcome::Fresh);
    assert!(!session.is_auto_save_active());
    assert!(!session.has_unsaved_changes());
    assert_eq!(session.timeline(), Timeline::default());
}

#[tokio::test(start_paused = true)]
async fn edits_are_persisted_after_the_debounce_window() {
    let store = Arc::new(MemoryStore::new());
    let (session, _) = open(store.clone(), SessionConfig::default()).await;

    assert!(session.execute(add_main_layer()).success);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(session.execute(add_clip("c1", 0.0, 10.0)).success);

    // Second edit restarts the window.
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert!(store.load("p1").unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let raw = store.load("p1").unwrap().expect("snapshot written");
    assert!(raw.contains("\"c1\""));
}

#[tokio::test(start_paused = true)]
async fn auto_save_checkpoints_once_then_stops() {
    let store = Arc::new(MemoryStore::new());
    let (session, _) = open(store.clone(), SessionConfig::default()).await;

    session.execute(add_main_layer());
    assert!(session.is_auto_save_active());

    tokio::time::sleep(Duration::from_secs(31)).await;
    let checkpoints = session.checkpoints();
    assert_eq!(checkpoints.len(), 1);
    assert!(checkpoints[0].is_auto_save);
    assert_eq!(checkpoints[0].description, "Auto-save");
    assert!(!session.has_unsaved_changes());
    assert!(!session.is_auto_save_active());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(session.checkpoints().len(), 1);
    assert!(store.load("p1").unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn manual_checkpoint_stops_the_auto_save_timer() {
    let store = Arc::new(MemoryStore::new());
    let (session, _) = open(store, SessionConfig::default()).await;

    session.execute(add_main_layer());
    assert!(session.is_auto_save_active());
    let checkpoint = session.quick_save().into_result().unwrap();
    assert!(!checkpoint.is_auto_save);
    assert!(!session.is_auto_save_active());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.checkpoints().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn history_cap_bounds_undo_depth() {
    let config = SessionConfig {
        max_history_size: 3,
        ..SessionConfig::default()
    };
    let (session, _) = open(Arc::new(MemoryStore::new()), config).await;

    session.execute(add_main_layer());
    for i in 0..4 {
        let start = i as f64 * 5.0;
        assert!(session.execute(add_clip(&format!("c{}", i), start, start + 5.0)).success);
    }
    assert_eq!(session.action_history(&Default::default()).len(), 3);

    let mut applied = 0;
    for _ in 0..4 {
        let response = session.undo();
        assert!(response.success);
        if matches!(response.data, Some(HistoryStep::Applied { .. })) {
            applied += 1;
        }
    }
    assert_eq!(applied, 3);
    assert_eq!(session.undo().data, Some(HistoryStep::Empty));
    assert_eq!(session.timeline().layers[0].clips.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_command_reports_kind_and_keeps_state() {
    let (session, _) = open(Arc::new(MemoryStore::new()), SessionConfig::default()).await;
    session.execute(add_main_layer());
    session.execute(add_clip("c1", 0.0, 10.0));
    let before = session.timeline();

    let response = session.execute(add_clip("c2", 5.0, 15.0));
    assert!(!response.success);
    assert_eq!(response.error_kind(), Some(ErrorKind::Validation));

    let response = session.execute(TimelineCommand::RemoveClip {
        clip_id: "missing".into(),
    });
    assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));
    assert_eq!(session.timeline(), before);
}

#[tokio::test(start_paused = true)]
async fn restoring_a_checkpoint_drops_history() {
    let (session, _) = open(Arc::new(MemoryStore::new()), SessionConfig::default()).await;
    session.execute(add_main_layer());
    session.execute(add_clip("c1", 0.0, 10.0));
    let saved = session
        .save_checkpoint("Rough cut", false)
        .into_result()
        .unwrap();
    session.execute(add_clip("c2", 10.0, 20.0));

    assert!(session.restore_checkpoint(&saved.id).success);
    assert_eq!(session.timeline(), saved.full_state);
    let availability = session.undo_redo_availability();
    assert!(!availability.can_undo);
    assert!(!availability.can_redo);
    assert_eq!(session.effective_duration(), 10.0);
}

#[tokio::test(start_paused = true)]
async fn storage_failures_are_reported() {
    let (session, _) = open(Arc::new(FailingStore), SessionConfig::default()).await;
    assert!(session.execute(add_main_layer()).success);

    let err = session.flush().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert!(err.to_string().contains("disk full"));
    assert!(session.has_unsaved_changes());
}

#[tokio::test(start_paused = true)]
async fn flushed_session_reopens_clean() {
    let store = Arc::new(MemoryStore::new());
    let (session, _) = open(store.clone(), SessionConfig::default()).await;
    session.execute(add_main_layer());
    session.execute(add_clip("c1", 0.0, 10.0));
    session.quick_save();
    let expected = session.timeline();
    session.close().await.unwrap();

    let (reopened, outcome) = open(store, SessionConfig::default()).await;
    assert_eq!(outcome, RecoveryOutcome::Clean);
    assert_eq!(reopened.timeline(), expected);
    assert_eq!(reopened.checkpoints().len(), 1);
    assert!(reopened.pending_recovery().is_none());
}

/// One clip behind a manual checkpoint, a second one unsaved.
fn record_with_unsaved_edits(store: &MemoryStore) -> CheckpointId {
    let mut state = TimelineState::new(Timeline::default());
    state.execute(add_main_layer()).unwrap();
    state.execute(add_clip("c1", 0.0, 10.0)).unwrap();
    let manual = state.save_checkpoint("p1", "Rough cut", false);
    state.execute(add_clip("c2", 10.0, 20.0)).unwrap();
    store
        .save("p1", &state.to_snapshot("p1").to_json().unwrap())
        .unwrap();
    manual.id
}

#[tokio::test(start_paused = true)]
async fn unsaved_edits_after_manual_checkpoint_prompt_for_recovery() {
    let store = Arc::new(MemoryStore::new());
    let manual_id = record_with_unsaved_edits(&store);

    let (session, outcome) = open(store, SessionConfig::default()).await;
    let RecoveryOutcome::PromptRequired(event) = outcome else {
        panic!("expected a recovery prompt, got {:?}", outcome);
    };
    assert_eq!(event.last_saved_checkpoint_id, Some(manual_id.clone()));
    assert_eq!(session.pending_recovery(), Some(event));
    assert_eq!(session.timeline().clip_count(), 2);

    let resolution = session
        .resolve_recovery(RecoveryOption::Discard)
        .into_result()
        .unwrap();
    assert_eq!(
        resolution,
        RecoveryResolution::Restored {
            checkpoint_id: manual_id
        }
    );
    assert_eq!(session.timeline().clip_count(), 1);
    assert!(session.pending_recovery().is_none());
    assert!(!session.has_unsaved_changes());
    assert!(!session.is_auto_save_active());

    let again = session.resolve_recovery(RecoveryOption::Continue);
    assert_eq!(again.error_kind(), Some(ErrorKind::StateConflict));
}

#[tokio::test(start_paused = true)]
async fn pending_prompt_holds_auto_save_until_restore() {
    let store = Arc::new(MemoryStore::new());
    let manual_id = record_with_unsaved_edits(&store);

    let (session, outcome) = open(store, SessionConfig::default()).await;
    assert!(matches!(outcome, RecoveryOutcome::PromptRequired(_)));
    assert!(session.has_unsaved_changes());
    assert!(!session.is_auto_save_active());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(session.checkpoints().len(), 1);

    let resolution = session
        .resolve_recovery(RecoveryOption::Restore)
        .into_result()
        .unwrap();
    assert_eq!(
        resolution,
        RecoveryResolution::Restored {
            checkpoint_id: manual_id
        }
    );
    assert_eq!(session.timeline().clip_count(), 1);
    assert!(!session.is_auto_save_active());
}

#[tokio::test(start_paused = true)]
async fn continue_keeps_edits_and_starts_auto_save() {
    let store = Arc::new(MemoryStore::new());
    record_with_unsaved_edits(&store);

    let (session, _) = open(store.clone(), SessionConfig::default()).await;
    let resolution = session
        .resolve_recovery(RecoveryOption::Continue)
        .into_result()
        .unwrap();
    assert_eq!(resolution, RecoveryResolution::Continued);
    assert_eq!(session.timeline().clip_count(), 2);
    assert!(session.is_auto_save_active());

    tokio::time::sleep(Duration::from_secs(31)).await;
    let checkpoints = session.checkpoints();
    assert_eq!(checkpoints.len(), 2);
    assert!(checkpoints[0].is_auto_save);
    assert_eq!(checkpoints[0].full_state.clip_count(), 2);
    assert!(!session.has_unsaved_changes());
    assert!(store.load("p1").unwrap().unwrap().contains("\"c2\""));
}

#[tokio::test(start_paused = true)]
async fn invalid_auto_save_opens_empty() {
    let store = Arc::new(MemoryStore::new());
    let mut state = TimelineState::new(Timeline::default());
    state.execute(add_main_layer()).unwrap();
    state.execute(add_clip("c1", 0.0, 10.0)).unwrap();
    state.save_checkpoint("p1", "Auto-save", true);
    state.execute(add_clip("c2", 10.0, 20.0)).unwrap();
    let mut snapshot = state.to_snapshot("p1");
    snapshot.checkpoints[0].full_state.layers[0]
        .clips
        .push(Clip::new(MediaKind::Video, 5.0, 15.0).with_id("bad"));
    store.save("p1", &snapshot.to_json().unwrap()).unwrap();

    let (session, outcome) = open(store, SessionConfig::default()).await;
    assert!(
        matches!(outcome, RecoveryOutcome::Corrupt { .. }),
        "{:?}",
        outcome
    );
    assert_eq!(session.timeline(), Timeline::default());
    assert!(session.pending_recovery().is_none());
    assert!(!session.is_auto_save_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aborted_write_still_lands_before_the_next_one() {
    let (store, release) = GatedStore::new();
    let store = Arc::new(store);
    let config = SessionConfig {
        persist_debounce_ms: 10,
        ..SessionConfig::default()
    };
    let (session, _) = open(store.clone(), config).await;
    let session = Arc::new(session);

    session.execute(add_main_layer());
    session.execute(add_clip("c1", 0.0, 10.0));
    while !store.started.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Supersedes the debounced write that is blocked in the store.
    session.execute(add_clip("c2", 10.0, 20.0));
    let flushing = {
        let session = session.clone();
        tokio::spawn(async move { session.flush().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.saves.lock().is_empty());

    release.send(()).unwrap();
    flushing.await.unwrap().unwrap();

    let saves = store.saves.lock().clone();
    assert!(saves.len() >= 2);
    assert!(!saves[0].contains("\"c2\""));
    assert!(saves[saves.len() - 1].contains("\"c2\""));
}
