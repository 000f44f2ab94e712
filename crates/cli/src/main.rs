use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use project::ProjectDb;
use session::{CommandResponse, EditorSession, RecoveryOption, RecoveryOutcome, SessionConfig};
use timeline::{
    ActionFilter, ActionType, Checkpoint, ImportMode, Layer, TimelineCommand, TrimKind,
    TrimOperation,
};

#[derive(Parser)]
#[command(name = "timeline-cli")]
#[command(about = "Timeline Editor CLI - Headless editing, history and checkpoints")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Session config file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project database path (defaults to the app data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project with an empty main video layer
    New {
        /// Project identifier
        project: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Nominal timeline duration in seconds
        #[arg(long, default_value = "60")]
        duration: f64,
    },

    /// List known projects
    Projects,

    /// Print the current timeline
    Show {
        #[arg(short, long)]
        project: String,
    },

    /// Apply edit commands from a JSON file (one command or an array)
    Apply {
        #[arg(short, long)]
        project: String,

        /// Commands file
        file: PathBuf,
    },

    /// Undo the most recent edits
    Undo {
        #[arg(short, long)]
        project: String,

        #[arg(long, default_value = "1")]
        steps: usize,
    },

    /// Redo undone edits
    Redo {
        #[arg(short, long)]
        project: String,

        #[arg(long, default_value = "1")]
        steps: usize,
    },

    /// Map between timeline time and source time
    Map {
        #[arg(short, long)]
        project: String,

        /// Time in seconds
        time: f64,

        /// Treat `time` as source time and map it back to the timeline
        #[arg(long)]
        reverse: bool,

        /// Also print the next clip boundary after the source time
        #[arg(long)]
        boundary: bool,
    },

    /// Query the action log
    History {
        #[arg(short, long)]
        project: String,

        /// Case-insensitive text in the description
        #[arg(long)]
        text: Option<String>,

        /// Action type (e.g. add_clip, split_clip)
        #[arg(long = "type")]
        action_type: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Manage checkpoints
    Checkpoint {
        #[arg(short, long)]
        project: String,

        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Queue and commit batch trims
    Trim {
        #[arg(short, long)]
        project: String,

        #[command(subcommand)]
        action: TrimAction,
    },

    /// List stored state versions
    Versions {
        #[arg(short, long)]
        project: String,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        skip: usize,
    },

    /// Make an older stored version current again
    Revert {
        #[arg(short, long)]
        project: String,

        version: i64,
    },

    /// Inspect and resolve startup recovery
    Recover {
        #[arg(short, long)]
        project: String,

        /// Decision to apply when the project needs one
        #[arg(long, value_enum)]
        choice: Option<RecoveryChoice>,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Save a checkpoint of the current timeline
    Save {
        description: String,

        /// Mark as an auto-save
        #[arg(long)]
        auto: bool,
    },
    /// List checkpoints, newest first
    List {
        /// Filter by description
        #[arg(long)]
        search: Option<String>,
    },
    /// Replace the timeline with a checkpoint (clears undo/redo)
    Restore { id: String },
    Delete { id: String },
    /// Remove every auto-save checkpoint
    ClearAuto,
    /// Write all checkpoints as a JSON bundle
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Read checkpoints from a JSON bundle
    Import {
        input: PathBuf,

        #[arg(long, value_enum, default_value = "merge")]
        mode: ImportModeArg,
    },
}

#[derive(Subcommand)]
enum TrimAction {
    /// Queue a trim, delete or split on a layer
    Add {
        #[arg(long)]
        layer: String,

        #[arg(long, value_enum)]
        kind: TrimKindArg,

        #[arg(long)]
        start: f64,

        /// End of the range (ignored for splits)
        #[arg(long)]
        end: Option<f64>,
    },
    List,
    /// Apply all queued trims as one undoable edit
    Commit,
    Discard,
}

#[derive(Clone, Copy, ValueEnum)]
enum ImportModeArg {
    Merge,
    Replace,
}

#[derive(Clone, Copy, ValueEnum)]
enum TrimKindArg {
    Trim,
    Delete,
    Split,
}

#[derive(Clone, Copy, ValueEnum)]
enum RecoveryChoice {
    Restore,
    Discard,
    Continue,
}

/// A commands file holds either a single command or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandFile {
    Many(Vec<TimelineCommand>),
    One(TimelineCommand),
}

struct App {
    db: Arc<ProjectDb>,
    config: SessionConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; stdout is reserved for command output
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = App::load(cli.config.as_deref(), cli.db)?;

    match cli.command {
        Commands::New {
            project,
            name,
            duration,
        } => new_command(&ctx, project, name, duration).await,
        Commands::Projects => projects_command(&ctx),
        Commands::Show { project } => show_command(&ctx, &project).await,
        Commands::Apply { project, file } => apply_command(&ctx, &project, &file).await,
        Commands::Undo { project, steps } => step_command(&ctx, &project, steps, true).await,
        Commands::Redo { project, steps } => step_command(&ctx, &project, steps, false).await,
        Commands::Map {
            project,
            time,
            reverse,
            boundary,
        } => map_command(&ctx, &project, time, reverse, boundary).await,
        Commands::History {
            project,
            text,
            action_type,
            limit,
        } => history_command(&ctx, &project, text, action_type, limit).await,
        Commands::Checkpoint { project, action } => {
            checkpoint_command(&ctx, &project, action).await
        }
        Commands::Trim { project, action } => trim_command(&ctx, &project, action).await,
        Commands::Versions {
            project,
            limit,
            skip,
        } => versions_command(&ctx, &project, limit, skip),
        Commands::Revert { project, version } => revert_command(&ctx, &project, version),
        Commands::Recover { project, choice } => recover_command(&ctx, &project, choice).await,
    }
}

impl App {
    fn load(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => SessionConfig::load(path)?,
            None => SessionConfig::default(),
        };
        let db_path = db_path.unwrap_or_else(|| config.db_path());
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {:?}", dir))?;
        }
        let db = ProjectDb::open_or_create(&db_path)?.with_max_versions(config.max_versions);
        info!("Database: {:?}", db_path);
        Ok(Self {
            db: Arc::new(db),
            config,
        })
    }

    async fn open_raw(&self, project_id: &str) -> Result<(EditorSession, RecoveryOutcome)> {
        let (session, outcome) =
            EditorSession::open(project_id, self.db.clone(), self.config.clone()).await?;
        Ok((session, outcome))
    }

    /// Opens a session for editing. Edits made since the last checkpoint are
    /// kept; `recover` is the place to restore or discard them.
    async fn open(&self, project_id: &str) -> Result<EditorSession> {
        let (session, outcome) = self.open_raw(project_id).await?;
        match outcome {
            RecoveryOutcome::Fresh => {
                warn!("Project '{}' has no saved state yet", project_id)
            }
            RecoveryOutcome::SilentRestore { checkpoint_id } => {
                info!("Recovered unsaved work from auto-save {}", checkpoint_id)
            }
            RecoveryOutcome::Corrupt { message } => {
                warn!("Stored state was unreadable, starting empty: {}", message)
            }
            RecoveryOutcome::PromptRequired(_) => {
                warn!(
                    "Project '{}' has changes since its last checkpoint; continuing with them",
                    project_id
                );
                into_anyhow(session.resolve_recovery(RecoveryOption::Continue))?;
            }
            RecoveryOutcome::Clean => {}
        }
        Ok(session)
    }
}

fn into_anyhow<T>(response: CommandResponse<T>) -> Result<T> {
    response
        .into_result()
        .map_err(|err| anyhow!("{:?}: {}", err.kind, err.message))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_millis(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

async fn new_command(
    ctx: &App,
    project_id: String,
    name: Option<String>,
    duration: f64,
) -> Result<()> {
    let name = name.unwrap_or_else(|| project_id.clone());
    info!("Creating new project '{}' ({})", name, project_id);

    let (session, outcome) = ctx.open_raw(&project_id).await?;
    if outcome != RecoveryOutcome::Fresh {
        bail!("project '{}' already exists", project_id);
    }
    ctx.db.ensure_project(&project_id, &name)?;

    into_anyhow(session.execute(TimelineCommand::Batch {
        label: "Create project".to_string(),
        commands: vec![
            TimelineCommand::AddLayer {
                layer: Layer::main_video("Main Video"),
                index: None,
            },
            TimelineCommand::SetDuration { duration },
        ],
    }))?;
    let checkpoint = into_anyhow(session.save_checkpoint("Project created", false))?;
    session.close().await?;

    info!("Project created successfully");
    info!("Initial checkpoint: {}", checkpoint.id);
    Ok(())
}

fn projects_command(ctx: &App) -> Result<()> {
    let projects = ctx.db.list_projects()?;
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for p in projects {
        println!("{}  {}  (updated {})", p.id, p.name, format_millis(p.updated_at));
    }
    Ok(())
}

async fn show_command(ctx: &App, project_id: &str) -> Result<()> {
    let session = ctx.open(project_id).await?;
    print_json(&serde_json::json!({
        "timeline": session.timeline(),
        "effectiveDuration": session.effective_duration(),
        "history": session.undo_redo_availability(),
        "pendingTrims": session.pending_trims(),
        "hasUnsavedChanges": session.has_unsaved_changes(),
    }))
}

async fn apply_command(ctx: &App, project_id: &str, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {:?}", file))?;
    let commands = match serde_json::from_str::<CommandFile>(&raw)
        .with_context(|| format!("parsing commands in {:?}", file))?
    {
        CommandFile::Many(commands) => commands,
        CommandFile::One(command) => vec![command],
    };
    info!("Applying {} commands to '{}'", commands.len(), project_id);

    let session = ctx.open(project_id).await?;
    let mut failure = None;
    for command in commands {
        let response = session.execute(command);
        print_json(&response)?;
        if !response.success {
            failure = response.error;
            break;
        }
    }
    session.close().await?;

    match failure {
        Some(err) => bail!("command rejected ({:?}): {}", err.kind, err.message),
        None => Ok(()),
    }
}

async fn step_command(ctx: &App, project_id: &str, steps: usize, undo: bool) -> Result<()> {
    let session = ctx.open(project_id).await?;
    for _ in 0..steps {
        let response = if undo { session.undo() } else { session.redo() };
        let step = into_anyhow(response)?;
        print_json(&step)?;
        if !step.is_applied() {
            info!("Nothing to {}", if undo { "undo" } else { "redo" });
            break;
        }
    }
    print_json(&session.undo_redo_availability())?;
    session.close().await?;
    Ok(())
}

async fn map_command(
    ctx: &App,
    project_id: &str,
    time: f64,
    reverse: bool,
    boundary: bool,
) -> Result<()> {
    let session = ctx.open(project_id).await?;
    let (timeline_time, source_time) = if reverse {
        (session.map_source_to_timeline(time), time)
    } else {
        (time, session.map_timeline_to_source(time))
    };
    let mut out = serde_json::json!({
        "timelineTime": timeline_time,
        "sourceTime": source_time,
    });
    if boundary {
        out["nextBoundary"] = serde_json::json!(session.next_clip_boundary(source_time));
    }
    print_json(&out)
}

async fn history_command(
    ctx: &App,
    project_id: &str,
    text: Option<String>,
    action_type: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let action_type = action_type
        .map(|t| {
            serde_json::from_value::<ActionType>(serde_json::Value::String(t.clone()))
                .map_err(|_| anyhow!("unknown action type: {}", t))
        })
        .transpose()?;
    let filter = ActionFilter {
        action_type,
        text,
        limit,
        ..ActionFilter::default()
    };

    let session = ctx.open(project_id).await?;
    let items = session.action_history(&filter);
    if items.is_empty() {
        println!("No actions.");
    }
    for item in items {
        println!(
            "{}  {:<18} {:<9} {}",
            format_millis(item.timestamp),
            format!("{:?}", item.action_type),
            format!("{:?}", item.status),
            item.description
        );
    }
    Ok(())
}

fn print_checkpoints(checkpoints: &[Checkpoint]) {
    if checkpoints.is_empty() {
        println!("No checkpoints.");
    }
    for c in checkpoints {
        println!(
            "{}  {}  {}{}",
            c.id,
            format_millis(c.timestamp),
            c.description,
            if c.is_auto_save { "  [auto]" } else { "" }
        );
    }
}

async fn checkpoint_command(
    ctx: &App,
    project_id: &str,
    action: CheckpointAction,
) -> Result<()> {
    let session = ctx.open(project_id).await?;
    match action {
        CheckpointAction::Save { description, auto } => {
            let checkpoint = into_anyhow(session.save_checkpoint(&description, auto))?;
            info!("Checkpoint saved: {}", checkpoint.id);
        }
        CheckpointAction::List { search } => match search {
            Some(query) => print_checkpoints(&session.search_checkpoints(&query)),
            None => print_checkpoints(&session.checkpoints()),
        },
        CheckpointAction::Restore { id } => {
            into_anyhow(session.restore_checkpoint(&id.as_str().into()))?;
            info!("Restored checkpoint {}", id);
        }
        CheckpointAction::Delete { id } => {
            let removed = into_anyhow(session.delete_checkpoint(&id.as_str().into()))?;
            info!("Deleted checkpoint '{}'", removed.description);
        }
        CheckpointAction::ClearAuto => {
            let removed = into_anyhow(session.clear_auto_saves())?;
            info!("Removed {} auto-save checkpoints", removed);
        }
        CheckpointAction::Export { output } => {
            let bundle = into_anyhow(session.export_checkpoints())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, bundle)?;
                    info!("Checkpoints written to: {:?}", path);
                }
                None => println!("{}", bundle),
            }
        }
        CheckpointAction::Import { input, mode } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {:?}", input))?;
            let mode = match mode {
                ImportModeArg::Merge => ImportMode::Merge,
                ImportModeArg::Replace => ImportMode::Replace,
            };
            let imported = into_anyhow(session.import_checkpoints(&raw, mode))?;
            info!("Imported {} checkpoints", imported);
        }
    }
    session.close().await?;
    Ok(())
}

async fn trim_command(ctx: &App, project_id: &str, action: TrimAction) -> Result<()> {
    let session = ctx.open(project_id).await?;
    match action {
        TrimAction::Add {
            layer,
            kind,
            start,
            end,
        } => {
            let operation = match (kind, end) {
                (TrimKindArg::Split, _) => TrimOperation::split(layer, start),
                (TrimKindArg::Trim, Some(end)) => {
                    TrimOperation::new(TrimKind::Trim, layer, start, end)
                }
                (TrimKindArg::Delete, Some(end)) => {
                    TrimOperation::new(TrimKind::Delete, layer, start, end)
                }
                (_, None) => bail!("--end is required for trim and delete"),
            };
            let id = into_anyhow(session.queue_trim(operation))?;
            info!("Queued trim {}", id);
        }
        TrimAction::List => print_json(&session.pending_trims())?,
        TrimAction::Commit => {
            let item = into_anyhow(session.commit_trims())?;
            info!("Committed: {}", item.description);
        }
        TrimAction::Discard => {
            let dropped = into_anyhow(session.discard_trims())?;
            info!("Discarded {} queued trims", dropped);
        }
    }
    session.close().await?;
    Ok(())
}

fn versions_command(ctx: &App, project_id: &str, limit: usize, skip: usize) -> Result<()> {
    let versions = ctx.db.history(project_id, limit, skip)?;
    if versions.is_empty() {
        println!("No stored versions.");
    }
    for v in versions {
        println!(
            "v{:<5} {}  {:>8} bytes{}{}",
            v.version,
            format_millis(v.created_at),
            v.size_bytes,
            if v.is_current { "  (current)" } else { "" },
            v.description
                .map(|d| format!("  {}", d))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn revert_command(ctx: &App, project_id: &str, version: i64) -> Result<()> {
    let restored = ctx.db.restore_version(project_id, version)?;
    info!(
        "Version {} of '{}' is current again",
        restored.version, restored.project_id
    );
    Ok(())
}

async fn recover_command(
    ctx: &App,
    project_id: &str,
    choice: Option<RecoveryChoice>,
) -> Result<()> {
    let (session, outcome) = ctx.open_raw(project_id).await?;
    print_json(&outcome)?;

    if session.pending_recovery().is_some() {
        let Some(choice) = choice else {
            info!("A decision is required; pass --choice <restore|discard|continue>");
            return Ok(());
        };
        let option = match choice {
            RecoveryChoice::Restore => RecoveryOption::Restore,
            RecoveryChoice::Discard => RecoveryOption::Discard,
            RecoveryChoice::Continue => RecoveryOption::Continue,
        };
        let resolution = into_anyhow(session.resolve_recovery(option))?;
        print_json(&resolution)?;
    } else if choice.is_some() {
        warn!("No recovery decision pending for '{}'", project_id);
    }
    session.close().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_applies_version_retention_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("session.json");
        std::fs::write(&config_path, r#"{"max_versions": 2}"#).unwrap();

        let app = App::load(Some(config_path.as_path()), Some(dir.path().join("projects.db"))).unwrap();
        assert_eq!(app.config.max_versions, Some(2));
        for n in 1..=4 {
            app.db
                .save_version("p1", &format!(r#"{{"n":{}}}"#, n), None)
                .unwrap();
        }
        let versions: Vec<_> = app
            .db
            .history("p1", 10, 0)
            .unwrap()
            .iter()
            .map(|v| v.version)
            .collect();
        assert_eq!(versions, vec![4, 3]);
    }
}
