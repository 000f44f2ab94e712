use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declares a string-backed identifier. Ids are UUID strings when generated
/// locally but any string read back from storage is accepted.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

mod model;
pub use model::*;
mod markers;
pub use markers::*;
mod time_map;
pub use time_map::*;
mod edit_operations;
mod commands;
pub use commands::*;
mod history;
pub use history::*;
mod checkpoints;
pub use checkpoints::*;
mod trim_queue;
pub use trim_queue::*;
mod state;
pub use state::*;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("layer not found: {0}")]
    LayerNotFound(LayerId),
    #[error("clip not found: {0}")]
    ClipNotFound(ClipId),
    #[error("marker not found: {0}")]
    MarkerNotFound(MarkerId),
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(CheckpointId),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Coarse error category reported to collaborators alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    Persistence,
    Recovery,
}

impl TimelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TimelineError::Validation(_) => ErrorKind::Validation,
            TimelineError::LayerNotFound(_)
            | TimelineError::ClipNotFound(_)
            | TimelineError::MarkerNotFound(_)
            | TimelineError::CheckpointNotFound(_) => ErrorKind::NotFound,
            TimelineError::StateConflict(_) => ErrorKind::StateConflict,
            TimelineError::Serialization(_) => ErrorKind::Recovery,
        }
    }
}

impl From<serde_json::Error> for TimelineError {
    fn from(err: serde_json::Error) -> Self {
        TimelineError::Serialization(err.to_string())
    }
}

pub(crate) fn invalid(message: impl Into<String>) -> TimelineError {
    TimelineError::Validation(message.into())
}

/// Time in seconds. Used for both timeline-time and source-time.
pub type Seconds = f64;

/// Tolerance for comparing clip boundaries.
pub const TIME_EPSILON: Seconds = 1e-6;

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
