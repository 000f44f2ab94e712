//! Editing sessions: one per open project.
//! Owns the timeline state, persists it on a debounce, runs the auto-save
//! timer and reconciles persisted state on startup.

use thiserror::Error;
use timeline::{ErrorKind, TimelineError};

mod config;
pub use config::*;

mod response;
pub use response::*;

mod scheduler;
pub use scheduler::*;

mod recovery;
pub use recovery::*;

mod session;
pub use session::*;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("recovery error: {0}")]
    Recovery(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Timeline(err) => err.kind(),
            SessionError::Persistence(_) => ErrorKind::Persistence,
            SessionError::Recovery(_) => ErrorKind::Recovery,
            SessionError::Config(_) => ErrorKind::Validation,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
