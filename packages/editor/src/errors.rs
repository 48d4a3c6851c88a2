//! Error types for the editor

use crate::model::EntityRef;
use crate::remote::RemoteError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Cycle detected: cannot move {dragged} under its own descendant {target}")]
    CycleDetected { dragged: EntityRef, target: EntityRef },

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Not found: {0}")]
    NotFound(EntityRef),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Clipboard is empty")]
    ClipboardEmpty,

    #[error("A commit is already in progress")]
    CommitInProgress,

    #[error("A reload is already in progress")]
    LoadInProgress,

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

pub type EditorResult<T> = Result<T, EditorError>;
