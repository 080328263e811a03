use thiserror::Error;

use crate::id::{SectionId, TaskId};
use crate::types::{TaskKind, TaskState};

/// Coarse classification for collaborators mapping errors to responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Storage,
}

#[derive(Error, Debug)]
pub enum CasError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Parent project not found: {0}")]
    ParentNotFound(TaskId),

    #[error("Blocker task not found: {0}")]
    BlockerNotFound(TaskId),

    /// A completed task can no longer block anything
    #[error("Blocker task is already DONE: {0}")]
    BlockerDone(TaskId),

    #[error("Section not found: {0}")]
    SectionNotFound(SectionId),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: TaskState, to: TaskState },

    #[error("Adding blocker would create a circular dependency: {blocker_id} -> {task_id}")]
    CyclicDependency { task_id: TaskId, blocker_id: TaskId },

    /// Id prefix names a different kind than the operation expects
    #[error("Task {id} is not a {expected:?}")]
    KindMismatch { id: TaskId, expected: TaskKind },

    #[error("Title cannot be empty")]
    EmptyTitle,

    #[error("Section name cannot be empty")]
    EmptySectionName,

    #[error("Cannot delete the One-Off Tasks project")]
    ProtectedProject,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CasError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CasError::TaskNotFound(_)
            | CasError::ParentNotFound(_)
            | CasError::BlockerNotFound(_)
            | CasError::SectionNotFound(_) => ErrorKind::NotFound,
            CasError::InvalidTransition { .. }
            | CasError::CyclicDependency { .. }
            | CasError::KindMismatch { .. }
            | CasError::BlockerDone(_)
            | CasError::EmptyTitle
            | CasError::EmptySectionName
            | CasError::ProtectedProject => ErrorKind::InvalidInput,
            CasError::Database(_) | CasError::Io(_) | CasError::Json(_) => ErrorKind::Storage,
        }
    }

    /// HTTP status an API layer would answer with
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Storage => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, CasError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let id = TaskId::new(TaskKind::Project);
        assert_eq!(CasError::TaskNotFound(id.clone()).http_status(), 404);
        assert_eq!(
            CasError::InvalidTransition {
                from: TaskState::Done,
                to: TaskState::Waiting
            }
            .http_status(),
            400
        );
        assert_eq!(
            CasError::CyclicDependency {
                task_id: id.clone(),
                blocker_id: id.clone()
            }
            .http_status(),
            400
        );
        assert_eq!(
            CasError::BlockerDone(id.clone()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            CasError::Database(rusqlite::Error::InvalidQuery).http_status(),
            500
        );
    }

    #[test]
    fn transition_message_names_states() {
        let err = CasError::InvalidTransition {
            from: TaskState::Blocked,
            to: TaskState::Active,
        };
        assert_eq!(err.to_string(), "Invalid transition: BLOCKED -> ACTIVE");
    }
}
