//! Shared error types for the services crate.

use thiserror::Error;

use assess_core::model::{
    AttemptError, AttemptId, EnrollmentError, PracticeTestError, QuizModuleId, SnapshotError,
};
use storage::repository::StorageError;

/// Errors emitted by `AttemptService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptServiceError {
    #[error("quiz module {0} does not exist")]
    ModuleNotFound(QuizModuleId),

    #[error("attempt {0} does not exist")]
    AttemptNotFound(AttemptId),

    #[error("attempt limit of {max_attempts} reached for this module")]
    MaxAttemptsExceeded { max_attempts: u32 },

    /// Another writer updated the attempt between read and write; the
    /// caller should reload and retry.
    #[error("attempt was modified concurrently, reload and retry")]
    StaleState,

    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for AttemptServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict => AttemptServiceError::StaleState,
            other => AttemptServiceError::Storage(other),
        }
    }
}

/// Errors emitted by `PracticeTestService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeServiceError {
    #[error("practice test does not exist")]
    PracticeNotFound,

    #[error(transparent)]
    Practice(#[from] PracticeTestError),
    #[error(transparent)]
    Attempt(#[from] AttemptServiceError),
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for PracticeServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict => {
                PracticeServiceError::Attempt(AttemptServiceError::StaleState)
            }
            other => PracticeServiceError::Storage(other),
        }
    }
}

/// Errors emitted by `ProgressService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("enrollment does not exist")]
    EnrollmentNotFound,

    #[error("course has no outline")]
    OutlineNotFound,

    #[error("quiz module {0} has no graded attempt for this enrollment")]
    ModuleNotGraded(QuizModuleId),

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
