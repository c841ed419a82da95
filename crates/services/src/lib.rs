#![forbid(unsafe_code)]

pub mod attempt_service;
pub mod error;
pub mod practice_service;
pub mod progress_service;
pub mod snapshot_builder;

pub use assess_core::Clock;

pub use attempt_service::AttemptService;
pub use error::{AttemptServiceError, PracticeServiceError, ProgressServiceError};
pub use practice_service::PracticeTestService;
pub use progress_service::ProgressService;
pub use snapshot_builder::build_snapshot;
