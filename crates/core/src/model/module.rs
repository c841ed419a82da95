use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CourseId, QuestionId, QuizModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ModuleError {
    #[error("module title cannot be empty")]
    EmptyTitle,

    #[error("pass threshold must be in [0, 1]")]
    InvalidPassThreshold,

    #[error("time limit must be > 0 minutes when set")]
    InvalidTimeLimit,

    #[error("max attempts must be > 0 when limited")]
    InvalidMaxAttempts,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Quiz module settings in effect when an attempt starts.
///
/// A copy of these is frozen inside each `QuizSnapshot`, so changing them
/// on the live module never alters attempts already underway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSettings {
    shuffle_questions: bool,
    shuffle_options: bool,
    time_limit_minutes: Option<u32>,
    pass_threshold: f64,
    max_attempts: Option<u32>,
}

impl ModuleSettings {
    /// Creates validated module settings.
    ///
    /// `max_attempts` of `None` means unlimited.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError` for a threshold outside `[0, 1]`, a zero time
    /// limit, or a zero attempt cap.
    pub fn new(
        shuffle_questions: bool,
        shuffle_options: bool,
        time_limit_minutes: Option<u32>,
        pass_threshold: f64,
        max_attempts: Option<u32>,
    ) -> Result<Self, ModuleError> {
        if !pass_threshold.is_finite() || !(0.0..=1.0).contains(&pass_threshold) {
            return Err(ModuleError::InvalidPassThreshold);
        }
        if time_limit_minutes == Some(0) {
            return Err(ModuleError::InvalidTimeLimit);
        }
        if max_attempts == Some(0) {
            return Err(ModuleError::InvalidMaxAttempts);
        }

        Ok(Self {
            shuffle_questions,
            shuffle_options,
            time_limit_minutes,
            pass_threshold,
            max_attempts,
        })
    }

    /// Fixed order, 70% pass threshold, unlimited attempts, no time limit.
    #[must_use]
    pub fn default_quiz() -> Self {
        Self {
            shuffle_questions: false,
            shuffle_options: false,
            time_limit_minutes: None,
            pass_threshold: 0.7,
            max_attempts: None,
        }
    }

    // Accessors
    #[must_use]
    pub fn shuffle_questions(&self) -> bool {
        self.shuffle_questions
    }

    #[must_use]
    pub fn shuffle_options(&self) -> bool {
        self.shuffle_options
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> Option<u32> {
        self.time_limit_minutes
    }

    #[must_use]
    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    /// `None` means unlimited attempts.
    #[must_use]
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}

//
// ─── QUIZ MODULE ───────────────────────────────────────────────────────────────
//

/// A quiz module: an ordered set of question references plus settings.
///
/// Owned by content authoring; the assessment core only reads it when
/// building snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizModule {
    id: QuizModuleId,
    course_id: CourseId,
    title: String,
    settings: ModuleSettings,
    question_ids: Vec<QuestionId>,
}

impl QuizModule {
    /// Creates a new quiz module.
    ///
    /// # Errors
    ///
    /// Returns `ModuleError::EmptyTitle` if the title is blank.
    pub fn new(
        id: QuizModuleId,
        course_id: CourseId,
        title: impl Into<String>,
        settings: ModuleSettings,
        question_ids: Vec<QuestionId>,
    ) -> Result<Self, ModuleError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ModuleError::EmptyTitle);
        }

        Ok(Self {
            id,
            course_id,
            title: title.trim().to_owned(),
            settings,
            question_ids,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizModuleId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn settings(&self) -> &ModuleSettings {
        &self.settings
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_rejects_bad_threshold() {
        let err = ModuleSettings::new(false, false, None, 1.5, None).unwrap_err();
        assert_eq!(err, ModuleError::InvalidPassThreshold);
        let err = ModuleSettings::new(false, false, None, -0.1, None).unwrap_err();
        assert_eq!(err, ModuleError::InvalidPassThreshold);
    }

    #[test]
    fn settings_rejects_zero_limits() {
        let err = ModuleSettings::new(false, false, Some(0), 0.7, None).unwrap_err();
        assert_eq!(err, ModuleError::InvalidTimeLimit);
        let err = ModuleSettings::new(false, false, None, 0.7, Some(0)).unwrap_err();
        assert_eq!(err, ModuleError::InvalidMaxAttempts);
    }

    #[test]
    fn module_rejects_blank_title() {
        let err = QuizModule::new(
            QuizModuleId::new(1),
            CourseId::new(1),
            "  ",
            ModuleSettings::default_quiz(),
            vec![],
        )
        .unwrap_err();
        assert_eq!(err, ModuleError::EmptyTitle);
    }

    #[test]
    fn module_trims_title_and_keeps_question_order() {
        let module = QuizModule::new(
            QuizModuleId::new(1),
            CourseId::new(2),
            " Unit 1 Quiz ",
            ModuleSettings::default_quiz(),
            vec![QuestionId::new(3), QuestionId::new(1)],
        )
        .unwrap();
        assert_eq!(module.title(), "Unit 1 Quiz");
        assert_eq!(
            module.question_ids(),
            &[QuestionId::new(3), QuestionId::new(1)]
        );
    }
}
