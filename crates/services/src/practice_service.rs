use std::sync::Arc;

use assess_core::model::{
    AnswerValue, AttemptId, CourseId, EnrollmentId, PracticeTestAttempt, PracticeTestId,
    QuestionId, QuizAttempt, QuizModuleId, ScaleScore,
};
use storage::repository::{AttemptRepository, PracticeTestRepository, VersionedAttempt};

use crate::attempt_service::AttemptService;
use crate::error::PracticeServiceError;

/// Orchestrates composite practice tests: several quiz modules taken in
/// sequence with scaled section scores.
///
/// Member attempts reuse the regular attempt machinery; what this service
/// adds is the enveloping practice record, the resume pointer, and the
/// guarantee that composite and member state are persisted together.
#[derive(Clone)]
pub struct PracticeTestService {
    attempt_service: AttemptService,
    attempts: Arc<dyn AttemptRepository>,
    practices: Arc<dyn PracticeTestRepository>,
    scale: Arc<dyn ScaleScore>,
}

impl PracticeTestService {
    #[must_use]
    pub fn new(
        attempt_service: AttemptService,
        attempts: Arc<dyn AttemptRepository>,
        practices: Arc<dyn PracticeTestRepository>,
        scale: Arc<dyn ScaleScore>,
    ) -> Self {
        Self {
            attempt_service,
            attempts,
            practices,
            scale,
        }
    }

    /// The practice test for an enrollment within a course, if one has
    /// been started. Its resume pointer tells the caller which section
    /// the learner was last in.
    ///
    /// # Errors
    ///
    /// Returns `PracticeServiceError::Storage` on storage failures.
    pub async fn resume(
        &self,
        enrollment_id: EnrollmentId,
        course_id: CourseId,
    ) -> Result<Option<PracticeTestAttempt>, PracticeServiceError> {
        let practice = self.practices.find_practice(enrollment_id, course_id).await?;
        Ok(practice)
    }

    /// Starts (or continues into) a section: creates the practice record
    /// on first use, starts a member attempt for the module, and persists
    /// both in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `PracticeServiceError::Practice` if the module already has
    /// a section or the practice test is fully graded, and
    /// `PracticeServiceError::Attempt` for member attempt failures such as
    /// a missing module or an exceeded attempt cap.
    pub async fn start_section(
        &self,
        enrollment_id: EnrollmentId,
        course_id: CourseId,
        quiz_module_id: QuizModuleId,
    ) -> Result<(PracticeTestAttempt, QuizAttempt), PracticeServiceError> {
        let mut practice = match self
            .practices
            .find_practice(enrollment_id, course_id)
            .await?
        {
            Some(practice) => practice,
            None => {
                let id = self.practices.allocate_practice_id().await?;
                PracticeTestAttempt::new(id, course_id, enrollment_id)
            }
        };

        let attempt = self
            .attempt_service
            .build_attempt(enrollment_id, quiz_module_id)
            .await?;
        practice.begin_section(quiz_module_id, attempt.id())?;

        self.practices
            .save_practice_with_attempt(&practice, &attempt, None)
            .await?;
        Ok((practice, attempt))
    }

    /// Submits one section's member attempt and folds the result into the
    /// composite, atomically.
    ///
    /// # Errors
    ///
    /// Returns `PracticeServiceError::PracticeNotFound` for a missing
    /// practice test, `PracticeServiceError::Practice` if the attempt is
    /// not one of its sections, and member attempt errors via
    /// `PracticeServiceError::Attempt`.
    pub async fn submit_section(
        &self,
        practice_id: PracticeTestId,
        attempt_id: AttemptId,
        answers: &[(QuestionId, AnswerValue)],
    ) -> Result<(PracticeTestAttempt, QuizAttempt), PracticeServiceError> {
        let (mut practice, mut loaded) = self.load_pair(practice_id, attempt_id).await?;

        let outcome = loaded
            .attempt
            .submit(answers, self.attempt_service.now())
            .map_err(crate::error::AttemptServiceError::from)?;
        for question_id in &outcome.malformed_questions {
            tracing::warn!(
                "attempt {} question {} had an unusable snapshot, failed closed",
                attempt_id,
                question_id
            );
        }

        practice.record_member(&loaded.attempt, self.scale.as_ref())?;
        self.practices
            .save_practice_with_attempt(&practice, &loaded.attempt, Some(loaded.version))
            .await?;
        Ok((practice, loaded.attempt))
    }

    /// Applies a manual grade to one item of a section's member attempt
    /// and re-derives the composite, atomically.
    ///
    /// # Errors
    ///
    /// Returns the same errors as `submit_section`, plus
    /// `AttemptError` variants for review misuse via
    /// `PracticeServiceError::Attempt`.
    pub async fn review_section_item(
        &self,
        practice_id: PracticeTestId,
        attempt_id: AttemptId,
        item_index: usize,
        manual_score: u32,
        teacher_notes: Option<String>,
    ) -> Result<(PracticeTestAttempt, QuizAttempt), PracticeServiceError> {
        let (mut practice, mut loaded) = self.load_pair(practice_id, attempt_id).await?;

        loaded
            .attempt
            .review_item(
                item_index,
                manual_score,
                teacher_notes,
                self.attempt_service.now(),
            )
            .map_err(crate::error::AttemptServiceError::from)?;

        practice.record_member(&loaded.attempt, self.scale.as_ref())?;
        self.practices
            .save_practice_with_attempt(&practice, &loaded.attempt, Some(loaded.version))
            .await?;
        Ok((practice, loaded.attempt))
    }

    async fn load_pair(
        &self,
        practice_id: PracticeTestId,
        attempt_id: AttemptId,
    ) -> Result<(PracticeTestAttempt, VersionedAttempt), PracticeServiceError> {
        let practice = self
            .practices
            .get_practice(practice_id)
            .await?
            .ok_or(PracticeServiceError::PracticeNotFound)?;
        let loaded = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(crate::error::AttemptServiceError::AttemptNotFound(
                attempt_id,
            ))?;
        Ok((practice, loaded))
    }
}
