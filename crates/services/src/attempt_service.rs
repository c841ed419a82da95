use std::sync::Arc;

use assess_core::model::{
    AnswerValue, AttemptId, EnrollmentId, QuestionId, QuizAttempt, QuizModuleId, SubmitOutcome,
};
use storage::repository::{AttemptRepository, QuestionBankRepository, VersionedAttempt};

use crate::Clock;
use crate::error::AttemptServiceError;
use crate::snapshot_builder::build_snapshot;

/// Orchestrates the quiz attempt lifecycle: start, answer, submit, review.
///
/// Every write goes through the attempt's optimistic version, so a lost
/// race between two writers surfaces as `AttemptServiceError::StaleState`
/// instead of silently overwriting.
#[derive(Clone)]
pub struct AttemptService {
    clock: Clock,
    questions: Arc<dyn QuestionBankRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl AttemptService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionBankRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            questions,
            attempts,
        }
    }

    /// Starts a fresh attempt over the module's current question set.
    ///
    /// The snapshot is built and frozen here; later edits to the module or
    /// its questions cannot reach this attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::ModuleNotFound` for a missing module,
    /// `AttemptServiceError::MaxAttemptsExceeded` once the module's
    /// attempt cap is reached, or `AttemptServiceError::Snapshot` for a
    /// module with no questions.
    pub async fn start_attempt(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<QuizAttempt, AttemptServiceError> {
        let attempt = self.build_attempt(enrollment_id, quiz_module_id).await?;
        self.attempts.insert_attempt(&attempt).await?;
        Ok(attempt)
    }

    pub(crate) fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Builds a started attempt without persisting it, for callers that
    /// persist it inside a larger transaction.
    pub(crate) async fn build_attempt(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<QuizAttempt, AttemptServiceError> {
        let module = self
            .questions
            .get_module(quiz_module_id)
            .await?
            .ok_or(AttemptServiceError::ModuleNotFound(quiz_module_id))?;

        let prior = self
            .attempts
            .attempt_count(enrollment_id, quiz_module_id)
            .await?;
        if let Some(max_attempts) = module.settings().max_attempts() {
            if prior >= max_attempts {
                return Err(AttemptServiceError::MaxAttemptsExceeded { max_attempts });
            }
        }

        let questions = self.questions.get_questions(module.question_ids()).await?;
        let now = self.clock.now();
        let snapshot = build_snapshot(&module, &questions, now)?;

        let id = self.attempts.allocate_attempt_id().await?;
        Ok(QuizAttempt::start(
            id,
            enrollment_id,
            snapshot,
            prior + 1,
            now,
        ))
    }

    /// Fetches an attempt by id.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::AttemptNotFound` if it does not exist.
    pub async fn get_attempt(
        &self,
        attempt_id: AttemptId,
    ) -> Result<QuizAttempt, AttemptServiceError> {
        let loaded = self.load(attempt_id).await?;
        Ok(loaded.attempt)
    }

    /// Records a single answer without grading it.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Attempt` if the attempt is no longer
    /// in progress or the question is not part of it, and
    /// `AttemptServiceError::StaleState` on a lost concurrent write.
    pub async fn record_answer(
        &self,
        attempt_id: AttemptId,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<QuizAttempt, AttemptServiceError> {
        let mut loaded = self.load(attempt_id).await?;
        loaded.attempt.record_answer(question_id, value)?;
        self.attempts
            .update_attempt(&loaded.attempt, loaded.version)
            .await?;
        Ok(loaded.attempt)
    }

    /// Submits an attempt, grading every question in one pass.
    ///
    /// `answers` is merged over answers already recorded; an empty slice
    /// submits whatever was recorded, which is the time-limit auto-submit
    /// path.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Attempt` for a repeat submit or an
    /// unknown question id, and `AttemptServiceError::StaleState` on a
    /// lost concurrent write.
    pub async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        answers: &[(QuestionId, AnswerValue)],
    ) -> Result<(QuizAttempt, SubmitOutcome), AttemptServiceError> {
        let mut loaded = self.load(attempt_id).await?;
        let outcome = loaded.attempt.submit(answers, self.clock.now())?;

        for question_id in &outcome.malformed_questions {
            tracing::warn!(
                "attempt {} question {} had an unusable snapshot, failed closed",
                attempt_id,
                question_id
            );
        }

        self.attempts
            .update_attempt(&loaded.attempt, loaded.version)
            .await?;
        Ok((loaded.attempt, outcome))
    }

    /// Applies a teacher's manual grade to one pending item.
    ///
    /// # Errors
    ///
    /// Returns `AttemptServiceError::Attempt` if the attempt is not
    /// awaiting review, the index is bad, or the score exceeds the item's
    /// points, and `AttemptServiceError::StaleState` on a lost write.
    pub async fn review_item(
        &self,
        attempt_id: AttemptId,
        item_index: usize,
        manual_score: u32,
        teacher_notes: Option<String>,
    ) -> Result<QuizAttempt, AttemptServiceError> {
        let mut loaded = self.load(attempt_id).await?;
        loaded
            .attempt
            .review_item(item_index, manual_score, teacher_notes, self.clock.now())?;
        self.attempts
            .update_attempt(&loaded.attempt, loaded.version)
            .await?;
        Ok(loaded.attempt)
    }

    async fn load(&self, attempt_id: AttemptId) -> Result<VersionedAttempt, AttemptServiceError> {
        self.attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(AttemptServiceError::AttemptNotFound(attempt_id))
    }
}
