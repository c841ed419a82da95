use std::sync::Arc;

use assess_core::model::{ContentId, Enrollment, EnrollmentId, QuizModuleId};
use storage::repository::{AttemptRepository, EnrollmentRepository};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Keeps enrollment progress in step with completed course units.
///
/// Progress is always re-derived in full from the completed-unit sets and
/// the course outline, so repeated or out-of-order completion events can
/// never make the percentage drift.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    enrollments: Arc<dyn EnrollmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        enrollments: Arc<dyn EnrollmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            enrollments,
            attempts,
        }
    }

    /// Marks one lesson content item viewed and recomputes progress.
    /// Idempotent: repeated views change nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::EnrollmentNotFound` or
    /// `ProgressServiceError::OutlineNotFound` for missing aggregates, and
    /// `ProgressServiceError::Enrollment` for content outside the course.
    pub async fn mark_content_viewed(
        &self,
        enrollment_id: EnrollmentId,
        content_id: ContentId,
    ) -> Result<Enrollment, ProgressServiceError> {
        let (mut enrollment, outline) = self.load(enrollment_id).await?;
        enrollment.mark_content_viewed(&outline, content_id, self.clock.now())?;
        self.enrollments.upsert_enrollment(&enrollment).await?;
        Ok(enrollment)
    }

    /// Marks one quiz module completed and recomputes progress.
    ///
    /// Completion requires the enrollment's latest attempt on the module
    /// to be fully graded. Passing is not required: a failed but graded
    /// attempt still completes the unit for progress purposes.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::ModuleNotGraded` if there is no
    /// fully graded attempt, plus the lookup errors of
    /// `mark_content_viewed`.
    pub async fn mark_module_completed(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<Enrollment, ProgressServiceError> {
        let (mut enrollment, outline) = self.load(enrollment_id).await?;

        let latest = self
            .attempts
            .latest_attempt(enrollment_id, quiz_module_id)
            .await?;
        let graded = latest.is_some_and(|v| v.attempt.status().is_terminal());
        if !graded {
            return Err(ProgressServiceError::ModuleNotGraded(quiz_module_id));
        }

        enrollment.mark_module_completed(&outline, quiz_module_id, self.clock.now())?;
        self.enrollments.upsert_enrollment(&enrollment).await?;
        Ok(enrollment)
    }

    async fn load(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<(Enrollment, assess_core::model::CourseOutline), ProgressServiceError> {
        let enrollment = self
            .enrollments
            .get_enrollment(enrollment_id)
            .await?
            .ok_or(ProgressServiceError::EnrollmentNotFound)?;
        let outline = self
            .enrollments
            .get_outline(enrollment.course_id())
            .await?
            .ok_or(ProgressServiceError::OutlineNotFound)?;
        Ok((enrollment, outline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assess_core::model::{
        AnswerKey, AnswerValue, AttemptStatus, CourseId, CourseOutline, EnrollmentStatus,
        ModuleSettings, Question, QuestionId, QuizModule, UserId,
    };
    use assess_core::time::fixed_now;
    use storage::repository::{InMemoryRepository, QuestionBankRepository as _};

    use crate::attempt_service::AttemptService;

    async fn seed(repo: &InMemoryRepository) -> (EnrollmentId, QuizModuleId) {
        let course_id = CourseId::new(1);
        let module_id = QuizModuleId::new(10);

        let module = QuizModule::new(
            module_id,
            course_id,
            "Unit 1 Quiz",
            ModuleSettings::default_quiz(),
            vec![QuestionId::new(1)],
        )
        .unwrap();
        repo.upsert_module(&module).await.unwrap();
        // true/false so an incorrect submission still grades terminally
        let question = Question::new(
            QuestionId::new(1),
            module_id,
            "2 + 2 = 4?",
            None,
            AnswerKey::TrueFalse(true),
            1,
            None,
        )
        .unwrap();
        repo.upsert_question(&question).await.unwrap();

        let outline = CourseOutline::new(
            course_id,
            [ContentId::new(1)],
            [module_id],
        );
        repo.upsert_outline(&outline).await.unwrap();

        let enrollment_id = EnrollmentId::new(1);
        let enrollment = Enrollment::new(enrollment_id, course_id, UserId::new(7), fixed_now());
        repo.upsert_enrollment(&enrollment).await.unwrap();

        (enrollment_id, module_id)
    }

    fn services(repo: &InMemoryRepository) -> (ProgressService, AttemptService) {
        let clock = Clock::Fixed(fixed_now());
        let progress = ProgressService::new(
            clock,
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        let attempts = AttemptService::new(clock, Arc::new(repo.clone()), Arc::new(repo.clone()));
        (progress, attempts)
    }

    #[tokio::test]
    async fn module_completion_requires_a_graded_attempt() {
        let repo = InMemoryRepository::new();
        let (enrollment_id, module_id) = seed(&repo).await;
        let (progress, attempts) = services(&repo);

        // no attempt at all
        let err = progress
            .mark_module_completed(enrollment_id, module_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::ModuleNotGraded(_)));

        // in-progress attempt does not count
        let attempt = attempts.start_attempt(enrollment_id, module_id).await.unwrap();
        let err = progress
            .mark_module_completed(enrollment_id, module_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::ModuleNotGraded(_)));

        // a graded but failed attempt is enough
        attempts
            .submit_attempt(attempt.id(), &[(QuestionId::new(1), AnswerValue::Bool(false))])
            .await
            .unwrap();
        let latest = repo
            .latest_attempt(enrollment_id, module_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.attempt.status(), AttemptStatus::Graded);
        assert!(!latest.attempt.passed());

        let enrollment = progress
            .mark_module_completed(enrollment_id, module_id)
            .await
            .unwrap();
        assert_eq!(enrollment.progress_percentage(), 50);
    }

    #[tokio::test]
    async fn repeated_events_do_not_inflate_progress() {
        let repo = InMemoryRepository::new();
        let (enrollment_id, _module_id) = seed(&repo).await;
        let (progress, _) = services(&repo);

        for _ in 0..3 {
            let enrollment = progress
                .mark_content_viewed(enrollment_id, ContentId::new(1))
                .await
                .unwrap();
            assert_eq!(enrollment.progress_percentage(), 50);
        }

        let stored = repo
            .get_enrollment(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.completed_content_ids().len(), 1);
        assert_eq!(stored.status(), EnrollmentStatus::Active);
    }

    #[tokio::test]
    async fn full_completion_flips_the_enrollment() {
        let repo = InMemoryRepository::new();
        let (enrollment_id, module_id) = seed(&repo).await;
        let (progress, attempts) = services(&repo);

        progress
            .mark_content_viewed(enrollment_id, ContentId::new(1))
            .await
            .unwrap();

        let attempt = attempts.start_attempt(enrollment_id, module_id).await.unwrap();
        attempts
            .submit_attempt(attempt.id(), &[(QuestionId::new(1), AnswerValue::Bool(true))])
            .await
            .unwrap();

        let enrollment = progress
            .mark_module_completed(enrollment_id, module_id)
            .await
            .unwrap();
        assert_eq!(enrollment.progress_percentage(), 100);
        assert_eq!(enrollment.status(), EnrollmentStatus::Completed);
    }

    #[tokio::test]
    async fn unknown_units_surface_domain_errors() {
        let repo = InMemoryRepository::new();
        let (enrollment_id, _) = seed(&repo).await;
        let (progress, _) = services(&repo);

        let err = progress
            .mark_content_viewed(enrollment_id, ContentId::new(99))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::Enrollment(_)));

        let err = progress
            .mark_content_viewed(EnrollmentId::new(404), ContentId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProgressServiceError::EnrollmentNotFound));
    }
}
