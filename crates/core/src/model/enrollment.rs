use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::ids::{ContentId, CourseId, EnrollmentId, QuizModuleId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EnrollmentError {
    #[error("content {0} is not part of this course outline")]
    UnknownContent(ContentId),

    #[error("quiz module {0} is not part of this course outline")]
    UnknownModule(QuizModuleId),

    #[error("outline is for course {outline}, enrollment is for course {enrollment}")]
    CourseMismatch {
        outline: CourseId,
        enrollment: CourseId,
    },
}

//
// ─── COURSE OUTLINE ────────────────────────────────────────────────────────────
//

/// The set of completable units in a course: one unit per lesson content
/// item plus one per quiz module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseOutline {
    course_id: CourseId,
    lesson_content_ids: BTreeSet<ContentId>,
    quiz_module_ids: BTreeSet<QuizModuleId>,
}

impl CourseOutline {
    #[must_use]
    pub fn new(
        course_id: CourseId,
        lesson_content_ids: impl IntoIterator<Item = ContentId>,
        quiz_module_ids: impl IntoIterator<Item = QuizModuleId>,
    ) -> Self {
        Self {
            course_id,
            lesson_content_ids: lesson_content_ids.into_iter().collect(),
            quiz_module_ids: quiz_module_ids.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn lesson_content_ids(&self) -> &BTreeSet<ContentId> {
        &self.lesson_content_ids
    }

    #[must_use]
    pub fn quiz_module_ids(&self) -> &BTreeSet<QuizModuleId> {
        &self.quiz_module_ids
    }

    #[must_use]
    pub fn total_units(&self) -> usize {
        self.lesson_content_ids.len() + self.quiz_module_ids.len()
    }
}

//
// ─── ENROLLMENT ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
}

impl EnrollmentStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Completed => "completed",
        }
    }
}

/// A learner's relationship to and progress through one course.
///
/// Progress is always a full re-derivation from the completed-unit sets
/// against the course outline, never an incremental add, so repeated or
/// out-of-order events cannot cause drift.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    id: EnrollmentId,
    course_id: CourseId,
    user_id: UserId,
    status: EnrollmentStatus,
    completed_module_ids: BTreeSet<QuizModuleId>,
    completed_content_ids: BTreeSet<ContentId>,
    progress_percentage: u8,
    last_accessed_at: DateTime<Utc>,
}

impl Enrollment {
    #[must_use]
    pub fn new(
        id: EnrollmentId,
        course_id: CourseId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            course_id,
            user_id,
            status: EnrollmentStatus::Active,
            completed_module_ids: BTreeSet::new(),
            completed_content_ids: BTreeSet::new(),
            progress_percentage: 0,
            last_accessed_at: now,
        }
    }

    /// Rehydrates from persisted storage, re-deriving the percentage when
    /// an outline is available so stored drift cannot survive a load.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        id: EnrollmentId,
        course_id: CourseId,
        user_id: UserId,
        status: EnrollmentStatus,
        completed_module_ids: BTreeSet<QuizModuleId>,
        completed_content_ids: BTreeSet<ContentId>,
        progress_percentage: u8,
        last_accessed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            course_id,
            user_id,
            status,
            completed_module_ids,
            completed_content_ids,
            progress_percentage: progress_percentage.min(100),
            last_accessed_at,
        }
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> EnrollmentId {
        self.id
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn status(&self) -> EnrollmentStatus {
        self.status
    }

    #[must_use]
    pub fn completed_module_ids(&self) -> &BTreeSet<QuizModuleId> {
        &self.completed_module_ids
    }

    #[must_use]
    pub fn completed_content_ids(&self) -> &BTreeSet<ContentId> {
        &self.completed_content_ids
    }

    /// Integer percentage 0..=100.
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        self.progress_percentage
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    /// Idempotently marks one lesson content item viewed, then recomputes
    /// progress over the full outline.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::CourseMismatch` for a foreign outline or
    /// `EnrollmentError::UnknownContent` for content outside the course.
    pub fn mark_content_viewed(
        &mut self,
        outline: &CourseOutline,
        content_id: ContentId,
        now: DateTime<Utc>,
    ) -> Result<(), EnrollmentError> {
        self.check_outline(outline)?;
        if !outline.lesson_content_ids().contains(&content_id) {
            return Err(EnrollmentError::UnknownContent(content_id));
        }

        self.completed_content_ids.insert(content_id);
        self.recompute_progress(outline, now);
        Ok(())
    }

    /// Idempotently marks one quiz module completed, then recomputes
    /// progress over the full outline.
    ///
    /// # Errors
    ///
    /// Returns `EnrollmentError::CourseMismatch` for a foreign outline or
    /// `EnrollmentError::UnknownModule` for a module outside the course.
    pub fn mark_module_completed(
        &mut self,
        outline: &CourseOutline,
        quiz_module_id: QuizModuleId,
        now: DateTime<Utc>,
    ) -> Result<(), EnrollmentError> {
        self.check_outline(outline)?;
        if !outline.quiz_module_ids().contains(&quiz_module_id) {
            return Err(EnrollmentError::UnknownModule(quiz_module_id));
        }

        self.completed_module_ids.insert(quiz_module_id);
        self.recompute_progress(outline, now);
        Ok(())
    }

    fn check_outline(&self, outline: &CourseOutline) -> Result<(), EnrollmentError> {
        if outline.course_id() != self.course_id {
            return Err(EnrollmentError::CourseMismatch {
                outline: outline.course_id(),
                enrollment: self.course_id,
            });
        }
        Ok(())
    }

    /// Full re-derivation from the two completed sets. Units outside the
    /// current outline are ignored rather than counted, so removing a
    /// lesson from a course can only lower the denominator consistently.
    fn recompute_progress(&mut self, outline: &CourseOutline, now: DateTime<Utc>) {
        let total = outline.total_units();
        let completed = self
            .completed_content_ids
            .intersection(outline.lesson_content_ids())
            .count()
            + self
                .completed_module_ids
                .intersection(outline.quiz_module_ids())
                .count();

        self.progress_percentage = if total == 0 {
            0
        } else {
            u8::try_from(100 * completed / total).unwrap_or(100)
        };
        self.status = if self.progress_percentage >= 100 {
            EnrollmentStatus::Completed
        } else {
            EnrollmentStatus::Active
        };
        self.last_accessed_at = now;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn outline() -> CourseOutline {
        CourseOutline::new(
            CourseId::new(1),
            [ContentId::new(1), ContentId::new(2), ContentId::new(3)],
            [QuizModuleId::new(10)],
        )
    }

    fn enrollment() -> Enrollment {
        Enrollment::new(
            EnrollmentId::new(1),
            CourseId::new(1),
            UserId::new(7),
            fixed_now(),
        )
    }

    #[test]
    fn progress_is_integer_floor_of_completed_over_total() {
        let outline = outline();
        let mut e = enrollment();
        e.mark_content_viewed(&outline, ContentId::new(1), fixed_now())
            .unwrap();
        // 1 of 4 units
        assert_eq!(e.progress_percentage(), 25);

        e.mark_content_viewed(&outline, ContentId::new(2), fixed_now())
            .unwrap();
        assert_eq!(e.progress_percentage(), 50);
    }

    #[test]
    fn marking_is_idempotent() {
        let outline = outline();
        let mut e = enrollment();
        e.mark_content_viewed(&outline, ContentId::new(1), fixed_now())
            .unwrap();
        e.mark_content_viewed(&outline, ContentId::new(1), fixed_now())
            .unwrap();
        assert_eq!(e.completed_content_ids().len(), 1);
        assert_eq!(e.progress_percentage(), 25);
    }

    #[test]
    fn completing_everything_completes_the_enrollment() {
        let outline = outline();
        let mut e = enrollment();
        for id in [1, 2, 3] {
            e.mark_content_viewed(&outline, ContentId::new(id), fixed_now())
                .unwrap();
        }
        assert_eq!(e.status(), EnrollmentStatus::Active);
        e.mark_module_completed(&outline, QuizModuleId::new(10), fixed_now())
            .unwrap();
        assert_eq!(e.progress_percentage(), 100);
        assert_eq!(e.status(), EnrollmentStatus::Completed);
    }

    #[test]
    fn unknown_units_are_rejected() {
        let outline = outline();
        let mut e = enrollment();
        let err = e
            .mark_content_viewed(&outline, ContentId::new(99), fixed_now())
            .unwrap_err();
        assert_eq!(err, EnrollmentError::UnknownContent(ContentId::new(99)));

        let err = e
            .mark_module_completed(&outline, QuizModuleId::new(99), fixed_now())
            .unwrap_err();
        assert_eq!(err, EnrollmentError::UnknownModule(QuizModuleId::new(99)));
    }

    #[test]
    fn foreign_outline_is_rejected() {
        let other = CourseOutline::new(CourseId::new(2), [ContentId::new(1)], []);
        let mut e = enrollment();
        let err = e
            .mark_content_viewed(&other, ContentId::new(1), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            EnrollmentError::CourseMismatch {
                outline: CourseId::new(2),
                enrollment: CourseId::new(1),
            }
        );
    }

    #[test]
    fn progress_mutations_touch_last_accessed() {
        let outline = outline();
        let mut e = enrollment();
        let later = fixed_now() + chrono::Duration::hours(1);
        e.mark_content_viewed(&outline, ContentId::new(1), later)
            .unwrap();
        assert_eq!(e.last_accessed_at(), later);
    }
}
