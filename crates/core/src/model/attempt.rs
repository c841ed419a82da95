use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grader::{self, ItemGrade};
use crate::model::answer::AnswerValue;
use crate::model::ids::{AttemptId, EnrollmentId, QuestionId, QuizModuleId};
use crate::model::snapshot::QuizSnapshot;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt has already been submitted")]
    AlreadySubmitted,

    #[error("operation requires an in-progress attempt, current status is {0}")]
    NotInProgress(AttemptStatus),

    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(QuestionId),

    #[error("no attempt item at index {0}")]
    ItemNotFound(usize),

    #[error("manual score {score} is outside 0..={max}")]
    ScoreOutOfRange { score: u32, max: u32 },

    #[error("item at index {0} is not awaiting manual review")]
    NotAwaitingReview(usize),

    #[error("review requires a submitted attempt, current status is {0}")]
    NotReviewable(AttemptStatus),

    #[error("persisted score {stored} does not match item sum {derived}")]
    ScoreMismatch { stored: u32, derived: u32 },

    #[error("persisted items ({items}) do not match snapshot questions ({questions})")]
    ItemCountMismatch { items: usize, questions: usize },
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a quiz attempt.
///
/// `Submitted` is transient inside `submit`: grading runs immediately, so a
/// persisted attempt is only ever in-progress, partially graded, or graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    PartiallyGraded,
    Graded,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::PartiallyGraded => "partially-graded",
            AttemptStatus::Graded => "graded",
        }
    }

    /// True once grading can no longer change the score.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Graded)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── ATTEMPT ITEM ──────────────────────────────────────────────────────────────
//

/// Per-question row of an attempt: the raw submission plus grading state.
///
/// Mutated only through `QuizAttempt`, which keeps the score-sum and
/// review invariants intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptItem {
    question_id: QuestionId,
    points_possible: u32,
    submitted: Option<AnswerValue>,
    is_correct: bool,
    points_awarded: u32,
    requires_manual_review: bool,
    is_manually_graded: bool,
    teacher_notes: Option<String>,
}

impl AttemptItem {
    fn new(question_id: QuestionId, points_possible: u32) -> Self {
        Self {
            question_id,
            points_possible,
            submitted: None,
            is_correct: false,
            points_awarded: 0,
            requires_manual_review: false,
            is_manually_graded: false,
            teacher_notes: None,
        }
    }

    fn apply_grade(&mut self, graded: ItemGrade) {
        self.is_correct = graded.is_correct;
        self.points_awarded = graded.points_awarded;
        self.requires_manual_review = graded.requires_manual_review;
        self.is_manually_graded = false;
        self.teacher_notes = None;
    }

    /// True while this item blocks the attempt from reaching `Graded`.
    #[must_use]
    pub fn is_pending_review(&self) -> bool {
        self.requires_manual_review && !self.is_manually_graded
    }

    // Accessors
    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn points_possible(&self) -> u32 {
        self.points_possible
    }

    #[must_use]
    pub fn submitted(&self) -> Option<&AnswerValue> {
        self.submitted.as_ref()
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }

    #[must_use]
    pub fn points_awarded(&self) -> u32 {
        self.points_awarded
    }

    #[must_use]
    pub fn requires_manual_review(&self) -> bool {
        self.requires_manual_review
    }

    #[must_use]
    pub fn is_manually_graded(&self) -> bool {
        self.is_manually_graded
    }

    #[must_use]
    pub fn teacher_notes(&self) -> Option<&str> {
        self.teacher_notes.as_deref()
    }
}

//
// ─── QUIZ ATTEMPT ──────────────────────────────────────────────────────────────
//

/// Outcome of submitting an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub status: AttemptStatus,
    /// Questions whose snapshots lacked grading key material and were
    /// failed closed. The caller should log these as data-integrity
    /// warnings; they never block scoring of the remaining items.
    pub malformed_questions: Vec<QuestionId>,
}

/// One learner's pass through a quiz module's questions.
///
/// Owns the frozen snapshot, the per-question items, and the grading
/// lifecycle. The score is always recomputed from the items, never edited
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizAttempt {
    id: AttemptId,
    quiz_module_id: QuizModuleId,
    enrollment_id: EnrollmentId,
    snapshot: QuizSnapshot,
    items: Vec<AttemptItem>,
    status: AttemptStatus,
    score: u32,
    passed: bool,
    attempt_number: u32,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    graded_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    /// Starts a new in-progress attempt over a freshly built snapshot,
    /// with one empty item per snapshot question.
    #[must_use]
    pub fn start(
        id: AttemptId,
        enrollment_id: EnrollmentId,
        snapshot: QuizSnapshot,
        attempt_number: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let items = snapshot
            .questions()
            .iter()
            .map(|q| AttemptItem::new(q.question_id(), q.points()))
            .collect();

        Self {
            id,
            quiz_module_id: snapshot.quiz_module_id(),
            enrollment_id,
            snapshot,
            items,
            status: AttemptStatus::InProgress,
            score: 0,
            passed: false,
            attempt_number,
            started_at,
            submitted_at: None,
            graded_at: None,
        }
    }

    /// Rehydrates an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::ItemCountMismatch` if items do not line up
    /// with the snapshot, or `AttemptError::ScoreMismatch` if the stored
    /// score disagrees with the item sum.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        enrollment_id: EnrollmentId,
        snapshot: QuizSnapshot,
        items: Vec<AttemptItem>,
        status: AttemptStatus,
        score: u32,
        passed: bool,
        attempt_number: u32,
        started_at: DateTime<Utc>,
        submitted_at: Option<DateTime<Utc>>,
        graded_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AttemptError> {
        if items.len() != snapshot.questions().len() {
            return Err(AttemptError::ItemCountMismatch {
                items: items.len(),
                questions: snapshot.questions().len(),
            });
        }
        let derived: u32 = items.iter().map(AttemptItem::points_awarded).sum();
        if derived != score {
            return Err(AttemptError::ScoreMismatch {
                stored: score,
                derived,
            });
        }

        Ok(Self {
            id,
            quiz_module_id: snapshot.quiz_module_id(),
            enrollment_id,
            snapshot,
            items,
            status,
            score,
            passed,
            attempt_number,
            started_at,
            submitted_at,
            graded_at,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn quiz_module_id(&self) -> QuizModuleId {
        self.quiz_module_id
    }

    #[must_use]
    pub fn enrollment_id(&self) -> EnrollmentId {
        self.enrollment_id
    }

    #[must_use]
    pub fn snapshot(&self) -> &QuizSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn items(&self) -> &[AttemptItem] {
        &self.items
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_points_possible(&self) -> u32 {
        self.snapshot.total_points_possible()
    }

    /// Pass/fail against the snapshot's threshold. Meaningful only once
    /// the attempt is `Graded`; a partially graded score can still rise.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    #[must_use]
    pub fn graded_at(&self) -> Option<DateTime<Utc>> {
        self.graded_at
    }

    /// Count of items answered correctly, the raw input to scaled scoring.
    #[must_use]
    pub fn correct_count(&self) -> u32 {
        u32::try_from(self.items.iter().filter(|i| i.is_correct()).count()).unwrap_or(u32::MAX)
    }

    /// Records a raw answer without grading it. Last write wins per
    /// question.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotInProgress` after submission, or
    /// `AttemptError::UnknownQuestion` for a question outside the snapshot.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<(), AttemptError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AttemptError::NotInProgress(self.status));
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.question_id == question_id)
            .ok_or(AttemptError::UnknownQuestion(question_id))?;
        item.submitted = Some(value);
        Ok(())
    }

    /// Submits the attempt: merges `answers` over previously recorded
    /// ones, grades every item, and derives the final status.
    ///
    /// One-shot by design; an external time-limit trigger calls this with
    /// an empty `answers` slice to submit whatever was recorded.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` on a repeat call and
    /// `AttemptError::UnknownQuestion` if `answers` references a question
    /// outside the snapshot (no item is graded in that case).
    pub fn submit(
        &mut self,
        answers: &[(QuestionId, AnswerValue)],
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome, AttemptError> {
        if self.status != AttemptStatus::InProgress {
            return Err(AttemptError::AlreadySubmitted);
        }
        for (question_id, _) in answers {
            if !self.items.iter().any(|i| i.question_id == *question_id) {
                return Err(AttemptError::UnknownQuestion(*question_id));
            }
        }
        for (question_id, value) in answers {
            if let Some(item) = self.items.iter_mut().find(|i| i.question_id == *question_id) {
                item.submitted = Some(value.clone());
            }
        }

        self.status = AttemptStatus::Submitted;
        self.submitted_at = Some(now);

        let mut malformed_questions = Vec::new();
        for (item, question) in self.items.iter_mut().zip(self.snapshot.questions()) {
            let graded = grader::grade(question, item.submitted.as_ref());
            if graded.malformed {
                malformed_questions.push(item.question_id);
            }
            item.apply_grade(graded);
        }

        self.recompute(now);

        Ok(SubmitOutcome {
            status: self.status,
            malformed_questions,
        })
    }

    /// Resolves one manually reviewed item with a teacher-assigned score.
    ///
    /// This is the only path by which essay and unmatched short-answer
    /// items acquire points.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::NotReviewable` unless the attempt is
    /// partially graded, `AttemptError::ItemNotFound` for a bad index,
    /// `AttemptError::NotAwaitingReview` if the item was auto-graded, or
    /// `AttemptError::ScoreOutOfRange` if the score exceeds the item's
    /// possible points.
    pub fn review_item(
        &mut self,
        item_index: usize,
        manual_score: u32,
        teacher_notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        if self.status != AttemptStatus::PartiallyGraded {
            return Err(AttemptError::NotReviewable(self.status));
        }
        let item = self
            .items
            .get_mut(item_index)
            .ok_or(AttemptError::ItemNotFound(item_index))?;
        if !item.requires_manual_review {
            return Err(AttemptError::NotAwaitingReview(item_index));
        }
        if manual_score > item.points_possible {
            return Err(AttemptError::ScoreOutOfRange {
                score: manual_score,
                max: item.points_possible,
            });
        }

        item.points_awarded = manual_score;
        item.is_correct = manual_score == item.points_possible;
        item.is_manually_graded = true;
        item.teacher_notes = teacher_notes;

        self.recompute(now);
        Ok(())
    }

    /// Full re-derivation of score, pass flag, and status from the items.
    fn recompute(&mut self, now: DateTime<Utc>) {
        self.score = self.items.iter().map(AttemptItem::points_awarded).sum();

        let total = self.snapshot.total_points_possible();
        self.passed = total > 0
            && f64::from(self.score) / f64::from(total) >= self.snapshot.settings().pass_threshold();

        if self.items.iter().any(AttemptItem::is_pending_review) {
            self.status = AttemptStatus::PartiallyGraded;
            self.graded_at = None;
        } else {
            self.status = AttemptStatus::Graded;
            self.graded_at = Some(now);
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
