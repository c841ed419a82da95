use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, QuizModuleId};
use crate::model::module::ModuleSettings;
use crate::model::question::{ChoiceOption, NumericAnswer, Question, QuestionKind};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("quiz module has no eligible questions")]
    EmptyModule,

    #[error("option order is not a permutation of the question's options")]
    InvalidOptionOrder,
}

//
// ─── QUESTION SNAPSHOT ─────────────────────────────────────────────────────────
//

/// Immutable copy of a question as it existed at attempt start.
///
/// There are no mutators: once captured, grading and manual review always
/// read this copy, never the live question. The stored option order is the
/// order chosen at snapshot time and is what presentation must display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionSnapshot {
    question_id: QuestionId,
    kind: QuestionKind,
    prompt: String,
    context: Option<String>,
    options: Vec<ChoiceOption>,
    acceptable_answers: Vec<String>,
    numeric: Option<NumericAnswer>,
    boolean_answer: Option<bool>,
    points: u32,
    feedback: Option<String>,
}

impl QuestionSnapshot {
    /// Captures a question verbatim, preserving its authored option order.
    #[must_use]
    pub fn capture(question: &Question) -> Self {
        Self {
            question_id: question.id(),
            kind: question.kind(),
            prompt: question.prompt().to_owned(),
            context: question.context().map(str::to_owned),
            options: question.options().to_vec(),
            acceptable_answers: question.acceptable_answers().to_vec(),
            numeric: question.numeric(),
            boolean_answer: question.boolean_answer(),
            points: question.points(),
            feedback: question.feedback().map(str::to_owned),
        }
    }

    /// Captures a question with its options reordered by `option_order`,
    /// a permutation of indices into the question's option list.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::InvalidOptionOrder` if `option_order` is not
    /// a permutation of `0..options.len()`.
    pub fn capture_with_option_order(
        question: &Question,
        option_order: &[usize],
    ) -> Result<Self, SnapshotError> {
        let options = question.options();
        if option_order.len() != options.len() {
            return Err(SnapshotError::InvalidOptionOrder);
        }
        let mut seen = vec![false; options.len()];
        for &i in option_order {
            if i >= options.len() || seen[i] {
                return Err(SnapshotError::InvalidOptionOrder);
            }
            seen[i] = true;
        }

        let mut snapshot = Self::capture(question);
        snapshot.options = option_order.iter().map(|&i| options[i].clone()).collect();
        Ok(snapshot)
    }

    // Accessors
    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &[ChoiceOption] {
        &self.options
    }

    #[must_use]
    pub fn acceptable_answers(&self) -> &[String] {
        &self.acceptable_answers
    }

    #[must_use]
    pub fn numeric(&self) -> Option<NumericAnswer> {
        self.numeric
    }

    #[must_use]
    pub fn boolean_answer(&self) -> Option<bool> {
        self.boolean_answer
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }
}

//
// ─── QUIZ SNAPSHOT ─────────────────────────────────────────────────────────────
//

/// Frozen question set and settings for one attempt.
///
/// The question order stored here is the single source of truth for the
/// attempt's lifetime; navigating away and resuming must show the same
/// order, so nothing downstream may re-randomize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizSnapshot {
    quiz_module_id: QuizModuleId,
    questions: Vec<QuestionSnapshot>,
    settings: ModuleSettings,
    total_points_possible: u32,
    created_at: DateTime<Utc>,
}

impl QuizSnapshot {
    /// Builds a snapshot from already-ordered question snapshots.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::EmptyModule` if there are no questions.
    pub fn new(
        quiz_module_id: QuizModuleId,
        questions: Vec<QuestionSnapshot>,
        settings: ModuleSettings,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SnapshotError> {
        if questions.is_empty() {
            return Err(SnapshotError::EmptyModule);
        }
        let total_points_possible = questions.iter().map(QuestionSnapshot::points).sum();

        Ok(Self {
            quiz_module_id,
            questions,
            settings,
            total_points_possible,
            created_at,
        })
    }

    #[must_use]
    pub fn quiz_module_id(&self) -> QuizModuleId {
        self.quiz_module_id
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionSnapshot] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&QuestionSnapshot> {
        self.questions.get(index)
    }

    /// Finds a question snapshot by the live question's id.
    #[must_use]
    pub fn question_by_id(&self, id: QuestionId) -> Option<&QuestionSnapshot> {
        self.questions.iter().find(|q| q.question_id() == id)
    }

    #[must_use]
    pub fn settings(&self) -> &ModuleSettings {
        &self.settings
    }

    #[must_use]
    pub fn total_points_possible(&self) -> u32 {
        self.total_points_possible
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::AnswerKey;
    use crate::time::fixed_now;

    fn mc_question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            QuizModuleId::new(1),
            "Capital of France?",
            None,
            AnswerKey::MultipleChoice(vec![
                ChoiceOption::new("a", "Lisbon", false),
                ChoiceOption::new("b", "Paris", true),
                ChoiceOption::new("c", "Madrid", false),
            ]),
            2,
            Some("Paris has been the capital since 987.".into()),
        )
        .unwrap()
    }

    #[test]
    fn capture_preserves_question_fields() {
        let q = mc_question(1);
        let snap = QuestionSnapshot::capture(&q);
        assert_eq!(snap.question_id(), q.id());
        assert_eq!(snap.prompt(), q.prompt());
        assert_eq!(snap.options(), q.options());
        assert_eq!(snap.points(), 2);
        assert_eq!(snap.feedback(), q.feedback());
    }

    #[test]
    fn capture_with_option_order_permutes() {
        let q = mc_question(1);
        let snap = QuestionSnapshot::capture_with_option_order(&q, &[2, 0, 1]).unwrap();
        let ids: Vec<&str> = snap.options().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        // correctness flags travel with their options
        assert!(snap.options()[2].is_correct);
    }

    #[test]
    fn capture_rejects_non_permutations() {
        let q = mc_question(1);
        let err = QuestionSnapshot::capture_with_option_order(&q, &[0, 0, 1]).unwrap_err();
        assert_eq!(err, SnapshotError::InvalidOptionOrder);
        let err = QuestionSnapshot::capture_with_option_order(&q, &[0, 1]).unwrap_err();
        assert_eq!(err, SnapshotError::InvalidOptionOrder);
    }

    #[test]
    fn snapshot_totals_points_and_rejects_empty() {
        let questions = vec![
            QuestionSnapshot::capture(&mc_question(1)),
            QuestionSnapshot::capture(&mc_question(2)),
        ];
        let snap = QuizSnapshot::new(
            QuizModuleId::new(1),
            questions,
            ModuleSettings::default_quiz(),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(snap.total_points_possible(), 4);

        let err = QuizSnapshot::new(
            QuizModuleId::new(1),
            vec![],
            ModuleSettings::default_quiz(),
            fixed_now(),
        )
        .unwrap_err();
        assert_eq!(err, SnapshotError::EmptyModule);
    }

    #[test]
    fn editing_live_question_leaves_snapshot_untouched() {
        let mut q = mc_question(1);
        let snap = QuestionSnapshot::capture(&q);
        q.set_prompt("Largest city in France?").unwrap();
        q.set_points(10).unwrap();
        assert_eq!(snap.prompt(), "Capital of France?");
        assert_eq!(snap.points(), 2);
    }
}
