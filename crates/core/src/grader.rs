//! Pure per-question grading.
//!
//! `grade` is a total function over the closed (kind, answer) case set: it
//! never fails, never blocks, and has no side effects. A malformed snapshot
//! (say, a numerical question missing its target) fails that one item
//! closed as incorrect rather than aborting the whole submission; the
//! `malformed` flag lets the caller log a data-integrity warning.

use crate::model::{AnswerValue, QuestionKind, QuestionSnapshot};

/// Outcome of grading one question against one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemGrade {
    pub is_correct: bool,
    pub points_awarded: u32,
    pub requires_manual_review: bool,
    /// The snapshot lacked the key material needed to grade this kind.
    pub malformed: bool,
}

impl ItemGrade {
    fn incorrect() -> Self {
        Self {
            is_correct: false,
            points_awarded: 0,
            requires_manual_review: false,
            malformed: false,
        }
    }

    fn correct(points: u32) -> Self {
        Self {
            is_correct: true,
            points_awarded: points,
            requires_manual_review: false,
            malformed: false,
        }
    }

    fn pending_review() -> Self {
        Self {
            is_correct: false,
            points_awarded: 0,
            requires_manual_review: true,
            malformed: false,
        }
    }

    fn failed_closed() -> Self {
        Self {
            is_correct: false,
            points_awarded: 0,
            requires_manual_review: false,
            malformed: true,
        }
    }
}

/// Normalization applied to both sides of a text comparison.
fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Grades one question snapshot against a submitted value.
///
/// Missing or blank submissions grade as incorrect without manual review,
/// except essays, which always require review. Full points or zero; partial
/// credit only ever comes from manual review.
#[must_use]
pub fn grade(question: &QuestionSnapshot, submitted: Option<&AnswerValue>) -> ItemGrade {
    // Essay first: review is required regardless of what (if anything) was
    // submitted, so a blank essay still reaches a human.
    if question.kind() == QuestionKind::Essay {
        return ItemGrade::pending_review();
    }

    let Some(submitted) = submitted else {
        return ItemGrade::incorrect();
    };
    if submitted.is_blank() {
        return ItemGrade::incorrect();
    }

    match (question.kind(), submitted) {
        (QuestionKind::MultipleChoice, AnswerValue::Choice(option_id)) => {
            if !question.options().iter().any(|o| o.is_correct) {
                return ItemGrade::failed_closed();
            }
            match question.options().iter().find(|o| &o.id == option_id) {
                Some(option) if option.is_correct => ItemGrade::correct(question.points()),
                _ => ItemGrade::incorrect(),
            }
        }
        (QuestionKind::TrueFalse, AnswerValue::Bool(submitted)) => {
            match question.boolean_answer() {
                Some(expected) if expected == *submitted => {
                    ItemGrade::correct(question.points())
                }
                Some(_) => ItemGrade::incorrect(),
                None => ItemGrade::failed_closed(),
            }
        }
        (QuestionKind::Numerical, AnswerValue::Number(submitted)) => match question.numeric() {
            Some(spec) if (submitted - spec.target).abs() <= spec.tolerance => {
                ItemGrade::correct(question.points())
            }
            Some(_) => ItemGrade::incorrect(),
            None => ItemGrade::failed_closed(),
        },
        (
            QuestionKind::ShortAnswer | QuestionKind::FillInTheBlank,
            AnswerValue::Text(submitted),
        ) => {
            let submitted = normalize(submitted);
            let matched = question
                .acceptable_answers()
                .iter()
                .any(|accepted| normalize(accepted) == submitted);
            if matched {
                ItemGrade::correct(question.points())
            } else {
                ItemGrade::pending_review()
            }
        }
        // Type-mismatched submission for the question kind. The snapshot
        // and answer disagree about shape, so fail the item closed.
        _ => ItemGrade::failed_closed(),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerKey, ChoiceOption, NumericAnswer, Question, QuestionId, QuizModuleId,
    };

    fn snapshot(key: AnswerKey, points: u32) -> QuestionSnapshot {
        let q = Question::new(
            QuestionId::new(1),
            QuizModuleId::new(1),
            "Prompt",
            None,
            key,
            points,
            None,
        )
        .unwrap();
        QuestionSnapshot::capture(&q)
    }

    fn mc(points: u32) -> QuestionSnapshot {
        snapshot(
            AnswerKey::MultipleChoice(vec![
                ChoiceOption::new("a", "Lisbon", false),
                ChoiceOption::new("b", "Paris", true),
            ]),
            points,
        )
    }

    #[test]
    fn multiple_choice_full_points_or_zero() {
        let q = mc(1);
        let right = grade(&q, Some(&AnswerValue::choice("b")));
        assert!(right.is_correct);
        assert_eq!(right.points_awarded, 1);
        assert!(!right.requires_manual_review);

        let wrong = grade(&q, Some(&AnswerValue::choice("a")));
        assert!(!wrong.is_correct);
        assert_eq!(wrong.points_awarded, 0);

        let unknown = grade(&q, Some(&AnswerValue::choice("zz")));
        assert!(!unknown.is_correct);
        assert!(!unknown.malformed);
    }

    #[test]
    fn true_false_boolean_equality() {
        let q = snapshot(AnswerKey::TrueFalse(true), 2);
        assert!(grade(&q, Some(&AnswerValue::Bool(true))).is_correct);
        let wrong = grade(&q, Some(&AnswerValue::Bool(false)));
        assert!(!wrong.is_correct);
        assert_eq!(wrong.points_awarded, 0);
    }

    #[test]
    fn numerical_tolerance_is_inclusive() {
        let q = snapshot(
            AnswerKey::Numerical(NumericAnswer {
                target: 10.0,
                tolerance: 0.5,
            }),
            3,
        );
        assert!(grade(&q, Some(&AnswerValue::Number(10.5))).is_correct);
        assert!(grade(&q, Some(&AnswerValue::Number(9.5))).is_correct);
        assert!(!grade(&q, Some(&AnswerValue::Number(10.500001))).is_correct);
        assert!(!grade(&q, Some(&AnswerValue::Number(9.499999))).is_correct);
    }

    #[test]
    fn short_answer_normalizes_both_sides() {
        let q = snapshot(
            AnswerKey::ShortAnswer(vec!["Paris".into(), "paris ".into()]),
            2,
        );
        let graded = grade(&q, Some(&AnswerValue::text(" PARIS")));
        assert!(graded.is_correct);
        assert_eq!(graded.points_awarded, 2);
        assert!(!graded.requires_manual_review);
    }

    #[test]
    fn unmatched_short_answer_goes_to_review() {
        let q = snapshot(AnswerKey::ShortAnswer(vec!["Paris".into()]), 2);
        let graded = grade(&q, Some(&AnswerValue::text("the capital")));
        assert!(!graded.is_correct);
        assert_eq!(graded.points_awarded, 0);
        assert!(graded.requires_manual_review);
    }

    #[test]
    fn blank_text_is_incorrect_not_reviewed() {
        let q = snapshot(AnswerKey::FillInTheBlank(vec!["Paris".into()]), 1);
        let graded = grade(&q, Some(&AnswerValue::text("   ")));
        assert!(!graded.is_correct);
        assert!(!graded.requires_manual_review);

        let missing = grade(&q, None);
        assert!(!missing.is_correct);
        assert!(!missing.requires_manual_review);
    }

    #[test]
    fn essay_always_requires_review() {
        let q = snapshot(AnswerKey::Essay, 5);
        assert!(grade(&q, Some(&AnswerValue::text("My thoughts."))).requires_manual_review);
        assert!(grade(&q, None).requires_manual_review);
        assert_eq!(grade(&q, Some(&AnswerValue::text("x"))).points_awarded, 0);
    }

    #[test]
    fn rehydrated_snapshot_missing_target_fails_closed() {
        // Persisted payloads bypass Question validation, so a numerical
        // snapshot can arrive without key material.
        let json = r#"{
            "question_id": 1,
            "kind": "numerical",
            "prompt": "Value of pi?",
            "context": null,
            "options": [],
            "acceptable_answers": [],
            "numeric": null,
            "boolean_answer": null,
            "points": 3,
            "feedback": null
        }"#;
        let q: QuestionSnapshot = serde_json::from_str(json).unwrap();
        let graded = grade(&q, Some(&AnswerValue::Number(3.14)));
        assert!(!graded.is_correct);
        assert_eq!(graded.points_awarded, 0);
        assert!(!graded.requires_manual_review);
        assert!(graded.malformed);
    }

    #[test]
    fn type_mismatch_fails_closed() {
        let q = mc(1);
        let graded = grade(&q, Some(&AnswerValue::Number(2.0)));
        assert!(!graded.is_correct);
        assert_eq!(graded.points_awarded, 0);
        assert!(graded.malformed);
    }
}
