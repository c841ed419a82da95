use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{QuestionId, QuizModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("point value must be > 0")]
    InvalidPoints,

    #[error("multiple choice question needs at least two options")]
    TooFewOptions,

    #[error("multiple choice question needs at least one correct option")]
    NoCorrectOption,

    #[error("duplicate option id: {0}")]
    DuplicateOptionId(String),

    #[error("true/false question needs a boolean answer")]
    MissingBooleanAnswer,

    #[error("numerical question needs a target value")]
    MissingNumericTarget,

    #[error("numeric tolerance must be finite and >= 0")]
    InvalidTolerance,

    #[error("text question needs at least one acceptable answer")]
    NoAcceptableAnswers,
}

//
// ─── QUESTION KIND ─────────────────────────────────────────────────────────────
//

/// The closed set of question types the grader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
    Numerical,
    FillInTheBlank,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
            QuestionKind::ShortAnswer => "short_answer",
            QuestionKind::Essay => "essay",
            QuestionKind::Numerical => "numerical",
            QuestionKind::FillInTheBlank => "fill_in_the_blank",
        }
    }

    /// True for kinds whose unmatched answers go to a human reviewer.
    #[must_use]
    pub fn is_manually_reviewable(self) -> bool {
        matches!(
            self,
            QuestionKind::ShortAnswer | QuestionKind::Essay | QuestionKind::FillInTheBlank
        )
    }
}

//
// ─── ANSWER KEY PARTS ──────────────────────────────────────────────────────────
//

/// One selectable option on a multiple choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
    pub is_correct: bool,
}

impl ChoiceOption {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_correct,
        }
    }
}

/// Target value and inclusive tolerance for a numerical question.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericAnswer {
    pub target: f64,
    pub tolerance: f64,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A live, mutable question owned by content authoring.
///
/// Grading never reads this directly; attempts grade against the immutable
/// `QuestionSnapshot` taken at attempt start, so later edits here cannot
/// retroactively change results.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    quiz_module_id: QuizModuleId,
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

/// Kind-specific answer key supplied when authoring a question.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerKey {
    MultipleChoice(Vec<ChoiceOption>),
    TrueFalse(bool),
    ShortAnswer(Vec<String>),
    Essay,
    Numerical(NumericAnswer),
    FillInTheBlank(Vec<String>),
}

impl AnswerKey {
    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        match self {
            AnswerKey::MultipleChoice(_) => QuestionKind::MultipleChoice,
            AnswerKey::TrueFalse(_) => QuestionKind::TrueFalse,
            AnswerKey::ShortAnswer(_) => QuestionKind::ShortAnswer,
            AnswerKey::Essay => QuestionKind::Essay,
            AnswerKey::Numerical(_) => QuestionKind::Numerical,
            AnswerKey::FillInTheBlank(_) => QuestionKind::FillInTheBlank,
        }
    }
}

impl Question {
    /// Creates a new question, validating the answer key against its kind.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, points are zero, or
    /// the answer key is incomplete for the kind.
    pub fn new(
        id: QuestionId,
        quiz_module_id: QuizModuleId,
        prompt: impl Into<String>,
        context: Option<String>,
        key: AnswerKey,
        points: u32,
        feedback: Option<String>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if points == 0 {
            return Err(QuestionError::InvalidPoints);
        }

        let kind = key.kind();
        let mut options = Vec::new();
        let mut acceptable_answers = Vec::new();
        let mut numeric = None;
        let mut boolean_answer = None;

        match key {
            AnswerKey::MultipleChoice(opts) => {
                if opts.len() < 2 {
                    return Err(QuestionError::TooFewOptions);
                }
                if !opts.iter().any(|o| o.is_correct) {
                    return Err(QuestionError::NoCorrectOption);
                }
                for (i, opt) in opts.iter().enumerate() {
                    if opts[..i].iter().any(|prev| prev.id == opt.id) {
                        return Err(QuestionError::DuplicateOptionId(opt.id.clone()));
                    }
                }
                options = opts;
            }
            AnswerKey::TrueFalse(answer) => boolean_answer = Some(answer),
            AnswerKey::ShortAnswer(answers) | AnswerKey::FillInTheBlank(answers) => {
                if answers.iter().all(|a| a.trim().is_empty()) {
                    return Err(QuestionError::NoAcceptableAnswers);
                }
                acceptable_answers = answers;
            }
            AnswerKey::Essay => {}
            AnswerKey::Numerical(spec) => {
                if !spec.target.is_finite() {
                    return Err(QuestionError::MissingNumericTarget);
                }
                if !spec.tolerance.is_finite() || spec.tolerance < 0.0 {
                    return Err(QuestionError::InvalidTolerance);
                }
                numeric = Some(spec);
            }
        }

        let context = context
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());

        Ok(Self {
            id,
            quiz_module_id,
            kind,
            prompt: prompt.trim().to_owned(),
            context,
            options,
            acceptable_answers,
            numeric,
            boolean_answer,
            points,
            feedback,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn quiz_module_id(&self) -> QuizModuleId {
        self.quiz_module_id
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

    // Authoring mutations. Existing snapshots are unaffected.

    /// Replaces the prompt text.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyPrompt` for blank input.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) -> Result<(), QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        self.prompt = prompt.trim().to_owned();
        Ok(())
    }

    /// Replaces the point value.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidPoints` for zero.
    pub fn set_points(&mut self, points: u32) -> Result<(), QuestionError> {
        if points == 0 {
            return Err(QuestionError::InvalidPoints);
        }
        self.points = points;
        Ok(())
    }

    pub fn set_feedback(&mut self, feedback: Option<String>) {
        self.feedback = feedback;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
