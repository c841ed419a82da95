mod answer;
mod attempt;
mod enrollment;
mod ids;
mod module;
mod question;
mod snapshot;

pub use answer::AnswerValue;
pub use attempt::{AttemptError, AttemptItem, AttemptStatus, QuizAttempt, SubmitOutcome};
pub use enrollment::{CourseOutline, Enrollment, EnrollmentError, EnrollmentStatus};
pub use ids::{
    AttemptId, ContentId, CourseId, EnrollmentId, PracticeTestId, QuestionId, QuizModuleId,
    UserId,
};
pub use module::{ModuleError, ModuleSettings, QuizModule};
pub use practice_test::{
    PracticeStatus, PracticeTestAttempt, PracticeTestError, RawScale, ScaleScore, SectionResult,
};
pub use question::{AnswerKey, ChoiceOption, NumericAnswer, Question, QuestionError, QuestionKind};
pub use snapshot::{QuestionSnapshot, QuizSnapshot, SnapshotError};
