use chrono::{DateTime, Utc};
use rand::rng;
use rand::seq::SliceRandom;

use assess_core::model::{
    Question, QuestionKind, QuestionSnapshot, QuizModule, QuizSnapshot, SnapshotError,
};

/// Builds the frozen snapshot an attempt grades against.
///
/// Shuffle decisions are made exactly once, here. The resulting orders are
/// stored inside the snapshot, so resuming an attempt always shows the
/// same question and option order.
///
/// `questions` must already be in the module's authored order; the module
/// settings decide whether that order is kept or permuted.
///
/// # Errors
///
/// Returns `SnapshotError::EmptyModule` if the module has no questions.
pub fn build_snapshot(
    module: &QuizModule,
    questions: &[Question],
    now: DateTime<Utc>,
) -> Result<QuizSnapshot, SnapshotError> {
    let settings = module.settings().clone();

    let mut order: Vec<usize> = (0..questions.len()).collect();
    if settings.shuffle_questions() {
        order.shuffle(&mut rng());
    }

    let mut snapshots = Vec::with_capacity(questions.len());
    for &i in &order {
        let question = &questions[i];
        let snapshot = if settings.shuffle_options()
            && question.kind() == QuestionKind::MultipleChoice
        {
            let mut option_order: Vec<usize> = (0..question.options().len()).collect();
            option_order.shuffle(&mut rng());
            QuestionSnapshot::capture_with_option_order(question, &option_order)?
        } else {
            QuestionSnapshot::capture(question)
        };
        snapshots.push(snapshot);
    }

    QuizSnapshot::new(module.id(), snapshots, settings, now)
}
