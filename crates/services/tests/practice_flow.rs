use std::sync::Arc;

use assess_core::model::{
    AnswerKey, AnswerValue, AttemptStatus, ChoiceOption, CourseId, EnrollmentId, ModuleSettings,
    PracticeStatus, Question, QuestionId, QuizModule, QuizModuleId, ScaleScore,
};
use assess_core::time::fixed_now;
use services::{AttemptService, Clock, PracticeTestService};
use storage::repository::{
    AttemptRepository, InMemoryRepository, QuestionBankRepository, Storage,
};

/// A small lookup-table scaler in the style of standardized score tables.
struct TableScale;

impl ScaleScore for TableScale {
    fn scaled(&self, _quiz_module_id: QuizModuleId, raw_correct: u32) -> u32 {
        100 + raw_correct * 10
    }
}

async fn seed_module(repo: &InMemoryRepository, module_id: u64, essay: bool) {
    let id = QuizModuleId::new(module_id);
    let mut question_ids = vec![QuestionId::new(module_id * 100 + 1)];
    let mc = Question::new(
        question_ids[0],
        id,
        "Capital of France?",
        None,
        AnswerKey::MultipleChoice(vec![
            ChoiceOption::new("a", "Lisbon", false),
            ChoiceOption::new("b", "Paris", true),
        ]),
        1,
        None,
    )
    .unwrap();
    repo.upsert_question(&mc).await.unwrap();

    if essay {
        let essay_id = QuestionId::new(module_id * 100 + 2);
        question_ids.push(essay_id);
        let q = Question::new(
            essay_id,
            id,
            "Discuss the passage.",
            Some("A short passage.".into()),
            AnswerKey::Essay,
            4,
            None,
        )
        .unwrap();
        repo.upsert_question(&q).await.unwrap();
    }

    let module = QuizModule::new(
        id,
        CourseId::new(1),
        format!("Section {module_id}"),
        ModuleSettings::default_quiz(),
        question_ids,
    )
    .unwrap();
    repo.upsert_module(&module).await.unwrap();
}

fn practice_service(repo: &InMemoryRepository) -> PracticeTestService {
    let attempt_service = AttemptService::new(
        Clock::fixed(fixed_now()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
    );
    PracticeTestService::new(
        attempt_service,
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(TableScale),
    )
}

#[tokio::test]
async fn practice_test_runs_sections_to_a_scaled_composite() {
    let repo = InMemoryRepository::new();
    seed_module(&repo, 10, false).await;
    seed_module(&repo, 20, false).await;
    let service = practice_service(&repo);
    let enrollment = EnrollmentId::new(1);
    let course = CourseId::new(1);

    assert!(service.resume(enrollment, course).await.unwrap().is_none());

    let (practice, first) = service
        .start_section(enrollment, course, QuizModuleId::new(10))
        .await
        .unwrap();
    assert_eq!(practice.status(), PracticeStatus::InProgress);
    assert_eq!(
        practice.last_active_quiz_module_id(),
        Some(QuizModuleId::new(10))
    );

    let (practice, _) = service
        .submit_section(
            practice.id(),
            first.id(),
            &[(QuestionId::new(1001), AnswerValue::choice("b"))],
        )
        .await
        .unwrap();
    // one section graded, the other not yet started
    assert_eq!(practice.status(), PracticeStatus::Graded);
    assert_eq!(practice.overall_score(), Some(110));

    // second section joins the same practice test
    let (practice, second) = service
        .start_section(enrollment, course, QuizModuleId::new(20))
        .await
        .unwrap();
    assert_eq!(practice.sections().len(), 2);
    assert_eq!(practice.status(), PracticeStatus::InProgress);
    assert_eq!(practice.overall_score(), None);

    let (practice, attempt) = service
        .submit_section(
            practice.id(),
            second.id(),
            &[(QuestionId::new(2001), AnswerValue::choice("a"))],
        )
        .await
        .unwrap();
    assert_eq!(attempt.status(), AttemptStatus::Graded);
    assert_eq!(practice.status(), PracticeStatus::Graded);
    // 1 correct → 110, 0 correct → 100
    assert_eq!(practice.overall_score(), Some(210));

    // the persisted composite reflects all of it after a reload
    let resumed = service.resume(enrollment, course).await.unwrap().unwrap();
    assert_eq!(resumed, practice);
    assert_eq!(
        resumed.last_active_quiz_module_id(),
        Some(QuizModuleId::new(20))
    );
}

#[tokio::test]
async fn essay_section_holds_the_composite_until_reviewed() {
    let repo = InMemoryRepository::new();
    seed_module(&repo, 10, true).await;
    let service = practice_service(&repo);
    let enrollment = EnrollmentId::new(1);
    let course = CourseId::new(1);

    let (practice, attempt) = service
        .start_section(enrollment, course, QuizModuleId::new(10))
        .await
        .unwrap();

    let (practice, attempt) = service
        .submit_section(
            practice.id(),
            attempt.id(),
            &[
                (QuestionId::new(1001), AnswerValue::choice("b")),
                (QuestionId::new(1002), AnswerValue::text("An essay answer.")),
            ],
        )
        .await
        .unwrap();
    assert_eq!(attempt.status(), AttemptStatus::PartiallyGraded);
    assert_eq!(practice.status(), PracticeStatus::PartiallyGraded);
    assert_eq!(practice.overall_score(), None);

    let essay_index = attempt
        .items()
        .iter()
        .position(|i| i.is_pending_review())
        .unwrap();
    let (practice, attempt) = service
        .review_section_item(
            practice.id(),
            attempt.id(),
            essay_index,
            4,
            Some("Well argued.".into()),
        )
        .await
        .unwrap();
    assert_eq!(attempt.status(), AttemptStatus::Graded);
    assert_eq!(attempt.score(), 5);
    assert_eq!(practice.status(), PracticeStatus::Graded);
    // 2 correct answers → 120
    assert_eq!(practice.overall_score(), Some(120));
}

#[tokio::test]
async fn duplicate_section_for_a_module_is_rejected() {
    let repo = InMemoryRepository::new();
    seed_module(&repo, 10, false).await;
    let service = practice_service(&repo);
    let enrollment = EnrollmentId::new(1);
    let course = CourseId::new(1);

    service
        .start_section(enrollment, course, QuizModuleId::new(10))
        .await
        .unwrap();
    let err = service
        .start_section(enrollment, course, QuizModuleId::new(10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        services::PracticeServiceError::Practice(
            assess_core::model::PracticeTestError::DuplicateSection(_)
        )
    ));

    // the failed start must not leave a dangling member attempt
    let count = repo
        .attempt_count(enrollment, QuizModuleId::new(10))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn storage_aggregate_composes_the_service_stack() {
    let storage = Storage::in_memory();

    let module_id = QuizModuleId::new(10);
    let question = Question::new(
        QuestionId::new(1001),
        module_id,
        "Capital of France?",
        None,
        AnswerKey::MultipleChoice(vec![
            ChoiceOption::new("a", "Lisbon", false),
            ChoiceOption::new("b", "Paris", true),
        ]),
        1,
        None,
    )
    .unwrap();
    storage.questions.upsert_question(&question).await.unwrap();
    let module = QuizModule::new(
        module_id,
        CourseId::new(1),
        "Section 10",
        ModuleSettings::default_quiz(),
        vec![QuestionId::new(1001)],
    )
    .unwrap();
    storage.questions.upsert_module(&module).await.unwrap();

    let attempt_service = AttemptService::new(
        Clock::fixed(fixed_now()),
        storage.questions.clone(),
        storage.attempts.clone(),
    );
    let service = PracticeTestService::new(
        attempt_service,
        storage.attempts.clone(),
        storage.practice_tests.clone(),
        Arc::new(TableScale),
    );

    let (practice, attempt) = service
        .start_section(EnrollmentId::new(1), CourseId::new(1), module_id)
        .await
        .unwrap();
    let (practice, _) = service
        .submit_section(
            practice.id(),
            attempt.id(),
            &[(QuestionId::new(1001), AnswerValue::choice("b"))],
        )
        .await
        .unwrap();
    assert_eq!(practice.status(), PracticeStatus::Graded);
    assert_eq!(practice.overall_score(), Some(110));
}
