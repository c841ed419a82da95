use sqlx::Row;

use assess_core::model::{
    AnswerKey, AttemptId, AttemptStatus, ChoiceOption, ContentId, CourseId, CourseOutline,
    Enrollment, EnrollmentId, EnrollmentStatus, NumericAnswer, PracticeStatus,
    PracticeTestAttempt, PracticeTestId, Question, QuestionId, QuizModule, QuizModuleId,
    SectionResult, UserId,
};

use crate::repository::{AttemptRecord, StorageError, VersionedAttempt};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn db(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn parse_attempt_status(s: &str) -> Result<AttemptStatus, StorageError> {
    match s {
        "in-progress" => Ok(AttemptStatus::InProgress),
        "submitted" => Ok(AttemptStatus::Submitted),
        "partially-graded" => Ok(AttemptStatus::PartiallyGraded),
        "graded" => Ok(AttemptStatus::Graded),
        _ => Err(StorageError::Serialization(format!(
            "invalid attempt status: {s}"
        ))),
    }
}

pub(crate) fn parse_practice_status(s: &str) -> Result<PracticeStatus, StorageError> {
    match s {
        "in-progress" => Ok(PracticeStatus::InProgress),
        "partially-graded" => Ok(PracticeStatus::PartiallyGraded),
        "graded" => Ok(PracticeStatus::Graded),
        _ => Err(StorageError::Serialization(format!(
            "invalid practice status: {s}"
        ))),
    }
}

pub(crate) fn parse_enrollment_status(s: &str) -> Result<EnrollmentStatus, StorageError> {
    match s {
        "active" => Ok(EnrollmentStatus::Active),
        "completed" => Ok(EnrollmentStatus::Completed),
        _ => Err(StorageError::Serialization(format!(
            "invalid enrollment status: {s}"
        ))),
    }
}

pub(crate) fn map_module_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizModule, StorageError> {
    let settings = assess_core::model::ModuleSettings::new(
        row.try_get::<bool, _>("shuffle_questions").map_err(ser)?,
        row.try_get::<bool, _>("shuffle_options").map_err(ser)?,
        row.try_get::<Option<i64>, _>("time_limit_minutes")
            .map_err(ser)?
            .map(|v| u32_from_i64("time_limit_minutes", v))
            .transpose()?,
        row.try_get::<f64, _>("pass_threshold").map_err(ser)?,
        row.try_get::<Option<i64>, _>("max_attempts")
            .map_err(ser)?
            .map(|v| u32_from_i64("max_attempts", v))
            .transpose()?,
    )
    .map_err(ser)?;

    let question_ids: Vec<u64> = serde_json::from_str(
        &row.try_get::<String, _>("question_ids").map_err(ser)?,
    )
    .map_err(ser)?;

    QuizModule::new(
        QuizModuleId::new(i64_to_u64("module_id", row.try_get("id").map_err(ser)?)?),
        CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        settings,
        question_ids.into_iter().map(QuestionId::new).collect(),
    )
    .map_err(ser)
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    let options: Vec<ChoiceOption> =
        serde_json::from_str(&row.try_get::<String, _>("options").map_err(ser)?).map_err(ser)?;
    let acceptable: Vec<String> = serde_json::from_str(
        &row.try_get::<String, _>("acceptable_answers").map_err(ser)?,
    )
    .map_err(ser)?;

    let key = match kind.as_str() {
        "multiple_choice" => AnswerKey::MultipleChoice(options),
        "true_false" => AnswerKey::TrueFalse(
            row.try_get::<Option<bool>, _>("boolean_answer")
                .map_err(ser)?
                .ok_or_else(|| StorageError::Serialization("missing boolean_answer".into()))?,
        ),
        "short_answer" => AnswerKey::ShortAnswer(acceptable),
        "essay" => AnswerKey::Essay,
        "numerical" => AnswerKey::Numerical(NumericAnswer {
            target: row
                .try_get::<Option<f64>, _>("numeric_target")
                .map_err(ser)?
                .ok_or_else(|| StorageError::Serialization("missing numeric_target".into()))?,
            tolerance: row
                .try_get::<Option<f64>, _>("numeric_tolerance")
                .map_err(ser)?
                .unwrap_or(0.0),
        }),
        "fill_in_the_blank" => AnswerKey::FillInTheBlank(acceptable),
        _ => {
            return Err(StorageError::Serialization(format!(
                "invalid question kind: {kind}"
            )));
        }
    };

    Question::new(
        QuestionId::new(i64_to_u64("question_id", row.try_get("id").map_err(ser)?)?),
        QuizModuleId::new(i64_to_u64(
            "quiz_module_id",
            row.try_get("quiz_module_id").map_err(ser)?,
        )?),
        row.try_get::<String, _>("prompt").map_err(ser)?,
        row.try_get::<Option<String>, _>("context").map_err(ser)?,
        key,
        u32_from_i64("points", row.try_get("points").map_err(ser)?)?,
        row.try_get::<Option<String>, _>("feedback").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<VersionedAttempt, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;

    let record = AttemptRecord {
        id: AttemptId::new(i64_to_u64("attempt_id", row.try_get("id").map_err(ser)?)?),
        quiz_module_id: QuizModuleId::new(i64_to_u64(
            "quiz_module_id",
            row.try_get("quiz_module_id").map_err(ser)?,
        )?),
        enrollment_id: EnrollmentId::new(i64_to_u64(
            "enrollment_id",
            row.try_get("enrollment_id").map_err(ser)?,
        )?),
        status: parse_attempt_status(&status_str)?,
        snapshot_json: row.try_get("snapshot").map_err(ser)?,
        items_json: row.try_get("items").map_err(ser)?,
        score: u32_from_i64("score", row.try_get("score").map_err(ser)?)?,
        total_points: u32_from_i64("total_points", row.try_get("total_points").map_err(ser)?)?,
        passed: row.try_get("passed").map_err(ser)?,
        attempt_number: u32_from_i64(
            "attempt_number",
            row.try_get("attempt_number").map_err(ser)?,
        )?,
        started_at: row.try_get("started_at").map_err(ser)?,
        submitted_at: row.try_get("submitted_at").map_err(ser)?,
        graded_at: row.try_get("graded_at").map_err(ser)?,
        version: row.try_get("version").map_err(ser)?,
    };

    record.into_attempt()
}

pub(crate) fn map_practice_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<PracticeTestAttempt, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let sections: Vec<SectionResult> =
        serde_json::from_str(&row.try_get::<String, _>("sections").map_err(ser)?).map_err(ser)?;

    Ok(PracticeTestAttempt::from_persisted(
        PracticeTestId::new(i64_to_u64("practice_id", row.try_get("id").map_err(ser)?)?),
        CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?),
        EnrollmentId::new(i64_to_u64(
            "enrollment_id",
            row.try_get("enrollment_id").map_err(ser)?,
        )?),
        sections,
        row.try_get::<Option<i64>, _>("last_active_module_id")
            .map_err(ser)?
            .map(|v| Ok::<_, StorageError>(QuizModuleId::new(i64_to_u64("module_id", v)?)))
            .transpose()?,
        row.try_get::<Option<i64>, _>("overall_score")
            .map_err(ser)?
            .map(|v| u32_from_i64("overall_score", v))
            .transpose()?,
        parse_practice_status(&status_str)?,
    ))
}

pub(crate) fn map_enrollment_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Enrollment, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let module_ids: Vec<u64> = serde_json::from_str(
        &row.try_get::<String, _>("completed_module_ids").map_err(ser)?,
    )
    .map_err(ser)?;
    let content_ids: Vec<u64> = serde_json::from_str(
        &row.try_get::<String, _>("completed_content_ids").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(Enrollment::from_persisted(
        EnrollmentId::new(i64_to_u64("enrollment_id", row.try_get("id").map_err(ser)?)?),
        CourseId::new(i64_to_u64("course_id", row.try_get("course_id").map_err(ser)?)?),
        UserId::new(i64_to_u64("user_id", row.try_get("user_id").map_err(ser)?)?),
        parse_enrollment_status(&status_str)?,
        module_ids.into_iter().map(QuizModuleId::new).collect(),
        content_ids.into_iter().map(ContentId::new).collect(),
        u8::try_from(row.try_get::<i64, _>("progress").map_err(ser)?)
            .map_err(|_| StorageError::Serialization("invalid progress".into()))?,
        row.try_get("last_accessed_at").map_err(ser)?,
    ))
}

pub(crate) fn map_outline_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<CourseOutline, StorageError> {
    let content_ids: Vec<u64> = serde_json::from_str(
        &row.try_get::<String, _>("lesson_content_ids").map_err(ser)?,
    )
    .map_err(ser)?;
    let module_ids: Vec<u64> = serde_json::from_str(
        &row.try_get::<String, _>("quiz_module_ids").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(CourseOutline::new(
        CourseId::new(i64_to_u64(
            "course_id",
            row.try_get("course_id").map_err(ser)?,
        )?),
        content_ids.into_iter().map(ContentId::new),
        module_ids.into_iter().map(QuizModuleId::new),
    ))
}
