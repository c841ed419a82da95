use async_trait::async_trait;

use assess_core::model::{CourseId, EnrollmentId, PracticeTestAttempt, PracticeTestId, QuizAttempt};

use super::SqliteRepository;
use super::attempt_repo::{insert_attempt_record, versioned_update};
use super::mapping::{db, i64_to_u64, id_to_i64, map_practice_row, ser};
use crate::repository::{AttemptRecord, PracticeTestRepository, StorageError};

#[async_trait]
impl PracticeTestRepository for SqliteRepository {
    async fn allocate_practice_id(&self) -> Result<PracticeTestId, StorageError> {
        let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM practice_tests")
            .fetch_one(self.pool())
            .await
            .map_err(db)?;
        Ok(PracticeTestId::new(i64_to_u64("practice_id", next)?))
    }

    async fn get_practice(
        &self,
        id: PracticeTestId,
    ) -> Result<Option<PracticeTestAttempt>, StorageError> {
        let row = sqlx::query("SELECT * FROM practice_tests WHERE id = ?1")
            .bind(id_to_i64("practice_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(db)?;

        row.as_ref().map(map_practice_row).transpose()
    }

    async fn find_practice(
        &self,
        enrollment_id: EnrollmentId,
        course_id: CourseId,
    ) -> Result<Option<PracticeTestAttempt>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM practice_tests WHERE enrollment_id = ?1 AND course_id = ?2",
        )
        .bind(id_to_i64("enrollment_id", enrollment_id.value())?)
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(db)?;

        row.as_ref().map(map_practice_row).transpose()
    }

    async fn save_practice_with_attempt(
        &self,
        practice: &PracticeTestAttempt,
        attempt: &QuizAttempt,
        expected_attempt_version: Option<i64>,
    ) -> Result<i64, StorageError> {
        let sections_json = serde_json::to_string(practice.sections()).map_err(ser)?;

        let mut tx = self.pool().begin().await.map_err(db)?;

        let new_version = match expected_attempt_version {
            None => {
                let record = AttemptRecord::from_attempt(attempt, 1)?;
                insert_attempt_record(&mut *tx, &record).await?;
                1
            }
            Some(expected) => versioned_update(&mut *tx, attempt, expected).await?,
        };

        sqlx::query(
            r"
            INSERT INTO practice_tests
                (id, course_id, enrollment_id, status, sections,
                 last_active_module_id, overall_score)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                sections = excluded.sections,
                last_active_module_id = excluded.last_active_module_id,
                overall_score = excluded.overall_score
            ",
        )
        .bind(id_to_i64("practice_id", practice.id().value())?)
        .bind(id_to_i64("course_id", practice.course_id().value())?)
        .bind(id_to_i64("enrollment_id", practice.enrollment_id().value())?)
        .bind(practice.status().as_str())
        .bind(sections_json)
        .bind(
            practice
                .last_active_quiz_module_id()
                .map(|m| id_to_i64("module_id", m.value()))
                .transpose()?,
        )
        .bind(practice.overall_score().map(i64::from))
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        Ok(new_version)
    }
}
