use async_trait::async_trait;
use sqlx::SqliteConnection;

use assess_core::model::{AttemptId, EnrollmentId, QuizAttempt, QuizModuleId};

use super::SqliteRepository;
use super::mapping::{db, i64_to_u64, id_to_i64, map_attempt_row};
use crate::repository::{AttemptRecord, AttemptRepository, StorageError, VersionedAttempt};

#[async_trait]
impl AttemptRepository for SqliteRepository {
    async fn allocate_attempt_id(&self) -> Result<AttemptId, StorageError> {
        let next: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) + 1 FROM attempts")
            .fetch_one(self.pool())
            .await
            .map_err(db)?;
        Ok(AttemptId::new(i64_to_u64("attempt_id", next)?))
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let record = AttemptRecord::from_attempt(attempt, 1)?;
        let mut conn = self.pool().acquire().await.map_err(db)?;
        insert_attempt_record(&mut conn, &record).await
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<VersionedAttempt>, StorageError> {
        let row = sqlx::query("SELECT * FROM attempts WHERE id = ?1")
            .bind(id_to_i64("attempt_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(db)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn update_attempt(
        &self,
        attempt: &QuizAttempt,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let mut conn = self.pool().acquire().await.map_err(db)?;
        versioned_update(&mut conn, attempt, expected_version).await
    }

    async fn attempt_count(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<u32, StorageError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attempts WHERE enrollment_id = ?1 AND quiz_module_id = ?2",
        )
        .bind(id_to_i64("enrollment_id", enrollment_id.value())?)
        .bind(id_to_i64("quiz_module_id", quiz_module_id.value())?)
        .fetch_one(self.pool())
        .await
        .map_err(db)?;

        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn latest_attempt(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<Option<VersionedAttempt>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT * FROM attempts
            WHERE enrollment_id = ?1 AND quiz_module_id = ?2
            ORDER BY attempt_number DESC
            LIMIT 1
            ",
        )
        .bind(id_to_i64("enrollment_id", enrollment_id.value())?)
        .bind(id_to_i64("quiz_module_id", quiz_module_id.value())?)
        .fetch_optional(self.pool())
        .await
        .map_err(db)?;

        row.as_ref().map(map_attempt_row).transpose()
    }
}

/// Inserts an attempt row at the record's version. A duplicate id is a
/// `Conflict`, matching the in-memory behaviour.
pub(super) async fn insert_attempt_record(
    conn: &mut SqliteConnection,
    record: &AttemptRecord,
) -> Result<(), StorageError> {
    let result = sqlx::query(
        r"
        INSERT INTO attempts
            (id, quiz_module_id, enrollment_id, status, snapshot, items,
             score, total_points, passed, attempt_number,
             started_at, submitted_at, graded_at, version)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ",
    )
    .bind(id_to_i64("attempt_id", record.id.value())?)
    .bind(id_to_i64("quiz_module_id", record.quiz_module_id.value())?)
    .bind(id_to_i64("enrollment_id", record.enrollment_id.value())?)
    .bind(record.status.as_str())
    .bind(&record.snapshot_json)
    .bind(&record.items_json)
    .bind(i64::from(record.score))
    .bind(i64::from(record.total_points))
    .bind(record.passed)
    .bind(i64::from(record.attempt_number))
    .bind(record.started_at)
    .bind(record.submitted_at)
    .bind(record.graded_at)
    .bind(record.version)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StorageError::Conflict),
        Err(e) => Err(db(e)),
    }
}

/// Writes back an attempt guarded by its version column.
///
/// The `WHERE version = ?` clause makes the check-and-bump atomic; zero
/// rows affected means either a stale writer or a missing row, told apart
/// by a follow-up existence probe.
pub(super) async fn versioned_update(
    conn: &mut SqliteConnection,
    attempt: &QuizAttempt,
    expected_version: i64,
) -> Result<i64, StorageError> {
    let record = AttemptRecord::from_attempt(attempt, expected_version)?;

    let result = sqlx::query(
        r"
        UPDATE attempts SET
            status = ?1,
            snapshot = ?2,
            items = ?3,
            score = ?4,
            total_points = ?5,
            passed = ?6,
            submitted_at = ?7,
            graded_at = ?8,
            version = version + 1
        WHERE id = ?9 AND version = ?10
        ",
    )
    .bind(record.status.as_str())
    .bind(&record.snapshot_json)
    .bind(&record.items_json)
    .bind(i64::from(record.score))
    .bind(i64::from(record.total_points))
    .bind(record.passed)
    .bind(record.submitted_at)
    .bind(record.graded_at)
    .bind(id_to_i64("attempt_id", record.id.value())?)
    .bind(expected_version)
    .execute(&mut *conn)
    .await
    .map_err(db)?;

    if result.rows_affected() == 0 {
        let exists = sqlx::query("SELECT id FROM attempts WHERE id = ?1")
            .bind(id_to_i64("attempt_id", record.id.value())?)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db)?;
        return Err(if exists.is_some() {
            StorageError::Conflict
        } else {
            StorageError::NotFound
        });
    }

    Ok(expected_version + 1)
}
