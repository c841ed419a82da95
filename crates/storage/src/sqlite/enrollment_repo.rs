use async_trait::async_trait;

use assess_core::model::{CourseId, CourseOutline, Enrollment, EnrollmentId};

use super::SqliteRepository;
use super::mapping::{db, id_to_i64, map_enrollment_row, map_outline_row, ser};
use crate::repository::{EnrollmentRepository, StorageError};

#[async_trait]
impl EnrollmentRepository for SqliteRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let module_ids: Vec<u64> = enrollment
            .completed_module_ids()
            .iter()
            .map(|m| m.value())
            .collect();
        let content_ids: Vec<u64> = enrollment
            .completed_content_ids()
            .iter()
            .map(|c| c.value())
            .collect();
        let module_ids_json = serde_json::to_string(&module_ids).map_err(ser)?;
        let content_ids_json = serde_json::to_string(&content_ids).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO enrollments
                (id, course_id, user_id, status, completed_module_ids,
                 completed_content_ids, progress, last_accessed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                completed_module_ids = excluded.completed_module_ids,
                completed_content_ids = excluded.completed_content_ids,
                progress = excluded.progress,
                last_accessed_at = excluded.last_accessed_at
            ",
        )
        .bind(id_to_i64("enrollment_id", enrollment.id().value())?)
        .bind(id_to_i64("course_id", enrollment.course_id().value())?)
        .bind(id_to_i64("user_id", enrollment.user_id().value())?)
        .bind(enrollment.status().as_str())
        .bind(module_ids_json)
        .bind(content_ids_json)
        .bind(i64::from(enrollment.progress_percentage()))
        .bind(enrollment.last_accessed_at())
        .execute(self.pool())
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn get_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let row = sqlx::query("SELECT * FROM enrollments WHERE id = ?1")
            .bind(id_to_i64("enrollment_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(db)?;

        row.as_ref().map(map_enrollment_row).transpose()
    }

    async fn upsert_outline(&self, outline: &CourseOutline) -> Result<(), StorageError> {
        let content_ids: Vec<u64> = outline
            .lesson_content_ids()
            .iter()
            .map(|c| c.value())
            .collect();
        let module_ids: Vec<u64> = outline
            .quiz_module_ids()
            .iter()
            .map(|m| m.value())
            .collect();
        let content_ids_json = serde_json::to_string(&content_ids).map_err(ser)?;
        let module_ids_json = serde_json::to_string(&module_ids).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO course_outlines (course_id, lesson_content_ids, quiz_module_ids)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (course_id) DO UPDATE SET
                lesson_content_ids = excluded.lesson_content_ids,
                quiz_module_ids = excluded.quiz_module_ids
            ",
        )
        .bind(id_to_i64("course_id", outline.course_id().value())?)
        .bind(content_ids_json)
        .bind(module_ids_json)
        .execute(self.pool())
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn get_outline(
        &self,
        course_id: CourseId,
    ) -> Result<Option<CourseOutline>, StorageError> {
        let row = sqlx::query("SELECT * FROM course_outlines WHERE course_id = ?1")
            .bind(id_to_i64("course_id", course_id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(db)?;

        row.as_ref().map(map_outline_row).transpose()
    }
}
