use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the question bank tables, attempts with their versioned
/// optimistic-concurrency column, practice tests, enrollments, and course
/// outlines. Snapshot, item, and set payloads live in JSON columns so the
/// schema does not chase the domain model.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_modules (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    shuffle_questions INTEGER NOT NULL,
                    shuffle_options INTEGER NOT NULL,
                    time_limit_minutes INTEGER,
                    pass_threshold REAL NOT NULL CHECK (pass_threshold BETWEEN 0 AND 1),
                    max_attempts INTEGER,
                    question_ids TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    quiz_module_id INTEGER NOT NULL,
                    kind TEXT NOT NULL,
                    prompt TEXT NOT NULL,
                    context TEXT,
                    options TEXT NOT NULL,
                    acceptable_answers TEXT NOT NULL,
                    numeric_target REAL,
                    numeric_tolerance REAL,
                    boolean_answer INTEGER,
                    points INTEGER NOT NULL CHECK (points > 0),
                    feedback TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempts (
                    id INTEGER PRIMARY KEY,
                    quiz_module_id INTEGER NOT NULL,
                    enrollment_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    snapshot TEXT NOT NULL,
                    items TEXT NOT NULL,
                    score INTEGER NOT NULL CHECK (score >= 0),
                    total_points INTEGER NOT NULL CHECK (total_points >= 0),
                    passed INTEGER NOT NULL,
                    attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
                    started_at TEXT NOT NULL,
                    submitted_at TEXT,
                    graded_at TEXT,
                    version INTEGER NOT NULL CHECK (version >= 1)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempts_enrollment_module
                ON attempts (enrollment_id, quiz_module_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS practice_tests (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL,
                    enrollment_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    sections TEXT NOT NULL,
                    last_active_module_id INTEGER,
                    overall_score INTEGER,
                    UNIQUE (enrollment_id, course_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS enrollments (
                    id INTEGER PRIMARY KEY,
                    course_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    completed_module_ids TEXT NOT NULL,
                    completed_content_ids TEXT NOT NULL,
                    progress INTEGER NOT NULL CHECK (progress BETWEEN 0 AND 100),
                    last_accessed_at TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS course_outlines (
                    course_id INTEGER PRIMARY KEY,
                    lesson_content_ids TEXT NOT NULL,
                    quiz_module_ids TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (1, ?1)")
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
    }

    Ok(())
}
