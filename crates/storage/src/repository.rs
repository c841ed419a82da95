use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

use assess_core::model::{
    AttemptId, AttemptItem, AttemptStatus, CourseId, CourseOutline, Enrollment, EnrollmentId,
    PracticeTestAttempt, PracticeTestId, Question, QuestionId, QuizAttempt, QuizModule,
    QuizModuleId, QuizSnapshot,
};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A versioned write lost a race; the caller holds stale state.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// An attempt together with its optimistic-concurrency version.
///
/// Every write back must present the version it read; a mismatch means
/// another writer got there first and surfaces as `StorageError::Conflict`.
#[derive(Debug, Clone)]
pub struct VersionedAttempt {
    pub attempt: QuizAttempt,
    pub version: i64,
}

/// Persisted shape for a quiz attempt.
///
/// The snapshot and items travel as JSON payloads so the schema never has
/// to chase the question model, and `into_attempt` re-runs the domain
/// invariant checks on the way back out.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub quiz_module_id: QuizModuleId,
    pub enrollment_id: EnrollmentId,
    pub status: AttemptStatus,
    pub snapshot_json: String,
    pub items_json: String,
    pub score: u32,
    pub total_points: u32,
    pub passed: bool,
    pub attempt_number: u32,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl AttemptRecord {
    /// Serializes a domain attempt for persistence.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the snapshot or items
    /// cannot be encoded.
    pub fn from_attempt(attempt: &QuizAttempt, version: i64) -> Result<Self, StorageError> {
        let snapshot_json = serde_json::to_string(attempt.snapshot())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let items_json = serde_json::to_string(attempt.items())
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Self {
            id: attempt.id(),
            quiz_module_id: attempt.quiz_module_id(),
            enrollment_id: attempt.enrollment_id(),
            status: attempt.status(),
            snapshot_json,
            items_json,
            score: attempt.score(),
            total_points: attempt.total_points_possible(),
            passed: attempt.passed(),
            attempt_number: attempt.attempt_number(),
            started_at: attempt.started_at(),
            submitted_at: attempt.submitted_at(),
            graded_at: attempt.graded_at(),
            version,
        })
    }

    /// Rebuilds the domain attempt, re-validating its invariants.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` for undecodable payloads or
    /// payloads that violate attempt invariants.
    pub fn into_attempt(self) -> Result<VersionedAttempt, StorageError> {
        let snapshot: QuizSnapshot = serde_json::from_str(&self.snapshot_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let items: Vec<AttemptItem> = serde_json::from_str(&self.items_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let attempt = QuizAttempt::from_persisted(
            self.id,
            self.enrollment_id,
            snapshot,
            items,
            self.status,
            self.score,
            self.passed,
            self.attempt_number,
            self.started_at,
            self.submitted_at,
            self.graded_at,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(VersionedAttempt {
            attempt,
            version: self.version,
        })
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Read/write access to the question bank.
///
/// The assessment core only reads from it; the upserts exist for seeding
/// and for the authoring layer that owns this data.
#[async_trait]
pub trait QuestionBankRepository: Send + Sync {
    /// Persist or update a quiz module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &QuizModule) -> Result<(), StorageError>;

    /// Fetch a quiz module by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; a missing module is
    /// `Ok(None)`.
    async fn get_module(&self, id: QuizModuleId) -> Result<Option<QuizModule>, StorageError>;

    /// Persist or update a live question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch questions by id, in the order requested.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing.
    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Reserve a fresh attempt id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn allocate_attempt_id(&self) -> Result<AttemptId, StorageError>;

    /// Insert a brand-new attempt at version 1.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists.
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError>;

    /// Fetch an attempt with its current version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; a missing attempt is
    /// `Ok(None)`.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<VersionedAttempt>, StorageError>;

    /// Write back an attempt read at `expected_version`; returns the new
    /// version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if another writer updated the
    /// attempt since it was read.
    async fn update_attempt(
        &self,
        attempt: &QuizAttempt,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    /// Number of attempts already made for this enrollment and module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn attempt_count(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<u32, StorageError>;

    /// The most recently started attempt for this enrollment and module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn latest_attempt(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<Option<VersionedAttempt>, StorageError>;
}

#[async_trait]
pub trait PracticeTestRepository: Send + Sync {
    /// Reserve a fresh practice test id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn allocate_practice_id(&self) -> Result<PracticeTestId, StorageError>;

    /// Fetch a practice test by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; missing is `Ok(None)`.
    async fn get_practice(
        &self,
        id: PracticeTestId,
    ) -> Result<Option<PracticeTestAttempt>, StorageError>;

    /// Find the practice test for an enrollment within a course, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn find_practice(
        &self,
        enrollment_id: EnrollmentId,
        course_id: CourseId,
    ) -> Result<Option<PracticeTestAttempt>, StorageError>;

    /// Persist a practice test together with one member attempt as a
    /// single logical transaction, so composite state never diverges from
    /// member state on partial failure.
    ///
    /// `expected_attempt_version` of `None` inserts the attempt fresh;
    /// `Some(v)` performs a versioned update. Returns the attempt's new
    /// version.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a lost versioned write; nothing
    /// is persisted in that case.
    async fn save_practice_with_attempt(
        &self,
        practice: &PracticeTestAttempt,
        attempt: &QuizAttempt,
        expected_attempt_version: Option<i64>,
    ) -> Result<i64, StorageError>;
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Persist or update an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the enrollment cannot be stored.
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError>;

    /// Fetch an enrollment by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; missing is `Ok(None)`.
    async fn get_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Persist or update a course outline.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the outline cannot be stored.
    async fn upsert_outline(&self, outline: &CourseOutline) -> Result<(), StorageError>;

    /// Fetch the outline for a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; missing is `Ok(None)`.
    async fn get_outline(&self, course_id: CourseId)
    -> Result<Option<CourseOutline>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

/// In-memory implementation of every repository, for tests and
/// prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    modules: Arc<Mutex<HashMap<QuizModuleId, QuizModule>>>,
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, VersionedAttempt>>>,
    practices: Arc<Mutex<HashMap<PracticeTestId, PracticeTestAttempt>>>,
    enrollments: Arc<Mutex<HashMap<EnrollmentId, Enrollment>>>,
    outlines: Arc<Mutex<HashMap<CourseId, CourseOutline>>>,
    next_attempt_id: Arc<AtomicU64>,
    next_practice_id: Arc<AtomicU64>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_attempt_id: Arc::new(AtomicU64::new(1)),
            next_practice_id: Arc::new(AtomicU64::new(1)),
            ..Self::default()
        }
    }

    fn lock<T>(m: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>, StorageError> {
        m.lock().map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl QuestionBankRepository for InMemoryRepository {
    async fn upsert_module(&self, module: &QuizModule) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.modules)?;
        guard.insert(module.id(), module.clone());
        Ok(())
    }

    async fn get_module(&self, id: QuizModuleId) -> Result<Option<QuizModule>, StorageError> {
        let guard = Self::lock(&self.modules)?;
        Ok(guard.get(&id).cloned())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.questions)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = Self::lock(&self.questions)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.get(id) {
                Some(question) => found.push(question.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn allocate_attempt_id(&self) -> Result<AttemptId, StorageError> {
        Ok(AttemptId::new(
            self.next_attempt_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.attempts)?;
        if guard.contains_key(&attempt.id()) {
            return Err(StorageError::Conflict);
        }
        guard.insert(
            attempt.id(),
            VersionedAttempt {
                attempt: attempt.clone(),
                version: 1,
            },
        );
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<VersionedAttempt>, StorageError> {
        let guard = Self::lock(&self.attempts)?;
        Ok(guard.get(&id).cloned())
    }

    async fn update_attempt(
        &self,
        attempt: &QuizAttempt,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let mut guard = Self::lock(&self.attempts)?;
        let stored = guard.get_mut(&attempt.id()).ok_or(StorageError::NotFound)?;
        if stored.version != expected_version {
            return Err(StorageError::Conflict);
        }
        stored.attempt = attempt.clone();
        stored.version += 1;
        Ok(stored.version)
    }

    async fn attempt_count(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<u32, StorageError> {
        let guard = Self::lock(&self.attempts)?;
        let count = guard
            .values()
            .filter(|v| {
                v.attempt.enrollment_id() == enrollment_id
                    && v.attempt.quiz_module_id() == quiz_module_id
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn latest_attempt(
        &self,
        enrollment_id: EnrollmentId,
        quiz_module_id: QuizModuleId,
    ) -> Result<Option<VersionedAttempt>, StorageError> {
        let guard = Self::lock(&self.attempts)?;
        Ok(guard
            .values()
            .filter(|v| {
                v.attempt.enrollment_id() == enrollment_id
                    && v.attempt.quiz_module_id() == quiz_module_id
            })
            .max_by_key(|v| v.attempt.attempt_number())
            .cloned())
    }
}

#[async_trait]
impl PracticeTestRepository for InMemoryRepository {
    async fn allocate_practice_id(&self) -> Result<PracticeTestId, StorageError> {
        Ok(PracticeTestId::new(
            self.next_practice_id.fetch_add(1, Ordering::SeqCst),
        ))
    }

    async fn get_practice(
        &self,
        id: PracticeTestId,
    ) -> Result<Option<PracticeTestAttempt>, StorageError> {
        let guard = Self::lock(&self.practices)?;
        Ok(guard.get(&id).cloned())
    }

    async fn find_practice(
        &self,
        enrollment_id: EnrollmentId,
        course_id: CourseId,
    ) -> Result<Option<PracticeTestAttempt>, StorageError> {
        let guard = Self::lock(&self.practices)?;
        Ok(guard
            .values()
            .find(|p| p.enrollment_id() == enrollment_id && p.course_id() == course_id)
            .cloned())
    }

    async fn save_practice_with_attempt(
        &self,
        practice: &PracticeTestAttempt,
        attempt: &QuizAttempt,
        expected_attempt_version: Option<i64>,
    ) -> Result<i64, StorageError> {
        // Both maps are behind this repository, so take the attempt lock
        // first and only touch the practice map once the versioned write
        // is known to succeed.
        let new_version = match expected_attempt_version {
            None => {
                self.insert_attempt(attempt).await?;
                1
            }
            Some(expected) => self.update_attempt(attempt, expected).await?,
        };

        let mut guard = Self::lock(&self.practices)?;
        guard.insert(practice.id(), practice.clone());
        Ok(new_version)
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryRepository {
    async fn upsert_enrollment(&self, enrollment: &Enrollment) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.enrollments)?;
        guard.insert(enrollment.id(), enrollment.clone());
        Ok(())
    }

    async fn get_enrollment(
        &self,
        id: EnrollmentId,
    ) -> Result<Option<Enrollment>, StorageError> {
        let guard = Self::lock(&self.enrollments)?;
        Ok(guard.get(&id).cloned())
    }

    async fn upsert_outline(&self, outline: &CourseOutline) -> Result<(), StorageError> {
        let mut guard = Self::lock(&self.outlines)?;
        guard.insert(outline.course_id(), outline.clone());
        Ok(())
    }

    async fn get_outline(
        &self,
        course_id: CourseId,
    ) -> Result<Option<CourseOutline>, StorageError> {
        let guard = Self::lock(&self.outlines)?;
        Ok(guard.get(&course_id).cloned())
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Aggregates the repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionBankRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub practice_tests: Arc<dyn PracticeTestRepository>,
    pub enrollments: Arc<dyn EnrollmentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            questions: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            practice_tests: Arc::new(repo.clone()),
            enrollments: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{AnswerKey, AnswerValue, ChoiceOption, ModuleSettings, QuestionSnapshot};
    use assess_core::time::fixed_now;

    fn build_attempt(id: u64) -> QuizAttempt {
        let question = Question::new(
            QuestionId::new(1),
            QuizModuleId::new(1),
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
        let snapshot = QuizSnapshot::new(
            QuizModuleId::new(1),
            vec![QuestionSnapshot::capture(&question)],
            ModuleSettings::default_quiz(),
            fixed_now(),
        )
        .unwrap();
        QuizAttempt::start(
            AttemptId::new(id),
            EnrollmentId::new(1),
            snapshot,
            1,
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn versioned_update_detects_stale_writers() {
        let repo = InMemoryRepository::new();
        let mut attempt = build_attempt(1);
        repo.insert_attempt(&attempt).await.unwrap();

        let loaded = repo.get_attempt(attempt.id()).await.unwrap().unwrap();
        assert_eq!(loaded.version, 1);

        attempt
            .record_answer(QuestionId::new(1), AnswerValue::choice("b"))
            .unwrap();
        let v2 = repo.update_attempt(&attempt, 1).await.unwrap();
        assert_eq!(v2, 2);

        // a second writer still holding version 1 loses
        let err = repo.update_attempt(&attempt, 1).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn attempt_count_and_latest_track_enrollment_and_module() {
        let repo = InMemoryRepository::new();
        let first = build_attempt(1);
        repo.insert_attempt(&first).await.unwrap();
        // same enrollment+module, later attempt number
        let second = QuizAttempt::start(
            AttemptId::new(2),
            EnrollmentId::new(1),
            first.snapshot().clone(),
            2,
            fixed_now(),
        );
        repo.insert_attempt(&second).await.unwrap();

        let count = repo
            .attempt_count(EnrollmentId::new(1), QuizModuleId::new(1))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let latest = repo
            .latest_attempt(EnrollmentId::new(1), QuizModuleId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.attempt.attempt_number(), 2);

        let none = repo
            .latest_attempt(EnrollmentId::new(9), QuizModuleId::new(1))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn attempt_record_roundtrip_preserves_state() {
        let mut attempt = build_attempt(1);
        attempt
            .submit(&[(QuestionId::new(1), AnswerValue::choice("b"))], fixed_now())
            .unwrap();

        let record = AttemptRecord::from_attempt(&attempt, 3).unwrap();
        let restored = record.into_attempt().unwrap();
        assert_eq!(restored.version, 3);
        assert_eq!(restored.attempt, attempt);
    }

    #[tokio::test]
    async fn missing_question_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .get_questions(&[QuestionId::new(404)])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }
}
