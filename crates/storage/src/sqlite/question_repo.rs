use async_trait::async_trait;

use assess_core::model::{Question, QuestionId, QuizModule, QuizModuleId};

use super::SqliteRepository;
use super::mapping::{db, id_to_i64, map_module_row, map_question_row, ser};
use crate::repository::{QuestionBankRepository, StorageError};

#[async_trait]
impl QuestionBankRepository for SqliteRepository {
    async fn upsert_module(&self, module: &QuizModule) -> Result<(), StorageError> {
        let question_ids: Vec<u64> = module.question_ids().iter().map(|q| q.value()).collect();
        let question_ids_json = serde_json::to_string(&question_ids).map_err(ser)?;
        let settings = module.settings();

        sqlx::query(
            r"
            INSERT INTO quiz_modules
                (id, course_id, title, shuffle_questions, shuffle_options,
                 time_limit_minutes, pass_threshold, max_attempts, question_ids)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                shuffle_questions = excluded.shuffle_questions,
                shuffle_options = excluded.shuffle_options,
                time_limit_minutes = excluded.time_limit_minutes,
                pass_threshold = excluded.pass_threshold,
                max_attempts = excluded.max_attempts,
                question_ids = excluded.question_ids
            ",
        )
        .bind(id_to_i64("module_id", module.id().value())?)
        .bind(id_to_i64("course_id", module.course_id().value())?)
        .bind(module.title())
        .bind(settings.shuffle_questions())
        .bind(settings.shuffle_options())
        .bind(settings.time_limit_minutes().map(i64::from))
        .bind(settings.pass_threshold())
        .bind(settings.max_attempts().map(i64::from))
        .bind(question_ids_json)
        .execute(self.pool())
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn get_module(&self, id: QuizModuleId) -> Result<Option<QuizModule>, StorageError> {
        let row = sqlx::query("SELECT * FROM quiz_modules WHERE id = ?1")
            .bind(id_to_i64("module_id", id.value())?)
            .fetch_optional(self.pool())
            .await
            .map_err(db)?;

        row.as_ref().map(map_module_row).transpose()
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let options_json = serde_json::to_string(question.options()).map_err(ser)?;
        let acceptable_json =
            serde_json::to_string(question.acceptable_answers()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO questions
                (id, quiz_module_id, kind, prompt, context, options,
                 acceptable_answers, numeric_target, numeric_tolerance,
                 boolean_answer, points, feedback)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT (id) DO UPDATE SET
                quiz_module_id = excluded.quiz_module_id,
                kind = excluded.kind,
                prompt = excluded.prompt,
                context = excluded.context,
                options = excluded.options,
                acceptable_answers = excluded.acceptable_answers,
                numeric_target = excluded.numeric_target,
                numeric_tolerance = excluded.numeric_tolerance,
                boolean_answer = excluded.boolean_answer,
                points = excluded.points,
                feedback = excluded.feedback
            ",
        )
        .bind(id_to_i64("question_id", question.id().value())?)
        .bind(id_to_i64("quiz_module_id", question.quiz_module_id().value())?)
        .bind(question.kind().as_str())
        .bind(question.prompt())
        .bind(question.context())
        .bind(options_json)
        .bind(acceptable_json)
        .bind(question.numeric().map(|n| n.target))
        .bind(question.numeric().map(|n| n.tolerance))
        .bind(question.boolean_answer())
        .bind(i64::from(question.points()))
        .bind(question.feedback())
        .execute(self.pool())
        .await
        .map_err(db)?;

        Ok(())
    }

    async fn get_questions(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        // Fetched one by one to preserve the requested order; question
        // lists are small enough that this never matters.
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let row = sqlx::query("SELECT * FROM questions WHERE id = ?1")
                .bind(id_to_i64("question_id", id.value())?)
                .fetch_optional(self.pool())
                .await
                .map_err(db)?;
            match row {
                Some(row) => found.push(map_question_row(&row)?),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }
}
