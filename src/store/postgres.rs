// src/store/postgres.rs

use async_trait::async_trait;
use sqlx::{PgPool, prelude::FromRow, types::Json};

use super::QuizStore;
use crate::{
    error::AppError,
    models::{
        participant::{NewParticipant, Participant},
        question::{NewQuestion, Question},
        quiz::{NewQuiz, Quiz, QuizStatus},
    },
};

/// Row of the 'quizzes' table.
#[derive(Debug, FromRow)]
struct QuizRow {
    id: i64,
    host_id: i64,
    title: String,
    description: Option<String>,
    room_code: String,
    max_participants: i32,
    status: String,
    current_question_index: Option<i32>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

/// Row of the 'questions' table.
/// Options and the answer key are stored as JSON arrays.
#[derive(Debug, FromRow)]
struct QuestionRow {
    id: i64,
    quiz_id: i64,
    text: String,
    options: Json<Vec<String>>,
    correct_option_indices: Json<Vec<u32>>,
    duration: i32,
    points: i32,
}

/// Row of the 'participants' table.
#[derive(Debug, FromRow)]
struct ParticipantRow {
    id: i64,
    quiz_id: i64,
    nickname: String,
    score: i64,
    total_time: i32,
    token: String,
}

const QUIZ_COLUMNS: &str = "id, host_id, title, description, room_code, max_participants, \
     status, current_question_index, created_at, updated_at";

const QUESTION_COLUMNS: &str =
    "id, quiz_id, text, options, correct_option_indices, duration, points";

const PARTICIPANT_COLUMNS: &str = "id, quiz_id, nickname, score, total_time, token";

fn out_of_range(column: &str) -> AppError {
    AppError::InternalServerError(format!("column '{}' holds an out-of-range value", column))
}

impl QuizRow {
    fn into_quiz(self, questions: Vec<Question>) -> Result<Quiz, AppError> {
        Ok(Quiz {
            id: self.id,
            host_id: self.host_id,
            title: self.title,
            description: self.description,
            room_code: self.room_code,
            max_participants: u32::try_from(self.max_participants)
                .map_err(|_| out_of_range("max_participants"))?,
            status: self
                .status
                .parse::<QuizStatus>()
                .map_err(AppError::InternalServerError)?,
            current_question_index: self
                .current_question_index
                .map(usize::try_from)
                .transpose()
                .map_err(|_| out_of_range("current_question_index"))?,
            questions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        Ok(Question {
            id: row.id,
            quiz_id: row.quiz_id,
            text: row.text,
            options: row.options.0,
            correct_option_indices: row.correct_option_indices.0,
            duration: u32::try_from(row.duration).map_err(|_| out_of_range("duration"))?,
            points: u32::try_from(row.points).map_err(|_| out_of_range("points"))?,
        })
    }
}

impl TryFrom<ParticipantRow> for Participant {
    type Error = AppError;

    fn try_from(row: ParticipantRow) -> Result<Self, Self::Error> {
        Ok(Participant {
            id: row.id,
            quiz_id: row.quiz_id,
            nickname: row.nickname,
            score: row.score,
            total_time: u32::try_from(row.total_time).map_err(|_| out_of_range("total_time"))?,
            token: row.token,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    // Postgres error code for unique violation is 23505
    e.to_string().contains("unique constraint") || e.to_string().contains("23505")
}

/// Record store backed by Postgres (see `migrations/`).
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_questions(&self, quiz_id: i64) -> Result<Vec<Question>, AppError> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            "SELECT {} FROM questions WHERE quiz_id = $1 ORDER BY position, id",
            QUESTION_COLUMNS
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch questions of quiz {}: {:?}", quiz_id, e);
            AppError::from(e)
        })?;

        rows.into_iter().map(Question::try_from).collect()
    }

    async fn hydrate(&self, row: Option<QuizRow>) -> Result<Quiz, AppError> {
        let row = row.ok_or(AppError::NotFound("Quiz not found".to_string()))?;
        let questions = self.load_questions(row.id).await?;
        row.into_quiz(questions)
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
        let max_participants =
            i32::try_from(quiz.max_participants).map_err(|_| out_of_range("max_participants"))?;

        let row = sqlx::query_as::<_, QuizRow>(&format!(
            r#"
            INSERT INTO quizzes (host_id, title, description, room_code, max_participants, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            QUIZ_COLUMNS
        ))
        .bind(quiz.host_id)
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(&quiz.room_code)
        .bind(max_participants)
        .bind(QuizStatus::Created.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::InvalidState(format!("Room code '{}' is already in use", quiz.room_code))
            } else {
                tracing::error!("Failed to create quiz: {:?}", e);
                AppError::from(e)
            }
        })?;

        row.into_quiz(Vec::new())
    }

    async fn load_quiz(&self, id: i64) -> Result<Quiz, AppError> {
        let row = sqlx::query_as::<_, QuizRow>(&format!(
            "SELECT {} FROM quizzes WHERE id = $1",
            QUIZ_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn load_quiz_by_room_code(&self, room_code: &str) -> Result<Quiz, AppError> {
        let row = sqlx::query_as::<_, QuizRow>(&format!(
            "SELECT {} FROM quizzes WHERE room_code = $1",
            QUIZ_COLUMNS
        ))
        .bind(room_code)
        .fetch_optional(&self.pool)
        .await?;

        self.hydrate(row).await
    }

    async fn save_quiz(&self, quiz: &Quiz) -> Result<(), AppError> {
        let max_participants =
            i32::try_from(quiz.max_participants).map_err(|_| out_of_range("max_participants"))?;
        let current_question_index = quiz
            .current_question_index
            .map(i32::try_from)
            .transpose()
            .map_err(|_| out_of_range("current_question_index"))?;

        let result = sqlx::query(
            r#"
            UPDATE quizzes
            SET title = $1,
                description = $2,
                max_participants = $3,
                status = $4,
                current_question_index = $5,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $6
            "#,
        )
        .bind(&quiz.title)
        .bind(&quiz.description)
        .bind(max_participants)
        .bind(quiz.status.as_str())
        .bind(current_question_index)
        .bind(quiz.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save quiz {}: {:?}", quiz.id, e);
            AppError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Quiz not found".to_string()));
        }
        Ok(())
    }

    async fn add_question(&self, quiz_id: i64, question: NewQuestion) -> Result<Question, AppError> {
        let duration = i32::try_from(question.duration).map_err(|_| out_of_range("duration"))?;
        let points = i32::try_from(question.points).map_err(|_| out_of_range("points"))?;

        let mut tx = self.pool.begin().await?;

        // Lock the parent row so concurrent appends get distinct positions.
        sqlx::query("SELECT id FROM quizzes WHERE id = $1 FOR UPDATE")
            .bind(quiz_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            INSERT INTO questions (quiz_id, position, text, options, correct_option_indices, duration, points)
            VALUES (
                $1,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM questions WHERE quiz_id = $1),
                $2, $3, $4, $5, $6
            )
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        ))
        .bind(quiz_id)
        .bind(&question.text)
        .bind(Json(&question.options))
        .bind(Json(&question.correct_option_indices))
        .bind(duration)
        .bind(points)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert question: {:?}", e);
            AppError::from(e)
        })?;

        tx.commit().await?;

        Question::try_from(row)
    }

    async fn create_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<Participant, AppError> {
        let row = sqlx::query_as::<_, ParticipantRow>(&format!(
            r#"
            INSERT INTO participants (quiz_id, nickname, score, total_time, token)
            VALUES ($1, $2, 0, 0, $3)
            RETURNING {}
            "#,
            PARTICIPANT_COLUMNS
        ))
        .bind(participant.quiz_id)
        .bind(&participant.nickname)
        .bind(&participant.token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Capacity("Nickname is already taken".to_string())
            } else {
                tracing::error!("Failed to create participant: {:?}", e);
                AppError::from(e)
            }
        })?;

        Participant::try_from(row)
    }

    async fn load_participant(&self, id: i64) -> Result<Participant, AppError> {
        sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {} FROM participants WHERE id = $1",
            PARTICIPANT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Participant not found".to_string()))
        .and_then(Participant::try_from)
    }

    async fn save_participant(&self, participant: &Participant) -> Result<(), AppError> {
        let total_time =
            i32::try_from(participant.total_time).map_err(|_| out_of_range("total_time"))?;
        let result = sqlx::query(
            "UPDATE participants SET nickname = $1, score = $2, total_time = $3 WHERE id = $4",
        )
        .bind(&participant.nickname)
        .bind(participant.score)
        .bind(total_time)
        .bind(participant.id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to save participant {}: {:?}", participant.id, e);
            AppError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Participant not found".to_string()));
        }
        Ok(())
    }

    async fn delete_participant(&self, participant: &Participant) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM participants WHERE id = $1")
            .bind(participant.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Participant not found".to_string()));
        }
        Ok(())
    }

    async fn list_participants_by_quiz(&self, quiz_id: i64) -> Result<Vec<Participant>, AppError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {} FROM participants WHERE quiz_id = $1 ORDER BY id",
            PARTICIPANT_COLUMNS
        ))
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Participant::try_from).collect()
    }
}
