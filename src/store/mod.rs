// src/store/mod.rs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        participant::{NewParticipant, Participant},
        question::{NewQuestion, Question},
        quiz::{NewQuiz, Quiz},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Durable record store for quizzes, questions and participants.
///
/// Every lookup of a missing row fails with `AppError::NotFound`.
/// Callers serialize read-modify-write cycles per quiz (see `QuizLocks`).
#[async_trait]
pub trait QuizStore: Send + Sync {
    /// Fails with `AppError::InvalidState` if another quiz holds the room code.
    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError>;

    /// Loads a quiz with its questions in play order.
    async fn load_quiz(&self, id: i64) -> Result<Quiz, AppError>;

    async fn load_quiz_by_room_code(&self, room_code: &str) -> Result<Quiz, AppError>;

    /// Persists the quiz's own columns (status, current index, ...).
    /// Questions are written through `add_question`.
    async fn save_quiz(&self, quiz: &Quiz) -> Result<(), AppError>;

    /// Appends a question to the end of the quiz.
    async fn add_question(&self, quiz_id: i64, question: NewQuestion) -> Result<Question, AppError>;

    async fn create_participant(&self, participant: NewParticipant)
    -> Result<Participant, AppError>;

    async fn load_participant(&self, id: i64) -> Result<Participant, AppError>;

    async fn save_participant(&self, participant: &Participant) -> Result<(), AppError>;

    async fn delete_participant(&self, participant: &Participant) -> Result<(), AppError>;

    /// Participants of a quiz in join order.
    async fn list_participants_by_quiz(&self, quiz_id: i64) -> Result<Vec<Participant>, AppError>;
}
