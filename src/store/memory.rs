// src/store/memory.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::QuizStore;
use crate::{
    error::AppError,
    models::{
        participant::{NewParticipant, Participant},
        question::{NewQuestion, Question},
        quiz::{NewQuiz, Quiz, QuizStatus},
    },
};

#[derive(Debug, Default)]
struct Tables {
    quizzes: HashMap<i64, Quiz>,
    participants: BTreeMap<i64, Participant>,
    next_quiz_id: i64,
    next_question_id: i64,
    next_participant_id: i64,
}

/// Process-local record store. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store poisoned".to_string()))
    }
}

fn quiz_not_found() -> AppError {
    AppError::NotFound("Quiz not found".to_string())
}

fn participant_not_found() -> AppError {
    AppError::NotFound("Participant not found".to_string())
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
        let mut tables = self.tables()?;
        if tables.quizzes.values().any(|q| q.room_code == quiz.room_code) {
            return Err(AppError::InvalidState(format!(
                "Room code '{}' is already in use",
                quiz.room_code
            )));
        }
        tables.next_quiz_id += 1;
        let now = chrono::Utc::now();
        let created = Quiz {
            id: tables.next_quiz_id,
            host_id: quiz.host_id,
            title: quiz.title,
            description: quiz.description,
            room_code: quiz.room_code,
            max_participants: quiz.max_participants,
            status: QuizStatus::Created,
            current_question_index: None,
            questions: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.quizzes.insert(created.id, created.clone());
        Ok(created)
    }

    async fn load_quiz(&self, id: i64) -> Result<Quiz, AppError> {
        self.tables()?
            .quizzes
            .get(&id)
            .cloned()
            .ok_or_else(quiz_not_found)
    }

    async fn load_quiz_by_room_code(&self, room_code: &str) -> Result<Quiz, AppError> {
        self.tables()?
            .quizzes
            .values()
            .find(|quiz| quiz.room_code == room_code)
            .cloned()
            .ok_or_else(quiz_not_found)
    }

    async fn save_quiz(&self, quiz: &Quiz) -> Result<(), AppError> {
        let mut tables = self.tables()?;
        let stored = tables.quizzes.get_mut(&quiz.id).ok_or_else(quiz_not_found)?;
        // Questions are owned by add_question; keep the stored list.
        let questions = std::mem::take(&mut stored.questions);
        *stored = Quiz {
            questions,
            updated_at: chrono::Utc::now(),
            ..quiz.clone()
        };
        Ok(())
    }

    async fn add_question(&self, quiz_id: i64, question: NewQuestion) -> Result<Question, AppError> {
        let mut tables = self.tables()?;
        tables.next_question_id += 1;
        let id = tables.next_question_id;
        let quiz = tables.quizzes.get_mut(&quiz_id).ok_or_else(quiz_not_found)?;
        let created = Question {
            id,
            quiz_id,
            text: question.text,
            options: question.options,
            correct_option_indices: question.correct_option_indices,
            duration: question.duration,
            points: question.points,
        };
        quiz.questions.push(created.clone());
        Ok(created)
    }

    async fn create_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<Participant, AppError> {
        let mut tables = self.tables()?;
        if !tables.quizzes.contains_key(&participant.quiz_id) {
            return Err(quiz_not_found());
        }
        let taken = tables
            .participants
            .values()
            .any(|p| p.quiz_id == participant.quiz_id && p.nickname == participant.nickname);
        if taken {
            return Err(AppError::Capacity("Nickname is already taken".to_string()));
        }
        tables.next_participant_id += 1;
        let created = Participant {
            id: tables.next_participant_id,
            quiz_id: participant.quiz_id,
            nickname: participant.nickname,
            score: 0,
            total_time: 0,
            token: participant.token,
        };
        tables.participants.insert(created.id, created.clone());
        Ok(created)
    }

    async fn load_participant(&self, id: i64) -> Result<Participant, AppError> {
        self.tables()?
            .participants
            .get(&id)
            .cloned()
            .ok_or_else(participant_not_found)
    }

    async fn save_participant(&self, participant: &Participant) -> Result<(), AppError> {
        let mut tables = self.tables()?;
        let stored = tables
            .participants
            .get_mut(&participant.id)
            .ok_or_else(participant_not_found)?;
        *stored = participant.clone();
        Ok(())
    }

    async fn delete_participant(&self, participant: &Participant) -> Result<(), AppError> {
        self.tables()?
            .participants
            .remove(&participant.id)
            .map(|_| ())
            .ok_or_else(participant_not_found)
    }

    async fn list_participants_by_quiz(&self, quiz_id: i64) -> Result<Vec<Participant>, AppError> {
        Ok(self
            .tables()?
            .participants
            .values()
            .filter(|p| p.quiz_id == quiz_id)
            .cloned()
            .collect())
    }
}
