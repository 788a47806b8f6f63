// src/engine/session.rs

use std::sync::{Arc, Weak};

use rand::Rng;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use validator::Validate;

use super::{
    locks::QuizLocks,
    ranking,
    scoring,
    timer::{Expiry, TimerScheduler},
    timing::TimingTracker,
};
use crate::{
    broadcast::{Publisher, publish_or_log},
    config::{Config, ROOM_CODE_ATTEMPTS, ROOM_CODE_MAX, ROOM_CODE_MIN},
    error::AppError,
    models::{
        answer::{AnswerResult, AnswerSubmission},
        event::RoomEvent,
        leaderboard::{Leaderboard, Standing},
        participant::{JoinResponse, NewParticipant, Participant, ParticipantView},
        question::{CreateQuestionRequest, NewQuestion, PublicQuestion, Question},
        quiz::{CreateQuizRequest, NewQuiz, Quiz, QuizStatus, QuizSummary},
    },
    store::QuizStore,
    utils::{
        html::{clean_html, clean_required},
        jwt::CredentialService,
    },
};

/// Drives quiz sessions through `CREATED -> WAITING -> STARTED -> FINISHED`.
///
/// Every mutating operation runs inside the quiz's unit of work
/// ([`QuizLocks`]): load, validate status, mutate, save, then broadcast.
/// Broadcasts never roll back a saved transition.
pub struct SessionEngine {
    store: Arc<dyn QuizStore>,
    credentials: Arc<dyn CredentialService>,
    publisher: Arc<dyn Publisher>,
    scheduler: TimerScheduler,
    timing: TimingTracker,
    locks: QuizLocks,
    default_max_participants: u32,
}

impl SessionEngine {
    /// Builds the engine and starts the task that turns timer expiries into
    /// question timeouts. Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<dyn QuizStore>,
        credentials: Arc<dyn CredentialService>,
        publisher: Arc<dyn Publisher>,
        config: &Config,
    ) -> Arc<Self> {
        let (scheduler, expiries) = TimerScheduler::new(publisher.clone(), config.tick_interval);
        let engine = Arc::new(Self {
            store,
            credentials,
            publisher,
            scheduler,
            timing: TimingTracker::new(),
            locks: QuizLocks::new(),
            default_max_participants: config.default_max_participants,
        });

        tokio::spawn(listen_for_expiries(Arc::downgrade(&engine), expiries));
        engine
    }

    // ---------------------------------------------------------------------
    // Host setup
    // ---------------------------------------------------------------------

    pub async fn create_quiz(
        &self,
        host_id: i64,
        req: CreateQuizRequest,
    ) -> Result<QuizSummary, AppError> {
        req.validate()?;

        let title = clean_required("Title", &req.title)?;
        let description = req
            .description
            .as_deref()
            .map(clean_html)
            .filter(|d| !d.is_empty());
        let max_participants = req
            .max_participants
            .unwrap_or(self.default_max_participants);

        // The store's unique room code is authoritative; a collision means draw again.
        for attempt in 1..=ROOM_CODE_ATTEMPTS {
            let created = self
                .store
                .create_quiz(NewQuiz {
                    host_id,
                    title: title.clone(),
                    description: description.clone(),
                    room_code: generate_room_code(),
                    max_participants,
                })
                .await;

            match created {
                Ok(quiz) => {
                    tracing::info!(quiz = quiz.id, room = %quiz.room_code, host = host_id, "quiz created");
                    return Ok(quiz.summary());
                }
                Err(AppError::InvalidState(reason)) => {
                    tracing::debug!(attempt, "room code collision: {}", reason);
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::InternalServerError(
            "Could not allocate a free room code".to_string(),
        ))
    }

    pub async fn add_question(
        &self,
        quiz_id: i64,
        host_id: i64,
        req: CreateQuestionRequest,
    ) -> Result<Question, AppError> {
        req.validate()?;

        let option_count = req.options.len();
        if let Some(bad) = req
            .correct_option_indices
            .iter()
            .find(|&&idx| idx as usize >= option_count)
        {
            return Err(AppError::BadRequest(format!(
                "Correct option index {} is out of range for {} options",
                bad, option_count
            )));
        }
        let mut correct_option_indices = req.correct_option_indices;
        correct_option_indices.sort_unstable();
        correct_option_indices.dedup();

        let text = clean_required("Question text", &req.text)?;
        let options = req.options.iter().map(|opt| clean_html(opt)).collect();

        let _guard = self.locks.acquire(quiz_id).await;
        let quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        if !matches!(quiz.status, QuizStatus::Created | QuizStatus::Waiting) {
            return Err(AppError::InvalidState(
                "Questions can only be added before the quiz starts".to_string(),
            ));
        }

        self.store
            .add_question(
                quiz_id,
                NewQuestion {
                    text,
                    options,
                    correct_option_indices,
                    duration: req.duration,
                    points: req.points,
                },
            )
            .await
    }

    /// `CREATED -> WAITING`: the room starts accepting participants.
    pub async fn open_quiz(&self, quiz_id: i64, host_id: i64) -> Result<QuizSummary, AppError> {
        let _guard = self.locks.acquire(quiz_id).await;
        let mut quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        ensure_status(&quiz, QuizStatus::Created, "open")?;

        quiz.status = QuizStatus::Waiting;
        self.store.save_quiz(&quiz).await?;

        tracing::info!(quiz = quiz.id, room = %quiz.room_code, "quiz open for joining");
        Ok(quiz.summary())
    }

    // ---------------------------------------------------------------------
    // Participants
    // ---------------------------------------------------------------------

    pub async fn join(&self, room_code: &str, nickname: &str) -> Result<JoinResponse, AppError> {
        let nickname = clean_required("Nickname", nickname)?;
        let quiz_id = self.store.load_quiz_by_room_code(room_code).await?.id;

        let _guard = self.locks.acquire(quiz_id).await;
        // Capacity and nickname are checked against the state seen under the lock.
        let quiz = self.store.load_quiz(quiz_id).await?;
        if quiz.status != QuizStatus::Waiting {
            return Err(AppError::InvalidState(format!(
                "Quiz is {} and not accepting participants",
                quiz.status
            )));
        }

        let participants = self.store.list_participants_by_quiz(quiz.id).await?;
        if participants.len() >= quiz.max_participants as usize {
            return Err(AppError::Capacity("Quiz is full".to_string()));
        }
        if participants.iter().any(|p| p.nickname == nickname) {
            return Err(AppError::Capacity("Nickname is already taken".to_string()));
        }

        let token = self.credentials.issue_participant_token(quiz.id, &nickname)?;
        let participant = self
            .store
            .create_participant(NewParticipant {
                quiz_id: quiz.id,
                nickname,
                token: token.clone(),
            })
            .await?;

        tracing::info!(
            quiz = quiz.id,
            room = %quiz.room_code,
            participant = participant.id,
            "participant joined"
        );
        self.publish(
            &quiz.room_code,
            RoomEvent::ParticipantJoined(participant.view(&quiz.room_code)),
        );

        Ok(JoinResponse {
            token,
            participant_id: participant.id,
            quiz_id: quiz.id,
        })
    }

    /// A participant leaves on their own, identified by the token issued on
    /// join. Not allowed while questions are in play.
    pub async fn leave(&self, room_code: &str, token: &str) -> Result<(), AppError> {
        let quiz_id = self.store.load_quiz_by_room_code(room_code).await?.id;

        let _guard = self.locks.acquire(quiz_id).await;
        let quiz = self.store.load_quiz(quiz_id).await?;
        if quiz.status == QuizStatus::Started {
            return Err(AppError::InvalidState(
                "Cannot leave a quiz in progress".to_string(),
            ));
        }

        let participant = self.find_participant(quiz.id, token).await?.ok_or(
            AppError::Unauthorized("Token does not belong to this quiz".to_string()),
        )?;
        self.store.delete_participant(&participant).await?;

        tracing::info!(quiz = quiz.id, participant = participant.id, "participant left");
        self.publish(
            &quiz.room_code,
            RoomEvent::ParticipantLeft(participant.view(&quiz.room_code)),
        );
        Ok(())
    }

    /// Host eviction, only while the room is waiting.
    pub async fn remove_participant(
        &self,
        quiz_id: i64,
        participant_id: i64,
        host_id: i64,
    ) -> Result<(), AppError> {
        let _guard = self.locks.acquire(quiz_id).await;
        let quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        ensure_status(&quiz, QuizStatus::Waiting, "remove participants from")?;

        let participant = self.store.load_participant(participant_id).await?;
        if participant.quiz_id != quiz.id {
            return Err(AppError::NotFound(
                "Participant not found in this quiz".to_string(),
            ));
        }
        self.store.delete_participant(&participant).await?;

        tracing::info!(quiz = quiz.id, participant = participant.id, "participant removed by host");
        self.publish(
            &quiz.room_code,
            RoomEvent::ParticipantLeft(participant.view(&quiz.room_code)),
        );
        Ok(())
    }

    /// Removes every participant and sends the quiz back to `CREATED` so it can
    /// be run again. Returns how many participants were removed.
    pub async fn reset_participants(&self, quiz_id: i64, host_id: i64) -> Result<usize, AppError> {
        let _guard = self.locks.acquire(quiz_id).await;
        let mut quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        if quiz.status == QuizStatus::Started {
            return Err(AppError::InvalidState(
                "Cannot reset a quiz in progress".to_string(),
            ));
        }

        let participants = self.store.list_participants_by_quiz(quiz.id).await?;
        for participant in &participants {
            self.store.delete_participant(participant).await?;
        }

        quiz.status = QuizStatus::Created;
        quiz.current_question_index = None;
        self.store.save_quiz(&quiz).await?;

        self.scheduler.disarm(&quiz.room_code);
        self.timing.clear(&quiz.room_code);

        tracing::info!(quiz = quiz.id, removed = participants.len(), "quiz reset");
        for participant in &participants {
            self.publish(
                &quiz.room_code,
                RoomEvent::ParticipantLeft(participant.view(&quiz.room_code)),
            );
        }
        Ok(participants.len())
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// `WAITING -> STARTED` at question 0. Broadcasts `QUIZ_STARTED` then
    /// the first `NEW_QUESTION`.
    pub async fn start(&self, quiz_id: i64, host_id: i64) -> Result<QuizSummary, AppError> {
        let _guard = self.locks.acquire(quiz_id).await;
        let mut quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        ensure_status(&quiz, QuizStatus::Waiting, "start")?;

        if quiz.questions.is_empty() {
            return Err(AppError::InvalidState("Quiz has no questions".to_string()));
        }
        let participants = self.store.list_participants_by_quiz(quiz.id).await?;
        if participants.is_empty() {
            return Err(AppError::InvalidState(
                "Cannot start a quiz without participants".to_string(),
            ));
        }

        quiz.status = QuizStatus::Started;
        quiz.current_question_index = Some(0);
        self.store.save_quiz(&quiz).await?;

        tracing::info!(
            quiz = quiz.id,
            room = %quiz.room_code,
            participants = participants.len(),
            "quiz started"
        );
        self.timing.clear(&quiz.room_code);
        self.publish(&quiz.room_code, RoomEvent::QuizStarted);
        self.begin_current_question(&quiz)?;

        Ok(quiz.summary())
    }

    /// Moves to the following question and restarts the countdown.
    ///
    /// Past the last question the quiz is finished (with the final
    /// leaderboard broadcast) and `NoMoreQuestions` is returned.
    pub async fn next_question(
        &self,
        quiz_id: i64,
        host_id: i64,
    ) -> Result<PublicQuestion, AppError> {
        let _guard = self.locks.acquire(quiz_id).await;
        let mut quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        ensure_status(&quiz, QuizStatus::Started, "advance")?;

        if !quiz.advance_to_next_question() {
            quiz.status = QuizStatus::Finished;
            self.store.save_quiz(&quiz).await?;
            tracing::info!(quiz = quiz.id, room = %quiz.room_code, "ran out of questions");
            if let Err(e) = self.finish(&quiz).await {
                tracing::error!(quiz = quiz.id, "final leaderboard failed: {}", e);
            }
            return Err(AppError::NoMoreQuestions);
        }

        self.store.save_quiz(&quiz).await?;
        self.begin_current_question(&quiz)
    }

    /// `STARTED -> FINISHED`. Broadcasts `QUIZ_ENDED` then the final leaderboard.
    pub async fn end(&self, quiz_id: i64, host_id: i64) -> Result<Leaderboard, AppError> {
        let _guard = self.locks.acquire(quiz_id).await;
        let mut quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        ensure_status(&quiz, QuizStatus::Started, "end")?;

        quiz.status = QuizStatus::Finished;
        self.store.save_quiz(&quiz).await?;

        tracing::info!(quiz = quiz.id, room = %quiz.room_code, "quiz ended by host");
        self.finish(&quiz).await
    }

    /// Runs when a room's countdown reaches zero.
    ///
    /// Broadcasts `QUESTION_ENDED` then a non-final leaderboard, exactly once
    /// per expired timer. An expiry whose timer has since been replaced or
    /// cancelled is dropped, as is one for a quiz that is no longer running.
    pub async fn handle_question_timeout(
        &self,
        room_code: &str,
        epoch: u64,
    ) -> Result<(), AppError> {
        let quiz_id = self.store.load_quiz_by_room_code(room_code).await?.id;

        let _guard = self.locks.acquire(quiz_id).await;
        if !self.scheduler.is_latest(room_code, epoch) {
            tracing::debug!(room = %room_code, epoch, "stale expiry ignored");
            return Ok(());
        }

        let quiz = self.store.load_quiz(quiz_id).await?;
        if quiz.status != QuizStatus::Started {
            return Ok(());
        }

        tracing::info!(
            quiz = quiz.id,
            room = %room_code,
            question = ?quiz.current_question_index,
            "question timed out"
        );
        self.publish(room_code, RoomEvent::QuestionEnded);
        let leaderboard = self.build_leaderboard(&quiz, false).await?;
        self.publish(room_code, RoomEvent::LeaderboardUpdate(leaderboard));
        Ok(())
    }

    async fn on_expiry(&self, expiry: Expiry) {
        if let Err(e) = self
            .handle_question_timeout(&expiry.room_code, expiry.epoch)
            .await
        {
            tracing::error!(
                room = %expiry.room_code,
                epoch = expiry.epoch,
                "question timeout failed, quiz left running: {}",
                e
            );
        }
    }

    // ---------------------------------------------------------------------
    // Answers
    // ---------------------------------------------------------------------

    /// Scores an answer to the current question for the participant holding
    /// `token`. At most one answer per participant per question is scored;
    /// nothing is scored once the question's countdown has run out.
    pub async fn submit_answer(
        &self,
        quiz_id: i64,
        token: &str,
        submission: AnswerSubmission,
    ) -> Result<AnswerResult, AppError> {
        submission.validate()?;

        let _guard = self.locks.acquire(quiz_id).await;
        let quiz = self.store.load_quiz(quiz_id).await?;
        if quiz.status != QuizStatus::Started {
            return Err(AppError::InvalidSubmission(
                "Quiz is not in progress".to_string(),
            ));
        }
        let question = quiz
            .current_question()
            .ok_or(AppError::InvalidSubmission(
                "No question is active".to_string(),
            ))?;
        if question.id != submission.question_id {
            return Err(AppError::InvalidSubmission(
                "Question is not the current question".to_string(),
            ));
        }

        let mut participant = self.find_participant(quiz.id, token).await?.ok_or(
            AppError::InvalidSubmission("Participant does not belong to this quiz".to_string()),
        )?;

        let room = quiz.room_code.as_str();
        if !self.scheduler.is_armed(room) {
            return Err(AppError::InvalidSubmission(
                "Time is up for this question".to_string(),
            ));
        }
        if self.timing.has_answered(room, participant.id) {
            return Err(AppError::InvalidSubmission(
                "Question already answered".to_string(),
            ));
        }

        let correct = question.correct_set();
        let outcome = scoring::score(&correct, &submission.selected_option_indices, question.points);

        let elapsed = self.timing.exact_elapsed(room);
        self.timing
            .record_answer(room, participant.id, i64::from(elapsed));

        // Persisted so the total outlives the room's ledger.
        participant.score += i64::from(outcome.points);
        participant.total_time = self.timing.total_time(room, participant.id);
        self.store.save_participant(&participant).await?;

        tracing::debug!(
            quiz = quiz.id,
            participant = participant.id,
            question = question.id,
            points = outcome.points,
            elapsed,
            "answer scored"
        );

        Ok(AnswerResult {
            correct: outcome.fully_correct,
            points_awarded: outcome.points,
            total_score: participant.score,
            message: scoring::feedback(&outcome, correct.len()),
            correct_option_indices: correct.into_iter().collect(),
        })
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn status(&self, quiz_id: i64) -> Result<QuizSummary, AppError> {
        Ok(self.store.load_quiz(quiz_id).await?.summary())
    }

    /// The active question without its answer key.
    pub async fn current_question(&self, quiz_id: i64) -> Result<PublicQuestion, AppError> {
        let quiz = self.store.load_quiz(quiz_id).await?;
        if quiz.status != QuizStatus::Started {
            return Err(AppError::InvalidState("Quiz is not in progress".to_string()));
        }
        quiz.current_question()
            .map(Question::to_public)
            .ok_or(AppError::NotFound("No active question".to_string()))
    }

    /// Full quiz with answer keys, for its host.
    pub async fn quiz_for_host(&self, quiz_id: i64, host_id: i64) -> Result<Quiz, AppError> {
        let quiz = self.store.load_quiz(quiz_id).await?;
        ensure_host(&quiz, host_id)?;
        Ok(quiz)
    }

    pub async fn participants(&self, quiz_id: i64) -> Result<Vec<ParticipantView>, AppError> {
        let quiz = self.store.load_quiz(quiz_id).await?;
        Ok(self
            .store
            .list_participants_by_quiz(quiz.id)
            .await?
            .iter()
            .map(|p| p.view(&quiz.room_code))
            .collect())
    }

    /// On-demand leaderboard. Final once the quiz has finished.
    pub async fn leaderboard(&self, quiz_id: i64) -> Result<Leaderboard, AppError> {
        let quiz = self.store.load_quiz(quiz_id).await?;
        let is_final = quiz.status == QuizStatus::Finished;
        self.build_leaderboard(&quiz, is_final).await
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn publish(&self, room_code: &str, event: RoomEvent) {
        publish_or_log(self.publisher.as_ref(), room_code, event);
    }

    /// Resets the timing window, arms the countdown and announces the question.
    fn begin_current_question(&self, quiz: &Quiz) -> Result<PublicQuestion, AppError> {
        let question = quiz
            .current_question()
            .ok_or(AppError::InternalServerError(
                "current question index out of range".to_string(),
            ))?;

        self.timing
            .question_started(&quiz.room_code, Instant::now(), question.duration);
        self.scheduler.arm(&quiz.room_code, question.duration);

        let public = question.to_public();
        self.publish(&quiz.room_code, RoomEvent::NewQuestion(public.clone()));
        Ok(public)
    }

    /// Tears the room down after the quiz has been saved as finished.
    async fn finish(&self, quiz: &Quiz) -> Result<Leaderboard, AppError> {
        self.scheduler.disarm(&quiz.room_code);
        self.publish(&quiz.room_code, RoomEvent::QuizEnded);

        self.timing.clear(&quiz.room_code);

        let leaderboard = self.build_leaderboard(quiz, true).await?;
        self.publish(
            &quiz.room_code,
            RoomEvent::LeaderboardUpdate(leaderboard.clone()),
        );
        Ok(leaderboard)
    }

    async fn build_leaderboard(&self, quiz: &Quiz, is_final: bool) -> Result<Leaderboard, AppError> {
        let standings = self
            .store
            .list_participants_by_quiz(quiz.id)
            .await?
            .into_iter()
            .map(|p| Standing {
                total_time: p.total_time,
                participant_id: p.id,
                nickname: p.nickname,
                score: p.score,
            })
            .collect();

        Ok(Leaderboard {
            entries: ranking::rank(standings),
            is_final,
        })
    }

    /// The quiz's participant that was issued `token` on join.
    async fn find_participant(
        &self,
        quiz_id: i64,
        token: &str,
    ) -> Result<Option<Participant>, AppError> {
        Ok(self
            .store
            .list_participants_by_quiz(quiz_id)
            .await?
            .into_iter()
            .find(|p| p.token == token))
    }
}

async fn listen_for_expiries(engine: Weak<SessionEngine>, mut expiries: UnboundedReceiver<Expiry>) {
    while let Some(expiry) = expiries.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        // One task per expiry so a slow store never delays other rooms.
        tokio::spawn(async move { engine.on_expiry(expiry).await });
    }
    tracing::debug!("expiry listener stopped");
}

fn generate_room_code() -> String {
    rand::rng()
        .random_range(ROOM_CODE_MIN..ROOM_CODE_MAX)
        .to_string()
}

fn ensure_host(quiz: &Quiz, host_id: i64) -> Result<(), AppError> {
    if !quiz.is_host(host_id) {
        return Err(AppError::Unauthorized(
            "Only the quiz host can do this".to_string(),
        ));
    }
    Ok(())
}

fn ensure_status(quiz: &Quiz, expected: QuizStatus, action: &str) -> Result<(), AppError> {
    if quiz.status != expected {
        return Err(AppError::InvalidState(format!(
            "Cannot {} a quiz that is {}",
            action, quiz.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::broadcast::testing::{FailingPublisher, RecordingPublisher};
    use crate::store::MemoryStore;
    use crate::utils::jwt::JwtCredentials;

    const HOST: i64 = 1;

    struct Fixture {
        engine: Arc<SessionEngine>,
        publisher: Arc<RecordingPublisher>,
    }

    /// Memory store with switchable faults.
    #[derive(Default)]
    struct FaultyStore {
        inner: MemoryStore,
        /// Participant listing fails for this quiz id (0 = never).
        broken_quiz: AtomicI64,
        /// The next N quiz inserts report a taken room code.
        code_collisions: AtomicUsize,
    }

    #[async_trait]
    impl QuizStore for FaultyStore {
        async fn create_quiz(&self, quiz: NewQuiz) -> Result<Quiz, AppError> {
            let collide = self
                .code_collisions
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if collide {
                return Err(AppError::InvalidState("Room code already in use".to_string()));
            }
            self.inner.create_quiz(quiz).await
        }

        async fn load_quiz(&self, id: i64) -> Result<Quiz, AppError> {
            self.inner.load_quiz(id).await
        }

        async fn load_quiz_by_room_code(&self, room_code: &str) -> Result<Quiz, AppError> {
            self.inner.load_quiz_by_room_code(room_code).await
        }

        async fn save_quiz(&self, quiz: &Quiz) -> Result<(), AppError> {
            self.inner.save_quiz(quiz).await
        }

        async fn add_question(
            &self,
            quiz_id: i64,
            question: NewQuestion,
        ) -> Result<Question, AppError> {
            self.inner.add_question(quiz_id, question).await
        }

        async fn create_participant(
            &self,
            participant: NewParticipant,
        ) -> Result<Participant, AppError> {
            self.inner.create_participant(participant).await
        }

        async fn load_participant(&self, id: i64) -> Result<Participant, AppError> {
            self.inner.load_participant(id).await
        }

        async fn save_participant(&self, participant: &Participant) -> Result<(), AppError> {
            self.inner.save_participant(participant).await
        }

        async fn delete_participant(&self, participant: &Participant) -> Result<(), AppError> {
            self.inner.delete_participant(participant).await
        }

        async fn list_participants_by_quiz(
            &self,
            quiz_id: i64,
        ) -> Result<Vec<Participant>, AppError> {
            if self.broken_quiz.load(Ordering::SeqCst) == quiz_id {
                return Err(AppError::InternalServerError(
                    "participants table unavailable".to_string(),
                ));
            }
            self.inner.list_participants_by_quiz(quiz_id).await
        }
    }

    fn engine_with_store(
        store: Arc<dyn QuizStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Arc<SessionEngine> {
        let config = Config::for_tests();
        SessionEngine::new(
            store,
            Arc::new(JwtCredentials::from_config(&config)),
            publisher,
            &config,
        )
    }

    fn engine_with(publisher: Arc<dyn Publisher>) -> Arc<SessionEngine> {
        engine_with_store(Arc::new(MemoryStore::new()), publisher)
    }

    fn fixture() -> Fixture {
        let publisher = Arc::new(RecordingPublisher::default());
        Fixture {
            engine: engine_with(publisher.clone()),
            publisher,
        }
    }

    fn question(duration: u32, points: u32, correct: Vec<u32>) -> CreateQuestionRequest {
        CreateQuestionRequest {
            text: "Pick wisely".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option_indices: correct,
            duration,
            points,
        }
    }

    /// A WAITING quiz with the given questions.
    async fn waiting_quiz(
        engine: &SessionEngine,
        max_participants: u32,
        questions: Vec<CreateQuestionRequest>,
    ) -> QuizSummary {
        let quiz = engine
            .create_quiz(
                HOST,
                CreateQuizRequest {
                    title: "Rivers of Europe".to_string(),
                    description: None,
                    max_participants: Some(max_participants),
                },
            )
            .await
            .unwrap();
        for q in questions {
            engine.add_question(quiz.id, HOST, q).await.unwrap();
        }
        engine.open_quiz(quiz.id, HOST).await.unwrap()
    }

    fn kinds(events: &[RoomEvent]) -> Vec<&'static str> {
        events.iter().map(RoomEvent::kind).collect()
    }

    fn current_question_id(quiz: &Quiz) -> i64 {
        quiz.current_question().unwrap().id
    }

    fn standings(board: &Leaderboard) -> Vec<(&str, u32, u32)> {
        board
            .entries
            .iter()
            .map(|e| (e.nickname.as_str(), e.total_time, e.rank))
            .collect()
    }

    #[tokio::test]
    async fn start_goes_to_first_question_and_announces_in_order() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        fx.engine.join(&quiz.room_code, "ada").await.unwrap();

        let started = fx.engine.start(quiz.id, HOST).await.unwrap();
        assert_eq!(started.status, QuizStatus::Started);
        assert_eq!(started.current_question_index, Some(0));

        assert_eq!(
            kinds(&fx.publisher.lifecycle_for(&quiz.room_code)),
            vec!["PARTICIPANT_JOINED", "QUIZ_STARTED", "NEW_QUESTION"]
        );
        assert!(fx.engine.scheduler.is_armed(&quiz.room_code));
    }

    #[tokio::test]
    async fn start_requires_participants_and_questions() {
        let fx = fixture();
        let empty = waiting_quiz(&fx.engine, 10, vec![]).await;
        fx.engine.join(&empty.room_code, "ada").await.unwrap();
        assert!(matches!(
            fx.engine.start(empty.id, HOST).await,
            Err(AppError::InvalidState(_))
        ));

        let lonely = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        assert!(matches!(
            fx.engine.start(lonely.id, HOST).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn only_the_host_drives_the_quiz() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        fx.engine.join(&quiz.room_code, "ada").await.unwrap();

        assert!(matches!(
            fx.engine.start(quiz.id, HOST + 1).await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            fx.engine.start(999, HOST).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn advancing_past_last_question_finishes_the_quiz() {
        let fx = fixture();
        let quiz = waiting_quiz(
            &fx.engine,
            10,
            vec![question(10, 100, vec![0]), question(10, 100, vec![1])],
        )
        .await;
        fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();

        fx.engine.next_question(quiz.id, HOST).await.unwrap();
        assert_eq!(
            fx.engine.status(quiz.id).await.unwrap().current_question_index,
            Some(1)
        );

        let result = fx.engine.next_question(quiz.id, HOST).await;
        assert_eq!(result, Err(AppError::NoMoreQuestions));

        let status = fx.engine.status(quiz.id).await.unwrap();
        assert_eq!(status.status, QuizStatus::Finished);
        assert!(!fx.engine.scheduler.is_armed(&quiz.room_code));
        assert_eq!(fx.engine.timing.tracked_rooms(), 0);

        let events = fx.publisher.lifecycle_for(&quiz.room_code);
        let tail = kinds(&events[events.len() - 2..]);
        assert_eq!(tail, vec!["QUIZ_ENDED", "LEADERBOARD_UPDATE"]);
        assert!(matches!(
            events.last(),
            Some(RoomEvent::LeaderboardUpdate(Leaderboard { is_final: true, .. }))
        ));
    }

    #[tokio::test]
    async fn end_broadcasts_final_leaderboard() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        fx.engine.join(&quiz.room_code, "bo").await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();

        let board = fx.engine.end(quiz.id, HOST).await.unwrap();
        assert!(board.is_final);
        assert_eq!(board.entries.len(), 2);
        assert!(board.entries.iter().all(|e| e.rank == 1));

        assert!(matches!(
            fx.engine.end(quiz.id, HOST).await,
            Err(AppError::InvalidState(_))
        ));
        assert!(fx.engine.leaderboard(quiz.id).await.unwrap().is_final);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_joins_respect_capacity() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 1, vec![question(10, 100, vec![0])]).await;

        let first = {
            let engine = Arc::clone(&fx.engine);
            let room = quiz.room_code.clone();
            tokio::spawn(async move { engine.join(&room, "ada").await })
        };
        let second = {
            let engine = Arc::clone(&fx.engine);
            let room = quiz.room_code.clone();
            tokio::spawn(async move { engine.join(&room, "bo").await })
        };

        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(AppError::Capacity(_))))
                .count(),
            1
        );
        assert_eq!(fx.engine.participants(quiz.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn join_checks_status_and_nickname() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;

        fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        assert!(matches!(
            fx.engine.join(&quiz.room_code, "ada").await,
            Err(AppError::Capacity(_))
        ));
        assert!(matches!(
            fx.engine.join("000000", "ada").await,
            Err(AppError::NotFound(_))
        ));

        fx.engine.start(quiz.id, HOST).await.unwrap();
        assert!(matches!(
            fx.engine.join(&quiz.room_code, "late").await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn leave_is_refused_while_started() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        let ada = fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        let bo = fx.engine.join(&quiz.room_code, "bo").await.unwrap();

        fx.engine.leave(&quiz.room_code, &bo.token).await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();
        assert!(matches!(
            fx.engine.leave(&quiz.room_code, &ada.token).await,
            Err(AppError::InvalidState(_))
        ));

        let left = fx
            .publisher
            .lifecycle_for(&quiz.room_code)
            .into_iter()
            .filter(|e| matches!(e, RoomEvent::ParticipantLeft(_)))
            .count();
        assert_eq!(left, 1);
    }

    #[tokio::test]
    async fn host_removes_participants_only_while_waiting() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        let ada = fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        let bo = fx.engine.join(&quiz.room_code, "bo").await.unwrap();

        fx.engine
            .remove_participant(quiz.id, bo.participant_id, HOST)
            .await
            .unwrap();
        assert!(matches!(
            fx.engine
                .remove_participant(quiz.id, bo.participant_id, HOST)
                .await,
            Err(AppError::NotFound(_))
        ));

        fx.engine.start(quiz.id, HOST).await.unwrap();
        assert!(matches!(
            fx.engine
                .remove_participant(quiz.id, ada.participant_id, HOST)
                .await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn reset_returns_quiz_to_created() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 100, vec![0])]).await;
        fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        fx.engine.join(&quiz.room_code, "bo").await.unwrap();

        let removed = fx.engine.reset_participants(quiz.id, HOST).await.unwrap();
        assert_eq!(removed, 2);

        let status = fx.engine.status(quiz.id).await.unwrap();
        assert_eq!(status.status, QuizStatus::Created);
        assert_eq!(status.current_question_index, None);
        assert!(fx.engine.participants(quiz.id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn answers_are_scored_once_per_question() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 10, vec![0, 2])]).await;
        let ada = fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();

        let full = fx.engine.store.load_quiz(quiz.id).await.unwrap();
        let submission = |selected: Vec<u32>| AnswerSubmission {
            question_id: current_question_id(&full),
            selected_option_indices: selected,
        };

        let result = fx
            .engine
            .submit_answer(quiz.id, &ada.token, submission(vec![0]))
            .await
            .unwrap();
        assert!(!result.correct);
        assert_eq!(result.points_awarded, 5);
        assert_eq!(result.total_score, 5);
        assert_eq!(result.correct_option_indices, vec![0, 2]);

        let again = fx
            .engine
            .submit_answer(quiz.id, &ada.token, submission(vec![0, 2]))
            .await;
        assert!(matches!(again, Err(AppError::InvalidSubmission(_))));

        let board = fx.engine.leaderboard(quiz.id).await.unwrap();
        assert_eq!(board.entries[0].score, 5);
        assert!(!board.is_final);
    }

    #[tokio::test(start_paused = true)]
    async fn submissions_are_validated_against_the_room() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 10, vec![1])]).await;
        let ada = fx.engine.join(&quiz.room_code, "ada").await.unwrap();

        let early = fx
            .engine
            .submit_answer(
                quiz.id,
                &ada.token,
                AnswerSubmission {
                    question_id: 1,
                    selected_option_indices: vec![1],
                },
            )
            .await;
        assert!(matches!(early, Err(AppError::InvalidSubmission(_))));

        fx.engine.start(quiz.id, HOST).await.unwrap();
        let full = fx.engine.store.load_quiz(quiz.id).await.unwrap();
        let question_id = current_question_id(&full);

        let wrong_question = fx
            .engine
            .submit_answer(
                quiz.id,
                &ada.token,
                AnswerSubmission {
                    question_id: question_id + 100,
                    selected_option_indices: vec![1],
                },
            )
            .await;
        assert!(matches!(wrong_question, Err(AppError::InvalidSubmission(_))));

        let stranger = fx
            .engine
            .submit_answer(
                quiz.id,
                "not-a-token",
                AnswerSubmission {
                    question_id,
                    selected_option_indices: vec![1],
                },
            )
            .await;
        assert!(matches!(stranger, Err(AppError::InvalidSubmission(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_ends_question_once_and_freezes_scoring() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(3, 10, vec![0])]).await;
        let ada = fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();
        let full = fx.engine.store.load_quiz(quiz.id).await.unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(fx.publisher.ticks_for(&quiz.room_code), vec![2, 1, 0]);
        let events = fx.publisher.lifecycle_for(&quiz.room_code);
        assert_eq!(
            kinds(&events),
            vec![
                "PARTICIPANT_JOINED",
                "QUIZ_STARTED",
                "NEW_QUESTION",
                "QUESTION_ENDED",
                "LEADERBOARD_UPDATE"
            ]
        );
        assert!(matches!(
            events.last(),
            Some(RoomEvent::LeaderboardUpdate(Leaderboard { is_final: false, .. }))
        ));

        let late = fx
            .engine
            .submit_answer(
                quiz.id,
                &ada.token,
                AnswerSubmission {
                    question_id: current_question_id(&full),
                    selected_option_indices: vec![0],
                },
            )
            .await;
        assert!(matches!(late, Err(AppError::InvalidSubmission(_))));
        assert_eq!(
            fx.engine.status(quiz.id).await.unwrap().status,
            QuizStatus::Started
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_expiry_is_ignored() {
        let fx = fixture();
        let quiz = waiting_quiz(
            &fx.engine,
            10,
            vec![question(30, 10, vec![0]), question(30, 10, vec![0])],
        )
        .await;
        fx.engine.join(&quiz.room_code, "ada").await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();
        fx.engine.next_question(quiz.id, HOST).await.unwrap();
        let before = fx.publisher.lifecycle_for(&quiz.room_code).len();

        // Epoch 1 belonged to the first question's timer.
        fx.engine
            .handle_question_timeout(&quiz.room_code, 1)
            .await
            .unwrap();

        assert_eq!(fx.publisher.lifecycle_for(&quiz.room_code).len(), before);
    }

    /// "fast" answers after 1.5s, "slow" after 4.5s; both correct.
    async fn race_to_answer(fx: &Fixture) -> QuizSummary {
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 10, vec![0])]).await;
        let slow = fx.engine.join(&quiz.room_code, "slow").await.unwrap();
        let fast = fx.engine.join(&quiz.room_code, "fast").await.unwrap();
        fx.engine.start(quiz.id, HOST).await.unwrap();
        let full = fx.engine.store.load_quiz(quiz.id).await.unwrap();
        let answer = AnswerSubmission {
            question_id: current_question_id(&full),
            selected_option_indices: vec![0],
        };

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        fx.engine
            .submit_answer(quiz.id, &fast.token, answer.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        fx.engine
            .submit_answer(quiz.id, &slow.token, answer)
            .await
            .unwrap();
        quiz
    }

    #[tokio::test(start_paused = true)]
    async fn faster_answers_win_ties() {
        let fx = fixture();
        let quiz = race_to_answer(&fx).await;

        let board = fx.engine.leaderboard(quiz.id).await.unwrap();
        assert_eq!(standings(&board), vec![("fast", 1, 1), ("slow", 4, 2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn final_leaderboard_can_be_polled_after_end() {
        let fx = fixture();
        let quiz = race_to_answer(&fx).await;

        let ended = fx.engine.end(quiz.id, HOST).await.unwrap();
        assert_eq!(standings(&ended), vec![("fast", 1, 1), ("slow", 4, 2)]);
        assert_eq!(fx.engine.timing.tracked_rooms(), 0);

        let polled = fx.engine.leaderboard(quiz.id).await.unwrap();
        assert_eq!(polled, ended);
        assert!(polled.is_final);
        assert!(matches!(
            fx.publisher.lifecycle_for(&quiz.room_code).last(),
            Some(RoomEvent::LeaderboardUpdate(broadcast)) if *broadcast == polled
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_only_act_in_their_own_quiz() {
        let fx = fixture();
        let first = waiting_quiz(&fx.engine, 10, vec![question(10, 10, vec![0])]).await;
        let second = waiting_quiz(&fx.engine, 10, vec![question(10, 10, vec![0])]).await;
        let ada_first = fx.engine.join(&first.room_code, "ada").await.unwrap();
        fx.engine.join(&second.room_code, "ada").await.unwrap();
        fx.engine.join(&second.room_code, "bo").await.unwrap();

        fx.engine.start(second.id, HOST).await.unwrap();
        let full = fx.engine.store.load_quiz(second.id).await.unwrap();
        let foreign = fx
            .engine
            .submit_answer(
                second.id,
                &ada_first.token,
                AnswerSubmission {
                    question_id: current_question_id(&full),
                    selected_option_indices: vec![0],
                },
            )
            .await;
        assert!(matches!(foreign, Err(AppError::InvalidSubmission(_))));
        let board = fx.engine.leaderboard(second.id).await.unwrap();
        assert!(board.entries.iter().all(|e| e.score == 0));

        fx.engine.end(second.id, HOST).await.unwrap();
        assert!(matches!(
            fx.engine.leave(&second.room_code, &ada_first.token).await,
            Err(AppError::Unauthorized(_))
        ));
        assert_eq!(fx.engine.participants(second.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_quiz_ids_leave_no_locks_behind() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![question(10, 10, vec![0])]).await;
        let ada = fx.engine.join(&quiz.room_code, "ada").await.unwrap();

        for quiz_id in 1_000..1_050 {
            let result = fx
                .engine
                .submit_answer(
                    quiz_id,
                    &ada.token,
                    AnswerSubmission {
                        question_id: 1,
                        selected_option_indices: vec![0],
                    },
                )
                .await;
            assert!(matches!(result, Err(AppError::NotFound(_))));
        }
        assert_eq!(fx.engine.locks.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_timeout_leaves_quiz_running_and_spares_other_rooms() {
        let store = Arc::new(FaultyStore::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let engine = engine_with_store(store.clone(), publisher.clone());

        let broken = waiting_quiz(&engine, 10, vec![question(2, 10, vec![0])]).await;
        let healthy = waiting_quiz(&engine, 10, vec![question(2, 10, vec![0])]).await;
        engine.join(&broken.room_code, "ada").await.unwrap();
        engine.join(&healthy.room_code, "bo").await.unwrap();
        engine.start(broken.id, HOST).await.unwrap();
        engine.start(healthy.id, HOST).await.unwrap();
        store.broken_quiz.store(broken.id, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(
            kinds(&publisher.lifecycle_for(&broken.room_code)),
            vec![
                "PARTICIPANT_JOINED",
                "QUIZ_STARTED",
                "NEW_QUESTION",
                "QUESTION_ENDED"
            ]
        );
        assert_eq!(
            engine.status(broken.id).await.unwrap().status,
            QuizStatus::Started
        );

        let healthy_events = publisher.lifecycle_for(&healthy.room_code);
        assert_eq!(
            kinds(&healthy_events[healthy_events.len() - 2..]),
            vec!["QUESTION_ENDED", "LEADERBOARD_UPDATE"]
        );
    }

    #[tokio::test]
    async fn room_code_collisions_are_retried() {
        let store = Arc::new(FaultyStore::default());
        let engine = engine_with_store(store.clone(), Arc::new(RecordingPublisher::default()));
        let request = || CreateQuizRequest {
            title: "Rivers of Europe".to_string(),
            description: None,
            max_participants: None,
        };

        store.code_collisions.store(3, Ordering::SeqCst);
        let quiz = engine.create_quiz(HOST, request()).await.unwrap();
        assert_eq!(quiz.status, QuizStatus::Created);
        assert_eq!(store.code_collisions.load(Ordering::SeqCst), 0);

        store
            .code_collisions
            .store(ROOM_CODE_ATTEMPTS, Ordering::SeqCst);
        assert!(matches!(
            engine.create_quiz(HOST, request()).await,
            Err(AppError::InternalServerError(_))
        ));
    }

    #[tokio::test]
    async fn publish_failure_does_not_roll_back_start() {
        let engine = engine_with(Arc::new(FailingPublisher));
        let quiz = waiting_quiz(&engine, 10, vec![question(10, 100, vec![0])]).await;
        engine.join(&quiz.room_code, "ada").await.unwrap();

        let started = engine.start(quiz.id, HOST).await.unwrap();
        assert_eq!(started.status, QuizStatus::Started);
        assert_eq!(
            engine.status(quiz.id).await.unwrap().status,
            QuizStatus::Started
        );
    }

    #[tokio::test]
    async fn questions_are_sanitized_and_checked() {
        let fx = fixture();
        let quiz = waiting_quiz(&fx.engine, 10, vec![]).await;

        let out_of_range = fx
            .engine
            .add_question(quiz.id, HOST, question(10, 10, vec![7]))
            .await;
        assert!(matches!(out_of_range, Err(AppError::BadRequest(_))));

        let mut req = question(10, 10, vec![2, 0, 2]);
        req.text = "Which?<script>alert(1)</script>".to_string();
        let added = fx.engine.add_question(quiz.id, HOST, req).await.unwrap();
        assert_eq!(added.text, "Which?");
        assert_eq!(added.correct_option_indices, vec![0, 2]);
    }
}
