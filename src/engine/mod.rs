//! Live session engine.
//!
//! Sessions move `waiting -> active -> finished`. Every state change and every
//! submission is a single conditional write in the store, so concurrent
//! callers converge without application-level locking.

pub mod join_code;
pub mod pool;
pub mod ranking;
pub mod scoring;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        live_session::{
            CreateGeneratedSessionRequest, CreateSessionRequest, EndOutcome, JoinOutcome,
            LiveSession, NewSession, SessionStatus, SessionStatusView, StartOutcome,
        },
        participant::{
            AnswerSheet, Leaderboard, LeaderboardSession, Review, ReviewEntry,
            SubmitAnswersRequest, SubmitOutcome, Submission,
        },
        question::{GeneratedPool, PublicQuestion, QuestionId},
    },
    store::{QuestionBank, SessionStore, UserDirectory},
};

use self::{
    join_code::{generate_join_code, normalize_join_code},
    pool::PoolResolver,
};

pub struct LiveEngine {
    sessions: Arc<dyn SessionStore>,
    bank: Arc<dyn QuestionBank>,
    users: Arc<dyn UserDirectory>,
    resolver: PoolResolver,
}

impl LiveEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        bank: Arc<dyn QuestionBank>,
        users: Arc<dyn UserDirectory>,
        resolver: PoolResolver,
    ) -> Self {
        Self {
            sessions,
            bank,
            users,
            resolver,
        }
    }

    /// Creates a session drawing its questions from the bank.
    pub async fn create_session(
        &self,
        host_id: i64,
        req: &CreateSessionRequest,
    ) -> Result<LiveSession, AppError> {
        ensure_positive_duration(req.duration_minutes)?;

        let session = self
            .insert_with_fresh_code(NewSession {
                host_id,
                exam_id: String::new(),
                topic: req.topic.clone(),
                unit: req.unit.clone(),
                duration_minutes: req.duration_minutes,
                created_at: Utc::now(),
                generated_pool: None,
            })
            .await?;

        tracing::info!(session_id = session.id, code = %session.exam_id, host_id, "Live session created");
        Ok(session)
    }

    /// Creates a session with generated questions.
    ///
    /// If generation yields nothing the session is still created, in bank mode.
    pub async fn create_generated_session(
        &self,
        host_id: i64,
        req: &CreateGeneratedSessionRequest,
    ) -> Result<LiveSession, AppError> {
        ensure_positive_duration(req.duration_minutes)?;

        let items = self.resolver.generate_pool(&req.syllabus_selections).await;
        let topic = req
            .syllabus_selections
            .iter()
            .map(|s| s.point.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        if items.is_empty() {
            tracing::warn!(host_id, "No questions generated, session falls back to the bank");
        }

        let session = self
            .insert_with_fresh_code(NewSession {
                host_id,
                exam_id: String::new(),
                topic,
                unit: None,
                duration_minutes: req.duration_minutes,
                created_at: Utc::now(),
                generated_pool: (!items.is_empty()).then(|| GeneratedPool::new(items)),
            })
            .await?;

        tracing::info!(
            session_id = session.id,
            code = %session.exam_id,
            host_id,
            questions = session.generated_question_count(),
            "Live session created with generated questions"
        );
        Ok(session)
    }

    /// Retries with a new code until the store accepts one.
    async fn insert_with_fresh_code(&self, template: NewSession) -> Result<LiveSession, AppError> {
        loop {
            let exam_id = generate_join_code(&mut rand::thread_rng());
            let candidate = NewSession {
                exam_id,
                ..template.clone()
            };

            match self.sessions.insert_session(candidate).await? {
                Some(session) => return Ok(session),
                None => tracing::warn!("Join code collision, drawing a new code"),
            }
        }
    }

    async fn load(&self, session_id: i64) -> Result<LiveSession, AppError> {
        self.sessions
            .find_session(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
    }

    pub async fn find_by_code(&self, code: &str) -> Result<LiveSession, AppError> {
        self.sessions
            .find_session_by_code(&normalize_join_code(code))
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))
    }

    /// Adds the user to the session. Joining twice is a success that reports
    /// the existing membership.
    pub async fn join(&self, session_id: i64, user_id: i64) -> Result<JoinOutcome, AppError> {
        let session = self.load(session_id).await?;
        self.join_loaded(&session, user_id).await
    }

    pub async fn join_by_code(&self, code: &str, user_id: i64) -> Result<JoinOutcome, AppError> {
        let session = self.find_by_code(code).await?;
        self.join_loaded(&session, user_id).await
    }

    async fn join_loaded(&self, session: &LiveSession, user_id: i64) -> Result<JoinOutcome, AppError> {
        if !session.status.accepts_joins() {
            return Err(AppError::InvalidState("Session has already ended".to_string()));
        }

        let created = self
            .sessions
            .insert_participant(session.id, user_id, Utc::now())
            .await?;

        if created {
            tracing::info!(session_id = session.id, user_id, "Participant joined");
        }

        Ok(JoinOutcome {
            session_id: session.id,
            already_joined: !created,
            status: session.status,
        })
    }

    pub async fn status(&self, session_id: i64) -> Result<SessionStatusView, AppError> {
        let session = self.load(session_id).await?;
        let participants_count = self.sessions.count_participants(session.id).await?;

        Ok(SessionStatusView {
            id: session.id,
            status: session.status,
            has_generated_questions: session.has_generated_questions(),
            unit: session.unit,
            topic: session.topic,
            duration_minutes: session.duration_minutes,
            started_at: session.started_at,
            participants_count,
        })
    }

    /// Questions for an active session, without answers or explanations.
    pub async fn questions(&self, session_id: i64) -> Result<Vec<PublicQuestion>, AppError> {
        let session = self.load(session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(AppError::InvalidState("Session is not active".to_string()));
        }

        self.resolver.deliver(&session, self.bank.as_ref()).await
    }

    pub async fn start(&self, session_id: i64, caller_id: i64) -> Result<StartOutcome, AppError> {
        let session = self.load(session_id).await?;
        ensure_host(&session, caller_id)?;

        let started = self
            .sessions
            .mark_started(session.id, Utc::now())
            .await?
            .ok_or_else(|| {
                AppError::InvalidState("Session already started or finished".to_string())
            })?;

        // mark_started only returns rows it moved to active, which always carry a start time
        let started_at = started.started_at.ok_or_else(|| {
            AppError::InternalServerError("Started session has no start time".to_string())
        })?;

        tracing::info!(session_id, "Live session started");
        Ok(StartOutcome {
            session_id,
            started_at,
        })
    }

    /// Ends the session. Ending a finished session is a no-op success.
    pub async fn end(&self, session_id: i64, caller_id: i64) -> Result<EndOutcome, AppError> {
        let session = self.load(session_id).await?;
        ensure_host(&session, caller_id)?;

        let ended_now = self.sessions.mark_finished(session.id, Utc::now()).await?;
        if ended_now {
            tracing::info!(session_id, "Live session ended");
        }

        Ok(EndOutcome {
            session_id,
            ended_now,
        })
    }

    /// Grades and records a participant's answers. Only the first submission
    /// per participant is accepted.
    pub async fn submit(
        &self,
        session_id: i64,
        user_id: i64,
        req: &SubmitAnswersRequest,
    ) -> Result<SubmitOutcome, AppError> {
        if req.time_taken_seconds < 0 {
            return Err(AppError::BadRequest("Time taken cannot be negative".to_string()));
        }

        let session = self.load(session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(AppError::InvalidState("Session is not active".to_string()));
        }

        let participant = self
            .sessions
            .find_participant(session.id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Participant not found".to_string()))?;

        if participant.has_submitted() {
            return Err(already_submitted());
        }

        let ids: Vec<QuestionId> = req.answers.iter().map(|a| a.question_id.clone()).collect();
        let keys = self
            .resolver
            .answer_keys(&session, self.bank.as_ref(), &ids)
            .await?;
        let graded = scoring::grade(&req.answers, &keys);

        let submission = Submission {
            score: graded.score,
            time_taken_seconds: req.time_taken_seconds,
            submitted_at: Utc::now(),
            answers: AnswerSheet::new(graded.details),
        };

        // The store only writes when nothing was recorded yet; a racing
        // submission that got there first makes this one a conflict.
        if !self
            .sessions
            .record_submission(session.id, user_id, &submission)
            .await?
        {
            return Err(already_submitted());
        }

        tracing::info!(
            session_id,
            user_id,
            score = submission.score,
            evaluated = submission.answers.entries.len(),
            "Submission recorded"
        );

        Ok(SubmitOutcome {
            score: submission.score,
            total: submission.answers.entries.len(),
        })
    }

    pub async fn leaderboard(&self, session_id: i64) -> Result<Leaderboard, AppError> {
        let session = self.load(session_id).await?;
        let participants = self.sessions.submitted_participants(session.id).await?;

        let user_ids: Vec<i64> = participants.iter().map(|p| p.user_id).collect();
        let users: HashMap<_, _> = self
            .users
            .get_users(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(Leaderboard {
            leaderboard: ranking::rank(participants, &users),
            session: LeaderboardSession {
                exam_id: session.exam_id,
                topic: session.topic,
                status: session.status,
            },
        })
    }

    /// The caller's own graded answers with correct options and explanations.
    pub async fn review(&self, session_id: i64, user_id: i64) -> Result<Review, AppError> {
        let session = self.load(session_id).await?;
        let participant = self
            .sessions
            .find_participant(session.id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Participant not found".to_string()))?;

        let submission = participant
            .submission
            .ok_or_else(|| AppError::InvalidState("Answers not submitted yet".to_string()))?;

        let ids: Vec<QuestionId> = submission
            .answers
            .entries
            .iter()
            .map(|e| e.question_id.clone())
            .collect();
        let keys = self
            .resolver
            .answer_keys(&session, self.bank.as_ref(), &ids)
            .await?;

        let answers = submission
            .answers
            .entries
            .into_iter()
            .map(|entry| {
                let key = keys.get(&entry.question_id);
                ReviewEntry {
                    correct_option_id: key.map(|k| k.correct_option_id.clone()),
                    explanation: key.map(|k| k.explanation.clone()),
                    question_id: entry.question_id,
                    selected: entry.selected,
                    is_correct: entry.is_correct,
                }
            })
            .collect();

        Ok(Review {
            session_id: session.id,
            score: submission.score,
            time_taken_seconds: submission.time_taken_seconds,
            submitted_at: submission.submitted_at,
            answers,
        })
    }
}

fn ensure_host(session: &LiveSession, caller_id: i64) -> Result<(), AppError> {
    if session.host_id != caller_id {
        return Err(AppError::Forbidden(
            "Only the host can manage this session".to_string(),
        ));
    }
    Ok(())
}

fn ensure_positive_duration(minutes: i32) -> Result<(), AppError> {
    if minutes <= 0 {
        return Err(AppError::BadRequest("Duration must be positive".to_string()));
    }
    Ok(())
}

fn already_submitted() -> AppError {
    AppError::Conflict("Answers already submitted".to_string())
}
