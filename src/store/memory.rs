//! In-process store with the same atomicity as the Postgres one.
//!
//! Each method takes the single state lock for its whole duration, so every
//! conditional write is one critical section. Used by tests and local runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    error::AppError,
    models::{
        live_session::{LiveSession, NewSession, SessionStatus},
        participant::{Participant, Submission},
        question::BankQuestion,
        user::UserIdentity,
    },
    store::{QuestionBank, SessionStore, UserDirectory},
};

#[derive(Default)]
struct State {
    sessions: Vec<LiveSession>,
    participants: Vec<Participant>,
    // (session_id, user_id) -> index into `participants`
    membership: HashMap<(i64, i64), usize>,
    questions: Vec<BankQuestion>,
    users: HashMap<i64, UserIdentity>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a question to the bank, assigning the next id.
    pub async fn add_question(&self, mut question: BankQuestion) -> i64 {
        let mut state = self.state.lock().await;
        let id = state.questions.len() as i64 + 1;
        question.id = id;
        state.questions.push(question);
        id
    }

    pub async fn add_user(&self, user: UserIdentity) {
        self.state.lock().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(&self, new: NewSession) -> Result<Option<LiveSession>, AppError> {
        let mut state = self.state.lock().await;
        if state.sessions.iter().any(|s| s.exam_id == new.exam_id) {
            return Ok(None);
        }

        let session = LiveSession {
            id: state.sessions.len() as i64 + 1,
            host_id: new.host_id,
            exam_id: new.exam_id,
            topic: new.topic,
            unit: new.unit,
            status: SessionStatus::Waiting,
            duration_minutes: new.duration_minutes,
            created_at: new.created_at,
            started_at: None,
            generated_pool: new.generated_pool,
        };
        state.sessions.push(session.clone());
        Ok(Some(session))
    }

    async fn find_session(&self, id: i64) -> Result<Option<LiveSession>, AppError> {
        let state = self.state.lock().await;
        Ok(state.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn find_session_by_code(&self, code: &str) -> Result<Option<LiveSession>, AppError> {
        let state = self.state.lock().await;
        Ok(state.sessions.iter().find(|s| s.exam_id == code).cloned())
    }

    async fn mark_started(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<Option<LiveSession>, AppError> {
        let mut state = self.state.lock().await;
        let Some(session) = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.status == SessionStatus::Waiting)
        else {
            return Ok(None);
        };

        session.status = SessionStatus::Active;
        session.started_at = Some(started_at);
        Ok(Some(session.clone()))
    }

    async fn mark_finished(&self, id: i64, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let Some(session) = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.status != SessionStatus::Finished)
        else {
            return Ok(false);
        };

        session.status = SessionStatus::Finished;
        session.started_at.get_or_insert(at);
        Ok(true)
    }

    async fn insert_participant(
        &self,
        session_id: i64,
        user_id: i64,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        if state.membership.contains_key(&(session_id, user_id)) {
            return Ok(false);
        }

        let index = state.participants.len();
        state.participants.push(Participant {
            id: index as i64 + 1,
            session_id,
            user_id,
            joined_at,
            submission: None,
        });
        state.membership.insert((session_id, user_id), index);
        Ok(true)
    }

    async fn find_participant(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<Participant>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .membership
            .get(&(session_id, user_id))
            .map(|&i| state.participants[i].clone()))
    }

    async fn count_participants(&self, session_id: i64) -> Result<i64, AppError> {
        let state = self.state.lock().await;
        let count = state
            .participants
            .iter()
            .filter(|p| p.session_id == session_id)
            .count();
        Ok(count as i64)
    }

    async fn record_submission(
        &self,
        session_id: i64,
        user_id: i64,
        submission: &Submission,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().await;
        let Some(&index) = state.membership.get(&(session_id, user_id)) else {
            return Ok(false);
        };

        let participant = &mut state.participants[index];
        if participant.submission.is_some() {
            return Ok(false);
        }
        participant.submission = Some(submission.clone());
        Ok(true)
    }

    async fn submitted_participants(&self, session_id: i64) -> Result<Vec<Participant>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.session_id == session_id && p.has_submitted())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl QuestionBank for MemoryStore {
    async fn query_questions(
        &self,
        unit: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Vec<BankQuestion>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .questions
            .iter()
            .filter(|q| unit.is_none_or(|u| q.unit.as_deref() == Some(u)))
            .filter(|q| topic.is_none_or(|t| q.topic == t))
            .cloned()
            .collect())
    }

    async fn fetch_questions_by_ids(&self, ids: &[i64]) -> Result<Vec<BankQuestion>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .questions
            .iter()
            .filter(|q| ids.contains(&q.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_users(&self, ids: &[i64]) -> Result<Vec<UserIdentity>, AppError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}
