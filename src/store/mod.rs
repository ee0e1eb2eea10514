//! Storage seams for the live session engine.
//!
//! Every mutating method is a single atomic step in the backing store so
//! concurrent callers cannot interleave a check with its write.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        live_session::{LiveSession, NewSession},
        participant::{Participant, Submission},
        question::BankQuestion,
        user::UserIdentity,
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a session. Returns `None` when the join code is already taken.
    async fn insert_session(&self, new: NewSession) -> Result<Option<LiveSession>, AppError>;

    async fn find_session(&self, id: i64) -> Result<Option<LiveSession>, AppError>;

    async fn find_session_by_code(&self, code: &str) -> Result<Option<LiveSession>, AppError>;

    /// `waiting` -> `active`, stamping `started_at`.
    /// Returns `None` if the session was not in `waiting`.
    async fn mark_started(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<Option<LiveSession>, AppError>;

    /// Moves any non-finished session to `finished`. A session ended straight
    /// from `waiting` gets `at` as its start time.
    /// Returns false if it was already finished.
    async fn mark_finished(&self, id: i64, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Creates the membership row unless one exists. Returns true if created.
    async fn insert_participant(
        &self,
        session_id: i64,
        user_id: i64,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn find_participant(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<Participant>, AppError>;

    async fn count_participants(&self, session_id: i64) -> Result<i64, AppError>;

    /// Writes the submission only if none is recorded yet.
    /// Returns false when another submission already won.
    async fn record_submission(
        &self,
        session_id: i64,
        user_id: i64,
        submission: &Submission,
    ) -> Result<bool, AppError>;

    async fn submitted_participants(&self, session_id: i64) -> Result<Vec<Participant>, AppError>;
}

/// Read-only access to the persisted MCQ bank.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// Filters are combinable; `None` means "no constraint".
    async fn query_questions(
        &self,
        unit: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Vec<BankQuestion>, AppError>;

    async fn fetch_questions_by_ids(&self, ids: &[i64]) -> Result<Vec<BankQuestion>, AppError>;
}

/// Read-only access to user display identity.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_users(&self, ids: &[i64]) -> Result<Vec<UserIdentity>, AppError>;
}
