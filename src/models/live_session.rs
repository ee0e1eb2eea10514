// src/models/live_session.rs

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::GeneratedPool;

/// Lifecycle state of a live session: waiting -> active -> finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Finished,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Waiting => "waiting",
            SessionStatus::Active => "active",
            SessionStatus::Finished => "finished",
        }
    }

    /// Late joins are allowed until the host ends the session.
    pub fn accepts_joins(&self) -> bool {
        !matches!(self, SessionStatus::Finished)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(SessionStatus::Waiting),
            "active" => Ok(SessionStatus::Active),
            "finished" => Ok(SessionStatus::Finished),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// Represents the 'live_sessions' table.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSession {
    pub id: i64,
    pub host_id: i64,

    /// Six-character join code, unique across all sessions.
    pub exam_id: String,

    pub topic: String,
    pub unit: Option<String>,
    pub status: SessionStatus,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,

    /// Set exactly when the session leaves `waiting`.
    pub started_at: Option<DateTime<Utc>>,

    /// Present only when generation produced at least one question.
    #[serde(skip)]
    pub generated_pool: Option<GeneratedPool>,
}

impl LiveSession {
    pub fn has_generated_questions(&self) -> bool {
        self.generated_pool
            .as_ref()
            .is_some_and(|pool| !pool.items.is_empty())
    }

    pub fn generated_question_count(&self) -> usize {
        self.generated_pool.as_ref().map_or(0, |pool| pool.items.len())
    }
}

/// Values needed to insert a new session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub host_id: i64,
    pub exam_id: String,
    pub topic: String,
    pub unit: Option<String>,
    pub duration_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub generated_pool: Option<GeneratedPool>,
}

/// DTO for creating a session backed by the question bank.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 200, message = "Topic must be between 1 and 200 characters"))]
    pub topic: String,

    #[validate(length(min = 1, max = 100))]
    pub unit: Option<String>,

    #[validate(range(min = 1, max = 600, message = "Duration must be between 1 and 600 minutes"))]
    pub duration_minutes: i32,
}

/// One syllabus point to generate questions for.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct SyllabusSelection {
    #[validate(length(min = 1, max = 300))]
    pub point: String,

    #[validate(range(min = 1, max = 50))]
    pub count: u32,
}

/// DTO for creating a session with a generated question pool.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGeneratedSessionRequest {
    #[validate(range(min = 1, max = 600, message = "Duration must be between 1 and 600 minutes"))]
    pub duration_minutes: i32,

    #[validate(length(min = 1, max = 20), nested)]
    pub syllabus_selections: Vec<SyllabusSelection>,
}

/// Returned by both create operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub id: i64,
    pub exam_id: String,
    pub unit: Option<String>,
    pub topic: String,
    pub duration_minutes: i32,
    pub status: SessionStatus,
    pub has_generated_questions: bool,
    pub question_count: usize,
}

impl From<&LiveSession> for SessionCreated {
    fn from(s: &LiveSession) -> Self {
        Self {
            id: s.id,
            exam_id: s.exam_id.clone(),
            unit: s.unit.clone(),
            topic: s.topic.clone(),
            duration_minutes: s.duration_minutes,
            status: s.status,
            has_generated_questions: s.has_generated_questions(),
            question_count: s.generated_question_count(),
        }
    }
}

/// Public lookup result for the student join flow.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub exam_id: String,
    pub topic: String,
    pub status: SessionStatus,
    pub duration_minutes: i32,
    pub has_generated_questions: bool,
}

impl From<&LiveSession> for SessionSummary {
    fn from(s: &LiveSession) -> Self {
        Self {
            id: s.id,
            exam_id: s.exam_id.clone(),
            topic: s.topic.clone(),
            status: s.status,
            duration_minutes: s.duration_minutes,
            has_generated_questions: s.has_generated_questions(),
        }
    }
}

/// Read-only snapshot polled by hosts and participants.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStatusView {
    pub id: i64,
    pub status: SessionStatus,
    pub unit: Option<String>,
    pub topic: String,
    pub duration_minutes: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub participants_count: i64,
    pub has_generated_questions: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub session_id: i64,
    pub already_joined: bool,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartOutcome {
    pub session_id: i64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndOutcome {
    pub session_id: i64,
    /// False when the session was already finished.
    pub ended_now: bool,
}
