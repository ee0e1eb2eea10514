// src/models/participant.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{live_session::SessionStatus, question::QuestionId};

/// Schema version written alongside every persisted answer sheet.
pub const ANSWER_SHEET_VERSION: u32 = 1;

/// Represents the 'live_participants' table.
/// Stores one user's membership in one session.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: i64,
    pub session_id: i64,
    pub user_id: i64,
    pub joined_at: DateTime<Utc>,

    /// Written once, all fields together, on the first successful submit.
    pub submission: Option<Submission>,
}

impl Participant {
    pub fn has_submitted(&self) -> bool {
        self.submission.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub score: i32,
    pub time_taken_seconds: i32,
    pub submitted_at: DateTime<Utc>,
    pub answers: AnswerSheet,
}

/// Versioned envelope for the per-question grading detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSheet {
    pub version: u32,
    pub entries: Vec<AnswerDetail>,
}

impl AnswerSheet {
    pub fn new(entries: Vec<AnswerDetail>) -> Self {
        Self {
            version: ANSWER_SHEET_VERSION,
            entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDetail {
    pub question_id: QuestionId,
    pub selected: String,
    pub is_correct: bool,
}

/// A single answer as sent by the client.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct AnswerSubmission {
    pub question_id: QuestionId,

    #[validate(length(min = 1, max = 20))]
    pub selected_option_id: String,
}

/// DTO for submitting answers to a live session.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswersRequest {
    #[validate(length(max = 500), nested)]
    pub answers: Vec<AnswerSubmission>,

    /// Client-measured; the submission timestamp always comes from the server.
    #[validate(range(min = 0, message = "Time taken cannot be negative"))]
    pub time_taken_seconds: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub score: i32,
    /// Number of answers that referenced a known question.
    pub total: usize,
}

/// Aggregated row for displaying the leaderboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    pub score: i32,
    pub time_taken_seconds: i32,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardSession {
    pub exam_id: String,
    pub topic: String,
    pub status: SessionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Leaderboard {
    pub session: LeaderboardSession,
    pub leaderboard: Vec<LeaderboardEntry>,
}

/// One graded answer with its explanation, shown after submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub question_id: QuestionId,
    pub selected: String,
    pub is_correct: bool,
    pub correct_option_id: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Review {
    pub session_id: i64,
    pub score: i32,
    pub time_taken_seconds: i32,
    pub submitted_at: DateTime<Utc>,
    pub answers: Vec<ReviewEntry>,
}
