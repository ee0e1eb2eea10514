//! PostgreSQL-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use crate::{
    error::AppError,
    models::{
        live_session::{LiveSession, NewSession, SessionStatus},
        participant::{AnswerSheet, Participant, Submission},
        question::{BankQuestion, GeneratedPool},
        user::UserIdentity,
    },
    store::{QuestionBank, SessionStore, UserDirectory},
};

const SESSION_COLUMNS: &str = "id, host_id, exam_id, topic, unit, status, duration_minutes, \
     created_at, started_at, generated_pool";

const PARTICIPANT_COLUMNS: &str =
    "id, session_id, user_id, joined_at, score, time_taken_seconds, submitted_at, answers";

#[derive(FromRow)]
struct SessionRow {
    id: i64,
    host_id: i64,
    exam_id: String,
    topic: String,
    unit: Option<String>,
    status: String,
    duration_minutes: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    generated_pool: Option<Json<GeneratedPool>>,
}

impl TryFrom<SessionRow> for LiveSession {
    type Error = AppError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(AppError::InternalServerError)?;

        Ok(LiveSession {
            id: row.id,
            host_id: row.host_id,
            exam_id: row.exam_id,
            topic: row.topic,
            unit: row.unit,
            status,
            duration_minutes: row.duration_minutes,
            created_at: row.created_at,
            started_at: row.started_at,
            generated_pool: row.generated_pool.map(|pool| pool.0),
        })
    }
}

#[derive(FromRow)]
struct ParticipantRow {
    id: i64,
    session_id: i64,
    user_id: i64,
    joined_at: DateTime<Utc>,
    score: Option<i32>,
    time_taken_seconds: Option<i32>,
    submitted_at: Option<DateTime<Utc>>,
    answers: Option<Json<AnswerSheet>>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        let submission = row.submitted_at.map(|submitted_at| Submission {
            score: row.score.unwrap_or(0),
            time_taken_seconds: row.time_taken_seconds.unwrap_or(0),
            submitted_at,
            answers: row
                .answers
                .map(|sheet| sheet.0)
                .unwrap_or_else(|| AnswerSheet::new(Vec::new())),
        });

        Participant {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            joined_at: row.joined_at,
            submission,
        }
    }
}

/// Store implementation over a shared `PgPool`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(&self, new: NewSession) -> Result<Option<LiveSession>, AppError> {
        let result = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO live_sessions
                (host_id, exam_id, topic, unit, status, duration_minutes, created_at, generated_pool)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(new.host_id)
        .bind(&new.exam_id)
        .bind(&new.topic)
        .bind(&new.unit)
        .bind(SessionStatus::Waiting.as_str())
        .bind(new.duration_minutes)
        .bind(new.created_at)
        .bind(new.generated_pool.map(Json))
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(Some(row.try_into()?)),
            // UNIQUE(exam_id) is the authority on join code collisions
            Err(e) if e.as_database_error().is_some_and(|d| d.is_unique_violation()) => Ok(None),
            Err(e) => {
                tracing::error!("Failed to insert live session: {:?}", e);
                Err(AppError::from(e))
            }
        }
    }

    async fn find_session(&self, id: i64) -> Result<Option<LiveSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM live_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LiveSession::try_from).transpose()
    }

    async fn find_session_by_code(&self, code: &str) -> Result<Option<LiveSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM live_sessions WHERE exam_id = $1",
            SESSION_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(LiveSession::try_from).transpose()
    }

    async fn mark_started(
        &self,
        id: i64,
        started_at: DateTime<Utc>,
    ) -> Result<Option<LiveSession>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE live_sessions
            SET status = $2, started_at = $3
            WHERE id = $1 AND status = $4
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(SessionStatus::Active.as_str())
        .bind(started_at)
        .bind(SessionStatus::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(LiveSession::try_from).transpose()
    }

    async fn mark_finished(&self, id: i64, at: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE live_sessions
            SET status = $2, started_at = COALESCE(started_at, $3)
            WHERE id = $1 AND status <> $2
            "#,
        )
        .bind(id)
        .bind(SessionStatus::Finished.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn insert_participant(
        &self,
        session_id: i64,
        user_id: i64,
        joined_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO live_participants (session_id, user_id, joined_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id, user_id) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(joined_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_participant(
        &self,
        session_id: i64,
        user_id: i64,
    ) -> Result<Option<Participant>, AppError> {
        let row = sqlx::query_as::<_, ParticipantRow>(&format!(
            "SELECT {} FROM live_participants WHERE session_id = $1 AND user_id = $2",
            PARTICIPANT_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Participant::from))
    }

    async fn count_participants(&self, session_id: i64) -> Result<i64, AppError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM live_participants WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn record_submission(
        &self,
        session_id: i64,
        user_id: i64,
        submission: &Submission,
    ) -> Result<bool, AppError> {
        // Guarded on submitted_at IS NULL: exactly one concurrent writer wins.
        let result = sqlx::query(
            r#"
            UPDATE live_participants
            SET score = $3, time_taken_seconds = $4, submitted_at = $5, answers = $6
            WHERE session_id = $1 AND user_id = $2 AND submitted_at IS NULL
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(submission.score)
        .bind(submission.time_taken_seconds)
        .bind(submission.submitted_at)
        .bind(Json(&submission.answers))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn submitted_participants(&self, session_id: i64) -> Result<Vec<Participant>, AppError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(&format!(
            r#"
            SELECT {}
            FROM live_participants
            WHERE session_id = $1 AND submitted_at IS NOT NULL
            "#,
            PARTICIPANT_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Participant::from).collect())
    }
}

#[async_trait]
impl QuestionBank for PgStore {
    async fn query_questions(
        &self,
        unit: Option<&str>,
        topic: Option<&str>,
    ) -> Result<Vec<BankQuestion>, AppError> {
        let mut query_builder = QueryBuilder::<Postgres>::new(
            "SELECT id, unit, topic, question, options, correct_option_id, explanation \
             FROM mcqs WHERE TRUE",
        );

        if let Some(unit) = unit {
            query_builder.push(" AND unit = ").push_bind(unit.to_string());
        }
        if let Some(topic) = topic {
            query_builder.push(" AND topic = ").push_bind(topic.to_string());
        }
        query_builder.push(" ORDER BY id");

        let questions = query_builder
            .build_query_as::<BankQuestion>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to query question bank: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

        Ok(questions)
    }

    async fn fetch_questions_by_ids(&self, ids: &[i64]) -> Result<Vec<BankQuestion>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let questions = sqlx::query_as::<_, BankQuestion>(
            r#"
            SELECT id, unit, topic, question, options, correct_option_id, explanation
            FROM mcqs
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_users(&self, ids: &[i64]) -> Result<Vec<UserIdentity>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let users = sqlx::query_as::<_, UserIdentity>(
            "SELECT id, username, full_name FROM users WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }
}
