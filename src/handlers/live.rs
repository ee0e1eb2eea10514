// src/handlers/live.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    engine::LiveEngine,
    error::AppError,
    models::{
        live_session::{
            CreateGeneratedSessionRequest, CreateSessionRequest, SessionCreated, SessionSummary,
        },
        participant::SubmitAnswersRequest,
    },
    utils::jwt::Claims,
};

/// Creates a live session backed by the question bank.
/// The caller becomes the host.
pub async fn create_session(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let host_id = claims.user_id()?;

    let session = engine.create_session(host_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(SessionCreated::from(&session))))
}

/// Creates a live session whose questions are generated per syllabus point.
///
/// Generation is best-effort: when it yields nothing the session still gets
/// created and serves bank questions instead.
pub async fn create_generated_session(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateGeneratedSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let host_id = claims.user_id()?;

    let session = engine.create_generated_session(host_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(SessionCreated::from(&session))))
}

/// Looks up a session by its join code (student join flow).
pub async fn get_session_by_code(
    State(engine): State<Arc<LiveEngine>>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = engine.find_by_code(&code).await?;
    Ok(Json(SessionSummary::from(&session)))
}

pub async fn join_session(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(engine.join_by_code(&code, user_id).await?))
}

pub async fn get_status(
    State(engine): State<Arc<LiveEngine>>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.status(session_id).await?))
}

/// Returns the questions of an active session.
/// Answers and explanations are never part of this response.
pub async fn get_questions(
    State(engine): State<Arc<LiveEngine>>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.questions(session_id).await?))
}

pub async fn start_session(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let caller_id = claims.user_id()?;
    Ok(Json(engine.start(session_id, caller_id).await?))
}

pub async fn end_session(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let caller_id = claims.user_id()?;
    Ok(Json(engine.end(session_id, caller_id).await?))
}

/// Submits the caller's answers. Accepted once per participant.
pub async fn submit_answers(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(payload): Json<SubmitAnswersRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.user_id()?;

    Ok(Json(engine.submit(session_id, user_id, &payload).await?))
}

pub async fn get_leaderboard(
    State(engine): State<Arc<LiveEngine>>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engine.leaderboard(session_id).await?))
}

/// The caller's graded answers, with correct options and explanations.
pub async fn get_review(
    State(engine): State<Arc<LiveEngine>>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    Ok(Json(engine.review(session_id, user_id).await?))
}
