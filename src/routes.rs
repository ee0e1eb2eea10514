// src/routes.rs

use axum::{
    Json, Router,
    http::{HeaderValue, Method},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers::live, state::AppState, utils::jwt::auth_middleware};

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({ "message": "Welcome to the live quiz API" }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ])
}

/// Assembles the main application router.
///
/// * Session lookup by code is public; everything else needs a bearer token.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (engine and configuration).
pub fn create_router(state: AppState) -> Router {
    let public_routes =
        Router::new().route("/by-code/{code}", get(live::get_session_by_code));

    let protected_routes = Router::new()
        .route("/sessions", post(live::create_session))
        .route("/sessions/generated", post(live::create_generated_session))
        .route("/join/{code}", post(live::join_session))
        .route("/{id}/status", get(live::get_status))
        .route("/{id}/questions", get(live::get_questions))
        .route("/{id}/start", post(live::start_session))
        .route("/{id}/end", post(live::end_session))
        .route("/{id}/submit", post(live::submit_answers))
        .route("/{id}/leaderboard", get(live::get_leaderboard))
        .route("/{id}/review", get(live::get_review))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .route("/", get(root))
        .nest("/api/live", public_routes.merge(protected_routes))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
