// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{host, participant, quiz, ws},
    state::AppState,
    utils::jwt::{auth_middleware, host_middleware, participant_middleware},
};

/// Assembles the main application router.
///
/// * Host routes (quiz setup and lifecycle) require a host token.
/// * Answer and leave routes require a participant token.
/// * Joining, status reads and the room WebSocket are public.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let host_routes = Router::new()
        .route("/", post(host::create_quiz))
        .route("/{id}", get(host::get_quiz))
        .route("/{id}/questions", post(host::add_question))
        .route("/{id}/open", post(host::open_quiz))
        .route("/{id}/start", post(host::start_quiz))
        .route("/{id}/next", post(host::next_question))
        .route("/{id}/end", post(host::end_quiz))
        .route("/{id}/reset", post(host::reset_participants))
        .route(
            "/{id}/participants/{participant_id}",
            delete(host::remove_participant),
        )
        // Double middleware protection: Auth first, then Host check
        .layer(middleware::from_fn(host_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let participant_routes = Router::new()
        .route("/join", post(participant::join))
        .merge(
            Router::new()
                .route("/leave", post(participant::leave))
                .layer(middleware::from_fn(participant_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    let quiz_routes = Router::new()
        .route("/{id}/status", get(quiz::get_status))
        .route("/{id}/current-question", get(quiz::get_current_question))
        .route("/{id}/leaderboard", get(quiz::get_leaderboard))
        .route("/{id}/participants", get(quiz::list_participants))
        // Protected answer route
        .merge(
            Router::new()
                .route("/{id}/answers", post(participant::submit_answer))
                .layer(middleware::from_fn(participant_middleware))
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        );

    Router::new()
        .nest("/api/host/quizzes", host_routes)
        .nest("/api/participants", participant_routes)
        .nest("/api/quizzes", quiz_routes)
        .route("/ws/rooms/{room_code}", get(ws::room_socket))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
