pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::interview::handlers as interview;
use crate::relay::handlers as relay;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // AI engine relay
        .route("/api/health", get(health::backend_health_handler))
        .route("/api/ai-status", get(relay::handle_ai_status))
        .route("/api/get-question", post(relay::handle_get_question))
        .route("/api/submit-answer", post(relay::handle_submit_answer))
        .route("/api/chat", post(relay::handle_chat))
        // Live interview sessions
        .route(
            "/api/v1/interviews/ws",
            get(interview::handle_interview_socket),
        )
        .with_state(state)
}
