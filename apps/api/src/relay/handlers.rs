use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::ai_client::{ChatRequest, ChatResponse, GradeRequest, GradeResponse, QuestionResponse};
use crate::errors::AppError;
use crate::relay::{CHAT_UNAVAILABLE_REPLY, DEFAULT_JOB_ROLE, FALLBACK_RELAY_QUESTION};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GetQuestionBody {
    #[serde(default)]
    pub job_role: Option<String>,
}

/// GET /api/ai-status
pub async fn handle_ai_status(State(state): State<AppState>) -> Response {
    match state.ai.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!("AI engine status check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "AI Offline", "message": "Connection failed" })),
            )
                .into_response()
        }
    }
}

/// POST /api/get-question
/// Always answers with a question; the fallback comes with a 500.
/// A missing or unreadable body asks for the default role.
pub async fn handle_get_question(
    State(state): State<AppState>,
    body: Option<Json<GetQuestionBody>>,
) -> Response {
    let job_role = body.and_then(|Json(body)| body.job_role);
    let role = job_role
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_JOB_ROLE);
    info!("Fetching question for role: {role}");

    match state.ai.get_question(role).await {
        Ok(question) => Json(QuestionResponse { question }).into_response(),
        Err(e) => {
            error!("Question fetch failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(QuestionResponse {
                    question: FALLBACK_RELAY_QUESTION.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /api/submit-answer
pub async fn handle_submit_answer(
    State(state): State<AppState>,
    Json(body): Json<GradeRequest>,
) -> Result<Json<GradeResponse>, AppError> {
    if body.question.trim().is_empty() {
        return Err(AppError::Validation("question must not be empty".to_string()));
    }
    if body.user_answer.trim().is_empty() {
        return Err(AppError::Validation("user_answer must not be empty".to_string()));
    }

    let graded = state
        .ai
        .grade_answer(body.question.trim(), body.user_answer.trim())
        .await
        .map_err(AppError::Grading)?;
    info!("Relayed grade {}/10", graded.score);
    Ok(Json(graded))
}

/// POST /api/chat
/// Engine failures degrade to a canned reply with 200.
pub async fn handle_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if body.message.trim().is_empty() {
        return Err(AppError::Validation("message must not be empty".to_string()));
    }

    let reply = match state.ai.chat(&body.message).await {
        Ok(reply) => reply,
        Err(e) => {
            error!("Chat relay failed: {e}");
            CHAT_UNAVAILABLE_REPLY.to_string()
        }
    };
    Ok(Json(ChatResponse { reply }))
}
