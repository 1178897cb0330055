/// AI engine client. The single point of entry for calls to the question/grading service.
///
/// ARCHITECTURAL RULE: no other module talks to the AI engine over HTTP.
/// Handlers and interview sessions depend on the `AiEngine` trait, never on reqwest.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
/// Highest score the grading service may return.
pub const MAX_SCORE: i64 = 10;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("AI engine error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("AI engine returned an empty question")]
    EmptyQuestion,

    #[error("Score {0} is outside 0..=10")]
    InvalidScore(i64),

    #[error("AI engine unavailable after {attempts} attempts")]
    Unavailable { attempts: u32 },
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRequest {
    pub job_role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeRequest {
    pub question: String,
    pub user_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResponse {
    pub score: i64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

/// Checks a grading score against the 0–10 contract.
pub fn validate_score(score: i64) -> Result<u8, AiError> {
    if (0..=MAX_SCORE).contains(&score) {
        Ok(score as u8)
    } else {
        Err(AiError::InvalidScore(score))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// The AI engine as seen by the rest of the service. Carried in `AppState` as
/// `Arc<dyn AiEngine>` and handed to every interview session.
#[async_trait]
pub trait AiEngine: Send + Sync {
    async fn get_question(&self, job_role: &str) -> Result<String, AiError>;

    async fn grade_answer(&self, question: &str, user_answer: &str)
        -> Result<GradeResponse, AiError>;

    async fn chat(&self, message: &str) -> Result<String, AiError>;

    /// Raw status document from the engine's root endpoint.
    async fn status(&self) -> Result<serde_json::Value, AiError>;
}

// ────────────────────────────────────────────────────────────────────────────
// HTTP implementation
// ────────────────────────────────────────────────────────────────────────────

/// reqwest-backed client for the AI engine, with retry on 429/5xx.
#[derive(Clone)]
pub struct AiClient {
    client: Client,
    base_url: String,
}

impl AiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AiError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        endpoint_url(&self.base_url, path)
    }

    /// POSTs a JSON body and decodes the JSON response.
    /// Retries on 429 and 5xx with exponential backoff.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path);
        let mut last_error: Option<AiError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                // 250ms, 500ms
                let delay = Duration::from_millis(250 * (1 << (attempt - 1)));
                warn!(
                    "AI engine call to {} failed (attempt {}), retrying after {}ms...",
                    path,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match self.client.post(&url).json(body).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(AiError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let message = response.text().await.unwrap_or_default();
                warn!("AI engine returned {} for {}: {}", status, path, message);
                last_error = Some(AiError::Api {
                    status: status.as_u16(),
                    message,
                });
                continue;
            }

            if !status.is_success() {
                return Err(AiError::Api {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }

            debug!("AI engine call to {} succeeded", path);
            return Ok(response.json().await?);
        }

        Err(last_error.unwrap_or(AiError::Unavailable {
            attempts: MAX_ATTEMPTS,
        }))
    }
}

#[async_trait]
impl AiEngine for AiClient {
    async fn get_question(&self, job_role: &str) -> Result<String, AiError> {
        let response: QuestionResponse = self
            .post_json(
                "/get-question",
                &QuestionRequest {
                    job_role: job_role.to_string(),
                },
            )
            .await?;

        let question = response.question.trim();
        if question.is_empty() {
            return Err(AiError::EmptyQuestion);
        }
        Ok(question.to_string())
    }

    async fn grade_answer(
        &self,
        question: &str,
        user_answer: &str,
    ) -> Result<GradeResponse, AiError> {
        let response: GradeResponse = self
            .post_json(
                "/grade-answer",
                &GradeRequest {
                    question: question.to_string(),
                    user_answer: user_answer.to_string(),
                },
            )
            .await?;

        validate_score(response.score)?;
        Ok(response)
    }

    async fn chat(&self, message: &str) -> Result<String, AiError> {
        let response: ChatResponse = self
            .post_json(
                "/chat",
                &ChatRequest {
                    message: message.to_string(),
                },
            )
            .await?;
        Ok(response.reply.trim().to_string())
    }

    async fn status(&self) -> Result<serde_json::Value, AiError> {
        let response = self.client.get(self.endpoint("/")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

/// Joins the engine base URL and a route path with exactly one slash.
fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
