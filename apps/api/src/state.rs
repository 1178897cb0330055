use std::sync::Arc;

use crate::ai_client::AiEngine;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// AI engine used by the relay routes and by every interview session.
    /// Production: `AiClient`. Tests swap in a scripted engine.
    pub ai: Arc<dyn AiEngine>,
    pub config: Config,
}
