//! Stateless HTTP relay in front of the AI engine, for clients that run their own
//! interview flow.

pub mod handlers;

/// Role asked about when the client names none.
pub const DEFAULT_JOB_ROLE: &str = "general";
/// Question returned alongside a 500 when the engine cannot produce one.
pub const FALLBACK_RELAY_QUESTION: &str = "Tell me about yourself.";
/// Chat reply used when the engine is unreachable.
pub const CHAT_UNAVAILABLE_REPLY: &str =
    "I'm having trouble connecting to my brain right now. Try again later.";
