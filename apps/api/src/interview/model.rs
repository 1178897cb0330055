//! Data model for a proctored interview session.
//!
//! Everything here is plain data owned by one `InterviewSession`. Mutation happens only
//! through the session's transition function; the snapshot types are the read-only view
//! pushed to the client after every event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai_client::{validate_score, AiError, GradeResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewMode {
    Text,
    Voice,
}

/// Which interview screen hosts the session.
///
/// `Live` is the proctored screen (camera, focus monitor, mode-gated speech).
/// `Voice` is the standalone voice screen: no camera or proctoring, always speaks,
/// and waits for the voice catalog before asking the first question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Live,
    Voice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    AwaitingQuestion,
    AwaitingAnswer,
    Submitting,
    ShowingFeedback,
    Ended,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        self == Phase::Ended
    }
}

/// The question currently on screen. Replaced wholesale each cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub text: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    #[default]
    Typed,
    TranscribedPartial,
    TranscribedFinal,
}

/// The candidate's answer buffer.
///
/// Finalized transcript fragments are appended, never substituted. Interim fragments
/// are held separately for display and never enter the committed text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Answer {
    text: String,
    source: AnswerSource,
    interim: Option<String>,
}

impl Answer {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source(&self) -> AnswerSource {
        self.source
    }

    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Replaces the buffer with what the candidate typed.
    pub fn replace_typed(&mut self, text: &str) {
        self.text = text.to_string();
        self.source = AnswerSource::Typed;
        self.interim = None;
    }

    /// Appends a finalized recognition result, space-separated. Returns false for
    /// fragments that are empty after trimming.
    pub fn append_final(&mut self, fragment: &str) -> bool {
        let fragment = fragment.trim();
        self.interim = None;
        if fragment.is_empty() {
            return false;
        }
        if !self.text.is_empty() && !self.text.ends_with(char::is_whitespace) {
            self.text.push(' ');
        }
        self.text.push_str(fragment);
        self.source = AnswerSource::TranscribedFinal;
        true
    }

    pub fn set_interim(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            self.interim = None;
        } else {
            self.interim = Some(fragment.to_string());
            self.source = AnswerSource::TranscribedPartial;
        }
    }

    pub fn clear(&mut self) {
        *self = Answer::default();
    }
}

/// Grading result for one submitted answer. Read-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub score: u8,
    pub commentary: String,
}

impl Feedback {
    /// Sentence spoken back to the candidate after grading.
    pub fn summary(&self) -> String {
        format!("You scored {}. {}", self.score, self.commentary.trim())
    }
}

impl TryFrom<GradeResponse> for Feedback {
    type Error = AiError;

    fn try_from(response: GradeResponse) -> Result<Self, Self::Error> {
        Ok(Feedback {
            score: validate_score(response.score)?,
            commentary: response.feedback,
        })
    }
}

/// Running record of integrity violations. `count` never decreases.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViolationRecord {
    pub count: u32,
    pub reason: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Speech output vs. speech input. Never both true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VoiceChannelState {
    pub speaking: bool,
    pub listening: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Read-only views
// ────────────────────────────────────────────────────────────────────────────

/// Everything the client needs to render the interview screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub role: String,
    pub mode: InterviewMode,
    pub screen: Screen,
    pub phase: Phase,
    pub question: Option<String>,
    pub answer: String,
    pub answer_source: AnswerSource,
    pub interim: Option<String>,
    pub feedback: Option<Feedback>,
    pub elapsed_seconds: u64,
    pub clock: String,
    pub violations: ViolationRecord,
    pub proctor_message: String,
    pub voice: VoiceChannelState,
    pub voice_ready: bool,
    pub camera_live: bool,
    pub input_enabled: bool,
    pub can_submit: bool,
    pub notice: Option<String>,
}

/// Reported to the navigation collaborator when a session ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub role: String,
    pub mode: InterviewMode,
    pub elapsed_seconds: u64,
    pub answered: u32,
    pub average_score: Option<f32>,
    pub violations: u32,
}

/// Formats elapsed seconds as `m:ss`.
pub fn format_clock(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
