//! The Q&A exchange cycle: question, answer, grade, feedback.
//!
//! At most one call to the AI engine is outstanding at a time. Every call carries a
//! ticket; a completion whose ticket does not match the outstanding call is stale and
//! is dropped, so an old question can never overwrite an answer being graded.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::ai_client::{AiError, GradeResponse};
use crate::interview::model::{Answer, Feedback, Question};

/// Asked when the engine cannot produce a question.
pub const FALLBACK_QUESTION: &str = "Tell me about your experience.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCall {
    Question(u64),
    Grading(u64),
}

/// A grading request ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradeJob {
    pub ticket: u64,
    pub question: String,
    pub user_answer: String,
}

#[derive(Debug, Default)]
pub struct Exchange {
    question: Option<Question>,
    answer: Answer,
    feedback: Option<Feedback>,
    pending: Option<PendingCall>,
    next_ticket: u64,
    scores: Vec<u8>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn question(&self) -> Option<&Question> {
        self.question.as_ref()
    }

    pub fn answer(&self) -> &Answer {
        &self.answer
    }

    pub fn answer_mut(&mut self) -> &mut Answer {
        &mut self.answer
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn pending(&self) -> Option<PendingCall> {
        self.pending
    }

    pub fn scores(&self) -> &[u8] {
        &self.scores
    }

    fn issue_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    /// Starts a new cycle: clears the answer and feedback and reserves the question call.
    /// Returns `None` while another call is outstanding.
    pub fn begin_fetch(&mut self) -> Option<u64> {
        if self.pending.is_some() {
            return None;
        }
        let ticket = self.issue_ticket();
        self.answer.clear();
        self.feedback = None;
        self.pending = Some(PendingCall::Question(ticket));
        Some(ticket)
    }

    /// Applies a question result. A transport failure installs `FALLBACK_QUESTION`.
    /// Returns the installed question, or `None` for a stale ticket.
    pub fn complete_fetch(
        &mut self,
        ticket: u64,
        result: Result<String, AiError>,
        now: DateTime<Utc>,
    ) -> Option<&Question> {
        if self.pending != Some(PendingCall::Question(ticket)) {
            warn!("Discarding stale question result (ticket {ticket})");
            return None;
        }
        self.pending = None;

        let text = match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("AI engine sent a blank question, using fallback");
                FALLBACK_QUESTION.to_string()
            }
            Err(e) => {
                warn!("Question fetch failed: {e}. Using fallback");
                FALLBACK_QUESTION.to_string()
            }
        };

        self.question = Some(Question {
            text,
            issued_at: now,
        });
        self.question.as_ref()
    }

    /// Reserves the grading call for the current question and answer.
    /// Returns `None` without a question, with a blank answer, or while a call is outstanding.
    pub fn begin_grading(&mut self) -> Option<GradeJob> {
        if self.pending.is_some() || self.answer.is_blank() {
            return None;
        }
        let question = self.question.as_ref()?.text.clone();
        let ticket = self.issue_ticket();
        self.pending = Some(PendingCall::Grading(ticket));
        Some(GradeJob {
            ticket,
            question,
            user_answer: self.answer.text().trim().to_string(),
        })
    }

    /// Applies a grading result. The answer is left intact on failure so it can be
    /// resubmitted. Returns `None` for a stale ticket.
    pub fn complete_grading(
        &mut self,
        ticket: u64,
        result: Result<GradeResponse, AiError>,
    ) -> Option<Result<&Feedback, AiError>> {
        if self.pending != Some(PendingCall::Grading(ticket)) {
            warn!("Discarding stale grading result (ticket {ticket})");
            return None;
        }
        self.pending = None;

        match result.and_then(Feedback::try_from) {
            Ok(feedback) => {
                info!("Answer graded {}/10", feedback.score);
                self.scores.push(feedback.score);
                self.feedback = Some(feedback);
                self.feedback.as_ref().map(Ok)
            }
            Err(e) => {
                warn!("Grading failed: {e}");
                Some(Err(e))
            }
        }
    }

    pub fn average_score(&self) -> Option<f32> {
        if self.scores.is_empty() {
            return None;
        }
        let total: u32 = self.scores.iter().map(|s| u32::from(*s)).sum();
        Some(total as f32 / self.scores.len() as f32)
    }
}
