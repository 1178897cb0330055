//! Interview session state machine.
//!
//! `InterviewSession` is a synchronous transition function: every external signal
//! arrives as one `SessionEvent`, device calls happen inline, and anything that has to
//! wait (camera permission, AI engine calls, cool-down timers) is returned as an
//! `Effect` for the driver to run. Completions come back as events.
//!
//! Phases: Initializing → AwaitingQuestion → AwaitingAnswer → Submitting →
//! ShowingFeedback → AwaitingQuestion … | Ended. The violation overlay sits beside the
//! phase and never changes it.
//!
//! Teardown runs exactly once, from `end()` or from `Drop` when the owner goes away
//! without ending the session.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ai_client::{AiError, GradeResponse};
use crate::interview::devices::{Camera, CaptureTrack, DeviceError, SessionDevices, Voice};
use crate::interview::exchange::{Exchange, GradeJob};
use crate::interview::media::MediaManager;
use crate::interview::model::{
    format_clock, InterviewMode, Phase, Screen, SessionSnapshot, SessionSummary,
};
use crate::interview::proctor::{ProctorMonitor, ViolationReason};
use crate::interview::voice::{VoiceCoordinator, VoiceReady};

pub const VIOLATION_COOLDOWN: Duration = Duration::from_secs(4);
/// Spoken by the voice screen while an answer is being graded.
pub const ANALYZING_ANSWER: &str = "Okay, analyzing your answer.";
pub const GRADING_FAILED: &str = "Error grading answer.";
const DEFAULT_ROLE: &str = "Software Engineer";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub role: String,
    pub mode: InterviewMode,
    pub screen: Screen,
    pub violation_cooldown: Duration,
}

impl SessionOptions {
    pub fn new(role: &str, mode: InterviewMode, screen: Screen) -> Self {
        let role = match role.trim() {
            "" => DEFAULT_ROLE.to_string(),
            role => role.to_string(),
        };
        // The voice screen has no text mode.
        let mode = match screen {
            Screen::Voice => InterviewMode::Voice,
            Screen::Live => mode,
        };
        Self {
            role,
            mode,
            screen,
            violation_cooldown: VIOLATION_COOLDOWN,
        }
    }

    pub fn with_violation_cooldown(mut self, cooldown: Duration) -> Self {
        self.violation_cooldown = cooldown;
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events and effects
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SessionEvent {
    CameraResolved(Result<Vec<Box<dyn CaptureTrack>>, DeviceError>),
    VoicesChanged(Vec<Voice>),
    /// The voice gate resolved.
    VoiceReady,
    SpeechStarted(u64),
    SpeechEnded(u64),
    Transcript { text: String, is_final: bool },
    VisibilityHidden,
    FocusLost,
    AnswerTyped(String),
    StartListening,
    StopListening,
    Submit,
    Advance,
    RepeatQuestion,
    QuestionFetched {
        ticket: u64,
        result: Result<String, AiError>,
    },
    AnswerGraded {
        ticket: u64,
        result: Result<GradeResponse, AiError>,
    },
    ViolationExpired { generation: u64 },
    Tick,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Alert,
    Error,
}

/// Transient message for the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn alert(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Alert,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Work the session cannot do synchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    AcquireCamera,
    AwaitVoiceCatalog,
    FetchQuestion { ticket: u64, role: String },
    GradeAnswer(GradeJob),
    ExpireViolation { generation: u64, after: Duration },
    Notify(Notice),
    /// Report to navigation; the session is over.
    Exit(SessionSummary),
}

// ────────────────────────────────────────────────────────────────────────────
// Session
// ────────────────────────────────────────────────────────────────────────────

pub struct InterviewSession {
    id: Uuid,
    options: SessionOptions,
    phase: Phase,
    elapsed_seconds: u64,
    media: MediaManager,
    voice: VoiceCoordinator,
    proctor: ProctorMonitor,
    exchange: Exchange,
    notice: Option<String>,
    started: bool,
    torn_down: bool,
}

impl InterviewSession {
    pub fn new(options: SessionOptions, devices: SessionDevices) -> Self {
        let proctored = options.screen == Screen::Live;
        Self {
            id: Uuid::new_v4(),
            phase: Phase::Initializing,
            elapsed_seconds: 0,
            media: MediaManager::new(devices.camera),
            voice: VoiceCoordinator::new(options.mode, devices.synthesizer, devices.recognizer),
            proctor: ProctorMonitor::new(proctored),
            exchange: Exchange::new(),
            notice: None,
            started: false,
            torn_down: false,
            options,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_ended(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn camera(&self) -> Arc<dyn Camera> {
        self.media.camera()
    }

    pub fn voice_ready_signal(&self) -> VoiceReady {
        self.voice.ready_signal()
    }

    /// Typed input is accepted only while answering and outside a violation cool-down.
    pub fn input_enabled(&self) -> bool {
        self.phase == Phase::AwaitingAnswer && !self.proctor.is_active()
    }

    pub fn can_submit(&self) -> bool {
        self.input_enabled()
            && !self.exchange.answer().is_blank()
            && self.exchange.pending().is_none()
    }

    /// Enters the session: the live screen asks for the camera, the voice screen waits
    /// for its voice catalog. The first question follows either resolution.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.started || self.is_ended() {
            return vec![];
        }
        self.started = true;
        info!(
            "Session {} starting: role={} mode={:?} screen={:?}",
            self.id, self.options.role, self.options.mode, self.options.screen
        );

        match self.options.screen {
            Screen::Live if self.media.begin_acquire() => vec![Effect::AcquireCamera],
            Screen::Live => vec![],
            Screen::Voice => vec![Effect::AwaitVoiceCatalog],
        }
    }

    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        if self.is_ended() {
            self.handle_after_end(event);
            return vec![];
        }

        match event {
            SessionEvent::CameraResolved(result) => {
                self.media.on_acquired(result);
                if self.phase == Phase::Initializing && self.options.screen == Screen::Live {
                    return self.fetch_question();
                }
                vec![]
            }
            SessionEvent::VoicesChanged(voices) => {
                self.voice.offer_catalog(&voices);
                vec![]
            }
            SessionEvent::VoiceReady => {
                if self.phase == Phase::Initializing && self.options.screen == Screen::Voice {
                    return self.fetch_question();
                }
                vec![]
            }
            SessionEvent::SpeechStarted(id) => {
                debug!("Session {} utterance {} started", self.id, id);
                vec![]
            }
            SessionEvent::SpeechEnded(id) => {
                self.voice.on_speech_ended(id);
                vec![]
            }
            SessionEvent::Transcript { text, is_final } => {
                self.on_transcript(&text, is_final);
                vec![]
            }
            SessionEvent::VisibilityHidden => self.on_violation(ViolationReason::TabSwitch),
            SessionEvent::FocusLost => self.on_violation(ViolationReason::FocusLost),
            SessionEvent::AnswerTyped(text) => {
                if self.input_enabled() {
                    self.exchange.answer_mut().replace_typed(&text);
                } else {
                    debug!("Session {} ignoring typed input in {:?}", self.id, self.phase);
                }
                vec![]
            }
            SessionEvent::StartListening => {
                self.start_listening();
                vec![]
            }
            SessionEvent::StopListening => {
                self.voice.stop_listening();
                vec![]
            }
            SessionEvent::Submit => self.submit_answer(),
            SessionEvent::Advance => self.advance(),
            SessionEvent::RepeatQuestion => {
                self.repeat_question();
                vec![]
            }
            SessionEvent::QuestionFetched { ticket, result } => {
                self.on_question(ticket, result);
                vec![]
            }
            SessionEvent::AnswerGraded { ticket, result } => self.on_graded(ticket, result),
            SessionEvent::ViolationExpired { generation } => {
                if self.proctor.expire(generation) {
                    debug!("Session {} violation cool-down over", self.id);
                }
                vec![]
            }
            SessionEvent::Tick => {
                self.elapsed_seconds += 1;
                vec![]
            }
            SessionEvent::End => self.end(),
        }
    }

    fn handle_after_end(&mut self, event: SessionEvent) {
        match event {
            // A permission prompt answered after the end still hands us a live stream.
            SessionEvent::CameraResolved(result) => self.media.on_acquired(result),
            SessionEvent::QuestionFetched { .. } | SessionEvent::AnswerGraded { .. } => {
                debug!("Session {} ended, discarding AI engine result", self.id);
            }
            _ => {}
        }
    }

    // ── Q&A cycle ───────────────────────────────────────────────────────────

    fn fetch_question(&mut self) -> Vec<Effect> {
        let Some(ticket) = self.exchange.begin_fetch() else {
            warn!("Session {} fetch requested with a call outstanding", self.id);
            return vec![];
        };
        self.voice.stop_listening();
        self.phase = Phase::AwaitingQuestion;
        self.notice = None;
        vec![Effect::FetchQuestion {
            ticket,
            role: self.options.role.clone(),
        }]
    }

    fn on_question(&mut self, ticket: u64, result: Result<String, AiError>) {
        let Some(text) = self
            .exchange
            .complete_fetch(ticket, result, Utc::now())
            .map(|q| q.text.clone())
        else {
            return;
        };
        self.phase = Phase::AwaitingAnswer;
        info!("Session {} asked: {}", self.id, text);
        self.voice.speak(&text, false);
    }

    fn submit_answer(&mut self) -> Vec<Effect> {
        if !self.can_submit() {
            debug!(
                "Session {} submit rejected (phase={:?}, violation_active={})",
                self.id,
                self.phase,
                self.proctor.is_active()
            );
            return vec![];
        }
        self.voice.stop_listening();
        let Some(job) = self.exchange.begin_grading() else {
            return vec![];
        };
        if self.options.screen == Screen::Voice {
            self.voice.speak(ANALYZING_ANSWER, false);
        }
        self.phase = Phase::Submitting;
        self.notice = None;
        vec![Effect::GradeAnswer(job)]
    }

    fn on_graded(&mut self, ticket: u64, result: Result<GradeResponse, AiError>) -> Vec<Effect> {
        let outcome = self
            .exchange
            .complete_grading(ticket, result)
            .map(|r| r.map(|feedback| feedback.summary()));

        match outcome {
            None => vec![],
            Some(Ok(summary)) => {
                self.phase = Phase::ShowingFeedback;
                self.voice.speak(&summary, false);
                vec![]
            }
            Some(Err(_)) => {
                self.phase = Phase::AwaitingAnswer;
                self.notice = Some(GRADING_FAILED.to_string());
                vec![Effect::Notify(Notice::error(GRADING_FAILED))]
            }
        }
    }

    fn advance(&mut self) -> Vec<Effect> {
        if self.phase != Phase::ShowingFeedback {
            debug!("Session {} advance ignored in {:?}", self.id, self.phase);
            return vec![];
        }
        self.fetch_question()
    }

    fn repeat_question(&mut self) {
        if let Some(text) = self.exchange.question().map(|q| q.text.clone()) {
            self.voice.speak(&text, false);
        }
    }

    // ── Voice input ─────────────────────────────────────────────────────────

    fn start_listening(&mut self) {
        if !self.input_enabled() {
            debug!("Session {} cannot listen in {:?}", self.id, self.phase);
            return;
        }
        if self.options.screen == Screen::Voice && !self.voice.is_ready() {
            debug!("Session {} voice engine not ready", self.id);
            return;
        }
        self.voice.start_listening();
    }

    fn on_transcript(&mut self, text: &str, is_final: bool) {
        if self.phase != Phase::AwaitingAnswer {
            debug!("Session {} dropping transcript in {:?}", self.id, self.phase);
            return;
        }
        let answer = self.exchange.answer_mut();
        if is_final {
            answer.append_final(text);
        } else {
            answer.set_interim(text);
        }
    }

    // ── Proctoring ──────────────────────────────────────────────────────────

    fn on_violation(&mut self, reason: ViolationReason) -> Vec<Effect> {
        let Some(alert) = self.proctor.trigger(reason, Utc::now()) else {
            return vec![];
        };
        info!("Session {}: violation {} ({reason})", self.id, alert.count);
        self.voice.speak(&alert.warning, true);
        vec![
            Effect::Notify(Notice::alert(alert.message)),
            Effect::ExpireViolation {
                generation: alert.generation,
                after: self.options.violation_cooldown,
            },
        ]
    }

    // ── Teardown ────────────────────────────────────────────────────────────

    /// Ends the session from any state. Idempotent.
    pub fn end(&mut self) -> Vec<Effect> {
        if self.is_ended() {
            return vec![];
        }
        self.teardown();
        self.phase = Phase::Ended;
        let summary = self.summary();
        info!(
            "Session {} ended after {}s: {} answered, {} violation(s)",
            self.id, summary.elapsed_seconds, summary.answered, summary.violations
        );
        vec![Effect::Exit(summary)]
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        debug!("Session {} tearing down, camera {:?}", self.id, self.media.state());
        self.voice.shutdown();
        self.media.release();
        self.proctor.stop();
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id,
            role: self.options.role.clone(),
            mode: self.options.mode,
            elapsed_seconds: self.elapsed_seconds,
            answered: self.exchange.scores().len() as u32,
            average_score: self.exchange.average_score(),
            violations: self.proctor.record().count,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let answer = self.exchange.answer();
        SessionSnapshot {
            session_id: self.id,
            role: self.options.role.clone(),
            mode: self.options.mode,
            screen: self.options.screen,
            phase: self.phase,
            question: self.exchange.question().map(|q| q.text.clone()),
            answer: answer.text().to_string(),
            answer_source: answer.source(),
            interim: answer.interim().map(str::to_string),
            feedback: self.exchange.feedback().cloned(),
            elapsed_seconds: self.elapsed_seconds,
            clock: format_clock(self.elapsed_seconds),
            violations: self.proctor.record().clone(),
            proctor_message: self.proctor.status_message(),
            voice: self.voice.channel(),
            voice_ready: self.voice.is_ready(),
            camera_live: self.media.is_live(),
            input_enabled: self.input_enabled(),
            can_submit: self.can_submit(),
            notice: self.notice.clone(),
        }
    }
}

impl Drop for InterviewSession {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!("Session {} dropped without end(), tearing down", self.id);
            self.teardown();
        }
    }
}
