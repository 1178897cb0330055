//! Recording doubles for the device and AI engine traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::ai_client::{AiEngine, AiError, GradeResponse};
use crate::interview::devices::{
    Camera, CaptureTrack, DeviceError, SessionDevices, SpeechRecognizer, SpeechSynthesizer,
    Utterance, Voice,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Speak(Utterance),
    CancelSpeech,
    StartRecognition,
    StopRecognition,
    StopTrack(String),
    DetachPreview,
}

#[derive(Debug, Default)]
pub struct Recorder {
    calls: Mutex<Vec<DeviceCall>>,
}

impl Recorder {
    fn push(&self, call: DeviceCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, wanted: &DeviceCall) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }

    pub fn track_stops(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, DeviceCall::StopTrack(_)))
            .count()
    }

    /// Texts handed to the synthesizer, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                DeviceCall::Speak(u) => Some(u.text),
                _ => None,
            })
            .collect()
    }

    pub fn last_utterance(&self) -> Option<Utterance> {
        self.calls().into_iter().rev().find_map(|c| match c {
            DeviceCall::Speak(u) => Some(u),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct FakeTrack {
    id: String,
    recorder: Arc<Recorder>,
}

impl FakeTrack {
    pub fn boxed(id: &str, recorder: &Arc<Recorder>) -> Box<dyn CaptureTrack> {
        Box::new(FakeTrack {
            id: id.to_string(),
            recorder: Arc::clone(recorder),
        })
    }
}

impl CaptureTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&mut self) {
        self.recorder.push(DeviceCall::StopTrack(self.id.clone()));
    }
}

pub struct FakeCamera {
    recorder: Arc<Recorder>,
    grant: bool,
    delay: Option<Duration>,
}

#[async_trait]
impl Camera for FakeCamera {
    async fn acquire(&self) -> Result<Vec<Box<dyn CaptureTrack>>, DeviceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.grant {
            Ok(vec![FakeTrack::boxed("video-0", &self.recorder)])
        } else {
            Err(DeviceError::PermissionDenied("camera blocked".to_string()))
        }
    }

    fn detach_preview(&self) {
        self.recorder.push(DeviceCall::DetachPreview);
    }
}

pub struct FakeSpeech {
    recorder: Arc<Recorder>,
}

impl SpeechSynthesizer for FakeSpeech {
    fn speak(&self, utterance: &Utterance) {
        self.recorder.push(DeviceCall::Speak(utterance.clone()));
    }

    fn cancel(&self) {
        self.recorder.push(DeviceCall::CancelSpeech);
    }
}

impl SpeechRecognizer for FakeSpeech {
    fn start(&self) {
        self.recorder.push(DeviceCall::StartRecognition);
    }

    fn stop(&self) {
        self.recorder.push(DeviceCall::StopRecognition);
    }
}

pub fn fake_devices(grant_camera: bool) -> (SessionDevices, Arc<Recorder>) {
    fake_devices_with_delay(grant_camera, None)
}

pub fn fake_devices_with_delay(
    grant_camera: bool,
    delay: Option<Duration>,
) -> (SessionDevices, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let speech = Arc::new(FakeSpeech {
        recorder: Arc::clone(&recorder),
    });
    let devices = SessionDevices {
        camera: Arc::new(FakeCamera {
            recorder: Arc::clone(&recorder),
            grant: grant_camera,
            delay,
        }),
        synthesizer: speech.clone(),
        recognizer: speech,
    };
    (devices, recorder)
}

pub fn catalog() -> Vec<Voice> {
    vec![
        Voice::new("Alex"),
        Voice::new("Microsoft Zira - English (United States)"),
    ]
}

pub fn engine_down() -> AiError {
    AiError::Api {
        status: 503,
        message: "engine down".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Question(String),
    Grade { question: String, user_answer: String },
    Chat(String),
}

/// AI engine double with scripted replies and an in-flight high-water mark.
#[derive(Default)]
pub struct ScriptedEngine {
    questions: Mutex<VecDeque<Result<String, AiError>>>,
    grades: Mutex<VecDeque<Result<GradeResponse, AiError>>>,
    offline: bool,
    latency: Duration,
    calls: Mutex<Vec<EngineCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Chat and status fail; scripted questions and grades still answer.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn push_question(&self, reply: Result<&str, AiError>) {
        self.questions
            .lock()
            .unwrap()
            .push_back(reply.map(str::to_string));
    }

    pub fn push_grade(&self, reply: Result<(i64, &str), AiError>) {
        self.grades
            .lock()
            .unwrap()
            .push_back(reply.map(|(score, feedback)| GradeResponse {
                score,
                feedback: feedback.to_string(),
            }));
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AiEngine for ScriptedEngine {
    async fn get_question(&self, job_role: &str) -> Result<String, AiError> {
        self.enter(EngineCall::Question(job_role.to_string())).await;
        self.questions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("Describe a hard {job_role} problem you solved.")))
    }

    async fn grade_answer(
        &self,
        question: &str,
        user_answer: &str,
    ) -> Result<GradeResponse, AiError> {
        self.enter(EngineCall::Grade {
            question: question.to_string(),
            user_answer: user_answer.to_string(),
        })
        .await;
        self.grades.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(GradeResponse {
                score: 8,
                feedback: "Good attempt! You covered the basics.".to_string(),
            })
        })
    }

    async fn chat(&self, message: &str) -> Result<String, AiError> {
        self.calls
            .lock()
            .unwrap()
            .push(EngineCall::Chat(message.to_string()));
        if self.offline {
            Err(engine_down())
        } else {
            Ok(format!("echo: {message}"))
        }
    }

    async fn status(&self) -> Result<serde_json::Value, AiError> {
        if self.offline {
            return Err(engine_down());
        }
        Ok(serde_json::json!({ "status": "AI Coach Active" }))
    }
}
