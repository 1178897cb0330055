//! Capability boundary between an interview session and the candidate's devices.
//!
//! The session never touches a camera, speaker or microphone directly. It drives these
//! traits, and device notifications (speech finished, transcript results, voice catalog
//! changes) come back as `SessionEvent`s. Production wiring is `remote::RemoteDevices`,
//! which proxies every call to the browser over the interview socket.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No capture device available")]
    Unavailable,

    #[error("Device channel closed")]
    Disconnected,
}

/// One live track of a capture stream.
pub trait CaptureTrack: Send + fmt::Debug {
    fn id(&self) -> &str;
    fn stop(&mut self);
}

#[async_trait]
pub trait Camera: Send + Sync {
    /// Requests a video-only capture stream.
    async fn acquire(&self) -> Result<Vec<Box<dyn CaptureTrack>>, DeviceError>;

    /// Detaches the stream from whatever preview sink is showing it.
    fn detach_preview(&self);
}

/// A synthesis voice as enumerated by the speech engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
}

impl Voice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub id: u64,
    pub text: String,
    pub voice: Option<Voice>,
}

pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, utterance: &Utterance);
    fn cancel(&self);
}

pub trait SpeechRecognizer: Send + Sync {
    /// Starts continuous, interim-inclusive recognition.
    fn start(&self);
    fn stop(&self);
}

/// The devices one session owns for its lifetime.
#[derive(Clone)]
pub struct SessionDevices {
    pub camera: Arc<dyn Camera>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub recognizer: Arc<dyn SpeechRecognizer>,
}
