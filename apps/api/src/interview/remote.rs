//! Browser-backed devices and the interview socket protocol.
//!
//! The candidate's browser owns the real camera, synthesizer and recognizer. The
//! session drives them through `RemoteDevices`, which turns every device call into a
//! `ServerMessage` on the socket outbox. Client messages flow back through
//! `RemoteDevices::translate`: camera answers complete the pending acquisition, and
//! everything else becomes a `SessionEvent`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::interview::devices::{
    Camera, CaptureTrack, DeviceError, SessionDevices, SpeechRecognizer, SpeechSynthesizer,
    Utterance, Voice,
};
use crate::interview::driver::SessionUpdate;
use crate::interview::model::{SessionSnapshot, SessionSummary};
use crate::interview::session::{NoticeKind, SessionEvent};

// ────────────────────────────────────────────────────────────────────────────
// Wire protocol
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    CameraReady { track_ids: Vec<String> },
    CameraUnavailable { reason: String },
    Voices { names: Vec<String> },
    SpeechStarted { utterance_id: u64 },
    SpeechEnded { utterance_id: u64 },
    Transcript { text: String, is_final: bool },
    VisibilityHidden,
    FocusLost,
    AnswerTyped { text: String },
    StartListening,
    StopListening,
    Submit,
    Next,
    RepeatQuestion,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AcquireCamera,
    StopTrack {
        track_id: String,
    },
    DetachPreview,
    Speak {
        utterance_id: u64,
        text: String,
        voice: Option<String>,
    },
    CancelSpeech,
    StartRecognition,
    StopRecognition,
    Snapshot {
        snapshot: SessionSnapshot,
    },
    Alert {
        message: String,
    },
    Error {
        message: String,
    },
    Ended {
        summary: SessionSummary,
    },
}

impl From<SessionUpdate> for ServerMessage {
    fn from(update: SessionUpdate) -> Self {
        match update {
            SessionUpdate::Notice(notice) => match notice.kind {
                NoticeKind::Alert => ServerMessage::Alert {
                    message: notice.message,
                },
                NoticeKind::Error => ServerMessage::Error {
                    message: notice.message,
                },
            },
            SessionUpdate::Ended(summary) => ServerMessage::Ended { summary },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Devices
// ────────────────────────────────────────────────────────────────────────────

type CameraReply = Result<Vec<String>, DeviceError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RemoteDevices {
    outbox: mpsc::UnboundedSender<ServerMessage>,
    pending_camera: Mutex<Option<oneshot::Sender<CameraReply>>>,
}

impl RemoteDevices {
    pub fn new(outbox: mpsc::UnboundedSender<ServerMessage>) -> Arc<Self> {
        Arc::new(Self {
            outbox,
            pending_camera: Mutex::new(None),
        })
    }

    pub fn session_devices(self: &Arc<Self>) -> SessionDevices {
        SessionDevices {
            camera: self.clone(),
            synthesizer: self.clone(),
            recognizer: self.clone(),
        }
    }

    fn post(&self, message: ServerMessage) -> bool {
        self.outbox.send(message).is_ok()
    }

    /// Tells the browser to stop tracks nobody is waiting for.
    fn release_unclaimed(&self, track_ids: Vec<String>) {
        info!("Releasing {} unclaimed camera track(s)", track_ids.len());
        for track_id in track_ids {
            self.post(ServerMessage::StopTrack { track_id });
        }
        self.post(ServerMessage::DetachPreview);
    }

    pub fn translate(&self, message: ClientMessage) -> Option<SessionEvent> {
        let event = match message {
            ClientMessage::CameraReady { track_ids } => {
                let pending = lock(&self.pending_camera).take();
                match pending {
                    Some(reply) => {
                        if let Err(Ok(track_ids)) = reply.send(Ok(track_ids)) {
                            self.release_unclaimed(track_ids);
                        }
                    }
                    None => self.release_unclaimed(track_ids),
                }
                return None;
            }
            ClientMessage::CameraUnavailable { reason } => {
                if let Some(reply) = lock(&self.pending_camera).take() {
                    let _ = reply.send(Err(DeviceError::PermissionDenied(reason)));
                }
                return None;
            }
            ClientMessage::Voices { names } => {
                SessionEvent::VoicesChanged(names.into_iter().map(Voice::new).collect())
            }
            ClientMessage::SpeechStarted { utterance_id } => SessionEvent::SpeechStarted(utterance_id),
            ClientMessage::SpeechEnded { utterance_id } => SessionEvent::SpeechEnded(utterance_id),
            ClientMessage::Transcript { text, is_final } => SessionEvent::Transcript { text, is_final },
            ClientMessage::VisibilityHidden => SessionEvent::VisibilityHidden,
            ClientMessage::FocusLost => SessionEvent::FocusLost,
            ClientMessage::AnswerTyped { text } => SessionEvent::AnswerTyped(text),
            ClientMessage::StartListening => SessionEvent::StartListening,
            ClientMessage::StopListening => SessionEvent::StopListening,
            ClientMessage::Submit => SessionEvent::Submit,
            ClientMessage::Next => SessionEvent::Advance,
            ClientMessage::RepeatQuestion => SessionEvent::RepeatQuestion,
            ClientMessage::End => SessionEvent::End,
        };
        Some(event)
    }
}

#[derive(Debug)]
struct RemoteTrack {
    id: String,
    outbox: mpsc::UnboundedSender<ServerMessage>,
    stopped: bool,
}

impl CaptureTrack for RemoteTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.outbox.send(ServerMessage::StopTrack {
            track_id: self.id.clone(),
        });
    }
}

#[async_trait]
impl Camera for RemoteDevices {
    async fn acquire(&self) -> Result<Vec<Box<dyn CaptureTrack>>, DeviceError> {
        let (tx, rx) = oneshot::channel();
        if lock(&self.pending_camera).replace(tx).is_some() {
            debug!("Superseding an unanswered camera request");
        }
        if !self.post(ServerMessage::AcquireCamera) {
            return Err(DeviceError::Disconnected);
        }

        let track_ids = rx.await.map_err(|_| DeviceError::Disconnected)??;
        if track_ids.is_empty() {
            return Err(DeviceError::Unavailable);
        }
        Ok(track_ids
            .into_iter()
            .map(|id| {
                Box::new(RemoteTrack {
                    id,
                    outbox: self.outbox.clone(),
                    stopped: false,
                }) as Box<dyn CaptureTrack>
            })
            .collect())
    }

    fn detach_preview(&self) {
        self.post(ServerMessage::DetachPreview);
    }
}

impl SpeechSynthesizer for RemoteDevices {
    fn speak(&self, utterance: &Utterance) {
        self.post(ServerMessage::Speak {
            utterance_id: utterance.id,
            text: utterance.text.clone(),
            voice: utterance.voice.as_ref().map(|v| v.name.clone()),
        });
    }

    fn cancel(&self) {
        self.post(ServerMessage::CancelSpeech);
    }
}

impl SpeechRecognizer for RemoteDevices {
    fn start(&self) {
        self.post(ServerMessage::StartRecognition);
    }

    fn stop(&self) {
        self.post(ServerMessage::StopRecognition);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote() -> (Arc<RemoteDevices>, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RemoteDevices::new(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_client_messages_parse_by_type_tag() {
        let parsed: ClientMessage = serde_json::from_value(json!({
            "type": "transcript",
            "text": "REST is",
            "is_final": false
        }))
        .unwrap();
        assert_eq!(
            parsed,
            ClientMessage::Transcript {
                text: "REST is".to_string(),
                is_final: false
            }
        );

        let parsed: ClientMessage =
            serde_json::from_value(json!({ "type": "visibility_hidden" })).unwrap();
        assert_eq!(parsed, ClientMessage::VisibilityHidden);

        assert!(serde_json::from_value::<ClientMessage>(json!({ "type": "reboot" })).is_err());
    }

    #[test]
    fn test_server_messages_serialize_with_type_tag() {
        let value = serde_json::to_value(ServerMessage::Speak {
            utterance_id: 3,
            text: "Explain REST".to_string(),
            voice: Some("Samantha".to_string()),
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "type": "speak",
                "utterance_id": 3,
                "text": "Explain REST",
                "voice": "Samantha"
            })
        );

        let value = serde_json::to_value(ServerMessage::StopTrack {
            track_id: "video-0".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({ "type": "stop_track", "track_id": "video-0" }));
    }

    #[test]
    fn test_translate_maps_session_events() {
        let (devices, _rx) = remote();
        assert!(matches!(
            devices.translate(ClientMessage::Next),
            Some(SessionEvent::Advance)
        ));
        match devices.translate(ClientMessage::Voices {
            names: vec!["Samantha".to_string()],
        }) {
            Some(SessionEvent::VoicesChanged(voices)) => {
                assert_eq!(voices, vec![Voice::new("Samantha")])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acquire_round_trips_through_browser() {
        let (devices, mut rx) = remote();
        let acquiring = {
            let devices = devices.clone();
            tokio::spawn(async move { devices.acquire().await })
        };

        assert_eq!(rx.recv().await, Some(ServerMessage::AcquireCamera));
        assert!(devices
            .translate(ClientMessage::CameraReady {
                track_ids: vec!["video-0".to_string()],
            })
            .is_none());

        let mut tracks = acquiring.await.unwrap().unwrap();
        assert_eq!(tracks[0].id(), "video-0");
        tracks[0].stop();
        tracks[0].stop();
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::StopTrack {
                track_id: "video-0".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_denied_camera_surfaces_reason() {
        let (devices, mut rx) = remote();
        let acquiring = {
            let devices = devices.clone();
            tokio::spawn(async move { devices.acquire().await })
        };
        rx.recv().await;
        devices.translate(ClientMessage::CameraUnavailable {
            reason: "NotAllowedError".to_string(),
        });

        let result = acquiring.await.unwrap();
        assert!(matches!(result, Err(DeviceError::PermissionDenied(r)) if r == "NotAllowedError"));
    }

    #[test]
    fn test_unrequested_camera_is_released() {
        let (devices, mut rx) = remote();
        devices.translate(ClientMessage::CameraReady {
            track_ids: vec!["video-0".to_string(), "video-1".to_string()],
        });
        assert_eq!(
            drain(&mut rx),
            vec![
                ServerMessage::StopTrack {
                    track_id: "video-0".to_string()
                },
                ServerMessage::StopTrack {
                    track_id: "video-1".to_string()
                },
                ServerMessage::DetachPreview,
            ]
        );
    }

    #[test]
    fn test_notice_updates_map_to_alert_and_error() {
        use crate::interview::session::Notice;

        assert_eq!(
            ServerMessage::from(SessionUpdate::Notice(Notice::alert("ALERT: Focus Lost"))),
            ServerMessage::Alert {
                message: "ALERT: Focus Lost".to_string()
            }
        );
        assert_eq!(
            ServerMessage::from(SessionUpdate::Notice(Notice::error("Error grading answer."))),
            ServerMessage::Error {
                message: "Error grading answer.".to_string()
            }
        );
    }
}
