//! Voice I/O: speech output and speech input never overlap.
//!
//! Invariant: `VoiceChannelState::speaking` and `listening` are never both true.
//! Speaking stops the recognizer; listening cancels the synthesizer.
//!
//! Voice selection is pinned by a one-shot `VoiceGate` resolved on the first non-empty
//! catalog. Nothing is handed to the synthesizer before that. An utterance requested
//! earlier is held (latest wins) and played once the catalog arrives.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::interview::devices::{SpeechRecognizer, SpeechSynthesizer, Utterance, Voice};
use crate::interview::model::{InterviewMode, VoiceChannelState};

/// Preferred female voice profiles, best first.
const PREFERRED_VOICES: [&str; 5] = [
    "Microsoft Zira",
    "Microsoft Aria",
    "Google US English",
    "Samantha",
    "Google UK English Female",
];

/// Picks the interviewer voice from an enumeration: a preferred profile, then anything
/// labelled female, then the first voice.
pub fn select_voice(voices: &[Voice]) -> Option<Voice> {
    voices
        .iter()
        .find(|v| PREFERRED_VOICES.iter().any(|p| v.name.contains(p)))
        .or_else(|| {
            voices
                .iter()
                .find(|v| v.name.to_lowercase().contains("female"))
        })
        .or_else(|| voices.first())
        .cloned()
}

// ────────────────────────────────────────────────────────────────────────────
// Readiness gate
// ────────────────────────────────────────────────────────────────────────────

/// Resolved once, by the first non-empty voice enumeration. Later enumerations
/// never change the chosen voice.
pub struct VoiceGate {
    tx: watch::Sender<Option<Voice>>,
}

impl VoiceGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Offers an enumeration. Returns true only for the call that resolved the gate.
    pub fn offer(&self, voices: &[Voice]) -> bool {
        let Some(voice) = select_voice(voices) else {
            return false;
        };
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(voice);
            true
        })
    }

    pub fn is_ready(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn voice(&self) -> Option<Voice> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> VoiceReady {
        VoiceReady {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for VoiceGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Future side of the gate.
pub struct VoiceReady {
    rx: watch::Receiver<Option<Voice>>,
}

impl VoiceReady {
    /// Resolves with the chosen voice, or `None` if the gate was dropped unresolved.
    pub async fn wait(mut self) -> Option<Voice> {
        let chosen = self.rx.wait_for(Option::is_some).await.ok()?;
        chosen.clone()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Coordinator
// ────────────────────────────────────────────────────────────────────────────

pub struct VoiceCoordinator {
    mode: InterviewMode,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    recognizer: Arc<dyn SpeechRecognizer>,
    gate: VoiceGate,
    channel: VoiceChannelState,
    current_utterance: Option<u64>,
    deferred: Option<String>,
    next_utterance: u64,
    closed: bool,
}

impl VoiceCoordinator {
    pub fn new(
        mode: InterviewMode,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        recognizer: Arc<dyn SpeechRecognizer>,
    ) -> Self {
        Self {
            mode,
            synthesizer,
            recognizer,
            gate: VoiceGate::new(),
            channel: VoiceChannelState::default(),
            current_utterance: None,
            deferred: None,
            next_utterance: 1,
            closed: false,
        }
    }

    pub fn channel(&self) -> VoiceChannelState {
        self.channel
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    pub fn ready_signal(&self) -> VoiceReady {
        self.gate.subscribe()
    }

    /// Feeds a voice catalog enumeration. On the first non-empty one the gate resolves
    /// and any deferred utterance is played.
    pub fn offer_catalog(&mut self, voices: &[Voice]) -> bool {
        if !self.gate.offer(voices) {
            return false;
        }
        debug!("Voice catalog ready: {:?}", self.gate.voice());
        if let Some(text) = self.deferred.take() {
            self.play(text);
        }
        true
    }

    /// Speaks `text`, interrupting any speech in flight. Text-mode sessions stay silent
    /// unless `force` is set. Returns the utterance id when playback was started.
    pub fn speak(&mut self, text: &str, force: bool) -> Option<u64> {
        if self.closed || (self.mode == InterviewMode::Text && !force) {
            return None;
        }
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if !self.gate.is_ready() {
            debug!("Voice catalog not ready, deferring utterance");
            self.cancel_speech();
            self.deferred = Some(text.to_string());
            return None;
        }
        Some(self.play(text.to_string()))
    }

    fn play(&mut self, text: String) -> u64 {
        self.synthesizer.cancel();
        if self.channel.listening {
            self.recognizer.stop();
            self.channel.listening = false;
        }

        let id = self.next_utterance;
        self.next_utterance += 1;
        self.synthesizer.speak(&Utterance {
            id,
            text,
            voice: self.gate.voice(),
        });
        self.current_utterance = Some(id);
        self.channel.speaking = true;
        id
    }

    /// Natural completion reported by the synthesizer. Stale ids are ignored.
    pub fn on_speech_ended(&mut self, utterance_id: u64) {
        if self.current_utterance == Some(utterance_id) {
            self.current_utterance = None;
            self.channel.speaking = false;
        }
    }

    pub fn cancel_speech(&mut self) {
        self.synthesizer.cancel();
        self.deferred = None;
        self.current_utterance = None;
        self.channel.speaking = false;
    }

    pub fn start_listening(&mut self) -> bool {
        if self.closed || self.channel.listening {
            return false;
        }
        self.cancel_speech();
        self.recognizer.start();
        self.channel.listening = true;
        true
    }

    pub fn stop_listening(&mut self) -> bool {
        if !self.channel.listening {
            return false;
        }
        self.recognizer.stop();
        self.channel.listening = false;
        true
    }

    /// Silences both directions for good.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.cancel_speech();
        self.stop_listening();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interview::testing::{catalog, fake_devices, DeviceCall, Recorder};

    fn coordinator(mode: InterviewMode) -> (VoiceCoordinator, Arc<Recorder>) {
        let (devices, recorder) = fake_devices(true);
        let mut voice = VoiceCoordinator::new(mode, devices.synthesizer, devices.recognizer);
        voice.offer_catalog(&catalog());
        (voice, recorder)
    }

    #[test]
    fn test_select_voice_prefers_named_profile() {
        let voices = vec![
            Voice::new("Daniel"),
            Voice::new("Karen Female"),
            Voice::new("Google US English"),
        ];
        assert_eq!(select_voice(&voices).unwrap().name, "Google US English");
    }

    #[test]
    fn test_select_voice_falls_back_to_female_then_first() {
        let voices = vec![Voice::new("Daniel"), Voice::new("Karen (female)")];
        assert_eq!(select_voice(&voices).unwrap().name, "Karen (female)");

        let voices = vec![Voice::new("Daniel"), Voice::new("Fred")];
        assert_eq!(select_voice(&voices).unwrap().name, "Daniel");

        assert!(select_voice(&[]).is_none());
    }

    #[test]
    fn test_gate_resolves_once_on_first_non_empty_catalog() {
        let gate = VoiceGate::new();
        assert!(!gate.offer(&[]));
        assert!(!gate.is_ready());

        assert!(gate.offer(&[Voice::new("Samantha")]));
        assert!(!gate.offer(&[Voice::new("Microsoft Zira")]));
        assert_eq!(gate.voice().unwrap().name, "Samantha");
    }

    #[tokio::test]
    async fn test_ready_signal_resolves_after_offer() {
        let gate = VoiceGate::new();
        let ready = gate.subscribe();
        let waiter = tokio::spawn(ready.wait());

        gate.offer(&[]);
        gate.offer(&[Voice::new("Samantha")]);

        let voice = waiter.await.unwrap();
        assert_eq!(voice.unwrap().name, "Samantha");
    }

    #[tokio::test]
    async fn test_ready_signal_is_none_when_gate_dropped() {
        let gate = VoiceGate::new();
        let ready = gate.subscribe();
        drop(gate);
        assert!(ready.wait().await.is_none());
    }

    #[test]
    fn test_text_mode_is_silent_unless_forced() {
        let (mut voice, recorder) = coordinator(InterviewMode::Text);
        assert!(voice.speak("Explain REST", false).is_none());
        assert!(recorder.spoken().is_empty());

        assert!(voice.speak("Warning 1. Focus Lost. Stay focused.", true).is_some());
        assert_eq!(recorder.spoken(), vec!["Warning 1. Focus Lost. Stay focused."]);
        assert!(voice.channel().speaking);
    }

    #[test]
    fn test_speak_uses_gated_voice() {
        let (mut voice, recorder) = coordinator(InterviewMode::Voice);
        voice.speak("Hello", false);
        let utterance = recorder.last_utterance().unwrap();
        assert_eq!(
            utterance.voice.unwrap().name,
            "Microsoft Zira - English (United States)"
        );
    }

    #[test]
    fn test_speak_before_catalog_is_deferred_until_ready() {
        let (devices, recorder) = fake_devices(true);
        let mut voice =
            VoiceCoordinator::new(InterviewMode::Voice, devices.synthesizer, devices.recognizer);

        assert!(voice.speak("First question", false).is_none());
        assert!(voice.speak("Second question", false).is_none());
        assert!(recorder.spoken().is_empty());
        assert!(!voice.channel().speaking);

        voice.offer_catalog(&catalog());
        assert_eq!(recorder.spoken(), vec!["Second question"]);
        assert!(voice.last_voice_is_pinned());
    }

    #[test]
    fn test_start_listening_cancels_speech_first() {
        let (mut voice, recorder) = coordinator(InterviewMode::Voice);
        voice.speak("Question", false);
        assert!(voice.channel().speaking);

        assert!(voice.start_listening());
        let channel = voice.channel();
        assert!(!channel.speaking);
        assert!(channel.listening);

        let calls = recorder.calls();
        let cancel = calls
            .iter()
            .rposition(|c| *c == DeviceCall::CancelSpeech)
            .unwrap();
        let start = calls
            .iter()
            .position(|c| *c == DeviceCall::StartRecognition)
            .unwrap();
        assert!(cancel < start);
    }

    #[test]
    fn test_speak_stops_listening() {
        let (mut voice, recorder) = coordinator(InterviewMode::Voice);
        voice.start_listening();
        voice.speak("Warning 1. Tab Switch Detected. Stay focused.", true);

        let channel = voice.channel();
        assert!(channel.speaking);
        assert!(!channel.listening);
        assert_eq!(recorder.count(&DeviceCall::StopRecognition), 1);
    }

    #[test]
    fn test_stale_speech_end_does_not_clear_speaking() {
        let (mut voice, _) = coordinator(InterviewMode::Voice);
        let first = voice.speak("one", false).unwrap();
        let second = voice.speak("two", false).unwrap();

        voice.on_speech_ended(first);
        assert!(voice.channel().speaking);
        voice.on_speech_ended(second);
        assert!(!voice.channel().speaking);
    }

    #[test]
    fn test_shutdown_silences_everything() {
        let (mut voice, recorder) = coordinator(InterviewMode::Voice);
        voice.start_listening();
        voice.shutdown();

        assert_eq!(voice.channel(), VoiceChannelState::default());
        assert!(voice.speak("after end", true).is_none());
        assert!(!voice.start_listening());
        assert!(recorder.count(&DeviceCall::StopRecognition) >= 1);
    }

    impl VoiceCoordinator {
        fn last_voice_is_pinned(&self) -> bool {
            self.gate.voice().is_some() && self.deferred.is_none()
        }
    }
}
