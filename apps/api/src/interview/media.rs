//! Single-owner lifetime for the camera capture.
//!
//! The capture is requested once at session start and released exactly once on the
//! teardown path. Acquisition is asynchronous (permission prompt), so a grant can arrive
//! after the session has already ended; such a late capture is stopped on arrival.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::interview::devices::{Camera, CaptureTrack, DeviceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaState {
    Idle,
    Acquiring,
    Live,
    /// Permission denied or no device. The interview continues without a preview.
    Unavailable,
    Released,
}

/// The held capture stream.
#[derive(Debug)]
pub struct MediaHandle {
    tracks: Vec<Box<dyn CaptureTrack>>,
}

impl MediaHandle {
    fn stop_all(mut self) {
        for track in self.tracks.iter_mut() {
            debug!("Stopping capture track {}", track.id());
            track.stop();
        }
    }
}

pub struct MediaManager {
    camera: Arc<dyn Camera>,
    handle: Option<MediaHandle>,
    state: MediaState,
}

impl MediaManager {
    pub fn new(camera: Arc<dyn Camera>) -> Self {
        Self {
            camera,
            handle: None,
            state: MediaState::Idle,
        }
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.state == MediaState::Live
    }

    /// The device acquisition runs against. Only the session driver calls this.
    pub fn camera(&self) -> Arc<dyn Camera> {
        Arc::clone(&self.camera)
    }

    /// Marks acquisition as requested. Returns false if it was already requested,
    /// so the capture is never re-acquired mid-session.
    pub fn begin_acquire(&mut self) -> bool {
        if self.state != MediaState::Idle {
            return false;
        }
        self.state = MediaState::Acquiring;
        true
    }

    /// Takes ownership of an acquisition result.
    pub fn on_acquired(&mut self, result: Result<Vec<Box<dyn CaptureTrack>>, DeviceError>) {
        match (self.state, result) {
            (MediaState::Released, Ok(tracks)) => {
                info!(
                    "Camera granted after session teardown, stopping {} track(s)",
                    tracks.len()
                );
                MediaHandle { tracks }.stop_all();
                self.camera.detach_preview();
            }
            (MediaState::Acquiring, Ok(tracks)) => {
                info!("Camera live with {} track(s)", tracks.len());
                self.handle = Some(MediaHandle { tracks });
                self.state = MediaState::Live;
            }
            (MediaState::Acquiring, Err(e)) => {
                warn!("No camera: {e}. Continuing without preview");
                self.state = MediaState::Unavailable;
            }
            (state, Ok(tracks)) => {
                warn!("Unexpected camera grant in state {state:?}, stopping it");
                MediaHandle { tracks }.stop_all();
            }
            (state, Err(e)) => {
                debug!("Ignoring camera failure in state {state:?}: {e}");
            }
        }
    }

    /// Stops every track of the held stream and detaches the preview.
    /// Safe to call with nothing held; only the first call has any effect.
    pub fn release(&mut self) {
        if self.state == MediaState::Released {
            return;
        }
        self.state = MediaState::Released;
        if let Some(handle) = self.handle.take() {
            handle.stop_all();
            self.camera.detach_preview();
            info!("Camera released");
        }
    }
}
