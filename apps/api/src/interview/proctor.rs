//! Turns visibility and focus loss into proctoring violations.
//!
//! Violations are advisory. The monitor never ends a session; it escalates the spoken
//! warning count and masks input for a fixed cool-down. Each trigger bumps a generation
//! so only the cool-down scheduled by the latest trigger clears `active`.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::interview::model::ViolationRecord;

pub const SECURE_ENVIRONMENT: &str = "Secure Environment Active";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationReason {
    /// The page became hidden.
    TabSwitch,
    /// The window lost focus.
    FocusLost,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::TabSwitch => write!(f, "Tab Switch Detected"),
            ViolationReason::FocusLost => write!(f, "Focus Lost"),
        }
    }
}

/// What the session does with one trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationAlert {
    pub count: u32,
    pub generation: u64,
    /// Forced spoken warning.
    pub warning: String,
    /// Transient on-screen alert.
    pub message: String,
}

pub struct ProctorMonitor {
    record: ViolationRecord,
    generation: u64,
    watching: bool,
}

impl ProctorMonitor {
    pub fn new(watching: bool) -> Self {
        Self {
            record: ViolationRecord::default(),
            generation: 0,
            watching,
        }
    }

    pub fn record(&self) -> &ViolationRecord {
        &self.record
    }

    pub fn is_active(&self) -> bool {
        self.record.active
    }

    pub fn trigger(&mut self, reason: ViolationReason, now: DateTime<Utc>) -> Option<ViolationAlert> {
        if !self.watching {
            debug!("Ignoring {reason}: proctoring not watching");
            return None;
        }

        self.generation += 1;
        self.record.count += 1;
        self.record.reason = Some(reason.to_string());
        self.record.triggered_at = Some(now);
        self.record.active = true;
        warn!("Violation {}: {}", self.record.count, reason);

        Some(ViolationAlert {
            count: self.record.count,
            generation: self.generation,
            warning: format!("Warning {}. {}. Stay focused.", self.record.count, reason),
            message: format!("ALERT: {reason}"),
        })
    }

    /// Ends the cool-down started by `generation`. Returns true if `active` was cleared.
    pub fn expire(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.record.active {
            return false;
        }
        self.record.active = false;
        true
    }

    /// Status line shown over the camera preview.
    pub fn status_message(&self) -> String {
        match (&self.record.reason, self.record.active) {
            (Some(reason), true) => format!("ALERT: {reason}"),
            _ => SECURE_ENVIRONMENT.to_string(),
        }
    }

    pub fn stop(&mut self) {
        self.watching = false;
        self.record.active = false;
    }
}
