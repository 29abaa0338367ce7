//! Event identity keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Interaction id assigned by the selection to candidates without a simulated
/// neutrino parent.
pub const COSMIC_INTERACTION_ID: i64 = -1;

/// Identity of one triggered readout `(run, subrun, event)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReadoutKey {
    /// Run number.
    pub run: u32,
    /// Subrun number.
    pub subrun: u32,
    /// Event number within the subrun.
    pub event: u32,
}

impl ReadoutKey {
    /// Creates a readout key.
    pub const fn new(run: u32, subrun: u32, event: u32) -> Self {
        Self { run, subrun, event }
    }

    /// Returns the key of interaction `interaction_id` within this readout.
    pub const fn interaction(self, interaction_id: i64) -> EventKey {
        EventKey {
            run: self.run,
            subrun: self.subrun,
            event: self.event,
            interaction_id,
        }
    }
}

/// Identity of one selected interaction `(run, subrun, event, interaction_id)`.
///
/// Ordering is the lexicographic tuple ordering of the four fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Run number.
    pub run: u32,
    /// Subrun number.
    pub subrun: u32,
    /// Event number within the subrun.
    pub event: u32,
    /// Interaction index within the readout; `-1` marks a cosmic candidate.
    pub interaction_id: i64,
}

impl EventKey {
    /// Creates an event key.
    pub const fn new(run: u32, subrun: u32, event: u32, interaction_id: i64) -> Self {
        Self {
            run,
            subrun,
            event,
            interaction_id,
        }
    }

    /// Returns the readout that contains this interaction.
    pub const fn readout(&self) -> ReadoutKey {
        ReadoutKey::new(self.run, self.subrun, self.event)
    }

    /// Whether the interaction is a cosmic candidate.
    pub const fn is_cosmic(&self) -> bool {
        self.interaction_id == COSMIC_INTERACTION_ID
    }
}

impl fmt::Display for ReadoutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.run, self.subrun, self.event)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}#{}",
            self.run, self.subrun, self.event, self.interaction_id
        )
    }
}
