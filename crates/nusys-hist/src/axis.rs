use nusys_core::Binning;
use serde::{Deserialize, Serialize};

/// Handling of fills outside the axis range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowPolicy {
    /// Fold underflow into the first bin and overflow into the last bin.
    #[default]
    Clamp,
    /// Keep out-of-range weight out of the bins; it is still tallied.
    Drop,
}

/// Where a coordinate falls on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Inside bin `n`.
    Bin(usize),
    /// Below the lower edge.
    Underflow,
    /// At or above the upper edge.
    Overflow,
    /// NaN or infinite coordinate.
    Invalid,
}

/// Locates `value` on `binning`. Bins are `[low, high)`; the upper edge itself
/// overflows.
pub fn locate(binning: &Binning, value: f64) -> Location {
    if !value.is_finite() {
        return Location::Invalid;
    }
    if value < binning.low {
        return Location::Underflow;
    }
    if value >= binning.high {
        return Location::Overflow;
    }
    let bin = ((value - binning.low) / binning.width()).floor() as usize;
    // Rounding at the top edge can land one past the last bin.
    Location::Bin(bin.min(binning.bins - 1))
}

/// Running tally of weight that landed outside the axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowTally {
    /// Weight below the lower edge (clamped or dropped per policy).
    pub underflow: f64,
    /// Weight at or above the upper edge (clamped or dropped per policy).
    pub overflow: f64,
    /// Fills with a non-finite coordinate; never placed in a bin.
    pub rejected: u64,
}

impl FlowTally {
    /// Adds another tally.
    pub fn add(&mut self, other: &FlowTally) {
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.rejected += other.rejected;
    }

    /// Resolves `value` to a bin index under `policy`, tallying any flow.
    pub(crate) fn resolve(
        &mut self,
        binning: &Binning,
        policy: FlowPolicy,
        value: f64,
        weight: f64,
    ) -> Option<usize> {
        match locate(binning, value) {
            Location::Bin(bin) => Some(bin),
            Location::Underflow => {
                self.underflow += weight;
                match policy {
                    FlowPolicy::Clamp => Some(0),
                    FlowPolicy::Drop => None,
                }
            }
            Location::Overflow => {
                self.overflow += weight;
                match policy {
                    FlowPolicy::Clamp => Some(binning.bins - 1),
                    FlowPolicy::Drop => None,
                }
            }
            Location::Invalid => {
                self.rejected += 1;
                None
            }
        }
    }
}
