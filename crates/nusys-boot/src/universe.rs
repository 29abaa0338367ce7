use std::collections::BTreeSet;

use nusys_core::ReadoutKey;
use nusys_select::SelectionIndex;

/// Readouts eligible for resampling, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadoutUniverse {
    readouts: Vec<ReadoutKey>,
}

impl ReadoutUniverse {
    /// Readouts holding at least one selected interaction in both indices.
    pub fn intersection(nominal: &SelectionIndex, variation: &SelectionIndex) -> Self {
        let nominal: BTreeSet<ReadoutKey> = nominal.readouts().into_keys().collect();
        let variation: BTreeSet<ReadoutKey> = variation.readouts().into_keys().collect();
        Self::from_event_lists(&nominal, &variation)
    }

    /// Readouts processed by both samples, as listed in their event logs.
    /// Drawn readouts without selected interactions contribute nothing.
    pub fn from_event_lists(nominal: &BTreeSet<ReadoutKey>, variation: &BTreeSet<ReadoutKey>) -> Self {
        Self {
            readouts: nominal.intersection(variation).copied().collect(),
        }
    }

    /// Number of readouts.
    pub fn len(&self) -> usize {
        self.readouts.len()
    }

    /// Whether no readout is shared.
    pub fn is_empty(&self) -> bool {
        self.readouts.is_empty()
    }

    /// Readouts in key order.
    pub fn readouts(&self) -> &[ReadoutKey] {
        &self.readouts
    }
}
