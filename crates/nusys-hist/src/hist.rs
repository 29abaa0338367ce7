use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::Binning;
use serde::{Deserialize, Serialize};

use crate::axis::{FlowPolicy, FlowTally};

fn shape_error(code: &str, name: &str, message: &str) -> NusysError {
    NusysError::Histogram(ErrorInfo::new(code, message).with_context("histogram", name))
}

/// Dense one-dimensional accumulator over a variable axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram1D {
    /// Artifact name.
    pub name: String,
    /// Variable binning.
    pub axis: Binning,
    /// Out-of-range handling.
    #[serde(default)]
    pub flow: FlowPolicy,
    /// Sum of weights per bin.
    pub contents: Vec<f64>,
    /// Weight that fell outside the axis.
    #[serde(default)]
    pub tally: FlowTally,
    /// Number of fill calls that landed in a bin.
    #[serde(default)]
    pub entries: u64,
}

impl Histogram1D {
    /// Creates an empty histogram with clamping flow semantics.
    pub fn new(name: impl Into<String>, axis: Binning) -> Self {
        Self::with_flow(name, axis, FlowPolicy::Clamp)
    }

    /// Creates an empty histogram with an explicit flow policy.
    pub fn with_flow(name: impl Into<String>, axis: Binning, flow: FlowPolicy) -> Self {
        Self {
            name: name.into(),
            axis,
            flow,
            contents: vec![0.0; axis.bins],
            tally: FlowTally::default(),
            entries: 0,
        }
    }

    /// Number of bins.
    pub fn bins(&self) -> usize {
        self.contents.len()
    }

    /// Adds `weight` at coordinate `x`. Returns the bin that received it.
    pub fn fill(&mut self, x: f64, weight: f64) -> Option<usize> {
        let bin = self.tally.resolve(&self.axis, self.flow, x, weight)?;
        self.contents[bin] += weight;
        self.entries += 1;
        Some(bin)
    }

    /// Content of `bin`.
    pub fn get(&self, bin: usize) -> f64 {
        self.contents[bin]
    }

    /// Overwrites the content of `bin`.
    pub fn set(&mut self, bin: usize, value: f64) {
        self.contents[bin] = value;
    }

    /// Sum over all bins.
    pub fn integral(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Adds another histogram of identical shape bin by bin.
    pub fn merge(&mut self, other: &Histogram1D) -> Result<(), NusysError> {
        if self.axis != other.axis || self.flow != other.flow {
            return Err(shape_error(
                "h1_merge_shape",
                &self.name,
                "cannot merge histograms with different axes",
            ));
        }
        for (lhs, rhs) in self.contents.iter_mut().zip(&other.contents) {
            *lhs += rhs;
        }
        self.tally.add(&other.tally);
        self.entries += other.entries;
        Ok(())
    }
}

/// Dense accumulator over (variable bin, universe or draw index).
///
/// Contents are stored row-major by variable bin, so the universes of one
/// variable bin are contiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram2D {
    /// Artifact name.
    pub name: String,
    /// Variable binning (X).
    pub x: Binning,
    /// Universe binning (Y), `[0, U)` with `U` bins for universe histograms.
    pub y: Binning,
    /// Out-of-range handling on both axes.
    #[serde(default)]
    pub flow: FlowPolicy,
    /// Sum of weights, `contents[xbin * ny + ybin]`.
    pub contents: Vec<f64>,
    /// X-axis flow tally.
    #[serde(default)]
    pub tally: FlowTally,
    /// Number of fill calls that landed in a bin.
    #[serde(default)]
    pub entries: u64,
}

impl Histogram2D {
    /// Creates an empty histogram with clamping flow semantics.
    pub fn new(name: impl Into<String>, x: Binning, y: Binning) -> Self {
        Self::with_flow(name, x, y, FlowPolicy::Clamp)
    }

    /// Creates a (variable × universe) histogram with `universes` unit-width Y bins.
    pub fn universes(
        name: impl Into<String>,
        x: Binning,
        universes: usize,
        flow: FlowPolicy,
    ) -> Self {
        Self::with_flow(name, x, Binning::indices(universes), flow)
    }

    /// Creates an empty histogram with an explicit flow policy.
    pub fn with_flow(name: impl Into<String>, x: Binning, y: Binning, flow: FlowPolicy) -> Self {
        Self {
            name: name.into(),
            x,
            y,
            flow,
            contents: vec![0.0; x.bins * y.bins],
            tally: FlowTally::default(),
            entries: 0,
        }
    }

    /// Number of variable bins.
    pub fn nx(&self) -> usize {
        self.x.bins
    }

    /// Number of universe bins.
    pub fn ny(&self) -> usize {
        self.y.bins
    }

    /// Adds `weight` at variable coordinate `x` in universe column `universe`.
    /// Universe indices past the last column clamp to it.
    pub fn fill(&mut self, x: f64, universe: usize, weight: f64) -> Option<usize> {
        let ny = self.ny();
        if ny == 0 {
            return None;
        }
        let xbin = self.tally.resolve(&self.x, self.flow, x, weight)?;
        let ybin = universe.min(ny - 1);
        self.contents[xbin * ny + ybin] += weight;
        self.entries += 1;
        Some(xbin)
    }

    /// Adds `weights[u]` at variable coordinate `x` in every universe `u`.
    /// Only the first `ny` weights are used.
    pub fn fill_universes(&mut self, x: f64, weights: &[f64]) -> Option<usize> {
        let total = weights.iter().sum();
        let xbin = self.tally.resolve(&self.x, self.flow, x, total)?;
        let row = self.row_mut(xbin);
        for (cell, weight) in row.iter_mut().zip(weights) {
            *cell += weight;
        }
        self.entries += weights.len().min(self.ny()) as u64;
        Some(xbin)
    }

    /// Content of `(xbin, ybin)`.
    pub fn get(&self, xbin: usize, ybin: usize) -> f64 {
        self.contents[xbin * self.ny() + ybin]
    }

    /// Overwrites the content of `(xbin, ybin)`.
    pub fn set(&mut self, xbin: usize, ybin: usize, value: f64) {
        let ny = self.ny();
        self.contents[xbin * ny + ybin] = value;
    }

    /// All universes of one variable bin.
    pub fn row(&self, xbin: usize) -> &[f64] {
        let ny = self.ny();
        &self.contents[xbin * ny..(xbin + 1) * ny]
    }

    /// Mutable universes of one variable bin.
    pub fn row_mut(&mut self, xbin: usize) -> &mut [f64] {
        let ny = self.ny();
        &mut self.contents[xbin * ny..(xbin + 1) * ny]
    }

    /// All variable bins of one universe.
    pub fn column(&self, ybin: usize) -> Vec<f64> {
        (0..self.nx()).map(|xbin| self.get(xbin, ybin)).collect()
    }

    /// Writes a full universe column.
    pub fn set_column(&mut self, ybin: usize, values: &[f64]) {
        for (xbin, value) in values.iter().enumerate().take(self.nx()) {
            self.set(xbin, ybin, *value);
        }
    }

    /// Adds a 1D histogram over the same variable axis into column `ybin`,
    /// carrying its flow tally and entry count.
    pub fn add_column(&mut self, ybin: usize, column: &Histogram1D) -> Result<(), NusysError> {
        if column.axis != self.x || ybin >= self.ny() {
            return Err(NusysError::Histogram(
                ErrorInfo::new("h2_column_shape", "column does not fit the histogram")
                    .with_context("histogram", self.name.clone())
                    .with_context("column", column.name.clone())
                    .with_context("ybin", ybin.to_string()),
            ));
        }
        let ny = self.ny();
        for (xbin, value) in column.contents.iter().enumerate() {
            self.contents[xbin * ny + ybin] += value;
        }
        self.tally.add(&column.tally);
        self.entries += column.entries;
        Ok(())
    }

    /// Per-bin mean over universes.
    pub fn mean_over_universes(&self, name: impl Into<String>) -> Histogram1D {
        let mut out = Histogram1D::with_flow(name, self.x, self.flow);
        let ny = self.ny().max(1) as f64;
        for xbin in 0..self.nx() {
            out.set(xbin, self.row(xbin).iter().sum::<f64>() / ny);
        }
        out
    }

    /// Adds another histogram of identical shape bin by bin.
    pub fn merge(&mut self, other: &Histogram2D) -> Result<(), NusysError> {
        if self.x != other.x || self.y != other.y || self.flow != other.flow {
            return Err(NusysError::Histogram(
                ErrorInfo::new("h2_merge_shape", "cannot merge histograms with different axes")
                    .with_context("histogram", self.name.clone())
                    .with_context("lhs_universes", self.ny().to_string())
                    .with_context("rhs_universes", other.ny().to_string()),
            ));
        }
        for (lhs, rhs) in self.contents.iter_mut().zip(&other.contents) {
            *lhs += rhs;
        }
        self.tally.add(&other.tally);
        self.entries += other.entries;
        Ok(())
    }

    /// Adds the universes `other` shares with `self`, keeping `self`'s
    /// universe count. Only the variable axis and flow policy must agree.
    pub fn merge_overlap(&mut self, other: &Histogram2D) -> Result<(), NusysError> {
        if self.x != other.x || self.flow != other.flow {
            return Err(NusysError::Histogram(
                ErrorInfo::new(
                    "h2_merge_axis",
                    "cannot merge histograms with different variable axes",
                )
                .with_context("histogram", self.name.clone()),
            ));
        }
        let shared = self.ny().min(other.ny());
        for xbin in 0..self.nx() {
            let rhs = &other.row(xbin)[..shared];
            for (lhs, rhs) in self.row_mut(xbin)[..shared].iter_mut().zip(rhs) {
                *lhs += rhs;
            }
        }
        self.tally.add(&other.tally);
        self.entries += other.entries * shared as u64 / other.ny().max(1) as u64;
        Ok(())
    }
}
