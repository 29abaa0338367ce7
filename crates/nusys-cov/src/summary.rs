//! Reduction of accumulated histograms into covariance artifacts.
//!
//! A [`Summarizer`] turns each (universe histogram, central value) pair into
//! `<stem>_cov`, `<stem>_fractional` and `<stem>_chol` in a store, records
//! failures as diagnostics without stopping, and finally sums member
//! covariances into group covariances.

use std::collections::{BTreeMap, BTreeSet};

use nusys_core::errors::NusysError;
use nusys_core::{Diagnostic, Diagnostics};
use nusys_hist::{
    artifact_name, Artifact, CovarianceMatrix, Histogram1D, Histogram2D, HistogramStore,
    CHOL_SUFFIX, COV_SUFFIX, FRACTIONAL_SUFFIX,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cholesky::{decompose, DEFAULT_TOLERANCE};
use crate::covariance::{covariance, Normalization};
use crate::derived::{fractional, sum};

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// Covariance reduction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CovOptions {
    /// Universe-count normalization.
    #[serde(default)]
    pub normalization: Normalization,
    /// Cholesky pivot tolerance.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for CovOptions {
    fn default() -> Self {
        Self {
            normalization: Normalization::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Identity of one reduction unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryUnit {
    /// Systematic (knob or variation) name.
    pub systematic: String,
    /// Variable name.
    pub variable: String,
    /// Artifact stem the suffixes are appended to.
    pub stem: String,
    /// Whether the covariance takes part in group sums.
    pub group_member: bool,
}

impl SummaryUnit {
    /// Unit named `<systematic>_<variable>` that joins group sums.
    pub fn member(systematic: impl Into<String>, variable: impl Into<String>) -> Self {
        let systematic = systematic.into();
        let variable = variable.into();
        Self {
            stem: artifact_name(&systematic, &variable),
            systematic,
            variable,
            group_member: true,
        }
    }

    /// Unit with an explicit stem that stays out of group sums.
    pub fn standalone(
        systematic: impl Into<String>,
        variable: impl Into<String>,
        stem: impl Into<String>,
    ) -> Self {
        Self {
            systematic: systematic.into(),
            variable: variable.into(),
            stem: stem.into(),
            group_member: false,
        }
    }

    /// Overrides group membership.
    pub fn with_group_member(mut self, member: bool) -> Self {
        self.group_member = member;
        self
    }
}

struct Member {
    cov: CovarianceMatrix,
    fractional: CovarianceMatrix,
}

/// Accumulates covariance artifacts and diagnostics for a run.
pub struct Summarizer {
    options: CovOptions,
    store: HistogramStore,
    diagnostics: Diagnostics,
    members: BTreeMap<(String, String), Member>,
}

impl Summarizer {
    /// Starts from an existing store (usually holding the histograms).
    pub fn new(store: HistogramStore, options: CovOptions) -> Self {
        Self {
            options,
            store,
            diagnostics: Diagnostics::new(),
            members: BTreeMap::new(),
        }
    }

    /// Store built so far.
    pub fn store(&self) -> &HistogramStore {
        &self.store
    }

    /// Diagnostics recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn record(&mut self, unit: &SummaryUnit, err: &NusysError) {
        self.diagnostics.push(
            Diagnostic::from_error(err)
                .with_systematic(unit.systematic.clone())
                .with_variable(unit.variable.clone()),
        );
    }

    fn put(&mut self, unit: &SummaryUnit, artifact: Artifact) {
        if let Err(err) = self.store.insert(artifact) {
            self.record(unit, &err);
        }
    }

    /// Reduces one (universe histogram, central value) pair. Returns whether
    /// every artifact was produced.
    pub fn add(&mut self, unit: &SummaryUnit, universes: &Histogram2D, central: &Histogram1D) -> bool {
        let cov = match covariance(
            format!("{}{COV_SUFFIX}", unit.stem),
            universes,
            central,
            self.options.normalization,
        ) {
            Ok(cov) => cov,
            Err(err) => {
                self.record(unit, &err);
                return false;
            }
        };
        let frac = match fractional(format!("{}{FRACTIONAL_SUFFIX}", unit.stem), &cov, central) {
            Ok(frac) => frac,
            Err(err) => {
                self.record(unit, &err);
                return false;
            }
        };
        let chol = decompose(
            format!("{}{CHOL_SUFFIX}", unit.stem),
            &cov,
            central,
            self.options.tolerance,
        );
        self.put(unit, Artifact::Covariance(cov.clone()));
        self.put(unit, Artifact::Covariance(frac.clone()));
        if unit.group_member {
            self.members.insert(
                (unit.systematic.clone(), unit.variable.clone()),
                Member {
                    cov,
                    fractional: frac,
                },
            );
        }
        match chol {
            Ok(chol) => {
                self.put(unit, Artifact::Cholesky(chol));
                true
            }
            Err(err) => {
                self.record(unit, &err);
                false
            }
        }
    }

    /// Inserts an externally computed covariance, such as the statistical one.
    pub fn add_matrix(&mut self, unit: &SummaryUnit, matrix: CovarianceMatrix) {
        self.put(unit, Artifact::Covariance(matrix));
    }

    /// Writes `<group>_<variable>_cov` and `<group>_<variable>_fractional`
    /// for every group and every variable with at least one member.
    pub fn finish_groups(&mut self, groups: &BTreeMap<String, Vec<String>>) {
        let variables: BTreeSet<String> =
            self.members.keys().map(|(_, variable)| variable.clone()).collect();
        for (group, systematics) in groups {
            for variable in &variables {
                let members: Vec<&Member> = systematics
                    .iter()
                    .filter_map(|sys| self.members.get(&(sys.clone(), variable.clone())))
                    .collect();
                if members.is_empty() {
                    continue;
                }
                let stem = artifact_name(group, variable);
                let unit = SummaryUnit::standalone(group.clone(), variable.clone(), stem.clone());
                let cov = sum(format!("{stem}{COV_SUFFIX}"), members.iter().map(|m| &m.cov));
                let frac = sum(
                    format!("{stem}{FRACTIONAL_SUFFIX}"),
                    members.iter().map(|m| &m.fractional),
                );
                for result in [cov, frac] {
                    match result {
                        Ok(matrix) => self.put(&unit, Artifact::Covariance(matrix)),
                        Err(err) => self.record(&unit, &err),
                    }
                }
            }
            info!(group = %group, members = systematics.len(), "group covariances summed");
        }
    }

    /// Consumes the summarizer.
    pub fn finish(self) -> (HistogramStore, Diagnostics) {
        (self.store, self.diagnostics)
    }
}
