//! Bootstrap resampling of two samples over their shared readouts.
//!
//! Each draw `b` uses its own RNG substream derived from `(seed, b)` and
//! produces one column per variable and role. Columns are assembled in draw
//! order, so the histograms do not depend on how draws are scheduled.

use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{Diagnostic, Diagnostics, ReadoutKey, RngHandle, VariableSchema};
use nusys_hist::{artifact_name, Artifact, FlowPolicy, Histogram1D, Histogram2D, HistogramStore};
use nusys_select::{ReadoutMap, SelectionIndex};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::universe::ReadoutUniverse;

fn default_draws() -> usize {
    1000
}

fn default_fraction() -> f64 {
    1.0
}

/// Resampling settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Number of resampling rounds.
    #[serde(default = "default_draws")]
    pub draws: usize,
    /// Master seed.
    pub seed: u64,
    /// Fraction `f` in `(0, 1]` of the universe used per round. Each round
    /// draws `floor(f * N)` readouts with replacement from the first
    /// `floor(f * N)` readouts of the universe in key order.
    #[serde(default = "default_fraction")]
    pub sample_fraction: f64,
    /// Worker threads; `0` runs on the calling thread.
    #[serde(default)]
    pub threads: usize,
}

impl BootstrapConfig {
    /// Default draws and fraction with the given seed, sequential.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            draws: default_draws(),
            seed,
            sample_fraction: default_fraction(),
            threads: 0,
        }
    }

    fn validate(&self, systematic: &str) -> Result<(), NusysError> {
        if self.draws == 0 {
            return Err(NusysError::Config(
                ErrorInfo::new("bootstrap_draws", "bootstrap needs at least one draw")
                    .with_context("systematic", systematic),
            ));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(NusysError::Config(
                ErrorInfo::new("bootstrap_fraction", "sample fraction must lie in (0, 1]")
                    .with_context("systematic", systematic)
                    .with_context("sample_fraction", self.sample_fraction.to_string()),
            ));
        }
        Ok(())
    }

    fn sample_size(&self, universe: usize) -> usize {
        ((universe as f64 * self.sample_fraction).floor() as usize).min(universe)
    }
}

/// Bootstrap histograms of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapHistograms {
    /// Variable name.
    pub variable: String,
    /// Nominal sample, one column per draw.
    pub nominal: Histogram2D,
    /// Variation sample, one column per draw.
    pub variation: Histogram2D,
    /// `variation - nominal` per draw.
    pub diff: Histogram2D,
    /// `variation / nominal` per draw, dividing by one where nominal is zero.
    pub ratio: Histogram2D,
    /// Mean of `diff` over draws.
    pub diff_cv: Histogram1D,
    /// Mean of `ratio` over draws.
    pub ratio_cv: Histogram1D,
}

/// All bootstrap output of one discrete variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapResult {
    /// Variation name.
    pub systematic: String,
    /// Readouts in the draw universe.
    pub universe: usize,
    /// Readouts drawn per round.
    pub sample_size: usize,
    /// Per-variable histograms in schema order.
    pub variables: Vec<BootstrapHistograms>,
    /// Recoverable problems.
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Stem of bootstrap artifacts, `<systematic>_<variable>_bootstrap_<role>`.
pub fn bootstrap_name(systematic: &str, variable: &str, role: &str) -> String {
    format!("{}_bootstrap_{role}", artifact_name(systematic, variable))
}

impl BootstrapResult {
    /// Histograms of the variable named `variable`.
    pub fn get(&self, variable: &str) -> Option<&BootstrapHistograms> {
        self.variables.iter().find(|h| h.variable == variable)
    }

    /// Writes the nominal, variation, difference and ratio histograms plus
    /// the difference and ratio central values into `store`.
    pub fn export(&self, store: &mut HistogramStore) -> Result<(), NusysError> {
        for h in &self.variables {
            for hist in [&h.nominal, &h.variation, &h.diff, &h.ratio] {
                store.insert(Artifact::Hist2d(hist.clone()))?;
            }
            store.insert(Artifact::Hist1d(h.diff_cv.clone()))?;
            store.insert(Artifact::Hist1d(h.ratio_cv.clone()))?;
        }
        Ok(())
    }
}

/// One draw's nominal and variation columns, per variable.
struct DrawColumns {
    nominal: Vec<Histogram1D>,
    variation: Vec<Histogram1D>,
}

struct Sample<'a> {
    index: &'a SelectionIndex,
    readouts: ReadoutMap,
}

impl Sample<'_> {
    fn fill(&self, readout: &ReadoutKey, columns: &mut [Histogram1D]) {
        let Some(keys) = self.readouts.get(readout) else {
            return;
        };
        for key in keys {
            if let Some(values) = self.index.get(key) {
                for (column, value) in columns.iter_mut().zip(values) {
                    column.fill(*value, 1.0);
                }
            }
        }
    }
}

fn empty_columns(schema: &VariableSchema, flow: FlowPolicy) -> Vec<Histogram1D> {
    schema
        .iter()
        .map(|var| Histogram1D::with_flow(var.name.clone(), var.binning(), flow))
        .collect()
}

struct Resampler<'a> {
    config: &'a BootstrapConfig,
    universe: &'a ReadoutUniverse,
    sample_size: usize,
    nominal: Sample<'a>,
    variation: Sample<'a>,
    schema: &'a VariableSchema,
    flow: FlowPolicy,
}

impl Resampler<'_> {
    fn draw(&self, b: usize) -> DrawColumns {
        let mut columns = DrawColumns {
            nominal: empty_columns(self.schema, self.flow),
            variation: empty_columns(self.schema, self.flow),
        };
        if self.sample_size == 0 {
            return columns;
        }
        let pool = &self.universe.readouts()[..self.sample_size];
        let mut rng = RngHandle::substream(self.config.seed, b as u64);
        for _ in 0..self.sample_size {
            let readout = &pool[rng.index(pool.len())];
            self.nominal.fill(readout, &mut columns.nominal);
            self.variation.fill(readout, &mut columns.variation);
        }
        columns
    }
}

/// Resamples `nominal` and `variation` over `universe`. Both indices must
/// follow `schema`.
pub fn bootstrap(
    systematic: &str,
    nominal: &SelectionIndex,
    variation: &SelectionIndex,
    universe: &ReadoutUniverse,
    schema: &VariableSchema,
    config: &BootstrapConfig,
    flow: FlowPolicy,
) -> Result<BootstrapResult, NusysError> {
    config.validate(systematic)?;
    for index in [nominal, variation] {
        index.ensure_schema(schema).map_err(|err| {
            NusysError::Selection(err.info().clone().with_context("systematic", systematic))
        })?;
    }
    let mut diagnostics = Diagnostics::new();
    if universe.is_empty() {
        diagnostics.push(
            Diagnostic::warning(
                "bootstrap_empty",
                "nominal and variation share no readouts; bootstrap histograms are empty",
            )
            .with_systematic(systematic),
        );
    }
    let sample_size = config.sample_size(universe.len());
    let resampler = Resampler {
        config,
        universe,
        sample_size,
        nominal: Sample {
            index: nominal,
            readouts: nominal.readouts(),
        },
        variation: Sample {
            index: variation,
            readouts: variation.readouts(),
        },
        schema,
        flow,
    };
    let columns: Vec<DrawColumns> = if config.threads == 0 {
        (0..config.draws).map(|b| resampler.draw(b)).collect()
    } else {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .build()
            .map_err(|err| {
                NusysError::Io(
                    ErrorInfo::new("thread_pool", "failed to build worker pool")
                        .with_context("systematic", systematic)
                        .with_hint(err.to_string()),
                )
            })?;
        pool.install(|| {
            (0..config.draws)
                .into_par_iter()
                .map(|b| resampler.draw(b))
                .collect()
        })
    };
    let variables = assemble(systematic, schema, config.draws, flow, &columns)?;
    info!(
        systematic,
        universe = universe.len(),
        sample_size,
        draws = config.draws,
        "bootstrap resampling finished"
    );
    Ok(BootstrapResult {
        systematic: systematic.to_string(),
        universe: universe.len(),
        sample_size,
        variables,
        diagnostics,
    })
}

fn assemble(
    systematic: &str,
    schema: &VariableSchema,
    draws: usize,
    flow: FlowPolicy,
    columns: &[DrawColumns],
) -> Result<Vec<BootstrapHistograms>, NusysError> {
    let mut out = Vec::with_capacity(schema.len());
    for (v, var) in schema.iter().enumerate() {
        let name = |role: &str| bootstrap_name(systematic, &var.name, role);
        let binning = var.binning();
        let mut nominal = Histogram2D::universes(name("nominal"), binning, draws, flow);
        let mut variation = Histogram2D::universes(name("variation"), binning, draws, flow);
        for (b, draw) in columns.iter().enumerate() {
            nominal.add_column(b, &draw.nominal[v])?;
            variation.add_column(b, &draw.variation[v])?;
        }
        let mut diff = Histogram2D::universes(name("diff"), binning, draws, flow);
        let mut ratio = Histogram2D::universes(name("ratio"), binning, draws, flow);
        for (cell, (nom, alt)) in nominal.contents.iter().zip(&variation.contents).enumerate() {
            diff.contents[cell] = alt - nom;
            let denominator = if *nom == 0.0 { 1.0 } else { *nom };
            ratio.contents[cell] = alt / denominator;
        }
        let diff_cv = diff.mean_over_universes(format!("{}_cv", name("diff")));
        let ratio_cv = ratio.mean_over_universes(format!("{}_cv", name("ratio")));
        out.push(BootstrapHistograms {
            variable: var.name.clone(),
            nominal,
            variation,
            diff,
            ratio,
            diff_cv,
            ratio_cv,
        });
    }
    Ok(out)
}
