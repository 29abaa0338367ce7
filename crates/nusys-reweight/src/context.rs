//! Accumulation context owning every reweight histogram of a run.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{Diagnostic, Diagnostics, KnobRegistry, SystematicKnob, VariableSchema};
use nusys_hist::{
    artifact_name, Artifact, FlowPolicy, Histogram1D, Histogram2D, HistogramStore, CV_SUFFIX,
};
use nusys_select::SelectionIndex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::reader::{EventTable, TableReader, TrueInteraction};

/// Universe histogram and central value of one (knob, variable) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnobHistograms {
    /// Knob name.
    pub knob: String,
    /// Position of the variable in the schema.
    pub variable: usize,
    /// Variable × universe sums of weights.
    pub universes: Histogram2D,
    /// Unit-weight fills of matched interactions.
    pub central: Histogram1D,
}

impl KnobHistograms {
    fn new(
        knob: &str,
        variable: usize,
        schema: &VariableSchema,
        universes: usize,
        flow: FlowPolicy,
    ) -> Self {
        let binning = schema.variables()[variable].binning();
        let stem = artifact_name(knob, &schema.variables()[variable].name);
        Self {
            knob: knob.to_string(),
            variable,
            universes: Histogram2D::universes(stem.clone(), binning, universes, flow),
            central: Histogram1D::with_flow(format!("{stem}{CV_SUFFIX}"), binning, flow),
        }
    }

    /// Number of universes.
    pub fn universe_count(&self) -> usize {
        self.universes.ny()
    }

    fn merge(&mut self, other: &KnobHistograms) -> Result<(), NusysError> {
        self.universes.merge(&other.universes)?;
        self.central.merge(&other.central)
    }

    fn merge_overlap(&mut self, other: &KnobHistograms) -> Result<(), NusysError> {
        self.universes.merge_overlap(&other.universes)?;
        self.central.merge(&other.central)
    }
}

/// Run counters kept next to the histograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReweightStats {
    /// Files opened and read.
    pub files_read: u64,
    /// Files that could not be opened.
    pub files_failed: u64,
    /// Records scanned.
    pub records: u64,
    /// Interactions found in the selection index.
    pub matched: u64,
    /// Cosmic candidates added as background.
    pub cosmics: u64,
}

impl ReweightStats {
    fn add(&mut self, other: &ReweightStats) {
        self.files_read += other.files_read;
        self.files_failed += other.files_failed;
        self.records += other.records;
        self.matched += other.matched;
        self.cosmics += other.cosmics;
    }
}

/// Per-file occurrence counts of weight-array problems, reported once per
/// file and knob.
#[derive(Default)]
struct FileAnomalies {
    missing: BTreeMap<String, u64>,
    drift: BTreeMap<String, (usize, usize, u64)>,
}

/// Owns every (knob, variable) histogram pair of a run along with POT,
/// counters and diagnostics. Contexts built with the same schema, knobs and
/// flow policy can be merged by bin-wise addition.
#[derive(Debug, Clone)]
pub struct ReweightContext {
    schema: VariableSchema,
    knobs: KnobRegistry,
    flow: FlowPolicy,
    histograms: BTreeMap<String, KnobHistograms>,
    total_pot: f64,
    stats: ReweightStats,
    cosmics_added: bool,
    diagnostics: Diagnostics,
}

impl ReweightContext {
    /// Creates an empty context. Knobs that declare a universe count get
    /// their histograms up front; the rest are created on first sight.
    pub fn new(schema: VariableSchema, knobs: KnobRegistry, flow: FlowPolicy) -> Self {
        let mut histograms = BTreeMap::new();
        for knob in knobs.iter() {
            if let Some(universes) = knob.universes {
                for variable in 0..schema.len() {
                    let pair = KnobHistograms::new(&knob.name, variable, &schema, universes, flow);
                    histograms.insert(pair.universes.name.clone(), pair);
                }
            }
        }
        Self {
            schema,
            knobs,
            flow,
            histograms,
            total_pot: 0.0,
            stats: ReweightStats::default(),
            cosmics_added: false,
            diagnostics: Diagnostics::new(),
        }
    }

    /// Fresh context with the same schema, knobs and flow policy.
    pub fn empty_like(&self) -> Self {
        Self::new(self.schema.clone(), self.knobs.clone(), self.flow)
    }

    /// Variable schema.
    pub fn schema(&self) -> &VariableSchema {
        &self.schema
    }

    /// Knob registry.
    pub fn knobs(&self) -> &KnobRegistry {
        &self.knobs
    }

    /// Exposure summed over every file read.
    pub fn total_pot(&self) -> f64 {
        self.total_pot
    }

    /// Run counters.
    pub fn stats(&self) -> ReweightStats {
        self.stats
    }

    /// Diagnostics recorded so far.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Histogram pair of `knob` and the variable named `variable`.
    pub fn histograms(&self, knob: &str, variable: &str) -> Option<&KnobHistograms> {
        self.histograms.get(&artifact_name(knob, variable))
    }

    /// Every histogram pair in name order.
    pub fn pairs(&self) -> impl Iterator<Item = &KnobHistograms> {
        self.histograms.values()
    }

    /// Reads one input file and fills every matched interaction.
    ///
    /// Returns the file's exposure. A file that cannot be opened, or an
    /// index built over another schema, leaves every histogram untouched,
    /// contributes zero exposure and is recorded as an error diagnostic.
    pub fn accumulate_file<R: TableReader>(
        &mut self,
        reader: &R,
        file_id: &str,
        index: &SelectionIndex,
    ) -> f64 {
        if let Err(err) = index.ensure_schema(&self.schema) {
            self.stats.files_failed += 1;
            self.diagnostics
                .push(Diagnostic::from_error(&err).with_file(file_id));
            return 0.0;
        }
        let mut table = match reader.open(file_id) {
            Ok(table) => table,
            Err(err) => {
                self.stats.files_failed += 1;
                self.diagnostics
                    .push(Diagnostic::from_error(&err).with_file(file_id));
                return 0.0;
            }
        };
        let pot = table.total_pot();
        let mut anomalies = FileAnomalies::default();
        let mut matched = 0u64;
        while let Some(record) = table.next_record() {
            self.stats.records += 1;
            for interaction in &record.interactions {
                let key = record.key(interaction);
                let Some(values) = index.get(&key) else {
                    continue;
                };
                matched += 1;
                self.fill_interaction(values, interaction, &mut anomalies);
            }
        }
        self.report(file_id, anomalies);
        self.stats.files_read += 1;
        self.stats.matched += matched;
        self.total_pot += pot;
        debug!(file = file_id, pot, matched, "file accumulated");
        pot
    }

    /// Reads every file in order. Returns the exposure summed over them.
    pub fn accumulate_files<R: TableReader, S: AsRef<str>>(
        &mut self,
        reader: &R,
        files: &[S],
        index: &SelectionIndex,
    ) -> f64 {
        files
            .iter()
            .map(|file| self.accumulate_file(reader, file.as_ref(), index))
            .sum()
    }

    fn fill_interaction(
        &mut self,
        values: &[f64],
        interaction: &TrueInteraction,
        anomalies: &mut FileAnomalies,
    ) {
        let Self {
            schema,
            knobs,
            flow,
            histograms,
            ..
        } = self;
        for knob in knobs.iter() {
            let weights = match interaction.wgt.get(knob.index) {
                Some(weights) if !weights.is_empty() => weights.as_slice(),
                _ => {
                    *anomalies.missing.entry(knob.name.clone()).or_default() += 1;
                    continue;
                }
            };
            for (variable, value) in values.iter().enumerate() {
                let pair = pair_for(histograms, knob, variable, schema, weights.len(), *flow);
                let universes = pair.universe_count();
                if weights.len() != universes {
                    let slot = anomalies
                        .drift
                        .entry(knob.name.clone())
                        .or_insert((universes, weights.len(), 0));
                    slot.2 += 1;
                }
                pair.universes.fill_universes(*value, weights);
                pair.central.fill(*value, 1.0);
            }
        }
    }

    fn report(&mut self, file_id: &str, anomalies: FileAnomalies) {
        for (knob, count) in anomalies.missing {
            self.diagnostics.push(
                Diagnostic::warning(
                    "knob_missing",
                    format!("{count} matched interactions carry no weights for this knob"),
                )
                .with_systematic(knob)
                .with_file(file_id),
            );
        }
        for (knob, (expected, found, count)) in anomalies.drift {
            // Drift is counted once per variable.
            let interactions = count / self.schema.len().max(1) as u64;
            self.diagnostics.push(
                Diagnostic::warning(
                    "universe_drift",
                    format!(
                        "{interactions} interactions carry {found} universes, expected {expected}; \
                         only the overlap was filled"
                    ),
                )
                .with_systematic(knob)
                .with_file(file_id),
            );
        }
    }

    /// Adds every selected cosmic candidate to each existing histogram pair
    /// with unit weight in every universe and in the central value.
    ///
    /// Cosmic candidates never appear in weight files, so this runs once per
    /// run after all files; a second call is ignored with a diagnostic.
    pub fn add_cosmic_background(&mut self, index: &SelectionIndex) {
        if let Err(err) = index.ensure_schema(&self.schema) {
            self.diagnostics.push(Diagnostic::from_error(&err));
            return;
        }
        if self.cosmics_added {
            self.diagnostics.push(Diagnostic::warning(
                "cosmics_repeated",
                "cosmic background already added; ignoring",
            ));
            return;
        }
        self.cosmics_added = true;
        let cosmics: Vec<&[f64]> = index.cosmics().map(|(_, values)| values).collect();
        for pair in self.histograms.values_mut() {
            let unit = vec![1.0; pair.universe_count()];
            for values in &cosmics {
                let value = values[pair.variable];
                pair.universes.fill_universes(value, &unit);
                pair.central.fill(value, 1.0);
            }
        }
        self.stats.cosmics += cosmics.len() as u64;
        info!(cosmics = cosmics.len(), pairs = self.histograms.len(), "cosmic background added");
    }

    /// Adds `other` into `self` bin by bin. Pairs only present in `other`
    /// are copied. A pair whose universe count differs keeps `self`'s count,
    /// adds the shared universes and records a `universe_drift` warning.
    /// Differing schemas or flow policies are an error.
    pub fn merge(&mut self, other: ReweightContext) -> Result<(), NusysError> {
        if self.flow != other.flow || self.schema != other.schema {
            return Err(NusysError::Histogram(ErrorInfo::new(
                "context_merge",
                "cannot merge contexts built over different schemas or flow policies",
            )));
        }
        for (name, pair) in other.histograms {
            let variable = self.schema.variables()[pair.variable].name.clone();
            match self.histograms.entry(name) {
                Entry::Occupied(mut slot) => {
                    let lhs = slot.get_mut();
                    let (kept, found) = (lhs.universe_count(), pair.universe_count());
                    let merged = if kept == found {
                        lhs.merge(&pair)
                    } else {
                        self.diagnostics.push(
                            Diagnostic::warning(
                                "universe_drift",
                                format!(
                                    "partial histograms carry {found} universes, expected {kept}; \
                                     only the overlap was merged"
                                ),
                            )
                            .with_systematic(pair.knob.clone())
                            .with_variable(variable.clone()),
                        );
                        lhs.merge_overlap(&pair)
                    };
                    merged.map_err(|err| {
                        NusysError::Histogram(
                            err.info()
                                .clone()
                                .with_context("systematic", pair.knob.clone())
                                .with_context("variable", variable),
                        )
                    })?;
                }
                Entry::Vacant(slot) => {
                    slot.insert(pair);
                }
            }
        }
        self.total_pot += other.total_pot;
        self.stats.add(&other.stats);
        self.cosmics_added |= other.cosmics_added;
        self.diagnostics.extend(other.diagnostics);
        Ok(())
    }

    /// Writes `<knob>_<variable>` and `<knob>_<variable>_cv` into `store`.
    pub fn export(&self, store: &mut HistogramStore) -> Result<(), NusysError> {
        for pair in self.histograms.values() {
            store.insert(Artifact::Hist2d(pair.universes.clone()))?;
            store.insert(Artifact::Hist1d(pair.central.clone()))?;
        }
        Ok(())
    }

    /// Consumes the context, returning its diagnostics.
    pub fn into_diagnostics(self) -> Diagnostics {
        self.diagnostics
    }
}

fn pair_for<'a>(
    histograms: &'a mut BTreeMap<String, KnobHistograms>,
    knob: &SystematicKnob,
    variable: usize,
    schema: &VariableSchema,
    universes: usize,
    flow: FlowPolicy,
) -> &'a mut KnobHistograms {
    let name = artifact_name(&knob.name, &schema.variables()[variable].name);
    histograms
        .entry(name)
        .or_insert_with(|| KnobHistograms::new(&knob.name, variable, schema, universes, flow))
}
