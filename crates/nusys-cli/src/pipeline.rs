//! Stage orchestration from a run configuration to a written store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use nusys_boot::{bootstrap, bootstrap_name, BootstrapResult, ReadoutUniverse};
use nusys_core::errors::NusysError;
use nusys_core::{
    Diagnostic, Diagnostics, KnobRegistry, ReadoutKey, RunProvenance, VariableSchema,
};
use nusys_cov::{statistical, Summarizer, SummaryUnit};
use nusys_hist::{
    artifact_name, content_hash, Histogram1D, Histogram2D, HistogramStore, StoreFile, COV_SUFFIX,
};
use nusys_reweight::{accumulate_parallel, load_file_list, JsonTableReader, ReweightContext};
use nusys_select::{read_csv, read_event_log, read_tagged_log, SelectionIndex};
use tracing::info;

use crate::config::{RunConfig, SelectionSource, VariationConfig};

/// Stages to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub reweight: bool,
    pub bootstrap: bool,
}

impl Stages {
    pub const ALL: Stages = Stages {
        reweight: true,
        bootstrap: true,
    };
}

/// Loads a selected-interaction table.
pub fn load_selection(
    source: &SelectionSource,
    schema: &VariableSchema,
) -> Result<SelectionIndex, NusysError> {
    match source {
        SelectionSource::Csv { path } => read_csv(path, schema),
        SelectionSource::TaggedLog {
            path, tag, columns, ..
        } => {
            let columns = if columns.is_empty() {
                schema.names().into_iter().map(str::to_string).collect()
            } else {
                columns.clone()
            };
            read_tagged_log(path, tag, &columns, schema)
        }
    }
}

fn processed_readouts(source: &SelectionSource) -> Result<Option<BTreeSet<ReadoutKey>>, NusysError> {
    match source {
        SelectionSource::TaggedLog {
            path,
            event_tag: Some(tag),
            ..
        } => read_event_log(path, tag).map(Some),
        _ => Ok(None),
    }
}

/// Histogram pair awaiting covariance reduction.
struct Pending {
    unit: SummaryUnit,
    universes: Histogram2D,
    central: Histogram1D,
}

struct RunState {
    store: HistogramStore,
    diagnostics: Diagnostics,
    pending: Vec<Pending>,
    total_pot: f64,
    inputs: Vec<String>,
}

fn reweight_stage(
    config: &RunConfig,
    schema: &VariableSchema,
    knobs: &KnobRegistry,
    index: &SelectionIndex,
    state: &mut RunState,
) -> Result<(), NusysError> {
    let Some(files) = &config.files else {
        info!("no weight files configured; reweight stage skipped");
        return Ok(());
    };
    let list = load_file_list(&files.list, files.base_dir.as_deref())?;
    let reader = JsonTableReader::new(None).with_table(files.table.clone());
    let template = ReweightContext::new(schema.clone(), knobs.clone(), config.flow);
    let mut context = accumulate_parallel(template, &reader, &list, index, config.threads)?;
    if config.cosmics {
        context.add_cosmic_background(index);
    }
    context.export(&mut state.store)?;
    for pair in context.pairs() {
        let variable = &schema.variables()[pair.variable].name;
        state.pending.push(Pending {
            unit: SummaryUnit::member(pair.knob.clone(), variable.clone()),
            universes: pair.universes.clone(),
            central: pair.central.clone(),
        });
    }
    let stats = context.stats();
    info!(
        files = list.len(),
        failed = stats.files_failed,
        matched = stats.matched,
        pot = context.total_pot(),
        "reweight stage finished"
    );
    state.total_pot += context.total_pot();
    state.inputs.extend(list);
    state.diagnostics.extend(context.into_diagnostics());
    Ok(())
}

fn run_variation(
    config: &RunConfig,
    variation: &VariationConfig,
    schema: &VariableSchema,
    nominal_index: &SelectionIndex,
) -> Result<(BootstrapResult, Diagnostics), NusysError> {
    let mut diagnostics = Diagnostics::new();
    let nominal_source = variation.nominal.as_ref().unwrap_or(&config.selection);
    let owned_nominal = match &variation.nominal {
        Some(source) => Some(load_selection(source, schema)?),
        None => None,
    };
    if let Some(owned) = &owned_nominal {
        diagnostics.extend(owned.diagnostics().clone());
    }
    let nominal = owned_nominal.as_ref().unwrap_or(nominal_index);
    let varied = load_selection(&variation.variation, schema)?;
    diagnostics.extend(varied.diagnostics().clone());
    let universe = match (
        processed_readouts(nominal_source)?,
        processed_readouts(&variation.variation)?,
    ) {
        (Some(nominal_list), Some(variation_list)) => {
            ReadoutUniverse::from_event_lists(&nominal_list, &variation_list)
        }
        _ => ReadoutUniverse::intersection(nominal, &varied),
    };
    let settings = config.bootstrap_config(variation);
    let result = bootstrap(
        &variation.name,
        nominal,
        &varied,
        &universe,
        schema,
        &settings,
        config.flow,
    )?;
    Ok((result, diagnostics))
}

fn bootstrap_stage(
    config: &RunConfig,
    schema: &VariableSchema,
    index: &SelectionIndex,
    state: &mut RunState,
) -> Result<(), NusysError> {
    for variation in &config.bootstrap {
        let (result, diagnostics) = match run_variation(config, variation, schema, index) {
            Ok(outcome) => outcome,
            Err(err) => {
                state
                    .diagnostics
                    .push(Diagnostic::from_error(&err).with_systematic(variation.name.clone()));
                continue;
            }
        };
        result.export(&mut state.store)?;
        for h in &result.variables {
            let diff = bootstrap_name(&variation.name, &h.variable, "diff");
            let ratio = bootstrap_name(&variation.name, &h.variable, "ratio");
            state.pending.push(Pending {
                unit: SummaryUnit::standalone(variation.name.clone(), h.variable.clone(), diff)
                    .with_group_member(true),
                universes: h.diff.clone(),
                central: h.diff_cv.clone(),
            });
            state.pending.push(Pending {
                unit: SummaryUnit::standalone(variation.name.clone(), h.variable.clone(), ratio),
                universes: h.ratio.clone(),
                central: h.ratio_cv.clone(),
            });
        }
        state.inputs.push(variation.variation.path().display().to_string());
        state.diagnostics.extend(diagnostics);
        state.diagnostics.extend(result.diagnostics);
    }
    Ok(())
}

/// Runs the configured stages and assembles the output envelope.
pub fn execute(config: &RunConfig, stages: Stages) -> Result<StoreFile, NusysError> {
    let schema = config.schema()?;
    let knobs = config.knob_registry()?;
    let index = load_selection(&config.selection, &schema)?;
    info!(
        selected = index.len(),
        duplicates = index.duplicates(),
        variables = schema.len(),
        knobs = knobs.len(),
        "selection loaded"
    );
    let mut state = RunState {
        store: HistogramStore::new(),
        diagnostics: index.diagnostics().clone(),
        pending: Vec::new(),
        total_pot: 0.0,
        inputs: vec![config.selection.path().display().to_string()],
    };
    if stages.reweight {
        reweight_stage(config, &schema, &knobs, &index, &mut state)?;
    }
    if stages.bootstrap {
        bootstrap_stage(config, &schema, &index, &mut state)?;
    }

    let RunState {
        store,
        mut diagnostics,
        pending,
        total_pot,
        inputs,
    } = state;
    let mut summarizer = Summarizer::new(store, config.covariance);
    for item in &pending {
        summarizer.add(&item.unit, &item.universes, &item.central);
    }
    if config.statistical {
        for (position, var) in schema.iter().enumerate() {
            let stem = artifact_name("statistical", &var.name);
            let counts =
                index.histogram(&schema, position, format!("{stem}_counts"), config.flow);
            let unit = SummaryUnit::standalone("statistical", var.name.clone(), stem.clone());
            summarizer.add_matrix(&unit, statistical(format!("{stem}{COV_SUFFIX}"), &counts));
        }
    }
    let groups: BTreeMap<String, Vec<String>> = config.group_members(&knobs);
    summarizer.finish_groups(&groups);
    let (store, reduction) = summarizer.finish();
    diagnostics.extend(reduction);

    let mut tool_versions = BTreeMap::new();
    tool_versions.insert("nusys".to_string(), env!("CARGO_PKG_VERSION").to_string());
    let provenance = RunProvenance {
        input_hash: content_hash(config)?,
        seed: config.seed,
        inputs,
        created_at: Utc::now().to_rfc3339(),
        tool_versions,
    };
    info!(
        artifacts = store.len(),
        diagnostics = diagnostics.len(),
        pot = total_pot,
        "run assembled"
    );
    StoreFile::new(provenance, total_pot, diagnostics, store)
}
