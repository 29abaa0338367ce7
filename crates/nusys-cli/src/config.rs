//! YAML run configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nusys_boot::BootstrapConfig;
use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{
    default_knobs, default_variables, KnobRegistry, RecoVar, SystematicKnob, VariableSchema,
};
use nusys_cov::CovOptions;
use nusys_hist::FlowPolicy;
use nusys_reweight::DEFAULT_TABLE;
use serde::{Deserialize, Serialize};

fn default_tag() -> String {
    "SELECTED_1MU1P".to_string()
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_threads() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_output() -> PathBuf {
    PathBuf::from("nusys_store.json")
}

/// Where a selected-interaction table comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "kebab-case")]
pub enum SelectionSource {
    /// Headed CSV table.
    Csv {
        /// Table path.
        path: PathBuf,
    },
    /// Tagged selection log.
    TaggedLog {
        /// Log path.
        path: PathBuf,
        /// Tag of selected-interaction lines.
        #[serde(default = "default_tag")]
        tag: String,
        /// Payload columns after the identity fields; schema order when empty.
        #[serde(default)]
        columns: Vec<String>,
        /// Tag of processed-readout lines, used for explicit bootstrap universes.
        #[serde(default)]
        event_tag: Option<String>,
    },
}

impl SelectionSource {
    /// Source path.
    pub fn path(&self) -> &Path {
        match self {
            SelectionSource::Csv { path } | SelectionSource::TaggedLog { path, .. } => path,
        }
    }

    fn rebase(&mut self, base: &Path) {
        let path = match self {
            SelectionSource::Csv { path } | SelectionSource::TaggedLog { path, .. } => path,
        };
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }
}

/// Input weight files of the reweight stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesConfig {
    /// File list path.
    pub list: PathBuf,
    /// Directory relative entries are resolved against.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Table read from every file.
    #[serde(default = "default_table")]
    pub table: String,
}

/// One discrete variation resampled against the nominal sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationConfig {
    /// Variation name used as the artifact prefix.
    pub name: String,
    /// Nominal sample; the run's selection when absent.
    #[serde(default)]
    pub nominal: Option<SelectionSource>,
    /// Varied sample.
    pub variation: SelectionSource,
    /// Draw count.
    #[serde(default)]
    pub draws: Option<usize>,
    /// Seed; the run seed when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Readouts per draw as a fraction of the universe.
    #[serde(default)]
    pub sample_fraction: Option<f64>,
    /// Groups whose covariance sums include this variation.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Complete run description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Reconstructed variables; the standard table when absent.
    #[serde(default)]
    pub variables: Option<Vec<RecoVar>>,
    /// Continuous knobs; the standard multisim table when absent.
    #[serde(default)]
    pub knobs: Option<Vec<SystematicKnob>>,
    /// Nominal selected interactions.
    pub selection: SelectionSource,
    /// Weight files; the reweight stage is skipped when absent.
    #[serde(default)]
    pub files: Option<FilesConfig>,
    /// Discrete variations.
    #[serde(default)]
    pub bootstrap: Vec<VariationConfig>,
    /// Extra group membership, group name to systematic names.
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    /// Master seed.
    #[serde(default)]
    pub seed: u64,
    /// Default draw count.
    #[serde(default)]
    pub draws: Option<usize>,
    /// Worker threads for reweighting and bootstrap.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Out-of-range handling.
    #[serde(default)]
    pub flow: FlowPolicy,
    /// Covariance reduction settings.
    #[serde(default)]
    pub covariance: CovOptions,
    /// Add selected cosmic candidates to the reweight histograms.
    #[serde(default = "default_true")]
    pub cosmics: bool,
    /// Write statistical covariances of the selection.
    #[serde(default = "default_true")]
    pub statistical: bool,
    /// Output store path.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

impl RunConfig {
    /// Loads a configuration and resolves relative paths against the
    /// directory holding it.
    pub fn load(path: &Path) -> Result<Self, NusysError> {
        let text = fs::read_to_string(path).map_err(|err| {
            NusysError::Config(
                ErrorInfo::new("config_read", "failed to read run configuration")
                    .with_context("file", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let mut config: RunConfig = serde_yaml::from_str(&text).map_err(|err| {
            NusysError::Config(
                ErrorInfo::new("config_parse", "invalid run configuration")
                    .with_context("file", path.display().to_string())
                    .with_hint(err.to_string()),
            )
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.rebase(base);
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        self.selection.rebase(base);
        if let Some(files) = &mut self.files {
            if files.list.is_relative() {
                files.list = base.join(&files.list);
            }
            // Without an explicit base, entries are relative to the list itself.
            files.base_dir = match files.base_dir.take() {
                Some(dir) if dir.is_relative() => Some(base.join(dir)),
                Some(dir) => Some(dir),
                None => files.list.parent().map(Path::to_path_buf),
            };
        }
        for variation in &mut self.bootstrap {
            variation.variation.rebase(base);
            if let Some(nominal) = &mut variation.nominal {
                nominal.rebase(base);
            }
        }
        if self.output.is_relative() {
            self.output = base.join(&self.output);
        }
    }

    /// Validated variable schema.
    pub fn schema(&self) -> Result<VariableSchema, NusysError> {
        VariableSchema::new(self.variables.clone().unwrap_or_else(default_variables))
    }

    /// Validated knob registry with configured group membership applied.
    pub fn knob_registry(&self) -> Result<KnobRegistry, NusysError> {
        let mut knobs = self.knobs.clone().unwrap_or_else(default_knobs);
        for knob in &mut knobs {
            for (group, members) in &self.groups {
                if members.contains(&knob.name) && !knob.groups.contains(group) {
                    knob.groups.push(group.clone());
                }
            }
        }
        KnobRegistry::new(knobs)
    }

    /// Resampling settings of one variation.
    pub fn bootstrap_config(&self, variation: &VariationConfig) -> BootstrapConfig {
        let mut config = BootstrapConfig::with_seed(variation.seed.unwrap_or(self.seed));
        if let Some(draws) = variation.draws.or(self.draws) {
            config.draws = draws;
        }
        if let Some(fraction) = variation.sample_fraction {
            config.sample_fraction = fraction;
        }
        config.threads = if self.threads > 1 { self.threads } else { 0 };
        config
    }

    /// Group name to member systematics, over knobs and variations.
    pub fn group_members(&self, knobs: &KnobRegistry) -> BTreeMap<String, Vec<String>> {
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for knob in knobs.iter() {
            for group in &knob.groups {
                groups.entry(group.clone()).or_default().push(knob.name.clone());
            }
        }
        for variation in &self.bootstrap {
            let configured = self
                .groups
                .iter()
                .filter(|(_, members)| members.contains(&variation.name))
                .map(|(group, _)| group);
            for group in configured.chain(&variation.groups) {
                let members = groups.entry(group.clone()).or_default();
                if !members.contains(&variation.name) {
                    members.push(variation.name.clone());
                }
            }
        }
        groups
    }
}
