//! Reconstructed-variable schema and systematic knob registry.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, NusysError};

fn schema_error(code: &str, message: impl Into<String>) -> NusysError {
    NusysError::Schema(ErrorInfo::new(code, message))
}

/// Uniform binning `[low, high)` split into `bins` equal-width bins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binning {
    /// Number of bins.
    pub bins: usize,
    /// Lower edge of the first bin.
    pub low: f64,
    /// Upper edge of the last bin.
    pub high: f64,
}

impl Binning {
    /// Creates a binning descriptor without validating it.
    pub const fn new(bins: usize, low: f64, high: f64) -> Self {
        Self { bins, low, high }
    }

    /// Binning `[0, n)` with one unit-width bin per index.
    pub fn indices(n: usize) -> Self {
        Self::new(n, 0.0, n as f64)
    }

    /// Width of a single bin.
    pub fn width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    /// Lower edge of bin `bin`.
    pub fn lower_edge(&self, bin: usize) -> f64 {
        self.low + bin as f64 * self.width()
    }

    /// Checks that the binning has at least one bin and ordered finite edges.
    pub fn validate(&self) -> Result<(), NusysError> {
        if self.bins == 0 {
            return Err(schema_error("binning_empty", "binning requires at least one bin"));
        }
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(schema_error("binning_edges", "binning edges must be finite"));
        }
        if self.low >= self.high {
            return Err(NusysError::Schema(
                ErrorInfo::new("binning_order", "lower edge must be below upper edge")
                    .with_context("low", self.low.to_string())
                    .with_context("high", self.high.to_string()),
            ));
        }
        Ok(())
    }
}

/// One reconstructed variable with its declared histogram binning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoVar {
    /// Column name in the selected-interaction table.
    pub name: String,
    /// Number of bins.
    pub nbins: usize,
    /// Lower edge.
    pub xmin: f64,
    /// Upper edge.
    pub xmax: f64,
}

impl RecoVar {
    /// Creates a variable descriptor.
    pub fn new(name: impl Into<String>, nbins: usize, xmin: f64, xmax: f64) -> Self {
        Self {
            name: name.into(),
            nbins,
            xmin,
            xmax,
        }
    }

    /// Returns the histogram binning of the variable.
    pub fn binning(&self) -> Binning {
        Binning::new(self.nbins, self.xmin, self.xmax)
    }
}

/// Ordered list of reconstructed variables shared by every accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSchema {
    variables: Vec<RecoVar>,
}

impl VariableSchema {
    /// Builds and validates a schema.
    pub fn new(variables: Vec<RecoVar>) -> Result<Self, NusysError> {
        let schema = Self { variables };
        schema.validate()?;
        Ok(schema)
    }

    /// Validates names and binnings.
    pub fn validate(&self) -> Result<(), NusysError> {
        if self.variables.is_empty() {
            return Err(schema_error("schema_empty", "schema declares no variables"));
        }
        let mut seen = BTreeSet::new();
        for var in &self.variables {
            if var.name.is_empty() {
                return Err(schema_error("schema_name", "variable names must not be empty"));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(NusysError::Schema(
                    ErrorInfo::new("schema_duplicate", "variable declared twice")
                        .with_context("variable", var.name.clone()),
                ));
            }
            var.binning().validate().map_err(|err| {
                NusysError::Schema(err.info().clone().with_context("variable", var.name.clone()))
            })?;
        }
        Ok(())
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the schema is empty (never true for a validated schema).
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Variables in schema order.
    pub fn variables(&self) -> &[RecoVar] {
        &self.variables
    }

    /// Iterates over the variables in schema order.
    pub fn iter(&self) -> std::slice::Iter<'_, RecoVar> {
        self.variables.iter()
    }

    /// Position of the named variable.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|var| var.name == name)
    }

    /// Variable names in schema order.
    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(|var| var.name.as_str()).collect()
    }
}

impl Default for VariableSchema {
    fn default() -> Self {
        Self {
            variables: default_variables(),
        }
    }
}

/// A continuous systematic knob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystematicKnob {
    /// Knob name used as the histogram name prefix.
    pub name: String,
    /// Position of the knob's weight array within an interaction record.
    pub index: usize,
    /// Universe count known ahead of time; discovered from data when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universes: Option<usize>,
    /// Groups whose covariance sums include this knob.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
}

impl SystematicKnob {
    /// Creates a knob whose universe count is discovered on first sight.
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            universes: None,
            groups: Vec::new(),
        }
    }

    /// Pre-declares the universe count.
    pub fn with_universes(mut self, universes: usize) -> Self {
        self.universes = Some(universes);
        self
    }

    /// Adds the knob to a covariance group.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.groups.push(group.into());
        self
    }
}

/// Ordered registry of knobs to propagate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnobRegistry {
    knobs: Vec<SystematicKnob>,
}

impl KnobRegistry {
    /// Builds and validates a registry.
    pub fn new(knobs: Vec<SystematicKnob>) -> Result<Self, NusysError> {
        let registry = Self { knobs };
        registry.validate()?;
        Ok(registry)
    }

    /// Checks that knob names are unique and non-empty.
    pub fn validate(&self) -> Result<(), NusysError> {
        let mut seen = BTreeSet::new();
        for knob in &self.knobs {
            if knob.name.is_empty() {
                return Err(schema_error("knob_name", "knob names must not be empty"));
            }
            if !seen.insert(knob.name.as_str()) {
                return Err(NusysError::Schema(
                    ErrorInfo::new("knob_duplicate", "knob declared twice")
                        .with_context("systematic", knob.name.clone()),
                ));
            }
            if knob.universes == Some(0) {
                return Err(NusysError::Schema(
                    ErrorInfo::new("knob_universes", "pre-declared universe count is zero")
                        .with_context("systematic", knob.name.clone()),
                ));
            }
        }
        Ok(())
    }

    /// Knobs in registry order.
    pub fn knobs(&self) -> &[SystematicKnob] {
        &self.knobs
    }

    /// Iterates over the knobs.
    pub fn iter(&self) -> std::slice::Iter<'_, SystematicKnob> {
        self.knobs.iter()
    }

    /// Number of registered knobs.
    pub fn len(&self) -> usize {
        self.knobs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.knobs.is_empty()
    }

    /// Looks up a knob by name.
    pub fn get(&self, name: &str) -> Option<&SystematicKnob> {
        self.knobs.iter().find(|knob| knob.name == name)
    }
}

impl Default for KnobRegistry {
    fn default() -> Self {
        Self {
            knobs: default_knobs(),
        }
    }
}

const PI_EDGE: f64 = 3.14159;

/// The 1mu1p analysis variable table.
pub fn default_variables() -> Vec<RecoVar> {
    vec![
        RecoVar::new("reco_muon_ke", 25, 0.0, 2000.0),
        RecoVar::new("reco_proton_ke", 25, 0.0, 600.0),
        RecoVar::new("reco_visible_energy", 25, 0.0, 3000.0),
        RecoVar::new("reco_muon_pt", 25, 0.0, 750.0),
        RecoVar::new("reco_proton_pt", 25, 0.0, 750.0),
        RecoVar::new("reco_muon_polar_angle", 25, 0.0, PI_EDGE),
        RecoVar::new("reco_muon_azimuthal_angle", 25, 0.0, PI_EDGE),
        RecoVar::new("reco_opening_angle", 25, 0.0, PI_EDGE),
        RecoVar::new("reco_delta_pT", 25, 0.0, 1200.0),
        RecoVar::new("reco_delta_phiT", 25, 0.0, PI_EDGE),
        RecoVar::new("reco_delta_alphaT", 25, 0.0, PI_EDGE),
        RecoVar::new("muon_softmax", 25, 0.0, 1.0),
        RecoVar::new("proton_softmax", 25, 0.8, 1.0),
    ]
}

const GENIE_PREFIX: &str = "GENIEReWeight_ICARUS_v2_multisim_";

const GENIE_KNOBS: [&str; 30] = [
    "ZExpAVariationResponse",
    "RPA_CCQE",
    "CoulombCCQE",
    "NormCCMEC",
    "NormNCMEC",
    "NCELVariationResponse",
    "CCRESVariationResponse",
    "NCRESVariationResponse",
    "NonRESBGvpCC1pi",
    "NonRESBGvpCC2pi",
    "NonRESBGvpNC1pi",
    "NonRESBGvpNC2pi",
    "NonRESBGvnCC1pi",
    "NonRESBGvnCC2pi",
    "NonRESBGvnNC1pi",
    "NonRESBGvnNC2pi",
    "NonRESBGvbarpCC1pi",
    "NonRESBGvbarpCC2pi",
    "NonRESBGvbarpNC1pi",
    "NonRESBGvbarpNC2pi",
    "NonRESBGvbarnCC1pi",
    "NonRESBGvbarnCC2pi",
    "NonRESBGvbarnNC1pi",
    "NonRESBGvbarnNC2pi",
    "RDecBR1gamma",
    "RDecBR1eta",
    "COHVariationResponse",
    "DISBYVariationResponse",
    "FSI_pi_VariationResponse",
    "FSI_N_VariationResponse",
];

const FLUX_KNOBS: [&str; 13] = [
    "expskin", "horncurrent", "kminus", "kplus", "kzero", "nucleoninexsec",
    "nucleonqexsec", "nucleontotxsec", "piminus", "pioninexsec", "pionqexsec",
    "piontotxsec", "piplus",
];

/// The multisim knob table: GENIE knobs at weight slots 52..=81 and flux
/// knobs at 115..=127.
pub fn default_knobs() -> Vec<SystematicKnob> {
    let genie = GENIE_KNOBS.iter().enumerate().map(|(offset, name)| {
        SystematicKnob::new(format!("{GENIE_PREFIX}{name}"), 52 + offset).in_group("xsec")
    });
    let flux = FLUX_KNOBS
        .iter()
        .enumerate()
        .map(|(offset, name)| SystematicKnob::new(format!("{name}_Flux"), 115 + offset).in_group("flux"));
    genie.chain(flux).collect()
}
