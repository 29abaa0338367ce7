//! Named artifact collection and its on-disk envelope.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use nusys_core::errors::{ErrorInfo, NusysError};
use nusys_core::{Diagnostics, RunProvenance, SchemaVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::hist::{Histogram1D, Histogram2D};
use crate::matrix::{CovarianceMatrix, LowerTriangular};

/// Suffix of central-value histograms.
pub const CV_SUFFIX: &str = "_cv";
/// Suffix of covariance matrices.
pub const COV_SUFFIX: &str = "_cov";
/// Suffix of Cholesky factors.
pub const CHOL_SUFFIX: &str = "_chol";
/// Suffix of fractional covariance matrices.
pub const FRACTIONAL_SUFFIX: &str = "_fractional";

fn json_error(code: &str, err: serde_json::Error) -> NusysError {
    NusysError::Serde(ErrorInfo::new(code, err.to_string()))
}

/// Rebuilds every JSON object with its keys in sorted order.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(key, v)| (key, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

/// Compact JSON of `value` with object keys sorted at every depth.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, NusysError> {
    let value = serde_json::to_value(value).map_err(|err| json_error("json_serialize", err))?;
    serde_json::to_vec(&sorted(value)).map_err(|err| json_error("json_write", err))
}

/// Lower-case hex SHA-256 of [`canonical_json`].
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, NusysError> {
    Ok(format!("{:x}", Sha256::digest(canonical_json(value)?)))
}

/// Canonical `<systematic>_<variable>` artifact stem.
pub fn artifact_name(systematic: &str, variable: &str) -> String {
    format!("{systematic}_{variable}")
}

/// One persisted artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    /// Central value or derived 1D summary.
    Hist1d(Histogram1D),
    /// Universe or bootstrap histogram.
    Hist2d(Histogram2D),
    /// Covariance or fractional covariance.
    Covariance(CovarianceMatrix),
    /// Cholesky factor.
    Cholesky(LowerTriangular),
}

impl Artifact {
    /// Name carried by the artifact.
    pub fn name(&self) -> &str {
        match self {
            Artifact::Hist1d(h) => &h.name,
            Artifact::Hist2d(h) => &h.name,
            Artifact::Covariance(m) => &m.name,
            Artifact::Cholesky(m) => &m.name,
        }
    }
}

/// Named collection of every artifact produced by a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistogramStore {
    artifacts: BTreeMap<String, Artifact>,
}

impl HistogramStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an artifact under its own name; an existing name is an error.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), NusysError> {
        match self.artifacts.entry(artifact.name().to_string()) {
            Entry::Occupied(slot) => Err(NusysError::Histogram(
                ErrorInfo::new("store_duplicate", "artifact name already present")
                    .with_context("histogram", slot.key().clone()),
            )),
            Entry::Vacant(slot) => {
                slot.insert(artifact);
                Ok(())
            }
        }
    }

    /// Inserts or replaces an artifact.
    pub fn put(&mut self, artifact: Artifact) {
        self.artifacts.insert(artifact.name().to_string(), artifact);
    }

    /// Looks up any artifact.
    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Looks up a 1D histogram.
    pub fn hist1d(&self, name: &str) -> Option<&Histogram1D> {
        match self.artifacts.get(name) {
            Some(Artifact::Hist1d(h)) => Some(h),
            _ => None,
        }
    }

    /// Looks up a 2D histogram.
    pub fn hist2d(&self, name: &str) -> Option<&Histogram2D> {
        match self.artifacts.get(name) {
            Some(Artifact::Hist2d(h)) => Some(h),
            _ => None,
        }
    }

    /// Looks up a covariance matrix.
    pub fn covariance(&self, name: &str) -> Option<&CovarianceMatrix> {
        match self.artifacts.get(name) {
            Some(Artifact::Covariance(m)) => Some(m),
            _ => None,
        }
    }

    /// Looks up a Cholesky factor.
    pub fn cholesky(&self, name: &str) -> Option<&LowerTriangular> {
        match self.artifacts.get(name) {
            Some(Artifact::Cholesky(m)) => Some(m),
            _ => None,
        }
    }

    /// Artifact names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Envelope written as the single output artifact file of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreFile {
    /// Envelope schema version.
    pub schema_version: SchemaVersion,
    /// Run provenance.
    pub provenance: RunProvenance,
    /// Exposure summed over every processed input file.
    pub total_pot: f64,
    /// Recoverable failures recorded during the run.
    pub diagnostics: Diagnostics,
    /// All artifacts, keyed by name.
    pub artifacts: HistogramStore,
    /// SHA256 of the envelope with this field empty.
    #[serde(default)]
    pub content_hash: String,
}

impl StoreFile {
    /// Wraps a store and computes its content hash.
    pub fn new(
        provenance: RunProvenance,
        total_pot: f64,
        diagnostics: Diagnostics,
        artifacts: HistogramStore,
    ) -> Result<Self, NusysError> {
        let mut file = Self {
            schema_version: SchemaVersion::new(1, 0, 0),
            provenance,
            total_pot,
            diagnostics,
            artifacts,
            content_hash: String::new(),
        };
        file.content_hash = file.compute_hash()?;
        Ok(file)
    }

    /// Hash of the envelope contents, excluding the hash field and the
    /// creation timestamp.
    pub fn compute_hash(&self) -> Result<String, NusysError> {
        let mut unhashed = self.clone();
        unhashed.content_hash.clear();
        unhashed.provenance.created_at.clear();
        content_hash(&unhashed)
    }

    /// Writes canonical JSON to `path`.
    pub fn write(&self, path: &Path) -> Result<(), NusysError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| io_error("store_dir", path, err))?;
            }
        }
        let bytes = canonical_json(self)?;
        fs::write(path, bytes).map_err(|err| io_error("store_write", path, err))?;
        info!(path = %path.display(), artifacts = self.artifacts.len(), "histogram store written");
        Ok(())
    }

    /// Reads an envelope and verifies its content hash.
    pub fn read(path: &Path) -> Result<Self, NusysError> {
        let bytes = fs::read(path).map_err(|err| io_error("store_read", path, err))?;
        let file: StoreFile =
            serde_json::from_slice(&bytes).map_err(|err| json_error("json_deserialize", err))?;
        let expected = file.compute_hash()?;
        if expected != file.content_hash {
            return Err(NusysError::Serde(
                ErrorInfo::new("store_hash", "content hash does not match envelope")
                    .with_context("file", path.display().to_string())
                    .with_context("expected", expected),
            ));
        }
        Ok(file)
    }
}

fn io_error(code: &str, path: &Path, err: std::io::Error) -> NusysError {
    NusysError::Io(
        ErrorInfo::new(code, "histogram store i/o failed")
            .with_context("file", path.display().to_string())
            .with_hint(err.to_string()),
    )
}
