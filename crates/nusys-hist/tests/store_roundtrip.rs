use nusys_core::{Diagnostic, Diagnostics, RunProvenance};
use nusys_hist::{
    artifact_name, canonical_json, content_hash, Artifact, CovarianceMatrix, Histogram1D,
    HistogramStore, StoreFile,
};
use nusys_core::Binning;

fn sample_store() -> HistogramStore {
    let axis = Binning::new(3, 0.0, 3.0);
    let mut store = HistogramStore::new();
    let mut cv = Histogram1D::new(format!("{}_cv", artifact_name("flux_norm", "x")), axis);
    cv.fill(1.2, 1.0);
    store.insert(Artifact::Hist1d(cv)).unwrap();
    let mut cov = CovarianceMatrix::zeros("flux_norm_x_cov", axis);
    cov.set_symmetric(0, 2, 0.1);
    cov.set(1, 1, 1.0 / 3.0);
    store.insert(Artifact::Covariance(cov)).unwrap();
    store
}

#[test]
fn duplicate_names_are_rejected() {
    let mut store = sample_store();
    let dup = Histogram1D::new("flux_norm_x_cv", Binning::new(3, 0.0, 3.0));
    assert_eq!(store.insert(Artifact::Hist1d(dup)).unwrap_err().code(), "store_duplicate");
    assert_eq!(store.names().collect::<Vec<_>>(), vec!["flux_norm_x_cov", "flux_norm_x_cv"]);
}

#[test]
fn store_file_roundtrips_with_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("store.json");
    let mut diagnostics = Diagnostics::new();
    diagnostics.push(Diagnostic::warning("file_open", "missing").with_file("b.json"));
    let provenance = RunProvenance {
        seed: 7,
        created_at: "2024-01-01T00:00:00Z".into(),
        ..RunProvenance::default()
    };
    let file = StoreFile::new(provenance, 2.5e18, diagnostics, sample_store()).unwrap();
    file.write(&path).unwrap();

    let back = StoreFile::read(&path).unwrap();
    assert_eq!(back, file);
    assert_eq!(back.artifacts.hist1d("flux_norm_x_cv").unwrap().get(1), 1.0);
    assert!(back.artifacts.covariance("flux_norm_x_cov").unwrap().is_symmetric());
}

#[test]
fn hash_ignores_timestamp_but_not_contents() {
    let a = StoreFile::new(RunProvenance::default(), 1.0, Diagnostics::new(), sample_store()).unwrap();
    let mut later = RunProvenance::default();
    later.created_at = "2030-01-01T00:00:00Z".into();
    let b = StoreFile::new(later, 1.0, Diagnostics::new(), sample_store()).unwrap();
    assert_eq!(a.content_hash, b.content_hash);
    let c = StoreFile::new(RunProvenance::default(), 2.0, Diagnostics::new(), sample_store()).unwrap();
    assert_ne!(a.content_hash, c.content_hash);
}

#[test]
fn canonical_json_sorts_nested_keys() {
    let value = serde_json::json!({"b": {"z": 1, "a": [{"y": 2, "x": 3}]}, "a": 0.1});
    let bytes = canonical_json(&value).unwrap();
    assert_eq!(
        String::from_utf8(bytes).unwrap(),
        r#"{"a":0.1,"b":{"a":[{"x":3,"y":2}],"z":1}}"#
    );
    let hash = content_hash(&value).unwrap();
    assert_eq!(hash.len(), 64);
    let reordered = serde_json::json!({"a": 0.1, "b": {"a": [{"x": 3, "y": 2}], "z": 1}});
    assert_eq!(hash, content_hash(&reordered).unwrap());
}
