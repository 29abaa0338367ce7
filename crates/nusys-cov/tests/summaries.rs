use std::collections::BTreeMap;

use nusys_core::Binning;
use nusys_cov::{fractional, statistical, sum, CovOptions, Summarizer, SummaryUnit};
use nusys_hist::{CovarianceMatrix, FlowPolicy, Histogram1D, Histogram2D, HistogramStore};

fn axis() -> Binning {
    Binning::new(2, 0.0, 2.0)
}

fn central(values: [f64; 2]) -> Histogram1D {
    let mut c = Histogram1D::new("cv", axis());
    c.set(0, values[0]);
    c.set(1, values[1]);
    c
}

fn universes(name: &str, rows: [[f64; 2]; 2]) -> Histogram2D {
    let mut h = Histogram2D::universes(name, axis(), 2, FlowPolicy::Clamp);
    h.row_mut(0).copy_from_slice(&rows[0]);
    h.row_mut(1).copy_from_slice(&rows[1]);
    h
}

#[test]
fn fractional_guards_zero_denominators() {
    let mut cov = CovarianceMatrix::zeros("c", axis());
    cov.set_symmetric(0, 0, 8.0);
    cov.set_symmetric(0, 1, 4.0);
    cov.set_symmetric(1, 1, 3.0);
    let frac = fractional("f", &cov, &central([2.0, 0.0])).expect("frac");
    assert_eq!(frac.values, vec![2.0, 0.0, 0.0, 0.0]);
}

#[test]
fn statistical_is_diagonal_counts() {
    let stat = statistical("s", &central([5.0, 7.0]));
    assert_eq!(stat.values, vec![5.0, 0.0, 0.0, 7.0]);
}

#[test]
fn sum_requires_members_and_adds_elementwise() {
    let mut a = CovarianceMatrix::zeros("a", axis());
    a.set_symmetric(0, 1, 1.5);
    let mut b = CovarianceMatrix::zeros("b", axis());
    b.set_symmetric(0, 1, 2.0);
    b.set(1, 1, 4.0);
    let total = sum("t", [&a, &b]).expect("sum");
    assert_eq!(total.values, vec![0.0, 3.5, 3.5, 4.0]);
    assert_eq!(sum("t", Vec::<&CovarianceMatrix>::new()).expect_err("empty").code(), "group_empty");
}

#[test]
fn summarizer_writes_artifacts_groups_and_keeps_going_on_failure() {
    let mut summarizer = Summarizer::new(HistogramStore::new(), CovOptions::default());
    let cv = central([2.0, 4.0]);
    assert!(summarizer.add(
        &SummaryUnit::member("knob_a", "x"),
        &universes("knob_a_x", [[1.0, 3.0], [2.0, 6.0]]),
        &cv,
    ));
    assert!(summarizer.add(
        &SummaryUnit::member("knob_b", "x"),
        &universes("knob_b_x", [[2.0, 2.0], [3.0, 5.0]]),
        &cv,
    ));
    // Mismatched central value: covariance fails for this unit only.
    let wrong = Histogram1D::new("cv", Binning::new(3, 0.0, 3.0));
    assert!(!summarizer.add(
        &SummaryUnit::member("knob_c", "x"),
        &universes("knob_c_x", [[1.0, 1.0], [1.0, 1.0]]),
        &wrong,
    ));

    let mut groups = BTreeMap::new();
    groups.insert("xsec".to_string(), vec!["knob_a".to_string(), "knob_b".to_string()]);
    groups.insert("unused".to_string(), vec!["knob_z".to_string()]);
    summarizer.finish_groups(&groups);
    let (store, diagnostics) = summarizer.finish();

    let a = store.covariance("knob_a_x_cov").expect("a cov");
    assert_eq!(a.values, vec![1.0, 2.0, 2.0, 4.0]);
    assert!(store.covariance("knob_a_x_fractional").is_some());
    assert!(store.cholesky("knob_a_x_chol").is_some());
    let group = store.covariance("xsec_x_cov").expect("group");
    assert_eq!(group.values, vec![1.0, 2.0, 2.0, 5.0]);
    assert!(store.covariance("xsec_x_fractional").is_some());
    assert!(store.covariance("unused_x_cov").is_none());
    assert!(store.covariance("knob_c_x_cov").is_none());

    let failure = diagnostics.with_code("cov_axis").next().expect("diagnostic");
    assert_eq!(failure.systematic.as_deref(), Some("knob_c"));
    assert_eq!(failure.variable.as_deref(), Some("x"));
}
