use std::fs;

use nusys_core::{EventKey, ReadoutKey, RecoVar, VariableSchema};
use nusys_select::{read_csv, read_event_log, read_tagged_log};

fn schema() -> VariableSchema {
    VariableSchema::new(vec![
        RecoVar::new("muon_ke", 10, 0.0, 1000.0),
        RecoVar::new("proton_ke", 5, 0.0, 500.0),
    ])
    .expect("schema")
}

#[test]
fn csv_columns_are_resolved_by_name() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("selected.csv");
    fs::write(
        &path,
        "run,subrun,event,nu_id,proton_ke,extra,muon_ke\n\
         10,1,100,0,120.5,9,500\n\
         10,1,101,-1,80,9,250\n",
    )
    .expect("write");
    let index = read_csv(&path, &schema()).expect("read");
    assert_eq!(index.len(), 2);
    assert_eq!(index.get(&EventKey::new(10, 1, 100, 0)), Some(&[500.0, 120.5][..]));
    assert_eq!(index.cosmics().count(), 1);
}

#[test]
fn csv_missing_variable_column_is_an_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("selected.csv");
    fs::write(&path, "run,subrun,event,nu_id,muon_ke\n1,1,1,0,5\n").expect("write");
    let err = read_csv(&path, &schema()).expect_err("missing");
    assert_eq!(err.code(), "selection_missing_column");
    assert_eq!(err.info().context.get("variable").map(String::as_str), Some("proton_ke"));
}

#[test]
fn tagged_log_keeps_only_tagged_lines() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("selection.log");
    fs::write(
        &path,
        "%MSG-i job start\n\
         EVENT,10,1,100,\n\
         SELECTED_1MU1P,10,1,100,0,500,120,\n\
         EVENT,10,1,101,\n\
         EVENT,10,1,101,\n\
         SELECTED_1MU1P,10.0,1.0,101.0,1.0,300,90\n",
    )
    .expect("write");
    let columns = vec!["muon_ke".to_string(), "proton_ke".to_string()];
    let index = read_tagged_log(&path, "SELECTED_1MU1P", &columns, &schema()).expect("log");
    assert_eq!(index.len(), 2);
    assert_eq!(index.get(&EventKey::new(10, 1, 101, 1)), Some(&[300.0, 90.0][..]));

    let readouts = read_event_log(&path, "EVENT").expect("events");
    let expected: Vec<_> = vec![ReadoutKey::new(10, 1, 100), ReadoutKey::new(10, 1, 101)];
    assert_eq!(readouts.into_iter().collect::<Vec<_>>(), expected);
}

#[test]
fn tagged_log_rejects_fractional_identity() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("selection.log");
    fs::write(&path, "SELECTED_1MU1P,10,1,100.5,0,500,120\n").expect("write");
    let columns = vec!["muon_ke".to_string(), "proton_ke".to_string()];
    let err = read_tagged_log(&path, "SELECTED_1MU1P", &columns, &schema()).expect_err("bad");
    assert_eq!(err.code(), "selection_parse");
    assert_eq!(err.info().context.get("column").map(String::as_str), Some("event"));
}

#[test]
fn unreadable_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let err = read_csv(&dir.path().join("absent.csv"), &schema()).expect_err("absent");
    assert_eq!(err.code(), "selection_open");
}
