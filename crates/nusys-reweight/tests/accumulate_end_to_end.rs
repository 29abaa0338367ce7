use std::fs;

use nusys_core::{EventKey, KnobRegistry, RecoVar, SystematicKnob, VariableSchema};
use nusys_hist::{FlowPolicy, HistogramStore};
use nusys_reweight::{
    accumulate_parallel, load_file_list, EventFile, EventRecord, JsonTableReader,
    MemoryTableReader, ReweightContext, TrueInteraction,
};
use nusys_select::{SelectionIndex, SelectionRow};

fn schema() -> VariableSchema {
    VariableSchema::new(vec![RecoVar::new("muon_ke", 20, 0.0, 2000.0)]).expect("schema")
}

fn knobs() -> KnobRegistry {
    KnobRegistry::new(vec![SystematicKnob::new("flux_norm", 0)]).expect("knobs")
}

fn index(rows: &[(EventKey, f64)]) -> SelectionIndex {
    let rows = rows
        .iter()
        .map(|(key, value)| SelectionRow::new(*key, vec![*value]));
    SelectionIndex::build(&schema(), rows).expect("index")
}

fn record(run: u32, subrun: u32, evt: u32, interactions: Vec<(i64, Vec<Vec<f64>>)>) -> EventRecord {
    EventRecord {
        run,
        subrun,
        evt,
        interactions: interactions
            .into_iter()
            .map(|(index, wgt)| TrueInteraction { index, wgt })
            .collect(),
    }
}

#[test]
fn single_match_fills_every_universe_column() {
    let index = index(&[(EventKey::new(10, 1, 100, 0), 500.0)]);
    let reader = MemoryTableReader::new().with_file(
        "a",
        EventFile::with_records(
            2.5e19,
            vec![
                record(10, 1, 100, vec![(0, vec![vec![1.0, 1.1, 0.9]])]),
                record(10, 1, 101, vec![(0, vec![vec![2.0, 2.0, 2.0]])]),
            ],
        ),
    );
    let mut context = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    let pot = context.accumulate_file(&reader, "a", &index);
    assert_eq!(pot, 2.5e19);

    let pair = context.histograms("flux_norm", "muon_ke").expect("pair");
    assert_eq!(pair.universes.name, "flux_norm_muon_ke");
    assert_eq!(pair.universe_count(), 3);
    // 500 lands in bin 5 of [0, 2000) with 20 bins.
    assert_eq!(pair.universes.row(5), &[1.0, 1.1, 0.9]);
    assert_eq!(pair.universes.contents.iter().filter(|v| **v != 0.0).count(), 3);
    assert_eq!(pair.central.get(5), 1.0);
    assert_eq!(pair.central.integral(), 1.0);
    assert_eq!(context.stats().matched, 1);
    assert_eq!(context.stats().records, 2);

    let mut store = HistogramStore::new();
    context.export(&mut store).expect("export");
    assert!(store.hist2d("flux_norm_muon_ke").is_some());
    assert!(store.hist1d("flux_norm_muon_ke_cv").is_some());
}

#[test]
fn missing_file_is_skipped_and_later_files_still_count() {
    let index = index(&[(EventKey::new(10, 1, 100, 0), 500.0)]);
    let reader = MemoryTableReader::new().with_file(
        "b",
        EventFile::with_records(1.0e19, vec![record(10, 1, 100, vec![(0, vec![vec![1.0, 1.0]])])]),
    );
    let mut context = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    assert_eq!(context.accumulate_file(&reader, "absent", &index), 0.0);
    assert!(context.pairs().next().is_none());
    assert_eq!(context.diagnostics().with_code("file_open").count(), 1);
    let diag = context.diagnostics().with_code("file_open").next().expect("diag");
    assert_eq!(diag.file.as_deref(), Some("absent"));

    let total = context.accumulate_files(&reader, &["absent", "b"], &index);
    assert_eq!(total, 1.0e19);
    assert_eq!(context.total_pot(), 1.0e19);
    assert_eq!(context.stats().files_failed, 2);
    assert_eq!(context.stats().files_read, 1);
}

#[test]
fn missing_knob_and_universe_drift_are_reported() {
    let knobs = KnobRegistry::new(vec![
        SystematicKnob::new("flux_norm", 0).with_universes(3),
        SystematicKnob::new("ma_ccqe", 4),
    ])
    .expect("knobs");
    let index = index(&[(EventKey::new(1, 1, 1, 0), 50.0)]);
    let reader = MemoryTableReader::new().with_file(
        "a",
        EventFile::with_records(1.0, vec![record(1, 1, 1, vec![(0, vec![vec![2.0, 3.0]])])]),
    );
    let mut context = ReweightContext::new(schema(), knobs, FlowPolicy::Clamp);
    context.accumulate_file(&reader, "a", &index);

    let pair = context.histograms("flux_norm", "muon_ke").expect("declared pair");
    assert_eq!(pair.universes.row(0), &[2.0, 3.0, 0.0]);
    assert!(context.histograms("ma_ccqe", "muon_ke").is_none());
    let missing = context.diagnostics().with_code("knob_missing").next().expect("missing");
    assert_eq!(missing.systematic.as_deref(), Some("ma_ccqe"));
    assert_eq!(context.diagnostics().with_code("universe_drift").count(), 1);
}

#[test]
fn cosmic_background_is_added_once() {
    let index = index(&[
        (EventKey::new(1, 1, 1, 0), 50.0),
        (EventKey::new(1, 1, 2, -1), 150.0),
    ]);
    let reader = MemoryTableReader::new().with_file(
        "a",
        EventFile::with_records(1.0, vec![record(1, 1, 1, vec![(0, vec![vec![0.5, 1.5]])])]),
    );
    let mut context = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    context.accumulate_file(&reader, "a", &index);
    context.add_cosmic_background(&index);
    context.add_cosmic_background(&index);

    let pair = context.histograms("flux_norm", "muon_ke").expect("pair");
    assert_eq!(pair.universes.row(1), &[1.0, 1.0]);
    assert_eq!(pair.central.integral(), 2.0);
    assert_eq!(context.stats().cosmics, 1);
    assert_eq!(context.diagnostics().with_code("cosmics_repeated").count(), 1);
}

#[test]
fn json_reader_and_file_list_resolve_against_base_dir() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let file = EventFile::with_records(3.0, vec![record(10, 1, 100, vec![(0, vec![vec![1.0]])])]);
    fs::write(dir.path().join("run1.json"), serde_json::to_vec(&file).expect("encode"))
        .expect("write");
    let list = dir.path().join("files.txt");
    fs::write(&list, "# inputs\n\nrun1.json\n   \nrun2.json\n").expect("write list");

    let files = load_file_list(&list, Some(dir.path())).expect("list");
    assert_eq!(files.len(), 2);

    let index = index(&[(EventKey::new(10, 1, 100, 0), 500.0)]);
    let reader = JsonTableReader::new(None);
    let mut context = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    assert_eq!(context.accumulate_files(&reader, &files, &index), 3.0);
    assert_eq!(context.stats().files_failed, 1);

    let other_table = JsonTableReader::new(Some(dir.path().to_path_buf())).with_table("mcTree");
    let mut context = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    assert_eq!(context.accumulate_file(&other_table, "run1.json", &index), 0.0);
    assert_eq!(context.diagnostics().with_code("table_missing").count(), 1);
}

#[test]
fn parallel_drift_keeps_first_universe_count_and_other_knobs() {
    let index = index(&[(EventKey::new(1, 1, 1, 0), 50.0), (EventKey::new(1, 1, 2, 0), 50.0)]);
    let knobs = KnobRegistry::new(vec![
        SystematicKnob::new("good", 0),
        SystematicKnob::new("drifty", 1),
    ])
    .expect("knobs");
    let reader = MemoryTableReader::new()
        .with_file(
            "first",
            EventFile::with_records(
                1.0,
                vec![record(1, 1, 1, vec![(0, vec![vec![1.0, 1.0], vec![1.0, 2.0, 3.0]])])],
            ),
        )
        .with_file(
            "second",
            EventFile::with_records(
                2.0,
                vec![record(1, 1, 2, vec![(0, vec![vec![1.0, 1.0], vec![4.0, 5.0, 6.0, 7.0]])])],
            ),
        );
    let files = ["first", "second"];

    let mut sequential = ReweightContext::new(schema(), knobs.clone(), FlowPolicy::Clamp);
    sequential.accumulate_files(&reader, &files, &index);

    let template = ReweightContext::new(schema(), knobs, FlowPolicy::Clamp);
    let parallel =
        accumulate_parallel(template, &reader, &files, &index, 2).expect("drift is not fatal");

    for context in [&sequential, &parallel] {
        let good = context.histograms("good", "muon_ke").expect("good");
        assert_eq!(good.universes.row(0), &[2.0, 2.0]);
        let drifty = context.histograms("drifty", "muon_ke").expect("drifty");
        assert_eq!(drifty.universe_count(), 3);
        assert_eq!(drifty.universes.row(0), &[5.0, 7.0, 9.0]);
        assert_eq!(drifty.central.get(0), 2.0);
        assert_eq!(context.total_pot(), 3.0);
        let drift: Vec<_> = context.diagnostics().with_code("universe_drift").collect();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].systematic.as_deref(), Some("drifty"));
    }
}

#[test]
fn index_over_another_schema_is_not_filled() {
    let wide = VariableSchema::new(vec![
        RecoVar::new("muon_ke", 20, 0.0, 2000.0),
        RecoVar::new("proton_ke", 10, 0.0, 1000.0),
    ])
    .expect("schema");
    let index = SelectionIndex::build(
        &wide,
        vec![
            SelectionRow::new(EventKey::new(10, 1, 100, 0), vec![500.0, 100.0]),
            SelectionRow::new(EventKey::new(10, 1, 100, -1), vec![500.0, 100.0]),
        ],
    )
    .expect("index");
    let reader = MemoryTableReader::new().with_file(
        "a",
        EventFile::with_records(1.0e19, vec![record(10, 1, 100, vec![(0, vec![vec![1.0, 1.0]])])]),
    );

    let mut context = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    assert_eq!(context.accumulate_file(&reader, "a", &index), 0.0);
    context.add_cosmic_background(&index);
    assert_eq!(context.pairs().count(), 0);
    assert_eq!(context.stats().files_failed, 1);
    assert_eq!(context.diagnostics().with_code("selection_schema").count(), 2);

    let template = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
    let err = accumulate_parallel(template, &reader, &["a", "a"], &index, 2).expect_err("schema");
    assert_eq!(err.code(), "selection_schema");
}
