use nusys_core::{EventKey, KnobRegistry, RecoVar, SystematicKnob, VariableSchema};
use nusys_hist::FlowPolicy;
use nusys_reweight::{
    accumulate_parallel, EventFile, EventRecord, MemoryTableReader, ReweightContext,
    TrueInteraction,
};
use nusys_select::{SelectionIndex, SelectionRow};
use proptest::prelude::*;

const UNIVERSES: usize = 4;

fn schema() -> VariableSchema {
    VariableSchema::new(vec![
        RecoVar::new("muon_ke", 8, 0.0, 8.0),
        RecoVar::new("proton_ke", 4, 0.0, 4.0),
    ])
    .expect("schema")
}

fn knobs() -> KnobRegistry {
    KnobRegistry::new(vec![
        SystematicKnob::new("flux", 0).with_universes(UNIVERSES),
        SystematicKnob::new("xsec", 1).with_universes(UNIVERSES),
    ])
    .expect("knobs")
}

fn index() -> SelectionIndex {
    let rows = (0..16u32).map(|event| {
        SelectionRow::new(
            EventKey::new(1, 1, event, 0),
            vec![event as f64 * 0.5, (event % 5) as f64],
        )
    });
    SelectionIndex::build(&schema(), rows).expect("index")
}

/// Knobs whose universe count is taken from the first weight array seen.
fn discovered_knobs() -> KnobRegistry {
    KnobRegistry::new(vec![SystematicKnob::new("flux", 0), SystematicKnob::new("xsec", 1)])
        .expect("knobs")
}

/// Weights are multiples of 1/8 so every partial sum is exact.
fn files_with(universes: usize) -> impl Strategy<Value = Vec<Vec<(u32, Vec<u8>)>>> {
    prop::collection::vec(
        prop::collection::vec((0u32..20, prop::collection::vec(0u8..32, universes)), 0..6),
        1..5,
    )
}

fn files_strategy() -> impl Strategy<Value = Vec<Vec<(u32, Vec<u8>)>>> {
    files_with(UNIVERSES)
}

fn reader(files: &[Vec<(u32, Vec<u8>)>]) -> (MemoryTableReader, Vec<String>) {
    let mut reader = MemoryTableReader::new();
    let mut ids = Vec::new();
    for (n, events) in files.iter().enumerate() {
        let records = events
            .iter()
            .map(|(event, raw)| {
                let weights: Vec<f64> = raw.iter().map(|w| *w as f64 / 8.0).collect();
                EventRecord {
                    run: 1,
                    subrun: 1,
                    evt: *event,
                    interactions: vec![TrueInteraction {
                        index: 0,
                        wgt: vec![weights.clone(), weights],
                    }],
                }
            })
            .collect();
        let id = format!("file{n}");
        reader.insert(id.clone(), EventFile::with_records(n as f64 + 1.0, records));
        ids.push(id);
    }
    (reader, ids)
}

fn contents(context: &ReweightContext) -> Vec<(String, Vec<f64>, Vec<f64>)> {
    context
        .pairs()
        .map(|pair| {
            (
                pair.universes.name.clone(),
                pair.universes.contents.clone(),
                pair.central.contents.clone(),
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn split_accumulation_matches_single_pass(files in files_strategy(), split in 0usize..5) {
        let (reader, ids) = reader(&files);
        let index = index();
        let split = split.min(ids.len());

        let mut whole = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
        whole.accumulate_files(&reader, &ids, &index);

        let mut left = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
        left.accumulate_files(&reader, &ids[..split], &index);
        let mut right = left.empty_like();
        right.accumulate_files(&reader, &ids[split..], &index);
        left.merge(right).expect("merge");

        prop_assert_eq!(contents(&whole), contents(&left));
        prop_assert_eq!(whole.total_pot(), left.total_pot());
        prop_assert_eq!(whole.stats(), left.stats());
    }

    #[test]
    fn file_order_does_not_change_histograms(files in files_strategy()) {
        let (reader, ids) = reader(&files);
        let index = index();
        let mut forward = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
        forward.accumulate_files(&reader, &ids, &index);

        let reversed: Vec<String> = ids.iter().rev().cloned().collect();
        let mut backward = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
        backward.accumulate_files(&reader, &reversed, &index);

        prop_assert_eq!(contents(&forward), contents(&backward));
    }

    #[test]
    fn parallel_driver_matches_sequential(files in files_strategy(), threads in 1usize..4) {
        let (reader, ids) = reader(&files);
        let index = index();
        let mut sequential = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
        sequential.accumulate_files(&reader, &ids, &index);

        let template = ReweightContext::new(schema(), knobs(), FlowPolicy::Clamp);
        let parallel = accumulate_parallel(template, &reader, &ids, &index, threads)
            .expect("parallel");
        prop_assert_eq!(contents(&sequential), contents(&parallel));
        prop_assert_eq!(sequential.total_pot(), parallel.total_pot());
    }

    #[test]
    fn discovered_universes_match_across_drivers(
        (universes, files) in (1usize..6).prop_flat_map(|u| (Just(u), files_with(u))),
        threads in 2usize..4,
    ) {
        let (reader, ids) = reader(&files);
        let index = index();
        let mut sequential = ReweightContext::new(schema(), discovered_knobs(), FlowPolicy::Clamp);
        sequential.accumulate_files(&reader, &ids, &index);

        let template = ReweightContext::new(schema(), discovered_knobs(), FlowPolicy::Clamp);
        prop_assert_eq!(template.pairs().count(), 0);
        let parallel = accumulate_parallel(template, &reader, &ids, &index, threads)
            .expect("parallel");
        prop_assert_eq!(contents(&sequential), contents(&parallel));
        prop_assert!(parallel.pairs().all(|pair| pair.universe_count() == universes));
        prop_assert_eq!(parallel.diagnostics().with_code("universe_drift").count(), 0);
    }
}
