use nusys_core::keys::{EventKey, ReadoutKey};
use nusys_core::schema::{
    default_knobs, Binning, KnobRegistry, RecoVar, SystematicKnob, VariableSchema,
};

#[test]
fn default_schema_matches_analysis_table() {
    let schema = VariableSchema::default();
    schema.validate().unwrap();
    assert_eq!(schema.len(), 13);
    assert_eq!(schema.position("reco_muon_ke"), Some(0));
    let proton_softmax = &schema.variables()[12];
    assert_eq!(proton_softmax.name, "proton_softmax");
    assert_eq!(proton_softmax.binning(), Binning::new(25, 0.8, 1.0));
}

#[test]
fn default_knobs_cover_genie_and_flux_slots() {
    let knobs = default_knobs();
    assert_eq!(knobs.len(), 43);
    assert_eq!(knobs[0].name, "GENIEReWeight_ICARUS_v2_multisim_ZExpAVariationResponse");
    assert_eq!(knobs[0].index, 52);
    assert_eq!(knobs[29].index, 81);
    assert_eq!(knobs[30].name, "expskin_Flux");
    assert_eq!(knobs[30].index, 115);
    assert_eq!(knobs[42].name, "piplus_Flux");
    assert_eq!(knobs[42].index, 127);
    KnobRegistry::new(knobs).unwrap();
}

#[test]
fn schema_rejects_bad_tables() {
    let dup = VariableSchema::new(vec![
        RecoVar::new("a", 2, 0.0, 1.0),
        RecoVar::new("a", 2, 0.0, 1.0),
    ]);
    assert_eq!(dup.unwrap_err().code(), "schema_duplicate");

    let inverted = VariableSchema::new(vec![RecoVar::new("a", 2, 1.0, 0.0)]);
    let err = inverted.unwrap_err();
    assert_eq!(err.code(), "binning_order");
    assert_eq!(err.info().context.get("variable").map(String::as_str), Some("a"));

    let empty = VariableSchema::new(vec![RecoVar::new("a", 0, 0.0, 1.0)]);
    assert_eq!(empty.unwrap_err().code(), "binning_empty");

    let knobs = KnobRegistry::new(vec![
        SystematicKnob::new("k", 0),
        SystematicKnob::new("k", 1),
    ]);
    assert_eq!(knobs.unwrap_err().code(), "knob_duplicate");
}

#[test]
fn event_keys_order_as_tuples() {
    let a = EventKey::new(1, 2, 3, -1);
    let b = EventKey::new(1, 2, 3, 0);
    let c = EventKey::new(1, 2, 4, 0);
    assert!(a < b && b < c);
    assert!(a.is_cosmic());
    assert_eq!(b.readout(), ReadoutKey::new(1, 2, 3));
    assert_eq!(ReadoutKey::new(1, 2, 3).interaction(0), b);
    assert_eq!(a.to_string(), "1:2:3#-1");
}
