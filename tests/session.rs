//! Integration tests for the session controller against the built-in
//! profile: exact-match windows anchored at `learnerSeq` / `sutSeq`.
//!
//! Each test drives one [`Mapper`] through the same event surface the
//! learning harness uses and checks the rendered labels and state
//! snapshots.

use tcp_mapper::flags::{bit, FlagSet};
use tcp_mapper::mapping::{mapping_name, Bindings, SolveResult};
use tcp_mapper::state::{name, store, FieldValue};
use tcp_mapper::window::{classify, represent, Role};
use tcp_mapper::{Mapper, MapperProfile, MappingSet, State, Validity, WindowPolicy};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn mapper() -> Mapper {
    Mapper::with_profile(MapperProfile::builtin())
}

fn syn() -> FlagSet {
    FlagSet::from_bits(bit::SYN)
}

fn outgoing_request(flags: FlagSet, seq: Validity, ack: Validity, len: u32) -> Bindings {
    let mut b = Bindings::new();
    b.insert(name::FLAGS_OUT_2, FieldValue::Flags(Some(flags)));
    b.insert(name::ABS_SEQ_OUT, FieldValue::Validity(Some(seq)));
    b.insert(name::ABS_ACK_OUT, FieldValue::Validity(Some(ack)));
    b.insert(name::ABS_DATA_OUT, FieldValue::Integer(Some(store(len))));
    b
}

// ---------------------------------------------------------------------------
// Window behaviour (scenario: exact window around the expected counter)
// ---------------------------------------------------------------------------

#[test]
fn exact_window_accepts_exactly_the_expected_counter() {
    let policy = WindowPolicy::default();
    let mut state = State::new();
    state.set_int(name::LEARNER_SEQ, 100).unwrap();

    assert_eq!(
        classify(Role::Sequence, 100, &state, &policy).unwrap(),
        Validity::Valid
    );
    assert_eq!(
        classify(Role::Sequence, 101, &state, &policy).unwrap(),
        Validity::Invalid
    );
}

// ---------------------------------------------------------------------------
// Stimulus concretization (scenario: SYN opener and its undefined twin)
// ---------------------------------------------------------------------------

#[test]
fn valid_request_concretizes_from_the_expected_counters() {
    let mut m = mapper();
    m.state.set_int(name::LEARNER_SEQ, 100).unwrap();

    let label = m
        .process_outgoing_request(syn(), Validity::Valid, Validity::Valid, 0)
        .unwrap();
    assert_eq!(label, "SYN 100 0 0");
}

#[test]
fn underivable_invalid_ack_yields_undefined() {
    let mut m = mapper();
    m.state.set_int(name::LEARNER_SEQ, 100).unwrap();

    let label = m
        .process_outgoing_request(syn(), Validity::Valid, Validity::Invalid, 0)
        .unwrap();
    assert_eq!(label, "undefined");
}

#[test]
fn unsatisfiable_request_leaves_state_bit_for_bit_unchanged() {
    let mut m = mapper();
    m.state.set_int(name::LEARNER_SEQ, 100).unwrap();
    let before = m.state.clone();

    m.process_outgoing_request(syn(), Validity::Valid, Validity::Invalid, 0)
        .unwrap();
    assert_eq!(m.state, before);
}

#[test]
fn inverse_execution_is_deterministic() {
    let mappings = MappingSet::new(MapperProfile::builtin());
    let mut state = State::new();
    state.set_int(name::LEARNER_SEQ, 100).unwrap();
    state.set_int(name::SUT_SEQ, 7).unwrap();
    let request = outgoing_request(syn(), Validity::Valid, Validity::Invalid, 3);

    let first = mappings
        .execute_inverted(mapping_name::OUTGOING_REQUEST, &state, &request)
        .unwrap();
    let second = mappings
        .execute_inverted(mapping_name::OUTGOING_REQUEST, &state, &request)
        .unwrap();
    assert_eq!(first, second);
    assert!(matches!(first.result, SolveResult::Assignment(_)));
}

// ---------------------------------------------------------------------------
// Reset lifecycle (scenarios: reset without a counter, then with one)
// ---------------------------------------------------------------------------

#[test]
fn outgoing_reset_needs_a_known_learner_counter() {
    let mut m = mapper();
    assert_eq!(m.process_outgoing_reset().unwrap(), None);

    m.process_incoming_response(FlagSet::from_bits(bit::ACK), 2000, 500, 0)
        .unwrap();
    assert_eq!(
        m.process_outgoing_reset().unwrap(),
        Some("RST 500 0 0".to_string())
    );
}

#[test]
fn session_reset_renders_every_integer_unknown() {
    let mut m = mapper();
    m.process_incoming_response(FlagSet::from_bits(bit::ACK), 10, 20, 5)
        .unwrap();
    m.send_reset();

    let snapshot = m.get_state();
    for field in [
        name::LEARNER_SEQ,
        name::SUT_SEQ,
        name::CONC_SEQ_IN,
        name::CONC_ACK_IN,
        name::CONC_DATA_IN,
    ] {
        assert_eq!(snapshot[field], "?", "field {field} should be unknown");
    }
}

// ---------------------------------------------------------------------------
// Observation path
// ---------------------------------------------------------------------------

#[test]
fn observation_labels_carry_the_window_classification() {
    let mut m = mapper();
    // Establish both anchors: learner counter 1 (after a SYN from 0),
    // peer counter 2001.
    m.process_outgoing_request(syn(), Validity::Valid, Validity::Valid, 0)
        .unwrap();
    m.process_incoming_response(FlagSet::from_bits(bit::SYN).with(bit::ACK), 2000, 1, 0)
        .unwrap();

    // A data segment at exactly the expected counters...
    let label = m
        .process_incoming_response(
            FlagSet::from_bits(bit::PSH).with(bit::ACK),
            2001,
            1,
            4,
        )
        .unwrap();
    assert_eq!(label, "ACK+PSH VALID VALID 4");

    // ...advances the peer counter by the payload length.
    assert_eq!(m.get_state()[name::SUT_SEQ], "2005");

    // A stale retransmission now classifies INVALID on both counters.
    let label = m
        .process_incoming_response(
            FlagSet::from_bits(bit::PSH).with(bit::ACK),
            2001,
            0,
            4,
        )
        .unwrap();
    assert_eq!(label, "ACK+PSH INV INV 4");
}

#[test]
fn full_learning_round_produces_a_consistent_transcript() {
    let mut m = mapper();

    // A typical learner round: open, observe, ack, observe silence.
    assert_eq!(
        m.process_outgoing_request(syn(), Validity::Valid, Validity::Valid, 0)
            .unwrap(),
        "SYN 0 0 0"
    );
    assert_eq!(
        m.process_incoming_response(
            FlagSet::from_bits(bit::SYN).with(bit::ACK),
            2000,
            1,
            0
        )
        .unwrap(),
        "ACK+SYN VALID VALID 0"
    );
    assert_eq!(
        m.process_outgoing_request(
            FlagSet::from_bits(bit::ACK),
            Validity::Valid,
            Validity::Valid,
            0,
        )
        .unwrap(),
        "ACK 1 2001 0"
    );
    assert_eq!(m.process_incoming_timeout().unwrap(), "TIMEOUT");

    // The inverse executions leave a diagnostic trail.
    let constraints = m.last_constraints().expect("inversions were executed");
    assert!(!constraints.is_empty());
}

#[test]
fn counters_wrap_at_the_32_bit_boundary_without_sign_errors() {
    let mut m = mapper();
    // Peer counter sits just below the boundary; a 10-byte segment pushes
    // the expectation across the wrap.
    m.process_incoming_response(FlagSet::from_bits(bit::ACK), u32::MAX - 4, 9, 10)
        .unwrap();
    assert_eq!(m.get_state()[name::SUT_SEQ], "5");
    assert_eq!(m.get_state()[name::LEARNER_SEQ], "9");

    // The next valid outgoing ack is the wrapped counter.
    let label = m
        .process_outgoing_request(
            FlagSet::from_bits(bit::ACK),
            Validity::Valid,
            Validity::Valid,
            0,
        )
        .unwrap();
    assert_eq!(label, "ACK 9 5 0");
}

#[test]
fn represent_and_classify_agree_for_both_classes() {
    let policy = WindowPolicy::default();
    let mut state = State::new();
    state.set_int(name::LEARNER_SEQ, 4_000_000_000).unwrap();
    state.set_int(name::SUT_SEQ, 3).unwrap();

    for role in [Role::Sequence, Role::Ack] {
        for class in [Validity::Valid, Validity::Invalid] {
            let witness = represent(role, class, &state, &policy)
                .unwrap()
                .expect("exact windows give both classes witnesses");
            assert_eq!(classify(role, witness, &state, &policy).unwrap(), class);
        }
    }
}
