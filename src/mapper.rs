//! Session controller — the mapper façade driven by the learning harness.
//!
//! One [`Mapper`] owns one session: its [`State`] plus a shared handle to
//! the compiled [`MappingSet`].  The harness issues protocol events strictly
//! sequentially; each event drives the state store, the validity windows and
//! the mapping executor, and yields one canonical label:
//!
//! ```text
//!  harness event                 mapping              label
//!  ─────────────────────────────────────────────────────────────
//!  incoming response   ──▶  incomingResponse  ──▶  "ACK+SYN VALID VALID 0"
//!  incoming timeout    ──▶  incomingTimeout   ──▶  "TIMEOUT"
//!  outgoing request    ──▶  outgoingRequest⁻¹ ──▶  "SYN 100 0 0" | "undefined"
//!  outgoing reset      ──▶  (state read)      ──▶  "RST 500 0 0" | ∅
//! ```
//!
//! Satisfiability and missing-precondition outcomes are values
//! (`"undefined"`, `None`), never errors; a [`MapperError`] means the rules
//! or their caller are defective and the session must be aborted.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::flags::{bit, FlagSet};
use crate::mapping::{
    binding_int, mapping_name, Bindings, ConstraintRecord, MapperError, MappingSet, SolveResult,
};
use crate::profile::MapperProfile;
use crate::serializer;
use crate::state::{name, store, unsigned, FieldValue, State};
use crate::window::Validity;

/// The per-session mapper façade.
pub struct Mapper {
    /// Session state; owned here exclusively, shared with nothing.
    pub state: State,
    mappings: Arc<MappingSet>,
    last_constraints: Option<ConstraintRecord>,
}

impl Mapper {
    /// New session over an already-compiled mapping set.
    pub fn new(mappings: Arc<MappingSet>) -> Self {
        Mapper {
            state: State::new(),
            mappings,
            last_constraints: None,
        }
    }

    /// Convenience constructor compiling `profile` for a single session.
    pub fn with_profile(profile: MapperProfile) -> Self {
        Self::new(Arc::new(MappingSet::new(profile)))
    }

    /// Interpret one observed response: forward-execute `incomingResponse`
    /// and render the abstract label.
    pub fn process_incoming_response(
        &mut self,
        flags: FlagSet,
        seq_nr: u32,
        ack_nr: u32,
        payload_len: u32,
    ) -> Result<String, MapperError> {
        let mut inputs = Bindings::new();
        inputs.insert(name::FLAGS_IN, FieldValue::Flags(Some(flags)));
        inputs.insert(name::CONC_SEQ_IN, FieldValue::Integer(Some(store(seq_nr))));
        inputs.insert(name::CONC_ACK_IN, FieldValue::Integer(Some(store(ack_nr))));
        inputs.insert(
            name::CONC_DATA_IN,
            FieldValue::Integer(Some(store(payload_len))),
        );

        self.mappings
            .execute_forward(mapping_name::INCOMING_RESPONSE, &mut self.state, &inputs)?;

        let abs_seq = self.committed_class(name::ABS_SEQ_IN)?;
        let abs_ack = self.committed_class(name::ABS_ACK_IN)?;
        let label = serializer::abstract_message(flags, abs_seq, abs_ack, payload_len);
        log::debug!("[mapper] ← {label}");
        Ok(label)
    }

    /// Register an absent response.  The mapping takes a placeholder input
    /// because every rule requires at least one bound field.
    pub fn process_incoming_timeout(&mut self) -> Result<String, MapperError> {
        let mut inputs = Bindings::new();
        inputs.insert(name::TMP, FieldValue::Integer(Some(0)));
        self.mappings
            .execute_forward(mapping_name::INCOMING_TIMEOUT, &mut self.state, &inputs)?;
        log::debug!("[mapper] ← {}", serializer::TIMEOUT);
        Ok(serializer::TIMEOUT.to_string())
    }

    /// Concretize one requested stimulus: inverse-execute `outgoingRequest`.
    ///
    /// On success the solved counters are committed and the concrete label
    /// returned; on an unsatisfiable request the state is left untouched and
    /// the label is [`serializer::UNDEFINED`].
    pub fn process_outgoing_request(
        &mut self,
        flags: FlagSet,
        abs_seq: Validity,
        abs_ack: Validity,
        payload_len: u32,
    ) -> Result<String, MapperError> {
        let mut outputs = Bindings::new();
        outputs.insert(name::FLAGS_OUT_2, FieldValue::Flags(Some(flags)));
        outputs.insert(name::ABS_SEQ_OUT, FieldValue::Validity(Some(abs_seq)));
        outputs.insert(name::ABS_ACK_OUT, FieldValue::Validity(Some(abs_ack)));
        outputs.insert(
            name::ABS_DATA_OUT,
            FieldValue::Integer(Some(store(payload_len))),
        );

        let inversion =
            self.mappings
                .execute_inverted(mapping_name::OUTGOING_REQUEST, &self.state, &outputs)?;

        let label = match inversion.result {
            SolveResult::Assignment(assignment) => {
                let seq = binding_int(&assignment, mapping_name::OUTGOING_REQUEST, name::CONC_SEQ_OUT)?;
                let ack = binding_int(&assignment, mapping_name::OUTGOING_REQUEST, name::CONC_ACK_OUT)?;
                self.mappings.promote(
                    mapping_name::OUTGOING_REQUEST,
                    &mut self.state,
                    &assignment,
                )?;
                let label = serializer::concrete_message(flags, seq, ack, payload_len);
                log::debug!("[mapper] → {label}");
                label
            }
            SolveResult::Unsatisfiable => {
                log::debug!(
                    "[mapper] → {} ({})",
                    serializer::UNDEFINED,
                    inversion.constraints
                );
                serializer::UNDEFINED.to_string()
            }
        };
        self.last_constraints = Some(inversion.constraints);
        Ok(label)
    }

    /// Concretize a reset message from the last known learner counter.
    ///
    /// Returns `None` while that counter is unset — the reset cannot be
    /// produced yet, which the harness treats as an absent event.
    pub fn process_outgoing_reset(&mut self) -> Result<Option<String>, MapperError> {
        match self.state.int(name::LEARNER_SEQ)? {
            None => Ok(None),
            Some(seq) => {
                let label = serializer::concrete_message(
                    FlagSet::from_bits(bit::RST),
                    unsigned(seq),
                    0,
                    0,
                );
                log::debug!("[mapper] → {label}");
                Ok(Some(label))
            }
        }
    }

    /// Restart the session: every field back to its initial value.
    pub fn send_reset(&mut self) {
        log::debug!("[mapper] session reset");
        self.state.reset();
    }

    /// Pass an out-of-band action through unchanged (lower-cased).
    pub fn process_outgoing_action(&self, action: &str) -> String {
        action.to_lowercase()
    }

    /// Rendered snapshot of the session state; unset fields show as `"?"`.
    pub fn get_state(&self) -> BTreeMap<String, String> {
        self.state.snapshot()
    }

    /// The constraint record of the most recent inverse execution.
    pub fn last_constraints(&self) -> Option<&ConstraintRecord> {
        self.last_constraints.as_ref()
    }

    /// Read back a validity class committed by a forward execution.
    fn committed_class(&self, field: &'static str) -> Result<Validity, MapperError> {
        self.state.validity(field)?.ok_or(MapperError::UnsetBinding {
            mapping: mapping_name::INCOMING_RESPONSE,
            field,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
