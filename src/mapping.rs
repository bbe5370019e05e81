//! Mapping executor — forward and inverse evaluation of the named mappings.
//!
//! A [`Mapping`] is a named, pre-compiled rule with declared, typed input and
//! output fields.  The rule alphabet is small and fixed, so the rules are a
//! closed set of statically known transformations rather than an interpreted
//! language:
//!
//! - `incomingResponse` — observation path: concrete counters in, abstract
//!   validity classes out, session trackers advanced.
//! - `outgoingRequest`  — stimulus path, usually run inverted: requested
//!   validity classes in, concrete counters solved for.
//! - `incomingTimeout`  — bookkeeping only.
//!
//! [`MappingSet`] is the compiled rule document: built once at startup,
//! immutable, and safely shared across sessions behind an `Arc`.  It owns no
//! session state; every call receives the session's [`State`] explicitly.
//!
//! # Inversion contract
//!
//! `execute_inverted` never mutates state.  It returns a candidate
//! assignment (or [`SolveResult::Unsatisfiable`]) together with a
//! [`ConstraintRecord`] of the conditions it evaluated; the session
//! controller decides whether to [`MappingSet::promote`] the assignment.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::flags::{bit, FlagSet};
use crate::profile::MapperProfile;
use crate::state::{name, store, unsigned, FieldKind, FieldValue, State, StateError};
use crate::window::{self, Role, Validity, WindowPolicy};

/// Names of the compiled mappings.
pub mod mapping_name {
    pub const INCOMING_RESPONSE: &str = "incomingResponse";
    pub const OUTGOING_REQUEST: &str = "outgoingRequest";
    pub const INCOMING_TIMEOUT: &str = "incomingTimeout";
}

/// A set of field bindings, keyed by declared field name.
pub type Bindings = BTreeMap<&'static str, FieldValue>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures of mapping execution.  Everything here indicates a defect in the
/// rules or their caller and aborts the session; a request that merely cannot
/// be concretized is [`SolveResult::Unsatisfiable`], not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MapperError {
    #[error("unknown mapping '{0}'")]
    UnknownMapping(String),
    #[error("mapping '{mapping}' cannot be inverted")]
    NotInvertible { mapping: &'static str },
    #[error("mapping '{mapping}' is missing a binding for '{field}'")]
    MissingBinding {
        mapping: &'static str,
        field: &'static str,
    },
    #[error("mapping '{mapping}' received an undeclared binding '{field}'")]
    UnexpectedBinding {
        mapping: &'static str,
        field: &'static str,
    },
    #[error("mapping '{mapping}' binding '{field}': expected {expected:?}, got {got:?}")]
    BindingKind {
        mapping: &'static str,
        field: &'static str,
        expected: FieldKind,
        got: FieldKind,
    },
    #[error("mapping '{mapping}' binding '{field}' must carry a concrete value")]
    UnsetBinding {
        mapping: &'static str,
        field: &'static str,
    },
    #[error(transparent)]
    State(#[from] StateError),
}

// ---------------------------------------------------------------------------
// Mapping declarations
// ---------------------------------------------------------------------------

/// One declared input or output field of a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn decl(name: &'static str, kind: FieldKind) -> FieldDecl {
    FieldDecl { name, kind }
}

/// The closed set of compiled rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    IncomingResponse,
    OutgoingRequest,
    IncomingTimeout,
}

const INCOMING_RESPONSE_INPUTS: &[FieldDecl] = &[
    decl(name::FLAGS_IN, FieldKind::Flags),
    decl(name::CONC_SEQ_IN, FieldKind::Integer),
    decl(name::CONC_ACK_IN, FieldKind::Integer),
    decl(name::CONC_DATA_IN, FieldKind::Integer),
];
const INCOMING_RESPONSE_OUTPUTS: &[FieldDecl] = &[
    decl(name::FLAGS_OUT, FieldKind::Flags),
    decl(name::ABS_SEQ_IN, FieldKind::Validity),
    decl(name::ABS_ACK_IN, FieldKind::Validity),
];
const OUTGOING_REQUEST_INPUTS: &[FieldDecl] = &[
    decl(name::FLAGS_OUT_2, FieldKind::Flags),
    decl(name::CONC_SEQ_OUT, FieldKind::Integer),
    decl(name::CONC_ACK_OUT, FieldKind::Integer),
    decl(name::CONC_DATA_OUT, FieldKind::Integer),
];
const OUTGOING_REQUEST_OUTPUTS: &[FieldDecl] = &[
    decl(name::FLAGS_OUT_2, FieldKind::Flags),
    decl(name::ABS_SEQ_OUT, FieldKind::Validity),
    decl(name::ABS_ACK_OUT, FieldKind::Validity),
    decl(name::ABS_DATA_OUT, FieldKind::Integer),
];
const INCOMING_TIMEOUT_INPUTS: &[FieldDecl] = &[decl(name::TMP, FieldKind::Integer)];
const INCOMING_TIMEOUT_OUTPUTS: &[FieldDecl] = &[];

/// A named, pre-compiled mapping rule.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub name: &'static str,
    rule: Rule,
    inputs: &'static [FieldDecl],
    outputs: &'static [FieldDecl],
}

impl Mapping {
    /// Declared input fields (bound on the forward path, solved on the
    /// inverse path).
    pub fn inputs(&self) -> &[FieldDecl] {
        self.inputs
    }

    /// Declared output fields.
    pub fn outputs(&self) -> &[FieldDecl] {
        self.outputs
    }
}

// ---------------------------------------------------------------------------
// Inversion results
// ---------------------------------------------------------------------------

/// Outcome of the search performed by an inverse execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveResult {
    /// A consistent assignment to the mapping's input fields.  Not yet
    /// committed; see [`MappingSet::promote`].
    Assignment(Bindings),
    /// The requested output classes cannot be realized under current state.
    Unsatisfiable,
}

/// Human-readable record of the conditions evaluated by an inversion.
/// Diagnostics only; carries no behavioral effect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintRecord {
    clauses: Vec<String>,
}

impl ConstraintRecord {
    fn push(&mut self, clause: String) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[String] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl fmt::Display for ConstraintRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clauses.join(" && "))
    }
}

/// Everything an inverse execution returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inversion {
    pub result: SolveResult,
    pub constraints: ConstraintRecord,
}

// ---------------------------------------------------------------------------
// MappingSet
// ---------------------------------------------------------------------------

/// The compiled rule document: every named mapping plus the window policy.
#[derive(Debug, Clone)]
pub struct MappingSet {
    mappings: BTreeMap<&'static str, Mapping>,
    policy: WindowPolicy,
}

impl MappingSet {
    /// Compile the built-in mappings against `profile`'s window policy.
    pub fn new(profile: MapperProfile) -> Self {
        let mut mappings = BTreeMap::new();
        for mapping in [
            Mapping {
                name: mapping_name::INCOMING_RESPONSE,
                rule: Rule::IncomingResponse,
                inputs: INCOMING_RESPONSE_INPUTS,
                outputs: INCOMING_RESPONSE_OUTPUTS,
            },
            Mapping {
                name: mapping_name::OUTGOING_REQUEST,
                rule: Rule::OutgoingRequest,
                inputs: OUTGOING_REQUEST_INPUTS,
                outputs: OUTGOING_REQUEST_OUTPUTS,
            },
            Mapping {
                name: mapping_name::INCOMING_TIMEOUT,
                rule: Rule::IncomingTimeout,
                inputs: INCOMING_TIMEOUT_INPUTS,
                outputs: INCOMING_TIMEOUT_OUTPUTS,
            },
        ] {
            mappings.insert(mapping.name, mapping);
        }
        MappingSet {
            mappings,
            policy: profile.window,
        }
    }

    /// The window policy these mappings were compiled with.
    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Look up a mapping by name.
    pub fn get(&self, name: &str) -> Result<&Mapping, MapperError> {
        self.mappings
            .get(name)
            .ok_or_else(|| MapperError::UnknownMapping(name.to_string()))
    }

    /// Forward execution: bind concrete inputs, evaluate the rule, commit
    /// the outputs, advance the trackers.  Never fails for well-typed input.
    pub fn execute_forward(
        &self,
        mapping_name: &str,
        state: &mut State,
        inputs: &Bindings,
    ) -> Result<Bindings, MapperError> {
        let mapping = self.get(mapping_name)?;
        validate(mapping, mapping.inputs, inputs)?;
        for (&field, value) in inputs {
            state.set(field, *value)?;
        }
        let outputs = self.eval_forward(mapping, state)?;
        for (&field, value) in &outputs {
            state.set(field, *value)?;
        }
        self.advance(mapping, state)?;
        Ok(outputs)
    }

    /// Inverse execution: given the requested output bindings, search for an
    /// input assignment whose forward evaluation reproduces them exactly.
    ///
    /// State is left untouched; a successful assignment becomes effective
    /// only through [`MappingSet::promote`].
    pub fn execute_inverted(
        &self,
        mapping_name: &str,
        state: &State,
        outputs: &Bindings,
    ) -> Result<Inversion, MapperError> {
        let mapping = self.get(mapping_name)?;
        validate(mapping, mapping.outputs, outputs)?;
        if mapping.rule != Rule::OutgoingRequest {
            return Err(MapperError::NotInvertible {
                mapping: mapping.name,
            });
        }
        self.invert_outgoing_request(mapping, state, outputs)
    }

    /// Commit a solved assignment into the session state and advance the
    /// trackers.  Called by the session controller after a successful
    /// inversion, never by the executor itself.
    pub fn promote(
        &self,
        mapping_name: &str,
        state: &mut State,
        assignment: &Bindings,
    ) -> Result<(), MapperError> {
        let mapping = self.get(mapping_name)?;
        validate(mapping, mapping.inputs, assignment)?;
        for (&field, value) in assignment {
            state.set(field, *value)?;
        }
        self.advance(mapping, state)
    }

    // -----------------------------------------------------------------------
    // Rule bodies
    // -----------------------------------------------------------------------

    /// Evaluate a rule's output expressions against the bound state.  Pure:
    /// reads state, returns the outputs without committing them.
    fn eval_forward(&self, mapping: &Mapping, state: &State) -> Result<Bindings, MapperError> {
        let mut outputs = Bindings::new();
        match mapping.rule {
            Rule::IncomingResponse => {
                let flags = require_flags(state, mapping.name, name::FLAGS_IN)?;
                let seq = require_int(state, mapping.name, name::CONC_SEQ_IN)?;
                let ack = require_int(state, mapping.name, name::CONC_ACK_IN)?;
                // An incoming sequence number is judged against the counter
                // the learner expects next from the peer; the incoming ack
                // against the learner's own counter.
                let abs_seq = window::classify_against(&self.policy.ack, seq, state)?;
                let abs_ack = window::classify_against(&self.policy.sequence, ack, state)?;
                outputs.insert(name::FLAGS_OUT, FieldValue::Flags(Some(flags)));
                outputs.insert(name::ABS_SEQ_IN, FieldValue::Validity(Some(abs_seq)));
                outputs.insert(name::ABS_ACK_IN, FieldValue::Validity(Some(abs_ack)));
            }
            Rule::OutgoingRequest => {
                let flags = require_flags(state, mapping.name, name::FLAGS_OUT_2)?;
                let seq = require_int(state, mapping.name, name::CONC_SEQ_OUT)?;
                let ack = require_int(state, mapping.name, name::CONC_ACK_OUT)?;
                let len = require_int(state, mapping.name, name::CONC_DATA_OUT)?;
                let abs_seq = window::classify(Role::Sequence, seq, state, &self.policy)?;
                let abs_ack = window::classify(Role::Ack, ack, state, &self.policy)?;
                outputs.insert(name::FLAGS_OUT_2, FieldValue::Flags(Some(flags)));
                outputs.insert(name::ABS_SEQ_OUT, FieldValue::Validity(Some(abs_seq)));
                outputs.insert(name::ABS_ACK_OUT, FieldValue::Validity(Some(abs_ack)));
                outputs.insert(name::ABS_DATA_OUT, FieldValue::Integer(Some(store(len))));
            }
            Rule::IncomingTimeout => {}
        }
        Ok(outputs)
    }

    /// Advance the session trackers after a committed execution.
    fn advance(&self, mapping: &Mapping, state: &mut State) -> Result<(), MapperError> {
        match mapping.rule {
            Rule::IncomingResponse => {
                let flags = require_flags(state, mapping.name, name::FLAGS_IN)?;
                let seq = require_int(state, mapping.name, name::CONC_SEQ_IN)?;
                let ack = require_int(state, mapping.name, name::CONC_ACK_IN)?;
                let len = require_int(state, mapping.name, name::CONC_DATA_IN)?;
                // The peer's ack names the learner's next usable counter.
                if flags.contains(bit::ACK) {
                    state.set_int(name::LEARNER_SEQ, ack)?;
                }
                state.set_int(
                    name::SUT_SEQ,
                    seq.wrapping_add(len).wrapping_add(phantom(flags)),
                )?;
            }
            Rule::OutgoingRequest => {
                let flags = require_flags(state, mapping.name, name::FLAGS_OUT_2)?;
                let seq = require_int(state, mapping.name, name::CONC_SEQ_OUT)?;
                let len = require_int(state, mapping.name, name::CONC_DATA_OUT)?;
                state.set_int(
                    name::LEARNER_SEQ,
                    seq.wrapping_add(len).wrapping_add(phantom(flags)),
                )?;
            }
            Rule::IncomingTimeout => {}
        }
        Ok(())
    }

    fn invert_outgoing_request(
        &self,
        mapping: &Mapping,
        state: &State,
        outputs: &Bindings,
    ) -> Result<Inversion, MapperError> {
        let flags = binding_flags(outputs, mapping.name, name::FLAGS_OUT_2)?;
        let abs_seq = binding_validity(outputs, mapping.name, name::ABS_SEQ_OUT)?;
        let abs_ack = binding_validity(outputs, mapping.name, name::ABS_ACK_OUT)?;
        let len = binding_int(outputs, mapping.name, name::ABS_DATA_OUT)?;

        let mut constraints = ConstraintRecord::default();
        constraints.push(format!("{} := {flags} (fixed)", name::FLAGS_OUT_2));
        constraints.push(format!("{} := {len} (fixed)", name::CONC_DATA_OUT));

        let seq = self.solve_counter(state, Role::Sequence, abs_seq, name::CONC_SEQ_OUT, &mut constraints)?;
        let ack = self.solve_counter(state, Role::Ack, abs_ack, name::CONC_ACK_OUT, &mut constraints)?;

        let (seq, ack) = match (seq, ack) {
            (Some(seq), Some(ack)) => (seq, ack),
            _ => {
                return Ok(Inversion {
                    result: SolveResult::Unsatisfiable,
                    constraints,
                })
            }
        };

        // The forward rule must reproduce the requested classes exactly.
        if window::classify(Role::Sequence, seq, state, &self.policy)? != abs_seq
            || window::classify(Role::Ack, ack, state, &self.policy)? != abs_ack
        {
            constraints.push(format!(
                "forward({seq}, {ack}) does not reproduce ({abs_seq}, {abs_ack})"
            ));
            return Ok(Inversion {
                result: SolveResult::Unsatisfiable,
                constraints,
            });
        }

        let mut assignment = Bindings::new();
        assignment.insert(name::FLAGS_OUT_2, FieldValue::Flags(Some(flags)));
        assignment.insert(name::CONC_SEQ_OUT, FieldValue::Integer(Some(store(seq))));
        assignment.insert(name::CONC_ACK_OUT, FieldValue::Integer(Some(store(ack))));
        assignment.insert(name::CONC_DATA_OUT, FieldValue::Integer(Some(store(len))));
        Ok(Inversion {
            result: SolveResult::Assignment(assignment),
            constraints,
        })
    }

    /// Solve one counter for the requested class, recording the evaluated
    /// window condition.
    fn solve_counter(
        &self,
        state: &State,
        role: Role,
        class: Validity,
        field: &'static str,
        constraints: &mut ConstraintRecord,
    ) -> Result<Option<u32>, MapperError> {
        let rp = self.policy.role(role);
        let anchor = state.int(&rp.anchor)?;
        let witness = window::represent(role, class, state, &self.policy)?;
        constraints.push(match (anchor, witness) {
            (None, Some(w)) => format!("{field} == {class} with {} unset -> fresh {w}", rp.anchor),
            (None, None) => {
                format!("{field} == {class} with {} unset -> unsatisfiable", rp.anchor)
            }
            (Some(a), Some(w)) => {
                let lo = unsigned(a);
                format!(
                    "{field} == {class} vs window [{lo}..{}] (anchor {}) -> {w}",
                    lo.wrapping_add(rp.tolerance),
                    rp.anchor
                )
            }
            (Some(a), None) => format!(
                "{field} == {class} vs window anchored at {} ({}) -> unsatisfiable",
                unsigned(a),
                rp.anchor
            ),
        });
        Ok(witness)
    }
}

// ---------------------------------------------------------------------------
// Binding helpers
// ---------------------------------------------------------------------------

/// SYN and FIN each occupy one position in the counter space.
#[inline]
fn phantom(flags: FlagSet) -> u32 {
    u32::from(flags.contains(bit::SYN)) + u32::from(flags.contains(bit::FIN))
}

/// Check that `bindings` covers exactly `declared` with correctly typed,
/// concrete values.
fn validate(
    mapping: &Mapping,
    declared: &'static [FieldDecl],
    bindings: &Bindings,
) -> Result<(), MapperError> {
    for d in declared {
        let value = bindings.get(d.name).ok_or(MapperError::MissingBinding {
            mapping: mapping.name,
            field: d.name,
        })?;
        if value.kind() != d.kind {
            return Err(MapperError::BindingKind {
                mapping: mapping.name,
                field: d.name,
                expected: d.kind,
                got: value.kind(),
            });
        }
        let unset = matches!(
            value,
            FieldValue::Integer(None) | FieldValue::Flags(None) | FieldValue::Validity(None)
        );
        if unset {
            return Err(MapperError::UnsetBinding {
                mapping: mapping.name,
                field: d.name,
            });
        }
    }
    for &field in bindings.keys() {
        if !declared.iter().any(|d| d.name == field) {
            return Err(MapperError::UnexpectedBinding {
                mapping: mapping.name,
                field,
            });
        }
    }
    Ok(())
}

fn require_int(
    state: &State,
    mapping: &'static str,
    field: &'static str,
) -> Result<u32, MapperError> {
    state
        .int(field)?
        .map(unsigned)
        .ok_or(MapperError::UnsetBinding { mapping, field })
}

fn require_flags(
    state: &State,
    mapping: &'static str,
    field: &'static str,
) -> Result<FlagSet, MapperError> {
    state
        .flags(field)?
        .ok_or(MapperError::UnsetBinding { mapping, field })
}

pub(crate) fn binding_int(
    bindings: &Bindings,
    mapping: &'static str,
    field: &'static str,
) -> Result<u32, MapperError> {
    match bindings.get(field) {
        Some(FieldValue::Integer(Some(v))) => Ok(unsigned(*v)),
        Some(FieldValue::Integer(None)) => Err(MapperError::UnsetBinding { mapping, field }),
        Some(other) => Err(MapperError::BindingKind {
            mapping,
            field,
            expected: FieldKind::Integer,
            got: other.kind(),
        }),
        None => Err(MapperError::MissingBinding { mapping, field }),
    }
}

pub(crate) fn binding_flags(
    bindings: &Bindings,
    mapping: &'static str,
    field: &'static str,
) -> Result<FlagSet, MapperError> {
    match bindings.get(field) {
        Some(FieldValue::Flags(Some(f))) => Ok(*f),
        Some(FieldValue::Flags(None)) => Err(MapperError::UnsetBinding { mapping, field }),
        Some(other) => Err(MapperError::BindingKind {
            mapping,
            field,
            expected: FieldKind::Flags,
            got: other.kind(),
        }),
        None => Err(MapperError::MissingBinding { mapping, field }),
    }
}

pub(crate) fn binding_validity(
    bindings: &Bindings,
    mapping: &'static str,
    field: &'static str,
) -> Result<Validity, MapperError> {
    match bindings.get(field) {
        Some(FieldValue::Validity(Some(v))) => Ok(*v),
        Some(FieldValue::Validity(None)) => Err(MapperError::UnsetBinding { mapping, field }),
        Some(other) => Err(MapperError::BindingKind {
            mapping,
            field,
            expected: FieldKind::Validity,
            got: other.kind(),
        }),
        None => Err(MapperError::MissingBinding { mapping, field }),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
