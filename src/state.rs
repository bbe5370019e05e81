//! Session state store.
//!
//! One [`State`] holds every named field a mapping may read or write during
//! one learning/testing session: the session trackers (`learnerSeq`,
//! `sutSeq`) and the binding fields of the three mappings.  Responsibilities:
//! - Declaring the fixed field surface with its kinds, so a mapping can never
//!   bind a value of the wrong shape without a loud error.
//! - Keeping the `UNSET` sentinel distinct from every storable counter value
//!   (integers are stored as `Option<i32>`; `None` can never collide with a
//!   stored value).
//! - Isolating the signed/unsigned boundary: counters are stored as signed
//!   32-bit integers and interpreted as unsigned (`value mod 2^32`) only at
//!   the [`store`]/[`unsigned`] conversion points — classification and solve
//!   logic never sees the sign.
//!
//! State is owned by one session controller and mutated only through it; a
//! new session starts from [`State::reset`].

use std::collections::BTreeMap;

use thiserror::Error;

use crate::flags::FlagSet;
use crate::window::Validity;

/// Field-name constants shared by the state store, the mappings, and the
/// session controller.
pub mod name {
    /// Learner-side next sequence number (session tracker).
    pub const LEARNER_SEQ: &str = "learnerSeq";
    /// Next sequence number expected from the system under test (tracker).
    pub const SUT_SEQ: &str = "sutSeq";

    /// Flags of the observed incoming response.
    pub const FLAGS_IN: &str = "flagsIn";
    /// Concrete sequence number of the incoming response.
    pub const CONC_SEQ_IN: &str = "concSeqIn";
    /// Concrete acknowledgment number of the incoming response.
    pub const CONC_ACK_IN: &str = "concAckIn";
    /// Payload length of the incoming response.
    pub const CONC_DATA_IN: &str = "concDataIn";
    /// Abstract class assigned to the incoming sequence number.
    pub const ABS_SEQ_IN: &str = "absSeqIn";
    /// Abstract class assigned to the incoming acknowledgment number.
    pub const ABS_ACK_IN: &str = "absAckIn";
    /// Placeholder input for mappings with no meaningful argument.
    pub const TMP: &str = "tmp";

    /// Flags copied through by the incoming-response mapping.
    pub const FLAGS_OUT: &str = "flagsOut";
    /// Flags of the outgoing request (second variant, inverse direction).
    pub const FLAGS_OUT_2: &str = "flagsOut2";
    /// Requested abstract class of the outgoing sequence number.
    pub const ABS_SEQ_OUT: &str = "absSeqOut";
    /// Requested abstract class of the outgoing acknowledgment number.
    pub const ABS_ACK_OUT: &str = "absAckOut";
    /// Requested payload length of the outgoing request.
    pub const ABS_DATA_OUT: &str = "absDataOut";
    /// Solved concrete sequence number of the outgoing request.
    pub const CONC_SEQ_OUT: &str = "concSeqOut";
    /// Solved concrete acknowledgment number of the outgoing request.
    pub const CONC_ACK_OUT: &str = "concAckOut";
    /// Concrete payload length of the outgoing request.
    pub const CONC_DATA_OUT: &str = "concDataOut";
}

/// Every declared field with its kind.  [`State::new`] seeds the store from
/// this table; referencing any other name is an [`StateError::UnknownField`].
const DECLARED: &[(&str, FieldKind)] = &[
    (name::LEARNER_SEQ, FieldKind::Integer),
    (name::SUT_SEQ, FieldKind::Integer),
    (name::FLAGS_IN, FieldKind::Flags),
    (name::CONC_SEQ_IN, FieldKind::Integer),
    (name::CONC_ACK_IN, FieldKind::Integer),
    (name::CONC_DATA_IN, FieldKind::Integer),
    (name::ABS_SEQ_IN, FieldKind::Validity),
    (name::ABS_ACK_IN, FieldKind::Validity),
    (name::TMP, FieldKind::Integer),
    (name::FLAGS_OUT, FieldKind::Flags),
    (name::FLAGS_OUT_2, FieldKind::Flags),
    (name::ABS_SEQ_OUT, FieldKind::Validity),
    (name::ABS_ACK_OUT, FieldKind::Validity),
    (name::ABS_DATA_OUT, FieldKind::Integer),
    (name::CONC_SEQ_OUT, FieldKind::Integer),
    (name::CONC_ACK_OUT, FieldKind::Integer),
    (name::CONC_DATA_OUT, FieldKind::Integer),
];

// ---------------------------------------------------------------------------
// Signed/unsigned boundary
// ---------------------------------------------------------------------------

/// Store an unsigned 32-bit counter in its signed internal form.
#[inline]
pub fn store(value: u32) -> i32 {
    value as i32
}

/// Unsigned interpretation of a stored counter (`value mod 2^32`).
#[inline]
pub fn unsigned(value: i32) -> u32 {
    value as u32
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

/// The three kinds a declared field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// 32-bit counter (sequence/ack numbers, payload lengths).
    Integer,
    /// A set of protocol flags.
    Flags,
    /// An abstract validity class.
    Validity,
}

/// A field's current value.  `None` is the unset sentinel for every kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Integer(Option<i32>),
    Flags(Option<FlagSet>),
    Validity(Option<Validity>),
}

impl FieldValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Flags(_) => FieldKind::Flags,
            FieldValue::Validity(_) => FieldKind::Validity,
        }
    }

    /// The initial (unset) value of `kind`.
    pub fn unset(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Integer => FieldValue::Integer(None),
            FieldKind::Flags => FieldValue::Flags(None),
            FieldKind::Validity => FieldValue::Validity(None),
        }
    }

    /// Render for the snapshot: unset fields as `"?"`, counters as their
    /// unsigned decimal form, flags and classes in canonical text form.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Integer(None) | FieldValue::Flags(None) | FieldValue::Validity(None) => {
                "?".to_string()
            }
            FieldValue::Integer(Some(v)) => unsigned(*v).to_string(),
            FieldValue::Flags(Some(f)) => f.to_string(),
            FieldValue::Validity(Some(v)) => v.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Field-access failures.  Both variants indicate a defect in the mapping
/// rules or their caller, not a protocol anomaly, and abort the session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("type mismatch on field '{field}': expected {expected:?}, got {got:?}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        got: FieldKind,
    },
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Mutable named-field state for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    fields: BTreeMap<&'static str, FieldValue>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Fresh state with every declared field unset.
    pub fn new() -> Self {
        let fields = DECLARED
            .iter()
            .map(|&(name, kind)| (name, FieldValue::unset(kind)))
            .collect();
        State { fields }
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Result<&FieldValue, StateError> {
        self.fields
            .get(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))
    }

    /// Overwrite `name` with `value`; the kinds must agree.
    pub fn set(&mut self, name: &str, value: FieldValue) -> Result<(), StateError> {
        let slot = self
            .fields
            .get_mut(name)
            .ok_or_else(|| StateError::UnknownField(name.to_string()))?;
        if slot.kind() != value.kind() {
            return Err(StateError::TypeMismatch {
                field: name.to_string(),
                expected: slot.kind(),
                got: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Stored form of an integer field (`None` while unset).
    pub fn int(&self, name: &str) -> Result<Option<i32>, StateError> {
        match self.get(name)? {
            FieldValue::Integer(v) => Ok(*v),
            other => Err(StateError::TypeMismatch {
                field: name.to_string(),
                expected: FieldKind::Integer,
                got: other.kind(),
            }),
        }
    }

    /// Bind an integer field to an unsigned counter value.
    pub fn set_int(&mut self, name: &str, value: u32) -> Result<(), StateError> {
        self.set(name, FieldValue::Integer(Some(store(value))))
    }

    /// Current flag set of a flags field (`None` while unset).
    pub fn flags(&self, name: &str) -> Result<Option<FlagSet>, StateError> {
        match self.get(name)? {
            FieldValue::Flags(f) => Ok(*f),
            other => Err(StateError::TypeMismatch {
                field: name.to_string(),
                expected: FieldKind::Flags,
                got: other.kind(),
            }),
        }
    }

    /// Current class of a validity field (`None` while unset).
    pub fn validity(&self, name: &str) -> Result<Option<Validity>, StateError> {
        match self.get(name)? {
            FieldValue::Validity(v) => Ok(*v),
            other => Err(StateError::TypeMismatch {
                field: name.to_string(),
                expected: FieldKind::Validity,
                got: other.kind(),
            }),
        }
    }

    /// Ordered rendering of every declared field, unset values as `"?"`.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .map(|(name, value)| (name.to_string(), value.render()))
            .collect()
    }

    /// Return every field to its initial unset value (session restart).
    pub fn reset(&mut self) {
        for value in self.fields.values_mut() {
            *value = FieldValue::unset(value.kind());
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
