//! Validity windows over the 32-bit counter space.
//!
//! A counter value is never judged in isolation: whether a sequence or
//! acknowledgment number is VALID depends on where the session currently
//! stands.  Each [`Role`] owns an acceptance window derived from one state
//! field (its *anchor*):
//!
//! ```text
//!            anchor          anchor + tolerance
//!              │                  │
//!  ────────────┼──────────────────┼────────────▶ counter space (mod 2^32)
//!              │ ◀──── VALID ────▶│   everything else: INV
//! ```
//!
//! Windows are computed modulo 2^32, so a window that straddles the
//! `u32::MAX` → `0` boundary behaves exactly like any other window; there is
//! no overflow special-casing anywhere.
//!
//! Two operations, both pure in `(role, state)`:
//! - [`classify`] places a concrete value inside or outside the window.
//! - [`represent`] produces the deterministic witness for a requested class,
//!   or reports that the class has no witness under the current state.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::state::{name, unsigned, State, StateError};

// ---------------------------------------------------------------------------
// Validity
// ---------------------------------------------------------------------------

/// The two-valued abstraction of a counter: inside or outside its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    Valid,
    Invalid,
}

impl fmt::Display for Validity {
    /// Canonical label form: `VALID` / `INV`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validity::Valid => write!(f, "VALID"),
            Validity::Invalid => write!(f, "INV"),
        }
    }
}

/// Error for an unrecognized validity token.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown validity class '{0}'")]
pub struct UnknownValidity(pub String);

impl FromStr for Validity {
    type Err = UnknownValidity;

    /// Accepts the learner's short form (`V`, `INV`) and the spelled-out
    /// form (`VALID`, `INVALID`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V" | "VALID" => Ok(Validity::Valid),
            "INV" | "INVALID" => Ok(Validity::Invalid),
            other => Err(UnknownValidity(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Roles and window policy
// ---------------------------------------------------------------------------

/// The two counter roles a window can be derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sequence-number role, anchored at the learner's own counter.
    Sequence,
    /// Acknowledgment-number role, anchored at the counter expected from the
    /// peer.
    Ack,
}

/// Window parameters for one role.
///
/// The anchor names a state field; the window covers `anchor ..=
/// anchor + tolerance` (mod 2^32).  `fresh` is the witness handed out for
/// VALID while the anchor is still unset (before any constraint exists).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RolePolicy {
    /// State field holding the window anchor for this role.
    pub anchor: String,
    /// Width of the acceptance window above the anchor (0 = exact match).
    #[serde(default)]
    pub tolerance: u32,
    /// VALID witness while the anchor is unset.
    #[serde(default)]
    pub fresh: u32,
}

/// Per-role window parameters, supplied by the profile document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WindowPolicy {
    pub sequence: RolePolicy,
    pub ack: RolePolicy,
}

impl Default for WindowPolicy {
    /// The built-in profile: exact-match windows, sequence numbers anchored
    /// at `learnerSeq`, acknowledgment numbers at `sutSeq`.
    fn default() -> Self {
        WindowPolicy {
            sequence: RolePolicy {
                anchor: name::LEARNER_SEQ.to_string(),
                tolerance: 0,
                fresh: 0,
            },
            ack: RolePolicy {
                anchor: name::SUT_SEQ.to_string(),
                tolerance: 0,
                fresh: 0,
            },
        }
    }
}

impl WindowPolicy {
    /// The policy for `role`.
    pub fn role(&self, role: Role) -> &RolePolicy {
        match role {
            Role::Sequence => &self.sequence,
            Role::Ack => &self.ack,
        }
    }
}

// ---------------------------------------------------------------------------
// Window evaluation
// ---------------------------------------------------------------------------

/// `true` when `value` lies in `anchor ..= anchor + tolerance` (mod 2^32).
#[inline]
fn in_window(anchor: u32, tolerance: u32, value: u32) -> bool {
    value.wrapping_sub(anchor) <= tolerance
}

/// Classify `value` against the window anchored by `policy`.
///
/// While the anchor field is unset no constraint has been established and
/// every value classifies as VALID.
pub fn classify_against(
    policy: &RolePolicy,
    value: u32,
    state: &State,
) -> Result<Validity, StateError> {
    match state.int(&policy.anchor)? {
        None => Ok(Validity::Valid),
        Some(anchor) => {
            if in_window(unsigned(anchor), policy.tolerance, value) {
                Ok(Validity::Valid)
            } else {
                Ok(Validity::Invalid)
            }
        }
    }
}

/// Deterministic witness for `class` in the window anchored by `policy`, or
/// `None` when the class has no witness under the current state.
///
/// - anchor unset: VALID → the policy's `fresh` value; INV has no witness
///   (no window exists to fall outside of).
/// - anchor set: VALID → the anchor itself; INV → `anchor - 1` (mod 2^32),
///   unless the window covers the whole counter space.
pub fn witness_against(
    policy: &RolePolicy,
    class: Validity,
    state: &State,
) -> Result<Option<u32>, StateError> {
    let anchor = state.int(&policy.anchor)?;
    Ok(match (anchor, class) {
        (None, Validity::Valid) => Some(policy.fresh),
        (None, Validity::Invalid) => None,
        (Some(a), Validity::Valid) => Some(unsigned(a)),
        (Some(a), Validity::Invalid) => {
            if policy.tolerance == u32::MAX {
                None
            } else {
                Some(unsigned(a).wrapping_sub(1))
            }
        }
    })
}

/// Classify a concrete value for `role` under the current state.
pub fn classify(
    role: Role,
    value: u32,
    state: &State,
    policy: &WindowPolicy,
) -> Result<Validity, StateError> {
    classify_against(policy.role(role), value, state)
}

/// Produce one concrete value of the requested class for `role`, or `None`
/// when the class is empty under the current state.
pub fn represent(
    role: Role,
    class: Validity,
    state: &State,
    policy: &WindowPolicy,
) -> Result<Option<u32>, StateError> {
    witness_against(policy.role(role), class, state)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
