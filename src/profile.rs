//! Mapper profiles — the compiled parameters of the rule document.
//!
//! The original rule document is an external artifact loaded once at
//! startup.  Everything the compiled mappings need from it reduces to the
//! per-role window parameters, so a profile is a small JSON document:
//!
//! ```json
//! {
//!   "window": {
//!     "sequence": { "anchor": "learnerSeq", "tolerance": 0, "fresh": 0 },
//!     "ack":      { "anchor": "sutSeq" }
//!   }
//! }
//! ```
//!
//! Omitted sections fall back to the built-in defaults.  Profiles are
//! validated on load and immutable afterwards.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::window::WindowPolicy;

/// Errors raised while loading a profile document.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read profile: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed profile document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Startup configuration for one mapper deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MapperProfile {
    /// Per-role validity-window parameters.
    #[serde(default)]
    pub window: WindowPolicy,
}

impl MapperProfile {
    /// The built-in defaults (exact-match windows over `learnerSeq` /
    /// `sutSeq`).
    pub fn builtin() -> Self {
        Self::default()
    }

    /// Load a profile from a JSON document on disk.
    pub fn from_path(path: &Path) -> Result<Self, ProfileError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
