//! `tcp-mapper` — abstraction/concretization layer for model-based testing
//! of a TCP-like protocol.
//!
//! A learning or testing algorithm speaks a small abstract alphabet
//! ("VALID sequence, INVALID ack, 0 bytes"); the system under test speaks
//! concrete wire values (32-bit counters, flag bits, byte lengths).  This
//! crate translates in both directions while tracking the session state the
//! translation depends on.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────────┐  query lines   ┌───────────────────────────┐
//!  │  learning harness   │───────────────▶│  adapter (TCP / stdio)    │
//!  └─────────────────────┘    labels      └────────────┬──────────────┘
//!                                                      │ events
//!  ┌───────────────────────────────────────────────────▼──────────────┐
//!  │                      Mapper (session controller)                 │
//!  │   owns State, drives the mapping executor, renders labels        │
//!  └───────┬─────────────────────┬────────────────────┬───────────────┘
//!          │                     │                    │
//!  ┌───────▼────────┐   ┌────────▼─────────┐  ┌───────▼───────┐
//!  │     State      │   │   MappingSet     │  │  serializer   │
//!  │ (named fields, │   │ (compiled rules, │  │ (label text)  │
//!  │  UNSET-aware)  │   │  forward/inverse)│  └───────────────┘
//!  └────────────────┘   └────────┬─────────┘
//!                                │ windows
//!                       ┌────────▼─────────┐
//!                       │      window      │
//!                       │ (mod-2^32 VALID/ │
//!                       │  INV classifier) │
//!                       └──────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`flags`]      — protocol flag sets (parse / canonical display)
//! - [`state`]      — per-session named-field store with unset sentinels
//! - [`window`]     — validity windows: classify and witness counters
//! - [`profile`]    — window parameters loaded once at startup
//! - [`mapping`]    — forward/inverse execution of the compiled mappings
//! - [`serializer`] — canonical label rendering
//! - [`mapper`]     — the per-session façade driven by the harness
//! - [`symbol`]     — `FLAGS(seq,ack,len)` query-symbol syntax
//! - [`adapter`]    — query protocol over TCP or stdio

pub mod adapter;
pub mod flags;
pub mod mapper;
pub mod mapping;
pub mod profile;
pub mod serializer;
pub mod state;
pub mod symbol;
pub mod window;

pub use flags::FlagSet;
pub use mapper::Mapper;
pub use mapping::{
    Bindings, ConstraintRecord, Inversion, MapperError, MappingSet, SolveResult,
};
pub use profile::{MapperProfile, ProfileError};
pub use state::{State, StateError};
pub use symbol::{AbstractSymbol, ConcreteSymbol};
pub use window::{Role, Validity, WindowPolicy};
