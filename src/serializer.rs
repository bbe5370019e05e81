//! Canonical label rendering.
//!
//! The learning harness consumes flat, space-separated labels as its
//! observable alphabet: `flags seq ack length`.  Abstract labels carry
//! validity classes in the counter positions (`"ACK+SYN VALID INV 0"`),
//! concrete labels carry unsigned counters (`"SYN 100 0 0"`).  No other
//! formatting logic exists anywhere in the crate.

use crate::flags::FlagSet;
use crate::window::Validity;

/// Fixed label returned for an absent response.
pub const TIMEOUT: &str = "TIMEOUT";

/// Sentinel label for a request that cannot be concretized.
pub const UNDEFINED: &str = "undefined";

/// Render an abstract message label.
pub fn abstract_message(flags: FlagSet, seq: Validity, ack: Validity, payload_len: u32) -> String {
    format!("{flags} {seq} {ack} {payload_len}")
}

/// Render a concrete message label; counters in unsigned decimal form.
pub fn concrete_message(flags: FlagSet, seq: u32, ack: u32, payload_len: u32) -> String {
    format!("{flags} {seq} {ack} {payload_len}")
}
