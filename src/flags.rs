//! Protocol flag sets.
//!
//! [`FlagSet`] is a small bitset over the fixed flag alphabet the mapper
//! understands: SYN, ACK, FIN, RST, PSH.  Flag sets travel in three shapes:
//! - as a value bound to a `Flags` state field,
//! - as the leading token of a query symbol (`SYN+ACK(...)`),
//! - as the leading token of a rendered label (`"ACK+SYN 101 1 0"`).
//!
//! The canonical text form joins flag names with `+` in alphabetical order,
//! so equal sets always render identically.  Parsing additionally accepts the
//! compact single-letter form (`"SA"` for SYN+ACK) that packet dissectors
//! emit.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Bit-flag constants for the individual protocol flags.
pub mod bit {
    /// Synchronise sequence numbers (handshake initiation).
    pub const SYN: u8 = 0b0000_0001;
    /// Acknowledgement field is meaningful.
    pub const ACK: u8 = 0b0000_0010;
    /// Finish — sender has no more data to send.
    pub const FIN: u8 = 0b0000_0100;
    /// Reset the connection.
    pub const RST: u8 = 0b0000_1000;
    /// Push buffered data to the receiving application.
    pub const PSH: u8 = 0b0001_0000;
}

/// Mask of all bits that name a known flag.
const KNOWN: u8 = bit::SYN | bit::ACK | bit::FIN | bit::RST | bit::PSH;

/// Name and single-letter form of every flag, in canonical (alphabetical)
/// render order.
const TABLE: &[(u8, &str, char)] = &[
    (bit::ACK, "ACK", 'A'),
    (bit::FIN, "FIN", 'F'),
    (bit::PSH, "PSH", 'P'),
    (bit::RST, "RST", 'R'),
    (bit::SYN, "SYN", 'S'),
];

// ---------------------------------------------------------------------------
// FlagSet
// ---------------------------------------------------------------------------

/// A set of protocol flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FlagSet(u8);

impl FlagSet {
    /// The empty set.
    pub const EMPTY: FlagSet = FlagSet(0);

    /// Build a set from raw [`bit`] constants; unknown bits are discarded.
    pub fn from_bits(bits: u8) -> Self {
        FlagSet(bits & KNOWN)
    }

    /// Add one [`bit`] constant, returning the extended set.
    #[must_use]
    pub fn with(self, flag: u8) -> Self {
        FlagSet((self.0 | flag) & KNOWN)
    }

    /// `true` when every bit of `flag` is present.
    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// `true` when no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for FlagSet {
    /// Render as `+`-joined names in alphabetical order, e.g. `ACK+SYN`.
    /// The empty set renders as an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for &(flag, name, _) in TABLE {
            if self.contains(flag) {
                if !first {
                    write!(f, "+")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Errors that can arise when parsing a flag-set token.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown flag token '{0}'")]
pub struct UnknownFlag(pub String);

impl FromStr for FlagSet {
    type Err = UnknownFlag;

    /// Parse `+`-joined flag names (`SYN+ACK`) or a run of single-letter
    /// forms (`SA`).  Both spellings may be mixed across `+` segments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut set = FlagSet::EMPTY;
        for segment in s.split('+') {
            if let Some(&(flag, _, _)) = TABLE.iter().find(|(_, name, _)| *name == segment) {
                set = set.with(flag);
            } else if let Some(compact) = parse_compact(segment) {
                set = FlagSet(set.0 | compact.0);
            } else {
                return Err(UnknownFlag(segment.to_string()));
            }
        }
        Ok(set)
    }
}

/// Parse a run of single-letter flag forms (`"SA"`), or `None` if any
/// character names no flag.
fn parse_compact(segment: &str) -> Option<FlagSet> {
    if segment.is_empty() {
        return None;
    }
    let mut set = FlagSet::EMPTY;
    for c in segment.chars() {
        let &(flag, _, _) = TABLE.iter().find(|&&(_, _, letter)| letter == c)?;
        set = set.with(flag);
    }
    Some(set)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_alphabetical() {
        let set = FlagSet::EMPTY.with(bit::SYN).with(bit::ACK);
        assert_eq!(set.to_string(), "ACK+SYN");
    }

    #[test]
    fn display_empty_set() {
        assert_eq!(FlagSet::EMPTY.to_string(), "");
    }

    #[test]
    fn parse_named_form() {
        let set: FlagSet = "SYN+ACK".parse().unwrap();
        assert!(set.contains(bit::SYN));
        assert!(set.contains(bit::ACK));
        assert!(!set.contains(bit::FIN));
    }

    #[test]
    fn parse_compact_form() {
        let set: FlagSet = "SA".parse().unwrap();
        assert_eq!(set, FlagSet::EMPTY.with(bit::SYN).with(bit::ACK));
    }

    #[test]
    fn parse_single_flag() {
        assert_eq!("RST".parse::<FlagSet>().unwrap(), FlagSet::from_bits(bit::RST));
        assert_eq!("R".parse::<FlagSet>().unwrap(), FlagSet::from_bits(bit::RST));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            "SYN+XYZ".parse::<FlagSet>(),
            Err(UnknownFlag("XYZ".to_string()))
        );
        assert!("".parse::<FlagSet>().is_err());
    }

    #[test]
    fn roundtrip_through_display() {
        let set = FlagSet::EMPTY.with(bit::FIN).with(bit::ACK).with(bit::PSH);
        let reparsed: FlagSet = set.to_string().parse().unwrap();
        assert_eq!(reparsed, set);
    }

    #[test]
    fn from_bits_discards_unknown_bits() {
        let set = FlagSet::from_bits(0xff);
        assert_eq!(set, FlagSet::from_bits(KNOWN));
    }
}
