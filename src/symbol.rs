//! Query-protocol symbol syntax.
//!
//! The harness ships messages as compact symbols of the shape
//! `FLAGS(seq,ack,len)`:
//!
//! - [`AbstractSymbol`] — request alphabet: counters as validity classes,
//!   `?` for positions left unconstrained, e.g. `SYN(V,V,0)` or `RST(?,?,?)`.
//! - [`ConcreteSymbol`] — observation alphabet: counters as unsigned
//!   decimals, e.g. `ACK+SYN(2000,1,0)`.
//!
//! Parsing is strict: exactly three comma-separated positions inside one
//! pair of parentheses, nothing trailing.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::flags::{FlagSet, UnknownFlag};
use crate::window::{UnknownValidity, Validity};

/// Errors raised while parsing a symbol.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("malformed symbol '{0}'")]
    Syntax(String),
    #[error(transparent)]
    Flag(#[from] UnknownFlag),
    #[error(transparent)]
    Validity(#[from] UnknownValidity),
    #[error("bad counter value '{0}'")]
    Number(String),
}

/// Split `FLAGS(a,b,c)` into its four tokens.
fn split_symbol(s: &str) -> Result<(&str, &str, &str, &str), SymbolError> {
    let malformed = || SymbolError::Syntax(s.to_string());
    let open = s.find('(').ok_or_else(malformed)?;
    if !s.ends_with(')') || open == 0 {
        return Err(malformed());
    }
    let flags = &s[..open];
    let inner = &s[open + 1..s.len() - 1];
    let mut parts = inner.split(',');
    let (a, b, c) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), Some(c), None) => (a, b, c),
        _ => return Err(malformed()),
    };
    Ok((flags, a, b, c))
}

fn parse_counter(token: &str) -> Result<u32, SymbolError> {
    token
        .parse::<u32>()
        .map_err(|_| SymbolError::Number(token.to_string()))
}

// ---------------------------------------------------------------------------
// AbstractSymbol
// ---------------------------------------------------------------------------

/// A request symbol over the abstract alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbstractSymbol {
    pub flags: FlagSet,
    pub seq: Option<Validity>,
    pub ack: Option<Validity>,
    pub payload_len: Option<u32>,
}

impl FromStr for AbstractSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (flags, seq, ack, len) = split_symbol(s)?;
        let parse_class = |token: &str| -> Result<Option<Validity>, SymbolError> {
            if token == "?" {
                Ok(None)
            } else {
                Ok(Some(token.parse::<Validity>()?))
            }
        };
        Ok(AbstractSymbol {
            flags: flags.parse::<FlagSet>()?,
            seq: parse_class(seq)?,
            ack: parse_class(ack)?,
            payload_len: if len == "?" {
                None
            } else {
                Some(parse_counter(len)?)
            },
        })
    }
}

impl fmt::Display for AbstractSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = |v: Option<Validity>| v.map_or("?".to_string(), |v| v.to_string());
        let len = self
            .payload_len
            .map_or("?".to_string(), |n| n.to_string());
        write!(
            f,
            "{}({},{},{})",
            self.flags,
            class(self.seq),
            class(self.ack),
            len
        )
    }
}

// ---------------------------------------------------------------------------
// ConcreteSymbol
// ---------------------------------------------------------------------------

/// An observed message with fully concrete counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcreteSymbol {
    pub flags: FlagSet,
    pub seq: u32,
    pub ack: u32,
    pub payload_len: u32,
}

impl FromStr for ConcreteSymbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (flags, seq, ack, len) = split_symbol(s)?;
        Ok(ConcreteSymbol {
            flags: flags.parse::<FlagSet>()?,
            seq: parse_counter(seq)?,
            ack: parse_counter(ack)?,
            payload_len: parse_counter(len)?,
        })
    }
}

impl fmt::Display for ConcreteSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({},{},{})",
            self.flags, self.seq, self.ack, self.payload_len
        )
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::bit;

    #[test]
    fn parse_abstract_request() {
        let sym: AbstractSymbol = "SYN(V,INV,0)".parse().unwrap();
        assert_eq!(sym.flags, FlagSet::from_bits(bit::SYN));
        assert_eq!(sym.seq, Some(Validity::Valid));
        assert_eq!(sym.ack, Some(Validity::Invalid));
        assert_eq!(sym.payload_len, Some(0));
    }

    #[test]
    fn parse_abstract_reset_with_wildcards() {
        let sym: AbstractSymbol = "RST(?,?,?)".parse().unwrap();
        assert_eq!(sym.flags, FlagSet::from_bits(bit::RST));
        assert_eq!(sym.seq, None);
        assert_eq!(sym.ack, None);
        assert_eq!(sym.payload_len, None);
    }

    #[test]
    fn parse_concrete_observation() {
        let sym: ConcreteSymbol = "ACK+SYN(2000,1,0)".parse().unwrap();
        assert_eq!(sym.flags, FlagSet::EMPTY.with(bit::SYN).with(bit::ACK));
        assert_eq!(sym.seq, 2000);
        assert_eq!(sym.ack, 1);
        assert_eq!(sym.payload_len, 0);
    }

    #[test]
    fn parse_concrete_counter_at_the_boundary() {
        let sym: ConcreteSymbol = "ACK(4294967295,0,0)".parse().unwrap();
        assert_eq!(sym.seq, u32::MAX);
    }

    #[test]
    fn reject_malformed_symbols() {
        assert!(matches!(
            "SYN".parse::<AbstractSymbol>(),
            Err(SymbolError::Syntax(_))
        ));
        assert!(matches!(
            "(V,V,0)".parse::<AbstractSymbol>(),
            Err(SymbolError::Syntax(_))
        ));
        assert!(matches!(
            "SYN(V,V)".parse::<AbstractSymbol>(),
            Err(SymbolError::Syntax(_))
        ));
        assert!(matches!(
            "SYN(V,V,0,9)".parse::<AbstractSymbol>(),
            Err(SymbolError::Syntax(_))
        ));
    }

    #[test]
    fn reject_bad_tokens() {
        assert!(matches!(
            "XYZ(V,V,0)".parse::<AbstractSymbol>(),
            Err(SymbolError::Flag(_))
        ));
        assert!(matches!(
            "SYN(FRESH,V,0)".parse::<AbstractSymbol>(),
            Err(SymbolError::Validity(_))
        ));
        assert!(matches!(
            "SYN(x,0,0)".parse::<ConcreteSymbol>(),
            Err(SymbolError::Number(_))
        ));
        // Out-of-range counters do not wrap silently.
        assert!(matches!(
            "SYN(4294967296,0,0)".parse::<ConcreteSymbol>(),
            Err(SymbolError::Number(_))
        ));
    }

    #[test]
    fn symbols_roundtrip_through_display() {
        for text in ["SYN(V,INV,4)", "RST(?,?,?)", "ACK+FIN(VALID,?,0)"] {
            let sym: AbstractSymbol = text.parse().unwrap();
            let again: AbstractSymbol = sym.to_string().parse().unwrap();
            assert_eq!(again, sym);
        }
        let sym: ConcreteSymbol = "ACK+PSH(7,8,9)".parse().unwrap();
        assert_eq!(sym.to_string(), "ACK+PSH(7,8,9)");
    }
}
