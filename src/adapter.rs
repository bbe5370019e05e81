//! Harness adapter: the line-oriented query protocol and its TCP server.
//!
//! The learning harness drives the mapper one line at a time; every request
//! line produces exactly one reply line:
//!
//! ```text
//!   ABSTRACT <sym>   concretize a request symbol, e.g. ABSTRACT SYN(V,V,0)
//!                    → concrete label ("SYN 100 0 0") or "undefined"
//!   CONCRETE <sym>   abstract an observed response, e.g. CONCRETE ACK+SYN(2000,1,0)
//!                    → abstract label ("ACK+SYN VALID VALID 0")
//!   TIMEOUT          register an absent response → "TIMEOUT"
//!   RESET            restart the session → "RESET"
//!   STATE            dump the session state as k=v pairs
//!   STOP             close the session → "STOP"
//! ```
//!
//! An `ABSTRACT` symbol whose counters are wildcards (`RST(?,?,?)`) is the
//! reset stimulus: it is concretized from the last known learner counter and
//! answered with `"undefined"` while that counter is unset.
//!
//! [`serve`] runs the protocol over TCP, one independent session (one
//! [`Mapper`], one state) per connection.  Protocol errors are defects, not
//! anomalies: they abort the session with a diagnostic.

use std::io::BufRead;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::flags::bit;
use crate::mapper::Mapper;
use crate::mapping::{MapperError, MappingSet};
use crate::serializer;
use crate::symbol::{AbstractSymbol, ConcreteSymbol, SymbolError};

/// Errors that abort one harness session.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown query '{0}'")]
    UnknownQuery(String),
    #[error(transparent)]
    Symbol(#[from] SymbolError),
    #[error(transparent)]
    Mapper(#[from] MapperError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reply to one query line.
#[derive(Debug, PartialEq, Eq)]
pub enum Reply {
    /// Answer with one line and keep the session open.
    Line(String),
    /// Answer `STOP` and close the session.
    Stop,
}

/// Process one query line against a session.
pub fn dispatch(mapper: &mut Mapper, line: &str) -> Result<Reply, AdapterError> {
    let line = line.trim();
    log::debug!("[adapter] query: {line}");

    if line.is_empty() {
        return Ok(Reply::Line("NIL".to_string()));
    }
    if line == "STOP" {
        return Ok(Reply::Stop);
    }
    if line == "RESET" {
        mapper.send_reset();
        return Ok(Reply::Line("RESET".to_string()));
    }
    if line == "TIMEOUT" {
        return Ok(Reply::Line(mapper.process_incoming_timeout()?));
    }
    if line == "STATE" {
        let snapshot = mapper
            .get_state()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        return Ok(Reply::Line(snapshot));
    }
    if let Some(symbol) = line.strip_prefix("ABSTRACT ") {
        return abstract_query(mapper, symbol.trim());
    }
    if let Some(symbol) = line.strip_prefix("CONCRETE ") {
        let sym: ConcreteSymbol = symbol.trim().parse()?;
        let label =
            mapper.process_incoming_response(sym.flags, sym.seq, sym.ack, sym.payload_len)?;
        return Ok(Reply::Line(label));
    }
    Err(AdapterError::UnknownQuery(line.to_string()))
}

/// Concretize one abstract request symbol.
fn abstract_query(mapper: &mut Mapper, symbol: &str) -> Result<Reply, AdapterError> {
    let sym: AbstractSymbol = symbol.parse()?;
    let label = match (sym.seq, sym.ack, sym.payload_len) {
        (Some(seq), Some(ack), Some(len)) => {
            mapper.process_outgoing_request(sym.flags, seq, ack, len)?
        }
        // Wildcard counters: only the reset stimulus is concretizable, and
        // only once a learner counter is known.
        _ if sym.flags.contains(bit::RST) => mapper
            .process_outgoing_reset()?
            .unwrap_or_else(|| serializer::UNDEFINED.to_string()),
        _ => serializer::UNDEFINED.to_string(),
    };
    Ok(Reply::Line(label))
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// Accept harness connections forever; one independent session each.
pub async fn serve(bind: &str, mappings: Arc<MappingSet>) -> Result<(), AdapterError> {
    let listener = TcpListener::bind(bind).await?;
    log::info!("listening on {}", listener.local_addr()?);
    serve_on(listener, mappings).await
}

/// Accept loop over an already-bound listener.
pub async fn serve_on(
    listener: TcpListener,
    mappings: Arc<MappingSet>,
) -> Result<(), AdapterError> {
    loop {
        let (stream, peer) = listener.accept().await?;
        log::info!("[{peer}] session opened");
        let mappings = Arc::clone(&mappings);
        tokio::spawn(async move {
            match handle_session(stream, mappings).await {
                Ok(()) => log::info!("[{peer}] session closed"),
                Err(e) => log::error!("[{peer}] session aborted: {e}"),
            }
        });
    }
}

/// Run one session over one connection until `STOP`, EOF, or an error.
async fn handle_session(stream: TcpStream, mappings: Arc<MappingSet>) -> Result<(), AdapterError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let mut mapper = Mapper::new(mappings);

    while let Some(line) = lines.next_line().await? {
        match dispatch(&mut mapper, &line)? {
            Reply::Line(answer) => {
                writer.write_all(answer.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            Reply::Stop => {
                writer.write_all(b"STOP\n").await?;
                break;
            }
        }
    }
    Ok(())
}

/// Speak the protocol on stdin/stdout: a single session, the way the
/// original mapper process was driven over a pipe.
pub fn repl(mappings: Arc<MappingSet>) -> Result<(), AdapterError> {
    let stdin = std::io::stdin();
    let mut mapper = Mapper::new(mappings);
    for line in stdin.lock().lines() {
        match dispatch(&mut mapper, &line?)? {
            Reply::Line(answer) => println!("{answer}"),
            Reply::Stop => {
                println!("STOP");
                break;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::MapperProfile;

    fn mapper() -> Mapper {
        Mapper::with_profile(MapperProfile::builtin())
    }

    fn line(reply: Reply) -> String {
        match reply {
            Reply::Line(s) => s,
            Reply::Stop => panic!("unexpected STOP"),
        }
    }

    #[test]
    fn abstract_query_concretizes_a_fresh_opener() {
        let mut m = mapper();
        let reply = dispatch(&mut m, "ABSTRACT SYN(V,V,0)").unwrap();
        assert_eq!(reply, Reply::Line("SYN 0 0 0".to_string()));
    }

    #[test]
    fn concrete_query_abstracts_an_observation() {
        let mut m = mapper();
        line(dispatch(&mut m, "ABSTRACT SYN(V,V,0)").unwrap());
        let reply = line(dispatch(&mut m, "CONCRETE ACK+SYN(2000,1,0)").unwrap());
        assert_eq!(reply, "ACK+SYN VALID VALID 0");
    }

    #[test]
    fn wildcard_reset_symbol_follows_the_learner_counter() {
        let mut m = mapper();
        assert_eq!(line(dispatch(&mut m, "ABSTRACT RST(?,?,?)").unwrap()), "undefined");
        line(dispatch(&mut m, "CONCRETE ACK(2000,500,0)").unwrap());
        assert_eq!(
            line(dispatch(&mut m, "ABSTRACT RST(?,?,?)").unwrap()),
            "RST 500 0 0"
        );
    }

    #[test]
    fn reset_and_state_queries() {
        let mut m = mapper();
        line(dispatch(&mut m, "ABSTRACT SYN(V,V,0)").unwrap());
        assert_eq!(line(dispatch(&mut m, "RESET").unwrap()), "RESET");
        let state = line(dispatch(&mut m, "STATE").unwrap());
        assert!(state.contains("learnerSeq=?"));
        assert!(state.contains("sutSeq=?"));
    }

    #[test]
    fn timeout_and_stop_and_empty_queries() {
        let mut m = mapper();
        assert_eq!(line(dispatch(&mut m, "TIMEOUT").unwrap()), "TIMEOUT");
        assert_eq!(line(dispatch(&mut m, "").unwrap()), "NIL");
        assert_eq!(dispatch(&mut m, "STOP").unwrap(), Reply::Stop);
    }

    #[test]
    fn unknown_queries_abort_the_session() {
        let mut m = mapper();
        assert!(matches!(
            dispatch(&mut m, "FROBNICATE"),
            Err(AdapterError::UnknownQuery(_))
        ));
        assert!(matches!(
            dispatch(&mut m, "ABSTRACT NOT-A-SYMBOL"),
            Err(AdapterError::Symbol(_))
        ));
    }
}
