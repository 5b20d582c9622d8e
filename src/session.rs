//! The per-connection command loop shared by both server drivers: read one
//! line, dispatch it against the store, answer with one fixed-size frame.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

use tracing::debug;

use crate::command::{self, Command, INVALID_COMMAND, NOT_ENOUGH};
use crate::error::Result;
use crate::store::StockStore;

/// maximum length of one command line read off the wire
pub const MAX_LINE: usize = 8192;
/// Every response is written as exactly this many bytes, padded with NULs
/// (and truncated if longer). The client side reads frames of the same size;
/// this is a compatibility contract, not a framing convenience.
pub const FRAME_LEN: usize = 8192;

/// whether the session wants another command or is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// keep reading commands from this connection
    Continue,
    /// the peer disconnected or asked to exit; release the connection
    Closed,
}

/// One client connection's conversation state.
///
/// A `Session` drives the per-connection state machine: read one
/// newline-terminated command, dispatch it against the store, write one
/// fixed-size response frame. The threaded driver runs [`Session::run`] to
/// completion on a worker; the readiness driver calls [`Session::step`] once
/// per ready descriptor. Both produce identical protocol behavior.
pub struct Session {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
}

impl Session {
    /// wraps an accepted connection in a session
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer = stream.peer_addr()?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Session {
            reader,
            writer: stream,
            peer,
        })
    }

    /// the peer this session is talking to
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// the underlying socket, for readiness registration
    pub fn stream(&self) -> &TcpStream {
        &self.writer
    }

    /// Whether a previous read left bytes sitting in the session's userspace
    /// buffer. A client may batch several commands into one packet; once the
    /// first line is consumed the rest lives here, invisible to readiness
    /// polling on the raw descriptor, so a readiness-driven caller must keep
    /// stepping until this drains.
    pub fn has_buffered_input(&self) -> bool {
        !self.reader.buffer().is_empty()
    }

    /// Executes exactly one command cycle: read a line, dispatch, respond.
    ///
    /// A zero-byte read means the peer closed its end; the session reports
    /// [`SessionStatus::Closed`] without writing a response. Every
    /// per-command failure is turned into a response line here; only IO
    /// errors escape.
    pub fn step(&mut self, store: &StockStore) -> Result<SessionStatus> {
        let mut line = String::new();
        let n = (&mut self.reader).take(MAX_LINE as u64).read_line(&mut line)?;
        if n == 0 {
            debug!(peer = %self.peer, "client terminated the connection");
            return Ok(SessionStatus::Closed);
        }
        debug!(peer = %self.peer, bytes = n, "received command line");

        let (response, status) = dispatch(&line, store);
        self.respond(&response)?;
        Ok(status)
    }

    /// runs the session loop until the peer exits or disconnects
    pub fn run(&mut self, store: &StockStore) -> Result<()> {
        while self.step(store)? == SessionStatus::Continue {}
        Ok(())
    }

    /// writes `response` into a fixed [`FRAME_LEN`]-byte frame
    fn respond(&mut self, response: &str) -> Result<()> {
        let mut frame = vec![0u8; FRAME_LEN];
        let len = response.len().min(FRAME_LEN);
        frame[..len].copy_from_slice(&response.as_bytes()[..len]);
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        debug!(peer = %self.peer, ?response, "response sent");
        Ok(())
    }
}

/// Dispatches one command line against the store and produces the response
/// text plus the session's next state.
pub fn dispatch(line: &str, store: &StockStore) -> (String, SessionStatus) {
    match Command::parse(line) {
        None => (INVALID_COMMAND.to_string(), SessionStatus::Continue),
        Some(Command::Exit) => ("\n".to_string(), SessionStatus::Closed),
        Some(Command::Show) => (store.render(), SessionStatus::Continue),
        Some(Command::Buy { id, count }) => {
            let response = if command::buy(store, id, count) {
                "[buy] success\n".to_string()
            } else {
                NOT_ENOUGH.to_string()
            };
            (response, SessionStatus::Continue)
        }
        Some(Command::Sell { id, count }) => {
            let response = if command::sell(store, id, count) {
                "[sell] success\n".to_string()
            } else {
                NOT_ENOUGH.to_string()
            };
            (response, SessionStatus::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_store() -> StockStore {
        let store = StockStore::new();
        store.insert(1, 10, 5000);
        store
    }

    #[test]
    fn buy_within_stock_succeeds_and_shows() {
        let store = seeded_store();
        let (resp, status) = dispatch("buy 1 3\n", &store);
        assert_eq!(resp, "[buy] success\n");
        assert_eq!(status, SessionStatus::Continue);

        let (resp, _) = dispatch("show\n", &store);
        assert!(resp.contains("1 7 5000"));
    }

    #[test]
    fn buy_beyond_stock_leaves_the_store_unchanged() {
        let store = seeded_store();
        dispatch("buy 1 3\n", &store);
        let (resp, _) = dispatch("buy 1 100\n", &store);
        assert_eq!(resp, NOT_ENOUGH);
        let (resp, _) = dispatch("show\n", &store);
        assert!(resp.contains("1 7 5000"));
    }

    #[test]
    fn sell_on_missing_id_mirrors_the_buy_failure_message() {
        let store = seeded_store();
        let (resp, _) = dispatch("sell 2 5\n", &store);
        assert_eq!(resp, NOT_ENOUGH);
    }

    #[test]
    fn wrong_arity_is_an_invalid_command() {
        let store = seeded_store();
        let (resp, status) = dispatch("buy 1 2 3\n", &store);
        assert_eq!(resp, INVALID_COMMAND);
        assert_eq!(status, SessionStatus::Continue);
    }

    #[test]
    fn exit_responds_with_an_empty_line_and_closes() {
        let store = seeded_store();
        let (resp, status) = dispatch("exit\n", &store);
        assert_eq!(resp, "\n");
        assert_eq!(status, SessionStatus::Closed);
    }
}
