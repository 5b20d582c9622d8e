use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use tracing::debug;

use crate::error::Result;
use crate::session::FRAME_LEN;

/// `StockClient` speaks the line protocol to a stock server: one
/// newline-terminated command out, one fixed [`FRAME_LEN`]-byte frame back.
pub struct StockClient {
    stream: TcpStream,
}

impl StockClient {
    /// creates a client and establishes a socket connection to the server at
    /// the given `addr`
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(StockClient { stream })
    }

    /// Sends one command line and returns the server's response with the
    /// frame padding stripped. A trailing newline on `command` is optional.
    pub fn send(&mut self, command: &str) -> Result<String> {
        let line = format!("{}\n", command.trim_end());
        self.stream.write_all(line.as_bytes())?;
        self.stream.flush()?;

        let mut frame = vec![0u8; FRAME_LEN];
        self.stream.read_exact(&mut frame)?;
        let len = frame.iter().position(|&b| b == 0).unwrap_or(FRAME_LEN);
        let response = String::from_utf8_lossy(&frame[..len]).into_owned();
        debug!(?command, ?response, "round trip complete");
        Ok(response)
    }

    /// requests the full ledger
    pub fn show(&mut self) -> Result<String> {
        self.send("show")
    }

    /// buys `count` units of stock `id`
    pub fn buy(&mut self, id: i64, count: i64) -> Result<String> {
        self.send(&format!("buy {} {}", id, count))
    }

    /// sells `count` units of stock `id`
    pub fn sell(&mut self, id: i64, count: i64) -> Result<String> {
        self.send(&format!("sell {} {}", id, count))
    }

    /// asks the server to end the session; the server closes the connection
    /// after acknowledging
    pub fn exit(&mut self) -> Result<String> {
        self.send("exit")
    }
}
