#![deny(missing_docs)]
//! A multithreaded, persistent stock inventory server (stockd) that lets many
//! concurrent clients read and mutate a shared ledger of stock records over a
//! line-based text protocol.
//!
//! This crate provides the [`StockStore`] ledger itself, two interchangeable
//! server drivers, and a [`stockd-client`] executable for talking to either.
//!
//! ## Supported commands
//! One command per line, responses in fixed-size frames:
//!
//! - `show` dumps every record as `<id> <quantity> <price>`, ascending by id
//! - `buy <id> <count>` removes stock, answering `[buy] success` or
//!   `Not enough left stocks`
//! - `sell <id> <count>` adds stock, failing only on an unknown id
//! - `exit` ends the session
//!
//! Anything else is answered with `invalid command` and the session stays
//! open.
//!
//! ## StockStore
//! [`StockStore`] keeps records in an unbalanced binary search tree keyed by
//! id, with per-record reader/writer admission ([`RecordLock`]) so commands
//! touching different ids never contend. The ledger loads from a flat
//! `stock.txt` file at startup and is flushed back by the [`StockFile`]
//! gateway whenever the number of active sessions drops to zero.
//!
//! ## Two drivers, one protocol
//! [`StockServer`] is the canonical architecture: an acceptor pushes
//! connections into a bounded [`WorkQueue`] and a fixed pool of workers runs
//! each [`Session`] to completion, with queue backpressure as the only
//! admission control. [`PollServer`] multiplexes every connection on a single
//! thread with a poll(2) readiness set, running one command cycle per ready
//! descriptor. Both drivers run the identical session state machine and are
//! observationally equivalent on the wire.
//!
//! [`stockd-client`]: ./stockd-client.rs

pub use client::StockClient;
pub use command::Command;
pub use error::{Result, StockError};
pub use event::PollServer;
pub use server::{SessionCounter, StockServer, WorkQueue, QUEUE_LEN, WORKER_COUNT};
pub use session::{Session, SessionStatus, FRAME_LEN, MAX_LINE};
pub use store::{InsertOutcome, RecordLock, StockFile, StockStore, STOCK_DB_FILENAME};

mod client;
pub mod command;
mod error;
mod event;
mod server;
pub mod session;
pub mod store;
