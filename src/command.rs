//! The wire commands a client can issue and the store operations behind
//! them. Parsing is deliberately strict: one token must be `exit` or `show`,
//! three tokens must be a known verb plus two integers, and everything else
//! is answered with [`INVALID_COMMAND`].

use tracing::debug;

use crate::store::StockStore;

/// response sent for any malformed line: bad verb, wrong arity, or a
/// non-numeric id/count
pub const INVALID_COMMAND: &str = "invalid command\n";
/// response when a buy finds too little stock, or when buy/sell hit an
/// unknown id
pub const NOT_ENOUGH: &str = "Not enough left stocks\n";

/// The commands a client can issue, one per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// dump the whole ledger, ascending by id
    Show,
    /// remove `count` units of stock `id`
    Buy {
        /// the record to buy from
        id: i64,
        /// how many units to remove
        count: i64,
    },
    /// add `count` units of stock `id`
    Sell {
        /// the record to sell into
        id: i64,
        /// how many units to add
        count: i64,
    },
    /// end the session
    Exit,
}

impl Command {
    /// Parses one command line into a [`Command`].
    ///
    /// Lines are split on whitespace. One token must be `exit` or `show`;
    /// three tokens must be `buy`/`sell` followed by two integers. Anything
    /// else, including excess tokens, is a parse error and is answered with
    /// [`INVALID_COMMAND`].
    pub fn parse(line: &str) -> Option<Command> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        debug!(?tokens, "parsed command line");

        match tokens.as_slice() {
            ["exit"] => Some(Command::Exit),
            ["show"] => Some(Command::Show),
            [verb, id, count] => {
                let id = id.parse().ok()?;
                let count = count.parse().ok()?;
                match *verb {
                    "buy" => Some(Command::Buy { id, count }),
                    "sell" => Some(Command::Sell { id, count }),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Removes `count` units of stock `id` from the store.
///
/// The check and the decrement are deliberately split: the current quantity
/// is read under the record's reader admission, the admission is released,
/// and only then is the writer admission taken to subtract. A concurrent
/// command on the same id can interleave between the two steps, so the
/// "not enough stock" guard is best effort rather than a hard invariant.
pub fn buy(store: &StockStore, id: i64, count: i64) -> bool {
    match store.quantity(id) {
        None => {
            debug!(id, "no record found");
            false
        }
        Some(quantity) if quantity < count => {
            debug!(id, quantity, count, "not enough stock left");
            false
        }
        Some(_) => {
            store.adjust(id, -count);
            true
        }
    }
}

/// Adds `count` units of stock `id` under the record's writer admission.
/// Fails only when the id is unknown.
pub fn sell(store: &StockStore, id: i64, count: i64) -> bool {
    match store.adjust(id, count) {
        Some(_) => true,
        None => {
            debug!(id, "no record found");
            false
        }
    }
}
