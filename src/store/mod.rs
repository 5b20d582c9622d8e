//! The in-memory stock ledger and its persistence gateway.
//!
//! [`StockStore`] keeps records in an unbalanced binary search tree whose
//! nodes live in a slot arena and link to each other by index. Every record
//! carries its own [`RecordLock`] so that reader/writer admission is a
//! per-record affair, never a global one. [`StockFile`] moves the whole
//! ledger to and from its flat backing file.

mod arena;
mod lock;
mod persist;

pub use self::arena::{InsertOutcome, StockStore};
pub use self::lock::{ReadGuard, RecordLock, WriteGuard};
pub use self::persist::{StockFile, STOCK_DB_FILENAME};
