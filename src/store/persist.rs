use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, StockError};
use crate::store::{InsertOutcome, StockStore};

/// file name of the backing file, resolved against the server's working directory
pub const STOCK_DB_FILENAME: &str = "stock.txt";

/// Gateway between a [`StockStore`] and its backing file.
///
/// The format is plain text: one record per line, three whitespace separated
/// integers `id count price`, no header. [`load`](StockFile::load) runs
/// exactly once at startup, before any mutation; [`flush`](StockFile::flush)
/// truncates and rewrites the file, and is only invoked once no session
/// remains active.
#[derive(Debug, Clone)]
pub struct StockFile {
    path: PathBuf,
}

impl StockFile {
    /// creates a gateway over the backing file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StockFile { path: path.into() }
    }

    /// the path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bulk-loads the backing file into `store`, inserting records in file
    /// order. Returns the number of lines read.
    ///
    /// # Errors
    /// Returns [`StockError::AlreadyLoaded`] if `store` is not empty: loading
    /// must happen exactly once, before any mutation. A missing or malformed
    /// backing file is an error as well. Callers treat all of these as fatal.
    pub fn load(&self, store: &StockStore) -> Result<usize> {
        if !store.is_empty() {
            return Err(StockError::AlreadyLoaded);
        }
        info!("loading stock records from {:?}", self.path);
        let file = File::open(&self.path)?;
        let records = read_records(BufReader::new(file))?;
        let count = records.len();
        for (id, quantity, price) in records {
            if store.insert(id, quantity, price) == InsertOutcome::Failed {
                return Err(StockError::Parsing(format!(
                    "backing file holds a negative count for id {}",
                    id
                )));
            }
        }
        debug!(count, "stock load complete");
        Ok(count)
    }

    /// Writes the store's full in-order traversal back to the backing file,
    /// truncating whatever was there. Each record is read-locked while it is
    /// formatted, per the store's snapshot rules.
    pub fn flush(&self, store: &StockStore) -> Result<()> {
        debug!(records = store.len(), "writing stock records to {:?}", self.path);
        let file = File::create(&self.path)?;
        let mut writer = BufWriter::new(file);
        write_records(&mut writer, &store.snapshot())?;
        writer.flush()?;
        Ok(())
    }
}

/// parses `id count price` integer triples, one per line; blank lines are
/// skipped
fn read_records<R: BufRead>(reader: R) -> Result<Vec<(i64, i64, i64)>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace().map(|tok| {
            tok.parse::<i64>()
                .map_err(|_| StockError::Parsing(format!("not an integer: {:?}", tok)))
        });
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(id), Some(count), Some(price), None) => {
                records.push((id?, count?, price?));
            }
            _ => {
                return Err(StockError::Parsing(format!(
                    "expected `id count price`, got {:?}",
                    line
                )))
            }
        }
    }
    Ok(records)
}

fn write_records<W: Write>(writer: &mut W, records: &[(i64, i64, i64)]) -> Result<()> {
    for (id, quantity, price) in records {
        writeln!(writer, "{} {} {}", id, quantity, price)?;
    }
    Ok(())
}
