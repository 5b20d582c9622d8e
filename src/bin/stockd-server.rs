//! this binary starts the threaded stock server
//!
//! `stockd-server <PORT>`
//!
//! The server listens on the given port, loads its ledger from `stock.txt`
//! in the current directory, and serves connections on a fixed pool of
//! worker threads fed by a bounded queue. The ledger is written back to
//! `stock.txt` whenever the last active session ends.

use std::env::current_dir;
use std::process::exit;

use clap::{crate_version, App, Arg};
use stockd::{Result, StockFile, StockServer, StockStore, STOCK_DB_FILENAME};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() {
    // set up a tracing subscriber to log to STDERR
    subscriber_config();

    let matches = App::new("stockd-server")
        .version(crate_version!())
        .about("a multi-threaded stock inventory server")
        .arg(
            Arg::with_name("PORT")
                .help("the port to listen on")
                .required(true)
                .index(1),
        )
        .get_matches();

    let port = match matches.value_of("PORT").unwrap().parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("usage: stockd-server <PORT>");
            exit(1);
        }
    };

    if let Err(e) = run(port) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(port: u16) -> Result<()> {
    info!("stockd-server {}", env!("CARGO_PKG_VERSION"));

    let store = StockStore::new();
    let db = StockFile::new(current_dir()?.join(STOCK_DB_FILENAME));
    let loaded = db.load(&store)?;
    info!("loaded {} stock records", loaded);

    let server = StockServer::new(store, db);
    server.run(("0.0.0.0", port))
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
