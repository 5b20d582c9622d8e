//! The stockd-client executable connects to a running stock server and
//! relays commands typed on stdin:
//!
//! `stockd-client <PORT> [--host HOST]`
//!
//! Each line is sent as one command; the server's response is printed to
//! stdout. The client stops after sending `exit` or when stdin closes.
//! Supported commands: `show`, `buy <id> <count>`, `sell <id> <count>`,
//! `exit`.

use std::io::{self, BufRead, Write};
use std::process::exit;

use clap::{crate_version, App, Arg};
use stockd::{Result, StockClient};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn main() {
    // configure a subscriber that will log messages to STDERR
    subscriber_config();

    let matches = App::new("stockd-client")
        .version(crate_version!())
        .about("an interactive client for the stock inventory server")
        .arg(
            Arg::with_name("PORT")
                .help("the port the server is listening on")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("host")
                .long("host")
                .value_name("HOST")
                .help("the host the server is running on")
                .default_value("127.0.0.1"),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap();
    let port = match matches.value_of("PORT").unwrap().parse::<u16>() {
        Ok(port) => port,
        Err(_) => {
            eprintln!("usage: stockd-client <PORT> [--host HOST]");
            exit(1);
        }
    };

    if let Err(e) = run(host, port) {
        eprintln!("{}", e);
        exit(1);
    }
}

fn run(host: &str, port: u16) -> Result<()> {
    let mut client = StockClient::connect((host, port))?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = client.send(&line)?;
        print!("{}", response);
        io::stdout().flush()?;

        if line.trim() == "exit" {
            break;
        }
    }
    Ok(())
}

/// configures a tracing subscriber that will log to STDERR
fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        // log to stderr instead of stdout
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}
