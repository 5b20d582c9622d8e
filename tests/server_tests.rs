//! end-to-end protocol scenarios, driven over real sockets against both
//! server drivers

use std::thread;
use std::time::Duration;

use stockd::{PollServer, StockClient, StockFile, StockServer, StockStore, STOCK_DB_FILENAME};
use tempfile::TempDir;

/// seeds the canonical test ledger: one record (id=1, qty=10, price=5000)
fn seeded_store() -> StockStore {
    let store = StockStore::new();
    store.insert(1, 10, 5000);
    store
}

fn start_threaded(port: u16, store: StockStore, db: StockFile) {
    thread::spawn(move || {
        StockServer::new(store, db)
            .with_workers(4)
            .with_queue_len(4)
            .run(("127.0.0.1", port))
            .unwrap();
    });
}

fn start_poll(port: u16, store: StockStore, db: StockFile) {
    thread::spawn(move || {
        PollServer::new(store, db).run(("127.0.0.1", port)).unwrap();
    });
}

/// connects with retries while the server thread is still binding
fn connect(port: u16) -> StockClient {
    for _ in 0..50 {
        if let Ok(client) = StockClient::connect(("127.0.0.1", port)) {
            return client;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("could not connect to 127.0.0.1:{}", port);
}

fn temp_db() -> (TempDir, StockFile) {
    let dir = TempDir::new().unwrap();
    let db = StockFile::new(dir.path().join(STOCK_DB_FILENAME));
    (dir, db)
}

/// waits for the flush-on-last-close write to land
fn read_db_eventually(db: &StockFile) -> String {
    for _ in 0..50 {
        if let Ok(contents) = std::fs::read_to_string(db.path()) {
            if !contents.is_empty() {
                return contents;
            }
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("backing file was never flushed");
}

#[test]
fn threaded_server_protocol_scenarios() {
    let (_dir, db) = temp_db();
    start_threaded(46101, seeded_store(), db);
    let mut client = connect(46101);

    assert_eq!(client.buy(1, 3).unwrap(), "[buy] success\n");
    assert!(client.show().unwrap().contains("1 7 5000"));

    assert_eq!(client.buy(1, 100).unwrap(), "Not enough left stocks\n");
    assert!(client.show().unwrap().contains("1 7 5000"));

    // missing-id sell mirrors buy's failure message even though the cause differs
    assert_eq!(client.sell(2, 5).unwrap(), "Not enough left stocks\n");

    // wrong arity and bad verbs leave the session open
    assert_eq!(client.send("buy 1 2 3").unwrap(), "invalid command\n");
    assert_eq!(client.send("steal 1 2").unwrap(), "invalid command\n");
    assert_eq!(client.send("help").unwrap(), "invalid command\n");
    assert_eq!(client.send("buy one 2").unwrap(), "invalid command\n");
    assert!(client.show().unwrap().contains("1 7 5000"));

    assert_eq!(client.exit().unwrap(), "\n");
}

#[test]
fn poll_server_protocol_scenarios() {
    let (_dir, db) = temp_db();
    start_poll(46102, seeded_store(), db);
    let mut client = connect(46102);

    assert_eq!(client.buy(1, 3).unwrap(), "[buy] success\n");
    assert!(client.show().unwrap().contains("1 7 5000"));
    assert_eq!(client.buy(1, 100).unwrap(), "Not enough left stocks\n");
    assert_eq!(client.sell(2, 5).unwrap(), "Not enough left stocks\n");
    assert_eq!(client.send("buy 1 2 3").unwrap(), "invalid command\n");
    assert_eq!(client.exit().unwrap(), "\n");
}

#[test]
fn poll_server_interleaves_multiple_clients() {
    let (_dir, db) = temp_db();
    let store = seeded_store();
    store.insert(2, 100, 700);
    start_poll(46103, store, db);

    let mut first = connect(46103);
    let mut second = connect(46103);

    // one command cycle per ready descriptor; the single thread round-robins
    assert_eq!(first.buy(1, 1).unwrap(), "[buy] success\n");
    assert_eq!(second.sell(2, 10).unwrap(), "[sell] success\n");
    assert_eq!(first.buy(2, 5).unwrap(), "[buy] success\n");
    assert_eq!(second.buy(1, 1).unwrap(), "[buy] success\n");

    let ledger = first.show().unwrap();
    assert!(ledger.contains("1 8 5000"));
    assert!(ledger.contains("2 105 700"));

    assert_eq!(first.exit().unwrap(), "\n");
    assert_eq!(second.exit().unwrap(), "\n");
}

#[test]
fn threaded_server_flushes_when_the_last_session_ends() {
    let (_dir, db) = temp_db();
    let store = seeded_store();
    store.insert(5, 20, 2000);
    start_threaded(46104, store, db.clone());

    let mut first = connect(46104);
    let mut second = connect(46104);

    assert_eq!(first.buy(1, 2).unwrap(), "[buy] success\n");
    assert_eq!(second.sell(5, 10).unwrap(), "[sell] success\n");

    // first leaves; one session remains, so nothing may be flushed yet
    assert_eq!(first.exit().unwrap(), "\n");
    assert_eq!(second.buy(5, 1).unwrap(), "[buy] success\n");
    assert_eq!(second.exit().unwrap(), "\n");

    let contents = read_db_eventually(&db);
    assert!(contents.contains("1 8 5000"), "unexpected flush: {:?}", contents);
    assert!(contents.contains("5 29 2000"), "unexpected flush: {:?}", contents);
}

#[test]
fn poll_server_flushes_when_the_last_session_ends() {
    let (_dir, db) = temp_db();
    start_poll(46105, seeded_store(), db.clone());

    let mut client = connect(46105);
    assert_eq!(client.buy(1, 4).unwrap(), "[buy] success\n");
    assert_eq!(client.exit().unwrap(), "\n");

    let contents = read_db_eventually(&db);
    assert_eq!(contents, "1 6 5000\n");
}

/// sends both commands in a single packet and expects one frame per command
fn batched_commands_roundtrip(port: u16) {
    use std::io::{Read, Write};
    use stockd::FRAME_LEN;

    let mut stream = {
        let mut attempt = None;
        for _ in 0..50 {
            match std::net::TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => {
                    attempt = Some(stream);
                    break;
                }
                Err(_) => thread::sleep(Duration::from_millis(50)),
            }
        }
        attempt.unwrap_or_else(|| panic!("could not connect to 127.0.0.1:{}", port))
    };
    stream
        .set_read_timeout(Some(Duration::from_secs(3)))
        .unwrap();
    stream.write_all(b"buy 1 1\nshow\n").unwrap();

    let mut frame = vec![0u8; FRAME_LEN];
    stream.read_exact(&mut frame).unwrap();
    assert!(frame.starts_with(b"[buy] success\n"));
    stream.read_exact(&mut frame).unwrap();
    assert!(frame.starts_with(b"1 9 5000\n"));

    stream.write_all(b"exit\n").unwrap();
    stream.read_exact(&mut frame).unwrap();
}

#[test]
fn threaded_server_answers_batched_commands() {
    let (_dir, db) = temp_db();
    start_threaded(46107, seeded_store(), db);
    batched_commands_roundtrip(46107);
}

#[test]
fn poll_server_answers_batched_commands() {
    let (_dir, db) = temp_db();
    start_poll(46108, seeded_store(), db);
    batched_commands_roundtrip(46108);
}

#[test]
fn abrupt_disconnect_counts_as_session_end() {
    let (_dir, db) = temp_db();
    start_threaded(46106, seeded_store(), db.clone());

    let mut client = connect(46106);
    assert_eq!(client.sell(1, 5).unwrap(), "[sell] success\n");
    // peer closes without sending exit; the zero-byte read winds the
    // session down through the normal close path
    drop(client);

    let contents = read_db_eventually(&db);
    assert_eq!(contents, "1 15 5000\n");
}
