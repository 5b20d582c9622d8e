use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::session::Session;
use crate::store::{StockFile, StockStore};

/// number of long-lived workers started at boot
pub const WORKER_COUNT: u32 = 8;
/// capacity of the bounded work queue of accepted connections
pub const QUEUE_LEN: usize = 20;

/// Fixed-capacity FIFO of accepted connections, shared between the acceptor
/// (sole producer) and the workers (many consumers).
///
/// Built on crossbeam's bounded MPMC [`channel`]: a blocking send when the
/// queue is full is the system's only admission control, capping the number
/// of accepted-but-unserved connections by stalling the acceptor. No
/// connection is ever delivered to two workers, and none is lost.
///
/// [`channel`]: https://docs.rs/crossbeam/0.8.1/crossbeam/channel/index.html
pub struct WorkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> WorkQueue<T> {
    /// creates a queue that holds at most `capacity` items
    pub fn bounded(capacity: usize) -> Self {
        debug!(capacity, "initialising shared work queue");
        let (tx, rx) = channel::bounded(capacity);
        WorkQueue { tx, rx }
    }

    /// pushes an item, blocking while the queue is full
    pub fn enqueue(&self, item: T) {
        self.tx.send(item).expect("all workers have exited");
    }

    /// pops the oldest item, blocking while the queue is empty
    pub fn dequeue(&self) -> T {
        self.rx.recv().expect("the acceptor has exited")
    }
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        WorkQueue {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

/// Count of sessions currently accepted and not yet finished. Guarded by its
/// own mutex, independent of any record lock.
#[derive(Debug, Default)]
pub struct SessionCounter {
    active: Mutex<u32>,
}

impl SessionCounter {
    /// notes a newly accepted connection
    pub fn checkin(&self) {
        let mut active = self.active.lock().unwrap();
        *active += 1;
        debug!(active = *active, "session checked in");
    }

    /// Notes a finished session and returns how many remain. The 1 -> 0
    /// transition is the flush trigger.
    pub fn checkout(&self) -> u32 {
        let mut active = self.active.lock().unwrap();
        *active -= 1;
        debug!(active = *active, "session checked out");
        *active
    }
}

/// The threaded stock server: one acceptor thread feeding a bounded work
/// queue, and a fixed pool of workers each running whole sessions to
/// completion.
///
/// Workers share one [`StockStore`] handle. When the last active session
/// ends, the worker that closed it flushes the store through the
/// [`StockFile`] gateway.
pub struct StockServer {
    store: StockStore,
    db: StockFile,
    workers: u32,
    queue_len: usize,
}

impl StockServer {
    /// creates a server over `store`, flushing through `db`
    pub fn new(store: StockStore, db: StockFile) -> Self {
        StockServer {
            store,
            db,
            workers: WORKER_COUNT,
            queue_len: QUEUE_LEN,
        }
    }

    /// overrides the worker count, mainly for tests
    pub fn with_workers(mut self, workers: u32) -> Self {
        self.workers = workers;
        self
    }

    /// overrides the work queue capacity, mainly for tests
    pub fn with_queue_len(mut self, queue_len: usize) -> Self {
        self.queue_len = queue_len;
        self
    }

    /// Starts the workers, then accepts connections forever, pushing each
    /// into the work queue. Never returns during normal operation; there is
    /// no graceful shutdown in this service model.
    ///
    /// # Errors
    /// returns a [`StockError`](crate::StockError) if the listening socket
    /// could not be bound or a worker thread could not be started
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        info!("listening on {}", listener.local_addr()?);

        let queue = WorkQueue::bounded(self.queue_len);
        let sessions = Arc::new(SessionCounter::default());

        for n in 0..self.workers {
            let queue = queue.clone();
            let store = self.store.clone();
            let db = self.db.clone();
            let sessions = sessions.clone();
            thread::Builder::new()
                .name(format!("stockd-worker-{}", n))
                .spawn(move || worker_loop(queue, store, db, sessions))?;
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Ok(peer) = stream.peer_addr() {
                        info!("connected to {}", peer);
                    }
                    sessions.checkin();
                    queue.enqueue(stream);
                }
                Err(e) => error!("connection failed: {}", e),
            }
        }
        Ok(())
    }
}

/// One worker's forever loop: dequeue a connection, run its session to
/// completion, release it, and flush the store if it was the last session.
fn worker_loop(
    queue: WorkQueue<TcpStream>,
    store: StockStore,
    db: StockFile,
    sessions: Arc<SessionCounter>,
) {
    loop {
        let stream = queue.dequeue();
        match Session::new(stream) {
            Ok(mut session) => {
                debug!(peer = %session.peer(), "worker picked up session");
                if let Err(e) = session.run(&store) {
                    error!("error on serving client: {}", e);
                }
            }
            Err(e) => error!("could not start session: {}", e),
        }
        // the connection closes when the session drops
        if sessions.checkout() == 0 {
            if let Err(e) = db.flush(&store) {
                error!("failed to flush the store: {}", e);
            }
        }
    }
}
