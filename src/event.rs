use std::io;
use std::net::{TcpListener, ToSocketAddrs};
use std::os::unix::io::{AsRawFd, RawFd};

use tracing::{debug, error, info};

use crate::error::Result;
use crate::session::{Session, SessionStatus};
use crate::store::{StockFile, StockStore};

/// The single-threaded, readiness-driven stock server.
///
/// One thread waits in `poll(2)` on a set holding the listening socket and
/// every open connection. A ready listener means accept-and-register; a ready
/// connection gets exactly one command cycle of the session state machine
/// before the loop re-arms, which gives strict one-command-at-a-time fairness
/// across connections instead of the worker pool's true parallelism. The
/// observable protocol behavior is identical to [`StockServer`].
///
/// Flushing follows the same rule as the threaded driver: when the number of
/// open connections drops to zero, the store is written back through the
/// [`StockFile`] gateway.
///
/// [`StockServer`]: crate::StockServer
pub struct PollServer {
    store: StockStore,
    db: StockFile,
}

impl PollServer {
    /// creates a server over `store`, flushing through `db`
    pub fn new(store: StockStore, db: StockFile) -> Self {
        PollServer { store, db }
    }

    /// Runs the readiness loop forever.
    ///
    /// # Errors
    /// returns a [`StockError`](crate::StockError) if the listening socket
    /// could not be bound, or if the poll syscall itself fails
    pub fn run<A: ToSocketAddrs>(self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr)?;
        info!("listening on {}", listener.local_addr()?);

        let listen_fd = listener.as_raw_fd();
        let mut sessions: Vec<Session> = Vec::new();

        loop {
            let mut pollfds = build_poll_set(listen_fd, &sessions);
            poll(&mut pollfds)?;

            if readable(pollfds[0].revents) {
                match listener.accept() {
                    Ok((stream, peer)) => {
                        info!("connected to {}", peer);
                        match Session::new(stream) {
                            Ok(session) => sessions.push(session),
                            Err(e) => error!("could not start session: {}", e),
                        }
                    }
                    Err(e) => error!("connection failed: {}", e),
                }
            }

            // Walk the connection slots back to front so that closed
            // sessions can be swap-removed without upsetting the indices
            // still to visit. Only the slots that were actually polled are
            // walked; a session accepted above waits for the next round.
            for i in (0..pollfds.len() - 1).rev() {
                if !readable(pollfds[i + 1].revents) {
                    continue;
                }
                // A batched packet can carry several command lines; only the
                // first read is announced by poll, so keep stepping until
                // the session's buffer drains or the session closes.
                let closed = loop {
                    match sessions[i].step(&self.store) {
                        Ok(SessionStatus::Closed) => break true,
                        Ok(SessionStatus::Continue) => {
                            if !sessions[i].has_buffered_input() {
                                break false;
                            }
                        }
                        Err(e) => {
                            error!("error on serving client: {}", e);
                            break true;
                        }
                    }
                };
                if closed {
                    debug!(peer = %sessions[i].peer(), "removing session from poll set");
                    sessions.swap_remove(i);
                    if sessions.is_empty() {
                        if let Err(e) = self.db.flush(&self.store) {
                            error!("failed to flush the store: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// the listener occupies slot zero; each open session follows in order
fn build_poll_set(listen_fd: RawFd, sessions: &[Session]) -> Vec<libc::pollfd> {
    let mut pollfds = Vec::with_capacity(sessions.len() + 1);
    pollfds.push(libc::pollfd {
        fd: listen_fd,
        events: libc::POLLIN,
        revents: 0,
    });
    for session in sessions {
        pollfds.push(libc::pollfd {
            fd: session.stream().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
    }
    pollfds
}

/// blocks until at least one descriptor in the set is ready
fn poll(pollfds: &mut [libc::pollfd]) -> Result<()> {
    loop {
        let rc = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, -1) };
        if rc >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return Err(err.into());
    }
}

/// POLLHUP/POLLERR count as readable: the next read observes EOF or the
/// error and the session winds down through the normal close path
fn readable(revents: libc::c_short) -> bool {
    revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0
}
