//! The cooperative single-threaded poll loop (§4.7, §5): one `nix::poll`
//! call per iteration covering the listening socket and every open client
//! connection, no worker threads, no per-connection locking — the `Store`
//! is only ever touched from this one loop.

use std::net::TcpListener;
use std::os::fd::AsFd;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{info, warn};
use wellpapp_error::{Error, Result};
use wellpapp_graph::Store;
use wellpapp_wal::WalWriter;

use crate::connection::Connection;

/// The maximum number of simultaneously open client connections (§5): the
/// listening socket stops being polled for readability once this many are
/// active, so a flood of connects can only ever starve new clients, never
/// exhaust memory.
pub const MAX_CLIENTS: usize = 100;

pub struct Server {
    listener: TcpListener,
    connections: Vec<Connection>,
    next_connection_id: u64,
}

impl Server {
    pub fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).map_err(Error::ReadFailed)?;
        listener.set_nonblocking(true).map_err(Error::ReadFailed)?;
        info!(port, "server listening");
        Ok(Self {
            listener,
            connections: Vec::new(),
            next_connection_id: 0,
        })
    }

    /// Runs one poll iteration: accepts at most one new connection (if
    /// under `MAX_CLIENTS`), then services every connection with pending
    /// readability, dispatching each complete line through `handle_line`.
    /// Returns `false` once `should_continue` reports the server should
    /// stop accepting further iterations (e.g. after a signal).
    pub fn tick(&mut self, store: &mut Store, wal: &mut WalWriter, trans_id_source: &mut u64, now: i64) -> Result<()> {
        let accepting = self.connections.len() < MAX_CLIENTS;

        // `PollFd` borrows the fd it wraps, so the whole poll+readout has to
        // happen in its own scope before anything below can take `&mut
        // self` again (accepting a connection, servicing one, retaining).
        let listener_revents;
        let conn_revents: Vec<Option<PollFlags>>;
        {
            let mut fds: Vec<PollFd> = Vec::with_capacity(self.connections.len() + 1);
            if accepting {
                fds.push(PollFd::new(self.listener.as_fd(), PollFlags::POLLIN));
            }
            for conn in &self.connections {
                fds.push(PollFd::new(conn.as_fd(), PollFlags::POLLIN));
            }
            if fds.is_empty() {
                return Ok(());
            }
            poll(&mut fds, PollTimeout::from(1000u16)).map_err(|e| Error::internal(format!("poll failed: {e}")))?;

            let mut iter = fds.iter();
            listener_revents = if accepting { iter.next().map(PollFd::revents).unwrap_or(None) } else { None };
            conn_revents = iter.map(PollFd::revents).collect();
        }

        if listener_revents.is_some_and(|e| e.contains(PollFlags::POLLIN)) {
            self.accept_one();
        }

        let mut closed = Vec::new();
        for (conn, revents) in self.connections.iter_mut().zip(conn_revents) {
            let Some(revents) = revents else { continue };
            if !revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR) {
                continue;
            }
            match service_connection(conn, store, wal, trans_id_source, now) {
                Ok(true) => {}
                Ok(false) | Err(_) => closed.push(conn.id),
            }
        }

        if !closed.is_empty() {
            self.connections.retain(|c| !closed.contains(&c.id));
        }
        Ok(())
    }

    fn accept_one(&mut self) {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                if let Err(err) = stream.set_nonblocking(true) {
                    warn!(%err, "failed to set accepted socket nonblocking");
                    return;
                }
                let id = self.next_connection_id;
                self.next_connection_id += 1;
                info!(connection_id = id, peer = %addr, "accepted connection");
                self.connections.push(Connection::new(id, stream));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(err) => warn!(%err, "accept failed"),
        }
    }
}

/// Services one readable connection: reads available bytes, dispatches
/// every complete line, flushes the write buffer. Returns `Ok(false)` if
/// the connection should be closed (clean EOF or a `Q`uit command).
fn service_connection(
    conn: &mut Connection,
    store: &mut Store,
    wal: &mut WalWriter,
    trans_id_source: &mut u64,
    now: i64,
) -> Result<bool> {
    if !conn.fill()? {
        return Ok(false);
    }
    while let Some(line) = conn.next_line() {
        conn.scratch.reserve(line.len())?;
        let reply = crate::connection::handle_line(
            store,
            wal,
            trans_id_source,
            now,
            &line,
            &mut conn.authenticated_user,
        );
        conn.scratch.reset_for_next_command();
        conn.queue_reply(&reply);
        conn.maybe_flush()?;
        if line.trim() == "Q" {
            conn.flush()?;
            conn.going = false;
        }
    }
    conn.flush()?;
    Ok(conn.going)
}
