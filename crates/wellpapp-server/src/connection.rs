//! The connection handler (§4.7, §5): per-socket read/write buffering, line
//! assembly, NFC normalisation, and the transactional bracket a mutating
//! command runs inside. The poll loop itself lives in `server.rs`; this
//! module is the per-connection state machine it drives.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::{debug, warn};
use wellpapp_arena::Scratch;
use wellpapp_error::{Error, Result};
use wellpapp_graph::Store;
use wellpapp_proto as proto;
use wellpapp_types::nfc_compose;
use wellpapp_wal::WalWriter;

/// A generously sized but finite line buffer (§4.8: `line-too-long` is a
/// fatal per-connection error, not an unbounded read).
const MAX_LINE_LEN: usize = 64 * 1024;
/// The write buffer is flushed once within this many bytes of overflowing
/// (§4.7: "flushed when nearly full, ~1KB safety margin").
const WRITE_BUFFER_CAPACITY: usize = 16 * 1024;
const WRITE_BUFFER_MARGIN: usize = 1024;

pub struct Connection {
    pub id: u64,
    stream: TcpStream,
    read_buf: Vec<u8>,
    pending_lines: VecDeque<String>,
    write_buf: Vec<u8>,
    pub authenticated_user: String,
    pub going: bool,
    pub scratch: Scratch,
}

impl Connection {
    #[must_use]
    pub fn new(id: u64, stream: TcpStream) -> Self {
        Self {
            id,
            stream,
            read_buf: Vec::with_capacity(4096),
            pending_lines: VecDeque::new(),
            write_buf: Vec::with_capacity(WRITE_BUFFER_CAPACITY),
            authenticated_user: "anonymous".to_string(),
            going: true,
            scratch: Scratch::new(id),
        }
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.peer_addr().ok()
    }

    #[must_use]
    pub fn as_fd(&self) -> std::os::fd::BorrowedFd<'_> {
        use std::os::fd::AsFd;
        self.stream.as_fd()
    }

    /// Reads whatever is available from the socket, splits it into `\n`
    /// terminated lines (dropping a trailing `\r`), and queues them.
    /// Returns `Ok(false)` on a clean EOF.
    pub fn fill(&mut self) -> Result<bool> {
        let mut chunk = [0u8; 4096];
        let n = self.stream.read(&mut chunk).map_err(Error::ReadFailed)?;
        if n == 0 {
            return Ok(false);
        }
        self.read_buf.extend_from_slice(&chunk[..n]);
        if self.read_buf.len() > MAX_LINE_LEN && memchr::memchr(b'\n', &self.read_buf).is_none() {
            return Err(Error::LineTooLong);
        }
        while let Some(pos) = memchr::memchr(b'\n', &self.read_buf) {
            let mut line: Vec<u8> = self.read_buf.drain(..=pos).collect();
            line.pop(); // trailing '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let text = String::from_utf8(line).map_err(|_| Error::Utf8Invalid)?;
            self.pending_lines.push_back(text);
        }
        Ok(true)
    }

    pub fn next_line(&mut self) -> Option<String> {
        self.pending_lines.pop_front()
    }

    pub fn queue_reply(&mut self, text: &str) {
        self.write_buf.extend_from_slice(text.as_bytes());
    }

    /// Flushes the write buffer if nothing remains queued from the caller's
    /// perspective, or if it has grown close to capacity (§4.7).
    pub fn maybe_flush(&mut self) -> Result<()> {
        if self.write_buf.len() + WRITE_BUFFER_MARGIN >= WRITE_BUFFER_CAPACITY {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.write_buf).map_err(Error::ReadFailed)?;
        self.write_buf.clear();
        Ok(())
    }
}

/// The transactional dispatch entry point for one line from a live
/// connection (§4.6.1, §4.7): mutating commands are bracketed in a WAL
/// transaction that commits iff the handler succeeds; non-mutating commands
/// (search, noop, quit, auth) bypass the log entirely.
pub fn handle_line(
    store: &mut Store,
    wal: &mut WalWriter,
    trans_id_source: &mut u64,
    now: i64,
    raw_line: &str,
    authenticated_user: &mut String,
) -> String {
    let composed = match nfc_compose(raw_line) {
        Ok(s) => s,
        Err(_) => return proto::error_line(&Error::Utf8Invalid),
    };

    let command = match proto::parse_line(&composed) {
        Ok(cmd) => cmd,
        Err(err) => {
            if err.is_connection_fatal() {
                return proto::error_line(&err);
            }
            return proto::reject_token_line(&composed);
        }
    };

    if !command.is_mutating() {
        return match crate::dispatch::apply(store, &command, now) {
            Ok(reply) => {
                if let proto::Command::Auth(spec) = &command {
                    *authenticated_user = spec.username.clone();
                }
                render_reply(&reply)
            }
            Err(err) => proto::error_line(&err),
        };
    }

    *trans_id_source += 1;
    let trans_id = *trans_id_source;
    let tx = match wal.begin_transaction(trans_id, now as u64) {
        Ok(tx) => tx,
        Err(err) => return proto::error_line(&err),
    };
    if let Err(err) = wal.write_data(trans_id, &composed) {
        wal.abort_transaction(&tx);
        return proto::error_line(&err);
    }

    match crate::dispatch::apply(store, &command, now) {
        Ok(reply) => match wal.commit_transaction(&tx, true) {
            Ok(()) => {
                debug!(trans_id, "mutating command committed");
                render_reply(&reply)
            }
            Err(err) => proto::error_line(&err),
        },
        Err(err) => {
            wal.abort_transaction(&tx);
            warn!(trans_id, %err, "mutating command failed, transaction left uncommitted");
            proto::error_line(&err)
        }
    }
}

fn render_reply(reply: &crate::dispatch::Reply) -> String {
    let mut out = String::new();
    for line in &reply.lines {
        out.push_str(line);
    }
    out.push_str(&proto::ok_line());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellpapp_types::Guid;

    fn store() -> Store {
        Store::new(Guid::new_server_guid([1; 7]))
    }

    fn wal(dir: &std::path::Path) -> WalWriter {
        WalWriter::create(dir, 0).unwrap()
    }

    fn send(store: &mut Store, wal: &mut WalWriter, trans_id: &mut u64, line: &str) -> String {
        let mut authenticated_user = "anonymous".to_string();
        handle_line(store, wal, trans_id, 1000, line, &mut authenticated_user)
    }

    #[test]
    fn noop_replies_ok_without_touching_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        let mut wal = wal(dir.path());
        let mut trans_id = 0u64;
        let reply = send(&mut store, &mut wal, &mut trans_id, "N");
        assert_eq!(reply, "OK\n");
        assert_eq!(trans_id, 0);
    }

    #[test]
    fn unknown_command_is_rejected_per_token_without_closing_the_connection() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        let mut wal = wal(dir.path());
        let mut trans_id = 0u64;
        let reply = send(&mut store, &mut wal, &mut trans_id, "Zbogus");
        assert_eq!(reply, "RE Zbogus\n");
    }

    #[test]
    fn mutating_command_failure_does_not_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        let mut wal = wal(dir.path());
        let mut trans_id = 0u64;
        let line = format!("Rr{} {}", "a".repeat(32), "c".repeat(32));
        let reply = send(&mut store, &mut wal, &mut trans_id, &line);
        assert!(reply.starts_with("E"));
    }

    fn hash_password(password: &str) -> String {
        use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
        use argon2::Argon2;
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string()
    }

    #[test]
    fn auth_with_the_right_password_succeeds_and_records_the_username() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        store
            .add_user(wellpapp_graph::User {
                name: "alice".to_string(),
                password_hash: hash_password("hunter2"),
                capabilities: wellpapp_types::Capability::empty(),
            })
            .unwrap();
        let mut wal = wal(dir.path());
        let mut trans_id = 0u64;
        let mut authenticated_user = "anonymous".to_string();
        let reply = handle_line(&mut store, &mut wal, &mut trans_id, 1000, "aalice hunter2", &mut authenticated_user);
        assert_eq!(reply, "OK\n");
        assert_eq!(authenticated_user, "alice");
    }

    #[test]
    fn auth_with_the_wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store();
        store
            .add_user(wellpapp_graph::User {
                name: "alice".to_string(),
                password_hash: hash_password("hunter2"),
                capabilities: wellpapp_types::Capability::empty(),
            })
            .unwrap();
        let mut wal = wal(dir.path());
        let mut trans_id = 0u64;
        let mut authenticated_user = "anonymous".to_string();
        let reply = handle_line(&mut store, &mut wal, &mut trans_id, 1000, "aalice wrong", &mut authenticated_user);
        assert!(reply.starts_with("E_AUTH"));
        assert_eq!(authenticated_user, "anonymous");
    }
}
