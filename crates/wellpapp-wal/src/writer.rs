//! The transactional WAL writer (§4.6): per-run log file, buffered data
//! lines, the `U`→`O` commit flip, and per-write advisory locking so future
//! concurrent writers stay line-exact.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use nix::fcntl::{flock, FlockArg};
use tracing::{debug, info};
use wellpapp_error::Result;

use crate::record::LogLine;

/// Data lines are buffered up to roughly this many bytes before being
/// flushed to the file (§4.6's "buffered up to ~4KB then flushed").
const FLUSH_THRESHOLD: usize = 4096;

pub struct WalWriter {
    file: File,
    path: PathBuf,
    buf: String,
}

/// A handle to an in-flight transaction: the byte offset of its `T` line's
/// commit-flag byte, so `commit` can seek back and flip it without
/// re-scanning the file.
pub struct TxHandle {
    trans_id: u64,
    flag_offset: u64,
}

impl WalWriter {
    pub fn create(log_dir: &Path, log_index: u32) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{log_index}"));
        // Not `.append(true)`: O_APPEND forces every write to EOF regardless
        // of a preceding seek, which would turn the commit flip's in-place
        // overwrite into a stray trailing byte. Every write site here seeks
        // explicitly before writing.
        let file = OpenOptions::new().create(true).write(true).read(true).open(&path)?;
        Ok(Self {
            file,
            path,
            buf: String::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn locked<R>(&mut self, f: impl FnOnce(&mut File) -> Result<R>) -> Result<R> {
        flock(self.file.as_fd(), FlockArg::LockExclusive)?;
        let result = f(&mut self.file);
        let _ = flock(self.file.as_fd(), FlockArg::Unlock);
        result
    }

    /// Opens a transaction: writes `T<id>U<time>` at the current end of
    /// file and returns the handle needed to flip it later.
    pub fn begin_transaction(&mut self, trans_id: u64, time: u64) -> Result<TxHandle> {
        let line = LogLine::TransactionStart {
            trans_id,
            committed: false,
            time,
        };
        let encoded = line.encode();
        let offset = self.locked(|file| {
            let offset = file.seek(SeekFrom::End(0))?;
            writeln!(file, "{encoded}")?;
            Ok(offset)
        })?;
        debug!(trans_id, "wal transaction opened");
        Ok(TxHandle {
            trans_id,
            flag_offset: offset + LogLine::commit_flag_offset() as u64,
        })
    }

    /// Buffers one data record; flushed once the buffer crosses
    /// `FLUSH_THRESHOLD`.
    pub fn write_data(&mut self, trans_id: u64, payload: &str) -> Result<()> {
        let line = LogLine::Data {
            trans_id,
            payload: payload.to_string(),
        };
        self.buf.push_str(&line.encode());
        self.buf.push('\n');
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush_buffer()?;
        }
        Ok(())
    }

    fn flush_buffer(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buf);
        self.locked(|file| {
            file.seek(SeekFrom::End(0))?;
            file.write_all(chunk.as_bytes())?;
            Ok(())
        })
    }

    /// Commits a transaction: flushes buffered data, writes `E<id>`,
    /// optionally fsyncs (§4.6: "always on for client transactions, off for
    /// offline dumps"), then flips the start marker's `U` to `O`.
    pub fn commit_transaction(&mut self, tx: &TxHandle, sync: bool) -> Result<()> {
        self.flush_buffer()?;
        let end = LogLine::End { trans_id: tx.trans_id }.encode();
        self.locked(|file| {
            file.seek(SeekFrom::End(0))?;
            writeln!(file, "{end}")?;
            if sync {
                file.sync_all()?;
            }
            file.seek(SeekFrom::Start(tx.flag_offset))?;
            file.write_all(b"O")?;
            if sync {
                file.sync_all()?;
            }
            file.seek(SeekFrom::End(0))?;
            Ok(())
        })?;
        info!(trans_id = tx.trans_id, sync, "wal transaction committed");
        Ok(())
    }

    /// A failed command handler inside a mutating transaction's bracket:
    /// the start marker is left as `U` (§4.6.1), so replay will never
    /// register this transaction's data lines. The buffered data for this
    /// transaction is discarded, not written.
    pub fn abort_transaction(&mut self, tx: &TxHandle) {
        self.buf.clear();
        debug!(trans_id = tx.trans_id, "wal transaction aborted, never committed");
    }

    /// Writes the `L<next-log-index>` line ending an offline dump (§4.6).
    pub fn write_next_log_index(&mut self, index: u32) -> Result<()> {
        self.flush_buffer()?;
        let line = LogLine::NextLogIndex { index }.encode();
        self.locked(|file| {
            file.seek(SeekFrom::End(0))?;
            writeln!(file, "{line}")?;
            file.sync_all()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LogLine;
    use std::io::Read;

    fn read_all(path: &Path) -> String {
        let mut s = String::new();
        File::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn commit_flips_the_commit_byte_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WalWriter::create(dir.path(), 0).unwrap();
        let tx = wal.begin_transaction(1, 1000).unwrap();
        wal.write_data(1, "Afoo bar").unwrap();
        wal.commit_transaction(&tx, true).unwrap();

        let contents = read_all(wal.path());
        let mut lines = contents.lines();
        let start = LogLine::parse(lines.next().unwrap()).unwrap();
        assert_eq!(
            start,
            LogLine::TransactionStart {
                trans_id: 1,
                committed: true,
                time: 1000
            }
        );
    }

    #[test]
    fn aborted_transaction_leaves_uncommitted_marker() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WalWriter::create(dir.path(), 0).unwrap();
        let tx = wal.begin_transaction(7, 1).unwrap();
        wal.write_data(7, "Afoo").unwrap();
        wal.abort_transaction(&tx);

        let contents = read_all(wal.path());
        let start = LogLine::parse(contents.lines().next().unwrap()).unwrap();
        assert_eq!(
            start,
            LogLine::TransactionStart {
                trans_id: 7,
                committed: false,
                time: 1
            }
        );
        // The aborted transaction's data line was never flushed.
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn multiple_transactions_append_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WalWriter::create(dir.path(), 0).unwrap();
        for id in 1..=3u64 {
            let tx = wal.begin_transaction(id, id * 10).unwrap();
            wal.write_data(id, "Nfoo").unwrap();
            wal.commit_transaction(&tx, true).unwrap();
        }
        let contents = read_all(wal.path());
        assert_eq!(contents.lines().count(), 9);
    }
}
