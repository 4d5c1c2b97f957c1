//! WAL recovery (§4.6): iterate log files in index order, register
//! completed transactions, and dispatch their data lines back through the
//! caller's command handler with logging suppressed.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};
use wellpapp_error::{Error, Result};

use crate::record::LogLine;

/// The open-transaction table is bounded to 64 in-flight transactions
/// (§4.6): a corrupt or adversarial log that opens more than that without
/// closing them is treated as corruption rather than growing unbounded.
pub const MAX_OPEN_TRANSACTIONS: usize = 64;

/// Replays every log file under `log_dir`, named by their numeric index, in
/// ascending order. `dispatch` receives each `D` line's payload together
/// with its enclosing transaction's logged time, for a registered
/// (completed) transaction, in file order; logging must be suppressed by the
/// caller for the duration (§4.6, §2's recovery flow). Returns the next log
/// index a fresh `WalWriter` should use.
pub fn replay_dir(log_dir: &Path, mut dispatch: impl FnMut(&str, u64) -> Result<()>) -> Result<u32> {
    if !log_dir.exists() {
        return Ok(0);
    }
    let mut indices: Vec<u32> = std::fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
        .collect();
    indices.sort_unstable();

    for index in &indices {
        let path = log_dir.join(index.to_string());
        info!(index, "replaying wal file");
        replay_file(&path, &mut dispatch)?;
    }
    Ok(indices.last().map_or(0, |last| last + 1))
}

fn replay_file(path: &Path, dispatch: &mut impl FnMut(&str, u64) -> Result<()>) -> Result<()> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut open_transactions: HashMap<u64, u64> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let parsed = match LogLine::parse(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                // A trailing partial line is the normal shape of a log that
                // was mid-write at crash time; anything else is corruption.
                warn!(%err, path = %path.display(), "ignoring unparseable trailing wal line");
                break;
            }
        };
        match parsed {
            LogLine::TransactionStart {
                trans_id,
                committed,
                time,
            } => {
                if committed {
                    if open_transactions.len() >= MAX_OPEN_TRANSACTIONS {
                        return Err(Error::WalCorrupt(
                            "too many in-flight transactions during replay".into(),
                        ));
                    }
                    open_transactions.insert(trans_id, time);
                }
            }
            LogLine::Data { trans_id, payload } => {
                if let Some(&time) = open_transactions.get(&trans_id) {
                    dispatch(&payload, time)?;
                }
                // Data lines for an unregistered transaction are silently
                // skipped (§4.6: "their transaction never completed").
            }
            LogLine::End { trans_id } => {
                open_transactions.remove(&trans_id);
            }
            LogLine::NextLogIndex { .. } => {
                // Only present in offline dump files, not live logs; a live
                // replay never encounters one, but tolerate it for a dump
                // file fed back through the same replay path.
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::WalWriter;

    #[test]
    fn replays_only_committed_transactions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut wal = WalWriter::create(dir.path(), 0).unwrap();
            let tx1 = wal.begin_transaction(1, 10).unwrap();
            wal.write_data(1, "Afirst").unwrap();
            wal.commit_transaction(&tx1, true).unwrap();

            let tx2 = wal.begin_transaction(2, 20).unwrap();
            wal.write_data(2, "Anever-committed").unwrap();
            wal.abort_transaction(&tx2);
        }

        let mut seen = Vec::new();
        let next_index = replay_dir(dir.path(), |payload, time| {
            seen.push((payload.to_string(), time));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![("first".to_string(), 10)]);
        assert_eq!(next_index, 1);
    }

    #[test]
    fn missing_log_dir_replays_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-such-dir");
        let mut seen = 0;
        let next = replay_dir(&missing, |_, _| {
            seen += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, 0);
        assert_eq!(next, 0);
    }

    #[test]
    fn multiple_log_files_replay_in_numeric_order() {
        let dir = tempfile::tempdir().unwrap();
        for idx in 0..3u32 {
            let mut wal = WalWriter::create(dir.path(), idx).unwrap();
            let tx = wal.begin_transaction(u64::from(idx) + 1, 1).unwrap();
            wal.write_data(u64::from(idx) + 1, &format!("A{idx}")).unwrap();
            wal.commit_transaction(&tx, true).unwrap();
        }
        let mut seen = Vec::new();
        let next = replay_dir(dir.path(), |payload, _time| {
            seen.push(payload.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["A0", "A1", "A2"]);
        assert_eq!(next, 3);
    }
}
