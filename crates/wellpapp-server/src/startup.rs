//! Crash-recovery startup (§2, §4.1, §4.6): validate the on-disk arena
//! header, replay the write-ahead log into a fresh in-memory graph, and
//! open the next WAL file ready for new transactions.
//!
//! Per §4.1.1's recorded simplification the typed graph never persists
//! directly into the arena — it is always rebuilt from the WAL, on every
//! start, regardless of whether the header validates. The header/lockfile
//! dance still runs in full because the arena's string-interning cache is
//! the one piece of on-disk state that *is* reused warm, and because a
//! missing or corrupt header is itself diagnostic of an unclean shutdown.

use std::fs;
use std::path::Path;

use tracing::{info, warn};
use wellpapp_arena::{check_header, Arena, ArenaHeader, LockFile};
use wellpapp_error::Result;
use wellpapp_graph::Store;
use wellpapp_wal::{replay_dir, WalWriter};

use crate::config::Config;
use crate::dispatch;

const HEADER_FILE: &str = "header";

pub struct Started {
    pub store: Store,
    pub arena: Arena,
    pub wal: WalWriter,
    pub lock: LockFile,
}

/// Runs the full startup sequence against `config`'s `basedir` (§2):
/// 1. Take the directory lock, learn whether the last shutdown was clean.
/// 2. Validate the stored arena header against one freshly derived from
///    `config`; any mismatch (including a missing header) forces a cold
///    arena.
/// 3. Replay every WAL file into a fresh `Store`, feeding each committed
///    transaction's data lines back through `dispatch::apply_line` at that
///    transaction's own logged time.
/// 4. Open a new WAL file at the next free index.
pub fn start(config: &Config) -> Result<Started> {
    fs::create_dir_all(&config.basedir)?;
    let (lock, was_clean) = LockFile::open(&config.basedir)?;
    if !was_clean {
        warn!("prior shutdown was not clean, forcing a cold arena rebuild");
    }

    let expected_header = ArenaHeader::fresh(
        wellpapp_arena::SEGMENT_SIZE as u32,
        config.mm_base,
        config.md5(),
    );
    let stored_header = read_header(&config.basedir);
    let warm = was_clean && check_header(stored_header.as_ref(), &expected_header).is_ok();

    let arena = if warm {
        info!("arena header validated, reopening mm_cache warm");
        Arena::reopen(
            &config.basedir,
            config.mm_base,
            stored_header.as_ref().map_or(1, |h| h.segment_count),
        )?
    } else {
        info!("starting from a fresh arena");
        Arena::create(&config.basedir, config.mm_base)?
    };

    let mut store = Store::new(config.guid);
    let next_index = replay_dir(&config.log_dir(), |line, time| {
        dispatch::apply_line(&mut store, line, time as i64)
    })?;

    let wal = WalWriter::create(&config.log_dir(), next_index)?;

    write_header(&config.basedir, &expected_header_with_segments(&expected_header, &arena))?;

    Ok(Started { store, arena, wal, lock })
}

fn expected_header_with_segments(base: &ArenaHeader, arena: &Arena) -> ArenaHeader {
    let mut header = base.clone();
    header.segment_count = arena.segment_count();
    header.total_size = u64::from(header.segment_size) * u64::from(header.segment_count);
    header.clean = false;
    header
}

fn header_path(basedir: &Path) -> std::path::PathBuf {
    basedir.join(HEADER_FILE)
}

fn read_header(basedir: &Path) -> Option<ArenaHeader> {
    let bytes = fs::read(header_path(basedir)).ok()?;
    ArenaHeader::decode(&bytes)
}

fn write_header(basedir: &Path, header: &ArenaHeader) -> Result<()> {
    fs::write(header_path(basedir), header.encode())?;
    Ok(())
}

/// Marks a graceful shutdown: the arena is flushed, the header is rewritten
/// with `clean = true`, and the directory lock is released last so a
/// concurrent start can never observe a clean header under a held lock.
pub fn shutdown(config: &Config, arena: &Arena, lock: LockFile) -> Result<()> {
    arena.flush()?;
    let mut header = ArenaHeader::fresh(wellpapp_arena::SEGMENT_SIZE as u32, config.mm_base, config.md5());
    header.segment_count = arena.segment_count();
    header.total_size = u64::from(header.segment_size) * u64::from(header.segment_count);
    header.clean = true;
    write_header(&config.basedir, &header)?;
    lock.mark_clean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wellpapp_types::Guid;

    fn config(dir: &Path) -> Config {
        let text = format!(
            "basedir={}\nguid={}\nport=1\nmm_base=0x1000\n",
            dir.display(),
            Guid::new_server_guid([4; 7])
        );
        let path = dir.join("config.txt");
        fs::write(&path, text).unwrap();
        Config::load(&path).unwrap()
    }

    #[test]
    fn cold_start_on_an_empty_directory_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let started = start(&cfg).unwrap();
        assert!(started.store.posts.is_empty());
    }

    #[test]
    fn replay_restores_a_committed_post_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        {
            let mut started = start(&cfg).unwrap();
            let hash = wellpapp_types::ContentHash::from_bytes([9; 16]);
            let line = format!("AP{hash} R5 Ntest post");
            let tx = started.wal.begin_transaction(1, 1234).unwrap();
            started.wal.write_data(1, &line).unwrap();
            dispatch::apply_line(&mut started.store, &line, 1234).unwrap();
            started.wal.commit_transaction(&tx, true).unwrap();
            shutdown(&cfg, &started.arena, started.lock).unwrap();
        }
        let restarted = start(&cfg).unwrap();
        assert_eq!(restarted.store.posts.len(), 1);
    }
}
