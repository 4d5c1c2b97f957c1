//! The `LOCK` file (§4.1): a single clean/unclean byte plus an exclusive
//! advisory lock so a second process can never map the same arena.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::Path;

use nix::fcntl::{flock, FlockArg};
use wellpapp_error::{Error, Result};

pub struct LockFile {
    file: std::fs::File,
}

impl LockFile {
    /// Opens (creating if absent) `<basedir>/LOCK`, takes an exclusive
    /// advisory lock, and reports whether the prior shutdown was clean.
    pub fn open(basedir: &Path) -> Result<(Self, bool)> {
        let path = basedir.join("LOCK");
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        flock(file.as_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|e| Error::ArenaCorrupt(format!("LOCK held by another process: {e}")))?;

        let mut byte = [0u8; 1];
        let was_clean = matches!(file.read(&mut byte), Ok(1) if byte[0] == b'C');

        file.seek(SeekFrom::Start(0))?;
        file.write_all(b"U")?;
        file.sync_all()?;

        Ok((Self { file }, was_clean))
    }

    /// Marks the arena cleanly shut down. Called once, on graceful exit.
    pub fn mark_clean(mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(b"C")?;
        self.file.sync_all()?;
        Ok(())
    }
}
