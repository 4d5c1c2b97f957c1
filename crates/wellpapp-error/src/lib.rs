//! The error type shared by every crate in the workspace.
//!
//! There is exactly one error enum at this layer: command handlers, the WAL,
//! the arena and the graph all return `wellpapp_error::Result<T>`. Splitting
//! errors per crate would just mean writing `From` impls everywhere without
//! buying callers anything, since the connection handler is the only place
//! that ever branches on error kind.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds from §7 of the spec, plus the storage-layer variants needed to
/// report arena/WAL corruption and graph invariant violations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("line too long")]
    LineTooLong,

    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("too many {what} ({count} > {limit})")]
    Overflow {
        what: &'static str,
        count: usize,
        limit: usize,
    },

    #[error("out of memory")]
    Oom,

    #[error("bad auth")]
    BadAuth,

    #[error("invalid utf-8")]
    Utf8Invalid,

    #[error("no such tag: {0}")]
    NoSuchTag(String),

    #[error("no such post: {0}")]
    NoSuchPost(String),

    #[error("no such user: {0}")]
    NoSuchUser(String),

    #[error("edge already absent")]
    EdgeAbsent,

    #[error("edge already present")]
    EdgeAlreadyPresent,

    #[error("malformed guid: {0}")]
    BadGuid(String),

    #[error("malformed md5: {0}")]
    BadMd5(String),

    #[error("arena corrupt: {0}")]
    ArenaCorrupt(String),

    #[error("wal corrupt: {0}")]
    WalCorrupt(String),

    #[error("graph invariant violated: {0}")]
    GraphInvariant(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn internal(msg: impl fmt::Display) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Whether this error, raised while handling a connection, should close
    /// it (per §7/§4.8: read/line-too-long/overflow/oom/utf8 are fatal;
    /// argument-level protocol errors just report `RE <token>` and continue).
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::LineTooLong
                | Self::ReadFailed(_)
                | Self::Overflow { .. }
                | Self::Oom
                | Self::Utf8Invalid
                | Self::Io(_)
        )
    }

    /// Graph invariant violations are fatal assertions: the process aborts
    /// and the arena's unclean flag forces a cold rebuild on next start.
    #[must_use]
    pub fn is_graph_invariant(&self) -> bool {
        matches!(self, Self::GraphInvariant(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_match_spec_table() {
        assert!(Error::LineTooLong.is_connection_fatal());
        assert!(Error::Oom.is_connection_fatal());
        assert!(Error::Utf8Invalid.is_connection_fatal());
        assert!(!Error::BadGuid("x".into()).is_connection_fatal());
        assert!(!Error::NoSuchTag("cat".into()).is_connection_fatal());
    }

    #[test]
    fn graph_invariant_is_flagged() {
        let err = Error::GraphInvariant("hole count mismatch".into());
        assert!(err.is_graph_invariant());
        assert!(!err.is_connection_fatal());
    }
}
