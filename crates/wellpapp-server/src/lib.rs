//! The server half of the workspace (§2, §4.6, §4.7, §5): configuration
//! loading, crash-recovery startup, the per-connection line protocol, the
//! cooperative poll loop, and the offline dump tool. `wellpapp-cli` is the
//! thin binary wrapper around this crate.

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod dump;
pub mod server;
pub mod startup;

pub use config::Config;
pub use dump::write_dump;
pub use server::Server;
pub use startup::{shutdown, start, Started};
