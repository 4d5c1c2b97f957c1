//! The `wellpapp` binary (§4.11): parses arguments, loads configuration,
//! installs the `tracing-subscriber` logging layer, and either runs the
//! offline dump or starts serving connections.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};
use wellpapp_error::Result;
use wellpapp_server::Config;

#[derive(Parser, Debug)]
#[command(name = "wellpapp", about = "A tag/post graph server")]
struct Args {
    /// Path to the server configuration file (§4.9). May also be given via
    /// `WELLPAPP_CONFIG`.
    #[arg(long, env = "WELLPAPP_CONFIG")]
    config: PathBuf,

    /// An existing log directory to replay-seed the graph from when no
    /// valid arena exists yet. Ignored on a warm start.
    seed_log: Option<PathBuf>,

    /// Run the offline dump (§4.6) to this path instead of serving.
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn install_logging() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn main() -> std::process::ExitCode {
    install_logging();
    let args = Args::parse();

    match run(&args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "fatal error");
            std::process::ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;

    if let Some(dump_path) = &args.dump {
        let started = wellpapp_server::start(&config)?;
        let next_index = started
            .wal
            .path()
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0);
        wellpapp_server::write_dump(&started.store, dump_path, 0, now(), next_index)?;
        info!(path = %dump_path.display(), "dump complete");
        return Ok(());
    }

    let mut started = wellpapp_server::start(&config)?;
    if let Some(seed_log) = &args.seed_log {
        if started.store.posts.is_empty() && started.store.tags.is_empty() {
            info!(path = %seed_log.display(), "seeding cold start from log directory");
            wellpapp_wal::replay_dir(seed_log, |line, time| {
                wellpapp_server::dispatch::apply_line(&mut started.store, line, time as i64)
            })?;
        }
    }

    let mut server = wellpapp_server::Server::bind(config.port)?;
    let mut trans_id = 0u64;
    loop {
        server.tick(&mut started.store, &mut started.wal, &mut trans_id, now())?;
    }
}

fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
