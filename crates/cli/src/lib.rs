//! Shared entry for the worker binaries.
//!
//! - `strata-view-updater`: incremental update from put/delete logs
//! - `strata-view-builder`: initial build from insert-only logs
//!
//! Both read the job on stdin and write results to stdout. Logs and
//! diagnostics go to stderr.

use std::io::{self, BufReader};
use strata_views_engine::{run_worker, LogReplayUpdater, MergeMode};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the stderr log subscriber, filtered by `RUST_LOG` (default `warn`).
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the result protocol
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stderr))
        .try_init();
}

/// Run one job on stdin/stdout and return the process exit status.
pub fn run(mode: MergeMode) -> i32 {
    init_logging();

    let input = BufReader::new(io::stdin());
    let mut output = io::stdout().lock();
    let mut updater = LogReplayUpdater::new();

    match run_worker(mode, input, &mut output, &mut updater) {
        Ok(_) => 0,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
