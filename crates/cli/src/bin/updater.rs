//! Incremental view index update worker.

use std::process;
use strata_views_engine::MergeMode;

fn main() {
    process::exit(strata_views_cli::run(MergeMode::IncrementalUpdate));
}
