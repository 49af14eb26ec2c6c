use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
#[cfg(feature = "memtrace")]
use tracing::error;

use vecadd_core::{Args, RunConfig, driver, logging};

fn main() -> ExitCode {
    let config = RunConfig::from(Args::parse());
    logging::init(config.verbosity);

    let stdout = io::stdout();
    let result = driver::run(&config, &mut stdout.lock());

    #[cfg(feature = "metrics")]
    vecadd_core::summary();
    #[cfg(feature = "memtrace")]
    if let Err(e) = vecadd_core::flush_csv() {
        error!("couldn't write memtrace files: {e}");
    }

    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(error = ?e, "run failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
