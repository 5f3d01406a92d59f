//! Isolated processing worker.
//!
//! Reads one `WorkerRequest` from stdin, writes one `WorkerResponse` to
//! stdout and exits. Spawned per unit by the orchestrator in cluster mode.

use std::sync::Arc;

use anyhow::Context;
use bridge_traits::SystemClock;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_sync::run_worker_stdio;

#[core_async::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_stderr(true),
    )
    .context("initializing worker logging")?;

    run_worker_stdio(
        core_async::io::stdin(),
        core_async::io::stdout(),
        Arc::new(SystemClock),
    )
    .await
    .context("processing worker request")
}
