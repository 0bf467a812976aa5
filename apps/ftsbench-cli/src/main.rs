//! `ftsbench`: ingest a JSON-lines corpus into one search engine and time
//! phrase queries against it. Everything is configured through
//! `config.toml`, `config.<RUST_ENV>.toml` and `APP_*` variables.

use tracing_subscriber::{fmt, EnvFilter};

use ftsbench_core::config::Config;
use ftsbench_runner::{orchestrator, Registry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Tracing is not up yet; anyhow reports a bad config on its own.
    let config = Config::load()?;
    init_tracing(config.get::<bool>("debug").unwrap_or(false));

    let registry = Registry::with_builtin();
    let mut diagnostics = std::io::stderr();
    match orchestrator::run(&config, &registry, &mut diagnostics).await {
        Ok(summary) => {
            summary.log();
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "run aborted");
            std::process::exit(1);
        }
    }
}

/// Diagnostics go to stderr. `RUST_LOG` wins over the debug flag.
fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).try_init();
}
