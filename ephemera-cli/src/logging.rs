//! stderr tracing for the `ephemera` binary.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use ephemera_core::config::GeneralConfig;

/// Installs the global subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let installed = match config.log_format.as_str() {
        "json" => registry.with(layer.json()).try_init(),
        "pretty" => registry.with(layer.pretty()).try_init(),
        other => return Err(anyhow!("unknown log format '{other}', expected 'json' or 'pretty'")),
    };
    installed.map_err(|e| anyhow!("failed to install {} subscriber: {e}", config.log_format))
}
