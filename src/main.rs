//! Command line for migrating TFC/TFE workspaces to Spacelift stacks.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = spacemk_custom::cli::parse_cli();
    init_tracing(&cli.log_level);

    spacemk_custom::cli::run_with_cli(cli).await
}
