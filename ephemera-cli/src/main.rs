use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use ephemera_cli::app::{check_backend, run_suite};
use ephemera_cli::cli::{Cli, Suite};
use ephemera_cli::error::CliError;
use ephemera_cli::logging::init_tracing;
use ephemera_cli::output::OutputWriter;
use ephemera_cli::signal::CancellationGuard;
use ephemera_core::config::EphemeraConfig;
use ephemera_runner::{BollardDockerClient, PhaseSequencerBuilder, TokioCommandExecutor};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) if e.is_broken_pipe() => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ephemera: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<u8, CliError> {
    let mut config = EphemeraConfig::discover(cli.config.as_deref()).await?;
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
        config.validate()?;
    }

    init_tracing(&config.general).map_err(|e| CliError::Logging(e.to_string()))?;
    ephemera_core::metrics::describe_all();

    let (suite, warning) = Suite::from_arg(cli.suite.as_deref());
    if let Some(warning) = warning {
        tracing::warn!("{warning}");
    }

    // SIGTERM/SIGINT cancel this token
    let cancel = CancellationToken::new();
    let guard = CancellationGuard::install(cancel.clone())?;

    let docker = Arc::new(BollardDockerClient::connect(&config.docker.socket)?);
    check_backend(docker.as_ref()).await?;
    let sequencer = PhaseSequencerBuilder::new()
        .config(config)
        .docker_client(docker)
        .executor(Arc::new(TokioCommandExecutor))
        .cancellation_token(cancel)
        .build()?;

    tracing::info!(run_id = %sequencer.run_id(), suite = ?suite, "ephemera starting");

    let writer = OutputWriter::new(cli.output);
    let mut rendered = Vec::new();
    let success = run_suite(&sequencer, suite, &writer, !cli.no_logs, &mut rendered).await?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&rendered)?;
    stdout.flush()?;

    let code = guard.exit_code(success);
    tracing::info!(success, exit_code = code, interrupted = ?guard.intent(), "ephemera finished");
    Ok(code)
}
