//! Runs the selected suite and writes the report.

use std::io::Write;

use ephemera_runner::{CommandExecutor, DockerClient, PhaseSequencer};

use crate::cli::Suite;
use crate::error::CliError;
use crate::output::OutputWriter;
use crate::report::{PhaseView, ReportView};

/// Fails fast when the Docker daemon does not answer a ping.
pub async fn check_backend<D: DockerClient>(docker: &D) -> Result<(), CliError> {
    if let Err(e) = docker.ping().await {
        tracing::error!(error = %e, "docker daemon not reachable");
        return Err(e.into());
    }
    tracing::debug!("docker daemon reachable");
    Ok(())
}

/// Runs `suite` and renders the result to `out`.
///
/// Returns the overall verdict. Phase failures never surface as `Err`; only
/// output failures do.
pub async fn run_suite<D: DockerClient, E: CommandExecutor>(
    sequencer: &PhaseSequencer<D, E>,
    suite: Suite,
    writer: &OutputWriter,
    show_logs: bool,
    out: &mut dyn Write,
) -> Result<bool, CliError> {
    let run_id = sequencer.run_id();

    match suite {
        Suite::Single(name) => {
            let phase = sequencer.phase(name);
            let result = sequencer.run_one(&phase).await;
            let view = PhaseView {
                run_id,
                phase: name,
                result: &result,
                show_logs,
            };
            writer.render_to(&view, out)?;
            Ok(result.success)
        }
        Suite::All => {
            let phases = sequencer.all_phases();
            let report = sequencer.run_all(&phases).await;
            let view = ReportView::new(run_id, &report, show_logs);
            writer.render_to(&view, out)?;
            Ok(report.success() && !report.is_interrupted())
        }
    }
}
