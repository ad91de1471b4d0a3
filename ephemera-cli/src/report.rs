//! Report payloads for text and JSON output.

use std::io::Write;
use std::time::Duration;

use serde::Serialize;

use ephemera_core::types::{ExecutionResult, PhaseName, RunReport};

use crate::output::Render;

const BANNER_WIDTH: usize = 60;

/// Multi-phase report view.
#[derive(Serialize)]
pub struct ReportView<'a> {
    /// Run identifier (labels / compose project suffix)
    pub run_id: &'a str,
    /// Overall verdict. False for an empty or interrupted run.
    pub success: bool,
    #[serde(flatten)]
    pub report: &'a RunReport,
    #[serde(skip)]
    pub show_logs: bool,
}

impl<'a> ReportView<'a> {
    pub fn new(run_id: &'a str, report: &'a RunReport, show_logs: bool) -> Self {
        Self {
            run_id,
            success: report.success() && !report.is_interrupted() && !report.is_empty(),
            report,
            show_logs,
        }
    }
}

impl Render for ReportView<'_> {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for entry in self.report.entries() {
            render_phase(w, entry.phase, &entry.result, entry.duration_ms, self.show_logs)?;
        }

        writeln!(w, "{}", "=".repeat(BANNER_WIDTH))?;
        writeln!(w, "Summary (run {}):", self.run_id)?;
        for entry in self.report.entries() {
            writeln!(w, "  {:<12} {}", entry.phase, verdict_word(&entry.result))?;
        }
        if self.report.is_interrupted() {
            writeln!(w, "Run interrupted: remaining phases were not started.")?;
        }
        let overall = if self.success {
            "PASSED"
        } else {
            "FAILED"
        };
        writeln!(w, "Overall: {overall}")?;
        Ok(())
    }
}

/// Single-phase result view.
#[derive(Serialize)]
pub struct PhaseView<'a> {
    pub run_id: &'a str,
    pub phase: PhaseName,
    #[serde(flatten)]
    pub result: &'a ExecutionResult,
    #[serde(skip)]
    pub show_logs: bool,
}

impl Render for PhaseView<'_> {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        render_phase(w, self.phase, self.result, 0, self.show_logs)
    }
}

fn verdict_word(result: &ExecutionResult) -> String {
    match (result.success, result.error_kind) {
        (true, _) => "PASSED".to_owned(),
        (false, Some(kind)) => format!("FAILED ({kind})"),
        (false, None) => "FAILED".to_owned(),
    }
}

fn render_phase(
    w: &mut dyn Write,
    phase: PhaseName,
    result: &ExecutionResult,
    duration_ms: u64,
    show_logs: bool,
) -> std::io::Result<()> {
    let title = format!(" {phase} ");
    writeln!(w, "{:=^width$}", title, width = BANNER_WIDTH)?;
    if show_logs && !result.logs.is_empty() {
        writeln!(w, "{}", result.logs.trim_end())?;
        writeln!(w, "{}", "-".repeat(BANNER_WIDTH))?;
    }
    for warning in &result.warnings {
        writeln!(w, "warning: {warning}")?;
    }
    if duration_ms > 0 {
        writeln!(
            w,
            "{phase}: {} in {:.1}s",
            verdict_word(result),
            Duration::from_millis(duration_ms).as_secs_f64()
        )?;
    } else {
        writeln!(w, "{phase}: {}", verdict_word(result))?;
    }
    Ok(())
}
