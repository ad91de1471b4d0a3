//! CLI-specific error types and exit code mapping

use ephemera_core::error::EphemeraError;
use ephemera_runner::RunnerError;

/// CLI-specific error type.
///
/// Phase failures are not errors here: they are reported through the run
/// report. These variants cover what prevents a report from being produced
/// or written.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),

    /// Orchestrator setup failure (docker connection, signal handlers).
    #[error("{0}")]
    Runner(#[from] RunnerError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EphemeraError> for CliError {
    fn from(err: EphemeraError) -> Self {
        match err {
            EphemeraError::Config(e) => Self::Config(e.to_string()),
            EphemeraError::Io(e) => Self::Io(e),
            EphemeraError::Run(e) => Self::Runner(RunnerError::Execution(e.to_string())),
        }
    }
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                 |
    /// |------|-------------------------|
    /// | 0    | Success / broken pipe   |
    /// | 1    | Failure                 |
    /// | 2    | Configuration error     |
    /// | 130  | Interrupted (SIGINT)    |
    pub fn exit_code(&self) -> u8 {
        if self.is_broken_pipe() {
            return 0;
        }
        match self {
            Self::Config(_) => 2,
            Self::Logging(_) | Self::Runner(_) | Self::JsonSerialize(_) | Self::Io(_) => 1,
        }
    }

    /// Whether the downstream consumer of stdout went away.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}
