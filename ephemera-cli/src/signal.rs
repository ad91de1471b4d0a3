//! Signal handling -- turns termination requests into cancellation.
//!
//! [`CancellationGuard::install`] traps SIGTERM and SIGINT once for the whole
//! process. The first signal records an [`ExitIntent`] and cancels the run's
//! token; in-flight waits observe it, tear down and return a partial report.

use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use ephemera_runner::RunnerError;

/// How the process should exit after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitIntent {
    /// SIGTERM: print the partial report and exit 0.
    Terminated,
    /// SIGINT: print the partial report and exit 130.
    Interrupted,
}

impl ExitIntent {
    /// Process exit code for this intent.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Terminated => 0,
            Self::Interrupted => 130,
        }
    }

    fn signal_name(&self) -> &'static str {
        match self {
            Self::Terminated => "SIGTERM",
            Self::Interrupted => "SIGINT",
        }
    }
}

/// Installs signal traps and exposes the recorded intent.
pub struct CancellationGuard {
    cancel: CancellationToken,
    intent: Arc<OnceLock<ExitIntent>>,
    task: Option<JoinHandle<()>>,
}

impl CancellationGuard {
    /// Guard without OS traps; [`trigger`](Self::trigger) drives it manually.
    pub fn detached(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            intent: Arc::new(OnceLock::new()),
            task: None,
        }
    }

    /// Installs SIGTERM/SIGINT handlers that cancel `cancel`.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Config` if a handler cannot be registered.
    pub fn install(cancel: CancellationToken) -> Result<Self, RunnerError> {
        let mut guard = Self::detached(cancel);
        let mut signals = Signals::new()?;
        let token = guard.cancel.clone();
        let intent = Arc::clone(&guard.intent);

        guard.task = Some(tokio::spawn(async move {
            loop {
                let received = signals.recv().await;
                if intent.set(received).is_ok() {
                    tracing::warn!(
                        signal = received.signal_name(),
                        "termination requested, tearing down in-flight phase"
                    );
                    token.cancel();
                } else {
                    tracing::warn!(
                        signal = received.signal_name(),
                        "shutdown already in progress"
                    );
                }
            }
        }));
        Ok(guard)
    }

    /// Records `intent` and cancels the token, as a trapped signal would.
    pub fn trigger(&self, intent: ExitIntent) {
        if self.intent.set(intent).is_ok() {
            self.cancel.cancel();
        }
    }

    /// The first signal received, if any.
    pub fn intent(&self) -> Option<ExitIntent> {
        self.intent.get().copied()
    }

    /// Exit code for a finished run.
    ///
    /// A recorded signal decides the code; otherwise the report verdict does.
    pub fn exit_code(&self, success: bool) -> u8 {
        match self.intent() {
            Some(intent) => intent.exit_code(),
            None if success => 0,
            None => 1,
        }
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(unix)]
struct Signals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self, RunnerError> {
        use tokio::signal::unix::{SignalKind, signal};

        let install = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| RunnerError::Config {
                field: "signal".to_owned(),
                reason: format!("failed to install {name} handler: {e}"),
            })
        };
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
        })
    }

    async fn recv(&mut self) -> ExitIntent {
        tokio::select! {
            _ = self.sigterm.recv() => ExitIntent::Terminated,
            _ = self.sigint.recv() => ExitIntent::Interrupted,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self, RunnerError> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ExitIntent {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ExitIntent::Interrupted,
            Err(_) => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(ExitIntent::Terminated.exit_code(), 0);
        assert_eq!(ExitIntent::Interrupted.exit_code(), 130);
    }

    #[test]
    fn no_signal_uses_verdict() {
        let guard = CancellationGuard::detached(CancellationToken::new());
        assert_eq!(guard.exit_code(true), 0);
        assert_eq!(guard.exit_code(false), 1);
    }

    #[test]
    fn interrupt_wins_over_verdict() {
        let cancel = CancellationToken::new();
        let guard = CancellationGuard::detached(cancel.clone());
        guard.trigger(ExitIntent::Interrupted);
        assert!(cancel.is_cancelled());
        assert_eq!(guard.exit_code(true), 130);
    }

    #[test]
    fn terminate_exits_zero_even_when_failed() {
        let guard = CancellationGuard::detached(CancellationToken::new());
        guard.trigger(ExitIntent::Terminated);
        assert_eq!(guard.exit_code(false), 0);
    }

    #[test]
    fn first_signal_wins() {
        let guard = CancellationGuard::detached(CancellationToken::new());
        guard.trigger(ExitIntent::Terminated);
        guard.trigger(ExitIntent::Interrupted);
        assert_eq!(guard.intent(), Some(ExitIntent::Terminated));
    }

    #[tokio::test]
    async fn install_registers_handlers() {
        let guard = CancellationGuard::install(CancellationToken::new()).unwrap();
        assert!(guard.intent().is_none());
    }
}
