//! 멀티 서비스 클러스터 러너 (docker compose)
//!
//! `up` → (준비 대기) → `capture_verdict_log` 순서로 실행하고, 두 단계의
//! 결과와 무관하게 `down`을 항상 한 번 호출합니다.
//!
//! 클러스터에는 단일 종료 코드가 없으므로 판정은 지정된 서비스의 stdout에
//! 대한 마커 규칙([`VerdictExtractor`])으로 결정합니다. stderr는 판정에
//! 사용하지 않고 `STDERR:` 제목 아래 로그 뒤에 덧붙입니다.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ephemera_core::types::{ErrorKind, ExecutionResult};
use ephemera_core::verdict::{MarkerVerdict, VerdictExtractor};

use crate::command::{CommandExecutor, CommandOutput, CommandSpec};
use crate::error::RunnerError;
use crate::wait;

/// 타임아웃/취소 후 부분 로그 수집 제한 시간
const PARTIAL_LOG_TIMEOUT: Duration = Duration::from_secs(30);

/// 클러스터 정의
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeSpec {
    /// compose 파일 경로
    pub compose_file: String,
    /// compose 프로젝트 이름 (리소스 식별자)
    pub project: String,
    /// 판정 로그를 내는 서비스
    pub service: String,
    /// compose 프로세스에 전달할 환경 변수
    pub env: Vec<(String, String)>,
}

/// 클러스터 단계별 제한 시간
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterTimeouts {
    /// `up --build -d` 제한 시간
    pub up: Duration,
    /// 기동 후 로그 수집 전 고정 지연
    pub readiness_delay: Duration,
    /// 판정 로그 대기 제한 시간
    pub logs: Duration,
    /// `down` 제한 시간 (취소 불가)
    pub down: Duration,
}

impl Default for ClusterTimeouts {
    fn default() -> Self {
        Self {
            up: Duration::from_secs(900),
            readiness_delay: Duration::ZERO,
            logs: Duration::from_secs(600),
            down: Duration::from_secs(120),
        }
    }
}

/// 클러스터 러너
pub struct ClusterRunner<E: CommandExecutor> {
    executor: Arc<E>,
    program: String,
    base_args: Vec<String>,
    verdict: Arc<dyn VerdictExtractor>,
}

impl<E: CommandExecutor> ClusterRunner<E> {
    /// `compose_command` (예: `["docker", "compose"]`)로 러너를 생성합니다.
    pub fn new(executor: Arc<E>, compose_command: &[String]) -> Self {
        let (program, base_args) = match compose_command.split_first() {
            Some((program, rest)) => (program.clone(), rest.to_vec()),
            None => ("docker".to_owned(), vec!["compose".to_owned()]),
        };
        Self {
            executor,
            program,
            base_args,
            verdict: Arc::new(MarkerVerdict),
        }
    }

    /// 판정기를 교체합니다.
    pub fn with_verdict(mut self, verdict: Arc<dyn VerdictExtractor>) -> Self {
        self.verdict = verdict;
        self
    }

    fn compose(&self, spec: &ComposeSpec) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(self.base_args.iter().cloned())
            .args(["-f", spec.compose_file.as_str(), "-p", spec.project.as_str()])
            .envs(spec.env.clone())
    }

    /// 모든 서비스를 빌드/기동합니다.
    ///
    /// # Errors
    ///
    /// - `RunnerError::Startup`: 기동 명령 실패 (stderr 포함)
    /// - `RunnerError::Timeout` / `RunnerError::Cancelled`: 대기 중단
    pub async fn up(
        &self,
        spec: &ComposeSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), RunnerError> {
        let command = self.compose(spec).args(["up", "--build", "-d"]);
        tracing::info!(project = %spec.project, file = %spec.compose_file, "starting cluster");

        let output = wait::bounded("cluster up", timeout, cancel, async {
            self.executor
                .execute(&command)
                .await
                .map_err(|e| RunnerError::Startup {
                    target: spec.project.clone(),
                    reason: e.to_string(),
                })
        })
        .await?;

        if output.success() {
            tracing::debug!(project = %spec.project, "cluster up");
            Ok(())
        } else {
            Err(RunnerError::Startup {
                target: spec.project.clone(),
                reason: startup_reason(&output),
            })
        }
    }

    /// 판정 서비스의 로그 스트림이 끝나거나 `timeout`이 지날 때까지 기다린 뒤
    /// 판정 결과를 반환합니다.
    pub async fn capture_verdict_log(
        &self,
        spec: &ComposeSpec,
        completion_marker: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let command = self
            .compose(spec)
            .args(["logs", "--no-color", "--follow", spec.service.as_str()]);

        let waited =
            wait::bounded("cluster log wait", timeout, cancel, self.executor.execute(&command))
                .await;

        match waited {
            Ok(output) => {
                let success = self.verdict.extract(&output.stdout, completion_marker);
                tracing::info!(project = %spec.project, service = %spec.service, success, "verdict captured");
                ExecutionResult::from_verdict(success, render_logs(&output))
            }
            Err(e @ (RunnerError::Timeout { .. } | RunnerError::Cancelled { .. })) => {
                tracing::warn!(project = %spec.project, service = %spec.service, error = %e, "log wait interrupted");
                let partial = self.partial_logs(spec).await;
                let logs = if partial.trim().is_empty() {
                    e.to_string()
                } else {
                    format!("{}\n{e}", partial.trim_end())
                };
                ExecutionResult::failed_with(e.kind(), logs)
            }
            Err(e) => {
                tracing::error!(project = %spec.project, error = %e, "log capture failed");
                ExecutionResult::failed_with(e.kind(), e.to_string())
            }
        }
    }

    async fn partial_logs(&self, spec: &ComposeSpec) -> String {
        let command = self
            .compose(spec)
            .args(["logs", "--no-color", spec.service.as_str()]);
        match tokio::time::timeout(PARTIAL_LOG_TIMEOUT, self.executor.execute(&command)).await {
            Ok(Ok(output)) => output.stdout,
            _ => String::new(),
        }
    }

    /// 클러스터 전체를 내립니다 (볼륨/고아 컨테이너 포함).
    ///
    /// 취소 토큰을 보지 않습니다. 실패는 경고 문자열로만 반환됩니다.
    /// 이미 내려간 프로젝트에 대해 다시 호출해도 안전합니다.
    pub async fn down(&self, spec: &ComposeSpec, timeout: Duration) -> Option<String> {
        let command = self
            .compose(spec)
            .args(["down", "--volumes", "--remove-orphans"]);

        let warning = match tokio::time::timeout(timeout, self.executor.execute(&command)).await {
            Ok(Ok(output)) if output.success() => None,
            Ok(Ok(output)) => Some(
                RunnerError::Cleanup {
                    target: spec.project.clone(),
                    reason: output.diagnostics(5),
                }
                .to_string(),
            ),
            Ok(Err(e)) => Some(
                RunnerError::Cleanup {
                    target: spec.project.clone(),
                    reason: e.to_string(),
                }
                .to_string(),
            ),
            Err(_) => Some(format!("cluster teardown for '{}' timed out", spec.project)),
        };

        match &warning {
            None => tracing::debug!(project = %spec.project, "cluster torn down"),
            Some(w) => tracing::warn!(project = %spec.project, warning = %w, "cluster teardown failed"),
        }
        warning
    }

    /// 프로젝트에 속한 컨테이너가 (상태와 무관하게) 남아 있는지 확인합니다.
    pub async fn is_live(&self, spec: &ComposeSpec) -> Result<bool, RunnerError> {
        let command = self.compose(spec).args(["ps", "--all", "-q"]);
        let output = self.executor.execute(&command).await?;
        if !output.success() {
            return Err(RunnerError::Execution(output.diagnostics(5)));
        }
        Ok(!output.stdout.trim().is_empty())
    }

    /// 기동 → 준비 대기 → 판정 로그 수집을 실행하고, 결과와 무관하게 정리합니다.
    pub async fn run(
        &self,
        spec: &ComposeSpec,
        completion_marker: &str,
        timeouts: &ClusterTimeouts,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let mut result = match self.up(spec, timeouts.up, cancel).await {
            Err(e) => {
                tracing::error!(project = %spec.project, error = %e, "cluster startup failed");
                ExecutionResult::failed_with(e.kind(), e.to_string())
            }
            Ok(()) => match wait::pause("readiness delay", timeouts.readiness_delay, cancel).await {
                Err(e) => ExecutionResult::failed_with(ErrorKind::Timeout, e.to_string()),
                Ok(()) => {
                    self.capture_verdict_log(spec, completion_marker, timeouts.logs, cancel)
                        .await
                }
            },
        };

        if let Some(warning) = self.down(spec, timeouts.down).await {
            result.push_warning(warning);
        }
        result
    }
}

fn startup_reason(output: &CommandOutput) -> String {
    let stderr = output.stderr.trim();
    match (output.status, stderr.is_empty()) {
        (Some(code), false) => format!("exit status {code}: {stderr}"),
        (Some(code), true) => format!("exit status {code}"),
        (None, _) => format!("terminated by signal: {stderr}"),
    }
}

fn render_logs(output: &CommandOutput) -> String {
    if output.stderr.trim().is_empty() {
        output.stdout.clone()
    } else {
        format!("{}\nSTDERR:\n{}", output.stdout.trim_end(), output.stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::MockCommandExecutor;

    fn spec() -> ComposeSpec {
        ComposeSpec {
            compose_file: "docker-compose.integration.yml".to_owned(),
            project: "ephemera-integration-abcd1234".to_owned(),
            service: "integration-tests".to_owned(),
            env: vec![("POSTGRES_HOST".to_owned(), "postgres".to_owned())],
        }
    }

    fn compose() -> Vec<String> {
        vec!["docker".to_owned(), "compose".to_owned()]
    }

    const MARKER: &str = "Integration tests completed";

    #[tokio::test]
    async fn command_line_includes_file_and_project() {
        let exec = Arc::new(MockCommandExecutor::new());
        let runner = ClusterRunner::new(Arc::clone(&exec), &compose());
        runner
            .up(&spec(), Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();

        let calls = exec.calls();
        assert_eq!(
            calls[0].display(),
            "docker compose -f docker-compose.integration.yml -p ephemera-integration-abcd1234 up --build -d"
        );
        assert_eq!(calls[0].env, spec().env);
    }

    #[tokio::test]
    async fn marker_in_stdout_passes() {
        let exec = Arc::new(MockCommandExecutor::new().on("logs", 0, "5 passed\nIntegration tests completed\n", ""));
        let runner = ClusterRunner::new(exec, &compose());
        let result = runner
            .run(&spec(), MARKER, &ClusterTimeouts::default(), &CancellationToken::new())
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn stderr_is_appended_but_not_judged() {
        let exec = Arc::new(MockCommandExecutor::new().on(
            "logs",
            0,
            "Integration tests completed",
            "FAILED to pull optional image",
        ));
        let runner = ClusterRunner::new(exec, &compose());
        let result = runner
            .run(&spec(), MARKER, &ClusterTimeouts::default(), &CancellationToken::new())
            .await;
        assert!(result.success);
        assert!(result.logs.contains("STDERR:\nFAILED to pull"));
    }

    #[tokio::test]
    async fn startup_failure_skips_logs_and_tears_down_once() {
        let exec = Arc::new(MockCommandExecutor::new().on("up", 1, "", "port is already allocated"));
        let runner = ClusterRunner::new(Arc::clone(&exec), &compose());
        let result = runner
            .run(&spec(), MARKER, &ClusterTimeouts::default(), &CancellationToken::new())
            .await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Startup));
        assert!(result.logs.contains("port is already allocated"));
        assert_eq!(exec.count("logs"), 0);
        assert_eq!(exec.count("down"), 1);
    }

    #[tokio::test]
    async fn teardown_failure_is_warning_only() {
        let exec = Arc::new(
            MockCommandExecutor::new()
                .on("logs", 0, MARKER, "")
                .on("down", 1, "", "network in use"),
        );
        let runner = ClusterRunner::new(exec, &compose());
        let result = runner
            .run(&spec(), MARKER, &ClusterTimeouts::default(), &CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("network in use"));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_delay_is_cancellable() {
        let exec = Arc::new(MockCommandExecutor::new());
        let runner = ClusterRunner::new(Arc::clone(&exec), &compose());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let timeouts = ClusterTimeouts {
            readiness_delay: Duration::from_secs(15),
            ..ClusterTimeouts::default()
        };
        let result = runner.run(&spec(), MARKER, &timeouts, &cancel).await;
        assert!(!result.success);
        assert!(result.logs.contains("interrupted"));
        assert_eq!(exec.count("logs"), 0);
        assert_eq!(exec.count("down"), 1);
    }

    #[tokio::test]
    async fn is_live_reads_ps_output() {
        let exec = Arc::new(MockCommandExecutor::new().on("ps", 0, "3f2a9c\n", ""));
        let runner = ClusterRunner::new(exec, &compose());
        assert!(runner.is_live(&spec()).await.unwrap());

        let exec = Arc::new(MockCommandExecutor::new());
        let runner = ClusterRunner::new(exec, &compose());
        assert!(!runner.is_live(&spec()).await.unwrap());
    }

    #[test]
    fn empty_compose_command_falls_back_to_docker_compose() {
        let runner = ClusterRunner::new(Arc::new(MockCommandExecutor::new()), &[]);
        assert_eq!(runner.compose(&spec()).display().split(' ').take(2).collect::<Vec<_>>(), ["docker", "compose"]);
    }
}
