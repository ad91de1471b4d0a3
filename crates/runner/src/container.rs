//! 임시 컨테이너 러너
//!
//! 이미지 하나로 컨테이너 하나를 띄우고, 종료/타임아웃/취소 중 먼저 발생하는
//! 쪽까지 기다린 뒤, 어떤 경로로 끝나든 컨테이너를 제거하고 반환합니다.
//!
//! ```text
//! create ─► start ─► wait(bounded) ─┬─ exit code ─► logs ─► verdict ─┐
//!                                   ├─ timeout ───► stop ─► logs ────┤
//!                                   └─ cancelled ──────────► logs ───┤
//!                                                                    ▼
//!                                                              remove (always)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ephemera_core::types::{ExecutionResult, PhaseName};
use ephemera_core::verdict::{MarkerVerdict, VerdictExtractor};

use crate::builder::ImageRef;
use crate::docker::{ContainerInfo, ContainerSpec, DockerClient, PHASE_LABEL, RUN_LABEL};
use crate::error::RunnerError;
use crate::wait;

/// 정리 호출 하나에 허용하는 최대 시간 (취소 불가)
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// 타임아웃/취소 후 부분 로그 수집 제한 시간
const PARTIAL_LOG_TIMEOUT: Duration = Duration::from_secs(30);

/// 컨테이너 실행 요청 한 건
#[derive(Debug, Clone, Copy)]
pub struct ContainerJob<'a> {
    /// 페이즈 이름 (레이블)
    pub phase: PhaseName,
    /// 실행할 이미지
    pub image: &'a ImageRef,
    /// 종료 대기 제한 시간
    pub timeout: Duration,
    /// 설정되면 종료 코드 0에 더해 로그 판정도 통과해야 성공
    pub completion_marker: Option<&'a str>,
}

/// 임시 컨테이너 러너
pub struct EphemeralContainerRunner<D: DockerClient> {
    docker: Arc<D>,
    run_id: String,
    env: Vec<String>,
    stop_grace: Duration,
    verdict: Arc<dyn VerdictExtractor>,
}

impl<D: DockerClient> EphemeralContainerRunner<D> {
    /// 러너를 생성합니다. `run_id`는 이 실행에서 만든 컨테이너의 레이블이 됩니다.
    pub fn new(docker: Arc<D>, run_id: impl Into<String>) -> Self {
        Self {
            docker,
            run_id: run_id.into(),
            env: Vec::new(),
            stop_grace: Duration::from_secs(10),
            verdict: Arc::new(MarkerVerdict),
        }
    }

    /// 워크로드 환경 변수를 설정합니다.
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
        self
    }

    /// 타임아웃 시 stop 유예 시간을 설정합니다.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// 판정기를 교체합니다.
    pub fn with_verdict(mut self, verdict: Arc<dyn VerdictExtractor>) -> Self {
        self.verdict = verdict;
        self
    }

    /// 실행 ID
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn container_spec(&self, job: &ContainerJob<'_>) -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert(RUN_LABEL.to_owned(), self.run_id.clone());
        labels.insert(PHASE_LABEL.to_owned(), job.phase.as_str().to_owned());
        ContainerSpec {
            name: container_name(job.image.tag()),
            image: job.image.tag().to_owned(),
            env: self.env.clone(),
            labels,
        }
    }

    /// 컨테이너 하나를 실행하고 결과를 반환합니다.
    ///
    /// 에러를 반환하지 않습니다. 모든 실패는 `error_kind`가 설정된 실패 결과로
    /// 변환되며, 컨테이너가 생성되었다면 반환 전에 반드시 제거됩니다.
    pub async fn run(&self, job: &ContainerJob<'_>, cancel: &CancellationToken) -> ExecutionResult {
        let spec = self.container_spec(job);

        let id = match self.docker.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(phase = %job.phase, container = %spec.name, error = %e, "container create failed");
                return ExecutionResult::failed_with(e.kind(), e.to_string());
            }
        };
        tracing::debug!(phase = %job.phase, container = %spec.name, id = %id, "container created");

        let mut result = self.execute(job, &spec.name, &id, cancel).await;

        if let Some(warning) = self.teardown(&id).await {
            result.push_warning(warning);
        }
        result
    }

    async fn execute(
        &self,
        job: &ContainerJob<'_>,
        name: &str,
        id: &str,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        if let Err(e) = self.docker.start_container(id).await {
            tracing::error!(phase = %job.phase, container = %name, error = %e, "container start failed");
            return ExecutionResult::failed_with(e.kind(), e.to_string());
        }
        tracing::info!(phase = %job.phase, container = %name, image = %job.image.tag(), "container started");

        let waited = wait::bounded(
            "container wait",
            job.timeout,
            cancel,
            self.docker.wait_container(id),
        )
        .await;

        match waited {
            Ok(code) => {
                let logs = match self.docker.container_logs(id).await {
                    Ok(logs) => logs,
                    Err(e) => {
                        tracing::warn!(container = %name, error = %e, "failed to read container logs");
                        format!("failed to read container logs: {e}")
                    }
                };
                let marker_ok = job
                    .completion_marker
                    .is_none_or(|marker| self.verdict.extract(&logs, marker));
                let success = code == 0 && marker_ok;
                tracing::info!(phase = %job.phase, container = %name, exit_code = code, success, "container exited");
                ExecutionResult::from_verdict(success, logs)
            }
            Err(e @ (RunnerError::Timeout { .. } | RunnerError::Cancelled { .. })) => {
                tracing::warn!(phase = %job.phase, container = %name, error = %e, "container wait interrupted");
                if !e.is_cancelled() {
                    if let Err(stop_err) = self.docker.stop_container(id, self.stop_grace).await {
                        tracing::warn!(container = %name, error = %stop_err, "container stop failed");
                    }
                }
                let partial = self.partial_logs(id).await;
                ExecutionResult::failed_with(e.kind(), join_logs(&partial, &e.to_string()))
            }
            Err(e) => {
                tracing::error!(phase = %job.phase, container = %name, error = %e, "container wait failed");
                ExecutionResult::failed_with(e.kind(), e.to_string())
            }
        }
    }

    async fn partial_logs(&self, id: &str) -> String {
        match tokio::time::timeout(PARTIAL_LOG_TIMEOUT, self.docker.container_logs(id)).await {
            Ok(Ok(logs)) => logs,
            _ => String::new(),
        }
    }

    /// 컨테이너를 강제 제거합니다.
    ///
    /// 이미 사라진 컨테이너는 조용히 무시하므로 여러 번 호출해도 안전합니다.
    /// 실패는 경고 문자열로만 반환되고 호출자에게 전파되지 않습니다.
    /// 취소 토큰을 보지 않습니다.
    pub async fn teardown(&self, id: &str) -> Option<String> {
        match tokio::time::timeout(TEARDOWN_TIMEOUT, self.docker.remove_container(id)).await {
            Ok(Ok(())) => {
                tracing::debug!(id = %id, "container removed");
                None
            }
            Ok(Err(RunnerError::ContainerNotFound(_))) => {
                tracing::debug!(id = %id, "container already removed");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(id = %id, error = %e, "container removal failed");
                Some(e.to_string())
            }
            Err(_) => {
                let warning = format!("container removal for '{id}' timed out");
                tracing::warn!(id = %id, "{warning}");
                Some(warning)
            }
        }
    }

    /// 이 실행 ID로 생성되어 아직 남아 있는 컨테이너 목록
    pub async fn live_containers(&self) -> Result<Vec<ContainerInfo>, RunnerError> {
        self.docker.list_containers(RUN_LABEL, &self.run_id).await
    }
}

/// 태그에서 충돌 없는 컨테이너 이름을 만듭니다: `<태그 정리>-<8자리 hex>`
pub fn container_name(tag: &str) -> String {
    let base: String = tag
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let base = base.trim_start_matches(['-', '.', '_']);
    let base = if base.is_empty() { "ephemera" } else { base };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{base}-{}", &suffix[..8])
}

fn join_logs(partial: &str, message: &str) -> String {
    if partial.trim().is_empty() {
        message.to_owned()
    } else {
        format!("{}\n{message}", partial.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::mock::{MockDockerClient, WaitBehavior};
    use ephemera_core::types::ErrorKind;

    fn job(image: &ImageRef, timeout_secs: u64) -> ContainerJob<'_> {
        ContainerJob {
            phase: PhaseName::Unit,
            image,
            timeout: Duration::from_secs(timeout_secs),
            completion_marker: None,
        }
    }

    #[test]
    fn container_name_is_sanitised_and_unique() {
        let a = container_name("registry.local/app:latest");
        let b = container_name("registry.local/app:latest");
        assert!(a.starts_with("registry.local-app-latest-"));
        assert_ne!(a, b);
        assert_eq!(a.len(), "registry.local-app-latest-".len() + 8);
    }

    #[test]
    fn container_name_never_starts_with_separator() {
        assert!(container_name("/x").starts_with("x-"));
        assert!(container_name("::").starts_with("ephemera-"));
    }

    #[tokio::test]
    async fn exit_zero_passes_and_removes() {
        let docker = Arc::new(MockDockerClient::new().with_logs("Unit tests completed\n"));
        let runner = EphemeralContainerRunner::new(Arc::clone(&docker), "run1");
        let image = ImageRef::new("myephemeral-test");

        let result = runner.run(&job(&image, 60), &CancellationToken::new()).await;
        assert!(result.success);
        assert!(result.logs.contains("Unit tests completed"));
        assert_eq!(docker.live_count(), 0);
    }

    #[tokio::test]
    async fn nonzero_exit_fails() {
        let docker = Arc::new(
            MockDockerClient::new()
                .with_logs("Unit tests completed")
                .with_wait(WaitBehavior::Exit(1)),
        );
        let runner = EphemeralContainerRunner::new(Arc::clone(&docker), "run1");
        let image = ImageRef::new("myephemeral-test");

        let result = runner.run(&job(&image, 60), &CancellationToken::new()).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Execution));
        assert_eq!(docker.live_count(), 0);
    }

    #[tokio::test]
    async fn completion_marker_is_checked_when_configured() {
        let docker = Arc::new(MockDockerClient::new().with_logs("1 FAILED\nUnit tests completed"));
        let runner = EphemeralContainerRunner::new(docker, "run1");
        let image = ImageRef::new("t");
        let mut j = job(&image, 60);
        j.completion_marker = Some("Unit tests completed");

        let result = runner.run(&j, &CancellationToken::new()).await;
        assert!(!result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_stops_and_removes() {
        let docker = Arc::new(MockDockerClient::new().with_wait(WaitBehavior::Hang));
        let runner = EphemeralContainerRunner::new(Arc::clone(&docker), "run1");
        let image = ImageRef::new("t");

        let result = runner.run(&job(&image, 5), &CancellationToken::new()).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
        assert!(result.logs.contains("timed out"));

        let calls = docker.calls();
        assert!(calls.iter().any(|c| c.starts_with("stop ")));
        assert!(calls.last().is_some_and(|c| c.starts_with("remove ")));
        assert_eq!(docker.live_count(), 0);
    }

    #[tokio::test]
    async fn cancellation_skips_stop_but_still_removes() {
        let docker = Arc::new(MockDockerClient::new().with_wait(WaitBehavior::Hang));
        let runner = EphemeralContainerRunner::new(Arc::clone(&docker), "run1");
        let image = ImageRef::new("t");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = runner.run(&job(&image, 600), &cancel).await;
        assert!(!result.success);
        assert!(result.logs.contains("interrupted"));
        assert!(!docker.calls().iter().any(|c| c.starts_with("stop ")));
        assert_eq!(docker.live_count(), 0);
    }

    #[tokio::test]
    async fn name_conflict_is_startup_failure() {
        let docker = Arc::new(MockDockerClient::new().with_name_conflict());
        let runner = EphemeralContainerRunner::new(docker, "run1");
        let image = ImageRef::new("t");

        let result = runner.run(&job(&image, 60), &CancellationToken::new()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::Startup));
    }

    #[tokio::test]
    async fn removal_failure_is_warning_only() {
        let docker = Arc::new(MockDockerClient::new().with_failing_remove());
        let runner = EphemeralContainerRunner::new(docker, "run1");
        let image = ImageRef::new("t");

        let result = runner.run(&job(&image, 60), &CancellationToken::new()).await;
        assert!(result.success);
        assert_eq!(result.warnings.len(), 1);
    }

    #[tokio::test]
    async fn teardown_twice_is_noop() {
        let docker = Arc::new(MockDockerClient::new());
        let runner = EphemeralContainerRunner::new(Arc::clone(&docker), "run1");
        let image = ImageRef::new("t");
        let spec = runner.container_spec(&job(&image, 60));
        let id = docker.create_container(&spec).await.unwrap();

        assert!(runner.teardown(&id).await.is_none());
        assert!(runner.teardown(&id).await.is_none());
    }

    #[tokio::test]
    async fn workload_env_and_labels_are_set() {
        let runner = EphemeralContainerRunner::new(Arc::new(MockDockerClient::new()), "abcd1234")
            .with_env(vec![("POSTGRES_HOST".to_owned(), "postgres".to_owned())]);
        let image = ImageRef::new("t");
        let spec = runner.container_spec(&job(&image, 60));
        assert_eq!(spec.env, vec!["POSTGRES_HOST=postgres".to_owned()]);
        assert_eq!(spec.labels.get(RUN_LABEL).map(String::as_str), Some("abcd1234"));
        assert_eq!(spec.labels.get(PHASE_LABEL).map(String::as_str), Some("unit"));
    }

    #[tokio::test]
    async fn live_containers_is_empty_after_run() {
        let docker = Arc::new(MockDockerClient::new());
        let runner = EphemeralContainerRunner::new(docker, "run-x");
        let image = ImageRef::new("t");
        runner.run(&job(&image, 60), &CancellationToken::new()).await;
        assert!(runner.live_containers().await.unwrap().is_empty());
    }
}
