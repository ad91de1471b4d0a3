//! Docker API abstraction for the ephemeral container path.
//!
//! The [`DockerClient`] trait covers only the container lifecycle calls the
//! runner needs (create, start, wait, logs, stop, remove, list). Production code
//! uses [`BollardDockerClient`]; tests use `MockDockerClient`.
//!
//! ```text
//! ┌──────────────────────────┐
//! │ EphemeralContainerRunner │
//! └────────────┬─────────────┘
//!              ▼
//!       ┌─────────────┐
//!       │DockerClient │ (trait)
//!       └─────────────┘
//!          │       │
//!          ▼       ▼
//!     ┌───────┐ ┌────┐
//!     │Bollard│ │Mock│
//!     └───┬───┘ └────┘
//!         ▼
//!    Docker Daemon
//! ```
//!
//! # Error mapping
//!
//! - **404**: `RunnerError::ContainerNotFound`
//! - **409** on create: `RunnerError::NameConflict`
//! - **304** on stop (already stopped): treated as success
//! - connection failures: `RunnerError::DockerConnection`

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::error::RunnerError;

/// Label carrying the run identifier on every container this crate creates.
pub const RUN_LABEL: &str = "ephemera.run";

/// Label carrying the phase name.
pub const PHASE_LABEL: &str = "ephemera.phase";

/// Everything needed to create one ephemeral container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Unique container name
    pub name: String,
    /// Image reference (tag)
    pub image: String,
    /// `KEY=VALUE` environment entries
    pub env: Vec<String>,
    /// Identity labels
    pub labels: HashMap<String, String>,
}

/// Summary of a container as reported by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Container ID
    pub id: String,
    /// Container name without the leading slash
    pub name: String,
    /// Image reference
    pub image: String,
    /// Daemon state string (`created`, `running`, `exited`, ...)
    pub state: String,
}

/// Trait abstracting the Docker API operations used by the runner.
///
/// `Send + Sync + 'static` so a client can be shared through `Arc` across
/// the phases of one run.
pub trait DockerClient: Send + Sync + 'static {
    /// Creates a container and returns its ID.
    ///
    /// # Errors
    ///
    /// - `RunnerError::NameConflict`: a container with the same name exists (409)
    /// - `RunnerError::Startup`: any other create failure
    fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> impl Future<Output = Result<String, RunnerError>> + Send;

    /// Starts a created container.
    fn start_container(&self, id: &str) -> impl Future<Output = Result<(), RunnerError>> + Send;

    /// Waits until the container is no longer running and returns its exit code.
    ///
    /// Unbounded. Callers wrap it in [`crate::wait::bounded`].
    fn wait_container(&self, id: &str) -> impl Future<Output = Result<i64, RunnerError>> + Send;

    /// Returns the combined stdout/stderr captured so far.
    fn container_logs(&self, id: &str)
    -> impl Future<Output = Result<String, RunnerError>> + Send;

    /// Stops a container, sending SIGKILL after `grace`.
    fn stop_container(
        &self,
        id: &str,
        grace: Duration,
    ) -> impl Future<Output = Result<(), RunnerError>> + Send;

    /// Force-removes a container together with its anonymous volumes.
    ///
    /// # Errors
    ///
    /// - `RunnerError::ContainerNotFound`: already gone (404)
    fn remove_container(&self, id: &str) -> impl Future<Output = Result<(), RunnerError>> + Send;

    /// Lists containers (any state) carrying the label `key=value`.
    fn list_containers(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> impl Future<Output = Result<Vec<ContainerInfo>, RunnerError>> + Send;

    /// Checks Docker daemon connectivity.
    fn ping(&self) -> impl Future<Output = Result<(), RunnerError>> + Send;
}

/// Production Docker client implementation using `bollard`.
///
/// Internally uses `Arc<bollard::Docker>` so clones share one connection pool.
#[derive(Clone)]
pub struct BollardDockerClient {
    docker: Arc<bollard::Docker>,
}

impl BollardDockerClient {
    /// Connects to Docker using the platform's local defaults
    /// (`DOCKER_HOST` or the default unix socket).
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::DockerConnection` if the connection cannot be set up.
    pub fn connect_local() -> Result<Self, RunnerError> {
        let docker = bollard::Docker::connect_with_local_defaults().map_err(|e| {
            RunnerError::DockerConnection(format!("failed to connect to docker: {e}"))
        })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to Docker using a specific socket path.
    pub fn connect_with_socket(socket_path: &str) -> Result<Self, RunnerError> {
        let docker =
            bollard::Docker::connect_with_socket(socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| {
                    RunnerError::DockerConnection(format!(
                        "failed to connect to docker at {socket_path}: {e}"
                    ))
                })?;
        Ok(Self {
            docker: Arc::new(docker),
        })
    }

    /// Connects to `socket` when non-empty, otherwise to the local defaults.
    pub fn connect(socket: &str) -> Result<Self, RunnerError> {
        if socket.is_empty() {
            Self::connect_local()
        } else {
            Self::connect_with_socket(socket)
        }
    }
}

fn status_code(err: &bollard::errors::Error) -> Option<u16> {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            Some(*status_code)
        }
        _ => None,
    }
}

impl DockerClient for BollardDockerClient {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RunnerError> {
        use bollard::container::{Config, CreateContainerOptions};

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| match status_code(&e) {
                Some(409) => RunnerError::NameConflict(spec.name.clone()),
                _ => RunnerError::Startup {
                    target: spec.name.clone(),
                    reason: format!("create failed: {e}"),
                },
            })?;

        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, warning = %warning, "docker create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RunnerError> {
        use bollard::container::StartContainerOptions;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RunnerError::Startup {
                target: id.to_owned(),
                reason: format!("start failed: {e}"),
            })
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RunnerError> {
        use bollard::container::WaitContainerOptions;

        let options = WaitContainerOptions {
            condition: "not-running",
        };
        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports non-zero exits as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) if status_code(&e) == Some(404) => {
                Err(RunnerError::ContainerNotFound(id.to_owned()))
            }
            Some(Err(e)) => Err(RunnerError::DockerApi(format!("wait failed: {e}"))),
            None => Err(RunnerError::DockerApi(
                "wait stream ended without a status".to_owned(),
            )),
        }
    }

    async fn container_logs(&self, id: &str) -> Result<String, RunnerError> {
        use bollard::container::LogsOptions;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));

        let mut logs = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| match status_code(&e) {
                Some(404) => RunnerError::ContainerNotFound(id.to_owned()),
                _ => RunnerError::DockerApi(format!("logs failed: {e}")),
            })?;
            logs.push_str(&chunk.to_string());
        }
        Ok(logs)
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), RunnerError> {
        use bollard::container::StopContainerOptions;

        let t = i64::try_from(grace.as_secs()).unwrap_or(i64::MAX);
        match self
            .docker
            .stop_container(id, Some(StopContainerOptions { t }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => match status_code(&e) {
                Some(304) => Ok(()),
                Some(404) => Err(RunnerError::ContainerNotFound(id.to_owned())),
                _ => Err(RunnerError::Cleanup {
                    target: id.to_owned(),
                    reason: format!("stop failed: {e}"),
                }),
            },
        }
    }

    async fn remove_container(&self, id: &str) -> Result<(), RunnerError> {
        use bollard::container::RemoveContainerOptions;

        let options = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| match status_code(&e) {
                Some(404) => RunnerError::ContainerNotFound(id.to_owned()),
                _ => RunnerError::Cleanup {
                    target: id.to_owned(),
                    reason: format!("remove failed: {e}"),
                },
            })
    }

    async fn list_containers(
        &self,
        label_key: &str,
        label_value: &str,
    ) -> Result<Vec<ContainerInfo>, RunnerError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        filters.insert(
            "label".to_owned(),
            vec![format!("{label_key}={label_value}")],
        );
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| RunnerError::DockerApi(format!("list containers failed: {e}")))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_owned())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), RunnerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| RunnerError::DockerConnection(format!("ping failed: {e}")))?;
        Ok(())
    }
}

/// 테스트용 Mock Docker 클라이언트
///
/// 생성된 컨테이너를 메모리에 보관하고 모든 호출을 기록합니다.
#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// 컨테이너 종료 동작
    #[derive(Debug, Clone)]
    pub enum WaitBehavior {
        /// 즉시 종료 코드 반환
        Exit(i64),
        /// 지정 시간 후 종료 코드 반환
        ExitAfter(Duration, i64),
        /// 종료하지 않음
        Hang,
    }

    /// 테스트용 Mock Docker 클라이언트
    pub struct MockDockerClient {
        /// 컨테이너 로그
        pub logs: String,
        /// wait 동작
        pub wait: WaitBehavior,
        /// create 시 이름 충돌 시뮬레이션
        pub conflict_on_create: bool,
        /// remove 실패 시뮬레이션
        pub fail_remove: bool,
        live: Mutex<Vec<ContainerInfo>>,
        labels: Mutex<HashMap<String, HashMap<String, String>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Default for MockDockerClient {
        fn default() -> Self {
            Self {
                logs: String::new(),
                wait: WaitBehavior::Exit(0),
                conflict_on_create: false,
                fail_remove: false,
                live: Mutex::new(Vec::new()),
                labels: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl MockDockerClient {
        /// 기본 mock (exit 0, 로그 없음)
        pub fn new() -> Self {
            Self::default()
        }

        /// 컨테이너 로그를 설정합니다.
        pub fn with_logs(mut self, logs: &str) -> Self {
            self.logs = logs.to_owned();
            self
        }

        /// wait 동작을 설정합니다.
        pub fn with_wait(mut self, wait: WaitBehavior) -> Self {
            self.wait = wait;
            self
        }

        /// create 시 409를 반환하도록 설정합니다.
        pub fn with_name_conflict(mut self) -> Self {
            self.conflict_on_create = true;
            self
        }

        /// remove가 실패하도록 설정합니다.
        pub fn with_failing_remove(mut self) -> Self {
            self.fail_remove = true;
            self
        }

        /// 기록된 호출 목록
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// 현재 살아 있는 컨테이너 수
        pub fn live_count(&self) -> usize {
            self.live.lock().map(|l| l.len()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    impl DockerClient for MockDockerClient {
        async fn create_container(&self, spec: &ContainerSpec) -> Result<String, RunnerError> {
            self.record(format!("create {}", spec.name));
            if self.conflict_on_create {
                return Err(RunnerError::NameConflict(spec.name.clone()));
            }
            let id = format!("id-{}", spec.name);
            if let Ok(mut live) = self.live.lock() {
                live.push(ContainerInfo {
                    id: id.clone(),
                    name: spec.name.clone(),
                    image: spec.image.clone(),
                    state: "created".to_owned(),
                });
            }
            if let Ok(mut labels) = self.labels.lock() {
                labels.insert(id.clone(), spec.labels.clone());
            }
            Ok(id)
        }

        async fn start_container(&self, id: &str) -> Result<(), RunnerError> {
            self.record(format!("start {id}"));
            Ok(())
        }

        async fn wait_container(&self, id: &str) -> Result<i64, RunnerError> {
            self.record(format!("wait {id}"));
            match self.wait {
                WaitBehavior::Exit(code) => Ok(code),
                WaitBehavior::ExitAfter(delay, code) => {
                    tokio::time::sleep(delay).await;
                    Ok(code)
                }
                WaitBehavior::Hang => {
                    std::future::pending::<()>().await;
                    Ok(-1)
                }
            }
        }

        async fn container_logs(&self, id: &str) -> Result<String, RunnerError> {
            self.record(format!("logs {id}"));
            Ok(self.logs.clone())
        }

        async fn stop_container(&self, id: &str, _grace: Duration) -> Result<(), RunnerError> {
            self.record(format!("stop {id}"));
            Ok(())
        }

        async fn remove_container(&self, id: &str) -> Result<(), RunnerError> {
            self.record(format!("remove {id}"));
            if self.fail_remove {
                return Err(RunnerError::Cleanup {
                    target: id.to_owned(),
                    reason: "mock failure".to_owned(),
                });
            }
            let mut live = self
                .live
                .lock()
                .map_err(|_| RunnerError::DockerApi("lock poisoned".to_owned()))?;
            let before = live.len();
            live.retain(|c| c.id != id);
            if live.len() == before {
                return Err(RunnerError::ContainerNotFound(id.to_owned()));
            }
            Ok(())
        }

        async fn list_containers(
            &self,
            label_key: &str,
            label_value: &str,
        ) -> Result<Vec<ContainerInfo>, RunnerError> {
            let live = self.live.lock().map(|l| l.clone()).unwrap_or_default();
            let labels = self.labels.lock().map(|l| l.clone()).unwrap_or_default();
            Ok(live
                .into_iter()
                .filter(|c| {
                    labels
                        .get(&c.id)
                        .and_then(|l| l.get(label_key))
                        .is_some_and(|v| v == label_value)
                })
                .collect())
        }

        async fn ping(&self) -> Result<(), RunnerError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockDockerClient, WaitBehavior};
    use super::*;

    fn spec(name: &str, run: &str) -> ContainerSpec {
        let mut labels = HashMap::new();
        labels.insert(RUN_LABEL.to_owned(), run.to_owned());
        ContainerSpec {
            name: name.to_owned(),
            image: "myephemeral-test".to_owned(),
            env: vec!["POSTGRES_HOST=postgres".to_owned()],
            labels,
        }
    }

    #[tokio::test]
    async fn mock_create_then_remove_clears_live_set() {
        let client = MockDockerClient::new();
        let id = client.create_container(&spec("a", "run1")).await.unwrap();
        assert_eq!(client.live_count(), 1);
        client.remove_container(&id).await.unwrap();
        assert_eq!(client.live_count(), 0);
    }

    #[tokio::test]
    async fn mock_second_remove_is_not_found() {
        let client = MockDockerClient::new();
        let id = client.create_container(&spec("a", "run1")).await.unwrap();
        client.remove_container(&id).await.unwrap();
        let err = client.remove_container(&id).await.unwrap_err();
        assert!(matches!(err, RunnerError::ContainerNotFound(_)));
    }

    #[tokio::test]
    async fn mock_list_filters_by_label() {
        let client = MockDockerClient::new();
        client.create_container(&spec("a", "run1")).await.unwrap();
        client.create_container(&spec("b", "run2")).await.unwrap();

        let run1 = client.list_containers(RUN_LABEL, "run1").await.unwrap();
        assert_eq!(run1.len(), 1);
        assert_eq!(run1[0].name, "a");
        assert!(client.list_containers(RUN_LABEL, "run3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mock_name_conflict() {
        let client = MockDockerClient::new().with_name_conflict();
        let err = client.create_container(&spec("a", "r")).await.unwrap_err();
        assert!(matches!(err, RunnerError::NameConflict(_)));
    }

    #[tokio::test]
    async fn mock_wait_returns_configured_exit_code() {
        let client = MockDockerClient::new().with_wait(WaitBehavior::Exit(3));
        assert_eq!(client.wait_container("x").await.unwrap(), 3);
    }

    #[test]
    fn docker_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<MockDockerClient>();
        assert_send_sync::<BollardDockerClient>();
    }
}
