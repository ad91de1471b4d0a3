//! 페이즈 순차 실행기
//!
//! 주어진 순서대로 페이즈를 하나씩 실행하고 결과를 [`RunReport`]에 누적합니다.
//! 실패한 페이즈가 있어도 멈추지 않습니다. 취소가 요청되면 진행 중인 페이즈는
//! 정리까지 마친 뒤 기록되고, 이후 페이즈는 시작하지 않습니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use ephemera_core::config::EphemeraConfig;
use ephemera_core::metrics as m;
use ephemera_core::types::{ExecutionResult, PhaseName, RunReport};
use ephemera_core::verdict::{MarkerVerdict, VerdictExtractor};

use crate::builder::ImageBuilder;
use crate::cluster::ClusterRunner;
use crate::command::CommandExecutor;
use crate::container::{ContainerJob, EphemeralContainerRunner};
use crate::docker::DockerClient;
use crate::error::RunnerError;
use crate::phase::{Phase, PhaseState, PhaseWorkload};

/// 새 실행 ID (8자리 hex)
pub fn new_run_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_owned()
}

/// 페이즈 순차 실행기
///
/// [`PhaseSequencerBuilder`]로 생성합니다.
pub struct PhaseSequencer<D: DockerClient, E: CommandExecutor> {
    config: EphemeraConfig,
    run_id: String,
    cancel: CancellationToken,
    images: ImageBuilder<E>,
    containers: EphemeralContainerRunner<D>,
    clusters: ClusterRunner<E>,
}

impl<D: DockerClient, E: CommandExecutor> PhaseSequencer<D, E> {
    /// 실행 ID
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// 이 실행의 취소 토큰
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 이름에 해당하는 페이즈를 만듭니다.
    pub fn phase(&self, name: PhaseName) -> Phase {
        Phase::from_config(name, &self.config, &self.run_id)
    }

    /// 이름 목록에 해당하는 페이즈를 만듭니다.
    pub fn phases(&self, names: &[PhaseName]) -> Vec<Phase> {
        names.iter().map(|name| self.phase(*name)).collect()
    }

    /// 고정 순서의 전체 페이즈
    pub fn all_phases(&self) -> Vec<Phase> {
        Phase::all_from_config(&self.config, &self.run_id)
    }

    /// 모든 페이즈를 순서대로 실행합니다.
    ///
    /// 취소되지 않는 한 항목 수는 항상 `phases.len()`과 같습니다.
    pub async fn run_all(&self, phases: &[Phase]) -> RunReport {
        let mut report = RunReport::new();

        for phase in phases {
            if self.cancel.is_cancelled() {
                tracing::warn!(phase = %phase.name, "cancellation requested, skipping remaining phases");
                break;
            }
            let (result, elapsed) = self.execute(phase).await;
            report.push(phase.name, result, elapsed);
            log_state(phase.name, PhaseState::Reported);
        }

        if self.cancel.is_cancelled() {
            report.mark_interrupted();
        }

        tracing::info!(
            run_id = %self.run_id,
            phases = report.len(),
            success = report.success(),
            interrupted = report.is_interrupted(),
            "run finished"
        );
        report
    }

    /// 페이즈 하나만 실행하고 결과를 반환합니다.
    pub async fn run_one(&self, phase: &Phase) -> ExecutionResult {
        let (result, _) = self.execute(phase).await;
        log_state(phase.name, PhaseState::Reported);
        result
    }

    async fn execute(&self, phase: &Phase) -> (ExecutionResult, Duration) {
        let started = Instant::now();
        log_state(phase.name, PhaseState::Pending);
        tracing::info!(phase = %phase.name, timeout_secs = phase.timeout.as_secs(), "phase started");

        let result = match &phase.workload {
            PhaseWorkload::Container {
                build,
                build_timeout,
                completion_marker,
            } => {
                log_state(phase.name, PhaseState::Building);
                match self.images.build(build, *build_timeout, &self.cancel).await {
                    Err(e) => ExecutionResult::failed_with(e.kind(), e.to_string()),
                    Ok(image) => {
                        log_state(phase.name, PhaseState::Running);
                        let job = ContainerJob {
                            phase: phase.name,
                            image: &image,
                            timeout: phase.timeout,
                            completion_marker: completion_marker.as_deref(),
                        };
                        self.containers.run(&job, &self.cancel).await
                    }
                }
            }
            PhaseWorkload::Cluster {
                compose,
                completion_marker,
                timeouts,
            } => {
                log_state(phase.name, PhaseState::Running);
                self.clusters
                    .run(compose, completion_marker, timeouts, &self.cancel)
                    .await
            }
        };

        // 러너는 정리를 마친 뒤에만 반환합니다.
        log_state(phase.name, PhaseState::terminal_for(&result));
        log_state(phase.name, PhaseState::TornDown);

        let elapsed = started.elapsed();
        record_metrics(phase.name, &result, elapsed);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        if result.success {
            tracing::info!(phase = %phase.name, elapsed_ms, "phase passed");
        } else {
            tracing::error!(
                phase = %phase.name,
                kind = ?result.error_kind,
                elapsed_ms,
                "phase failed"
            );
        }
        (result, elapsed)
    }

    /// 이 실행이 만든 리소스 중 아직 남아 있는 것의 식별자 목록
    ///
    /// 정상이라면 모든 페이즈가 끝난 뒤 항상 비어 있어야 합니다.
    pub async fn leftover_resources(&self, phases: &[Phase]) -> Result<Vec<String>, RunnerError> {
        let mut leftovers: Vec<String> = self
            .containers
            .live_containers()
            .await?
            .into_iter()
            .map(|c| format!("container:{}", c.name))
            .collect();

        for phase in phases {
            if let PhaseWorkload::Cluster { compose, .. } = &phase.workload {
                if self.clusters.is_live(compose).await? {
                    leftovers.push(format!("project:{}", compose.project));
                }
            }
        }
        Ok(leftovers)
    }
}

fn log_state(phase: PhaseName, state: PhaseState) {
    tracing::debug!(phase = %phase, state = %state, "phase state");
}

fn record_metrics(phase: PhaseName, result: &ExecutionResult, elapsed: Duration) {
    let outcome = if result.success { "success" } else { "failure" };
    metrics::counter!(m::PHASE_RUNS_TOTAL, m::LABEL_PHASE => phase.as_str(), m::LABEL_RESULT => outcome)
        .increment(1);
    metrics::histogram!(m::PHASE_DURATION_SECONDS, m::LABEL_PHASE => phase.as_str())
        .record(elapsed.as_secs_f64());

    if let Some(kind) = result.error_kind {
        metrics::counter!(m::PHASE_FAILURES_TOTAL, m::LABEL_PHASE => phase.as_str(), m::LABEL_KIND => kind.to_string())
            .increment(1);
    }
    if !result.warnings.is_empty() {
        metrics::counter!(m::TEARDOWN_WARNINGS_TOTAL, m::LABEL_PHASE => phase.as_str())
            .increment(u64::try_from(result.warnings.len()).unwrap_or(u64::MAX));
    }
}

/// [`PhaseSequencer`] 빌더
pub struct PhaseSequencerBuilder<D: DockerClient, E: CommandExecutor> {
    config: EphemeraConfig,
    docker: Option<Arc<D>>,
    executor: Option<Arc<E>>,
    cancel: Option<CancellationToken>,
    run_id: Option<String>,
    verdict: Arc<dyn VerdictExtractor>,
}

impl<D: DockerClient, E: CommandExecutor> PhaseSequencerBuilder<D, E> {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: EphemeraConfig::default(),
            docker: None,
            executor: None,
            cancel: None,
            run_id: None,
            verdict: Arc::new(MarkerVerdict),
        }
    }

    /// 설정을 지정합니다.
    pub fn config(mut self, config: EphemeraConfig) -> Self {
        self.config = config;
        self
    }

    /// Docker 클라이언트를 지정합니다. (필수)
    pub fn docker_client(mut self, docker: Arc<D>) -> Self {
        self.docker = Some(docker);
        self
    }

    /// 명령 실행기를 지정합니다. (필수)
    pub fn executor(mut self, executor: Arc<E>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 외부에서 만든 취소 토큰을 사용합니다.
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 실행 ID를 고정합니다. 지정하지 않으면 새로 생성합니다.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// 판정기를 교체합니다.
    pub fn verdict(mut self, verdict: Arc<dyn VerdictExtractor>) -> Self {
        self.verdict = verdict;
        self
    }

    /// 실행기를 생성합니다.
    ///
    /// # Errors
    ///
    /// - `RunnerError::Config`: 설정 검증 실패 또는 필수 구성 요소 누락
    pub fn build(self) -> Result<PhaseSequencer<D, E>, RunnerError> {
        self.config.validate().map_err(|e| RunnerError::Config {
            field: "config".to_owned(),
            reason: e.to_string(),
        })?;

        let docker = self.docker.ok_or_else(|| RunnerError::Config {
            field: "docker_client".to_owned(),
            reason: "docker client must be provided".to_owned(),
        })?;
        let executor = self.executor.ok_or_else(|| RunnerError::Config {
            field: "executor".to_owned(),
            reason: "command executor must be provided".to_owned(),
        })?;

        let run_id = self.run_id.unwrap_or_else(new_run_id);
        let docker_cfg = &self.config.docker;

        let images = ImageBuilder::new(Arc::clone(&executor), docker_cfg.docker_command.clone());
        let containers = EphemeralContainerRunner::new(docker, run_id.clone())
            .with_env(self.config.workload.env_pairs())
            .with_stop_grace(Duration::from_secs(docker_cfg.stop_grace_secs))
            .with_verdict(Arc::clone(&self.verdict));
        let clusters = ClusterRunner::new(executor, &docker_cfg.compose_command)
            .with_verdict(self.verdict);

        Ok(PhaseSequencer {
            config: self.config,
            run_id,
            cancel: self.cancel.unwrap_or_default(),
            images,
            containers,
            clusters,
        })
    }
}

impl<D: DockerClient, E: CommandExecutor> Default for PhaseSequencerBuilder<D, E> {
    fn default() -> Self {
        Self::new()
    }
}
