//! 페이즈 정의 — 설정에서 한 번 만들어지고 실행 중에는 바뀌지 않습니다.

use std::fmt;
use std::time::Duration;

use ephemera_core::config::EphemeraConfig;
use ephemera_core::types::{ErrorKind, ExecutionResult, PhaseName};

use crate::builder::BuildSpec;
use crate::cluster::{ClusterTimeouts, ComposeSpec};

/// 페이즈가 사용하는 러너와 그 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseWorkload {
    /// 이미지 빌드 후 임시 컨테이너 하나 실행
    Container {
        /// 빌드 명세
        build: BuildSpec,
        /// 빌드 제한 시간
        build_timeout: Duration,
        /// 선택적 완료 마커
        completion_marker: Option<String>,
    },
    /// compose 클러스터 기동 후 서비스 로그로 판정
    Cluster {
        /// 클러스터 정의
        compose: ComposeSpec,
        /// 완료 마커
        completion_marker: String,
        /// 기동/준비/정리 제한 시간 (`logs`는 [`Phase::timeout`]과 같음)
        timeouts: ClusterTimeouts,
    },
}

/// 테스트 페이즈
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    /// 페이즈 이름
    pub name: PhaseName,
    /// 워크로드 대기 제한 시간
    pub timeout: Duration,
    /// 러너 선택
    pub workload: PhaseWorkload,
}

impl Phase {
    /// 설정에서 이름에 해당하는 페이즈를 만듭니다.
    ///
    /// 클러스터 프로젝트 이름이 설정되지 않았으면 `ephemera-<phase>-<run_id>`를 사용합니다.
    pub fn from_config(name: PhaseName, config: &EphemeraConfig, run_id: &str) -> Self {
        match name {
            PhaseName::Unit => {
                let unit = &config.unit;
                Self {
                    name,
                    timeout: Duration::from_secs(unit.timeout_secs),
                    workload: PhaseWorkload::Container {
                        build: BuildSpec {
                            dockerfile: unit.dockerfile.clone(),
                            context: unit.context.clone(),
                            tag: unit.tag.clone(),
                        },
                        build_timeout: Duration::from_secs(unit.build_timeout_secs),
                        completion_marker: unit.completion_marker.clone(),
                    },
                }
            }
            PhaseName::Integration | PhaseName::Browser => {
                let cluster = if name == PhaseName::Integration {
                    &config.integration
                } else {
                    &config.browser
                };
                let timeout = Duration::from_secs(cluster.timeout_secs);
                let project = cluster
                    .project
                    .clone()
                    .unwrap_or_else(|| format!("ephemera-{name}-{run_id}"));
                Self {
                    name,
                    timeout,
                    workload: PhaseWorkload::Cluster {
                        compose: ComposeSpec {
                            compose_file: cluster.compose_file.clone(),
                            project,
                            service: cluster.service.clone(),
                            env: config.workload.env_pairs(),
                        },
                        completion_marker: cluster.completion_marker.clone(),
                        timeouts: ClusterTimeouts {
                            up: Duration::from_secs(cluster.up_timeout_secs),
                            readiness_delay: Duration::from_secs(cluster.readiness_delay_secs),
                            logs: timeout,
                            ..ClusterTimeouts::default()
                        },
                    },
                }
            }
        }
    }

    /// 고정 순서(unit → integration → browser)의 전체 페이즈 목록
    pub fn all_from_config(config: &EphemeraConfig, run_id: &str) -> Vec<Self> {
        PhaseName::ALL
            .iter()
            .map(|name| Self::from_config(*name, config, run_id))
            .collect()
    }

    /// 이미지 빌드 단계가 있는지 여부
    pub fn builds_image(&self) -> bool {
        matches!(self.workload, PhaseWorkload::Container { .. })
    }
}

/// 페이즈 상태
///
/// `Pending → Building(컨테이너만) → Running → {Completed | TimedOut | Errored} → TornDown → Reported`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    /// 시작 전
    Pending,
    /// 이미지 빌드 중
    Building,
    /// 워크로드 실행 중
    Running,
    /// 워크로드가 판정을 냄 (통과/실패 무관)
    Completed,
    /// 제한 시간 초과 또는 취소
    TimedOut,
    /// 빌드/기동/백엔드 오류
    Errored,
    /// 리소스 정리 완료
    TornDown,
    /// 리포트에 기록됨
    Reported,
}

impl PhaseState {
    /// 실행 결과로부터 종료 상태를 결정합니다.
    pub fn terminal_for(result: &ExecutionResult) -> Self {
        match result.error_kind {
            None | Some(ErrorKind::Execution) => Self::Completed,
            Some(ErrorKind::Timeout) => Self::TimedOut,
            Some(ErrorKind::Build | ErrorKind::Startup | ErrorKind::Cleanup) => Self::Errored,
        }
    }

    /// 로그용 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::Errored => "errored",
            Self::TornDown => "torn_down",
            Self::Reported => "reported",
        }
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_yields_three_phases_in_order() {
        let config = EphemeraConfig::default();
        let phases = Phase::all_from_config(&config, "abcd1234");
        let names: Vec<_> = phases.iter().map(|p| p.name).collect();
        assert_eq!(names, PhaseName::ALL.to_vec());
        assert!(phases[0].builds_image());
        assert!(!phases[1].builds_image());
    }

    #[test]
    fn generated_project_name_includes_phase_and_run() {
        let config = EphemeraConfig::default();
        let phase = Phase::from_config(PhaseName::Browser, &config, "abcd1234");
        match phase.workload {
            PhaseWorkload::Cluster {
                compose, timeouts, ..
            } => {
                assert_eq!(compose.project, "ephemera-browser-abcd1234");
                assert_eq!(compose.service, "selenium-tests");
                assert_eq!(timeouts.readiness_delay, Duration::from_secs(15));
                assert_eq!(timeouts.logs, phase.timeout);
            }
            PhaseWorkload::Container { .. } => panic!("browser must be a cluster phase"),
        }
    }

    #[test]
    fn configured_project_name_wins() {
        let mut config = EphemeraConfig::default();
        config.integration.project = Some("ci-integration".to_owned());
        let phase = Phase::from_config(PhaseName::Integration, &config, "abcd1234");
        match phase.workload {
            PhaseWorkload::Cluster { compose, .. } => assert_eq!(compose.project, "ci-integration"),
            PhaseWorkload::Container { .. } => panic!("integration must be a cluster phase"),
        }
    }

    #[test]
    fn unit_phase_uses_build_spec() {
        let config = EphemeraConfig::default();
        let phase = Phase::from_config(PhaseName::Unit, &config, "r");
        assert_eq!(phase.timeout, Duration::from_secs(600));
        match phase.workload {
            PhaseWorkload::Container { build, .. } => {
                assert_eq!(build.tag, "myephemeral-test");
                assert_eq!(build.dockerfile, "dockerfile.unit_test");
            }
            PhaseWorkload::Cluster { .. } => panic!("unit must be a container phase"),
        }
    }

    #[test]
    fn terminal_state_follows_error_kind() {
        assert_eq!(
            PhaseState::terminal_for(&ExecutionResult::passed("")),
            PhaseState::Completed
        );
        assert_eq!(
            PhaseState::terminal_for(&ExecutionResult::failed("FAILED")),
            PhaseState::Completed
        );
        assert_eq!(
            PhaseState::terminal_for(&ExecutionResult::failed_with(ErrorKind::Timeout, "")),
            PhaseState::TimedOut
        );
        assert_eq!(
            PhaseState::terminal_for(&ExecutionResult::failed_with(ErrorKind::Startup, "")),
            PhaseState::Errored
        );
    }
}
