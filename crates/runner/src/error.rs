//! 러너 에러 타입
//!
//! [`RunnerError`]는 러너 내부에서 발생하는 모든 에러를 표현합니다.
//! [`RunnerError::kind`]로 백엔드와 무관한 분류 태그를 얻을 수 있고,
//! `From<RunnerError> for EphemeraError` 변환으로 상위 레이어에 전파됩니다.

use std::time::Duration;

use ephemera_core::error::{EphemeraError, RunError};
use ephemera_core::types::ErrorKind;

/// 러너 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// 이미지 빌드 실패
    #[error("image build failed for '{tag}': {reason}")]
    Build {
        /// 빌드 대상 태그
        tag: String,
        /// 백엔드 진단 메시지
        reason: String,
    },

    /// 컨테이너/클러스터 기동 실패
    #[error("startup failed for '{target}': {reason}")]
    Startup {
        /// 컨테이너 이름 또는 compose 프로젝트
        target: String,
        /// 실패 사유 (stderr 포함)
        reason: String,
    },

    /// 이전 인스턴스가 같은 이름을 사용 중
    #[error("container name '{0}' is already in use")]
    NameConflict(String),

    /// 제한 시간 초과
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// 대기 중이던 작업
        operation: String,
        /// 설정된 제한 시간
        timeout: Duration,
    },

    /// 취소 요청으로 대기 중단
    #[error("{operation} interrupted by cancellation")]
    Cancelled {
        /// 대기 중이던 작업
        operation: String,
    },

    /// 워크로드 실행 실패
    #[error("execution failed: {0}")]
    Execution(String),

    /// 정리 실패
    #[error("cleanup failed for '{target}': {reason}")]
    Cleanup {
        /// 정리 대상
        target: String,
        /// 실패 사유
        reason: String,
    },

    /// 컨테이너를 찾을 수 없음
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Docker API 호출 실패
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Docker 소켓 연결 실패
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// 설정 오류
    #[error("config error: {field}: {reason}")]
    Config {
        /// 필드 이름
        field: String,
        /// 사유
        reason: String,
    },

    /// 외부 명령 실행 불가
    #[error("failed to launch '{program}': {reason}")]
    Spawn {
        /// 실행 파일 이름
        program: String,
        /// 실패 사유
        reason: String,
    },
}

impl RunnerError {
    /// 백엔드와 무관한 분류 태그를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build { .. } => ErrorKind::Build,
            Self::Startup { .. } | Self::NameConflict(_) => ErrorKind::Startup,
            Self::Timeout { .. } | Self::Cancelled { .. } => ErrorKind::Timeout,
            Self::Cleanup { .. } => ErrorKind::Cleanup,
            Self::Execution(_)
            | Self::ContainerNotFound(_)
            | Self::DockerApi(_)
            | Self::DockerConnection(_)
            | Self::Config { .. }
            | Self::Spawn { .. } => ErrorKind::Execution,
        }
    }

    /// 취소로 인한 중단인지 여부
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<RunnerError> for EphemeraError {
    fn from(err: RunnerError) -> Self {
        let msg = err.to_string();
        let run = match err.kind() {
            ErrorKind::Build => RunError::Build(msg),
            ErrorKind::Startup => RunError::Startup(msg),
            ErrorKind::Timeout => RunError::Timeout(msg),
            ErrorKind::Execution => RunError::Execution(msg),
            ErrorKind::Cleanup => RunError::Cleanup(msg),
        };
        EphemeraError::Run(run)
    }
}
