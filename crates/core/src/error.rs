//! 에러 타입 — 도메인별 에러 정의

use crate::types::ErrorKind;

/// ephemera 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum EphemeraError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 페이즈 실행 에러
    #[error("run error: {0}")]
    Run(#[from] RunError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 페이즈 실행 에러
///
/// 백엔드(단일 컨테이너 API / 멀티 서비스 CLI)와 무관하게
/// 동일한 분류 태그를 갖습니다. [`RunError::kind`] 참고.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 이미지 빌드 실패
    #[error("build failed: {0}")]
    Build(String),

    /// 컨테이너/클러스터 기동 실패
    #[error("startup failed: {0}")]
    Startup(String),

    /// 대기 시간 초과 또는 취소
    #[error("timed out: {0}")]
    Timeout(String),

    /// 워크로드 실행 실패
    #[error("execution failed: {0}")]
    Execution(String),

    /// 정리 단계 실패 (경고로만 취급)
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

impl RunError {
    /// 에러 분류 태그를 반환합니다.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Build(_) => ErrorKind::Build,
            Self::Startup(_) => ErrorKind::Startup,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Cleanup(_) => ErrorKind::Cleanup,
        }
    }
}
