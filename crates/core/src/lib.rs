#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;
pub mod verdict;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, EphemeraError, RunError};

// 설정
pub use config::{
    ClusterPhaseConfig, ContainerPhaseConfig, DockerConfig, EphemeraConfig, GeneralConfig,
    WorkloadConfig,
};

// 도메인 타입
pub use types::{ErrorKind, ExecutionResult, PhaseName, PhaseOutcome, RunReport};

// 판정
pub use verdict::{MarkerVerdict, VerdictExtractor};
