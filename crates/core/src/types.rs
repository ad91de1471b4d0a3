//! 도메인 타입 — 페이즈 이름, 실행 결과, 실행 리포트

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 테스트 페이즈 이름
///
/// 실행 순서는 [`PhaseName::ALL`]에 정의된 순서(unit → integration → browser)를 따릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseName {
    /// 단위 테스트 (단일 임시 컨테이너)
    Unit,
    /// 통합 테스트 (멀티 서비스 클러스터)
    Integration,
    /// 브라우저 테스트 (멀티 서비스 클러스터)
    Browser,
}

impl PhaseName {
    /// 전체 실행 시 사용되는 고정 순서
    pub const ALL: [PhaseName; 3] = [Self::Unit, Self::Integration, Self::Browser];

    /// 메트릭/로그 레이블용 고정 문자열
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unit => "unit",
            Self::Integration => "integration",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseName {
    type Err = String;

    /// 대소문자를 구분하지 않습니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unit" => Ok(Self::Unit),
            "integration" => Ok(Self::Integration),
            "browser" => Ok(Self::Browser),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// 실패 분류 태그
///
/// 페이즈 수준 코드는 백엔드별 에러 타입 대신 이 태그만 확인합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// 이미지 빌드 실패 — 실행 시도 없음
    Build,
    /// 서비스 기동 실패 — 로그 대기 시도 없음
    Startup,
    /// 제한 시간 초과 또는 취소 — 정리는 수행됨
    Timeout,
    /// 워크로드가 실패 판정을 냄
    Execution,
    /// 정리 실패 — 경고로만 기록
    Cleanup,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Build => "build",
            Self::Startup => "startup",
            Self::Timeout => "timeout",
            Self::Execution => "execution",
            Self::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// 러너 호출 한 번의 결과
///
/// `logs`는 사람이 읽는 출력과 판정 마커를 함께 담는 유일한 채널입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// 통과 여부
    pub success: bool,
    /// 캡처된 워크로드 출력 (또는 진단 메시지)
    pub logs: String,
    /// 실패 분류 (성공 시 `None`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// 정리 단계 경고 — `success`에 영향을 주지 않음
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    /// 성공 결과를 생성합니다.
    pub fn passed(logs: impl Into<String>) -> Self {
        Self {
            success: true,
            logs: logs.into(),
            error_kind: None,
            warnings: Vec::new(),
        }
    }

    /// 워크로드 실패 결과를 생성합니다.
    pub fn failed(logs: impl Into<String>) -> Self {
        Self::failed_with(ErrorKind::Execution, logs)
    }

    /// 분류 태그와 함께 실패 결과를 생성합니다.
    pub fn failed_with(kind: ErrorKind, logs: impl Into<String>) -> Self {
        Self {
            success: false,
            logs: logs.into(),
            error_kind: Some(kind),
            warnings: Vec::new(),
        }
    }

    /// 판정값으로부터 결과를 생성합니다.
    pub fn from_verdict(success: bool, logs: impl Into<String>) -> Self {
        if success {
            Self::passed(logs)
        } else {
            Self::failed(logs)
        }
    }

    /// 정리 경고를 추가합니다. 판정은 바뀌지 않습니다.
    pub fn push_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }
}

/// 리포트의 한 항목
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// 페이즈 이름
    pub phase: PhaseName,
    /// 실행 결과
    pub result: ExecutionResult,
    /// 소요 시간 (밀리초)
    pub duration_ms: u64,
}

/// 전체 실행 리포트
///
/// `PhaseSequencer`가 단독으로 소유하며 순서대로 항목을 추가합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    entries: Vec<PhaseOutcome>,
    interrupted: bool,
}

impl RunReport {
    /// 빈 리포트를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 페이즈 결과를 추가합니다.
    pub fn push(&mut self, phase: PhaseName, result: ExecutionResult, duration: Duration) {
        self.entries.push(PhaseOutcome {
            phase,
            result,
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        });
    }

    /// 취소로 인해 일부 페이즈가 실행되지 않았음을 표시합니다.
    pub fn mark_interrupted(&mut self) {
        self.interrupted = true;
    }

    /// 취소 여부
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// 모든 항목의 논리곱
    pub fn success(&self) -> bool {
        self.entries.iter().all(|e| e.result.success)
    }

    /// 항목 목록 (실행 순서)
    pub fn entries(&self) -> &[PhaseOutcome] {
        &self.entries
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 항목이 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 실패한 페이즈 이름 목록
    pub fn failed_phases(&self) -> Vec<PhaseName> {
        self.entries
            .iter()
            .filter(|e| !e.result.success)
            .map(|e| e.phase)
            .collect()
    }
}
