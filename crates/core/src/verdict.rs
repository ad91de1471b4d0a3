//! 판정 규칙 — 캡처된 로그 문자열을 통과/실패로 변환
//!
//! 클러스터 경로에는 단일 프로세스 종료 코드가 없기 때문에,
//! 워크로드가 출력하는 고정 마커 문자열로 판정합니다.
//!
//! 우선순위: 실패 마커(`FAILED`)가 있으면 완료 마커가 있어도 실패입니다.
//!
//! ```
//! use ephemera_core::verdict::{MarkerVerdict, VerdictExtractor};
//!
//! let verdict = MarkerVerdict;
//! assert!(verdict.extract("...\nUnit tests completed\n", "Unit tests completed"));
//! assert!(!verdict.extract("FAILED in test_x\nUnit tests completed", "Unit tests completed"));
//! ```

/// 실패 마커 — 로그에 포함되면 항상 실패
pub const NEGATIVE_MARKER: &str = "FAILED";

/// 단위 테스트 완료 마커
pub const UNIT_COMPLETION_MARKER: &str = "Unit tests completed";

/// 통합 테스트 완료 마커
pub const INTEGRATION_COMPLETION_MARKER: &str = "Integration tests completed";

/// 브라우저 테스트 완료 마커
pub const BROWSER_COMPLETION_MARKER: &str = "Selenium tests completed";

/// 로그 → 판정 변환 인터페이스
///
/// 구조화된 상태 채널로 교체할 때 이 trait만 새로 구현하면 됩니다.
pub trait VerdictExtractor: Send + Sync {
    /// 로그와 완료 마커로부터 통과 여부를 결정합니다. 부수 효과가 없어야 합니다.
    fn extract(&self, logs: &str, completion_marker: &str) -> bool;
}

/// 마커 문자열 기반 판정기
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerVerdict;

impl VerdictExtractor for MarkerVerdict {
    fn extract(&self, logs: &str, completion_marker: &str) -> bool {
        extract(logs, completion_marker)
    }
}

/// `logs`에 완료 마커가 있고 실패 마커가 없을 때만 `true`
pub fn extract(logs: &str, completion_marker: &str) -> bool {
    logs.contains(completion_marker) && !logs.contains(NEGATIVE_MARKER)
}
