//! 메트릭 상수 및 설명 등록
//!
//! 러너 크레이트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//! 레코더가 설치되지 않은 경우 모든 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ephemera_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 페이즈 레이블 키 (unit, integration, browser)
pub const LABEL_PHASE: &str = "phase";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 실패 분류 레이블 키 (build, startup, timeout, execution)
pub const LABEL_KIND: &str = "kind";

// ─── 메트릭 이름 ───────────────────────────────────────────────────

/// 실행된 페이즈 수 (counter, label: phase, result)
pub const PHASE_RUNS_TOTAL: &str = "ephemera_phase_runs_total";

/// 페이즈 실패 수 (counter, label: phase, kind)
pub const PHASE_FAILURES_TOTAL: &str = "ephemera_phase_failures_total";

/// 페이즈 소요 시간 (histogram, 초, label: phase)
pub const PHASE_DURATION_SECONDS: &str = "ephemera_phase_duration_seconds";

/// 정리 경고 수 (counter, label: phase)
pub const TEARDOWN_WARNINGS_TOTAL: &str = "ephemera_teardown_warnings_total";

/// 이미지 빌드 수 (counter, label: result)
pub const IMAGE_BUILDS_TOTAL: &str = "ephemera_image_builds_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(PHASE_RUNS_TOTAL, "Total test phases executed");
    describe_counter!(PHASE_FAILURES_TOTAL, "Total failed test phases by kind");
    describe_histogram!(
        PHASE_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Wall-clock duration of a test phase including teardown"
    );
    describe_counter!(
        TEARDOWN_WARNINGS_TOTAL,
        "Total teardown steps that failed and were downgraded to warnings"
    );
    describe_counter!(IMAGE_BUILDS_TOTAL, "Total image builds attempted");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PHASE_RUNS_TOTAL,
        PHASE_FAILURES_TOTAL,
        PHASE_DURATION_SECONDS,
        TEARDOWN_WARNINGS_TOTAL,
        IMAGE_BUILDS_TOTAL,
    ];

    #[test]
    fn all_metrics_start_with_ephemera_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("ephemera_"),
                "Metric '{}' does not start with 'ephemera_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_PHASE, LABEL_RESULT, LABEL_KIND] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
