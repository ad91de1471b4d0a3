//! 제한 시간 + 취소 토큰으로 묶인 대기
//!
//! 모든 블로킹 대기 지점은 [`bounded`]를 거칩니다.
//! 대기가 끝나지 않으면 내부 future는 drop되며, 외부 프로세스는
//! `kill_on_drop`으로 함께 종료됩니다.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;

/// `fut`를 `timeout` 또는 `cancel` 중 먼저 발생하는 쪽까지 기다립니다.
///
/// - 이미 취소된 토큰이면 `fut`를 폴링하지 않고 즉시 `Cancelled`를 반환합니다.
/// - 취소와 완료가 동시에 준비되면 취소가 우선합니다.
pub async fn bounded<T, F>(
    operation: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, RunnerError>
where
    F: Future<Output = Result<T, RunnerError>>,
{
    if cancel.is_cancelled() {
        return Err(RunnerError::Cancelled {
            operation: operation.to_owned(),
        });
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunnerError::Cancelled {
            operation: operation.to_owned(),
        }),
        result = tokio::time::timeout(timeout, fut) => match result {
            Ok(inner) => inner,
            Err(_elapsed) => Err(RunnerError::Timeout {
                operation: operation.to_owned(),
                timeout,
            }),
        },
    }
}

/// 취소 가능한 고정 지연
pub async fn pause(
    operation: &str,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), RunnerError> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunnerError::Cancelled {
            operation: operation.to_owned(),
        }),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
