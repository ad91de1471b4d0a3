//! 이미지 빌더 — 빌드 명세를 실행 가능한 이미지 참조로 변환
//!
//! `docker build -f <dockerfile> -t <tag> --rm <context>`를 실행합니다.
//! dockerfile/컨텍스트의 존재 여부는 검증하지 않고 백엔드에 위임합니다.
//! 같은 태그에 대한 동시 빌드는 지원하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ephemera_core::metrics as m;

use crate::command::{CommandExecutor, CommandSpec};
use crate::error::RunnerError;
use crate::wait;

/// 빌드 실패 진단에 포함할 stderr 줄 수
const DIAGNOSTIC_LINES: usize = 20;

/// 빌드 명세
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpec {
    /// dockerfile 경로
    pub dockerfile: String,
    /// 빌드 컨텍스트 경로
    pub context: String,
    /// 이미지 태그 (페이즈마다 고정, 실행 간 재사용)
    pub tag: String,
}

/// 빌드된 이미지 참조
///
/// 이미지 자체는 삭제하지 않습니다. 고정 태그로 다음 실행에서 재사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    tag: String,
}

impl ImageRef {
    /// 태그로 참조를 생성합니다.
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }

    /// 이미지 태그
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// 이미지 빌더
pub struct ImageBuilder<E: CommandExecutor> {
    executor: Arc<E>,
    docker_command: String,
}

impl<E: CommandExecutor> ImageBuilder<E> {
    /// 실행기와 docker CLI 이름으로 빌더를 생성합니다.
    pub fn new(executor: Arc<E>, docker_command: impl Into<String>) -> Self {
        Self {
            executor,
            docker_command: docker_command.into(),
        }
    }

    fn command(&self, spec: &BuildSpec) -> CommandSpec {
        CommandSpec::new(&self.docker_command).args([
            "build",
            "-f",
            spec.dockerfile.as_str(),
            "-t",
            spec.tag.as_str(),
            "--rm",
            spec.context.as_str(),
        ])
    }

    /// 이미지를 빌드합니다.
    ///
    /// # Errors
    ///
    /// - `RunnerError::Build`: 빌드 명령이 0이 아닌 코드로 종료 (진단 메시지 포함)
    /// - `RunnerError::Timeout` / `RunnerError::Cancelled`: 대기 중단
    pub async fn build(
        &self,
        spec: &BuildSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ImageRef, RunnerError> {
        let command = self.command(spec);
        tracing::info!(image = %spec.tag, dockerfile = %spec.dockerfile, "building image");

        let result = wait::bounded("image build", timeout, cancel, async {
            let output = self.executor.execute(&command).await?;
            if output.success() {
                Ok(ImageRef::new(&spec.tag))
            } else {
                Err(RunnerError::Build {
                    tag: spec.tag.clone(),
                    reason: output.diagnostics(DIAGNOSTIC_LINES),
                })
            }
        })
        .await
        .map_err(|e| match e {
            RunnerError::Spawn { program, reason } => RunnerError::Build {
                tag: spec.tag.clone(),
                reason: format!("failed to launch '{program}': {reason}"),
            },
            other => other,
        });

        let label = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(m::IMAGE_BUILDS_TOTAL, m::LABEL_RESULT => label).increment(1);

        match &result {
            Ok(image) => tracing::info!(image = %image.tag(), "image built"),
            Err(e) => tracing::error!(image = %spec.tag, error = %e, "image build failed"),
        }
        result
    }
}
