//! 외부 명령 실행 추상화
//!
//! 이미지 빌드(`docker build`)와 클러스터 제어(`docker compose ...`)는
//! 외부 CLI를 통해 수행합니다. [`CommandExecutor`] trait으로 추상화하여
//! 테스트에서는 스크립트된 응답을 반환하는 mock을 사용합니다.
//!
//! [`TokioCommandExecutor`]는 `kill_on_drop(true)`로 자식 프로세스를 띄우므로,
//! 대기 중인 future가 타임아웃/취소로 drop되면 프로세스도 함께 종료됩니다.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::RunnerError;

/// 실행할 명령 정의
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// 실행 파일
    pub program: String,
    /// 인자 목록
    pub args: Vec<String>,
    /// 추가 환경 변수
    pub env: Vec<(String, String)>,
    /// 작업 디렉토리 (None이면 현재 디렉토리)
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// 프로그램 이름으로 생성합니다.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// 인자를 추가합니다.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// 인자 여러 개를 추가합니다.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// 환경 변수 목록을 설정합니다.
    pub fn envs(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    /// 로그용 한 줄 표현 (환경 변수 제외)
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// 명령 실행 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// 종료 코드 (시그널로 종료되면 None)
    pub status: Option<i32>,
    /// 표준 출력
    pub stdout: String,
    /// 표준 에러
    pub stderr: String,
}

impl CommandOutput {
    /// 종료 코드 0 여부
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// 진단 메시지용 stderr 끝부분 (비어 있으면 stdout 끝부분)
    pub fn diagnostics(&self, max_lines: usize) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().collect();
        let start = lines.len().saturating_sub(max_lines);
        let tail = lines[start..].join("\n");
        match self.status {
            Some(code) => format!("exit status {code}: {tail}"),
            None => format!("terminated by signal: {tail}"),
        }
    }
}

/// 외부 명령 실행 인터페이스
pub trait CommandExecutor: Send + Sync + 'static {
    /// 명령을 실행하고 완료될 때까지 기다립니다.
    ///
    /// 비정상 종료 코드는 에러가 아니며 [`CommandOutput::status`]로 전달됩니다.
    /// 프로세스를 띄우지 못한 경우에만 `RunnerError::Spawn`을 반환합니다.
    fn execute(
        &self,
        spec: &CommandSpec,
    ) -> impl Future<Output = Result<CommandOutput, RunnerError>> + Send;
}

/// tokio 프로세스 기반 실행기
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandExecutor;

impl CommandExecutor for TokioCommandExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %spec.display(), "spawning command");

        let output = cmd.output().await.map_err(|e| RunnerError::Spawn {
            program: spec.program.clone(),
            reason: e.to_string(),
        })?;

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// 테스트용 Mock 실행기
///
/// 인자 목록에 특정 부분 문자열이 포함된 명령에 대해 스크립트된 응답을 반환합니다.
#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    /// 스크립트된 응답
    #[derive(Debug, Clone)]
    pub struct Scripted {
        /// 매칭할 인자 (예: "up", "logs")
        pub matches: String,
        /// 반환할 결과
        pub output: CommandOutput,
        /// 응답 전 지연 (None이면 즉시)
        pub delay: Option<Duration>,
    }

    /// 테스트용 Mock 실행기
    #[derive(Default)]
    pub struct MockCommandExecutor {
        script: Vec<Scripted>,
        calls: Mutex<Vec<CommandSpec>>,
    }

    impl MockCommandExecutor {
        /// 모든 명령에 성공(빈 출력)으로 응답하는 mock
        pub fn new() -> Self {
            Self::default()
        }

        /// `matches` 인자를 포함하는 명령에 대한 응답을 등록합니다.
        pub fn on(mut self, matches: &str, status: i32, stdout: &str, stderr: &str) -> Self {
            self.script.push(Scripted {
                matches: matches.to_owned(),
                output: CommandOutput {
                    status: Some(status),
                    stdout: stdout.to_owned(),
                    stderr: stderr.to_owned(),
                },
                delay: None,
            });
            self
        }

        /// 지정 시간 후 응답하도록 등록합니다.
        pub fn on_delayed(mut self, matches: &str, delay: Duration, status: i32) -> Self {
            self.script.push(Scripted {
                matches: matches.to_owned(),
                output: CommandOutput {
                    status: Some(status),
                    ..Default::default()
                },
                delay: Some(delay),
            });
            self
        }

        /// 기록된 호출
        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// 인자에 `needle`을 포함한 호출 수
        pub fn count(&self, needle: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.args.iter().any(|a| a == needle))
                .count()
        }
    }

    impl CommandExecutor for MockCommandExecutor {
        async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(spec.clone());
            }
            let scripted = self
                .script
                .iter()
                .find(|s| spec.args.iter().any(|a| *a == s.matches))
                .cloned();
            match scripted {
                Some(s) => {
                    if let Some(delay) = s.delay {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(s.output)
                }
                None => Ok(CommandOutput {
                    status: Some(0),
                    ..Default::default()
                }),
            }
        }
    }
}
