//! 설정 관리 — ephemera.toml 파싱 및 런타임 설정
//!
//! [`EphemeraConfig`]는 모든 페이즈와 백엔드 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. 환경변수 (`EPHEMERA_UNIT_TIMEOUT_SECS=300` 형식, 워크로드는 `POSTGRES_HOST` 등)
//! 2. 설정 파일 (`ephemera.toml`)
//! 3. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ephemera_core::error::EphemeraError> {
//! use ephemera_core::config::EphemeraConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = EphemeraConfig::load("ephemera.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = EphemeraConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, EphemeraError};
use crate::verdict::{BROWSER_COMPLETION_MARKER, INTEGRATION_COMPLETION_MARKER};

/// 기본 설정 파일 이름
pub const DEFAULT_CONFIG_FILE: &str = "ephemera.toml";

/// 설정 상한값 상수
const MAX_TIMEOUT_SECS: u64 = 86_400;
const MAX_READINESS_DELAY_SECS: u64 = 3600;
const MAX_STOP_GRACE_SECS: u64 = 300;

/// ephemera 통합 설정
///
/// `ephemera.toml` 파일의 최상위 구조를 나타냅니다.
/// 섹션이 생략되면 해당 섹션 전체가 기본값을 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EphemeraConfig {
    /// 일반 설정
    pub general: GeneralConfig,
    /// Docker 백엔드 설정
    pub docker: DockerConfig,
    /// 워크로드로 전달되는 환경변수
    pub workload: WorkloadConfig,
    /// 단위 테스트 페이즈 (단일 컨테이너)
    pub unit: ContainerPhaseConfig,
    /// 통합 테스트 페이즈 (클러스터)
    #[serde(deserialize_with = "integration_section")]
    pub integration: ClusterPhaseConfig,
    /// 브라우저 테스트 페이즈 (클러스터)
    #[serde(deserialize_with = "browser_section")]
    pub browser: ClusterPhaseConfig,
}

impl Default for EphemeraConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            docker: DockerConfig::default(),
            workload: WorkloadConfig::default(),
            unit: ContainerPhaseConfig::default(),
            integration: ClusterPhaseConfig::integration(),
            browser: ClusterPhaseConfig::browser(),
        }
    }
}

impl EphemeraConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EphemeraError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일을 찾아 로드합니다.
    ///
    /// - `explicit`이 주어지면 해당 파일이 반드시 존재해야 합니다.
    /// - 없으면 현재 디렉토리의 `ephemera.toml`을 시도하고,
    ///   그마저 없으면 기본값에 환경변수 오버라이드만 적용합니다.
    pub async fn discover(explicit: Option<&Path>) -> Result<Self, EphemeraError> {
        if let Some(path) = explicit {
            return Self::load(path).await;
        }

        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        if tokio::fs::try_exists(default_path).await.unwrap_or(false) {
            return Self::load(default_path).await;
        }

        debug!("no config file found, using defaults");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EphemeraError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EphemeraError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EphemeraError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, EphemeraError> {
        toml::from_str(toml_str).map_err(|e| {
            EphemeraError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `EPHEMERA_{SECTION}_{FIELD}`
    /// 워크로드 DB 설정은 워크로드와 같은 `POSTGRES_*` 이름도 인식합니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "EPHEMERA_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "EPHEMERA_GENERAL_LOG_FORMAT");

        // Docker
        override_string(&mut self.docker.socket, "EPHEMERA_DOCKER_SOCKET");
        override_u64(
            &mut self.docker.stop_grace_secs,
            "EPHEMERA_DOCKER_STOP_GRACE_SECS",
        );
        override_string(
            &mut self.docker.docker_command,
            "EPHEMERA_DOCKER_DOCKER_COMMAND",
        );
        override_words(
            &mut self.docker.compose_command,
            "EPHEMERA_DOCKER_COMPOSE_COMMAND",
        );

        // Workload
        override_string(&mut self.workload.postgres_host, "POSTGRES_HOST");
        override_u16(&mut self.workload.postgres_port, "POSTGRES_PORT");
        override_string(&mut self.workload.postgres_db, "POSTGRES_DB");
        override_string(&mut self.workload.postgres_user, "POSTGRES_USER");
        override_string(&mut self.workload.postgres_password, "POSTGRES_PASSWORD");

        // Unit
        override_string(&mut self.unit.dockerfile, "EPHEMERA_UNIT_DOCKERFILE");
        override_string(&mut self.unit.context, "EPHEMERA_UNIT_CONTEXT");
        override_string(&mut self.unit.tag, "EPHEMERA_UNIT_TAG");
        override_u64(&mut self.unit.timeout_secs, "EPHEMERA_UNIT_TIMEOUT_SECS");
        override_u64(
            &mut self.unit.build_timeout_secs,
            "EPHEMERA_UNIT_BUILD_TIMEOUT_SECS",
        );
        override_opt_string(
            &mut self.unit.completion_marker,
            "EPHEMERA_UNIT_COMPLETION_MARKER",
        );

        // Clusters
        for (section, cluster) in [
            ("INTEGRATION", &mut self.integration),
            ("BROWSER", &mut self.browser),
        ] {
            override_string(
                &mut cluster.compose_file,
                &format!("EPHEMERA_{section}_COMPOSE_FILE"),
            );
            override_string(&mut cluster.service, &format!("EPHEMERA_{section}_SERVICE"));
            override_string(
                &mut cluster.completion_marker,
                &format!("EPHEMERA_{section}_COMPLETION_MARKER"),
            );
            override_opt_string(&mut cluster.project, &format!("EPHEMERA_{section}_PROJECT"));
            override_u64(
                &mut cluster.timeout_secs,
                &format!("EPHEMERA_{section}_TIMEOUT_SECS"),
            );
            override_u64(
                &mut cluster.up_timeout_secs,
                &format!("EPHEMERA_{section}_UP_TIMEOUT_SECS"),
            );
            override_u64(
                &mut cluster.readiness_delay_secs,
                &format!("EPHEMERA_{section}_READINESS_DELAY_SECS"),
            );
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EphemeraError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.docker.stop_grace_secs > MAX_STOP_GRACE_SECS {
            return Err(invalid(
                "docker.stop_grace_secs",
                format!("must be 0-{MAX_STOP_GRACE_SECS}"),
            ));
        }
        if self.docker.docker_command.trim().is_empty() {
            return Err(invalid("docker.docker_command", "must not be empty".to_owned()));
        }
        if self.docker.compose_command.is_empty()
            || self.docker.compose_command.iter().any(|w| w.trim().is_empty())
        {
            return Err(invalid(
                "docker.compose_command",
                "must contain at least one non-empty word".to_owned(),
            ));
        }

        if self.workload.postgres_port == 0 {
            return Err(invalid("workload.postgres_port", "must be 1-65535".to_owned()));
        }

        self.unit.validate("unit")?;
        self.integration.validate("integration")?;
        self.browser.validate("browser")?;

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// Docker 백엔드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (비어 있으면 플랫폼 기본값)
    pub socket: String,
    /// 타임아웃 후 강제 정지 전 유예 시간 (초)
    pub stop_grace_secs: u64,
    /// 이미지 빌드에 사용할 docker 실행 파일
    pub docker_command: String,
    /// 클러스터 제어 명령 (예: `["docker", "compose"]`, `["docker-compose"]`)
    pub compose_command: Vec<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: String::new(),
            stop_grace_secs: 10,
            docker_command: "docker".to_owned(),
            compose_command: vec!["docker".to_owned(), "compose".to_owned()],
        }
    }
}

/// 워크로드 환경변수 설정
///
/// 오케스트레이터는 값을 해석하지 않고 컨테이너/클러스터에 그대로 전달합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// DB 호스트 (클러스터 내 서비스 이름)
    pub postgres_host: String,
    /// DB 포트
    pub postgres_port: u16,
    /// DB 이름
    pub postgres_db: String,
    /// DB 사용자
    pub postgres_user: String,
    /// DB 비밀번호
    pub postgres_password: String,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            postgres_host: "postgres".to_owned(),
            postgres_port: 5432,
            postgres_db: "test".to_owned(),
            postgres_user: "test".to_owned(),
            postgres_password: "test".to_owned(),
        }
    }
}

impl WorkloadConfig {
    /// 워크로드에 전달할 `(KEY, VALUE)` 목록을 반환합니다.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("POSTGRES_HOST".to_owned(), self.postgres_host.clone()),
            ("POSTGRES_PORT".to_owned(), self.postgres_port.to_string()),
            ("POSTGRES_DB".to_owned(), self.postgres_db.clone()),
            ("POSTGRES_USER".to_owned(), self.postgres_user.clone()),
            ("POSTGRES_PASSWORD".to_owned(), self.postgres_password.clone()),
        ]
    }
}

/// 단일 컨테이너 페이즈 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerPhaseConfig {
    /// Dockerfile 경로 (빌드 백엔드가 검증)
    pub dockerfile: String,
    /// 빌드 컨텍스트 경로
    pub context: String,
    /// 이미지 태그 (실행 간 재사용)
    pub tag: String,
    /// 컨테이너 대기 제한 시간 (초)
    pub timeout_secs: u64,
    /// 이미지 빌드 제한 시간 (초)
    pub build_timeout_secs: u64,
    /// 설정 시 종료 코드 0에 더해 완료 마커도 요구
    pub completion_marker: Option<String>,
}

impl Default for ContainerPhaseConfig {
    fn default() -> Self {
        Self {
            dockerfile: "dockerfile.unit_test".to_owned(),
            context: ".".to_owned(),
            tag: "myephemeral-test".to_owned(),
            timeout_secs: 600,
            build_timeout_secs: 900,
            completion_marker: None,
        }
    }
}

impl ContainerPhaseConfig {
    fn validate(&self, section: &str) -> Result<(), EphemeraError> {
        require_non_empty(section, "dockerfile", &self.dockerfile)?;
        require_non_empty(section, "context", &self.context)?;
        validate_tag(section, &self.tag)?;
        validate_timeout(section, "timeout_secs", self.timeout_secs)?;
        validate_timeout(section, "build_timeout_secs", self.build_timeout_secs)?;
        if let Some(marker) = &self.completion_marker {
            require_non_empty(section, "completion_marker", marker)?;
        }
        Ok(())
    }
}

/// 클러스터 페이즈 설정
///
/// 파일에서 읽을 때는 생략된 필드가 해당 페이즈의 기본값
/// ([`ClusterPhaseConfig::integration`], [`ClusterPhaseConfig::browser`])으로 채워집니다.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterPhaseConfig {
    /// compose 파일 경로
    pub compose_file: String,
    /// 판정 로그를 내는 서비스 이름
    pub service: String,
    /// 완료 마커
    pub completion_marker: String,
    /// compose 프로젝트 이름 (없으면 실행마다 생성)
    pub project: Option<String>,
    /// 판정 로그 대기 제한 시간 (초)
    pub timeout_secs: u64,
    /// 클러스터 기동 제한 시간 (초)
    pub up_timeout_secs: u64,
    /// 기동 후 로그 대기 전 지연 시간 (초)
    pub readiness_delay_secs: u64,
}

/// TOML 클러스터 섹션. 적힌 필드만 페이즈 기본값 위에 덮어씁니다.
#[derive(Deserialize)]
struct ClusterSection {
    compose_file: Option<String>,
    service: Option<String>,
    completion_marker: Option<String>,
    project: Option<String>,
    timeout_secs: Option<u64>,
    up_timeout_secs: Option<u64>,
    readiness_delay_secs: Option<u64>,
}

impl ClusterSection {
    fn merge_onto(self, mut base: ClusterPhaseConfig) -> ClusterPhaseConfig {
        if let Some(v) = self.compose_file {
            base.compose_file = v;
        }
        if let Some(v) = self.service {
            base.service = v;
        }
        if let Some(v) = self.completion_marker {
            base.completion_marker = v;
        }
        if self.project.is_some() {
            base.project = self.project;
        }
        if let Some(v) = self.timeout_secs {
            base.timeout_secs = v;
        }
        if let Some(v) = self.up_timeout_secs {
            base.up_timeout_secs = v;
        }
        if let Some(v) = self.readiness_delay_secs {
            base.readiness_delay_secs = v;
        }
        base
    }
}

fn integration_section<'de, D>(deserializer: D) -> Result<ClusterPhaseConfig, D::Error>
where
    D: Deserializer<'de>,
{
    ClusterSection::deserialize(deserializer)
        .map(|section| section.merge_onto(ClusterPhaseConfig::integration()))
}

fn browser_section<'de, D>(deserializer: D) -> Result<ClusterPhaseConfig, D::Error>
where
    D: Deserializer<'de>,
{
    ClusterSection::deserialize(deserializer)
        .map(|section| section.merge_onto(ClusterPhaseConfig::browser()))
}

const DEFAULT_CLUSTER_TIMEOUT_SECS: u64 = 600;
const DEFAULT_CLUSTER_UP_TIMEOUT_SECS: u64 = 900;

impl ClusterPhaseConfig {
    /// 통합 테스트 기본값
    pub fn integration() -> Self {
        Self {
            compose_file: "docker-compose.integration.yml".to_owned(),
            service: "integration-tests".to_owned(),
            completion_marker: INTEGRATION_COMPLETION_MARKER.to_owned(),
            project: None,
            timeout_secs: DEFAULT_CLUSTER_TIMEOUT_SECS,
            up_timeout_secs: DEFAULT_CLUSTER_UP_TIMEOUT_SECS,
            readiness_delay_secs: 0,
        }
    }

    /// 브라우저 테스트 기본값
    pub fn browser() -> Self {
        Self {
            compose_file: "docker-compose.selenium.yml".to_owned(),
            service: "selenium-tests".to_owned(),
            completion_marker: BROWSER_COMPLETION_MARKER.to_owned(),
            project: None,
            timeout_secs: DEFAULT_CLUSTER_TIMEOUT_SECS,
            up_timeout_secs: DEFAULT_CLUSTER_UP_TIMEOUT_SECS,
            readiness_delay_secs: 15,
        }
    }

    fn validate(&self, section: &str) -> Result<(), EphemeraError> {
        require_non_empty(section, "compose_file", &self.compose_file)?;
        require_non_empty(section, "service", &self.service)?;
        require_non_empty(section, "completion_marker", &self.completion_marker)?;
        if let Some(project) = &self.project {
            let valid = !project.is_empty()
                && project
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
            if !valid {
                return Err(invalid(
                    &format!("{section}.project"),
                    "must be lowercase letters, digits, '-' or '_'".to_owned(),
                ));
            }
        }
        validate_timeout(section, "timeout_secs", self.timeout_secs)?;
        validate_timeout(section, "up_timeout_secs", self.up_timeout_secs)?;
        if self.readiness_delay_secs > MAX_READINESS_DELAY_SECS {
            return Err(invalid(
                &format!("{section}.readiness_delay_secs"),
                format!("must be 0-{MAX_READINESS_DELAY_SECS}"),
            ));
        }
        Ok(())
    }
}

// --- 검증 헬퍼 ---

fn invalid(field: &str, reason: String) -> EphemeraError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn require_non_empty(section: &str, field: &str, value: &str) -> Result<(), EphemeraError> {
    if value.trim().is_empty() {
        return Err(invalid(
            &format!("{section}.{field}"),
            "must not be empty".to_owned(),
        ));
    }
    Ok(())
}

fn validate_timeout(section: &str, field: &str, secs: u64) -> Result<(), EphemeraError> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(invalid(
            &format!("{section}.{field}"),
            format!("must be 1-{MAX_TIMEOUT_SECS}"),
        ));
    }
    Ok(())
}

/// Docker 이미지 참조에 허용되는 문자만 사용하는지 검사합니다.
fn validate_tag(section: &str, tag: &str) -> Result<(), EphemeraError> {
    let valid = !tag.is_empty()
        && tag.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | ':' | '/')
        });
    if !valid {
        return Err(invalid(
            &format!("{section}.tag"),
            "must be a lowercase docker image reference".to_owned(),
        ));
    }
    Ok(())
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

fn override_words(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split_whitespace().map(str::to_owned).collect();
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
