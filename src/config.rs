use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub telegram: TelegramApiConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SupervisorConfig {
    /// Command line used to launch the supervised bot process.
    #[serde(default = "default_bot_command")]
    pub bot_command: Vec<String>,
    /// Substrings matched against process command lines when locating
    /// bot processes. One list for every supervision path — the legacy
    /// scripts each carried their own (inconsistent) copy.
    #[serde(default = "default_process_keywords")]
    pub process_keywords: Vec<String>,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Seconds to wait between SIGTERM and SIGKILL.
    #[serde(default = "default_grace_timeout_secs")]
    pub grace_timeout_secs: u64,
    /// Seconds to wait after launch before declaring the start successful.
    #[serde(default = "default_start_grace_secs")]
    pub start_grace_secs: u64,
    /// A bot process using more than this share of total memory is unhealthy.
    #[serde(default = "default_max_memory_percent")]
    pub max_memory_percent: f64,
    /// Consecutive-failure cap. Reaching it halts supervision entirely.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Restarts closer together than this count as consecutive failures.
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_lock_path")]
    pub lock_path: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bot_command: default_bot_command(),
            process_keywords: default_process_keywords(),
            check_interval_secs: default_check_interval_secs(),
            grace_timeout_secs: default_grace_timeout_secs(),
            start_grace_secs: default_start_grace_secs(),
            max_memory_percent: default_max_memory_percent(),
            max_consecutive_failures: default_max_consecutive_failures(),
            restart_cooldown_secs: default_restart_cooldown_secs(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            log_dir: default_log_dir(),
            lock_path: default_lock_path(),
        }
    }
}

fn default_bot_command() -> Vec<String> {
    vec!["python3".into(), "main.py".into()]
}

fn default_process_keywords() -> Vec<String> {
    vec![
        "coach-bot".into(),
        "main.py".into(),
        "bot_runner.py".into(),
        "bot_modified.py".into(),
        "run_bot.py".into(),
        "telegram".into(),
    ]
}

fn default_check_interval_secs() -> u64 {
    60
}
fn default_grace_timeout_secs() -> u64 {
    5
}
fn default_start_grace_secs() -> u64 {
    2
}
fn default_max_memory_percent() -> f64 {
    90.0
}
fn default_max_consecutive_failures() -> u32 {
    3
}
fn default_restart_cooldown_secs() -> u64 {
    300
}
fn default_backoff_base_secs() -> u64 {
    60
}
fn default_backoff_cap_secs() -> u64 {
    600
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_lock_path() -> String {
    "runcoachd.lock".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_sentinel_path")]
    pub sentinel_path: String,
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    #[serde(default = "default_warn_threshold_secs")]
    pub warn_threshold_secs: i64,
    #[serde(default = "default_critical_threshold_secs")]
    pub critical_threshold_secs: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            sentinel_path: default_sentinel_path(),
            report_interval_secs: default_report_interval_secs(),
            warn_threshold_secs: default_warn_threshold_secs(),
            critical_threshold_secs: default_critical_threshold_secs(),
        }
    }
}

fn default_sentinel_path() -> String {
    "bot_health.txt".to_string()
}
fn default_report_interval_secs() -> u64 {
    30
}
fn default_warn_threshold_secs() -> i64 {
    60
}
fn default_critical_threshold_secs() -> i64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramApiConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Settling delay after the session-reset sequence (observed 3-15s in
    /// the legacy scripts).
    #[serde(default = "default_session_reset_cooldown_secs")]
    pub session_reset_cooldown_secs: u64,
    /// Number of low offsets swept defensively after the main queue flush.
    #[serde(default = "default_drain_offset_sweep")]
    pub drain_offset_sweep: i64,
}

impl Default for TelegramApiConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            session_reset_cooldown_secs: default_session_reset_cooldown_secs(),
            drain_offset_sweep: default_drain_offset_sweep(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_session_reset_cooldown_secs() -> u64 {
    15
}
fn default_drain_offset_sweep() -> i64 {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_provider_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_provider_timeout_secs(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_provider_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    /// Load config from a TOML file. A missing file yields the defaults —
    /// only the secrets (env vars) are mandatory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Fetch a required environment variable. Absence is a fatal startup error.
pub fn require_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Required environment variable {} is not set", name))
}

pub fn telegram_token() -> anyhow::Result<String> {
    require_env("TELEGRAM_TOKEN")
}

pub fn openai_api_key() -> anyhow::Result<String> {
    require_env("OPENAI_API_KEY")
}

/// Resolve the Postgres connection string: DATABASE_URL wins, otherwise the
/// individual PG* components are assembled (both forms exist in deployments).
pub fn database_url() -> anyhow::Result<String> {
    if let Ok(url) = require_env("DATABASE_URL") {
        return Ok(url);
    }
    let host = require_env("PGHOST")?;
    let port = require_env("PGPORT")?;
    let dbname = require_env("PGDATABASE")?;
    let user = require_env("PGUSER")?;
    let password = require_env("PGPASSWORD")?;
    Ok(format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, dbname
    ))
}
