use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::models::DEFAULT_CACHE_TTL_SECONDS;
use crate::network::Network;

#[derive(Debug, Deserialize, Clone)]
pub struct Database {
    /// Overridden by `DATABASE_URL` when set.
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_seconds() -> u64 {
    5
}
fn default_connect_attempts() -> u32 {
    10
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
            connect_attempts: default_connect_attempts(),
        }
    }
}

/// API-key allow-lists. `edit` keys are required for every mutation.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Api {
    #[serde(default)]
    pub view_keys: Vec<String>,
    #[serde(default)]
    pub edit_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Sources {
    /// JSON file mapping category -> { init, cron }.
    #[serde(default = "default_sources_config_path")]
    pub config_path: PathBuf,
    /// Where downloaded lists are cached, one subfolder per category.
    #[serde(default = "default_lists_dir")]
    pub lists_dir: PathBuf,
    #[serde(default = "default_fetch_timeout_seconds")]
    pub fetch_timeout_seconds: u64,
}

fn default_sources_config_path() -> PathBuf {
    PathBuf::from("sources.json")
}
fn default_lists_dir() -> PathBuf {
    PathBuf::from("lists")
}
fn default_fetch_timeout_seconds() -> u64 {
    120
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            config_path: default_sources_config_path(),
            lists_dir: default_lists_dir(),
            fetch_timeout_seconds: default_fetch_timeout_seconds(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Reconciler {
    #[serde(default = "default_reconcile_interval_seconds")]
    pub interval_seconds: u64,
    #[serde(default = "default_true")]
    pub purge_before_run: bool,
}

fn default_reconcile_interval_seconds() -> u64 {
    3600
}
fn default_true() -> bool {
    true
}

impl Default for Reconciler {
    fn default() -> Self {
        Self {
            interval_seconds: default_reconcile_interval_seconds(),
            purge_before_run: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Cache {
    /// Lifetime used when a verifier flags a key without giving one.
    #[serde(default = "default_cache_ttl_seconds")]
    pub default_ttl_seconds: i64,
    /// Concurrent verifier calls issued by one scan request.
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

fn default_cache_ttl_seconds() -> i64 {
    DEFAULT_CACHE_TTL_SECONDS
}
fn default_scan_concurrency() -> usize {
    8
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_cache_ttl_seconds(),
            scan_concurrency: default_scan_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Reports {
    #[serde(default = "default_reports_path")]
    pub path: PathBuf,
}

fn default_reports_path() -> PathBuf {
    PathBuf::from("reports/spam_reports.json")
}

impl Default for Reports {
    fn default() -> Self {
        Self {
            path: default_reports_path(),
        }
    }
}

/// One third-party API. An adapter is only built when `api_key` is set.
#[derive(Debug, Deserialize, Clone)]
pub struct VerifierApi {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_verifier_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub qps_limit: Option<u32>,
    /// Networks to pull (Alchemy spam contracts only).
    #[serde(default)]
    pub networks: Vec<Network>,
}

fn default_verifier_timeout_seconds() -> u64 {
    10
}

impl Default for VerifierApi {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout_seconds: default_verifier_timeout_seconds(),
            qps_limit: None,
            networks: Vec::new(),
        }
    }
}

impl VerifierApi {
    pub fn enabled_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Verifiers {
    #[serde(default)]
    pub google: VerifierApi,
    #[serde(default)]
    pub alchemy: VerifierApi,
    #[serde(default)]
    pub mnemonichq: VerifierApi,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub sources: Sources,
    #[serde(default)]
    pub reconciler: Reconciler,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub reports: Reports,
    #[serde(default)]
    pub verifiers: Verifiers,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` (optional) plus `BLOCKLIST__SECTION__KEY` variables, then
    /// applies the plain secret variables (`DATABASE_URL`, `GOOGLE_API_KEY`, ...).
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("BLOCKLIST").separator("__"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(raw) = non_empty_env("VIEW_API_KEYS") {
            self.api.view_keys = parse_key_list(&raw);
        }
        if let Some(raw) = non_empty_env("EDIT_API_KEYS") {
            self.api.edit_keys = parse_key_list(&raw);
        }
        if let Some(key) = non_empty_env("GOOGLE_API_KEY") {
            self.verifiers.google.api_key = Some(key);
        }
        if let Some(key) = non_empty_env("ALCHEMY_API_KEY") {
            self.verifiers.alchemy.api_key = Some(key);
        }
        if let Some(key) = non_empty_env("MNEMONICHQ_API_KEY") {
            self.verifiers.mnemonichq.api_key = Some(key);
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// API keys are given space separated (commas are tolerated too).
pub fn parse_key_list(input: &str) -> Vec<String> {
    input
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|s| s.trim_matches('"').trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
