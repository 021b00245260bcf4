//! Layered configuration for Rouge.
//!
//! Settings are read from `<data_dir>/rouge.toml`, then overridden by
//! environment variables (after `.env` loading), then by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [worker]
//! poll_interval_secs = 10
//! workflow_timeout_secs = 3600
//! # pipeline_command = "rouge run"
//!
//! [database]
//! url = "postgres://rouge@localhost/rouge"
//!
//! [providers]
//! default = "claude"
//! implement = "opencode"
//! model = "sonnet"
//!
//! [pipeline]
//! main_targets = ["address_review", "code_quality", "validate_acceptance"]
//! patch_targets = ["patch_implement"]
//!
//! [defaults]
//! max_retries = 2
//! step_timeout_secs = 1800
//!
//! [steps.overrides."*implement"]
//! timeout_secs = 3600
//! max_retries = 1
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::paths::RougePaths;
use crate::workflow::StepId;

/// Environment variables consulted by [`RougeConfig`].
pub const ENV_KEYS: &[&str] = &[
    "ROUGE_DATABASE_URL",
    "DATABASE_URL",
    "ROUGE_AGENT_PROVIDER",
    "ROUGE_IMPLEMENT_PROVIDER",
    "CLAUDE_CMD",
    "OPENCODE_CMD",
    "ROUGE_PIPELINE_COMMAND",
    "ROUGE_LOG_LEVEL",
    "ROUGE_WORKFLOW_TIMEOUT_SECONDS",
];

pub const KNOWN_PROVIDERS: &[&str] = &["claude", "opencode"];
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_workflow_timeout")]
    pub workflow_timeout_secs: u64,
    /// Command used to launch a pipeline run (default: this executable).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_command: Option<String>,
}

fn default_poll_interval() -> u64 {
    10
}

fn default_workflow_timeout() -> u64 {
    3600
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            workflow_timeout_secs: default_workflow_timeout(),
            pipeline_command: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// `postgres://` URLs select PostgreSQL; anything else is a SQLite path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersSection {
    #[serde(default = "default_provider")]
    pub default: String,
    /// Provider for implementation steps (falls back to `default`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opencode_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opencode_model: Option<String>,
}

fn default_provider() -> String {
    "claude".to_string()
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            default: default_provider(),
            implement: None,
            claude_cmd: None,
            opencode_cmd: None,
            model: None,
            opencode_model: None,
        }
    }
}

/// Target steps per kind of queue item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_main_targets")]
    pub main_targets: Vec<String>,
    #[serde(default = "default_patch_targets")]
    pub patch_targets: Vec<String>,
}

fn default_main_targets() -> Vec<String> {
    ["address_review", "code_quality", "validate_acceptance"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_patch_targets() -> Vec<String> {
    vec!["patch_implement".to_string()]
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            main_targets: default_main_targets(),
            patch_targets: default_patch_targets(),
        }
    }
}

/// Default settings for all steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_step_timeout() -> u64 {
    1800
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            step_timeout_secs: default_step_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepsConfig {
    /// Pattern-based overrides (e.g., "patch_*" -> StepOverride)
    #[serde(default)]
    pub overrides: BTreeMap<String, StepOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The complete rouge.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RougeToml {
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub providers: ProvidersSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub steps: StepsConfig,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl RougeToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse rouge.toml")
    }

    /// Returns the default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize rouge.toml")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Effective settings for one step, applying pattern overrides in key order.
    pub fn step_settings(&self, step_name: &str) -> StepSettings {
        let mut settings = StepSettings {
            max_retries: self.defaults.max_retries,
            timeout: Duration::from_secs(self.defaults.step_timeout_secs),
        };

        for (pattern, override_cfg) in &self.steps.overrides {
            if pattern_matches(pattern, step_name) {
                if let Some(retries) = override_cfg.max_retries {
                    settings.max_retries = retries;
                }
                if let Some(secs) = override_cfg.timeout_secs {
                    settings.timeout = Duration::from_secs(secs);
                }
            }
        }

        settings
    }

    /// Validate the file contents and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.worker.poll_interval_secs == 0 {
            warnings.push("worker.poll_interval_secs must be positive".to_string());
        }
        if self.worker.workflow_timeout_secs == 0 {
            warnings.push("worker.workflow_timeout_secs must be positive".to_string());
        }
        if self.defaults.step_timeout_secs == 0 {
            warnings.push("defaults.step_timeout_secs must be positive".to_string());
        }

        let providers = std::iter::once(&self.providers.default).chain(self.providers.implement.iter());
        for name in providers {
            if !KNOWN_PROVIDERS.contains(&name.as_str()) {
                warnings.push(format!(
                    "Unknown provider '{}': expected one of {}",
                    name,
                    KNOWN_PROVIDERS.join(", ")
                ));
            }
        }

        for name in self.pipeline.main_targets.iter().chain(&self.pipeline.patch_targets) {
            if name.parse::<StepId>().is_err() {
                warnings.push(format!("Unknown step '{}' in [pipeline] targets", name));
            }
        }

        for pattern in self.steps.overrides.keys() {
            if !StepId::ALL.iter().any(|id| pattern_matches(pattern, id.as_str())) {
                warnings.push(format!("Override pattern '{}' matches no step", pattern));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            warnings.push(format!("Unknown log level '{}'", self.logging.level));
        }

        warnings
    }
}

/// Resolved settings for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSettings {
    pub max_retries: u32,
    pub timeout: Duration,
}

/// Check if a pattern matches a step name.
/// Supports simple glob patterns:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();
    glob_match(&pattern, &name)
}

/// Linear-time glob matching: on a mismatch, fall back to the most recent
/// `*` and let it absorb one more character.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Where queue items live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite(PathBuf),
    Postgres(String),
}

/// Unified configuration combining rouge.toml with environment overrides.
#[derive(Debug, Clone)]
pub struct RougeConfig {
    pub paths: RougePaths,
    pub toml: RougeToml,
    env: HashMap<String, String>,
}

impl RougeConfig {
    /// Load from `<data_dir>/rouge.toml` and the process environment.
    pub fn load(paths: RougePaths) -> Result<Self> {
        Self::load_with(paths, |key| std::env::var(key).ok())
    }

    pub fn load_with(paths: RougePaths, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let toml = RougeToml::load_or_default(&paths.config_file())?;
        Ok(Self::from_parts(paths, toml, lookup))
    }

    pub fn from_parts(
        paths: RougePaths,
        toml: RougeToml,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let env = ENV_KEYS
            .iter()
            .filter_map(|key| {
                lookup(key)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (key.to_string(), v.trim().to_string()))
            })
            .collect();
        Self { paths, toml, env }
    }

    fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    pub fn data_dir(&self) -> &Path {
        self.paths.base_dir()
    }

    /// Database URL (env → file → SQLite file in the data directory).
    pub fn database_url(&self) -> String {
        self.env("ROUGE_DATABASE_URL")
            .or_else(|| self.env("DATABASE_URL"))
            .map(str::to_string)
            .or_else(|| self.toml.database.url.clone())
            .unwrap_or_else(|| self.paths.default_database().display().to_string())
    }

    pub fn database_backend(&self) -> DatabaseBackend {
        let url = self.database_url();
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseBackend::Postgres(url)
        } else {
            let path = url.strip_prefix("sqlite://").unwrap_or(&url);
            DatabaseBackend::Sqlite(PathBuf::from(path))
        }
    }

    pub fn default_provider(&self) -> String {
        self.env("ROUGE_AGENT_PROVIDER")
            .map(str::to_string)
            .unwrap_or_else(|| self.toml.providers.default.clone())
    }

    /// Provider for implementation steps (env → file → default provider).
    pub fn implement_provider(&self) -> String {
        self.env("ROUGE_IMPLEMENT_PROVIDER")
            .map(str::to_string)
            .or_else(|| self.toml.providers.implement.clone())
            .unwrap_or_else(|| self.default_provider())
    }

    pub fn claude_cmd(&self) -> String {
        self.env("CLAUDE_CMD")
            .map(str::to_string)
            .or_else(|| self.toml.providers.claude_cmd.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    pub fn opencode_cmd(&self) -> String {
        self.env("OPENCODE_CMD")
            .map(str::to_string)
            .or_else(|| self.toml.providers.opencode_cmd.clone())
            .unwrap_or_else(|| "opencode".to_string())
    }

    /// Explicit pipeline command, if configured. `None` means "this executable".
    pub fn pipeline_command(&self) -> Option<String> {
        self.env("ROUGE_PIPELINE_COMMAND")
            .map(str::to_string)
            .or_else(|| self.toml.worker.pipeline_command.clone())
    }

    pub fn log_level(&self) -> String {
        self.env("ROUGE_LOG_LEVEL")
            .map(str::to_lowercase)
            .filter(|lvl| LOG_LEVELS.contains(&lvl.as_str()))
            .unwrap_or_else(|| self.toml.logging.level.to_lowercase())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.toml.worker.poll_interval_secs)
    }

    /// Workflow timeout; an invalid or non-positive env value is ignored with a warning.
    pub fn workflow_timeout(&self) -> Duration {
        if let Some(raw) = self.env("ROUGE_WORKFLOW_TIMEOUT_SECONDS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => return Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = raw,
                    "Ignoring invalid ROUGE_WORKFLOW_TIMEOUT_SECONDS"
                ),
            }
        }
        Duration::from_secs(self.toml.worker.workflow_timeout_secs)
    }

    pub fn step_settings(&self, step: StepId) -> StepSettings {
        self.toml.step_settings(step.as_str())
    }

    pub fn main_targets(&self) -> Result<Vec<StepId>> {
        parse_targets(&self.toml.pipeline.main_targets, "main_targets")
    }

    pub fn patch_targets(&self) -> Result<Vec<StepId>> {
        parse_targets(&self.toml.pipeline.patch_targets, "patch_targets")
    }

    /// Validate the effective configuration and return warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        for (label, name) in [
            ("ROUGE_AGENT_PROVIDER", self.env("ROUGE_AGENT_PROVIDER")),
            ("ROUGE_IMPLEMENT_PROVIDER", self.env("ROUGE_IMPLEMENT_PROVIDER")),
        ] {
            if let Some(name) = name
                && !KNOWN_PROVIDERS.contains(&name)
            {
                warnings.push(format!("Unknown provider '{}' in {}", name, label));
            }
        }
        warnings
    }
}

fn parse_targets(names: &[String], field: &str) -> Result<Vec<StepId>> {
    if names.is_empty() {
        bail!("[pipeline] {} must name at least one step", field);
    }
    names
        .iter()
        .map(|name| {
            name.parse::<StepId>()
                .with_context(|| format!("Invalid step in [pipeline] {}", field))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn config_with(toml: RougeToml, vars: &[(&str, &str)]) -> RougeConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RougeConfig::from_parts(RougePaths::new("/data"), toml, move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_pattern_matches() {
        assert!(pattern_matches("plan", "plan"));
        assert!(pattern_matches("patch_*", "patch_plan"));
        assert!(pattern_matches("*implement", "patch_implement"));
        assert!(pattern_matches("*_*", "fetch_issue"));
        assert!(pattern_matches("revie?", "review"));
        assert!(pattern_matches("PLAN", "plan"));
        assert!(pattern_matches("*", "anything"));
        assert!(!pattern_matches("patch_*", "plan"));
        assert!(!pattern_matches("revie?", "reviews"));
    }

    #[test]
    fn test_pattern_with_many_stars_stays_fast() {
        let pattern = "*a".repeat(30) + "b";
        let name = "a".repeat(60);
        let start = std::time::Instant::now();
        assert!(!pattern_matches(&pattern, &name));
        assert!(pattern_matches(&"*a".repeat(30), &name));
        assert!(start.elapsed() < Duration::from_secs(1));

        assert!(pattern_matches("**", ""));
        assert!(pattern_matches("a*b*c", "axxbyyc"));
        assert!(!pattern_matches("a*b*c", "axxbyy"));
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let cfg = RougeToml::parse("").unwrap();
        assert_eq!(cfg.worker.poll_interval_secs, 10);
        assert_eq!(cfg.worker.workflow_timeout_secs, 3600);
        assert_eq!(cfg.providers.default, "claude");
        assert_eq!(
            cfg.pipeline.main_targets,
            vec!["address_review", "code_quality", "validate_acceptance"]
        );
        assert_eq!(cfg.defaults.max_retries, 2);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn test_step_overrides() {
        let cfg = RougeToml::parse(
            r#"
[defaults]
max_retries = 3
step_timeout_secs = 60

[steps.overrides."*implement"]
timeout_secs = 600

[steps.overrides."patch_implement"]
max_retries = 0
"#,
        )
        .unwrap();

        let plan = cfg.step_settings("plan");
        assert_eq!(plan.max_retries, 3);
        assert_eq!(plan.timeout, Duration::from_secs(60));

        let implement = cfg.step_settings("implement");
        assert_eq!(implement.timeout, Duration::from_secs(600));
        assert_eq!(implement.max_retries, 3);

        let patch = cfg.step_settings("patch_implement");
        assert_eq!(patch.timeout, Duration::from_secs(600));
        assert_eq!(patch.max_retries, 0);
    }

    #[test]
    fn test_validate_reports_problems() {
        let cfg = RougeToml::parse(
            r#"
[worker]
poll_interval_secs = 0

[providers]
default = "gpt"

[pipeline]
main_targets = ["deploy"]

[steps.overrides."build*"]
max_retries = 1
"#,
        )
        .unwrap();
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.contains("poll_interval_secs")));
        assert!(warnings.iter().any(|w| w.contains("gpt")));
        assert!(warnings.iter().any(|w| w.contains("deploy")));
        assert!(warnings.iter().any(|w| w.contains("build*")));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = RougeToml::default();
        toml.providers.claude_cmd = Some("/opt/claude".to_string());
        toml.providers.implement = Some("opencode".to_string());

        let cfg = config_with(toml.clone(), &[]);
        assert_eq!(cfg.claude_cmd(), "/opt/claude");
        assert_eq!(cfg.implement_provider(), "opencode");

        let cfg = config_with(
            toml,
            &[("CLAUDE_CMD", "/usr/bin/claude"), ("ROUGE_IMPLEMENT_PROVIDER", "claude")],
        );
        assert_eq!(cfg.claude_cmd(), "/usr/bin/claude");
        assert_eq!(cfg.implement_provider(), "claude");
    }

    #[test]
    fn test_implement_provider_falls_back_to_default() {
        let cfg = config_with(RougeToml::default(), &[("ROUGE_AGENT_PROVIDER", "opencode")]);
        assert_eq!(cfg.default_provider(), "opencode");
        assert_eq!(cfg.implement_provider(), "opencode");
    }

    #[test]
    fn test_database_backend_selection() {
        let cfg = config_with(RougeToml::default(), &[]);
        assert_eq!(
            cfg.database_backend(),
            DatabaseBackend::Sqlite(PathBuf::from("/data/rouge.db"))
        );

        let cfg = config_with(RougeToml::default(), &[("DATABASE_URL", "postgres://db/rouge")]);
        assert_eq!(
            cfg.database_backend(),
            DatabaseBackend::Postgres("postgres://db/rouge".to_string())
        );

        let cfg = config_with(
            RougeToml::default(),
            &[("DATABASE_URL", "postgres://db/a"), ("ROUGE_DATABASE_URL", "sqlite:///tmp/q.db")],
        );
        assert_eq!(cfg.database_backend(), DatabaseBackend::Sqlite(PathBuf::from("/tmp/q.db")));
    }

    #[test]
    fn test_workflow_timeout_env() {
        let cfg = config_with(RougeToml::default(), &[("ROUGE_WORKFLOW_TIMEOUT_SECONDS", "120")]);
        assert_eq!(cfg.workflow_timeout(), Duration::from_secs(120));

        let cfg = config_with(RougeToml::default(), &[("ROUGE_WORKFLOW_TIMEOUT_SECONDS", "-5")]);
        assert_eq!(cfg.workflow_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_log_level_env_must_be_known() {
        let cfg = config_with(RougeToml::default(), &[("ROUGE_LOG_LEVEL", "DEBUG")]);
        assert_eq!(cfg.log_level(), "debug");
        let cfg = config_with(RougeToml::default(), &[("ROUGE_LOG_LEVEL", "loud")]);
        assert_eq!(cfg.log_level(), "info");
    }

    #[test]
    fn test_targets_parse() {
        let cfg = config_with(RougeToml::default(), &[]);
        assert_eq!(
            cfg.main_targets().unwrap(),
            vec![StepId::AddressReview, StepId::CodeQuality, StepId::ValidateAcceptance]
        );
        assert_eq!(cfg.patch_targets().unwrap(), vec![StepId::PatchImplement]);

        let mut toml = RougeToml::default();
        toml.pipeline.patch_targets = vec![];
        assert!(config_with(toml, &[]).patch_targets().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("rouge.toml");
        let mut toml = RougeToml::default();
        toml.worker.poll_interval_secs = 3;
        toml.steps.overrides.insert(
            "plan".to_string(),
            StepOverride {
                max_retries: Some(5),
                timeout_secs: None,
            },
        );
        toml.save(&path).unwrap();

        let loaded = RougeToml::load(&path).unwrap();
        assert_eq!(loaded.worker.poll_interval_secs, 3);
        assert_eq!(loaded.step_settings("plan").max_retries, 5);
    }

    #[test]
    fn test_load_with_missing_file() {
        let dir = tempdir().unwrap();
        let cfg = RougeConfig::load_with(RougePaths::new(dir.path()), no_env).unwrap();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(10));
        assert!(cfg.pipeline_command().is_none());
    }
}
