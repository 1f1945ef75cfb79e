use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{NotifierError, NotifierResult};

/// Upper bound for the poll interval and retry delay: one week
const MAX_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;
/// Upper bound for lead time, overlap and query timeout: one day
const MAX_OFFSET_SECS: u64 = 24 * 60 * 60;
const MAX_BUSY_EPSILON_MS: u64 = 60 * 1000;

/// How the pending guard treats multiple armed actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardPolicy {
    /// Stay busy until every armed action has released
    #[default]
    Outstanding,
    /// Last mark wins and any release clears the guard
    LastWriteWins,
}

impl FromStr for GuardPolicy {
    type Err = NotifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "outstanding" => Ok(GuardPolicy::Outstanding),
            "last-write-wins" | "last_write_wins" => Ok(GuardPolicy::LastWriteWins),
            other => Err(NotifierError::Config(format!(
                "unknown guard policy '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// How often the periodic driver re-plans (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Extra window length past one poll period (seconds)
    #[serde(default = "default_overlap")]
    pub overlap_secs: u64,

    /// Forward offset from now to the window start (seconds)
    #[serde(default = "default_lead_time")]
    pub lead_time_secs: u64,

    /// Consecutive query failures before a cycle is abandoned
    #[serde(default = "default_max_errors")]
    pub max_errors: u32,

    /// Delay between query retries (seconds)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    /// Time allowed for one calendar query before it counts as a failure (seconds)
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Maximum events requested per window
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Slack added to a deferred re-plan (milliseconds)
    #[serde(default = "default_busy_epsilon")]
    pub busy_epsilon_ms: u64,

    #[serde(default)]
    pub guard_policy: GuardPolicy,

    /// Path to the JSON file holding the API key and calendar ID
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

fn default_poll_interval() -> u64 {
    1800 // 30 minutes
}

fn default_overlap() -> u64 {
    60
}

fn default_lead_time() -> u64 {
    10
}

fn default_max_errors() -> u32 {
    10
}

fn default_retry_delay() -> u64 {
    60
}

fn default_query_timeout() -> u64 {
    30
}

fn default_max_results() -> u32 {
    10
}

fn default_busy_epsilon() -> u64 {
    10
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("google_api_key.json")
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            overlap_secs: default_overlap(),
            lead_time_secs: default_lead_time(),
            max_errors: default_max_errors(),
            retry_delay_secs: default_retry_delay(),
            query_timeout_secs: default_query_timeout(),
            max_results: default_max_results(),
            busy_epsilon_ms: default_busy_epsilon(),
            guard_policy: GuardPolicy::default(),
            credentials_path: default_credentials_path(),
        }
    }
}

impl NotifierConfig {
    /// Load configuration from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> NotifierResult<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                let config: NotifierConfig = toml::from_str(&content)?;
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Load from an optional file, then apply `NOTIFIER_*` environment overrides
    pub fn from_file_and_env(path: Option<&Path>) -> NotifierResult<Self> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from a key lookup (normally the process environment)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> NotifierResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: FromStr>(key: &str, value: &str) -> NotifierResult<T> {
            value
                .trim()
                .parse()
                .map_err(|_| NotifierError::invalid_env(key, value))
        }

        if let Some(v) = lookup("NOTIFIER_POLL_INTERVAL_SECS") {
            self.poll_interval_secs = parse("NOTIFIER_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_OVERLAP_SECS") {
            self.overlap_secs = parse("NOTIFIER_OVERLAP_SECS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_LEAD_TIME_SECS") {
            self.lead_time_secs = parse("NOTIFIER_LEAD_TIME_SECS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_MAX_ERRORS") {
            self.max_errors = parse("NOTIFIER_MAX_ERRORS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_RETRY_DELAY_SECS") {
            self.retry_delay_secs = parse("NOTIFIER_RETRY_DELAY_SECS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_QUERY_TIMEOUT_SECS") {
            self.query_timeout_secs = parse("NOTIFIER_QUERY_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_MAX_RESULTS") {
            self.max_results = parse("NOTIFIER_MAX_RESULTS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_BUSY_EPSILON_MS") {
            self.busy_epsilon_ms = parse("NOTIFIER_BUSY_EPSILON_MS", &v)?;
        }
        if let Some(v) = lookup("NOTIFIER_GUARD_POLICY") {
            self.guard_policy = v.parse()?;
        }
        if let Some(v) = lookup("NOTIFIER_CREDENTIALS_PATH") {
            self.credentials_path = PathBuf::from(v);
        }

        Ok(())
    }

    /// Reject values the planner cannot work with. Durations are capped so
    /// that window and timer arithmetic on wall-clock instants stays in range.
    pub fn validate(&self) -> NotifierResult<()> {
        fn in_range(name: &str, value: u64, min: u64, max: u64) -> NotifierResult<()> {
            if value < min || value > max {
                return Err(NotifierError::Config(format!(
                    "{} must be between {} and {} (got {})",
                    name, min, max, value
                )));
            }
            Ok(())
        }

        in_range("poll_interval_secs", self.poll_interval_secs, 1, MAX_PERIOD_SECS)?;
        in_range("retry_delay_secs", self.retry_delay_secs, 1, MAX_PERIOD_SECS)?;
        in_range("query_timeout_secs", self.query_timeout_secs, 1, MAX_OFFSET_SECS)?;
        in_range("overlap_secs", self.overlap_secs, 0, MAX_OFFSET_SECS)?;
        in_range("lead_time_secs", self.lead_time_secs, 0, MAX_OFFSET_SECS)?;
        in_range("busy_epsilon_ms", self.busy_epsilon_ms, 0, MAX_BUSY_EPSILON_MS)?;

        if self.max_errors == 0 {
            return Err(NotifierError::Config(
                "max_errors must be greater than zero".to_string(),
            ));
        }
        if self.max_results == 0 {
            return Err(NotifierError::Config(
                "max_results must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn overlap(&self) -> Duration {
        Duration::from_secs(self.overlap_secs)
    }

    pub fn lead_time(&self) -> Duration {
        Duration::from_secs(self.lead_time_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn busy_epsilon(&self) -> Duration {
        Duration::from_millis(self.busy_epsilon_ms)
    }
}

/// API key and calendar ID for a publicly readable Google calendar
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub api_key: String,
    #[serde(rename = "google_cal_id")]
    pub calendar_id: String,
}

impl Credentials {
    pub fn load(path: &Path) -> NotifierResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            NotifierError::Credentials(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> NotifierResult<Self> {
        let credentials: Credentials = serde_json::from_str(content)
            .map_err(|e| NotifierError::Credentials(format!("invalid credential file: {}", e)))?;

        if credentials.api_key.trim().is_empty() {
            return Err(NotifierError::Credentials("api_key is empty".to_string()));
        }
        if credentials.calendar_id.trim().is_empty() {
            return Err(NotifierError::Credentials(
                "google_cal_id is empty".to_string(),
            ));
        }

        Ok(credentials)
    }
}
