use std::path::Path;
use std::time::Duration;

use error_stack::{Report, ResultExt};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::{Target, TargetId};
use crate::tracker::TrackerSettings;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_data_dir() -> String {
    "./data".into()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_recent_window() -> usize {
    10
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_currency() -> String {
    "INR".into()
}

fn default_status_log_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_notifier_kind() -> String {
    "terminal".into()
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_true")]
    pub notify_unchanged: bool,
    /// Period of the status summary log line; `0` disables it.
    #[serde(default = "default_status_log_secs")]
    pub status_log_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    /// Accepted values: `"terminal"` | `"webhook"`
    #[serde(default = "default_notifier_kind")]
    pub kind: String,
    pub webhook_url: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: default_notifier_kind(),
            webhook_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    pub id: Option<String>,
    pub url: String,
    pub owner: String,
    pub threshold: Decimal,
    pub interval_secs: Option<u64>,
}

impl TargetConfig {
    fn target_id(&self) -> TargetId {
        match &self.id {
            Some(id) => TargetId::new(id.as_str()),
            None => TargetId::derive(&self.owner, &self.url),
        }
    }
}

impl AppConfig {
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            interval: Duration::from_secs(self.general.poll_interval_secs),
            fetch_timeout: Duration::from_secs(self.general.fetch_timeout_secs),
            recent_window: self.general.recent_window,
            currency: self.general.currency.clone(),
            notify_unchanged: self.general.notify_unchanged,
        }
    }

    /// Build targets from the `[[targets]]` entries. Entries without an id
    /// get one derived from owner and URL.
    pub fn targets(&self) -> Vec<Target> {
        self.targets
            .iter()
            .map(|t| Target {
                id: t.target_id(),
                url: t.url.clone(),
                owner: t.owner.clone(),
                threshold: t.threshold,
                interval: t.interval_secs.map(Duration::from_secs),
            })
            .collect()
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

const VALID_LOG_FORMATS: &[&str] = &["text", "json"];
const VALID_NOTIFIERS: &[&str] = &["terminal", "webhook"];

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_general(config)?;
    validate_notifier(config)?;
    validate_targets(config)?;
    validate_target_ids_unique(config)?;
    Ok(())
}

fn invalid(field: String) -> Report<ConfigError> {
    Report::new(ConfigError::Validation { field })
}

fn validate_general(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let general = &config.general;
    if !VALID_LOG_FORMATS.contains(&general.log_format.as_str()) {
        return Err(invalid(format!(
            "general.log_format \"{}\" is not valid",
            general.log_format
        )));
    }
    if general.poll_interval_secs == 0 {
        return Err(invalid("general.poll_interval_secs must be positive".into()));
    }
    if general.fetch_timeout_secs == 0 {
        return Err(invalid("general.fetch_timeout_secs must be positive".into()));
    }
    if general.recent_window == 0 {
        return Err(invalid("general.recent_window must be positive".into()));
    }
    if general.requests_per_second == 0 {
        return Err(invalid("general.requests_per_second must be positive".into()));
    }
    Ok(())
}

fn validate_notifier(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let notifier = &config.notifier;
    if !VALID_NOTIFIERS.contains(&notifier.kind.as_str()) {
        return Err(invalid(format!(
            "notifier.kind \"{}\" is not valid",
            notifier.kind
        )));
    }
    if notifier.kind == "webhook" && notifier.webhook_url.is_none() {
        return Err(invalid(
            "notifier.webhook_url is required for kind \"webhook\"".into(),
        ));
    }
    Ok(())
}

fn validate_targets(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    for target in &config.targets {
        let label = target.id.as_deref().unwrap_or(&target.url);
        if !(target.url.starts_with("http://") || target.url.starts_with("https://")) {
            return Err(invalid(format!(
                "targets[\"{label}\"].url must be an http(s) URL"
            )));
        }
        if target.owner.trim().is_empty() {
            return Err(invalid(format!("targets[\"{label}\"].owner is empty")));
        }
        if target.threshold.is_sign_negative() {
            return Err(invalid(format!(
                "targets[\"{label}\"].threshold must not be negative"
            )));
        }
        if target.interval_secs == Some(0) {
            return Err(invalid(format!(
                "targets[\"{label}\"].interval_secs must be positive"
            )));
        }
    }
    Ok(())
}

fn validate_target_ids_unique(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    let mut seen = std::collections::HashSet::new();
    for id in config.targets.iter().map(TargetConfig::target_id) {
        if !seen.insert(id.clone()) {
            return Err(invalid(format!("targets: duplicate id \"{id}\"")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"
data_dir = "/tmp/data"
poll_interval_secs = 30
fetch_timeout_secs = 5
recent_window = 20
requests_per_second = 4
currency = "USD"
notify_unchanged = false
status_log_secs = 0

[notifier]
kind = "webhook"
webhook_url = "https://hooks.example.com/price"

[[targets]]
id = "echo-dot"
url = "https://www.amazon.in/dp/B09B8V1LZ3"
owner = "alice"
threshold = 2999.50
interval_secs = 60
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.notifier.kind, "webhook");

        let settings = config.tracker_settings();
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.fetch_timeout, Duration::from_secs(5));
        assert!(!settings.notify_unchanged);

        let targets = config.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id, TargetId::new("echo-dot"));
        assert_eq!(targets[0].threshold, Decimal::new(2_999_50, 2));
        assert_eq!(targets[0].interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn example_config_is_valid() {
        let config = parse(include_str!("../config.example.toml"));
        assert!(validate(&config).is_ok());
        assert_eq!(config.targets().len(), 2);
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse("[general]\n");
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.general.data_dir, "./data");
        assert_eq!(config.general.poll_interval_secs, 10);
        assert_eq!(config.general.fetch_timeout_secs, 15);
        assert_eq!(config.general.recent_window, 10);
        assert_eq!(config.general.requests_per_second, 2);
        assert!(config.general.notify_unchanged);
        assert_eq!(config.notifier.kind, "terminal");
        assert!(config.targets.is_empty());
    }

    #[test]
    fn integer_threshold_and_missing_id_accepted() {
        let toml = r#"
[general]

[[targets]]
url = "https://www.amazon.in/dp/B09B8V1LZ3"
owner = "alice"
threshold = 500
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        let targets = config.targets();
        assert_eq!(targets[0].threshold, Decimal::from(500));
        assert!(!targets[0].id.as_str().is_empty());
        assert_eq!(targets[0].interval, None);
    }

    #[test]
    fn missing_id_is_stable_across_loads() {
        let toml = r#"
[general]

[[targets]]
url = "https://www.amazon.in/dp/B09B8V1LZ3"
owner = "alice"
threshold = 500
"#;
        let first = parse(toml).targets();
        let second = parse(toml).targets();
        assert_eq!(first[0].id, second[0].id);
    }

    #[test]
    fn same_url_and_owner_without_ids_rejected() {
        let toml = r#"
[general]

[[targets]]
url = "https://example.com/a"
owner = "alice"
threshold = 10

[[targets]]
url = "https://example.com/a"
owner = "alice"
threshold = 20
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn webhook_without_url_rejected() {
        let config = parse("[general]\n[notifier]\nkind = \"webhook\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_notifier_rejected() {
        let config = parse("[general]\n[notifier]\nkind = \"sms\"\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let config = parse("[general]\npoll_interval_secs = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn non_http_url_rejected() {
        let toml = r#"
[general]

[[targets]]
url = "ftp://example.com/item"
owner = "alice"
threshold = 10
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn negative_threshold_rejected() {
        let toml = r#"
[general]

[[targets]]
url = "https://example.com/item"
owner = "alice"
threshold = -1
"#;
        assert!(validate(&parse(toml)).is_err());
    }

    #[test]
    fn duplicate_target_ids_rejected() {
        let toml = r#"
[general]

[[targets]]
id = "dup"
url = "https://example.com/a"
owner = "alice"
threshold = 10

[[targets]]
id = "dup"
url = "https://example.com/b"
owner = "bob"
threshold = 20
"#;
        assert!(validate(&parse(toml)).is_err());
    }
}
