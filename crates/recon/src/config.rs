use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::model::ClassName;

pub const DEFAULT_FREE_CLASS_LABEL: &str = "Free Class - New York Salsa";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything a sync run needs besides its two explicit inputs
/// (`window_start`, `today`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Free classes more than this many days in the past are dropped.
    #[serde(default = "default_recency_days")]
    pub recency_days: u32,
    /// Window start = term start (or today) minus this many weeks.
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: u32,
    #[serde(default)]
    pub term: TermConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub social: SocialConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

fn default_name() -> String {
    "sync".into()
}

fn default_recency_days() -> u32 {
    14
}

fn default_lookback_weeks() -> u32 {
    5
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            recency_days: default_recency_days(),
            lookback_weeks: default_lookback_weeks(),
            term: TermConfig::default(),
            classification: ClassificationConfig::default(),
            social: SocialConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Term
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TermConfig {
    /// Term number paid enrollments are scoped to (`"2"`). Unset = no scope.
    #[serde(default)]
    pub current: Option<String>,
    /// First day of the current term.
    #[serde(default)]
    pub start: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassificationConfig {
    #[serde(default = "default_free_class_label")]
    pub free_class_label: String,
    /// Extra rules, checked after free-class detection and before the
    /// built-in table.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_free_class_label() -> String {
    DEFAULT_FREE_CLASS_LABEL.into()
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            free_class_label: default_free_class_label(),
            rules: Vec::new(),
        }
    }
}

/// Title substrings (any of) that map to a class.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub contains: Vec<String>,
    pub class: ClassName,
}

// ---------------------------------------------------------------------------
// Social + Lock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SocialConfig {
    #[serde(default = "default_social_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_guest_keywords")]
    pub guest_keywords: Vec<String>,
}

fn default_social_keywords() -> Vec<String> {
    vec!["social".into()]
}

fn default_guest_keywords() -> Vec<String> {
    vec!["special guest".into()]
}

impl Default for SocialConfig {
    fn default() -> Self {
        Self {
            keywords: default_social_keywords(),
            guest_keywords: default_guest_keywords(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockConfig {
    /// A lock older than this is considered abandoned and may be taken over.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u32,
}

fn default_ttl_minutes() -> u32 {
    30
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_ttl_minutes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: SyncConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recency_days > 366 {
            return Err(ConfigError::Validation(format!(
                "recency_days must be at most 366, got {}",
                self.recency_days
            )));
        }

        if self.lookback_weeks == 0 {
            return Err(ConfigError::Validation(
                "lookback_weeks must be at least 1".into(),
            ));
        }

        if let Some(ref term) = self.term.current {
            if term.is_empty() || !term.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::Validation(format!(
                    "term.current must be a term number like \"2\", got {term:?}"
                )));
            }
        }

        if self.classification.free_class_label.trim().is_empty() {
            return Err(ConfigError::Validation(
                "classification.free_class_label must not be empty".into(),
            ));
        }

        for (i, rule) in self.classification.rules.iter().enumerate() {
            if rule.contains.is_empty() || rule.contains.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "classification.rules[{i}]: contains must list non-empty patterns"
                )));
            }
            if matches!(
                rule.class,
                ClassName::Unknown | ClassName::Bundle | ClassName::FreeClass
            ) {
                return Err(ConfigError::Validation(format!(
                    "classification.rules[{i}]: class '{}' cannot be assigned by a rule",
                    rule.class
                )));
            }
        }

        if self.social.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "social.keywords must not contain empty patterns".into(),
            ));
        }

        if self.lock.ttl_minutes == 0 {
            return Err(ConfigError::Validation(
                "lock.ttl_minutes must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Default sync window: term start (if configured) or `today`, minus
    /// `lookback_weeks`, at midnight UTC.
    pub fn window_start(&self, today: NaiveDate) -> DateTime<Utc> {
        let anchor = self.term.start.unwrap_or(today);
        let start = anchor - Duration::weeks(i64::from(self.lookback_weeks));
        start.and_time(NaiveTime::MIN).and_utc()
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::minutes(i64::from(self.lock.ttl_minutes))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "Term 2 sync"
recency_days = 14
lookback_weeks = 5

[term]
current = "2"
start = "2025-04-28"

[classification]
free_class_label = "Free Class - New York Salsa"

[[classification.rules]]
contains = ["beginner"]
class = "level_1"

[social]
keywords = ["social", "party"]

[lock]
ttl_minutes = 10
"#;

    #[test]
    fn parse_full() {
        let config = SyncConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name, "Term 2 sync");
        assert_eq!(config.term.current.as_deref(), Some("2"));
        assert_eq!(config.classification.rules.len(), 1);
        assert_eq!(config.classification.rules[0].class, ClassName::Level1);
        assert_eq!(config.social.keywords, vec!["social", "party"]);
        assert_eq!(config.social.guest_keywords, vec!["special guest"]);
        assert_eq!(config.lock.ttl_minutes, 10);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = SyncConfig::from_toml("").unwrap();
        assert_eq!(config.recency_days, 14);
        assert_eq!(config.lookback_weeks, 5);
        assert!(config.term.current.is_none());
        assert_eq!(config.classification.free_class_label, DEFAULT_FREE_CLASS_LABEL);
    }

    #[test]
    fn window_start_prefers_term_start() {
        let config = SyncConfig::from_toml(FULL).unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(
            config.window_start(today).date_naive(),
            NaiveDate::from_ymd_opt(2025, 3, 24).unwrap()
        );

        let plain = SyncConfig::default();
        assert_eq!(
            plain.window_start(today).date_naive(),
            NaiveDate::from_ymd_opt(2025, 5, 11).unwrap()
        );
    }

    #[test]
    fn reject_non_numeric_term() {
        let err = SyncConfig::from_toml("[term]\ncurrent = \"two\"").unwrap_err();
        assert!(err.to_string().contains("term.current"));
    }

    #[test]
    fn reject_rule_for_bundle() {
        let input = r#"
[[classification.rules]]
contains = ["combo"]
class = "bundle"
"#;
        let err = SyncConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("cannot be assigned"));
    }

    #[test]
    fn reject_unknown_field() {
        let err = SyncConfig::from_toml("recency = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reject_zero_ttl() {
        let err = SyncConfig::from_toml("[lock]\nttl_minutes = 0").unwrap_err();
        assert!(err.to_string().contains("ttl_minutes"));
    }
}
