//! stratus.yaml schema and its conversion into runtime values

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use stratus_cloud::{ClassifierConfig, RetryPolicy, Timeouts};

/// Contents of a settings file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub poll: PollSettings,
    /// Per-provider additions to the classifier, keyed by provider name
    /// ("sakura-cloud", "cloudflare")
    pub classifier: HashMap<String, ClassifierOverrides>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_wait_secs: u64,
    pub increment_secs: u64,
    /// When set, waits grow geometrically instead of by `increment_secs`
    pub growth_factor: Option<f64>,
    pub max_wait_secs: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_wait_secs: 2,
            increment_secs: 2,
            growth_factor: None,
            max_wait_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub create_secs: u64,
    pub read_secs: u64,
    pub update_secs: u64,
    pub delete_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            create_secs: 20 * 60,
            read_secs: 5 * 60,
            update_secs: 20 * 60,
            delete_secs: 20 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub max_interval_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            max_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierOverrides {
    pub not_found_codes: Vec<String>,
    pub transient_codes: Vec<String>,
    /// Regular expressions matched against provider codes
    pub transient_code_patterns: Vec<String>,
    pub already_exists_substrings: Vec<String>,
}

impl ClassifierOverrides {
    /// Extend `base` with these additions
    pub fn apply(&self, base: ClassifierConfig) -> Result<ClassifierConfig> {
        let mut config = base
            .not_found_codes(self.not_found_codes.iter().cloned())
            .transient_codes(self.transient_codes.iter().cloned())
            .already_exists_substrings(self.already_exists_substrings.iter().cloned());
        for pattern in &self.transient_code_patterns {
            config = config.transient_code_pattern(pattern)?;
        }
        Ok(config)
    }
}

impl Settings {
    /// Parse settings from YAML text
    pub fn from_yaml(path: &Path, text: &str) -> Result<Self> {
        // an empty file is a valid, default configuration
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read and parse a settings file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(path, &text)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.initial_wait_secs == 0 {
            return Err(ConfigError::Invalid(
                "retry.initial_wait_secs must be greater than 0".to_string(),
            ));
        }
        let factor = self.retry.growth_factor.unwrap_or(1.0);
        if factor.is_nan() || factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry.growth_factor must be at least 1.0 (got {})",
                factor
            )));
        }
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.poll.max_interval_secs < self.poll.interval_secs {
            return Err(ConfigError::Invalid(format!(
                "poll.max_interval_secs ({}) is smaller than poll.interval_secs ({})",
                self.poll.max_interval_secs, self.poll.interval_secs
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let retry = &self.retry;
        let mut policy = RetryPolicy::new(Duration::from_secs(retry.initial_wait_secs));
        policy = match retry.growth_factor {
            Some(factor) => policy.growth_factor(factor),
            None => policy.increment(Duration::from_secs(retry.increment_secs)),
        };
        if let Some(max) = retry.max_wait_secs {
            policy = policy.max_wait(Duration::from_secs(max));
        }
        policy
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            create: Duration::from_secs(self.timeouts.create_secs),
            read: Duration::from_secs(self.timeouts.read_secs),
            update: Duration::from_secs(self.timeouts.update_secs),
            delete: Duration::from_secs(self.timeouts.delete_secs),
        }
    }

    /// Initial and maximum sleep between polls
    pub fn poll_interval(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.poll.interval_secs),
            Duration::from_secs(self.poll.max_interval_secs),
        )
    }

    /// Apply the overrides for `provider`, if any, on top of `base`
    pub fn classifier_config(&self, provider: &str, base: ClassifierConfig) -> Result<ClassifierConfig> {
        match self.classifier.get(provider) {
            Some(overrides) => {
                tracing::debug!(provider, "applying classifier overrides");
                overrides.apply(base)
            }
            None => Ok(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_cloud::{ErrorClassifier, ErrorKind, OperationError};

    fn parse(text: &str) -> Result<Settings> {
        Settings::from_yaml(Path::new("stratus.yaml"), text)
    }

    #[test]
    fn test_defaults() {
        let settings = parse("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.timeouts(), Timeouts::default());
        assert_eq!(
            settings.poll_interval(),
            (Duration::from_secs(2), Duration::from_secs(10))
        );
    }

    #[test]
    fn test_partial_file() {
        let settings = parse(
            r#"
retry:
  initial_wait_secs: 3
  increment_secs: 3
timeouts:
  create_secs: 30
"#,
        )
        .unwrap();

        let policy = settings.retry_policy();
        assert_eq!(policy.initial_wait, Duration::from_secs(3));
        assert_eq!(policy.growth, stratus_cloud::Growth::Increment(Duration::from_secs(3)));
        assert_eq!(policy.max_wait, None);
        assert_eq!(settings.timeouts().create, Duration::from_secs(30));
        assert_eq!(settings.timeouts().delete, Duration::from_secs(1200));
    }

    #[test]
    fn test_growth_factor_and_cap() {
        let settings = parse(
            r#"
retry:
  initial_wait_secs: 1
  growth_factor: 2.0
  max_wait_secs: 30
"#,
        )
        .unwrap();
        let policy = settings.retry_policy();
        assert_eq!(policy.max_wait, Some(Duration::from_secs(30)));
        assert!(matches!(policy.growth, stratus_cloud::Growth::Factor(f) if f == 2.0));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            parse("retry:\n  growth_factor: 0.5\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse("poll:\n  interval_secs: 20\n  max_interval_secs: 5\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            parse("retry:\n  initial_wait_secs: 0\n  increment_secs: 0\n"),
            Err(ConfigError::Invalid(msg)) if msg.contains("retry.initial_wait_secs")
        ));
        assert!(matches!(parse("retry: [1, 2"), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_classifier_overrides() {
        let settings = parse(
            r#"
classifier:
  sakura-cloud:
    transient_codes: ["disk_attaching"]
    transient_code_patterns: ["^limit_"]
    not_found_codes: ["gone"]
"#,
        )
        .unwrap();

        let config = settings
            .classifier_config("sakura-cloud", stratus_cloud::ClassifierConfig::default())
            .unwrap();
        let classifier = ErrorClassifier::new(config);

        let attaching = OperationError::unclassified("attaching").with_code("disk_attaching");
        assert_eq!(classifier.classify(&attaching), ErrorKind::Transient);
        let limited = OperationError::unclassified("slow down").with_code("limit_api");
        assert_eq!(classifier.classify(&limited), ErrorKind::Transient);
        let gone = OperationError::unclassified("whatever").with_code("gone");
        assert_eq!(classifier.classify(&gone), ErrorKind::NotFound);

        // other providers are untouched
        let plain = ErrorClassifier::new(
            settings
                .classifier_config("cloudflare", stratus_cloud::ClassifierConfig::default())
                .unwrap(),
        );
        assert_eq!(plain.classify(&attaching), ErrorKind::Unclassified);
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let settings = parse(
            r#"
classifier:
  cloudflare:
    transient_code_patterns: ["(unclosed"]
"#,
        )
        .unwrap();
        let err = settings
            .classifier_config("cloudflare", stratus_cloud::ClassifierConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
