//! Compiled retention policy.

use chrono::Duration;
use regex::Regex;
use thiserror::Error;

use common::config::PolicyConfig;

/// Retention policy with compiled patterns and age thresholds.
///
/// Patterns are searched, not anchored: `SNAPSHOT$` matches any tag ending in
/// `SNAPSHOT`. Use `^` and `$` explicitly for whole-value matches.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    pub name: Regex,
    pub format: Regex,
    pub version_tag: Regex,
    pub allow_missing_version_tag: bool,
    pub min_age_with_tag: Duration,
    pub min_age_without_tag: Duration,
    pub process_images_without_parent: bool,
}

impl RetentionPolicy {
    /// Minimum age before an artifact may be deleted.
    pub fn min_age(&self, tagged: bool) -> Duration {
        if tagged {
            self.min_age_with_tag
        } else {
            self.min_age_without_tag
        }
    }
}

impl TryFrom<&PolicyConfig> for RetentionPolicy {
    type Error = PolicyError;

    fn try_from(config: &PolicyConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            name: compile("name_regex", &config.name_regex)?,
            format: compile("format_regex", &config.format_regex)?,
            version_tag: compile("version_tag_regex", &config.version_tag_regex)?,
            allow_missing_version_tag: config.allow_missing_version_tag,
            min_age_with_tag: Duration::days(i64::from(config.delete_after_days_with_tag)),
            min_age_without_tag: Duration::days(i64::from(config.delete_after_days_without_tag)),
            process_images_without_parent: config.process_images_without_parent,
        })
    }
}

fn compile(option: &'static str, pattern: &str) -> Result<Regex, PolicyError> {
    Regex::new(pattern).map_err(|source| PolicyError::InvalidPattern {
        option,
        pattern: pattern.to_string(),
        source,
    })
}

/// Errors raised while compiling a retention policy.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid {option} '{pattern}': {source}")]
    InvalidPattern {
        option: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
