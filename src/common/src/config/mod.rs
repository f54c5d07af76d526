use std::path::Path;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "registry-cleaner.toml";

/// Environment variable prefix. Nested keys are separated by `__`,
/// e.g. `CLEANER__POLICY__NAME_REGEX`.
pub const ENV_PREFIX: &str = "CLEANER__";

/// Connection settings for the package registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the registry management API
    pub api_url: String,
    /// Repository owner (organisation or user namespace)
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Server-side filter query forwarded to the inventory listing
    pub fetch_query: String,
    /// Number of records requested per inventory page
    pub page_size: usize,
    /// Base URL of the container registry serving manifest lists
    pub docker_registry: String,
    /// Username for container registry basic auth
    pub username: String,
    /// API key, used both as management API key and registry password
    pub api_key: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_url: String::from("https://api.cloudsmith.io/v1/"),
            owner: String::new(),
            repo: String::new(),
            fetch_query: String::new(),
            page_size: 500,
            docker_registry: String::from("https://docker.cloudsmith.io"),
            username: String::new(),
            api_key: String::new(),
        }
    }
}

/// Retention policy options deciding which artifacts are eligible for deletion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Artifact name must match this pattern
    pub name_regex: String,
    /// Artifact format must match this pattern
    pub format_regex: String,
    /// Version tag, when present, must match this pattern
    pub version_tag_regex: String,
    /// Whether artifacts without a version tag may be deleted at all
    pub allow_missing_version_tag: bool,
    /// Minimum age in days before a tagged artifact may be deleted
    pub delete_after_days_with_tag: u32,
    /// Minimum age in days before an untagged artifact may be deleted
    pub delete_after_days_without_tag: u32,
    /// Treat container images not referenced by any manifest list as
    /// independently deletable artifacts
    pub process_images_without_parent: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name_regex: String::from("^.*$"),
            format_regex: String::from("^.*$"),
            version_tag_regex: String::from("^.+-SNAPSHOT$"),
            allow_missing_version_tag: false,
            delete_after_days_with_tag: 30,
            delete_after_days_without_tag: 30,
            process_images_without_parent: false,
        }
    }
}

/// What happens to the children of a manifest list whose own delete failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeMode {
    /// Children are attempted regardless of the parent's outcome
    #[default]
    Always,
    /// Children are only attempted after the parent was deleted
    OnParentSuccess,
}

/// Execution settings for a cleanup run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Report the eligible set without deleting anything
    pub dry_run: bool,
    /// Maximum number of manifest digest lookups in flight at once
    pub resolve_batch_size: usize,
    /// Cascade behaviour for children of a failed parent delete
    pub cascade: CascadeMode,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            resolve_batch_size: 25,
            cascade: CascadeMode::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Registry connection settings
    pub registry: RegistryConfig,
    /// Retention policy
    pub policy: PolicyConfig,
    /// Run settings
    pub cleanup: CleanupConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("registry.{0} must not be empty")]
    MissingField(&'static str),

    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: usize },
}

impl Configuration {
    /// Load configuration from defaults, `registry-cleaner.toml` and `CLEANER__*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment(Toml::file(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from an explicit TOML file, with env vars still taking precedence.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        Self::figment(Toml::file(path))
    }

    fn figment(file: figment::providers::Data<Toml>) -> Result<Self, ConfigError> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }

    /// Check the settings every run depends on.
    ///
    /// Regular expressions are compiled (and rejected) by the retention policy itself.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.owner.trim().is_empty() {
            return Err(ConfigError::MissingField("owner"));
        }
        if self.registry.repo.trim().is_empty() {
            return Err(ConfigError::MissingField("repo"));
        }
        if self.registry.page_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "registry.page_size",
                value: self.registry.page_size,
            });
        }
        if self.cleanup.resolve_batch_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "cleanup.resolve_batch_size",
                value: self.cleanup.resolve_batch_size,
            });
        }
        Ok(())
    }

    /// Copy of this configuration safe to print or log.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.registry.api_key.is_empty() {
            config.registry.api_key = String::from("***");
        }
        config
    }
}
