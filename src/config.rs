//! Configuration loading via `ortho-config`.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.paperspace.io";

/// API client configuration derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SKIFF",
    discovery(
        app_name = "skiff",
        env_var = "SKIFF_CONFIG_PATH",
        config_file_name = "skiff.toml",
        dotfile_name = ".skiff.toml",
        project_file_name = "skiff.toml"
    )
)]
pub struct ApiConfig {
    /// Key sent with every request. This value is required.
    pub api_key: String,
    /// Base URL of the compute API.
    #[ortho_config(default = "https://api.paperspace.io".to_owned())]
    pub api_base_url: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ApiConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to skiff.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("skiff")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.api_key,
            &FieldMetadata::new("API key", "SKIFF_API_KEY", "api_key"),
        )?;
        Self::require_field(
            &self.api_base_url,
            &FieldMetadata::new("API base URL", "SKIFF_API_BASE_URL", "api_base_url"),
        )?;
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn config(api_key: &str, api_base_url: &str) -> ApiConfig {
        ApiConfig {
            api_key: api_key.to_owned(),
            api_base_url: api_base_url.to_owned(),
        }
    }

    #[test]
    fn validate_accepts_complete_config() {
        assert_eq!(config("key", DEFAULT_API_BASE_URL).validate(), Ok(()));
    }

    #[rstest]
    #[case("", DEFAULT_API_BASE_URL, "SKIFF_API_KEY")]
    #[case("key", "  ", "SKIFF_API_BASE_URL")]
    fn validate_names_the_missing_setting(
        #[case] api_key: &str,
        #[case] base_url: &str,
        #[case] env_var: &str,
    ) {
        let err = config(api_key, base_url)
            .validate()
            .expect_err("validation should fail");
        assert!(
            matches!(err, ConfigError::MissingField(ref message) if message.contains(env_var)),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let rendered = format!("{:?}", config("super-secret", DEFAULT_API_BASE_URL));
        assert!(!rendered.contains("super-secret"), "rendered: {rendered}");
    }
}
