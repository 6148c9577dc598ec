use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Upper bound for `max_cache_size`.
pub const MAX_CACHE_SIZE_LIMIT: usize = 10_000;

/// Upper bound for either TTL (365 days).
pub const MAX_TTL_LIMIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
  /// How long the template name list stays fresh (milliseconds in YAML)
  #[serde(deserialize_with = "deserialize_millis")]
  pub template_list_ttl: Duration,
  /// How long generated gitignore content stays fresh (milliseconds in YAML)
  #[serde(deserialize_with = "deserialize_millis")]
  pub gitignore_cache_ttl: Duration,
  /// Maximum number of content entries kept in the persistent cache
  pub max_cache_size: usize,
  /// Templates used when none are requested explicitly
  pub default_templates: Vec<String>,
  /// Base URL replacing the public gitignore API
  pub custom_api_endpoint: Option<Url>,
  /// Where the host writes the generated file
  pub custom_gitignore_path: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      template_list_ttl: Duration::from_secs(24 * 60 * 60),
      gitignore_cache_ttl: Duration::from_secs(60 * 60),
      max_cache_size: 100,
      default_templates: Vec::new(),
      custom_api_endpoint: None,
      custom_gitignore_path: ".gitignore".to_string(),
    }
  }
}

fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let ms = u64::deserialize(deserializer)?;
  Ok(Duration::from_millis(ms))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./yagi.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/yagi/config.yaml
  ///
  /// Falls back to defaults when no file is found. The result is validated.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::validation(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("yagi.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("yagi").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::validation_with(
        format!("Failed to read config file {}: {}", path.display(), e),
        e,
      )
    })?;

    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    serde_yaml::from_str(&contents).map_err(|e| {
      Error::validation_with(
        format!("Failed to parse config: {} ({})", e, path.display()),
        e,
      )
    })
  }

  /// Parse configuration from YAML text, filling unspecified fields with defaults.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }

    serde_yaml::from_str(contents)
      .map_err(|e| Error::validation_with(format!("Failed to parse config: {}", e), e))
  }

  /// Check every field against its allowed range.
  pub fn validate(&self) -> Result<()> {
    validate_ttl(self.template_list_ttl, "templateListTtl")?;
    validate_ttl(self.gitignore_cache_ttl, "gitignoreCacheTtl")?;
    validate_cache_size(self.max_cache_size, "maxCacheSize")?;

    if self
      .default_templates
      .iter()
      .any(|template| template.trim().is_empty())
    {
      return Err(Error::validation(
        "defaultTemplates must contain non-empty strings",
      ));
    }

    if let Some(endpoint) = &self.custom_api_endpoint {
      if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
          "customApiEndpoint must be an http or https URL, got {}",
          endpoint
        )));
      }
    }

    if self.custom_gitignore_path.trim().is_empty() {
      return Err(Error::validation("customGitignorePath must not be empty"));
    }

    Ok(())
  }

  /// Identifies the endpoint in dedup keys: the custom URL or `default`.
  ///
  /// A trailing `/` is ignored; `{base}/list` and `{base}/{names}` resolve
  /// to the same URLs either way.
  pub fn endpoint_label(&self) -> String {
    self
      .custom_api_endpoint
      .as_ref()
      .map(|u| u.as_str().trim_end_matches('/').to_string())
      .unwrap_or_else(|| "default".to_string())
  }
}

fn validate_ttl(value: Duration, name: &str) -> Result<()> {
  if value.is_zero() {
    return Err(Error::validation(format!("{} must be positive, got 0", name)));
  }

  if value > MAX_TTL_LIMIT {
    return Err(Error::validation(format!(
      "{} exceeds maximum limit of {}ms (approximately 1 year), got {}",
      name,
      MAX_TTL_LIMIT.as_millis(),
      value.as_millis()
    )));
  }

  Ok(())
}

fn validate_cache_size(value: usize, name: &str) -> Result<()> {
  if value == 0 {
    return Err(Error::validation(format!("{} must be positive, got 0", name)));
  }

  if value > MAX_CACHE_SIZE_LIMIT {
    return Err(Error::validation(format!(
      "{} exceeds maximum limit of {}, got {}",
      name, MAX_CACHE_SIZE_LIMIT, value
    )));
  }

  Ok(())
}
