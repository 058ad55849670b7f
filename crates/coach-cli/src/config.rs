//! Configuration file management for coach.
//!
//! Provides a TOML-based config file at `~/.config/coach/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use coach_core::generator::{
    ChatCompletionClient, GeneratorConfig, TextGenerator, UnavailableGenerator,
};
use coach_db::config::DbConfig;

pub const ENV_DATABASE_URL: &str = "COACH_DATABASE_URL";
pub const ENV_API_KEY: &str = "COACH_GENERATOR_API_KEY";
pub const ENV_API_URL: &str = "COACH_GENERATOR_URL";
pub const ENV_MODEL: &str = "COACH_GENERATOR_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "COACH_GENERATOR_TIMEOUT_SECS";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub generator: GeneratorSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: DbConfig::DEFAULT_URL.to_owned(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GeneratorSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the coach config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/coach` or `~/.config/coach`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("coach");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("coach")
}

/// Return the path to the coach config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse a config file. Returns an error if it does not exist.
pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write a config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix, since it may hold an API key.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct CoachConfig {
    pub db_config: DbConfig,
    /// `None` when no API key is configured anywhere.
    pub generator: Option<GeneratorConfig>,
}

impl CoachConfig {
    /// Resolve configuration from the default config file location.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let path = config_path();
        let file = if path.exists() {
            Some(load_config_from(&path)?)
        } else {
            None
        };
        Self::resolve_with(cli_db_url, file.as_ref())
    }

    /// Resolve using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `COACH_DATABASE_URL` > `database.url` > `DbConfig::DEFAULT_URL`
    /// - API key: `COACH_GENERATOR_API_KEY` > `generator.api_key` > none
    /// - URL, model, timeout: env var > `[generator]` > client default
    pub fn resolve_with(cli_db_url: Option<&str>, file: Option<&ConfigFile>) -> Result<Self> {
        let db_url = cli_db_url
            .map(str::to_owned)
            .or_else(|| env_nonempty(ENV_DATABASE_URL))
            .or_else(|| file.map(|f| f.database.url.clone()))
            .unwrap_or_else(|| DbConfig::DEFAULT_URL.to_owned());
        let mut db_config = DbConfig::from_env();
        db_config.database_url = db_url;

        let section = file.map(|f| &f.generator);
        let api_key = env_nonempty(ENV_API_KEY)
            .or_else(|| section.and_then(|s| s.api_key.clone()))
            .filter(|k| !k.trim().is_empty());

        let generator = match api_key {
            Some(key) => {
                let mut cfg = GeneratorConfig::new(key);
                if let Some(url) =
                    env_nonempty(ENV_API_URL).or_else(|| section.and_then(|s| s.api_url.clone()))
                {
                    cfg.api_url = url;
                }
                if let Some(model) =
                    env_nonempty(ENV_MODEL).or_else(|| section.and_then(|s| s.model.clone()))
                {
                    cfg.model = model;
                }
                let timeout_secs = match env_nonempty(ENV_TIMEOUT_SECS) {
                    Some(raw) => Some(raw.trim().parse::<u64>().with_context(|| {
                        format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {raw:?}")
                    })?),
                    None => section.and_then(|s| s.timeout_secs),
                };
                if let Some(secs) = timeout_secs {
                    cfg.timeout = Duration::from_secs(secs.max(1));
                }
                Some(cfg)
            }
            None => None,
        };

        Ok(Self {
            db_config,
            generator,
        })
    }

    /// Build the text generator. Without an API key every call fails and
    /// the callers' fallback paths take over.
    pub fn build_generator(&self) -> Result<Arc<dyn TextGenerator>> {
        match &self.generator {
            Some(cfg) => {
                let client = ChatCompletionClient::new(cfg.clone())
                    .context("failed to build generator client")?;
                Ok(Arc::new(client))
            }
            None => {
                warn!("no generator API key configured; using offline fallbacks");
                Ok(Arc::new(UnavailableGenerator))
            }
        }
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn clear_env() {
        for name in [
            ENV_DATABASE_URL,
            ENV_API_KEY,
            ENV_API_URL,
            ENV_MODEL,
            ENV_TIMEOUT_SECS,
        ] {
            unsafe { std::env::remove_var(name) };
        }
    }

    fn file_with_key() -> ConfigFile {
        ConfigFile {
            database: DatabaseSection {
                url: "postgresql://file:5432/filedb".into(),
            },
            generator: GeneratorSection {
                api_url: Some("http://file-llm".into()),
                api_key: Some("file-key".into()),
                model: Some("file-model".into()),
                timeout_secs: Some(15),
            },
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("coach").join("config.toml");

        save_config_to(&path, &file_with_key()).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.database.url, "postgresql://file:5432/filedb");
        assert_eq!(loaded.generator.api_key.as_deref(), Some("file-key"));
        assert_eq!(loaded.generator.timeout_secs, Some(15));
    }

    #[cfg(unix)]
    #[test]
    fn save_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&path, &ConfigFile::default()).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn generator_section_is_optional() {
        let parsed: ConfigFile = toml::from_str("[database]\nurl = \"postgresql://h/db\"\n").unwrap();
        assert!(parsed.generator.api_key.is_none());
    }

    #[test]
    fn cli_flag_overrides_everything() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(ENV_DATABASE_URL, "postgresql://env:5432/envdb") };

        let config =
            CoachConfig::resolve_with(Some("postgresql://cli:5432/clidb"), Some(&file_with_key()))
                .unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        clear_env();
    }

    #[test]
    fn env_overrides_file() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(ENV_DATABASE_URL, "postgresql://env:5432/envdb") };
        unsafe { std::env::set_var(ENV_API_KEY, "env-key") };
        unsafe { std::env::set_var(ENV_TIMEOUT_SECS, "90") };

        let config = CoachConfig::resolve_with(None, Some(&file_with_key())).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");
        let generator = config.generator.unwrap();
        assert_eq!(generator.api_key, "env-key");
        assert_eq!(generator.model, "file-model");
        assert_eq!(generator.api_url, "http://file-llm");
        assert_eq!(generator.timeout, Duration::from_secs(90));

        clear_env();
    }

    #[test]
    fn defaults_when_nothing_set() {
        let _lock = lock_env();
        clear_env();

        let config = CoachConfig::resolve_with(None, None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert!(config.generator.is_none());
    }

    #[test]
    fn bad_timeout_is_an_error() {
        let _lock = lock_env();
        clear_env();
        unsafe { std::env::set_var(ENV_API_KEY, "k") };
        unsafe { std::env::set_var(ENV_TIMEOUT_SECS, "soon") };

        let err = CoachConfig::resolve_with(None, None).unwrap_err();
        assert!(format!("{err:#}").contains(ENV_TIMEOUT_SECS));

        clear_env();
    }

    #[test]
    fn file_key_enables_client_defaults() {
        let _lock = lock_env();
        clear_env();
        let file = ConfigFile {
            generator: GeneratorSection {
                api_key: Some("only-key".into()),
                ..GeneratorSection::default()
            },
            ..ConfigFile::default()
        };

        let config = CoachConfig::resolve_with(None, Some(&file)).unwrap();
        let generator = config.generator.unwrap();
        assert_eq!(generator.api_url, GeneratorConfig::DEFAULT_URL);
        assert_eq!(generator.model, GeneratorConfig::DEFAULT_MODEL);
        assert!(config.db_config.database_url.ends_with("/coach"));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        assert!(config_path().ends_with("coach/config.toml"));
    }
}
