//! Configuration loading and validation.
//!
//! Precedence, lowest to highest: built-in defaults, one config file
//! (YAML/TOML/JSON by extension; `--config` or the platform config dir),
//! then `DOCSINK_*` environment variables (`__` separates sections, so
//! `DOCSINK_SYNC__POLL_INTERVAL_MS=5000` overrides `sync.poll-interval-ms`).

pub mod error;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// The daemon's full configuration tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub source: SourceConfig,
    pub backend: BackendConfig,
    pub sync: SyncConfig,
    pub state: StateConfig,
    pub failure_log: FailureLogConfig,
    pub preprocessor: PreprocessorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SourceConfig {
    /// Transport selector; `local` is the built-in transport.
    pub kind: String,
    /// Root directory for the `local` transport.
    pub root: Option<PathBuf>,
    pub allowed_extensions: Vec<String>,
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: "local".to_string(),
            root: None,
            allowed_extensions: vec![".pdf".to_string(), ".doc".to_string(), ".docx".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Optional bearer token.
    pub api_token: Option<String>,
    pub request_timeout_seconds: u64,
}
impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_token: None,
            request_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    /// One of `none`, `upload`, `full`.
    pub startup_sync: String,
    pub cleanup_failed_docs: bool,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 60_000,
            startup_sync: "none".to_string(),
            cleanup_failed_docs: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StateConfig {
    pub file_path: PathBuf,
}
impl Default for StateConfig {
    fn default() -> Self {
        Self {
            file_path: PathBuf::from("data/state.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FailureLogConfig {
    pub path: PathBuf,
    pub max_size_kb: u64,
}
impl Default for FailureLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/failures.log"),
            max_size_kb: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PreprocessorConfig {
    pub enabled: bool,
    /// Space-split command parts.
    pub command: String,
    pub timeout_seconds: u64,
}
impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            command: String::new(),
            timeout_seconds: 120,
        }
    }
}

/// Load and validate the configuration.
///
/// `path == None` falls back to the platform config location (e.g.
/// `~/.config/docsink/config.yaml`); an absent fallback file is fine, an
/// absent explicit file is an error.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    let file = match path {
        Some(explicit) => {
            if !explicit.exists() {
                exn::bail!(ErrorKind::NotFound(explicit.to_path_buf()));
            }
            Some(explicit.to_path_buf())
        },
        None => default_config_path().filter(|p| p.exists()),
    };
    if let Some(file) = &file {
        tracing::debug!(path = %file.display(), "Loading config file");
        figment = match file.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => figment.merge(Toml::file(file)),
            Some("json") => figment.merge(Json::file(file)),
            _ => figment.merge(Yaml::file(file)),
        };
    }
    figment = figment.merge(env_provider());
    let config: Config = figment.extract().map_err(|e| ErrorKind::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Environment overrides: `DOCSINK_` prefix, `__` between sections,
/// single underscores become the dashes of the kebab-case keys.
fn env_provider() -> Env {
    Env::prefixed("DOCSINK_")
        .map(|key| {
            key.as_str()
                .to_ascii_lowercase()
                .replace("__", "\u{1f}")
                .replace('_', "-")
                .replace('\u{1f}', "__")
                .into()
        })
        .split("__")
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "docsink").map(|dirs| dirs.config_dir().join("config.yaml"))
}

impl Config {
    /// Reject configurations the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sync.poll_interval_ms == 0 {
            exn::bail!(ErrorKind::Invalid("sync.poll-interval-ms must be positive".to_string()));
        }
        match self.sync.startup_sync.as_str() {
            "none" | "upload" | "full" => {},
            other => exn::bail!(ErrorKind::Invalid(format!(
                "sync.startup-sync must be none, upload or full (got {other:?})"
            ))),
        }
        if self.backend.base_url.is_empty() {
            exn::bail!(ErrorKind::Invalid("backend.base-url is required".to_string()));
        }
        if self.source.allowed_extensions.is_empty() {
            exn::bail!(ErrorKind::Invalid("source.allowed-extensions must not be empty".to_string()));
        }
        match self.source.kind.as_str() {
            "local" => {
                let Some(root) = &self.source.root else {
                    exn::bail!(ErrorKind::Invalid("source.root is required for the local transport".to_string()));
                };
                if !root.is_absolute() {
                    exn::bail!(ErrorKind::Invalid(format!(
                        "source.root must be an absolute path (got {})",
                        root.display()
                    )));
                }
            },
            other => exn::bail!(ErrorKind::Invalid(format!("unknown source.kind {other:?}"))),
        }
        if self.preprocessor.enabled && self.preprocessor.command.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid(
                "preprocessor.command is required when the preprocessor is enabled".to_string()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid() -> Config {
        let mut config = Config::default();
        config.backend.base_url = "http://localhost:8080/api".to_string();
        config.source.root = Some(PathBuf::from("/srv/docs"));
        config
    }

    #[test]
    fn test_defaults_match_documentation() {
        let config = Config::default();
        assert_eq!(config.sync.poll_interval_ms, 60_000);
        assert_eq!(config.sync.startup_sync, "none");
        assert!(!config.sync.cleanup_failed_docs);
        assert_eq!(config.source.allowed_extensions, [".pdf", ".doc", ".docx"]);
        assert_eq!(config.state.file_path, PathBuf::from("data/state.json"));
        assert_eq!(config.failure_log.path, PathBuf::from("logs/failures.log"));
        assert_eq!(config.failure_log.max_size_kb, 1024);
        assert!(!config.preprocessor.enabled);
        assert_eq!(config.preprocessor.timeout_seconds, 120);
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[rstest]
    #[case::zero_interval(|c: &mut Config| c.sync.poll_interval_ms = 0)]
    #[case::bad_mode(|c: &mut Config| c.sync.startup_sync = "everything".to_string())]
    #[case::no_backend(|c: &mut Config| c.backend.base_url.clear())]
    #[case::no_extensions(|c: &mut Config| c.source.allowed_extensions.clear())]
    #[case::no_root(|c: &mut Config| c.source.root = None)]
    #[case::relative_root(|c: &mut Config| c.source.root = Some(PathBuf::from("relative")))]
    #[case::unknown_kind(|c: &mut Config| c.source.kind = "carrier-pigeon".to_string())]
    #[case::preprocessor_without_command(|c: &mut Config| c.preprocessor.enabled = true)]
    fn test_validation_rejects(#[case] mutate: fn(&mut Config)) {
        let mut config = valid();
        mutate(&mut config);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let err = load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            concat!(
                "source:\n",
                "  root: /srv/docs\n",
                "  allowed-extensions: [\".pdf\"]\n",
                "backend:\n",
                "  base-url: http://rag.internal/api\n",
                "sync:\n",
                "  poll-interval-ms: 5000\n",
                "  startup-sync: full\n",
            ),
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.sync.poll_interval_ms, 5000);
        assert_eq!(config.sync.startup_sync, "full");
        assert_eq!(config.source.allowed_extensions, [".pdf"]);
        assert_eq!(config.backend.base_url, "http://rag.internal/api");
        // Untouched sections keep their defaults.
        assert_eq!(config.failure_log.max_size_kb, 1024);
    }

    #[test]
    fn test_toml_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            concat!(
                "[source]\n",
                "root = \"/srv/docs\"\n",
                "[backend]\n",
                "base-url = \"http://rag.internal/api\"\n",
                "[sync]\n",
                "poll-interval-ms = 1500\n",
            ),
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.sync.poll_interval_ms, 1500);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.yaml",
                concat!(
                    "source:\n",
                    "  root: /srv/docs\n",
                    "backend:\n",
                    "  base-url: http://rag.internal/api\n",
                ),
            )?;
            jail.set_env("DOCSINK_SYNC__POLL_INTERVAL_MS", "2500");
            jail.set_env("DOCSINK_BACKEND__BASE_URL", "http://elsewhere/api");

            let config = load(Some(Path::new("config.yaml"))).expect("config loads");
            assert_eq!(config.sync.poll_interval_ms, 2500);
            assert_eq!(config.backend.base_url, "http://elsewhere/api");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_merged_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync:\n  poll-interval-ms: 0\n").unwrap();
        let err = load(Some(&path)).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Invalid(_)));
    }
}
