use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Credentials;
use crate::client::TransportSettings;
use crate::error::ExtractError;
use crate::scheduler::{ExtractOptions, LogMode, DEFAULT_CONCURRENCY, DEFAULT_MAX_LOG_EVENTS};

const CONFIG_CANDIDATES: [&str; 4] = [
    "extractor.toml",
    "extractor.json",
    "extractor.yaml",
    "extractor.yml",
];

/// Configuration file structure for the extractor.
///
/// Every value is optional; anything given on the command line or through the
/// environment wins over the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Base URL of the CI API, e.g. `https://ci.example.com`
    pub base_url: Option<String>,

    pub client_id: Option<String>,

    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractConfig {
    /// Pipeline paths to extract (e.g. `github.com/group/app`)
    #[serde(default)]
    pub pipelines: Vec<String>,

    /// Root directory of the snapshot
    pub save_to_directory: Option<PathBuf>,

    /// Extra pattern scrubbed from logs
    pub log_obfuscate_regex: Option<String>,

    /// Maximum number of parallel fetches per pipeline
    pub concurrency: Option<usize>,

    /// Record logs from the event stream instead of a plain GET
    pub stream_logs: Option<bool>,

    /// Maximum number of log events recorded per stream
    pub max_log_events: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransportConfig {
    pub max_attempts: Option<u32>,

    pub timeout_secs: Option<u64>,

    pub backoff_millis: Option<u64>,
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./extractor.toml
    /// 3. ./extractor.json
    /// 4. ./extractor.yaml
    /// 5. ./extractor.yml
    ///
    /// Returns an empty configuration if no file is found. A path that was
    /// given explicitly must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::discover(Path::new(".")),
        }
    }

    fn discover(dir: &Path) -> Result<Self> {
        for candidate in CONFIG_CANDIDATES {
            let path = dir.join(candidate);
            if path.exists() {
                return Self::load_from_path(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub pipelines: Option<String>,
    pub save_to_directory: Option<PathBuf>,
    pub log_obfuscate_regex: Option<String>,
    pub concurrency: Option<usize>,
    pub stream_logs: bool,
    pub max_log_events: Option<usize>,
}

/// Fully resolved, immutable run settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: String,
    pub credentials: Credentials,
    pub pipelines: Vec<String>,
    pub save_to_directory: PathBuf,
    pub log_obfuscate_regex: Option<String>,
    pub extract: ExtractOptions,
    pub transport: TransportSettings,
}

impl Settings {
    pub const DEFAULT_SAVE_TO_DIRECTORY: &'static str = "./mocks";

    /// Merges `overrides` over `config` over the defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the base URL or a credential is
    /// missing, or when no pipeline is listed.
    pub fn resolve(config: Config, overrides: Overrides) -> crate::error::Result<Self> {
        let base_url = required(overrides.base_url.or(config.api.base_url), "API base URL")?;
        let client_id = required(overrides.client_id.or(config.api.client_id), "client id")?;
        let client_secret = required(
            overrides.client_secret.or(config.api.client_secret),
            "client secret",
        )?;

        let pipelines = match overrides.pipelines {
            Some(list) => split_pipelines(&list),
            None => config
                .extract
                .pipelines
                .iter()
                .flat_map(|entry| split_pipelines(entry))
                .collect(),
        };
        if pipelines.is_empty() {
            return Err(ExtractError::Config(
                "No pipelines to extract; set --pipelines-to-extract".to_string(),
            ));
        }

        let max_log_events = overrides
            .max_log_events
            .or(config.extract.max_log_events)
            .unwrap_or(DEFAULT_MAX_LOG_EVENTS);
        let log_mode = if overrides.stream_logs || config.extract.stream_logs.unwrap_or(false) {
            LogMode::Stream { max_events: max_log_events }
        } else {
            LogMode::Raw
        };

        let defaults = TransportSettings::default();
        let transport = TransportSettings {
            max_attempts: config.transport.max_attempts.unwrap_or(defaults.max_attempts),
            timeout: config
                .transport
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            backoff_base: config
                .transport
                .backoff_millis
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
        };

        Ok(Self {
            base_url,
            credentials: Credentials {
                client_id,
                client_secret,
            },
            pipelines,
            save_to_directory: overrides
                .save_to_directory
                .or(config.extract.save_to_directory)
                .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_SAVE_TO_DIRECTORY)),
            log_obfuscate_regex: overrides
                .log_obfuscate_regex
                .or(config.extract.log_obfuscate_regex)
                .filter(|pattern| !pattern.trim().is_empty()),
            extract: ExtractOptions {
                concurrency: overrides
                    .concurrency
                    .or(config.extract.concurrency)
                    .unwrap_or(DEFAULT_CONCURRENCY)
                    .max(1),
                log_mode,
            },
            transport,
        })
    }
}

fn required(value: Option<String>, name: &str) -> crate::error::Result<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ExtractError::Config(format!("Missing {name}")))
}

/// Splits a comma separated pipeline list, dropping blank entries.
fn split_pipelines(list: &str) -> Vec<String> {
    list.split(',')
        .map(|p| p.trim().trim_matches('/'))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn overrides() -> Overrides {
        Overrides {
            base_url: Some("https://ci.example.com".to_string()),
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            pipelines: Some("github.com/group/app".to_string()),
            ..Overrides::default()
        }
    }

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();
        assert!(config.api.base_url.is_none());
        assert!(config.extract.pipelines.is_empty());
        assert!(config.transport.max_attempts.is_none());
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[api]
base-url = "https://ci.example.com"
client-id = "extractor"

[extract]
pipelines = ["github.com/group/app", "github.com/group/lib"]
save-to-directory = "/tmp/mocks"
concurrency = 4
stream-logs = true

[transport]
max-attempts = 5
timeout-secs = 30
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("https://ci.example.com"));
        assert_eq!(config.api.client_id.as_deref(), Some("extractor"));
        assert!(config.api.client_secret.is_none());
        assert_eq!(config.extract.pipelines.len(), 2);
        assert_eq!(config.extract.save_to_directory, Some(PathBuf::from("/tmp/mocks")));
        assert_eq!(config.extract.concurrency, Some(4));
        assert_eq!(config.extract.stream_logs, Some(true));
        assert_eq!(config.transport.max_attempts, Some(5));
        assert_eq!(config.transport.timeout_secs, Some(30));
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "api": {
    "base-url": "https://ci.json.com"
  },
  "extract": {
    "log-obfuscate-regex": "token-[a-z]+"
  }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("https://ci.json.com"));
        assert_eq!(
            config.extract.log_obfuscate_regex.as_deref(),
            Some("token-[a-z]+")
        );
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        write!(
            temp_file,
            "extract:\n  pipelines:\n    - github.com/group/app\n  max-log-events: 20\n"
        )
        .unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.extract.pipelines, vec!["github.com/group/app"]);
        assert_eq!(config.extract.max_log_events, Some(20));
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&temp_dir.path().join("nonexistent.toml"))).is_err());
    }

    #[test]
    fn test_discover_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::discover(temp_dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_discover_prefers_toml_over_yaml() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("extractor.toml"),
            "[api]\nbase-url = \"https://from-toml\"\n",
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("extractor.yaml"),
            "api:\n  base-url: https://from-yaml\n",
        )
        .unwrap();

        let config = Config::discover(temp_dir.path()).unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("https://from-toml"));
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        write!(temp_file, "[api\nbase-url = ").unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_resolve_applies_defaults() {
        let settings = Settings::resolve(Config::default(), overrides()).unwrap();

        assert_eq!(settings.base_url, "https://ci.example.com");
        assert_eq!(settings.pipelines, vec!["github.com/group/app"]);
        assert_eq!(settings.save_to_directory, PathBuf::from("./mocks"));
        assert_eq!(settings.extract.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.extract.log_mode, LogMode::Raw);
        assert_eq!(settings.transport.max_attempts, 3);
        assert_eq!(settings.transport.timeout, Duration::from_secs(10));
        assert!(settings.log_obfuscate_regex.is_none());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut config = Config::default();
        config.api.base_url = Some("https://from-file".to_string());
        config.api.client_secret = Some("file-secret".to_string());
        config.extract.concurrency = Some(3);
        config.extract.pipelines = vec!["file/pipeline".to_string()];
        config.transport.backoff_millis = Some(250);

        let mut cli = overrides();
        cli.client_secret = None;
        cli.concurrency = Some(6);

        let settings = Settings::resolve(config, cli).unwrap();
        assert_eq!(settings.base_url, "https://ci.example.com");
        assert_eq!(settings.credentials.client_secret, "file-secret");
        assert_eq!(settings.extract.concurrency, 6);
        assert_eq!(settings.pipelines, vec!["github.com/group/app"]);
        assert_eq!(settings.transport.backoff_base, Duration::from_millis(250));
    }

    #[test]
    fn test_pipeline_list_is_split_and_trimmed() {
        let mut cli = overrides();
        cli.pipelines = Some(" github.com/a/b , ,github.com/c/d/,".to_string());

        let settings = Settings::resolve(Config::default(), cli).unwrap();
        assert_eq!(settings.pipelines, vec!["github.com/a/b", "github.com/c/d"]);
    }

    #[test]
    fn test_stream_logs_uses_max_events() {
        let mut config = Config::default();
        config.extract.max_log_events = Some(7);
        let mut cli = overrides();
        cli.stream_logs = true;

        let settings = Settings::resolve(config, cli).unwrap();
        assert_eq!(settings.extract.log_mode, LogMode::Stream { max_events: 7 });
    }

    #[test]
    fn test_zero_concurrency_is_raised_to_one() {
        let mut cli = overrides();
        cli.concurrency = Some(0);

        let settings = Settings::resolve(Config::default(), cli).unwrap();
        assert_eq!(settings.extract.concurrency, 1);
    }

    #[test]
    fn test_missing_values_are_config_errors() {
        let mut cli = overrides();
        cli.client_id = Some("  ".to_string());
        assert!(matches!(
            Settings::resolve(Config::default(), cli),
            Err(ExtractError::Config(msg)) if msg.contains("client id")
        ));

        let mut cli = overrides();
        cli.pipelines = Some(",".to_string());
        assert!(matches!(
            Settings::resolve(Config::default(), cli),
            Err(ExtractError::Config(_))
        ));
    }
}
