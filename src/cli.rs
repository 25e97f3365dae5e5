use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};
use std::path::PathBuf;

use crate::client::ApiClient;
use crate::config::{Config, Overrides, Settings};
use crate::obfuscate::LogScrubber;
use crate::output::{self, RunProgress};
use crate::persist::Persister;
use crate::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "extractor")]
#[command(author, version, about = "Extracts CI pipelines into obfuscated JSON mocks", long_about = None)]
pub struct Cli {
    /// Base URL of the CI API
    #[arg(long, env = "API_BASE_URL")]
    api_base_url: Option<String>,

    #[arg(long, env = "CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Comma separated pipeline paths, e.g. github.com/group/app
    #[arg(long, env = "PIPELINES_TO_EXTRACT")]
    pipelines_to_extract: Option<String>,

    /// Root directory of the snapshot [default: ./mocks]
    #[arg(long, env = "SAVE_TO_DIRECTORY")]
    save_to_directory: Option<PathBuf>,

    /// Extra regex whose matches are replaced with *** in logs
    #[arg(long, env = "LOG_OBFUSCATE_REGEX")]
    log_obfuscate_regex: Option<String>,

    /// Maximum number of parallel fetches per pipeline [default: 10]
    #[arg(long, env = "CONCURRENCY")]
    concurrency: Option<usize>,

    /// Record logs from the live event stream instead of a plain GET
    #[arg(long, default_value_t = false)]
    stream_logs: bool,

    /// Maximum number of events recorded per log stream [default: 50]
    #[arg(long)]
    max_log_events: Option<usize>,

    /// Configuration file (toml, json or yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.api_base_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            pipelines: self.pipelines_to_extract.clone(),
            save_to_directory: self.save_to_directory.clone(),
            log_obfuscate_regex: self.log_obfuscate_regex.clone(),
            concurrency: self.concurrency,
            stream_logs: self.stream_logs,
            max_log_events: self.max_log_events,
        }
    }

    fn settings(&self) -> Result<Settings> {
        let config = Config::load(self.config.as_deref())?;
        Settings::resolve(config, self.overrides()).context("Invalid configuration")
    }

    pub async fn execute(&self) -> Result<()> {
        let settings = self.settings()?;
        debug!("Resolved settings: {settings:?}");

        let client = ApiClient::new(&settings.base_url, settings.transport)
            .context("Failed to create API client")?;
        let scrubber = LogScrubber::new(settings.log_obfuscate_regex.as_deref())?;
        let persister = Persister::new(&settings.save_to_directory);

        info!(
            "Extracting {} pipelines from {} into {}",
            settings.pipelines.len(),
            settings.base_url,
            persister.root().display()
        );

        let progress = RunProgress::start(settings.pipelines.len());
        let scheduler =
            Scheduler::new(client, persister, scrubber, settings.extract).with_progress(progress.bar());

        match scheduler.run(&settings.credentials, &settings.pipelines).await {
            Ok(summary) => {
                progress.finish();
                output::print_summary(&summary, &settings.save_to_directory);
                Ok(())
            }
            Err(err) => {
                progress.abandon();
                if err.is_transport() {
                    error!("The CI API at {} failed a request: {err}", settings.base_url);
                }
                Err(err).context("Extraction failed, the snapshot is incomplete")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "extractor",
            "--api-base-url",
            "https://ci.example.com",
            "--pipelines-to-extract",
            "github.com/a/b,github.com/c/d",
            "--concurrency",
            "4",
            "--stream-logs",
            "--max-log-events",
            "12",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.base_url.as_deref(), Some("https://ci.example.com"));
        assert_eq!(
            overrides.pipelines.as_deref(),
            Some("github.com/a/b,github.com/c/d")
        );
        assert_eq!(overrides.concurrency, Some(4));
        assert!(overrides.stream_logs);
        assert_eq!(overrides.max_log_events, Some(12));
    }

    #[test]
    fn test_non_numeric_concurrency_is_rejected() {
        assert!(Cli::try_parse_from(["extractor", "--concurrency", "many"]).is_err());
    }

    #[tokio::test]
    async fn test_execute_writes_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/auth/client/login")
            .with_status(200)
            .with_body(r#"{"token": "tok"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/pipelines/group/app")
            .with_status(200)
            .with_body(r#"{"id": "1"}"#)
            .create_async()
            .await;
        for list in ["builds", "releases"] {
            server
                .mock("GET", format!("/api/pipelines/group/app/{list}").as_str())
                .match_query(mockito::Matcher::Any)
                .with_status(200)
                .with_body(r#"{"items": [], "pagination": {"page": 1, "size": 10, "totalPages": 0, "totalItems": 0}}"#)
                .create_async()
                .await;
        }
        server
            .mock("GET", mockito::Matcher::Regex(r"^/api/pipelines/group/app/(warnings|stats/.+)$".to_string()))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let save_to = temp_dir.path().join("mocks");
        let config_path = temp_dir.path().join("extractor.toml");
        std::fs::write(
            &config_path,
            "[transport]\nmax-attempts = 1\nbackoff-millis = 1\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "extractor",
            "--api-base-url",
            server.url().as_str(),
            "--client-id",
            "id",
            "--client-secret",
            "secret",
            "--pipelines-to-extract",
            "group/app",
            "--save-to-directory",
            save_to.to_str().unwrap(),
            "--config",
            config_path.to_str().unwrap(),
        ])
        .unwrap();

        cli.execute().await.unwrap();

        assert!(save_to.join("api/pipelines/GET.json").exists());
        assert!(save_to.join("api/pipelines/group/app/builds/GET.json").exists());
        assert!(save_to
            .join("api/pipelines/group/app/stats/releasesmemory/GET.json")
            .exists());
    }
}
