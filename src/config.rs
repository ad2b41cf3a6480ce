//! Runtime configuration.
//!
//! Loaded from `config.json` (or an explicit path). Every field has a
//! default, so a missing default file is not an error; a missing file that
//! the operator named explicitly is. Secrets are read from the environment.

use crate::error::{CrawlError, Result};
use crate::logger::LogLevel;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum level written by the stdout logger; `--verbose` lowers it to debug.
    pub log_level: String,
    pub http: HttpConfig,
    pub crawl: CrawlConfig,
    pub output: OutputConfig,
    pub github: GithubConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            http: HttpConfig::default(),
            crawl: CrawlConfig::default(),
            output: OutputConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl Config {
    pub fn log_level(&self) -> Result<LogLevel> {
        self.log_level
            .parse()
            .map_err(|e| CrawlError::Config(format!("log_level: {}", e)))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout_s: u64,
    /// Attempts for transient failures and non-2xx responses.
    pub max_attempts: u32,
    /// Fixed delay between those attempts.
    pub retry_delay_ms: u64,
    /// Added on top of the provider's rate-limit reset time.
    pub rate_limit_margin_ms: u64,
    /// Cap on concurrent outbound requests across all workers.
    pub max_in_flight: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_s: 10,
            max_attempts: 3,
            retry_delay_ms: 2000,
            rate_limit_margin_ms: 1000,
            max_in_flight: 16,
            user_agent: format!("moss-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Root of the ecosyste.ms papers API; `ecosystem:name` seeds resolve
    /// against it.
    pub api_base_url: String,
    /// Concurrent project/paper units.
    pub worker_count: usize,
    pub recurse_into_mentions: bool,
    /// `per_page` used when walking mention lists.
    pub mentions_per_page: u32,
    /// How often the flusher drains the accumulator.
    pub polling_interval_ms: u64,
    /// Entities buffered before emitting workers wait on the flusher.
    pub accumulator_capacity: usize,
    /// Resume file; `None` disables checkpointing unless `--resume` is given.
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://papers.ecosyste.ms".to_string(),
            worker_count: 10,
            recurse_into_mentions: false,
            mentions_per_page: 1000,
            polling_interval_ms: 500,
            accumulator_capacity: 10000,
            checkpoint_path: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
    Parquet,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "parquet" | "pq" => Ok(OutputFormat::Parquet),
            other => Err(format!("unsupported output format: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// File name without extension; Parquet appends `_<kind>`.
    pub file_stem: String,
    pub formats: Vec<OutputFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            file_stem: "ecosystems_output".to_string(),
            formats: vec![OutputFormat::Csv],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub base_url: String,
    /// Where the DOI found in a repository is resolved to a paper.
    pub openalex_url: String,
    pub per_page: u32,
    /// Never read from the file; filled from `GITHUB_TOKEN`.
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            openalex_url: "https://api.openalex.org".to_string(),
            per_page: 100,
            token: None,
        }
    }
}

impl GithubConfig {
    /// Token or a configuration error; the GitHub harvester cannot run without one.
    pub fn require_token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            CrawlError::Config(format!(
                "{} must be set to harvest from GitHub",
                GITHUB_TOKEN_ENV
            ))
        })
    }
}

/// Load configuration.
///
/// With `path = None` the default `config.json` is used when present.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => {
            let content = fs::read_to_string(p).map_err(|e| {
                CrawlError::Config(format!("cannot read {}: {}", p.display(), e))
            })?;
            parse_config(&content)?
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            parse_config(&fs::read_to_string(DEFAULT_CONFIG_PATH)?)?
        }
        None => Config::default(),
    };

    config.github.token = std::env::var(GITHUB_TOKEN_ENV)
        .ok()
        .filter(|t| !t.trim().is_empty());

    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    serde_json::from_str(content).map_err(|e| CrawlError::Config(e.to_string()))
}

fn validate(config: &Config) -> Result<()> {
    config.log_level()?;
    if config.http.max_attempts == 0 {
        return Err(CrawlError::Config("http.max_attempts must be >= 1".into()));
    }
    if config.http.max_in_flight == 0 || config.crawl.worker_count == 0 {
        return Err(CrawlError::Config(
            "http.max_in_flight and crawl.worker_count must be >= 1".into(),
        ));
    }
    if config.output.formats.is_empty() {
        return Err(CrawlError::Config(
            "output.formats must name at least one format".into(),
        ));
    }
    if config.crawl.mentions_per_page == 0 {
        return Err(CrawlError::Config(
            "crawl.mentions_per_page must be >= 1".into(),
        ));
    }
    Ok(())
}
