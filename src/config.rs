// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use url::Url;

use crate::extractors::{AmountPolicy, Layout};
use crate::registry::browser::BrowserSettings;
use crate::utils::AppError;

/// Periodic extractor for the public procurement lot registry
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Registry listing URL (page 1)
    #[arg(long, env = "REGISTRY_BASE_URL", default_value = "https://www.goszakup.gov.kz/ru/search/lots")]
    pub base_url: String,

    /// Run the browser without a window
    #[arg(long, env = "HEADLESS", default_value_t = true, action = ArgAction::Set)]
    pub headless: bool,

    /// Page load timeout in seconds
    #[arg(long, env = "PAGE_LOAD_TIMEOUT", default_value_t = 30)]
    pub page_load_timeout: u64,

    /// Hard page cap per run (0 = all pages)
    #[arg(long, env = "MAX_PAGES", default_value_t = 0)]
    pub max_pages: u32,

    /// Hours between scheduled runs
    #[arg(long, env = "PARSE_INTERVAL_HOURS", default_value_t = 3)]
    pub interval_hours: u64,

    /// Log verbosity when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH", default_value = "goszakup.db")]
    pub database: PathBuf,

    /// Whether zero amounts are kept
    #[arg(long, env = "AMOUNT_POLICY", value_enum, default_value_t = AmountPolicy::Positive)]
    pub amount_policy: AmountPolicy,

    /// Layout profile overriding the built-in one
    #[arg(long, env = "LAYOUT_FILE")]
    pub layout_file: Option<PathBuf>,

    /// Chrome/Chromium executable
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// DevTools endpoint of a running browser instead of launching one
    #[arg(long, env = "CHROME_REMOTE_URL")]
    pub remote_browser: Option<String>,

    /// Directory for annotated dumps of pages without a result table
    #[arg(long, env = "DEBUG_DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Run once and exit instead of scheduling
    #[arg(long)]
    pub run_once: bool,

    /// Keep records in memory only
    #[arg(long)]
    pub dry_run: bool,
}

/// Everything the extraction pipeline needs, passed in explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub base_url: Url,
    /// 0 = unlimited
    pub page_cap: u32,
    pub page_load_timeout: Duration,
    /// Pause after the table appears, for the loading overlay to clear.
    pub settle_delay: Duration,
    /// Extra wait when the table never appeared before the timeout.
    pub render_grace: Duration,
    pub inter_page_delay: Duration,
    pub failure_backoff: Duration,
    pub poll_interval: Duration,
    pub amount_policy: AmountPolicy,
    pub debug_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            page_cap: 0,
            page_load_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            render_grace: Duration::from_secs(5),
            inter_page_delay: Duration::from_millis(1500),
            failure_backoff: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
            amount_policy: AmountPolicy::Positive,
            debug_dir: None,
        }
    }
}

impl Args {
    pub fn pipeline_config(&self) -> Result<PipelineConfig, AppError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Config(format!("Invalid base URL '{}': {}", self.base_url, e)))?;
        if self.page_load_timeout == 0 {
            return Err(AppError::Config("PAGE_LOAD_TIMEOUT must be positive".into()));
        }

        Ok(PipelineConfig {
            page_cap: self.max_pages,
            page_load_timeout: Duration::from_secs(self.page_load_timeout),
            amount_policy: self.amount_policy,
            debug_dir: self.debug_dir.clone(),
            ..PipelineConfig::new(base_url)
        })
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        BrowserSettings {
            headless: self.headless,
            page_load_timeout: Duration::from_secs(self.page_load_timeout),
            chrome_path: self.chrome_path.clone(),
            remote_url: self.remote_browser.clone(),
        }
    }

    pub fn layout(&self) -> Result<Layout, AppError> {
        let layout = match &self.layout_file {
            Some(path) => Layout::from_file(path)?,
            None => Layout::builtin()?,
        };
        Ok(layout)
    }

    pub fn run_interval(&self) -> Result<Duration, AppError> {
        if self.interval_hours == 0 {
            return Err(AppError::Config("PARSE_INTERVAL_HOURS must be positive".into()));
        }
        Ok(Duration::from_secs(self.interval_hours * 3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_registry_settings() {
        let args = Args::try_parse_from(["lot_harvester"]).unwrap();
        let config = args.pipeline_config().unwrap();

        assert_eq!(config.base_url.as_str(), "https://www.goszakup.gov.kz/ru/search/lots");
        assert_eq!(config.page_cap, 0);
        assert_eq!(config.page_load_timeout, Duration::from_secs(30));
        assert_eq!(config.inter_page_delay, Duration::from_millis(1500));
        assert_eq!(args.run_interval().unwrap(), Duration::from_secs(10800));
        assert!(args.headless);
        assert!(!args.run_once);
    }

    #[test]
    fn flags_override() {
        let args = Args::try_parse_from([
            "lot_harvester",
            "--headless",
            "false",
            "--max-pages",
            "4",
            "--amount-policy",
            "any",
            "--run-once",
        ])
        .unwrap();
        let config = args.pipeline_config().unwrap();

        assert!(!args.headless);
        assert!(args.run_once);
        assert_eq!(config.page_cap, 4);
        assert_eq!(config.amount_policy, AmountPolicy::Any);
    }

    #[test]
    fn rejects_invalid_values() {
        let args = Args::try_parse_from(["lot_harvester", "--base-url", "not a url"]).unwrap();
        assert!(matches!(args.pipeline_config(), Err(AppError::Config(_))));

        let args = Args::try_parse_from(["lot_harvester", "--interval-hours", "0"]).unwrap();
        assert!(matches!(args.run_interval(), Err(AppError::Config(_))));
    }
}
