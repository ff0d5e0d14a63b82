use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CrawlerConfig {
    pub chromium: ChromiumSection,
    pub flags: FlagsSection,
    pub user_agents: UserAgentSection,
    pub viewport: ViewportSection,
    pub capture: CaptureSection,
    pub actions: ActionSection,
    pub retry: RetrySection,
    pub pagination: PaginationSection,
    pub observability: ObservabilitySection,
}

impl CrawlerConfig {
    /// Resolves a relative path against the directory the config was loaded from.
    pub fn resolve_path<P: AsRef<Path>>(&self, base_dir: &Path, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChromiumSection {
    pub executable_path: String,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub user_data_dir: Option<String>,
    pub request_timeout_seconds: Option<u64>,
}

impl Default for ChromiumSection {
    fn default() -> Self {
        Self {
            executable_path: "/usr/bin/chromium".to_string(),
            headless: true,
            sandbox: true,
            disable_gpu: true,
            user_data_dir: None,
            request_timeout_seconds: Some(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlagsSection {
    pub no_first_run: bool,
    pub lang: Option<String>,
    pub accept_language: Option<String>,
}

impl Default for FlagsSection {
    fn default() -> Self {
        Self {
            no_first_run: true,
            lang: Some("en-US".to_string()),
            accept_language: Some("en-US,en;q=0.9".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserAgentSection {
    pub pool: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportSection {
    pub resolutions: Vec<[u32; 2]>,
    pub jitter_pixels: u32,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            resolutions: vec![[1366, 768], [1440, 900], [1920, 1080]],
            jitter_pixels: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub poll_interval_ms: u64,
    pub wait_window_ms: u64,
    pub max_entries: usize,
}

impl CaptureSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn wait_window(&self) -> Duration {
        Duration::from_millis(self.wait_window_ms)
    }
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            wait_window_ms: 10_000,
            max_entries: 512,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionSection {
    pub idle_range_ms: [u64; 2],
    pub scroll_step_px: u32,
}

impl Default for ActionSection {
    fn default() -> Self {
        Self {
            idle_range_ms: [4_000, 6_000],
            scroll_step_px: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            rate_limit_delay_ms: 15_000,
            jitter_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationSection {
    pub stall_threshold: usize,
    pub default_limit: usize,
}

impl Default for PaginationSection {
    fn default() -> Self {
        Self {
            stall_threshold: 3,
            default_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ObservabilitySection {
    pub failure_log: Option<String>,
    pub metrics_db: Option<String>,
}

pub fn load_crawler_config<P: AsRef<Path>>(path: P) -> Result<CrawlerConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/crawler.toml");
        let config = load_crawler_config(path).expect("config should parse");
        assert!(config.chromium.headless);
        assert!(config.user_agents.pool.len() >= 2);
        assert_eq!(config.pagination.stall_threshold, 3);
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config.retry.rate_limit_delay_ms > config.retry.base_delay_ms);
        assert_eq!(
            config.observability.metrics_db.as_deref(),
            Some("data/metrics.sqlite")
        );
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: CrawlerConfig = toml::from_str("[capture]\nwait_window_ms = 500\n").unwrap();
        assert_eq!(config.capture.wait_window(), Duration::from_millis(500));
        assert_eq!(config.capture.poll_interval_ms, 250);
        assert_eq!(config.pagination.default_limit, 100);
    }

    #[test]
    fn unreadable_file_reports_path() {
        let err = load_crawler_config("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
