//! Configuration management for the PDF Tools server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::jobs::{DEFAULT_REAPER_INTERVAL_SECS, DEFAULT_TTL_MINUTES};

/// Origins allowed when `CORS_ALLOWED_ORIGINS` is unset
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://compresspdf.co.za",
    "https://www.compresspdf.co.za",
    "https://mergepdf.co.za",
    "https://www.mergepdf.co.za",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub jobs: JobsConfig,
    pub tools: ToolsConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Usage counters and review aggregates
    pub data_dir: PathBuf,
    /// Received uploads awaiting processing
    pub upload_dir: PathBuf,
    /// Produced artifacts
    pub tmp_dir: PathBuf,
    /// One JSON record per live job
    pub index_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    pub ttl_minutes: i64,
    pub reaper_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    /// Largest single uploaded PDF
    pub max_upload_mb: u64,
    /// Largest whole merge request, all files together
    pub max_merge_mb: u64,
    pub ghostscript_binary: String,
    pub ghostscript_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl JobsConfig {
    /// Job time-to-live, falling back to the default when `ttl_minutes` is
    /// negative or too large to add to the current time
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.ttl_minutes)
            .filter(|ttl| *ttl >= chrono::Duration::zero())
            .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
            .unwrap_or_else(|| {
                tracing::warn!(ttl_minutes = self.ttl_minutes, "Unusable job TTL, using default");
                chrono::Duration::minutes(DEFAULT_TTL_MINUTES)
            })
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

impl ToolsConfig {
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Merge request limit, never below a single upload
    pub fn max_merge_bytes(&self) -> u64 {
        self.max_merge_mb
            .max(self.max_upload_mb)
            .saturating_mul(1024 * 1024)
    }

    pub fn ghostscript_timeout(&self) -> Duration {
        Duration::from_secs(self.ghostscript_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        let tmp_dir = PathBuf::from("./tmp");
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 4000,
            },
            paths: PathsConfig {
                data_dir: PathBuf::from("./data"),
                upload_dir: PathBuf::from("./uploads"),
                index_dir: tmp_dir.join("index"),
                tmp_dir,
            },
            jobs: JobsConfig {
                ttl_minutes: DEFAULT_TTL_MINUTES,
                reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
            },
            tools: ToolsConfig {
                max_upload_mb: 100,
                max_merge_mb: 500,
                ghostscript_binary: "gs".to_string(),
                ghostscript_timeout_secs: 180,
            },
            cors: CorsConfig {
                allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();

        let tmp_dir = env::var("TMP_DIR").map(PathBuf::from).unwrap_or(defaults.paths.tmp_dir);
        let index_dir = env::var("INDEX_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| tmp_dir.join("index"));

        let port = env::var("SERVER_PORT").or_else(|_| env::var("PORT"));

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: port
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            paths: PathsConfig {
                data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.paths.data_dir),
                upload_dir: env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.paths.upload_dir),
                tmp_dir,
                index_dir,
            },
            jobs: JobsConfig {
                ttl_minutes: parse_var("FILE_TTL_MIN", defaults.jobs.ttl_minutes),
                reaper_interval_secs: parse_var(
                    "REAPER_INTERVAL_SECS",
                    defaults.jobs.reaper_interval_secs,
                ),
            },
            tools: ToolsConfig {
                max_upload_mb: parse_var("MAX_UPLOAD_MB", defaults.tools.max_upload_mb),
                max_merge_mb: parse_var("MAX_MERGE_MB", defaults.tools.max_merge_mb),
                ghostscript_binary: env::var("GS_BINARY").unwrap_or(defaults.tools.ghostscript_binary),
                ghostscript_timeout_secs: parse_var(
                    "GS_TIMEOUT_SECS",
                    defaults.tools.ghostscript_timeout_secs,
                ),
            },
            cors: CorsConfig {
                allowed_origins: match env::var("CORS_ALLOWED_ORIGINS") {
                    Ok(list) => parse_list(&list),
                    Err(_) => defaults.cors.allowed_origins,
                },
            },
        })
    }
}

/// Read a variable, falling back to `default` when unset or unparsable
fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.jobs.ttl(), chrono::Duration::minutes(15));
        assert_eq!(config.jobs.reaper_interval(), Duration::from_secs(60));
        assert_eq!(config.tools.max_upload_bytes(), 100 * 1024 * 1024);
        assert_eq!(config.tools.max_merge_bytes(), 500 * 1024 * 1024);
        assert_eq!(config.paths.index_dir, PathBuf::from("./tmp/index"));
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" https://a.example , ,https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_reaper_interval_never_zero() {
        let jobs = JobsConfig {
            ttl_minutes: 1,
            reaper_interval_secs: 0,
        };
        assert_eq!(jobs.reaper_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_merge_limit_covers_one_upload() {
        let mut tools = Config::default().tools;
        tools.max_upload_mb = 50;
        tools.max_merge_mb = 10;
        assert_eq!(tools.max_merge_bytes(), tools.max_upload_bytes());
    }

    #[test]
    fn test_unusable_ttl_falls_back_to_default() {
        for ttl_minutes in [i64::MAX, i64::MAX / 60_000, -5] {
            let jobs = JobsConfig {
                ttl_minutes,
                reaper_interval_secs: 60,
            };
            assert_eq!(jobs.ttl(), chrono::Duration::minutes(15), "ttl_minutes = {}", ttl_minutes);
        }

        let jobs = JobsConfig {
            ttl_minutes: 0,
            reaper_interval_secs: 60,
        };
        assert_eq!(jobs.ttl(), chrono::Duration::zero());
    }
}
