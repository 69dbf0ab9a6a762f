use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found '{path}'")]
    NotFound { path: String },

    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid request template: {message}")]
    InvalidTemplate { message: String },
}

/// Read-only request template and execution flags shared by every
/// `prepare`/`execute` call of a run.
#[derive(Clone, Debug)]
pub struct Config {
    pub url: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub data: String,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub ignore_body: bool,
    /// Empty disables dumping.
    pub output_directory: String,
    pub version: String,
    pub proxy: Option<String>,
    pub max_idle_per_host: usize,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: DEFAULT_METHOD.to_string(),
            headers: HashMap::new(),
            data: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            follow_redirects: false,
            ignore_body: false,
            output_directory: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            proxy: None,
            max_idle_per_host: DEFAULT_MAX_IDLE_PER_HOST,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn ignore_body(mut self, ignore: bool) -> Self {
        self.ignore_body = ignore;
        self
    }

    pub fn output_directory(mut self, dir: impl Into<String>) -> Self {
        self.output_directory = dir.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.trim().is_empty());
        self
    }

    pub fn dump_enabled(&self) -> bool {
        !self.output_directory.trim().is_empty()
    }

    pub fn user_agent(&self) -> String {
        format!("Fuzz Faster U Fool v{}", self.version)
    }

    /// Structural checks run once at startup. Keywords are swapped for a
    /// neutral token before parsing so `http://FUZZ/` counts as valid.
    pub fn validate(&self, keywords: &[String]) -> Result<(), ConfigError> {
        if self.method.trim().is_empty() {
            return Err(ConfigError::InvalidTemplate {
                message: "method is empty".to_string(),
            });
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::InvalidTemplate {
                message: "url is empty".to_string(),
            });
        }
        let mut trial = self.url.clone();
        for keyword in keywords.iter().filter(|k| !k.is_empty()) {
            trial = trial.replace(keyword.as_str(), "fuzz");
        }
        if let Err(e) = reqwest::Url::parse(&trial) {
            return Err(ConfigError::InvalidTemplate {
                message: format!("url '{}' does not parse: {e}", self.url),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTemplate {
                message: "timeout must be positive".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct ConfigFile {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Vec<String>>,
    pub data: Option<String>,
    pub wordlists: Option<Vec<String>>,
    pub timeout: Option<u64>,
    pub concurrency: Option<u32>,
    pub rate: Option<u32>,
    pub proxy: Option<String>,
    pub follow_redirects: Option<bool>,
    pub ignore_body: Option<bool>,
    pub output: Option<String>,
    pub output_format: Option<String>,
    pub output_directory: Option<String>,
    pub match_status: Option<String>,
    pub match_size: Option<String>,
    pub match_words: Option<String>,
    pub match_lines: Option<String>,
    pub match_regex: Option<String>,
    pub filter_status: Option<String>,
    pub filter_size: Option<String>,
    pub filter_words: Option<String>,
    pub filter_lines: Option<String>,
    pub filter_regex: Option<String>,
    pub no_color: Option<bool>,
}

fn home_dir() -> Option<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("USERPROFILE").map(PathBuf::from))
        .or_else(|| {
            let drive = env::var_os("HOMEDRIVE")?;
            let path = env::var_os("HOMEPATH")?;
            Some(PathBuf::from(drive).join(path))
        })
}

pub fn default_config_path() -> Option<PathBuf> {
    Some(home_dir()?.join(".fuzzcore").join("config.yml"))
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn expand_tilde_string(path: &str) -> String {
    expand_tilde(path).to_string_lossy().to_string()
}

pub fn load_config(path: &Path, allow_missing: bool) -> Result<ConfigFile, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            serde_yaml::from_str::<ConfigFile>(&contents).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
            Ok(ConfigFile::default())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound {
            path: path.display().to_string(),
        }),
        Err(e) => Err(ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        }),
    }
}
