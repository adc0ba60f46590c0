//! Configuration for hoard.
//!
//! Values are layered, later layers winning:
//!
//! 1. built-in defaults ([`Config::default`]),
//! 2. `hoard.toml`, `hoard.yaml` or `hoard.json` in the platform config
//!    directory, or a single file passed explicitly,
//! 3. environment variables prefixed with `HOARD_`. Nested keys are separated
//!    by a double underscore, e.g. `HOARD_HTTP__RETRIES=3`.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "HOARD_";
const FILE_NAMES: [&str; 3] = ["hoard.toml", "hoard.yaml", "hoard.json"];

/// Settings for talking to the content API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub retries: u32,
    pub retry_wait_ms: u64,
    pub connect_timeout_secs: u64,
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            retry_wait_ms: 250,
            connect_timeout_secs: 60,
        }
    }
}
impl HttpConfig {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where downloaded files are stored, mirroring their remote paths.
    pub cache_dir: PathBuf,
    /// Root of the browsable symlink tree.
    pub library_dir: PathBuf,
    /// Concurrent downloads.
    pub workers: usize,
    /// Files waiting to be linked before discovery pauses.
    pub link_queue: usize,
    pub http: HttpConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
            library_dir: PathBuf::from("."),
            workers: 8,
            link_queue: 8,
            http: HttpConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from `path`, or from the platform config directory
    /// when no path is given. Missing default files are not an error.
    ///
    /// Values are not checked here; call [`Config::validate`] once any
    /// command-line overrides have been applied.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let files = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => vec![path.to_path_buf()],
            None => default_files(),
        };
        Self::from_files(&files)
    }

    fn from_files(files: &[PathBuf]) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        for file in files {
            tracing::debug!(path = %file.display(), "Reading configuration file");
            figment = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(file)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(file)),
                Some("json") => figment.merge(Json::file(file)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(file.clone())),
            };
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract().or_raise(|| ErrorKind::Parse)
    }

    /// Checks values that parse fine but cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            exn::bail!(ErrorKind::Invalid("workers must be at least 1".to_string()));
        }
        if self.link_queue == 0 {
            exn::bail!(ErrorKind::Invalid("link_queue must be at least 1".to_string()));
        }
        if self.cache_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("cache_dir must not be empty".to_string()));
        }
        if self.library_dir.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("library_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

fn default_files() -> Vec<PathBuf> {
    let Some(dirs) = directories::ProjectDirs::from("", "", "hoard") else {
        return vec![];
    };
    FILE_NAMES.iter().map(|name| dirs.config_dir().join(name)).filter(|path| path.is_file()).collect()
}
