//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_MEILISEARCH__URL`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::{RejectPolicy, DEFAULT_BATCH_SIZE};
use crate::error::{Error, Result};
use crate::timing::TimingFormat;
use crate::wait::PollPolicy;

/// Layered configuration shared by the orchestrator and every driver.
///
/// Drivers pull their own `[<engine>]` section out of it during `build`, so
/// adding a backend never touches [`Settings`].
#[derive(Clone)]
pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{}': {}", key, e)))
    }

    /// Like [`Config::get`], but an absent section yields `T::default()`.
    pub fn section<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        if self.figment.contains(key) { self.get(key) } else { Ok(T::default()) }
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Configuration(format!("Failed to read run settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Run-level options. Every field has a default so a partial config is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Backend name as known to the registry.
    pub engine: Option<String>,
    /// `ingest`, `query` or `ingest+query`.
    pub op: Option<String>,
    pub ingest_input_path: Option<String>,
    pub query_input_path: Option<String>,
    pub reset_at_init: bool,
    pub debug: bool,
    pub timing: bool,
    pub timing_format: TimingFormat,
    pub batch_size: usize,
    pub reject_policy: RejectPolicy,
    pub flush_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            engine: None,
            op: None,
            ingest_input_path: None,
            query_input_path: None,
            reset_at_init: false,
            debug: false,
            timing: false,
            timing_format: TimingFormat::Plain,
            batch_size: DEFAULT_BATCH_SIZE,
            reject_policy: RejectPolicy::Skip,
            flush_timeout_secs: 300,
            poll_interval_ms: 10,
            progress: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be at least 1 (APP_BATCH_SIZE)".into()));
        }
        if self.flush_timeout_secs == 0 {
            return Err(Error::Configuration(
                "flush_timeout_secs must be at least 1 (APP_FLUSH_TIMEOUT_SECS)".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_secs(self.flush_timeout_secs),
            Duration::from_millis(self.poll_interval_ms.max(1)),
        )
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
