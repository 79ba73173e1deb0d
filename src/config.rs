//! Configuration of the batch run.
//!
//! Values are looked up key by key through an ordered list of layers; the
//! first layer that holds a non-empty value wins:
//!
//! 1. `--set KEY=VALUE` pairs (and dedicated flags) on the command line
//! 2. `./batchenc.toml`
//! 3. process environment variables
//! 4. `$HOME/.batchenc/batchenc.toml`
//!
//! [`ConfigProvider`] answers raw lookups; [`BatchConfig`] is the typed result
//! built once at startup and passed down explicitly.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::BatchError;
use crate::platform::client::API_URL;

pub const CONFIG_FILE_NAME: &str = "batchenc.toml";
const HOME_CONFIG_DIR: &str = ".batchenc";

pub const API_KEY: &str = "BITMOVIN_API_KEY";
pub const TENANT_ORG_ID: &str = "BITMOVIN_TENANT_ORG_ID";
pub const API_URL_KEY: &str = "BITMOVIN_API_URL";
pub const HTTP_INPUT_HOST: &str = "HTTP_INPUT_HOST";
pub const HTTP_INPUT_FILE_PATH: &str = "HTTP_INPUT_FILE_PATH";
pub const S3_OUTPUT_BUCKET_NAME: &str = "S3_OUTPUT_BUCKET_NAME";
pub const S3_OUTPUT_ACCESS_KEY: &str = "S3_OUTPUT_ACCESS_KEY";
pub const S3_OUTPUT_SECRET_KEY: &str = "S3_OUTPUT_SECRET_KEY";
pub const S3_OUTPUT_BASE_PATH: &str = "S3_OUTPUT_BASE_PATH";
pub const TARGET_QUEUE_SIZE: &str = "TARGET_QUEUE_SIZE";
pub const MAX_RETRIES: &str = "MAX_RETRIES";
pub const NUMBER_OF_ENCODINGS: &str = "NUMBER_OF_ENCODINGS";
pub const POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const REQUEST_DELAY_MS: &str = "REQUEST_DELAY_MS";

// Defaults for the batch sizing keys.
const DEFAULT_TARGET_QUEUE_SIZE: usize = 3;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_NUMBER_OF_ENCODINGS: usize = 7;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_REQUEST_DELAY_MS: u64 = 300;

struct ConfigLayer {
    name: &'static str,
    values: HashMap<String, String>,
}

/// Ordered key/value layers, highest precedence first.
#[derive(Default)]
pub struct ConfigProvider {
    layers: Vec<ConfigLayer>,
}

impl ConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer below all existing ones.
    pub fn with_layer(mut self, name: &'static str, values: HashMap<String, String>) -> Self {
        self.layers.push(ConfigLayer { name, values });
        self
    }

    /// Build the standard chain: command line, local file, environment, home file.
    pub fn load(cli_overrides: HashMap<String, String>) -> Result<Self, BatchError> {
        let local = read_toml_layer(Path::new(CONFIG_FILE_NAME))?;
        let home = match home_dir() {
            Some(home) => read_toml_layer(&home.join(HOME_CONFIG_DIR).join(CONFIG_FILE_NAME))?,
            None => HashMap::new(),
        };

        Ok(Self::new()
            .with_layer("command line", cli_overrides)
            .with_layer("local config file", local)
            .with_layer("environment", environment())
            .with_layer("home config file", home))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.lookup(key).map(|(_, value)| value)
    }

    /// Name of the layer that provides `key`.
    pub fn source_of(&self, key: &str) -> Option<&'static str> {
        self.lookup(key).map(|(name, _)| name)
    }

    pub fn require(&self, key: &str) -> Result<&str, BatchError> {
        self.get(key)
            .ok_or_else(|| BatchError::MissingKey(key.to_string()))
    }

    fn lookup(&self, key: &str) -> Option<(&'static str, &str)> {
        self.layers.iter().find_map(|layer| {
            layer
                .values
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| (layer.name, v))
        })
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, BatchError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| BatchError::invalid_value(key, raw, e.to_string())),
            None => Ok(default),
        }
    }
}

// Non-UTF-8 variables cannot hold any of our keys; skip them.
fn environment() -> HashMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Read a flat `KEY = value` TOML file. A missing file is an empty layer.
fn read_toml_layer(path: &Path) -> Result<HashMap<String, String>, BatchError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    debug!("Reading configuration from {}", path.display());
    let contents = std::fs::read_to_string(path)?;
    let table: toml::Table = toml::from_str(&contents)?;

    table
        .into_iter()
        .map(|(key, value)| {
            let text = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Float(f) => f.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(BatchError::invalid_value(
                        key,
                        other.to_string(),
                        format!("{} must hold a plain value", path.display()),
                    ));
                }
            };
            Ok((key, text))
        })
        .collect()
}

/// Parse a `KEY=VALUE` command-line pair.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Strip a leading `/` and make sure the path ends with exactly one `/`.
pub fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

#[derive(Clone)]
pub struct PlatformConfig {
    pub api_key: String,
    pub tenant_org_id: Option<String>,
    pub api_url: String,
}

impl fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("api_key", &"<redacted>")
            .field("tenant_org_id", &self.tenant_org_id)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct InputConfig {
    pub host: String,
    pub file_path: String,
}

#[derive(Clone)]
pub struct OutputConfig {
    pub bucket_name: String,
    pub access_key: String,
    pub secret_key: String,
    /// Normalized: no leading slash, one trailing slash (or empty).
    pub base_path: String,
}

impl fmt::Debug for OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputConfig")
            .field("bucket_name", &self.bucket_name)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// Sizing and pacing of the batch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    /// Number of remote jobs the loop tries to keep queued.
    pub target_queue_size: usize,
    pub max_retries: u32,
    /// Size of the generated batch when no batch file is given.
    pub number_of_encodings: usize,
    /// Pause after each pass.
    pub poll_interval: Duration,
    /// Pause between individual start or poll calls.
    pub request_delay: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            target_queue_size: DEFAULT_TARGET_QUEUE_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            number_of_encodings: DEFAULT_NUMBER_OF_ENCODINGS,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
        }
    }
}

impl BatchSettings {
    pub fn resolve(provider: &ConfigProvider) -> Result<Self, BatchError> {
        let settings = Self {
            target_queue_size: provider.parse_or(TARGET_QUEUE_SIZE, DEFAULT_TARGET_QUEUE_SIZE)?,
            max_retries: provider.parse_or(MAX_RETRIES, DEFAULT_MAX_RETRIES)?,
            number_of_encodings: provider
                .parse_or(NUMBER_OF_ENCODINGS, DEFAULT_NUMBER_OF_ENCODINGS)?,
            poll_interval: Duration::from_secs(
                provider.parse_or(POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS)?,
            ),
            request_delay: Duration::from_millis(
                provider.parse_or(REQUEST_DELAY_MS, DEFAULT_REQUEST_DELAY_MS)?,
            ),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.target_queue_size == 0 {
            return Err(BatchError::invalid_value(
                TARGET_QUEUE_SIZE,
                "0",
                "must be at least 1",
            ));
        }
        if self.number_of_encodings == 0 {
            return Err(BatchError::invalid_value(
                NUMBER_OF_ENCODINGS,
                "0",
                "must be at least 1",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(BatchError::invalid_value(
                POLL_INTERVAL_SECS,
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Everything a `run` needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub platform: PlatformConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub batch: BatchSettings,
}

impl BatchConfig {
    pub fn resolve(provider: &ConfigProvider) -> Result<Self, BatchError> {
        let platform = PlatformConfig {
            api_key: provider.require(API_KEY)?.to_string(),
            tenant_org_id: provider.get(TENANT_ORG_ID).map(str::to_string),
            api_url: provider.get(API_URL_KEY).unwrap_or(API_URL).to_string(),
        };
        if !platform.api_url.starts_with("http://") && !platform.api_url.starts_with("https://") {
            return Err(BatchError::invalid_value(
                API_URL_KEY,
                &platform.api_url,
                "must start with http:// or https://",
            ));
        }

        let input = InputConfig {
            host: provider.require(HTTP_INPUT_HOST)?.to_string(),
            file_path: provider.require(HTTP_INPUT_FILE_PATH)?.to_string(),
        };

        let output = OutputConfig {
            bucket_name: provider.require(S3_OUTPUT_BUCKET_NAME)?.to_string(),
            access_key: provider.require(S3_OUTPUT_ACCESS_KEY)?.to_string(),
            secret_key: provider.require(S3_OUTPUT_SECRET_KEY)?.to_string(),
            base_path: normalize_base_path(provider.require(S3_OUTPUT_BASE_PATH)?),
        };

        Ok(Self {
            platform,
            input,
            output,
            batch: BatchSettings::resolve(provider)?,
        })
    }
}
