//! # AudioCast Configuration Module
//!
//! YAML configuration for the caster:
//! - an embedded default configuration,
//! - merged with `config.yaml` from the configuration directory,
//! - overridden by `AUDIOCAST_CONFIG__SECTION__KEY=value` environment variables,
//! - exposed through typed getters that fall back to defaults.
//!
//! ## Usage
//!
//! ```no_run
//! use castconfig::get_config;
//!
//! let config = get_config();
//! let port = config.get_http_port();
//! let codec = config.get_stream_codec();
//! ```

use anyhow::{Result, anyhow};
use dirs::home_dir;
use lazy_static::lazy_static;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};

// Built-in defaults
const DEFAULT_CONFIG: &str = include_str!("audiocast.yaml");

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load AudioCast configuration"));
}

const ENV_CONFIG_DIR: &str = "AUDIOCAST_CONFIG";
const ENV_PREFIX: &str = "AUDIOCAST_CONFIG__";
const CONFIG_DIR_NAME: &str = ".audiocast";

const DEFAULT_HTTP_PORT: u16 = 9000;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_CODEC: &str = "mp3";
const DEFAULT_BITRATE: usize = 320;
const DEFAULT_CHUNK_SECONDS: usize = 1;
const DEFAULT_BIT_DEPTH: usize = 16;
const DEFAULT_SAMPLE_RATE: usize = 44100;
const DEFAULT_CHANNELS: usize = 2;
const DEFAULT_CAPTURE_SOURCE: &str = "audiocast.monitor";
const DEFAULT_CAPTURE_PROGRAM: &str = "parec";
const DEFAULT_CAPTURE_CLIENT: &str = "audiocast-rec";
const DEFAULT_TRANSCODE_PROGRAM: &str = "ffmpeg";

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> usize {
            match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().map(|v| v as usize).unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse().unwrap_or($default),
                _ => $default,
            }
        }

        pub fn $setter(&self, value: usize) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> bool {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => b,
                _ => $default,
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> String {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => $default.to_string(),
            }
        }

        pub fn $setter(&self, value: String) -> Result<()> {
            self.set_value($path, Value::String(value))
        }
    };
}

/// Configuration manager
#[derive(Debug)]
pub struct Config {
    config_dir: PathBuf,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying, in order: the argument, the
    /// `AUDIOCAST_CONFIG` variable, `./.audiocast`, `~/.audiocast`.
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        let local = Path::new(CONFIG_DIR_NAME);
        if local.exists() {
            return local.to_path_buf();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        local.to_path_buf()
    }

    fn prepare_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }
        Ok(())
    }

    /// Loads the embedded defaults, merges `config.yaml` from the configuration
    /// directory, applies the environment overrides and writes the result back.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::prepare_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join("config.yaml");

        // Keys are folded before merging so that `Stream:` lands on `stream:`.
        let mut value = lower_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external = lower_keys(serde_yaml::from_slice(&data)?);
                merge_yaml(&mut value, &external);
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using embedded defaults");
            }
        }

        apply_env_overrides(&mut value, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(value),
        };
        config.save()?;
        Ok(config)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Writes the current configuration to `config.yaml`.
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Sets a value at `path` (e.g. `&["stream", "codec"]`) and saves.
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        set_value_internal(&mut self.data(), path, value)?;
        self.save()
    }

    /// Gets the value at `path`; keys are case-insensitive.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        let mut current = &*data;
        for (i, key) in path.iter().enumerate() {
            let Value::Mapping(map) = current else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            };
            current = map
                .get(Value::String(key.to_lowercase()))
                .ok_or_else(|| anyhow!("Path {} does not exist", path[..=i].join(".")))?;
        }
        Ok(current.clone())
    }

    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!("Invalid HTTP port {}, using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid HTTP port '{}', using default {}", s, DEFAULT_HTTP_PORT);
                DEFAULT_HTTP_PORT
            }),
            _ => DEFAULT_HTTP_PORT,
        }
    }

    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// Address advertised to the renderer; empty means "guess".
    pub fn get_stream_address(&self) -> Option<String> {
        match self.get_value(&["host", "stream_address"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    /// Renderer descriptor location; `None` when discovery has not provided one.
    pub fn get_renderer_location(&self) -> Option<String> {
        match self.get_value(&["renderer", "location"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        true
    );

    impl_string_config!(
        get_stream_codec,
        set_stream_codec,
        &["stream", "codec"],
        DEFAULT_CODEC
    );

    impl_usize_config!(
        get_stream_bitrate,
        set_stream_bitrate,
        &["stream", "bitrate"],
        DEFAULT_BITRATE
    );

    impl_usize_config!(
        get_stream_chunk_seconds,
        set_stream_chunk_seconds,
        &["stream", "chunk_seconds"],
        DEFAULT_CHUNK_SECONDS
    );

    impl_usize_config!(
        get_stream_bit_depth,
        set_stream_bit_depth,
        &["stream", "bit_depth"],
        DEFAULT_BIT_DEPTH
    );

    impl_usize_config!(
        get_stream_sample_rate,
        set_stream_sample_rate,
        &["stream", "sample_rate"],
        DEFAULT_SAMPLE_RATE
    );

    impl_usize_config!(
        get_stream_channels,
        set_stream_channels,
        &["stream", "channels"],
        DEFAULT_CHANNELS
    );

    impl_bool_config!(
        get_stream_disable_chunked,
        set_stream_disable_chunked,
        &["stream", "disable_chunked"],
        false
    );

    impl_bool_config!(
        get_stream_print_headers,
        set_stream_print_headers,
        &["stream", "print_headers"],
        false
    );

    impl_string_config!(
        get_capture_source,
        set_capture_source,
        &["capture", "source"],
        DEFAULT_CAPTURE_SOURCE
    );

    impl_string_config!(
        get_capture_program,
        set_capture_program,
        &["capture", "program"],
        DEFAULT_CAPTURE_PROGRAM
    );

    impl_string_config!(
        get_capture_client_name,
        set_capture_client_name,
        &["capture", "client_name"],
        DEFAULT_CAPTURE_CLIENT
    );

    impl_string_config!(
        get_transcode_program,
        set_transcode_program,
        &["transcode", "program"],
        DEFAULT_TRANSCODE_PROGRAM
    );

    impl_string_config!(
        get_renderer_service_id,
        set_renderer_service_id,
        &["renderer", "service_id"],
        ""
    );
}

/// Returns the global configuration, loaded on first access.
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((first, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };
    let Value::Mapping(map) = data else {
        return Err(anyhow!("Current node is not a mapping"));
    };
    let key = Value::String(first.to_lowercase());
    if rest.is_empty() {
        map.insert(key, value);
        Ok(())
    } else {
        let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
        set_value_internal(entry, rest, value)
    }
}

fn apply_env_overrides(config: &mut Value, vars: impl Iterator<Item = (String, String)>) {
    for (key, raw) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<&str> = stripped.split("__").collect();
        let value = serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw));
        if let Err(err) = set_value_internal(config, &path, value) {
            warn!(variable = %key, "Ignoring configuration override: {}", err);
        }
    }
}

fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

/// Recursively merges `external` into `default`: mappings are merged key by
/// key, scalars and sequences are replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
