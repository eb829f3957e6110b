//! Static process-wide settings (spec §1 Non-goals: "does not specify the
//! config-variable substrate beyond the fact that tunables exist and are
//! read at call sites"; SPEC_FULL §B Configuration). Distinct from
//! [`crate::CVarRegistry`]: this is the handful of values the client needs
//! before anything interesting has happened yet — cache directories, the
//! default server endpoint, whether to prefer HTTPS — not the
//! client/server/skin-layered gameplay tunables.
//!
//! Grounded on the teacher's `lgn-config` crate: a `once_cell::Lazy` over
//! the `config` crate, searching a fixed set of locations in order and
//! letting later sources override earlier ones.

use std::path::PathBuf;

use config::FileFormat;
use once_cell::sync::Lazy;

use crate::errors::ConfigError;

pub const DEFAULT_FILENAME: &str = "beatmap-assets.toml";

/// Process-wide settings loaded once at startup. Wraps a `config::Config`
/// rather than a bespoke struct so new keys don't require touching this
/// crate (matching `lgn_config::Config`'s `get`/`get_or` style).
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    inner: config::Config,
}

pub static PROCESS_CONFIG: Lazy<ProcessConfig> =
    Lazy::new(|| ProcessConfig::load().expect("failed to load process configuration"));

impl ProcessConfig {
    /// Builds a configuration from sources in precedence order (later wins):
    /// 1. `/etc/beatmap-assets/beatmap-assets.toml` on Unix (system-wide).
    /// 2. A `beatmap-assets.toml` found by walking up from the current
    ///    working directory (project/dev override).
    /// 3. The user config directory (`dirs::config_dir()/beatmap-assets/...`).
    /// 4. A file named by the `BA_CONFIG` environment variable, if set.
    /// 5. Environment variables prefixed `BA_` (highest precedence).
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if cfg!(unix) {
            builder = builder.add_source(
                config::File::with_name(&format!("/etc/beatmap-assets/{DEFAULT_FILENAME}"))
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        for dir in std::env::current_dir()
            .map_err(|e| ConfigError::Load(config::ConfigError::Message(e.to_string())))?
            .ancestors()
        {
            let candidate = dir.join(DEFAULT_FILENAME);
            if candidate.is_file() {
                builder = builder
                    .add_source(config::File::from(candidate).format(FileFormat::Toml));
                break;
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let candidate = config_dir.join("beatmap-assets").join(DEFAULT_FILENAME);
            builder = builder.add_source(
                config::File::from(candidate)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        if let Some(path) = std::env::var_os("BA_CONFIG") {
            builder = builder.add_source(
                config::File::from(PathBuf::from(path))
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(config::Environment::with_prefix("BA"));

        Ok(Self {
            inner: builder.build()?,
        })
    }

    /// Builds a configuration purely from an in-memory TOML string; for
    /// tests that don't want to touch the filesystem or environment.
    pub fn from_toml(toml: &str) -> Self {
        let inner = config::Config::builder()
            .add_source(config::File::from_str(toml, FileFormat::Toml))
            .build()
            .expect("failed to build in-memory process configuration");
        Self { inner }
    }

    pub fn get<'de, T: serde::Deserialize<'de>>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.inner.get(key) {
            Ok(value) => Ok(Some(value)),
            Err(config::ConfigError::NotFound(missing)) if missing == key => Ok(None),
            Err(err) => Err(ConfigError::Load(err)),
        }
    }

    pub fn get_or<'de, T: serde::Deserialize<'de>>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_returns_none_not_an_error() {
        let config = ProcessConfig::from_toml("cache_dir = \"/data/cache\"\n");
        let value: Option<String> = config.get("nonexistent").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn present_key_deserializes() {
        let config = ProcessConfig::from_toml("avatar_endpoint = \"ppy.sh\"\nuse_https = true\n");
        let endpoint: String = config.get_or("avatar_endpoint", "default".to_string()).unwrap();
        assert_eq!(endpoint, "ppy.sh");
        let https: bool = config.get_or("use_https", false).unwrap();
        assert!(https);
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let config = ProcessConfig::from_toml("");
        let max_loaded: i64 = config.get_or("max_loaded_avatars", 100).unwrap();
        assert_eq!(max_loaded, 100);
    }
}
