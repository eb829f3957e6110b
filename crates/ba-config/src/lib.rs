//! Two configuration surfaces that don't share a representation (spec §4.10,
//! SPEC_FULL §B): [`CVarRegistry`] holds named, typed, flagged values with
//! client/server/skin precedence and live change notification; [`ProcessConfig`]
//! is the handful of process-wide settings (cache directories, default
//! endpoints) read once at startup from a TOML file or environment variable.

mod errors;
mod flags;
mod process;
mod registry;
mod value;

pub use errors::ConfigError;
pub use flags::CvarFlags;
pub use process::{ProcessConfig, DEFAULT_FILENAME, PROCESS_CONFIG};
pub use registry::{ChangeCallback, CommandCallback, CVarRegistry, CvarKind};
pub use value::CvarValue;
