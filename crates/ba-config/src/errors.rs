use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cvar {0:?} is not registered")]
    UnknownCvar(String),

    #[error("cvar {name:?} is a command, it has no value")]
    NotAValue { name: String },

    #[error("cvar {name:?} holds a {actual} value, not {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("failed to load process config: {0}")]
    Load(#[from] config::ConfigError),
}
