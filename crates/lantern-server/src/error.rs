use thiserror::Error;

/// Failures reaching the owner thread.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OwnerError {
    #[error("owner thread is not running")]
    Closed,

    #[error("blocking invoke from the owner thread would deadlock")]
    Reentrant,
}

/// Invalid server configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?} ({reason})")]
    InvalidVar {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Owner(#[from] OwnerError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] lantern_core::Error),
}
