use thiserror::Error;

/// Errors related to application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be parsed.
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// Neither the environment nor the config file provides a login credential.
    #[error("Missing credentials: no {0} configured (set it in the config file or the environment)")]
    MissingCredentials(&'static str),
}
