use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::config::ConfigError;

/// Reads an optional environment variable. Unset and empty values are both `None`.
pub fn get_env_var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Reads and parses an optional environment variable.
///
/// Returns `Ok(None)` when the variable is unset, and a [`ConfigError::InvalidValue`]
/// when it is set to something `T` cannot parse.
pub fn parse_env_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_env_var_opt(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

/// Expands a leading `~` to the current user's home directory.
///
/// Paths without a leading `~`, or hosts without a resolvable home directory,
/// are returned unchanged.
pub fn expand_home(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
