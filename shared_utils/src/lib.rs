//! Small helpers shared by the workspace crates: environment variables and
//! configuration errors.

pub mod config;
pub mod env;
