//! HTTP implementation of [`TrackerApi`](crate::providers::TrackerApi).

pub mod provider;
pub mod response;
pub mod session;

pub use provider::{ConnectEndpoints, ConnectProvider};
pub use session::{SessionTokens, TOKEN_FILE};
