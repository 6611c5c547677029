use serde::{Deserialize, Serialize};

/// Body of a successful sign-in, tagged by `status`.
#[derive(Deserialize, Debug)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SigninResponse {
    Success { token: TokenResponse },
    MfaRequired { mfa_ticket: String },
}

/// OAuth2-style token grant.
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Deserialize, Debug)]
pub struct SocialProfile {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Serialize, Debug)]
pub struct SigninRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Debug)]
pub struct VerifyMfaRequest<'a> {
    pub mfa_ticket: &'a str,
    pub code: &'a str,
}
