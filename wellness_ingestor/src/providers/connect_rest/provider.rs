use std::{path::Path, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    models::spo2::{SleepData, Spo2Summary},
    providers::{
        AuthenticationSnafu, ClientBuildSnafu, DecodeSnafu, HttpSnafu, InternalSnafu,
        LoginOutcome, MfaChallenge, ProviderError, ProviderInitError, ReqwestSnafu, TrackerApi,
        connect_rest::{
            response::{
                SigninRequest, SigninResponse, SocialProfile, TokenResponse, VerifyMfaRequest,
            },
            session::SessionTokens,
        },
        normalize_base_url,
    },
};

const DEFAULT_API_BASE: &str = "https://connectapi.garmin.com";
const DEFAULT_SSO_BASE: &str = "https://sso.garmin.com/sso";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Base URLs of the tracker's data API and its sign-in service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectEndpoints {
    pub api_base: String,
    pub sso_base: String,
}

impl Default for ConnectEndpoints {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            sso_base: DEFAULT_SSO_BASE.to_string(),
        }
    }
}

pub struct ConnectProvider {
    client: Client,
    api_base: String,
    sso_base: String,
    limiter: DefaultDirectRateLimiter,
    session: Option<SessionTokens>,
}

impl ConnectProvider {
    /// Creates an unauthenticated provider.
    ///
    /// Call [`TrackerApi::load_session`] or [`TrackerApi::login`] before fetching data.
    pub fn new(endpoints: ConnectEndpoints) -> Result<Self, ProviderInitError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("spo2-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            api_base: normalize_base_url(&endpoints.api_base)?,
            sso_base: normalize_base_url(&endpoints.sso_base)?,
            limiter: RateLimiter::direct(Quota::per_second(nonzero!(4u32))),
            session: None,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    fn access_token(&self) -> Result<&SecretString, ProviderError> {
        self.session
            .as_ref()
            .map(|s| &s.access_token)
            .ok_or_else(|| {
                AuthenticationSnafu {
                    message: "no active session",
                }
                .build()
            })
    }

    fn display_name(&self) -> Result<&str, ProviderError> {
        self.session
            .as_ref()
            .and_then(|s| s.display_name.as_deref())
            .ok_or_else(|| {
                InternalSnafu {
                    message: "session has no display name",
                }
                .build()
            })
    }

    /// GETs `path` on the data API. Empty and `null` bodies come back as `None`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, ProviderError> {
        let token = self.access_token()?;
        let url = format!("{}{}", self.api_base, path);

        self.limiter.until_ready().await;
        debug!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose_secret())
            .query(query)
            .send()
            .await
            .context(ReqwestSnafu)?;

        let body = success_body(response).await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .context(DecodeSnafu { what: url })
    }

    async fn post_sso<B: serde::Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ProviderError> {
        let url = format!("{}{}", self.sso_base, path);
        self.limiter.until_ready().await;
        debug!(%url, "POST");
        self.client
            .post(&url)
            .json(body)
            .send()
            .await
            .context(ReqwestSnafu)
    }

    /// Turns a token grant into a live session and looks up the profile name the
    /// sleep endpoint is keyed by.
    async fn establish(&mut self, grant: TokenResponse) -> Result<(), ProviderError> {
        self.session = Some(SessionTokens {
            access_token: SecretString::new(grant.access_token.into()),
            refresh_token: grant.refresh_token.map(|t| SecretString::new(t.into())),
            expires_at: Utc::now().timestamp().saturating_add(grant.expires_in),
            display_name: None,
        });
        self.refresh_profile().await
    }

    async fn refresh_profile(&mut self) -> Result<(), ProviderError> {
        let profile: Option<SocialProfile> = self
            .get_json("/userprofile-service/socialProfile", &[])
            .await?;
        let profile = profile.ok_or_else(|| {
            InternalSnafu {
                message: "empty profile response",
            }
            .build()
        })?;
        if let Some(session) = self.session.as_mut() {
            session.display_name = Some(profile.display_name);
        }
        Ok(())
    }
}

/// Returns the body of a 2xx response, or an [`ProviderError::Http`] carrying status and body.
async fn success_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    let url = response.url().to_string();
    let body = response.text().await.context(ReqwestSnafu)?;
    if status.is_success() {
        return Ok(body);
    }
    let reason = status.canonical_reason().unwrap_or("Unknown");
    HttpSnafu {
        status: status.as_u16(),
        url,
        message: format!("{reason}: {}", body.trim()),
    }
    .fail()
}

#[async_trait]
impl TrackerApi for ConnectProvider {
    async fn load_session(&mut self, token_store: &Path) -> Result<(), ProviderError> {
        let tokens = SessionTokens::load(token_store).await?;
        if tokens.is_expired(Utc::now()) {
            return AuthenticationSnafu {
                message: "stored session has expired",
            }
            .fail();
        }
        self.session = Some(tokens);

        // A profile round-trip both validates the token and refreshes the display name.
        if let Err(e) = self.refresh_profile().await {
            self.session = None;
            return Err(e);
        }
        info!(path = %token_store.display(), "reusing stored session");
        Ok(())
    }

    async fn login(
        &mut self,
        email: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, ProviderError> {
        let response = self
            .post_sso(
                "/signin",
                &SigninRequest {
                    username: email,
                    password: password.expose_secret(),
                },
            )
            .await?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return AuthenticationSnafu {
                message: "email or password rejected",
            }
            .fail();
        }

        let body = success_body(response).await?;
        let signin: SigninResponse = serde_json::from_str(&body).context(DecodeSnafu {
            what: "sign-in response",
        })?;

        match signin {
            SigninResponse::Success { token } => {
                self.establish(token).await?;
                Ok(LoginOutcome::Authenticated)
            }
            SigninResponse::MfaRequired { mfa_ticket } => {
                Ok(LoginOutcome::NeedsMfa(MfaChallenge { ticket: mfa_ticket }))
            }
        }
    }

    async fn resume_login(
        &mut self,
        challenge: &MfaChallenge,
        code: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .post_sso(
                "/verifyMFA",
                &VerifyMfaRequest {
                    mfa_ticket: &challenge.ticket,
                    code: code.trim(),
                },
            )
            .await?;
        let body = success_body(response).await?;
        let grant: TokenResponse = serde_json::from_str(&body).context(DecodeSnafu {
            what: "MFA token grant",
        })?;

        // The code was accepted; a rejected profile lookup must not read as a wrong code.
        self.establish(grant).await.map_err(|e| match e {
            ProviderError::Http {
                status, message, ..
            } => InternalSnafu {
                message: format!("MFA accepted but profile lookup failed ({status}): {message}"),
            }
            .build(),
            other => other,
        })
    }

    async fn dump_session(&self, token_store: &Path) -> Result<(), ProviderError> {
        let session = self.session.as_ref().ok_or_else(|| {
            InternalSnafu {
                message: "no session to persist",
            }
            .build()
        })?;
        session.store(token_store).await
    }

    async fn fetch_spo2_summary(
        &self,
        day: NaiveDate,
    ) -> Result<Option<Spo2Summary>, ProviderError> {
        self.get_json(&format!("/wellness-service/wellness/daily/spo2/{day}"), &[])
            .await
    }

    async fn fetch_sleep_data(&self, day: NaiveDate) -> Result<Option<SleepData>, ProviderError> {
        let display_name = self.display_name()?;
        self.get_json(
            &format!("/wellness-service/wellness/dailySleepData/{display_name}"),
            &[
                ("date", day.to_string()),
                ("nonSleepBufferMinutes", "60".to_string()),
            ],
        )
        .await
    }
}

