use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    analytics::WellnessService,
    models::wellness::WellnessRecord,
    providers::{
        ClientBuildSnafu, DecodeSnafu, HttpSnafu, ProviderError, ProviderInitError, ReqwestSnafu,
        normalize_base_url,
    },
};

/// Public base URL of the analytics API.
pub const DEFAULT_BASE_URL: &str = "https://intervals.icu";

/// Basic-auth user name the API expects alongside the key.
const API_KEY_USER: &str = "API_KEY";

pub struct IntervalsProvider {
    client: Client,
    base_url: String,
    athlete_id: String,
    api_key: SecretString,
}

impl IntervalsProvider {
    /// Creates a client for one athlete's wellness records.
    pub fn new(
        athlete_id: impl Into<String>,
        api_key: SecretString,
        base_url: &str,
    ) -> Result<Self, ProviderInitError> {
        let client = Client::builder().build().context(ClientBuildSnafu)?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url)?,
            athlete_id: athlete_id.into(),
            api_key,
        })
    }

    fn wellness_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/api/v1/athlete/{}/wellness/{date}",
            self.base_url, self.athlete_id
        )
    }

    async fn send(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<WellnessRecord, ProviderError> {
        let response = request
            .basic_auth(API_KEY_USER, Some(self.api_key.expose_secret()))
            .send()
            .await
            .context(ReqwestSnafu)?;

        let status = response.status();
        let body = response.text().await.context(ReqwestSnafu)?;
        if !status.is_success() {
            return HttpSnafu {
                status: status.as_u16(),
                url,
                message: body,
            }
            .fail();
        }
        serde_json::from_str(&body).context(DecodeSnafu {
            what: "wellness record",
        })
    }
}

#[async_trait]
impl WellnessService for IntervalsProvider {
    async fn wellness(&self, date: NaiveDate) -> Result<WellnessRecord, ProviderError> {
        let url = self.wellness_url(date);
        debug!(%url, "GET wellness");
        self.send(&url, self.client.get(&url)).await
    }

    async fn put_wellness(&self, record: &WellnessRecord) -> Result<WellnessRecord, ProviderError> {
        let url = self.wellness_url(record.id);
        debug!(%url, spo2 = ?record.spo2, "PUT wellness");
        self.send(&url, self.client.put(&url).json(record)).await
    }
}
