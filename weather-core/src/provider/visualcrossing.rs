use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::{ApiConfig, WeatherRecord, provider::truncate_body};

use super::{ProviderError, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "https://weather.visualcrossing.com";

const TIMELINE_PATH: [&str; 4] = ["VisualCrossingWebServices", "rest", "services", "timeline"];

/// Visual Crossing timeline API, current conditions only.
#[derive(Debug, Clone)]
pub struct VisualCrossingProvider {
    base_url: String,
    http: Client,
}

impl VisualCrossingProvider {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the provider at another host, e.g. a local stub.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: Client::new() }
    }

    fn timeline_url(&self, location: &str, api_key: &str) -> Result<Url, ProviderError> {
        let invalid_base = || {
            let msg = format!("Invalid Visual Crossing base URL: {}", self.base_url);
            ProviderError::Unavailable(msg)
        };

        let mut url = Url::parse(&self.base_url).map_err(|_| invalid_base())?;
        url.path_segments_mut()
            .map_err(|_| invalid_base())?
            .pop_if_empty()
            .extend(TIMELINE_PATH)
            .push(location);

        url.query_pairs_mut()
            .append_pair("unitGroup", "metric")
            .append_pair("key", api_key)
            .append_pair("contentType", "json");

        Ok(url)
    }
}

impl Default for VisualCrossingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherProvider for VisualCrossingProvider {
    async fn current_conditions(
        &self,
        location: &str,
        config: &ApiConfig,
    ) -> Result<WeatherRecord, ProviderError> {
        let url = self.timeline_url(location, &config.open_weather_api_key)?;
        debug!(location = %location, "requesting Visual Crossing timeline");

        // Errors are stripped of the URL so the API key never ends up in a response.
        let res = self.http.get(url).send().await.map_err(|err| {
            ProviderError::Unavailable(format!(
                "Failed to send request to Visual Crossing: {}",
                err.without_url()
            ))
        })?;

        let status = res.status();
        let body = res.text().await.map_err(|err| {
            ProviderError::Unavailable(format!(
                "Failed to read Visual Crossing response body: {}",
                err.without_url()
            ))
        })?;

        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!(
                "Visual Crossing request failed with status {}: {}",
                status,
                truncate_body(&body),
            )));
        }

        WeatherRecord::from_json(&body).map_err(|err| {
            ProviderError::Decode(format!("Failed to parse Visual Crossing JSON: {err}"))
        })
    }
}
