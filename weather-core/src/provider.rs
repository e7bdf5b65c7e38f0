use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

use crate::{ApiConfig, WeatherRecord};

pub mod visualcrossing;

pub use visualcrossing::VisualCrossingProvider;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider could not be reached or answered with a non-success status.
    #[error("{0}")]
    Unavailable(String),

    /// The provider answered, but not with a weather record.
    #[error("{0}")]
    Decode(String),
}

/// Upstream source of current weather.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Fetch current conditions for `location`, passed to the provider as is.
    async fn current_conditions(
        &self,
        location: &str,
        config: &ApiConfig,
    ) -> Result<WeatherRecord, ProviderError>;
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        return body.to_string();
    }

    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
