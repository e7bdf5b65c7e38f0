use serde::{Deserialize, Serialize};

/// Current conditions as reported by the upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(rename = "temp")]
    pub temperature: f64,
    pub humidity: f64,
    #[serde(rename = "wspd")]
    pub wind_speed: f64,
    #[serde(rename = "conditions")]
    pub description: String,
}

/// Resolved weather for a location. This is both the cache payload and the
/// HTTP response body, so the field names follow the upstream JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub address: String,
    #[serde(rename = "currentConditions")]
    pub current_conditions: CurrentConditions,
}

impl WeatherRecord {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
