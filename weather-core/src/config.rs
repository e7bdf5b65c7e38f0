use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::sync::OnceCell;

/// Default location of the credentials file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".apiConfig";

/// Credentials for the upstream weather provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(rename = "OpenWeatherApiKey")]
    pub open_weather_api_key: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of [`ApiConfig`] for the resolver.
#[async_trait]
pub trait ConfigProvider: Send + Sync + Debug {
    async fn load(&self) -> Result<ApiConfig, ConfigError>;
}

/// Reads and parses the JSON credentials file on every call.
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_PATH)
    }
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn load(&self) -> Result<ApiConfig, ConfigError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| ConfigError::Read {
            path: self.path.clone(),
            source,
        })?;

        serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

/// Memoizes the first successful load of the wrapped provider.
///
/// Failures are not remembered: the next call tries the inner provider again.
#[derive(Debug)]
pub struct CachedConfigProvider<P> {
    inner: P,
    loaded: OnceCell<ApiConfig>,
}

impl<P: ConfigProvider> CachedConfigProvider<P> {
    pub fn new(inner: P) -> Self {
        Self { inner, loaded: OnceCell::new() }
    }
}

#[async_trait]
impl<P: ConfigProvider> ConfigProvider for CachedConfigProvider<P> {
    async fn load(&self) -> Result<ApiConfig, ConfigError> {
        self.loaded.get_or_try_init(|| self.inner.load()).await.cloned()
    }
}

/// Always returns the same config.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider(pub ApiConfig);

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn load(&self) -> Result<ApiConfig, ConfigError> {
        Ok(self.0.clone())
    }
}
