//! Core library for the weather lookup service.
//!
//! This crate defines:
//! - The read-through [`Resolver`] that puts a TTL cache in front of the upstream provider
//! - The cache store contract, with Redis and in-process implementations
//! - Upstream provider abstraction and the Visual Crossing client
//! - Provider credentials loading
//! - Shared domain models
//!
//! It is used by `weather-server`, but can also be embedded by other binaries.

pub mod cache;
pub mod config;
pub mod model;
pub mod provider;
pub mod resolver;

pub use cache::{CacheError, CacheStore, DEFAULT_TTL};
pub use config::{
    ApiConfig, CachedConfigProvider, ConfigError, ConfigProvider, FileConfigProvider,
    StaticConfigProvider,
};
pub use model::{CurrentConditions, WeatherRecord};
pub use provider::{ProviderError, VisualCrossingProvider, WeatherProvider};
pub use resolver::{ResolveError, Resolver, StatsSnapshot};
