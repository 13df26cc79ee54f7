use crate::{
    Config,
    config::API_KEY_ENV,
    error::AcquisitionError,
    model::{Coordinates, WeatherSnapshot},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// Fetches a full snapshot for a position.
///
/// Implementations do not retry and never hand back partial data: a failed
/// fetch is an error, not an empty snapshot.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, coords: Coordinates) -> Result<WeatherSnapshot, AcquisitionError>;
}

/// Construct the weather provider described by the config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    provider_with_env_key(config, std::env::var(API_KEY_ENV).ok())
}

fn provider_with_env_key(
    config: &Config,
    env_key: Option<String>,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let api_key = config.resolve_api_key(env_key)?;
    let provider = OpenWeatherProvider::new(api_key, &config.base_url, config.units)?;
    Ok(Arc::new(provider))
}
