//! Library half of the `weather-dash` binary.
//!
//! This crate focuses on:
//! - Wiring the core resolver and normalizer from configuration
//! - The JSON server and its per-visitor sessions
//! - Logging initialisation

use std::sync::Arc;

use anyhow::Result;
use dashboard_core::{
    Config, ForecastNormalizer, Geocoder, LocationResolver, NominatimGeocoder, OpenMeteoClient,
    WeatherSource,
};

pub mod server;
pub mod telemetry;

/// The two upstream-backed pipelines every command needs.
#[derive(Debug, Clone)]
pub struct Services {
    pub resolver: LocationResolver,
    pub normalizer: ForecastNormalizer,
}

impl Services {
    pub fn new(geocoder: Arc<dyn Geocoder>, weather: Arc<dyn WeatherSource>) -> Self {
        Self {
            resolver: LocationResolver::new(geocoder),
            normalizer: ForecastNormalizer::new(weather),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let geocoder = NominatimGeocoder::from_config(config)?;
        let weather = OpenMeteoClient::from_config(config)?;
        Ok(Self::new(Arc::new(geocoder), Arc::new(weather)))
    }
}
