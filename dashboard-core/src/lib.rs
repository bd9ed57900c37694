//! Core library for the weather dashboard.
//!
//! This crate defines:
//! - Location resolution against a geocoding service
//! - Forecast retrieval and normalization into display views
//! - Unit conversion, the weather code catalog and timezone helpers
//! - Configuration and per-session state
//!
//! It is used by `dashboard-cli`, which wraps it in a command line and a JSON server.

pub mod config;
pub mod forecast;
pub mod geocode;
pub mod http;
pub mod model;
pub mod session;
pub mod states;
pub mod timezone;
pub mod units;
pub mod weather_codes;

pub use config::Config;
pub use forecast::{
    DEFAULT_HOUR_COUNT, ForecastError, ForecastNormalizer, OpenMeteoClient, WeatherSource,
};
pub use geocode::{Geocoder, LocationResolver, NominatimGeocoder};
pub use model::{
    CurrentView, DailyView, Daypart, HourlyView, LocationInput, LocationQuery, ResolvedLocation,
};
pub use session::SessionContext;
pub use units::{PrecipitationUnit, TemperatureUnit, UnitError, UnitPreference, WindUnit};
pub use weather_codes::UnknownWeatherCode;
