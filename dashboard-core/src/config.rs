use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, net::SocketAddr, path::{Path, PathBuf}, time::Duration};

use crate::{
    forecast::OPEN_METEO_URL,
    geocode::NOMINATIM_URL,
    http::RetryPolicy,
    model::ResolvedLocation,
    units::{PrecipitationUnit, TemperatureUnit, UnitPreference, WindUnit},
};

/// Overrides the config file location when set.
pub const CONFIG_PATH_ENV: &str = "WEATHER_DASH_CONFIG";

/// Geocoding service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    pub base_url: String,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: NOMINATIM_URL.to_string(),
        }
    }
}

/// Weather service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// How long identical forecast requests are answered from memory; 0 disables.
    pub cache_ttl_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: OPEN_METEO_URL.to_string(),
            max_retries: 5,
            retry_backoff_ms: 200,
            cache_ttl_secs: 3600,
        }
    }
}

impl WeatherConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_backoff_ms),
            ..RetryPolicy::default()
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Location shown before the first search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub postal_code: String,
    pub city: String,
    pub state: String,
}

impl Default for DefaultLocation {
    fn default() -> Self {
        Self {
            latitude: 35.7915,
            longitude: -78.7811,
            postal_code: "27511".to_string(),
            city: "Cary".to_string(),
            state: "NC".to_string(),
        }
    }
}

impl From<&ResolvedLocation> for DefaultLocation {
    fn from(loc: &ResolvedLocation) -> Self {
        Self {
            latitude: loc.latitude,
            longitude: loc.longitude,
            postal_code: loc.postal_code.clone(),
            city: loc.city.clone(),
            state: loc.state.clone(),
        }
    }
}

/// Values a new session starts with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub temperature: TemperatureUnit,
    pub wind: WindUnit,
    pub precipitation: PrecipitationUnit,
    pub location: DefaultLocation,
}

impl DefaultsConfig {
    pub fn units(&self) -> UnitPreference {
        UnitPreference {
            temperature: self.temperature,
            wind: self.wind,
            precipitation: self.precipitation,
        }
    }

    pub fn location(&self) -> ResolvedLocation {
        let loc = &self.location;
        ResolvedLocation::new(
            loc.latitude,
            loc.longitude,
            loc.postal_code.as_str(),
            loc.city.as_str(),
            loc.state.as_str(),
        )
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// bind = "127.0.0.1:5000"
/// http_timeout_secs = 5
///
/// [weather]
/// max_retries = 3
///
/// [defaults]
/// temperature = "C"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the JSON server listens on.
    pub bind: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
    pub geocoder: GeocoderConfig,
    pub weather: WeatherConfig,
    pub defaults: DefaultsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
            http_timeout_secs: 5,
            user_agent: concat!("weather-dashboard-app/", env!("CARGO_PKG_VERSION")).to_string(),
            geocoder: GeocoderConfig::default(),
            weather: WeatherConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        cfg.validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        let dirs = ProjectDirs::from("dev", "weather-dash", "weather-dash")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        if self.http_timeout_secs == 0 {
            bail!("http_timeout_secs must be greater than zero");
        }

        for (name, url) in [
            ("geocoder.base_url", &self.geocoder.base_url),
            ("weather.base_url", &self.weather.base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("{name} must be an http(s) URL, got '{url}'");
            }
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("Invalid bind address '{}'", self.bind))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_first_visit() {
        let cfg = Config::default();
        let units = cfg.defaults.units();

        assert_eq!(units.temperature, TemperatureUnit::Fahrenheit);
        assert_eq!(units.wind, WindUnit::MilesPerHour);
        assert_eq!(units.precipitation, PrecipitationUnit::Inches);

        let loc = cfg.defaults.location();
        assert_eq!(loc.city_state, "Cary, NC");
        assert_eq!(loc.postal_code, "27511");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
bind = "0.0.0.0:8080"

[weather]
max_retries = 2

[defaults]
temperature = "C"
wind = "km/h"
"#,
        )
        .unwrap();

        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:8080");
        assert_eq!(cfg.weather.max_retries, 2);
        assert_eq!(cfg.weather.base_url, OPEN_METEO_URL);
        assert_eq!(cfg.defaults.temperature, TemperatureUnit::Celsius);
        assert_eq!(cfg.defaults.wind, WindUnit::KilometresPerHour);
        assert_eq!(cfg.defaults.precipitation, PrecipitationUnit::Inches);
        assert_eq!(cfg.http_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.defaults.temperature = TemperatureUnit::Celsius;
        cfg.defaults.location = DefaultLocation::from(&ResolvedLocation::new(
            35.9132, -79.0558, "27516", "Chapel Hill", "NC",
        ));
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut cfg = Config::default();
        cfg.bind = "not an address".into();
        assert!(cfg.validate().unwrap_err().to_string().contains("Invalid bind address"));

        let mut cfg = Config::default();
        cfg.http_timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.weather.base_url = "ftp://example.com".into();
        assert!(cfg.validate().unwrap_err().to_string().contains("weather.base_url"));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "bind = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn retry_policy_from_weather_config() {
        let cfg = WeatherConfig {
            max_retries: 3,
            retry_backoff_ms: 50,
            ..WeatherConfig::default()
        };
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
    }

    #[test]
    fn forecast_cache_defaults_to_an_hour() {
        assert_eq!(WeatherConfig::default().cache_ttl(), Duration::from_secs(3600));

        let cfg: WeatherConfig = toml::from_str("cache_ttl_secs = 0").unwrap();
        assert!(cfg.cache_ttl().is_zero());
        assert_eq!(cfg.max_retries, 5);
    }
}
