//! Forecast retrieval and normalization.
//!
//! The weather service (Open-Meteo) is always asked for Fahrenheit; the
//! normalizer converts to the session's unit, truncates for display, and
//! attaches condition icons and descriptions.

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    config::Config,
    http::{RetryPolicy, build_client, is_transient_error, is_transient_status, truncate_body},
    model::{CurrentView, DailyView, Daypart, HourlyView, ResolvedLocation},
    timezone::{self, classify_day_or_night},
    units::{UnitPreference, display_temperature, round_tenths, truncate},
    weather_codes::{self, UnknownWeatherCode},
};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com";

/// Hours shown on the dashboard summary.
pub const DEFAULT_HOUR_COUNT: usize = 6;
pub const DAILY_FORECAST_DAYS: u8 = 7;

const HOURLY_FORECAST_DAYS: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("Weather service request failed: {0:#}")]
    Upstream(anyhow::Error),

    #[error("Weather response is missing {0}")]
    MissingField(&'static str),

    #[error("Weather response has {0} series of different lengths")]
    MisalignedSeries(&'static str),

    #[error("Unrecognized timezone in weather response: {0}")]
    UnknownTimezone(String),

    #[error(transparent)]
    UnknownWeatherCode(#[from] UnknownWeatherCode),

    #[error("Unparseable timestamp in weather response: {0}")]
    BadTimestamp(String),
}

/// A single call to the weather service.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub current: &'static [&'static str],
    pub hourly: &'static [&'static str],
    pub daily: &'static [&'static str],
    pub forecast_days: Option<u8>,
    pub units: UnitPreference,
}

impl ForecastRequest {
    pub fn current(location: &ResolvedLocation, units: &UnitPreference) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            current: &[
                "temperature_2m",
                "is_day",
                "wind_speed_10m",
                "weather_code",
                "apparent_temperature",
                "precipitation",
            ],
            hourly: &[],
            daily: &[
                "temperature_2m_max",
                "temperature_2m_min",
                "uv_index_max",
                "precipitation_probability_max",
            ],
            forecast_days: None,
            units: *units,
        }
    }

    pub fn hourly(location: &ResolvedLocation, units: &UnitPreference) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            current: &[],
            hourly: &["temperature_2m", "weather_code", "precipitation_probability"],
            daily: &["sunrise", "sunset"],
            forecast_days: Some(HOURLY_FORECAST_DAYS),
            units: *units,
        }
    }

    pub fn daily(location: &ResolvedLocation, units: &UnitPreference) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            current: &[],
            hourly: &[],
            daily: &[
                "temperature_2m_max",
                "temperature_2m_min",
                "precipitation_probability_max",
                "weather_code",
            ],
            forecast_days: Some(DAILY_FORECAST_DAYS),
            units: *units,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
        ];

        for (key, fields) in [
            ("current", self.current),
            ("hourly", self.hourly),
            ("daily", self.daily),
        ] {
            if !fields.is_empty() {
                pairs.push((key, fields.join(",")));
            }
        }

        if let Some(days) = self.forecast_days {
            pairs.push(("forecast_days", days.to_string()));
        }

        pairs.extend([
            ("timezone", "auto".to_string()),
            ("temperature_unit", "fahrenheit".to_string()),
            ("wind_speed_unit", self.units.wind.query_value().to_string()),
            ("precipitation_unit", self.units.precipitation.query_value().to_string()),
        ]);

        pairs
    }
}

/// Raw weather service response. Series are index-aligned with `time`.
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastPayload {
    pub timezone: String,
    #[serde(default)]
    pub utc_offset_seconds: i32,
    pub current: Option<CurrentBlock>,
    pub hourly: Option<HourlyBlock>,
    pub daily: Option<DailyBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentBlock {
    pub temperature_2m: f64,
    pub is_day: f64,
    pub wind_speed_10m: f64,
    pub weather_code: f64,
    pub apparent_temperature: f64,
    pub precipitation: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyBlock {
    pub time: Vec<String>,
    pub temperature_2m: Vec<f64>,
    pub weather_code: Vec<f64>,
    pub precipitation_probability: Vec<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DailyBlock {
    pub time: Vec<String>,
    pub temperature_2m_max: Vec<f64>,
    pub temperature_2m_min: Vec<f64>,
    pub uv_index_max: Vec<f64>,
    pub precipitation_probability_max: Vec<f64>,
    pub weather_code: Vec<f64>,
    pub sunrise: Vec<String>,
    pub sunset: Vec<String>,
}

#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ForecastPayload>;
}

#[derive(Debug, Clone)]
struct CachedPayload {
    fetched_at: Instant,
    payload: ForecastPayload,
}

impl CachedPayload {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Successful responses keyed by their query string.
#[derive(Debug, Default)]
struct ResponseCache {
    entries: Mutex<HashMap<String, CachedPayload>>,
}

impl ResponseCache {
    async fn get(&self, key: &str, ttl: Duration) -> Option<ForecastPayload> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|cached| cached.is_fresh(ttl))
            .map(|cached| cached.payload.clone())
    }

    async fn insert(&self, key: String, payload: ForecastPayload, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, cached| cached.is_fresh(ttl));
        entries.insert(
            key,
            CachedPayload {
                fetched_at: Instant::now(),
                payload,
            },
        );
    }
}

fn cache_key(query: &[(&'static str, String)]) -> String {
    query
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    base_url: String,
    http: Client,
    retry: RetryPolicy,
    /// Zero disables the cache.
    cache_ttl: Duration,
    cache: Arc<ResponseCache>,
}

impl OpenMeteoClient {
    pub fn new(
        base_url: impl Into<String>,
        user_agent: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: build_client(user_agent, timeout)?,
            retry,
            cache_ttl: Duration::ZERO,
            cache: Arc::default(),
        })
    }

    /// Reuses successful responses to identical requests for `ttl`.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Self::new(
            config.weather.base_url.as_str(),
            &config.user_agent,
            config.http_timeout(),
            config.weather.retry_policy(),
        )?;
        Ok(client.with_cache_ttl(config.weather.cache_ttl()))
    }

    async fn fetch_with_retry(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<ForecastPayload> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, query).await {
                Attempt::Done(payload) => return Ok(payload),
                Attempt::Fail(err) => return Err(err),
                Attempt::Retry(err) if attempt >= self.retry.max_retries => {
                    return Err(err.context(format!("Gave up after {} retries", attempt)));
                }
                Attempt::Retry(err) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(attempt, ?delay, "Retrying Open-Meteo request: {err:#}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str, query: &[(&'static str, String)]) -> Attempt {
        let res = match self.http.get(url).query(query).send().await {
            Ok(res) => res,
            Err(e) => {
                let transient = is_transient_error(&e);
                let err = anyhow::Error::new(e).context("Failed to send request to Open-Meteo");
                return if transient { Attempt::Retry(err) } else { Attempt::Fail(err) };
            }
        };

        let status = res.status();
        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                return Attempt::Fail(
                    anyhow::Error::new(e).context("Failed to read Open-Meteo response body"),
                );
            }
        };

        if !status.is_success() {
            let err = anyhow!(
                "Open-Meteo request failed with status {}: {}",
                status,
                truncate_body(&body),
            );
            return if is_transient_status(status) {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            };
        }

        match serde_json::from_str(&body).context("Failed to parse Open-Meteo JSON") {
            Ok(payload) => Attempt::Done(payload),
            Err(e) => Attempt::Fail(e),
        }
    }
}

enum Attempt {
    Done(ForecastPayload),
    Retry(anyhow::Error),
    Fail(anyhow::Error),
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn fetch(&self, request: &ForecastRequest) -> Result<ForecastPayload> {
        let url = format!("{}/v1/forecast", self.base_url);
        let query = request.query_pairs();

        if self.cache_ttl.is_zero() {
            tracing::debug!(?query, "Calling Open-Meteo forecast");
            return self.fetch_with_retry(&url, &query).await;
        }

        let key = cache_key(&query);
        if let Some(payload) = self.cache.get(&key, self.cache_ttl).await {
            tracing::debug!(%key, "Using cached Open-Meteo response");
            return Ok(payload);
        }

        tracing::debug!(?query, "Calling Open-Meteo forecast");
        let payload = self.fetch_with_retry(&url, &query).await?;
        self.cache.insert(key, payload.clone(), self.cache_ttl).await;
        Ok(payload)
    }
}

/// Turns weather service payloads into display-ready views.
#[derive(Debug, Clone)]
pub struct ForecastNormalizer {
    source: Arc<dyn WeatherSource>,
}

impl ForecastNormalizer {
    pub fn new(source: Arc<dyn WeatherSource>) -> Self {
        Self { source }
    }

    async fn fetch(&self, request: ForecastRequest) -> Result<ForecastPayload, ForecastError> {
        self.source
            .fetch(&request)
            .await
            .map_err(ForecastError::Upstream)
    }

    pub async fn current(
        &self,
        location: &ResolvedLocation,
        units: &UnitPreference,
    ) -> Result<CurrentView, ForecastError> {
        let payload = self.fetch(ForecastRequest::current(location, units)).await?;
        let now = local_now(&payload.timezone)?;
        shape_current(location, units, payload, now)
    }

    /// The next `hour_count` hours after the location's current time.
    pub async fn hourly(
        &self,
        location: &ResolvedLocation,
        units: &UnitPreference,
        hour_count: usize,
    ) -> Result<HourlyView, ForecastError> {
        let payload = self.fetch(ForecastRequest::hourly(location, units)).await?;
        let now = local_now(&payload.timezone)?;
        shape_hourly(units, payload, hour_count, now)
    }

    pub async fn daily(
        &self,
        location: &ResolvedLocation,
        units: &UnitPreference,
    ) -> Result<DailyView, ForecastError> {
        let payload = self.fetch(ForecastRequest::daily(location, units)).await?;
        shape_daily(location, units, payload)
    }
}

fn local_now(timezone_name: &str) -> Result<NaiveDateTime, ForecastError> {
    timezone::local_now_in(timezone_name)
        .map(|t| t.dest_time)
        .ok_or_else(|| ForecastError::UnknownTimezone(timezone_name.to_string()))
}

fn first(series: &[f64], name: &'static str) -> Result<f64, ForecastError> {
    series.first().copied().ok_or(ForecastError::MissingField(name))
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, ForecastError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| raw.parse::<NaiveDateTime>())
        .map_err(|_| ForecastError::BadTimestamp(raw.to_string()))
}

fn two_days(raw: &[String], name: &'static str) -> Result<[NaiveDateTime; 2], ForecastError> {
    match raw {
        [first, second, ..] => Ok([parse_timestamp(first)?, parse_timestamp(second)?]),
        _ => Err(ForecastError::MissingField(name)),
    }
}

fn whole(value: f64) -> String {
    truncate(value).to_string()
}

/// Index of the first timestamp strictly after `now`, or 0 if there is none.
fn window_start(times: &[NaiveDateTime], now: NaiveDateTime) -> usize {
    times.iter().position(|t| *t > now).unwrap_or(0)
}

fn shape_current(
    location: &ResolvedLocation,
    units: &UnitPreference,
    payload: ForecastPayload,
    local_now: NaiveDateTime,
) -> Result<CurrentView, ForecastError> {
    let current = payload.current.ok_or(ForecastError::MissingField("current"))?;
    let daily = payload.daily.ok_or(ForecastError::MissingField("daily"))?;

    let weather_code = truncate(current.weather_code);
    let daypart = Daypart::from_is_day(truncate(current.is_day));
    let entry = weather_codes::describe(weather_code, daypart)?;
    let unit = units.temperature;

    Ok(CurrentView {
        location: location.clone(),
        updated_time: local_now.format("%H:%M").to_string(),
        unit,
        wind_unit: units.wind,
        precip_unit: units.precipitation,
        temperature: display_temperature(current.temperature_2m, unit),
        apparent_temperature: display_temperature(current.apparent_temperature, unit),
        wind_speed: round_tenths(current.wind_speed_10m),
        precipitation: round_tenths(current.precipitation),
        uv_index_max: round_tenths(first(&daily.uv_index_max, "daily.uv_index_max")?),
        temperature_max: display_temperature(
            first(&daily.temperature_2m_max, "daily.temperature_2m_max")?,
            unit,
        ),
        temperature_min: display_temperature(
            first(&daily.temperature_2m_min, "daily.temperature_2m_min")?,
            unit,
        ),
        precipitation_probability_max: truncate(first(
            &daily.precipitation_probability_max,
            "daily.precipitation_probability_max",
        )?),
        weather_code,
        daypart,
        timezone: payload.timezone,
        icon: entry.icon_url.to_string(),
        description: entry.description.to_string(),
    })
}

fn shape_hourly(
    units: &UnitPreference,
    payload: ForecastPayload,
    hour_count: usize,
    local_now: NaiveDateTime,
) -> Result<HourlyView, ForecastError> {
    let hourly = payload.hourly.ok_or(ForecastError::MissingField("hourly"))?;
    let daily = payload.daily.ok_or(ForecastError::MissingField("daily"))?;

    let len = hourly.time.len();
    if hourly.temperature_2m.len() != len
        || hourly.weather_code.len() != len
        || hourly.precipitation_probability.len() != len
    {
        return Err(ForecastError::MisalignedSeries("hourly"));
    }

    let times = hourly
        .time
        .iter()
        .map(|raw| parse_timestamp(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let sunrise = two_days(&daily.sunrise, "daily.sunrise")?;
    let sunset = two_days(&daily.sunset, "daily.sunset")?;

    // Short upstream data yields fewer hours rather than an error.
    let start = window_start(&times, local_now);
    let end = start.saturating_add(hour_count).min(len);

    let mut view = HourlyView {
        unit: units.temperature,
        ..HourlyView::default()
    };

    for i in start..end {
        let code = truncate(hourly.weather_code[i]);
        let daypart = classify_day_or_night(times[i], &sunrise, &sunset);
        let entry = weather_codes::describe(code, daypart)?;

        view.hours.push(times[i].format("%H:%M").to_string());
        view.temperature
            .push(display_temperature(hourly.temperature_2m[i], units.temperature).to_string());
        view.weather_code.push(code.to_string());
        view.precipitation_probability
            .push(whole(hourly.precipitation_probability[i]));
        view.icon.push(entry.icon_url.to_string());
        view.description.push(entry.description.to_string());
    }

    Ok(view)
}

fn shape_daily(
    location: &ResolvedLocation,
    units: &UnitPreference,
    payload: ForecastPayload,
) -> Result<DailyView, ForecastError> {
    let daily = payload.daily.ok_or(ForecastError::MissingField("daily"))?;

    let len = daily.time.len();
    if daily.temperature_2m_max.len() != len
        || daily.temperature_2m_min.len() != len
        || daily.precipitation_probability_max.len() != len
        || daily.weather_code.len() != len
    {
        return Err(ForecastError::MisalignedSeries("daily"));
    }

    let unit = units.temperature;
    let mut icon = Vec::with_capacity(len);
    let mut description = Vec::with_capacity(len);
    let mut weather_code = Vec::with_capacity(len);

    // Multi-day summaries always use the daytime rendering.
    for code in daily.weather_code.iter().copied().map(truncate) {
        let entry = weather_codes::describe(code, Daypart::Day)?;
        icon.push(entry.icon_url.to_string());
        description.push(entry.description.to_string());
        weather_code.push(code.to_string());
    }

    let temps = |series: &[f64]| -> Vec<String> {
        series
            .iter()
            .map(|f| display_temperature(*f, unit).to_string())
            .collect()
    };

    Ok(DailyView {
        location: location.clone(),
        unit,
        date: daily.time,
        temperature_max: temps(&daily.temperature_2m_max),
        temperature_min: temps(&daily.temperature_2m_min),
        weather_code,
        precipitation_probability_max: daily
            .precipitation_probability_max
            .iter()
            .copied()
            .map(whole)
            .collect(),
        icon,
        description,
    })
}
