use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{PrecipitationUnit, TemperatureUnit, WindUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Daypart {
    Day,
    Night,
}

impl Daypart {
    /// Maps the weather service's `is_day` flag; only `1` means day.
    pub fn from_is_day(flag: i64) -> Self {
        if flag == 1 { Daypart::Day } else { Daypart::Night }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Daypart::Day => "day",
            Daypart::Night => "night",
        }
    }
}

impl fmt::Display for Daypart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchKind {
    Postal,
    CityState,
}

/// Raw location form as submitted by a browser or API client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl LocationInput {
    pub fn to_query(&self) -> Option<LocationQuery> {
        LocationQuery::from_parts(
            self.postal_code.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
        )
    }
}

/// A location search: either a postal code or a city and state pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationQuery {
    PostalCode(String),
    CityState { city: String, state: String },
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl LocationQuery {
    /// Builds a query from optional form fields. A non-empty postal code wins;
    /// otherwise both city and state are required.
    pub fn from_parts(
        postal_code: Option<&str>,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Option<Self> {
        if let Some(postal) = non_empty(postal_code) {
            return Some(LocationQuery::PostalCode(postal.to_string()));
        }

        match (non_empty(city), non_empty(state)) {
            (Some(city), Some(state)) => Some(LocationQuery::CityState {
                city: city.to_string(),
                state: state.to_string(),
            }),
            _ => None,
        }
    }

    /// Parses free-form input: `27516`, `27516-1234` or `Chapel Hill, NC`.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() {
            return None;
        }

        let is_postal = input.split('-').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_digit())
        });
        if is_postal {
            return Some(LocationQuery::PostalCode(input.to_string()));
        }

        let (city, state) = input.rsplit_once(',')?;
        Self::from_parts(None, Some(city), Some(state))
    }

    pub fn kind(&self) -> SearchKind {
        match self {
            LocationQuery::PostalCode(_) => SearchKind::Postal,
            LocationQuery::CityState { .. } => SearchKind::CityState,
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            LocationQuery::PostalCode(code) => code.trim().is_empty(),
            LocationQuery::CityState { city, state } => {
                city.trim().is_empty() || state.trim().is_empty()
            }
        }
    }
}

impl fmt::Display for LocationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationQuery::PostalCode(code) => f.write_str(code),
            LocationQuery::CityState { city, state } => write!(f, "{city}, {state}"),
        }
    }
}

/// A geocoded U.S. location. Replaced wholesale on every search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    pub postal_code: String,
    pub city: String,
    pub state: String,
    pub city_state: String,
}

impl ResolvedLocation {
    pub fn new(
        latitude: f64,
        longitude: f64,
        postal_code: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        let city = city.into();
        let state = state.into();
        let city_state = format!("{city}, {state}");

        Self {
            latitude,
            longitude,
            postal_code: postal_code.into(),
            city,
            state,
            city_state,
        }
    }
}

/// Current conditions, flattened with the location for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentView {
    #[serde(flatten)]
    pub location: ResolvedLocation,
    /// `HH:MM` in the location's timezone.
    pub updated_time: String,
    pub unit: TemperatureUnit,
    pub wind_unit: WindUnit,
    pub precip_unit: PrecipitationUnit,
    pub temperature: i64,
    pub apparent_temperature: i64,
    pub wind_speed: f64,
    pub precipitation: f64,
    pub uv_index_max: f64,
    pub temperature_max: i64,
    pub temperature_min: i64,
    pub precipitation_probability_max: i64,
    pub weather_code: i64,
    pub daypart: Daypart,
    pub timezone: String,
    pub icon: String,
    pub description: String,
}

/// Upcoming hours; every vector has the same length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlyView {
    pub unit: TemperatureUnit,
    pub hours: Vec<String>,
    pub temperature: Vec<String>,
    pub weather_code: Vec<String>,
    pub precipitation_probability: Vec<String>,
    pub icon: Vec<String>,
    pub description: Vec<String>,
}

impl HourlyView {
    pub fn len(&self) -> usize {
        self.hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }
}

/// Seven-day outlook; every vector has the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyView {
    #[serde(flatten)]
    pub location: ResolvedLocation,
    pub unit: TemperatureUnit,
    pub date: Vec<String>,
    pub temperature_max: Vec<String>,
    pub temperature_min: Vec<String>,
    pub weather_code: Vec<String>,
    pub precipitation_probability_max: Vec<String>,
    pub icon: Vec<String>,
    pub description: Vec<String>,
}

impl DailyView {
    pub fn len(&self) -> usize {
        self.date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }
}
