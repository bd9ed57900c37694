//! Unit preferences and temperature conversion.
//!
//! The weather service is always queried in Fahrenheit; every value shown to a
//! view passes through [`display_temperature`], which converts when Celsius is
//! requested and truncates toward zero.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnitError {
    #[error("Unsupported temperature unit: {0}")]
    UnsupportedUnit(String),

    #[error("Unsupported wind speed unit: {0}")]
    UnsupportedWindUnit(String),

    #[error("Unsupported precipitation unit: {0}")]
    UnsupportedPrecipitationUnit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "C")]
    Celsius,
    #[default]
    #[serde(rename = "F")]
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }

    pub const fn all() -> &'static [TemperatureUnit] {
        &[TemperatureUnit::Fahrenheit, TemperatureUnit::Celsius]
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemperatureUnit {
    type Err = UnitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "C" | "c" => Ok(TemperatureUnit::Celsius),
            "F" | "f" => Ok(TemperatureUnit::Fahrenheit),
            other => Err(UnitError::UnsupportedUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindUnit {
    #[serde(rename = "km/h")]
    KilometresPerHour,
    #[serde(rename = "m/s")]
    MetresPerSecond,
    #[default]
    #[serde(rename = "mph")]
    MilesPerHour,
}

impl WindUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindUnit::KilometresPerHour => "km/h",
            WindUnit::MetresPerSecond => "m/s",
            WindUnit::MilesPerHour => "mph",
        }
    }

    /// Value of the weather service's `wind_speed_unit` parameter.
    pub fn query_value(&self) -> &'static str {
        match self {
            WindUnit::KilometresPerHour => "kmh",
            WindUnit::MetresPerSecond => "ms",
            WindUnit::MilesPerHour => "mph",
        }
    }

    pub const fn all() -> &'static [WindUnit] {
        &[
            WindUnit::MilesPerHour,
            WindUnit::KilometresPerHour,
            WindUnit::MetresPerSecond,
        ]
    }
}

impl fmt::Display for WindUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindUnit {
    type Err = UnitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "km/h" | "kmh" => Ok(WindUnit::KilometresPerHour),
            "m/s" | "ms" => Ok(WindUnit::MetresPerSecond),
            "mph" => Ok(WindUnit::MilesPerHour),
            other => Err(UnitError::UnsupportedWindUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PrecipitationUnit {
    #[serde(rename = "mm")]
    Millimetres,
    #[default]
    #[serde(rename = "in", alias = "inches")]
    Inches,
}

impl PrecipitationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrecipitationUnit::Millimetres => "mm",
            PrecipitationUnit::Inches => "in",
        }
    }

    /// Value of the weather service's `precipitation_unit` parameter.
    pub fn query_value(&self) -> &'static str {
        match self {
            PrecipitationUnit::Millimetres => "mm",
            PrecipitationUnit::Inches => "inch",
        }
    }

    pub const fn all() -> &'static [PrecipitationUnit] {
        &[PrecipitationUnit::Inches, PrecipitationUnit::Millimetres]
    }
}

impl fmt::Display for PrecipitationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrecipitationUnit {
    type Err = UnitError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "mm" => Ok(PrecipitationUnit::Millimetres),
            "in" | "inch" | "inches" => Ok(PrecipitationUnit::Inches),
            other => Err(UnitError::UnsupportedPrecipitationUnit(other.to_string())),
        }
    }
}

/// Per-session display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnitPreference {
    #[serde(rename = "temp_unit")]
    pub temperature: TemperatureUnit,
    #[serde(rename = "wind_unit")]
    pub wind: WindUnit,
    #[serde(rename = "precip_unit")]
    pub precipitation: PrecipitationUnit,
}

impl UnitPreference {
    pub fn with_temperature(mut self, unit: TemperatureUnit) -> Self {
        self.temperature = unit;
        self
    }
}

/// Truncates toward zero, the way an integer cast does.
pub fn truncate(value: f64) -> i64 {
    value.trunc() as i64
}

pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> i64 {
    truncate((fahrenheit - 32.0) * 5.0 / 9.0)
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    (celsius * 9.0 / 5.0) + 32.0
}

/// Convert a Celsius reading to the unit named by `target` (`"C"` or `"F"`).
pub fn convert_temperature(celsius: f64, target: &str) -> Result<f64, UnitError> {
    match target.parse::<TemperatureUnit>()? {
        TemperatureUnit::Celsius => Ok(celsius),
        TemperatureUnit::Fahrenheit => Ok(celsius_to_fahrenheit(celsius)),
    }
}

/// Whole-number temperature for display from a Fahrenheit reading.
pub fn display_temperature(fahrenheit: f64, unit: TemperatureUnit) -> i64 {
    match unit {
        TemperatureUnit::Fahrenheit => truncate(fahrenheit),
        TemperatureUnit::Celsius => fahrenheit_to_celsius(fahrenheit),
    }
}
