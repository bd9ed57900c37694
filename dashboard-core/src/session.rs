use serde::{Deserialize, Serialize};

use crate::{config::DefaultsConfig, model::ResolvedLocation, units::UnitPreference};

/// Per-visitor state: the last resolved location and unit preference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub location: ResolvedLocation,
    pub units: UnitPreference,
}

impl SessionContext {
    pub fn new(defaults: &DefaultsConfig) -> Self {
        Self {
            location: defaults.location(),
            units: defaults.units(),
        }
    }

    /// A successful search replaces the whole location record.
    pub fn replace_location(&mut self, location: ResolvedLocation) {
        tracing::info!(city_state = %location.city_state, "Session location updated");
        self.location = location;
    }

    pub fn set_units(&mut self, units: UnitPreference) {
        self.units = units;
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(&DefaultsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{TemperatureUnit, WindUnit};

    #[test]
    fn new_session_uses_defaults() {
        let session = SessionContext::default();
        assert_eq!(session.location.city_state, "Cary, NC");
        assert_eq!(session.location.latitude, 35.7915);
        assert_eq!(session.units, UnitPreference::default());
    }

    #[test]
    fn replacing_location_drops_old_fields() {
        let mut session = SessionContext::default();
        session.replace_location(ResolvedLocation::new(
            35.7796, -78.6382, "", "Raleigh", "NC",
        ));

        assert_eq!(session.location.city_state, "Raleigh, NC");
        assert_eq!(session.location.postal_code, "");
    }

    #[test]
    fn units_follow_configured_defaults() {
        let defaults = DefaultsConfig {
            temperature: TemperatureUnit::Celsius,
            wind: WindUnit::MetresPerSecond,
            ..DefaultsConfig::default()
        };
        let mut session = SessionContext::new(&defaults);
        assert_eq!(session.units.temperature, TemperatureUnit::Celsius);

        session.set_units(UnitPreference::default());
        assert_eq!(session.units.wind, WindUnit::MilesPerHour);
    }
}
