//! Static catalog of the weather service's condition codes.
//!
//! Each code has a day and a night rendering; descriptions and icons follow
//! the OpenWeatherMap icon set. Codes outside the catalog are a caller bug and
//! are reported as [`UnknownWeatherCode`] instead of falling back to a default.

use crate::model::Daypart;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherCodeEntry {
    pub description: &'static str,
    pub icon_url: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown weather code: {0}")]
pub struct UnknownWeatherCode(pub i64);

struct CodeRow {
    code: i64,
    day: WeatherCodeEntry,
    night: WeatherCodeEntry,
}

macro_rules! icon {
    ($id:literal, $suffix:literal) => {
        concat!("http://openweathermap.org/img/wn/", $id, $suffix, "@2x.png")
    };
}

macro_rules! row {
    ($code:literal, $icon:literal, $day:literal, $night:literal) => {
        CodeRow {
            code: $code,
            day: WeatherCodeEntry {
                description: $day,
                icon_url: icon!($icon, "d"),
            },
            night: WeatherCodeEntry {
                description: $night,
                icon_url: icon!($icon, "n"),
            },
        }
    };
    ($code:literal, $icon:literal, $both:literal) => {
        row!($code, $icon, $both, $both)
    };
}

const CATALOG: &[CodeRow] = &[
    row!(0, "01", "Sunny", "Clear"),
    row!(1, "01", "Mainly Sunny", "Mainly Clear"),
    row!(2, "02", "Partly Cloudy"),
    row!(3, "03", "Cloudy"),
    row!(45, "50", "Foggy"),
    row!(48, "50", "Rime Fog"),
    row!(51, "09", "Light Drizzle"),
    row!(53, "09", "Drizzle"),
    row!(55, "09", "Heavy Drizzle"),
    row!(56, "09", "Light Freezing Drizzle"),
    row!(57, "09", "Freezing Drizzle"),
    row!(61, "10", "Light Rain"),
    row!(63, "10", "Rain"),
    row!(65, "10", "Heavy Rain"),
    row!(66, "10", "Light Freezing Rain"),
    row!(67, "10", "Freezing Rain"),
    row!(71, "13", "Light Snow"),
    row!(73, "13", "Snow"),
    row!(75, "13", "Heavy Snow"),
    row!(77, "13", "Snow Grains"),
    row!(80, "09", "Light Showers"),
    row!(81, "09", "Showers"),
    row!(82, "09", "Heavy Showers"),
    row!(85, "13", "Light Snow Showers"),
    row!(86, "13", "Snow Showers"),
    row!(95, "11", "Thunderstorm"),
    row!(96, "11", "Light Thunderstorms With Hail"),
    row!(99, "11", "Thunderstorm With Hail"),
];

pub fn describe(
    code: i64,
    daypart: Daypart,
) -> Result<&'static WeatherCodeEntry, UnknownWeatherCode> {
    let row = CATALOG
        .iter()
        .find(|row| row.code == code)
        .ok_or(UnknownWeatherCode(code))?;

    Ok(match daypart {
        Daypart::Day => &row.day,
        Daypart::Night => &row.night,
    })
}

pub fn known_codes() -> impl Iterator<Item = i64> {
    CATALOG.iter().map(|row| row.code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_sky_differs_by_daypart() {
        let day = describe(0, Daypart::Day).unwrap();
        let night = describe(0, Daypart::Night).unwrap();

        assert_eq!(day.description, "Sunny");
        assert_eq!(day.icon_url, "http://openweathermap.org/img/wn/01d@2x.png");
        assert_eq!(night.description, "Clear");
        assert_eq!(night.icon_url, "http://openweathermap.org/img/wn/01n@2x.png");
    }

    #[test]
    fn thunderstorm_with_hail_uses_storm_icon() {
        let entry = describe(99, Daypart::Night).unwrap();
        assert_eq!(entry.description, "Thunderstorm With Hail");
        assert!(entry.icon_url.ends_with("/11n@2x.png"));
    }

    #[test]
    fn every_code_has_both_dayparts() {
        let codes: Vec<i64> = known_codes().collect();
        assert_eq!(codes.len(), 28);

        for code in codes {
            assert!(describe(code, Daypart::Day).unwrap().icon_url.contains("d@2x"));
            assert!(describe(code, Daypart::Night).unwrap().icon_url.contains("n@2x"));
        }
    }

    #[test]
    fn unknown_code_is_an_error() {
        let err = describe(4, Daypart::Day).unwrap_err();
        assert_eq!(err, UnknownWeatherCode(4));
        assert!(err.to_string().contains("Unknown weather code: 4"));
    }
}
