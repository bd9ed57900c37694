//! Local time in a location's timezone and day/night classification.

use chrono::{DateTime, Local, NaiveDateTime, Offset, TimeZone};
use chrono_tz::Tz;
use serde::Serialize;

use crate::model::Daypart;

/// The same instant seen from this machine and from a destination zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeInZone {
    /// IANA name of this machine's zone, e.g. `Europe/Berlin`. Falls back to
    /// the UTC offset when the name is unavailable.
    pub local_timezone: String,
    /// UTC offset on the local side, e.g. `+02:00`.
    pub local_offset: String,
    pub local_time: NaiveDateTime,
    pub dest_timezone: String,
    pub dest_time: NaiveDateTime,
    /// Destination offset minus local offset.
    pub time_difference_hours: f64,
}

/// IANA name of this machine's timezone, or its current UTC offset if the
/// platform does not report one.
pub fn local_zone_name() -> String {
    match iana_time_zone::get_timezone() {
        Ok(name) => name,
        Err(e) => {
            let offset = Local::now().offset().to_string();
            tracing::warn!(%offset, "Could not determine local timezone name: {e}");
            offset
        }
    }
}

/// Current wall-clock time in the IANA zone `name`, or `None` if the zone is
/// not recognized.
pub fn local_now_in(name: &str) -> Option<TimeInZone> {
    let mut info = time_in_zone(name, Local::now())?;
    info.local_timezone = local_zone_name();
    Some(info)
}

/// `instant` seen from its own offset and from `name`. Only the offset is
/// known for an arbitrary instant, so `local_timezone` carries it too.

pub fn time_in_zone<T: TimeZone>(name: &str, instant: DateTime<T>) -> Option<TimeInZone> {
    let dest: Tz = match name.parse() {
        Ok(tz) => tz,
        Err(e) => {
            tracing::error!(timezone = %name, "Error converting timezone: {e}");
            return None;
        }
    };

    let local_offset = instant.offset().fix();
    let dest_time = instant.with_timezone(&dest);
    let dest_offset = dest_time.offset().fix();

    let difference_secs = dest_offset.local_minus_utc() - local_offset.local_minus_utc();

    Some(TimeInZone {
        local_timezone: local_offset.to_string(),
        local_offset: local_offset.to_string(),
        local_time: instant.naive_local(),
        dest_timezone: name.to_string(),
        dest_time: dest_time.naive_local(),
        time_difference_hours: f64::from(difference_secs) / 3600.0,
    })
}

/// Day if `timestamp` falls strictly inside either day's sunrise..sunset
/// window, night otherwise (bounds themselves are night).
pub fn classify_day_or_night(
    timestamp: NaiveDateTime,
    sunrise: &[NaiveDateTime; 2],
    sunset: &[NaiveDateTime; 2],
) -> Daypart {
    let within = |rise: NaiveDateTime, set: NaiveDateTime| rise < timestamp && timestamp < set;

    if within(sunrise[0], sunset[0]) || within(sunrise[1], sunset[1]) {
        Daypart::Day
    } else {
        Daypart::Night
    }
}
