//! Forward geocoding of U.S. postal codes and city/state pairs.
//!
//! Uses Nominatim (OpenStreetMap). Any upstream trouble, an empty answer or a
//! non-U.S. match all collapse into `None`; callers only ever see a complete
//! [`ResolvedLocation`] or nothing.

use std::{fmt::Debug, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    config::Config,
    http::{build_client, truncate_body},
    model::{LocationQuery, ResolvedLocation, SearchKind},
    states,
};

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

const UNITED_STATES: &str = "United States";
const UNKNOWN_CITY: &str = "Unknown";
const UNKNOWN_STATE: &str = "US";

/// Query parameters sent to the geocoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeocodeParams {
    Postal { postalcode: String },
    CityState { city: String, state: String },
}

impl GeocodeParams {
    pub fn for_query(query: &LocationQuery) -> Self {
        match query {
            LocationQuery::PostalCode(code) => GeocodeParams::Postal {
                postalcode: code.trim().to_string(),
            },
            LocationQuery::CityState { city, state } => GeocodeParams::CityState {
                city: city.trim().to_string(),
                state: state.trim().to_string(),
            },
        }
    }

    pub fn kind(&self) -> SearchKind {
        match self {
            GeocodeParams::Postal { .. } => SearchKind::Postal,
            GeocodeParams::CityState { .. } => SearchKind::CityState,
        }
    }

    pub fn requested_postal_code(&self) -> Option<&str> {
        match self {
            GeocodeParams::Postal { postalcode } => Some(postalcode),
            GeocodeParams::CityState { .. } => None,
        }
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = match self {
            GeocodeParams::Postal { postalcode } => vec![("postalcode", postalcode.as_str())],
            GeocodeParams::CityState { city, state } => {
                vec![("city", city.as_str()), ("state", state.as_str())]
            }
        };
        pairs.push(("format", "json"));
        pairs
    }
}

/// One geocoder match. Coordinates arrive as strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocodeCandidate {
    pub lat: String,
    pub lon: String,
    pub display_name: String,
}

#[async_trait]
pub trait Geocoder: Send + Sync + Debug {
    /// Ordered candidate matches for `params`.
    async fn search(&self, params: &GeocodeParams) -> Result<Vec<GeocodeCandidate>>;
}

#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    base_url: String,
    http: Client,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, user_agent: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: build_client(user_agent, timeout)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.geocoder.base_url.as_str(),
            &config.user_agent,
            config.http_timeout(),
        )
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, params: &GeocodeParams) -> Result<Vec<GeocodeCandidate>> {
        let url = format!("{}/search", self.base_url);
        tracing::debug!(?params, "Calling Nominatim search");

        let res = self
            .http
            .get(&url)
            .query(&params.query_pairs())
            .send()
            .await
            .context("Failed to send request to Nominatim")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read Nominatim response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Nominatim search failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        serde_json::from_str(&body).context("Failed to parse Nominatim JSON")
    }
}

/// City, state and postal code pulled out of a geocoder `display_name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locality {
    pub postal_code: String,
    pub city: String,
    pub state: String,
    /// The component layout was not recognized and placeholders were used.
    pub degraded: bool,
}

enum PostalSource {
    Blank,
    Request,
    FirstComponent,
}

/// Splits a comma-separated `display_name` and picks city and state by
/// position. The layout depends on how many components there are and on
/// what kind of search produced the match:
///
/// | count | search     | postal code   | city | state |
/// |-------|------------|---------------|------|-------|
/// | 3     | city/state | blank         | 0    | 1     |
/// | 4     | postal     | from request  | 1    | 2     |
/// | 4     | city/state | blank         | 0    | 2     |
/// | 5     | postal     | component 0   | 1    | 3     |
/// | 5     | city/state | blank         | 0    | 2     |
/// | 6     | either     | component 0   | 1    | 4     |
///
/// Anything else degrades to `Unknown, US` (keeping a requested postal code)
/// instead of failing the search.
pub fn parse_locality(
    display_name: &str,
    kind: SearchKind,
    requested_postal: Option<&str>,
) -> Locality {
    let parts: Vec<&str> = display_name.split(',').map(str::trim).collect();

    let layout = match (parts.len(), kind) {
        (3, SearchKind::CityState) => Some((PostalSource::Blank, 0, 1)),
        (4, SearchKind::Postal) => Some((PostalSource::Request, 1, 2)),
        (4, SearchKind::CityState) => Some((PostalSource::Blank, 0, 2)),
        (5, SearchKind::Postal) => Some((PostalSource::FirstComponent, 1, 3)),
        (5, SearchKind::CityState) => Some((PostalSource::Blank, 0, 2)),
        (6, _) => Some((PostalSource::FirstComponent, 1, 4)),
        _ => None,
    };

    let parsed = layout.and_then(|(postal, city_idx, state_idx)| {
        let city = parts.get(city_idx)?;
        let state = parts.get(state_idx)?;
        let postal_code = match postal {
            PostalSource::Blank => String::new(),
            PostalSource::Request => requested_postal.unwrap_or_default().to_string(),
            PostalSource::FirstComponent => parts.first()?.to_string(),
        };

        Some(Locality {
            postal_code,
            city: city.to_string(),
            state: states::abbreviate(state),
            degraded: false,
        })
    });

    parsed.unwrap_or_else(|| {
        tracing::warn!(
            components = parts.len(),
            ?kind,
            display_name,
            "Unrecognized locality layout, using placeholders"
        );
        Locality {
            postal_code: match kind {
                SearchKind::Postal => requested_postal.unwrap_or_default().to_string(),
                SearchKind::CityState => String::new(),
            },
            city: UNKNOWN_CITY.to_string(),
            state: UNKNOWN_STATE.to_string(),
            degraded: true,
        }
    })
}

/// Turns location searches into [`ResolvedLocation`]s.
#[derive(Debug, Clone)]
pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
}

impl LocationResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    /// Resolves raw form fields; incomplete input returns `None` without a
    /// geocoder call.
    pub async fn resolve_parts(
        &self,
        postal_code: Option<&str>,
        city: Option<&str>,
        state: Option<&str>,
    ) -> Option<ResolvedLocation> {
        match LocationQuery::from_parts(postal_code, city, state) {
            Some(query) => self.resolve(&query).await,
            None => {
                tracing::warn!("Empty location data provided");
                None
            }
        }
    }

    pub async fn resolve(&self, query: &LocationQuery) -> Option<ResolvedLocation> {
        if query.is_blank() {
            tracing::warn!("Empty location data provided");
            return None;
        }

        let params = GeocodeParams::for_query(query);

        let candidates = match self.geocoder.search(&params).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("Error fetching location data: {e:#}");
                return None;
            }
        };

        if candidates.is_empty() {
            tracing::warn!(%query, "No location data returned from geocoder");
            return None;
        }

        let Some(candidate) = candidates
            .iter()
            .find(|c| c.display_name.contains(UNITED_STATES))
        else {
            tracing::warn!(%query, "No US location found");
            return None;
        };

        let (Ok(latitude), Ok(longitude)) = (
            candidate.lat.trim().parse::<f64>(),
            candidate.lon.trim().parse::<f64>(),
        ) else {
            tracing::warn!(
                lat = %candidate.lat,
                lon = %candidate.lon,
                "Geocoder returned unparseable coordinates"
            );
            return None;
        };

        let locality = parse_locality(
            &candidate.display_name,
            params.kind(),
            params.requested_postal_code(),
        );

        let resolved = ResolvedLocation::new(
            latitude,
            longitude,
            locality.postal_code,
            locality.city,
            locality.state,
        );
        tracing::info!(city_state = %resolved.city_state, %query, "Resolved location");

        Some(resolved)
    }
}
