//! JSON dashboard server.
//!
//! A visitor gets a session cookie once a search or a settings change is
//! stored; the session remembers the last searched location and the unit
//! preference. Views are assembled from the
//! core normalizer, and the home page substitutes a placeholder view when the
//! weather service is unavailable.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDateTime};
use dashboard_core::{
    CurrentView, DEFAULT_HOUR_COUNT, DailyView, Daypart, ForecastError, HourlyView, LocationInput,
    ResolvedLocation, SessionContext, TemperatureUnit, UnitPreference,
    config::DefaultsConfig,
    timezone,
    units::display_temperature,
};
use serde::Serialize;
use serde_json::json;
use tokio::{net::TcpListener, sync::Mutex};
use uuid::Uuid;

use crate::Services;

pub const SESSION_COOKIE: &str = "weather_dash_session";

/// Hours shown on the hourly page.
pub const HOURLY_PAGE_HOURS: usize = 24;

const FALLBACK_ICON: &str = "http://openweathermap.org/img/wn/01d@2x.png";

/// Sessions idle for longer than this are dropped.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Upper bound on stored sessions; the least recently seen is evicted first.
pub const MAX_SESSIONS: usize = 10_000;

#[derive(Debug)]
struct StoredSession {
    context: SessionContext,
    last_seen: Instant,
}

/// Session contexts keyed by cookie value.
///
/// A session is only stored once a request changes it; visitors that never
/// search or submit settings are served from the configured defaults.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
    idle_timeout: Duration,
    capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SESSION_IDLE_TIMEOUT, MAX_SESSIONS)
    }
}

impl SessionStore {
    pub fn new(idle_timeout: Duration, capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            idle_timeout,
            capacity: capacity.max(1),
        }
    }

    pub async fn get(&self, id: &str) -> Option<SessionContext> {
        let mut sessions = self.sessions.lock().await;
        self.expire_idle(&mut sessions);

        let stored = sessions.get_mut(id)?;
        stored.last_seen = Instant::now();
        Some(stored.context.clone())
    }

    /// Applies `change` to the stored context under the store lock, creating
    /// the session from `defaults` if needed. Returns the updated context and
    /// whether it was created.
    pub async fn update<F>(
        &self,
        id: &str,
        defaults: &DefaultsConfig,
        change: F,
    ) -> (SessionContext, bool)
    where
        F: FnOnce(&mut SessionContext),
    {
        let mut sessions = self.sessions.lock().await;
        self.expire_idle(&mut sessions);

        let created = !sessions.contains_key(id);
        if created && sessions.len() >= self.capacity {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, stored)| stored.last_seen)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                tracing::debug!(session = %oldest, "Evicting least recently seen session");
                sessions.remove(&oldest);
            }
        }

        let stored = sessions
            .entry(id.to_string())
            .or_insert_with(|| StoredSession {
                context: SessionContext::new(defaults),
                last_seen: Instant::now(),
            });
        change(&mut stored.context);
        stored.last_seen = Instant::now();

        (stored.context.clone(), created)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn expire_idle(&self, sessions: &mut HashMap<String, StoredSession>) {
        let before = sessions.len();
        sessions.retain(|_, stored| stored.last_seen.elapsed() < self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "Dropped idle sessions");
        }
    }
}

pub struct AppState {
    pub services: Services,
    pub defaults: DefaultsConfig,
    pub sessions: SessionStore,
}

/// Home and search view: location, current conditions and the next few hours.
#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub location: ResolvedLocation,
    pub current: CurrentView,
    pub hourly: HourlyView,
    /// Placeholder data is being shown because the weather service failed.
    pub fallback: bool,
}

#[derive(Debug, Serialize)]
pub struct ForecastPage {
    pub current: CurrentView,
    pub daily: DailyView,
    pub unit: TemperatureUnit,
}

#[derive(Debug, Serialize)]
pub struct HourlyPage {
    pub date: String,
    pub current: CurrentView,
    pub hourly: HourlyView,
    pub unit: TemperatureUnit,
}

pub fn build_app(services: Services, defaults: DefaultsConfig) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState {
        services,
        defaults,
        sessions: SessionStore::default(),
    });

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(home))
        .route("/search", post(search))
        .route("/forecast", get(forecast))
        .route("/hourly", get(hourly))
        .route("/settings", get(settings).post(update_settings))
        .route("/api/location", post(api_location))
        .with_state(Arc::clone(&state));

    (router, state)
}

pub async fn serve(app: Router, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(%addr, "HTTP server listening");
    axum::serve(listener, app).await.context("Server error")
}

struct Session {
    id: String,
    context: SessionContext,
    /// The session was stored by this request and the client needs its cookie.
    issue_cookie: bool,
}

impl Session {
    fn respond(&self, response: impl IntoResponse) -> Response {
        let mut response = response.into_response();
        if self.issue_cookie {
            let cookie = format!("{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax", self.id);
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        response
    }
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

impl AppState {
    /// Loads the caller's session. A missing or unknown cookie yields the
    /// configured defaults under a fresh id that is not stored yet.
    async fn session(&self, headers: &HeaderMap) -> Session {
        if let Some(id) = session_id(headers) {
            if let Some(context) = self.sessions.get(&id).await {
                return Session {
                    id,
                    context,
                    issue_cookie: false,
                };
            }
        }

        Session {
            id: Uuid::new_v4().to_string(),
            context: SessionContext::new(&self.defaults),
            issue_cookie: false,
        }
    }

    /// Changes only what `change` touches, so concurrent requests on the
    /// same session do not overwrite each other.
    async fn update_session<F>(&self, session: &mut Session, change: F)
    where
        F: FnOnce(&mut SessionContext),
    {
        let (context, created) = self.sessions.update(&session.id, &self.defaults, change).await;
        if created {
            tracing::debug!(session = %session.id, "Started new session");
        }
        session.context = context;
        session.issue_cookie |= created;
    }

    async fn dashboard(
        &self,
        location: &ResolvedLocation,
        units: &UnitPreference,
    ) -> Result<DashboardView, ForecastError> {
        let normalizer = &self.services.normalizer;
        let (current, hourly) = tokio::join!(
            normalizer.current(location, units),
            normalizer.hourly(location, units, DEFAULT_HOUR_COUNT),
        );

        Ok(DashboardView {
            location: location.clone(),
            current: current?,
            hourly: hourly?,
            fallback: false,
        })
    }
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Forecast(ForecastError),
}

impl From<ForecastError> for ApiError {
    fn from(e: ForecastError) -> Self {
        ApiError::Forecast(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => {
                tracing::warn!("Rejected request: {message}");
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Forecast(e) => {
                tracing::error!("Error getting weather: {e}");
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Placeholder shown on the home page when the weather service fails.
pub fn fallback_view(session: &SessionContext, now: NaiveDateTime) -> DashboardView {
    let unit = session.units.temperature;
    let mut location = session.location.clone();
    location.city_state = format!("{}--Default", location.city_state);

    let current = CurrentView {
        location: location.clone(),
        updated_time: now.format("%H:%M").to_string(),
        unit,
        wind_unit: session.units.wind,
        precip_unit: session.units.precipitation,
        temperature: display_temperature(75.0, unit),
        apparent_temperature: display_temperature(77.0, unit),
        wind_speed: 8.0,
        precipitation: 0.0,
        uv_index_max: 5.0,
        temperature_max: display_temperature(80.0, unit),
        temperature_min: display_temperature(70.0, unit),
        precipitation_probability_max: 0,
        weather_code: 0,
        daypart: Daypart::Day,
        timezone: timezone::local_zone_name(),
        icon: FALLBACK_ICON.to_string(),
        description: "Sunny".to_string(),
    };

    let hourly = HourlyView {
        unit,
        hours: vec!["N/A".to_string()],
        temperature: vec![display_temperature(75.0, unit).to_string()],
        weather_code: vec!["0".to_string()],
        precipitation_probability: vec!["0".to_string()],
        icon: vec![FALLBACK_ICON.to_string()],
        description: vec!["Unavailable".to_string()],
    };

    DashboardView {
        location,
        current,
        hourly,
        fallback: true,
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn home(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.session(&headers).await;
    let ctx = &session.context;

    let view = match state.dashboard(&ctx.location, &ctx.units).await {
        Ok(view) => view,
        Err(e) => {
            tracing::error!("Error getting weather: {e}");
            fallback_view(ctx, Local::now().naive_local())
        }
    };

    session.respond(Json(view))
}

async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<LocationInput>, JsonRejection>,
) -> Response {
    let mut session = state.session(&headers).await;
    let result = search_and_store(&state, &mut session, body).await;
    session.respond(result)
}

/// Resolves the submitted location, stores it in the session and returns the
/// refreshed dashboard, or `{}` when the location is not found.
async fn search_and_store(
    state: &AppState,
    session: &mut Session,
    body: Result<Json<LocationInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(input) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let Some(location) = state
        .services
        .resolver
        .resolve_parts(
            input.postal_code.as_deref(),
            input.city.as_deref(),
            input.state.as_deref(),
        )
        .await
    else {
        tracing::info!("Location data is invalid");
        return Ok(Json(json!({})).into_response());
    };

    state
        .update_session(session, |ctx| ctx.replace_location(location))
        .await;

    let ctx = &session.context;
    let view = state.dashboard(&ctx.location, &ctx.units).await?;
    Ok(Json(view).into_response())
}

async fn forecast(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.session(&headers).await;
    let ctx = &session.context;
    let normalizer = &state.services.normalizer;

    let (current, daily) = tokio::join!(
        normalizer.current(&ctx.location, &ctx.units),
        normalizer.daily(&ctx.location, &ctx.units),
    );

    let page = match (current, daily) {
        (Ok(current), Ok(daily)) => Ok(Json(ForecastPage {
            current,
            daily,
            unit: ctx.units.temperature,
        })),
        (Err(e), _) | (_, Err(e)) => Err(ApiError::from(e)),
    };

    session.respond(page)
}

async fn hourly(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.session(&headers).await;
    let ctx = &session.context;
    let normalizer = &state.services.normalizer;

    let (current, hourly) = tokio::join!(
        normalizer.current(&ctx.location, &ctx.units),
        normalizer.hourly(&ctx.location, &ctx.units, HOURLY_PAGE_HOURS),
    );

    let page = match (current, hourly) {
        (Ok(current), Ok(hourly)) => Ok(Json(HourlyPage {
            date: Local::now().format("%Y-%m-%d").to_string(),
            current,
            hourly,
            unit: ctx.units.temperature,
        })),
        (Err(e), _) | (_, Err(e)) => Err(ApiError::from(e)),
    };

    session.respond(page)
}

async fn settings(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state.session(&headers).await;
    session.respond(Json(session.context.units))
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<UnitPreference>, JsonRejection>,
) -> Response {
    let mut session = state.session(&headers).await;

    let units = match body {
        Ok(Json(units)) => units,
        Err(e) => return session.respond(ApiError::BadRequest(e.body_text())),
    };

    state
        .update_session(&mut session, |ctx| ctx.set_units(units))
        .await;
    tracing::info!(?units, "Unit preference updated");

    session.respond(Json(units))
}

async fn api_location(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LocationInput>, JsonRejection>,
) -> Response {
    let input = match body {
        Ok(Json(input)) if input != LocationInput::default() => input,
        Ok(_) => return ApiError::BadRequest("No data provided".to_string()).into_response(),
        Err(e) => return ApiError::BadRequest(e.body_text()).into_response(),
    };

    match state
        .services
        .resolver
        .resolve_parts(
            input.postal_code.as_deref(),
            input.city.as_deref(),
            input.state.as_deref(),
        )
        .await
    {
        Some(location) => Json(location).into_response(),
        None => Json(json!({})).into_response(),
    }
}
