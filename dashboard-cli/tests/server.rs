use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use tokio::sync::Notify;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::{Duration, Timelike, Utc};
use dashboard_cli::{Services, server};
use dashboard_core::{
    config::DefaultsConfig,
    forecast::{ForecastPayload, ForecastRequest, WeatherSource},
    geocode::{GeocodeCandidate, GeocodeParams, Geocoder},
};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Holds a geocoder call open until the test releases it.
#[derive(Debug, Default)]
struct Gate {
    entered: Notify,
    release: Notify,
}

#[derive(Debug, Default)]
struct FakeGeocoder {
    candidates: Vec<GeocodeCandidate>,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn search(&self, _params: &GeocodeParams) -> anyhow::Result<Vec<GeocodeCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        Ok(self.candidates.clone())
    }
}

#[derive(Debug, Default)]
struct FakeWeather {
    fail: AtomicBool,
}

#[async_trait]
impl WeatherSource for FakeWeather {
    async fn fetch(&self, request: &ForecastRequest) -> anyhow::Result<ForecastPayload> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("weather service unreachable");
        }

        let body = if !request.current.is_empty() {
            current_body()
        } else if !request.hourly.is_empty() {
            hourly_body()
        } else {
            daily_body()
        };
        Ok(serde_json::from_value(body)?)
    }
}

fn raleigh() -> GeocodeCandidate {
    GeocodeCandidate {
        lat: "35.7803977".into(),
        lon: "-78.6390989".into(),
        display_name: "Raleigh, Wake County, North Carolina, United States".into(),
    }
}

fn current_body() -> Value {
    json!({
        "timezone": "America/New_York",
        "current": {
            "temperature_2m": 68.9,
            "is_day": 1,
            "wind_speed_10m": 8.04,
            "weather_code": 2,
            "apparent_temperature": 66.2,
            "precipitation": 0.0
        },
        "daily": {
            "time": ["2025-04-15"],
            "temperature_2m_max": [80.7],
            "temperature_2m_min": [50.0],
            "uv_index_max": [6.36],
            "precipitation_probability_max": [14]
        }
    })
}

fn hourly_body() -> Value {
    let start = Utc::now()
        .naive_utc()
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap()
        - Duration::hours(3);
    let times: Vec<String> = (0..48)
        .map(|h| (start + Duration::hours(h)).format("%Y-%m-%dT%H:%M").to_string())
        .collect();
    let day = start.date();
    let next = day.succ_opt().unwrap();

    json!({
        "timezone": "UTC",
        "hourly": {
            "time": times,
            "temperature_2m": vec![70.5; 48],
            "weather_code": vec![0; 48],
            "precipitation_probability": vec![20; 48]
        },
        "daily": {
            "time": [day.to_string(), next.to_string()],
            "sunrise": [format!("{day}T06:00"), format!("{next}T06:00")],
            "sunset": [format!("{day}T18:00"), format!("{next}T18:00")]
        }
    })
}

fn daily_body() -> Value {
    json!({
        "timezone": "America/New_York",
        "daily": {
            "time": ["2025-04-15", "2025-04-16", "2025-04-17", "2025-04-18",
                     "2025-04-19", "2025-04-20", "2025-04-21"],
            "temperature_2m_max": [80.7, 75.2, 68.0, 71.9, 77.0, 82.4, 79.1],
            "temperature_2m_min": [50.0, 55.3, 48.2, 47.0, 52.9, 60.1, 58.8],
            "precipitation_probability_max": [14, 35, 80, 5, 0, 20, 65],
            "weather_code": [0, 2, 63, 1, 0, 3, 95]
        }
    })
}

struct Harness {
    app: Router,
    state: Arc<server::AppState>,
    geocoder: Arc<FakeGeocoder>,
    weather: Arc<FakeWeather>,
}

fn harness(candidates: Vec<GeocodeCandidate>) -> Harness {
    harness_with(FakeGeocoder {
        candidates,
        ..FakeGeocoder::default()
    })
}

fn harness_with(geocoder: FakeGeocoder) -> Harness {
    let geocoder = Arc::new(geocoder);
    let weather = Arc::new(FakeWeather::default());
    let services = Services::new(geocoder.clone(), weather.clone());
    let (app, state) = server::build_app(services, DefaultsConfig::default());

    Harness {
        app,
        state,
        geocoder,
        weather,
    }
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut req = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        req = req.header(header::COOKIE, cookie);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> Response {
    app.clone().oneshot(req).await.unwrap()
}

async fn body_json(res: Response) -> Value {
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// `name=value` part of the Set-Cookie header.
fn session_cookie(res: &Response) -> String {
    let raw = res
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    raw.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn healthz_is_ok() {
    let h = harness(vec![]);
    let res = send(&h.app, get("/healthz", None)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn home_shows_the_default_location_without_storing_a_session() {
    let h = harness(vec![]);
    let res = send(&h.app, get("/", None)).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    assert!(h.state.sessions.is_empty().await);

    let body = body_json(res).await;
    assert_eq!(body["fallback"], false);
    assert_eq!(body["location"]["city_state"], "Cary, NC");
    assert_eq!(body["location"]["postal_code"], "27511");
    assert_eq!(body["current"]["temperature"], 68);
    assert_eq!(body["current"]["description"], "Partly Cloudy");
    assert_eq!(body["hourly"]["hours"].as_array().unwrap().len(), 6);
    assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_cookies_are_not_stored() {
    let h = harness(vec![]);

    for i in 0..1000 {
        let cookie = format!("{}=stranger-{i}", server::SESSION_COOKIE);
        let res = send(&h.app, get("/settings", Some(&cookie))).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().get(header::SET_COOKIE).is_none());
    }

    assert_eq!(h.state.sessions.len().await, 0);
}

#[tokio::test]
async fn home_falls_back_when_weather_fails() {
    let h = harness(vec![]);
    h.weather.fail.store(true, Ordering::SeqCst);

    let res = send(&h.app, get("/", None)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["fallback"], true);
    assert_eq!(body["location"]["city_state"], "Cary, NC--Default");
    assert_eq!(body["hourly"]["hours"], json!(["N/A"]));
}

#[tokio::test]
async fn search_updates_the_session_location() {
    let h = harness(vec![raleigh()]);

    let res = send(
        &h.app,
        post_json("/search", None, r#"{"city": "Raleigh", "state": "NC"}"#),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res);

    let body = body_json(res).await;
    assert_eq!(body["location"]["city_state"], "Raleigh, NC");
    assert_eq!(body["location"]["postal_code"], "");
    assert_eq!(body["current"]["city"], "Raleigh");

    let res = send(&h.app, get("/", Some(&cookie))).await;
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    let body = body_json(res).await;
    assert_eq!(body["location"]["city_state"], "Raleigh, NC");
    assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.state.sessions.len().await, 1);
}

#[tokio::test]
async fn settings_saved_during_a_search_survive_it() {
    let gate = Arc::new(Gate::default());
    let h = harness_with(FakeGeocoder {
        candidates: vec![raleigh()],
        gate: Some(gate.clone()),
        ..FakeGeocoder::default()
    });

    let res = send(
        &h.app,
        post_json(
            "/settings",
            None,
            r#"{"temp_unit": "F", "wind_unit": "mph", "precip_unit": "in"}"#,
        ),
    )
    .await;
    let cookie = session_cookie(&res);

    let search = tokio::spawn({
        let app = h.app.clone();
        let cookie = cookie.clone();
        async move {
            let req = post_json("/search", Some(&cookie), r#"{"city": "Raleigh", "state": "NC"}"#);
            send(&app, req).await
        }
    });

    gate.entered.notified().await;
    let res = send(
        &h.app,
        post_json(
            "/settings",
            Some(&cookie),
            r#"{"temp_unit": "C", "wind_unit": "km/h", "precip_unit": "mm"}"#,
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);

    gate.release.notify_one();
    let res = search.await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["current"]["unit"], "C");

    let res = send(&h.app, get("/settings", Some(&cookie))).await;
    assert_eq!(
        body_json(res).await,
        json!({"temp_unit": "C", "wind_unit": "km/h", "precip_unit": "mm"})
    );

    let res = send(&h.app, get("/", Some(&cookie))).await;
    assert_eq!(body_json(res).await["location"]["city_state"], "Raleigh, NC");
}

#[tokio::test]
async fn search_not_found_returns_empty_object() {
    let h = harness(vec![]);

    let res = send(&h.app, post_json("/search", None, r#"{"postal_code": "99999"}"#)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({}));
}

#[tokio::test]
async fn search_with_empty_fields_skips_geocoder() {
    let h = harness(vec![raleigh()]);

    let res = send(&h.app, post_json("/search", None, r#"{"city": "", "state": ""}"#)).await;
    assert_eq!(body_json(res).await, json!({}));
    assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_reports_weather_failure() {
    let h = harness(vec![raleigh()]);
    h.weather.fail.store(true, Ordering::SeqCst);

    let res = send(
        &h.app,
        post_json("/search", None, r#"{"city": "Raleigh", "state": "NC"}"#),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

    let body = body_json(res).await;
    assert!(body["error"].as_str().unwrap().contains("unreachable"));
}

#[tokio::test]
async fn forecast_page_has_seven_days() {
    let h = harness(vec![]);
    let res = send(&h.app, get("/forecast", None)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["unit"], "F");
    assert_eq!(body["daily"]["date"].as_array().unwrap().len(), 7);
    assert_eq!(body["daily"]["description"][6], "Thunderstorm");
    assert_eq!(body["current"]["city_state"], "Cary, NC");
}

#[tokio::test]
async fn hourly_page_has_a_day_of_hours() {
    let h = harness(vec![]);
    let res = send(&h.app, get("/hourly", None)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["hourly"]["hours"].as_array().unwrap().len(), 24);
    assert_eq!(body["hourly"]["temperature"][0], "70");
    assert_eq!(body["date"].as_str().unwrap().len(), 10);
}

#[tokio::test]
async fn settings_round_trip_through_the_session() {
    let h = harness(vec![]);

    let res = send(&h.app, get("/settings", None)).await;
    assert!(res.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(
        body_json(res).await,
        json!({"temp_unit": "F", "wind_unit": "mph", "precip_unit": "in"})
    );

    let res = send(
        &h.app,
        post_json(
            "/settings",
            None,
            r#"{"temp_unit": "C", "wind_unit": "km/h", "precip_unit": "mm"}"#,
        ),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res);
    assert!(cookie.starts_with(&format!("{}=", server::SESSION_COOKIE)));

    let res = send(&h.app, get("/settings", Some(&cookie))).await;
    assert_eq!(body_json(res).await["temp_unit"], "C");

    let res = send(&h.app, get("/", Some(&cookie))).await;
    let body = body_json(res).await;
    assert_eq!(body["current"]["unit"], "C");
    assert_eq!(body["current"]["temperature"], 20);
    assert_eq!(body["hourly"]["temperature"][0], "21");
}

#[tokio::test]
async fn unsupported_unit_is_rejected() {
    let h = harness(vec![]);
    let res = send(
        &h.app,
        post_json(
            "/settings",
            None,
            r#"{"temp_unit": "K", "wind_unit": "mph", "precip_unit": "in"}"#,
        ),
    )
    .await;

    assert!(res.status().is_client_error());
}

#[tokio::test]
async fn api_location_resolves_without_touching_the_session() {
    let h = harness(vec![raleigh()]);

    let res = send(
        &h.app,
        post_json("/api/location", None, r#"{"city": "Raleigh", "state": "NC"}"#),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(header::SET_COOKIE).is_none());

    let body = body_json(res).await;
    assert_eq!(body["city_state"], "Raleigh, NC");
    assert_eq!(body["lat"], 35.7803977);
}

#[tokio::test]
async fn api_location_rejects_empty_body() {
    let h = harness(vec![raleigh()]);

    let res = send(&h.app, post_json("/api/location", None, "{}")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["error"], "No data provided");

    let res = send(&h.app, post_json("/api/location", None, "not json")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.geocoder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn api_location_not_found_is_empty_object() {
    let h = harness(vec![]);

    let res = send(&h.app, post_json("/api/location", None, r#"{"postal_code": "00000"}"#)).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({}));
}
