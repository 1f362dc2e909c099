//! Axum JSON API over the sync-and-attribution engine: the trigger
//! interface, sync history, and the reporting queries consumed by the
//! dashboard.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::warn;

use adperf_core::{DateWindow, Platform};
use adperf_storage::{AdStore, PgAdStore};
use adperf_sync::{
    build_http_adapters, maybe_build_scheduler, PlatformRegistry, RoasCalculator, SyncConfig,
    SyncRequest, SyncRunner, UnifiedStats,
};

pub const CRATE_NAME: &str = "adperf-web";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AdStore>,
    pub runner: Arc<SyncRunner>,
    pub stats: UnifiedStats,
    pub roas: RoasCalculator,
}

impl AppState {
    pub fn new(store: Arc<dyn AdStore>, runner: Arc<SyncRunner>, registry: PlatformRegistry) -> Self {
        Self {
            stats: UnifiedStats::new(store.clone(), registry),
            roas: RoasCalculator::new(store.clone()),
            store,
            runner,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/sync", post(sync_handler))
        .route("/api/sync/history", get(history_handler))
        .route("/api/stats/platforms", get(platform_stats_handler))
        .route("/api/stats/daily", get(daily_stats_handler))
        .route("/api/stats/top", get(top_campaigns_handler))
        .route("/api/roas", get(roas_handler))
        .route("/api/roas/platforms", get(roas_by_platform_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env();
    let store = Arc::new(PgAdStore::connect(&config.database_url).await?);

    let registry = match PlatformRegistry::load(&config.registry_path) {
        Ok(registry) => registry,
        Err(err) => {
            warn!(error = %err, "platform registry not loaded; serving with none connected");
            PlatformRegistry::empty()
        }
    };
    let adapters = build_http_adapters(&registry, &config)?;
    let runner = Arc::new(
        SyncRunner::new(store.clone(), adapters).with_platform_timeout(
            std::time::Duration::from_secs(config.platform_timeout_secs),
        ),
    );

    if let Some(scheduler) = maybe_build_scheduler(&config, runner.clone()).await? {
        scheduler.start().await?;
    }

    let port: u16 = std::env::var("ADPERF_WEB_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let state = AppState::new(store, runner, registry);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[derive(Debug, Deserialize, Default)]
struct SyncBody {
    #[serde(default)]
    platforms: Option<Vec<String>>,
    #[serde(default)]
    date_from: Option<NaiveDate>,
    #[serde(default)]
    date_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryQuery {
    platform: Option<String>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct DailyQuery {
    days: Option<i64>,
    platform: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TopQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct RoasQuery {
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

fn parse_platform(raw: &str) -> Result<Platform, Response> {
    Platform::from_str(raw).map_err(|err| bad_request(err.to_string()))
}

fn parse_platform_opt(raw: &Option<String>) -> Result<Option<Platform>, Response> {
    raw.as_deref().map(parse_platform).transpose()
}

async fn sync_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SyncBody>,
) -> Response {
    let platforms = match body.platforms {
        Some(raw) => {
            let mut platforms = Vec::with_capacity(raw.len());
            for name in &raw {
                match parse_platform(name) {
                    Ok(platform) => platforms.push(platform),
                    Err(response) => return response,
                }
            }
            Some(platforms)
        }
        None => None,
    };

    let report = state
        .runner
        .run(SyncRequest {
            platforms,
            window: DateWindow::new(body.date_from, body.date_to),
        })
        .await;
    Json(report).into_response()
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let platform = match parse_platform_opt(&query.platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    match state
        .store
        .sync_history(platform, query.limit.unwrap_or(20))
        .await
    {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => server_error(err.into()),
    }
}

async fn platform_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.stats.platform_stats().await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => server_error(err),
    }
}

async fn daily_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DailyQuery>,
) -> Response {
    let platform = match parse_platform_opt(&query.platform) {
        Ok(platform) => platform,
        Err(response) => return response,
    };
    match state
        .stats
        .daily_stats(query.days.unwrap_or(30), platform)
        .await
    {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => server_error(err),
    }
}

async fn top_campaigns_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopQuery>,
) -> Response {
    match state.stats.top_campaigns(query.limit.unwrap_or(10)).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => server_error(err),
    }
}

async fn roas_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoasQuery>,
) -> Response {
    let window = DateWindow::new(query.date_from, query.date_to);
    match state.roas.calculate(&window).await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => server_error(err),
    }
}

async fn roas_by_platform_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.roas.by_platform().await {
        Ok(rows) => Json(rows).into_response(),
        Err(err) => server_error(err),
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use adperf_storage::MemAdStore;
    use adperf_sync::PlatformEntry;

    fn test_state() -> AppState {
        let store: Arc<MemAdStore> = Arc::new(MemAdStore::new());
        let runner = Arc::new(SyncRunner::new(store.clone(), Vec::new()));
        let registry = PlatformRegistry {
            platforms: vec![PlatformEntry {
                platform: Platform::GoogleAds,
                enabled: true,
                api_base_url: Some("https://example.test".to_string()),
                api_token: Some("secret".to_string()),
            }],
        };
        AppState::new(store, runner, registry)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn sync_endpoint_returns_structured_report() {
        let app = app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sync")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"platforms": []}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        assert_eq!(value["total_campaigns"], 0);
        assert!(value["results"].as_array().unwrap().is_empty());
        assert!(value["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_endpoint_rejects_unknown_platform() {
        let app = app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sync")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"platforms": ["facebook"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let value = body_json(response).await;
        assert!(value["error"].as_str().unwrap().contains("facebook"));
    }

    #[tokio::test]
    async fn platform_stats_list_every_platform() {
        let app = app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/stats/platforms")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body_json(response).await;
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), Platform::ALL.len());
        let google = rows
            .iter()
            .find(|r| r["platform"] == "google_ads")
            .unwrap();
        assert_eq!(google["connected"], true);
        assert_eq!(google["campaigns"], 0);
    }

    #[tokio::test]
    async fn read_endpoints_respond_empty_on_fresh_store() {
        let app = app(test_state());
        for uri in [
            "/api/sync/history",
            "/api/stats/daily?days=7",
            "/api/stats/top?limit=5",
            "/api/roas",
            "/api/roas/platforms",
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "uri {uri}");
            let value = body_json(response).await;
            assert!(value.as_array().unwrap().is_empty(), "uri {uri}");
        }
    }

    #[tokio::test]
    async fn history_rejects_unknown_platform_filter() {
        let app = app(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/sync/history?platform=nonsense")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
