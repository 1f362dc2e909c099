//! Platform adapter contracts + the six vendor-payload adapters.
//!
//! Adapters normalize vendor-shaped JSON into the core value records and
//! nothing else: OAuth, pagination and rate-limit handling live behind the
//! `VendorApi` boundary. Records keep platform-native money units
//! (`Spend`); the store converts on write. Adapter failures propagate to
//! the orchestrator uncaught -- adapters never swallow errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value as JsonValue;
use thiserror::Error;

use adperf_core::{
    CampaignRecord, CampaignStatus, DailyStatRecord, DateWindow, KeywordRecord, MatchType,
    Platform, ProductFeedRecord, Spend, ACCOUNT_CAMPAIGN_ID,
};

pub const CRATE_NAME: &str = "adperf-adapters";

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error("vendor request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// One call against a vendor API, reduced to the boundary the sync engine
/// cares about: a named endpoint plus query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorRequest {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl VendorRequest {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// The out-of-scope wire client at its interface boundary. Concrete
/// implementations handle transport; adapters own payload interpretation.
#[async_trait]
pub trait VendorApi: Send + Sync {
    async fn fetch(&self, request: VendorRequest) -> Result<JsonValue, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct HttpVendorApiConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

/// Minimal HTTP transport for a vendor API: GET `base_url/endpoint` with
/// query params and an optional bearer token. Vendor-level retry is out of
/// scope; a failed call fails the platform's sync and the next scheduled
/// run tries again.
pub struct HttpVendorApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVendorApi {
    pub fn new(config: HttpVendorApiConfig) -> Result<Self, AdapterError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(token) = &config.api_token {
            let mut headers = HeaderMap::new();
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AdapterError::Message(format!("invalid api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl VendorApi for HttpVendorApi {
    async fn fetch(&self, request: VendorRequest) -> Result<JsonValue, AdapterError> {
        let url = format!("{}/{}", self.base_url, request.endpoint.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&request.params)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<JsonValue>().await?)
    }
}

/// Canned-payload vendor API keyed by endpoint. Used by adapter tests and
/// credential-less local runs.
#[derive(Debug, Default)]
pub struct StaticVendorApi {
    responses: HashMap<String, JsonValue>,
}

impl StaticVendorApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, endpoint: impl Into<String>, payload: JsonValue) -> Self {
        self.responses.insert(endpoint.into(), payload);
        self
    }
}

#[async_trait]
impl VendorApi for StaticVendorApi {
    async fn fetch(&self, request: VendorRequest) -> Result<JsonValue, AdapterError> {
        self.responses
            .get(&request.endpoint)
            .cloned()
            .ok_or_else(|| {
                AdapterError::Message(format!("no canned response for endpoint {}", request.endpoint))
            })
    }
}

// ---------------------------------------------------------------------------
// JSON path helpers
// ---------------------------------------------------------------------------

fn json_at<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    Some(cur)
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    json_at(value, path)?.as_str()
}

/// Numeric field that may arrive as a JSON number or a numeric string
/// (Google Ads serializes int64 metrics as strings).
fn json_i64(value: &JsonValue, path: &[&str]) -> Option<i64> {
    let node = json_at(value, path)?;
    if let Some(v) = node.as_i64() {
        return Some(v);
    }
    let raw = node.as_str()?;
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|v| v.round() as i64))
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    let node = json_at(value, path)?;
    node.as_f64().or_else(|| node.as_str()?.parse::<f64>().ok())
}

fn json_array<'a>(
    value: &'a JsonValue,
    path: &[&str],
    what: &str,
) -> Result<&'a Vec<JsonValue>, AdapterError> {
    json_at(value, path)
        .and_then(|v| v.as_array())
        .ok_or_else(|| AdapterError::Message(format!("{what} payload missing `{}`", path.join("."))))
}

fn parse_iso_date(raw: &str, what: &str) -> Result<NaiveDate, AdapterError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| AdapterError::Message(format!("{what}: bad date `{raw}`: {e}")))
}

/// Sklik reports dates as compact `YYYYMMDD`.
fn parse_compact_date(raw: &str, what: &str) -> Result<NaiveDate, AdapterError> {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map_err(|e| AdapterError::Message(format!("{what}: bad date `{raw}`: {e}")))
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn window_params(window: &DateWindow) -> Vec<(String, String)> {
    let mut params = Vec::new();
    if let Some(from) = window.from {
        params.push(("date_from".to_string(), from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = window.to {
        params.push(("date_to".to_string(), to.format("%Y-%m-%d").to_string()));
    }
    params
}

fn ranged_request(endpoint: &str, window: &DateWindow) -> VendorRequest {
    let mut request = VendorRequest::new(endpoint);
    request.params = window_params(window);
    request
}

// ---------------------------------------------------------------------------
// Adapter contract
// ---------------------------------------------------------------------------

/// One implementation per platform, selected through the typed enum -- the
/// closed dispatch surface the orchestrator drives.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// True when the vendor exposes only daily granularity and campaign
    /// totals must be re-summed from daily stats after each sync.
    fn campaign_totals_from_daily(&self) -> bool {
        false
    }

    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>, AdapterError>;

    async fn fetch_daily_stats(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<DailyStatRecord>, AdapterError>;

    async fn fetch_keywords(
        &self,
        _window: &DateWindow,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        Ok(Vec::new())
    }

    async fn fetch_product_feed(&self) -> Result<Option<ProductFeedRecord>, AdapterError> {
        Ok(None)
    }
}

pub fn adapter_for_platform(
    platform: Platform,
    api: Arc<dyn VendorApi>,
) -> Box<dyn PlatformAdapter> {
    match platform {
        Platform::GoogleAds => Box::new(GoogleAdsAdapter::new(api)),
        Platform::Sklik => Box::new(SklikAdapter::new(api)),
        Platform::Heureka => Box::new(HeurekaAdapter::new(api)),
        Platform::Zbozi => Box::new(FeedPlatformAdapter::zbozi(api)),
        Platform::Glami => Box::new(FeedPlatformAdapter::glami(api)),
        Platform::Mergado => Box::new(MergadoAdapter::new(api)),
    }
}

// ---------------------------------------------------------------------------
// Google Ads
// ---------------------------------------------------------------------------

/// Google Ads search/display campaigns. Money arrives in micros and int64
/// metrics arrive as strings.
pub struct GoogleAdsAdapter {
    api: Arc<dyn VendorApi>,
}

impl GoogleAdsAdapter {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self { api }
    }

    fn campaign_from_entry(entry: &JsonValue) -> Result<CampaignRecord, AdapterError> {
        let external_id = json_str(entry, &["campaign", "id"])
            .map(str::to_string)
            .or_else(|| json_i64(entry, &["campaign", "id"]).map(|v| v.to_string()))
            .ok_or_else(|| AdapterError::Message("google campaign entry missing id".into()))?;
        let status = match json_str(entry, &["campaign", "status"]) {
            Some("ENABLED") => CampaignStatus::Active,
            _ => CampaignStatus::Paused,
        };
        Ok(CampaignRecord {
            name: json_str(entry, &["campaign", "name"])
                .unwrap_or(external_id.as_str())
                .to_string(),
            status,
            daily_budget: json_i64(entry, &["campaignBudget", "amountMicros"]).map(Spend::Micros),
            currency: json_str(entry, &["customer", "currencyCode"])
                .unwrap_or("CZK")
                .to_string(),
            impressions: json_i64(entry, &["metrics", "impressions"]).unwrap_or(0),
            clicks: json_i64(entry, &["metrics", "clicks"]).unwrap_or(0),
            spend: Spend::Micros(json_i64(entry, &["metrics", "costMicros"]).unwrap_or(0)),
            conversions: json_i64(entry, &["metrics", "conversions"]).unwrap_or(0),
            external_id,
        })
    }
}

#[async_trait]
impl PlatformAdapter for GoogleAdsAdapter {
    fn platform(&self) -> Platform {
        Platform::GoogleAds
    }

    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>, AdapterError> {
        let payload = self.api.fetch(VendorRequest::new("campaigns")).await?;
        json_array(&payload, &["results"], "google campaigns")?
            .iter()
            .map(Self::campaign_from_entry)
            .collect()
    }

    async fn fetch_daily_stats(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<DailyStatRecord>, AdapterError> {
        let payload = self.api.fetch(ranged_request("campaign_daily_stats", window)).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["results"], "google daily stats")? {
            let external_id = json_str(entry, &["campaign", "id"])
                .map(str::to_string)
                .or_else(|| json_i64(entry, &["campaign", "id"]).map(|v| v.to_string()))
                .ok_or_else(|| AdapterError::Message("google stat entry missing campaign id".into()))?;
            let date = json_str(entry, &["segments", "date"])
                .ok_or_else(|| AdapterError::Message("google stat entry missing date".into()))?;
            out.push(DailyStatRecord {
                external_id,
                date: parse_iso_date(date, "google daily stats")?,
                impressions: json_i64(entry, &["metrics", "impressions"]).unwrap_or(0),
                clicks: json_i64(entry, &["metrics", "clicks"]).unwrap_or(0),
                spend: Spend::Micros(json_i64(entry, &["metrics", "costMicros"]).unwrap_or(0)),
                conversions: json_i64(entry, &["metrics", "conversions"]).unwrap_or(0),
                revenue: json_f64(entry, &["metrics", "conversionsValue"]).map(Spend::Major),
            });
        }
        Ok(out)
    }

    async fn fetch_keywords(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        let payload = self.api.fetch(ranged_request("keywords", window)).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["results"], "google keywords")? {
            let Some(text) = json_str(entry, &["adGroupCriterion", "keyword", "text"]) else {
                continue;
            };
            out.push(KeywordRecord {
                text: text.to_string(),
                match_type: MatchType::from_vendor(
                    json_str(entry, &["adGroupCriterion", "keyword", "matchType"]).unwrap_or(""),
                ),
                impressions: json_i64(entry, &["metrics", "impressions"]).unwrap_or(0),
                clicks: json_i64(entry, &["metrics", "clicks"]).unwrap_or(0),
                spend: Spend::Micros(json_i64(entry, &["metrics", "costMicros"]).unwrap_or(0)),
                conversions: json_i64(entry, &["metrics", "conversions"]).unwrap_or(0),
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Sklik
// ---------------------------------------------------------------------------

/// Seznam Sklik. Money arrives as integer haléře (minor units), dates as
/// compact `YYYYMMDD`, campaign status as `active`/`suspend`.
pub struct SklikAdapter {
    api: Arc<dyn VendorApi>,
}

impl SklikAdapter {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformAdapter for SklikAdapter {
    fn platform(&self) -> Platform {
        Platform::Sklik
    }

    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>, AdapterError> {
        let payload = self.api.fetch(VendorRequest::new("campaigns.list")).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["campaigns"], "sklik campaigns")? {
            let external_id = json_i64(entry, &["id"])
                .map(|v| v.to_string())
                .ok_or_else(|| AdapterError::Message("sklik campaign entry missing id".into()))?;
            let status = match json_str(entry, &["status"]) {
                Some("active") => CampaignStatus::Active,
                _ => CampaignStatus::Paused,
            };
            out.push(CampaignRecord {
                name: json_str(entry, &["name"]).unwrap_or(external_id.as_str()).to_string(),
                status,
                daily_budget: json_i64(entry, &["dayBudget"]).map(Spend::MinorUnits),
                currency: "CZK".to_string(),
                impressions: json_i64(entry, &["stats", "impressions"]).unwrap_or(0),
                clicks: json_i64(entry, &["stats", "clicks"]).unwrap_or(0),
                spend: Spend::MinorUnits(json_i64(entry, &["stats", "price"]).unwrap_or(0)),
                conversions: json_i64(entry, &["stats", "conversions"]).unwrap_or(0),
                external_id,
            });
        }
        Ok(out)
    }

    async fn fetch_daily_stats(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<DailyStatRecord>, AdapterError> {
        let payload = self.api.fetch(ranged_request("stats.campaigns", window)).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["report"], "sklik daily stats")? {
            let external_id = json_i64(entry, &["campaignId"])
                .map(|v| v.to_string())
                .ok_or_else(|| AdapterError::Message("sklik stat entry missing campaignId".into()))?;
            let date = json_str(entry, &["date"])
                .ok_or_else(|| AdapterError::Message("sklik stat entry missing date".into()))?;
            out.push(DailyStatRecord {
                external_id,
                date: parse_compact_date(date, "sklik daily stats")?,
                impressions: json_i64(entry, &["impressions"]).unwrap_or(0),
                clicks: json_i64(entry, &["clicks"]).unwrap_or(0),
                spend: Spend::MinorUnits(json_i64(entry, &["price"]).unwrap_or(0)),
                conversions: json_i64(entry, &["conversions"]).unwrap_or(0),
                revenue: json_i64(entry, &["conversionValue"]).map(Spend::MinorUnits),
            });
        }
        Ok(out)
    }

    async fn fetch_keywords(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<KeywordRecord>, AdapterError> {
        let payload = self.api.fetch(ranged_request("keywords.list", window)).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["keywords"], "sklik keywords")? {
            let Some(text) = json_str(entry, &["name"]) else {
                continue;
            };
            out.push(KeywordRecord {
                text: text.to_string(),
                match_type: MatchType::from_vendor(json_str(entry, &["matchType"]).unwrap_or("")),
                impressions: json_i64(entry, &["stats", "impressions"]).unwrap_or(0),
                clicks: json_i64(entry, &["stats", "clicks"]).unwrap_or(0),
                spend: Spend::MinorUnits(json_i64(entry, &["stats", "price"]).unwrap_or(0)),
                conversions: json_i64(entry, &["stats", "conversions"]).unwrap_or(0),
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Heureka
// ---------------------------------------------------------------------------

/// Heureka product-bidding. Campaigns map to bidded categories and the API
/// exposes daily numbers only, so campaign totals are re-summed from daily
/// stats after every sync.
pub struct HeurekaAdapter {
    api: Arc<dyn VendorApi>,
}

impl HeurekaAdapter {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformAdapter for HeurekaAdapter {
    fn platform(&self) -> Platform {
        Platform::Heureka
    }

    fn campaign_totals_from_daily(&self) -> bool {
        true
    }

    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>, AdapterError> {
        let payload = self.api.fetch(VendorRequest::new("categories")).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["categories"], "heureka categories")? {
            let external_id = json_i64(entry, &["id"])
                .map(|v| v.to_string())
                .ok_or_else(|| AdapterError::Message("heureka category missing id".into()))?;
            let status = if entry.get("active").and_then(JsonValue::as_bool).unwrap_or(false) {
                CampaignStatus::Active
            } else {
                CampaignStatus::Paused
            };
            out.push(CampaignRecord {
                name: json_str(entry, &["name"]).unwrap_or(external_id.as_str()).to_string(),
                status,
                daily_budget: None,
                currency: "CZK".to_string(),
                impressions: 0,
                clicks: 0,
                spend: Spend::ZERO,
                conversions: 0,
                external_id,
            });
        }
        Ok(out)
    }

    async fn fetch_daily_stats(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<DailyStatRecord>, AdapterError> {
        let payload = self.api.fetch(ranged_request("bidding/daily", window)).await?;
        let mut out = Vec::new();
        for entry in json_array(&payload, &["days"], "heureka daily stats")? {
            let external_id = json_i64(entry, &["categoryId"])
                .map(|v| v.to_string())
                .ok_or_else(|| AdapterError::Message("heureka day missing categoryId".into()))?;
            let date = json_str(entry, &["date"])
                .ok_or_else(|| AdapterError::Message("heureka day missing date".into()))?;
            out.push(DailyStatRecord {
                external_id,
                date: parse_iso_date(date, "heureka daily stats")?,
                impressions: json_i64(entry, &["views"]).unwrap_or(0),
                clicks: json_i64(entry, &["clicks"]).unwrap_or(0),
                spend: Spend::Major(json_f64(entry, &["spend"]).unwrap_or(0.0)),
                conversions: json_i64(entry, &["orders"]).unwrap_or(0),
                revenue: json_f64(entry, &["orderValue"]).map(Spend::Major),
            });
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Feed platforms: Zboží.cz, Glami
// ---------------------------------------------------------------------------

/// Shared shape of the two feed-only ad platforms: no campaign concept,
/// account-level daily aggregates onto one synthetic campaign row, plus a
/// product-feed summary.
pub struct FeedPlatformAdapter {
    api: Arc<dyn VendorApi>,
    platform: Platform,
    account_endpoint: &'static str,
    stats_endpoint: &'static str,
    feed_endpoint: &'static str,
}

impl FeedPlatformAdapter {
    pub fn zbozi(api: Arc<dyn VendorApi>) -> Self {
        Self {
            api,
            platform: Platform::Zbozi,
            account_endpoint: "shop",
            stats_endpoint: "shop/stats",
            feed_endpoint: "shop/feed",
        }
    }

    pub fn glami(api: Arc<dyn VendorApi>) -> Self {
        Self {
            api,
            platform: Platform::Glami,
            account_endpoint: "account",
            stats_endpoint: "performance",
            feed_endpoint: "feed",
        }
    }

    async fn account_campaign(&self) -> Result<CampaignRecord, AdapterError> {
        let payload = self.api.fetch(VendorRequest::new(self.account_endpoint)).await?;
        // Zboží wraps the account in `shop`, Glami in `account`.
        let account = payload.get("shop").or_else(|| payload.get("account"));
        let name = account
            .and_then(|a| json_str(a, &["name"]))
            .map(|shop| format!("{shop} ({})", self.platform.display_name()))
            .unwrap_or_else(|| format!("{} account", self.platform.display_name()));
        let status = match account.and_then(|a| json_str(a, &["status"])) {
            Some("active") | None => CampaignStatus::Active,
            Some(_) => CampaignStatus::Paused,
        };
        Ok(CampaignRecord {
            external_id: ACCOUNT_CAMPAIGN_ID.to_string(),
            name,
            status,
            daily_budget: None,
            currency: "CZK".to_string(),
            impressions: 0,
            clicks: 0,
            spend: Spend::ZERO,
            conversions: 0,
        })
    }
}

#[async_trait]
impl PlatformAdapter for FeedPlatformAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn campaign_totals_from_daily(&self) -> bool {
        true
    }

    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>, AdapterError> {
        Ok(vec![self.account_campaign().await?])
    }

    async fn fetch_daily_stats(
        &self,
        window: &DateWindow,
    ) -> Result<Vec<DailyStatRecord>, AdapterError> {
        let payload = self.api.fetch(ranged_request(self.stats_endpoint, window)).await?;
        let what = self.platform.as_str();
        let mut out = Vec::new();
        for entry in json_array(&payload, &["days"], what)? {
            let date = json_str(entry, &["date"])
                .ok_or_else(|| AdapterError::Message(format!("{what} day entry missing date")))?;
            out.push(DailyStatRecord {
                external_id: ACCOUNT_CAMPAIGN_ID.to_string(),
                date: parse_iso_date(date, what)?,
                impressions: json_i64(entry, &["impressions"]).unwrap_or(0),
                clicks: json_i64(entry, &["clicks"]).unwrap_or(0),
                spend: Spend::Major(json_f64(entry, &["spend"]).unwrap_or(0.0)),
                conversions: json_i64(entry, &["conversions"]).unwrap_or(0),
                revenue: json_f64(entry, &["conversionValue"]).map(Spend::Major),
            });
        }
        Ok(out)
    }

    async fn fetch_product_feed(&self) -> Result<Option<ProductFeedRecord>, AdapterError> {
        let payload = self.api.fetch(VendorRequest::new(self.feed_endpoint)).await?;
        let Some(feed) = payload.get("feed") else {
            return Ok(None);
        };
        Ok(Some(ProductFeedRecord {
            products_count: json_i64(feed, &["itemCount"]).unwrap_or(0),
            format: json_str(feed, &["format"]).unwrap_or("xml").to_string(),
            status: json_str(feed, &["status"]).unwrap_or("unknown").to_string(),
            last_generated_at: json_str(feed, &["lastGeneratedAt"]).and_then(parse_rfc3339),
        }))
    }
}

// ---------------------------------------------------------------------------
// Mergado
// ---------------------------------------------------------------------------

/// Mergado manages product-feed exports; it is not an ad network. It
/// contributes feed summaries and a sync-log trail, nothing campaign- or
/// UTM-shaped.
pub struct MergadoAdapter {
    api: Arc<dyn VendorApi>,
}

impl MergadoAdapter {
    pub fn new(api: Arc<dyn VendorApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl PlatformAdapter for MergadoAdapter {
    fn platform(&self) -> Platform {
        Platform::Mergado
    }

    async fn fetch_campaigns(&self) -> Result<Vec<CampaignRecord>, AdapterError> {
        Ok(Vec::new())
    }

    async fn fetch_daily_stats(
        &self,
        _window: &DateWindow,
    ) -> Result<Vec<DailyStatRecord>, AdapterError> {
        Ok(Vec::new())
    }

    async fn fetch_product_feed(&self) -> Result<Option<ProductFeedRecord>, AdapterError> {
        let payload = self.api.fetch(VendorRequest::new("exports")).await?;
        let exports = json_array(&payload, &["exports"], "mergado exports")?;
        if exports.is_empty() {
            return Ok(None);
        }

        let mut products_count = 0i64;
        let mut status = "done".to_string();
        let mut last_generated_at: Option<DateTime<Utc>> = None;
        for export in exports {
            products_count += json_i64(export, &["itemsCount"]).unwrap_or(0);
            let export_status = json_str(export, &["status"]).unwrap_or("unknown");
            if export_status != "done" {
                status = export_status.to_string();
            }
            let generated = json_str(export, &["generatedAt"]).and_then(parse_rfc3339);
            if generated > last_generated_at {
                last_generated_at = generated;
            }
        }
        Ok(Some(ProductFeedRecord {
            products_count,
            format: json_str(&exports[0], &["format"]).unwrap_or("xml").to_string(),
            status,
            last_generated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn api(endpoint: &str, payload: JsonValue) -> Arc<dyn VendorApi> {
        Arc::new(StaticVendorApi::new().with_response(endpoint, payload))
    }

    #[tokio::test]
    async fn google_campaigns_keep_micros_and_map_status() {
        let api = api(
            "campaigns",
            json!({
                "results": [
                    {
                        "campaign": {"id": "1234567890", "name": "Brand CZ", "status": "ENABLED"},
                        "campaignBudget": {"amountMicros": "50000000"},
                        "customer": {"currencyCode": "CZK"},
                        "metrics": {
                            "impressions": "10432",
                            "clicks": "512",
                            "costMicros": "12340000",
                            "conversions": "21.0"
                        }
                    },
                    {
                        "campaign": {"id": "222", "name": "Paused", "status": "PAUSED"},
                        "metrics": {"impressions": "0", "clicks": "0", "costMicros": "0", "conversions": "0"}
                    }
                ]
            }),
        );
        let campaigns = GoogleAdsAdapter::new(api).fetch_campaigns().await.unwrap();
        assert_eq!(campaigns.len(), 2);
        assert_eq!(campaigns[0].external_id, "1234567890");
        assert_eq!(campaigns[0].status, CampaignStatus::Active);
        assert_eq!(campaigns[0].spend, Spend::Micros(12_340_000));
        assert_eq!(campaigns[0].daily_budget, Some(Spend::Micros(50_000_000)));
        assert_eq!(campaigns[0].impressions, 10_432);
        assert_eq!(campaigns[0].conversions, 21);
        assert_eq!(campaigns[1].status, CampaignStatus::Paused);
        assert_eq!(campaigns[1].daily_budget, None);
    }

    #[tokio::test]
    async fn google_daily_stats_parse_segment_dates() {
        let api = api(
            "campaign_daily_stats",
            json!({
                "results": [{
                    "campaign": {"id": "1234567890"},
                    "segments": {"date": "2026-01-10"},
                    "metrics": {
                        "impressions": "300",
                        "clicks": "12",
                        "costMicros": "2500000",
                        "conversions": "1.0",
                        "conversionsValue": "990.0"
                    }
                }]
            }),
        );
        let stats = GoogleAdsAdapter::new(api)
            .fetch_daily_stats(&DateWindow::open())
            .await
            .unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(stats[0].spend, Spend::Micros(2_500_000));
        assert_eq!(stats[0].revenue, Some(Spend::Major(990.0)));
    }

    #[tokio::test]
    async fn google_keywords_map_match_types() {
        let api = api(
            "keywords",
            json!({
                "results": [{
                    "adGroupCriterion": {"keyword": {"text": "běžecké boty", "matchType": "PHRASE"}},
                    "metrics": {"impressions": "100", "clicks": "7", "costMicros": "900000", "conversions": "0"}
                }]
            }),
        );
        let keywords = GoogleAdsAdapter::new(api)
            .fetch_keywords(&DateWindow::open())
            .await
            .unwrap();
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0].text, "běžecké boty");
        assert_eq!(keywords[0].match_type, MatchType::Phrase);
    }

    #[tokio::test]
    async fn sklik_parses_minor_units_and_compact_dates() {
        let campaigns_api = api(
            "campaigns.list",
            json!({
                "status": 200,
                "campaigns": [{
                    "id": 789,
                    "name": "Sklik brand",
                    "status": "active",
                    "dayBudget": 150000,
                    "stats": {"impressions": 9000, "clicks": 420, "price": 1234500, "conversions": 11}
                }]
            }),
        );
        let campaigns = SklikAdapter::new(campaigns_api).fetch_campaigns().await.unwrap();
        assert_eq!(campaigns[0].external_id, "789");
        assert_eq!(campaigns[0].spend, Spend::MinorUnits(1_234_500));
        assert_eq!(campaigns[0].daily_budget, Some(Spend::MinorUnits(150_000)));
        assert_eq!(campaigns[0].currency, "CZK");

        let stats_api = api(
            "stats.campaigns",
            json!({
                "report": [{
                    "campaignId": 789,
                    "date": "20260110",
                    "impressions": 450,
                    "clicks": 20,
                    "price": 56700,
                    "conversions": 1,
                    "conversionValue": 129900
                }]
            }),
        );
        let stats = SklikAdapter::new(stats_api)
            .fetch_daily_stats(&DateWindow::open())
            .await
            .unwrap();
        assert_eq!(stats[0].date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
        assert_eq!(stats[0].spend, Spend::MinorUnits(56_700));
        assert_eq!(stats[0].revenue, Some(Spend::MinorUnits(129_900)));
    }

    #[tokio::test]
    async fn sklik_suspended_campaign_is_paused() {
        let api = api(
            "campaigns.list",
            json!({"campaigns": [{"id": 1, "name": "x", "status": "suspend"}]}),
        );
        let campaigns = SklikAdapter::new(api).fetch_campaigns().await.unwrap();
        assert_eq!(campaigns[0].status, CampaignStatus::Paused);
        assert_eq!(campaigns[0].spend, Spend::MinorUnits(0));
    }

    #[tokio::test]
    async fn heureka_recomputes_totals_from_daily() {
        let adapter = HeurekaAdapter::new(api(
            "categories",
            json!({"categories": [{"id": 101, "name": "Obuv", "active": true}]}),
        ));
        assert!(adapter.campaign_totals_from_daily());
        let campaigns = adapter.fetch_campaigns().await.unwrap();
        assert_eq!(campaigns[0].external_id, "101");
        assert_eq!(campaigns[0].spend, Spend::ZERO);

        let stats = HeurekaAdapter::new(api(
            "bidding/daily",
            json!({
                "days": [{
                    "categoryId": 101,
                    "date": "2026-01-10",
                    "views": 1500,
                    "clicks": 90,
                    "spend": 123.45,
                    "orders": 3,
                    "orderValue": 4999.0
                }]
            }),
        ))
        .fetch_daily_stats(&DateWindow::open())
        .await
        .unwrap();
        assert_eq!(stats[0].external_id, "101");
        assert_eq!(stats[0].spend, Spend::Major(123.45));
        assert_eq!(stats[0].conversions, 3);
        assert_eq!(stats[0].revenue, Some(Spend::Major(4999.0)));
    }

    #[tokio::test]
    async fn zbozi_uses_the_sentinel_campaign() {
        let api: Arc<dyn VendorApi> = Arc::new(
            StaticVendorApi::new()
                .with_response("shop", json!({"shop": {"name": "Moje Boty", "status": "active"}}))
                .with_response(
                    "shop/stats",
                    json!({"days": [{"date": "2026-01-10", "impressions": 800, "clicks": 40, "spend": 91.2, "conversions": 2}]}),
                )
                .with_response(
                    "shop/feed",
                    json!({"feed": {"itemCount": 1520, "format": "xml", "status": "ok", "lastGeneratedAt": "2026-01-10T03:12:00Z"}}),
                ),
        );
        let adapter = FeedPlatformAdapter::zbozi(api);
        let campaigns = adapter.fetch_campaigns().await.unwrap();
        assert_eq!(campaigns.len(), 1);
        assert_eq!(campaigns[0].external_id, ACCOUNT_CAMPAIGN_ID);
        assert_eq!(campaigns[0].name, "Moje Boty (Zboží.cz)");

        let stats = adapter.fetch_daily_stats(&DateWindow::open()).await.unwrap();
        assert_eq!(stats[0].external_id, ACCOUNT_CAMPAIGN_ID);

        let feed = adapter.fetch_product_feed().await.unwrap().unwrap();
        assert_eq!(feed.products_count, 1520);
        assert!(feed.last_generated_at.is_some());
    }

    #[tokio::test]
    async fn mergado_aggregates_exports_into_one_feed_row() {
        let adapter = MergadoAdapter::new(api(
            "exports",
            json!({
                "exports": [
                    {"name": "heureka-export", "itemsCount": 800, "format": "heureka.xml", "status": "done", "generatedAt": "2026-01-09T02:00:00Z"},
                    {"name": "zbozi-export", "itemsCount": 750, "format": "zbozi.xml", "status": "done", "generatedAt": "2026-01-10T02:00:00Z"}
                ]
            }),
        ));
        assert!(adapter.fetch_campaigns().await.unwrap().is_empty());
        let feed = adapter.fetch_product_feed().await.unwrap().unwrap();
        assert_eq!(feed.products_count, 1550);
        assert_eq!(feed.status, "done");
        assert_eq!(
            feed.last_generated_at.unwrap(),
            parse_rfc3339("2026-01-10T02:00:00Z").unwrap()
        );
    }

    #[tokio::test]
    async fn missing_canned_endpoint_is_an_error() {
        let adapter = GoogleAdsAdapter::new(Arc::new(StaticVendorApi::new()));
        let err = adapter.fetch_campaigns().await.unwrap_err();
        assert!(err.to_string().contains("no canned response"));
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_not_empty() {
        let adapter = GoogleAdsAdapter::new(api("campaigns", json!({"unexpected": []})));
        let err = adapter.fetch_campaigns().await.unwrap_err();
        assert!(err.to_string().contains("missing `results`"));
    }

    #[test]
    fn lenient_numeric_parsing_accepts_strings() {
        let value = json!({"a": "123", "b": 7, "c": "2.0", "d": "12.5"});
        assert_eq!(json_i64(&value, &["a"]), Some(123));
        assert_eq!(json_i64(&value, &["b"]), Some(7));
        assert_eq!(json_i64(&value, &["c"]), Some(2));
        assert_eq!(json_f64(&value, &["d"]), Some(12.5));
        assert_eq!(json_i64(&value, &["missing"]), None);
    }

    #[test]
    fn ranged_request_carries_window_bounds() {
        let window = DateWindow::new(
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        );
        let request = ranged_request("stats", &window);
        assert_eq!(request.params.len(), 2);
        assert_eq!(request.params[0], ("date_from".to_string(), "2026-01-01".to_string()));
        assert_eq!(request.params[1], ("date_to".to_string(), "2026-01-31".to_string()));
        assert!(ranged_request("stats", &DateWindow::open()).params.is_empty());
    }
}
