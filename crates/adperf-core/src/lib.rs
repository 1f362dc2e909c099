//! Core domain model for the adperf sync-and-attribution engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "adperf-core";

/// Sentinel `external_id` for platforms that expose no campaign concept,
/// only account-level aggregates. Exactly one synthetic campaign row per
/// such platform carries this id.
pub const ACCOUNT_CAMPAIGN_ID: &str = "account";

/// Closed set of advertising platforms. Adding a platform means adding a
/// variant here, an adapter, and extending the orchestrator's explicit
/// list -- platform membership is never inferred from data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    GoogleAds,
    Sklik,
    Heureka,
    Zbozi,
    Glami,
    Mergado,
}

/// Fixed `(utm_source, utm_medium)` convention for one platform. This is
/// platform metadata, not derived from vendor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UtmKey {
    pub source: &'static str,
    pub medium: &'static str,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::GoogleAds,
        Platform::Sklik,
        Platform::Heureka,
        Platform::Zbozi,
        Platform::Glami,
        Platform::Mergado,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::GoogleAds => "google_ads",
            Platform::Sklik => "sklik",
            Platform::Heureka => "heureka",
            Platform::Zbozi => "zbozi",
            Platform::Glami => "glami",
            Platform::Mergado => "mergado",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::GoogleAds => "Google Ads",
            Platform::Sklik => "Sklik",
            Platform::Heureka => "Heureka",
            Platform::Zbozi => "Zboží.cz",
            Platform::Glami => "Glami",
            Platform::Mergado => "Mergado",
        }
    }

    /// UTM convention used in storefront URLs for this platform's traffic.
    /// Mergado manages feeds and drives no paid clicks of its own, so it
    /// has no UTM identity.
    pub fn utm_key(&self) -> Option<UtmKey> {
        match self {
            Platform::GoogleAds => Some(UtmKey { source: "google", medium: "cpc" }),
            Platform::Sklik => Some(UtmKey { source: "seznam", medium: "cpc" }),
            Platform::Heureka => Some(UtmKey { source: "heureka", medium: "cpc" }),
            Platform::Zbozi => Some(UtmKey { source: "zbozi", medium: "cpc" }),
            Platform::Glami => Some(UtmKey { source: "glami", medium: "cpc" }),
            Platform::Mergado => None,
        }
    }

    /// Platforms with no campaign concept; they sync a single synthetic
    /// campaign row keyed by [`ACCOUNT_CAMPAIGN_ID`].
    pub fn is_feed_only(&self) -> bool {
        matches!(self, Platform::Zbozi | Platform::Glami)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlatform(pub String);

impl fmt::Display for UnknownPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown platform: {}", self.0)
    }
}

impl std::error::Error for UnknownPlatform {}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_ads" => Ok(Platform::GoogleAds),
            "sklik" => Ok(Platform::Sklik),
            "heureka" => Ok(Platform::Heureka),
            "zbozi" => Ok(Platform::Zbozi),
            "glami" => Ok(Platform::Glami),
            "mergado" => Ok(Platform::Mergado),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown campaign status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Active,
    Paused,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Active => "active",
            CampaignStatus::Paused => "paused",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CampaignStatus::Active),
            "paused" => Ok(CampaignStatus::Paused),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Phrase,
    Broad,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Phrase => "phrase",
            MatchType::Broad => "broad",
        }
    }

    /// Lenient vendor-string parse; unrecognized match types fall back to
    /// broad, which is what every vendor defaults to.
    pub fn from_vendor(s: &str) -> MatchType {
        match s.to_ascii_lowercase().as_str() {
            "exact" => MatchType::Exact,
            "phrase" => MatchType::Phrase,
            _ => MatchType::Broad,
        }
    }
}

/// Money amount in the platform's native unit. Adapters hand records over
/// in native units; the store normalizes to the major currency unit on
/// write.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Spend {
    /// Millionths of the major unit (Google Ads).
    Micros(i64),
    /// Hundredths of the major unit (Sklik haléře).
    MinorUnits(i64),
    /// Major currency unit already.
    Major(f64),
}

impl Spend {
    pub const ZERO: Spend = Spend::Major(0.0);

    pub fn as_major(self) -> f64 {
        match self {
            Spend::Micros(v) => v as f64 / 1_000_000.0,
            Spend::MinorUnits(v) => v as f64 / 100.0,
            Spend::Major(v) => v,
        }
    }
}

impl Default for Spend {
    fn default() -> Self {
        Spend::ZERO
    }
}

/// Normalized campaign handed from an adapter into the store. Metric
/// fields hold vendor-reported campaign totals where the vendor exposes
/// them; daily-granularity platforms leave them zero and get a recompute
/// pass from their daily stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub external_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub daily_budget: Option<Spend>,
    pub currency: String,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Spend,
    pub conversions: i64,
}

/// One calendar day of campaign metrics, still keyed by the vendor's
/// campaign id; the store resolves it to the internal row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStatRecord {
    pub external_id: String,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Spend,
    pub conversions: i64,
    pub revenue: Option<Spend>,
}

/// Denormalized keyword row; platform-scoped, not campaign-scoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRecord {
    pub text: String,
    pub match_type: MatchType,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: Spend,
    pub conversions: i64,
}

/// Summary of one feed platform's product feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductFeedRecord {
    pub products_count: i64,
    pub format: String,
    pub status: String,
    pub last_generated_at: Option<DateTime<Utc>>,
}

/// Optional inclusive date range filter, open on either end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_open(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(from) = self.from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if date > to {
                return false;
            }
        }
        true
    }

    pub fn contains_ts(&self, ts: DateTime<Utc>) -> bool {
        self.contains(ts.date_naive())
    }
}

/// ctr = clicks / impressions, 0 when there were no impressions.
pub fn click_through_rate(clicks: i64, impressions: i64) -> f64 {
    if impressions <= 0 {
        0.0
    } else {
        clicks as f64 / impressions as f64
    }
}

/// cpc = spend / clicks, 0 when there were no clicks.
pub fn cost_per_click(spend: f64, clicks: i64) -> f64 {
    if clicks <= 0 {
        0.0
    } else {
        spend / clicks as f64
    }
}

/// roas = revenue / spend, 0 when nothing was spent.
pub fn return_on_ad_spend(revenue: f64, spend: f64) -> f64 {
    if spend <= 0.0 {
        0.0
    } else {
        revenue / spend
    }
}
