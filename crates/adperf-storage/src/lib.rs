//! Canonical ad-performance store: Postgres (sqlx) and in-memory backends
//! behind one `AdStore` trait.
//!
//! Every write is an upsert keyed by a natural business key -- `(platform,
//! external_id)` for campaigns, `(campaign_id, date)` for daily stats, the
//! UTM triple for mappings -- so repeated sync runs are idempotent. The
//! store also owns unit normalization: adapters hand over platform-native
//! `Spend` values and the major-unit conversion happens on write.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use thiserror::Error;
use tracing::warn;

use adperf_core::{
    click_through_rate, cost_per_click, CampaignRecord, CampaignStatus, DailyStatRecord,
    DateWindow, KeywordRecord, MatchType, Platform, ProductFeedRecord, Spend,
};

pub const CRATE_NAME: &str = "adperf-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("row carries unknown platform `{0}`")]
    UnknownPlatform(String),
    #[error("row carries unknown status `{0}`")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "running" => Ok(SyncStatus::Running),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(StoreError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: i64,
    pub platform: Platform,
    pub external_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub roas: f64,
    pub daily_budget: Option<f64>,
    pub currency: String,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyStat {
    pub id: i64,
    pub campaign_id: i64,
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UtmMapping {
    pub id: i64,
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub platform: Platform,
    pub campaign_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncLogEntry {
    pub id: i64,
    pub platform: Platform,
    pub sync_type: String,
    pub status: SyncStatus,
    pub campaigns_synced: i64,
    pub stats_synced: i64,
    pub error_message: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Keyword {
    pub id: i64,
    pub platform: Platform,
    pub keyword: String,
    pub match_type: MatchType,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductFeed {
    pub id: i64,
    pub platform: Platform,
    pub products_count: i64,
    pub format: String,
    pub status: String,
    pub last_generated_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformTotals {
    pub platform: Platform,
    pub campaigns: i64,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyTotals {
    pub date: NaiveDate,
    pub impressions: i64,
    pub clicks: i64,
    pub spend: f64,
    pub conversions: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlatformRoas {
    pub platform: Platform,
    pub spend: f64,
    pub revenue: f64,
    pub orders: i64,
    pub roas: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RevenueSummary {
    pub revenue: f64,
    pub orders: i64,
}

/// Abstract relational store for the sync-and-attribution engine. Injected
/// into the orchestrator and every sync procedure so tests can substitute
/// the in-memory backend.
#[async_trait]
pub trait AdStore: Send + Sync {
    /// Insert or update by `(platform, external_id)`, returning the internal
    /// campaign id. Overwrites name/status/metrics/budget, refreshes
    /// synced_at, never resets created_at, and never touches the
    /// attribution columns (revenue/roas).
    async fn upsert_campaign(
        &self,
        platform: Platform,
        record: &CampaignRecord,
    ) -> Result<i64, StoreError>;

    async fn campaign_id(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<i64>, StoreError>;

    /// Insert or update by `(campaign_id, date)`; a resync of the same day
    /// replaces, never double-counts.
    async fn upsert_daily_stat(
        &self,
        campaign_id: i64,
        stat: &DailyStatRecord,
    ) -> Result<(), StoreError>;

    /// Re-sum the campaign's daily stats onto the campaign row. Pure re-sum,
    /// safe to call repeatedly; used by platforms whose vendor API exposes
    /// only daily granularity.
    async fn recompute_campaign_totals(&self, campaign_id: i64) -> Result<(), StoreError>;

    /// Upsert by the UTM triple; `platform` is overwritten last-writer-wins.
    async fn ensure_utm_mapping(
        &self,
        platform: Platform,
        source: &str,
        medium: &str,
        campaign: &str,
    ) -> Result<(), StoreError>;

    /// Back-fill `campaign_id` on the mapping row from the owning campaign.
    /// Tolerates a missing mapping (no-op) and a missing campaign (leaves
    /// campaign_id null for a later call).
    async fn resolve_utm_campaign_id(
        &self,
        source: &str,
        medium: &str,
        campaign: &str,
    ) -> Result<(), StoreError>;

    /// Replace the platform's keyword rows wholesale.
    async fn replace_keywords(
        &self,
        platform: Platform,
        keywords: &[KeywordRecord],
    ) -> Result<(), StoreError>;

    async fn upsert_product_feed(
        &self,
        platform: Platform,
        feed: &ProductFeedRecord,
    ) -> Result<(), StoreError>;

    /// Open a sync-log entry with status `running`, returning its id.
    async fn open_sync_log(
        &self,
        platform: Platform,
        window: &DateWindow,
    ) -> Result<i64, StoreError>;

    async fn complete_sync_log(
        &self,
        log_id: i64,
        campaigns_synced: i64,
        stats_synced: i64,
    ) -> Result<(), StoreError>;

    async fn fail_sync_log(&self, log_id: i64, error_message: &str) -> Result<(), StoreError>;

    /// Newest-first sync history, optionally filtered to one platform.
    async fn sync_history(
        &self,
        platform: Option<Platform>,
        limit: i64,
    ) -> Result<Vec<SyncLogEntry>, StoreError>;

    async fn all_campaigns(&self) -> Result<Vec<Campaign>, StoreError>;

    /// Revenue and order count attributed to one campaign through the UTM
    /// join, restricted to orders created inside the window.
    async fn attributed_revenue(
        &self,
        campaign_id: i64,
        window: &DateWindow,
    ) -> Result<RevenueSummary, StoreError>;

    async fn write_campaign_attribution(
        &self,
        campaign_id: i64,
        revenue: f64,
        roas: f64,
    ) -> Result<(), StoreError>;

    /// Lifetime spend/revenue/orders rollup per platform (no date filter).
    async fn roas_by_platform(&self) -> Result<Vec<PlatformRoas>, StoreError>;

    async fn platform_totals(&self) -> Result<Vec<PlatformTotals>, StoreError>;

    async fn daily_totals(
        &self,
        days: i64,
        platform: Option<Platform>,
    ) -> Result<Vec<DailyTotals>, StoreError>;

    async fn top_campaigns(&self, limit: i64) -> Result<Vec<Campaign>, StoreError>;
}

fn parse_platform(raw: &str) -> Result<Platform, StoreError> {
    Platform::from_str(raw).map_err(|_| StoreError::UnknownPlatform(raw.to_string()))
}

fn parse_status(raw: &str) -> Result<CampaignStatus, StoreError> {
    CampaignStatus::from_str(raw).map_err(|_| StoreError::UnknownStatus(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Postgres backend
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgAdStore {
    pool: PgPool,
}

impl PgAdStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn campaign_from_row(row: &PgRow) -> Result<Campaign, StoreError> {
        let platform: String = row.try_get("platform")?;
        let status: String = row.try_get("status")?;
        Ok(Campaign {
            id: row.try_get("id")?,
            platform: parse_platform(&platform)?,
            external_id: row.try_get("external_id")?,
            name: row.try_get("name")?,
            status: parse_status(&status)?,
            impressions: row.try_get("impressions")?,
            clicks: row.try_get("clicks")?,
            spend: row.try_get("spend")?,
            conversions: row.try_get("conversions")?,
            revenue: row.try_get("revenue")?,
            ctr: row.try_get("ctr")?,
            cpc: row.try_get("cpc")?,
            roas: row.try_get("roas")?,
            daily_budget: row.try_get("daily_budget")?,
            currency: row.try_get("currency")?,
            synced_at: row.try_get("synced_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AdStore for PgAdStore {
    async fn upsert_campaign(
        &self,
        platform: Platform,
        record: &CampaignRecord,
    ) -> Result<i64, StoreError> {
        let spend = record.spend.as_major();
        let row = sqlx::query(
            r#"
            INSERT INTO ad_campaigns
                (platform, external_id, name, status, impressions, clicks, spend,
                 conversions, ctr, cpc, daily_budget, currency, synced_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW())
            ON CONFLICT (platform, external_id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                impressions = EXCLUDED.impressions,
                clicks = EXCLUDED.clicks,
                spend = EXCLUDED.spend,
                conversions = EXCLUDED.conversions,
                ctr = EXCLUDED.ctr,
                cpc = EXCLUDED.cpc,
                daily_budget = EXCLUDED.daily_budget,
                currency = EXCLUDED.currency,
                synced_at = NOW(),
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(platform.as_str())
        .bind(&record.external_id)
        .bind(&record.name)
        .bind(record.status.as_str())
        .bind(record.impressions)
        .bind(record.clicks)
        .bind(spend)
        .bind(record.conversions)
        .bind(click_through_rate(record.clicks, record.impressions))
        .bind(cost_per_click(spend, record.clicks))
        .bind(record.daily_budget.map(Spend::as_major))
        .bind(&record.currency)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn campaign_id(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query(
            "SELECT id FROM ad_campaigns WHERE platform = $1 AND external_id = $2",
        )
        .bind(platform.as_str())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| r.try_get("id")).transpose().map_err(Into::into)
    }

    async fn upsert_daily_stat(
        &self,
        campaign_id: i64,
        stat: &DailyStatRecord,
    ) -> Result<(), StoreError> {
        let spend = stat.spend.as_major();
        sqlx::query(
            r#"
            INSERT INTO campaign_daily_stats
                (campaign_id, date, impressions, clicks, spend, conversions, revenue, ctr, cpc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (campaign_id, date) DO UPDATE SET
                impressions = EXCLUDED.impressions,
                clicks = EXCLUDED.clicks,
                spend = EXCLUDED.spend,
                conversions = EXCLUDED.conversions,
                revenue = EXCLUDED.revenue,
                ctr = EXCLUDED.ctr,
                cpc = EXCLUDED.cpc
            "#,
        )
        .bind(campaign_id)
        .bind(stat.date)
        .bind(stat.impressions)
        .bind(stat.clicks)
        .bind(spend)
        .bind(stat.conversions)
        .bind(stat.revenue.map(Spend::as_major).unwrap_or(0.0))
        .bind(click_through_rate(stat.clicks, stat.impressions))
        .bind(cost_per_click(spend, stat.clicks))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recompute_campaign_totals(&self, campaign_id: i64) -> Result<(), StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(impressions), 0)::bigint AS impressions,
                   COALESCE(SUM(clicks), 0)::bigint AS clicks,
                   COALESCE(SUM(spend), 0)::float8 AS spend,
                   COALESCE(SUM(conversions), 0)::bigint AS conversions
              FROM campaign_daily_stats
             WHERE campaign_id = $1
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        let impressions: i64 = row.try_get("impressions")?;
        let clicks: i64 = row.try_get("clicks")?;
        let spend: f64 = row.try_get("spend")?;
        let conversions: i64 = row.try_get("conversions")?;

        sqlx::query(
            r#"
            UPDATE ad_campaigns
               SET impressions = $2,
                   clicks = $3,
                   spend = $4,
                   conversions = $5,
                   ctr = $6,
                   cpc = $7,
                   updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(campaign_id)
        .bind(impressions)
        .bind(clicks)
        .bind(spend)
        .bind(conversions)
        .bind(click_through_rate(clicks, impressions))
        .bind(cost_per_click(spend, clicks))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_utm_mapping(
        &self,
        platform: Platform,
        source: &str,
        medium: &str,
        campaign: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO utm_ad_mapping (utm_source, utm_medium, utm_campaign, platform)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (utm_source, utm_medium, utm_campaign) DO UPDATE SET
                platform = EXCLUDED.platform,
                updated_at = NOW()
            "#,
        )
        .bind(source)
        .bind(medium)
        .bind(campaign)
        .bind(platform.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve_utm_campaign_id(
        &self,
        source: &str,
        medium: &str,
        campaign: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE utm_ad_mapping m
               SET campaign_id = c.id,
                   updated_at = NOW()
              FROM ad_campaigns c
             WHERE m.utm_source = $1
               AND m.utm_medium = $2
               AND m.utm_campaign = $3
               AND c.platform = m.platform
               AND c.external_id = m.utm_campaign
               AND m.campaign_id IS DISTINCT FROM c.id
            "#,
        )
        .bind(source)
        .bind(medium)
        .bind(campaign)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_keywords(
        &self,
        platform: Platform,
        keywords: &[KeywordRecord],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM ad_keywords WHERE platform = $1")
            .bind(platform.as_str())
            .execute(&mut *tx)
            .await?;
        for keyword in keywords {
            sqlx::query(
                r#"
                INSERT INTO ad_keywords
                    (platform, keyword, match_type, impressions, clicks, spend, conversions)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(platform.as_str())
            .bind(&keyword.text)
            .bind(keyword.match_type.as_str())
            .bind(keyword.impressions)
            .bind(keyword.clicks)
            .bind(keyword.spend.as_major())
            .bind(keyword.conversions)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_product_feed(
        &self,
        platform: Platform,
        feed: &ProductFeedRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO product_feeds (platform, products_count, format, status, last_generated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (platform) DO UPDATE SET
                products_count = EXCLUDED.products_count,
                format = EXCLUDED.format,
                status = EXCLUDED.status,
                last_generated_at = EXCLUDED.last_generated_at,
                updated_at = NOW()
            "#,
        )
        .bind(platform.as_str())
        .bind(feed.products_count)
        .bind(&feed.format)
        .bind(&feed.status)
        .bind(feed.last_generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_sync_log(
        &self,
        platform: Platform,
        window: &DateWindow,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO ad_sync_log (platform, sync_type, status, date_from, date_to)
            VALUES ($1, 'full', 'running', $2, $3)
            RETURNING id
            "#,
        )
        .bind(platform.as_str())
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn complete_sync_log(
        &self,
        log_id: i64,
        campaigns_synced: i64,
        stats_synced: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ad_sync_log
               SET status = 'completed',
                   campaigns_synced = $2,
                   stats_synced = $3,
                   completed_at = NOW()
             WHERE id = $1
               AND status = 'running'
            "#,
        )
        .bind(log_id)
        .bind(campaigns_synced)
        .bind(stats_synced)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(log_id, "sync log entry already terminal; completion skipped");
        }
        Ok(())
    }

    async fn fail_sync_log(&self, log_id: i64, error_message: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ad_sync_log
               SET status = 'failed',
                   error_message = $2,
                   completed_at = NOW()
             WHERE id = $1
               AND status = 'running'
            "#,
        )
        .bind(log_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            warn!(log_id, "sync log entry already terminal; failure skipped");
        }
        Ok(())
    }

    async fn sync_history(
        &self,
        platform: Option<Platform>,
        limit: i64,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, platform, sync_type, status, campaigns_synced, stats_synced,
                   error_message, date_from, date_to, started_at, completed_at
              FROM ad_sync_log
             WHERE ($1::text IS NULL OR platform = $1)
             ORDER BY started_at DESC, id DESC
             LIMIT $2
            "#,
        )
        .bind(platform.map(|p| p.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let platform: String = row.try_get("platform")?;
            let status: String = row.try_get("status")?;
            out.push(SyncLogEntry {
                id: row.try_get("id")?,
                platform: parse_platform(&platform)?,
                sync_type: row.try_get("sync_type")?,
                status: SyncStatus::parse(&status)?,
                campaigns_synced: row.try_get("campaigns_synced")?,
                stats_synced: row.try_get("stats_synced")?,
                error_message: row.try_get("error_message")?,
                date_from: row.try_get("date_from")?,
                date_to: row.try_get("date_to")?,
                started_at: row.try_get("started_at")?,
                completed_at: row.try_get("completed_at")?,
            });
        }
        Ok(out)
    }

    async fn all_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let rows = sqlx::query("SELECT * FROM ad_campaigns ORDER BY platform, external_id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::campaign_from_row).collect()
    }

    async fn attributed_revenue(
        &self,
        campaign_id: i64,
        window: &DateWindow,
    ) -> Result<RevenueSummary, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(o.total_price), 0)::float8 AS revenue,
                   COUNT(*)::bigint AS orders
              FROM orders o
              JOIN utm_ad_mapping m
                ON m.utm_source = o.utm_source
               AND m.utm_medium = o.utm_medium
               AND m.utm_campaign = o.utm_campaign
             WHERE m.campaign_id = $1
               AND ($2::date IS NULL OR o.created_at >= $2::date)
               AND ($3::date IS NULL OR o.created_at < ($3::date + 1))
            "#,
        )
        .bind(campaign_id)
        .bind(window.from)
        .bind(window.to)
        .fetch_one(&self.pool)
        .await?;
        Ok(RevenueSummary {
            revenue: row.try_get("revenue")?,
            orders: row.try_get("orders")?,
        })
    }

    async fn write_campaign_attribution(
        &self,
        campaign_id: i64,
        revenue: f64,
        roas: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE ad_campaigns
               SET revenue = $2,
                   roas = $3,
                   updated_at = NOW()
             WHERE id = $1
            "#,
        )
        .bind(campaign_id)
        .bind(revenue)
        .bind(roas)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn roas_by_platform(&self) -> Result<Vec<PlatformRoas>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.platform,
                   COALESCE(SUM(c.spend), 0)::float8 AS spend,
                   COALESCE(SUM(r.revenue), 0)::float8 AS revenue,
                   COALESCE(SUM(r.orders), 0)::bigint AS orders
              FROM ad_campaigns c
              LEFT JOIN LATERAL (
                    SELECT SUM(o.total_price)::float8 AS revenue,
                           COUNT(*)::bigint AS orders
                      FROM utm_ad_mapping m
                      JOIN orders o
                        ON o.utm_source = m.utm_source
                       AND o.utm_medium = m.utm_medium
                       AND o.utm_campaign = m.utm_campaign
                     WHERE m.campaign_id = c.id
                   ) r ON TRUE
             GROUP BY c.platform
             ORDER BY c.platform
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let platform: String = row.try_get("platform")?;
            let spend: f64 = row.try_get("spend")?;
            let revenue: f64 = row.try_get("revenue")?;
            out.push(PlatformRoas {
                platform: parse_platform(&platform)?,
                spend,
                revenue,
                orders: row.try_get("orders")?,
                roas: adperf_core::return_on_ad_spend(revenue, spend),
            });
        }
        Ok(out)
    }

    async fn platform_totals(&self) -> Result<Vec<PlatformTotals>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT platform,
                   COUNT(*)::bigint AS campaigns,
                   COALESCE(SUM(impressions), 0)::bigint AS impressions,
                   COALESCE(SUM(clicks), 0)::bigint AS clicks,
                   COALESCE(SUM(spend), 0)::float8 AS spend,
                   COALESCE(SUM(conversions), 0)::bigint AS conversions,
                   COALESCE(SUM(revenue), 0)::float8 AS revenue
              FROM ad_campaigns
             GROUP BY platform
             ORDER BY platform
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let platform: String = row.try_get("platform")?;
            out.push(PlatformTotals {
                platform: parse_platform(&platform)?,
                campaigns: row.try_get("campaigns")?,
                impressions: row.try_get("impressions")?,
                clicks: row.try_get("clicks")?,
                spend: row.try_get("spend")?,
                conversions: row.try_get("conversions")?,
                revenue: row.try_get("revenue")?,
            });
        }
        Ok(out)
    }

    async fn daily_totals(
        &self,
        days: i64,
        platform: Option<Platform>,
    ) -> Result<Vec<DailyTotals>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT s.date,
                   COALESCE(SUM(s.impressions), 0)::bigint AS impressions,
                   COALESCE(SUM(s.clicks), 0)::bigint AS clicks,
                   COALESCE(SUM(s.spend), 0)::float8 AS spend,
                   COALESCE(SUM(s.conversions), 0)::bigint AS conversions,
                   COALESCE(SUM(s.revenue), 0)::float8 AS revenue
              FROM campaign_daily_stats s
              JOIN ad_campaigns c ON c.id = s.campaign_id
             WHERE s.date > CURRENT_DATE - $1::int
               AND ($2::text IS NULL OR c.platform = $2)
             GROUP BY s.date
             ORDER BY s.date
            "#,
        )
        .bind(days as i32)
        .bind(platform.map(|p| p.as_str()))
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(DailyTotals {
                date: row.try_get("date")?,
                impressions: row.try_get("impressions")?,
                clicks: row.try_get("clicks")?,
                spend: row.try_get("spend")?,
                conversions: row.try_get("conversions")?,
                revenue: row.try_get("revenue")?,
            });
        }
        Ok(out)
    }

    async fn top_campaigns(&self, limit: i64) -> Result<Vec<Campaign>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM ad_campaigns WHERE spend > 0 ORDER BY spend DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::campaign_from_row).collect()
    }
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Storefront order as seen by the attribution join. Only the in-memory
/// backend materializes these; Postgres reads the externally owned
/// `orders` table directly.
#[derive(Debug, Clone)]
pub struct SeedOrder {
    pub utm_source: String,
    pub utm_medium: String,
    pub utm_campaign: String,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemInner {
    next_campaign_id: i64,
    next_stat_id: i64,
    next_mapping_id: i64,
    next_log_id: i64,
    next_keyword_id: i64,
    next_feed_id: i64,
    campaigns: Vec<Campaign>,
    daily_stats: Vec<DailyStat>,
    mappings: Vec<UtmMapping>,
    sync_log: Vec<SyncLogEntry>,
    keywords: Vec<Keyword>,
    feeds: Vec<ProductFeed>,
    orders: Vec<SeedOrder>,
}

/// In-memory `AdStore` with the same upsert semantics as the Postgres
/// backend. Backs every cross-crate test and credential-less local runs.
#[derive(Default)]
pub struct MemAdStore {
    inner: Mutex<MemInner>,
}

impl MemAdStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemInner> {
        self.inner.lock().expect("store mutex poisoned")
    }

    pub fn seed_order(&self, order: SeedOrder) {
        self.lock().orders.push(order);
    }

    pub fn campaign(&self, platform: Platform, external_id: &str) -> Option<Campaign> {
        self.lock()
            .campaigns
            .iter()
            .find(|c| c.platform == platform && c.external_id == external_id)
            .cloned()
    }

    pub fn mapping(&self, source: &str, medium: &str, campaign: &str) -> Option<UtmMapping> {
        self.lock()
            .mappings
            .iter()
            .find(|m| {
                m.utm_source == source && m.utm_medium == medium && m.utm_campaign == campaign
            })
            .cloned()
    }

    pub fn daily_stat_rows(&self) -> Vec<DailyStat> {
        self.lock().daily_stats.clone()
    }

    pub fn keyword_rows(&self, platform: Platform) -> Vec<Keyword> {
        self.lock()
            .keywords
            .iter()
            .filter(|k| k.platform == platform)
            .cloned()
            .collect()
    }

    pub fn product_feed(&self, platform: Platform) -> Option<ProductFeed> {
        self.lock()
            .feeds
            .iter()
            .find(|f| f.platform == platform)
            .cloned()
    }
}

impl MemInner {
    fn attributed(&self, campaign_id: i64, window: &DateWindow) -> RevenueSummary {
        let mut summary = RevenueSummary::default();
        for order in &self.orders {
            let matched = self.mappings.iter().any(|m| {
                m.campaign_id == Some(campaign_id)
                    && m.utm_source == order.utm_source
                    && m.utm_medium == order.utm_medium
                    && m.utm_campaign == order.utm_campaign
            });
            if matched && window.contains_ts(order.created_at) {
                summary.revenue += order.total_price;
                summary.orders += 1;
            }
        }
        summary
    }
}

#[async_trait]
impl AdStore for MemAdStore {
    async fn upsert_campaign(
        &self,
        platform: Platform,
        record: &CampaignRecord,
    ) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let spend = record.spend.as_major();
        let ctr = click_through_rate(record.clicks, record.impressions);
        let cpc = cost_per_click(spend, record.clicks);

        if let Some(existing) = inner
            .campaigns
            .iter_mut()
            .find(|c| c.platform == platform && c.external_id == record.external_id)
        {
            existing.name = record.name.clone();
            existing.status = record.status;
            existing.impressions = record.impressions;
            existing.clicks = record.clicks;
            existing.spend = spend;
            existing.conversions = record.conversions;
            existing.ctr = ctr;
            existing.cpc = cpc;
            existing.daily_budget = record.daily_budget.map(Spend::as_major);
            existing.currency = record.currency.clone();
            existing.synced_at = Some(now);
            existing.updated_at = now;
            return Ok(existing.id);
        }

        inner.next_campaign_id += 1;
        let id = inner.next_campaign_id;
        inner.campaigns.push(Campaign {
            id,
            platform,
            external_id: record.external_id.clone(),
            name: record.name.clone(),
            status: record.status,
            impressions: record.impressions,
            clicks: record.clicks,
            spend,
            conversions: record.conversions,
            revenue: 0.0,
            ctr,
            cpc,
            roas: 0.0,
            daily_budget: record.daily_budget.map(Spend::as_major),
            currency: record.currency.clone(),
            synced_at: Some(now),
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn campaign_id(
        &self,
        platform: Platform,
        external_id: &str,
    ) -> Result<Option<i64>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .campaigns
            .iter()
            .find(|c| c.platform == platform && c.external_id == external_id)
            .map(|c| c.id))
    }

    async fn upsert_daily_stat(
        &self,
        campaign_id: i64,
        stat: &DailyStatRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let spend = stat.spend.as_major();
        let revenue = stat.revenue.map(Spend::as_major).unwrap_or(0.0);
        let ctr = click_through_rate(stat.clicks, stat.impressions);
        let cpc = cost_per_click(spend, stat.clicks);

        if let Some(existing) = inner
            .daily_stats
            .iter_mut()
            .find(|s| s.campaign_id == campaign_id && s.date == stat.date)
        {
            existing.impressions = stat.impressions;
            existing.clicks = stat.clicks;
            existing.spend = spend;
            existing.conversions = stat.conversions;
            existing.revenue = revenue;
            existing.ctr = ctr;
            existing.cpc = cpc;
            return Ok(());
        }

        inner.next_stat_id += 1;
        let id = inner.next_stat_id;
        inner.daily_stats.push(DailyStat {
            id,
            campaign_id,
            date: stat.date,
            impressions: stat.impressions,
            clicks: stat.clicks,
            spend,
            conversions: stat.conversions,
            revenue,
            ctr,
            cpc,
        });
        Ok(())
    }

    async fn recompute_campaign_totals(&self, campaign_id: i64) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let mut impressions = 0i64;
        let mut clicks = 0i64;
        let mut spend = 0.0f64;
        let mut conversions = 0i64;
        for stat in inner.daily_stats.iter().filter(|s| s.campaign_id == campaign_id) {
            impressions += stat.impressions;
            clicks += stat.clicks;
            spend += stat.spend;
            conversions += stat.conversions;
        }
        if let Some(campaign) = inner.campaigns.iter_mut().find(|c| c.id == campaign_id) {
            campaign.impressions = impressions;
            campaign.clicks = clicks;
            campaign.spend = spend;
            campaign.conversions = conversions;
            campaign.ctr = click_through_rate(clicks, impressions);
            campaign.cpc = cost_per_click(spend, clicks);
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ensure_utm_mapping(
        &self,
        platform: Platform,
        source: &str,
        medium: &str,
        campaign: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(existing) = inner.mappings.iter_mut().find(|m| {
            m.utm_source == source && m.utm_medium == medium && m.utm_campaign == campaign
        }) {
            existing.platform = platform;
            return Ok(());
        }
        inner.next_mapping_id += 1;
        let id = inner.next_mapping_id;
        inner.mappings.push(UtmMapping {
            id,
            utm_source: source.to_string(),
            utm_medium: medium.to_string(),
            utm_campaign: campaign.to_string(),
            platform,
            campaign_id: None,
        });
        Ok(())
    }

    async fn resolve_utm_campaign_id(
        &self,
        source: &str,
        medium: &str,
        campaign: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let resolved = inner
            .mappings
            .iter()
            .find(|m| {
                m.utm_source == source && m.utm_medium == medium && m.utm_campaign == campaign
            })
            .and_then(|m| {
                inner
                    .campaigns
                    .iter()
                    .find(|c| c.platform == m.platform && c.external_id == m.utm_campaign)
                    .map(|c| c.id)
            });
        if let Some(campaign_id) = resolved {
            if let Some(mapping) = inner.mappings.iter_mut().find(|m| {
                m.utm_source == source && m.utm_medium == medium && m.utm_campaign == campaign
            }) {
                mapping.campaign_id = Some(campaign_id);
            }
        }
        Ok(())
    }

    async fn replace_keywords(
        &self,
        platform: Platform,
        keywords: &[KeywordRecord],
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.keywords.retain(|k| k.platform != platform);
        for keyword in keywords {
            inner.next_keyword_id += 1;
            let id = inner.next_keyword_id;
            inner.keywords.push(Keyword {
                id,
                platform,
                keyword: keyword.text.clone(),
                match_type: keyword.match_type,
                impressions: keyword.impressions,
                clicks: keyword.clicks,
                spend: keyword.spend.as_major(),
                conversions: keyword.conversions,
            });
        }
        Ok(())
    }

    async fn upsert_product_feed(
        &self,
        platform: Platform,
        feed: &ProductFeedRecord,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner.feeds.iter_mut().find(|f| f.platform == platform) {
            existing.products_count = feed.products_count;
            existing.format = feed.format.clone();
            existing.status = feed.status.clone();
            existing.last_generated_at = feed.last_generated_at;
            existing.updated_at = now;
            return Ok(());
        }
        inner.next_feed_id += 1;
        let id = inner.next_feed_id;
        inner.feeds.push(ProductFeed {
            id,
            platform,
            products_count: feed.products_count,
            format: feed.format.clone(),
            status: feed.status.clone(),
            last_generated_at: feed.last_generated_at,
            updated_at: now,
        });
        Ok(())
    }

    async fn open_sync_log(
        &self,
        platform: Platform,
        window: &DateWindow,
    ) -> Result<i64, StoreError> {
        let mut inner = self.lock();
        inner.next_log_id += 1;
        let id = inner.next_log_id;
        inner.sync_log.push(SyncLogEntry {
            id,
            platform,
            sync_type: "full".to_string(),
            status: SyncStatus::Running,
            campaigns_synced: 0,
            stats_synced: 0,
            error_message: None,
            date_from: window.from,
            date_to: window.to,
            started_at: Utc::now(),
            completed_at: None,
        });
        Ok(id)
    }

    async fn complete_sync_log(
        &self,
        log_id: i64,
        campaigns_synced: i64,
        stats_synced: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(entry) = inner
            .sync_log
            .iter_mut()
            .find(|e| e.id == log_id && e.status == SyncStatus::Running)
        {
            entry.status = SyncStatus::Completed;
            entry.campaigns_synced = campaigns_synced;
            entry.stats_synced = stats_synced;
            entry.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_sync_log(&self, log_id: i64, error_message: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(entry) = inner
            .sync_log
            .iter_mut()
            .find(|e| e.id == log_id && e.status == SyncStatus::Running)
        {
            entry.status = SyncStatus::Failed;
            entry.error_message = Some(error_message.to_string());
            entry.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn sync_history(
        &self,
        platform: Option<Platform>,
        limit: i64,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let inner = self.lock();
        let mut entries: Vec<SyncLogEntry> = inner
            .sync_log
            .iter()
            .filter(|e| platform.map(|p| e.platform == p).unwrap_or(true))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }

    async fn all_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let inner = self.lock();
        let mut campaigns = inner.campaigns.clone();
        campaigns.sort_by(|a, b| {
            a.platform
                .cmp(&b.platform)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
        Ok(campaigns)
    }

    async fn attributed_revenue(
        &self,
        campaign_id: i64,
        window: &DateWindow,
    ) -> Result<RevenueSummary, StoreError> {
        let inner = self.lock();
        Ok(inner.attributed(campaign_id, window))
    }

    async fn write_campaign_attribution(
        &self,
        campaign_id: i64,
        revenue: f64,
        roas: f64,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(campaign) = inner.campaigns.iter_mut().find(|c| c.id == campaign_id) {
            campaign.revenue = revenue;
            campaign.roas = roas;
            campaign.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn roas_by_platform(&self) -> Result<Vec<PlatformRoas>, StoreError> {
        let inner = self.lock();
        let mut grouped: HashMap<Platform, PlatformRoas> = HashMap::new();
        for campaign in &inner.campaigns {
            let entry = grouped.entry(campaign.platform).or_insert(PlatformRoas {
                platform: campaign.platform,
                spend: 0.0,
                revenue: 0.0,
                orders: 0,
                roas: 0.0,
            });
            entry.spend += campaign.spend;
            let summary = inner.attributed(campaign.id, &DateWindow::open());
            entry.revenue += summary.revenue;
            entry.orders += summary.orders;
        }
        let mut out: Vec<PlatformRoas> = grouped.into_values().collect();
        for row in &mut out {
            row.roas = adperf_core::return_on_ad_spend(row.revenue, row.spend);
        }
        out.sort_by_key(|r| r.platform);
        Ok(out)
    }

    async fn platform_totals(&self) -> Result<Vec<PlatformTotals>, StoreError> {
        let inner = self.lock();
        let mut grouped: HashMap<Platform, PlatformTotals> = HashMap::new();
        for campaign in &inner.campaigns {
            let entry = grouped.entry(campaign.platform).or_insert(PlatformTotals {
                platform: campaign.platform,
                campaigns: 0,
                impressions: 0,
                clicks: 0,
                spend: 0.0,
                conversions: 0,
                revenue: 0.0,
            });
            entry.campaigns += 1;
            entry.impressions += campaign.impressions;
            entry.clicks += campaign.clicks;
            entry.spend += campaign.spend;
            entry.conversions += campaign.conversions;
            entry.revenue += campaign.revenue;
        }
        let mut out: Vec<PlatformTotals> = grouped.into_values().collect();
        out.sort_by_key(|r| r.platform);
        Ok(out)
    }

    async fn daily_totals(
        &self,
        days: i64,
        platform: Option<Platform>,
    ) -> Result<Vec<DailyTotals>, StoreError> {
        let inner = self.lock();
        let cutoff = Utc::now().date_naive() - Duration::days(days);
        let platform_of: HashMap<i64, Platform> =
            inner.campaigns.iter().map(|c| (c.id, c.platform)).collect();

        let mut grouped: HashMap<NaiveDate, DailyTotals> = HashMap::new();
        for stat in &inner.daily_stats {
            if stat.date <= cutoff {
                continue;
            }
            if let Some(wanted) = platform {
                if platform_of.get(&stat.campaign_id) != Some(&wanted) {
                    continue;
                }
            }
            let entry = grouped.entry(stat.date).or_insert(DailyTotals {
                date: stat.date,
                impressions: 0,
                clicks: 0,
                spend: 0.0,
                conversions: 0,
                revenue: 0.0,
            });
            entry.impressions += stat.impressions;
            entry.clicks += stat.clicks;
            entry.spend += stat.spend;
            entry.conversions += stat.conversions;
            entry.revenue += stat.revenue;
        }
        let mut out: Vec<DailyTotals> = grouped.into_values().collect();
        out.sort_by_key(|r| r.date);
        Ok(out)
    }

    async fn top_campaigns(&self, limit: i64) -> Result<Vec<Campaign>, StoreError> {
        let inner = self.lock();
        let mut campaigns: Vec<Campaign> = inner
            .campaigns
            .iter()
            .filter(|c| c.spend > 0.0)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.spend.total_cmp(&a.spend));
        campaigns.truncate(limit.max(0) as usize);
        Ok(campaigns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn campaign_record(external_id: &str, spend: Spend) -> CampaignRecord {
        CampaignRecord {
            external_id: external_id.to_string(),
            name: format!("Campaign {external_id}"),
            status: CampaignStatus::Active,
            daily_budget: Some(Spend::Major(500.0)),
            currency: "CZK".to_string(),
            impressions: 1_000,
            clicks: 50,
            spend,
            conversions: 4,
        }
    }

    fn stat_record(external_id: &str, day: u32, impressions: i64) -> DailyStatRecord {
        DailyStatRecord {
            external_id: external_id.to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            impressions,
            clicks: impressions / 10,
            spend: Spend::Major(impressions as f64 / 100.0),
            conversions: 1,
            revenue: None,
        }
    }

    #[tokio::test]
    async fn campaign_upsert_is_idempotent_and_preserves_created_at() {
        let store = MemAdStore::new();
        let record = campaign_record("c1", Spend::Micros(12_340_000));

        let first_id = store.upsert_campaign(Platform::GoogleAds, &record).await.unwrap();
        let created_at = store.campaign(Platform::GoogleAds, "c1").unwrap().created_at;

        let second_id = store.upsert_campaign(Platform::GoogleAds, &record).await.unwrap();
        assert_eq!(first_id, second_id);

        let campaigns = store.all_campaigns().await.unwrap();
        assert_eq!(campaigns.len(), 1);
        assert_eq!(campaigns[0].created_at, created_at);
        assert_eq!(campaigns[0].spend, 12.34);
        assert_eq!(campaigns[0].ctr, 0.05);
    }

    #[tokio::test]
    async fn same_external_id_on_two_platforms_is_two_rows() {
        let store = MemAdStore::new();
        let record = campaign_record("c1", Spend::Major(10.0));
        let a = store.upsert_campaign(Platform::GoogleAds, &record).await.unwrap();
        let b = store.upsert_campaign(Platform::Sklik, &record).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.all_campaigns().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn daily_stat_resync_replaces_the_day() {
        let store = MemAdStore::new();
        let id = store
            .upsert_campaign(Platform::GoogleAds, &campaign_record("c1", Spend::Major(1.0)))
            .await
            .unwrap();

        store.upsert_daily_stat(id, &stat_record("c1", 10, 100)).await.unwrap();
        store.upsert_daily_stat(id, &stat_record("c1", 10, 250)).await.unwrap();

        let rows = store.daily_stat_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].impressions, 250);
    }

    #[tokio::test]
    async fn recompute_totals_is_a_pure_resum() {
        let store = MemAdStore::new();
        let mut record = campaign_record("101", Spend::ZERO);
        record.impressions = 0;
        record.clicks = 0;
        record.conversions = 0;
        let id = store.upsert_campaign(Platform::Heureka, &record).await.unwrap();

        store.upsert_daily_stat(id, &stat_record("101", 10, 100)).await.unwrap();
        store.upsert_daily_stat(id, &stat_record("101", 11, 200)).await.unwrap();

        store.recompute_campaign_totals(id).await.unwrap();
        store.recompute_campaign_totals(id).await.unwrap();

        let campaign = store.campaign(Platform::Heureka, "101").unwrap();
        assert_eq!(campaign.impressions, 300);
        assert_eq!(campaign.clicks, 30);
        assert_eq!(campaign.spend, 3.0);
        assert_eq!(campaign.ctr, 0.1);
    }

    #[tokio::test]
    async fn utm_resolution_tolerates_either_side_missing() {
        let store = MemAdStore::new();

        // Mapping before campaign: resolve leaves campaign_id null.
        store
            .ensure_utm_mapping(Platform::GoogleAds, "google", "cpc", "c1")
            .await
            .unwrap();
        store.resolve_utm_campaign_id("google", "cpc", "c1").await.unwrap();
        assert_eq!(store.mapping("google", "cpc", "c1").unwrap().campaign_id, None);

        // No mapping at all: resolve is a no-op, not an error.
        store.resolve_utm_campaign_id("seznam", "cpc", "missing").await.unwrap();

        let id = store
            .upsert_campaign(Platform::GoogleAds, &campaign_record("c1", Spend::Major(1.0)))
            .await
            .unwrap();
        store.resolve_utm_campaign_id("google", "cpc", "c1").await.unwrap();
        assert_eq!(store.mapping("google", "cpc", "c1").unwrap().campaign_id, Some(id));
    }

    #[tokio::test]
    async fn utm_platform_is_last_writer_wins() {
        let store = MemAdStore::new();
        store
            .ensure_utm_mapping(Platform::GoogleAds, "google", "cpc", "c1")
            .await
            .unwrap();
        store
            .ensure_utm_mapping(Platform::Sklik, "google", "cpc", "c1")
            .await
            .unwrap();
        assert_eq!(store.mapping("google", "cpc", "c1").unwrap().platform, Platform::Sklik);
    }

    #[tokio::test]
    async fn attribution_sums_matching_orders_inside_window() {
        let store = MemAdStore::new();
        let id = store
            .upsert_campaign(Platform::GoogleAds, &campaign_record("c1", Spend::Major(100.0)))
            .await
            .unwrap();
        store
            .ensure_utm_mapping(Platform::GoogleAds, "google", "cpc", "c1")
            .await
            .unwrap();
        store.resolve_utm_campaign_id("google", "cpc", "c1").await.unwrap();

        let in_window = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).single().unwrap();
        let out_of_window = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().unwrap();
        for (price, created_at) in [(100.0, in_window), (250.0, in_window), (999.0, out_of_window)] {
            store.seed_order(SeedOrder {
                utm_source: "google".to_string(),
                utm_medium: "cpc".to_string(),
                utm_campaign: "c1".to_string(),
                total_price: price,
                created_at,
            });
        }
        // Different triple never attributes here.
        store.seed_order(SeedOrder {
            utm_source: "newsletter".to_string(),
            utm_medium: "email".to_string(),
            utm_campaign: "c1".to_string(),
            total_price: 500.0,
            created_at: in_window,
        });

        let window = DateWindow::new(
            Some(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        );
        let summary = store.attributed_revenue(id, &window).await.unwrap();
        assert_eq!(summary.revenue, 350.0);
        assert_eq!(summary.orders, 2);

        let lifetime = store.attributed_revenue(id, &DateWindow::open()).await.unwrap();
        assert_eq!(lifetime.revenue, 1349.0);
        assert_eq!(lifetime.orders, 3);
    }

    #[tokio::test]
    async fn sync_log_terminal_update_happens_once() {
        let store = MemAdStore::new();
        let id = store
            .open_sync_log(Platform::Sklik, &DateWindow::open())
            .await
            .unwrap();
        store.complete_sync_log(id, 5, 30).await.unwrap();
        // A late failure report must not overwrite the terminal state.
        store.fail_sync_log(id, "late error").await.unwrap();

        let history = store.sync_history(Some(Platform::Sklik), 20).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, SyncStatus::Completed);
        assert_eq!(history[0].campaigns_synced, 5);
        assert!(history[0].error_message.is_none());
        assert!(history[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn sync_history_is_newest_first_and_filtered() {
        let store = MemAdStore::new();
        let a = store.open_sync_log(Platform::GoogleAds, &DateWindow::open()).await.unwrap();
        let b = store.open_sync_log(Platform::Sklik, &DateWindow::open()).await.unwrap();
        let c = store.open_sync_log(Platform::GoogleAds, &DateWindow::open()).await.unwrap();
        store.complete_sync_log(a, 1, 0).await.unwrap();
        store.fail_sync_log(b, "auth expired").await.unwrap();
        store.complete_sync_log(c, 2, 0).await.unwrap();

        let all = store.sync_history(None, 20).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, c);

        let google = store.sync_history(Some(Platform::GoogleAds), 20).await.unwrap();
        assert_eq!(google.len(), 2);

        let limited = store.sync_history(None, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn keyword_replace_is_wholesale() {
        let store = MemAdStore::new();
        let first = vec![KeywordRecord {
            text: "running shoes".to_string(),
            match_type: MatchType::Phrase,
            impressions: 10,
            clicks: 1,
            spend: Spend::Micros(1_000_000),
            conversions: 0,
        }];
        store.replace_keywords(Platform::GoogleAds, &first).await.unwrap();
        store.replace_keywords(Platform::GoogleAds, &first).await.unwrap();
        assert_eq!(store.keyword_rows(Platform::GoogleAds).len(), 1);
        assert_eq!(store.keyword_rows(Platform::GoogleAds)[0].spend, 1.0);

        store.replace_keywords(Platform::GoogleAds, &[]).await.unwrap();
        assert!(store.keyword_rows(Platform::GoogleAds).is_empty());
    }

    #[tokio::test]
    async fn zero_metric_campaign_has_zero_derived_columns() {
        let store = MemAdStore::new();
        let mut record = campaign_record("idle", Spend::ZERO);
        record.impressions = 0;
        record.clicks = 0;
        record.conversions = 0;
        store.upsert_campaign(Platform::Glami, &record).await.unwrap();

        let campaign = store.campaign(Platform::Glami, "idle").unwrap();
        assert_eq!(campaign.ctr, 0.0);
        assert_eq!(campaign.cpc, 0.0);
        assert_eq!(campaign.roas, 0.0);
    }
}
