//! The 90-day window, read from the `app_serviceuptime` rollup table.
use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::Row;
use tracing::debug;

use super::classify::{determine_status, overall_for};
use super::model::{round3, Report, ServiceStatus, ServiceSummary, SlotEntry};
use crate::config::is_excluded_alias;
use crate::util::db::Db;

/// One rollup row: a service's counters for one UTC day.
#[derive(Debug, Clone)]
pub struct DailyRow {
    pub service_id: String,
    pub alias: Option<String>,
    pub title: Option<String>,
    pub date: NaiveDate,
    pub total: i64,
    pub success: i64,
    pub client_error: i64,
    pub server_error: i64,
    pub uptime: f64,
}

struct ServiceDays {
    alias: String,
    title: String,
    records: Vec<SlotEntry>,
    total: i64,
    weighted_uptime: f64,
}

/// Blank or missing aliases fall back to the service id.
fn display_alias(row: &DailyRow) -> String {
    row.alias
        .as_deref()
        .filter(|a| !a.is_empty())
        .unwrap_or(row.service_id.as_str())
        .to_string()
}

/// Groups rollup rows per service. Rows are expected ordered by date within each service.
pub fn aggregate_daily(
    granularity: &str,
    min_requests: i64,
    rows: impl IntoIterator<Item = DailyRow>,
) -> Report {
    let mut per_service: BTreeMap<String, ServiceDays> = BTreeMap::new();
    for row in rows {
        let svc = per_service
            .entry(row.service_id.clone())
            .or_insert_with(|| ServiceDays {
                alias: display_alias(&row),
                title: row.title.clone().unwrap_or_default(),
                records: Vec::new(),
                total: 0,
                weighted_uptime: 0.0,
            });
        svc.records.push(SlotEntry {
            service_id: Some(row.service_id.clone()),
            service_alias: Some(display_alias(&row)),
            service_title: Some(row.title.unwrap_or_default()),
            date: row.date.format("%Y-%m-%d").to_string(),
            total_requests: row.total,
            success_count: row.success,
            client_error_count: row.client_error,
            server_error_count: row.server_error,
            uptime: row.uptime,
        });
        svc.total += row.total;
        svc.weighted_uptime += row.uptime * row.total as f64;
    }

    let mut summaries = Vec::new();
    for (service_id, svc) in per_service {
        if svc.total < min_requests || is_excluded_alias(&svc.alias) {
            debug!(alias = %svc.alias, total = svc.total, "daily service skipped");
            continue;
        }
        let uptime = if svc.total > 0 {
            round3(svc.weighted_uptime / svc.total as f64).clamp(0.0, 100.0)
        } else {
            100.0
        };
        let current_status = svc
            .records
            .last()
            .map(|r| determine_status(r.uptime))
            .unwrap_or(ServiceStatus::Unknown);

        summaries.push(ServiceSummary {
            service_id,
            service_alias: svc.alias,
            service_title: svc.title,
            current_status,
            uptime,
            total_requests: svc.total,
            daily: svc.records,
        });
    }
    summaries.sort_by(|a, b| a.service_alias.cmp(&b.service_alias));

    Report {
        overall_status: overall_for(&summaries),
        granularity: granularity.to_string(),
        services: summaries,
    }
}

pub fn cutoff_date(now: DateTime<Utc>, days: u32) -> NaiveDate {
    now.date_naive() - Duration::days(i64::from(days))
}

pub async fn generate_daily(
    db: &Db,
    days: u32,
    granularity: &str,
    min_requests: i64,
    now: DateTime<Utc>,
) -> Result<Report> {
    let cutoff = cutoff_date(now, days);
    let rows = sqlx::query(
        r#"
        SELECT service_id::text AS service_id, service_alias, service_title,
               date::date AS date,
               total_requests::bigint AS total_requests,
               success_count::bigint AS success_count,
               client_error_count::bigint AS client_error_count,
               server_error_count::bigint AS server_error_count,
               uptime::float8 AS uptime
        FROM app_serviceuptime
        WHERE date >= $1
        ORDER BY service_alias, date
    "#,
    )
    .bind(cutoff)
    .persistent(false)
    .fetch_all(&db.pool)
    .await
    .context("query app_serviceuptime")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(DailyRow {
            service_id: row.try_get("service_id")?,
            alias: row.try_get("service_alias")?,
            title: row.try_get("service_title")?,
            date: row.try_get("date")?,
            total: row.try_get("total_requests")?,
            success: row.try_get("success_count")?,
            client_error: row.try_get("client_error_count")?,
            server_error: row.try_get("server_error_count")?,
            uptime: row.try_get("uptime")?,
        });
    }
    debug!(rows = out.len(), %cutoff, "daily rollup fetched");
    Ok(aggregate_daily(granularity, min_requests, out))
}
