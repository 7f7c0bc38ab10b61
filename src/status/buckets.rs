//! Short windows (1/7/30 days) built straight from `app_apiusage`.
//!
//! Postgres does the heavy grouping: one row per (endpoint, bucket). Everything
//! after that (merging endpoints into services, filling empty slots, scoring)
//! happens here on plain rows so it can be tested without a database.
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use regex::Regex;
use sqlx::Row;
use tracing::{debug, info};

use super::classify::{determine_status, overall_for};
use super::model::{uptime_pct, Counters, Report, ServiceStatus, ServiceSummary, SlotEntry};
use super::resolver::ServiceMap;
use crate::util::db::Db;

pub const SLOT_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPlan {
    pub days: u32,
    pub bucket_minutes: u32,
    pub slots: u32,
    pub min_requests: i64,
}

impl BucketPlan {
    fn bucket_seconds(&self) -> i64 {
        i64::from(self.bucket_minutes) * 60
    }
}

/// One pre-grouped row from the usage query.
#[derive(Debug, Clone)]
pub struct BucketRow {
    pub api_id: String,
    pub bucket_key: String,
    pub counters: Counters,
}

/// `now` floored onto the bucket grid (grid anchored at the Unix epoch, UTC).
pub fn align_to_grid(now: DateTime<Utc>, bucket_minutes: u32) -> DateTime<Utc> {
    let width = i64::from(bucket_minutes.max(1)) * 60;
    let secs = now.timestamp();
    let aligned = secs - secs.rem_euclid(width);
    Utc.timestamp_opt(aligned, 0).single().unwrap_or(now)
}

/// Canonical slot keys, oldest first, the last one being the aligned `now`.
pub fn slot_keys(now: DateTime<Utc>, bucket_minutes: u32, slots: u32) -> Vec<String> {
    let base = align_to_grid(now, bucket_minutes);
    (0..slots)
        .rev()
        .map(|i| {
            let offset = Duration::minutes(i64::from(i) * i64::from(bucket_minutes));
            (base - offset).format(SLOT_KEY_FORMAT).to_string()
        })
        .collect()
}

struct ServiceBuckets {
    alias: String,
    title: String,
    buckets: HashMap<String, Counters>,
}

/// Turns grouped usage rows into a report. Pure: `now` and the rows are injected.
pub fn aggregate(
    plan: &BucketPlan,
    granularity: &str,
    services: &ServiceMap,
    rows: impl IntoIterator<Item = BucketRow>,
    now: DateTime<Utc>,
) -> Report {
    // BTreeMap keeps service-id order stable so alias ties sort deterministically.
    let mut per_service: BTreeMap<String, ServiceBuckets> = BTreeMap::new();
    for row in rows {
        let Some(svc) = services.get(&row.api_id) else {
            continue;
        };
        let entry = per_service
            .entry(svc.service_id.clone())
            .or_insert_with(|| ServiceBuckets {
                alias: svc.alias.clone(),
                title: svc.title.clone(),
                buckets: HashMap::new(),
            });
        entry
            .buckets
            .entry(row.bucket_key)
            .or_default()
            .add(&row.counters);
    }

    let keys = slot_keys(now, plan.bucket_minutes, plan.slots);

    let mut summaries = Vec::new();
    for (service_id, svc) in per_service {
        let mut window = Counters::default();
        for c in svc.buckets.values() {
            window.add(c);
        }
        if window.total < plan.min_requests {
            debug!(alias = %svc.alias, total = window.total, "below minimum traffic; omitted");
            continue;
        }

        let empty = Counters::default();
        let daily: Vec<SlotEntry> = keys
            .iter()
            .map(|key| SlotEntry::from_counters(key.clone(), svc.buckets.get(key).unwrap_or(&empty)))
            .collect();

        // Judged on the newest canonical slot even when it saw no traffic.
        let current_status = daily
            .last()
            .map(|slot| determine_status(slot.uptime))
            .unwrap_or(ServiceStatus::Unknown);

        summaries.push(ServiceSummary {
            service_id,
            service_alias: svc.alias,
            service_title: svc.title,
            current_status,
            uptime: uptime_pct(window.total, window.server_error),
            total_requests: window.total,
            daily,
        });
    }
    summaries.sort_by(|a, b| a.service_alias.cmp(&b.service_alias));

    Report {
        overall_status: overall_for(&summaries),
        granularity: granularity.to_string(),
        services: summaries,
    }
}

/// Declared type of `app_apiusage.api_id`, e.g. `uuid` or `character varying(32)`.
async fn api_id_column_type(db: &Db) -> Result<String> {
    let declared = sqlx::query_scalar::<_, Option<String>>(
        r#"
        SELECT format_type(a.atttypid, a.atttypmod)
        FROM pg_attribute a
        WHERE a.attrelid = to_regclass('app_apiusage')
          AND a.attname = 'api_id'
          AND NOT a.attisdropped
    "#,
    )
    .persistent(false)
    .fetch_optional(&db.pool)
    .await
    .context("look up app_apiusage.api_id type")?
    .flatten();
    Ok(declared.unwrap_or_else(|| "text".to_string()))
}

fn column_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z][a-z0-9_ ]*(\([0-9]+(,[0-9]+)?\))?$").expect("static regex")
    })
}

/// Usage query with the id list cast to the column's own type, so the
/// `api_id` index stays usable.
pub fn usage_bucket_sql(api_id_type: &str) -> Result<String> {
    if !column_type_re().is_match(api_id_type) {
        bail!("unexpected type for app_apiusage.api_id: {api_id_type:?}");
    }
    Ok(format!(
        r#"
        SELECT
            api_id::text AS api_id,
            to_char(
                to_timestamp(floor(extract(epoch FROM created_at)::float8 / $1::float8) * $1::float8)
                    AT TIME ZONE 'UTC',
                'YYYY-MM-DD"T"HH24:MI'
            ) AS bucket_key,
            COUNT(*)::bigint AS total,
            COUNT(*) FILTER (WHERE status_code IS NOT NULL AND status_code < 400)::bigint AS success,
            COUNT(*) FILTER (WHERE status_code >= 400 AND status_code < 500)::bigint AS client_error,
            COUNT(*) FILTER (WHERE status_code >= 500)::bigint AS server_error
        FROM app_apiusage
        WHERE created_at >= $2
          AND api_id = ANY($3::text[]::{api_id_type}[])
        GROUP BY 1, 2
    "#
    ))
}

async fn fetch_bucket_rows(
    db: &Db,
    plan: &BucketPlan,
    api_ids: &[String],
    cutoff: DateTime<Utc>,
) -> Result<Vec<BucketRow>> {
    let api_id_type = api_id_column_type(db).await?;
    debug!(%api_id_type, "app_apiusage.api_id type");
    let sql = usage_bucket_sql(&api_id_type)?;
    let rows = sqlx::query(&sql)
        .bind(plan.bucket_seconds() as f64)
        .bind(cutoff)
        .bind(api_ids)
        .persistent(false)
        .fetch_all(&db.pool)
        .await
        .with_context(|| format!("query app_apiusage buckets for {}d window", plan.days))?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(BucketRow {
            api_id: row.try_get("api_id")?,
            bucket_key: row.try_get("bucket_key")?,
            counters: Counters {
                total: row.try_get("total")?,
                success: row.try_get("success")?,
                client_error: row.try_get("client_error")?,
                server_error: row.try_get("server_error")?,
            },
        });
    }
    Ok(out)
}

pub async fn generate_bucketed(
    db: &Db,
    plan: &BucketPlan,
    granularity: &str,
    services: &ServiceMap,
    now: DateTime<Utc>,
) -> Result<Report> {
    if services.is_empty() {
        info!(days = plan.days, "no mapped endpoints; emitting empty report");
        return Ok(Report::empty(granularity));
    }

    let api_ids: Vec<String> = services.keys().cloned().collect();
    let cutoff = now - Duration::days(i64::from(plan.days));
    let rows = fetch_bucket_rows(db, plan, &api_ids, cutoff).await?;
    debug!(days = plan.days, rows = rows.len(), "usage buckets fetched");

    Ok(aggregate(plan, granularity, services, rows, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::model::OverallStatus;
    use crate::status::resolver::ServiceRef;

    const DAY_PLAN: BucketPlan = BucketPlan { days: 1, bucket_minutes: 15, slots: 96, min_requests: 3 };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 13, 52, 41).unwrap()
    }

    fn services() -> ServiceMap {
        let mut m = ServiceMap::new();
        for (api, svc, alias) in [("a1", "s1", "suno"), ("a2", "s1", "suno"), ("b1", "s2", "midjourney")] {
            m.insert(
                api.into(),
                ServiceRef { service_id: svc.into(), alias: alias.into(), title: format!("service_title_{alias}") },
            );
        }
        m
    }

    fn row(api: &str, key: &str, total: i64, client_error: i64, server_error: i64) -> BucketRow {
        BucketRow {
            api_id: api.into(),
            bucket_key: key.into(),
            counters: Counters {
                total,
                success: total - client_error - server_error,
                client_error,
                server_error,
            },
        }
    }

    #[test]
    fn aligns_now_down_to_grid() {
        assert_eq!(align_to_grid(now(), 15), Utc.with_ymd_and_hms(2026, 10, 19, 13, 45, 0).unwrap());
        assert_eq!(align_to_grid(now(), 120), Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap());
        assert_eq!(align_to_grid(now(), 480), Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap());
        assert_eq!(align_to_grid(now(), 1440), Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());
    }

    #[test]
    fn slot_keys_are_evenly_spaced_and_end_at_aligned_now() {
        for (width, count) in [(15u32, 96u32), (120, 84), (480, 90)] {
            let keys = slot_keys(now(), width, count);
            assert_eq!(keys.len(), count as usize);
            assert_eq!(keys.last().unwrap(), &align_to_grid(now(), width).format(SLOT_KEY_FORMAT).to_string());

            let parsed: Vec<DateTime<Utc>> = keys
                .iter()
                .map(|k| {
                    chrono::NaiveDateTime::parse_from_str(k, SLOT_KEY_FORMAT)
                        .unwrap()
                        .and_utc()
                })
                .collect();
            for pair in parsed.windows(2) {
                assert_eq!(pair[1] - pair[0], Duration::minutes(i64::from(width)));
            }
        }
    }

    #[test]
    fn slot_keys_cross_midnight() {
        let keys = slot_keys(Utc.with_ymd_and_hms(2026, 10, 19, 0, 5, 0).unwrap(), 15, 3);
        assert_eq!(keys, vec!["2026-10-18T23:30", "2026-10-18T23:45", "2026-10-19T00:00"]);
    }

    #[test]
    fn merges_endpoints_into_their_service() {
        let rows = vec![
            row("a1", "2026-10-19T13:30", 600, 10, 20),
            row("a2", "2026-10-19T13:30", 400, 0, 30),
            row("b1", "2026-10-19T13:45", 10, 0, 0),
        ];
        let report = aggregate(&DAY_PLAN, "quarter", &services(), rows, now());
        let suno = report.services.iter().find(|s| s.service_alias == "suno").unwrap();

        assert_eq!(suno.total_requests, 1000);
        assert_eq!(suno.uptime, 95.0);
        let slot = suno.daily.iter().find(|d| d.date == "2026-10-19T13:30").unwrap();
        assert_eq!(slot.total_requests, 1000);
        assert_eq!(slot.server_error_count, 50);
        assert_eq!(slot.client_error_count, 10);
        assert_eq!(slot.success_count, 940);
        assert_eq!(slot.uptime, 95.0);
    }

    #[test]
    fn empty_slots_are_zero_filled_at_full_uptime() {
        let rows = vec![row("b1", "2026-10-19T10:00", 5, 0, 5)];
        let report = aggregate(&DAY_PLAN, "quarter", &services(), rows, now());
        let mj = &report.services[0];

        assert_eq!(mj.daily.len(), 96);
        for slot in mj.daily.iter().filter(|d| d.total_requests == 0) {
            assert_eq!(slot.uptime, 100.0);
            assert_eq!(slot.server_error_count, 0);
        }
        assert_eq!(mj.uptime, 0.0);
        // newest slot is empty, so the service still reads as operational
        assert_eq!(mj.current_status, ServiceStatus::Operational);
    }

    #[test]
    fn current_status_follows_newest_slot() {
        let rows = vec![row("b1", "2026-10-19T13:45", 10, 0, 6)];
        let report = aggregate(&DAY_PLAN, "quarter", &services(), rows, now());
        assert_eq!(report.services[0].current_status, ServiceStatus::MajorOutage);
        assert_eq!(report.overall_status, OverallStatus::PartialSystemOutage);
    }

    #[test]
    fn low_traffic_services_are_omitted() {
        let rows = vec![
            row("a1", "2026-10-19T13:30", 2, 0, 0),
            row("b1", "2026-10-19T13:30", 3, 0, 0),
        ];
        let report = aggregate(&DAY_PLAN, "quarter", &services(), rows, now());
        let aliases: Vec<&str> = report.services.iter().map(|s| s.service_alias.as_str()).collect();
        assert_eq!(aliases, vec!["midjourney"]);
    }

    #[test]
    fn unmapped_rows_are_ignored() {
        let rows = vec![row("zz", "2026-10-19T13:30", 500, 0, 500)];
        let report = aggregate(&DAY_PLAN, "quarter", &services(), rows, now());
        assert!(report.services.is_empty());
        assert_eq!(report.overall_status, OverallStatus::NoData);
    }

    #[test]
    fn services_sorted_by_alias() {
        let rows = vec![
            row("a1", "2026-10-19T13:30", 10, 0, 0),
            row("b1", "2026-10-19T13:30", 10, 0, 0),
        ];
        let report = aggregate(&DAY_PLAN, "quarter", &services(), rows, now());
        let aliases: Vec<&str> = report.services.iter().map(|s| s.service_alias.as_str()).collect();
        assert_eq!(aliases, vec!["midjourney", "suno"]);
        assert_eq!(report.granularity, "quarter");
        assert_eq!(report.overall_status, OverallStatus::AllSystemsOperational);
    }

    #[test]
    fn id_filter_uses_the_column_type() {
        let sql = usage_bucket_sql("uuid").unwrap();
        assert!(sql.contains("AND api_id = ANY($3::text[]::uuid[])"));
        assert!(!sql.contains("api_id::text = ANY"));

        let sql = usage_bucket_sql("character varying(32)").unwrap();
        assert!(sql.contains("ANY($3::text[]::character varying(32)[])"));
    }

    #[test]
    fn id_filter_rejects_odd_type_names() {
        assert!(usage_bucket_sql("uuid[]); DROP TABLE app_api; --").is_err());
        assert!(usage_bucket_sql("").is_err());
    }

    #[test]
    fn same_input_serializes_identically() {
        let rows = || {
            vec![
                row("a1", "2026-10-19T13:30", 10, 1, 1),
                row("a2", "2026-10-19T12:00", 7, 0, 2),
                row("b1", "2026-10-19T13:30", 10, 0, 0),
            ]
        };
        let first = serde_json::to_string(&aggregate(&DAY_PLAN, "quarter", &services(), rows(), now())).unwrap();
        let second = serde_json::to_string(&aggregate(&DAY_PLAN, "quarter", &services(), rows(), now())).unwrap();
        assert_eq!(first, second);
    }
}
