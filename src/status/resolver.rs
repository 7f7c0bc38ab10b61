//! Endpoint → service resolution.
//!
//! Each API endpoint belongs to one service. The public page groups by service and
//! shows a short alias, which is either stored on the service or embedded in its
//! i18n title key (`service_title_<alias>`).
use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;
use sqlx::Row;
use tracing::debug;

use crate::config::is_excluded_alias;
use crate::util::db::Db;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRef {
    pub service_id: String,
    pub alias: String,
    pub title: String,
}

/// Raw join row: (endpoint id, service id, alias, title).
#[derive(Debug, Clone)]
pub struct EndpointRow {
    pub api_id: String,
    pub service_id: String,
    pub alias: Option<String>,
    pub title: Option<String>,
}

pub type ServiceMap = HashMap<String, ServiceRef>;

fn title_alias_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"service_title_(\w+)").expect("static regex"))
}

/// Stored alias wins; otherwise pull it out of the title key.
pub fn derive_alias(alias: Option<&str>, title: Option<&str>) -> Option<String> {
    if let Some(a) = alias.filter(|a| !a.is_empty()) {
        return Some(a.to_string());
    }
    let title = title?;
    title_alias_re()
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn build_service_map(rows: impl IntoIterator<Item = EndpointRow>) -> ServiceMap {
    let mut map = ServiceMap::new();
    let mut skipped = 0usize;
    for row in rows {
        let Some(alias) = derive_alias(row.alias.as_deref(), row.title.as_deref()) else {
            skipped += 1;
            continue;
        };
        if is_excluded_alias(&alias) {
            skipped += 1;
            continue;
        }
        map.insert(
            row.api_id,
            ServiceRef {
                service_id: row.service_id,
                alias,
                title: row.title.unwrap_or_default(),
            },
        );
    }
    debug!(endpoints = map.len(), skipped, "service map built");
    map
}

pub async fn load_service_map(db: &Db) -> Result<ServiceMap> {
    let rows = sqlx::query(
        r#"
        SELECT a.id::text AS api_id, s.id::text AS service_id, s.alias, s.title
        FROM app_api a
        JOIN app_service s ON a.service_id = s.id
        WHERE a.service_id IS NOT NULL
    "#,
    )
    .persistent(false)
    .fetch_all(&db.pool)
    .await
    .context("query app_api/app_service mapping")?;

    let mut endpoints = Vec::with_capacity(rows.len());
    for row in rows {
        endpoints.push(EndpointRow {
            api_id: row.try_get("api_id")?,
            service_id: row.try_get("service_id")?,
            alias: row.try_get("alias")?,
            title: row.try_get("title")?,
        });
    }
    Ok(build_service_map(endpoints))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(api: &str, svc: &str, alias: Option<&str>, title: Option<&str>) -> EndpointRow {
        EndpointRow {
            api_id: api.into(),
            service_id: svc.into(),
            alias: alias.map(Into::into),
            title: title.map(Into::into),
        }
    }

    #[test]
    fn prefers_stored_alias() {
        assert_eq!(
            derive_alias(Some("midjourney"), Some("service_title_other")),
            Some("midjourney".into())
        );
    }

    #[test]
    fn extracts_alias_from_title_key() {
        assert_eq!(
            derive_alias(None, Some("service_title_suno")),
            Some("suno".into())
        );
        assert_eq!(
            derive_alias(Some(""), Some("prefix service_title_luma_video trailing")),
            Some("luma_video".into())
        );
    }

    #[test]
    fn no_alias_when_nothing_matches() {
        assert_eq!(derive_alias(None, Some("Suno Music")), None);
        assert_eq!(derive_alias(None, None), None);
    }

    #[test]
    fn drops_unresolvable_and_excluded_rows() {
        let map = build_service_map([
            row("a1", "s1", Some("suno"), Some("service_title_suno")),
            row("a2", "s1", None, Some("service_title_suno")),
            row("a3", "s2", None, Some("no key here")),
            row("a4", "s3", Some("recaptcha"), None),
            row("a5", "s4", None, Some("service_title_fish")),
        ]);
        let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a1", "a2"]);
        assert_eq!(map["a2"].alias, "suno");
        assert_eq!(map["a2"].service_id, "s1");
    }

    #[test]
    fn missing_title_becomes_empty() {
        let map = build_service_map([row("a1", "s1", Some("kling"), None)]);
        assert_eq!(map["a1"].title, "");
    }

    #[test]
    fn duplicate_endpoint_keeps_last_row() {
        let map = build_service_map([
            row("a1", "s1", Some("first"), None),
            row("a1", "s2", Some("second"), None),
        ]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["a1"].service_id, "s2");
    }
}
