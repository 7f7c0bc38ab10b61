use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::config::{StatusConfig, WindowSource, WindowSpec};
use crate::status::buckets::{generate_bucketed, BucketPlan};
use crate::status::daily::generate_daily;
use crate::status::resolver::{load_service_map, ServiceMap};
use crate::status::writer::write_compact;
use crate::status::Report;
use crate::util::db::Db;

/// Connects, writes every configured window, and always closes the connection.
pub async fn run(cfg: StatusConfig) -> Result<()> {
    println!("Connecting to database...");
    let db = Db::connect(&cfg.db).await?;

    let result = generate_all(&db, &cfg, Utc::now()).await;
    db.close().await;

    if let Err(e) = &result {
        error!(error = %e, "status generation aborted");
    } else {
        println!("Done!");
    }
    result
}

async fn generate_all(db: &Db, cfg: &StatusConfig, now: DateTime<Utc>) -> Result<()> {
    let needs_map = cfg
        .windows
        .iter()
        .any(|w| matches!(w.source, WindowSource::Bucketed { .. }));
    let services = if needs_map {
        let map = load_service_map(db).await?;
        info!(endpoints = map.len(), "endpoint→service map loaded");
        map
    } else {
        ServiceMap::new()
    };

    for window in &cfg.windows {
        let report = generate_window(db, window, &services, now).await?;
        let file_name = window.file_name();
        let (path, bytes) = write_compact(&cfg.output_dir, &file_name, &report)?;
        println!("  → {} services, {} bytes", report.services.len(), bytes);
        info!(
            path = %path.display(),
            services = report.services.len(),
            overall = ?report.overall_status,
            "status file written"
        );
    }
    Ok(())
}

async fn generate_window(
    db: &Db,
    window: &WindowSpec,
    services: &ServiceMap,
    now: DateTime<Utc>,
) -> Result<Report> {
    match window.source {
        WindowSource::Bucketed { bucket_minutes, slots } => {
            println!("Generating {} (bucketed)...", window.file_name());
            let plan = BucketPlan {
                days: window.days,
                bucket_minutes,
                slots,
                min_requests: window.min_requests,
            };
            generate_bucketed(db, &plan, window.granularity, services, now).await
        }
        WindowSource::Daily => {
            println!("Generating {} (daily)...", window.file_name());
            generate_daily(db, window.days, window.granularity, window.min_requests, now).await
        }
    }
}
