use anyhow::{Context, Result};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use tracing::{info, instrument};

use crate::config::PgSettings;

/// Single-connection handle shared by every query of a run.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    // SECURITY: never include credentials in tracing spans.
    #[instrument(skip(settings), fields(host = %settings.host, database = %settings.database))]
    pub async fn connect(settings: &PgSettings) -> Result<Self> {
        let statement_timeout_ms = settings.statement_timeout.as_millis().to_string();
        let connect_options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database)
            .statement_cache_capacity(0)
            .options([("statement_timeout", statement_timeout_ms.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(settings.connect_timeout)
            .test_before_acquire(false)
            .connect_with(connect_options)
            .await
            .with_context(|| {
                format!(
                    "failed to connect to postgres at {}:{}/{}",
                    settings.host, settings.port, settings.database
                )
            })?;
        info!(
            statement_timeout_ms = %statement_timeout_ms,
            "connected to db"
        );
        Ok(Self { pool })
    }

    /// Waits for the connection to be returned and closes it.
    pub async fn close(self) {
        self.pool.close().await;
        info!("db connection closed");
    }
}
