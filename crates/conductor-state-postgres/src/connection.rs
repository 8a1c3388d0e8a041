use conductor_core::CoreError;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{is_already_exists, map_sqlx_err};
use crate::migrations;

/// Database connection manager for Postgres
#[derive(Clone)]
pub struct PostgresConnection {
    pub(crate) pool: PgPool,
}

impl PostgresConnection {
    /// Create a new PostgreSQL connection pool
    pub async fn new(
        connection_string: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(connection_string)
            .await
            .map_err(|e| map_sqlx_err("Failed to connect to database", e))?;

        debug!("Connected to PostgreSQL database");
        Ok(Self { pool })
    }

    /// Create the tables if they do not exist
    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        info!("Running database migrations");

        for (name, sql) in migrations::generate_migrations() {
            debug!(migration = name, "Applying migration");
            match sqlx::raw_sql(sql).execute(&self.pool).await {
                Ok(_) => {}
                // another node created the same tables concurrently
                Err(e) if is_already_exists(&e) => {
                    debug!(migration = name, "Migration applied concurrently");
                }
                Err(e) => {
                    return Err(map_sqlx_err(&format!("Migration '{}' failed", name), e));
                }
            }
        }

        info!("Migrations completed successfully");
        Ok(())
    }

    /// Get a reference to the database pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
