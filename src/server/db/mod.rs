//! Database access layer using sqlx with PostgreSQL
//!
//! Functions take a `&mut PgConnection` so they run inside the caller's
//! transaction.

pub mod companies;
pub mod configs;
pub mod phone_numbers;
pub mod pools;
pub mod sessions;
pub mod contacts;
pub mod calls;
pub mod blocked;
pub mod recordings;
pub mod ivr_progress;

use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
