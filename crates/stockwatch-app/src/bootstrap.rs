use stockwatch_core::config::DatabaseConfig;
use stockwatch_db::db::connection::{DbPool, create_pool};
use stockwatch_db::db::migrations::run_migrations;

use crate::error::AppResult;

/// ## Summary
/// Applies pending migrations, then opens the connection pool.
///
/// ## Errors
/// `DatabaseError` if the database is unreachable or a migration fails.
pub async fn connect_database(config: &DatabaseConfig) -> AppResult<DbPool> {
    run_migrations(&config.url).await?;

    let pool = create_pool(&config.url, u32::from(config.max_connections)).await?;
    tracing::info!("Database connection pool created.");

    Ok(pool)
}
