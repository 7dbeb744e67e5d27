use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::Result;

/// Create a connection pool and run pending migrations. Called once at
/// startup by `hub-server`; workers and the HTTP front-end share the pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        crate::error::DbError::Internal(format!("migration failed: {e}"))
    })?;

    Ok(pool)
}
