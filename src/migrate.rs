//! Schema creation.
//!
//! Four tables: `sources`, `items`, `queries`, `relevance_records`. Every
//! statement is `IF NOT EXISTS`, so running this against an existing store
//! is a no-op. Timestamp columns are declared `TIMESTAMP` and hold whatever
//! the configured [`TimestampCodec`](crate::codec::TimestampCodec) writes.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            name TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            last_consumed_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // (identity, source_name) is enforced here, not by a lookup before insert
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identity TEXT NOT NULL,
            source_name TEXT NOT NULL,
            title TEXT NOT NULL,
            link TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            published_at TIMESTAMP NOT NULL,
            fetched_at TIMESTAMP NOT NULL,
            UNIQUE(identity, source_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No foreign key to items: retention may delete the resolving item,
    // the resolution itself is permanent.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            text TEXT NOT NULL UNIQUE,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_by_identity TEXT,
            resolved_by_source TEXT,
            resolved_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL,
            CHECK (resolved = 0 OR resolved_by_identity IS NOT NULL)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS relevance_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL,
            query_id INTEGER NOT NULL,
            score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
            label TEXT NOT NULL,
            explanation TEXT NOT NULL DEFAULT '',
            key_information TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            raw_response TEXT NOT NULL DEFAULT '',
            evaluated_at TIMESTAMP NOT NULL,
            FOREIGN KEY (item_id) REFERENCES items(id),
            FOREIGN KEY (query_id) REFERENCES queries(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_name)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_fetched_at ON items(fetched_at)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_query ON relevance_records(query_id, score DESC)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_item ON relevance_records(item_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queries_open ON queries(resolved)")
        .execute(pool)
        .await?;

    Ok(())
}
