use sqlx::SqlitePool;

use crate::error::IndexError;

/// Create the index schema. Safe to run on every start.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), IndexError> {
    // One row per chunk: text, metadata and vector live together so an
    // upsert replaces all of them at once.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            word_count INTEGER NOT NULL,
            source_id TEXT NOT NULL,
            priority INTEGER NOT NULL,
            hash TEXT NOT NULL,
            title TEXT NOT NULL,
            origin_ref TEXT NOT NULL,
            version_tag TEXT NOT NULL,
            section TEXT,
            tags TEXT NOT NULL DEFAULT '',
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            run_id INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Indexes created before chunks carried tags.
    let has_tags: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('chunks') WHERE name = 'tags'",
    )
    .fetch_one(pool)
    .await?;
    if has_tags == 0 {
        sqlx::query("ALTER TABLE chunks ADD COLUMN tags TEXT NOT NULL DEFAULT ''")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER,
            status TEXT NOT NULL DEFAULT 'running'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id, run_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_version ON chunks(version_tag)")
        .execute(pool)
        .await?;

    Ok(())
}
