use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

use super::{
    rank_and_truncate, Fingerprint, IndexEntry, IndexFilter, IndexStore, RunRecord, RunStatus,
    ScoredChunk,
};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::IndexError;
use crate::migrate;
use crate::models::{Chunk, ChunkMetadata};

const CHUNK_COLUMNS: &str = "id, document_id, chunk_index, text, word_count, source_id, \
     priority, hash, title, origin_ref, version_tag, section, tags";

/// SQLite-backed index.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open the database at `path`, creating the schema if needed.
    pub async fn open(path: &Path) -> Result<Self, IndexError> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Append `WHERE ...` for a filter.
fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &IndexFilter) {
    qb.push(" WHERE 1 = 1");
    if !filter.sources.is_empty() {
        qb.push(" AND source_id IN (");
        let mut sep = qb.separated(", ");
        for s in &filter.sources {
            sep.push_bind(s.clone());
        }
        sep.push_unseparated(")");
    }
    if let Some(v) = &filter.version_tag {
        qb.push(" AND version_tag = ");
        qb.push_bind(v.clone());
    }
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk, IndexError> {
    let id: String = row.try_get("id")?;
    let word_count: i64 = row.try_get("word_count")?;
    let priority: i64 = row.try_get("priority")?;
    let priority = u32::try_from(priority).map_err(|_| IndexError::Corrupt {
        chunk_id: id.clone(),
        reason: format!("priority out of range: {}", priority),
    })?;
    Ok(Chunk {
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        text: row.try_get("text")?,
        word_count: word_count.max(0) as usize,
        source_id: row.try_get("source_id")?,
        priority,
        hash: row.try_get("hash")?,
        metadata: ChunkMetadata {
            title: row.try_get("title")?,
            origin_ref: row.try_get("origin_ref")?,
            version_tag: row.try_get("version_tag")?,
            section: row.try_get("section")?,
            tags: split_tags(&row.try_get::<String, _>("tags")?),
        },
        id,
    })
}

/// Tags are stored comma-joined.
fn split_tags(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl IndexStore for SqliteIndex {
    async fn begin_run(&self, source_id: &str) -> Result<i64, IndexError> {
        let result = sqlx::query("INSERT INTO runs (source_id, started_at, status) VALUES (?, ?, ?)")
            .bind(source_id)
            .bind(chrono::Utc::now().timestamp())
            .bind(RunStatus::Running.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn finish_run(&self, run_id: i64, status: RunStatus) -> Result<(), IndexError> {
        sqlx::query("UPDATE runs SET finished_at = ?, status = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(status.as_str())
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn last_run(&self, source_id: &str) -> Result<Option<RunRecord>, IndexError> {
        let row = sqlx::query(
            "SELECT id, source_id, started_at, finished_at, status FROM runs \
             WHERE source_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| -> Result<RunRecord, IndexError> {
            Ok(RunRecord {
                id: r.try_get("id")?,
                source_id: r.try_get("source_id")?,
                started_at: r.try_get("started_at")?,
                finished_at: r.try_get("finished_at")?,
                status: r.try_get("status")?,
            })
        })
        .transpose()
    }

    async fn upsert(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        self.upsert_many(std::slice::from_ref(entry)).await
    }

    async fn upsert_many(&self, entries: &[IndexEntry]) -> Result<(), IndexError> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let c = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, text, word_count, source_id,
                                    priority, hash, title, origin_ref, version_tag, section,
                                    tags, model, dims, embedding, run_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    word_count = excluded.word_count,
                    source_id = excluded.source_id,
                    priority = excluded.priority,
                    hash = excluded.hash,
                    title = excluded.title,
                    origin_ref = excluded.origin_ref,
                    version_tag = excluded.version_tag,
                    section = excluded.section,
                    tags = excluded.tags,
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding,
                    run_id = excluded.run_id
                "#,
            )
            .bind(&c.id)
            .bind(&c.document_id)
            .bind(c.chunk_index)
            .bind(&c.text)
            .bind(c.word_count as i64)
            .bind(&c.source_id)
            .bind(c.priority as i64)
            .bind(&c.hash)
            .bind(&c.metadata.title)
            .bind(&c.metadata.origin_ref)
            .bind(&c.metadata.version_tag)
            .bind(&c.metadata.section)
            .bind(c.metadata.tags.join(","))
            .bind(&entry.model)
            .bind(entry.vector.len() as i64)
            .bind(vec_to_blob(&entry.vector))
            .bind(entry.run_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &IndexFilter,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {}, embedding FROM chunks",
            CHUNK_COLUMNS
        ));
        push_filter(&mut qb, filter);
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let stored = blob_to_vec(&blob);
            scored.push(ScoredChunk {
                score: cosine_similarity(vector, &stored),
                chunk: row_to_chunk(row)?,
            });
        }
        rank_and_truncate(&mut scored, k);
        Ok(scored)
    }

    async fn delete_where(
        &self,
        source_id: &str,
        stale_before_run_id: i64,
    ) -> Result<u64, IndexError> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_id = ? AND run_id < ?")
            .bind(source_id)
            .bind(stale_before_run_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self, filter: &IndexFilter) -> Result<u64, IndexError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM chunks");
        push_filter(&mut qb, filter);
        let n: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn count_documents(&self, filter: &IndexFilter) -> Result<u64, IndexError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(DISTINCT document_id) FROM chunks");
        push_filter(&mut qb, filter);
        let n: i64 = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn list_source_chunks(&self, source_id: &str) -> Result<Vec<Chunk>, IndexError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM chunks WHERE source_id = ? ORDER BY id",
            CHUNK_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn fingerprints(
        &self,
        source_id: &str,
    ) -> Result<HashMap<String, Fingerprint>, IndexError> {
        let rows = sqlx::query(&format!(
            "SELECT {}, model FROM chunks WHERE source_id = ?",
            CHUNK_COLUMNS
        ))
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;
        let mut out = HashMap::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            out.insert(
                chunk.id.clone(),
                Fingerprint {
                    chunk,
                    model: row.try_get("model")?,
                },
            );
        }
        Ok(out)
    }

    async fn touch_chunks(&self, ids: &[String], run_id: i64) -> Result<(), IndexError> {
        // Stay well under SQLite's bound-parameter limit.
        for batch in ids.chunks(500) {
            let mut qb = QueryBuilder::<Sqlite>::new("UPDATE chunks SET run_id = ");
            qb.push_bind(run_id);
            qb.push(" WHERE id IN (");
            let mut sep = qb.separated(", ");
            for id in batch {
                sep.push_bind(id.clone());
            }
            sep.push_unseparated(")");
            qb.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn touch_document(&self, document_id: &str, run_id: i64) -> Result<u64, IndexError> {
        let result = sqlx::query("UPDATE chunks SET run_id = ? WHERE document_id = ?")
            .bind(run_id)
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
