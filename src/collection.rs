//! Per-user vector collections stored in SQLite.
//!
//! A collection is the set of `documents` rows sharing a `collection`
//! name (see [`crate::paths::collection_name`]) together with their chunks
//! and chunk vectors. Nearest-neighbor search is a brute-force cosine scan
//! over the collection's vectors.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::embedding;
use crate::models::{Chunk, Passage, StoredDocument};

/// A document ready to be written into a collection.
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub filename: &'a str,
    pub file_type: &'a str,
    pub file_size: i64,
    pub body: &'a str,
}

/// Store a document with its chunks and one vector per chunk, atomically.
pub async fn add_document(
    pool: &SqlitePool,
    collection: &str,
    doc: &NewDocument<'_>,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
    model: &str,
) -> Result<()> {
    if chunks.len() != vectors.len() {
        bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO documents (id, collection, filename, file_type, file_size, uploaded_at, body) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(doc.id)
    .bind(collection)
    .bind(doc.filename)
    .bind(doc.file_type)
    .bind(doc.file_size)
    .bind(chrono::Utc::now().timestamp())
    .bind(doc.body)
    .execute(&mut *tx)
    .await?;

    for (chunk, vector) in chunks.iter().zip(vectors) {
        sqlx::query(
            "INSERT INTO chunks (id, document_id, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO chunk_vectors (chunk_id, document_id, collection, model, dims, embedding) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(collection)
        .bind(model)
        .bind(vector.len() as i64)
        .bind(embedding::vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Number of embedded chunks in the collection.
pub async fn count(pool: &SqlitePool, collection: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors WHERE collection = ?")
        .bind(collection)
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Documents in the collection, oldest first.
pub async fn list_documents(pool: &SqlitePool, collection: &str) -> Result<Vec<StoredDocument>> {
    let rows = sqlx::query(
        r#"
        SELECT d.id, d.filename, d.file_type, d.file_size, d.uploaded_at,
               (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunks
        FROM documents d
        WHERE d.collection = ?
        ORDER BY d.uploaded_at ASC, d.rowid ASC
        "#,
    )
    .bind(collection)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let ts: i64 = row.get("uploaded_at");
            StoredDocument {
                id: row.get("id"),
                filename: row.get("filename"),
                file_type: row.get("file_type"),
                file_size: row.get("file_size"),
                uploaded_at: format_ts_iso(ts),
                chunks: row.get("chunks"),
            }
        })
        .collect())
}

/// The `n` passages most similar to `query_vec`.
///
/// Only vectors written by `model` with the query's dimensionality are
/// scored, so switching `embedding.model` never compares across vector
/// spaces. Scores are cosine similarities; equal scores keep upload order.
pub async fn query(
    pool: &SqlitePool,
    collection: &str,
    model: &str,
    query_vec: &[f32],
    n: usize,
) -> Result<Vec<Passage>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT cv.document_id, cv.embedding, c.text, d.filename
        FROM chunk_vectors cv
        JOIN chunks c ON c.id = cv.chunk_id
        JOIN documents d ON d.id = cv.document_id
        WHERE cv.collection = ? AND cv.model = ? AND cv.dims = ?
        ORDER BY d.uploaded_at ASC, d.rowid ASC, c.chunk_index ASC
        "#,
    )
    .bind(collection)
    .bind(model)
    .bind(query_vec.len() as i64)
    .fetch_all(pool)
    .await?;

    let mut passages: Vec<Passage> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            let vec = embedding::blob_to_vec(&blob);
            Passage {
                document_id: row.get("document_id"),
                filename: row.get("filename"),
                text: row.get("text"),
                score: embedding::cosine_similarity(query_vec, &vec),
            }
        })
        .collect();

    // sort_by is stable, so ties stay in upload order
    passages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    passages.truncate(n);

    Ok(passages)
}

/// Remove every document, chunk and vector in the collection.
///
/// Returns the number of documents removed.
pub async fn clear(pool: &SqlitePool, collection: &str) -> Result<u64> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "DELETE FROM chunks WHERE document_id IN (SELECT id FROM documents WHERE collection = ?)",
    )
    .bind(collection)
    .execute(&mut *tx)
    .await?;
    let removed = sqlx::query("DELETE FROM documents WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(removed)
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::chunk_text;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        pool
    }

    async fn add(pool: &SqlitePool, collection: &str, id: &str, text: &str, vecs: Vec<Vec<f32>>) {
        let chunks = chunk_text(id, text, 700);
        let filename = format!("{}.txt", id);
        let doc = NewDocument {
            id,
            filename: &filename,
            file_type: "text/plain",
            file_size: text.len() as i64,
            body: text,
        };
        add_document(pool, collection, &doc, &chunks, &vecs, "test-model")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn query_ranks_by_similarity() {
        let pool = memory_pool().await;
        add(&pool, "c1", "cats", "Cats purr.", vec![vec![1.0, 0.0]]).await;
        add(&pool, "c1", "dogs", "Dogs bark.", vec![vec![0.0, 1.0]]).await;

        let hits = query(&pool, "c1", "test-model", &[0.1, 0.9], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].filename, "dogs.txt");
        assert_eq!(hits[0].text, "Dogs bark.");
        assert!(hits[0].score > hits[1].score);

        let top = query(&pool, "c1", "test-model", &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].document_id, "cats");
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let pool = memory_pool().await;
        add(&pool, "alice", "a1", "Alice notes.", vec![vec![1.0, 0.0]]).await;
        add(&pool, "bob", "b1", "Bob notes.", vec![vec![1.0, 0.0]]).await;

        let hits = query(&pool, "alice", "test-model", &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "a1");
        assert_eq!(count(&pool, "bob").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mismatched_vectors_are_rejected() {
        let pool = memory_pool().await;
        let chunks = chunk_text("d", "One.", 700);
        let doc = NewDocument {
            id: "d",
            filename: "d.txt",
            file_type: "text/plain",
            file_size: 4,
            body: "One.",
        };
        assert!(add_document(&pool, "c", &doc, &chunks, &[], "m").await.is_err());
        assert_eq!(count(&pool, "c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_and_clear() {
        let pool = memory_pool().await;
        add(&pool, "c1", "first", "First.", vec![vec![1.0]]).await;
        add(&pool, "c1", "second", "Second.", vec![vec![1.0]]).await;
        add(&pool, "other", "x", "Other.", vec![vec![1.0]]).await;

        let docs = list_documents(&pool, "c1").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "first.txt");
        assert_eq!(docs[0].chunks, 1);
        assert!(docs[0].uploaded_at.contains('T'));

        assert_eq!(clear(&pool, "c1").await.unwrap(), 2);
        assert!(list_documents(&pool, "c1").await.unwrap().is_empty());
        assert_eq!(count(&pool, "c1").await.unwrap(), 0);
        assert_eq!(count(&pool, "other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_skips_vectors_from_other_models() {
        let pool = memory_pool().await;
        add(&pool, "c1", "old", "Old space.", vec![vec![1.0, 0.0]]).await;
        let chunks = chunk_text("new", "New space.", 700);
        let doc = NewDocument {
            id: "new",
            filename: "new.txt",
            file_type: "text/plain",
            file_size: 10,
            body: "New space.",
        };
        add_document(&pool, "c1", &doc, &chunks, &[vec![0.0, 1.0, 0.0]], "other-model")
            .await
            .unwrap();

        let hits = query(&pool, "c1", "other-model", &[1.0, 0.0, 0.0], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "new");

        // same model name, different width
        assert!(query(&pool, "c1", "test-model", &[1.0, 0.0, 0.0], 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn query_empty_collection() {
        let pool = memory_pool().await;
        assert!(query(&pool, "none", "test-model", &[1.0], 5).await.unwrap().is_empty());
        assert!(query(&pool, "none", "test-model", &[1.0], 0).await.unwrap().is_empty());
    }
}
