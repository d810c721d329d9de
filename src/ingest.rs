//! Upload pipeline: extract → chunk → embed → store.
//!
//! Used by both `POST /api/documents` and `docchat upload`. Embedding runs
//! before anything is written, so a provider failure leaves the collection
//! unchanged.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::chunk::chunk_text;
use crate::collection::{self, NewDocument};
use crate::config::Config;
use crate::embedding;
use crate::extract::{self, DocumentKind};
use crate::interaction_log::{log_interaction, LogEntry};
use crate::paths::{collection_name, DataLayout};

/// Upload failures caused by the request rather than the server.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("could not extract text from {0}")]
    NoText(String),
    #[error("embeddings are disabled; set [embedding].provider to upload documents")]
    EmbeddingDisabled,
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    pub document_id: String,
    pub filename: String,
    pub file_type: String,
    pub file_size: u64,
    pub chunks: usize,
}

/// Ingest one uploaded file into the user's collection.
pub async fn ingest_upload(
    config: &Config,
    pool: &SqlitePool,
    layout: &DataLayout,
    email: &str,
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<UploadSummary> {
    if !config.embedding.is_enabled() {
        return Err(IngestError::EmbeddingDisabled.into());
    }

    let text = extract::extract_text(filename, content_type, bytes)?;
    if text.trim().is_empty() {
        return Err(IngestError::NoText(filename.to_string()).into());
    }

    let file_type = DocumentKind::detect(filename, content_type)
        .map(|k| k.mime().to_string())
        .or_else(|| content_type.map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let document_id = Uuid::new_v4().to_string();
    let chunks = chunk_text(&document_id, &text, config.chunking.max_tokens);

    let provider = embedding::create_provider(&config.embedding)?;
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedding::embed_texts(&config.embedding, &texts).await?;
    let expected_dims = provider.dims();
    if let Some(v) = vectors.iter().find(|v| expected_dims != 0 && v.len() != expected_dims) {
        bail!(
            "embedding model {} returned {} dimensions, expected {}",
            provider.model_name(),
            v.len(),
            expected_dims
        );
    }

    let collection = collection_name(email);
    let doc = NewDocument {
        id: &document_id,
        filename,
        file_type: &file_type,
        file_size: bytes.len() as i64,
        body: &text,
    };
    collection::add_document(
        pool,
        &collection,
        &doc,
        &chunks,
        &vectors,
        provider.model_name(),
    )
    .await?;

    log_interaction(
        layout,
        email,
        LogEntry::file_upload(filename, &file_type, bytes.len() as u64),
    )?;

    tracing::info!(
        user = %email,
        filename = %filename,
        chunks = chunks.len(),
        "document ingested"
    );

    Ok(UploadSummary {
        document_id,
        filename: filename.to_string(),
        file_type,
        file_size: bytes.len() as u64,
        chunks: chunks.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::migrate::apply_schema;
    use httpmock::{Method::POST, MockServer};
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn setup(embed_url: &str) -> (Config, SqlitePool, TempDir) {
        let tmp = TempDir::new().unwrap();
        let toml = format!(
            r#"
[db]
path = "{db}"

[storage]
data_dir = "{data}"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
url = "{url}"
max_retries = 0
"#,
            db = tmp.path().join("db.sqlite").display(),
            data = tmp.path().join("data").display(),
            url = embed_url,
        );
        let config = parse_config(&toml).unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        (config, pool, tmp)
    }

    #[tokio::test]
    async fn upload_stores_chunks_and_logs() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(serde_json::json!({ "embeddings": [[0.5, 0.5]] }));
            })
            .await;

        let (config, pool, _tmp) = setup(&server.base_url()).await;
        let layout = DataLayout::new(&config.storage.data_dir);

        let summary = ingest_upload(
            &config,
            &pool,
            &layout,
            "ana@example.com",
            "notes.txt",
            None,
            b"Refunds are accepted within 30 days.",
        )
        .await
        .unwrap();

        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.file_type, "text/plain");
        let collection = collection_name("ana@example.com");
        assert_eq!(collection::count(&pool, &collection).await.unwrap(), 1);

        let logs = crate::interaction_log::load_logs(&layout, "ana@example.com").unwrap();
        assert!(matches!(&logs[0], LogEntry::FileUpload { filename, .. } if filename == "notes.txt"));
    }

    #[tokio::test]
    async fn embedding_failure_stores_nothing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(400).body("bad model");
            })
            .await;

        let (config, pool, _tmp) = setup(&server.base_url()).await;
        let layout = DataLayout::new(&config.storage.data_dir);

        let result = ingest_upload(
            &config,
            &pool,
            &layout,
            "ana@example.com",
            "notes.txt",
            None,
            b"Some text.",
        )
        .await;
        assert!(result.is_err());
        let collection = collection_name("ana@example.com");
        assert!(collection::list_documents(&pool, &collection)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn blank_document_is_rejected() {
        let (config, pool, _tmp) = setup("http://127.0.0.1:9").await;
        let layout = DataLayout::new(&config.storage.data_dir);
        let err = ingest_upload(&config, &pool, &layout, "a@x.io", "empty.txt", None, b"  \n ")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::NoText(name)) if name == "empty.txt"
        ));
    }

    #[tokio::test]
    async fn disabled_embeddings_reject_upload() {
        let (mut config, pool, _tmp) = setup("http://127.0.0.1:9").await;
        config.embedding.provider = "disabled".to_string();
        let layout = DataLayout::new(&config.storage.data_dir);
        let err = ingest_upload(&config, &pool, &layout, "a@x.io", "notes.txt", None, b"Text.")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::EmbeddingDisabled)
        ));
    }

    #[tokio::test]
    async fn provider_error_mentioning_disabled_is_not_typed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(403).body("account disabled");
            })
            .await;

        let (config, pool, _tmp) = setup(&server.base_url()).await;
        let layout = DataLayout::new(&config.storage.data_dir);
        let err = ingest_upload(&config, &pool, &layout, "a@x.io", "notes.txt", None, b"Text.")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("account disabled"));
        assert!(err.downcast_ref::<IngestError>().is_none());
    }

    #[tokio::test]
    async fn configured_dims_must_match() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200)
                    .json_body(serde_json::json!({ "embeddings": [[0.5, 0.5]] }));
            })
            .await;

        let (mut config, pool, _tmp) = setup(&server.base_url()).await;
        config.embedding.dims = Some(3);
        let layout = DataLayout::new(&config.storage.data_dir);
        let err = ingest_upload(&config, &pool, &layout, "a@x.io", "notes.txt", None, b"Text.")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("returned 2 dimensions, expected 3"));
        assert_eq!(
            collection::count(&pool, &collection_name("a@x.io")).await.unwrap(),
            0
        );
    }
}
