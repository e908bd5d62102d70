//! pgvector (PostgreSQL) vector store backend.
//!
//! Provides [`PgVectorStore`] which implements [`VectorStore`] using
//! [sqlx](https://docs.rs/sqlx) with the
//! [pgvector](https://github.com/pgvector/pgvector) PostgreSQL extension.
//!
//! # Prerequisites
//!
//! - PostgreSQL with the `pgvector` extension installed
//! - [`PgVectorStore::create_collection`] run once, or the table created by hand
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_core::pgvector::PgVectorStore;
//!
//! let store = PgVectorStore::connect(&config.database_config(), embedder).await?;
//! store.create_collection().await?;
//! store.add(&texts, Some(&metadatas), None).await?;
//! let results = store.similarity_search("query", 4).await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::document::{Metadata, SearchResult};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::settings::DatabaseConfig;
use crate::vectorstore::{
    DEFAULT_BATCH_SIZE, VectorStore, plan_batches, resolve_embeddings, validate_add_inputs,
};

/// Connection options from the database section, TLS required.
///
/// Credentials are set as typed fields, so they need no URL escaping.
pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.dbname)
        .username(&config.user)
        .ssl_mode(PgSslMode::Require);
    match config.password.as_deref() {
        Some(password) => options.password(password),
        None => options,
    }
}

/// A [`VectorStore`] backed by PostgreSQL with the pgvector extension.
///
/// A collection is stored in the table `rag_<collection>` with columns
/// `row_id` (serial key), `local_id` (batch-local id), `content`,
/// `embedding` (vector) and `metadata` (jsonb). Scores are cosine distances.
pub struct PgVectorStore {
    pool: PgPool,
    table: String,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

impl PgVectorStore {
    /// Connect using the database section of the configuration (TLS required).
    pub async fn connect(config: &DatabaseConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        info!(url = %config.redacted_url(), collection = %config.collection_name, "connecting to pgvector");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options(config))
            .await
            .map_err(Self::map_err)?;
        Ok(Self::from_pool(pool, &config.collection_name, embedder)?.with_batch_size(config.batch_size))
    }

    /// Create a store over an existing connection pool.
    pub fn from_pool(pool: PgPool, collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self {
            pool,
            table: sanitize_table_name(collection)?,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Set the number of rows written per insert statement.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the extension and the collection table sized to the embedder.
    pub async fn create_collection(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(Self::map_err)?;

        let dimensions = self.embedder.dimensions();
        let create_sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                row_id BIGSERIAL PRIMARY KEY, \
                local_id BIGINT NOT NULL, \
                content TEXT NOT NULL, \
                embedding vector({dimensions}), \
                metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb\
            )",
            table = self.table
        );
        sqlx::query(&create_sql).execute(&self.pool).await.map_err(Self::map_err)?;

        debug!(table = %self.table, dimensions, "created pgvector table");
        Ok(())
    }

    fn map_err(e: sqlx::Error) -> RagError {
        RagError::VectorStore { backend: "pgvector".to_string(), message: e.to_string() }
    }
}

/// Only alphanumerics and underscores survive; the result is prefixed `rag_`.
fn sanitize_table_name(name: &str) -> Result<String> {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if sanitized.is_empty() {
        return Err(RagError::Config("collection name must not be empty".to_string()));
    }
    Ok(format!("rag_{sanitized}"))
}

/// pgvector text representation, e.g. `[1,2.5,3]`.
fn vector_literal(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding.iter().map(|v| v.to_string()).collect();
    format!("[{}]", values.join(","))
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn add(
        &self,
        texts: &[String],
        metadatas: Option<&[Metadata]>,
        embeddings: Option<Vec<Vec<f32>>>,
    ) -> Result<()> {
        validate_add_inputs(texts, metadatas, embeddings.as_deref())?;
        if texts.is_empty() {
            return Ok(());
        }

        let embeddings = resolve_embeddings(self.embedder.as_ref(), texts, embeddings).await?;
        for batch in plan_batches(texts, metadatas, embeddings, self.batch_size) {
            let count = batch.len();
            let mut insert = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {} (local_id, content, embedding, metadata) ",
                self.table
            ));
            insert.push_values(batch, |mut row, record| {
                row.push_bind(record.id as i64)
                    .push_bind(record.content)
                    .push_bind(vector_literal(&record.embedding))
                    .push_unseparated("::vector")
                    .push_bind(Json(record.metadata));
            });
            insert.build().execute(&self.pool).await.map_err(Self::map_err)?;
            debug!(backend = "pgvector", table = %self.table, count, "inserted batch");
        }
        Ok(())
    }

    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embedder.embed_query(query).await?;

        let search_sql = format!(
            "SELECT content, (embedding <=> $1::vector)::float8 AS score \
             FROM {} \
             ORDER BY embedding <=> $1::vector \
             LIMIT $2",
            self.table
        );

        let rows = sqlx::query(&search_sql)
            .bind(vector_literal(&query_embedding))
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(Self::map_err)?;

        rows.iter()
            .map(|row| {
                let content: String = row.try_get("content").map_err(Self::map_err)?;
                let score: f64 = row.try_get("score").map_err(Self::map_err)?;
                Ok(SearchResult::new(content, score as f32))
            })
            .collect()
    }
}
