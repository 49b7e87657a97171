use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::warn;

use crate::model::{ClauseMetadata, IndexedClause, QueryResult};
use crate::semantic::{
    SemanticModelConfig, cosine_distance, decode_embedding_blob, embed_text_local,
    payload_fingerprint, encode_embedding_blob, normalize_whitespace,
};
use crate::util::{ensure_directory, now_utc_string};

pub const INDEX_SCHEMA_VERSION: &str = "0.1.0";

/// Sqlite-backed clause index with locally computed embeddings.
pub struct ClauseIndex {
    connection: Connection,
    model: SemanticModelConfig,
}

/// Snapshot of an index file, for status reporting.
#[derive(Debug, Clone, Default)]
pub struct IndexStatus {
    pub schema_version: Option<String>,
    pub updated_at: Option<String>,
    pub clause_count: i64,
    pub document_count: i64,
    pub model_ids: Vec<String>,
}

struct ScoredRow {
    stable_id: String,
    doc_id: String,
    clause_id: String,
    text: String,
    distance: f64,
}

impl ClauseIndex {
    /// Opens (creating if needed) the index at `db_path` for writing.
    pub fn open(db_path: &Path, model: SemanticModelConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                ensure_directory(parent)?;
            }
        }

        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        ensure_model_entry(&connection, &model)?;

        Ok(Self { connection, model })
    }

    /// Opens an index that must already hold clauses for `model`.
    pub fn open_existing(db_path: &Path, model: SemanticModelConfig) -> Result<Self> {
        if !db_path.exists() {
            bail!(
                "clause index {} does not exist; run the index command first",
                db_path.display()
            );
        }

        let index = Self::open(db_path, model)?;
        if index.count_for_model()? == 0 {
            bail!(
                "clause index {} holds no clauses for model '{}'",
                db_path.display(),
                index.model.model_id
            );
        }

        Ok(index)
    }

    pub fn model(&self) -> &SemanticModelConfig {
        &self.model
    }

    /// Upserts one batch in a single transaction; a repeated stable id replaces its row.
    pub fn upsert_batch(&mut self, batch: &[IndexedClause]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let indexed_at = now_utc_string();
        let tx = self.connection.transaction()?;
        {
            let mut statement = tx.prepare(
                "
                INSERT INTO clauses(stable_id, doc_id, clause_id, text, text_hash, model_id, embedding, embedding_dim, indexed_at)
                VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(stable_id) DO UPDATE SET
                  doc_id=excluded.doc_id,
                  clause_id=excluded.clause_id,
                  text=excluded.text,
                  text_hash=excluded.text_hash,
                  model_id=excluded.model_id,
                  embedding=excluded.embedding,
                  embedding_dim=excluded.embedding_dim,
                  indexed_at=excluded.indexed_at
                ",
            )?;

            for clause in batch {
                let payload = normalize_whitespace(&clause.text);
                let embedding = embed_text_local(&payload, self.model.dimensions);
                statement
                    .execute(params![
                        clause.stable_id,
                        clause.doc_id,
                        clause.id,
                        clause.text,
                        payload_fingerprint(&payload),
                        self.model.model_id,
                        encode_embedding_blob(&embedding),
                        self.model.dimensions as i64,
                        indexed_at,
                    ])
                    .with_context(|| format!("failed to upsert clause {}", clause.stable_id))?;
            }
        }
        tx.execute(
            "INSERT INTO metadata(key, value) VALUES('index_updated_at', ?1)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            [&indexed_at],
        )?;
        tx.commit()?;

        Ok(batch.len())
    }

    /// Deletes every row written for this index's model; returns how many were removed.
    pub fn clear_model(&mut self) -> Result<usize> {
        let removed = self
            .connection
            .execute(
                "DELETE FROM clauses WHERE model_id = ?1",
                [&self.model.model_id],
            )
            .with_context(|| format!("failed to clear clauses for model '{}'", self.model.model_id))?;
        Ok(removed)
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM clauses", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_for_model(&self) -> Result<i64> {
        let count = self.connection.query_row(
            "SELECT COUNT(*) FROM clauses WHERE model_id = ?1",
            [&self.model.model_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Returns the `top_k` nearest clauses by cosine distance, closest first.
    pub fn query(&self, query_text: &str, top_k: usize) -> Result<QueryResult> {
        let query_embedding =
            embed_text_local(&normalize_whitespace(query_text), self.model.dimensions);

        let mut statement = self.connection.prepare(
            "
            SELECT stable_id, doc_id, clause_id, text, embedding, embedding_dim
            FROM clauses
            WHERE model_id = ?1
            ",
        )?;
        let mut rows = statement.query([&self.model.model_id])?;

        let mut scored = Vec::<ScoredRow>::new();
        while let Some(row) = rows.next()? {
            let stable_id: String = row.get(0)?;
            let row_dim = row.get::<_, i64>(5)? as usize;
            let blob: Vec<u8> = row.get(4)?;
            let Some(embedding) = decode_embedding_blob(&blob, row_dim) else {
                warn!(stable_id = %stable_id, "skipping clause with malformed embedding");
                continue;
            };
            if row_dim != self.model.dimensions {
                continue;
            }

            scored.push(ScoredRow {
                distance: cosine_distance(&query_embedding, &embedding),
                stable_id,
                doc_id: row.get(1)?,
                clause_id: row.get(2)?,
                text: row.get(3)?,
            });
        }

        scored.sort_by(|left, right| {
            left.distance
                .total_cmp(&right.distance)
                .then_with(|| left.stable_id.cmp(&right.stable_id))
        });
        scored.truncate(top_k);

        let mut result = QueryResult::default();
        for row in scored {
            result.ids.push(row.stable_id);
            result.documents.push(row.text);
            result.metadatas.push(ClauseMetadata {
                doc_id: row.doc_id,
                clause_id: row.clause_id,
            });
            result.distances.push(row.distance);
        }

        Ok(result)
    }
}

/// Reads counts and metadata without creating or migrating anything.
pub fn read_index_status(db_path: &Path) -> Result<IndexStatus> {
    // No CREATE flag: a missing file is an error rather than a fresh empty index.
    let connection = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_WRITE)
        .with_context(|| format!("failed to open {}", db_path.display()))?;

    let clause_count = connection
        .query_row("SELECT COUNT(*) FROM clauses", [], |row| row.get(0))
        .context("failed to count indexed clauses")?;
    let document_count = connection
        .query_row("SELECT COUNT(DISTINCT doc_id) FROM clauses", [], |row| row.get(0))
        .context("failed to count indexed documents")?;

    let mut statement = connection.prepare("SELECT model_id FROM embedding_models ORDER BY model_id")?;
    let model_ids = statement
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    Ok(IndexStatus {
        schema_version: read_metadata(&connection, "index_schema_version")?,
        updated_at: read_metadata(&connection, "index_updated_at")?,
        clause_count,
        document_count,
        model_ids,
    })
}

fn read_metadata(connection: &Connection, key: &str) -> Result<Option<String>> {
    let value = connection
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embedding_models (
              model_id TEXT PRIMARY KEY,
              backend TEXT NOT NULL,
              dimensions INTEGER NOT NULL,
              normalization TEXT NOT NULL,
              created_at TEXT NOT NULL,
              config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS clauses (
              stable_id TEXT PRIMARY KEY,
              doc_id TEXT NOT NULL,
              clause_id TEXT NOT NULL,
              text TEXT NOT NULL,
              text_hash TEXT NOT NULL,
              model_id TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              indexed_at TEXT NOT NULL,
              FOREIGN KEY(model_id) REFERENCES embedding_models(model_id)
            );

            CREATE INDEX IF NOT EXISTS idx_clauses_model ON clauses(model_id);
            CREATE INDEX IF NOT EXISTS idx_clauses_doc ON clauses(doc_id);
            ",
        )
        .context("failed to initialize clause index schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('index_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [INDEX_SCHEMA_VERSION],
    )?;
    Ok(())
}

fn ensure_model_entry(connection: &Connection, model: &SemanticModelConfig) -> Result<()> {
    let config_json = serde_json::to_string(model).context("failed to serialize model config")?;

    connection.execute(
        "
        INSERT INTO embedding_models(model_id, backend, dimensions, normalization, created_at, config_json)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(model_id) DO UPDATE SET
          backend=excluded.backend,
          dimensions=excluded.dimensions,
          normalization=excluded.normalization,
          config_json=excluded.config_json
        ",
        params![
            model.model_id,
            model.backend,
            model.dimensions as i64,
            model.normalization,
            now_utc_string(),
            config_json,
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{DEFAULT_MODEL_ID, resolve_model_config};

    fn clause(stable_id: &str, doc_id: &str, id: &str, text: &str) -> IndexedClause {
        IndexedClause {
            doc_id: doc_id.to_string(),
            id: id.to_string(),
            text: text.to_string(),
            stable_id: stable_id.to_string(),
        }
    }

    #[test]
    fn query_ranks_closest_clause_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("index").join("clauses.sqlite");
        let mut index = ClauseIndex::open(&db_path, resolve_model_config("")).expect("open");

        let upserted = index
            .upsert_batch(&[
                clause("gmp-1.", "gmp", "1.", "Equipment shall be cleaned after each batch"),
                clause("gmp-2.", "gmp", "2.", "Personnel shall wear protective garments"),
                clause("gmp-3.", "gmp", "3.", "Complaints shall be recorded and investigated"),
            ])
            .expect("upsert");
        assert_eq!(upserted, 3);

        let result = index
            .query("How are complaints recorded and investigated?", 2)
            .expect("query");
        assert_eq!(result.ids.len(), 2);
        assert_eq!(result.ids[0], "gmp-3.");
        assert_eq!(result.metadatas[0].clause_id, "3.");
        assert_eq!(result.documents[0], "Complaints shall be recorded and investigated");
        assert!(result.distances[0] <= result.distances[1]);
    }

    #[test]
    fn upsert_replaces_rows_with_same_stable_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clauses.sqlite");
        let mut index = ClauseIndex::open(&db_path, resolve_model_config("")).expect("open");

        index
            .upsert_batch(&[clause("a-1", "a", "1", "First text")])
            .expect("upsert");
        index
            .upsert_batch(&[clause("a-1", "a", "1", "Replacement text")])
            .expect("upsert");

        assert_eq!(index.count().expect("count"), 1);
        let result = index.query("replacement", 5).expect("query");
        assert_eq!(result.documents, vec!["Replacement text".to_string()]);
    }

    #[test]
    fn status_reads_counts_and_schema_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clauses.sqlite");
        {
            let mut index = ClauseIndex::open(&db_path, resolve_model_config("")).expect("open");
            index
                .upsert_batch(&[
                    clause("a-1", "a", "1", "First"),
                    clause("a-2", "a", "2", "Second"),
                    clause("b-1", "b", "1", "Third"),
                ])
                .expect("upsert");
        }

        let status = read_index_status(&db_path).expect("status");
        assert_eq!(status.clause_count, 3);
        assert_eq!(status.document_count, 2);
        assert_eq!(status.schema_version.as_deref(), Some(INDEX_SCHEMA_VERSION));
        assert_eq!(status.model_ids, vec![DEFAULT_MODEL_ID.to_string()]);
        assert!(status.updated_at.is_some());
    }

    #[test]
    fn updated_at_tracks_writes_not_opens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clauses.sqlite");
        ClauseIndex::open(&db_path, resolve_model_config("")).expect("create");
        assert_eq!(read_index_status(&db_path).expect("status").updated_at, None);

        {
            let mut index = ClauseIndex::open(&db_path, resolve_model_config("")).expect("open");
            index
                .upsert_batch(&[clause("a-1", "a", "1", "First")])
                .expect("upsert");
        }
        let written = read_index_status(&db_path).expect("status").updated_at;
        assert!(written.is_some());

        ClauseIndex::open_existing(&db_path, resolve_model_config("")).expect("reopen");
        assert_eq!(read_index_status(&db_path).expect("status").updated_at, written);
    }

    #[test]
    fn clear_model_only_removes_rows_of_that_model() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clauses.sqlite");
        {
            let mut other = ClauseIndex::open(&db_path, resolve_model_config("other")).expect("open");
            other
                .upsert_batch(&[clause("b-1", "b", "1", "Kept")])
                .expect("upsert");
        }

        let mut index = ClauseIndex::open(&db_path, resolve_model_config("")).expect("open");
        index
            .upsert_batch(&[
                clause("a-1", "a", "1", "Dropped"),
                clause("a-2", "a", "2", "Dropped too"),
            ])
            .expect("upsert");

        assert_eq!(index.clear_model().expect("clear"), 2);
        assert_eq!(index.count().expect("count"), 1);
    }

    #[test]
    fn open_existing_rejects_missing_or_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("clauses.sqlite");
        assert!(ClauseIndex::open_existing(&db_path, resolve_model_config("")).is_err());

        ClauseIndex::open(&db_path, resolve_model_config("")).expect("create");
        assert!(ClauseIndex::open_existing(&db_path, resolve_model_config("")).is_err());
    }
}
