//! Local model registry backed by SQLite.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use tracing::info;

use super::{ModelRegistry, ModelVersion};
use crate::artifact::ArtifactUri;
use crate::db::{Database, DEFAULT_BUSY_TIMEOUT};
use crate::{Error, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS model_versions (
    name          TEXT NOT NULL,
    version       INTEGER NOT NULL,
    source_run_id TEXT NOT NULL,
    artifact_uri  TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (name, version)
);
";

const VERSION_COLUMNS: &str = "name, version, source_run_id, artifact_uri, created_at";

/// Model registry stored in a SQLite file (or in memory).
///
/// The next version is read and inserted inside one `BEGIN IMMEDIATE`
/// transaction, so concurrent registrations under one name never observe
/// the same version, even from separate handles or processes. Lookups
/// always query the database; a version registered through another handle
/// is visible on the next call.
#[derive(Debug)]
pub struct LocalModelRegistry {
    db: Database,
}

impl LocalModelRegistry {
    /// Registry in a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::in_memory(SCHEMA, "model registry")?,
        })
    }

    /// Open (or create) a registry database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// [`LocalModelRegistry::open`] with an explicit wait for concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        Ok(Self {
            db: Database::open(path.as_ref(), busy_timeout, SCHEMA, "model registry")?,
        })
    }
}

fn version_row(row: &Row<'_>) -> rusqlite::Result<ModelVersion> {
    Ok(ModelVersion {
        name: row.get(0)?,
        version: row.get(1)?,
        source_run_id: row.get(2)?,
        artifact_uri: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_one<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<Option<ModelVersion>> {
    Ok(conn.query_row(sql, params, version_row).optional()?)
}

impl ModelRegistry for LocalModelRegistry {
    fn register_model(&self, artifact_uri: &str, name: &str) -> Result<ModelVersion> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("model name is empty".to_string()));
        }
        let source = ArtifactUri::parse(artifact_uri)?;

        let model = self.db.write(|tx| {
            let version: u64 = tx.query_row(
                "SELECT COALESCE(MAX(version), 0) + 1 FROM model_versions WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )?;
            let model = ModelVersion {
                name: name.to_string(),
                version,
                source_run_id: source.run_id.to_string(),
                artifact_uri: artifact_uri.to_string(),
                created_at: Utc::now(),
            };
            tx.execute(
                &format!("INSERT INTO model_versions ({VERSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    model.name,
                    model.version,
                    model.source_run_id,
                    model.artifact_uri,
                    model.created_at
                ],
            )?;
            Ok(model)
        })?;

        info!(
            model = name,
            version = model.version,
            run_id = model.source_run_id(),
            "registered model version"
        );
        Ok(model)
    }

    fn get_version(&self, name: &str, version: u64) -> Result<ModelVersion> {
        self.db
            .read(|tx| {
                query_one(
                    tx,
                    &format!(
                        "SELECT {VERSION_COLUMNS} FROM model_versions WHERE name = ?1 AND version = ?2"
                    ),
                    params![name, version],
                )
            })?
            .ok_or_else(|| Error::not_found("model version", format!("{name} v{version}")))
    }

    fn latest_version(&self, name: &str) -> Result<Option<ModelVersion>> {
        self.db.read(|tx| {
            query_one(
                tx,
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM model_versions
                     WHERE name = ?1 ORDER BY version DESC LIMIT 1"
                ),
                params![name],
            )
        })
    }

    fn list_versions(&self, name: &str) -> Result<Vec<ModelVersion>> {
        self.db.read(|tx| {
            let mut stmt = tx.prepare_cached(&format!(
                "SELECT {VERSION_COLUMNS} FROM model_versions WHERE name = ?1 ORDER BY version"
            ))?;
            let versions = stmt.query_map(params![name], version_row)?;
            Ok(versions.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}
