//! Run Registry - durable store of runs with querying and tagging

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::FromSql;
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use tracing::{debug, info};
use uuid::Uuid;

use super::run_record::StoredState;
use super::{ArtifactRecord, ExperimentRecord, MetricRecord, RunRecord, RunStatus, SearchQuery};
use crate::db::{Database, DEFAULT_BUSY_TIMEOUT};
use crate::topk::top_k_runs;
use crate::{Error, Result};

/// Run registry operations consumed by trainers, the selector and the promoter.
///
/// Implementations must make `set_tag` idempotent (one value per key, last
/// write wins) and must assign `run_id`s themselves.
pub trait RunRegistry: Send + Sync + 'static {
    /// Create an experiment, or return the existing one with the same name.
    fn create_experiment(&self, name: &str) -> Result<ExperimentRecord>;

    /// Look up an experiment by name.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>>;

    /// Create a new run in `Running` status.
    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunRecord>;

    /// Fetch a run by ID.
    fn get_run(&self, run_id: &str) -> Result<RunRecord>;

    /// Record a parameter on an unfinished run.
    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Record a metric data point on an unfinished run.
    fn log_metric(&self, run_id: &str, key: &str, step: u64, value: f64) -> Result<()>;

    /// Record the run's fitted-model artifact. Write-once.
    fn set_artifact(&self, run_id: &str, artifact: ArtifactRecord) -> Result<()>;

    /// Move a run to a terminal status.
    fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Metric history for one key, ordered by step.
    fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>>;

    /// Runs of one experiment, ordered and limited per `query`.
    fn search_runs(&self, query: &SearchQuery) -> Result<Vec<RunRecord>>;

    /// Set a tag on a run.
    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a tag from a run. Removing an absent tag is a no-op.
    fn delete_tag(&self, run_id: &str, key: &str) -> Result<()>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS experiments (
    experiment_id TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    description   TEXT,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS runs (
    run_id        TEXT PRIMARY KEY,
    experiment_id TEXT NOT NULL REFERENCES experiments(experiment_id),
    run_name      TEXT NOT NULL,
    sequence      INTEGER NOT NULL UNIQUE,
    status        TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    started_at    TEXT,
    ended_at      TEXT,
    artifact      TEXT
);
CREATE INDEX IF NOT EXISTS runs_by_experiment ON runs (experiment_id, status);
CREATE TABLE IF NOT EXISTS params (
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    key    TEXT NOT NULL,
    value  TEXT NOT NULL,
    PRIMARY KEY (run_id, key)
);
CREATE TABLE IF NOT EXISTS metrics (
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    key    TEXT NOT NULL,
    value  REAL NOT NULL,
    PRIMARY KEY (run_id, key)
);
CREATE TABLE IF NOT EXISTS metric_history (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id    TEXT NOT NULL REFERENCES runs(run_id),
    key       TEXT NOT NULL,
    step      INTEGER NOT NULL,
    value     REAL NOT NULL,
    logged_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS metric_history_by_key ON metric_history (run_id, key, step);
CREATE TABLE IF NOT EXISTS tags (
    run_id TEXT NOT NULL REFERENCES runs(run_id),
    key    TEXT NOT NULL,
    value  TEXT NOT NULL,
    PRIMARY KEY (run_id, key)
);
";

const RUN_COLUMNS: &str =
    "run_id, experiment_id, run_name, sequence, status, created_at, started_at, ended_at, artifact";

/// Local run registry backed by SQLite.
///
/// Handles opened on the same file share state, whether they live in one
/// process or several. Each mutation loads the run, applies the change
/// through [`RunRecord`]'s lifecycle rules and writes it back in one
/// transaction, so a rejected or failed write changes nothing.
#[derive(Debug)]
pub struct LocalRunRegistry {
    db: Database,
}

impl LocalRunRegistry {
    /// Registry in a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            db: Database::in_memory(SCHEMA, "run registry")?,
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

    /// [`LocalRunRegistry::open`] with an explicit wait for concurrent writers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        Ok(Self {
            db: Database::open(path.as_ref(), busy_timeout, SCHEMA, "run registry")?,
        })
    }

    fn with_run<T>(
        &self,
        run_id: &str,
        f: impl FnOnce(&mut RunRecord) -> Result<T>,
    ) -> Result<T> {
        self.db.write(|tx| {
            let mut run = load_run(tx, run_id)?.ok_or_else(|| Error::not_found("run", run_id))?;
            let out = f(&mut run)?;
            store_run(tx, &run)?;
            Ok(out)
        })
    }
}

impl RunRegistry for LocalRunRegistry {
    fn create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        if name.trim().is_empty() {
            return Err(Error::InvalidInput("experiment name is empty".to_string()));
        }
        self.db.write(|tx| {
            if let Some(existing) = experiment_by_name(tx, name)? {
                return Ok(existing);
            }
            let experiment = ExperimentRecord::new(Uuid::new_v4().to_string(), name);
            tx.execute(
                "INSERT INTO experiments (experiment_id, name, description, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    experiment.experiment_id(),
                    experiment.name(),
                    experiment.description(),
                    experiment.created_at()
                ],
            )?;
            info!(
                experiment_id = experiment.experiment_id(),
                experiment = name,
                "created experiment"
            );
            Ok(experiment)
        })
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        self.db.read(|tx| experiment_by_name(tx, name))
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunRecord> {
        self.db.write(|tx| {
            let known: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM experiments WHERE experiment_id = ?1",
                    params![experiment_id],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(Error::not_found("experiment", experiment_id));
            }

            let sequence: u64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence) + 1, 0) FROM runs",
                [],
                |row| row.get(0),
            )?;
            let mut run = RunRecord::builder(Uuid::new_v4().simple().to_string(), experiment_id)
                .run_name(run_name)
                .sequence(sequence)
                .build();
            run.start();
            store_run(tx, &run)?;
            debug!(run_id = run.run_id(), run_name, sequence, "created run");
            Ok(run)
        })
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.db
            .read(|tx| load_run(tx, run_id))?
            .ok_or_else(|| Error::not_found("run", run_id))
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.with_run(run_id, |run| run.log_param(key, value))
    }

    fn log_metric(&self, run_id: &str, key: &str, step: u64, value: f64) -> Result<()> {
        self.db.write(|tx| {
            let mut run = load_run(tx, run_id)?.ok_or_else(|| Error::not_found("run", run_id))?;
            run.record_metric(key, value)?;
            store_run(tx, &run)?;

            let point = MetricRecord::new(run_id, key, step, value);
            tx.execute(
                "INSERT INTO metric_history (run_id, key, step, value, logged_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![run_id, key, step, value, point.timestamp()],
            )?;
            Ok(())
        })
    }

    fn set_artifact(&self, run_id: &str, artifact: ArtifactRecord) -> Result<()> {
        self.with_run(run_id, |run| run.attach_artifact(artifact))
    }

    fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.with_run(run_id, |run| run.finish(status))?;
        info!(run_id, ?status, "run finished");
        Ok(())
    }

    fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>> {
        self.db.read(|tx| {
            let known: Option<i64> = tx
                .query_row("SELECT 1 FROM runs WHERE run_id = ?1", params![run_id], |row| {
                    row.get(0)
                })
                .optional()?;
            if known.is_none() {
                return Err(Error::not_found("run", run_id));
            }

            let mut stmt = tx.prepare_cached(
                "SELECT step, value, logged_at FROM metric_history
                 WHERE run_id = ?1 AND key = ?2
                 ORDER BY step, id",
            )?;
            let points = stmt.query_map(params![run_id, key], |row| {
                let logged_at: DateTime<Utc> = row.get(2)?;
                Ok(MetricRecord::new(run_id, key, row.get(0)?, row.get(1)?).at(logged_at))
            })?;
            Ok(points.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn search_runs(&self, query: &SearchQuery) -> Result<Vec<RunRecord>> {
        let runs = self.db.read(|tx| {
            let known: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM experiments WHERE experiment_id = ?1",
                    params![query.experiment_id()],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(Error::not_found("experiment", query.experiment_id()));
            }

            let rows = {
                let mut stmt = tx.prepare_cached(&format!(
                    "SELECT {RUN_COLUMNS} FROM runs
                     WHERE experiment_id = ?1 AND (?2 IS NULL OR status = ?2)"
                ))?;
                let rows = stmt.query_map(
                    params![query.experiment_id(), query.status().map(RunStatus::as_str)],
                    run_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            rows.into_iter()
                .map(|row| assemble(tx, row))
                .collect::<Result<Vec<_>>>()
        })?;

        top_k_runs(
            &runs,
            query.order_by().metric(),
            query.limit(),
            query.order_by().order(),
        )
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.with_run(run_id, |run| {
            run.set_tag(key, value);
            Ok(())
        })
    }

    fn delete_tag(&self, run_id: &str, key: &str) -> Result<()> {
        self.with_run(run_id, |run| {
            run.remove_tag(key);
            Ok(())
        })
    }
}

fn experiment_by_name(conn: &Connection, name: &str) -> Result<Option<ExperimentRecord>> {
    Ok(conn
        .query_row(
            "SELECT experiment_id, name, created_at, description FROM experiments WHERE name = ?1",
            params![name],
            |row| {
                Ok(ExperimentRecord::restore(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                ))
            },
        )
        .optional()?)
}

/// `runs` row before params, metrics and tags are attached.
struct RunRow {
    run_id: String,
    experiment_id: String,
    run_name: String,
    sequence: u64,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    artifact: Option<String>,
}

fn run_row(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        run_id: row.get(0)?,
        experiment_id: row.get(1)?,
        run_name: row.get(2)?,
        sequence: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        ended_at: row.get(7)?,
        artifact: row.get(8)?,
    })
}

fn load_run(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
    conn.query_row(
        &format!("SELECT {RUN_COLUMNS} FROM runs WHERE run_id = ?1"),
        params![run_id],
        run_row,
    )
    .optional()?
    .map(|row| assemble(conn, row))
    .transpose()
}

fn assemble(conn: &Connection, row: RunRow) -> Result<RunRecord> {
    let state = StoredState {
        status: row.status.parse()?,
        started_at: row.started_at,
        ended_at: row.ended_at,
        params: key_values(conn, "params", &row.run_id)?,
        metrics: key_values(conn, "metrics", &row.run_id)?,
        tags: key_values(conn, "tags", &row.run_id)?,
        artifact: row
            .artifact
            .as_deref()
            .map(serde_json::from_str::<ArtifactRecord>)
            .transpose()?,
    };
    Ok(RunRecord::builder(row.run_id, row.experiment_id)
        .run_name(row.run_name)
        .sequence(row.sequence)
        .created_at(row.created_at)
        .restore(state))
}

fn key_values<V: FromSql>(
    conn: &Connection,
    table: &'static str,
    run_id: &str,
) -> Result<BTreeMap<String, V>> {
    let mut stmt = conn.prepare_cached(&format!("SELECT key, value FROM {table} WHERE run_id = ?1"))?;
    let pairs = stmt.query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(pairs.collect::<rusqlite::Result<BTreeMap<String, V>>>()?)
}

fn replace_key_values<V: ToSql>(
    conn: &Connection,
    table: &'static str,
    run_id: &str,
    values: &BTreeMap<String, V>,
) -> Result<()> {
    conn.execute(&format!("DELETE FROM {table} WHERE run_id = ?1"), params![run_id])?;
    let mut stmt =
        conn.prepare_cached(&format!("INSERT INTO {table} (run_id, key, value) VALUES (?1, ?2, ?3)"))?;
    for (key, value) in values {
        stmt.execute(params![run_id, key, value])?;
    }
    Ok(())
}

fn store_run(conn: &Connection, run: &RunRecord) -> Result<()> {
    let artifact = run.artifact().map(serde_json::to_string).transpose()?;
    conn.execute(
        &format!(
            "INSERT INTO runs ({RUN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (run_id) DO UPDATE SET
                 status = excluded.status,
                 started_at = excluded.started_at,
                 ended_at = excluded.ended_at,
                 artifact = excluded.artifact"
        ),
        params![
            run.run_id(),
            run.experiment_id(),
            run.run_name(),
            run.sequence(),
            run.status().as_str(),
            run.created_at(),
            run.started_at(),
            run.ended_at(),
            artifact
        ],
    )?;
    replace_key_values(conn, "params", run.run_id(), run.params())?;
    replace_key_values(conn, "metrics", run.run_id(), run.metrics())?;
    replace_key_values(conn, "tags", run.run_id(), run.tags())?;
    Ok(())
}
