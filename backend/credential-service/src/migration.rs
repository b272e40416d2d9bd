//! Schema migration runner
//!
//! Applies `*.up.sql` files from a directory in lexical order, each exactly
//! once, tracked by file name in the `migrations` table. Each file and its
//! tracking row are committed in one transaction, so a failed file leaves no
//! record and is retried in full on the next run. The first failure aborts
//! the remaining files.

use crate::error::{CredentialError, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

/// Storage that migrations are applied to
#[async_trait]
pub trait MigrationTarget: Send + Sync {
    /// Create the tracking table if absent
    async fn ensure_tracking_table(&self) -> Result<()>;

    async fn has_run(&self, name: &str) -> Result<bool>;

    /// Execute `sql` and record `name`, atomically
    async fn apply(&self, name: &str, sql: &str) -> Result<()>;

    /// Execute `sql` and delete the record for `name`, atomically
    async fn revert(&self, name: &str, sql: &str) -> Result<()>;

    async fn recorded_count(&self) -> Result<i64>;
}

pub struct PgMigrationTarget {
    pool: PgPool,
}

impl PgMigrationTarget {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationTarget for PgMigrationTarget {
    async fn ensure_tracking_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                id BIGSERIAL PRIMARY KEY,
                migration VARCHAR(255) NOT NULL UNIQUE,
                ran_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_run(&self, name: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM migrations WHERE migration = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn apply(&self, name: &str, sql: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Unprepared, so multi-statement files run as one batch
        sqlx::Executor::execute(&mut *tx, sql).await?;

        sqlx::query("INSERT INTO migrations (migration) VALUES ($1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn revert(&self, name: &str, sql: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::Executor::execute(&mut *tx, sql).await?;

        sqlx::query("DELETE FROM migrations WHERE migration = $1")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn recorded_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM migrations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Outcome of a single runner invocation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Files executed in this run
    pub applied: Vec<String>,
    /// Files found but already recorded (or, for rollback, never recorded)
    pub skipped: Vec<String>,
}

pub struct MigrationRunner {
    target: Arc<dyn MigrationTarget>,
    path: Option<PathBuf>,
}

impl MigrationRunner {
    pub fn new(target: Arc<dyn MigrationTarget>, path: Option<PathBuf>) -> Self {
        Self { target, path }
    }

    /// Directory to read, or `None` when migrations are not configured
    fn directory(&self) -> Result<Option<&Path>> {
        let Some(path) = self.path.as_deref() else {
            warn!("Migration path not configured, skipping migrations");
            return Ok(None);
        };

        if !path.is_dir() {
            return Err(CredentialError::Migration(format!(
                "Migrations folder not found: {}",
                path.display()
            )));
        }

        Ok(Some(path))
    }

    async fn is_recorded(&self, name: &str) -> Result<bool> {
        self.target
            .has_run(name)
            .await
            .map_err(|e| CredentialError::Migration(format!("{}: tracking lookup: {}", name, e)))
    }

    /// Apply every pending `*.up.sql` file
    pub async fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let Some(dir) = self.directory()? else {
            return Ok(report);
        };

        self.target
            .ensure_tracking_table()
            .await
            .map_err(|e| CredentialError::Migration(format!("tracking table: {}", e)))?;

        for (name, path) in list_files(dir, UP_SUFFIX)? {
            if self.is_recorded(&name).await? {
                report.skipped.push(name);
                continue;
            }

            let sql = read_file(&path)?;
            if let Err(e) = self.target.apply(&name, &sql).await {
                error!(migration = %name, error = %e, "Migration failed, aborting run");
                return Err(CredentialError::Migration(format!("{}: {}", name, e)));
            }

            info!(migration = %name, "Applied migration");
            report.applied.push(name);
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Migrations complete"
        );
        Ok(report)
    }

    /// Revert recorded migrations with their `*.down.sql` files, newest first
    ///
    /// `applied` lists the `.up.sql` names whose records were removed.
    pub async fn rollback(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let Some(dir) = self.directory()? else {
            return Ok(report);
        };

        self.target
            .ensure_tracking_table()
            .await
            .map_err(|e| CredentialError::Migration(format!("tracking table: {}", e)))?;

        let mut files = list_files(dir, DOWN_SUFFIX)?;
        files.reverse();

        for (down_name, path) in files {
            let stem = down_name.strip_suffix(DOWN_SUFFIX).unwrap_or(&down_name);
            let name = format!("{}{}", stem, UP_SUFFIX);
            if !self.is_recorded(&name).await? {
                report.skipped.push(name);
                continue;
            }

            let sql = read_file(&path)?;
            if let Err(e) = self.target.revert(&name, &sql).await {
                error!(migration = %down_name, error = %e, "Rollback failed, aborting run");
                return Err(CredentialError::Migration(format!("{}: {}", down_name, e)));
            }

            info!(migration = %name, "Rolled back migration");
            report.applied.push(name);
        }

        Ok(report)
    }
}

/// `(file name, path)` pairs ending in `suffix`, sorted by name
fn list_files(dir: &Path, suffix: &str) -> Result<Vec<(String, PathBuf)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        CredentialError::Migration(format!("Cannot read {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CredentialError::Migration(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.ends_with(suffix) {
                files.push((name.to_string(), path.clone()));
            }
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CredentialError::Migration(format!("Cannot read {}: {}", path.display(), e))
    })
}
