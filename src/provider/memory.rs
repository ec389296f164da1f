//! Reference in-memory provider.
//!
//! Implements every collaborator contract against a small shared store, so
//! the manager can be exercised end-to-end without a real driver. The
//! store understands a deliberately tiny script dialect:
//!
//! * `UPGRADE TO <n>`: set the schema version to `n`
//! * `SELECT VERSION`: read the schema version (scalar or reader)
//! * `FAIL <message>`: raise an execution error
//!
//! Everything else is appended to a journal, which tests (and hosts using
//! this provider as a stand-in) can inspect.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::batch::CommandParameter;
use crate::core::{DbManagerError, IsolationLevel, Result, Value};

use super::{
    BackupCreator, CleanupProcessor, ConnectionProvider, DbConnection, DbTransaction, Detection,
    ProviderContext, VersionDetector, VersionUpgrader,
};

#[derive(Debug, Default)]
struct MemoryDbInner {
    version: i64,
    damaged: bool,
    journal: Vec<String>,
}

/// Shared in-memory database store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<MemoryDbInner>>,
}

/// On-disk image written by [`MemoryBackupCreator`].
#[derive(Debug, Serialize, Deserialize)]
struct BackupImage {
    database: String,
    version: i64,
    journal: Vec<String>,
    created_at: DateTime<Utc>,
}

fn render_script(script: &str, parameters: &[CommandParameter]) -> String {
    if parameters.is_empty() {
        script.trim().to_string()
    } else {
        let rendered: Vec<String> = parameters
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect();
        format!("{} [{}]", script.trim(), rendered.join(", "))
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: i64) -> Self {
        let db = Self::new();
        if let Ok(mut inner) = db.inner.lock() {
            inner.version = version;
        }
        db
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryDbInner>> {
        Ok(self.inner.lock()?)
    }

    pub fn version(&self) -> i64 {
        self.inner.lock().map(|inner| inner.version).unwrap_or(-1)
    }

    pub fn journal(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.journal.clone())
            .unwrap_or_default()
    }

    pub fn set_damaged(&self, damaged: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.damaged = damaged;
        }
    }

    pub fn is_damaged(&self) -> bool {
        self.inner.lock().map(|inner| inner.damaged).unwrap_or(true)
    }
}

fn apply_non_query(
    inner: &mut MemoryDbInner,
    script: &str,
    parameters: &[CommandParameter],
) -> Result<u64> {
    let trimmed = script.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.starts_with("FAIL ") {
        return Err(DbManagerError::ExecutionError(format!(
            "script failed: {}",
            trimmed[5..].trim()
        )));
    }
    if let Some(rest) = upper.strip_prefix("UPGRADE TO") {
        let version: i64 = rest.trim().parse().map_err(|_| {
            DbManagerError::ExecutionError(format!("bad version in '{}'", trimmed))
        })?;
        inner.version = version;
        inner.journal.push(render_script(script, parameters));
        return Ok(1);
    }

    inner.journal.push(render_script(script, parameters));
    Ok(0)
}

// ---------------------------------------------------------------------------
// Connection / transaction handles
// ---------------------------------------------------------------------------

/// Plain auto-commit connection to a [`MemoryDatabase`].
pub struct MemoryConnection {
    db: MemoryDatabase,
    read_only: bool,
    closed: bool,
}

impl MemoryConnection {
    fn guard_open(&self) -> Result<()> {
        if self.closed {
            return Err(DbManagerError::ExecutionError(
                "Connection is closed".into(),
            ));
        }
        Ok(())
    }

    fn guard_writable(&self) -> Result<()> {
        self.guard_open()?;
        if self.read_only {
            return Err(DbManagerError::ExecutionError(
                "Connection is read-only".into(),
            ));
        }
        Ok(())
    }
}

impl DbConnection for MemoryConnection {
    fn execute_reader(
        &mut self,
        script: &str,
        parameters: &[CommandParameter],
    ) -> Result<Vec<Vec<Value>>> {
        self.guard_open()?;
        let upper = script.trim().to_ascii_uppercase();
        if upper.ends_with("SELECT VERSION") {
            let version = self.db.lock()?.version;
            return Ok(vec![vec![Value::Integer(version)]]);
        }
        self.guard_writable()?;
        let mut inner = self.db.lock()?;
        apply_non_query(&mut inner, script, parameters)?;
        Ok(Vec::new())
    }

    fn execute_scalar(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<Value> {
        self.guard_open()?;
        let upper = script.trim().to_ascii_uppercase();
        if upper.ends_with("SELECT VERSION") {
            let version = self.db.lock()?.version;
            return Ok(Value::Integer(version));
        }
        self.guard_writable()?;
        let mut inner = self.db.lock()?;
        apply_non_query(&mut inner, script, parameters)?;
        Ok(Value::Null)
    }

    fn execute_non_query(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<u64> {
        self.guard_writable()?;
        let mut inner = self.db.lock()?;
        apply_non_query(&mut inner, script, parameters)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Transaction over a [`MemoryDatabase`]: buffers writes and applies them
/// on commit; dropping without commit discards them.
pub struct MemoryTransaction {
    db: MemoryDatabase,
    read_only: bool,
    pending: Vec<(String, Vec<CommandParameter>)>,
    finished: bool,
}

impl MemoryTransaction {
    fn guard_open(&self) -> Result<()> {
        if self.finished {
            return Err(DbManagerError::ExecutionError(
                "Transaction is finished".into(),
            ));
        }
        Ok(())
    }

    fn buffer(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<u64> {
        self.guard_open()?;
        if self.read_only {
            return Err(DbManagerError::ExecutionError(
                "Transaction is read-only".into(),
            ));
        }
        let trimmed = script.trim();
        if trimmed.to_ascii_uppercase().starts_with("FAIL ") {
            return Err(DbManagerError::ExecutionError(format!(
                "script failed: {}",
                trimmed[5..].trim()
            )));
        }
        self.pending.push((script.to_string(), parameters.to_vec()));
        Ok(0)
    }
}

impl DbConnection for MemoryTransaction {
    fn execute_reader(
        &mut self,
        script: &str,
        parameters: &[CommandParameter],
    ) -> Result<Vec<Vec<Value>>> {
        self.guard_open()?;
        let upper = script.trim().to_ascii_uppercase();
        if upper.ends_with("SELECT VERSION") {
            let version = self.db.lock()?.version;
            return Ok(vec![vec![Value::Integer(version)]]);
        }
        self.buffer(script, parameters)?;
        Ok(Vec::new())
    }

    fn execute_scalar(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<Value> {
        self.guard_open()?;
        let upper = script.trim().to_ascii_uppercase();
        if upper.ends_with("SELECT VERSION") {
            let version = self.db.lock()?.version;
            return Ok(Value::Integer(version));
        }
        self.buffer(script, parameters)?;
        Ok(Value::Null)
    }

    fn execute_non_query(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<u64> {
        self.buffer(script, parameters)
    }

    fn close(&mut self) -> Result<()> {
        if !self.finished {
            self.rollback()?;
        }
        Ok(())
    }
}

impl DbTransaction for MemoryTransaction {
    fn commit(&mut self) -> Result<()> {
        self.guard_open()?;
        let mut inner = self.db.lock()?;
        for (script, parameters) in self.pending.drain(..) {
            apply_non_query(&mut inner, &script, &parameters)?;
        }
        self.finished = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.guard_open()?;
        debug!("Discarding {} buffered statement(s)", self.pending.len());
        self.pending.clear();
        self.finished = true;
        Ok(())
    }

    fn as_connection(&mut self) -> &mut dyn DbConnection {
        self
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished && !self.pending.is_empty() {
            debug!(
                "Transaction dropped without commit, discarding {} statement(s)",
                self.pending.len()
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Connection provider over a [`MemoryDatabase`].
pub struct MemoryConnectionProvider {
    db: MemoryDatabase,
    read_only_support: bool,
    failing: Arc<AtomicBool>,
}

impl MemoryConnectionProvider {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            db,
            read_only_support: true,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn without_read_only_support(mut self) -> Self {
        self.read_only_support = false;
        self
    }

    /// Make every subsequent create call fail, to exercise the manager's
    /// degraded connection path.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Shared handle to the failure toggle, usable after the provider has
    /// been moved into a manager.
    pub fn failing_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.failing)
    }
}

impl ConnectionProvider for MemoryConnectionProvider {
    fn create_connection(&self, read_only: bool) -> Option<Box<dyn DbConnection>> {
        if self.failing.load(Ordering::SeqCst) {
            error!("Connection creation failed (provider unavailable)");
            return None;
        }
        Some(Box::new(MemoryConnection {
            db: self.db.clone(),
            read_only,
            closed: false,
        }))
    }

    fn create_transaction(
        &self,
        read_only: bool,
        isolation: Option<IsolationLevel>,
    ) -> Option<Box<dyn DbTransaction>> {
        if self.failing.load(Ordering::SeqCst) {
            error!("Transaction creation failed (provider unavailable)");
            return None;
        }
        if let Some(isolation) = isolation {
            debug!("Opening transaction with isolation {:?}", isolation);
        }
        Some(Box::new(MemoryTransaction {
            db: self.db.clone(),
            read_only,
            pending: Vec::new(),
            finished: false,
        }))
    }

    fn supports_read_only(&self) -> bool {
        self.read_only_support
    }
}

/// Detector reading the version straight out of the store.
pub struct MemoryVersionDetector {
    db: MemoryDatabase,
}

impl MemoryVersionDetector {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

impl VersionDetector for MemoryVersionDetector {
    fn detect(&self, _ctx: &ProviderContext<'_>) -> Result<Detection> {
        let inner = self.db.lock()?;
        if inner.damaged {
            return Ok(Detection::version(crate::core::DAMAGED_VERSION));
        }
        Ok(Detection::version(inner.version))
    }
}

/// Upgrader advancing the store one version per step through a connection.
pub struct MemoryUpgrader {
    min: i64,
    max: i64,
}

impl MemoryUpgrader {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

impl VersionUpgrader for MemoryUpgrader {
    fn min_version(&self, _ctx: &ProviderContext<'_>) -> i64 {
        self.min
    }

    fn max_version(&self, _ctx: &ProviderContext<'_>) -> i64 {
        self.max
    }

    fn upgrade(&self, ctx: &ProviderContext<'_>, from_version: i64) -> Result<bool> {
        let Some(mut conn) = ctx.provider.create_connection(false) else {
            error!("Upgrade step {} -> {} could not open a connection", from_version, from_version + 1);
            return Ok(false);
        };
        conn.execute_non_query(&format!("UPGRADE TO {}", from_version + 1), &[])?;
        info!("Upgraded database to version {}", from_version + 1);
        Ok(true)
    }
}

/// Backup/restore writing a JSON image of the store.
pub struct MemoryBackupCreator {
    db: MemoryDatabase,
}

impl MemoryBackupCreator {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

impl BackupCreator for MemoryBackupCreator {
    fn supports_backup(&self) -> bool {
        true
    }

    fn supports_restore(&self) -> bool {
        true
    }

    fn backup(&self, ctx: &ProviderContext<'_>, target: &Path) -> Result<bool> {
        let image = {
            let inner = self.db.lock()?;
            BackupImage {
                database: ctx.config.database().to_string(),
                version: inner.version,
                journal: inner.journal.clone(),
                created_at: Utc::now(),
            }
        };

        let dir = target.parent().filter(|p| !p.as_os_str().is_empty());
        let mut file = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new()?,
        };
        serde_json::to_writer_pretty(&mut file, &image)
            .map_err(|e| DbManagerError::IoError(e.to_string()))?;
        file.persist(target)
            .map_err(|e| DbManagerError::IoError(e.to_string()))?;

        info!(
            "Backed up database '{}' (version {}) to {}",
            image.database,
            image.version,
            target.display()
        );
        Ok(true)
    }

    fn restore(&self, _ctx: &ProviderContext<'_>, source: &Path) -> Result<bool> {
        let text = std::fs::read_to_string(source)?;
        let image: BackupImage = serde_json::from_str(&text)
            .map_err(|e| DbManagerError::ParseError(format!("bad backup image: {}", e)))?;

        let mut inner = self.db.lock()?;
        inner.version = image.version;
        inner.journal = image.journal;
        inner.damaged = false;

        info!(
            "Restored database '{}' to version {} from {}",
            image.database,
            image.version,
            source.display()
        );
        Ok(true)
    }
}

/// Cleanup that truncates the journal.
pub struct MemoryCleanupProcessor {
    db: MemoryDatabase,
}

impl MemoryCleanupProcessor {
    pub fn new(db: MemoryDatabase) -> Self {
        Self { db }
    }
}

impl CleanupProcessor for MemoryCleanupProcessor {
    fn cleanup(&self, _ctx: &ProviderContext<'_>) -> Result<bool> {
        let mut inner = self.db.lock()?;
        let dropped = inner.journal.len();
        inner.journal.clear();
        info!("Cleanup removed {} journal entries", dropped);
        Ok(true)
    }
}
