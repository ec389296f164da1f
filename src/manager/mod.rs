pub mod config;
pub mod events;

pub use config::DbManagerConfig;
pub use events::{StateChange, StateChangeListener};

use std::path::Path;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::batch::command::CommandKind;
use crate::batch::{Batch, BatchCommand, CommandResult};
use crate::core::{DbManagerError, DbState, ExecutionType, Result};
use crate::lifecycle::derive_detection;
use crate::locator::BatchLocator;
use crate::provider::{
    BackupCreator, CleanupProcessor, ConnectionProvider, DbConnection, ProviderContext,
    VersionDetector, VersionUpgrader,
};

/// Database lifecycle manager
///
/// Owns the observable state/version of one target database and runs
/// batches, upgrades, backups and cleanup against it through pluggable
/// collaborators. All state transitions funnel through one internal
/// setter, which notifies registered listeners once per distinct change.
///
/// The manager is deliberately synchronous and unsynchronized: mutating
/// operations must not be invoked concurrently on the same instance.
///
/// # Examples
///
/// ```
/// use dblifecycle::manager::{DbManager, DbManagerConfig};
/// use dblifecycle::provider::memory::{
///     MemoryConnectionProvider, MemoryDatabase, MemoryUpgrader, MemoryVersionDetector,
/// };
/// use dblifecycle::DbState;
///
/// let db = MemoryDatabase::new();
/// let mut manager = DbManager::builder(DbManagerConfig::new("appdb"))
///     .connection_provider(MemoryConnectionProvider::new(db.clone()))
///     .version_detector(MemoryVersionDetector::new(db.clone()))
///     .version_upgrader(MemoryUpgrader::new(1, 3))
///     .build()
///     .unwrap();
///
/// manager.initialize();
/// assert_eq!(manager.state(), DbState::New);
///
/// assert!(manager.upgrade(3).unwrap());
/// assert_eq!(manager.state(), DbState::ReadyNew);
/// assert_eq!(manager.version(), 3);
/// ```
pub struct DbManager {
    config: DbManagerConfig,
    state: DbState,
    version: i64,
    initial_state: DbState,
    initial_version: i64,
    provider: Box<dyn ConnectionProvider>,
    detector: Box<dyn VersionDetector>,
    locator: Option<Box<dyn BatchLocator>>,
    upgrader: Option<Box<dyn VersionUpgrader>>,
    backup: Option<Box<dyn BackupCreator>>,
    cleanup: Option<Box<dyn CleanupProcessor>>,
    listeners: Vec<StateChangeListener>,
}

/// Collaborator wiring for [`DbManager`].
///
/// A connection provider and a version detector are required; everything
/// else is optional and its absence disables the corresponding operation.
pub struct DbManagerBuilder {
    config: DbManagerConfig,
    provider: Option<Box<dyn ConnectionProvider>>,
    detector: Option<Box<dyn VersionDetector>>,
    locator: Option<Box<dyn BatchLocator>>,
    upgrader: Option<Box<dyn VersionUpgrader>>,
    backup: Option<Box<dyn BackupCreator>>,
    cleanup: Option<Box<dyn CleanupProcessor>>,
}

impl DbManagerBuilder {
    pub fn new(config: DbManagerConfig) -> Self {
        Self {
            config,
            provider: None,
            detector: None,
            locator: None,
            upgrader: None,
            backup: None,
            cleanup: None,
        }
    }

    pub fn connection_provider(mut self, provider: impl ConnectionProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    pub fn version_detector(mut self, detector: impl VersionDetector + 'static) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    pub fn batch_locator(mut self, locator: impl BatchLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    pub fn version_upgrader(mut self, upgrader: impl VersionUpgrader + 'static) -> Self {
        self.upgrader = Some(Box::new(upgrader));
        self
    }

    pub fn backup_creator(mut self, backup: impl BackupCreator + 'static) -> Self {
        self.backup = Some(Box::new(backup));
        self
    }

    pub fn cleanup_processor(mut self, cleanup: impl CleanupProcessor + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub fn build(self) -> Result<DbManager> {
        let provider = self.provider.ok_or_else(|| {
            DbManagerError::Configuration("a connection provider is required".into())
        })?;
        let detector = self.detector.ok_or_else(|| {
            DbManagerError::Configuration("a version detector is required".into())
        })?;
        Ok(DbManager {
            config: self.config,
            state: DbState::Uninitialized,
            version: 0,
            initial_state: DbState::Uninitialized,
            initial_version: 0,
            provider,
            detector,
            locator: self.locator,
            upgrader: self.upgrader,
            backup: self.backup,
            cleanup: self.cleanup,
            listeners: Vec::new(),
        })
    }
}

impl DbManager {
    pub fn builder(config: DbManagerConfig) -> DbManagerBuilder {
        DbManagerBuilder::new(config)
    }

    pub fn config(&self) -> &DbManagerConfig {
        &self.config
    }

    pub fn state(&self) -> DbState {
        self.state
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    /// State snapshot taken at the last `initialize`.
    pub fn initial_state(&self) -> DbState {
        self.initial_state
    }

    /// Version snapshot taken at the last `initialize`.
    pub fn initial_version(&self) -> i64 {
        self.initial_version
    }

    /// Register a listener for state/version transitions.
    pub fn on_state_change<F>(&mut self, listener: F)
    where
        F: Fn(&StateChange) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Detect state and version, and snapshot them as the initial values.
    ///
    /// Re-entrant: an already-initialized manager is closed first.
    /// Detection failures never raise; they surface as
    /// `DamagedOrInvalid`.
    pub fn initialize(&mut self) {
        if self.state.is_initialized() {
            debug!(
                "initialize: database '{}' already initialized, closing first",
                self.config.database()
            );
            self.close();
        }
        self.redetect();
        self.initial_state = self.state;
        self.initial_version = self.version;
        info!(
            "initialize: database '{}' is {} at version {}",
            self.config.database(),
            self.state,
            self.version
        );
    }

    /// Return to `Uninitialized`. The initial snapshot is kept.
    pub fn close(&mut self) {
        self.set_state_and_version(DbState::Uninitialized, 0);
    }

    fn context(&self) -> ProviderContext<'_> {
        ProviderContext {
            provider: self.provider.as_ref(),
            config: &self.config,
            state: self.state,
            version: self.version,
        }
    }

    fn upgrade_bounds(&self) -> (i64, i64, bool) {
        match &self.upgrader {
            Some(upgrader) => {
                let ctx = self.context();
                (upgrader.min_version(&ctx), upgrader.max_version(&ctx), true)
            }
            None => (0, 0, false),
        }
    }

    fn redetect(&mut self) {
        let (state, version) = {
            let (min, max, supports_upgrade) = self.upgrade_bounds();
            let ctx = self.context();
            match self.detector.detect(&ctx) {
                Ok(detection) => {
                    derive_detection(Some(&detection), min, max, supports_upgrade)
                }
                Err(e) => {
                    error!(
                        "detect: database '{}' detection failed: {}",
                        self.config.database(),
                        e
                    );
                    derive_detection(None, min, max, supports_upgrade)
                }
            }
        };
        self.set_state_and_version(state, version);
    }

    fn set_state_and_version(&mut self, state: DbState, version: i64) {
        if self.state == state && self.version == version {
            return;
        }
        let change = StateChange {
            previous_state: self.state,
            new_state: state,
            previous_version: self.version,
            new_version: version,
            changed_at: Utc::now(),
        };
        self.state = state;
        self.version = version;
        info!(
            "database '{}': {} (version {}) -> {} (version {})",
            self.config.database(),
            change.previous_state,
            change.previous_version,
            change.new_state,
            change.new_version
        );
        for listener in &self.listeners {
            listener(&change);
        }
    }

    fn ensure_ready(&self, operation: &str) -> Result<()> {
        if self.state.is_ready() {
            return Ok(());
        }
        warn!(
            "{}: database '{}' is not ready (state {})",
            operation,
            self.config.database(),
            self.state
        );
        if self.state == DbState::Uninitialized {
            Err(DbManagerError::NotInitialized)
        } else {
            Err(DbManagerError::NotReady(self.state))
        }
    }

    fn ensure_ready_or_new(&self, operation: &str) -> Result<()> {
        if self.state == DbState::New {
            return Ok(());
        }
        self.ensure_ready(operation)
    }

    fn ensure_initialized(&self, operation: &str) -> Result<()> {
        if self.state.is_initialized() {
            return Ok(());
        }
        warn!(
            "{}: database '{}' is not initialized",
            operation,
            self.config.database()
        );
        Err(DbManagerError::NotInitialized)
    }

    fn ensure_writable(&self, operation: &str, read_only: bool) -> Result<()> {
        if read_only && !self.provider.supports_read_only() {
            return Err(DbManagerError::UnsupportedOperation(format!(
                "{}: the connection provider does not support read-only access",
                operation
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Connections and batches
    // -----------------------------------------------------------------

    /// Open a plain connection.
    ///
    /// Wrong state and unsupported read-only access raise; a provider
    /// that fails to open returns `Ok(None)` (the provider logs the
    /// cause).
    pub fn create_connection(&self, read_only: bool) -> Result<Option<Box<dyn DbConnection>>> {
        self.ensure_ready("create_connection")?;
        self.ensure_writable("create_connection", read_only)?;
        match self.provider.create_connection(read_only) {
            Some(connection) => Ok(Some(connection)),
            None => {
                error!(
                    "create_connection: provider failed for database '{}'",
                    self.config.database()
                );
                Ok(None)
            }
        }
    }

    /// Open a transaction. Same failure contract as
    /// [`create_connection`](Self::create_connection).
    pub fn create_transaction(
        &self,
        read_only: bool,
    ) -> Result<Option<Box<dyn crate::provider::DbTransaction>>> {
        self.ensure_ready("create_transaction")?;
        self.ensure_writable("create_transaction", read_only)?;
        match self.provider.create_transaction(read_only, None) {
            Some(transaction) => Ok(Some(transaction)),
            None => {
                error!(
                    "create_transaction: provider failed for database '{}'",
                    self.config.database()
                );
                Ok(None)
            }
        }
    }

    pub fn create_batch(&self) -> Batch {
        Batch::new()
    }

    /// Execute every command of `batch` in order against one connection,
    /// or one transaction when any command requires it.
    ///
    /// Returns `Ok(true)` only if every command executed without error.
    /// The first failing command aborts the rest: it keeps its captured
    /// error/exception, commands after it stay unexecuted, and already
    /// applied side effects are not compensated. Conflicting transaction
    /// requirements and commands without exactly one of script/callback
    /// raise before anything runs.
    pub fn execute_batch(
        &mut self,
        batch: &mut Batch,
        read_only: bool,
        redetect_after: bool,
    ) -> Result<bool> {
        self.ensure_ready("execute_batch")?;
        self.ensure_writable("execute_batch", read_only)?;

        batch.reset();
        let needs_transaction = batch.requires_transaction()?;
        let isolation = batch.isolation_level()?;
        for command in batch.commands() {
            command.kind()?;
        }

        debug!(
            "execute_batch: {} command(s), transaction: {}",
            batch.len(),
            needs_transaction
        );

        let success = if needs_transaction {
            let Some(mut transaction) = self.provider.create_transaction(read_only, isolation)
            else {
                error!(
                    "execute_batch: could not open a transaction on '{}'",
                    self.config.database()
                );
                return Ok(false);
            };
            let success = run_commands(transaction.as_connection(), batch);
            if success {
                transaction.commit()?;
            }
            success
        } else {
            let Some(mut connection) = self.provider.create_connection(read_only) else {
                error!(
                    "execute_batch: could not open a connection on '{}'",
                    self.config.database()
                );
                return Ok(false);
            };
            let success = run_commands(connection.as_mut(), batch);
            if let Err(e) = connection.close() {
                warn!("execute_batch: closing connection failed: {}", e);
            }
            success
        };

        if success && redetect_after {
            self.redetect();
        }
        Ok(success)
    }

    // -----------------------------------------------------------------
    // Upgrade
    // -----------------------------------------------------------------

    /// Incrementally upgrade to `target_version`, one version per step.
    ///
    /// Aborts with `Ok(false)` when a step reports failure, the manager
    /// leaves the ready states, or the detected version fails to strictly
    /// increase (a stalled upgrader must not loop forever).
    pub fn upgrade(&mut self, target_version: i64) -> Result<bool> {
        self.ensure_ready_or_new("upgrade")?;
        if self.upgrader.is_none() {
            return Err(DbManagerError::UnsupportedOperation(
                "no version upgrader is configured".into(),
            ));
        }

        let (min, max, _) = self.upgrade_bounds();
        if target_version < min || target_version > max {
            return Err(DbManagerError::VersionOutOfRange {
                version: target_version,
                min,
                max,
            });
        }
        if target_version < self.version {
            return Err(DbManagerError::VersionOutOfRange {
                version: target_version,
                min: self.version,
                max,
            });
        }
        if self.version == target_version {
            debug!(
                "upgrade: database '{}' already at version {}",
                self.config.database(),
                target_version
            );
            return Ok(true);
        }

        while self.version < target_version {
            let from = self.version;
            let advanced = {
                let ctx = self.context();
                match &self.upgrader {
                    Some(upgrader) => upgrader.upgrade(&ctx, from)?,
                    None => {
                        return Err(DbManagerError::UnsupportedOperation(
                            "no version upgrader is configured".into(),
                        ));
                    }
                }
            };
            self.redetect();

            if !advanced {
                warn!("upgrade: step from version {} reported failure", from);
                return Ok(false);
            }
            if !self.state.is_ready() {
                warn!(
                    "upgrade: database '{}' left the ready states ({}) after step from {}",
                    self.config.database(),
                    self.state,
                    from
                );
                return Ok(false);
            }
            if self.version <= from {
                warn!(
                    "upgrade: version did not advance past {} (detected {})",
                    from, self.version
                );
                return Ok(false);
            }
        }

        info!(
            "upgrade: database '{}' reached version {}",
            self.config.database(),
            self.version
        );
        Ok(true)
    }

    /// Upgrade to the upgrader's maximum supported version.
    pub fn upgrade_to_latest(&mut self) -> Result<bool> {
        if self.upgrader.is_none() {
            return Err(DbManagerError::UnsupportedOperation(
                "no version upgrader is configured".into(),
            ));
        }
        let (_, max, _) = self.upgrade_bounds();
        self.upgrade(max)
    }

    // -----------------------------------------------------------------
    // Backup, restore, cleanup
    // -----------------------------------------------------------------

    /// Write a backup to `target`. Requires an initialized (not
    /// necessarily ready) manager and a configured backup creator.
    pub fn backup(&mut self, target: &Path) -> Result<bool> {
        self.ensure_initialized("backup")?;
        let ok = {
            let Some(backup) = &self.backup else {
                return Err(DbManagerError::UnsupportedOperation(
                    "no backup creator is configured".into(),
                ));
            };
            if !backup.supports_backup() {
                return Err(DbManagerError::UnsupportedOperation(
                    "the backup creator does not support backups".into(),
                ));
            }
            let ctx = self.context();
            backup.backup(&ctx, target)?
        };
        self.redetect();
        Ok(ok)
    }

    /// Restore from `source`. Same preconditions as
    /// [`backup`](Self::backup).
    pub fn restore(&mut self, source: &Path) -> Result<bool> {
        self.ensure_initialized("restore")?;
        let ok = {
            let Some(backup) = &self.backup else {
                return Err(DbManagerError::UnsupportedOperation(
                    "no backup creator is configured".into(),
                ));
            };
            if !backup.supports_restore() {
                return Err(DbManagerError::UnsupportedOperation(
                    "the backup creator does not support restore".into(),
                ));
            }
            let ctx = self.context();
            backup.restore(&ctx, source)?
        };
        self.redetect();
        Ok(ok)
    }

    /// Run the configured cleanup processor. Requires a ready or `New`
    /// database.
    pub fn cleanup(&mut self) -> Result<bool> {
        self.ensure_ready_or_new("cleanup")?;
        let ok = {
            let Some(cleanup) = &self.cleanup else {
                return Err(DbManagerError::UnsupportedOperation(
                    "no cleanup processor is configured".into(),
                ));
            };
            let ctx = self.context();
            cleanup.cleanup(&ctx)?
        };
        self.redetect();
        Ok(ok)
    }

    // -----------------------------------------------------------------
    // Batch lookup
    // -----------------------------------------------------------------

    /// Resolve a named batch through the configured locator. Callable in
    /// any state. `None` as separator falls back to the configured
    /// default; pass `Some("")` to disable splitting.
    pub fn get_batch(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>> {
        let Some(locator) = &self.locator else {
            return Err(DbManagerError::UnsupportedOperation(
                "no batch locator is configured".into(),
            ));
        };
        let separator = separator.or(Some(self.config.separator()));
        locator.get_batch(name, separator)
    }

    /// All batch names known to the configured locator.
    pub fn get_batch_names(&self) -> Result<std::collections::BTreeSet<String>> {
        let Some(locator) = &self.locator else {
            return Err(DbManagerError::UnsupportedOperation(
                "no batch locator is configured".into(),
            ));
        };
        Ok(locator.get_names())
    }
}

fn run_commands(connection: &mut dyn DbConnection, batch: &mut Batch) -> bool {
    for command in batch.commands_mut() {
        match run_command(connection, command) {
            Ok(result) => command.record_success(result),
            Err(e) => {
                error!("execute_batch: command failed: {:#}", e);
                command.record_failure(e);
                return false;
            }
        }
    }
    true
}

fn run_command(
    connection: &mut dyn DbConnection,
    command: &BatchCommand,
) -> anyhow::Result<CommandResult> {
    match command.kind()? {
        CommandKind::Script(script) => {
            let parameters = command.parameters();
            match command.execution_type() {
                ExecutionType::Reader => Ok(CommandResult::Rows(
                    connection.execute_reader(script, parameters)?,
                )),
                ExecutionType::Scalar => Ok(CommandResult::Scalar(
                    connection.execute_scalar(script, parameters)?,
                )),
                ExecutionType::NonQuery => Ok(CommandResult::RowsAffected(
                    connection.execute_non_query(script, parameters)?,
                )),
            }
        }
        CommandKind::Callback(callback) => {
            let callback = std::sync::Arc::clone(callback);
            callback(connection)
        }
    }
}
