pub mod memory;

use std::path::Path;

use crate::core::{DbState, IsolationLevel, Result, Value};
use crate::batch::CommandParameter;
use crate::manager::DbManagerConfig;

/// Raw result of a version detection pass.
///
/// A detector that knows the exact lifecycle state names it in `state` and
/// that state is taken as authoritative; a detector that only knows the
/// version leaves `state` as `None` and the generic classification applies.
/// A negative version signals a damaged or undetectable database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub state: Option<DbState>,
    pub version: i64,
}

impl Detection {
    pub fn version(version: i64) -> Self {
        Self {
            state: None,
            version,
        }
    }

    pub fn damaged() -> Self {
        Self {
            state: Some(DbState::DamagedOrInvalid),
            version: crate::core::DAMAGED_VERSION,
        }
    }
}

/// View of the manager handed to collaborators.
///
/// Collaborators are stored inside the manager, so they receive this
/// narrow borrow instead of the manager itself.
pub struct ProviderContext<'a> {
    pub provider: &'a dyn ConnectionProvider,
    pub config: &'a DbManagerConfig,
    pub state: DbState,
    pub version: i64,
}

/// Determines the current state/version of the target database.
pub trait VersionDetector: Send + Sync {
    /// Detect the raw state and version. Return an error or a negative
    /// version to signal a damaged database; the manager degrades to
    /// `DamagedOrInvalid` instead of propagating detection failures.
    fn detect(&self, ctx: &ProviderContext<'_>) -> Result<Detection>;
}

/// Performs single-step schema advances.
pub trait VersionUpgrader: Send + Sync {
    fn min_version(&self, ctx: &ProviderContext<'_>) -> i64;

    fn max_version(&self, ctx: &ProviderContext<'_>) -> i64;

    /// Advance the database by exactly one version starting at
    /// `from_version`. `Ok(false)` reports a failed step; errors raised by
    /// the underlying driver propagate.
    fn upgrade(&self, ctx: &ProviderContext<'_>, from_version: i64) -> Result<bool>;
}

/// Creates and restores database backups.
pub trait BackupCreator: Send + Sync {
    fn supports_backup(&self) -> bool;

    fn supports_restore(&self) -> bool;

    fn backup(&self, ctx: &ProviderContext<'_>, target: &Path) -> Result<bool>;

    fn restore(&self, ctx: &ProviderContext<'_>, source: &Path) -> Result<bool>;
}

/// Removes transient data from a database (expired rows, scratch tables).
pub trait CleanupProcessor: Send + Sync {
    fn cleanup(&self, ctx: &ProviderContext<'_>) -> Result<bool>;
}

/// Opens connections and transactions against the real database.
///
/// Both creators hand back an already-open, usable resource, or `None`
/// after logging the failure; the manager reports `None` to the caller
/// instead of raising.
pub trait ConnectionProvider: Send + Sync {
    fn create_connection(&self, read_only: bool) -> Option<Box<dyn DbConnection>>;

    fn create_transaction(
        &self,
        read_only: bool,
        isolation: Option<IsolationLevel>,
    ) -> Option<Box<dyn DbTransaction>>;

    fn supports_read_only(&self) -> bool {
        false
    }
}

/// An open connection: the seam through which script commands execute.
pub trait DbConnection: Send {
    /// Execute a row-returning script.
    fn execute_reader(
        &mut self,
        script: &str,
        parameters: &[CommandParameter],
    ) -> Result<Vec<Vec<Value>>>;

    /// Execute a script producing a single value.
    fn execute_scalar(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<Value>;

    /// Execute a script producing an affected-row count.
    fn execute_non_query(&mut self, script: &str, parameters: &[CommandParameter]) -> Result<u64>;

    fn close(&mut self) -> Result<()>;
}

/// An open transaction. Dropping a transaction without committing leaves
/// the disposition of buffered work to the provider.
pub trait DbTransaction: DbConnection {
    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    /// The transaction viewed as a plain connection, for command
    /// execution.
    fn as_connection(&mut self) -> &mut dyn DbConnection;
}
