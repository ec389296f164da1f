// ============================================================================
// DbLifecycle Library
// ============================================================================

pub mod batch;
pub mod core;
pub mod lifecycle;
pub mod locator;
pub mod manager;
pub mod provider;

// Re-export main types for convenience
pub use crate::core::{
    DbManagerError, DbState, ExecutionType, IsolationLevel, Result, TransactionRequirement, Value,
};
pub use crate::batch::{Batch, BatchCallback, BatchCommand, CommandParameter, CommandResult};
pub use crate::lifecycle::{derive_detection, derive_state};
pub use crate::locator::{
    AggregateBatchLocator, AggregateMode, BatchLocator, CallbackBatchLocator, CallbackOptions,
    DirectoryBatchLocator, MapBatchLocator, ScriptOptions, ScriptOptionsParser,
    StaticBatchLocator, separate_script_commands,
};
pub use crate::manager::{DbManager, DbManagerBuilder, DbManagerConfig, StateChange};
pub use crate::provider::{
    BackupCreator, CleanupProcessor, ConnectionProvider, DbConnection, DbTransaction, Detection,
    ProviderContext, VersionDetector, VersionUpgrader,
};
