use std::sync::{Arc, Mutex};

use dblifecycle::manager::{DbManager, DbManagerConfig};
use dblifecycle::provider::memory::{
    MemoryConnectionProvider, MemoryDatabase, MemoryUpgrader, MemoryVersionDetector,
};
use dblifecycle::provider::{ProviderContext, VersionUpgrader};
use dblifecycle::{DbManagerError, DbState, Result};

fn manager_with_upgrader(
    db: &MemoryDatabase,
    upgrader: impl VersionUpgrader + 'static,
) -> DbManager {
    let mut manager = DbManager::builder(DbManagerConfig::new("testdb"))
        .connection_provider(MemoryConnectionProvider::new(db.clone()))
        .version_detector(MemoryVersionDetector::new(db.clone()))
        .version_upgrader(upgrader)
        .build()
        .unwrap();
    manager.initialize();
    manager
}

#[test]
fn test_upgrade_runs_one_step_per_version() {
    let db = MemoryDatabase::with_version(1);
    let mut manager = manager_with_upgrader(&db, MemoryUpgrader::new(1, 3));
    assert_eq!(manager.state(), DbState::ReadyOld);

    let versions: Arc<Mutex<Vec<i64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&versions);
    manager.on_state_change(move |change| {
        sink.lock().unwrap().push(change.new_version);
    });

    assert!(manager.upgrade(3).unwrap());
    assert_eq!(manager.version(), 3);
    assert_eq!(manager.state(), DbState::ReadyNew);
    // two steps: 1 -> 2 -> 3
    assert_eq!(*versions.lock().unwrap(), vec![2, 3]);
    assert_eq!(db.journal(), vec!["UPGRADE TO 2".to_string(), "UPGRADE TO 3".to_string()]);
}

#[test]
fn test_upgrade_from_new_database() {
    let db = MemoryDatabase::new();
    let mut manager = manager_with_upgrader(&db, MemoryUpgrader::new(1, 2));
    assert_eq!(manager.state(), DbState::New);

    assert!(manager.upgrade(2).unwrap());
    assert_eq!(manager.version(), 2);
    assert_eq!(manager.state(), DbState::ReadyNew);
}

#[test]
fn test_upgrade_to_current_version_is_noop() {
    let db = MemoryDatabase::with_version(2);
    let mut manager = manager_with_upgrader(&db, MemoryUpgrader::new(1, 3));

    assert!(manager.upgrade(2).unwrap());
    assert_eq!(manager.version(), 2);
    assert!(db.journal().is_empty());
}

#[test]
fn test_upgrade_target_out_of_range() {
    let db = MemoryDatabase::with_version(2);
    let mut manager = manager_with_upgrader(&db, MemoryUpgrader::new(1, 3));

    assert!(matches!(
        manager.upgrade(4),
        Err(DbManagerError::VersionOutOfRange { .. })
    ));
    assert!(matches!(
        manager.upgrade(0),
        Err(DbManagerError::VersionOutOfRange { .. })
    ));
    // downgrade below the current version is rejected even inside range
    assert!(matches!(
        manager.upgrade(1),
        Err(DbManagerError::VersionOutOfRange { .. })
    ));
}

#[test]
fn test_upgrade_without_upgrader_is_unsupported() {
    let db = MemoryDatabase::with_version(1);
    let mut manager = DbManager::builder(DbManagerConfig::new("testdb"))
        .connection_provider(MemoryConnectionProvider::new(db.clone()))
        .version_detector(MemoryVersionDetector::new(db))
        .build()
        .unwrap();
    manager.initialize();

    assert!(matches!(
        manager.upgrade(2),
        Err(DbManagerError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        manager.upgrade_to_latest(),
        Err(DbManagerError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_upgrade_requires_ready_or_new_state() {
    let db = MemoryDatabase::with_version(1);
    db.set_damaged(true);
    let mut manager = manager_with_upgrader(&db, MemoryUpgrader::new(1, 3));
    assert_eq!(manager.state(), DbState::DamagedOrInvalid);

    assert!(matches!(
        manager.upgrade(3),
        Err(DbManagerError::NotReady(DbState::DamagedOrInvalid))
    ));
}

/// Reports success without ever touching the database.
struct StallingUpgrader {
    min: i64,
    max: i64,
}

impl VersionUpgrader for StallingUpgrader {
    fn min_version(&self, _ctx: &ProviderContext<'_>) -> i64 {
        self.min
    }

    fn max_version(&self, _ctx: &ProviderContext<'_>) -> i64 {
        self.max
    }

    fn upgrade(&self, _ctx: &ProviderContext<'_>, _from_version: i64) -> Result<bool> {
        Ok(true)
    }
}

#[test]
fn test_stalled_upgrader_aborts_instead_of_looping() {
    let db = MemoryDatabase::with_version(1);
    let mut manager = manager_with_upgrader(&db, StallingUpgrader { min: 1, max: 5 });

    assert!(!manager.upgrade(5).unwrap());
    assert_eq!(manager.version(), 1);
}

/// Reports failure on the second step.
struct FlakyUpgrader {
    inner: MemoryUpgrader,
    failures: Mutex<i64>,
}

impl VersionUpgrader for FlakyUpgrader {
    fn min_version(&self, ctx: &ProviderContext<'_>) -> i64 {
        self.inner.min_version(ctx)
    }

    fn max_version(&self, ctx: &ProviderContext<'_>) -> i64 {
        self.inner.max_version(ctx)
    }

    fn upgrade(&self, ctx: &ProviderContext<'_>, from_version: i64) -> Result<bool> {
        if from_version >= 2 {
            *self.failures.lock().unwrap() += 1;
            return Ok(false);
        }
        self.inner.upgrade(ctx, from_version)
    }
}

#[test]
fn test_failing_step_aborts_with_partial_progress() {
    let db = MemoryDatabase::with_version(1);
    let mut manager = manager_with_upgrader(
        &db,
        FlakyUpgrader {
            inner: MemoryUpgrader::new(1, 4),
            failures: Mutex::new(0),
        },
    );

    assert!(!manager.upgrade(4).unwrap());
    // the first step went through, the second reported failure
    assert_eq!(manager.version(), 2);
    assert_eq!(manager.state(), DbState::ReadyOld);
}

/// Raises instead of reporting failure.
struct ErroringUpgrader;

impl VersionUpgrader for ErroringUpgrader {
    fn min_version(&self, _ctx: &ProviderContext<'_>) -> i64 {
        1
    }

    fn max_version(&self, _ctx: &ProviderContext<'_>) -> i64 {
        3
    }

    fn upgrade(&self, _ctx: &ProviderContext<'_>, _from_version: i64) -> Result<bool> {
        Err(DbManagerError::ExecutionError("upgrade script exploded".into()))
    }
}

#[test]
fn test_upgrader_error_propagates() {
    let db = MemoryDatabase::with_version(1);
    let mut manager = manager_with_upgrader(&db, ErroringUpgrader);

    assert!(matches!(
        manager.upgrade(3),
        Err(DbManagerError::ExecutionError(_))
    ));
}

#[test]
fn test_upgrade_to_latest() {
    let db = MemoryDatabase::with_version(1);
    let mut manager = manager_with_upgrader(&db, MemoryUpgrader::new(1, 3));

    assert!(manager.upgrade_to_latest().unwrap());
    assert_eq!(manager.version(), 3);
    assert_eq!(manager.state(), DbState::ReadyNew);
}
