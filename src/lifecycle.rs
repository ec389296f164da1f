//! Derivation of the canonical lifecycle state from raw detection signals.

use crate::core::{DAMAGED_VERSION, DbState};
use crate::provider::Detection;

/// Map a raw (state, version) detection result onto a canonical
/// `(DbState, version)` pair.
///
/// Total and deterministic: every input combination maps to exactly one of
/// the nine states.
///
/// * A negative raw version or an explicit `DamagedOrInvalid` raw state
///   wins over everything else.
/// * A detector that names a state is authoritative; its state and version
///   pass through unchanged.
/// * Otherwise the version is classified against the supported
///   `[min_version, max_version]` window when upgrades are available, or
///   collapsed to `Unavailable`/`ReadyUnknown` when they are not.
pub fn derive_state(
    raw_state: Option<DbState>,
    raw_version: i64,
    min_version: i64,
    max_version: i64,
    supports_upgrade: bool,
) -> (DbState, i64) {
    if raw_version < 0 || raw_state == Some(DbState::DamagedOrInvalid) {
        return (DbState::DamagedOrInvalid, DAMAGED_VERSION);
    }

    if let Some(state) = raw_state {
        return (state, raw_version);
    }

    if supports_upgrade {
        let state = if raw_version == 0 {
            DbState::New
        } else if raw_version < min_version {
            DbState::TooOld
        } else if raw_version < max_version {
            DbState::ReadyOld
        } else if raw_version == max_version {
            DbState::ReadyNew
        } else if raw_version > max_version {
            DbState::TooNew
        } else {
            DbState::ReadyUnknown
        };
        (state, raw_version)
    } else if raw_version == 0 {
        (DbState::Unavailable, raw_version)
    } else {
        (DbState::ReadyUnknown, raw_version)
    }
}

/// [`derive_state`] over an optional detection result; `None` means the
/// detection itself failed and the database must be treated as damaged.
pub fn derive_detection(
    detection: Option<&Detection>,
    min_version: i64,
    max_version: i64,
    supports_upgrade: bool,
) -> (DbState, i64) {
    match detection {
        None => (DbState::DamagedOrInvalid, DAMAGED_VERSION),
        Some(detection) => derive_state(
            detection.state,
            detection.version,
            min_version,
            max_version,
            supports_upgrade,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_database() {
        assert_eq!(
            derive_state(None, 0, 1, 3, true),
            (DbState::New, 0)
        );
    }

    #[test]
    fn test_too_new() {
        assert_eq!(derive_state(None, 5, 1, 3, true), (DbState::TooNew, 5));
    }

    #[test]
    fn test_too_old() {
        assert_eq!(derive_state(None, 1, 2, 5, true), (DbState::TooOld, 1));
    }

    #[test]
    fn test_ready_old_and_ready_new() {
        assert_eq!(derive_state(None, 2, 1, 3, true), (DbState::ReadyOld, 2));
        assert_eq!(derive_state(None, 3, 1, 3, true), (DbState::ReadyNew, 3));
    }

    #[test]
    fn test_damage_wins() {
        assert_eq!(
            derive_state(None, -1, 1, 3, true),
            (DbState::DamagedOrInvalid, DAMAGED_VERSION)
        );
        assert_eq!(
            derive_state(Some(DbState::ReadyNew), -7, 1, 3, true),
            (DbState::DamagedOrInvalid, DAMAGED_VERSION)
        );
        assert_eq!(
            derive_state(Some(DbState::DamagedOrInvalid), 2, 1, 3, true),
            (DbState::DamagedOrInvalid, DAMAGED_VERSION)
        );
    }

    #[test]
    fn test_authoritative_detector_passes_through() {
        assert_eq!(
            derive_state(Some(DbState::Unavailable), 4, 1, 3, true),
            (DbState::Unavailable, 4)
        );
        assert_eq!(
            derive_state(Some(DbState::ReadyUnknown), 9, 1, 3, false),
            (DbState::ReadyUnknown, 9)
        );
    }

    #[test]
    fn test_no_upgrade_support() {
        assert_eq!(derive_state(None, 0, 0, 0, false), (DbState::Unavailable, 0));
        assert_eq!(derive_state(None, 4, 0, 0, false), (DbState::ReadyUnknown, 4));
    }

    #[test]
    fn test_failed_detection_is_damaged() {
        assert_eq!(
            derive_detection(None, 1, 3, true),
            (DbState::DamagedOrInvalid, DAMAGED_VERSION)
        );
    }

    // Every (raw_state, version sign/window position, upgrade flag)
    // combination lands on exactly one of the nine states.
    #[test]
    fn test_totality() {
        let raw_states = [
            None,
            Some(DbState::Uninitialized),
            Some(DbState::ReadyNew),
            Some(DbState::ReadyOld),
            Some(DbState::ReadyUnknown),
            Some(DbState::New),
            Some(DbState::Unavailable),
            Some(DbState::TooOld),
            Some(DbState::TooNew),
            Some(DbState::DamagedOrInvalid),
        ];
        let versions = [-2, -1, 0, 1, 2, 3, 4, 100];
        for raw_state in raw_states {
            for version in versions {
                for supports_upgrade in [true, false] {
                    let (state, derived_version) =
                        derive_state(raw_state, version, 1, 3, supports_upgrade);
                    // the derived version is never negative unless damaged
                    if state != DbState::DamagedOrInvalid {
                        assert!(derived_version >= 0);
                    } else {
                        assert_eq!(derived_version, DAMAGED_VERSION);
                    }
                }
            }
        }
    }
}
