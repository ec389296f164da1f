use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{DbManagerError, Result};

/// Version value reported when the database is damaged or undetectable.
pub const DAMAGED_VERSION: i64 = -1;

/// Observable lifecycle state of a managed database.
///
/// Derived from raw detection signals, never set directly. `Uninitialized`
/// is the only state reachable without a detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbState {
    /// The manager has not run detection yet (or has been closed).
    Uninitialized,
    /// Database exists and is at the newest supported version.
    ReadyNew,
    /// Database exists at an older, still supported version.
    ReadyOld,
    /// Database exists but its version cannot be classified.
    ReadyUnknown,
    /// Database has not been created yet (version 0) and can be built up.
    New,
    /// Database does not exist and this manager cannot create it.
    Unavailable,
    /// Database version is older than the minimum supported version.
    TooOld,
    /// Database version is newer than the maximum supported version.
    TooNew,
    /// Detection failed or reported a damaged/invalid database.
    DamagedOrInvalid,
}

impl DbState {
    /// True for the states in which regular work (connections, batches)
    /// is allowed.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::ReadyNew | Self::ReadyOld | Self::ReadyUnknown)
    }

    /// True once detection has run, regardless of the outcome.
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Uninitialized)
    }
}

impl fmt::Display for DbState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "Uninitialized",
            Self::ReadyNew => "ReadyNew",
            Self::ReadyOld => "ReadyOld",
            Self::ReadyUnknown => "ReadyUnknown",
            Self::New => "New",
            Self::Unavailable => "Unavailable",
            Self::TooOld => "TooOld",
            Self::TooNew => "TooNew",
            Self::DamagedOrInvalid => "DamagedOrInvalid",
        };
        write!(f, "{}", name)
    }
}

/// Whether a command must, must not, or does not care to run inside a
/// transaction. A single batch may not mix `Required` and `Disallowed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionRequirement {
    #[default]
    DontCare,
    Required,
    Disallowed,
}

impl FromStr for TransactionRequirement {
    type Err = DbManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("DontCare") => Ok(Self::DontCare),
            v if v.eq_ignore_ascii_case("Required") => Ok(Self::Required),
            v if v.eq_ignore_ascii_case("Disallowed") => Ok(Self::Disallowed),
            other => Err(DbManagerError::ParseError(format!(
                "Unknown transaction requirement '{}'",
                other
            ))),
        }
    }
}

/// Transaction isolation level requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
    Snapshot,
}

impl FromStr for IsolationLevel {
    type Err = DbManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("ReadUncommitted") => Ok(Self::ReadUncommitted),
            v if v.eq_ignore_ascii_case("ReadCommitted") => Ok(Self::ReadCommitted),
            v if v.eq_ignore_ascii_case("RepeatableRead") => Ok(Self::RepeatableRead),
            v if v.eq_ignore_ascii_case("Serializable") => Ok(Self::Serializable),
            v if v.eq_ignore_ascii_case("Snapshot") => Ok(Self::Snapshot),
            other => Err(DbManagerError::ParseError(format!(
                "Unknown isolation level '{}'",
                other
            ))),
        }
    }
}

/// How a script command is executed and what shape of result it produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionType {
    /// Row-returning query.
    Reader,
    /// Single-value query.
    Scalar,
    /// Statement returning an affected-row count.
    #[default]
    NonQuery,
}

impl FromStr for ExecutionType {
    type Err = DbManagerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("Reader") => Ok(Self::Reader),
            v if v.eq_ignore_ascii_case("Scalar") => Ok(Self::Scalar),
            v if v.eq_ignore_ascii_case("NonQuery") => Ok(Self::NonQuery),
            other => Err(DbManagerError::ParseError(format!(
                "Unknown execution type '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_states() {
        assert!(DbState::ReadyNew.is_ready());
        assert!(DbState::ReadyOld.is_ready());
        assert!(DbState::ReadyUnknown.is_ready());
        assert!(!DbState::New.is_ready());
        assert!(!DbState::Uninitialized.is_ready());
        assert!(!DbState::DamagedOrInvalid.is_ready());
    }

    #[test]
    fn test_initialized_states() {
        assert!(!DbState::Uninitialized.is_initialized());
        assert!(DbState::New.is_initialized());
        assert!(DbState::DamagedOrInvalid.is_initialized());
    }

    #[test]
    fn test_parse_transaction_requirement() {
        assert_eq!(
            "required".parse::<TransactionRequirement>().unwrap(),
            TransactionRequirement::Required
        );
        assert_eq!(
            "DISALLOWED".parse::<TransactionRequirement>().unwrap(),
            TransactionRequirement::Disallowed
        );
        assert!("sometimes".parse::<TransactionRequirement>().is_err());
    }

    #[test]
    fn test_parse_isolation_level() {
        assert_eq!(
            "serializable".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
        assert!("chaotic".parse::<IsolationLevel>().is_err());
    }

    #[test]
    fn test_parse_execution_type() {
        assert_eq!(
            "nonquery".parse::<ExecutionType>().unwrap(),
            ExecutionType::NonQuery
        );
        assert_eq!(
            "Reader".parse::<ExecutionType>().unwrap(),
            ExecutionType::Reader
        );
        assert!("Writer".parse::<ExecutionType>().is_err());
    }
}
