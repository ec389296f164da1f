use chrono::{DateTime, Utc};

use crate::core::DbState;

/// Notification raised once per distinct state/version transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub previous_state: DbState,
    pub new_state: DbState,
    pub previous_version: i64,
    pub new_version: i64,
    pub changed_at: DateTime<Utc>,
}

impl StateChange {
    pub fn state_changed(&self) -> bool {
        self.previous_state != self.new_state
    }

    pub fn version_changed(&self) -> bool {
        self.previous_version != self.new_version
    }
}

/// Listener invoked on every state/version transition.
pub type StateChangeListener = Box<dyn Fn(&StateChange) + Send>;
