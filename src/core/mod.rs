pub mod error;
pub mod types;
pub mod value;

pub use error::{DbManagerError, Result};
pub use types::{
    DAMAGED_VERSION, DbState, ExecutionType, IsolationLevel, TransactionRequirement,
};
pub use value::Value;
