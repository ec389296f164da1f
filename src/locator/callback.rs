use std::collections::BTreeSet;

use crate::batch::{Batch, BatchCallback, BatchCommand};
use crate::core::{ExecutionType, IsolationLevel, Result, TransactionRequirement};

use super::{BatchLocator, insert_name};

/// Per-callback execution options.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallbackOptions {
    pub transaction_requirement: TransactionRequirement,
    pub isolation_level: Option<IsolationLevel>,
    pub execution_type: ExecutionType,
}

struct RegisteredCallback {
    name: String,
    options: CallbackOptions,
    callback: BatchCallback,
}

/// Explicit name → callback registry, populated by the host application
/// at startup. The registry takes the place of scanning loaded code for
/// callback implementations.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use dblifecycle::batch::CommandResult;
/// use dblifecycle::locator::{BatchLocator, CallbackBatchLocator, CallbackOptions};
///
/// let mut locator = CallbackBatchLocator::new();
/// locator.register(
///     "seed",
///     CallbackOptions::default(),
///     Arc::new(|conn| {
///         let affected = conn.execute_non_query("INSERT defaults", &[])?;
///         Ok(CommandResult::RowsAffected(affected))
///     }),
/// );
///
/// assert!(locator.get_batch("SEED", None).unwrap().is_some());
/// ```
#[derive(Default)]
pub struct CallbackBatchLocator {
    callbacks: Vec<RegisteredCallback>,
}

impl CallbackBatchLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a callback under a (case-insensitive) name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        options: CallbackOptions,
        callback: BatchCallback,
    ) {
        let name = name.into();
        match self
            .callbacks
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => {
                existing.options = options;
                existing.callback = callback;
            }
            None => self.callbacks.push(RegisteredCallback {
                name,
                options,
                callback,
            }),
        }
    }

    pub fn with_callback(
        mut self,
        name: impl Into<String>,
        options: CallbackOptions,
        callback: BatchCallback,
    ) -> Self {
        self.register(name, options, callback);
        self
    }
}

impl BatchLocator for CallbackBatchLocator {
    fn get_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for registered in &self.callbacks {
            insert_name(&mut names, &registered.name);
        }
        names
    }

    fn get_batch(&self, name: &str, _separator: Option<&str>) -> Result<Option<Batch>> {
        let Some(registered) = self
            .callbacks
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };

        let mut command = BatchCommand::from_callback(
            registered.callback.clone(),
            registered.options.transaction_requirement,
        );
        if let Some(level) = registered.options.isolation_level {
            command.set_isolation_level(level);
        }
        command.set_execution_type(registered.options.execution_type);

        let mut batch = Batch::new();
        batch.push(command);
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::batch::CommandResult;

    #[test]
    fn test_register_and_lookup() {
        let mut locator = CallbackBatchLocator::new();
        locator.register(
            "Seed",
            CallbackOptions {
                transaction_requirement: TransactionRequirement::Required,
                ..Default::default()
            },
            Arc::new(|_conn| Ok(CommandResult::RowsAffected(0))),
        );

        let batch = locator.get_batch("seed", None).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.requires_transaction().unwrap());
        assert!(locator.get_batch("other", None).unwrap().is_none());
    }

    #[test]
    fn test_names_deduplicate_case_insensitively() {
        let mut locator = CallbackBatchLocator::new();
        locator.register(
            "seed",
            CallbackOptions::default(),
            Arc::new(|_conn| Ok(CommandResult::RowsAffected(0))),
        );
        locator.register(
            "SEED",
            CallbackOptions::default(),
            Arc::new(|_conn| Ok(CommandResult::RowsAffected(1))),
        );
        assert_eq!(locator.get_names().len(), 1);
    }
}
