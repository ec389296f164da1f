pub mod command;

pub use command::{BatchCallback, BatchCommand, CommandParameter, CommandResult};

use std::sync::Arc;

use crate::core::{DbManagerError, IsolationLevel, Result, TransactionRequirement};

/// An ordered collection of commands executed as one logical unit against
/// one connection or transaction.
///
/// # Examples
///
/// ```
/// use dblifecycle::{Batch, TransactionRequirement};
///
/// let mut batch = Batch::new();
/// batch.add_script("CREATE TABLE users (id INTEGER)", TransactionRequirement::Required);
/// batch.add_script("CREATE INDEX users_id ON users (id)", TransactionRequirement::DontCare);
///
/// assert_eq!(batch.len(), 2);
/// assert!(batch.requires_transaction().unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Batch {
    commands: Vec<BatchCommand>,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append a script command and return it for further configuration.
    pub fn add_script(
        &mut self,
        script: impl Into<String>,
        requirement: TransactionRequirement,
    ) -> &mut BatchCommand {
        self.commands
            .push(BatchCommand::from_script(script, requirement));
        self.commands.last_mut().expect("command was just pushed")
    }

    /// Append a callback command and return it for further configuration.
    pub fn add_callback(
        &mut self,
        callback: BatchCallback,
        requirement: TransactionRequirement,
    ) -> &mut BatchCommand {
        self.commands
            .push(BatchCommand::from_callback(callback, requirement));
        self.commands.last_mut().expect("command was just pushed")
    }

    /// Append an already-built command (used when merging batches).
    pub fn push(&mut self, command: BatchCommand) {
        self.commands.push(command);
    }

    /// Consume the batch, yielding its commands in order.
    pub fn into_commands(self) -> Vec<BatchCommand> {
        self.commands
    }

    pub fn commands(&self) -> &[BatchCommand] {
        &self.commands
    }

    pub(crate) fn commands_mut(&mut self) -> &mut [BatchCommand] {
        &mut self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Clear execution state on every command. Idempotent, never fails.
    pub fn reset(&mut self) {
        for command in &mut self.commands {
            command.reset();
        }
    }

    fn check_transaction_conflict(&self) -> Result<()> {
        let required = self
            .commands
            .iter()
            .position(|c| c.transaction_requirement() == TransactionRequirement::Required);
        let disallowed = self
            .commands
            .iter()
            .position(|c| c.transaction_requirement() == TransactionRequirement::Disallowed);
        if let (Some(required), Some(disallowed)) = (required, disallowed) {
            return Err(DbManagerError::ConflictingTransactionRequirement(format!(
                "command {} requires a transaction while command {} disallows one",
                required, disallowed
            )));
        }
        Ok(())
    }

    /// Whether any command requires a transaction.
    ///
    /// Fails if another command disallows one; the batch must not be
    /// executed in that case.
    pub fn requires_transaction(&self) -> Result<bool> {
        self.check_transaction_conflict()?;
        Ok(self
            .commands
            .iter()
            .any(|c| c.transaction_requirement() == TransactionRequirement::Required))
    }

    /// Whether any command disallows a transaction. Same conflict rule as
    /// [`requires_transaction`](Self::requires_transaction).
    pub fn disallows_transaction(&self) -> Result<bool> {
        self.check_transaction_conflict()?;
        Ok(self
            .commands
            .iter()
            .any(|c| c.transaction_requirement() == TransactionRequirement::Disallowed))
    }

    /// The single isolation level demanded by the batch, if any.
    ///
    /// Two commands demanding different levels is a conflict of the same
    /// kind as a transaction-requirement disagreement.
    pub fn isolation_level(&self) -> Result<Option<IsolationLevel>> {
        let mut found: Option<IsolationLevel> = None;
        for command in &self.commands {
            if let Some(level) = command.isolation_level() {
                match found {
                    None => found = Some(level),
                    Some(existing) if existing == level => {}
                    Some(existing) => {
                        return Err(DbManagerError::ConflictingIsolationLevel(format!(
                            "batch demands both {:?} and {:?}",
                            existing, level
                        )));
                    }
                }
            }
        }
        Ok(found)
    }

    /// First captured result, in command order.
    pub fn result(&self) -> Option<&CommandResult> {
        self.commands.iter().find_map(|c| c.result())
    }

    /// All captured results, in command order.
    pub fn results(&self) -> Vec<&CommandResult> {
        self.commands.iter().filter_map(|c| c.result()).collect()
    }

    /// First captured error message, in command order.
    pub fn error(&self) -> Option<&str> {
        self.commands.iter().find_map(|c| c.error())
    }

    /// All captured error messages, in command order.
    pub fn errors(&self) -> Vec<&str> {
        self.commands.iter().filter_map(|c| c.error()).collect()
    }

    /// First captured exception, in command order.
    pub fn exception(&self) -> Option<&Arc<anyhow::Error>> {
        self.commands.iter().find_map(|c| c.exception())
    }

    /// All captured exceptions, in command order.
    pub fn exceptions(&self) -> Vec<&Arc<anyhow::Error>> {
        self.commands.iter().filter_map(|c| c.exception()).collect()
    }

    /// True when every command has been executed. An empty batch has not
    /// been executed at all.
    pub fn was_fully_executed(&self) -> bool {
        !self.commands.is_empty() && self.commands.iter().all(|c| c.was_executed())
    }

    /// True when at least one command has been executed.
    pub fn was_partially_executed(&self) -> bool {
        self.commands.iter().any(|c| c.was_executed())
    }

    pub fn has_failed(&self) -> bool {
        self.commands.iter().any(|c| c.has_failed())
    }

    /// Surface the first captured error as a single failure.
    pub fn fail_on_error(&self) -> Result<()> {
        match self.error() {
            Some(error) => Err(DbManagerError::BatchFailed(error.to_string())),
            None => Ok(()),
        }
    }

    /// Surface all captured errors as a single aggregated failure.
    pub fn fail_on_errors(&self) -> Result<()> {
        let errors = self.errors();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DbManagerError::BatchFailed(errors.join("; ")))
        }
    }

    /// Move each command passing the filter into its own single-command
    /// batch, preserving command identity. Commands that do not pass stay
    /// in this batch. Used for checkpointed or retryable execution.
    pub fn split_commands<F>(&mut self, filter: F) -> Vec<Batch>
    where
        F: Fn(&BatchCommand) -> bool,
    {
        let mut split = Vec::new();
        let mut kept = Vec::new();
        for command in self.commands.drain(..) {
            if filter(&command) {
                split.push(Batch {
                    commands: vec![command],
                });
            } else {
                kept.push(command);
            }
        }
        self.commands = kept;
        split
    }

    /// Split every command into its own batch, leaving this batch empty.
    pub fn split_all(&mut self) -> Vec<Batch> {
        self.split_commands(|_| true)
    }
}
