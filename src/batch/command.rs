use std::fmt;
use std::sync::Arc;

use crate::core::{DbManagerError, ExecutionType, IsolationLevel, Result, TransactionRequirement, Value};
use crate::provider::DbConnection;

/// Callback form of a batch command.
///
/// Runs arbitrary host code against the connection (or transaction) the
/// batch was given. Callbacks report failures through `anyhow` so hosts can
/// bubble up whatever error type their driver produces.
pub type BatchCallback =
    Arc<dyn Fn(&mut dyn DbConnection) -> anyhow::Result<CommandResult> + Send + Sync>;

/// Result captured on a command after execution.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Rows produced by a `Reader` execution.
    Rows(Vec<Vec<Value>>),
    /// Single value produced by a `Scalar` execution.
    Scalar(Value),
    /// Affected-row count produced by a `NonQuery` execution.
    RowsAffected(u64),
}

/// Named command parameter. Parameter names are unique within a command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandParameter {
    pub name: String,
    pub value: Value,
}

pub(crate) enum CommandKind<'a> {
    Script(&'a str),
    Callback(&'a BatchCallback),
}

/// A single unit of work inside a [`Batch`](crate::Batch): either a script
/// or a callback, never both.
///
/// Execution state (`result`/`error`/`exception`/`was_executed`) is written
/// only by the batch executor; `reset` clears it for re-use.
#[derive(Clone)]
pub struct BatchCommand {
    script: Option<String>,
    callback: Option<BatchCallback>,
    transaction_requirement: TransactionRequirement,
    isolation_level: Option<IsolationLevel>,
    execution_type: ExecutionType,
    parameters: Vec<CommandParameter>,
    result: Option<CommandResult>,
    error: Option<String>,
    exception: Option<Arc<anyhow::Error>>,
    was_executed: bool,
}

impl BatchCommand {
    /// Create a script command.
    pub fn from_script(script: impl Into<String>, requirement: TransactionRequirement) -> Self {
        Self {
            script: Some(script.into()),
            callback: None,
            transaction_requirement: requirement,
            isolation_level: None,
            execution_type: ExecutionType::default(),
            parameters: Vec::new(),
            result: None,
            error: None,
            exception: None,
            was_executed: false,
        }
    }

    /// Create a callback command.
    pub fn from_callback(callback: BatchCallback, requirement: TransactionRequirement) -> Self {
        Self {
            script: None,
            callback: Some(callback),
            transaction_requirement: requirement,
            isolation_level: None,
            execution_type: ExecutionType::default(),
            parameters: Vec::new(),
            result: None,
            error: None,
            exception: None,
            was_executed: false,
        }
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Replace (or clear) the script text. A command must end up with
    /// exactly one of script/callback before execution.
    pub fn set_script(&mut self, script: Option<String>) -> &mut Self {
        self.script = script;
        self
    }

    /// Replace (or clear) the callback. Same invariant as
    /// [`set_script`](Self::set_script).
    pub fn set_callback(&mut self, callback: Option<BatchCallback>) -> &mut Self {
        self.callback = callback;
        self
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn transaction_requirement(&self) -> TransactionRequirement {
        self.transaction_requirement
    }

    pub fn set_transaction_requirement(&mut self, requirement: TransactionRequirement) -> &mut Self {
        self.transaction_requirement = requirement;
        self
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> &mut Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn execution_type(&self) -> ExecutionType {
        self.execution_type
    }

    pub fn set_execution_type(&mut self, execution_type: ExecutionType) -> &mut Self {
        self.execution_type = execution_type;
        self
    }

    /// Add or replace a parameter by name.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.value = value,
            None => self.parameters.push(CommandParameter { name, value }),
        }
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    pub fn parameters(&self) -> &[CommandParameter] {
        &self.parameters
    }

    pub fn result(&self) -> Option<&CommandResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn exception(&self) -> Option<&Arc<anyhow::Error>> {
        self.exception.as_ref()
    }

    pub fn was_executed(&self) -> bool {
        self.was_executed
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some() || self.exception.is_some()
    }

    /// Clear all execution state. Idempotent.
    pub fn reset(&mut self) {
        self.result = None;
        self.error = None;
        self.exception = None;
        self.was_executed = false;
    }

    /// A command must carry exactly one of script/callback before it may
    /// be executed.
    pub(crate) fn kind(&self) -> Result<CommandKind<'_>> {
        match (&self.script, &self.callback) {
            (Some(script), None) => Ok(CommandKind::Script(script)),
            (None, Some(callback)) => Ok(CommandKind::Callback(callback)),
            (Some(_), Some(_)) => Err(DbManagerError::InvalidCommand(
                "Command has both a script and a callback".into(),
            )),
            (None, None) => Err(DbManagerError::InvalidCommand(
                "Command has neither a script nor a callback".into(),
            )),
        }
    }

    pub(crate) fn record_success(&mut self, result: CommandResult) {
        self.result = Some(result);
        self.error = None;
        self.exception = None;
        self.was_executed = true;
    }

    pub(crate) fn record_failure(&mut self, error: anyhow::Error) {
        self.error = Some(error.to_string());
        self.exception = Some(Arc::new(error));
        self.result = None;
        self.was_executed = true;
    }
}

impl fmt::Debug for BatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCommand")
            .field("script", &self.script)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .field("transaction_requirement", &self.transaction_requirement)
            .field("isolation_level", &self.isolation_level)
            .field("execution_type", &self.execution_type)
            .field("parameters", &self.parameters)
            .field("result", &self.result)
            .field("error", &self.error)
            .field("was_executed", &self.was_executed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_command_kind() {
        let cmd = BatchCommand::from_script("SELECT 1", TransactionRequirement::DontCare);
        assert!(matches!(cmd.kind(), Ok(CommandKind::Script("SELECT 1"))));
    }

    #[test]
    fn test_parameters_unique_by_name() {
        let mut cmd = BatchCommand::from_script("X", TransactionRequirement::DontCare);
        cmd.set_parameter("id", 1i64);
        cmd.set_parameter("id", 2i64);
        assert_eq!(cmd.parameters().len(), 1);
        assert_eq!(cmd.parameter("id"), Some(&Value::Integer(2)));
    }

    #[test]
    fn test_reset_clears_execution_state() {
        let mut cmd = BatchCommand::from_script("X", TransactionRequirement::DontCare);
        cmd.record_success(CommandResult::RowsAffected(3));
        assert!(cmd.was_executed());

        cmd.reset();
        assert!(!cmd.was_executed());
        assert!(cmd.result().is_none());
        assert!(cmd.error().is_none());
    }

    #[test]
    fn test_clone_copies_parameters_deeply() {
        let mut cmd = BatchCommand::from_script("X", TransactionRequirement::DontCare);
        cmd.set_parameter("name", "alice");

        let mut copy = cmd.clone();
        copy.set_parameter("name", "bob");

        assert_eq!(cmd.parameter("name"), Some(&Value::Text("alice".into())));
        assert_eq!(copy.parameter("name"), Some(&Value::Text("bob".into())));
    }

    #[test]
    fn test_record_failure_captures_error_and_exception() {
        let mut cmd = BatchCommand::from_script("X", TransactionRequirement::DontCare);
        cmd.record_failure(anyhow::anyhow!("boom"));
        assert!(cmd.was_executed());
        assert!(cmd.has_failed());
        assert_eq!(cmd.error(), Some("boom"));
        assert!(cmd.exception().is_some());
    }
}
