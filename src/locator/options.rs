//! Extraction of per-command options embedded in script text.
//!
//! Scripts may carry inline directives such as
//! `/* DBMANAGER:TransactionRequirement=Required */`; the parser pulls
//! them out with a configurable pattern and applies them to the command
//! built from that script.

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::batch::BatchCommand;
use crate::core::{DbManagerError, ExecutionType, IsolationLevel, Result, TransactionRequirement};

/// Default directive pattern. Two named captures are required by any
/// replacement pattern: `key` and `value`.
pub const DEFAULT_DIRECTIVE_PATTERN: &str =
    r"(?i)/\*\s*DBMANAGER:\s*(?P<key>[A-Za-z]+)\s*=\s*(?P<value>[A-Za-z0-9]+)\s*\*/";

lazy_static! {
    static ref DEFAULT_DIRECTIVE_REGEX: Regex = Regex::new(DEFAULT_DIRECTIVE_PATTERN)
        .expect("default directive pattern is valid");
}

/// Options recognized in script directives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptOptions {
    pub transaction_requirement: Option<TransactionRequirement>,
    pub isolation_level: Option<IsolationLevel>,
    pub execution_type: Option<ExecutionType>,
}

/// Parses inline directives out of raw script text.
#[derive(Debug, Clone)]
pub struct ScriptOptionsParser {
    pattern: Regex,
}

impl Default for ScriptOptionsParser {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_DIRECTIVE_REGEX.clone(),
        }
    }
}

impl ScriptOptionsParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom directive pattern. The pattern must define the named
    /// captures `key` and `value`.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let compiled = Regex::new(pattern)
            .map_err(|e| DbManagerError::ParseError(format!("bad directive pattern: {}", e)))?;
        let names: Vec<_> = compiled.capture_names().flatten().collect();
        if !names.contains(&"key") || !names.contains(&"value") {
            return Err(DbManagerError::ParseError(
                "directive pattern must define 'key' and 'value' captures".into(),
            ));
        }
        Ok(Self { pattern: compiled })
    }

    /// Extract all recognized options from `script`.
    ///
    /// Unknown keys are ignored; a malformed value is logged and ignored.
    pub fn parse(&self, script: &str) -> ScriptOptions {
        let mut options = ScriptOptions::default();
        for captures in self.pattern.captures_iter(script) {
            let (Some(key), Some(value)) = (captures.name("key"), captures.name("value")) else {
                continue;
            };
            let key = key.as_str();
            let value = value.as_str();
            if key.eq_ignore_ascii_case("TransactionRequirement") {
                match value.parse() {
                    Ok(parsed) => options.transaction_requirement = Some(parsed),
                    Err(_) => warn!(
                        "Ignoring directive with bad transaction requirement '{}'",
                        value
                    ),
                }
            } else if key.eq_ignore_ascii_case("IsolationLevel") {
                match value.parse() {
                    Ok(parsed) => options.isolation_level = Some(parsed),
                    Err(_) => warn!("Ignoring directive with bad isolation level '{}'", value),
                }
            } else if key.eq_ignore_ascii_case("ExecutionType") {
                match value.parse() {
                    Ok(parsed) => options.execution_type = Some(parsed),
                    Err(_) => warn!("Ignoring directive with bad execution type '{}'", value),
                }
            }
        }
        options
    }

    /// Parse `script` and apply any found options to `command`.
    pub fn apply(&self, script: &str, command: &mut BatchCommand) {
        let options = self.parse(script);
        if let Some(requirement) = options.transaction_requirement {
            command.set_transaction_requirement(requirement);
        }
        if let Some(level) = options.isolation_level {
            command.set_isolation_level(level);
        }
        if let Some(execution_type) = options.execution_type {
            command.set_execution_type(execution_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transaction_requirement_directive() {
        let parser = ScriptOptionsParser::new();
        let options =
            parser.parse("/* DBMANAGER:TransactionRequirement=Required */\nCREATE TABLE t (x)");
        assert_eq!(
            options.transaction_requirement,
            Some(TransactionRequirement::Required)
        );
        assert_eq!(options.isolation_level, None);
    }

    #[test]
    fn test_parse_multiple_directives() {
        let parser = ScriptOptionsParser::new();
        let script = "/* DBMANAGER:IsolationLevel=Serializable */\n\
                      /* DBMANAGER:ExecutionType=Scalar */\n\
                      SELECT COUNT(*) FROM t";
        let options = parser.parse(script);
        assert_eq!(options.isolation_level, Some(IsolationLevel::Serializable));
        assert_eq!(options.execution_type, Some(ExecutionType::Scalar));
    }

    #[test]
    fn test_directive_keys_are_case_insensitive() {
        let parser = ScriptOptionsParser::new();
        let options = parser.parse("/* dbmanager:transactionrequirement=disallowed */");
        assert_eq!(
            options.transaction_requirement,
            Some(TransactionRequirement::Disallowed)
        );
    }

    #[test]
    fn test_unknown_key_is_ignored() {
        let parser = ScriptOptionsParser::new();
        let options = parser.parse("/* DBMANAGER:Timeout=30 */ SELECT 1");
        assert_eq!(options, ScriptOptions::default());
    }

    #[test]
    fn test_malformed_value_is_ignored() {
        let parser = ScriptOptionsParser::new();
        let options = parser.parse("/* DBMANAGER:TransactionRequirement=Sometimes */");
        assert_eq!(options.transaction_requirement, None);
    }

    #[test]
    fn test_custom_pattern_requires_named_captures() {
        assert!(ScriptOptionsParser::with_pattern(r"--\s*(?P<key>\w+)=(?P<value>\w+)").is_ok());
        assert!(ScriptOptionsParser::with_pattern(r"--\s*(\w+)=(\w+)").is_err());
        assert!(ScriptOptionsParser::with_pattern(r"(?P<key>[").is_err());
    }

    #[test]
    fn test_custom_pattern_parses() {
        let parser =
            ScriptOptionsParser::with_pattern(r"--\s*(?P<key>\w+)=(?P<value>\w+)").unwrap();
        let options = parser.parse("-- ExecutionType=Reader\nSELECT * FROM t");
        assert_eq!(options.execution_type, Some(ExecutionType::Reader));
    }

    #[test]
    fn test_apply_sets_command_options() {
        let parser = ScriptOptionsParser::new();
        let script = "/* DBMANAGER:TransactionRequirement=Required */ CREATE TABLE t (x)";
        let mut command = BatchCommand::from_script(script, TransactionRequirement::DontCare);
        parser.apply(script, &mut command);
        assert_eq!(
            command.transaction_requirement(),
            TransactionRequirement::Required
        );
    }
}
