pub mod aggregate;
pub mod callback;
pub mod map;
pub mod options;
pub mod resource;

pub use aggregate::{AggregateBatchLocator, AggregateMode};
pub use callback::{CallbackBatchLocator, CallbackOptions};
pub use map::MapBatchLocator;
pub use options::{DEFAULT_DIRECTIVE_PATTERN, ScriptOptions, ScriptOptionsParser};
pub use resource::{DirectoryBatchLocator, StaticBatchLocator};

use std::collections::BTreeSet;

use crate::batch::Batch;
use crate::core::Result;

/// Resolves a named batch from some source of scripts or callbacks.
///
/// Names have case-insensitive identity: `GetUsers` and `getusers` refer
/// to the same batch.
pub trait BatchLocator: Send + Sync {
    /// All batch names this locator can resolve. Never fails; sources that
    /// cannot be enumerated contribute an empty set.
    fn get_names(&self) -> BTreeSet<String>;

    /// Resolve a batch by name. `Ok(None)` means the name is unknown to
    /// this locator; errors are reserved for broken sources and option
    /// conflicts inside a found batch.
    fn get_batch(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>>;
}

/// Split raw script text into individual command scripts.
///
/// The separator matches a whole line (trimmed, case-insensitive); each
/// non-blank trimmed segment becomes one command. Without a separator the
/// whole text is a single command; empty text yields no commands.
///
/// # Examples
///
/// ```
/// use dblifecycle::locator::separate_script_commands;
///
/// let parts = separate_script_commands("cmd1\nGO\ncmd2", Some("GO"));
/// assert_eq!(parts, vec!["cmd1".to_string(), "cmd2".to_string()]);
///
/// let whole = separate_script_commands("cmd1\nGO\ncmd2", None);
/// assert_eq!(whole, vec!["cmd1\nGO\ncmd2".to_string()]);
/// ```
pub fn separate_script_commands(text: &str, separator: Option<&str>) -> Vec<String> {
    let separator = match separator {
        Some(sep) if !sep.trim().is_empty() => sep.trim().to_string(),
        _ => {
            let trimmed = text.trim();
            return if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            };
        }
    };

    let mut commands = Vec::new();
    let mut segment = String::new();
    for line in text.lines() {
        if line.trim().eq_ignore_ascii_case(&separator) {
            push_segment(&mut commands, &mut segment);
        } else {
            segment.push_str(line);
            segment.push('\n');
        }
    }
    push_segment(&mut commands, &mut segment);
    commands
}

fn push_segment(commands: &mut Vec<String>, segment: &mut String) {
    let trimmed = segment.trim();
    if !trimmed.is_empty() {
        commands.push(trimmed.to_string());
    }
    segment.clear();
}

/// Insert `name` into `names` unless a case-insensitive duplicate is
/// already present. First-seen casing wins.
pub(crate) fn insert_name(names: &mut BTreeSet<String>, name: &str) {
    if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        names.insert(name.to_string());
    }
}

/// Build a batch from raw script text: split into command scripts, apply
/// inline directives, then check the finished batch for option conflicts
/// so broken sources fail at lookup time rather than at execution.
pub(crate) fn build_script_batch(
    text: &str,
    separator: Option<&str>,
    parser: &options::ScriptOptionsParser,
) -> Result<Batch> {
    let mut batch = Batch::new();
    for script in separate_script_commands(text, separator) {
        let command = batch.add_script(
            script.clone(),
            crate::core::TransactionRequirement::DontCare,
        );
        parser.apply(&script, command);
    }
    batch.requires_transaction()?;
    batch.isolation_level()?;
    Ok(batch)
}
