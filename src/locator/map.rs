use std::collections::BTreeSet;

use crate::batch::Batch;
use crate::core::Result;

use super::options::ScriptOptionsParser;
use super::{BatchLocator, build_script_batch, insert_name};

/// Locator over an in-memory name → script map.
///
/// # Examples
///
/// ```
/// use dblifecycle::locator::{BatchLocator, MapBatchLocator};
///
/// let locator = MapBatchLocator::new()
///     .with_script("create", "CREATE TABLE t (x)\nGO\nCREATE INDEX i ON t (x)");
///
/// let batch = locator.get_batch("CREATE", Some("GO")).unwrap().unwrap();
/// assert_eq!(batch.len(), 2);
/// assert!(locator.get_batch("missing", None).unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MapBatchLocator {
    scripts: Vec<(String, String)>,
    parser: ScriptOptionsParser,
}

impl MapBatchLocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parser(mut self, parser: ScriptOptionsParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_script(mut self, name: impl Into<String>, script: impl Into<String>) -> Self {
        self.register_script(name, script);
        self
    }

    /// Add or replace a script under a (case-insensitive) name.
    pub fn register_script(&mut self, name: impl Into<String>, script: impl Into<String>) {
        let name = name.into();
        let script = script.into();
        match self
            .scripts
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = script,
            None => self.scripts.push((name, script)),
        }
    }
}

impl BatchLocator for MapBatchLocator {
    fn get_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for (name, _) in &self.scripts {
            insert_name(&mut names, name);
        }
        names
    }

    fn get_batch(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>> {
        let Some((_, script)) = self
            .scripts
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        else {
            return Ok(None);
        };
        build_script_batch(script, separator, &self.parser).map(Some)
    }
}
