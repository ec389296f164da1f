use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use log::warn;

use crate::batch::Batch;
use crate::core::{DbManagerError, Result};

use super::options::ScriptOptionsParser;
use super::{BatchLocator, build_script_batch, insert_name};

const SCRIPT_EXTENSION: &str = "sql";

/// Locator over `*.sql` files in a directory; the batch name is the file
/// stem. Files are read at lookup time, so edits on disk are picked up
/// without re-registration.
#[derive(Debug)]
pub struct DirectoryBatchLocator {
    dir: PathBuf,
    parser: ScriptOptionsParser,
}

impl DirectoryBatchLocator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            parser: ScriptOptionsParser::default(),
        }
    }

    pub fn with_parser(mut self, parser: ScriptOptionsParser) -> Self {
        self.parser = parser;
        self
    }

    fn script_path(&self, name: &str) -> Option<PathBuf> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read script directory {}: {}", self.dir.display(), e);
                return None;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if is_script_file(&path)
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.eq_ignore_ascii_case(name))
            {
                return Some(path);
            }
        }
        None
    }
}

fn is_script_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SCRIPT_EXTENSION))
}

impl BatchLocator for DirectoryBatchLocator {
    fn get_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read script directory {}: {}", self.dir.display(), e);
                return names;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if is_script_file(&path) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    insert_name(&mut names, stem);
                }
            }
        }
        names
    }

    fn get_batch(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>> {
        let Some(path) = self.script_path(name) else {
            return Ok(None);
        };
        let text = std::fs::read_to_string(&path).map_err(|e| {
            DbManagerError::LocatorError(format!("cannot read {}: {}", path.display(), e))
        })?;
        build_script_batch(&text, separator, &self.parser).map(Some)
    }
}

/// Locator over scripts embedded in the binary (`include_str!` pairs).
#[derive(Debug, Default)]
pub struct StaticBatchLocator {
    scripts: Vec<(&'static str, &'static str)>,
    parser: ScriptOptionsParser,
}

impl StaticBatchLocator {
    pub fn new(scripts: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            scripts,
            parser: ScriptOptionsParser::default(),
        }
    }

    pub fn with_parser(mut self, parser: ScriptOptionsParser) -> Self {
        self.parser = parser;
        self
    }
}

impl BatchLocator for StaticBatchLocator {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_directory_locator_finds_sql_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("setup.sql"), "CREATE TABLE t (x)\nGO\nCREATE TABLE u (y)")
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a script").unwrap();

        let locator = DirectoryBatchLocator::new(dir.path());
        let names = locator.get_names();
        assert_eq!(names.len(), 1);
        assert!(names.contains("setup"));

        let batch = locator.get_batch("SETUP", Some("GO")).unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert!(locator.get_batch("missing", None).unwrap().is_none());
    }

    #[test]
    fn test_directory_locator_missing_dir_is_empty() {
        let locator = DirectoryBatchLocator::new("/nonexistent/scripts");
        assert!(locator.get_names().is_empty());
        assert!(locator.get_batch("anything", None).unwrap().is_none());
    }

    #[test]
    fn test_static_locator() {
        let locator = StaticBatchLocator::new(vec![
            ("create", "CREATE TABLE t (x)"),
            ("drop", "DROP TABLE t"),
        ]);
        assert_eq!(locator.get_names().len(), 2);
        let batch = locator.get_batch("Drop", None).unwrap().unwrap();
        assert_eq!(batch.commands()[0].script(), Some("DROP TABLE t"));
    }
}
