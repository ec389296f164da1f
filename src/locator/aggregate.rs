use std::collections::BTreeSet;

use log::debug;

use crate::batch::Batch;
use crate::core::Result;

use super::{BatchLocator, insert_name};

/// How an [`AggregateBatchLocator`] combines its sub-locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateMode {
    /// Waterfall: try sub-locators in registration order, the first batch
    /// found wins.
    FirstMatch,
    /// Union: every sub-locator must resolve the name; all their commands
    /// are merged into one batch in registration order. A miss from any
    /// sub-locator makes the whole lookup a miss.
    MergeAll,
}

/// Composes several locators into one logical source.
///
/// `get_names` is always the case-insensitive union of the sub-locator
/// name sets, regardless of mode.
pub struct AggregateBatchLocator {
    locators: Vec<Box<dyn BatchLocator>>,
    mode: AggregateMode,
}

impl AggregateBatchLocator {
    pub fn new(mode: AggregateMode) -> Self {
        Self {
            locators: Vec::new(),
            mode,
        }
    }

    pub fn with_locator(mut self, locator: Box<dyn BatchLocator>) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn add_locator(&mut self, locator: Box<dyn BatchLocator>) {
        self.locators.push(locator);
    }

    pub fn mode(&self) -> AggregateMode {
        self.mode
    }

    fn get_first_match(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>> {
        for locator in &self.locators {
            if let Some(batch) = locator.get_batch(name, separator)? {
                return Ok(Some(batch));
            }
        }
        Ok(None)
    }

    fn get_merged(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>> {
        let mut merged = Batch::new();
        for locator in &self.locators {
            match locator.get_batch(name, separator)? {
                Some(batch) => {
                    for command in batch.into_commands() {
                        merged.push(command);
                    }
                }
                None => {
                    debug!("Sub-locator missed '{}', merge lookup fails", name);
                    return Ok(None);
                }
            }
        }
        merged.requires_transaction()?;
        merged.isolation_level()?;
        Ok(Some(merged))
    }
}

impl BatchLocator for AggregateBatchLocator {
    fn get_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for locator in &self.locators {
            for name in locator.get_names() {
                insert_name(&mut names, &name);
            }
        }
        names
    }

    fn get_batch(&self, name: &str, separator: Option<&str>) -> Result<Option<Batch>> {
        if self.locators.is_empty() {
            return Ok(None);
        }
        match self.mode {
            AggregateMode::FirstMatch => self.get_first_match(name, separator),
            AggregateMode::MergeAll => self.get_merged(name, separator),
        }
    }
}
