//! Folds per-class symbol records into an archive's provides, requires and
//! package edges.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::model::SymbolRecord;
use crate::registry::ProvidesRegistry;
use crate::scan::extract::MemberError;
use crate::traits::KnownArchives;

/// Reconciled dependency sets of one archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub provides: BTreeMap<String, Option<i64>>,
    pub requires: BTreeSet<String>,
    pub package_dependencies: BTreeMap<String, BTreeSet<String>>,
}

/// Package of a dotted symbol name, if it has one.
pub fn package_of(symbol: &str) -> Option<&str> {
    symbol.rsplit_once('.').map(|(package, _)| package)
}

pub struct Reconciler<'a> {
    known: Option<&'a dyn KnownArchives>,
    state: Reconciled,
    records: usize,
    skipped: usize,
}

impl<'a> Reconciler<'a> {
    pub fn new(known: Option<&'a dyn KnownArchives>) -> Self {
        Self {
            known,
            state: Reconciled::default(),
            records: 0,
            skipped: 0,
        }
    }

    /// Takes one extraction outcome. Failures are counted and otherwise
    /// ignored.
    pub fn absorb(&mut self, outcome: Result<SymbolRecord, MemberError>) {
        match outcome {
            Ok(record) => self.add_record(record),
            Err(error) => {
                debug!(error = %error, "Skipping member");
                self.skipped += 1;
            }
        }
    }

    pub fn add_record(&mut self, record: SymbolRecord) {
        self.records += 1;
        let source_package = package_of(&record.qualified_name);

        for reference in &record.references {
            self.state.requires.insert(reference.clone());

            let (Some(source), Some(target)) = (source_package, package_of(reference)) else {
                continue;
            };
            if source == target {
                continue;
            }
            if self
                .known
                .is_some_and(|known| known.provides_symbol(reference))
            {
                continue;
            }

            self.state
                .package_dependencies
                .entry(source.to_string())
                .or_default()
                .insert(target.to_string());
        }

        self.state
            .provides
            .insert(record.qualified_name, record.serial_marker);
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Removes self-provided symbols from `requires` and publishes this
    /// archive's provides to `registry`.
    pub fn finish(mut self, archive_name: &str, registry: Option<&ProvidesRegistry>) -> Reconciled {
        for symbol in self.state.provides.keys() {
            self.state.requires.remove(symbol);
            if let Some(registry) = registry {
                registry.append(symbol, archive_name);
            }
        }
        self.state
    }
}
