use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{Table, TableDiff};

/// Cache of the physical schema of the tables of one destination.
///
/// The lock is never held across an `.await`: callers copy what they need out of the cache.
#[derive(Debug, Clone, Default)]
pub struct TableCache {
    tables: Arc<RwLock<HashMap<String, Table>>>,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table_name: &str) -> Option<Table> {
        self.tables.read().get(table_name).cloned()
    }

    /// Returns the diff between the cached table and `desired`, `None` when the table is not
    /// cached.
    pub fn diff(&self, desired: &Table) -> Option<TableDiff> {
        self.tables
            .read()
            .get(&desired.name)
            .map(|cached| cached.diff(desired))
    }

    /// Caches `table` unless another caller cached the same table first, returning the entry.
    pub fn insert_if_absent(&self, table: Table) -> Table {
        let mut tables = self.tables.write();
        tables.entry(table.name.clone()).or_insert(table).clone()
    }

    /// Caches `table`, replacing any previous entry.
    pub fn replace(&self, table: Table) {
        self.tables.write().insert(table.name.clone(), table);
    }

    /// Merges an applied diff into the cached table and stamps it with `version`.
    pub fn apply(&self, diff: &TableDiff, version: u64) -> Option<Table> {
        let mut tables = self.tables.write();
        let table = tables.get_mut(&diff.table_name)?;
        table.apply(diff);
        table.version = version;

        Some(table.clone())
    }

    pub fn remove(&self, table_name: &str) -> Option<Table> {
        self.tables.write().remove(table_name)
    }

    pub fn len(&self) -> usize {
        self.tables.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SqlColumn;

    #[test]
    fn first_insert_wins() {
        let cache = TableCache::new();
        let mut first = Table::new("events");
        first.version = 1;
        let mut second = Table::new("events");
        second.version = 2;

        assert_eq!(cache.insert_if_absent(first).version, 1);
        assert_eq!(cache.insert_if_absent(second).version, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn apply_merges_and_stamps() {
        let cache = TableCache::new();
        cache.replace(Table::new("events"));

        let desired = Table::new("events").with_column("a", SqlColumn::new("text"));
        let diff = cache.diff(&desired).unwrap();

        let applied = cache.apply(&diff, 3).unwrap();
        assert!(applied.columns.contains_key("a"));
        assert_eq!(applied.version, 3);
        assert!(cache.diff(&desired).unwrap().is_empty());
        assert!(cache.diff(&Table::new("other")).is_none());
    }
}
