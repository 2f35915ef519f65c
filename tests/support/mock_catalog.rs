//! In-memory [`Catalog`] for end-to-end scenario tests (§10.4), standing in
//! for the real schema/statistics subsystem the way the reference repo's
//! `tests/integration` suite exercises its query path against an in-memory
//! database rather than a mock trait object.

use queryplan::bitmask::CursorId;
use queryplan::catalog::{Catalog, Collation, IndexDescriptor, TableDescriptor};
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Default)]
pub struct MockCatalog {
    tables: HashMap<CursorId, Rc<TableDescriptor>>,
    indexes: HashMap<CursorId, Vec<Rc<IndexDescriptor>>>,
    primary_keys: HashMap<CursorId, Rc<IndexDescriptor>>,
    collations: HashMap<String, Collation>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDescriptor) -> Self {
        self.tables.insert(table.cursor, Rc::new(table));
        self
    }

    pub fn with_primary_key(mut self, index: IndexDescriptor) -> Self {
        let rc = Rc::new(index);
        self.primary_keys.insert(rc.table, rc.clone());
        self.indexes.entry(rc.table).or_default().push(rc);
        self
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        let rc = Rc::new(index);
        self.indexes.entry(rc.table).or_default().push(rc);
        self
    }

    pub fn with_collation(mut self, name: &str, collation: Collation) -> Self {
        self.collations.insert(name.to_string(), collation);
        self
    }
}

impl Catalog for MockCatalog {
    fn table(&self, cursor: CursorId) -> Option<Rc<TableDescriptor>> {
        self.tables.get(&cursor).cloned()
    }

    fn primary_key(&self, cursor: CursorId) -> Option<Rc<IndexDescriptor>> {
        self.primary_keys.get(&cursor).cloned()
    }

    fn indexes(&self, cursor: CursorId) -> Vec<Rc<IndexDescriptor>> {
        self.indexes.get(&cursor).cloned().unwrap_or_default()
    }

    fn resolve_collation(&self, name: &str) -> Collation {
        self.collations
            .get(name)
            .cloned()
            .unwrap_or_else(|| Collation::named(name))
    }
}
