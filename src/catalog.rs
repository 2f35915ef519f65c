//! External collaborator contracts (§6): the catalog that supplies table,
//! column, index, and histogram metadata, and the virtual-table `best_index`
//! dialogue. Both are narrow, read-only interfaces — the planner never
//! mutates catalog state and the catalog is assumed immutable for the
//! lifetime of one compilation (§5).

use crate::bitmask::{Bitmask, CursorId};
use crate::error::Result;
use crate::flags::TermOp;
use std::rc::Rc;

/// Per-column type-coercion policy governing comparison rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Affinity {
    #[default]
    None,
    Text,
    Numeric,
    Integer,
    Real,
}

/// Named byte-level comparison function attached to text columns and
/// expressions. `None` means the default `BINARY` collation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Collation(pub Option<String>);

impl Collation {
    pub const BINARY: Collation = Collation(None);

    pub fn named(name: impl Into<String>) -> Collation {
        Collation(Some(name.into()))
    }

    pub fn name(&self) -> &str {
        self.0.as_deref().unwrap_or("BINARY")
    }
}

/// One column of an index, left to right.
#[derive(Debug, Clone)]
pub struct IndexColumn {
    /// 0-based column ordinal in the owning table, or `-1` for rowid.
    pub column: i32,
    pub affinity: Affinity,
    pub collation: Collation,
    pub descending: bool,
}

/// A sorted sample from a single-column histogram: `n_lt` rows strictly
/// less than `value`, `n_eq` rows equal to it.
#[derive(Debug, Clone)]
pub struct HistogramSample {
    /// Bytewise-comparable storage encoding of the sampled value.
    pub value: Vec<u8>,
    pub n_lt: u64,
    pub n_eq: u64,
}

/// Sorted ascending by [`HistogramSample::value`].
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    pub samples: Vec<HistogramSample>,
}

/// One index (primary key, secondary, or `INDEXED BY`-named) on a table.
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: CursorId,
    pub columns: Vec<IndexColumn>,
    pub unique: bool,
    pub is_primary_key: bool,
    /// True when the index *is* the rowid (no separate index b-tree to
    /// fetch through).
    pub is_rowid: bool,
    /// Catalog-estimated rows remaining after matching a `k`-column
    /// equality prefix; `row_est_buckets[0]` is the table's total row
    /// count, `row_est_buckets[k]` the estimate after `k` columns.
    pub row_est_buckets: Vec<u64>,
    pub histogram: Option<Histogram>,
}

impl IndexDescriptor {
    pub fn row_estimate_after(&self, n_eq: usize) -> u64 {
        self.row_est_buckets
            .get(n_eq)
            .copied()
            .unwrap_or_else(|| self.row_est_buckets.last().copied().unwrap_or(1))
    }
}

/// One table referenced by the statement.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub name: String,
    pub cursor: CursorId,
    pub row_count: u64,
    pub column_affinities: Vec<Affinity>,
    pub column_not_null: Vec<bool>,
    /// True when this FROM entry is backed by a virtual table rather than
    /// a b-tree (drives the [`crate::loop_enum::vtab`] dialogue instead of
    /// [`crate::loop_enum::btree`] matching).
    pub is_virtual: bool,
}

impl TableDescriptor {
    pub fn column_count(&self) -> usize {
        self.column_affinities.len()
    }
}

/// Read-only metadata provider. Implemented by the real schema/statistics
/// subsystem in production and by an in-memory mock in tests
/// (`tests/support/mock_catalog.rs`).
pub trait Catalog {
    fn table(&self, cursor: CursorId) -> Option<Rc<TableDescriptor>>;
    fn primary_key(&self, cursor: CursorId) -> Option<Rc<IndexDescriptor>>;
    fn indexes(&self, cursor: CursorId) -> Vec<Rc<IndexDescriptor>>;
    fn index_named(&self, cursor: CursorId, name: &str) -> Option<Rc<IndexDescriptor>> {
        self.indexes(cursor).into_iter().find(|i| i.name == name)
    }
    fn resolve_collation(&self, name: &str) -> Collation {
        Collation::named(name)
    }
}

/// One constraint offered to a virtual table's `best_index` callback
/// (§4.4.4).
#[derive(Debug, Clone)]
pub struct BestIndexConstraint {
    pub column: i32,
    pub op: TermOp,
    pub usable: bool,
    /// Index of the originating term in the flattened term store, so the
    /// enumerator can map the extension's response back to `aLTerm`.
    pub term_index: usize,
}

/// The structure populated for one `best_index` phase.
#[derive(Debug, Clone, Default)]
pub struct BestIndexQuery {
    pub constraints: Vec<BestIndexConstraint>,
    /// Present only when every ORDER BY term resolves to a column of this
    /// table.
    pub order_by: Vec<(i32, bool)>,
}

/// What the extension chose, in response to one [`BestIndexQuery`] phase.
#[derive(Debug, Clone)]
pub struct BestIndexPlan {
    pub idx_num: i32,
    pub idx_str: Option<String>,
    pub is_ordered: bool,
    /// Indices into [`BestIndexQuery::constraints`] the extension says it
    /// will fully enforce itself (the planner must not also apply them as
    /// residual filters, nor treat them as unconsumed).
    pub omitted_constraints: Vec<usize>,
    /// Indices into [`BestIndexQuery::constraints`] the extension adopted
    /// as seek arguments, in the positional order it wants them passed.
    pub argv_constraints: Vec<usize>,
    pub estimated_cost: f64,
    pub estimated_rows: u64,
}

/// A virtual table connection, narrowed to the one callback the planner
/// needs (§4.4.4, §6).
pub trait VirtualTable {
    fn name(&self) -> &str;
    fn best_index(&self, query: &BestIndexQuery) -> Result<BestIndexPlan>;
}

/// A FROM-clause entry (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Cross,
}

#[derive(Clone)]
pub struct FromEntry {
    pub cursor: CursorId,
    pub table: Rc<TableDescriptor>,
    pub indexed_by: Option<String>,
    pub not_indexed: bool,
    pub join_type: JoinType,
    pub virtual_table: Option<Rc<dyn VirtualTable>>,
    /// Mask of tables this entry's ON-clause may reference beyond itself;
    /// populated by the caller from the parser's join-constraint analysis.
    /// Combined with [`crate::bitmask::CursorBitmap::left_of`] to build the
    /// LEFT JOIN phantom dependency (§4.1).
    pub on_clause_mask: Bitmask,
}

impl std::fmt::Debug for FromEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FromEntry")
            .field("cursor", &self.cursor)
            .field("table", &self.table.name)
            .field("indexed_by", &self.indexed_by)
            .field("not_indexed", &self.not_indexed)
            .field("join_type", &self.join_type)
            .field("on_clause_mask", &self.on_clause_mask)
            .finish()
    }
}
