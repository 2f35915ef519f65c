//! Per-table candidate access-path generation (§4.4).

pub mod auto_index;
pub mod btree;
pub mod dominance;
pub mod or_union;
pub mod vtab;

use crate::bitmask::{Bitmask, CursorBitmap};
use crate::catalog::{Catalog, FromEntry, IndexDescriptor};
use crate::config::PlannerConfig;
use crate::cost::Cost;
use crate::error::Result;
use crate::flags::WsFlags;
use crate::term::{StoreId, TermArena, TermId};
use std::rc::Rc;
use tracing::{debug, instrument};

/// A borrowed reference to one term consumed as an index key, in the order
/// it binds to index columns (`aLTerm`, §3).
pub type TermRef = (StoreId, TermId);

/// The access-path-specific payload of a [`CandidateLoop`] (§3, "variant
/// payload").
#[derive(Debug, Clone)]
pub enum LoopVariant {
    BTree {
        index: Rc<IndexDescriptor>,
    },
    AutoIndex {
        /// Synthetic descriptor for the transient covering index this
        /// candidate will build; materialised once by the emitter, guarded
        /// by a one-shot opcode (§4.4.3).
        index: Rc<IndexDescriptor>,
    },
    VirtualTable {
        idx_num: i32,
        idx_str: Option<String>,
        is_ordered: bool,
        /// Constraints the wrapper promised to omit (it will fully enforce
        /// them itself); the planner must not treat these as residual
        /// filters nor re-apply them.
        omitted_constraint_terms: Vec<TermRef>,
    },
    OrUnion {
        /// The OR term this candidate materialises as a de-duplicated
        /// union scan.
        or_term: TermRef,
    },
}

/// One possible access strategy for one FROM entry (§3).
#[derive(Debug, Clone)]
pub struct CandidateLoop {
    pub i_tab: usize,
    pub mask_self: Bitmask,
    pub prereq: Bitmask,
    pub setup: Cost,
    pub run: Cost,
    pub n_out: Cost,
    pub ws_flags: WsFlags,
    pub n_eq: u32,
    pub variant: LoopVariant,
    /// 0 when this candidate supports no ORDER BY reasoning at all
    /// (e.g. an IN-driven scan past the prefix); otherwise a small tag
    /// naming which index candidate the [`crate::orderby`] walk should
    /// consult. We use the candidate's own identity (its position once
    /// inserted into the pool) rather than a separate numbering scheme.
    pub i_sort_idx: u32,
    pub terms: Vec<TermRef>,
}

impl CandidateLoop {
    pub fn cost(&self) -> Cost {
        self.setup.add(self.run)
    }

    pub fn is_one_row(&self) -> bool {
        self.ws_flags.contains(WsFlags::ONE_ROW)
    }
}

/// Per-table bag of [`CandidateLoop`]s in weak-dominance-reduced form
/// (§4.4.5).
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    pub loops: Vec<CandidateLoop>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self { loops: Vec::new() }
    }
}

/// Drives §4.4: for every FROM entry, for every index (b-tree, automatic,
/// virtual table) and every OR-union opportunity, emit candidate loops into
/// the per-table [`CandidatePool`]s, reduced by weak dominance.
pub struct LoopEnumerator<'a> {
    pub cursors: &'a CursorBitmap,
    pub catalog: &'a dyn Catalog,
    pub config: &'a PlannerConfig,
    pub from_list: &'a [FromEntry],
}

impl<'a> LoopEnumerator<'a> {
    pub fn new(
        cursors: &'a CursorBitmap,
        catalog: &'a dyn Catalog,
        config: &'a PlannerConfig,
        from_list: &'a [FromEntry],
    ) -> Self {
        Self {
            cursors,
            catalog,
            config,
            from_list,
        }
    }

    /// Enumerate every candidate loop for one FROM position (§4.4.1).
    /// `mextra` is the forced-prereq mask contributed by outer LEFT/CROSS
    /// joins (ON-clause phantom dependencies already folded into term
    /// `prereq_all` by the analyser; `mextra` additionally forbids this
    /// loop from running before tables it's nominally cross/left-joined
    /// after).
    #[instrument(skip(self, arena), fields(i_tab))]
    pub fn enumerate(
        &self,
        arena: &TermArena,
        store: StoreId,
        i_tab: usize,
        mextra: Bitmask,
    ) -> Result<CandidatePool> {
        let entry = &self.from_list[i_tab];
        let mask_self = self.cursors.mask_of(entry.cursor);
        let mut pool = CandidatePool::new();

        if let Some(vtab) = &entry.virtual_table {
            let candidates = vtab::enumerate_virtual_table(
                self.cursors,
                self.config,
                arena,
                store,
                i_tab,
                mask_self,
                mextra,
                vtab.as_ref(),
            )?;
            for c in candidates {
                dominance::insert(&mut pool, c);
            }
            debug!(n = pool.loops.len(), "virtual table candidates");
            return Ok(pool);
        }

        let table = entry.table.clone();
        let mut any_btree = false;
        let indexes = self.indexes_to_consider(entry);
        for index in &indexes {
            let candidates = btree::match_index(
                self.cursors,
                self.config,
                arena,
                store,
                i_tab,
                mask_self,
                mextra,
                index.clone(),
            );
            if !candidates.is_empty() {
                any_btree = true;
            }
            for c in candidates {
                dominance::insert(&mut pool, c);
            }
        }

        if !any_btree && !entry.not_indexed && mextra != 0 {
            if let Some(c) = auto_index::build_candidate(
                self.cursors,
                self.catalog,
                arena,
                store,
                i_tab,
                mask_self,
                mextra,
                &table,
            ) {
                dominance::insert(&mut pool, c);
            }
        }

        for c in or_union::enumerate(self, arena, store, i_tab, mask_self, mextra)? {
            dominance::insert(&mut pool, c);
        }

        // Every table also has a full-scan fallback: no keys, no ordering,
        // cost = table row count.
        let scan_cost = Cost::from_rows(table.row_count);
        dominance::insert(
            &mut pool,
            CandidateLoop {
                i_tab,
                mask_self,
                prereq: mextra,
                setup: Cost::ZERO,
                run: scan_cost,
                n_out: scan_cost,
                ws_flags: WsFlags::empty(),
                n_eq: 0,
                variant: LoopVariant::BTree {
                    index: self
                        .catalog
                        .primary_key(entry.cursor)
                        .unwrap_or_else(|| Rc::new(rowid_scan_index(entry.cursor))),
                },
                i_sort_idx: 0,
                terms: Vec::new(),
            },
        );

        debug!(n = pool.loops.len(), "candidates enumerated");
        Ok(pool)
    }

    fn indexes_to_consider(&self, entry: &FromEntry) -> Vec<Rc<IndexDescriptor>> {
        if let Some(name) = &entry.indexed_by {
            return self
                .catalog
                .index_named(entry.cursor, name)
                .into_iter()
                .collect();
        }
        if entry.not_indexed {
            return Vec::new();
        }
        let mut all = self.catalog.indexes(entry.cursor);
        if let Some(pk) = self.catalog.primary_key(entry.cursor) {
            if !all.iter().any(|i| Rc::ptr_eq(i, &pk)) {
                all.push(pk);
            }
        }
        all
    }
}

fn rowid_scan_index(cursor: crate::bitmask::CursorId) -> IndexDescriptor {
    IndexDescriptor {
        name: "rowid".into(),
        table: cursor,
        columns: Vec::new(),
        unique: true,
        is_primary_key: true,
        is_rowid: true,
        row_est_buckets: vec![u64::MAX],
        histogram: None,
    }
}
