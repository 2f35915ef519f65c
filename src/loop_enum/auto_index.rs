//! Automatic covering index (§4.4.3): when a table has no usable index for
//! an equality join key and is joined after another table has narrowed the
//! outer loop (`mextra != 0`), build a transient covering index over the
//! equality columns found in the WHERE clause and use it instead of a full
//! scan. Grounded in the reference planner's handling of tables wider than
//! the dependency word (`where.c`, automatic-index `colUsed` lumping): once
//! a table has more columns than fit individually in the used-column mask,
//! every column past the limit is tracked as a single combined bit.

use super::{CandidateLoop, LoopVariant};
use crate::bitmask::{Bitmask, CursorBitmap};
use crate::catalog::{Affinity, Catalog, Collation, IndexColumn, IndexDescriptor, TableDescriptor};
use crate::cost::Cost;
use crate::flags::{TermOp, WsFlags};
use crate::term::{StoreId, TermArena};
use std::rc::Rc;

/// The number of columns past which the reference planner starts lumping
/// further columns into one shared tracking bit, because the used-column
/// mask is itself only [`crate::bitmask::W`] bits wide.
const COL_USED_LUMP_THRESHOLD: usize = crate::bitmask::W as usize - 1;

/// Try to build one automatic-index candidate for this table from whatever
/// plain equality terms reference it. Returns `None` when no equality term
/// is eligible (nothing to index on).
pub fn build_candidate(
    cursors: &CursorBitmap,
    catalog: &dyn Catalog,
    arena: &TermArena,
    store: StoreId,
    i_tab: usize,
    mask_self: Bitmask,
    mextra: Bitmask,
    table: &Rc<TableDescriptor>,
) -> Option<CandidateLoop> {
    let _ = cursors;
    let mut columns: Vec<IndexColumn> = Vec::new();
    let mut terms = Vec::new();
    let mut prereq = mextra;

    let mut sid = Some(store);
    while let Some(s) = sid {
        let ts = arena.get(s);
        for (tid, term) in ts.iter() {
            if term.is_coded() || !term.op.contains(TermOp::EQ) {
                continue;
            }
            let (Some(cursor), Some(column)) = (term.left_cursor, term.left_column) else {
                continue;
            };
            if cursor != table.cursor || column < 0 {
                continue;
            }
            // Right side must not depend on this same table (else it isn't
            // a usable seek key for a fresh index over it).
            if term.prereq_right & mask_self != 0 {
                continue;
            }
            if columns.iter().any(|c| c.column == tracked_column(column)) {
                continue;
            }
            let affinity = table
                .column_affinities
                .get(column as usize)
                .copied()
                .unwrap_or(Affinity::None);
            columns.push(IndexColumn {
                column: tracked_column(column),
                affinity,
                collation: term.collation.clone().unwrap_or(Collation::BINARY),
                descending: false,
            });
            terms.push((s, tid));
            prereq |= term.prereq_right;
        }
        sid = ts.outer;
    }

    if columns.is_empty() {
        return None;
    }

    let index = Rc::new(IndexDescriptor {
        name: format!("auto-index-on-{}", table.name),
        table: table.cursor,
        columns: columns.clone(),
        unique: false,
        is_primary_key: false,
        is_rowid: false,
        row_est_buckets: auto_index_row_buckets(table.row_count, columns.len()),
        histogram: None,
    });

    let n_eq = columns.len();
    let rows = index.row_estimate_after(n_eq);
    let build_cost = build_setup_cost(table.row_count);
    let run = Cost::from_rows(rows.max(1));

    Some(CandidateLoop {
        i_tab,
        mask_self,
        prereq,
        setup: build_cost,
        run,
        n_out: run,
        ws_flags: WsFlags::AUTO_INDEX | WsFlags::COLUMN_EQ,
        n_eq: n_eq as u32,
        variant: LoopVariant::AutoIndex { index },
        i_sort_idx: 0, // a freshly-built covering index never satisfies ORDER BY in this model.
        terms,
    })
}

/// Past [`COL_USED_LUMP_THRESHOLD`] distinct columns, every further column
/// collapses onto the same tracked ordinal, mirroring the reference
/// planner's saturation of its used-column bitmask for very wide tables.
fn tracked_column(column: i32) -> i32 {
    if (column as usize) < COL_USED_LUMP_THRESHOLD {
        column
    } else {
        COL_USED_LUMP_THRESHOLD as i32
    }
}

/// `7·N·log2(N)` deci-bels (§4.4.3): the one-time cost of sorting `N` rows
/// into the transient covering index, expressed in the same log-space unit
/// as every other cost so it composes with `cost_add`.
fn build_setup_cost(row_count: u64) -> Cost {
    let n = row_count.max(2) as f64;
    let work = 7.0 * n * n.log2();
    Cost::from_rows(work as u64)
}

fn auto_index_row_buckets(row_count: u64, n_eq: usize) -> Vec<u64> {
    let mut v = Vec::with_capacity(n_eq + 1);
    v.push(row_count.max(1));
    let mut cur = row_count.max(1);
    for _ in 0..n_eq {
        cur = (cur / 10).max(1);
        v.push(cur);
    }
    v
}
