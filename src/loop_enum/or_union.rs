//! OR-union candidate aggregation (§4.4.6): when every disjunct of an OR
//! term has an indexable conjunct against this table, the whole OR term can
//! drive an access path that runs one indexed sub-scan per disjunct and
//! unions the results (with rowid de-duplication left to the emitter, §4.8)
//! instead of falling back to a full table scan.
//!
//! Matches the reference planner's `WhereOrSet`/`WhereOrCost a[N_OR_COST]`:
//! each disjunct is enumerated against the table and reduced to its own
//! non-dominated pool of `(prereq, rRun, nOut)` triples capped at
//! `N_OR_COST`, and the per-disjunct pools are combined by cross-product —
//! incrementally, re-pruning to `N_OR_COST` after each disjunct rather than
//! materialising the full `N_OR_COST^n` product — into a running aggregate
//! pool. Every surviving aggregate becomes its own `CandidateLoop`.

use super::{btree, CandidateLoop, LoopEnumerator, LoopVariant};
use crate::bitmask::{Bitmask, CursorBitmap, CursorId};
use crate::catalog::IndexDescriptor;
use crate::config::PlannerConfig;
use crate::cost::Cost;
use crate::error::Result;
use crate::flags::{TermOp, WsFlags};
use crate::selectivity::SelectivityOracle;
use crate::term::{StoreId, Term, TermArena};
use std::rc::Rc;

/// One non-dominated `(prereq, rRun, nOut)` triple (`WhereOrCost`, §4.4.6).
#[derive(Debug, Clone, Copy)]
struct OrCost {
    prereq: Bitmask,
    run: Cost,
    n_out: Cost,
}

fn or_cost_dominates(a: &OrCost, b: &OrCost) -> bool {
    a.prereq & !b.prereq == 0 && a.run <= b.run && a.n_out <= b.n_out
}

/// Insert into a `WhereOrSet`-style bounded pool: drop `candidate` if an
/// existing triple dominates it, otherwise drop everything it dominates and
/// append, then shed the worst-by-cost entry past `width` (`N_OR_COST`).
fn insert_or_cost(pool: &mut Vec<OrCost>, candidate: OrCost, width: usize) {
    if pool.iter().any(|e| or_cost_dominates(e, &candidate)) {
        return;
    }
    pool.retain(|e| !or_cost_dominates(&candidate, e));
    pool.push(candidate);
    if pool.len() > width {
        pool.sort_by_key(|e| e.run);
        pool.truncate(width);
    }
}

pub fn enumerate(
    enumerator: &LoopEnumerator<'_>,
    arena: &TermArena,
    store: StoreId,
    i_tab: usize,
    mask_self: Bitmask,
    mextra: Bitmask,
) -> Result<Vec<CandidateLoop>> {
    let entry = &enumerator.from_list[i_tab];
    if entry.virtual_table.is_some() {
        return Ok(Vec::new());
    }
    let indexes = enumerator.catalog.indexes(entry.cursor);
    let width = enumerator.config.or_sub_pool_width.max(1);
    let mut out = Vec::new();

    let mut sid = Some(store);
    while let Some(s) = sid {
        let ts = arena.get(s);
        for (tid, term) in ts.iter() {
            if term.is_coded() || term.op != TermOp::OR {
                continue;
            }
            let Some(or_info) = &term.or_info else {
                continue;
            };
            if or_info.indexable_mask & mask_self == 0 {
                continue;
            }
            let sub_store = arena.get(or_info.sub_store);

            // Seed the running aggregate pool with one zero-cost triple,
            // then cross each disjunct's own pool into it, re-pruning to
            // `width` after every disjunct.
            let mut acc: Vec<OrCost> = vec![OrCost {
                prereq: mextra,
                run: Cost::ZERO,
                n_out: Cost::ZERO,
            }];
            let mut n_sub = 0u32;
            for (_, sub_term) in sub_store.iter() {
                let triples = sub_term_triples(
                    enumerator.cursors,
                    enumerator.config,
                    arena,
                    sub_term,
                    entry.cursor,
                    &indexes,
                    entry.table.row_count,
                    width,
                );
                if triples.is_empty() {
                    continue;
                }
                n_sub += 1;
                let mut next = Vec::with_capacity(acc.len() * triples.len());
                for outer in &acc {
                    for inner in &triples {
                        insert_or_cost(
                            &mut next,
                            OrCost {
                                prereq: outer.prereq | inner.prereq,
                                run: outer.run.add(inner.run),
                                n_out: outer.n_out.add(inner.n_out),
                            },
                            width,
                        );
                    }
                }
                acc = next;
            }
            if n_sub == 0 {
                continue;
            }

            // "+log2(3.5)" markup modelling the deduplicating union over a
            // row-key set (§4.4.6), applied once per emitted aggregate.
            for agg in &acc {
                out.push(CandidateLoop {
                    i_tab,
                    mask_self,
                    prereq: agg.prereq,
                    setup: Cost::ZERO,
                    run: agg.run.add(dedup_markup()),
                    n_out: agg.n_out,
                    ws_flags: WsFlags::MULTI_OR,
                    n_eq: 0,
                    variant: LoopVariant::OrUnion { or_term: (s, tid) },
                    i_sort_idx: 0,
                    terms: vec![(s, tid)],
                });
            }
        }
        sid = ts.outer;
    }

    Ok(out)
}

/// Build one disjunct's own non-dominated triple pool (up to `width`
/// entries): one triple per index usable against its leading column (or
/// best-over-indexes for an AND-group disjunct), falling back to a
/// conservative full/quartered scan estimate when nothing indexable
/// applies, matching the conservative behaviour of the plain scan
/// candidate.
#[allow(clippy::too_many_arguments)]
fn sub_term_triples(
    cursors: &CursorBitmap,
    config: &PlannerConfig,
    arena: &TermArena,
    sub_term: &Term,
    table_cursor: CursorId,
    indexes: &[Rc<IndexDescriptor>],
    table_row_count: u64,
    width: usize,
) -> Vec<OrCost> {
    let mut pool = Vec::new();

    if sub_term.op.intersects(TermOp::INDEXABLE) && sub_term.left_cursor == Some(table_cursor) {
        if let Some(column) = sub_term.left_column {
            for index in indexes
                .iter()
                .filter(|ix| ix.columns.first().map(|c| c.column) == Some(column))
            {
                let rows = single_term_estimate(index, sub_term);
                insert_or_cost(
                    &mut pool,
                    OrCost {
                        prereq: sub_term.prereq_right,
                        run: Cost::from_rows(rows),
                        n_out: Cost::from_rows(rows),
                    },
                    width,
                );
            }
        }
        if pool.is_empty() {
            let rows = (table_row_count / 4).max(1);
            insert_or_cost(
                &mut pool,
                OrCost {
                    prereq: sub_term.prereq_right,
                    run: Cost::from_rows(rows),
                    n_out: Cost::from_rows(rows),
                },
                width,
            );
        }
        return pool;
    }

    if let Some(and_info) = &sub_term.and_info {
        for index in indexes {
            if index.table != table_cursor {
                continue;
            }
            let candidates =
                btree::match_index(cursors, config, arena, and_info.sub_store, 0, 0, 0, index.clone());
            for c in candidates {
                insert_or_cost(
                    &mut pool,
                    OrCost {
                        prereq: c.prereq,
                        run: c.run,
                        n_out: c.n_out,
                    },
                    width,
                );
            }
        }
        if !pool.is_empty() {
            return pool;
        }
    }

    let rows = table_row_count.max(1);
    insert_or_cost(
        &mut pool,
        OrCost {
            prereq: 0,
            run: Cost::from_rows(rows),
            n_out: Cost::from_rows(rows),
        },
        width,
    );
    pool
}

fn single_term_estimate(index: &IndexDescriptor, term: &Term) -> u64 {
    if term.op.contains(TermOp::EQ) || term.op.contains(TermOp::ISNULL) {
        if let crate::expr::Expr::Binary(_, _, rhs) = &*term.expr {
            return SelectivityOracle::equal_scan_est(index, 0, rhs);
        }
        return index.row_estimate_after(1);
    }
    if term.op.intersects(TermOp::RANGE) {
        let bound = match &*term.expr {
            crate::expr::Expr::Binary(_, _, rhs) => Some((**rhs).clone()),
            _ => None,
        };
        let lo = if term.op.is_lower_bound() { bound.as_ref() } else { None };
        let hi = if term.op.is_upper_bound() { bound.as_ref() } else { None };
        return SelectivityOracle::range_scan_est(index, 0, lo, hi);
    }
    index.row_estimate_after(0)
}

/// `10·log2(3.5)` deci-bels, rounded — the fixed per-union markup the
/// reference planner adds for the deduplicating row-key set.
fn dedup_markup() -> Cost {
    Cost((10.0 * 3.5f64.log2()).round() as u16)
}
