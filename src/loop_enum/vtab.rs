//! Virtual-table `best_index` dialogue (§4.4.4).
//!
//! Rather than matching index columns ourselves, a virtual table is handed
//! every usable constraint on it and asked to choose. We offer that choice
//! across a handful of phases, each relaxing what counts as "usable", so a
//! wrapper that can only plan from a full equality set still gets offered
//! one, while a wrapper that can exploit a lone range bound gets a chance
//! to pick that instead. The reference planner calls this the vtab "omit"
//! dance; we keep its phased-retry shape rather than a single flat call.

use super::{CandidateLoop, LoopVariant, TermRef};
use crate::bitmask::{Bitmask, CursorBitmap};
use crate::catalog::{BestIndexConstraint, BestIndexQuery, VirtualTable};
use crate::config::PlannerConfig;
use crate::cost::Cost;
use crate::error::{PlannerError, Result};
use crate::flags::{TermOp, WsFlags};
use crate::term::{StoreId, TermArena};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use tracing::{instrument, trace};

/// Phase 0: constants without `IN`; phase 1: constants with `IN`; phase 2:
/// non-constants without `IN`; phase 3: everything (§4.4.4).
#[derive(Debug, Clone, Copy, EnumIter)]
enum Phase {
    ConstantNoIn,
    ConstantWithIn,
    NonConstantNoIn,
    Everything,
}

fn phase_accepts(phase: Phase, op: TermOp, prereq_right: Bitmask, bound_mask: Bitmask) -> bool {
    let indexable = op.intersects(TermOp::EQUALITY_LIKE | TermOp::RANGE | TermOp::MATCH);
    if !indexable {
        return false;
    }
    let is_in = op.contains(TermOp::IN);
    let is_constant = prereq_right == 0;
    let correlated_ok = prereq_right & !bound_mask == 0;
    match phase {
        Phase::ConstantNoIn => is_constant && !is_in,
        Phase::ConstantWithIn => is_constant,
        Phase::NonConstantNoIn => correlated_ok && !is_in,
        Phase::Everything => correlated_ok,
    }
}

#[instrument(skip(cursors, config, arena, vtab), fields(i_tab))]
pub fn enumerate_virtual_table(
    cursors: &CursorBitmap,
    config: &PlannerConfig,
    arena: &TermArena,
    store: StoreId,
    i_tab: usize,
    mask_self: Bitmask,
    mextra: Bitmask,
    vtab: &dyn VirtualTable,
) -> Result<Vec<CandidateLoop>> {
    let _ = cursors;
    let n_phases = (config.vtab_best_index_phases as usize).max(1);

    let mut candidates = Vec::new();
    let mut terms: Vec<TermRef> = Vec::new();
    collect_terms(arena, store, &mut terms);

    for phase in Phase::iter().take(n_phases) {
        let mut constraints = Vec::with_capacity(terms.len());
        let mut usable_refs = Vec::new();
        for (idx, &(s, t)) in terms.iter().enumerate() {
            let term = arena.get(s).get(t);
            if term.is_coded() {
                continue;
            }
            let Some(column) = term.left_column else {
                continue;
            };
            let usable = phase_accepts(phase, term.op, term.prereq_right, mextra | mask_self);
            constraints.push(BestIndexConstraint {
                column,
                op: term.op,
                usable,
                term_index: idx,
            });
            if usable {
                usable_refs.push((s, t));
            }
        }
        if usable_refs.is_empty() {
            continue;
        }

        let query = BestIndexQuery {
            constraints,
            order_by: Vec::new(),
        };
        let plan = match vtab.best_index(&query) {
            Ok(p) => p,
            Err(PlannerError::VirtualTableError { table, message }) => {
                trace!(table, message, "virtual table declined best_index phase");
                continue;
            }
            Err(e) => return Err(e),
        };

        let resolve = |ci: usize| -> Option<TermRef> {
            query
                .constraints
                .get(ci)
                .and_then(|c| terms.get(c.term_index).copied())
        };
        let invalid_plan = || PlannerError::VirtualTablePlanInvalid {
            table: vtab.name().to_string(),
        };
        let omitted: Vec<TermRef> = plan
            .omitted_constraints
            .iter()
            .map(|&ci| resolve(ci).ok_or_else(invalid_plan))
            .collect::<std::result::Result<_, _>>()?;
        let argv: Vec<TermRef> = plan
            .argv_constraints
            .iter()
            .map(|&ci| resolve(ci).ok_or_else(invalid_plan))
            .collect::<std::result::Result<_, _>>()?;

        let mut prereq = mextra;
        for &(s, t) in &argv {
            prereq |= arena.get(s).get(t).prereq_right;
        }

        let run = Cost::from_vtab_estimate(plan.estimated_cost);
        // Per the reference dialogue: nOut is a fixed log2(25) placeholder,
        // not the extension's own (often wildly optimistic) row estimate.
        let n_out = Cost::from_rows(25);
        let _ = plan.estimated_rows;
        candidates.push(CandidateLoop {
            i_tab,
            mask_self,
            prereq,
            setup: Cost::ZERO,
            run,
            n_out,
            ws_flags: WsFlags::VIRTUAL_TABLE,
            n_eq: argv.len() as u32,
            variant: LoopVariant::VirtualTable {
                idx_num: plan.idx_num,
                idx_str: plan.idx_str,
                is_ordered: plan.is_ordered,
                omitted_constraint_terms: omitted,
            },
            i_sort_idx: if plan.is_ordered { 1 } else { 0 },
            terms: argv,
        });
    }

    Ok(candidates)
}

fn collect_terms(arena: &TermArena, store: StoreId, out: &mut Vec<TermRef>) {
    let mut sid = Some(store);
    while let Some(s) = sid {
        let ts = arena.get(s);
        for (tid, _term) in ts.iter() {
            out.push((s, tid));
        }
        sid = ts.outer;
    }
}
