//! Weak-dominance reduction of a table's candidate pool (§4.4.5).
//!
//! A candidate `a` weakly dominates `b` when it needs no more outside
//! tables, costs no more, and produces no more rows — *and* doesn't give up
//! an ordering guarantee `b` offers. Losing a dominated candidate can never
//! make the final plan worse, so the pool only ever needs to remember the
//! Pareto frontier along (prereq, cost, rows, is-ordered).

use super::{CandidateLoop, CandidatePool};

fn dominates(a: &CandidateLoop, b: &CandidateLoop) -> bool {
    let subset_prereq = a.prereq & !b.prereq == 0;
    if !subset_prereq {
        return false;
    }
    if a.cost() > b.cost() {
        return false;
    }
    if a.n_out > b.n_out {
        return false;
    }
    // Don't discard a candidate that uniquely offers an ordering the
    // dominating one doesn't: the solver may need it to satisfy ORDER BY
    // without a separate sort, which a raw cost/row comparison can't see.
    if b.i_sort_idx != 0 && a.i_sort_idx == 0 {
        return false;
    }
    true
}

/// Insert `candidate` into `pool`, keeping only the non-dominated frontier.
pub fn insert(pool: &mut CandidatePool, candidate: CandidateLoop) {
    if pool.loops.iter().any(|existing| dominates(existing, &candidate)) {
        return;
    }
    pool.loops.retain(|existing| !dominates(&candidate, existing));
    pool.loops.push(candidate);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexDescriptor;
    use crate::cost::Cost;
    use crate::flags::WsFlags;
    use crate::loop_enum::LoopVariant;
    use std::rc::Rc;

    fn rowid_index() -> Rc<IndexDescriptor> {
        Rc::new(IndexDescriptor {
            name: "rowid".into(),
            table: 0,
            columns: Vec::new(),
            unique: true,
            is_primary_key: true,
            is_rowid: true,
            row_est_buckets: vec![1],
            histogram: None,
        })
    }

    fn candidate(cost_rows: u64, n_out_rows: u64, i_sort_idx: u32) -> CandidateLoop {
        CandidateLoop {
            i_tab: 0,
            mask_self: 1,
            prereq: 0,
            setup: Cost::ZERO,
            run: Cost::from_rows(cost_rows),
            n_out: Cost::from_rows(n_out_rows),
            ws_flags: WsFlags::empty(),
            n_eq: 0,
            variant: LoopVariant::BTree { index: rowid_index() },
            i_sort_idx,
            terms: Vec::new(),
        }
    }

    #[test]
    fn strictly_worse_candidate_is_dropped() {
        let mut pool = CandidatePool::new();
        insert(&mut pool, candidate(10, 10, 0));
        insert(&mut pool, candidate(1000, 1000, 0));
        assert_eq!(pool.loops.len(), 1);
        assert_eq!(pool.loops[0].run, Cost::from_rows(10));
    }

    #[test]
    fn cheaper_arrival_evicts_dominated_incumbent() {
        let mut pool = CandidatePool::new();
        insert(&mut pool, candidate(1000, 1000, 0));
        insert(&mut pool, candidate(10, 10, 0));
        assert_eq!(pool.loops.len(), 1);
        assert_eq!(pool.loops[0].run, Cost::from_rows(10));
    }

    #[test]
    fn ordering_candidate_survives_despite_higher_cost() {
        let mut pool = CandidatePool::new();
        insert(&mut pool, candidate(10, 10, 0));
        insert(&mut pool, candidate(50, 50, 7));
        assert_eq!(pool.loops.len(), 2);
    }
}
