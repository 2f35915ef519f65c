//! Best-N generational join-order search (§4.7).
//!
//! Each generation adds exactly one more FROM entry to every surviving
//! partial path. Width is capped per generation (1 / 5 / 10 loops, depending
//! on table count, §10.3's [`crate::config::GenerationWidth`]) rather than
//! exploring the full permutation space, trading a small chance of missing
//! the true optimum for bounded planning time on wide joins.

use crate::bitmask::{Bitmask, CursorBitmap};
use crate::catalog::{Collation, FromEntry};
use crate::config::PlannerConfig;
use crate::cost::Cost;
use crate::error::{PlannerError, Result};
use crate::loop_enum::{CandidateLoop, CandidatePool};
use crate::orderby::{MatchMode, ObStatus, OrderBySatisfier, SortKey};
use tracing::{debug, instrument};

/// One surviving partial (or, in the final generation, complete) join order.
#[derive(Debug, Clone)]
pub struct WherePath {
    pub mask_loop: Bitmask,
    pub loops: Vec<CandidateLoop>,
    pub cost: Cost,
    pub row_est: Cost,
    pub ob_status: ObStatus,
    pub rev_mask: Bitmask,
}

impl WherePath {
    fn seed(has_order_by: bool) -> WherePath {
        WherePath {
            mask_loop: 0,
            loops: Vec::new(),
            // A bare iteration of one synthetic output row (`log2(25)`... no:
            // the reference planner seeds at one row, not 25 — that constant
            // is specific to the vtab nOut placeholder). Zero cost, one row.
            cost: Cost::ZERO,
            row_est: Cost::ZERO,
            ob_status: if has_order_by {
                ObStatus::Unknown
            } else {
                ObStatus::Satisfied
            },
            rev_mask: 0,
        }
    }
}

pub struct Solver<'a> {
    pub cursors: &'a CursorBitmap,
    pub config: &'a PlannerConfig,
    pub from_list: &'a [FromEntry],
    pub pools: &'a [CandidatePool],
    pub order_by: &'a [SortKey],
    pub match_mode: MatchMode,
}

impl<'a> Solver<'a> {
    #[instrument(skip_all)]
    pub fn solve(&self, column_eq_check: impl Fn(crate::bitmask::CursorId, i32, &Collation, Bitmask) -> bool + Copy) -> Result<WherePath> {
        let n = self.from_list.len();
        let full_mask: Bitmask = if n == 0 { 0 } else { (1u64 << n) - 1 };
        let satisfier = OrderBySatisfier::new(self.cursors, self.config);

        let mut generation = vec![WherePath::seed(!self.order_by.is_empty())];

        for _level in 0..n {
            let width = self.config.generation_width.for_table_count(n) as usize;
            let mut next: Vec<WherePath> = Vec::new();

            for f in &generation {
                for pool in self.pools {
                    for w in &pool.loops {
                        if w.mask_self & f.mask_loop != 0 {
                            continue; // table already in this path
                        }
                        if w.prereq & !f.mask_loop != 0 {
                            continue; // prerequisite table not yet joined
                        }
                        let candidate = self.extend(f, w, &satisfier, column_eq_check);
                        insert_bounded(&mut next, candidate, width);
                    }
                }
            }

            if next.is_empty() {
                return Err(PlannerError::NoSolution);
            }
            generation = next;
            debug!(level = _level, frontier = generation.len(), "generation advanced");
        }

        let mut best = generation
            .into_iter()
            .filter(|p| p.mask_loop == full_mask)
            .min_by_key(|p| p.cost)
            .ok_or(PlannerError::NoSolution)?;

        if best.ob_status == ObStatus::Unknown {
            best.cost = best.cost.add(sort_surcharge(best.row_est));
            best.ob_status = ObStatus::Satisfied;
        }

        Ok(best)
    }

    fn extend(
        &self,
        f: &WherePath,
        w: &CandidateLoop,
        satisfier: &OrderBySatisfier<'_>,
        column_eq_check: impl Fn(crate::bitmask::CursorId, i32, &Collation, Bitmask) -> bool,
    ) -> WherePath {
        let per_row_work = Cost(w.run.0.saturating_add(f.row_est.0));
        let step_cost = w.setup.add(per_row_work);
        let cost = f.cost.add(step_cost);
        let row_est = Cost(f.row_est.0.saturating_add(w.n_out.0));

        let mut loops = f.loops.clone();
        loops.push(w.clone());
        let mask_loop = f.mask_loop | w.mask_self;

        let (mut ob_status, mut rev_mask) = (f.ob_status, f.rev_mask);
        if f.ob_status == ObStatus::Unknown {
            let (status, rev) = satisfier.evaluate(&loops, self.order_by, self.match_mode, &column_eq_check);
            match status {
                ObStatus::Satisfied => {
                    ob_status = ObStatus::Satisfied;
                    rev_mask = rev;
                }
                ObStatus::NotSatisfied => {
                    // §7: demote rather than discard — absorb as a one-time
                    // sort surcharge and treat the requirement as resolved.
                    ob_status = ObStatus::Satisfied;
                    return WherePath {
                        mask_loop,
                        cost: cost.add(sort_surcharge(row_est)),
                        row_est,
                        ob_status,
                        rev_mask: 0,
                        loops,
                    };
                }
                ObStatus::Unknown => {
                    ob_status = ObStatus::Unknown;
                }
            }
        }

        WherePath {
            mask_loop,
            cost,
            row_est,
            ob_status,
            rev_mask,
            loops,
        }
    }
}

/// `row_est + log2(row_est)` deci-bels: the one-time cost of sorting the
/// path's estimated output into the requested order.
fn sort_surcharge(row_est: Cost) -> Cost {
    let rows = row_est.as_rows_approx().max(1.0);
    let log_rows = rows.log2().max(0.0);
    Cost::from_rows((rows + log_rows) as u64)
}

/// Insert `candidate` into `next`, applying the generation's merge policy:
/// a path with an existing equal `(mask_loop, ob_status)` is replaced only
/// if strictly cheaper; otherwise the candidate is appended while there's
/// room, or displaces the current worst entry if it beats it.
fn insert_bounded(next: &mut Vec<WherePath>, candidate: WherePath, width: usize) {
    if let Some(existing) = next
        .iter()
        .position(|p| p.mask_loop == candidate.mask_loop && p.ob_status == candidate.ob_status)
    {
        if candidate.cost < next[existing].cost {
            next[existing] = candidate;
        }
        return;
    }
    if next.len() < width {
        next.push(candidate);
        return;
    }
    if let Some((worst_idx, worst_cost)) = next
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| p.cost)
        .map(|(i, p)| (i, p.cost))
    {
        if candidate.cost < worst_cost {
            next[worst_idx] = candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Affinity, IndexDescriptor, JoinType, TableDescriptor};
    use crate::flags::WsFlags;
    use crate::loop_enum::LoopVariant;
    use std::rc::Rc;

    fn table(cursor: i32, rows: u64) -> Rc<TableDescriptor> {
        Rc::new(TableDescriptor {
            name: format!("t{cursor}"),
            cursor,
            row_count: rows,
            column_affinities: vec![Affinity::Integer],
            column_not_null: vec![false],
            is_virtual: false,
        })
    }

    fn scan_loop(i_tab: usize, mask_self: Bitmask, rows: u64) -> CandidateLoop {
        CandidateLoop {
            i_tab,
            mask_self,
            prereq: 0,
            setup: Cost::ZERO,
            run: Cost::from_rows(rows),
            n_out: Cost::from_rows(rows),
            ws_flags: WsFlags::empty(),
            n_eq: 0,
            variant: LoopVariant::BTree {
                index: Rc::new(IndexDescriptor {
                    name: "rowid".into(),
                    table: mask_self.trailing_zeros() as i32,
                    columns: Vec::new(),
                    unique: true,
                    is_primary_key: true,
                    is_rowid: true,
                    row_est_buckets: vec![rows],
                    histogram: None,
                }),
            },
            i_sort_idx: 0,
            terms: Vec::new(),
        }
    }

    #[test]
    fn single_table_picks_the_only_candidate() {
        let mut cursors = CursorBitmap::new();
        cursors.intern(0).unwrap();
        let config = PlannerConfig::default();
        let from_list = vec![FromEntry {
            cursor: 0,
            table: table(0, 100),
            indexed_by: None,
            not_indexed: false,
            join_type: JoinType::Inner,
            virtual_table: None,
            on_clause_mask: 0,
        }];
        let pool = CandidatePool {
            loops: vec![scan_loop(0, 1, 100)],
        };
        let pools = vec![pool];
        let solver = Solver {
            cursors: &cursors,
            config: &config,
            from_list: &from_list,
            pools: &pools,
            order_by: &[],
            match_mode: MatchMode::StrictPrefix,
        };
        let path = solver.solve(|_, _, _, _| false).unwrap();
        assert_eq!(path.mask_loop, 1);
        assert_eq!(path.loops.len(), 1);
    }

    #[test]
    fn two_tables_prefers_driving_with_the_indexable_join() {
        // t0 is large but has an index usable once t1 is already joined;
        // t1 is small. Driving with t1 first lets t0 use the cheap indexed
        // probe; driving with t0 first forces its expensive full scan.
        let mut cursors = CursorBitmap::new();
        cursors.intern(0).unwrap();
        cursors.intern(1).unwrap();
        let config = PlannerConfig::default();
        let from_list = vec![
            FromEntry {
                cursor: 0,
                table: table(0, 1_000_000),
                indexed_by: None,
                not_indexed: false,
                join_type: JoinType::Inner,
                virtual_table: None,
                on_clause_mask: 0,
            },
            FromEntry {
                cursor: 1,
                table: table(1, 10),
                indexed_by: None,
                not_indexed: false,
                join_type: JoinType::Inner,
                virtual_table: None,
                on_clause_mask: 0,
            },
        ];
        let mut indexed_probe = scan_loop(0, 1, 2);
        indexed_probe.prereq = 0b10;
        let pools = vec![
            CandidatePool {
                loops: vec![scan_loop(0, 1, 1_000_000), indexed_probe],
            },
            CandidatePool {
                loops: vec![scan_loop(1, 2, 10)],
            },
        ];
        let solver = Solver {
            cursors: &cursors,
            config: &config,
            from_list: &from_list,
            pools: &pools,
            order_by: &[],
            match_mode: MatchMode::StrictPrefix,
        };
        let path = solver.solve(|_, _, _, _| false).unwrap();
        assert_eq!(path.mask_loop, 0b11);
        assert_eq!(path.loops.len(), 2);
        assert_eq!(path.loops[0].i_tab, 1, "t1 should drive so t0 can use its indexed probe");
    }

    #[test]
    fn unsatisfiable_prereq_reports_no_solution() {
        let mut cursors = CursorBitmap::new();
        cursors.intern(0).unwrap();
        let config = PlannerConfig::default();
        let from_list = vec![FromEntry {
            cursor: 0,
            table: table(0, 100),
            indexed_by: None,
            not_indexed: false,
            join_type: JoinType::Inner,
            virtual_table: None,
            on_clause_mask: 0,
        }];
        let mut loop_ = scan_loop(0, 1, 100);
        loop_.prereq = 0b10; // depends on a table never offered
        let pools = vec![CandidatePool { loops: vec![loop_] }];
        let solver = Solver {
            cursors: &cursors,
            config: &config,
            from_list: &from_list,
            pools: &pools,
            order_by: &[],
            match_mode: MatchMode::StrictPrefix,
        };
        assert!(solver.solve(|_, _, _, _| false).is_err());
    }
}
