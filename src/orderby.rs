//! Deciding whether a candidate join order already satisfies ORDER BY,
//! GROUP BY, or a DISTINCT key without a separate sort (§4.6).

use crate::bitmask::{Bitmask, CursorBitmap, CursorId};
use crate::catalog::Collation;
use crate::config::PlannerConfig;
use crate::loop_enum::{CandidateLoop, LoopVariant};
use tracing::trace;

/// One position of the requested ORDER BY / GROUP BY / DISTINCT key list,
/// already reduced to a plain column reference (§4.6 only reasons about
/// positions that take this shape; anything else can never be satisfied by
/// index ordering and is left for a final sort).
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub cursor: CursorId,
    pub column: i32,
    pub collation: Collation,
    pub descending: bool,
}

/// The outcome of one [`OrderBySatisfier::evaluate`] call (§3, "tri-valued
/// ORDER-BY status").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObStatus {
    Satisfied,
    NotSatisfied,
    Unknown,
}

/// Whether position matching is strict-prefix (`ORDER BY`) or unordered
/// (`GROUP BY`/`DISTINCT`, §4.6 final paragraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    StrictPrefix,
    Unordered,
}

pub struct OrderBySatisfier<'a> {
    pub cursors: &'a CursorBitmap,
    pub config: &'a PlannerConfig,
}

impl<'a> OrderBySatisfier<'a> {
    pub fn new(cursors: &'a CursorBitmap, config: &'a PlannerConfig) -> Self {
        Self { cursors, config }
    }

    /// Walk `loops` outer to inner against `keys`, returning the status and
    /// a reversal bitmask with one bit per level.
    pub fn evaluate(
        &self,
        loops: &[CandidateLoop],
        keys: &[SortKey],
        mode: MatchMode,
        column_eq_check: impl Fn(CursorId, i32, &Collation, Bitmask) -> bool,
    ) -> (ObStatus, Bitmask) {
        let _ = self.config;
        if keys.is_empty() {
            return (ObStatus::Satisfied, 0);
        }

        let mut satisfied = vec![false; keys.len()];
        let mut rev_mask: Bitmask = 0;
        let mut bound_mask: Bitmask = 0;
        let mut order_distinct = true;
        let mut distinct_prefix_mask: Bitmask = 0;
        let mut inconsistent = false;

        for (level, loop_) in loops.iter().enumerate() {
            let table_cursor = loop_table_cursor(loop_);

            // Step 1: a still-unsatisfied position on this table already
            // pinned to a single value by an outer-only equality/IS NULL.
            for (pos, key) in keys.iter().enumerate() {
                if satisfied[pos] || key.cursor != table_cursor {
                    continue;
                }
                if column_eq_check(key.cursor, key.column, &key.collation, bound_mask) {
                    satisfied[pos] = true;
                }
            }

            if loop_.is_one_row() {
                if let Some(pos) = next_unsatisfied_for_table(&satisfied, keys, table_cursor, mode, None) {
                    satisfied[pos] = true;
                }
                bound_mask |= loop_.mask_self;
                if order_distinct {
                    distinct_prefix_mask |= loop_.mask_self;
                }
                continue;
            }

            match &loop_.variant {
                LoopVariant::VirtualTable { is_ordered, .. } => {
                    if *is_ordered {
                        while let Some(pos) =
                            next_unsatisfied_for_table(&satisfied, keys, table_cursor, mode, None)
                        {
                            satisfied[pos] = true;
                        }
                    } else {
                        order_distinct = false;
                    }
                }
                LoopVariant::BTree { index } | LoopVariant::AutoIndex { index } => {
                    let mut col_pos = loop_.n_eq as usize;
                    loop {
                        let Some(col) = index.columns.get(col_pos) else {
                            break;
                        };
                        let Some(pos) = next_unsatisfied_for_table(
                            &satisfied,
                            keys,
                            table_cursor,
                            mode,
                            Some((col.column, &col.collation)),
                        ) else {
                            order_distinct = false;
                            break;
                        };
                        satisfied[pos] = true;
                        let bit = 1u64 << level;
                        let want_reverse = col.descending != keys[pos].descending;
                        let already_set = rev_mask & bit != 0;
                        if already_set != want_reverse && col_pos > loop_.n_eq as usize {
                            inconsistent = true;
                        }
                        if want_reverse {
                            rev_mask |= bit;
                        }
                        col_pos += 1;
                    }
                }
                LoopVariant::OrUnion { .. } => {
                    order_distinct = false;
                }
            }

            bound_mask |= loop_.mask_self;
            if order_distinct {
                distinct_prefix_mask |= loop_.mask_self;
            }

            // Step 4: positions whose whole dependency set already lies in
            // an order-distinct outer prefix are constant per group.
            if order_distinct {
                for (pos, key) in keys.iter().enumerate() {
                    if !satisfied[pos] && self.cursors.mask_of(key.cursor) & !distinct_prefix_mask == 0 {
                        satisfied[pos] = true;
                    }
                }
            }

            if inconsistent {
                break;
            }
        }

        if inconsistent {
            trace!("order-by reversal direction inconsistent across levels");
            return (ObStatus::NotSatisfied, rev_mask);
        }
        if satisfied.iter().all(|&s| s) {
            (ObStatus::Satisfied, rev_mask)
        } else {
            (ObStatus::Unknown, rev_mask)
        }
    }
}

fn loop_table_cursor(loop_: &CandidateLoop) -> CursorId {
    match &loop_.variant {
        LoopVariant::BTree { index } | LoopVariant::AutoIndex { index } => index.table,
        LoopVariant::VirtualTable { .. } | LoopVariant::OrUnion { .. } => {
            // Both variants' sole table is recoverable from mask_self having
            // exactly one bit set; callers construct exactly one candidate
            // per table, so this always holds for level-ordered loops.
            loop_.mask_self.trailing_zeros() as CursorId
        }
    }
}

fn next_unsatisfied_for_table(
    satisfied: &[bool],
    keys: &[SortKey],
    table_cursor: CursorId,
    mode: MatchMode,
    column: Option<(i32, &Collation)>,
) -> Option<usize> {
    match mode {
        MatchMode::StrictPrefix => {
            let pos = satisfied.iter().position(|&s| !s)?;
            let key = &keys[pos];
            if key.cursor != table_cursor {
                return None;
            }
            if let Some((col, collation)) = column {
                if key.column != col || &key.collation != collation {
                    return None;
                }
            }
            Some(pos)
        }
        MatchMode::Unordered => keys.iter().enumerate().position(|(i, key)| {
            if satisfied[i] || key.cursor != table_cursor {
                return false;
            }
            match column {
                Some((col, collation)) => key.column == col && &key.collation == collation,
                None => true,
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::IndexColumn;
    use crate::catalog::IndexDescriptor;
    use crate::cost::Cost;
    use crate::flags::WsFlags;
    use std::rc::Rc;

    fn loop_with_index(i_tab: usize, mask_self: Bitmask, columns: Vec<IndexColumn>, n_eq: u32) -> CandidateLoop {
        CandidateLoop {
            i_tab,
            mask_self,
            prereq: 0,
            setup: Cost::ZERO,
            run: Cost::from_rows(100),
            n_out: Cost::from_rows(100),
            ws_flags: WsFlags::empty(),
            n_eq,
            variant: LoopVariant::BTree {
                index: Rc::new(IndexDescriptor {
                    name: "i".into(),
                    table: mask_self.trailing_zeros() as CursorId,
                    columns,
                    unique: false,
                    is_primary_key: false,
                    is_rowid: false,
                    row_est_buckets: vec![100, 10],
                    histogram: None,
                }),
            },
            i_sort_idx: 1,
            terms: Vec::new(),
        }
    }

    #[test]
    fn single_index_column_satisfies_matching_order_by() {
        let cursors = CursorBitmap::new();
        let config = PlannerConfig::default();
        let sat = OrderBySatisfier::new(&cursors, &config);
        let col = IndexColumn {
            column: 1,
            affinity: crate::catalog::Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        };
        let loops = vec![loop_with_index(0, 1, vec![col], 0)];
        let keys = vec![SortKey {
            cursor: 0,
            column: 1,
            collation: Collation::BINARY,
            descending: false,
        }];
        let (status, rev) = sat.evaluate(&loops, &keys, MatchMode::StrictPrefix, |_, _, _, _| false);
        assert_eq!(status, ObStatus::Satisfied);
        assert_eq!(rev, 0);
    }

    #[test]
    fn mismatched_column_leaves_order_by_unknown() {
        let cursors = CursorBitmap::new();
        let config = PlannerConfig::default();
        let sat = OrderBySatisfier::new(&cursors, &config);
        let col = IndexColumn {
            column: 2,
            affinity: crate::catalog::Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        };
        let loops = vec![loop_with_index(0, 1, vec![col], 0)];
        let keys = vec![SortKey {
            cursor: 0,
            column: 1,
            collation: Collation::BINARY,
            descending: false,
        }];
        let (status, _) = sat.evaluate(&loops, &keys, MatchMode::StrictPrefix, |_, _, _, _| false);
        assert_eq!(status, ObStatus::Unknown);
    }

    #[test]
    fn no_order_by_is_trivially_satisfied() {
        let cursors = CursorBitmap::new();
        let config = PlannerConfig::default();
        let sat = OrderBySatisfier::new(&cursors, &config);
        let (status, rev) = sat.evaluate(&[], &[], MatchMode::StrictPrefix, |_, _, _, _| false);
        assert_eq!(status, ObStatus::Satisfied);
        assert_eq!(rev, 0);
    }
}
