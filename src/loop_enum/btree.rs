//! B-tree index matching: walk an index's columns left to right, binding the
//! longest usable equality prefix, then one optional range restriction on
//! the column immediately after it (§4.4.2).

use super::{CandidateLoop, LoopVariant, TermRef};
use crate::bitmask::{Bitmask, CursorBitmap};
use crate::catalog::IndexDescriptor;
use crate::config::PlannerConfig;
use crate::cost::Cost;
use crate::expr::Expr;
use crate::flags::{TermOp, WsFlags};
use crate::selectivity::SelectivityOracle;
use crate::term::analyser::find_term;
use crate::term::{StoreId, TermArena};
use std::rc::Rc;

/// Build the single best candidate this index offers for the current term
/// set (the reference planner tries every index and keeps the cheapest by
/// weak dominance rather than enumerating every prefix length of every
/// index, §4.4.2).
pub fn match_index(
    cursors: &CursorBitmap,
    config: &PlannerConfig,
    arena: &TermArena,
    store: StoreId,
    i_tab: usize,
    mask_self: Bitmask,
    mextra: Bitmask,
    index: Rc<IndexDescriptor>,
) -> Vec<CandidateLoop> {
    let _ = cursors;
    let table_cursor = index.table;
    let mut terms: Vec<TermRef> = Vec::new();
    let mut prereq = mextra;
    let mut n_eq = 0usize;
    let mut ws = WsFlags::INDEXED;
    let mut any_in_values: Option<Vec<Expr>> = None;
    let mut last_eq_value: Option<Expr> = None;
    let mut all_plain_eq = true;

    for col in index.columns.iter() {
        let Some((s, t)) = find_term(
            arena,
            store,
            table_cursor,
            col.column,
            TermOp::EQUALITY_LIKE,
            Some(&col.collation),
            config.transitive_hop_cap,
        ) else {
            break;
        };
        let term = arena.get(s).get(t);
        if term.is_coded() {
            break;
        }
        prereq |= term.prereq_right;
        terms.push((s, t));
        n_eq += 1;
        if term.op.contains(TermOp::IN) {
            any_in_values = in_list_values(&term.expr);
            all_plain_eq = false;
            ws.insert(WsFlags::COLUMN_IN);
            break; // an IN column can't be followed by another equality/range bind in this simple model.
        } else if term.op.contains(TermOp::ISNULL) {
            all_plain_eq = false;
            ws.insert(WsFlags::COLUMN_NULL);
        } else {
            last_eq_value = binary_rhs(&term.expr).cloned();
            ws.insert(WsFlags::COLUMN_EQ);
        }
    }

    let mut lo_term: Option<TermRef> = None;
    let mut hi_term: Option<TermRef> = None;
    if n_eq < index.columns.len() && any_in_values.is_none() {
        let col = &index.columns[n_eq];
        if let Some((s, t)) = find_term(
            arena,
            store,
            table_cursor,
            col.column,
            TermOp::GT | TermOp::GE,
            Some(&col.collation),
            config.transitive_hop_cap,
        ) {
            if !arena.get(s).get(t).is_coded() {
                lo_term = Some((s, t));
            }
        }
        if let Some((s, t)) = find_term(
            arena,
            store,
            table_cursor,
            col.column,
            TermOp::LT | TermOp::LE,
            Some(&col.collation),
            config.transitive_hop_cap,
        ) {
            if !arena.get(s).get(t).is_coded() {
                hi_term = Some((s, t));
            }
        }
    }

    if n_eq == 0 && lo_term.is_none() && hi_term.is_none() {
        return Vec::new();
    }

    let lo_expr = lo_term
        .map(|(s, t)| (*arena.get(s).get(t).expr).clone())
        .and_then(binary_rhs_owned);
    let hi_expr = hi_term
        .map(|(s, t)| (*arena.get(s).get(t).expr).clone())
        .and_then(binary_rhs_owned);
    if let Some(t) = lo_term {
        terms.push(t);
        prereq |= arena.get(t.0).get(t.1).prereq_right;
        ws.insert(WsFlags::BTM_LIMIT | WsFlags::COLUMN_RANGE);
    }
    if let Some(t) = hi_term {
        terms.push(t);
        prereq |= arena.get(t.0).get(t.1).prereq_right;
        ws.insert(WsFlags::TOP_LIMIT | WsFlags::COLUMN_RANGE);
    }

    let rows = if let Some(values) = &any_in_values {
        SelectivityOracle::in_scan_est(&index, n_eq.saturating_sub(1), values)
    } else if lo_expr.is_some() || hi_expr.is_some() {
        SelectivityOracle::range_scan_est(&index, n_eq, lo_expr.as_ref(), hi_expr.as_ref())
    } else if n_eq > 0 {
        match &last_eq_value {
            Some(v) => SelectivityOracle::equal_scan_est(&index, n_eq - 1, v),
            None => index.row_estimate_after(n_eq),
        }
    } else {
        index.row_estimate_after(0)
    };

    let is_one_row = index.unique
        && all_plain_eq
        && n_eq == index.columns.len()
        && lo_term.is_none()
        && hi_term.is_none();
    if is_one_row {
        ws.insert(WsFlags::ONE_ROW);
    }
    if index.is_primary_key {
        ws.insert(WsFlags::PRIMARY_KEY);
    }

    let run = Cost::from_rows(rows);
    let candidate = CandidateLoop {
        i_tab,
        mask_self,
        prereq,
        setup: Cost::ZERO,
        run,
        n_out: run,
        ws_flags: ws,
        n_eq: n_eq as u32,
        variant: LoopVariant::BTree { index },
        i_sort_idx: 1,
        terms,
    };
    vec![candidate]
}

fn in_list_values(expr: &Expr) -> Option<Vec<Expr>> {
    match expr {
        Expr::InList { list, .. } => Some(list.clone()),
        _ => None,
    }
}

fn binary_rhs(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::Binary(_, _, rhs) => Some(rhs),
        _ => None,
    }
}

fn binary_rhs_owned(expr: Expr) -> Option<Expr> {
    match expr {
        Expr::Binary(_, _, rhs) => Some(*rhs),
        Expr::Collate(inner, _) => binary_rhs_owned(*inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmask::CursorBitmap;
    use crate::catalog::{Affinity, Collation, IndexColumn};
    use crate::config::PlannerConfig;
    use crate::expr::{BinaryOp, Literal};
    use crate::term::TermAnalyser;
    use crate::catalog::{Catalog, TableDescriptor};

    struct NoCatalog;
    impl Catalog for NoCatalog {
        fn table(&self, _cursor: i32) -> Option<Rc<TableDescriptor>> {
            None
        }
        fn primary_key(&self, _cursor: i32) -> Option<Rc<IndexDescriptor>> {
            None
        }
        fn indexes(&self, _cursor: i32) -> Vec<Rc<IndexDescriptor>> {
            Vec::new()
        }
    }

    fn idx() -> Rc<IndexDescriptor> {
        Rc::new(IndexDescriptor {
            name: "ix".into(),
            table: 0,
            columns: vec![IndexColumn {
                column: 0,
                affinity: Affinity::Integer,
                collation: Collation::BINARY,
                descending: false,
            }],
            unique: true,
            is_primary_key: false,
            is_rowid: false,
            row_est_buckets: vec![1000, 1],
            histogram: None,
        })
    }

    #[test]
    fn equality_on_unique_index_is_one_row() {
        let mut cursors = CursorBitmap::new();
        cursors.intern(0).unwrap();
        let config = PlannerConfig::default();
        let mut arena = TermArena::new();
        let catalog = NoCatalog;
        let analyser = TermAnalyser::new(&cursors, &config);
        let predicate = Expr::Binary(
            Box::new(Expr::column(0, 0)),
            BinaryOp::Eq,
            Box::new(Expr::Literal(Literal::Integer(5))),
        );
        let store = analyser.normalize_and_classify(&mut arena, &catalog, predicate, false, None);
        let candidates = match_index(&cursors, &config, &arena, store, 0, 1, 0, idx());
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].ws_flags.contains(WsFlags::ONE_ROW));
    }
}
