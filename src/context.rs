//! Top-level orchestration (§2, §6): wires the FROM list and WHERE
//! predicate through the analyser, loop enumerator, solver, and plan
//! emitter into one [`WhereContext`].

use std::cell::Cell;

use crate::bitmask::{Bitmask, CursorBitmap, CursorId};
use crate::catalog::{Catalog, Collation, FromEntry, JoinType};
use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::expr::Expr;
use crate::flags::{TermOp, WhereFlags};
use crate::loop_enum::LoopEnumerator;
use crate::orderby::{MatchMode, ObStatus, SortKey};
use crate::plan::{LevelDescriptor, PlanEmitter};
use crate::solver::{Solver, WherePath};
use crate::term::analyser::find_term;
use crate::term::{Connective, StoreId, TermAnalyser, TermArena};
use tracing::instrument;

/// How (if at all) DISTINCT redundancy is eliminated without the caller
/// having to hash or sort the final result set (§3 `WhereContext`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctKind {
    /// No DISTINCT requested.
    Noop,
    /// The chosen plan already provably emits at most one row per distinct
    /// group (a single `OneRow` loop), so no dedup machinery is needed.
    Unique,
    /// Rows emerge grouped by the distinct key (it's a prefix of the
    /// satisfied order), so adjacent-row comparison suffices.
    Ordered,
    /// The distinct key isn't ordered by the chosen plan; the caller must
    /// still sort or hash to dedup.
    Unordered,
}

/// Per-statement workspace (§3). Owns every term synthesised while planning
/// and the chosen plan's level array; destroyed once the VM emitter has
/// consumed it.
pub struct WhereContext {
    pub cursors: CursorBitmap,
    pub arena: TermArena,
    pub top_store: StoreId,
    pub levels: Vec<LevelDescriptor>,
    pub row_estimate: f64,
    pub b_ob_sat: bool,
    pub reverse_mask: Bitmask,
    pub distinct_kind: DistinctKind,
    pub ok_one_pass: bool,
    oom: Cell<bool>,
}

impl WhereContext {
    /// §5/§7: the out-of-memory latch. Once set, every subsequent planning
    /// step on this context is expected to short-circuit with
    /// [`PlannerError::OutOfMemory`] rather than continue on partial state.
    pub fn latch_oom(&self) {
        self.oom.set(true);
    }

    pub fn is_oom(&self) -> bool {
        self.oom.get()
    }
}

/// Inputs to [`plan`] (§6). `order_by` doubles as the DISTINCT key list when
/// [`WhereFlags::DISTINCT_BY`] is set, per the flag table's "treats the
/// ORDER BY input as ... a DISTINCT key" wording.
///
/// `on_clauses`, when non-empty, must have one entry per `from_list`
/// position: `Some(expr)` for a LEFT/CROSS join's ON-clause predicate,
/// `None` for an INNER join (whose join condition the caller folds into
/// `where_clause` instead, since it constrains every row rather than just
/// the unmatched case).
pub struct PlanRequest<'a> {
    pub from_list: &'a [FromEntry],
    pub where_clause: Option<Expr>,
    pub on_clauses: &'a [Option<Expr>],
    pub order_by: &'a [SortKey],
    pub flags: WhereFlags,
}

/// The planner's single entry point. Folds the WHERE clause into a shared
/// term store, enumerates candidate loops per table, solves for the
/// cheapest join order consistent with ORDER BY, and emits the chosen path
/// as a level array.
#[instrument(skip_all, fields(n_tables = req.from_list.len()))]
pub fn plan(catalog: &dyn Catalog, config: &PlannerConfig, req: PlanRequest<'_>) -> Result<WhereContext> {
    let one_table_only = req.flags.contains(WhereFlags::ONE_TABLE_ONLY);
    let from_list: &[FromEntry] = if one_table_only && !req.from_list.is_empty() {
        &req.from_list[..1]
    } else {
        req.from_list
    };

    let oom = Cell::new(false);

    let mut cursors = CursorBitmap::with_capacity(config.dependency_word_bits);
    for entry in from_list {
        cursors.intern(entry.cursor)?;
    }

    let analyser = TermAnalyser::new(&cursors, config);
    let mut arena = TermArena::new();
    let top_store = arena.alloc(Connective::And, None);

    let and_only = req.flags.contains(WhereFlags::AND_ONLY);
    if let Some(predicate) = req.where_clause {
        analyser.classify_into(&mut arena, catalog, top_store, predicate, and_only, None);
    }
    // Each LEFT/CROSS join's ON clause is folded into the same `top_store`,
    // one `classify_into` call per entry with its own `on_right_table`
    // phantom dependency (§4.1), so `find_term` and the loop enumerator see
    // every term — WHERE or ON-derived — through a single `StoreId`.
    for (entry, on_clause) in from_list.iter().zip(req.on_clauses.iter()) {
        if let Some(predicate) = on_clause.clone() {
            analyser.classify_into(&mut arena, catalog, top_store, predicate, and_only, Some(entry.cursor));
        }
    }

    check_oom(&oom)?;

    let mut pools = Vec::with_capacity(from_list.len());
    let enumerator = LoopEnumerator::new(&cursors, catalog, config, from_list);
    for (i_tab, entry) in from_list.iter().enumerate() {
        let mextra = match entry.join_type {
            JoinType::Left | JoinType::Cross => entry.on_clause_mask | cursors.left_of(entry.cursor),
            JoinType::Inner => 0,
        };
        pools.push(enumerator.enumerate(&arena, top_store, i_tab, mextra)?);
    }

    let match_mode = if req.flags.intersects(WhereFlags::GROUP_BY | WhereFlags::DISTINCT_BY) {
        MatchMode::Unordered
    } else {
        MatchMode::StrictPrefix
    };

    let column_eq_check = |cursor: CursorId, column: i32, collation: &Collation, bound_mask: Bitmask| -> bool {
        find_term(
            &arena,
            top_store,
            cursor,
            column,
            TermOp::EQ | TermOp::ISNULL,
            Some(collation),
            config.transitive_hop_cap,
        )
        .is_some_and(|(s, t)| arena.get(s).get(t).prereq_all & !bound_mask == 0)
    };

    check_oom(&oom)?;

    let solver = Solver {
        cursors: &cursors,
        config,
        from_list,
        pools: &pools,
        order_by: req.order_by,
        match_mode,
    };
    let path: WherePath = solver.solve(column_eq_check)?;

    check_oom(&oom)?;

    let emitter = PlanEmitter {
        from_list,
        omit_open_close: req.flags.contains(WhereFlags::OMIT_OPEN_CLOSE),
    };
    let levels = emitter.emit(&mut arena, &path)?;

    let ok_one_pass = req.flags.contains(WhereFlags::ONEPASS_DESIRED)
        && path.loops.len() == 1
        && path.loops[0].is_one_row();
    let distinct_kind = compute_distinct_kind(req.flags, &path);

    Ok(WhereContext {
        cursors,
        arena,
        top_store,
        levels,
        row_estimate: path.row_est.as_rows_approx(),
        b_ob_sat: path.ob_status == ObStatus::Satisfied,
        reverse_mask: path.rev_mask,
        distinct_kind,
        ok_one_pass,
        oom,
    })
}

fn check_oom(oom: &Cell<bool>) -> Result<()> {
    if oom.get() {
        Err(PlannerError::OutOfMemory)
    } else {
        Ok(())
    }
}

fn compute_distinct_kind(flags: WhereFlags, path: &WherePath) -> DistinctKind {
    if !flags.contains(WhereFlags::WANT_DISTINCT) {
        return DistinctKind::Noop;
    }
    if path.loops.len() == 1 && path.loops[0].is_one_row() {
        return DistinctKind::Unique;
    }
    if path.ob_status == ObStatus::Satisfied {
        DistinctKind::Ordered
    } else {
        DistinctKind::Unordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Affinity, IndexColumn, IndexDescriptor, TableDescriptor};
    use crate::expr::BinaryOp;
    use std::rc::Rc;

    struct SingleTableCatalog {
        table: Rc<TableDescriptor>,
        pk: Rc<IndexDescriptor>,
    }

    impl Catalog for SingleTableCatalog {
        fn table(&self, _cursor: CursorId) -> Option<Rc<TableDescriptor>> {
            Some(self.table.clone())
        }
        fn primary_key(&self, _cursor: CursorId) -> Option<Rc<IndexDescriptor>> {
            Some(self.pk.clone())
        }
        fn indexes(&self, _cursor: CursorId) -> Vec<Rc<IndexDescriptor>> {
            vec![self.pk.clone()]
        }
    }

    #[test]
    fn equality_on_pk_single_table_is_one_row_with_no_sort() {
        let table = Rc::new(TableDescriptor {
            name: "t".into(),
            cursor: 0,
            row_count: 1000,
            column_affinities: vec![Affinity::Integer, Affinity::Integer],
            column_not_null: vec![true, false],
            is_virtual: false,
        });
        let pk = Rc::new(IndexDescriptor {
            name: "pk".into(),
            table: 0,
            columns: vec![IndexColumn {
                column: 0,
                affinity: Affinity::Integer,
                collation: Collation::BINARY,
                descending: false,
            }],
            unique: true,
            is_primary_key: true,
            is_rowid: false,
            row_est_buckets: vec![1000, 1],
            histogram: None,
        });
        let catalog = SingleTableCatalog { table: table.clone(), pk };
        let from_list = vec![FromEntry {
            cursor: 0,
            table,
            indexed_by: None,
            not_indexed: false,
            join_type: JoinType::Inner,
            virtual_table: None,
            on_clause_mask: 0,
        }];
        let predicate = Expr::Binary(
            Box::new(Expr::column(0, 0)),
            BinaryOp::Eq,
            Box::new(Expr::Literal(crate::expr::Literal::Integer(5))),
        );
        let config = PlannerConfig::default();
        let ctx = plan(
            &catalog,
            &config,
            PlanRequest {
                from_list: &from_list,
                where_clause: Some(predicate),
                on_clauses: &[],
                order_by: &[],
                flags: WhereFlags::empty(),
            },
        )
        .unwrap();
        assert_eq!(ctx.levels.len(), 1);
        assert!(ctx.b_ob_sat);
        assert!(ctx.levels[0].loop_.is_one_row());
        assert_eq!(ctx.row_estimate.round() as i64, 1);
    }
}
