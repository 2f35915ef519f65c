//! Term classification and virtual-term synthesis (§4.3).

use super::{AndInfo, Connective, OrInfo, StoreId, TermArena, TermId, TermStore};
use crate::bitmask::{Bitmask, CursorBitmap, CursorId};
use crate::catalog::{Affinity, Catalog, Collation};
use crate::config::PlannerConfig;
use crate::expr::{BinaryOp, Expr, Literal};
use crate::flags::{TermFlag, TermOp};
use crate::term::Term;
use std::rc::Rc;
use tracing::trace;

/// Drives normalisation and classification of one statement's WHERE (or ON)
/// clause into a [`TermArena`].
pub struct TermAnalyser<'a> {
    pub cursors: &'a CursorBitmap,
    pub config: &'a PlannerConfig,
}

impl<'a> TermAnalyser<'a> {
    pub fn new(cursors: &'a CursorBitmap, config: &'a PlannerConfig) -> Self {
        Self { cursors, config }
    }

    /// Split `predicate` at its root connective into a fresh top-level
    /// store, then classify every resulting term (§4.3.1). `on_right_table`
    /// is `Some(cursor)` when this predicate is a LEFT JOIN's ON-clause, in
    /// which case every term derived from it picks up the phantom
    /// dependency `mask_of(cursor) - 1` (§4.1).
    pub fn normalize_and_classify(
        &self,
        arena: &mut TermArena,
        catalog: &dyn Catalog,
        predicate: Expr,
        and_only: bool,
        on_right_table: Option<CursorId>,
    ) -> StoreId {
        let store_id = arena.alloc(Connective::And, None);
        self.classify_into(arena, catalog, store_id, predicate, and_only, on_right_table);
        store_id
    }

    /// As [`Self::normalize_and_classify`], but appends into an already
    /// existing store rather than allocating a fresh one. Used by
    /// [`crate::context::plan`] to fold a statement's WHERE clause and each
    /// LEFT JOIN's ON clause into one shared top-level store — each call
    /// supplies its own `on_right_table` phantom dependency, but `find_term`
    /// (§4.3.4) and the loop enumerator then see every term, from either
    /// origin, through a single [`StoreId`].
    pub fn classify_into(
        &self,
        arena: &mut TermArena,
        catalog: &dyn Catalog,
        store_id: StoreId,
        predicate: Expr,
        and_only: bool,
        on_right_table: Option<CursorId>,
    ) {
        let mut queue = Vec::new();
        split_connective(predicate, Connective::And, and_only, &mut |e| {
            let term = Term::new(Rc::new(e));
            let tid = arena.get_mut(store_id).push(term);
            queue.push((store_id, tid));
        });

        let phantom = on_right_table
            .map(|c| self.cursors.left_of(c))
            .unwrap_or(0);

        // Explicit work queue rather than recursion (§9): newly synthesised
        // virtual terms push their own (store, id) onto the back.
        while let Some((sid, tid)) = queue.pop() {
            self.classify_one(arena, catalog, sid, tid, and_only, phantom, &mut queue);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn classify_one(
        &self,
        arena: &mut TermArena,
        catalog: &dyn Catalog,
        sid: StoreId,
        tid: TermId,
        and_only: bool,
        phantom: Bitmask,
        queue: &mut Vec<(StoreId, TermId)>,
    ) {
        let expr = arena.get(sid).get(tid).expr.clone();

        // Step 1: dependency masks.
        let prereq_all = expr.dependency_mask(self.cursors) | phantom;
        let prereq_right = rhs_dependency_mask(&expr, self.cursors) | phantom;
        {
            let term = arena.get_mut(sid).get_mut(tid);
            term.prereq_all = prereq_all;
            term.prereq_right = prereq_right;
        }

        match &*expr {
            Expr::Binary(lhs, op, rhs) => {
                self.classify_comparison(arena, sid, tid, lhs, *op, rhs, queue);
            }
            Expr::IsNull(inner) => {
                if let Some((cursor, column)) = inner.as_column() {
                    let term = arena.get_mut(sid).get_mut(tid);
                    term.op = TermOp::ISNULL;
                    term.left_cursor = Some(cursor);
                    term.left_column = Some(column);
                }
            }
            Expr::NotNull(inner) => {
                self.rewrite_not_null(arena, catalog, sid, tid, inner, queue);
            }
            Expr::Between {
                lhs,
                lo,
                hi,
                negated,
            } => {
                if !*negated {
                    self.rewrite_between(arena, sid, tid, lhs, lo, hi, queue);
                }
            }
            Expr::Like {
                lhs,
                pattern,
                escape,
                case_insensitive,
                negated,
            } => {
                if !*negated {
                    self.rewrite_like(
                        arena,
                        catalog,
                        sid,
                        tid,
                        lhs,
                        pattern,
                        escape.as_deref(),
                        *case_insensitive,
                        queue,
                    );
                }
            }
            Expr::InList {
                lhs,
                list,
                negated,
            } => {
                if !*negated {
                    if let Some((cursor, column)) = lhs.as_column() {
                        let term = arena.get_mut(sid).get_mut(tid);
                        term.op = TermOp::IN;
                        term.left_cursor = Some(cursor);
                        term.left_column = Some(column);
                    }
                    let _ = list;
                }
            }
            Expr::Match { lhs, .. } => {
                if let Some((cursor, column)) = lhs.as_column() {
                    let term = arena.get_mut(sid).get_mut(tid);
                    term.op = TermOp::MATCH;
                    term.left_cursor = Some(cursor);
                    term.left_column = Some(column);
                }
            }
            Expr::Or(_, _) if !and_only => {
                self.specialise_or_term(arena, catalog, sid, tid, queue);
            }
            Expr::Or(_, _) => {
                // AndOnly: leave as an unclassified residual filter.
            }
            _ => {}
        }
    }

    fn classify_comparison(
        &self,
        arena: &mut TermArena,
        sid: StoreId,
        tid: TermId,
        lhs: &Expr,
        op: BinaryOp,
        rhs: &Expr,
        queue: &mut Vec<(StoreId, TermId)>,
    ) {
        let term_op = match op {
            BinaryOp::Eq => TermOp::EQ,
            BinaryOp::Lt => TermOp::LT,
            BinaryOp::Le => TermOp::LE,
            BinaryOp::Gt => TermOp::GT,
            BinaryOp::Ge => TermOp::GE,
            BinaryOp::Ne | BinaryOp::Opaque => return,
        };

        let lhs_col = lhs.as_column();
        let rhs_col = rhs.as_column();

        if let Some((cursor, column)) = lhs_col {
            let term = arena.get_mut(sid).get_mut(tid);
            term.op = term_op;
            term.left_cursor = Some(cursor);
            term.left_column = Some(column);
            term.collation = lhs.explicit_collation().or(rhs.explicit_collation()).cloned();
        }

        // Both sides are columns: synthesise a commuted virtual twin so the
        // opposite table can also use this term as a seek key (§4.3.2 step
        // 2), and mark both EQUIV when the operator is `=`. A term that is
        // itself already such a twin is skipped here, or this would recreate
        // the original shape as a fresh twin forever.
        let already_a_twin = arena.get(sid).get(tid).is_virtual();
        if let (Some((lc, lcol)), Some((rc, rcol))) = (lhs_col, rhs_col) {
            if lc != rc && !already_a_twin {
                let commuted_op = match op {
                    BinaryOp::Eq => BinaryOp::Eq,
                    BinaryOp::Lt => BinaryOp::Gt,
                    BinaryOp::Le => BinaryOp::Ge,
                    BinaryOp::Gt => BinaryOp::Lt,
                    BinaryOp::Ge => BinaryOp::Le,
                    BinaryOp::Ne | BinaryOp::Opaque => unreachable!(),
                };
                let commuted_term_op = match commuted_op {
                    BinaryOp::Eq => TermOp::EQ,
                    BinaryOp::Lt => TermOp::LT,
                    BinaryOp::Le => TermOp::LE,
                    BinaryOp::Gt => TermOp::GT,
                    BinaryOp::Ge => TermOp::GE,
                    BinaryOp::Ne | BinaryOp::Opaque => unreachable!(),
                };
                let twin_expr = Expr::Binary(
                    Box::new(Expr::column(rc, rcol)),
                    commuted_op,
                    Box::new(Expr::column(lc, lcol)),
                );
                let mut twin = Term::new(Rc::new(twin_expr));
                twin.op = commuted_term_op;
                twin.left_cursor = Some(rc);
                twin.left_column = Some(rcol);
                twin.flags.insert(TermFlag::VIRTUAL | TermFlag::DYNAMIC);
                twin.parent = Some(tid);
                // The twin's RHS is the original LHS column, so its
                // prereq_right is just that one table's bit; prereq_all is
                // unchanged (same two tables either way).
                twin.prereq_right = self.cursors.mask_of(lc);

                let store = arena.get_mut(sid);
                let twin_prereq_all = store.get(tid).prereq_all;
                twin.prereq_all = twin_prereq_all;
                if matches!(commuted_op, BinaryOp::Eq) {
                    twin.op.insert(TermOp::EQUIV);
                }
                let twin_id = store.push(twin);

                let orig = store.get_mut(tid);
                orig.flags.insert(TermFlag::COPIED);
                if matches!(op, BinaryOp::Eq) {
                    orig.op.insert(TermOp::EQUIV);
                }
                queue.push((sid, twin_id));
            }
        }
    }

    fn rewrite_not_null(
        &self,
        arena: &mut TermArena,
        catalog: &dyn Catalog,
        sid: StoreId,
        tid: TermId,
        inner: &Expr,
        queue: &mut Vec<(StoreId, TermId)>,
    ) {
        let Some((cursor, column)) = inner.as_column() else {
            return;
        };
        if column < 0 {
            return; // rowid column: never rewritten (§4.3.2 step 6).
        }
        let has_histogram = catalog
            .table(cursor)
            .map(|_| {
                catalog
                    .indexes(cursor)
                    .iter()
                    .any(|ix| ix.columns.first().map(|c| c.column) == Some(column) && ix.histogram.is_some())
            })
            .unwrap_or(false);
        if !has_histogram {
            return;
        }
        let vexpr = Expr::Binary(
            Box::new(Expr::column(cursor, column)),
            BinaryOp::Gt,
            Box::new(Expr::Literal(Literal::Null)),
        );
        let mut v = Term::new(Rc::new(vexpr));
        v.op = TermOp::GT;
        v.left_cursor = Some(cursor);
        v.left_column = Some(column);
        v.flags
            .insert(TermFlag::VIRTUAL | TermFlag::DYNAMIC | TermFlag::V_NULL);
        v.parent = Some(tid);
        let store = arena.get_mut(sid);
        let prereq_all = store.get(tid).prereq_all;
        let vid = store.push(v);
        store.get_mut(vid).prereq_all = prereq_all;
        let orig = store.get_mut(tid);
        orig.child_count += 1;
        orig.supersedes_original = true;
        queue.push((sid, vid));
    }

    fn rewrite_between(
        &self,
        arena: &mut TermArena,
        sid: StoreId,
        tid: TermId,
        lhs: &Expr,
        lo: &Expr,
        hi: &Expr,
        queue: &mut Vec<(StoreId, TermId)>,
    ) {
        let lo_expr = Expr::Binary(Box::new(lhs.clone()), BinaryOp::Ge, Box::new(lo.clone()));
        let hi_expr = Expr::Binary(Box::new(lhs.clone()), BinaryOp::Le, Box::new(hi.clone()));
        for (e, op) in [(lo_expr, TermOp::GE), (hi_expr, TermOp::LE)] {
            let mut v = Term::new(Rc::new(e));
            v.flags.insert(TermFlag::VIRTUAL | TermFlag::DYNAMIC);
            v.parent = Some(tid);
            if let Some((cursor, column)) = lhs.as_column() {
                v.op = op;
                v.left_cursor = Some(cursor);
                v.left_column = Some(column);
            }
            let store = arena.get_mut(sid);
            let prereq_all = store.get(tid).prereq_all;
            let vid = store.push(v);
            store.get_mut(vid).prereq_all = prereq_all;
            store.get_mut(tid).child_count += 1;
            queue.push((sid, vid));
        }
        arena.get_mut(sid).get_mut(tid).supersedes_original = true;
        trace!(term = tid, "BETWEEN rewritten into two range virtual terms");
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_like(
        &self,
        arena: &mut TermArena,
        catalog: &dyn Catalog,
        sid: StoreId,
        tid: TermId,
        lhs: &Expr,
        pattern: &Expr,
        _escape: Option<&Expr>,
        case_insensitive: bool,
        queue: &mut Vec<(StoreId, TermId)>,
    ) {
        let Some((cursor, column)) = lhs.as_column() else {
            return;
        };
        if column < 0 {
            return;
        }
        let affinity = catalog
            .table(cursor)
            .and_then(|t| t.column_affinities.get(column as usize).copied())
            .unwrap_or(Affinity::None);
        if affinity != Affinity::Text {
            return; // "indexed column with TEXT affinity" (§4.3.2 step 4).
        }
        let literal = match pattern {
            Expr::Literal(Literal::Text(s)) => s.as_str(),
            _ => return, // only literal/bound-parameter prefixes are handled; bound values resolved by the caller before planning.
        };

        let Some((prefix, is_complete)) = like_prefix(literal) else {
            return; // pattern reduces to a single wildcard: keep unconsumed.
        };
        if prefix.is_empty() {
            return;
        }

        // Preserve the single-byte `+1` increment verbatim, including its
        // veto on a 0xFF last byte (§9, open question: "the precise
        // boundary for multi-byte encodings is unspecified").
        let mut upper = prefix.clone().into_bytes();
        let last = *upper.last().unwrap();
        if last == 0xFF {
            return;
        }
        let mut complete = is_complete;
        let incremented = if case_insensitive {
            if last == b'A' - 1 {
                complete = false; // EV: avoid pushing '@' into the alphabetic range.
            }
            ascii_lower(last)
        } else {
            last
        };
        *upper.last_mut().unwrap() = incremented.wrapping_add(1);
        let upper_str = String::from_utf8_lossy(&upper).into_owned();

        let collation = if case_insensitive {
            Collation::named("NOCASE")
        } else {
            Collation::BINARY
        };

        let ge_expr = Expr::Binary(
            Box::new(Expr::Collate(Box::new(lhs.clone()), collation.clone())),
            BinaryOp::Ge,
            Box::new(Expr::Literal(Literal::Text(prefix.clone()))),
        );
        let lt_expr = Expr::Binary(
            Box::new(Expr::Collate(Box::new(lhs.clone()), collation.clone())),
            BinaryOp::Lt,
            Box::new(Expr::Literal(Literal::Text(upper_str))),
        );

        let mut child_ids = Vec::new();
        for (e, op) in [(ge_expr, TermOp::GE), (lt_expr, TermOp::LT)] {
            let mut v = Term::new(Rc::new(e));
            v.op = op;
            v.left_cursor = Some(cursor);
            v.left_column = Some(column);
            v.collation = Some(collation.clone());
            v.flags.insert(TermFlag::VIRTUAL | TermFlag::DYNAMIC);
            v.parent = Some(tid);
            let store = arena.get_mut(sid);
            let prereq_all = store.get(tid).prereq_all;
            let vid = store.push(v);
            store.get_mut(vid).prereq_all = prereq_all;
            child_ids.push(vid);
            queue.push((sid, vid));
        }
        // The original LIKE term is always kept as a residual post-filter
        // (never folded to zero children) so that rows matching the range
        // but not the full pattern (e.g. embedded wildcards) are still
        // rejected; only its child-count bookkeeping advances.
        arena.get_mut(sid).get_mut(tid).child_count += child_ids.len() as u32;
        trace!(term = tid, complete, "LIKE prefix rewritten into range virtual terms");
    }

    /// §4.3.3: classify a term whose operator is OR.
    fn specialise_or_term(
        &self,
        arena: &mut TermArena,
        catalog: &dyn Catalog,
        sid: StoreId,
        tid: TermId,
        queue: &mut Vec<(StoreId, TermId)>,
    ) {
        let expr = arena.get(sid).get(tid).expr.clone();
        let mut disjuncts = Vec::new();
        split_connective((*expr).clone(), Connective::Or, false, &mut |e| {
            disjuncts.push(e)
        });
        if disjuncts.len() < 2 {
            return;
        }

        let sub_store = arena.alloc(Connective::Or, Some(sid));
        let mut sub_ids = Vec::new();
        for d in disjuncts {
            let term = Term::new(Rc::new(d));
            let sub_tid = arena.get_mut(sub_store).push(term);
            sub_ids.push(sub_tid);
        }
        // Recursively analyse every sub-term (depth is bounded by predicate
        // nesting, not join width; the work queue still applies within the
        // sub-store).
        let mut sub_queue: Vec<(StoreId, TermId)> =
            sub_ids.iter().map(|&id| (sub_store, id)).collect();
        while let Some((s, t)) = sub_queue.pop() {
            let phantom = 0; // OR sub-terms never originate from an ON clause.
            self.classify_one(arena, catalog, s, t, false, phantom, &mut sub_queue);
        }

        // Case 1: OR -> IN rewrite, when every sub-term is `T.C = Expr_i`
        // for the same table and column.
        if let Some((cursor, column, values)) = uniform_equality_rewrite(arena, sub_store) {
            let list_expr = Expr::InList {
                lhs: Box::new(Expr::column(cursor, column)),
                list: values,
                negated: false,
            };
            let mut v = Term::new(Rc::new(list_expr));
            v.op = TermOp::IN;
            v.left_cursor = Some(cursor);
            v.left_column = Some(column);
            v.flags.insert(TermFlag::VIRTUAL | TermFlag::DYNAMIC);
            v.parent = Some(tid);
            let store = arena.get_mut(sid);
            let prereq_all = store.get(tid).prereq_all;
            let vid = store.push(v);
            store.get_mut(vid).prereq_all = prereq_all;
            store.get_mut(tid).child_count += 1;
            // Demote the original OR term to NOOP: it is superseded.
            let orig = store.get_mut(tid);
            orig.op = TermOp::NOOP;
            queue.push((sid, vid));
            trace!(term = tid, "OR of equalities rewritten to IN");
            return;
        }

        // Case 2: indexed OR-union. Compute the indexable mask: for each
        // sub-term, the set of tables for which it has an indexable
        // conjunct (a plain `Column <op> Expr`, or an AND-group at least
        // one of whose conjuncts is indexable); intersect across sub-terms.
        let mut indexable_mask: Option<Bitmask> = None;
        for &sub_tid in &sub_ids {
            let m = self.sub_term_indexable_mask(arena, sub_store, sub_tid);
            indexable_mask = Some(match indexable_mask {
                Some(acc) => acc & m,
                None => m,
            });
        }
        let mask = indexable_mask.unwrap_or(0);
        let term = arena.get_mut(sid).get_mut(tid);
        term.op = TermOp::OR;
        term.flags.insert(TermFlag::OR_INFO);
        term.or_info = Some(OrInfo {
            sub_store,
            indexable_mask: mask,
        });
    }

    /// The set of tables for which `sub_tid` (one disjunct of an OR term)
    /// has an indexable conjunct: itself, if it is a plain comparison; or,
    /// if it is an AND-group, the union of tables any one conjunct of that
    /// group indexes (§4.3.3 step 2).
    fn sub_term_indexable_mask(&self, arena: &TermArena, sub_store: StoreId, sub_tid: TermId) -> Bitmask {
        let term = arena.get(sub_store).get(sub_tid);
        if term.op.intersects(TermOp::INDEXABLE) {
            if let Some(cursor) = term.left_cursor {
                return self.cursors.mask_of(cursor);
            }
        }
        if let Some(and_info) = &term.and_info {
            let inner = arena.get(and_info.sub_store);
            let mut m = 0u64;
            for (_, t) in inner.iter() {
                if t.op.intersects(TermOp::INDEXABLE) {
                    if let Some(c) = t.left_cursor {
                        m |= self.cursors.mask_of(c);
                    }
                }
            }
            return m;
        }
        0
    }
}

/// Split `expr` at every occurrence of `connective` into `out`, the same
/// way the reference planner's `whereSplit` walks an AND (or OR) tree.
/// When `and_only` is set, an `OR` node is treated as an opaque leaf rather
/// than recursed into (the caller's `AndOnly` flag, §6).
fn split_connective(expr: Expr, connective: Connective, and_only: bool, out: &mut impl FnMut(Expr)) {
    match (connective, expr) {
        (Connective::And, Expr::And(l, r)) => {
            split_connective(*l, connective, and_only, out);
            split_connective(*r, connective, and_only, out);
        }
        (Connective::Or, Expr::Or(l, r)) if !and_only => {
            split_connective(*l, connective, and_only, out);
            split_connective(*r, connective, and_only, out);
        }
        (_, e) => out(e),
    }
}

/// RHS-only dependency mask (§4.3.2 step 1): for most operators this is the
/// dependency mask of the whole right operand; for `IN` it is the mask of
/// the value list (or subquery outer refs).
fn rhs_dependency_mask(expr: &Expr, cursors: &CursorBitmap) -> Bitmask {
    match expr {
        Expr::Binary(_, _, rhs) => rhs.dependency_mask(cursors),
        Expr::InList { list, .. } => list
            .iter()
            .fold(0u64, |m, e| m | e.dependency_mask(cursors)),
        Expr::InSubquery { outer_refs, .. } => *outer_refs,
        Expr::Between { lo, hi, .. } => lo.dependency_mask(cursors) | hi.dependency_mask(cursors),
        Expr::Like { pattern, .. } => pattern.dependency_mask(cursors),
        Expr::Match { rhs, .. } => rhs.dependency_mask(cursors),
        _ => 0,
    }
}

/// §9: lowercase an ASCII byte the same way the reference planner's
/// `sqlite4UpperToLower` table does, for the NOCASE LIKE-prefix increment.
fn ascii_lower(b: u8) -> u8 {
    if b.is_ascii_uppercase() {
        b + 32
    } else {
        b
    }
}

/// Returns `(prefix, is_complete)` for a LIKE pattern whose only wildcard is
/// a trailing `%`, or `None` when the pattern has no usable non-wildcard
/// prefix (including the single-wildcard-character case, §4.3.2 step 4).
fn like_prefix(pattern: &str) -> Option<(String, bool)> {
    let bytes = pattern.as_bytes();
    let mut cnt = 0;
    while cnt < bytes.len() && bytes[cnt] != b'%' && bytes[cnt] != b'_' {
        cnt += 1;
    }
    if cnt == 0 {
        return None;
    }
    let is_complete = cnt < bytes.len() && bytes[cnt] == b'%' && cnt + 1 == bytes.len();
    Some((pattern[..cnt].to_string(), is_complete))
}

/// §4.3.3 Case 1: every sub-term of `sub_store` must be `T.C = Expr_i` for
/// the same table and column. Returns the common `(cursor, column)` and the
/// collected RHS expressions when so.
fn uniform_equality_rewrite(
    arena: &TermArena,
    sub_store: StoreId,
) -> Option<(CursorId, i32, Vec<Expr>)> {
    let store = arena.get(sub_store);
    if store.len() < 2 {
        return None;
    }
    let mut common: Option<(CursorId, i32)> = None;
    let mut values = Vec::new();
    for (_, term) in store.iter() {
        if term.op != TermOp::EQ {
            return None;
        }
        let (cursor, column) = (term.left_cursor?, term.left_column?);
        match common {
            None => common = Some((cursor, column)),
            Some((c, col)) if c == cursor && col == column => {}
            _ => return None,
        }
        let Expr::Binary(_, _, rhs) = &*term.expr else {
            return None;
        };
        values.push((**rhs).clone());
    }
    common.map(|(c, col)| (c, col, values))
}

/// §4.3.4: iterator-style scan for a term `X <op> Expr` reachable from
/// `(cursor, column)` via a chain of `Equiv` equalities, bounded to
/// [`crate::config::PlannerConfig::transitive_hop_cap`] hops. Returns the
/// first preferred match: terms with a constant RHS (`prereq_right == 0`)
/// before other equalities, per §4.3.4.
pub fn find_term(
    arena: &TermArena,
    store: StoreId,
    cursor: CursorId,
    column: i32,
    allowed: TermOp,
    required_collation: Option<&Collation>,
    hop_cap: u32,
) -> Option<(StoreId, TermId)> {
    find_term_inner(arena, store, cursor, column, allowed, required_collation, hop_cap, 0)
}

#[allow(clippy::too_many_arguments)]
fn find_term_inner(
    arena: &TermArena,
    store: StoreId,
    cursor: CursorId,
    column: i32,
    allowed: TermOp,
    required_collation: Option<&Collation>,
    hop_cap: u32,
    hops: u32,
) -> Option<(StoreId, TermId)> {
    if hops > hop_cap {
        return None;
    }
    let mut best_equality: Option<(StoreId, TermId)> = None;
    let mut best_other: Option<(StoreId, TermId)> = None;
    let mut equiv_targets: Vec<(CursorId, i32)> = Vec::new();

    let mut sid = Some(store);
    while let Some(s) = sid {
        let ts: &TermStore = arena.get(s);
        for (tid, term) in ts.iter() {
            if term.is_coded() {
                continue;
            }
            if term.left_cursor != Some(cursor) || term.left_column != Some(column) {
                continue;
            }
            if let Some(req) = required_collation {
                if term.collation.as_ref().is_some_and(|c| c != req) {
                    continue;
                }
            }
            if term.op.contains(TermOp::EQUIV) && term.op.contains(TermOp::EQ) {
                if let Expr::Binary(_, _, rhs) = &*term.expr {
                    if let Some((rc, rcol)) = rhs.as_column() {
                        equiv_targets.push((rc, rcol));
                    }
                }
            }
            if !term.op.intersects(allowed) {
                continue;
            }
            if term.prereq_right == 0 {
                if best_equality.is_none() {
                    best_equality = Some((s, tid));
                }
            } else if best_other.is_none() {
                best_other = Some((s, tid));
            }
        }
        sid = ts.outer;
    }

    if let Some(found) = best_equality.or(best_other) {
        return Some(found);
    }

    for (rc, rcol) in equiv_targets {
        if let Some(found) = find_term_inner(
            arena,
            store,
            rc,
            rcol,
            allowed,
            required_collation,
            hop_cap,
            hops + 1,
        ) {
            return Some(found);
        }
    }
    None
}
