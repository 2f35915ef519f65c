//! WHERE-term data model (§3, "Term" and "TermStore").

pub mod analyser;
pub mod store;

pub use analyser::TermAnalyser;
pub use store::{Connective, StoreId, TermArena, TermId, TermStore};

use crate::bitmask::{Bitmask, CursorId};
use crate::catalog::Collation;
use crate::expr::Expr;
use crate::flags::{TermFlag, TermOp};
use std::rc::Rc;

/// One atomic predicate under the top-level AND (or one disjunct under an
/// OR/AND sub-clause).
#[derive(Debug, Clone)]
pub struct Term {
    /// The expression this term classifies. Always reference-counted: for
    /// `Virtual`/`Dynamic` terms this is the *only* strong reference, so
    /// the synthesised subtree is dropped exactly when the term is (Rust's
    /// `Rc` makes the reference-counting the spec calls for automatic; the
    /// `DYNAMIC` flag remains purely informational bookkeeping so that
    /// tooling and tests can still ask "did the analyser synthesise this
    /// expression").
    pub expr: Rc<Expr>,
    pub op: TermOp,
    pub left_cursor: Option<CursorId>,
    pub left_column: Option<i32>,
    /// Tables referenced by the RHS only (or by the `IN` list/subquery).
    pub prereq_right: Bitmask,
    /// Tables referenced anywhere in the expression, ORed with the LEFT
    /// JOIN phantom dependency when this term came from an ON clause.
    pub prereq_all: Bitmask,
    /// Dense index of the parent term within the *same* store, for virtual
    /// terms synthesised from this one (BETWEEN's two bounds, LIKE's two
    /// bounds, the commuted equality twin).
    pub parent: Option<TermId>,
    /// Number of virtual children still not yet folded into `Coded`; the
    /// parent becomes eligible for disabling when this reaches zero.
    pub child_count: u32,
    pub flags: TermFlag,
    /// Collation this term compares under, when known (propagated from an
    /// explicit `COLLATE` or from the index column it was matched against).
    pub collation: Option<Collation>,
    /// Present when `flags` carries `OR_INFO`: the nested store splitting
    /// this OR term's disjuncts, plus the per-table indexable mask
    /// computed in §4.3.3 step 2.
    pub or_info: Option<OrInfo>,
    /// Present when `flags` carries `AND_INFO`: the nested store holding an
    /// AND-group's conjuncts (only populated for an OR sub-term that is
    /// itself an AND-group, §4.3.3 step 2).
    pub and_info: Option<AndInfo>,
    /// True when this term's virtual children are a logically complete
    /// rewrite of it (BETWEEN's two bounds, `IS NOT NULL`'s `> NULL`): once
    /// every child is [`TermFlag::CODED`], the original itself can be
    /// cascade-disabled rather than kept as a residual filter. LIKE's prefix
    /// rewrite leaves this false — the range is a superset of the pattern,
    /// so the original LIKE must still run as a post-filter (§4.8, §9).
    pub supersedes_original: bool,
}

impl Term {
    pub fn new(expr: Rc<Expr>) -> Term {
        Term {
            expr,
            op: TermOp::empty(),
            left_cursor: None,
            left_column: None,
            prereq_right: 0,
            prereq_all: 0,
            parent: None,
            child_count: 0,
            flags: TermFlag::empty(),
            collation: None,
            or_info: None,
            and_info: None,
            supersedes_original: false,
        }
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(TermFlag::VIRTUAL)
    }

    pub fn is_coded(&self) -> bool {
        self.flags.contains(TermFlag::CODED)
    }

    /// Mark this term consumed by the emitter; cascades to the parent's
    /// child-count bookkeeping (§4.8, "cascade disabling to virtual
    /// children via the parent/child count").
    pub fn mark_coded(&mut self) {
        debug_assert!(!self.is_coded(), "Coded must transition false -> true once");
        self.flags.insert(TermFlag::CODED);
    }

    /// Usable as an index seek key at all (not already coded, and not a
    /// pure connective/NOOP placeholder).
    pub fn is_seekable(&self) -> bool {
        !self.is_coded() && self.op.intersects(TermOp::INDEXABLE)
    }
}

/// The sub-clause payload for a term whose operator is `OR` (§4.3.3).
#[derive(Debug, Clone)]
pub struct OrInfo {
    pub sub_store: StoreId,
    /// Intersection, over every sub-term, of the set of tables for which
    /// that sub-term has an indexable conjunct. Drives whether the
    /// enumerator can materialise an OR-union candidate for a given table.
    pub indexable_mask: Bitmask,
}

/// The sub-clause payload for an AND-group nested inside an OR sub-term.
#[derive(Debug, Clone)]
pub struct AndInfo {
    pub sub_store: StoreId,
}
