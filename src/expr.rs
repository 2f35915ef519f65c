//! The borrowed expression tree contract (§1, §6).
//!
//! The SQL parser lives outside this crate's scope. `Expr` is the narrow
//! interface the planner needs a parsed expression to expose: enough shape
//! to classify WHERE terms, compute dependency masks, and synthesise
//! virtual terms, and nothing about parsing, name resolution, or general
//! expression evaluation. A real parser's AST is expected to either be this
//! type or to convert into it before handing the tree to [`crate::plan`].

use crate::bitmask::{Bitmask, CursorBitmap, CursorId};
use crate::catalog::{Affinity, Collation};

/// Binary comparison / arithmetic operators relevant to term classification.
/// Arithmetic operators that can't drive an index (e.g. `+`) are folded
/// into [`BinaryOp::Opaque`] by the caller; the planner treats any term
/// whose root isn't a recognised comparison as a residual filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Opaque,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Integer(i64),
    Real(u64), // bit pattern, for Eq/Hash stability
    Text(String),
    Blob(Vec<u8>),
}

/// The narrow expression-tree contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A resolved column reference: `cursor` identifies the FROM entry,
    /// `column` is its 0-based ordinal (or `-1` for the implicit rowid).
    Column { cursor: CursorId, column: i32 },
    Literal(Literal),
    /// A bound parameter (`?`, `:name`, ...); treated like a constant for
    /// dependency purposes (depends on no table) but its value is unknown
    /// at plan time, so selectivity falls back to the no-histogram path.
    Variable(i32),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Between {
        lhs: Box<Expr>,
        lo: Box<Expr>,
        hi: Box<Expr>,
        negated: bool,
    },
    InList {
        lhs: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `x IN (SELECT ...)` — opaque from this crate's point of view
    /// (subquery flattening is a non-goal); its dependency mask is the
    /// union of whatever outer-reference cursors the caller recorded.
    InSubquery {
        lhs: Box<Expr>,
        outer_refs: Bitmask,
        negated: bool,
    },
    IsNull(Box<Expr>),
    NotNull(Box<Expr>),
    Like {
        lhs: Box<Expr>,
        pattern: Box<Expr>,
        escape: Option<Box<Expr>>,
        case_insensitive: bool,
        negated: bool,
    },
    Match {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Collate(Box<Expr>, Collation),
}

impl Expr {
    pub fn column(cursor: CursorId, column: i32) -> Expr {
        Expr::Column { cursor, column }
    }

    /// Whether this expression is a plain column reference.
    pub fn as_column(&self) -> Option<(CursorId, i32)> {
        match self {
            Expr::Column { cursor, column } => Some((*cursor, *column)),
            Expr::Collate(inner, _) => inner.as_column(),
            _ => None,
        }
    }

    /// Any collation explicitly attached via `COLLATE`.
    pub fn explicit_collation(&self) -> Option<&Collation> {
        match self {
            Expr::Collate(_, c) => Some(c),
            _ => None,
        }
    }

    /// The affinity this expression coerces comparisons to, when it is a
    /// column reference. Non-column expressions have no affinity of their
    /// own for the purposes of LIKE-prefix eligibility (§4.3.2 step 4).
    pub fn column_affinity(&self, resolve: impl Fn(CursorId, i32) -> Affinity) -> Option<Affinity> {
        self.as_column().map(|(c, col)| resolve(c, col))
    }

    /// Whether this expression is a constant at plan time: a literal or a
    /// bound parameter, containing no column reference anywhere. Used to
    /// order [`crate::term::TermStore::find_term`] candidates (§4.3.4) and
    /// to drive [`crate::loop_enum::vtab`]'s phase scheduling.
    pub fn is_constant(&self) -> bool {
        self.dependency_mask_raw() == 0
    }

    /// Tables referenced anywhere in the expression, expressed directly as
    /// raw cursor ids (pre-bitmask-interning) plus any subquery
    /// outer-reference bitmask found along the way.
    fn collect_cursors(&self, out: &mut Vec<CursorId>, sub_refs: &mut Bitmask) {
        match self {
            Expr::Column { cursor, .. } => out.push(*cursor),
            Expr::Literal(_) | Expr::Variable(_) => {}
            Expr::Binary(l, _, r) | Expr::And(l, r) | Expr::Or(l, r) => {
                l.collect_cursors(out, sub_refs);
                r.collect_cursors(out, sub_refs);
            }
            Expr::Unary(_, e) | Expr::IsNull(e) | Expr::NotNull(e) | Expr::Collate(e, _) => {
                e.collect_cursors(out, sub_refs)
            }
            Expr::Between { lhs, lo, hi, .. } => {
                lhs.collect_cursors(out, sub_refs);
                lo.collect_cursors(out, sub_refs);
                hi.collect_cursors(out, sub_refs);
            }
            Expr::InList { lhs, list, .. } => {
                lhs.collect_cursors(out, sub_refs);
                for item in list {
                    item.collect_cursors(out, sub_refs);
                }
            }
            Expr::InSubquery {
                lhs, outer_refs, ..
            } => {
                lhs.collect_cursors(out, sub_refs);
                *sub_refs |= *outer_refs;
            }
            Expr::Like {
                lhs,
                pattern,
                escape,
                ..
            } => {
                lhs.collect_cursors(out, sub_refs);
                pattern.collect_cursors(out, sub_refs);
                if let Some(e) = escape {
                    e.collect_cursors(out, sub_refs);
                }
            }
            Expr::Match { lhs, rhs } => {
                lhs.collect_cursors(out, sub_refs);
                rhs.collect_cursors(out, sub_refs);
            }
        }
    }

    fn dependency_mask_raw(&self) -> u64 {
        // Used only to decide "is this constant", where any non-empty
        // cursor set (real or subquery-outer-ref) means "not constant".
        let mut cursors = Vec::new();
        let mut sub_refs = 0u64;
        self.collect_cursors(&mut cursors, &mut sub_refs);
        if cursors.is_empty() {
            sub_refs
        } else {
            1
        }
    }

    /// Translate every table this expression touches into the dense
    /// dependency mask, including any subquery outer-references.
    pub fn dependency_mask(&self, cursors: &CursorBitmap) -> Bitmask {
        let mut raw = Vec::new();
        let mut sub_refs = 0u64;
        self.collect_cursors(&mut raw, &mut sub_refs);
        raw.iter().fold(sub_refs, |m, &c| m | cursors.mask_of(c))
    }
}
