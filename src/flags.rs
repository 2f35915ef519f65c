//! Bitflag sets shared across the term analyser, loop enumerator, and
//! solver. Each is its own type so "is this term usable as an index seek
//! key?" style questions reduce to a single mask operation, matching the
//! reference planner's `WO_*`/`WHERE_*` flag words.

use bitflags::bitflags;

bitflags! {
    /// Operator class a [`crate::term::Term`] can be classified under.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TermOp: u16 {
        const EQ      = 0x0001;
        const LT      = 0x0002;
        const LE      = 0x0004;
        const GT      = 0x0008;
        const GE      = 0x0010;
        const IN      = 0x0020;
        const ISNULL  = 0x0040;
        const MATCH   = 0x0080;
        const OR      = 0x0100;
        const AND     = 0x0200;
        const EQUIV   = 0x0400;
        const NOOP    = 0x0800;
    }
}

impl TermOp {
    /// Operators that can bind to an index column as an equality (or
    /// equality-like, e.g. `IN`) prefix extension.
    pub const EQUALITY_LIKE: TermOp =
        TermOp::from_bits_truncate(TermOp::EQ.bits() | TermOp::IN.bits() | TermOp::ISNULL.bits());

    /// Operators usable as a range bound (top or bottom limit).
    pub const RANGE: TermOp = TermOp::from_bits_truncate(
        TermOp::LT.bits() | TermOp::LE.bits() | TermOp::GT.bits() | TermOp::GE.bits(),
    );

    /// Any operator that can drive an index seek at all.
    pub const INDEXABLE: TermOp = TermOp::from_bits_truncate(
        TermOp::EQUALITY_LIKE.bits() | TermOp::RANGE.bits(),
    );

    pub fn is_lower_bound(self) -> bool {
        self.intersects(TermOp::GT | TermOp::GE)
    }

    pub fn is_upper_bound(self) -> bool {
        self.intersects(TermOp::LT | TermOp::LE)
    }
}

bitflags! {
    /// Per-term housekeeping flags (§3, Term attributes).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct TermFlag: u16 {
        /// Term owns a synthesised expression (freed with the term).
        const DYNAMIC = 0x001;
        /// Term was synthesised by the analyser, not written by the user.
        const VIRTUAL = 0x002;
        /// Term has already been consumed as an index key or applied as a
        /// residual filter by the plan emitter.
        const CODED   = 0x004;
        /// Term has a virtual commuted twin elsewhere in the store.
        const COPIED  = 0x008;
        /// Term carries an [`crate::term::OrInfo`] sub-clause payload.
        const OR_INFO = 0x010;
        /// Term carries an [`crate::term::AndInfo`] sub-clause payload
        /// (BETWEEN expansion and the like).
        const AND_INFO = 0x020;
        /// Scratch bit used while testing an OR term for the OR->IN
        /// rewrite; cleared once the rewrite decision is made.
        const OR_OK   = 0x040;
        /// Term is the synthesised `x > NULL` rewrite of `x IS NOT NULL`.
        const V_NULL  = 0x080;
    }
}

bitflags! {
    /// Per-[`crate::loop_enum::CandidateLoop`] access-path flags (§3).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct WsFlags: u32 {
        const COLUMN_EQ    = 0x0000_0001;
        const COLUMN_RANGE = 0x0000_0002;
        const COLUMN_IN    = 0x0000_0004;
        const COLUMN_NULL  = 0x0000_0008;
        const TOP_LIMIT    = 0x0000_0010;
        const BTM_LIMIT    = 0x0000_0020;
        const IDX_ONLY     = 0x0000_0040;
        const INDEXED      = 0x0000_0080;
        const PRIMARY_KEY  = 0x0000_0100;
        const VIRTUAL_TABLE = 0x0000_0200;
        const IN_ABLE      = 0x0000_0400;
        const ONE_ROW      = 0x0000_0800;
        const MULTI_OR     = 0x0000_1000;
        const AUTO_INDEX   = 0x0000_2000;
    }
}

/// Caller-supplied flags controlling planning behaviour (§6).
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct WhereFlags: u32 {
        const ORDER_BY_MIN   = 0x0001;
        const ORDER_BY_MAX   = 0x0002;
        const ONEPASS_DESIRED = 0x0004;
        const DUPLICATES_OK  = 0x0008;
        const OMIT_OPEN_CLOSE = 0x0010;
        const FORCE_TABLE    = 0x0020;
        const AND_ONLY       = 0x0040;
        const ONE_TABLE_ONLY = 0x0080;
        const WANT_DISTINCT  = 0x0100;
        const GROUP_BY       = 0x0200;
        const DISTINCT_BY    = 0x0400;
    }
}
