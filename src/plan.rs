//! Materialising a chosen [`crate::solver::WherePath`] into the level array
//! the VM code generator consumes (§4.8).
//!
//! Nothing here touches bytecode. The VM emitter is an external collaborator
//! (§1, §6); this module's job stops at naming, for each level, which opcode
//! *shape* the seek and termination test need (a small decision table rather
//! than a concrete instruction), allocating the VM-visible cursor ids and
//! jump labels the emitter will bind, and disabling (`Coded`) every WHERE
//! term consumed as an index key so the emitter knows what's left to apply
//! as a residual filter.

use crate::catalog::FromEntry;
use crate::error::Result;
use crate::flags::{TermOp, WsFlags};
use crate::loop_enum::{CandidateLoop, LoopVariant, TermRef};
use crate::solver::WherePath;
use crate::term::{StoreId, TermArena, TermId};

/// An opaque VM cursor id. The real cursor (table or index) is opened by the
/// caller's code generator; this crate only decides *how many* are needed
/// and in what order.
pub type VmCursorId = u32;

/// An opaque jump-target label, resolved to a real bytecode offset by the VM
/// emitter once it lays out the loop body.
pub type Label = u32;

/// The seek used to enter a loop, chosen from whether there's a start
/// constraint at all, whether it's an equality-like bind, and scan direction
/// (§4.8: "8 start variants"). Mirrors the reference planner's
/// `OP_SeekGE`/`OP_SeekGT`/`OP_Rewind`/`OP_Last` choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOp {
    /// No start constraint: begin at the first entry (ascending scan).
    RewindForward,
    /// No start constraint, reverse scan: begin at the last entry.
    RewindReverse,
    /// Equality/IN prefix, ascending: seek to the first key `>=` the prefix.
    SeekEqForward,
    /// Equality/IN prefix, reverse: seek to the last key `<=` the prefix.
    SeekEqReverse,
    /// Inclusive bottom range bound (`>=`), ascending.
    SeekGe,
    /// Exclusive bottom range bound (`>`), ascending.
    SeekGt,
    /// Inclusive top range bound used as a reverse-scan start (`<=`).
    SeekLe,
    /// Exclusive top range bound used as a reverse-scan start (`<`).
    SeekLt,
}

/// The termination test checked once per row, chosen from whether there's an
/// end constraint, whether it's an equality-like bind, and scan direction
/// (§4.8: "5 end variants" — the no-constraint case doesn't branch further
/// on equality or direction, so 1 + 2×2 = 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOp {
    /// No end constraint: run until the cursor itself is exhausted.
    ScanToExhaustion,
    /// Equality/IN prefix, ascending: stop once the key no longer matches.
    IdxEqForward,
    /// Equality/IN prefix, reverse: stop once the key no longer matches.
    IdxEqReverse,
    /// Exclusive top bound (`<`), ascending.
    IdxLt,
    /// Inclusive top bound (`<=`), ascending, or the mirrored bottom bound
    /// when the loop runs in reverse.
    IdxLe,
}

/// `exclusive` distinguishes a strict bottom bound (`>`) from an inclusive
/// one (`>=`) when the start is range-driven, giving all 8 declared start
/// variants (§4.8) a way to be reached rather than always collapsing the
/// exclusive case onto its inclusive sibling.
fn choose_start_op(has_start: bool, start_is_eq: bool, reverse: bool, exclusive: bool) -> StartOp {
    match (has_start, start_is_eq, reverse, exclusive) {
        (false, _, false, _) => StartOp::RewindForward,
        (false, _, true, _) => StartOp::RewindReverse,
        (true, true, false, _) => StartOp::SeekEqForward,
        (true, true, true, _) => StartOp::SeekEqReverse,
        (true, false, false, false) => StartOp::SeekGe,
        (true, false, false, true) => StartOp::SeekGt,
        (true, false, true, false) => StartOp::SeekLe,
        (true, false, true, true) => StartOp::SeekLt,
    }
}

fn choose_end_op(has_end: bool, end_is_eq: bool, reverse: bool) -> EndOp {
    match (has_end, end_is_eq, reverse) {
        (false, _, _) => EndOp::ScanToExhaustion,
        (true, true, false) => EndOp::IdxEqForward,
        (true, true, true) => EndOp::IdxEqReverse,
        (true, false, false) => EndOp::IdxLt,
        (true, false, true) => EndOp::IdxLe,
    }
}

/// One IN-loop cursor: the micro-loop iterating the values of an
/// IN-expanded equality for a single outer level (§3, glossary "IN-loop").
#[derive(Debug, Clone)]
pub struct InLoopCursor {
    pub cursor: VmCursorId,
    pub term: TermRef,
}

/// Payload specific to how a level's body is structured, beyond the plain
/// single-pass case.
#[derive(Debug, Clone, Default)]
pub enum LevelPayload {
    #[default]
    None,
    /// One cursor per IN-expanded equality bound at this level.
    InLoops(Vec<InLoopCursor>),
    /// An OR-union plan: the row-key set register used to de-duplicate
    /// across the per-disjunct sub-scans, and the label the shared loop
    /// body is reached through via `gosub` (§4.4.6, §4.8).
    OrUnion {
        dedup_register: u32,
        body_gosub_label: Label,
    },
}

/// One element of the emitted plan (§3, "LevelDescriptor").
#[derive(Debug, Clone)]
pub struct LevelDescriptor {
    pub loop_: CandidateLoop,
    pub table_cursor: VmCursorId,
    /// `None` when the chosen index *is* the table (rowid/primary key scan,
    /// or a virtual table, which has no separate index cursor).
    pub index_cursor: Option<VmCursorId>,
    pub start_op: StartOp,
    pub end_op: EndOp,
    pub label_loop_start: Label,
    /// Where `continue`/`Next` jumps back to.
    pub label_continue: Label,
    /// Where `break` jumps on loop exit.
    pub label_break: Label,
    /// Set only for an IN-loop level: where the next IN value's micro-loop
    /// iteration resumes.
    pub label_next_in: Option<Label>,
    pub payload: LevelPayload,
    /// Register holding the LEFT JOIN "any match seen" flag, when this
    /// level's FROM entry is the right side of a LEFT JOIN.
    pub left_join_match_register: Option<u32>,
}

/// Translates a chosen [`WherePath`] into [`LevelDescriptor`]s and disables
/// every WHERE term the path consumed as an index key (§4.8).
pub struct PlanEmitter<'a> {
    pub from_list: &'a [FromEntry],
    /// §6 `OmitOpenClose`: when set, the caller opens/closes VM cursors
    /// itself; this crate still assigns cursor ids so terms and descriptors
    /// can reference them consistently, it just doesn't matter for which
    /// side opens them.
    pub omit_open_close: bool,
}

impl<'a> PlanEmitter<'a> {
    pub fn new(from_list: &'a [FromEntry]) -> Self {
        Self {
            from_list,
            omit_open_close: false,
        }
    }

    pub fn emit(&self, arena: &mut TermArena, path: &WherePath) -> Result<Vec<LevelDescriptor>> {
        let mut next_cursor: VmCursorId = 0;
        let mut next_label: Label = 0;
        let mut alloc_cursor = || {
            let id = next_cursor;
            next_cursor += 1;
            id
        };
        let mut alloc_label = || {
            let id = next_label;
            next_label += 1;
            id
        };

        let mut levels = Vec::with_capacity(path.loops.len());
        for (level, loop_) in path.loops.iter().enumerate() {
            let entry = &self.from_list[loop_.i_tab];
            let table_cursor = alloc_cursor();
            let index_cursor = needs_index_cursor(loop_).then(&mut alloc_cursor);

            let reverse = path.rev_mask & (1u64 << level) != 0;
            let has_start = loop_.ws_flags.intersects(
                WsFlags::COLUMN_EQ | WsFlags::COLUMN_IN | WsFlags::COLUMN_NULL | WsFlags::BTM_LIMIT,
            );
            let start_is_eq = loop_
                .ws_flags
                .intersects(WsFlags::COLUMN_EQ | WsFlags::COLUMN_IN | WsFlags::COLUMN_NULL);
            let has_end = loop_.ws_flags.contains(WsFlags::TOP_LIMIT) || start_is_eq;
            let end_is_eq = start_is_eq && !loop_.ws_flags.contains(WsFlags::COLUMN_RANGE);
            let start_exclusive = loop_
                .terms
                .iter()
                .find_map(|&(s, t)| {
                    let op = arena.get(s).get(t).op;
                    if op.intersects(TermOp::GT | TermOp::GE) {
                        Some(op.contains(TermOp::GT))
                    } else {
                        None
                    }
                })
                .unwrap_or(false);

            let start_op = choose_start_op(has_start, start_is_eq, reverse, start_exclusive);
            let end_op = choose_end_op(has_end, end_is_eq, reverse);

            let label_loop_start = alloc_label();
            let label_continue = alloc_label();
            let label_break = alloc_label();
            let label_next_in = loop_
                .ws_flags
                .contains(WsFlags::COLUMN_IN)
                .then(&mut alloc_label);

            let payload = match &loop_.variant {
                LoopVariant::OrUnion { .. } => LevelPayload::OrUnion {
                    dedup_register: alloc_cursor(),
                    body_gosub_label: alloc_label(),
                },
                _ if loop_.ws_flags.contains(WsFlags::COLUMN_IN) => {
                    let in_term = loop_
                        .terms
                        .iter()
                        .copied()
                        .find(|&(s, t)| arena.get(s).get(t).op.contains(crate::flags::TermOp::IN));
                    match in_term {
                        Some(term) => LevelPayload::InLoops(vec![InLoopCursor {
                            cursor: alloc_cursor(),
                            term,
                        }]),
                        None => LevelPayload::None,
                    }
                }
                _ => LevelPayload::None,
            };

            let left_join_match_register =
                matches!(entry.join_type, crate::catalog::JoinType::Left).then(&mut alloc_cursor);

            for &(s, t) in &loop_.terms {
                disable_term(arena, s, t);
            }
            if let LoopVariant::VirtualTable {
                omitted_constraint_terms,
                ..
            } = &loop_.variant
            {
                for &(s, t) in omitted_constraint_terms {
                    disable_term(arena, s, t);
                }
            }

            levels.push(LevelDescriptor {
                loop_: loop_.clone(),
                table_cursor,
                index_cursor,
                start_op,
                end_op,
                label_loop_start,
                label_continue,
                label_break,
                label_next_in,
                payload,
                left_join_match_register,
            });
        }
        Ok(levels)
    }
}

fn needs_index_cursor(loop_: &CandidateLoop) -> bool {
    match &loop_.variant {
        LoopVariant::BTree { index } | LoopVariant::AutoIndex { index } => {
            !index.is_rowid && !index.is_primary_key
        }
        LoopVariant::VirtualTable { .. } | LoopVariant::OrUnion { .. } => false,
    }
}

/// Mark `tid` [`crate::flags::TermFlag::CODED`] and cascade to its parent:
/// decrement the parent's child count, and — only when the parent's virtual
/// children are a logically complete rewrite of it (§9, `supersedes_original`)
/// — disable the parent too once that count reaches zero (§4.8, §8 "Term
/// flag monotonicity").
fn disable_term(arena: &mut TermArena, store: StoreId, tid: TermId) {
    let already_coded = arena.get(store).get(tid).is_coded();
    if already_coded {
        return;
    }
    arena.get_mut(store).get_mut(tid).mark_coded();
    let parent = arena.get(store).get(tid).parent;
    if let Some(pid) = parent {
        let parent_term = arena.get_mut(store).get_mut(pid);
        if parent_term.child_count > 0 {
            parent_term.child_count -= 1;
        }
        let eligible = parent_term.child_count == 0
            && parent_term.supersedes_original
            && !parent_term.is_coded();
        if eligible {
            disable_term(arena, store, pid);
        }
    }
}
