//! Error taxonomy for the planner (§7 of the design).
//!
//! Every fallible planner API returns [`Result`]. Errors here are either
//! latched onto the [`crate::context::WhereContext`] (out-of-memory) or
//! propagate straight to the caller, who owns freeing the context.

use thiserror::Error;

/// The full set of ways planning can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlannerError {
    /// Any allocation failure. Latched on the context; every subsequent
    /// step becomes a no-op that returns this same error.
    #[error("out of memory while planning")]
    OutOfMemory,

    /// More FROM-clause tables than the dependency-bitmask width supports.
    #[error("at most {max} tables can appear in a single join")]
    JoinTooWide {
        /// The configured bitmask width (`W`).
        max: u32,
    },

    /// The solver's final generation came back empty: no combination of
    /// candidate loops satisfied every prerequisite (e.g. a contradictory
    /// `INDEXED BY` clause).
    #[error("no query solution")]
    NoSolution,

    /// A virtual table's `best_index` callback marked a constraint usable
    /// that the planner cannot actually satisfy.
    #[error("virtual table {table} returned an invalid index plan")]
    VirtualTablePlanInvalid {
        /// Name of the offending virtual table.
        table: String,
    },

    /// A virtual table's `best_index` callback itself failed.
    #[error("virtual table {table} error: {message}")]
    VirtualTableError {
        /// Name of the offending virtual table.
        table: String,
        /// The message the extension reported.
        message: String,
    },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PlannerError>;
