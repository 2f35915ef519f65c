//! A relational query planner core: WHERE-clause term analysis, candidate
//! access-path enumeration, join-order search, and ORDER BY / DISTINCT
//! satisfaction, decoupled from the SQL parser, catalog, and VM code
//! generator it plans for (see [`context::plan`] for the entry point).

pub mod bitmask;
pub mod catalog;
pub mod config;
pub mod context;
pub mod cost;
pub mod error;
pub mod expr;
pub mod flags;
pub mod loop_enum;
pub mod orderby;
pub mod plan;
pub mod selectivity;
pub mod solver;
pub mod term;

pub use config::PlannerConfig;
pub use context::{plan, DistinctKind, PlanRequest, WhereContext};
pub use error::{PlannerError, Result};
