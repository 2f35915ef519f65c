//! End-to-end scenarios (§8): each test drives the public [`queryplan::plan`]
//! entry point against an in-memory [`MockCatalog`] and checks the shape of
//! the resulting [`queryplan::WhereContext`], the way the reference planner's
//! `where.test`/`whereA.test` TCL suites drive the real VDBE through a
//! handful of canonical join shapes rather than unit-testing each internal
//! stage in isolation.

mod support;

use queryplan::bitmask::CursorId;
use queryplan::catalog::{
    Affinity, Collation, FromEntry, Histogram, HistogramSample, IndexColumn, IndexDescriptor,
    JoinType, TableDescriptor,
};
use queryplan::config::PlannerConfig;
use queryplan::context::{plan, PlanRequest};
use queryplan::expr::{BinaryOp, Expr, Literal};
use queryplan::flags::{TermOp, WhereFlags};
use queryplan::orderby::SortKey;
use rstest::rstest;
use support::mock_catalog::MockCatalog;

fn table(cursor: CursorId, name: &str, row_count: u64, affinities: Vec<Affinity>) -> TableDescriptor {
    let column_not_null = vec![false; affinities.len()];
    TableDescriptor {
        name: name.into(),
        cursor,
        row_count,
        column_affinities: affinities,
        column_not_null,
        is_virtual: false,
    }
}

fn entry(cursor: CursorId, table: &TableDescriptor, join_type: JoinType) -> FromEntry {
    FromEntry {
        cursor,
        table: std::rc::Rc::new(table.clone()),
        indexed_by: None,
        not_indexed: false,
        join_type,
        virtual_table: None,
        on_clause_mask: 0,
    }
}

fn eq(lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(Box::new(lhs), BinaryOp::Eq, Box::new(rhs))
}

fn int(n: i64) -> Expr {
    Expr::Literal(Literal::Integer(n))
}

// Scenario 1 (§8): equality on a primary key in a single-table query leaves
// a single OneRow level with no sort required and a row estimate of 1.
#[rstest]
#[case::small_value(Affinity::Integer, 5)]
#[case::large_value(Affinity::Integer, 1_000_000)]
fn equality_on_primary_key_is_one_row(#[case] affinity: Affinity, #[case] value: i64) {
    let t = table(0, "t", 1000, vec![affinity, Affinity::Integer]);
    let pk = IndexDescriptor {
        name: "pk".into(),
        table: 0,
        columns: vec![IndexColumn {
            column: 0,
            affinity,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: true,
        is_primary_key: true,
        is_rowid: false,
        row_est_buckets: vec![1000, 1],
        histogram: None,
    };
    let catalog = MockCatalog::new().with_table(t.clone()).with_primary_key(pk);
    let from_list = vec![entry(0, &t, JoinType::Inner)];
    let where_clause = eq(Expr::column(0, 0), int(value));

    let ctx = plan(
        &catalog,
        &PlannerConfig::default(),
        PlanRequest {
            from_list: &from_list,
            where_clause: Some(where_clause),
            on_clauses: &[],
            order_by: &[],
            flags: WhereFlags::empty(),
        },
    )
    .unwrap();

    assert_eq!(ctx.levels.len(), 1);
    assert!(ctx.levels[0].loop_.is_one_row());
    assert!(ctx.b_ob_sat);
    assert_eq!(ctx.row_estimate.round() as i64, 1);
}

// Scenario 2 (§8): a LIKE pattern with a literal prefix on a TEXT-affinity
// column is rewritten into a `>= / <` virtual range pair; the original LIKE
// term is kept as a residual post-filter rather than cascade-disabled.
#[test]
fn like_prefix_rewrites_to_range_and_keeps_original_as_residual() {
    let t = table(0, "t", 1000, vec![Affinity::Integer, Affinity::Text]);
    let idx = IndexDescriptor {
        name: "i_x".into(),
        table: 0,
        columns: vec![IndexColumn {
            column: 1,
            affinity: Affinity::Text,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: true,
        is_primary_key: false,
        is_rowid: false,
        row_est_buckets: vec![1000, 10],
        histogram: None,
    };
    let catalog = MockCatalog::new().with_table(t.clone()).with_index(idx);
    let from_list = vec![entry(0, &t, JoinType::Inner)];
    let where_clause = Expr::Like {
        lhs: Box::new(Expr::column(0, 1)),
        pattern: Box::new(Expr::Literal(Literal::Text("abc%".into()))),
        escape: None,
        case_insensitive: false,
        negated: false,
    };

    let ctx = plan(
        &catalog,
        &PlannerConfig::default(),
        PlanRequest {
            from_list: &from_list,
            where_clause: Some(where_clause),
            on_clauses: &[],
            order_by: &[],
            flags: WhereFlags::empty(),
        },
    )
    .unwrap();

    assert_eq!(ctx.levels.len(), 1);
    assert!(ctx
        .levels[0]
        .loop_
        .ws_flags
        .contains(queryplan::flags::WsFlags::COLUMN_RANGE));
    assert_eq!(ctx.reverse_mask, 0);

    let store = ctx.arena.get(ctx.top_store);
    assert_eq!(store.len(), 3, "original LIKE term plus two virtual range terms");
    let residual = store
        .iter()
        .find(|(_, term)| term.op.is_empty())
        .expect("the original LIKE term keeps an empty TermOp (never directly classified)");
    assert!(
        !residual.1.is_coded(),
        "LIKE's range rewrite is a superset of the pattern, so the original must still run as a filter"
    );
}

// Scenario 3 (§8): BETWEEN rewritten to two virtual range bounds, with
// ORDER BY on the same column satisfied by the index directly (no sort).
#[test]
fn between_rewrite_satisfies_matching_order_by() {
    let t = table(0, "t", 1000, vec![Affinity::Integer, Affinity::Integer]);
    let idx = IndexDescriptor {
        name: "i_b".into(),
        table: 0,
        columns: vec![IndexColumn {
            column: 1,
            affinity: Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: false,
        is_primary_key: false,
        is_rowid: false,
        row_est_buckets: vec![1000, 100],
        histogram: None,
    };
    let catalog = MockCatalog::new().with_table(t.clone()).with_index(idx);
    let from_list = vec![entry(0, &t, JoinType::Inner)];
    let where_clause = Expr::Between {
        lhs: Box::new(Expr::column(0, 1)),
        lo: Box::new(int(10)),
        hi: Box::new(int(20)),
        negated: false,
    };
    let order_by = vec![SortKey {
        cursor: 0,
        column: 1,
        collation: Collation::BINARY,
        descending: false,
    }];

    let ctx = plan(
        &catalog,
        &PlannerConfig::default(),
        PlanRequest {
            from_list: &from_list,
            where_clause: Some(where_clause),
            on_clauses: &[],
            order_by: &order_by,
            flags: WhereFlags::empty(),
        },
    )
    .unwrap();

    assert_eq!(ctx.levels.len(), 1);
    assert!(ctx
        .levels[0]
        .loop_
        .ws_flags
        .contains(queryplan::flags::WsFlags::COLUMN_RANGE));
    assert!(ctx.b_ob_sat);
    assert_eq!(ctx.reverse_mask, 0);

    let store = ctx.arena.get(ctx.top_store);
    let between_terms: Vec<_> = store
        .iter()
        .filter(|(_, term)| term.op.intersects(TermOp::GE | TermOp::LE))
        .collect();
    assert_eq!(between_terms.len(), 2, "BETWEEN expands into a GE and an LE virtual term");
}

// Scenario 4 (§8): an OR of equalities on the same indexed column is
// rewritten to a single IN-driven loop; the original OR term is demoted
// rather than evaluated disjunct by disjunct.
#[test]
fn or_of_equalities_rewrites_to_in_driven_loop() {
    let t = table(0, "t", 900, vec![Affinity::Integer]);
    let histogram = Histogram {
        samples: vec![
            HistogramSample { value: 1i64.to_be_bytes().to_vec(), n_lt: 0, n_eq: 3 },
            HistogramSample { value: 2i64.to_be_bytes().to_vec(), n_lt: 3, n_eq: 3 },
            HistogramSample { value: 3i64.to_be_bytes().to_vec(), n_lt: 6, n_eq: 3 },
        ],
    };
    let idx = IndexDescriptor {
        name: "i_a".into(),
        table: 0,
        columns: vec![IndexColumn {
            column: 0,
            affinity: Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: false,
        is_primary_key: false,
        is_rowid: false,
        row_est_buckets: vec![900, 9],
        histogram: Some(histogram),
    };
    let catalog = MockCatalog::new().with_table(t.clone()).with_index(idx);
    let from_list = vec![entry(0, &t, JoinType::Inner)];
    let where_clause = Expr::Or(
        Box::new(Expr::Or(
            Box::new(eq(Expr::column(0, 0), int(1))),
            Box::new(eq(Expr::column(0, 0), int(2))),
        )),
        Box::new(eq(Expr::column(0, 0), int(3))),
    );

    let ctx = plan(
        &catalog,
        &PlannerConfig::default(),
        PlanRequest {
            from_list: &from_list,
            where_clause: Some(where_clause),
            on_clauses: &[],
            order_by: &[],
            flags: WhereFlags::empty(),
        },
    )
    .unwrap();

    assert_eq!(ctx.levels.len(), 1);
    assert!(ctx
        .levels[0]
        .loop_
        .ws_flags
        .contains(queryplan::flags::WsFlags::COLUMN_IN));
    assert_eq!(ctx.row_estimate.round() as i64, 9, "3 disjuncts at 3 rows apiece, per the histogram");

    let store = ctx.arena.get(ctx.top_store);
    let demoted = store
        .iter()
        .find(|(_, term)| term.op == TermOp::NOOP)
        .expect("the original OR term is demoted to NOOP once superseded by the IN rewrite");
    let _ = demoted;
}

// Scenario 5 (§8): a two-table equi-join plus a constant on one side lets
// the solver drive with the constant-bound table and resolve the other via
// transitive equality; both sides are OneRow once both indexes are unique.
#[test]
fn two_table_join_drives_with_the_constant_bound_table() {
    let t1 = table(0, "t1", 1000, vec![Affinity::Integer]);
    let t2 = table(1, "t2", 500, vec![Affinity::Integer]);
    let idx1 = IndexDescriptor {
        name: "i_a".into(),
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
    };
    let idx2 = IndexDescriptor {
        name: "i_b".into(),
        table: 1,
        columns: vec![IndexColumn {
            column: 0,
            affinity: Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: true,
        is_primary_key: true,
        is_rowid: false,
        row_est_buckets: vec![500, 1],
        histogram: None,
    };
    let catalog = MockCatalog::new()
        .with_table(t1.clone())
        .with_table(t2.clone())
        .with_primary_key(idx1)
        .with_primary_key(idx2);
    let from_list = vec![entry(0, &t1, JoinType::Inner), entry(1, &t2, JoinType::Inner)];
    let where_clause = Expr::And(
        Box::new(eq(Expr::column(0, 0), Expr::column(1, 0))),
        Box::new(eq(Expr::column(1, 0), int(7))),
    );

    let ctx = plan(
        &catalog,
        &PlannerConfig::default(),
        PlanRequest {
            from_list: &from_list,
            where_clause: Some(where_clause),
            on_clauses: &[],
            order_by: &[],
            flags: WhereFlags::empty(),
        },
    )
    .unwrap();

    assert_eq!(ctx.levels.len(), 2);
    assert_eq!(ctx.levels[0].loop_.i_tab, 1, "t2 drives via its constant-bound equality");
    assert_eq!(ctx.levels[1].loop_.i_tab, 0, "t1 follows, resolved via the transitive equality");
    assert!(ctx.levels[0].loop_.is_one_row());
    assert!(ctx.levels[1].loop_.is_one_row());
}

// Scenario 6 (§8): a LEFT JOIN's ON-clause equality can't pull the right
// table ahead of the left one, and a WHERE predicate on the right table's
// own column is left as a post-join residual filter.
#[test]
fn left_join_on_clause_cannot_reorder_ahead_of_the_outer_table() {
    let t1 = table(0, "t1", 200, vec![Affinity::Integer]);
    let t2 = table(1, "t2", 300, vec![Affinity::Integer, Affinity::Integer]);
    let idx1 = IndexDescriptor {
        name: "i_a".into(),
        table: 0,
        columns: vec![IndexColumn {
            column: 0,
            affinity: Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: false,
        is_primary_key: false,
        is_rowid: false,
        row_est_buckets: vec![200, 20],
        histogram: None,
    };
    let idx2 = IndexDescriptor {
        name: "i_x".into(),
        table: 1,
        columns: vec![IndexColumn {
            column: 0,
            affinity: Affinity::Integer,
            collation: Collation::BINARY,
            descending: false,
        }],
        unique: false,
        is_primary_key: false,
        is_rowid: false,
        row_est_buckets: vec![300, 30],
        histogram: None,
    };
    let catalog = MockCatalog::new()
        .with_table(t1.clone())
        .with_table(t2.clone())
        .with_index(idx1)
        .with_index(idx2);
    let from_list = vec![
        entry(0, &t1, JoinType::Inner),
        entry(1, &t2, JoinType::Left),
    ];
    let on_clauses = vec![None, Some(eq(Expr::column(0, 0), Expr::column(1, 0)))];
    let where_clause = eq(Expr::column(1, 1), int(5));

    let ctx = plan(
        &catalog,
        &PlannerConfig::default(),
        PlanRequest {
            from_list: &from_list,
            where_clause: Some(where_clause),
            on_clauses: &on_clauses,
            order_by: &[],
            flags: WhereFlags::empty(),
        },
    )
    .unwrap();

    assert_eq!(ctx.levels.len(), 2);
    assert_eq!(ctx.levels[0].loop_.i_tab, 0, "t1 must run first: t2 is the LEFT JOIN's right side");
    assert_eq!(ctx.levels[1].loop_.i_tab, 1);
    assert!(ctx.levels[0].left_join_match_register.is_none());
    assert!(
        ctx.levels[1].left_join_match_register.is_some(),
        "the right side of a LEFT JOIN needs an any-match-seen flag"
    );

    let store = ctx.arena.get(ctx.top_store);
    let residual = store
        .iter()
        .find(|(_, term)| term.left_cursor == Some(1) && term.left_column == Some(1))
        .expect("the t2.y = 5 predicate is classified as its own term");
    assert!(
        !residual.1.is_coded(),
        "t2 has no index on y, so this predicate is never consumed as a seek key"
    );
}
