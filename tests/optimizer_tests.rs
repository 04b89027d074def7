//! Optimizer integration tests: rewrites observed through the public
//! builder and plan surface.

use shellspark::aggregate::count;
use shellspark::{
    ColumnRef, FilterOp, Format, Pipeline, PlanNode, QueryOptimizer, SortOrder,
};

fn kinds(plan: &PlanNode) -> Vec<&'static str> {
    let mut out = Vec::new();
    plan.walk(&mut |n| out.push(n.kind_name()));
    out
}

#[test]
fn test_pushdown_moves_filter_below_select() {
    let pipeline = Pipeline::with_format("data.csv", Format::Csv)
        .parse_csv()
        .select(["a", "b"])
        .expect("select")
        .filter("a", FilterOp::Eq, "X");

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    assert_eq!(
        kinds(&optimized),
        vec!["Select", "Parse", "Filter", "Source"]
    );
}

#[test]
fn test_pushdown_respects_dropped_columns() {
    let pipeline = Pipeline::with_format("data.csv", Format::Csv)
        .parse_csv()
        .select(["a", "b"])
        .expect("select")
        .filter("c", FilterOp::Eq, "X");

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    // Column c does not survive the projection, so the filter must not
    // cross it; it still sinks nowhere above Parse.
    assert_eq!(
        kinds(&optimized),
        vec!["Filter", "Select", "Parse", "Source"]
    );
}

#[test]
fn test_pushdown_stops_at_group_by() {
    let pipeline = Pipeline::with_format("data.csv", Format::Csv)
        .parse_csv()
        .group_by(["region"])
        .expect("group_by")
        .agg([("n", count())])
        .expect("agg")
        .filter("n", FilterOp::Gt, 1);

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    assert_eq!(
        kinds(&optimized),
        vec!["Filter", "GroupBy", "Parse", "Source"]
    );
}

#[test]
fn test_limit_merge_shape() {
    let pipeline = Pipeline::new("a.log")
        .limit(20, 5)
        .expect("inner limit")
        .limit(10, 0)
        .expect("outer limit");

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    match optimized {
        PlanNode::Limit { count, offset, child } => {
            assert_eq!(count, 10);
            assert_eq!(offset, 5);
            assert!(matches!(*child, PlanNode::Source { .. }));
        }
        other => panic!("expected merged Limit, got {}", other.kind_name()),
    }
}

#[test]
fn test_limit_merge_keeps_smaller_inner_count() {
    let pipeline = Pipeline::new("a.log")
        .limit(3, 0)
        .expect("inner limit")
        .limit(10, 0)
        .expect("outer limit");

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    match optimized {
        PlanNode::Limit { count, .. } => assert_eq!(count, 3),
        other => panic!("expected merged Limit, got {}", other.kind_name()),
    }
}

#[test]
fn test_distinct_after_group_by_is_dropped() {
    let pipeline = Pipeline::with_format("data.csv", Format::Csv)
        .parse_csv()
        .group_by(["region"])
        .expect("group_by")
        .agg([("n", count())])
        .expect("agg")
        .distinct_all();

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    assert!(matches!(optimized, PlanNode::GroupBy { .. }));
}

#[test]
fn test_duplicate_filters_collapse() {
    let pipeline = Pipeline::new("a.log")
        .filter_line(FilterOp::Contains, "ERROR")
        .filter_line(FilterOp::Contains, "ERROR");

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    assert_eq!(kinds(&optimized), vec!["Filter", "Source"]);
}

#[test]
fn test_case_sensitivity_distinguishes_filters() {
    let pipeline = Pipeline::new("a.log")
        .filter_opts(None, FilterOp::Contains, "ERROR", true)
        .filter_opts(None, FilterOp::Contains, "ERROR", false);

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    assert_eq!(kinds(&optimized), vec!["Filter", "Filter", "Source"]);
}

#[test]
fn test_optimizer_never_touches_sort_barriers() {
    let pipeline = Pipeline::new("a.log")
        .sort(ColumnRef::Index(1), SortOrder::Asc, true)
        .filter_line(FilterOp::Contains, "x");

    let optimized = QueryOptimizer::new().optimize(pipeline.plan().clone());
    assert_eq!(kinds(&optimized), vec!["Filter", "Sort", "Source"]);
}

#[test]
fn test_passes_are_confluent_on_combined_plans() {
    let pipeline = Pipeline::with_format("data.csv", Format::Csv)
        .parse_csv()
        .select(["a", "b"])
        .expect("select")
        .filter("a", FilterOp::Eq, "X")
        .filter("a", FilterOp::Eq, "X")
        .limit(20, 0)
        .expect("inner limit")
        .limit(5, 0)
        .expect("outer limit");

    let optimizer = QueryOptimizer::new();
    let once = optimizer.optimize(pipeline.plan().clone());
    let twice = optimizer.optimize(once.clone());
    assert_eq!(once, twice);
    assert_eq!(
        kinds(&once),
        vec!["Limit", "Select", "Parse", "Filter", "Source"]
    );
}
