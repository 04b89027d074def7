//! # Plan Optimizer
//!
//! Rule-based rewrites over the plan IR, applied as three passes in
//! order:
//!
//! - Filter pushdown: `Select(Filter(x))` stays, `Filter(Select(x))` ->
//!   `Select(Filter(x))` when the filter only reads surviving columns
//! - Redundancy elimination: `Distinct(GroupBy(x))` -> `GroupBy(x)`,
//!   equal back-to-back filters collapse to one
//! - Limit merging: `Limit(a,0)` over `Limit(b,x)` -> `Limit(min(a,b),x)`
//!
//! ```text
//! PlanNode (from builder) -> [Optimizer] -> Optimized PlanNode -> Code Gen
//! ```
//!
//! Every pass consumes a tree and returns a new one; node count never
//! grows, and no rewrite changes the rows a compiled command produces.

use crate::plan::{ColumnRef, FilterOp, FilterValue, PlanNode};

/// Rule-based plan optimizer
pub struct QueryOptimizer;

impl QueryOptimizer {
    pub fn new() -> Self {
        QueryOptimizer
    }

    /// Apply all optimization passes and return the rewritten tree.
    pub fn optimize(&self, plan: PlanNode) -> PlanNode {
        let plan = self.push_filters_down(plan);
        let plan = self.eliminate_redundancy(plan);
        self.merge_limits(plan)
    }

    // ------------------------------------------------------------------
    // Pass 1: filter pushdown
    // ------------------------------------------------------------------

    /// Move every filter as close to the source as the legality rules
    /// allow: past `Parse` and other filters freely, past `Select` when
    /// the filter is whole-line or reads a surviving column, never past
    /// aggregation or barrier nodes.
    fn push_filters_down(&self, node: PlanNode) -> PlanNode {
        // Children first, so a filter can descend through a whole chain
        // of already-settled nodes in one walk.
        let node = self.rewrite_child(node, |child| self.push_filters_down(child));
        if matches!(node, PlanNode::Filter { .. }) {
            self.sink_filter(node)
        } else {
            node
        }
    }

    /// Repeatedly swap one filter with its child while legal.
    fn sink_filter(&self, filter: PlanNode) -> PlanNode {
        let PlanNode::Filter {
            child,
            column,
            op,
            value,
            case_sensitive,
        } = filter
        else {
            return filter;
        };

        // Swap: Filter(Target(x)) becomes Target(Filter(x)), then the
        // filter keeps sinking below the target.
        let pushable = can_push_past(column.as_ref(), &child);
        match (pushable, child.child().cloned()) {
            (true, Some(grandchild)) => {
                let target = *child;
                let sunk = self.sink_filter(PlanNode::Filter {
                    child: Box::new(grandchild),
                    column,
                    op,
                    value,
                    case_sensitive,
                });
                target.with_child(sunk)
            }
            _ => PlanNode::Filter {
                child,
                column,
                op,
                value,
                case_sensitive,
            },
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: redundancy elimination
    // ------------------------------------------------------------------

    /// Drop operations that cannot change the result: a `Distinct`
    /// directly over a `GroupBy` (group keys are already unique) and
    /// consecutive identical filters.
    fn eliminate_redundancy(&self, node: PlanNode) -> PlanNode {
        let node = self.rewrite_child(node, |child| self.eliminate_redundancy(child));

        match node {
            PlanNode::Distinct { child, columns } => {
                if matches!(*child, PlanNode::GroupBy { .. }) {
                    *child
                } else {
                    PlanNode::Distinct { child, columns }
                }
            }
            PlanNode::Filter {
                child,
                column,
                op,
                value,
                case_sensitive,
            } => {
                if filter_matches(&child, column.as_ref(), op, &value, case_sensitive) {
                    *child
                } else {
                    PlanNode::Filter {
                        child,
                        column,
                        op,
                        value,
                        case_sensitive,
                    }
                }
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Pass 3: limit merging
    // ------------------------------------------------------------------

    /// Collapse `Limit(outer, 0)` over `Limit(inner, x)` into
    /// `Limit(min(outer, inner), x)`. An outer offset skips rows of the
    /// inner limit's output, so those pairs stay as two stages.
    fn merge_limits(&self, node: PlanNode) -> PlanNode {
        let node = self.rewrite_child(node, |child| self.merge_limits(child));

        let PlanNode::Limit {
            child,
            count: outer_count,
            offset: 0,
        } = node
        else {
            return node;
        };

        if let PlanNode::Limit {
            child: grandchild,
            count: inner_count,
            offset: inner_offset,
        } = *child
        {
            PlanNode::Limit {
                child: grandchild,
                count: outer_count.min(inner_count),
                offset: inner_offset,
            }
        } else {
            PlanNode::Limit {
                child,
                count: outer_count,
                offset: 0,
            }
        }
    }

    /// Rebuild a node around its recursively rewritten child.
    fn rewrite_child(&self, node: PlanNode, rewrite: impl Fn(PlanNode) -> PlanNode) -> PlanNode {
        match node.child() {
            Some(child) => {
                let new_child = rewrite(child.clone());
                node.with_child(new_child)
            }
            None => node,
        }
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Legality of swapping a filter below `target`.
fn can_push_past(filter_column: Option<&ColumnRef>, target: &PlanNode) -> bool {
    match target {
        PlanNode::Parse { .. } | PlanNode::Filter { .. } => true,
        PlanNode::Select { columns, .. } => match filter_column {
            // Whole-line filters read nothing the projection can drop.
            None => true,
            Some(column) => columns.contains(column),
        },
        _ => false,
    }
}

/// True when `node` is a filter equal to the given one (child ignored).
fn filter_matches(
    node: &PlanNode,
    column: Option<&ColumnRef>,
    op: FilterOp,
    value: &FilterValue,
    case_sensitive: bool,
) -> bool {
    match node {
        PlanNode::Filter {
            column: c,
            op: o,
            value: v,
            case_sensitive: cs,
            ..
        } => c.as_ref() == column && *o == op && v == value && *cs == case_sensitive,
        _ => false,
    }
}
