//! Parent-filter rewrite.
//!
//! `descendant::B[parent::A]` selects every `B` whose parent is an `A`.
//! Evaluated left to right it stages `B` below the context and then asks
//! for the parent of a pending element, which reveals nothing. The
//! equivalent path `descendant::A/child::B` visits the parent first, so the
//! interpreter stages `B` inside `A`.
//!
//! Either side may be wrapped in `exists(...)`; the wrapper is carried over
//! onto the `child::B` step of the rewritten path.

use crate::expr::{Axis, Expr, ExprRef, NodeTest};
use std::sync::Arc;
use tracing::debug;

/// Rewrite a filter into a parent-first path if it has the eligible shape.
///
/// Returns `None` when the filter does not match and must be built as is.
pub fn rewrite_parent_filter(base: &ExprRef, predicate: &ExprRef) -> Option<ExprRef> {
    let (base_step, base_wrapped) = unwrap_exists(base);
    let (predicate_step, predicate_wrapped) = unwrap_exists(predicate);

    let (descendant_axis, child_test) = match base_step.as_ref() {
        Expr::AxisStep {
            axis: axis @ (Axis::Descendant | Axis::DescendantOrSelf),
            test,
        } => (*axis, test.clone()),
        _ => return None,
    };
    let parent_test: Option<NodeTest> = match predicate_step.as_ref() {
        Expr::AxisStep {
            axis: Axis::Parent,
            test,
        } => test.clone(),
        _ => return None,
    };

    let start = Expr::step(descendant_axis, parent_test);
    let mut step = Expr::step(Axis::Child, child_test);
    if base_wrapped || predicate_wrapped {
        step = Expr::function("exists", vec![step]);
    }

    debug!(
        "Rewriting {}::B[parent::A] into {}::A/child::B",
        descendant_axis, descendant_axis
    );
    Some(Arc::new(Expr::Path { start, step }))
}

fn unwrap_exists(expr: &ExprRef) -> (&ExprRef, bool) {
    match expr.exists_argument() {
        Some(inner) => (inner, true),
        None => (expr, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descendant(name: &str) -> ExprRef {
        Expr::step(Axis::Descendant, Some(NodeTest::element(name)))
    }

    fn parent(name: &str) -> ExprRef {
        Expr::step(Axis::Parent, Some(NodeTest::element(name)))
    }

    #[test]
    fn test_plain_filter_is_rewritten() {
        let rewritten = rewrite_parent_filter(&descendant("item"), &parent("list")).unwrap();
        let expected = Expr::path(descendant("list"), Expr::child("item"));
        assert_eq!(rewritten, expected);
    }

    #[test]
    fn test_exists_wrapper_moves_to_child_step() {
        let predicate = Expr::function("exists", vec![parent("list")]);
        let rewritten = rewrite_parent_filter(&descendant("item"), &predicate).unwrap();
        let expected = Expr::path(
            descendant("list"),
            Expr::function("exists", vec![Expr::child("item")]),
        );
        assert_eq!(rewritten, expected);

        let base = Expr::function("exists", vec![descendant("item")]);
        assert_eq!(rewrite_parent_filter(&base, &parent("list")), Some(expected));
    }

    #[test]
    fn test_descendant_or_self_axis_is_kept() {
        let base = Expr::step(Axis::DescendantOrSelf, Some(NodeTest::element("item")));
        let rewritten = rewrite_parent_filter(&base, &parent("list")).unwrap();
        match rewritten.as_ref() {
            Expr::Path { start, .. } => assert_eq!(
                start,
                &Expr::step(Axis::DescendantOrSelf, Some(NodeTest::element("list")))
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other_shapes_are_left_alone() {
        assert!(rewrite_parent_filter(&Expr::child("item"), &parent("list")).is_none());
        assert!(rewrite_parent_filter(&descendant("item"), &Expr::child("list")).is_none());
        assert!(rewrite_parent_filter(&descendant("item"), &Expr::literal("1")).is_none());
    }
}
