//! `for`, `let` and quantified expressions.
//!
//! The bound sequence is evaluated against the context; the action is then
//! analyzed once per distinct position the variable can take.

use super::{child, EvalNode, EvaluationTree, NodeId, TreeFactory};
use crate::coordinator::ModifierCoordinator;
use crate::error::Result;
use crate::expr::ExprRef;
use crate::proxy::{ProxySet, SchemaProxy};

#[derive(Debug)]
pub(crate) struct Binding {
    id: NodeId,
    label: &'static str,
    sequence_expr: ExprRef,
    action_expr: ExprRef,
    sequence: Option<NodeId>,
    action: Option<NodeId>,
}

impl Binding {
    pub(crate) fn new(
        id: NodeId,
        label: &'static str,
        sequence_expr: ExprRef,
        action_expr: ExprRef,
    ) -> Self {
        Self {
            id,
            label,
            sequence_expr,
            action_expr,
            sequence: None,
            action: None,
        }
    }
}

impl EvalNode for Binding {
    fn label(&self) -> &'static str {
        self.label
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        self.sequence = Some(factory.create(&self.sequence_expr));
        self.action = Some(factory.create(&self.action_expr));
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        let action = child(self.action, self.id)?;
        let bound = tree.evaluate_node(child(self.sequence, self.id)?, context, coordinator)?;

        let mut result = ProxySet::new();
        for item in &bound {
            result.extend(tree.evaluate_node(action, item, coordinator)?);
        }
        Ok(result)
    }
}
