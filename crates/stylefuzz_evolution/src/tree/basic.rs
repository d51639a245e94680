//! Nodes that never navigate.
//!
//! Operators, casts, output instructions and control flow only reveal the
//! accesses nested in their operands. Every operand is evaluated against
//! the same context, whichever branch would run, and the context is
//! returned unchanged.

use super::{child, single, EvalNode, EvaluationTree, NodeId, TreeFactory};
use crate::coordinator::ModifierCoordinator;
use crate::error::Result;
use crate::expr::{Expr, ExprRef};
use crate::proxy::{ProxySet, SchemaProxy};
use tracing::warn;

/// Literals, variable and context-item references, error nodes.
#[derive(Debug)]
pub(crate) struct PassThrough {
    label: &'static str,
}

impl PassThrough {
    pub(crate) fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl EvalNode for PassThrough {
    fn label(&self) -> &'static str {
        self.label
    }

    fn initialize(&mut self, _factory: &mut TreeFactory) {}

    fn evaluate(
        &self,
        _tree: &EvaluationTree,
        context: &SchemaProxy,
        _coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        Ok(single(context.clone()))
    }
}

/// Wrapper whose result is exactly its operand's result (trace, document
/// order sorting).
#[derive(Debug)]
pub(crate) struct Transparent {
    id: NodeId,
    label: &'static str,
    operand_expr: ExprRef,
    operand: Option<NodeId>,
}

impl Transparent {
    pub(crate) fn new(id: NodeId, label: &'static str, operand_expr: ExprRef) -> Self {
        Self {
            id,
            label,
            operand_expr,
            operand: None,
        }
    }
}

impl EvalNode for Transparent {
    fn label(&self) -> &'static str {
        self.label
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        self.operand = Some(factory.create(&self.operand_expr));
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        tree.evaluate_node(child(self.operand, self.id)?, context, coordinator)
    }
}

/// Any node evaluated for the side effects of its operands.
#[derive(Debug)]
pub(crate) struct SideEffects {
    expr: ExprRef,
    operands: Vec<NodeId>,
}

impl SideEffects {
    pub(crate) fn new(expr: ExprRef) -> Self {
        Self {
            expr,
            operands: Vec::new(),
        }
    }
}

impl EvalNode for SideEffects {
    fn label(&self) -> &'static str {
        self.expr.kind_name()
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        self.operands = operands(&self.expr)
            .into_iter()
            .map(|operand| factory.create(operand))
            .collect();
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        for operand in &self.operands {
            tree.evaluate_node(*operand, context, coordinator)?;
        }
        Ok(single(context.clone()))
    }
}

/// Operands of a node that is evaluated only for side effects.
fn operands(expr: &Expr) -> Vec<&ExprRef> {
    match expr {
        Expr::CastAs { operand, .. }
        | Expr::CastableAs { operand, .. }
        | Expr::InstanceOf { operand, .. }
        | Expr::TreatAs { operand, .. }
        | Expr::Atomize { operand }
        | Expr::CardinalityCheck { operand, .. } => vec![operand],

        Expr::Arithmetic { lhs, rhs, .. }
        | Expr::Boolean { lhs, rhs, .. }
        | Expr::ValueComparison { lhs, rhs, .. }
        | Expr::GeneralComparison { lhs, rhs, .. }
        | Expr::SetOperation { lhs, rhs, .. } => vec![lhs, rhs],

        Expr::ValueOf { select } => vec![select],
        Expr::FixedElement { content, .. } | Expr::DocumentConstructor { content } => {
            vec![content]
        }
        Expr::ComputedElement { name, content } => vec![name, content],
        Expr::NumberInstruction { select } => select.iter().collect(),
        Expr::Sort { select, keys } => std::iter::once(select).chain(keys).collect(),

        Expr::Choose {
            conditions,
            actions,
        } => conditions.iter().chain(actions).collect(),
        Expr::Block { children } => children.iter().collect(),

        _ => Vec::new(),
    }
}

/// Compiled node kind with no rule of its own.
#[derive(Debug)]
pub(crate) struct Fallback {
    kind: String,
}

impl Fallback {
    pub(crate) fn new(kind: String) -> Self {
        Self { kind }
    }
}

impl EvalNode for Fallback {
    fn label(&self) -> &'static str {
        "unsupported"
    }

    fn initialize(&mut self, _factory: &mut TreeFactory) {
        warn!(
            "Unsupported expression kind '{}', passing context through",
            self.kind
        );
    }

    fn evaluate(
        &self,
        _tree: &EvaluationTree,
        context: &SchemaProxy,
        _coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        Ok(single(context.clone()))
    }
}
