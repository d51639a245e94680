//! Evaluation Tree
//!
//! An interpreter over the compiled expression tree. Each compiled node gets
//! one evaluation node; evaluating a node against a schema position returns
//! the positions the expression navigates to and, as a side effect,
//! registers element and attribute reads with the [`ModifierCoordinator`].
//!
//! # Two-phase construction
//!
//! [`TreeFactory::create`] allocates a node in an arena and queues it; it
//! never recurses into the node's operands. [`TreeFactory::initialize_all`]
//! drains the queue, and each node's `initialize` creates (and thereby
//! queues) its own children. A node is only evaluable once initialized.
//!
//! The filter rewrite (see [`crate::rewrite`]) is applied in `create`, so
//! every filter reached while building the tree is considered, however
//! deeply nested.

mod basic;
mod binding;
mod function;
mod navigation;

use crate::coordinator::ModifierCoordinator;
use crate::error::{EvaluationError, Result};
use crate::expr::{Expr, ExprRef, NodeTest};
use crate::proxy::{ProxySet, SchemaProxy};
use crate::rewrite::rewrite_parent_filter;
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// Index of a node in its tree's arena.
pub type NodeId = usize;

/// One interpreter node.
pub(crate) trait EvalNode: fmt::Debug {
    fn label(&self) -> &'static str;

    /// Create the node's children through `factory`.
    fn initialize(&mut self, factory: &mut TreeFactory);

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet>;

    fn as_node_test(&self) -> Option<&dyn NodeTestNode> {
        None
    }
}

/// Node tests can also narrow a candidate set.
pub(crate) trait NodeTestNode {
    fn filter(
        &self,
        tree: &EvaluationTree,
        candidates: &ProxySet,
        coordinator: &ModifierCoordinator<'_>,
    ) -> Result<ProxySet>;
}

#[derive(Debug)]
struct Slot {
    node: Option<Box<dyn EvalNode>>,
    initialized: bool,
}

/// Builds evaluation trees.
#[derive(Debug, Default)]
pub struct TreeFactory {
    slots: Vec<Slot>,
    queue: VecDeque<NodeId>,
}

impl TreeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build, initialize and seal a tree for `expr`.
    pub fn build(mut self, expr: &ExprRef) -> EvaluationTree {
        let root = self.create(expr);
        self.initialize_all();
        self.finish(root)
    }

    /// Allocate the node for `expr` without building its children.
    pub fn create(&mut self, expr: &ExprRef) -> NodeId {
        let id = self.slots.len();
        let node: Box<dyn EvalNode> = match expr.as_ref() {
            Expr::Literal { .. }
            | Expr::VariableReference { .. }
            | Expr::ContextItem
            | Expr::Error { .. } => Box::new(basic::PassThrough::new(expr.kind_name())),

            Expr::Trace { operand, .. } | Expr::DocumentSorter { operand } => {
                Box::new(basic::Transparent::new(id, expr.kind_name(), operand.clone()))
            }

            Expr::CastAs { .. }
            | Expr::CastableAs { .. }
            | Expr::InstanceOf { .. }
            | Expr::TreatAs { .. }
            | Expr::Atomize { .. }
            | Expr::CardinalityCheck { .. }
            | Expr::Arithmetic { .. }
            | Expr::Boolean { .. }
            | Expr::ValueComparison { .. }
            | Expr::GeneralComparison { .. }
            | Expr::SetOperation { .. }
            | Expr::ValueOf { .. }
            | Expr::FixedElement { .. }
            | Expr::ComputedElement { .. }
            | Expr::DocumentConstructor { .. }
            | Expr::NumberInstruction { .. }
            | Expr::Sort { .. }
            | Expr::Choose { .. }
            | Expr::Block { .. } => Box::new(basic::SideEffects::new(expr.clone())),

            Expr::For {
                sequence, action, ..
            }
            | Expr::Let {
                sequence, action, ..
            }
            | Expr::Quantified {
                sequence, action, ..
            } => Box::new(binding::Binding::new(
                id,
                expr.kind_name(),
                sequence.clone(),
                action.clone(),
            )),

            Expr::AxisStep { axis, test } => {
                Box::new(navigation::Step::new(id, *axis, test.clone()))
            }
            Expr::Path { start, step } => {
                Box::new(navigation::PathNode::new(id, start.clone(), step.clone()))
            }
            Expr::Filter { base, predicate } => {
                if let Some(rewritten) = rewrite_parent_filter(base, predicate) {
                    return self.create(&rewritten);
                }
                Box::new(navigation::FilterNode::new(id, base.clone(), predicate.clone()))
            }
            Expr::Root => Box::new(navigation::RootNode),

            Expr::FunctionCall { .. } => Box::new(function::FunctionNode::new(expr.clone())),

            Expr::Unsupported { kind } => Box::new(basic::Fallback::new(kind.clone())),
        };
        self.push(node)
    }

    /// Allocate a node test node.
    pub fn create_test(&mut self, test: &NodeTest) -> NodeId {
        let node: Box<dyn EvalNode> = match test {
            NodeTest::Name { kind, name } => Box::new(node_test::NameTest::new(*kind, name.clone())),
            NodeTest::Kind { kind } => Box::new(node_test::KindTest::new(*kind)),
            NodeTest::Combined { op, left, right } => Box::new(node_test::CombinedTest::new(
                self.slots.len(),
                *op,
                (**left).clone(),
                (**right).clone(),
            )),
            NodeTest::Any => Box::new(node_test::AnyTest),
            NodeTest::Unknown { description } => {
                Box::new(node_test::UnknownTest::new(description.clone()))
            }
        };
        self.push(node)
    }

    /// Initialize queued nodes until the queue is empty.
    pub fn initialize_all(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            let Some(mut node) = self.slots[id].node.take() else {
                continue;
            };
            node.initialize(self);
            self.slots[id].node = Some(node);
            self.slots[id].initialized = true;
        }
    }

    /// Number of created-but-uninitialized nodes.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Seal the arena into a tree rooted at `root`.
    pub fn finish(self, root: NodeId) -> EvaluationTree {
        if !self.queue.is_empty() {
            debug!(
                "Sealing evaluation tree with {} uninitialized node(s)",
                self.queue.len()
            );
        }
        EvaluationTree {
            slots: self.slots,
            root,
        }
    }

    fn push(&mut self, node: Box<dyn EvalNode>) -> NodeId {
        let id = self.slots.len();
        self.slots.push(Slot {
            node: Some(node),
            initialized: false,
        });
        self.queue.push_back(id);
        id
    }
}

/// A built interpreter for one compiled expression.
#[derive(Debug)]
pub struct EvaluationTree {
    slots: Vec<Slot>,
    root: NodeId,
}

impl EvaluationTree {
    /// Evaluate the whole expression with `context` as the context item.
    pub fn evaluate(
        &self,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        self.evaluate_node(self.root, context, coordinator)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Label of every node, in creation order.
    pub fn labels(&self) -> Vec<&'static str> {
        self.slots
            .iter()
            .filter_map(|s| s.node.as_ref().map(|n| n.label()))
            .collect()
    }

    pub(crate) fn evaluate_node(
        &self,
        id: NodeId,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        self.initialized_node(id)?.evaluate(self, context, coordinator)
    }

    pub(crate) fn filter_node(
        &self,
        id: NodeId,
        candidates: &ProxySet,
        coordinator: &ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        let node = self.initialized_node(id)?;
        match node.as_node_test() {
            Some(test) => test.filter(self, candidates, coordinator),
            None => Err(EvaluationError::NotANodeTest(id, node.label())),
        }
    }

    fn initialized_node(&self, id: NodeId) -> Result<&dyn EvalNode> {
        let slot = self.slots.get(id).ok_or(EvaluationError::UnknownNode(id))?;
        match (&slot.node, slot.initialized) {
            (Some(node), true) => Ok(node.as_ref()),
            _ => Err(EvaluationError::Uninitialized(id)),
        }
    }
}

/// Single-element result set.
pub(crate) fn single(proxy: SchemaProxy) -> ProxySet {
    ProxySet::from([proxy])
}

/// Child id recorded by `initialize`, or an error if it never ran.
pub(crate) fn child(slot: Option<NodeId>, owner: NodeId) -> Result<NodeId> {
    slot.ok_or(EvaluationError::Uninitialized(owner))
}
