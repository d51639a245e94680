//! Axis steps, paths, filters and the document root.

use super::{child, single, EvalNode, EvaluationTree, NodeId, TreeFactory};
use crate::coordinator::ModifierCoordinator;
use crate::error::Result;
use crate::expr::{Axis, ExprRef, NodeTest};
use crate::proxy::{ProxySet, SchemaProxy};
use tracing::warn;

/// `axis::test`
///
/// On every supported axis the node test is first evaluated against the
/// context, which registers the access, and then narrows the candidates.
/// Registration happens before candidates are selected, so a freshly staged
/// child is among them.
///
/// Nothing is registered below an attribute, nor attributes on the
/// document root. Unsupported axes register nothing and select nothing.
#[derive(Debug)]
pub(crate) struct Step {
    id: NodeId,
    axis: Axis,
    test_spec: Option<NodeTest>,
    test: Option<NodeId>,
}

impl Step {
    pub(crate) fn new(id: NodeId, axis: Axis, test_spec: Option<NodeTest>) -> Self {
        Self {
            id,
            axis,
            test_spec,
            test: None,
        }
    }

    fn test_node(&self) -> Result<Option<NodeId>> {
        match &self.test_spec {
            None => Ok(None),
            Some(_) => child(self.test, self.id).map(Some),
        }
    }

    fn can_register(&self, context: &SchemaProxy) -> bool {
        match self.axis {
            Axis::Attribute => context.is_element_like(),
            _ => !context.is_attribute_like(),
        }
    }

    fn candidates(
        &self,
        context: &SchemaProxy,
        coordinator: &ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        Ok(match self.axis {
            Axis::Child => context.sub_elements(coordinator)?.into_iter().collect(),
            Axis::Attribute => context.sub_attributes(coordinator)?.into_iter().collect(),
            Axis::Descendant => context.descendants(coordinator)?.into_iter().collect(),
            Axis::DescendantOrSelf => {
                let mut all: ProxySet = context.descendants(coordinator)?.into_iter().collect();
                all.insert(context.clone());
                all
            }
            Axis::SelfAxis => single(context.clone()),
            Axis::Parent => context.parents(coordinator)?.into_iter().collect(),
            Axis::Ancestor
            | Axis::AncestorOrSelf
            | Axis::Following
            | Axis::FollowingSibling
            | Axis::Namespace
            | Axis::Preceding
            | Axis::PrecedingSibling => {
                warn!("Unsupported axis '{}', selecting nothing", self.axis);
                ProxySet::new()
            }
        })
    }

    fn narrow(
        &self,
        tree: &EvaluationTree,
        test: Option<NodeId>,
        candidates: ProxySet,
        coordinator: &ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        match test {
            Some(test) => tree.filter_node(test, &candidates, coordinator),
            None => Ok(candidates),
        }
    }
}

impl EvalNode for Step {
    fn label(&self) -> &'static str {
        "axis-step"
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        if let Some(spec) = &self.test_spec {
            self.test = Some(factory.create_test(spec));
        }
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        let test = self.test_node()?;
        if let Some(test_id) = test {
            if self.axis.is_supported() && self.can_register(context) {
                tree.evaluate_node(test_id, context, coordinator)?;
            }
        }
        let candidates = self.candidates(context, coordinator)?;
        self.narrow(tree, test, candidates, coordinator)
    }
}

/// `start/step`
#[derive(Debug)]
pub(crate) struct PathNode {
    id: NodeId,
    start_expr: ExprRef,
    step_expr: ExprRef,
    start: Option<NodeId>,
    step: Option<NodeId>,
}

impl PathNode {
    pub(crate) fn new(id: NodeId, start_expr: ExprRef, step_expr: ExprRef) -> Self {
        Self {
            id,
            start_expr,
            step_expr,
            start: None,
            step: None,
        }
    }
}

impl EvalNode for PathNode {
    fn label(&self) -> &'static str {
        "path"
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        self.start = Some(factory.create(&self.start_expr));
        self.step = Some(factory.create(&self.step_expr));
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        let step = child(self.step, self.id)?;
        let reached = tree.evaluate_node(child(self.start, self.id)?, context, coordinator)?;

        let mut result = ProxySet::new();
        for item in &reached {
            result.extend(tree.evaluate_node(step, item, coordinator)?);
        }
        Ok(result)
    }
}

/// `base[predicate]`
///
/// The predicate is evaluated with every base position as context; the
/// result is the union of the predicate results.
#[derive(Debug)]
pub(crate) struct FilterNode {
    id: NodeId,
    base_expr: ExprRef,
    predicate_expr: ExprRef,
    base: Option<NodeId>,
    predicate: Option<NodeId>,
}

impl FilterNode {
    pub(crate) fn new(id: NodeId, base_expr: ExprRef, predicate_expr: ExprRef) -> Self {
        Self {
            id,
            base_expr,
            predicate_expr,
            base: None,
            predicate: None,
        }
    }
}

impl EvalNode for FilterNode {
    fn label(&self) -> &'static str {
        "filter"
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        self.base = Some(factory.create(&self.base_expr));
        self.predicate = Some(factory.create(&self.predicate_expr));
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        let predicate = child(self.predicate, self.id)?;
        let selected = tree.evaluate_node(child(self.base, self.id)?, context, coordinator)?;

        let mut result = ProxySet::new();
        for item in &selected {
            result.extend(tree.evaluate_node(predicate, item, coordinator)?);
        }
        Ok(result)
    }
}

/// `/`: restarts from the document root whatever the context.
#[derive(Debug)]
pub(crate) struct RootNode;

impl EvalNode for RootNode {
    fn label(&self) -> &'static str {
        "root"
    }

    fn initialize(&mut self, _factory: &mut TreeFactory) {}

    fn evaluate(
        &self,
        _tree: &EvaluationTree,
        _context: &SchemaProxy,
        _coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        Ok(single(SchemaProxy::Document))
    }
}
