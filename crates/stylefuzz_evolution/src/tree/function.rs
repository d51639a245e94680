//! Function calls.
//!
//! Arguments are evaluated for their side effects and the context is
//! returned. `current()` names the context itself, so it registers the
//! context again. Unrecognized functions are logged once, when the tree is
//! built, and treated like any other function.

use super::{single, EvalNode, EvaluationTree, NodeId, TreeFactory};
use crate::coordinator::ModifierCoordinator;
use crate::error::Result;
use crate::expr::{Expr, ExprRef, FN_NAMESPACE, XSL_NAMESPACE};
use crate::proxy::{ProxySet, SchemaProxy};
use tracing::warn;

/// Standard library functions with no schema effect beyond their arguments.
const STANDARD_FUNCTIONS: &[&str] = &[
    "abs", "adjust-date-to-timezone", "adjust-dateTime-to-timezone", "adjust-time-to-timezone",
    "avg", "base-uri", "boolean", "ceiling", "codepoint-equal", "codepoints-to-string", "collection",
    "compare", "concat", "contains", "count", "current-date", "current-dateTime", "current-time",
    "data", "day-from-date", "day-from-dateTime", "days-from-duration", "deep-equal",
    "default-collation", "distinct-values", "doc", "doc-available", "document-uri", "empty",
    "ends-with", "error", "escape-html-uri", "exactly-one", "exists", "false", "floor",
    "hours-from-dateTime", "hours-from-duration", "hours-from-time", "id", "idref",
    "implicit-timezone", "in-scope-prefixes", "index-of", "insert-before", "iri-to-uri", "lang",
    "last", "local-name", "local-name-from-QName", "lower-case", "matches", "max", "min",
    "minutes-from-dateTime", "minutes-from-duration", "minutes-from-time", "month-from-date",
    "month-from-dateTime", "months-from-duration", "name", "namespace-uri",
    "namespace-uri-for-prefix", "namespace-uri-from-QName", "nilled", "node-name",
    "normalize-space", "normalize-unicode", "not", "number", "one-or-more", "position",
    "prefix-from-QName", "QName", "remove", "replace", "resolve-QName", "resolve-uri", "reverse",
    "root", "round", "round-half-to-even", "seconds-from-dateTime", "seconds-from-duration",
    "seconds-from-time", "starts-with", "static-base-uri", "string", "string-join",
    "string-length", "string-to-codepoints", "subsequence", "substring", "substring-after",
    "substring-before", "sum", "timezone-from-date", "timezone-from-dateTime",
    "timezone-from-time", "tokenize", "trace", "translate", "true", "unordered", "upper-case",
    "year-from-date", "year-from-dateTime", "years-from-duration", "zero-or-one",
];

/// XSLT functions with no schema effect beyond their arguments.
const XSL_FUNCTIONS: &[&str] = &[
    "current-group", "current-grouping-key", "document", "element-available",
    "format-date", "format-dateTime", "format-number", "format-time", "function-available",
    "generate-id", "key", "regex-group", "system-property", "type-available",
    "unparsed-entity-public-id", "unparsed-entity-uri", "unparsed-text",
    "unparsed-text-available",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Known {
    Current,
    SideEffectsOnly,
    Unrecognized,
}

fn classify(namespace: Option<&str>, name: &str) -> Known {
    let builtin = matches!(namespace, None | Some(FN_NAMESPACE) | Some(XSL_NAMESPACE));
    if !builtin {
        return Known::Unrecognized;
    }
    if name == "current" {
        Known::Current
    } else if STANDARD_FUNCTIONS.contains(&name) || XSL_FUNCTIONS.contains(&name) {
        Known::SideEffectsOnly
    } else {
        Known::Unrecognized
    }
}

#[derive(Debug)]
pub(crate) struct FunctionNode {
    expr: ExprRef,
    known: Known,
    arguments: Vec<NodeId>,
}

impl FunctionNode {
    pub(crate) fn new(expr: ExprRef) -> Self {
        let known = match expr.as_ref() {
            Expr::FunctionCall {
                namespace, name, ..
            } => classify(namespace.as_deref(), name),
            _ => Known::Unrecognized,
        };
        Self {
            expr,
            known,
            arguments: Vec::new(),
        }
    }
}

impl EvalNode for FunctionNode {
    fn label(&self) -> &'static str {
        "function-call"
    }

    fn initialize(&mut self, factory: &mut TreeFactory) {
        let Expr::FunctionCall {
            namespace,
            name,
            arguments,
        } = self.expr.as_ref()
        else {
            return;
        };
        if self.known == Known::Unrecognized {
            warn!(
                "Unrecognized function {}{}(), evaluating arguments only",
                namespace
                    .as_deref()
                    .map(|ns| format!("{{{}}}", ns))
                    .unwrap_or_default(),
                name
            );
        }
        self.arguments = arguments.iter().map(|a| factory.create(a)).collect();
    }

    fn evaluate(
        &self,
        tree: &EvaluationTree,
        context: &SchemaProxy,
        coordinator: &mut ModifierCoordinator<'_>,
    ) -> Result<ProxySet> {
        for argument in &self.arguments {
            tree.evaluate_node(*argument, context, coordinator)?;
        }
        if self.known == Known::Current {
            coordinator.register_current(context)?;
        }
        Ok(single(context.clone()))
    }
}
