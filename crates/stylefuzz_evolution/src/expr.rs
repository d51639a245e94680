//! Compiled expression tree.
//!
//! The stylesheet compiler hands us its already-parsed expression tree. We
//! keep our own closed representation of it: every node kind the engine
//! knows has a variant, and [`Expr::Unsupported`] stands in for everything
//! else. Nodes are shared (`Arc`) because the same compiled sub-expression
//! is replayed by many passes on many threads.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub type ExprRef = Arc<Expr>;

/// Namespace of the standard function library.
pub const FN_NAMESPACE: &str = "http://www.w3.org/2005/xpath-functions";

/// Namespace of XSLT-specific functions.
pub const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    #[serde(rename = "self")]
    SelfAxis,
}

impl Axis {
    /// Axes the interpreter navigates; the rest select nothing.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            Axis::Attribute
                | Axis::Child
                | Axis::Descendant
                | Axis::DescendantOrSelf
                | Axis::Parent
                | Axis::SelfAxis
        )
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::SelfAxis => "self",
        };
        f.write_str(name)
    }
}

/// Structural node kinds a node test can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum NodeTest {
    /// `name` / `@name`
    Name { kind: NodeKind, name: String },
    /// `element()`, `attribute()`, `text()`, ...
    Kind { kind: NodeKind },
    /// Two tests combined by a set operator
    Combined {
        op: CombineOp,
        left: Box<NodeTest>,
        right: Box<NodeTest>,
    },
    /// `node()`
    Any,
    /// A test the compiler produced that we do not model
    Unknown { description: String },
}

impl NodeTest {
    pub fn element(name: impl Into<String>) -> Self {
        NodeTest::Name {
            kind: NodeKind::Element,
            name: name.into(),
        }
    }

    pub fn attribute(name: impl Into<String>) -> Self {
        NodeTest::Name {
            kind: NodeKind::Attribute,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Plus,
    Minus,
    Times,
    Div,
    IntegerDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    Some,
    Every,
}

/// A compiled expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    // Leaves.
    Literal {
        value: String,
    },
    VariableReference {
        name: String,
    },
    ContextItem,
    Error {
        message: String,
    },

    // Single-operand wrappers.
    CastAs {
        operand: ExprRef,
        target_type: String,
    },
    CastableAs {
        operand: ExprRef,
        target_type: String,
    },
    InstanceOf {
        operand: ExprRef,
        target_type: String,
    },
    TreatAs {
        operand: ExprRef,
        target_type: String,
    },
    Atomize {
        operand: ExprRef,
    },
    CardinalityCheck {
        operand: ExprRef,
        cardinality: String,
    },
    Trace {
        operand: ExprRef,
        label: String,
    },
    DocumentSorter {
        operand: ExprRef,
    },

    // Two independent operands.
    Arithmetic {
        op: ArithmeticOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    Boolean {
        op: BooleanOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    ValueComparison {
        op: ComparisonOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    GeneralComparison {
        op: ComparisonOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    SetOperation {
        op: CombineOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },

    // Variable binding.
    For {
        variable: String,
        sequence: ExprRef,
        action: ExprRef,
    },
    Let {
        variable: String,
        sequence: ExprRef,
        action: ExprRef,
    },
    Quantified {
        quantifier: Quantifier,
        variable: String,
        sequence: ExprRef,
        action: ExprRef,
    },

    // Navigation.
    AxisStep {
        axis: Axis,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        test: Option<NodeTest>,
    },
    Path {
        start: ExprRef,
        step: ExprRef,
    },
    Filter {
        base: ExprRef,
        predicate: ExprRef,
    },
    Root,

    // Output.
    ValueOf {
        select: ExprRef,
    },
    FixedElement {
        name: String,
        content: ExprRef,
    },
    ComputedElement {
        name: ExprRef,
        content: ExprRef,
    },
    DocumentConstructor {
        content: ExprRef,
    },
    NumberInstruction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        select: Option<ExprRef>,
    },
    Sort {
        select: ExprRef,
        #[serde(default)]
        keys: Vec<ExprRef>,
    },

    // Control flow.
    Choose {
        conditions: Vec<ExprRef>,
        actions: Vec<ExprRef>,
    },
    Block {
        children: Vec<ExprRef>,
    },

    FunctionCall {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        namespace: Option<String>,
        name: String,
        #[serde(default)]
        arguments: Vec<ExprRef>,
    },

    /// A compiler node kind this engine has no rule for
    Unsupported {
        kind: String,
    },
}

impl Expr {
    /// Short name of the node kind, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expr::Literal { .. } => "literal",
            Expr::VariableReference { .. } => "variable-reference",
            Expr::ContextItem => "context-item",
            Expr::Error { .. } => "error",
            Expr::CastAs { .. } => "cast-as",
            Expr::CastableAs { .. } => "castable-as",
            Expr::InstanceOf { .. } => "instance-of",
            Expr::TreatAs { .. } => "treat-as",
            Expr::Atomize { .. } => "atomize",
            Expr::CardinalityCheck { .. } => "cardinality-check",
            Expr::Trace { .. } => "trace",
            Expr::DocumentSorter { .. } => "document-sorter",
            Expr::Arithmetic { .. } => "arithmetic",
            Expr::Boolean { .. } => "boolean",
            Expr::ValueComparison { .. } => "value-comparison",
            Expr::GeneralComparison { .. } => "general-comparison",
            Expr::SetOperation { .. } => "set-operation",
            Expr::For { .. } => "for",
            Expr::Let { .. } => "let",
            Expr::Quantified { .. } => "quantified",
            Expr::AxisStep { .. } => "axis-step",
            Expr::Path { .. } => "path",
            Expr::Filter { .. } => "filter",
            Expr::Root => "root",
            Expr::ValueOf { .. } => "value-of",
            Expr::FixedElement { .. } => "fixed-element",
            Expr::ComputedElement { .. } => "computed-element",
            Expr::DocumentConstructor { .. } => "document-constructor",
            Expr::NumberInstruction { .. } => "number",
            Expr::Sort { .. } => "sort",
            Expr::Choose { .. } => "choose",
            Expr::Block { .. } => "block",
            Expr::FunctionCall { .. } => "function-call",
            Expr::Unsupported { .. } => "unsupported",
        }
    }

    pub fn literal(value: impl Into<String>) -> ExprRef {
        Arc::new(Expr::Literal {
            value: value.into(),
        })
    }

    pub fn root() -> ExprRef {
        Arc::new(Expr::Root)
    }

    pub fn context_item() -> ExprRef {
        Arc::new(Expr::ContextItem)
    }

    pub fn step(axis: Axis, test: Option<NodeTest>) -> ExprRef {
        Arc::new(Expr::AxisStep { axis, test })
    }

    /// `child::name`
    pub fn child(name: impl Into<String>) -> ExprRef {
        Self::step(Axis::Child, Some(NodeTest::element(name)))
    }

    /// `attribute::name`
    pub fn attribute(name: impl Into<String>) -> ExprRef {
        Self::step(Axis::Attribute, Some(NodeTest::attribute(name)))
    }

    pub fn path(start: ExprRef, step: ExprRef) -> ExprRef {
        Arc::new(Expr::Path { start, step })
    }

    /// Left-nested path over `steps`; `None` if `steps` is empty.
    pub fn path_of(steps: impl IntoIterator<Item = ExprRef>) -> Option<ExprRef> {
        steps.into_iter().reduce(Self::path)
    }

    pub fn filter(base: ExprRef, predicate: ExprRef) -> ExprRef {
        Arc::new(Expr::Filter { base, predicate })
    }

    /// Call of a standard library function.
    pub fn function(name: impl Into<String>, arguments: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::FunctionCall {
            namespace: None,
            name: name.into(),
            arguments,
        })
    }

    pub fn value_of(select: ExprRef) -> ExprRef {
        Arc::new(Expr::ValueOf { select })
    }

    pub fn compare(op: ComparisonOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Arc::new(Expr::GeneralComparison { op, lhs, rhs })
    }

    /// Whether this is a call of `fn:exists` with a single argument.
    pub fn exists_argument(&self) -> Option<&ExprRef> {
        match self {
            Expr::FunctionCall {
                namespace,
                name,
                arguments,
            } if name == "exists"
                && arguments.len() == 1
                && namespace.as_deref().map_or(true, |ns| ns == FN_NAMESPACE) =>
            {
                arguments.first()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_of_nests_left() {
        let path = Expr::path_of([Expr::root(), Expr::child("order"), Expr::attribute("id")])
            .unwrap();
        match path.as_ref() {
            Expr::Path { start, step } => {
                assert_eq!(step, &Expr::attribute("id"));
                assert!(matches!(start.as_ref(), Expr::Path { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Expr::path_of(Vec::new()).is_none());
    }

    #[test]
    fn test_exists_argument() {
        let step = Expr::child("a");
        let call = Expr::function("exists", vec![step.clone()]);
        assert_eq!(call.exists_argument(), Some(&step));

        let other_ns = Expr::FunctionCall {
            namespace: Some("urn:custom".into()),
            name: "exists".into(),
            arguments: vec![step.clone()],
        };
        assert!(other_ns.exists_argument().is_none());
        assert!(Expr::function("empty", vec![step]).exists_argument().is_none());
    }

    #[test]
    fn test_json_shape() {
        let expr = Expr::path(Expr::root(), Expr::child("order"));
        let json = serde_json::to_value(expr.as_ref()).unwrap();
        assert_eq!(json["node"], "path");
        assert_eq!(json["start"]["node"], "root");
        assert_eq!(json["step"]["axis"], "child");
        assert_eq!(json["step"]["test"]["test"], "name");

        let parsed: Expr = serde_json::from_value(json).unwrap();
        assert_eq!(&parsed, expr.as_ref());
    }

    #[test]
    fn test_axis_display() {
        assert_eq!(Axis::DescendantOrSelf.to_string(), "descendant-or-self");
        assert_eq!(Axis::SelfAxis.to_string(), "self");
    }
}
