//! Schema Evolution Engine
//!
//! # Philosophy: Learn the Schema From What the Stylesheet Reads
//!
//! A fuzz document exercises only the elements and attributes the schema
//! already models. When the stylesheet reads something the schema lacks, the
//! recorded access trace tells us *which compiled sub-expression* fired and
//! *where in the schema* we were. This crate replays that sub-expression
//! against the schema position and proposes the missing pieces.
//!
//! The replay is an over-approximation: every operand of a branching
//! construct is visited, whichever branch ran.
//!
//! # Pipeline
//!
//! 1. [`preprocess`]: group recorded expressions by schema position
//! 2. [`tree`]: build one evaluation tree per distinct expression
//! 3. [`coordinator`]: evaluation registers accesses, staging modifiers
//! 4. [`pass`]: flush each pass into a sink / the shared collector, then
//!    apply the consolidated set to build the next schema version
//!
//! # Modules
//!
//! - [`expr`]: compiled expression tree (owned tagged union)
//! - [`rewrite`]: `descendant::B[parent::A]` to `descendant::A/child::B`
//! - [`proxy`]: uniform handle over existing and pending schema positions
//! - [`coordinator`]: per-pass modifier staging
//! - [`tree`]: the interpreter

pub mod coordinator;
pub mod error;
pub mod expr;
pub mod pass;
pub mod preprocess;
pub mod proxy;
pub mod rewrite;
pub mod tree;

pub use coordinator::{AccessKind, AccessRecord, ModifierCoordinator};
pub use error::{EvaluationError, Result};
pub use expr::{Axis, Expr, ExprRef, NodeKind, NodeTest};
pub use pass::{analyze_pass, analyze_passes, evolve, Evolution, PassError, PassReport};
pub use preprocess::{
    AccessTrace, GenerationRequest, PassGroup, PreparedPass, RecordedPass, RuleTarget, TraceEvent,
};
pub use proxy::{PendingAttributeId, PendingElementId, ProxySet, SchemaProxy};
pub use tree::{EvaluationTree, NodeId, TreeFactory};
