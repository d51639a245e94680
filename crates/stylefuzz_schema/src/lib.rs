//! Input Schema and Schema Evolution
//!
//! # Philosophy: The Schema Learns From the Stylesheet
//!
//! Fuzz documents are generated from a versioned input schema. When a
//! stylesheet reads an element or attribute the schema does not model yet,
//! the evaluation layer proposes modifiers. This crate owns everything that
//! happens to those proposals afterwards:
//!
//! 1. **Staging**: modifiers are emitted into a [`ModifierSink`]
//! 2. **Consolidation**: [`ModifierCollector`] merges proposals from many passes
//! 3. **Rewrite**: [`SchemaModificationProcessor`] applies the consolidated set
//!    and produces the next schema version
//!
//! # Modules
//!
//! - [`schema`]: the schema model (element types, references, attributes)
//! - [`index`]: read-only lookup tables over a schema
//! - [`modifier`]: add-element / add-attribute modifier values
//! - [`collector`]: cross-pass consolidation
//! - [`processor`]: dependency-ordered rewrite into the next version

pub mod collector;
pub mod error;
pub mod index;
pub mod modifier;
pub mod processor;
pub mod schema;

pub use collector::{CollectorError, ModifierCollector};
pub use error::SchemaError;
pub use index::SchemaIndex;
pub use modifier::{
    count_modifiers, AddAttributeModifier, AddElementModifier, ModifierSink, SchemaModifier,
};
pub use processor::{ApplyReport, ProcessorError, SchemaModificationProcessor};
pub use schema::*;
