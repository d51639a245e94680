//! Identifier wrappers for Stylefuzz.
//!
//! Every schema object (element type, element reference, attribute,
//! function, parameter) and every staged modifier is keyed by a UUID.
//! The wrappers keep those keys apart at the type level so an element
//! type id can never be handed to something expecting a reference id.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A string that is not a UUID, tagged with the kind of id expected.
#[derive(Debug, Error)]
#[error("Invalid {kind}: {source}")]
pub struct IdParseError {
    kind: &'static str,
    #[source]
    source: uuid::Error,
}

macro_rules! define_uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(value: &str) -> Result<Self, IdParseError> {
                Uuid::parse_str(value)
                    .map(Self)
                    .map_err(|source| IdParseError { kind: $kind, source })
            }

            /// First eight hex digits, for log lines and generated comments.
            pub fn short(&self) -> String {
                format!("{:08x}", self.0.as_fields().0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_uuid_id!(
    /// Identity of an element type (the content model shared by references).
    ElementTypeId,
    "element type ID"
);
define_uuid_id!(
    /// Identity of a named element reference pointing at an element type.
    ElementReferenceId,
    "element reference ID"
);
define_uuid_id!(AttributeId, "attribute ID");
define_uuid_id!(FunctionId, "function ID");
define_uuid_id!(ParameterId, "parameter ID");
define_uuid_id!(
    /// Identity of a staged schema modifier.
    ModifierId,
    "modifier ID"
);
define_uuid_id!(TraceId, "trace ID");
define_uuid_id!(RuleId, "rule ID");
