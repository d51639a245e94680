//! Access-trace preprocessing.
//!
//! Running a generated document through the instrumented stylesheet yields
//! an [`AccessTrace`]: the compiled sub-expressions that fired, each tagged
//! with the trace id the generator stamped on the active node. The
//! [`GenerationRequest`] that produced the document maps trace ids to
//! generation rules, and rules to schema positions.
//!
//! [`PreparedPass::prepare`] resolves every event to its schema position and
//! groups the distinct expressions per position. Events whose chain cannot
//! be resolved are counted and logged, never fatal.

use crate::expr::ExprRef;
use crate::proxy::SchemaProxy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use stylefuzz_ids::{ElementReferenceId, RuleId, TraceId};
use stylefuzz_schema::SchemaIndex;
use tracing::{debug, warn};

/// One reached compiled sub-expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Trace id of the active node; `None` at the document root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    pub expression: ExprRef,
}

/// Ordered events recorded while transforming one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessTrace {
    #[serde(default)]
    pub events: Vec<TraceEvent>,
}

impl AccessTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, trace_id: Option<TraceId>, expression: ExprRef) -> Self {
        self.events.push(TraceEvent {
            trace_id,
            expression,
        });
        self
    }
}

/// Schema object a generation rule produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum RuleTarget {
    Document,
    Element { reference: ElementReferenceId },
}

/// The document-generation request behind a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub schema_uri: String,
    pub schema_version: u32,
    #[serde(default)]
    pub traces: BTreeMap<TraceId, RuleId>,
    #[serde(default)]
    pub rules: BTreeMap<RuleId, RuleTarget>,
}

impl GenerationRequest {
    pub fn new(schema_uri: impl Into<String>, schema_version: u32) -> Self {
        Self {
            schema_uri: schema_uri.into(),
            schema_version,
            traces: BTreeMap::new(),
            rules: BTreeMap::new(),
        }
    }

    /// Register a rule producing `target` and a trace id stamped by it.
    pub fn with_rule(mut self, trace_id: TraceId, target: RuleTarget) -> Self {
        let rule_id = RuleId::new();
        self.traces.insert(trace_id, rule_id.clone());
        self.rules.insert(rule_id, target);
        self
    }
}

/// A generation request plus the trace it produced, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedPass {
    pub request: GenerationRequest,
    pub trace: AccessTrace,
}

/// Expressions to replay from one schema position.
#[derive(Debug, Clone, PartialEq)]
pub struct PassGroup {
    pub position: SchemaProxy,
    pub expressions: Vec<ExprRef>,
}

/// Everything one pass evaluates, grouped by schema position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreparedPass {
    /// Groups in order of first appearance
    pub groups: Vec<PassGroup>,
    /// Events dropped because their position could not be resolved
    pub discarded: usize,
}

impl PreparedPass {
    pub fn prepare(
        index: &SchemaIndex<'_>,
        request: &GenerationRequest,
        trace: &AccessTrace,
    ) -> Self {
        let schema = index.schema();
        if request.schema_uri != schema.uri || request.schema_version != schema.version {
            warn!(
                "Trace was generated for {} v{} but is replayed against {} v{}",
                request.schema_uri, request.schema_version, schema.uri, schema.version
            );
        }

        let mut prepared = PreparedPass::default();
        let mut group_of: HashMap<SchemaProxy, usize> = HashMap::new();
        let mut seen: Vec<HashSet<ExprRef>> = Vec::new();

        for event in &trace.events {
            let Some(position) = resolve(index, request, event.trace_id.as_ref()) else {
                prepared.discarded += 1;
                continue;
            };
            let slot = *group_of.entry(position.clone()).or_insert_with(|| {
                prepared.groups.push(PassGroup {
                    position,
                    expressions: Vec::new(),
                });
                seen.push(HashSet::new());
                prepared.groups.len() - 1
            });
            if seen[slot].insert(event.expression.clone()) {
                prepared.groups[slot]
                    .expressions
                    .push(event.expression.clone());
            }
        }

        if prepared.discarded > 0 {
            warn!(
                "Discarded {} of {} trace event(s) with no resolvable schema position",
                prepared.discarded,
                trace.events.len()
            );
        }
        debug!(
            "Prepared {} expression(s) at {} position(s)",
            prepared.expression_count(),
            prepared.groups.len()
        );
        prepared
    }

    pub fn expression_count(&self) -> usize {
        self.groups.iter().map(|g| g.expressions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl RecordedPass {
    pub fn prepare(&self, index: &SchemaIndex<'_>) -> PreparedPass {
        PreparedPass::prepare(index, &self.request, &self.trace)
    }
}

/// trace id -> rule id -> schema position
fn resolve(
    index: &SchemaIndex<'_>,
    request: &GenerationRequest,
    trace_id: Option<&TraceId>,
) -> Option<SchemaProxy> {
    let Some(trace_id) = trace_id else {
        return Some(SchemaProxy::Document);
    };
    let Some(rule_id) = request.traces.get(trace_id) else {
        debug!("Trace id {} has no generation rule", trace_id.short());
        return None;
    };
    match request.rules.get(rule_id) {
        Some(RuleTarget::Document) => Some(SchemaProxy::Document),
        Some(RuleTarget::Element { reference }) => match index.reference(reference) {
            Some(found) => Some(SchemaProxy::element(found)),
            None => {
                debug!(
                    "Rule {} targets unknown element reference {}",
                    rule_id.short(),
                    reference.short()
                );
                None
            }
        },
        None => {
            debug!("Rule {} is not part of the request", rule_id.short());
            None
        }
    }
}
