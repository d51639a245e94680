//! Evaluation passes.
//!
//! A pass is the replay of one document's trace. Each pass owns a
//! [`ModifierCoordinator`] and is evaluated on one thread, start to finish.
//! Passes are independent of each other, so [`analyze_passes`] spreads them
//! over scoped worker threads that all feed one shared
//! [`ModifierCollector`].

use crate::coordinator::ModifierCoordinator;
use crate::error::EvaluationError;
use crate::preprocess::PreparedPass;
use crate::tree::TreeFactory;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use stylefuzz_schema::{
    ApplyReport, CollectorError, ModifierCollector, ModifierSink, ProcessorError,
    SchemaModificationProcessor, SchemaModifier, XmlSchema,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PassError {
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Collector rejected modifier: {0}")]
    Collector(#[from] CollectorError),

    #[error("Schema rewrite failed: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Pass worker thread panicked")]
    WorkerPanicked,
}

/// Counters for one pass, or the sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub passes: usize,
    pub expressions: usize,
    pub accesses: usize,
    /// Modifiers handed to the sink, nested ones included
    pub modifiers: usize,
    pub discarded: usize,
}

impl AddAssign for PassReport {
    fn add_assign(&mut self, other: Self) {
        self.passes += other.passes;
        self.expressions += other.expressions;
        self.accesses += other.accesses;
        self.modifiers += other.modifiers;
        self.discarded += other.discarded;
    }
}

/// Replay one pass against `schema` and flush what it staged into `sink`.
pub fn analyze_pass(
    schema: &XmlSchema,
    pass: &PreparedPass,
    sink: &mut dyn ModifierSink,
) -> Result<PassReport, PassError> {
    let mut coordinator = ModifierCoordinator::new(schema);
    let mut report = PassReport {
        passes: 1,
        discarded: pass.discarded,
        ..PassReport::default()
    };

    for group in &pass.groups {
        for expression in &group.expressions {
            let tree = TreeFactory::new().build(expression);
            let reached = tree.evaluate(&group.position, &mut coordinator)?;
            debug!(
                "{} from {} reached {} position(s)",
                expression.kind_name(),
                group.position,
                reached.len()
            );
            report.expressions += 1;
        }
    }

    report.accesses = coordinator.accesses().len();
    report.modifiers = coordinator.flush(sink)?;
    debug!(
        "Pass evaluated {} expression(s), {} access(es), {} modifier(s)",
        report.expressions, report.accesses, report.modifiers
    );
    Ok(report)
}

/// Replay `passes` on up to `workers` threads, consolidating into `collector`.
pub fn analyze_passes(
    schema: &XmlSchema,
    passes: &[PreparedPass],
    collector: &ModifierCollector,
    workers: usize,
) -> Result<PassReport, PassError> {
    let workers = workers.clamp(1, passes.len().max(1));
    let next = AtomicUsize::new(0);
    let total = Mutex::new(PassReport::default());

    info!(
        "Analyzing {} pass(es) on {} worker(s)",
        passes.len(),
        workers
    );

    std::thread::scope(|scope| -> Result<(), PassError> {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(|| -> Result<(), PassError> {
                let mut sink = collector;
                let mut local = PassReport::default();
                loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    let Some(pass) = passes.get(i) else {
                        break;
                    };
                    local += analyze_pass(schema, pass, &mut sink)?;
                }
                let mut total = total
                    .lock()
                    .map_err(|_| PassError::Collector(CollectorError::Poisoned))?;
                *total += local;
                Ok(())
            }));
        }

        for handle in handles {
            handle.join().map_err(|_| PassError::WorkerPanicked)??;
        }
        Ok(())
    })?;

    let report = total
        .into_inner()
        .map_err(|_| PassError::Collector(CollectorError::Poisoned))?;
    info!(
        "Analyzed {} pass(es): {} expression(s), {} access(es), {} modifier(s), {} discarded event(s)",
        report.passes, report.expressions, report.accesses, report.modifiers, report.discarded
    );
    Ok(report)
}

/// Result of one evolution round.
#[derive(Debug, Clone)]
pub struct Evolution {
    pub schema: XmlSchema,
    pub modifiers: Vec<SchemaModifier>,
    pub passes: PassReport,
    pub applied: ApplyReport,
}

/// Analyze every pass, consolidate, and apply to build the next version.
pub fn evolve(
    schema: &XmlSchema,
    passes: &[PreparedPass],
    workers: usize,
) -> Result<Evolution, PassError> {
    let collector = ModifierCollector::new();
    let report = analyze_passes(schema, passes, &collector, workers)?;
    let modifiers = collector.get_consolidated_modifiers()?;
    let (next, applied) = SchemaModificationProcessor::apply_with_report(schema, &modifiers)?;
    Ok(Evolution {
        schema: next,
        modifiers,
        passes: report,
        applied,
    })
}
