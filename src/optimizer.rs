use std::fmt::Debug;

use crate::graph::Graph;
use crate::ids::SinkId;

/// Rewrites a pipeline — a graph together with its chosen sink — before a
/// [`Pipeline`](crate::pipeline::Pipeline) executes it, returning an
/// equivalent pipeline. Because a full `(Graph, SinkId)` pair is returned, an
/// implementation is free to retarget evaluation at a brand new sink it adds
/// to the rewritten graph rather than reusing the input sink id; it is not
/// required to preserve the id, only the pipeline's observable behavior.
///
/// A pipeline calls `execute` at most once per distinct optimizer identity
/// and reuses the rewritten pipeline (and its own fit/data caches) for every
/// later call made with that same optimizer; see
/// [`Pipeline::apply_dataset`](crate::pipeline::Pipeline::apply_dataset).
pub trait Optimizer: Debug + Send + Sync {
    fn execute(&self, graph: &Graph, sink: SinkId) -> (Graph, SinkId);
}

/// The identity rewrite: returns the input pipeline unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultOptimizer;

impl Optimizer for DefaultOptimizer {
    fn execute(&self, graph: &Graph, sink: SinkId) -> (Graph, SinkId) {
        (graph.clone(), sink)
    }
}
