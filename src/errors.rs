use std::error::Error as StdError;

use thiserror::Error;

use crate::ids::{DependencyRef, NodeId, SinkId, SourceId};

/// An operator's own error, boxed so the core never has to know operator
/// implementors' concrete error types.
pub type OperatorError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised by [`Graph`](crate::graph::Graph) constructors and rewrite
/// operators. Raised eagerly; the input graph is left unchanged.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("unknown source: {0}")]
    UnknownSource(SourceId),
    #[error("unknown sink: {0}")]
    UnknownSink(SinkId),
    #[error("unknown dependency reference: {0}")]
    UnknownDependency(DependencyRef),
    #[error("node {0} must have at least one data dependency")]
    EmptyDependencies(NodeId),
    #[error("source node {0} must have no data dependencies, got {1}")]
    SourceNodeHasDependencies(NodeId, usize),
    #[error("fit dependency {1} of node {0} is not an estimator node")]
    FitDependencyNotEstimator(NodeId, NodeId),
    #[error("dependency {1} of node {0} names an estimator node, which produces no data")]
    DataDependencyIsEstimator(NodeId, NodeId),
    #[error("sink {0} names estimator node {1}, which produces no data")]
    SinkTargetIsEstimator(SinkId, NodeId),
    #[error("adding this edge would create a cycle")]
    WouldCreateCycle,
    #[error("replacement source splice key set does not match replacement's sources")]
    SpliceSourceKeyMismatch,
    #[error("replacement sink splice key set does not match nodes_to_remove")]
    SpliceSinkKeyMismatch,
    #[error("splice target {0} is not a sink of this graph")]
    SpliceTargetNotASink(SinkId),
    #[error("splice source {0} is not a source of the embedded graph")]
    SpliceSourceNotASource(SourceId),
    #[error("splice replacement sink {0} is not a sink of the replacement graph")]
    SpliceReplacementSinkInvalid(SinkId),
    #[error("splice target {0} refers to a node scheduled for removal")]
    SpliceTargetBeingRemoved(NodeId),
    #[error("the pipeline's sink does not resolve to a reachable source via data edges")]
    SinkUnreachable,
}

/// Errors raised by the executor while evaluating a pipeline. Execution-time
/// structural violations (`dag-error` in the design) indicate bugs in the
/// graph-construction layer and are fatal for the pipeline instance;
/// `Operator` errors are propagated unchanged from operator code.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("node {0} is not an estimator node")]
    NotAnEstimatorNode(NodeId),

    #[error("estimator node {0} cannot be evaluated directly to produce data")]
    EstimatorHasNoData(NodeId),

    #[error("source node {0} cannot produce a single-item result")]
    SourceNodeHasNoSingleItemValue(NodeId),

    #[error("no external input is available in this evaluation context")]
    NoExternalInput,

    #[error(transparent)]
    Operator(#[from] OperatorError),
}
