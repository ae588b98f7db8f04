//! A graph data model and executor for pipelines built from fitted
//! estimators: strictly-typed source, transformer, estimator and
//! delegating-transformer nodes, a pure rewrite algebra over immutable
//! graph values, and a memoizing executor and pipeline façade that evaluate
//! a graph against externally supplied data.

pub mod errors;
pub mod executor;
pub mod expression;
pub mod graph;
pub mod ids;
pub mod node;
pub mod optimizer;
pub mod pipeline;

pub use errors::{ExecutionError, GraphError, OperatorError};
pub use executor::Executor;
pub use expression::{dataset_identity, Dataset, LazyDatasets, LazyInputs, LazyValues, Value};
pub use graph::Graph;
pub use ids::{DependencyRef, NodeId, SinkId, SourceId};
pub use node::{Estimator, NodeKind, Transformer};
pub use optimizer::{DefaultOptimizer, Optimizer};
pub use pipeline::Pipeline;
