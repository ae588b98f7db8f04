use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::errors::ExecutionError;
use crate::expression::{Dataset, LazyDatasets, LazyValues, Value};
use crate::ids::NodeId;

/// A pure function from an ordered sequence of input expressions to one
/// output expression. Has one implementation for single-item input and one
/// for dataset input.
///
/// Operators must be referentially transparent: given the same input-value
/// identities, they must produce equivalent outputs, since the executor
/// memoizes on identity.
pub trait Transformer: Debug + Send + Sync {
    fn apply_single(&self, inputs: LazyValues<'_>) -> Result<Value, ExecutionError>;
    fn apply_dataset(&self, inputs: LazyDatasets<'_>) -> Result<Dataset, ExecutionError>;
}

/// A function from an ordered sequence of input datasets to a [`Transformer`]
/// (its fit result). Cannot be evaluated directly to produce data.
pub trait Estimator: Debug + Send + Sync {
    fn fit(&self, inputs: LazyDatasets<'_>) -> Result<Arc<dyn Transformer>, ExecutionError>;
}

/// The tagged variant of node kinds a [`Graph`](crate::graph::Graph) vertex
/// can take. Matches are expected to be exhaustive; there is deliberately no
/// default arm so a new variant forces every dispatch site to be revisited.
#[derive(Clone)]
pub enum NodeKind {
    /// Wraps a constant lazy dataset; supplies values without depending on
    /// anything.
    Source(Dataset),
    /// A pure transformer, see [`Transformer`].
    Transformer(Arc<dyn Transformer>),
    /// An estimator, see [`Estimator`].
    Estimator(Arc<dyn Estimator>),
    /// A transformer whose behavior is supplied by the fit result of exactly
    /// one estimator node. The referenced node must be an `Estimator`.
    DelegatingTransformer { fit_dependency: NodeId },
}

// `Dataset` is `Arc<dyn Any + Send + Sync>`, which has no `Debug` impl, so
// this can't be derived; a source node's payload is printed opaquely.
impl Debug for NodeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Source(_) => f.debug_tuple("Source").field(&"..").finish(),
            NodeKind::Transformer(t) => f.debug_tuple("Transformer").field(t).finish(),
            NodeKind::Estimator(e) => f.debug_tuple("Estimator").field(e).finish(),
            NodeKind::DelegatingTransformer { fit_dependency } => f
                .debug_struct("DelegatingTransformer")
                .field("fit_dependency", fit_dependency)
                .finish(),
        }
    }
}

impl NodeKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeKind::Source(_) => "SourceNode",
            NodeKind::Transformer(_) => "TransformerNode",
            NodeKind::Estimator(_) => "EstimatorNode",
            NodeKind::DelegatingTransformer { .. } => "DelegatingTransformerNode",
        }
    }

    pub fn is_estimator(&self) -> bool {
        matches!(self, NodeKind::Estimator(_))
    }

    pub fn fit_dependency(&self) -> Option<NodeId> {
        match self {
            NodeKind::DelegatingTransformer { fit_dependency } => Some(*fit_dependency),
            _ => None,
        }
    }
}
