use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, trace};

use crate::errors::ExecutionError;
use crate::expression::{dataset_identity, Dataset, LazyDatasets, LazyValues, Value};
use crate::graph::Graph;
use crate::ids::{DependencyRef, NodeId};
use crate::node::{NodeKind, Transformer};

/// Evaluates nodes of a [`Graph`] against externally supplied input.
///
/// Fitted estimators are memoized for the lifetime of the `Executor`: the
/// first call to [`fit_estimator`](Executor::fit_estimator) for a given node
/// evaluates it, every later call returns the cached transformer. Dataset
/// evaluation is memoized per `(node, top-level input identity)` pair, so
/// repeated calls against the *same* input dataset (by pointer identity, not
/// structural equality) are free after the first; calls against a
/// structurally-identical but distinct input dataset are not cache hits.
///
/// Single-item evaluation is not memoized.
#[derive(Debug, Default)]
pub struct Executor {
    fit_cache: RefCell<HashMap<NodeId, Arc<dyn Transformer>>>,
    data_cache: RefCell<HashMap<(NodeId, Option<usize>), Dataset>>,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            fit_cache: RefCell::new(HashMap::new()),
            data_cache: RefCell::new(HashMap::new()),
        }
    }

    /// The fitted transformer for an estimator node. Computed once; every
    /// later call for the same node returns the cached result.
    pub fn fit_estimator(
        &self,
        graph: &Graph,
        node: NodeId,
    ) -> Result<Arc<dyn Transformer>, ExecutionError> {
        if let Some(cached) = self.fit_cache.borrow().get(&node) {
            trace!("fit cache hit for {node}");
            return Ok(cached.clone());
        }

        let estimator = match graph.get_operator(node)? {
            NodeKind::Estimator(est) => est.clone(),
            _ => return Err(ExecutionError::NotAnEstimatorNode(node)),
        };

        debug!("fitting estimator {node}");
        let deps = graph.get_dependencies(node)?.to_vec();
        let inputs = self.lazy_datasets(graph, &deps, None);
        let fitted = estimator.fit(inputs)?;

        self.fit_cache.borrow_mut().insert(node, fitted.clone());
        Ok(fitted)
    }

    /// Evaluates `node` as a dataset. `input` is the top-level external
    /// dataset that `DependencyRef::Source` entries resolve to, wherever
    /// they're reached while evaluating `node`'s dependency subgraph; pass
    /// `None` if no external input is available in this context (as
    /// `fit_estimator` does for its own internal evaluation).
    pub fn evaluate_dataset(
        &self,
        graph: &Graph,
        node: NodeId,
        input: Option<&Dataset>,
    ) -> Result<Dataset, ExecutionError> {
        let cache_key = (node, input.map(dataset_identity));
        if let Some(cached) = self.data_cache.borrow().get(&cache_key) {
            trace!("data cache hit for {node}");
            return Ok(cached.clone());
        }

        let result = match graph.get_operator(node)? {
            NodeKind::Source(dataset) => dataset.clone(),
            NodeKind::Transformer(transformer) => {
                let transformer = transformer.clone();
                let deps = graph.get_dependencies(node)?.to_vec();
                let inputs = self.lazy_datasets(graph, &deps, input);
                transformer.apply_dataset(inputs)?
            }
            NodeKind::Estimator(_) => return Err(ExecutionError::EstimatorHasNoData(node)),
            NodeKind::DelegatingTransformer { fit_dependency } => {
                let transformer = self.fit_estimator(graph, *fit_dependency)?;
                let deps = graph.get_dependencies(node)?.to_vec();
                let inputs = self.lazy_datasets(graph, &deps, input);
                transformer.apply_dataset(inputs)?
            }
        };

        self.data_cache
            .borrow_mut()
            .insert(cache_key, result.clone());
        Ok(result)
    }

    /// Evaluates `node` for a single item. Unlike [`evaluate_dataset`](Self::evaluate_dataset),
    /// results are not cached: single-item evaluation is expected to be
    /// called with a different `input` on every invocation.
    pub fn evaluate_single(
        &self,
        graph: &Graph,
        node: NodeId,
        input: Option<&Value>,
    ) -> Result<Value, ExecutionError> {
        match graph.get_operator(node)? {
            NodeKind::Source(_) => Err(ExecutionError::SourceNodeHasNoSingleItemValue(node)),
            NodeKind::Estimator(_) => Err(ExecutionError::EstimatorHasNoData(node)),
            NodeKind::Transformer(transformer) => {
                let transformer = transformer.clone();
                let deps = graph.get_dependencies(node)?.to_vec();
                let inputs = self.lazy_values(graph, &deps, input);
                transformer.apply_single(inputs)
            }
            NodeKind::DelegatingTransformer { fit_dependency } => {
                let transformer = self.fit_estimator(graph, *fit_dependency)?;
                let deps = graph.get_dependencies(node)?.to_vec();
                let inputs = self.lazy_values(graph, &deps, input);
                transformer.apply_single(inputs)
            }
        }
    }

    fn lazy_datasets<'a>(
        &'a self,
        graph: &'a Graph,
        deps: &'a [DependencyRef],
        input: Option<&'a Dataset>,
    ) -> LazyDatasets<'a> {
        let thunks = deps
            .iter()
            .map(|&dep| -> Box<dyn FnOnce() -> Result<Dataset, ExecutionError> + 'a> {
                Box::new(move || match dep {
                    DependencyRef::Node(n) => self.evaluate_dataset(graph, n, input),
                    DependencyRef::Source(_) => {
                        input.cloned().ok_or(ExecutionError::NoExternalInput)
                    }
                })
            })
            .collect();
        LazyDatasets::new(thunks)
    }

    fn lazy_values<'a>(
        &'a self,
        graph: &'a Graph,
        deps: &'a [DependencyRef],
        input: Option<&'a Value>,
    ) -> LazyValues<'a> {
        let thunks = deps
            .iter()
            .map(|&dep| -> Box<dyn FnOnce() -> Result<Value, ExecutionError> + 'a> {
                Box::new(move || match dep {
                    DependencyRef::Node(n) => self.evaluate_single(graph, n, input),
                    DependencyRef::Source(_) => {
                        input.cloned().ok_or(ExecutionError::NoExternalInput)
                    }
                })
            })
            .collect();
        LazyValues::new(thunks)
    }
}
