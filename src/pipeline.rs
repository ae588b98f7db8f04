use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;

use crate::errors::{ExecutionError, GraphError};
use crate::executor::Executor;
use crate::expression::{Dataset, Value};
use crate::graph::Graph;
use crate::ids::{DependencyRef, NodeId, SinkId};
use crate::node::NodeKind;
use crate::optimizer::Optimizer;

fn optimizer_identity(optimizer: &Arc<dyn Optimizer>) -> usize {
    Arc::as_ptr(optimizer) as *const () as usize
}

/// A graph bundled with the single sink it is evaluated through, plus the
/// caches built up by evaluating it.
///
/// Calling [`apply_dataset`](Self::apply_dataset) or
/// [`apply_single`](Self::apply_single) without an optimizer runs against
/// the pipeline's own graph and its own `Executor`. Passing an optimizer
/// routes through a rewritten pipeline instead: the rewrite — a graph and a
/// sink, since an optimizer may retarget evaluation at a sink of its own
/// making rather than reusing this pipeline's — and a dedicated `Executor`
/// for it, are computed once per distinct optimizer identity and reused on
/// every later call made with that same optimizer.
#[derive(Debug)]
pub struct Pipeline {
    graph: Graph,
    sink: SinkId,
    executor: Executor,
    optimized: RefCell<HashMap<usize, (Graph, SinkId, Executor)>>,
}

impl Pipeline {
    /// Builds a pipeline rooted at `sink`. Fails if `sink` is unknown or
    /// does not resolve to a reachable source through the graph's data
    /// edges.
    pub fn new(graph: Graph, sink: SinkId) -> Result<Self, GraphError> {
        if !Self::sink_is_reachable(&graph, sink)? {
            return Err(GraphError::SinkUnreachable);
        }
        Ok(Self {
            graph,
            sink,
            executor: Executor::new(),
            optimized: RefCell::new(HashMap::new()),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn sink(&self) -> SinkId {
        self.sink
    }

    fn sink_is_reachable(graph: &Graph, sink: SinkId) -> Result<bool, GraphError> {
        let mut frontier = vec![graph.get_sink_dependency(sink)?];
        let mut seen: HashSet<NodeId> = HashSet::new();
        while let Some(r) = frontier.pop() {
            match r {
                DependencyRef::Source(_) => return Ok(true),
                DependencyRef::Node(n) => {
                    if !seen.insert(n) {
                        continue;
                    }
                    match graph.get_operator(n)? {
                        NodeKind::Source(_) => return Ok(true),
                        NodeKind::Estimator(_) => {}
                        NodeKind::Transformer(_) | NodeKind::DelegatingTransformer { .. } => {
                            frontier.extend(graph.get_dependencies(n)?.iter().copied());
                        }
                    }
                }
            }
        }
        Ok(false)
    }

    /// Runs `optimizer` against this pipeline the first time it's seen and
    /// caches the result, including the sink the optimizer chose to retarget
    /// evaluation at — an optimizer is free to return a different `SinkId`
    /// than this pipeline's own (e.g. one it minted via `add_sink` on the
    /// rewritten graph) rather than reusing it. The rewritten pipeline's own
    /// sink is re-validated for reachability, since nothing about `Optimizer`
    /// guarantees the rewrite preserved it.
    fn ensure_optimized(&self, optimizer: &Arc<dyn Optimizer>) -> Result<(), ExecutionError> {
        let key = optimizer_identity(optimizer);
        if !self.optimized.borrow().contains_key(&key) {
            debug!("computing pipeline graph for a new optimizer");
            let (optimized_graph, optimized_sink) = optimizer.execute(&self.graph, self.sink);
            if !Self::sink_is_reachable(&optimized_graph, optimized_sink)? {
                return Err(GraphError::SinkUnreachable.into());
            }
            self.optimized
                .borrow_mut()
                .insert(key, (optimized_graph, optimized_sink, Executor::new()));
        }
        Ok(())
    }

    /// Evaluates the pipeline's sink over a dataset, optionally through an
    /// optimized rewrite of the graph.
    pub fn apply_dataset(
        &self,
        input: &Dataset,
        optimizer: Option<&Arc<dyn Optimizer>>,
    ) -> Result<Dataset, ExecutionError> {
        match optimizer {
            None => {
                let dep = self.graph.get_sink_dependency(self.sink)?;
                Self::evaluate_ref_dataset(&self.graph, &self.executor, dep, Some(input))
            }
            Some(opt) => {
                self.ensure_optimized(opt)?;
                let cache = self.optimized.borrow();
                let (graph, sink, executor) = cache
                    .get(&optimizer_identity(opt))
                    .expect("just inserted by ensure_optimized");
                let dep = graph.get_sink_dependency(*sink)?;
                Self::evaluate_ref_dataset(graph, executor, dep, Some(input))
            }
        }
    }

    /// Evaluates the pipeline's sink for a single item, optionally through
    /// an optimized rewrite of the graph.
    pub fn apply_single(
        &self,
        input: &Value,
        optimizer: Option<&Arc<dyn Optimizer>>,
    ) -> Result<Value, ExecutionError> {
        match optimizer {
            None => {
                let dep = self.graph.get_sink_dependency(self.sink)?;
                Self::evaluate_ref_single(&self.graph, &self.executor, dep, Some(input))
            }
            Some(opt) => {
                self.ensure_optimized(opt)?;
                let cache = self.optimized.borrow();
                let (graph, sink, executor) = cache
                    .get(&optimizer_identity(opt))
                    .expect("just inserted by ensure_optimized");
                let dep = graph.get_sink_dependency(*sink)?;
                Self::evaluate_ref_single(graph, executor, dep, Some(input))
            }
        }
    }

    fn evaluate_ref_dataset(
        graph: &Graph,
        executor: &Executor,
        dep: DependencyRef,
        input: Option<&Dataset>,
    ) -> Result<Dataset, ExecutionError> {
        match dep {
            DependencyRef::Node(n) => executor.evaluate_dataset(graph, n, input),
            DependencyRef::Source(_) => input.cloned().ok_or(ExecutionError::NoExternalInput),
        }
    }

    fn evaluate_ref_single(
        graph: &Graph,
        executor: &Executor,
        dep: DependencyRef,
        input: Option<&Value>,
    ) -> Result<Value, ExecutionError> {
        match dep {
            DependencyRef::Node(n) => executor.evaluate_single(graph, n, input),
            DependencyRef::Source(_) => input.cloned().ok_or(ExecutionError::NoExternalInput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ExecutionError;
    use crate::node::Transformer;

    #[derive(Debug)]
    struct AddOne;
    impl Transformer for AddOne {
        fn apply_single(
            &self,
            mut inputs: crate::expression::LazyValues<'_>,
        ) -> Result<Value, ExecutionError> {
            let v = inputs.next().unwrap()?;
            Ok(Arc::new(*v.downcast_ref::<i64>().unwrap() + 1))
        }
        fn apply_dataset(
            &self,
            mut inputs: crate::expression::LazyDatasets<'_>,
        ) -> Result<Dataset, ExecutionError> {
            let d = inputs.next().unwrap()?;
            let items = d.downcast_ref::<Vec<i64>>().unwrap();
            Ok(Arc::new(items.iter().map(|x| x + 1).collect::<Vec<i64>>()))
        }
    }

    fn single_transformer_pipeline() -> Pipeline {
        let g = Graph::new();
        let (g, src) = g.add_source();
        let (g, n1) = g
            .add_node(
                NodeKind::Transformer(Arc::new(AddOne)),
                vec![DependencyRef::Source(src)],
            )
            .unwrap();
        let (g, sink) = g.add_sink(DependencyRef::Node(n1)).unwrap();
        Pipeline::new(g, sink).unwrap()
    }

    #[test]
    fn apply_dataset_runs_end_to_end() {
        let pipeline = single_transformer_pipeline();
        let input: Dataset = Arc::new(vec![1_i64, 2, 3]);
        let out = pipeline.apply_dataset(&input, None).unwrap();
        assert_eq!(*out.downcast_ref::<Vec<i64>>().unwrap(), vec![2, 4, 6]);
    }

    #[test]
    fn apply_single_runs_end_to_end() {
        let pipeline = single_transformer_pipeline();
        let input: Value = Arc::new(41_i64);
        let out = pipeline.apply_single(&input, None).unwrap();
        assert_eq!(*out.downcast_ref::<i64>().unwrap(), 42);
    }

    #[test]
    fn sink_directly_on_a_source_requires_no_nodes() {
        let g = Graph::new();
        let (g, src) = g.add_source();
        let (g, sink) = g.add_sink(DependencyRef::Source(src)).unwrap();
        let pipeline = Pipeline::new(g, sink).unwrap();
        let input: Dataset = Arc::new(vec![7_i64]);
        let out = pipeline.apply_dataset(&input, None).unwrap();
        assert_eq!(*out.downcast_ref::<Vec<i64>>().unwrap(), vec![7]);
    }

    #[derive(Debug)]
    struct NoopEstimator;
    impl crate::node::Estimator for NoopEstimator {
        fn fit(
            &self,
            _inputs: crate::expression::LazyDatasets<'_>,
        ) -> Result<Arc<dyn Transformer>, ExecutionError> {
            Ok(Arc::new(AddOne))
        }
    }

    #[test]
    fn sink_on_an_estimator_node_is_rejected() {
        let g = Graph::new();
        let (g, src) = g.add_source();
        let (g, est) = g
            .add_node(
                NodeKind::Estimator(Arc::new(NoopEstimator)),
                vec![DependencyRef::Source(src)],
            )
            .unwrap();
        let err = g.add_sink(DependencyRef::Node(est));
        assert!(matches!(
            err,
            Err(crate::errors::GraphError::SinkTargetIsEstimator(_, _))
        ));
    }

    #[derive(Debug)]
    struct CountingOptimizer {
        calls: std::cell::Cell<u32>,
    }
    impl crate::optimizer::Optimizer for CountingOptimizer {
        fn execute(&self, graph: &Graph, sink: SinkId) -> (Graph, SinkId) {
            self.calls.set(self.calls.get() + 1);
            (graph.clone(), sink)
        }
    }

    #[test]
    fn optimizer_result_is_cached_by_identity() {
        let pipeline = single_transformer_pipeline();
        let optimizer: Arc<dyn crate::optimizer::Optimizer> = Arc::new(CountingOptimizer {
            calls: std::cell::Cell::new(0),
        });
        let input: Dataset = Arc::new(vec![1_i64]);
        pipeline.apply_dataset(&input, Some(&optimizer)).unwrap();
        pipeline.apply_dataset(&input, Some(&optimizer)).unwrap();
        assert_eq!(pipeline.optimized.borrow().len(), 1);
    }

    /// An optimizer that rebuilds its own sink on the rewritten graph rather
    /// than reusing the pipeline's, as spec §4.5 allows.
    #[derive(Debug)]
    struct RetargetingOptimizer;
    impl crate::optimizer::Optimizer for RetargetingOptimizer {
        fn execute(&self, graph: &Graph, _sink: SinkId) -> (Graph, SinkId) {
            let dep = graph.nodes().next().map(DependencyRef::Node).unwrap();
            let (graph, new_sink) = graph.add_sink(dep).unwrap();
            (graph, new_sink)
        }
    }

    #[test]
    fn optimizer_may_retarget_evaluation_at_a_sink_of_its_own_making() {
        let pipeline = single_transformer_pipeline();
        let optimizer: Arc<dyn crate::optimizer::Optimizer> = Arc::new(RetargetingOptimizer);
        let input: Dataset = Arc::new(vec![1_i64, 2, 3]);
        let out = pipeline.apply_dataset(&input, Some(&optimizer)).unwrap();
        assert_eq!(*out.downcast_ref::<Vec<i64>>().unwrap(), vec![2, 3, 4]);

        let cache = pipeline.optimized.borrow();
        let (_, cached_sink, _) = cache.values().next().unwrap();
        assert_ne!(*cached_sink, pipeline.sink());
    }

    /// An optimizer whose rewritten pipeline no longer has a reachable sink
    /// must be rejected rather than silently evaluating the wrong thing.
    #[derive(Debug)]
    struct UnreachableSinkOptimizer;
    impl crate::optimizer::Optimizer for UnreachableSinkOptimizer {
        fn execute(&self, graph: &Graph, _sink: SinkId) -> (Graph, SinkId) {
            let dangling = SinkId::new(999);
            let mut sink_map = std::collections::HashMap::new();
            for s in graph.sinks() {
                sink_map.insert(s, graph.get_sink_dependency(s).unwrap());
            }
            let rebuilt = Graph::build(
                graph.sources().collect(),
                graph
                    .nodes()
                    .map(|n| (n, graph.get_operator(n).unwrap().clone()))
                    .collect(),
                graph
                    .nodes()
                    .map(|n| (n, graph.get_dependencies(n).unwrap().to_vec()))
                    .collect(),
                sink_map,
            )
            .unwrap();
            (rebuilt, dangling)
        }
    }

    #[test]
    fn optimizer_returning_an_unknown_sink_is_rejected() {
        let pipeline = single_transformer_pipeline();
        let optimizer: Arc<dyn crate::optimizer::Optimizer> = Arc::new(UnreachableSinkOptimizer);
        let input: Dataset = Arc::new(vec![1_i64]);
        let err = pipeline.apply_dataset(&input, Some(&optimizer));
        assert!(matches!(
            err,
            Err(ExecutionError::Graph(crate::errors::GraphError::UnknownSink(_)))
        ));
    }
}
