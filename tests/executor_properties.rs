use std::cell::Cell;
use std::sync::Arc;

use pipeline_graph::{
    DependencyRef, Dataset, Estimator, ExecutionError, Executor, Graph, LazyDatasets, LazyValues,
    NodeKind, Transformer, Value,
};
use proptest::prelude::*;

#[derive(Debug)]
struct Increment;

impl Transformer for Increment {
    fn apply_single(&self, mut inputs: LazyValues<'_>) -> Result<Value, ExecutionError> {
        let v = inputs.next().unwrap()?;
        Ok(Arc::new(v.downcast_ref::<i64>().unwrap() + 1))
    }
    fn apply_dataset(&self, mut inputs: LazyDatasets<'_>) -> Result<Dataset, ExecutionError> {
        let d = inputs.next().unwrap()?;
        let items = d.downcast_ref::<Vec<i64>>().unwrap();
        Ok(Arc::new(items.iter().map(|x| x + 1).collect::<Vec<i64>>()))
    }
}

#[derive(Debug, Default)]
struct CountingEstimator {
    fits: Cell<u32>,
}

impl Estimator for CountingEstimator {
    fn fit(&self, _inputs: LazyDatasets<'_>) -> Result<Arc<dyn Transformer>, ExecutionError> {
        self.fits.set(self.fits.get() + 1);
        Ok(Arc::new(Increment))
    }
}

/// A transformer whose `apply_single`/`apply_dataset` never reads a given
/// input index, to check the lazy contract: an unread input must never be
/// evaluated.
#[derive(Debug)]
struct IgnoresSecondInput;

impl Transformer for IgnoresSecondInput {
    fn apply_single(&self, mut inputs: LazyValues<'_>) -> Result<Value, ExecutionError> {
        inputs.next().unwrap()
    }
    fn apply_dataset(&self, mut inputs: LazyDatasets<'_>) -> Result<Dataset, ExecutionError> {
        inputs.next().unwrap()
    }
}

#[derive(Debug)]
struct Exploding;

impl Transformer for Exploding {
    fn apply_single(&self, _inputs: LazyValues<'_>) -> Result<Value, ExecutionError> {
        panic!("this transformer's single-item path must never run")
    }
    fn apply_dataset(&self, _inputs: LazyDatasets<'_>) -> Result<Dataset, ExecutionError> {
        panic!("this transformer's dataset path must never run")
    }
}

proptest! {
    #[test]
    fn fit_runs_at_most_once_regardless_of_call_count(calls in 1usize..10) {
        let g = Graph::new();
        let (g, src) = g.add_source();
        let estimator = Arc::new(CountingEstimator::default());
        let (g, est) = g
            .add_node(NodeKind::Estimator(estimator.clone()), vec![DependencyRef::Source(src)])
            .unwrap();

        let executor = Executor::new();
        for _ in 0..calls {
            executor.fit_estimator(&g, est).unwrap();
        }
        prop_assert_eq!(estimator.fits.get(), 1);
    }

    #[test]
    fn dataset_evaluation_is_independent_of_single_item_evaluation(n in any::<i64>()) {
        let g = Graph::new();
        let (g, src) = g.add_source();
        let (g, n1) = g
            .add_node(NodeKind::Transformer(Arc::new(Increment)), vec![DependencyRef::Source(src)])
            .unwrap();

        let executor = Executor::new();
        let dataset_input: Dataset = Arc::new(vec![n]);
        let single_input: Value = Arc::new(n);

        let dataset_out = executor.evaluate_dataset(&g, n1, Some(&dataset_input)).unwrap();
        let single_out = executor.evaluate_single(&g, n1, Some(&single_input)).unwrap();

        prop_assert_eq!(dataset_out.downcast_ref::<Vec<i64>>().unwrap()[0], n + 1);
        prop_assert_eq!(*single_out.downcast_ref::<i64>().unwrap(), n + 1);
    }

    #[test]
    fn unread_inputs_are_never_evaluated(n in any::<i64>()) {
        let g = Graph::new();
        let (g, src) = g.add_source();
        let (g, exploding) = g
            .add_node(NodeKind::Transformer(Arc::new(Exploding)), vec![DependencyRef::Source(src)])
            .unwrap();
        let (g, n1) = g
            .add_node(
                NodeKind::Transformer(Arc::new(IgnoresSecondInput)),
                vec![DependencyRef::Source(src), DependencyRef::Node(exploding)],
            )
            .unwrap();

        let executor = Executor::new();
        let input: Dataset = Arc::new(vec![n]);
        let out = executor.evaluate_dataset(&g, n1, Some(&input)).unwrap();
        prop_assert_eq!(out.downcast_ref::<Vec<i64>>().unwrap()[0], n);
    }
}
