//! Typed carriers passed between the [`Executor`](crate::executor::Executor)
//! and operator implementations.
//!
//! The graph and executor are untyped at this layer: a [`Value`] is a single
//! in-memory item, a [`Dataset`] is the opaque handle to a lazy, partitioned,
//! immutable collection of records supplied by an external runtime. The
//! executor uses *identity* (pointer) equality on [`Dataset`] handles as its
//! cache key, never structural equality, so callers must preserve the
//! identity of dataset values flowing into a pipeline.

use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::errors::ExecutionError;

/// A single, fully materialized item flowing through single-item evaluation.
pub type Value = Arc<dyn Any + Send + Sync>;

/// An opaque handle to a lazy, partitioned, immutable collection of records.
/// Identity, not content, is what the executor's caches key on.
pub type Dataset = Arc<dyn Any + Send + Sync>;

/// Returns a stable identity key for a dataset handle, used by the executor's
/// data cache. Two `Arc` clones of the same dataset share a key; two
/// independently constructed, structurally-identical datasets do not.
pub fn dataset_identity(dataset: &Dataset) -> usize {
    Arc::as_ptr(dataset) as *const () as usize
}

/// A one-shot, input-exactly-once lazy sequence of evaluated dependencies.
///
/// Each pull (`Iterator::next`) forces evaluation of the corresponding
/// dependency, in dependency-list order. An operator that never polls an
/// entry never pays for evaluating it; an operator cannot poll past the end
/// or rewind, matching the "iterate once" contract operators are expected to
/// honor.
pub struct LazyInputs<'a, T> {
    thunks: VecDeque<Box<dyn FnOnce() -> Result<T, ExecutionError> + 'a>>,
}

impl<'a, T> LazyInputs<'a, T> {
    pub(crate) fn new(thunks: Vec<Box<dyn FnOnce() -> Result<T, ExecutionError> + 'a>>) -> Self {
        Self {
            thunks: thunks.into(),
        }
    }

    /// Number of remaining, not-yet-forced inputs.
    pub fn len(&self) -> usize {
        self.thunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thunks.is_empty()
    }
}

impl<'a, T> Iterator for LazyInputs<'a, T> {
    type Item = Result<T, ExecutionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.thunks.pop_front().map(|thunk| thunk())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.thunks.len(), Some(self.thunks.len()))
    }
}

/// Lazy sequence of single-item inputs, passed to `Transformer::apply_single`.
pub type LazyValues<'a> = LazyInputs<'a, Value>;

/// Lazy sequence of dataset inputs, passed to `Transformer::apply_dataset`
/// and `Estimator::fit`.
pub type LazyDatasets<'a> = LazyInputs<'a, Dataset>;
