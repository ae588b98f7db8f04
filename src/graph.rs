use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use daggy::petgraph::algo::toposort;
use daggy::petgraph::graph::DiGraph;
use log::{error, info};

use crate::errors::GraphError;
use crate::ids::{DependencyRef, NodeId, SinkId, SourceId};
use crate::node::NodeKind;

impl PartialEq for NodeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NodeKind::Source(a), NodeKind::Source(b)) => Arc::ptr_eq(a, b),
            (NodeKind::Transformer(a), NodeKind::Transformer(b)) => Arc::ptr_eq(a, b),
            (NodeKind::Estimator(a), NodeKind::Estimator(b)) => Arc::ptr_eq(a, b),
            (
                NodeKind::DelegatingTransformer { fit_dependency: a },
                NodeKind::DelegatingTransformer { fit_dependency: b },
            ) => a == b,
            _ => false,
        }
    }
}
impl Eq for NodeKind {}

/// An immutable pipeline graph: a set of typed nodes, the sources that feed
/// external input into it, the named sinks that expose its output, and the
/// dependency edges between them.
///
/// Every mutator takes `&self` and returns a new `Graph` (or an error that
/// leaves `self` untouched) rather than mutating in place. Node, source and
/// sink identifiers are assigned monotonically and are never reused, so an
/// id minted by one graph value is safe to carry over to any graph value
/// derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    sources: BTreeSet<SourceId>,
    operators: HashMap<NodeId, NodeKind>,
    dependencies: HashMap<NodeId, Vec<DependencyRef>>,
    sink_dependencies: HashMap<SinkId, DependencyRef>,
    next_node: u64,
    next_source: u64,
    next_sink: u64,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// An empty graph: no nodes, no sources, no sinks.
    pub fn new() -> Self {
        Self {
            sources: BTreeSet::new(),
            operators: HashMap::new(),
            dependencies: HashMap::new(),
            sink_dependencies: HashMap::new(),
            next_node: 0,
            next_source: 0,
            next_sink: 0,
        }
    }

    /// Builds a graph from already-assembled tables, validating every
    /// invariant before returning it. The next-id counters are derived from
    /// the highest id present in each table so further rewrites keep minting
    /// fresh ids.
    pub fn build(
        sources: BTreeSet<SourceId>,
        operators: HashMap<NodeId, NodeKind>,
        dependencies: HashMap<NodeId, Vec<DependencyRef>>,
        sink_dependencies: HashMap<SinkId, DependencyRef>,
    ) -> Result<Self, GraphError> {
        let next_node = operators.keys().map(|n| n.index() + 1).max().unwrap_or(0);
        let next_source = sources.iter().map(|s| s.index() + 1).max().unwrap_or(0);
        let next_sink = sink_dependencies
            .keys()
            .map(|s| s.index() + 1)
            .max()
            .unwrap_or(0);
        let graph = Self {
            sources,
            operators,
            dependencies,
            sink_dependencies,
            next_node,
            next_source,
            next_sink,
        };
        graph.validate()?;
        Ok(graph)
    }

    // ---- accessors -----------------------------------------------------

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.operators.keys().copied()
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.sources.iter().copied()
    }

    pub fn sinks(&self) -> impl Iterator<Item = SinkId> + '_ {
        self.sink_dependencies.keys().copied()
    }

    pub fn get_dependencies(&self, node: NodeId) -> Result<&[DependencyRef], GraphError> {
        self.dependencies
            .get(&node)
            .map(Vec::as_slice)
            .ok_or(GraphError::UnknownNode(node))
    }

    pub fn get_sink_dependency(&self, sink: SinkId) -> Result<DependencyRef, GraphError> {
        self.sink_dependencies
            .get(&sink)
            .copied()
            .ok_or(GraphError::UnknownSink(sink))
    }

    pub fn get_operator(&self, node: NodeId) -> Result<&NodeKind, GraphError> {
        self.operators.get(&node).ok_or(GraphError::UnknownNode(node))
    }

    fn contains_ref(&self, r: DependencyRef) -> bool {
        match r {
            DependencyRef::Node(n) => self.operators.contains_key(&n),
            DependencyRef::Source(s) => self.sources.contains(&s),
        }
    }

    fn check_ref(&self, r: DependencyRef) -> Result<(), GraphError> {
        if self.contains_ref(r) {
            Ok(())
        } else {
            Err(GraphError::UnknownDependency(r))
        }
    }

    // ---- validation ------------------------------------------------------

    /// Checks every invariant this graph is expected to hold: reference
    /// existence, key-set equality between `operators` and `dependencies`,
    /// per-kind dependency shape, and acyclicity (including fit-dependency
    /// edges). `remove_node`/`remove_source`/`remove_sink` deliberately skip
    /// this check, since they are documented to leave dangling references
    /// behind rather than scrub them.
    pub fn validate(&self) -> Result<(), GraphError> {
        match self.validate_shape().and_then(|_| self.validate_acyclic()) {
            Ok(()) => {
                info!(
                    "graph validated: {} nodes, {} sources, {} sinks",
                    self.operators.len(),
                    self.sources.len(),
                    self.sink_dependencies.len()
                );
                Ok(())
            }
            Err(e) => {
                error!("graph validation error: {e}");
                Err(e)
            }
        }
    }

    fn validate_shape(&self) -> Result<(), GraphError> {
        for n in self.operators.keys() {
            if !self.dependencies.contains_key(n) {
                return Err(GraphError::UnknownNode(*n));
            }
        }
        for n in self.dependencies.keys() {
            if !self.operators.contains_key(n) {
                return Err(GraphError::UnknownNode(*n));
            }
        }

        for deps in self.dependencies.values() {
            for &d in deps {
                self.check_ref(d)?;
            }
        }
        for &dep in self.sink_dependencies.values() {
            self.check_ref(dep)?;
        }

        for (&n, kind) in &self.operators {
            let deps = &self.dependencies[&n];
            match kind {
                NodeKind::Source(_) => {
                    if !deps.is_empty() {
                        return Err(GraphError::SourceNodeHasDependencies(n, deps.len()));
                    }
                }
                NodeKind::Transformer(_) | NodeKind::Estimator(_) => {
                    if deps.is_empty() {
                        return Err(GraphError::EmptyDependencies(n));
                    }
                }
                NodeKind::DelegatingTransformer { fit_dependency } => {
                    if deps.is_empty() {
                        return Err(GraphError::EmptyDependencies(n));
                    }
                    match self.operators.get(fit_dependency) {
                        Some(fit_kind) if fit_kind.is_estimator() => {}
                        Some(_) => {
                            return Err(GraphError::FitDependencyNotEstimator(n, *fit_dependency))
                        }
                        None => return Err(GraphError::UnknownNode(*fit_dependency)),
                    }
                }
            }
            for &d in deps {
                if let DependencyRef::Node(dep_node) = d {
                    if self.operators[&dep_node].is_estimator() {
                        return Err(GraphError::DataDependencyIsEstimator(n, dep_node));
                    }
                }
            }
        }

        for (&s, &dep) in &self.sink_dependencies {
            if let DependencyRef::Node(dep_node) = dep {
                if self.operators[&dep_node].is_estimator() {
                    return Err(GraphError::SinkTargetIsEstimator(s, dep_node));
                }
            }
        }
        Ok(())
    }

    fn build_dependency_graph(&self) -> DiGraph<NodeId, ()> {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::with_capacity(self.operators.len());
        for &n in self.operators.keys() {
            index_of.insert(n, graph.add_node(n));
        }
        for (&n, deps) in &self.dependencies {
            for &d in deps {
                if let DependencyRef::Node(dep_node) = d {
                    graph.add_edge(index_of[&dep_node], index_of[&n], ());
                }
            }
            if let Some(fit_dep) = self.operators[&n].fit_dependency() {
                graph.add_edge(index_of[&fit_dep], index_of[&n], ());
            }
        }
        graph
    }

    fn validate_acyclic(&self) -> Result<(), GraphError> {
        let graph = self.build_dependency_graph();
        toposort(&graph, None)
            .map(|_| ())
            .map_err(|_| GraphError::WouldCreateCycle)
    }

    /// A topological order over this graph's nodes (data and fit-dependency
    /// edges both count), suitable for the caller's own scheduling needs.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let graph = self.build_dependency_graph();
        let order = toposort(&graph, None).map_err(|_| GraphError::WouldCreateCycle)?;
        Ok(order.into_iter().map(|idx| graph[idx]).collect())
    }

    // ---- mutators --------------------------------------------------------

    pub fn add_source(&self) -> (Graph, SourceId) {
        let mut g = self.clone();
        let id = SourceId::new(g.next_source);
        g.next_source += 1;
        g.sources.insert(id);
        (g, id)
    }

    pub fn add_node(
        &self,
        kind: NodeKind,
        dependencies: Vec<DependencyRef>,
    ) -> Result<(Graph, NodeId), GraphError> {
        for &d in &dependencies {
            self.check_ref(d)?;
        }
        let id = NodeId::new(self.next_node);
        let mut g = self.clone();
        g.operators.insert(id, kind);
        g.dependencies.insert(id, dependencies);
        g.next_node += 1;
        g.validate()?;
        Ok((g, id))
    }

    pub fn add_sink(&self, dependency: DependencyRef) -> Result<(Graph, SinkId), GraphError> {
        self.check_ref(dependency)?;
        let id = SinkId::new(self.next_sink);
        let mut g = self.clone();
        g.sink_dependencies.insert(id, dependency);
        g.next_sink += 1;
        g.validate()?;
        Ok((g, id))
    }

    pub fn set_dependencies(
        &self,
        node: NodeId,
        dependencies: Vec<DependencyRef>,
    ) -> Result<Graph, GraphError> {
        if !self.operators.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        for &d in &dependencies {
            self.check_ref(d)?;
        }
        let mut g = self.clone();
        g.dependencies.insert(node, dependencies);
        g.validate()?;
        Ok(g)
    }

    pub fn set_operator(&self, node: NodeId, kind: NodeKind) -> Result<Graph, GraphError> {
        if !self.operators.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        let mut g = self.clone();
        g.operators.insert(node, kind);
        g.validate()?;
        Ok(g)
    }

    pub fn set_sink_dependency(
        &self,
        sink: SinkId,
        dependency: DependencyRef,
    ) -> Result<Graph, GraphError> {
        if !self.sink_dependencies.contains_key(&sink) {
            return Err(GraphError::UnknownSink(sink));
        }
        self.check_ref(dependency)?;
        let mut g = self.clone();
        g.sink_dependencies.insert(sink, dependency);
        g.validate()?;
        Ok(g)
    }

    pub fn remove_sink(&self, sink: SinkId) -> Result<Graph, GraphError> {
        if !self.sink_dependencies.contains_key(&sink) {
            return Err(GraphError::UnknownSink(sink));
        }
        let mut g = self.clone();
        g.sink_dependencies.remove(&sink);
        Ok(g)
    }

    pub fn remove_source(&self, source: SourceId) -> Result<Graph, GraphError> {
        if !self.sources.contains(&source) {
            return Err(GraphError::UnknownSource(source));
        }
        let mut g = self.clone();
        g.sources.remove(&source);
        Ok(g)
    }

    pub fn remove_node(&self, node: NodeId) -> Result<Graph, GraphError> {
        if !self.operators.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        let mut g = self.clone();
        g.operators.remove(&node);
        g.dependencies.remove(&node);
        Ok(g)
    }

    /// Replaces every occurrence of `old` with `new` across every node's
    /// dependency list and every sink, wherever it appears. Fit dependencies
    /// are untouched, since they are not dependency references.
    pub fn replace_dependency(
        &self,
        old: DependencyRef,
        new: DependencyRef,
    ) -> Result<Graph, GraphError> {
        self.check_ref(old)?;
        self.check_ref(new)?;
        let mut g = self.clone();
        for deps in g.dependencies.values_mut() {
            for d in deps.iter_mut() {
                if *d == old {
                    *d = new;
                }
            }
        }
        for dep in g.sink_dependencies.values_mut() {
            if *dep == old {
                *dep = new;
            }
        }
        g.validate()?;
        Ok(g)
    }

    // ---- composition -------------------------------------------------------

    /// Embeds a disjoint copy of `other` into this graph under fresh ids,
    /// without connecting it to anything. Returns the embedding graph plus
    /// the id maps from `other`'s sources and sinks to their image in it.
    pub fn add_graph(
        &self,
        other: &Graph,
    ) -> (Graph, HashMap<SourceId, SourceId>, HashMap<SinkId, SinkId>) {
        let mut g = self.clone();
        let mut node_map = HashMap::with_capacity(other.operators.len());
        let mut source_map = HashMap::with_capacity(other.sources.len());
        let mut sink_map = HashMap::with_capacity(other.sink_dependencies.len());

        for &s in &other.sources {
            let new_id = SourceId::new(g.next_source);
            g.next_source += 1;
            g.sources.insert(new_id);
            source_map.insert(s, new_id);
        }
        for &n in other.operators.keys() {
            let new_id = NodeId::new(g.next_node);
            g.next_node += 1;
            node_map.insert(n, new_id);
        }

        let remap = |r: DependencyRef| -> DependencyRef {
            match r {
                DependencyRef::Node(n) => DependencyRef::Node(node_map[&n]),
                DependencyRef::Source(s) => DependencyRef::Source(source_map[&s]),
            }
        };

        for (&n, kind) in &other.operators {
            let new_id = node_map[&n];
            let new_kind = match kind {
                NodeKind::DelegatingTransformer { fit_dependency } => {
                    NodeKind::DelegatingTransformer {
                        fit_dependency: node_map[fit_dependency],
                    }
                }
                other_kind => other_kind.clone(),
            };
            g.operators.insert(new_id, new_kind);
            let new_deps = other.dependencies[&n].iter().copied().map(remap).collect();
            g.dependencies.insert(new_id, new_deps);
        }

        for (&s, &dep) in &other.sink_dependencies {
            let new_id = SinkId::new(g.next_sink);
            g.next_sink += 1;
            g.sink_dependencies.insert(new_id, remap(dep));
            sink_map.insert(s, new_id);
        }

        (g, source_map, sink_map)
    }

    /// Embeds `other` and wires each of its sources named in `splice_map` to
    /// the existing sink of `self` it maps to, consuming both the embedded
    /// source and that sink. Every other source of `other` and every sink of
    /// `self` is left as-is.
    ///
    /// On error, neither `self` nor `other` is touched.
    pub fn connect_graph(
        &self,
        other: &Graph,
        splice_map: &HashMap<SourceId, SinkId>,
    ) -> Result<(Graph, HashMap<SourceId, SourceId>, HashMap<SinkId, SinkId>), GraphError> {
        for (&src, &sink) in splice_map {
            if !other.sources.contains(&src) {
                return Err(GraphError::SpliceSourceNotASource(src));
            }
            if !self.sink_dependencies.contains_key(&sink) {
                return Err(GraphError::SpliceTargetNotASink(sink));
            }
        }

        let (mut g, mut source_id_map, sink_id_map) = self.add_graph(other);

        for (&src_of_other, &sink_of_self) in splice_map {
            let embedded_source = source_id_map[&src_of_other];
            let replacement = g.sink_dependencies[&sink_of_self];
            let embedded_ref = DependencyRef::Source(embedded_source);
            for deps in g.dependencies.values_mut() {
                for d in deps.iter_mut() {
                    if *d == embedded_ref {
                        *d = replacement;
                    }
                }
            }
            for dep in g.sink_dependencies.values_mut() {
                if *dep == embedded_ref {
                    *dep = replacement;
                }
            }
            g.sources.remove(&embedded_source);
            g.sink_dependencies.remove(&sink_of_self);
            source_id_map.remove(&src_of_other);
        }

        g.validate()?;
        Ok((g, source_id_map, sink_id_map))
    }

    /// Replaces every node named in `nodes_to_remove` with a spliced-in copy
    /// of `replacement`. `replacement_source_splice` rewires replacement's
    /// own sources (its key set must equal `replacement.sources()` exactly)
    /// to references already present in `self`; `replacement_sink_splice`
    /// maps each removed node to the sink of `replacement` that should stand
    /// in for it wherever `self` depended on that node (its key set must
    /// equal `nodes_to_remove` exactly).
    pub fn replace_nodes(
        &self,
        nodes_to_remove: &HashSet<NodeId>,
        replacement: &Graph,
        replacement_source_splice: &HashMap<SourceId, DependencyRef>,
        replacement_sink_splice: &HashMap<NodeId, SinkId>,
    ) -> Result<Graph, GraphError> {
        let replacement_sources: HashSet<SourceId> = replacement.sources.iter().copied().collect();
        let splice_source_keys: HashSet<SourceId> =
            replacement_source_splice.keys().copied().collect();
        if replacement_sources != splice_source_keys {
            return Err(GraphError::SpliceSourceKeyMismatch);
        }
        for &target in replacement_source_splice.values() {
            if !self.contains_ref(target) {
                return Err(GraphError::UnknownDependency(target));
            }
            if let DependencyRef::Node(n) = target {
                if nodes_to_remove.contains(&n) {
                    return Err(GraphError::SpliceTargetBeingRemoved(n));
                }
            }
        }

        let splice_sink_keys: HashSet<NodeId> = replacement_sink_splice.keys().copied().collect();
        if nodes_to_remove != &splice_sink_keys {
            return Err(GraphError::SpliceSinkKeyMismatch);
        }
        for &sink in replacement_sink_splice.values() {
            if !replacement.sink_dependencies.contains_key(&sink) {
                return Err(GraphError::SpliceReplacementSinkInvalid(sink));
            }
        }
        for &n in nodes_to_remove {
            if !self.operators.contains_key(&n) {
                return Err(GraphError::UnknownNode(n));
            }
        }

        let (mut g, source_id_map, sink_id_map) = self.add_graph(replacement);

        for (&src, &target) in replacement_source_splice {
            let embedded_source = source_id_map[&src];
            let embedded_ref = DependencyRef::Source(embedded_source);
            for deps in g.dependencies.values_mut() {
                for d in deps.iter_mut() {
                    if *d == embedded_ref {
                        *d = target;
                    }
                }
            }
            for dep in g.sink_dependencies.values_mut() {
                if *dep == embedded_ref {
                    *dep = target;
                }
            }
            g.sources.remove(&embedded_source);
        }

        for (&removed, &replacement_sink) in replacement_sink_splice {
            let embedded_sink = sink_id_map[&replacement_sink];
            let redirect_to = g.sink_dependencies[&embedded_sink];
            let old_ref = DependencyRef::Node(removed);
            for deps in g.dependencies.values_mut() {
                for d in deps.iter_mut() {
                    if *d == old_ref {
                        *d = redirect_to;
                    }
                }
            }
            for dep in g.sink_dependencies.values_mut() {
                if *dep == old_ref {
                    *dep = redirect_to;
                }
            }
        }

        for &n in nodes_to_remove {
            g.operators.remove(&n);
            g.dependencies.remove(&n);
        }
        for &replacement_sink in replacement_sink_splice.values() {
            let embedded_sink = sink_id_map[&replacement_sink];
            g.sink_dependencies.remove(&embedded_sink);
        }

        g.validate()?;
        Ok(g)
    }
}
