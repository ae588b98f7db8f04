use std::fmt::{self, Display, Formatter};

/// Identifies a node (`SourceNode`, `TransformerNode`, `EstimatorNode` or
/// `DelegatingTransformerNode`) within a [`Graph`](crate::graph::Graph).
///
/// Monotonically assigned; never reused within the lifetime of a graph value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn index(self) -> u64 {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Identifies a typed input port of a graph. Not itself a node: a source only
/// ever appears as a dependency reference or as the subject of a splice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub(crate) u64);

impl SourceId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn index(self) -> u64 {
        self.0
    }
}

impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Identifies a named output port of a graph. Points to exactly one node or
/// source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(pub(crate) u64);

impl SinkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn index(self) -> u64 {
        self.0
    }
}

impl Display for SinkId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

/// A dependency reference: the thing a node or sink may depend on. Ordering
/// in a dependency list is meaningful, it is the argument order an operator
/// sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyRef {
    Node(NodeId),
    Source(SourceId),
}

impl DependencyRef {
    pub fn as_node(self) -> Option<NodeId> {
        match self {
            DependencyRef::Node(n) => Some(n),
            DependencyRef::Source(_) => None,
        }
    }

    pub fn as_source(self) -> Option<SourceId> {
        match self {
            DependencyRef::Node(_) => None,
            DependencyRef::Source(s) => Some(s),
        }
    }
}

impl From<NodeId> for DependencyRef {
    fn from(n: NodeId) -> Self {
        DependencyRef::Node(n)
    }
}

impl From<SourceId> for DependencyRef {
    fn from(s: SourceId) -> Self {
        DependencyRef::Source(s)
    }
}

impl Display for DependencyRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DependencyRef::Node(n) => write!(f, "{n}"),
            DependencyRef::Source(s) => write!(f, "{s}"),
        }
    }
}
