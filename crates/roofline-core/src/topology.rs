//! Arena-indexed hardware topology.
//!
//! Nodes live in a single `Vec` and refer to each other by [`NodeId`], so
//! ancestor lookups are index walks rather than pointer chasing and the
//! topology can be shared freely between threads.
//!
//! The hierarchy has four fixed levels:
//!
//! | depth | kind        | name prefix |
//! |-------|-------------|-------------|
//! | 0     | Machine     | `Machine`   |
//! | 1     | NUMA node   | `NUMANode`  |
//! | 2     | Core        | `Core`      |
//! | 3     | Hardware thread (PU) | `PU` |
//!
//! Logical indices are assigned per level in depth-first order, so the
//! hardware threads beneath any node always form one contiguous block of
//! leaf logical indices. The sample store relies on this to describe each
//! reduction group as a single sub-range.

use std::collections::HashMap;
use std::fmt;

use crate::types::ReductionLevel;

/// Maximum length of a node name, matching the fixed location column.
const MAX_NAME_LEN: usize = 15;

/// Subtype of NUMA nodes backed by on-package high-bandwidth memory.
pub const MCDRAM_SUBTYPE: &str = "MCDRAM";

/// Index of a node in its [`Topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in the topology arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Kind of a hierarchy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    /// The whole machine.
    Machine,
    /// A NUMA memory node.
    NumaNode,
    /// A physical core.
    Core,
    /// A hardware thread (processing unit), the leaf of the hierarchy.
    Pu,
}

impl NodeKind {
    /// Generic type name used in location names.
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Machine => "Machine",
            NodeKind::NumaNode => "NUMANode",
            NodeKind::Core => "Core",
            NodeKind::Pu => "PU",
        }
    }

    /// Node kind matching a reduction level.
    pub fn for_reduction(level: ReductionLevel) -> Self {
        match level {
            ReductionLevel::Machine => NodeKind::Machine,
            ReductionLevel::Numa => NodeKind::NumaNode,
            ReductionLevel::Core => NodeKind::Core,
        }
    }
}

/// One node of the hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    depth: usize,
    logical_index: usize,
    os_index: usize,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    subtype: Option<String>,
}

impl Node {
    /// Kind of this node.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Depth in the hierarchy (0 is the machine).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Index among the nodes of the same depth, in depth-first order.
    pub fn logical_index(&self) -> usize {
        self.logical_index
    }

    /// Index assigned by the operating system (the CPU number for a PU).
    pub fn os_index(&self) -> usize {
        self.os_index
    }

    /// Parent node, `None` for the machine.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in logical order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether this node has no children.
    pub fn is_childless(&self) -> bool {
        self.children.is_empty()
    }

    /// Memory technology subtype, e.g. `MCDRAM`.
    pub fn subtype(&self) -> Option<&str> {
        self.subtype.as_deref()
    }
}

/// Error returned when a topology cannot be built or loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// The description contains no hardware thread.
    NoProcessingUnits,
    /// A core was described without any hardware thread.
    EmptyCore {
        /// Logical index of the offending core.
        core: usize,
    },
    /// Two hardware threads share one OS index.
    DuplicateOsIndex(usize),
    /// The platform description could not be read.
    Discovery(String),
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyError::NoProcessingUnits => {
                write!(f, "topology contains no processing unit")
            }
            TopologyError::EmptyCore { core } => {
                write!(f, "core {} has no processing unit", core)
            }
            TopologyError::DuplicateOsIndex(os) => {
                write!(f, "cpu {} appears more than once in the topology", os)
            }
            TopologyError::Discovery(msg) => write!(f, "topology discovery failed: {}", msg),
        }
    }
}

impl std::error::Error for TopologyError {}

/// Immutable hardware hierarchy.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<Node>,
    levels: Vec<Vec<NodeId>>,
    pu_by_os: HashMap<usize, NodeId>,
}

impl Topology {
    /// Number of levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Node by id.
    ///
    /// Ids are only produced by this topology, so lookups cannot fail.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Depth of the level holding nodes of `kind`, if any.
    pub fn depth_of(&self, kind: NodeKind) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.first().map(|id| self.node(*id).kind) == Some(kind))
    }

    /// Depth used for a reduction level; falls back to the machine level
    /// when the topology has no such level.
    pub fn reduction_depth(&self, level: ReductionLevel) -> usize {
        self.depth_of(NodeKind::for_reduction(level)).unwrap_or(0)
    }

    /// All nodes at `depth`, in logical order.
    pub fn nodes_at_depth(&self, depth: usize) -> &[NodeId] {
        self.levels.get(depth).map_or(&[], |level| level.as_slice())
    }

    /// Leaf hardware threads, indexed by logical index.
    pub fn leaves(&self) -> &[NodeId] {
        self.levels.last().map_or(&[], |level| level.as_slice())
    }

    /// Number of leaf hardware threads.
    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// The ancestor of `id` at `depth`, or `id` itself if it is already at
    /// or above that depth.
    pub fn ancestor_at(&self, id: NodeId, depth: usize) -> NodeId {
        let mut current = id;
        while self.node(current).depth > depth {
            match self.node(current).parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    /// Hardware thread with the given OS CPU number.
    pub fn pu_by_os_index(&self, os_index: usize) -> Option<NodeId> {
        self.pu_by_os.get(&os_index).copied()
    }

    /// First leaf logical index and leaf count beneath `id`, or `None` if the
    /// node has no children.
    pub fn leaf_span(&self, id: NodeId) -> Option<(usize, usize)> {
        let node = self.node(id);
        if node.kind == NodeKind::Pu {
            return Some((node.logical_index, 1));
        }
        if node.is_childless() {
            return None;
        }
        let depth = node.depth;
        let mut span: Option<(usize, usize)> = None;
        for (logical, leaf) in self.leaves().iter().enumerate() {
            if self.ancestor_at(*leaf, depth) == id {
                span = Some(match span {
                    Some((first, count)) => (first, count + 1),
                    None => (logical, 1),
                });
            }
        }
        span
    }

    /// Short stable name of a node, e.g. `NUMANode:1` or `MCDRAM:2`.
    pub fn name(&self, id: NodeId) -> String {
        let node = self.node(id);
        let prefix = match (node.kind, node.subtype()) {
            (NodeKind::NumaNode, Some(MCDRAM_SUBTYPE)) => MCDRAM_SUBTYPE,
            (kind, _) => kind.type_name(),
        };
        let mut name = format!("{}:{}", prefix, node.logical_index);
        name.truncate(MAX_NAME_LEN);
        name
    }
}

#[derive(Debug, Clone)]
struct NumaSpec {
    cores: Vec<Vec<usize>>,
    subtype: Option<String>,
}

/// Builder for [`Topology`].
///
/// NUMA nodes are added in logical order; each is described by its cores,
/// and each core by the OS CPU numbers of its hardware threads.
///
/// ```
/// use roofline_core::TopologyBuilder;
///
/// let topology = TopologyBuilder::new()
///     .numa_node([[0, 4], [1, 5]])
///     .numa_node([[2, 6], [3, 7]])
///     .build()
///     .unwrap();
/// assert_eq!(topology.leaf_count(), 8);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    numa: Vec<NumaSpec>,
}

impl TopologyBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// A machine of `numa` nodes with `cores` cores each and `threads`
    /// hardware threads per core, numbered sequentially.
    pub fn uniform(numa: usize, cores: usize, threads: usize) -> Self {
        let mut builder = Self::new();
        let mut cpu = 0;
        for _ in 0..numa {
            let node: Vec<Vec<usize>> = (0..cores)
                .map(|_| {
                    let pus: Vec<usize> = (cpu..cpu + threads).collect();
                    cpu += threads;
                    pus
                })
                .collect();
            builder = builder.numa_node(node);
        }
        builder
    }

    /// Add a NUMA node holding the given cores.
    pub fn numa_node<C, P>(mut self, cores: C) -> Self
    where
        C: IntoIterator<Item = P>,
        P: IntoIterator<Item = usize>,
    {
        self.numa.push(NumaSpec {
            cores: cores
                .into_iter()
                .map(|pus| pus.into_iter().collect())
                .collect(),
            subtype: None,
        });
        self
    }

    /// Add a NUMA node with memory only (no cores), optionally tagged with a
    /// memory technology subtype.
    pub fn memory_node(mut self, subtype: Option<&str>) -> Self {
        self.numa.push(NumaSpec {
            cores: Vec::new(),
            subtype: subtype.map(str::to_owned),
        });
        self
    }

    /// Build the topology.
    ///
    /// # Errors
    ///
    /// Fails if no hardware thread is described, a core is empty, or an OS
    /// CPU number is used twice.
    pub fn build(self) -> Result<Topology, TopologyError> {
        let mut nodes: Vec<Node> = Vec::new();
        let mut levels: Vec<Vec<NodeId>> = vec![Vec::new(); 4];
        let mut pu_by_os = HashMap::new();

        let push = |nodes: &mut Vec<Node>, levels: &mut Vec<Vec<NodeId>>, node: Node| {
            let id = NodeId(nodes.len());
            if let Some(parent) = node.parent {
                nodes[parent.0].children.push(id);
            }
            levels[node.depth].push(id);
            nodes.push(node);
            id
        };

        let machine = push(
            &mut nodes,
            &mut levels,
            Node {
                kind: NodeKind::Machine,
                depth: 0,
                logical_index: 0,
                os_index: 0,
                parent: None,
                children: Vec::new(),
                subtype: None,
            },
        );

        for (numa_index, spec) in self.numa.into_iter().enumerate() {
            let numa = push(
                &mut nodes,
                &mut levels,
                Node {
                    kind: NodeKind::NumaNode,
                    depth: 1,
                    logical_index: numa_index,
                    os_index: numa_index,
                    parent: Some(machine),
                    children: Vec::new(),
                    subtype: spec.subtype,
                },
            );
            for pus in spec.cores {
                let core_index = levels[2].len();
                if pus.is_empty() {
                    return Err(TopologyError::EmptyCore { core: core_index });
                }
                let core = push(
                    &mut nodes,
                    &mut levels,
                    Node {
                        kind: NodeKind::Core,
                        depth: 2,
                        logical_index: core_index,
                        os_index: core_index,
                        parent: Some(numa),
                        children: Vec::new(),
                        subtype: None,
                    },
                );
                for os_index in pus {
                    let pu_index = levels[3].len();
                    let pu = push(
                        &mut nodes,
                        &mut levels,
                        Node {
                            kind: NodeKind::Pu,
                            depth: 3,
                            logical_index: pu_index,
                            os_index,
                            parent: Some(core),
                            children: Vec::new(),
                            subtype: None,
                        },
                    );
                    if pu_by_os.insert(os_index, pu).is_some() {
                        return Err(TopologyError::DuplicateOsIndex(os_index));
                    }
                }
            }
        }

        if levels[3].is_empty() {
            return Err(TopologyError::NoProcessingUnits);
        }

        Ok(Topology {
            nodes,
            levels,
            pu_by_os,
        })
    }
}
