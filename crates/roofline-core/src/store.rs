//! One persistent sample per leaf hardware thread, grouped for reduction.
//!
//! Samples are stored in leaf logical order. Because the topology numbers
//! leaves depth-first, the leaves beneath each reduction-level node are a
//! contiguous block, and each [`ReductionGroup`] is just a [`SubRange`] of
//! the owning list. Every leaf belongs to exactly one group.

use std::fmt;
use std::sync::Arc;

use crate::counters::{CounterError, CounterReader};
use crate::list::{FixedList, ListError, SubRange};
use crate::sample::{Sample, SampleRecord};
use crate::topology::{NodeId, Topology};

/// Error returned while building a [`SampleStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A leaf's counter handle could not be opened.
    Counter(CounterError),
    /// The leaf list could not hold the topology.
    List(ListError),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Counter(e) => write!(f, "sample store: {}", e),
            StoreError::List(e) => write!(f, "sample store: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Counter(e) => Some(e),
            StoreError::List(e) => Some(e),
        }
    }
}

impl From<CounterError> for StoreError {
    fn from(e: CounterError) -> Self {
        StoreError::Counter(e)
    }
}

impl From<ListError> for StoreError {
    fn from(e: ListError) -> Self {
        StoreError::List(e)
    }
}

/// The leaves beneath one reduction-level node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReductionGroup {
    node: NodeId,
    range: SubRange,
}

impl ReductionGroup {
    /// Reduction-level node the group reports as.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Leaf logical indices covered by the group.
    pub fn range(&self) -> SubRange {
        self.range
    }
}

/// Owner of every leaf sample plus the reduction groups over them.
pub struct SampleStore<H> {
    samples: FixedList<Sample<H>>,
    groups: Vec<ReductionGroup>,
    depth: usize,
}

impl<H: Send + 'static> SampleStore<H> {
    /// Open one sample per leaf of `topology` and group them by their
    /// ancestor at `depth`.
    ///
    /// Nodes at `depth` without children (memory-only NUMA nodes) get no
    /// group. Counter handles are closed through `reader` when the store is
    /// dropped, including when construction fails part way.
    ///
    /// # Errors
    ///
    /// Fails if any leaf's counter handle cannot be opened.
    pub fn build<R>(topology: &Topology, depth: usize, reader: Arc<R>) -> Result<Self, StoreError>
    where
        R: CounterReader<Handle = H> + 'static,
    {
        let leaves = topology.leaves();
        let closer = Arc::clone(&reader);
        let mut samples = FixedList::with_release(leaves.len(), move |sample: &mut Sample<H>| {
            sample.close(&*closer)
        });
        for leaf in leaves {
            samples.push(Sample::open(topology, *leaf, depth, &*reader)?)?;
        }

        let mut groups = Vec::new();
        for node in topology.nodes_at_depth(depth) {
            if let Some((start, len)) = topology.leaf_span(*node) {
                groups.push(ReductionGroup {
                    node: *node,
                    range: samples.sub_range(start, len)?,
                });
            }
        }

        tracing::debug!(
            leaves = samples.len(),
            groups = groups.len(),
            depth,
            reader = reader.name(),
            "Sample store built"
        );

        Ok(Self {
            samples,
            groups,
            depth,
        })
    }
}

impl<H> SampleStore<H> {
    /// Sample of the leaf with logical index `logical`.
    #[inline]
    pub fn get(&self, logical: usize) -> &Sample<H> {
        self.samples.get(logical)
    }

    /// Number of leaf samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the store holds no sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Reduction depth the groups were built for.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Reduction groups in logical order.
    pub fn groups(&self) -> &[ReductionGroup] {
        &self.groups
    }

    /// Samples covered by `group`.
    pub fn members(&self, group: &ReductionGroup) -> &[Sample<H>] {
        self.samples.view(group.range)
    }

    /// Fold the samples of one group into a single record.
    pub fn reduce(&self, group: &ReductionGroup) -> SampleRecord {
        self.samples
            .reduce(group.range, SampleRecord::empty(group.node), |acc, sample| {
                acc.accumulate(&sample.record())
            })
    }

    /// Reduce every group, in logical order.
    pub fn reduce_all(&self) -> Vec<SampleRecord> {
        self.groups.iter().map(|group| self.reduce(group)).collect()
    }

    /// Zero every sample and clear its attachment counters for the next
    /// window. All samples are visited even if a reset fails; the first
    /// failure is returned.
    pub fn reset_all<R>(&self, reader: &R) -> Result<(), CounterError>
    where
        R: CounterReader<Handle = H> + ?Sized,
    {
        let mut first_err = None;
        self.samples.apply(|sample| {
            if let Err(e) = sample.reset(reader) {
                first_err.get_or_insert(e);
            }
            sample.clear_threads();
        });
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Iterate over every leaf sample.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample<H>> {
        self.samples.iter()
    }
}

impl<H> fmt::Debug for SampleStore<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleStore")
            .field("leaves", &self.samples.len())
            .field("groups", &self.groups)
            .field("depth", &self.depth)
            .finish()
    }
}
