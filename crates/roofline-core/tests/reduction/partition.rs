//! Reduction groups partition the leaves.

use std::sync::Arc;

use proptest::prelude::*;
use roofline_core::{
    ExternalCounts, NodeKind, ReductionLevel, SampleStore, Topology, TopologyBuilder,
};

/// Machines of 1-4 NUMA nodes, each with 0-4 cores of 1-4 threads. A NUMA
/// node with zero cores is memory-only.
fn arb_topology() -> impl Strategy<Value = Topology> {
    prop::collection::vec(prop::collection::vec(1usize..=4, 0..=4), 1..=4)
        .prop_filter("needs at least one core", |numa| {
            numa.iter().any(|cores| !cores.is_empty())
        })
        .prop_map(|numa| {
            let mut builder = TopologyBuilder::new();
            let mut cpu = 0;
            for cores in numa {
                if cores.is_empty() {
                    builder = builder.memory_node(None);
                    continue;
                }
                let described: Vec<Vec<usize>> = cores
                    .into_iter()
                    .map(|threads| {
                        let pus: Vec<usize> = (cpu..cpu + threads).collect();
                        cpu += threads;
                        pus
                    })
                    .collect();
                builder = builder.numa_node(described);
            }
            builder.build().expect("generated topology is valid")
        })
}

proptest! {
    #[test]
    fn every_leaf_in_exactly_one_group(topo in arb_topology()) {
        for level in ReductionLevel::ALL {
            let depth = topo.reduction_depth(level);
            let store = SampleStore::build(&topo, depth, Arc::new(ExternalCounts)).unwrap();

            let mut owner = vec![None; topo.leaf_count()];
            for group in store.groups() {
                for logical in group.range().indices() {
                    prop_assert!(owner[logical].is_none(), "leaf {} grouped twice", logical);
                    owner[logical] = Some(group.node());
                }
            }
            for (logical, group) in owner.iter().enumerate() {
                let leaf = topo.leaves()[logical];
                let group = group.expect("leaf left ungrouped");
                prop_assert_eq!(topo.ancestor_at(leaf, depth), group);
                prop_assert_eq!(store.get(logical).location(), group);
            }
        }
    }

    #[test]
    fn childless_nodes_have_no_group(topo in arb_topology()) {
        let depth = topo.reduction_depth(ReductionLevel::Numa);
        let store = SampleStore::build(&topo, depth, Arc::new(ExternalCounts)).unwrap();
        let populated = topo
            .nodes_at_depth(depth)
            .iter()
            .filter(|id| !topo.node(**id).is_childless())
            .count();
        prop_assert_eq!(store.groups().len(), populated);
        for group in store.groups() {
            prop_assert_eq!(topo.node(group.node()).kind(), NodeKind::NumaNode);
        }
    }
}
