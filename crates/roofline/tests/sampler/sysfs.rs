//! Topology discovery from a synthetic sysfs tree.

use std::fs;
use std::path::Path;

use roofline::topology::load_from;
use roofline::TopologyError;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn add_cpu(root: &Path, cpu: usize, package: usize, core: usize) {
    write(root, &format!("cpu/cpu{}/topology/physical_package_id", cpu), &format!("{}\n", package));
    write(root, &format!("cpu/cpu{}/topology/core_id", cpu), &format!("{}\n", core));
}

#[test]
fn two_nodes_with_smt_and_a_memory_node() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "cpu/online", "0-3\n");
    add_cpu(root, 0, 0, 0);
    add_cpu(root, 2, 0, 0);
    add_cpu(root, 1, 1, 0);
    add_cpu(root, 3, 1, 1);
    write(root, "node/node0/cpulist", "0,2\n");
    write(root, "node/node1/cpulist", "1,3\n");
    write(root, "node/node2/cpulist", "\n");

    let topo = load_from(root).unwrap();
    assert_eq!(topo.nodes_at_depth(1).len(), 3);
    assert_eq!(topo.nodes_at_depth(2).len(), 3);
    let os: Vec<usize> = topo.leaves().iter().map(|l| topo.node(*l).os_index()).collect();
    assert_eq!(os, vec![0, 2, 1, 3]);

    let numa = topo.nodes_at_depth(1);
    assert_eq!(topo.leaf_span(numa[0]), Some((0, 2)));
    assert_eq!(topo.leaf_span(numa[1]), Some((2, 2)));
    assert_eq!(topo.leaf_span(numa[2]), None);
    // SMT siblings share a core.
    assert_eq!(topo.node(topo.nodes_at_depth(2)[0]).children().len(), 2);
}

#[test]
fn offline_cpus_are_skipped() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "cpu/online", "0-1\n");
    for c in 0..4 {
        add_cpu(root, c, 0, c);
    }
    write(root, "node/node0/cpulist", "0-3\n");

    let topo = load_from(root).unwrap();
    assert_eq!(topo.leaf_count(), 2);
    assert_eq!(topo.pu_by_os_index(3), None);
}

#[test]
fn no_numa_directory_means_one_node() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    write(root, "cpu/online", "0-2\n");
    add_cpu(root, 0, 0, 0);
    add_cpu(root, 1, 0, 1);
    add_cpu(root, 2, 0, 2);

    let topo = load_from(root).unwrap();
    assert_eq!(topo.nodes_at_depth(1).len(), 1);
    assert_eq!(topo.nodes_at_depth(2).len(), 3);
    assert_eq!(topo.leaf_count(), 3);
}

#[test]
fn missing_online_list_falls_back_to_cpu_directories() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    add_cpu(root, 0, 0, 0);
    add_cpu(root, 1, 0, 1);
    fs::create_dir_all(root.join("cpu/cpufreq")).unwrap();

    let topo = load_from(root).unwrap();
    assert_eq!(topo.leaf_count(), 2);
}

#[test]
fn empty_tree_is_an_error() {
    let dir = tempdir().unwrap();
    assert_eq!(load_from(dir.path()).unwrap_err(), TopologyError::NoProcessingUnits);
}
