//! Topology discovery from Linux sysfs.
//!
//! Reads, under a root that defaults to `/sys/devices/system`:
//!
//! - `cpu/online`: CPUs to include
//! - `cpu/cpuN/topology/core_id` and `physical_package_id`: core grouping
//! - `node/nodeN/cpulist`: NUMA membership
//!
//! Without any `node/nodeN` directory (kernels built without NUMA) all
//! online CPUs form a single NUMA node. Nodes with an empty cpulist become
//! memory-only nodes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use roofline_core::{Topology, TopologyBuilder, TopologyError};

/// Default sysfs root.
pub const SYSFS_ROOT: &str = "/sys/devices/system";

/// Discover the host topology.
pub fn load() -> Result<Topology, TopologyError> {
    load_from(Path::new(SYSFS_ROOT))
}

/// Discover a topology from a sysfs-shaped tree rooted at `root`.
///
/// # Errors
///
/// Fails if no online CPU can be found or a list file is malformed.
pub fn load_from(root: &Path) -> Result<Topology, TopologyError> {
    let cpu_dir = root.join("cpu");
    let online = match read_trimmed(&cpu_dir.join("online")) {
        Some(list) => parse_cpulist(&list)?,
        None => enumerate_indexed(&cpu_dir, "cpu")?,
    };
    if online.is_empty() {
        return Err(TopologyError::NoProcessingUnits);
    }

    let nodes = enumerate_indexed(&root.join("node"), "node")?;
    let mut builder = TopologyBuilder::new();
    if nodes.is_empty() {
        tracing::debug!("No NUMA nodes in sysfs, using a single node");
        builder = builder.numa_node(group_cores(&cpu_dir, &online));
    } else {
        let mut assigned = 0;
        for node in &nodes {
            let path = root.join("node").join(format!("node{}", node)).join("cpulist");
            let cpus: Vec<usize> = match read_trimmed(&path) {
                Some(list) => parse_cpulist(&list)?,
                None => Vec::new(),
            }
            .into_iter()
            .filter(|cpu| online.contains(cpu))
            .collect();
            assigned += cpus.len();
            builder = if cpus.is_empty() {
                builder.memory_node(None)
            } else {
                builder.numa_node(group_cores(&cpu_dir, &cpus))
            };
        }
        if assigned < online.len() {
            tracing::warn!(
                online = online.len(),
                assigned,
                "Some online CPUs belong to no NUMA node and will not be sampled"
            );
        }
    }

    let topology = builder.build()?;
    tracing::debug!(
        numa_nodes = topology.nodes_at_depth(1).len(),
        cores = topology.nodes_at_depth(2).len(),
        pus = topology.leaf_count(),
        "Loaded topology from {}",
        root.display()
    );
    Ok(topology)
}

/// Parse a kernel CPU list such as `0-3,8,10-11`.
pub fn parse_cpulist(list: &str) -> Result<Vec<usize>, TopologyError> {
    let mut cpus = Vec::new();
    for part in list.trim().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parse = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| TopologyError::Discovery(format!("bad cpu list entry {:?}", part)))
        };
        match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse(lo)?, parse(hi)?);
                if lo > hi {
                    return Err(TopologyError::Discovery(format!(
                        "bad cpu list range {:?}",
                        part
                    )));
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(parse(part)?),
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// Group `cpus` into cores by (package, core id), ordered by their lowest CPU.
fn group_cores(cpu_dir: &Path, cpus: &[usize]) -> Vec<Vec<usize>> {
    let mut cores: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    for &cpu in cpus {
        let topo = cpu_dir.join(format!("cpu{}", cpu)).join("topology");
        let read_id = |name: &str| read_trimmed(&topo.join(name)).and_then(|s| s.parse::<usize>().ok());
        // A CPU without topology files is its own core.
        let key = match (read_id("physical_package_id"), read_id("core_id")) {
            (Some(package), Some(core)) => (package, core),
            (None, Some(core)) => (0, core),
            _ => (usize::MAX, cpu),
        };
        cores.entry(key).or_default().push(cpu);
    }
    let mut cores: Vec<Vec<usize>> = cores.into_values().collect();
    for core in &mut cores {
        core.sort_unstable();
    }
    cores.sort_by_key(|core| core[0]);
    cores
}

/// Sorted numeric suffixes of `<prefix>N` entries in `dir`.
fn enumerate_indexed(dir: &Path, prefix: &str) -> Result<Vec<usize>, TopologyError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(TopologyError::Discovery(format!(
                "cannot read {}: {}",
                dir.display(),
                e
            )))
        }
    };
    let mut indices: Vec<usize> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            entry
                .file_name()
                .to_str()?
                .strip_prefix(prefix)?
                .parse::<usize>()
                .ok()
        })
        .collect();
    indices.sort_unstable();
    Ok(indices)
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}
