//! Smoke tests on the real machine.
//!
//! Sysfs, affinity and perf_event may all be restricted (containers, CI), so
//! these only check behaviour that must hold whenever the environment allows
//! the operation.

use roofline::{AffinityGuard, ReductionLevel, Sampler, SamplerConfig, WorkCounts};
use tempfile::tempdir;

#[test]
fn external_sampler_on_host_topology() {
    let dir = tempdir().unwrap();
    let config = SamplerConfig::new()
        .output_file(dir.path().join("host.out"))
        .reduction(ReductionLevel::Machine);
    let sampler = match Sampler::external(config) {
        Ok(sampler) => sampler,
        Err(e) => {
            eprintln!("Skipping: {}", e);
            return;
        }
    };

    // Pinning makes start and stop resolve to the same leaf.
    let _pin = AffinityGuard::pin_current().ok();
    let handle = sampler.start(Some(WorkCounts::new(64, 128)));
    let Some(handle) = handle else {
        eprintln!("Skipping: thread binding unavailable");
        return;
    };
    assert!(handle.leaf() < sampler.topology().leaf_count());
    let records = sampler.stop(Some(handle), Some("host")).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flops, 64);
    assert_eq!(records[0].bytes, 128);
    assert_eq!(records[0].n_threads, 1);
}

#[cfg(all(target_os = "linux", feature = "perf"))]
#[test]
fn hardware_sampler_degrades_cleanly() {
    let dir = tempdir().unwrap();
    let config = SamplerConfig::new().output_file(dir.path().join("hw.out"));
    match Sampler::hardware(config) {
        Ok(sampler) => {
            let _pin = AffinityGuard::pin_current().ok();
            let handle = sampler.start(None);
            let _ = sampler.stop(handle, None);
        }
        Err(e) => assert!(!e.to_string().is_empty()),
    }
}
