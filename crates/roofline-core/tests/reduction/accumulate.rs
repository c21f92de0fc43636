//! Group folding: slowest window wins, counts add up.

use std::sync::Arc;

use proptest::prelude::*;
use roofline_core::{ExternalCounts, NodeId, SampleRecord, SampleStore, TopologyBuilder, WorkCounts};

fn location() -> NodeId {
    TopologyBuilder::uniform(1, 1, 1)
        .build()
        .unwrap()
        .nodes_at_depth(1)[0]
}

fn record(start_ns: u64, elapsed: u64, flops: u64, bytes: u64) -> SampleRecord {
    SampleRecord {
        location: location(),
        start_ns,
        end_ns: start_ns + elapsed,
        bytes,
        flops,
        n_threads: 1,
    }
}

fn fold(records: &[SampleRecord]) -> SampleRecord {
    records
        .iter()
        .fold(SampleRecord::empty(location()), |acc, r| acc.accumulate(r))
}

#[test]
fn two_samples_in_one_numa_node() {
    let a = record(1_000, 100, 10, 20);
    let b = record(2_000, 150, 5, 5);
    for folded in [fold(&[a, b]), fold(&[b, a])] {
        assert_eq!(folded.elapsed_ns(), 150);
        assert_eq!(folded.flops, 15);
        assert_eq!(folded.bytes, 25);
        assert_eq!(folded.n_threads, 2);
    }
}

#[test]
fn unused_samples_do_not_contribute() {
    let used = record(500, 80, 7, 9);
    let folded = fold(&[SampleRecord::empty(location()), used, SampleRecord::empty(location())]);
    assert_eq!(folded.elapsed_ns(), 80);
    assert_eq!((folded.flops, folded.bytes, folded.n_threads), (7, 9, 1));
}

#[test]
fn store_reduction_with_caller_counts() {
    let topo = TopologyBuilder::uniform(1, 2, 1).build().unwrap();
    let reader = Arc::new(ExternalCounts);
    let store = SampleStore::build(&topo, 1, Arc::clone(&reader)).unwrap();

    for (logical, (start, end)) in [(1_000u64, 1_100u64), (2_000, 2_150)].into_iter().enumerate() {
        let sample = store.get(logical);
        sample.attach();
        sample.add_work(WorkCounts::new(10, 10));
        assert!(sample.try_open());
        sample.arm(&*reader, || start).unwrap();
        assert!(sample.try_close());
        sample.finalize(&*reader, end, Default::default()).unwrap();
    }

    let records = store.reduce_all();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].elapsed_ns(), 150);
    assert_eq!(records[0].flops, 20);
    assert_eq!(records[0].n_threads, 2);
}

proptest! {
    #[test]
    fn fold_is_order_independent(
        raw in prop::collection::vec((0u64..1_000, 0u64..1_000, 0u64..1_000_000, 0u64..1_000_000), 1..16),
        seed in any::<u64>(),
    ) {
        // Distinct durations so the slowest window is unambiguous.
        let records: Vec<SampleRecord> = raw
            .iter()
            .enumerate()
            .map(|(i, (start, elapsed, flops, bytes))| {
                record(*start, elapsed * 16 + i as u64, *flops, *bytes)
            })
            .collect();
        let mut shuffled = records.clone();
        let len = shuffled.len();
        shuffled.rotate_left((seed as usize) % len);
        shuffled.reverse();

        let a = fold(&records);
        let b = fold(&shuffled);
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.elapsed_ns(), records.iter().map(|r| r.elapsed_ns()).max().unwrap());
        prop_assert_eq!(a.flops, records.iter().map(|r| r.flops).sum::<u64>());
        prop_assert_eq!(a.n_threads, len as u64);
    }
}
