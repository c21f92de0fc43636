//! Team windows end to end.

use roofline::{
    NodeRecord, RawCounts, ReductionLevel, Sampler, SamplerConfig, SimdWidth, Team,
    TopologyBuilder, WorkCounts,
};

use crate::common::{on_cpu, round_robin, Calls, ScriptedCounters, SharedBuffer};

fn window(
    sampler: &Sampler<ScriptedCounters>,
    team: usize,
    counts: WorkCounts,
    info: &str,
) -> Vec<NodeRecord> {
    Team::run(team, |member| {
        let handle = sampler.start_in(&member, Some(counts.share(member.size())));
        sampler.stop_in(&member, handle, Some(info))
    })
    .into_iter()
    .flatten()
    .flatten()
    .collect()
}

fn assert_store_is_clean(sampler: &Sampler<ScriptedCounters>) {
    for sample in sampler.store().iter() {
        let record = sample.record();
        assert_eq!(record.start_ns, 0);
        assert_eq!(record.end_ns, 0);
        assert_eq!(record.bytes, 0);
        assert_eq!(record.flops, 0);
        assert_eq!(record.n_threads, 0);
        assert_eq!(sample.active_threads(), 0);
    }
}

#[test]
fn four_threads_on_one_leaf() {
    for (level, expected) in [(ReductionLevel::Numa, 2), (ReductionLevel::Machine, 1)] {
        let sampler = Sampler::with_writer(
            SamplerConfig::new().reduction(level).max_threads(4),
            TopologyBuilder::uniform(2, 1, 1).build().unwrap(),
            ScriptedCounters::external(),
            SharedBuffer::default(),
        )
        .unwrap()
        .with_locator(on_cpu(0));

        let records = window(&sampler, 4, WorkCounts::new(400, 800), "scenario");
        assert_eq!(records.len(), expected, "{}", level);

        let covering = &records[0];
        assert!(covering.location.ends_with(":0"));
        assert_eq!(covering.n_threads, 4);
        assert_eq!(covering.flops, 400);
        assert_eq!(covering.bytes, 800);
        assert_eq!(covering.kind, "APP");
        assert_eq!(covering.info, "scenario");
        assert_eq!(covering.nanoseconds, covering.end_ns - covering.start_ns);

        for idle in &records[1..] {
            assert_eq!((idle.flops, idle.bytes, idle.n_threads), (0, 0, 0));
        }
    }
}

#[test]
fn windows_do_not_leak_into_each_other() {
    let sampler = Sampler::with_writer(
        SamplerConfig::new()
            .reduction(ReductionLevel::Machine)
            .max_threads(4),
        TopologyBuilder::uniform(1, 2, 2).build().unwrap(),
        ScriptedCounters::external(),
        SharedBuffer::default(),
    )
    .unwrap()
    .with_locator(round_robin(4));

    let first = window(&sampler, 4, WorkCounts::new(400, 800), "first");
    assert_store_is_clean(&sampler);
    let second = window(&sampler, 2, WorkCounts::new(10, 20), "second");
    assert_store_is_clean(&sampler);

    assert_eq!((first[0].flops, first[0].bytes, first[0].n_threads), (400, 800, 4));
    assert_eq!((second[0].flops, second[0].bytes, second[0].n_threads), (10, 20, 2));
}

#[test]
fn hardware_counts_are_derived_per_leaf() {
    let reader = ScriptedCounters::returning(RawCounts {
        scalar_ops: 2,
        packed_ops: 2,
        store_uops: 1,
        load_uops: 3,
    });
    let calls = reader.calls.clone();
    let sampler = Sampler::with_writer(
        SamplerConfig::new()
            .reduction(ReductionLevel::Numa)
            .simd_width(SimdWidth::Packed256)
            .max_threads(2),
        TopologyBuilder::uniform(1, 2, 1).build().unwrap(),
        reader,
        SharedBuffer::default(),
    )
    .unwrap()
    .with_locator(round_robin(2));

    // Caller counts are replaced by the derived ones.
    let records = window(&sampler, 2, WorkCounts::new(1_000, 1_000), "hw");
    assert_eq!(records.len(), 1);
    // Per leaf: flops 2 + 4*2 = 10, bytes (8*4/4) * 10 = 80.
    assert_eq!(records[0].flops, 20);
    assert_eq!(records[0].bytes, 160);
    assert_eq!(records[0].n_threads, 2);
    assert_eq!(Calls::get(&calls.stops), 2);
    // Every leaf is reset after each window.
    assert_eq!(Calls::get(&calls.resets), 2);
}

#[test]
fn handles_close_exactly_once_on_drop() {
    let reader = ScriptedCounters::external();
    let calls = reader.calls.clone();
    let sampler = Sampler::with_writer(
        SamplerConfig::new(),
        TopologyBuilder::uniform(2, 2, 2).build().unwrap(),
        reader,
        SharedBuffer::default(),
    )
    .unwrap();
    assert_eq!(Calls::get(&calls.opens), 8);
    assert_eq!(Calls::get(&calls.closes), 0);
    drop(sampler);
    assert_eq!(Calls::get(&calls.closes), 8);
}

#[test]
fn parallel_window_over_rayon_pool() {
    let n = rayon::current_num_threads();
    let sampler = Sampler::with_writer(
        SamplerConfig::new().reduction(ReductionLevel::Machine),
        TopologyBuilder::uniform(1, n, 1).build().unwrap(),
        ScriptedCounters::external(),
        SharedBuffer::default(),
    )
    .unwrap()
    .with_locator(round_robin(n));

    assert_eq!(sampler.start_parallel(Some(WorkCounts::new(1_000 * n as u64, 0))), None);
    let records = sampler.stop_parallel(Some("parallel"));
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].flops, 1_000 * n as u64);
    assert_eq!(records[0].n_threads, n as u64);
    assert_eq!(records[0].info, "parallel");
}

#[test]
fn window_entered_by_forked_pool() {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let buffer = SharedBuffer::default();
    let reader = ScriptedCounters::external();
    let calls = reader.calls.clone();
    let sampler = Sampler::with_writer(
        SamplerConfig::new()
            .reduction(ReductionLevel::Machine)
            .max_threads(4),
        TopologyBuilder::uniform(1, 4, 1).build().unwrap(),
        reader,
        buffer.clone(),
    )
    .unwrap()
    .with_locator(round_robin(4));

    for window in 1..=2 {
        // Each worker passes its own counts; nothing is split.
        let per_worker = pool.broadcast(|_| {
            let handle = sampler.start_parallel(Some(WorkCounts::new(100, 200)));
            (handle.is_some(), sampler.stop_parallel(Some("forked")))
        });
        assert!(per_worker.iter().all(|(bound, _)| *bound));
        let emitting: Vec<&Vec<NodeRecord>> = per_worker
            .iter()
            .map(|(_, records)| records)
            .filter(|records| !records.is_empty())
            .collect();
        assert_eq!(emitting.len(), 1, "window {}", window);
        let records = emitting[0];
        assert_eq!(records.len(), 1);
        assert_eq!((records[0].flops, records[0].bytes), (400, 800));
        assert_eq!(records[0].n_threads, 4);
        assert_eq!(Calls::get(&calls.starts), 4 * window);
        assert_eq!(Calls::get(&calls.stops), 4 * window);
        assert!(sampler
            .store()
            .iter()
            .all(|s| s.active_threads() == 0 && s.record().flops == 0 && s.record().end_ns == 0));
    }
    // Header plus one record per window.
    assert_eq!(buffer.contents().lines().count(), 3);

    // A pool of another size is not sampled and does not block.
    let other = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    let skipped = other.broadcast(|_| {
        let handle = sampler.start_parallel(Some(WorkCounts::new(1, 1)));
        (handle, sampler.stop_parallel(None))
    });
    assert!(skipped.iter().all(|(h, r)| h.is_none() && r.is_empty()));
    assert_eq!(buffer.contents().lines().count(), 3);
}

#[test]
fn emitted_text_matches_returned_records() {
    let buffer = SharedBuffer::default();
    let sampler = Sampler::with_writer(
        SamplerConfig::new()
            .reduction(ReductionLevel::Core)
            .max_threads(1),
        TopologyBuilder::uniform(1, 3, 1).build().unwrap(),
        ScriptedCounters::external(),
        buffer.clone(),
    )
    .unwrap()
    .with_locator(on_cpu(1));

    let handle = sampler.start(Some(WorkCounts::new(5, 6)));
    let records = sampler.stop(handle, Some("solo")).unwrap();
    assert_eq!(records.len(), 3);

    let out = buffer.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].trim_start().starts_with("Location"));
    let fields: Vec<&str> = lines[2].split_whitespace().collect();
    assert_eq!(fields[0], "Core:1");
    assert_eq!(fields[2], "6");
    assert_eq!(fields[3], "5");
    assert_eq!(fields[4], "1");
    assert_eq!(fields[5], "APP");
    assert_eq!(fields[6], "solo");
}
