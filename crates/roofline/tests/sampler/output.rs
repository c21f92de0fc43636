//! File output: header placement, append mode, formats and info tags.

use std::fs;

use roofline::{
    NodeRecord, OutputFormat, ReductionLevel, Sampler, SamplerConfig, SamplerError,
    TopologyBuilder, WorkCounts,
};
use tempfile::tempdir;

use crate::common::{on_cpu, ScriptedCounters};

fn run_once(config: SamplerConfig, info: Option<&str>) -> Vec<NodeRecord> {
    let sampler = Sampler::new(
        config.reduction(ReductionLevel::Machine).max_threads(1),
        TopologyBuilder::uniform(1, 1, 1).build().unwrap(),
        ScriptedCounters::external(),
    )
    .unwrap()
    .with_locator(on_cpu(0));
    let handle = sampler.start(Some(WorkCounts::new(3, 4)));
    sampler.stop(handle, info).unwrap()
}

#[test]
fn truncate_writes_header_each_time() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("roofline.out");

    run_once(SamplerConfig::new().output_file(&path), Some("a"));
    run_once(SamplerConfig::new().output_file(&path), Some("b"));

    let out = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].trim_start().starts_with("Location"));
    assert!(lines[1].ends_with(" b"));
}

#[test]
fn append_writes_header_only_for_new_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("roofline.out");

    for tag in ["first", "second", "third"] {
        run_once(SamplerConfig::new().output_file(&path).append(true), Some(tag));
    }

    let out = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines.iter().filter(|l| l.trim_start().starts_with("Location")).count(),
        1
    );
    assert!(lines[3].ends_with(" third"));
}

#[test]
fn json_lines_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("roofline.jsonl");

    let returned = run_once(
        SamplerConfig::new()
            .output_file(&path)
            .format(OutputFormat::JsonLines),
        Some("json"),
    );

    let out = fs::read_to_string(&path).unwrap();
    let parsed: Vec<NodeRecord> = out
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(parsed, returned);
    assert_eq!(parsed[0].location, "Machine:0");
    assert_eq!((parsed[0].flops, parsed[0].bytes), (3, 4));
}

#[test]
fn info_joins_caller_and_environment() {
    let dir = tempdir().unwrap();
    let var = "ROOFLINE_TEST_INFO_JOIN";
    std::env::set_var(var, "node7");

    let config = || {
        SamplerConfig::new()
            .output_file(dir.path().join("info.out"))
            .info_env_var(var)
    };
    assert_eq!(run_once(config(), Some("run"))[0].info, "run_node7");
    assert_eq!(run_once(config().info("default"), None)[0].info, "default_node7");
    std::env::remove_var(var);
    assert_eq!(run_once(config(), Some("run"))[0].info, "run");
    assert_eq!(run_once(config(), None)[0].info, "");
}

#[test]
fn unopenable_output_fails_init() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("roofline.out");
    let err = Sampler::new(
        SamplerConfig::new().output_file(&path),
        TopologyBuilder::uniform(1, 1, 1).build().unwrap(),
        ScriptedCounters::external(),
    )
    .unwrap_err();
    assert!(matches!(err, SamplerError::Output { .. }));
    assert!(err.to_string().contains("roofline.out"));
}
