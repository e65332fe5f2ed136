//! Topology file in, mismatch lines and GML files out.

use sloppy_testbed::{Runner, StorePolicy, TestbedConfig};
use std::fs;

/// Two Watts-Strogatz-like rings joined by a handful of attack edges
fn two_community_topology(honest: usize, sybil: usize) -> String {
    let mut nodes = Vec::new();
    let mut links = Vec::new();

    for i in 0..honest {
        nodes.push(format!(r#"{{"id": "h{}", "community": "honest"}}"#, i));
        links.push(format!(r#"{{"source": "h{}", "target": "h{}"}}"#, i, (i + 1) % honest));
        links.push(format!(r#"{{"source": "h{}", "target": "h{}"}}"#, i, (i + 2) % honest));
    }
    for i in 0..sybil {
        nodes.push(format!(r#"{{"id": "s{}", "sybil": true, "community": "sybil"}}"#, i));
        links.push(format!(r#"{{"source": "s{}", "target": "s{}"}}"#, i, (i + 1) % sybil));
    }
    for i in 0..3 {
        links.push(format!(r#"{{"source": "s{}", "target": "h{}"}}"#, i, i * 5));
    }

    format!(
        r#"{{"directed": false, "multigraph": false, "graph": {{}}, "nodes": [{}], "links": [{}]}}"#,
        nodes.join(", "),
        links.join(", ")
    )
}

#[test]
fn test_runner_on_topology_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("topology.json");
    fs::write(&input, two_community_topology(30, 20)).unwrap();

    let config = TestbedConfig::from_toml_str(&format!(
        r#"
        input = "{}"
        output_dir = "{}"
        iterations = 2
        store = "always"

        [simulation]
        seed = 17
        random_walk = "wire"
        "#,
        input.display(),
        dir.path().join("out").display()
    ))
    .unwrap();

    let mut out = Vec::new();
    let summary = Runner::new(config).unwrap().run(&mut out).unwrap();
    assert_eq!(summary.iterations.len(), 2);

    // Every printed line is one mismatch in the fixed format
    let printed = String::from_utf8(out).unwrap();
    let mismatches: usize = summary.iterations.iter().map(|outcome| outcome.mismatches.len()).sum();
    assert_eq!(printed.lines().count(), mismatches);
    assert!(printed.lines().all(|line| line.contains(" knows ")));

    for iteration in 1..=2 {
        for stem in ["vicinity", "cn", "group", "trust"] {
            let path = dir.path().join("out").join(format!("{}{:03}.gml", stem, iteration));
            let text = fs::read_to_string(&path).unwrap();
            assert!(text.starts_with("graph ["));
            assert_eq!(text.matches("  node [").count(), 50);
        }
    }
}

#[test]
fn test_store_never_leaves_output_empty() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("topology.json");
    fs::write(&input, two_community_topology(12, 6)).unwrap();

    let config = TestbedConfig {
        input: Some(input),
        output_dir: dir.path().join("out"),
        iterations: 1,
        store: StorePolicy::Never,
        ..TestbedConfig::default()
    };
    Runner::new(config).unwrap().run(&mut Vec::new()).unwrap();
    assert!(!dir.path().join("out").exists());
}

#[test]
fn test_missing_file_is_io_error() {
    let config = TestbedConfig {
        input: Some("/nonexistent/topology.json".into()),
        ..TestbedConfig::default()
    };
    let result = Runner::new(config).unwrap().run(&mut Vec::new());
    assert!(matches!(result, Err(sloppy_testbed::TestbedError::Io(_))));
}
