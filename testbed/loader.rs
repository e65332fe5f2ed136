//! # Topology Loader
//!
//! Reads trust graphs in networkx node-link JSON (`nodes`, `links`, node key
//! `id`). A file either carries fully attributed nodes, which become a
//! [`TrustGraph`] as-is, or bare nodes with at most `sybil` and `community`,
//! which still need identity assignment. Attributed nodes without a `name`
//! get the identifier hashed from their label.

use serde::Deserialize;
use serde_json::Value;
use sloppy_sim::{GroupPrefix, Node, NodeIdentifier, RawTopology, SimError, TrustGraph};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::TestbedResult;

/// A loaded topology, attributed or awaiting identity assignment
#[derive(Debug, Clone)]
pub enum TopologyInput {
    Attributed(TrustGraph),
    Raw(RawTopology),
}

impl TopologyInput {
    pub fn node_count(&self) -> usize {
        match self {
            TopologyInput::Attributed(graph) => graph.node_count(),
            TopologyInput::Raw(raw) => raw.node_count(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodeLinkDocument {
    nodes: Vec<NodeRecord>,
    #[serde(default, alias = "edges")]
    links: Vec<LinkRecord>,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    id: Value,
    #[serde(default)]
    sybil: bool,
    #[serde(default)]
    landmark: bool,
    community: Option<String>,
    name: Option<String>,
    group: Option<String>,
    group_bits: Option<usize>,
    vicinity_size: Option<usize>,
    sg_degree: Option<usize>,
    cn_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LinkRecord {
    source: Value,
    target: Value,
}

fn configuration(message: String) -> SimError {
    SimError::Configuration(message)
}

/// Node ids may be strings or numbers; numbers are labelled by their decimal form
fn label_of(id: &Value) -> Result<String, SimError> {
    match id {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(configuration(format!("unsupported node id {}", other))),
    }
}

impl NodeRecord {
    fn attribute_count(&self) -> usize {
        [
            self.name.is_some(),
            self.group.is_some(),
            self.group_bits.is_some(),
            self.vicinity_size.is_some(),
            self.sg_degree.is_some(),
            self.cn_size.is_some(),
        ]
        .into_iter()
        .filter(|&present| present)
        .count()
    }

    fn into_node(self, label: String) -> Result<Node, SimError> {
        let missing = |key: &str| configuration(format!("node {} is missing attribute {}", label, key));

        let group = self.group.as_deref().ok_or_else(|| missing("group"))?;
        let group_bits = self.group_bits.ok_or_else(|| missing("group_bits"))?;

        let id = match self.name.as_deref() {
            Some(name) => NodeIdentifier::parse(name)
                .map_err(|e| configuration(format!("node {}: name: {}", label, e)))?,
            None => NodeIdentifier::from_label(&label),
        };
        let group_prefix = GroupPrefix::parse(group)
            .map_err(|e| configuration(format!("node {}: group: {}", label, e)))?;

        if group_prefix.len() != group_bits {
            return Err(configuration(format!(
                "node {}: group_bits is {} but group [{}] has {} bits",
                label,
                group_bits,
                group,
                group_prefix.len()
            )));
        }
        if !id.has_prefix(&group_prefix) {
            return Err(configuration(format!(
                "node {}: group [{}] is not a prefix of its identifier",
                label, group
            )));
        }

        Ok(Node {
            id,
            group_prefix,
            is_sybil: self.sybil,
            is_landmark: self.landmark,
            vicinity_capacity: self.vicinity_size.ok_or_else(|| missing("vicinity_size"))?,
            overlay_fanout: self.sg_degree.ok_or_else(|| missing("sg_degree"))?,
            color_bucket_capacity: self.cn_size.ok_or_else(|| missing("cn_size"))?,
            community: self.community,
            label,
        })
    }
}

/// Parse a node-link JSON document
pub fn parse_topology(text: &str) -> TestbedResult<TopologyInput> {
    let document: NodeLinkDocument = serde_json::from_str(text)?;

    let mut positions = HashMap::new();
    let mut labels = Vec::with_capacity(document.nodes.len());
    for (position, record) in document.nodes.iter().enumerate() {
        let label = label_of(&record.id)?;
        if positions.insert(label.clone(), position).is_some() {
            return Err(configuration(format!("duplicate node id {}", label)).into());
        }
        labels.push(label);
    }

    let mut edges = Vec::with_capacity(document.links.len());
    for link in &document.links {
        let endpoint = |id: &Value| -> Result<usize, SimError> {
            let label = label_of(id)?;
            positions
                .get(&label)
                .copied()
                .ok_or_else(|| configuration(format!("link references unknown node {}", label)))
        };
        edges.push((endpoint(&link.source)?, endpoint(&link.target)?));
    }

    let attributed = document.nodes.iter().filter(|record| record.attribute_count() > 0).count();

    let input = if attributed == 0 {
        let mut raw = RawTopology::new();
        for (record, label) in document.nodes.iter().zip(&labels) {
            raw.add_node(label, record.sybil, record.community.as_deref());
        }
        for &(a, b) in &edges {
            raw.add_edge(a, b);
        }
        TopologyInput::Raw(raw)
    } else {
        if attributed != document.nodes.len() {
            return Err(configuration(format!(
                "{} of {} nodes carry identity attributes; either all or none must",
                attributed,
                document.nodes.len()
            ))
            .into());
        }
        let nodes = document
            .nodes
            .into_iter()
            .zip(labels)
            .map(|(record, label)| record.into_node(label))
            .collect::<Result<Vec<_>, _>>()?;
        TopologyInput::Attributed(TrustGraph::from_parts(nodes, edges)?)
    };

    Ok(input)
}

pub fn load_topology(path: &Path) -> TestbedResult<TopologyInput> {
    let text = fs::read_to_string(path)?;
    let input = parse_topology(&text)?;
    info!(
        "Loaded {} nodes from {} ({})",
        input.node_count(),
        path.display(),
        match input {
            TopologyInput::Attributed(_) => "attributed",
            TopologyInput::Raw(_) => "raw",
        }
    );
    Ok(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestbedError;
    use std::io::Write;

    fn attributed_node(id: &str, name: &str, group: &str, sybil: bool) -> String {
        format!(
            r#"{{"id": "{}", "name": "{}", "group": "{}", "group_bits": {}, "sybil": {},
                "vicinity_size": 4, "sg_degree": 2, "cn_size": 2, "community": "honest"}}"#,
            id,
            name,
            group,
            group.len(),
            sybil
        )
    }

    fn is_configuration_error<T: std::fmt::Debug>(result: TestbedResult<T>) -> bool {
        matches!(result, Err(TestbedError::Simulation(SimError::Configuration(_))))
    }

    #[test]
    fn test_load_attributed_topology() {
        let text = format!(
            r#"{{"directed": false, "nodes": [{}, {}], "links": [{{"source": "a", "target": "b"}}]}}"#,
            attributed_node("a", "0110", "01", false),
            attributed_node("b", "0101", "01", true)
        );
        let TopologyInput::Attributed(graph) = parse_topology(&text).unwrap() else {
            panic!("expected attributed topology");
        };

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
        let b = graph.index_of("b").unwrap();
        assert!(graph.node(b).is_sybil);
        assert_eq!(graph.node(b).group_prefix.to_string(), "01");
        assert_eq!(graph.node(b).overlay_fanout, 2);
    }

    fn unnamed_node(id: &str, group: &str) -> String {
        format!(
            r#"{{"id": "{}", "group": "{}", "group_bits": {}, "sybil": false,
                "vicinity_size": 4, "sg_degree": 2, "cn_size": 2}}"#,
            id,
            group,
            group.len()
        )
    }

    #[test]
    fn test_missing_name_falls_back_to_label_hash() {
        let group_a = NodeIdentifier::from_label("a").prefix(2).to_string();
        let group_b = NodeIdentifier::from_label("b").prefix(2).to_string();
        let text = format!(
            r#"{{"nodes": [{}, {}], "links": [{{"source": "a", "target": "b"}}]}}"#,
            unnamed_node("a", &group_a),
            unnamed_node("b", &group_b)
        );
        let TopologyInput::Attributed(graph) = parse_topology(&text).unwrap() else {
            panic!("expected attributed topology");
        };

        let a = graph.index_of("a").unwrap();
        assert_eq!(graph.node(a).id, NodeIdentifier::from_label("a"));
        assert_eq!(graph.node(a).group_prefix.to_string(), group_a);
        assert_eq!(graph.node(a).overlay_fanout, 2);
    }

    #[test]
    fn test_label_hash_must_match_group() {
        let group = NodeIdentifier::from_label("a").prefix(1).to_string();
        let flipped = if group == "0" { "1" } else { "0" };
        let text = format!(r#"{{"nodes": [{}], "links": []}}"#, unnamed_node("a", flipped));
        assert!(is_configuration_error(parse_topology(&text)));
    }

    #[test]
    fn test_load_raw_topology_with_numeric_ids() {
        let text = r#"{"nodes": [{"id": 0}, {"id": 1, "sybil": true, "community": "sybil"}],
                       "links": [{"source": 0, "target": 1}]}"#;
        let TopologyInput::Raw(raw) = parse_topology(text).unwrap() else {
            panic!("expected raw topology");
        };
        assert_eq!(raw.node_count(), 2);
        assert_eq!(raw.position_of("1"), Some(1));
        assert!(raw.nodes()[1].is_sybil);
        assert_eq!(raw.edges(), &[(0, 1)]);
    }

    #[test]
    fn test_partial_attributes_rejected() {
        let text = r#"{"nodes": [{"id": "a", "name": "01"}], "links": []}"#;
        assert!(is_configuration_error(parse_topology(text)));

        let mixed = format!(
            r#"{{"nodes": [{}, {{"id": "b"}}], "links": []}}"#,
            attributed_node("a", "0110", "01", false)
        );
        assert!(is_configuration_error(parse_topology(&mixed)));
    }

    #[test]
    fn test_group_must_prefix_name() {
        let text = format!(r#"{{"nodes": [{}], "links": []}}"#, attributed_node("a", "0110", "10", false));
        assert!(is_configuration_error(parse_topology(&text)));
    }

    #[test]
    fn test_group_bits_must_match() {
        let text = r#"{"nodes": [{"id": "a", "name": "0110", "group": "01", "group_bits": 3,
                      "vicinity_size": 1, "sg_degree": 1, "cn_size": 1}], "links": []}"#;
        assert!(is_configuration_error(parse_topology(text)));
    }

    #[test]
    fn test_dangling_link_rejected() {
        let text = r#"{"nodes": [{"id": "a"}], "links": [{"source": "a", "target": "zz"}]}"#;
        assert!(is_configuration_error(parse_topology(text)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"nodes": [{{"id": "x"}}, {{"id": "y"}}], "links": [{{"source": "x", "target": "y"}}]}}"#).unwrap();
        let input = load_topology(file.path()).unwrap();
        assert_eq!(input.node_count(), 2);
        assert!(matches!(input, TopologyInput::Raw(_)));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        assert!(matches!(parse_topology("{nodes"), Err(TestbedError::Json(_))));
    }
}
