//! Convergence verification after gossip reaches its fixed point.

use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::gossip::RecordSets;
use crate::topology::{GroupPrefix, NodeIndex, TrustGraph};
use crate::{SimError, SimResult, Violation};

/// An honest node that is missing honest members of its group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub node: NodeIndex,
    pub label: String,
    pub group: String,
    /// Honest group members the node knows
    pub known: usize,
    /// Honest group members in total
    pub all: usize,
}

impl Mismatch {
    pub fn ratio(&self) -> f64 {
        if self.all == 0 {
            return 1.0;
        }
        self.known as f64 / self.all as f64
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] knows {}/{} ({:.2})",
            self.label,
            self.group,
            self.known,
            self.all,
            self.ratio()
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationReport {
    pub mismatches: Vec<Mismatch>,
    pub honest_checked: usize,
    pub sybil_checked: usize,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Check Sybil record purity, then honest group completeness.
///
/// A Sybil node holding an honest record halts verification with an
/// `InvariantViolation` naming both.
pub fn verify_convergence(graph: &TrustGraph, records: &RecordSets) -> SimResult<VerificationReport> {
    if records.len() != graph.node_count() {
        return Err(SimError::Configuration(format!(
            "record sets cover {} nodes, graph has {}",
            records.len(),
            graph.node_count()
        )));
    }

    let mut report = VerificationReport::default();

    for (node, data) in graph.nodes().filter(|(_, data)| data.is_sybil) {
        if let Some(&record) = records.get(node).iter().find(|&&r| !graph.node(r).is_sybil) {
            return Err(SimError::InvariantViolation(Violation::SybilLearnedHonest {
                node: data.label.clone(),
                record: graph.node(record).label.clone(),
            }));
        }
        report.sybil_checked += 1;
    }

    let mut honest_groups: HashMap<&GroupPrefix, Vec<NodeIndex>> = HashMap::new();
    for (node, data) in graph.nodes().filter(|(_, data)| !data.is_sybil) {
        honest_groups.entry(&data.group_prefix).or_default().push(node);
    }

    for (node, data) in graph.nodes().filter(|(_, data)| !data.is_sybil) {
        report.honest_checked += 1;
        let all = honest_groups.get(&data.group_prefix).map_or(&[][..], Vec::as_slice);
        let known = all.iter().filter(|&&member| records.knows(node, member)).count();

        if known != all.len() {
            let mismatch = Mismatch {
                node,
                label: data.label.clone(),
                group: data.group_prefix.to_string(),
                known,
                all: all.len(),
            };
            warn!("{}", mismatch);
            report.mismatches.push(mismatch);
        }
    }

    info!(
        "Verified {} honest and {} sybil nodes, {} mismatches",
        report.honest_checked,
        report.sybil_checked,
        report.mismatches.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gossip::Disseminator;
    use crate::overlay::{OverlayEdge, OverlayGraph};
    use crate::utils;
    use std::collections::BTreeSet;

    fn n(i: usize) -> NodeIndex {
        NodeIndex::new(i)
    }

    fn mixed_graph() -> TrustGraph {
        let nodes = vec![
            utils::node_with_prefix("a", "0", false, 2).unwrap(),
            utils::node_with_prefix("b", "0", false, 2).unwrap(),
            utils::node_with_prefix("c", "1", false, 2).unwrap(),
            utils::node_with_prefix("s", "0", true, 2).unwrap(),
        ];
        TrustGraph::from_parts(nodes, vec![(0, 1), (1, 2), (2, 3)]).unwrap()
    }

    #[test]
    fn test_mismatch_line_format() {
        let mismatch = Mismatch {
            node: n(0),
            label: "honest3".into(),
            group: "01".into(),
            known: 2,
            all: 3,
        };
        assert_eq!(mismatch.to_string(), "honest3 [01] knows 2/3 (0.67)");
    }

    #[test]
    fn test_initial_records_report_incomplete_groups() {
        let graph = mixed_graph();
        let report = verify_convergence(&graph, &RecordSets::initial(4)).unwrap();

        assert_eq!(report.honest_checked, 3);
        assert_eq!(report.sybil_checked, 1);
        // a and b each miss the other; c is alone in group 1
        let labels: Vec<&str> = report.mismatches.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
        assert!(report.mismatches.iter().all(|m| m.known == 1 && m.all == 2));
    }

    #[test]
    fn test_converged_records_are_clean() {
        let graph = mixed_graph();
        let mut overlay = OverlayGraph::new(4);
        overlay.insert_edge(n(0), n(1), OverlayEdge { hops: 1, is_backlink: false });
        overlay.insert_edge(n(1), n(0), OverlayEdge { hops: 1, is_backlink: true });
        let outcome = Disseminator::new(&graph, &overlay).run(RecordSets::initial(4)).unwrap();

        assert!(verify_convergence(&graph, &outcome.records).unwrap().is_clean());
    }

    #[test]
    fn test_honest_learning_sybil_record_is_allowed() {
        let graph = mixed_graph();
        let mut overlay = OverlayGraph::new(4);
        overlay.insert_edge(n(3), n(0), OverlayEdge { hops: 1, is_backlink: false });
        let outcome = Disseminator::new(&graph, &overlay).run(RecordSets::initial(4)).unwrap();

        assert!(outcome.records.knows(n(0), n(3)));
        assert!(verify_convergence(&graph, &outcome.records).is_ok());
    }

    #[test]
    fn test_sybil_with_honest_record_is_violation() {
        let graph = mixed_graph();
        let mut sets: Vec<BTreeSet<NodeIndex>> = (0..4).map(|i| BTreeSet::from([n(i)])).collect();
        sets[3].insert(n(2));

        let result = verify_convergence(&graph, &RecordSets::from_sets(sets));
        match result {
            Err(SimError::InvariantViolation(Violation::SybilLearnedHonest { node, record })) => {
                assert_eq!(node, "s");
                assert_eq!(record, "c");
            }
            other => panic!("expected violation, got {:?}", other),
        }
    }

    #[test]
    fn test_record_count_must_match_graph() {
        let graph = mixed_graph();
        assert!(matches!(
            verify_convergence(&graph, &RecordSets::initial(3)),
            Err(SimError::Configuration(_))
        ));
    }
}
