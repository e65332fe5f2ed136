//! GML export of graph artifacts.

use sloppy_sim::{ArtifactKind, GraphArtifact, Node, TrustGraph};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::TestbedResult;

fn escape(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

fn write_node<W: Write>(out: &mut W, id: usize, node: &Node) -> io::Result<()> {
    writeln!(out, "  node [")?;
    writeln!(out, "    id {}", id)?;
    writeln!(out, "    label \"{}\"", escape(&node.label))?;
    writeln!(out, "    name \"{}\"", node.id)?;
    writeln!(out, "    group \"{}\"", node.group_prefix)?;
    writeln!(out, "    group_bits {}", node.group_bits())?;
    writeln!(out, "    sybil {}", u8::from(node.is_sybil))?;
    writeln!(out, "    landmark {}", u8::from(node.is_landmark))?;
    writeln!(out, "    vicinity_size {}", node.vicinity_capacity)?;
    writeln!(out, "    sg_degree {}", node.overlay_fanout)?;
    writeln!(out, "    cn_size {}", node.color_bucket_capacity)?;
    if let Some(community) = &node.community {
        writeln!(out, "    community \"{}\"", escape(community))?;
    }
    writeln!(out, "  ]")
}

/// Write one artifact, with every trust-graph node and its attributes
pub fn write_gml<W: Write>(out: &mut W, graph: &TrustGraph, artifact: &GraphArtifact) -> io::Result<()> {
    writeln!(out, "graph [")?;
    writeln!(out, "  directed {}", u8::from(artifact.kind.is_directed()))?;
    writeln!(out, "  label \"{}\"", artifact.kind.file_stem())?;

    for (index, node) in graph.nodes() {
        write_node(out, index.index(), node)?;
    }

    for edge in &artifact.edges {
        writeln!(out, "  edge [")?;
        writeln!(out, "    source {}", edge.source.index())?;
        writeln!(out, "    target {}", edge.target.index())?;
        if let Some(hops) = edge.hops {
            writeln!(out, "    hops {}", hops)?;
        }
        if let Some(backlink) = edge.backlink {
            writeln!(out, "    backlink {}", u8::from(backlink))?;
        }
        writeln!(out, "  ]")?;
    }

    writeln!(out, "]")
}

pub fn to_gml_string(graph: &TrustGraph, artifact: &GraphArtifact) -> String {
    let mut buffer = Vec::new();
    // Writing into a Vec cannot fail
    let _ = write_gml(&mut buffer, graph, artifact);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// `<dir>/<stem><iteration:03>.gml`, e.g. `group007.gml`
pub fn artifact_path(dir: &Path, kind: ArtifactKind, iteration: usize) -> PathBuf {
    dir.join(format!("{}{:03}.gml", kind.file_stem(), iteration))
}

/// Write every artifact of one iteration into `dir`, creating it if needed
pub fn store_artifacts(
    dir: &Path,
    graph: &TrustGraph,
    artifacts: &[GraphArtifact],
    iteration: usize,
) -> TestbedResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(artifacts.len());

    for artifact in artifacts {
        let path = artifact_path(dir, artifact.kind, iteration);
        let mut out = BufWriter::new(File::create(&path)?);
        write_gml(&mut out, graph, artifact)?;
        out.flush()?;
        debug!("wrote {} edges to {}", artifact.edge_count(), path.display());
        written.push(path);
    }

    Ok(written)
}
