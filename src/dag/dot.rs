// src/dag/dot.rs

//! Line-oriented reader/writer for the planner's `digraph` output.
//!
//! Recognised statements, one per line:
//!
//! ```text
//! "src" -> "dest";
//! "standalone";
//! ```
//!
//! The trailing semicolon is optional. Anything else (`digraph {`, `}`,
//! comments, attribute lists, unquoted identifiers) is skipped, so a
//! malformed description yields a partial graph rather than an error.

use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::dag::graph::{DependencyGraph, GraphBuilder};
use crate::errors::Result;

const QUOTED: &str = r#""((?:[^"\\]|\\.)*)""#;

static EDGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{QUOTED}\s*->\s*{QUOTED}\s*;?$")).expect("edge regex is valid")
});

static NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^{QUOTED}\s*;?$")).expect("node regex is valid"));

/// Parse a graph description. Never fails; unrecognised lines are skipped.
pub fn parse_dot(text: &str) -> DependencyGraph {
    let mut builder = GraphBuilder::new();
    for line in text.lines() {
        apply_line(&mut builder, line);
    }
    builder.build()
}

/// Parse a graph description from a reader.
///
/// Only a failure to read from `reader` is reported as an error.
pub fn parse_dot_reader<R: BufRead>(reader: R) -> Result<DependencyGraph> {
    let mut builder = GraphBuilder::new();
    for line in reader.lines() {
        apply_line(&mut builder, &line?);
    }
    Ok(builder.build())
}

/// Render `graph` as a description accepted by [`parse_dot`].
///
/// Edges come first, then nodes that take part in no edge.
pub fn to_dot(graph: &DependencyGraph) -> String {
    let mut out = String::from("digraph {\n");

    for (src, dest) in graph.edges() {
        out.push_str(&format!("  {} -> {};\n", quote(src), quote(dest)));
    }

    for node in graph.nodes().filter(|n| !graph.has_edges(n)) {
        out.push_str(&format!("  {};\n", quote(node)));
    }

    out.push('}');
    out.push('\n');
    out
}

fn apply_line(builder: &mut GraphBuilder, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
        return;
    }

    if let Some(caps) = EDGE_RE.captures(line) {
        let src = unquote(&caps[1]);
        let dest = unquote(&caps[2]);
        if !src.is_empty() && !dest.is_empty() {
            builder.add_edge(src, dest);
            return;
        }
    } else if let Some(caps) = NODE_RE.captures(line) {
        let name = unquote(&caps[1]);
        if !name.is_empty() {
            builder.add_node(name);
            return;
        }
    }

    trace!(line, "skipping unrecognised graph line");
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn unquote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::graph::Edge;
    use std::collections::BTreeSet;

    #[test]
    fn parses_edges_and_standalone_nodes() {
        let g = parse_dot(
            r#"
digraph {
  "moduleA" -> "moduleB";
  "moduleC";
}
"#,
        );

        assert_eq!(g.get_nodes(), vec!["moduleA", "moduleB", "moduleC"]);
        assert_eq!(g.edge_set(), BTreeSet::from([Edge::new("moduleA", "moduleB")]));
    }

    #[test]
    fn tolerates_planner_spacing_and_missing_semicolons() {
        let g = parse_dot("digraph {\n\t\"azuresql\" ;\n\t\"azuresql\" -> \"core\"\n}");

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn skips_lines_outside_the_grammar() {
        let g = parse_dot(
            r#"
digraph {
  // "commented" -> "out";
  "half -> "quoted";
  unquoted -> "b";
  "a" -> "b" [color=red];
  "";
  "ok";
"#,
        );

        assert_eq!(g.get_nodes(), vec!["ok"]);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn serialization_lists_edge_nodes_only_once() {
        let g = GraphBuilder::new()
            .with_edge("app", "db")
            .with_node("db")
            .with_node("lonely")
            .build();

        assert_eq!(
            to_dot(&g),
            "digraph {\n  \"app\" -> \"db\";\n  \"lonely\";\n}\n"
        );
    }

    #[test]
    fn escaped_identifiers_round_trip() {
        let g = GraphBuilder::new()
            .with_edge(r#"we"ird"#, r"back\slash")
            .build();

        assert_eq!(parse_dot(&to_dot(&g)), g);
    }

    #[test]
    fn reader_variant_matches_str_variant() {
        let text = "digraph {\n  \"b\" -> \"a\";\n  \"c\";\n}\n";
        let from_reader = parse_dot_reader(text.as_bytes()).expect("in-memory read");

        assert_eq!(from_reader, parse_dot(text));
    }

    /// Yields one good line, then fails.
    struct BrokenPipe {
        sent: bool,
    }

    impl std::io::Read for BrokenPipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "planner went away",
                ));
            }
            self.sent = true;
            let line = b"\"a\" -> \"b\";\n";
            buf[..line.len()].copy_from_slice(line);
            Ok(line.len())
        }
    }

    #[test]
    fn reader_failure_is_an_io_error() {
        let reader = std::io::BufReader::new(BrokenPipe { sent: false });

        match parse_dot_reader(reader) {
            Err(crate::errors::InfraflowError::IoError(e)) => {
                assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe)
            }
            other => panic!("expected IoError, got {other:?}"),
        }
    }
}
