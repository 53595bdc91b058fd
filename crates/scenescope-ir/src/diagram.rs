//! Graphviz export of a scene graph.
//!
//! Objects become box nodes keyed by id; every timeline event becomes a
//! self-loop on the node its target resolves to.

use std::fmt::Write;

use scenescope_core::format_seconds;

use crate::scene::SceneGraph;

/// Render `graph` as a DOT document.
pub fn to_dot(graph: &SceneGraph) -> String {
    let mut out = String::new();
    out.push_str("// Scene Graph\n");
    out.push_str("digraph {\n");
    out.push_str("\trankdir=LR\n");

    for obj in &graph.objects {
        let label = format!("{}\n({})", obj.id, obj.kind);
        let _ = writeln!(
            out,
            "\t{} [label={} color=lightblue shape=box style=filled]",
            quote(obj.id.as_str()),
            quote(&label)
        );
    }

    for event in &graph.timeline {
        // Undeclared targets get an implicit node under their own name.
        let target = event.target.to_string();
        let node = graph
            .object_by_binding(&target)
            .filter(|_| event.target.as_binding().is_some())
            .map(|o| o.id.to_string())
            .unwrap_or(target);
        let label = format!(
            "{}\n{}→{}",
            event.kind,
            format_seconds(event.start),
            format_seconds(event.end)
        );
        let _ = writeln!(
            out,
            "\t{} -> {} [label={} color=black]",
            quote(&node),
            quote(&node),
            quote(&label)
        );
    }

    out.push_str("}\n");
    out
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}
