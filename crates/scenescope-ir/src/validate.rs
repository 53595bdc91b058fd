use crate::animation::{AnimationEvent, Target};
use crate::scene::SceneGraph;
use scenescope_core::format_seconds;

/// A consistency problem found in a scene graph. Never fatal on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// No scene class was detected.
    MissingSceneName,
    /// An animation targets something that is not a declared object.
    UndefinedTarget { target: Target },
    /// An animation does not end after it starts.
    InvalidTiming { event: AnimationEvent },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::MissingSceneName => write!(f, "Scene name not found"),
            Diagnostic::UndefinedTarget { target } => {
                write!(f, "Animation targets undefined object: {}", target)
            }
            Diagnostic::InvalidTiming { event } => write!(
                f,
                "Invalid animation timing: {{type: {}, target: {}, start: {}, end: {}}}",
                event.kind,
                event.target,
                format_seconds(event.start),
                format_seconds(event.end)
            ),
        }
    }
}

/// Check a scene graph for a scene name, dangling animation targets and
/// empty or reversed time intervals.
///
/// Every rule runs; diagnostics come out grouped by rule in that order, and
/// within a rule in timeline order.
pub fn validate_scene_graph(graph: &SceneGraph) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if graph.scene_name.is_none() {
        diagnostics.push(Diagnostic::MissingSceneName);
    }

    let bindings = graph.binding_names();
    for event in &graph.timeline {
        let declared = match &event.target {
            Target::Binding(name) => bindings.contains(name.as_str()),
            Target::Unresolved => false,
        };
        if !declared {
            diagnostics.push(Diagnostic::UndefinedTarget {
                target: event.target.clone(),
            });
        }
    }

    for event in &graph.timeline {
        if !event.has_valid_timing() {
            diagnostics.push(Diagnostic::InvalidTiming {
                event: event.clone(),
            });
        }
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectId, ObjectKind, VisualObject};

    fn text(binding: &str, ordinal: u32) -> VisualObject {
        VisualObject::new(
            ObjectId::for_kind(ObjectKind::Text, ordinal),
            ObjectKind::Text,
            binding,
            None,
        )
    }

    #[test]
    fn test_valid_graph() {
        let graph = SceneGraph::new(
            Some("Demo".into()),
            vec![text("t", 1)],
            vec![AnimationEvent::new("Write", Target::binding("t"), 0.0, 1.5)],
        );
        assert!(validate_scene_graph(&graph).is_empty());
    }

    #[test]
    fn test_missing_scene_name() {
        let graph = SceneGraph::default();
        let diags = validate_scene_graph(&graph);
        assert_eq!(diags, vec![Diagnostic::MissingSceneName]);
        assert_eq!(diags[0].to_string(), "Scene name not found");
    }

    #[test]
    fn test_undefined_target_reported_once() {
        let graph = SceneGraph::new(
            Some("Demo".into()),
            vec![text("t", 1)],
            vec![
                AnimationEvent::new("Write", Target::binding("t"), 0.0, 1.5),
                AnimationEvent::new("FadeIn", Target::binding("ghost"), 1.5, 3.0),
            ],
        );
        let diags = validate_scene_graph(&graph);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].to_string(),
            "Animation targets undefined object: ghost"
        );
    }

    #[test]
    fn test_unresolved_target_always_undefined() {
        // Even an object literally bound to the sentinel name does not satisfy it.
        let graph = SceneGraph::new(
            Some("Demo".into()),
            vec![text("unknown", 1)],
            vec![AnimationEvent::new("Write", Target::Unresolved, 0.0, 1.5)],
        );
        let diags = validate_scene_graph(&graph);
        assert_eq!(
            diags,
            vec![Diagnostic::UndefinedTarget {
                target: Target::Unresolved
            }]
        );
    }

    #[test]
    fn test_invalid_timing_mentions_event_fields() {
        let graph = SceneGraph::new(
            Some("Demo".into()),
            vec![text("t", 1)],
            vec![
                AnimationEvent::new("Write", Target::binding("t"), 0.0, 1.5),
                AnimationEvent::new("Write", Target::binding("t"), 3.0, 3.0),
            ],
        );
        let diags = validate_scene_graph(&graph);
        assert_eq!(diags.len(), 1);
        let msg = diags[0].to_string();
        assert!(msg.starts_with("Invalid animation timing"));
        assert!(msg.contains("Write"));
        assert!(msg.contains("start: 3.0"));
        assert!(msg.contains("end: 3.0"));
    }

    #[test]
    fn test_all_rules_run_in_fixed_order() {
        let graph = SceneGraph::new(
            None,
            vec![],
            vec![
                AnimationEvent::new("Write", Target::binding("a"), 2.0, 1.0),
                AnimationEvent::new("Create", Target::binding("b"), 0.0, 1.5),
                AnimationEvent::new("FadeOut", Target::binding("c"), 5.0, 4.0),
            ],
        );
        let diags = validate_scene_graph(&graph);
        let rendered: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert_eq!(rendered.len(), 6);
        assert_eq!(rendered[0], "Scene name not found");
        assert_eq!(rendered[1], "Animation targets undefined object: a");
        assert_eq!(rendered[2], "Animation targets undefined object: b");
        assert_eq!(rendered[3], "Animation targets undefined object: c");
        assert!(rendered[4].contains("type: Write"));
        assert!(rendered[5].contains("type: FadeOut"));
    }

    #[test]
    fn test_validation_does_not_mutate() {
        let graph = SceneGraph::new(
            None,
            vec![text("t", 1)],
            vec![AnimationEvent::new("Write", Target::binding("x"), 0.0, 1.5)],
        );
        let before = graph.clone();
        let _ = validate_scene_graph(&graph);
        assert_eq!(graph, before);
    }
}
