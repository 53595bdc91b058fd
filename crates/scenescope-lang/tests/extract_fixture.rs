use scenescope_ir::{build_timeline, validate_scene_graph, Target};
use scenescope_lang::{extract, generate_scene_graph};

const FIXTURE: &str = include_str!("fixtures/pythagoras.py");

#[test]
fn test_fixture_objects() {
    let extraction = extract(FIXTURE, "pythagoras.py", 1.5).unwrap();
    let graph = &extraction.graph;

    assert_eq!(graph.scene_name.as_deref(), Some("PythagorasIntro"));

    let summary: Vec<(&str, &str, Option<&str>)> = graph
        .objects
        .iter()
        .map(|o| (o.id.as_str(), o.binding_name.as_str(), o.content.as_deref()))
        .collect();
    assert_eq!(
        summary,
        [
            ("Text_1", "title", Some("Pythagorean Theorem")),
            ("MathTex_1", "formula", Some("a^2 + b^2 = c^2")),
            ("Dot_1", "corner", None),
            ("Line_1", "hyp", None),
            ("Text_2", "note", None),
        ]
    );
}

#[test]
fn test_fixture_timeline() {
    let graph = generate_scene_graph(FIXTURE).unwrap();
    let actions: Vec<String> = build_timeline(&graph.timeline)
        .into_iter()
        .map(|e| format!("{} {}", e.time_range, e.action))
        .collect();
    assert_eq!(
        actions,
        [
            "0.0 → 1.5 Write(title)",
            "1.5 → 3.0 FadeIn(formula)",
            "1.5 → 3.0 Create(corner)",
            "3.0 → 4.5 Create(side)",
            "4.5 → 6.0 FadeIn(note)",
            "6.0 → 7.5 FadeOut(formula)",
            "6.0 → 7.5 Indicate(unknown)",
            "7.5 → 9.0 Transform(label)",
        ]
    );

    // `note` is declared before its FadeIn, `title` only gets Write.
    let title = graph.object_by_binding("title").unwrap();
    assert_eq!(title.animations.len(), 1);
    let formula = graph.object_by_binding("formula").unwrap();
    assert_eq!(formula.animations.len(), 2);
    assert!(graph.timeline.windows(2).all(|w| w[0].start <= w[1].start));
}

#[test]
fn test_fixture_skips() {
    let extraction = extract(FIXTURE, "pythagoras.py", 1.5).unwrap();
    // docstring, to_edge, wait
    assert_eq!(extraction.skipped.expression, 3);
    assert_eq!(extraction.skipped.effect_argument, 1);
    assert_eq!(extraction.skipped.assignment, 0);
}

#[test]
fn test_fixture_diagnostics() {
    let graph = generate_scene_graph(FIXTURE).unwrap();
    let errors: Vec<String> = validate_scene_graph(&graph)
        .iter()
        .map(|d| d.to_string())
        .collect();
    assert_eq!(
        errors,
        [
            "Animation targets undefined object: side",
            "Animation targets undefined object: unknown",
            "Animation targets undefined object: label",
        ]
    );
    assert!(graph
        .timeline
        .iter()
        .any(|e| e.target == Target::Unresolved));
}

#[test]
fn test_fixture_json_is_stable() {
    let a = serde_json::to_string(&generate_scene_graph(FIXTURE).unwrap()).unwrap();
    let b = serde_json::to_string(&generate_scene_graph(FIXTURE).unwrap()).unwrap();
    assert_eq!(a, b);
    let value: serde_json::Value = serde_json::from_str(&a).unwrap();
    assert_eq!(value["timeline"][0]["type"], "Write");
    assert_eq!(value["timeline"][0]["target"], "title");
    assert_eq!(value["objects"][1]["type"], "MathTex");
}
