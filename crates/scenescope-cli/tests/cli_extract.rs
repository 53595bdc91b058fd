use std::path::PathBuf;
use std::process::{Command, Output};

const SCRIPT: &str = r#"from manim import *

class CircleDemo(Scene):
    def construct(self):
        label = Text("A circle")
        c = Circle()
        self.play(Write(label), Create(c))
        self.play(FadeOut(ghost))
"#;

fn bin() -> String {
    std::env::var("CARGO_BIN_EXE_scenescope").unwrap_or_else(|_| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/debug/scenescope")
            .to_string_lossy()
            .to_string()
    })
}

/// A scratch directory holding `scene.py`; the CLI runs with it as cwd so
/// no stray scenescope.toml is picked up.
fn scratch(source: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scenescope-cli-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("failed to create scratch dir");
    std::fs::write(dir.join("scene.py"), source).expect("failed to write script");
    dir
}

fn run(dir: &PathBuf, args: &[&str]) -> Output {
    Command::new(bin())
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to spawn scenescope")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout not utf-8");
    assert!(
        !stdout.contains('\u{1b}'),
        "stdout contaminated with ANSI escape codes: {stdout:?}"
    );
    serde_json::from_str(&stdout).expect("stdout is not valid JSON")
}

#[test]
fn extract_prints_scene_graph_json() {
    let dir = scratch(SCRIPT);
    let output = run(&dir, &["extract", "scene.py"]);
    assert!(output.status.success(), "extract failed: {:?}", output);

    let value = stdout_json(&output);
    assert_eq!(value["scene_name"], "CircleDemo");
    assert_eq!(value["objects"][0]["id"], "Text_1");
    assert_eq!(value["objects"][0]["content"], "A circle");
    assert_eq!(value["objects"][1]["id"], "Circle_1");
    assert_eq!(value["timeline"][1]["start"], 0.0);
    assert_eq!(value["timeline"][2]["start"], 1.5);
    assert_eq!(value["timeline"][2]["end"], 3.0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn analyze_reports_errors() {
    let dir = scratch(SCRIPT);
    let output = run(&dir, &["analyze", "scene.py"]);
    assert!(output.status.success(), "analyze failed: {:?}", output);

    let value = stdout_json(&output);
    assert_eq!(value["timeline"][0]["time_range"], "0.0 → 1.5");
    assert_eq!(value["timeline"][0]["action"], "Write(label)");
    assert_eq!(
        value["errors"],
        serde_json::json!(["Animation targets undefined object: ghost"])
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn check_fails_on_diagnostics() {
    let dir = scratch(SCRIPT);
    let output = run(&dir, &["check", "scene.py"]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Animation targets undefined object: ghost"));

    std::fs::write(dir.join("ok.py"), "class A(Scene):\n    def construct(self):\n        pass\n")
        .unwrap();
    let output = run(&dir, &["check", "ok.py"]);
    assert!(output.status.success(), "check failed: {:?}", output);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn parse_error_exits_non_zero() {
    let dir = scratch("class :\n    pass\n");
    let output = run(&dir, &["extract", "scene.py"]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("parse error"), "stderr: {stderr}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn deeply_nested_source_is_a_parse_error() {
    let dir = scratch(&format!("x = {}1{}\n", "(".repeat(5000), ")".repeat(5000)));
    let output = run(&dir, &["extract", "scene.py"]);
    assert_eq!(output.status.code(), Some(1), "extract: {:?}", output);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("too many nested parentheses"), "stderr: {stderr}");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn config_duration_is_applied() {
    let dir = scratch(SCRIPT);
    std::fs::write(dir.join("scenescope.toml"), "[extract]\nanimation_duration = 2.0\n").unwrap();
    let output = run(&dir, &["timeline", "scene.py"]);
    assert!(output.status.success(), "timeline failed: {:?}", output);

    let value = stdout_json(&output);
    assert_eq!(value[2]["time_range"], "2.0 → 4.0");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn diagram_writes_dot_file() {
    let dir = scratch(SCRIPT);
    let output = run(&dir, &["diagram", "scene.py"]);
    assert!(output.status.success(), "diagram failed: {:?}", output);

    let dot = std::fs::read_to_string(dir.join("scene.dot")).expect("missing scene.dot");
    assert!(dot.starts_with("// Scene Graph\ndigraph {"));
    assert!(dot.contains("\"Circle_1\" -> \"Circle_1\""));
    assert!(dot.contains("\"ghost\" -> \"ghost\""));

    std::fs::remove_dir_all(&dir).ok();
}
