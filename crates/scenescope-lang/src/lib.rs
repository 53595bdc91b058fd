//! # scenescope-lang
//!
//! Reads generated Manim scripts. Python source is tokenized, parsed into an
//! AST, and walked to recover the scene graph: the scene class, the visual
//! objects it declares and the timeline of `play(...)` groups.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod scene_name;
pub mod visitor;
pub mod walker;

use serde::Serialize;

use scenescope_core::{ScopeResult, DEFAULT_ANIMATION_DURATION};
use scenescope_ir::{build_timeline, validate_scene_graph, SceneGraph, TimelineEntry};

pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use scene_name::detect_scene_name;
pub use walker::{SkipTally, SyntaxTreeWalker};

/// Stack of the thread that parses and walks a script. Nesting is capped by
/// `lexer::MAX_BRACKET_DEPTH` and `parser::MAX_NESTING`; this leaves room for
/// both in unoptimized builds, whatever stack the caller runs on.
const PARSER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Run `task` on a scoped thread with a `PARSER_STACK_SIZE` stack.
fn on_parser_stack<T: Send>(task: impl FnOnce() -> ScopeResult<T> + Send) -> ScopeResult<T> {
    std::thread::scope(|scope| -> ScopeResult<T> {
        let handle = std::thread::Builder::new()
            .name("scenescope-parser".to_string())
            .stack_size(PARSER_STACK_SIZE)
            .spawn_scoped(scope, task)?;
        handle
            .join()
            .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    })
}

fn parse_module(source: &str, file: &str) -> ScopeResult<ast::Module> {
    let tokens = Lexer::new(source).with_file(file).tokenize()?;
    Parser::new(tokens, file).parse()
}

/// Tokenize and parse `source`. `file` names the source in error messages.
pub fn parse_source(source: &str, file: &str) -> ScopeResult<ast::Module> {
    on_parser_stack(|| parse_module(source, file))
}

/// A scene graph together with what the walker could not use.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub graph: SceneGraph,
    pub skipped: SkipTally,
}

/// Extract the scene graph of `source`, giving each play group `duration`
/// seconds. Fails only when the source does not parse.
pub fn extract(source: &str, file: &str, duration: f64) -> ScopeResult<Extraction> {
    // The syntax tree is walked and dropped on the parser's stack too.
    let (scene_name, walked) = on_parser_stack(|| {
        let module = parse_module(source, file)?;
        let scene_name = detect_scene_name(&module);
        Ok((scene_name, SyntaxTreeWalker::new(duration).walk(&module)))
    })?;

    tracing::debug!(
        file,
        scene = scene_name.as_deref().unwrap_or("-"),
        objects = walked.objects.len(),
        events = walked.timeline.len(),
        "extracted scene graph"
    );

    Ok(Extraction {
        graph: SceneGraph::new(scene_name, walked.objects, walked.timeline),
        skipped: walked.skipped,
    })
}

/// Scene graph of `source` with the default duration, or `None` when the
/// source cannot be parsed.
pub fn generate_scene_graph(source: &str) -> Option<SceneGraph> {
    match extract(source, "<input>", DEFAULT_ANIMATION_DURATION) {
        Ok(extraction) => Some(extraction.graph),
        Err(e) => {
            tracing::warn!("no scene graph: {}", e);
            None
        }
    }
}

/// Everything a frontend shows for one script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub scene_graph: SceneGraph,
    pub timeline: Vec<TimelineEntry>,
    pub errors: Vec<String>,
}

impl Analysis {
    pub fn from_graph(scene_graph: SceneGraph) -> Self {
        let timeline = build_timeline(&scene_graph.timeline);
        let errors = validate_scene_graph(&scene_graph)
            .iter()
            .map(ToString::to_string)
            .collect();
        Self {
            scene_graph,
            timeline,
            errors,
        }
    }
}

/// Analyze `source`, or `None` when it cannot be parsed.
pub fn analyze(source: &str) -> Option<Analysis> {
    generate_scene_graph(source).map(Analysis::from_graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unparseable_source_has_no_graph() {
        assert!(generate_scene_graph("class :\n").is_none());
        assert!(generate_scene_graph("x = (1,\n").is_none());
        assert!(analyze("def f(:\n    pass\n").is_none());
    }

    #[test]
    fn test_extract_reports_parse_location() {
        let err = extract("a = 1\nb = $\n", "scene.py", 1.5).unwrap_err();
        assert!(err.is_parse());
        let msg = err.to_string();
        assert!(msg.contains("scene.py"));
        assert!(msg.contains(":2:"));
    }

    #[test]
    fn test_empty_source() {
        let graph = generate_scene_graph("").unwrap();
        assert_eq!(graph, SceneGraph::default());
    }

    #[test]
    fn test_analysis_collects_diagnostics() {
        let analysis = analyze("t = Text(\"hi\")\nself.play(Write(t), FadeIn(ghost))\n").unwrap();
        assert_eq!(analysis.timeline.len(), 2);
        assert_eq!(analysis.timeline[0].time_range, "0.0 → 1.5");
        assert_eq!(analysis.timeline[1].action, "FadeIn(ghost)");
        assert_eq!(
            analysis.errors,
            [
                "Scene name not found",
                "Animation targets undefined object: ghost"
            ]
        );
    }

    #[test]
    fn test_analysis_json_shape() {
        let analysis = analyze("class S(Scene):\n    def construct(self):\n        d = Dot()\n").unwrap();
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["scene_graph"]["scene_name"], "S");
        assert_eq!(json["scene_graph"]["objects"][0]["id"], "Dot_1");
        assert_eq!(json["scene_graph"]["objects"][0]["content"], serde_json::Value::Null);
        assert!(json["errors"].as_array().unwrap().is_empty());
    }

    fn nested_parens(depth: usize) -> String {
        format!("x = {}1{}\n", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn test_deep_nesting_on_worker_thread() {
        let handle = std::thread::spawn(|| {
            (
                generate_scene_graph(&nested_parens(150)).is_some(),
                generate_scene_graph(&nested_parens(5000)).is_none(),
                generate_scene_graph(&format!("x = {}1\n", "-".repeat(10_000))).is_none(),
            )
        });
        assert_eq!(handle.join().unwrap(), (true, true, true));
    }

    #[test]
    fn test_rejected_sources_have_no_graph() {
        for src in [
            "f'{'\n",
            "def f(**a, *b): pass\n",
            "x = 09\n",
            "x = 1__0\n",
            "x = 0_7\n",
            "x = b'\u{e9}'\n",
            "\\\n",
        ] {
            assert!(generate_scene_graph(src).is_none(), "{src:?}");
        }
    }

    #[test]
    fn test_accepted_sources_have_a_graph() {
        for src in [
            "match x:\n    case 1:\n        pass\n",
            "x = 1if 1else 2\n",
            "t = Text('\\ud800')\n",
            "match = {'a': 1}\n",
        ] {
            assert!(generate_scene_graph(src).is_some(), "{src:?}");
        }
    }
}
