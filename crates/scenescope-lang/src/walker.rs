//! Syntax tree walker: statements → declared objects + animation events.
//!
//! Two statement shapes are recognized:
//!
//! - declarations, `name = Kind(...)` with `Kind` one of the known visual
//!   object constructors;
//! - play groups, `<receiver>.play(Effect(target, ...), ...)`.
//!
//! Everything else is skipped and counted in a [`SkipTally`]. The virtual
//! clock is threaded through the traversal as the visitor state.

use serde::Serialize;

use scenescope_core::{Clock, DEFAULT_ANIMATION_DURATION};
use scenescope_ir::{AnimationEvent, ObjectKind, ObjectRegistry, Target, VisualObject};

use crate::ast::{Expr, ExprKind, Module, Stmt, StmtKind};
use crate::visitor::{walk_body, Visitor};

/// Counts of statements and arguments that matched no extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SkipTally {
    /// Assignments that declare nothing.
    pub assignment: usize,
    /// Expression statements that are not play groups.
    pub expression: usize,
    /// Arguments of a play group that are not effect calls.
    pub effect_argument: usize,
}

impl SkipTally {
    pub fn total(&self) -> usize {
        self.assignment + self.expression + self.effect_argument
    }
}

/// `name = Kind(...)`, recognized.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration<'a> {
    pub binding: &'a str,
    pub kind: ObjectKind,
    pub content: Option<String>,
}

/// One `Effect(target, ...)` argument of a play group.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectCall<'a> {
    pub effect: &'a str,
    pub target: Target,
}

/// Match a declaration. Only the first target of a chained assignment is
/// considered, and it must be a bare name.
pub fn match_declaration<'a>(targets: &'a [Expr], value: &'a Expr) -> Option<Declaration<'a>> {
    let binding = targets.first()?.as_name()?;
    let ExprKind::Call { func, args, .. } = &value.kind else {
        return None;
    };
    let kind = ObjectKind::from_constructor(func.as_name()?);
    if !kind.is_recognized() {
        return None;
    }
    let content = args
        .first()
        .and_then(Expr::as_plain_str)
        .map(str::to_string);
    Some(Declaration {
        binding,
        kind,
        content,
    })
}

/// Match `<receiver>.play(...)` and return its positional arguments.
pub fn match_play_group(expr: &Expr) -> Option<&[Expr]> {
    let ExprKind::Call { func, args, .. } = &expr.kind else {
        return None;
    };
    match &func.kind {
        ExprKind::Attribute { attr, .. } if attr == "play" => Some(args),
        _ => None,
    }
}

/// Match one play-group argument: a call whose callee is a bare name. The
/// target is the call's first positional argument when that is a bare name.
pub fn match_effect(arg: &Expr) -> Option<EffectCall<'_>> {
    let ExprKind::Call { func, args, .. } = &arg.kind else {
        return None;
    };
    let effect = func.as_name()?;
    let target = args
        .first()
        .and_then(Expr::as_name)
        .map(Target::binding)
        .unwrap_or(Target::Unresolved);
    Some(EffectCall { effect, target })
}

/// Result of walking one module.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkOutput {
    pub objects: Vec<VisualObject>,
    pub timeline: Vec<AnimationEvent>,
    pub skipped: SkipTally,
    /// Clock position after the last play group.
    pub clock: Clock,
}

/// Builds objects and the timeline in a single source-order pass.
pub struct SyntaxTreeWalker {
    registry: ObjectRegistry,
    timeline: Vec<AnimationEvent>,
    skipped: SkipTally,
    duration: f64,
}

impl Default for SyntaxTreeWalker {
    fn default() -> Self {
        Self::new(DEFAULT_ANIMATION_DURATION)
    }
}

impl SyntaxTreeWalker {
    /// A walker giving every play group `duration` seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            registry: ObjectRegistry::new(),
            timeline: Vec::new(),
            skipped: SkipTally::default(),
            duration,
        }
    }

    pub fn walk(mut self, module: &Module) -> WalkOutput {
        let clock = walk_body(&mut self, &module.body, Clock::zero());
        tracing::debug!(
            objects = self.registry.len(),
            events = self.timeline.len(),
            skipped = self.skipped.total(),
            end = %clock,
            "walk finished"
        );
        WalkOutput {
            objects: self.registry.into_objects(),
            timeline: self.timeline,
            skipped: self.skipped,
            clock,
        }
    }

    /// Emit one event per effect argument, all sharing the interval
    /// `[clock, clock + duration)`. The clock moves only if something was
    /// emitted.
    fn play_group(&mut self, args: &[Expr], clock: Clock) -> Clock {
        let start = clock.as_seconds();
        let end = clock.advanced_by(self.duration);
        let mut emitted = 0;

        for arg in args {
            let Some(call) = match_effect(arg) else {
                tracing::debug!(line = arg.span.line, "skipping non-effect play argument");
                self.skipped.effect_argument += 1;
                continue;
            };
            let event = AnimationEvent::new(call.effect, call.target, start, end.as_seconds());
            self.registry.attach(&event);
            self.timeline.push(event);
            emitted += 1;
        }

        if emitted > 0 {
            end
        } else {
            clock
        }
    }
}

impl Visitor for SyntaxTreeWalker {
    type State = Clock;

    fn visit_assign(&mut self, targets: &[Expr], value: &Expr, clock: Clock) -> Clock {
        match match_declaration(targets, value) {
            Some(decl) => {
                if let Some(obj) = self.registry.declare(decl.kind, decl.binding, decl.content) {
                    tracing::debug!(id = %obj.id, name = %obj.binding_name, "declared object");
                }
            }
            None => {
                tracing::debug!(line = value.span.line, "skipping assignment");
                self.skipped.assignment += 1;
            }
        }
        clock
    }

    fn visit_expr_stmt(&mut self, expr: &Expr, clock: Clock) -> Clock {
        match match_play_group(expr) {
            Some(args) => self.play_group(args, clock),
            None => {
                self.skipped.expression += 1;
                clock
            }
        }
    }

    fn visit_other(&mut self, stmt: &Stmt, clock: Clock) -> Clock {
        if matches!(
            stmt.kind,
            StmtKind::AugAssign { .. } | StmtKind::AnnAssign { .. }
        ) {
            self.skipped.assignment += 1;
        }
        clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn walk(src: &str) -> WalkOutput {
        let module = parse_source(src, "<test>").unwrap();
        SyntaxTreeWalker::default().walk(&module)
    }

    fn times(out: &WalkOutput) -> Vec<(f64, f64)> {
        out.timeline.iter().map(|e| (e.start, e.end)).collect()
    }

    #[test]
    fn test_single_declaration_and_effect() {
        let out = walk("t = Text(\"Hello\")\nself.play(Write(t))\n");
        assert_eq!(out.objects.len(), 1);
        let obj = &out.objects[0];
        assert_eq!(obj.id.as_str(), "Text_1");
        assert_eq!(obj.kind, ObjectKind::Text);
        assert_eq!(obj.binding_name, "t");
        assert_eq!(obj.content.as_deref(), Some("Hello"));
        assert_eq!(out.timeline.len(), 1);
        let event = &out.timeline[0];
        assert_eq!(event.kind, "Write");
        assert_eq!(event.target, Target::binding("t"));
        assert_eq!((event.start, event.end), (0.0, 1.5));
        assert_eq!(obj.animations.len(), 1);
        assert_eq!(obj.animations[0], event.record());
    }

    #[test]
    fn test_sequential_groups_chain() {
        let out = walk("c = Circle()\ns = Square()\nself.play(Create(c))\nself.play(Create(s))\n");
        assert_eq!(times(&out), vec![(0.0, 1.5), (1.5, 3.0)]);
        assert_eq!(out.clock.as_seconds(), 3.0);
    }

    #[test]
    fn test_same_group_shares_interval() {
        let out = walk("self.play(FadeIn(a), FadeIn(b))\nself.play(FadeOut(a))\n");
        assert_eq!(times(&out), vec![(0.0, 1.5), (0.0, 1.5), (1.5, 3.0)]);
    }

    #[test]
    fn test_ordinals_per_kind() {
        let out = walk("a = Text(\"a\")\nb = Circle()\nc = Text(\"c\")\nd = MathTex(r\"x^2\")\n");
        let ids: Vec<&str> = out.objects.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["Text_1", "Circle_1", "Text_2", "MathTex_1"]);
        assert_eq!(out.objects[3].content.as_deref(), Some("x^2"));
    }

    #[test]
    fn test_unrecognized_constructor_is_skipped() {
        let out = walk("g = VGroup(a, b)\nt = Text(\"x\")\n");
        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.objects[0].id.as_str(), "Text_1");
        assert_eq!(out.skipped.assignment, 1);
    }

    #[test]
    fn test_non_name_targets_are_not_declarations() {
        let out = walk("self.c = Circle()\nx, y = Circle(), Dot()\nitems[0] = Dot()\nc = Circle()\n");
        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.objects[0].id.as_str(), "Circle_1");
        assert_eq!(out.skipped.assignment, 3);
    }

    #[test]
    fn test_chained_assignment_uses_first_target() {
        let out = walk("a = b = Square()\n");
        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.objects[0].binding_name, "a");
    }

    #[test]
    fn test_dotted_constructor_is_not_declaration() {
        let out = walk("c = manim.Circle()\nt = Text(\"x\").scale(2)\n");
        assert!(out.objects.is_empty());
    }

    #[test]
    fn test_content_only_from_plain_string() {
        let out = walk(
            "a = Text(label)\nb = Text(f\"{n}\")\nc = Text(b\"raw\")\nd = Text()\ne = Text(\"a\" \"b\")\n",
        );
        let contents: Vec<Option<&str>> = out.objects.iter().map(|o| o.content.as_deref()).collect();
        assert_eq!(contents, [None, None, None, None, Some("ab")]);
    }

    #[test]
    fn test_unresolved_targets() {
        let out = walk("self.play(Wait())\nself.play(Write(self.t))\nself.play(Write(\"x\"))\n");
        assert!(out.timeline.iter().all(|e| e.target == Target::Unresolved));
        assert_eq!(out.timeline.len(), 3);
    }

    #[test]
    fn test_non_effect_arguments_skipped_individually() {
        let out = walk("self.play(t.animate.shift(UP), Write(t), run_time=2)\nself.play(Create(c))\n");
        assert_eq!(out.timeline.len(), 2);
        assert_eq!(out.timeline[0].kind, "Write");
        assert_eq!(times(&out), vec![(0.0, 1.5), (1.5, 3.0)]);
        assert_eq!(out.skipped.effect_argument, 1);
    }

    #[test]
    fn test_empty_group_does_not_advance_clock() {
        let out = walk("self.play()\nself.play(t.animate.scale(2))\nself.play(Write(t))\n");
        assert_eq!(times(&out), vec![(0.0, 1.5)]);
        assert_eq!(out.skipped.effect_argument, 1);
    }

    #[test]
    fn test_other_expressions_do_not_advance_clock() {
        let out = walk("self.wait(1)\nself.add(t)\nplay(Write(t))\nself.play(Write(t))\n");
        assert_eq!(times(&out), vec![(0.0, 1.5)]);
        assert_eq!(out.skipped.expression, 3);
    }

    #[test]
    fn test_history_not_patched_for_later_declarations() {
        let out = walk("self.play(Create(c))\nc = Circle()\nself.play(FadeOut(c))\n");
        assert_eq!(out.objects[0].animations.len(), 1);
        assert_eq!(out.objects[0].animations[0].kind, "FadeOut");
        assert_eq!(out.timeline.len(), 2);
    }

    #[test]
    fn test_rebound_name_keeps_both_objects() {
        let out = walk("c = Circle()\nc = Circle()\nself.play(Create(c))\n");
        assert_eq!(out.objects.len(), 2);
        assert_eq!(out.objects[1].id.as_str(), "Circle_2");
        assert!(out.objects.iter().all(|o| o.animations.len() == 1));
    }

    #[test]
    fn test_nested_blocks_are_walked() {
        let src = r#"
from manim import *

class Demo(Scene):
    def construct(self):
        title = Text("Title")
        for i in range(2):
            self.play(Write(title))
        with self.voiceover(text="x") as tracker:
            self.play(FadeOut(title))
"#;
        let out = walk(src);
        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.timeline.len(), 2);
        assert_eq!(out.objects[0].animations.len(), 2);
        assert_eq!(times(&out), vec![(0.0, 1.5), (1.5, 3.0)]);
    }

    #[test]
    fn test_custom_duration() {
        let module = parse_source("self.play(A(x))\nself.play(B(x))\n", "<test>").unwrap();
        let out = SyntaxTreeWalker::new(2.0).walk(&module);
        assert_eq!(times(&out), vec![(0.0, 2.0), (2.0, 4.0)]);
    }

    #[test]
    fn test_augmented_and_annotated_assignments_tallied() {
        let out = walk("x += 1\ny: Circle = Circle()\n");
        assert!(out.objects.is_empty());
        assert_eq!(out.skipped.assignment, 2);
    }

    #[test]
    fn test_deterministic() {
        let src = "a = Text(\"a\")\nself.play(Write(a), FadeIn(b))\n";
        assert_eq!(walk(src), walk(src));
    }

    #[test]
    fn test_match_case_bodies_are_walked() {
        let src = r#"
match step:
    case "intro":
        t = Text("Hi")
        self.play(Write(t))
    case _:
        self.play(FadeOut(t))
"#;
        let out = walk(src);
        assert_eq!(out.objects.len(), 1);
        assert_eq!(times(&out), vec![(0.0, 1.5), (1.5, 3.0)]);
        assert_eq!(out.objects[0].animations.len(), 2);
    }
}
