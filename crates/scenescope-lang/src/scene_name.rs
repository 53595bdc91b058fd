use crate::ast::{Expr, Module, StmtKind};

/// Name of the first top-level class with a `*Scene` base, e.g. `Scene`,
/// `ThreeDScene` or `manim.MovingCameraScene`.
pub fn detect_scene_name(module: &Module) -> Option<String> {
    module.body.iter().find_map(|stmt| match &stmt.kind {
        StmtKind::ClassDef { name, bases, .. } if bases.iter().any(is_scene_base) => {
            Some(name.clone())
        }
        _ => None,
    })
}

fn is_scene_base(base: &Expr) -> bool {
    base.terminal_name()
        .is_some_and(|name| name.ends_with("Scene"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn detect(src: &str) -> Option<String> {
        detect_scene_name(&parse_source(src, "<test>").unwrap())
    }

    #[test]
    fn test_plain_scene_base() {
        assert_eq!(detect("class Intro(Scene):\n    pass\n").as_deref(), Some("Intro"));
    }

    #[test]
    fn test_suffix_and_dotted_bases() {
        assert_eq!(
            detect("class A(ThreeDScene):\n    pass\n").as_deref(),
            Some("A")
        );
        assert_eq!(
            detect("class B(Mixin, manim.MovingCameraScene):\n    pass\n").as_deref(),
            Some("B")
        );
    }

    #[test]
    fn test_first_match_wins() {
        let src = "class Helper:\n    pass\nclass One(Scene):\n    pass\nclass Two(Scene):\n    pass\n";
        assert_eq!(detect(src).as_deref(), Some("One"));
    }

    #[test]
    fn test_no_scene_class() {
        assert_eq!(detect("class Helper(object):\n    pass\nx = 1\n"), None);
        assert_eq!(detect("class SceneHelper(Base):\n    pass\n"), None);
    }

    #[test]
    fn test_nested_classes_ignored() {
        let src = "def f():\n    class Inner(Scene):\n        pass\n";
        assert_eq!(detect(src), None);
    }
}
