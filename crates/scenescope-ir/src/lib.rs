//! # scenescope-ir
//!
//! The scene graph extracted from a generated animation script: the visual
//! objects it declares, the animation timeline it plays, and the checks that
//! keep the two consistent.
//!
//! Every consumer (CLI output, diagram export, a web frontend) reads this
//! model rather than the source text.

pub mod animation;
pub mod diagram;
pub mod object;
pub mod registry;
pub mod scene;
pub mod timeline;
pub mod validate;

pub use animation::{AnimationEvent, AnimationRecord, Target, UNRESOLVED_TARGET};
pub use object::{ObjectId, ObjectKind, VisualObject};
pub use registry::ObjectRegistry;
pub use scene::SceneGraph;
pub use timeline::{build_timeline, TimelineEntry};
pub use validate::{validate_scene_graph, Diagnostic};
