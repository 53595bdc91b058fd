use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use scenescope_core::ScopeResult;

use crate::animation::AnimationEvent;
use crate::object::VisualObject;

/// Everything extracted from one script: its scene class, declared objects
/// and the animation timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneGraph {
    /// Name of the first class deriving from a `*Scene` base.
    pub scene_name: Option<String>,
    /// Objects in declaration order.
    pub objects: Vec<VisualObject>,
    /// Events in play order.
    pub timeline: Vec<AnimationEvent>,
}

impl SceneGraph {
    pub fn new(
        scene_name: Option<String>,
        objects: Vec<VisualObject>,
        timeline: Vec<AnimationEvent>,
    ) -> Self {
        Self {
            scene_name,
            objects,
            timeline,
        }
    }

    /// The most recently declared object bound to `binding_name`.
    pub fn object_by_binding(&self, binding_name: &str) -> Option<&VisualObject> {
        self.objects
            .iter()
            .rev()
            .find(|o| o.binding_name == binding_name)
    }

    /// Every binding name that refers to at least one object.
    pub fn binding_names(&self) -> HashSet<&str> {
        self.objects
            .iter()
            .map(|o| o.binding_name.as_str())
            .collect()
    }

    /// End of the last animation, or `0.0` for an empty timeline.
    pub fn total_duration(&self) -> f64 {
        self.timeline.iter().map(|e| e.end).fold(0.0, f64::max)
    }

    pub fn to_json_pretty(&self) -> ScopeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
