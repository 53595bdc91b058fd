use std::collections::HashMap;

use crate::animation::{AnimationEvent, Target};
use crate::object::{ObjectId, ObjectKind, VisualObject};

/// Declared objects, in declaration order, addressable by binding name.
///
/// Ordinals are counted per kind. A binding declared twice keeps both
/// objects; lookups by name see the most recent one.
#[derive(Debug, Default, Clone)]
pub struct ObjectRegistry {
    objects: Vec<VisualObject>,
    ordinals: HashMap<ObjectKind, u32>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new object and assign its id.
    ///
    /// Returns `None` (and allocates no ordinal) for unrecognized kinds.
    pub fn declare(
        &mut self,
        kind: ObjectKind,
        binding_name: impl Into<String>,
        content: Option<String>,
    ) -> Option<&VisualObject> {
        if !kind.is_recognized() {
            return None;
        }
        let ordinal = self.ordinals.entry(kind).or_insert(0);
        *ordinal += 1;
        let id = ObjectId::for_kind(kind, *ordinal);
        self.objects
            .push(VisualObject::new(id, kind, binding_name, content));
        self.objects.last()
    }

    /// Append `event` to the history of every object currently bound to its
    /// target. Returns how many objects received it.
    pub fn attach(&mut self, event: &AnimationEvent) -> usize {
        let Target::Binding(name) = &event.target else {
            return 0;
        };
        let mut attached = 0;
        for obj in self.objects.iter_mut().filter(|o| &o.binding_name == name) {
            obj.animations.push(event.record());
            attached += 1;
        }
        attached
    }

    pub fn objects(&self) -> &[VisualObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn into_objects(self) -> Vec<VisualObject> {
        self.objects
    }
}
