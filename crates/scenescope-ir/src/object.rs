use serde::{Deserialize, Serialize};

use crate::animation::AnimationRecord;

/// The visual primitives the extractor knows how to declare.
///
/// `Unrecognized` covers every other constructor; objects of that kind are
/// never registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Text,
    Tex,
    MathTex,
    Circle,
    Square,
    Dot,
    Line,
    Unrecognized,
}

impl ObjectKind {
    /// Classify a constructor identifier. Matching is exact and case-sensitive.
    pub fn from_constructor(name: &str) -> Self {
        match name {
            "Text" => ObjectKind::Text,
            "Tex" => ObjectKind::Tex,
            "MathTex" => ObjectKind::MathTex,
            "Circle" => ObjectKind::Circle,
            "Square" => ObjectKind::Square,
            "Dot" => ObjectKind::Dot,
            "Line" => ObjectKind::Line,
            _ => ObjectKind::Unrecognized,
        }
    }

    pub fn is_recognized(self) -> bool {
        self != ObjectKind::Unrecognized
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Text => "Text",
            ObjectKind::Tex => "Tex",
            ObjectKind::MathTex => "MathTex",
            ObjectKind::Circle => "Circle",
            ObjectKind::Square => "Square",
            ObjectKind::Dot => "Dot",
            ObjectKind::Line => "Line",
            ObjectKind::Unrecognized => "Unrecognized",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identifier for a visual object: `<Kind>_<ordinal>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the id for the `ordinal`-th object of `kind` (1-based).
    pub fn for_kind(kind: ObjectKind, ordinal: u32) -> Self {
        Self::new(format!("{}_{}", kind, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A visual object declared in the script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualObject {
    pub id: ObjectId,
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// The identifier the constructor call was assigned to.
    #[serde(rename = "name")]
    pub binding_name: String,
    /// First constructor argument, when it is a plain string literal.
    pub content: Option<String>,
    /// Animations that targeted this object, in timeline order.
    pub animations: Vec<AnimationRecord>,
}

impl VisualObject {
    pub fn new(
        id: ObjectId,
        kind: ObjectKind,
        binding_name: impl Into<String>,
        content: Option<String>,
    ) -> Self {
        Self {
            id,
            kind,
            binding_name: binding_name.into(),
            content,
            animations: Vec::new(),
        }
    }
}
