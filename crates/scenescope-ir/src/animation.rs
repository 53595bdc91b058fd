use serde::{Deserialize, Serialize};

/// Wire representation of a target that is not a plain identifier.
pub const UNRESOLVED_TARGET: &str = "unknown";

/// What an animation effect was applied to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Target {
    /// A bare identifier, expected to be the binding name of a declared object.
    Binding(String),
    /// The first argument was an expression, a literal, or missing.
    Unresolved,
}

impl Target {
    pub fn binding(name: impl Into<String>) -> Self {
        Target::Binding(name.into())
    }

    pub fn as_binding(&self) -> Option<&str> {
        match self {
            Target::Binding(name) => Some(name),
            Target::Unresolved => None,
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Binding(name) => f.write_str(name),
            Target::Unresolved => f.write_str(UNRESOLVED_TARGET),
        }
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.to_string()
    }
}

// The wire format cannot tell `unknown` the sentinel from a variable named
// `unknown`; reading it back always yields the sentinel.
impl From<String> for Target {
    fn from(name: String) -> Self {
        if name == UNRESOLVED_TARGET {
            Target::Unresolved
        } else {
            Target::Binding(name)
        }
    }
}

/// One effect played inside a `play(...)` group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationEvent {
    /// Effect name, e.g. `Write` or `FadeIn`.
    #[serde(rename = "type")]
    pub kind: String,
    pub target: Target,
    pub start: f64,
    pub end: f64,
}

impl AnimationEvent {
    pub fn new(kind: impl Into<String>, target: Target, start: f64, end: f64) -> Self {
        Self {
            kind: kind.into(),
            target,
            start,
            end,
        }
    }

    /// The per-object view of this event.
    pub fn record(&self) -> AnimationRecord {
        AnimationRecord {
            kind: self.kind.clone(),
            start: self.start,
            end: self.end,
        }
    }

    pub fn has_valid_timing(&self) -> bool {
        self.end > self.start
    }
}

/// An animation as stored in an object's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub start: f64,
    pub end: f64,
}
