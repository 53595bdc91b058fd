use serde::{Deserialize, Serialize};
use std::fmt;

/// Virtual clock position, in seconds from the start of the scene.
///
/// The clock is a plain value: advancing it returns a new clock instead of
/// mutating shared state, so it can be threaded through a traversal as an
/// accumulator.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Clock {
    seconds: f64,
}

impl Clock {
    /// The start of the scene.
    pub fn zero() -> Self {
        Self { seconds: 0.0 }
    }

    pub fn as_seconds(&self) -> f64 {
        self.seconds
    }

    /// The clock position `duration` seconds later.
    pub fn advanced_by(self, duration: f64) -> Self {
        Self {
            seconds: self.seconds + duration,
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_seconds(self.seconds))
    }
}

/// Shortest round-trip rendering of a time value that always keeps a
/// fractional part: `0.0`, `1.5`, `3.0`.
pub fn format_seconds(seconds: f64) -> String {
    format!("{seconds:?}")
}
