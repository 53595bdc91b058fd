use serde::{Deserialize, Serialize};

use scenescope_core::format_seconds;

use crate::animation::AnimationEvent;

/// Human-readable line of the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// `"<start> → <end>"`
    pub time_range: String,
    /// `"<effect>(<target>)"`
    pub action: String,
}

impl TimelineEntry {
    pub fn from_event(event: &AnimationEvent) -> Self {
        Self {
            time_range: format!(
                "{} → {}",
                format_seconds(event.start),
                format_seconds(event.end)
            ),
            action: format!("{}({})", event.kind, event.target),
        }
    }
}

/// Render every event, one entry each, in the given order.
pub fn build_timeline(events: &[AnimationEvent]) -> Vec<TimelineEntry> {
    events.iter().map(TimelineEntry::from_event).collect()
}
