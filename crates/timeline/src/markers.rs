/// Timeline markers
use serde::{Deserialize, Serialize};

use crate::{Seconds, Timeline};

string_id!(
    /// Marker ID
    MarkerId
);

/// Timeline marker. Markers live in timeline-time and are independent of layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub time: Seconds,
    pub label: String,

    /// Color in hex format (e.g., "#FF0000")
    #[serde(default = "default_marker_color")]
    pub color: String,
}

fn default_marker_color() -> String {
    "#6366f1".to_string() // Indigo
}

impl Marker {
    pub fn new(time: Seconds, label: impl Into<String>) -> Self {
        Self {
            id: MarkerId::new(),
            time,
            label: label.into(),
            color: default_marker_color(),
        }
    }

    pub fn with_id(mut self, id: impl Into<MarkerId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }
}

impl Timeline {
    pub fn marker(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| &m.id == id)
    }

    /// Markers sorted by time
    pub fn markers_sorted(&self) -> Vec<&Marker> {
        let mut markers: Vec<_> = self.markers.iter().collect();
        markers.sort_by(|a, b| a.time.total_cmp(&b.time));
        markers
    }

    /// Markers within `tolerance` of `time`
    pub fn markers_at(&self, time: Seconds, tolerance: Seconds) -> Vec<&Marker> {
        self.markers
            .iter()
            .filter(|m| (m.time - time).abs() <= tolerance)
            .collect()
    }

    /// Nearest marker to `time`, used for snapping
    pub fn nearest_marker(&self, time: Seconds) -> Option<&Marker> {
        self.markers
            .iter()
            .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
    }
}
