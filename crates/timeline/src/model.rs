use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::{invalid, time_map, Marker, Seconds, TimelineError, TIME_EPSILON};

string_id!(
    /// Identifier of a layer (track) in the timeline.
    LayerId
);
string_id!(
    /// Identifier of a clip. Unique across all layers.
    ClipId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Text,
    Effect,
    Overlay,
}

impl Default for MediaKind {
    fn default() -> Self {
        Self::Video
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub id: String,
    pub time: Seconds,
    pub property: String,
    pub value: Value,
    #[serde(default = "default_easing")]
    pub easing: String,
}

fn default_easing() -> String {
    "linear".to_string()
}

impl Keyframe {
    pub fn new(time: Seconds, property: impl Into<String>, value: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            time,
            property: property.into(),
            value,
            easing: default_easing(),
        }
    }
}

/// A clip placed on a layer.
///
/// `start_time`/`end_time` are timeline-time. `original_start_time` is the
/// offset into the untouched source media; when absent it equals `start_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clip {
    pub id: ClipId,
    pub kind: MediaKind,
    pub start_time: Seconds,
    pub end_time: Seconds,
    pub duration: Seconds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_start_time: Option<Seconds>,
    #[serde(default)]
    pub source_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub keyframes: Vec<Keyframe>,
}

impl Clip {
    pub fn new(kind: MediaKind, start_time: Seconds, end_time: Seconds) -> Self {
        Self {
            id: ClipId::new(),
            kind,
            start_time,
            end_time,
            duration: end_time - start_time,
            original_start_time: Some(start_time),
            source_ref: String::new(),
            content: None,
            properties: BTreeMap::new(),
            keyframes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<ClipId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = source_ref.into();
        self
    }

    pub fn with_original_start(mut self, original_start_time: Seconds) -> Self {
        self.original_start_time = Some(original_start_time);
        self
    }

    pub fn source_start(&self) -> Seconds {
        self.original_start_time.unwrap_or(self.start_time)
    }

    pub fn source_end(&self) -> Seconds {
        self.source_start() + self.duration
    }

    /// Materializes the source offset and orders keyframes by time.
    pub(crate) fn canonicalize(&mut self) {
        if self.original_start_time.is_none() {
            self.original_start_time = Some(self.start_time);
        }
        self.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
    }

    /// True when `[start, end)` intersects this clip by more than the tolerance.
    pub fn overlaps(&self, start: Seconds, end: Seconds) -> bool {
        start < self.end_time - TIME_EPSILON && end > self.start_time + TIME_EPSILON
    }

    /// Strictly inside the clip, boundaries excluded.
    pub fn contains_time(&self, time: Seconds) -> bool {
        time > self.start_time + TIME_EPSILON && time < self.end_time - TIME_EPSILON
    }

    pub fn validate(&self) -> Result<(), TimelineError> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() || !self.duration.is_finite()
        {
            return Err(invalid(format!("clip {} has non-finite timing", self.id)));
        }
        if self.start_time < 0.0 {
            return Err(invalid(format!("clip {} starts before 0", self.id)));
        }
        if self.end_time <= self.start_time {
            return Err(invalid(format!(
                "clip {} must end after it starts ({} <= {})",
                self.id, self.end_time, self.start_time
            )));
        }
        if (self.duration - (self.end_time - self.start_time)).abs() > TIME_EPSILON {
            return Err(invalid(format!(
                "clip {} duration {} does not match its bounds",
                self.id, self.duration
            )));
        }
        if let Some(original) = self.original_start_time {
            if !original.is_finite() || original < 0.0 {
                return Err(invalid(format!("clip {} has an invalid source offset", self.id)));
            }
        }
        Ok(())
    }

    pub(crate) fn set_bounds(&mut self, start_time: Seconds, end_time: Seconds) {
        self.start_time = start_time;
        self.end_time = end_time;
        self.duration = end_time - start_time;
    }

    pub(crate) fn shift(&mut self, delta: Seconds) {
        self.start_time += delta;
        self.end_time += delta;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub clips: Vec<Clip>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_main_video: bool,
}

fn default_true() -> bool {
    true
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: LayerId::new(),
            name: name.into(),
            kind,
            clips: Vec::new(),
            visible: true,
            locked: false,
            muted: false,
            order: 0,
            is_main_video: false,
        }
    }

    pub fn main_video(name: impl Into<String>) -> Self {
        let mut layer = Self::new(name, MediaKind::Video);
        layer.is_main_video = true;
        layer
    }

    pub fn with_id(mut self, id: impl Into<LayerId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_clips(mut self, clips: Vec<Clip>) -> Self {
        self.clips = clips;
        self.sort_clips();
        self
    }

    pub fn clip(&self, id: &ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| &c.id == id)
    }

    pub fn clip_index(&self, id: &ClipId) -> Option<usize> {
        self.clips.iter().position(|c| &c.id == id)
    }

    /// First clip other than `ignore` that intersects `[start, end)`.
    pub fn find_overlap(
        &self,
        start: Seconds,
        end: Seconds,
        ignore: Option<&ClipId>,
    ) -> Option<&Clip> {
        self.clips
            .iter()
            .filter(|c| Some(&c.id) != ignore)
            .find(|c| c.overlaps(start, end))
    }

    pub fn content_duration(&self) -> Seconds {
        self.clips.iter().map(|c| c.duration).sum()
    }

    /// Inserts keeping clips ordered by `start_time`; ties keep insertion order.
    pub(crate) fn insert_sorted(&mut self, clip: Clip) -> usize {
        let idx = self
            .clips
            .iter()
            .position(|c| c.start_time > clip.start_time)
            .unwrap_or(self.clips.len());
        self.clips.insert(idx, clip);
        idx
    }

    pub(crate) fn sort_clips(&mut self) {
        self.clips
            .sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    }

    pub(crate) fn validate(&self) -> Result<(), TimelineError> {
        for clip in &self.clips {
            clip.validate()?;
            if let Some(other) = self.find_overlap(clip.start_time, clip.end_time, Some(&clip.id)) {
                return Err(invalid(format!(
                    "clips {} and {} overlap on layer {}",
                    clip.id, other.id, self.id
                )));
            }
        }
        Ok(())
    }
}

/// The editable document: everything a checkpoint captures and every command mutates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    #[serde(default)]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub markers: Vec<Marker>,
    #[serde(default)]
    pub playhead_time: Seconds,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default)]
    pub duration: Seconds,
    #[serde(default)]
    pub selected_clips: Vec<ClipId>,
    #[serde(default = "default_true")]
    pub is_snapping: bool,
}

fn default_zoom() -> f64 {
    1.0
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            markers: Vec::new(),
            playhead_time: 0.0,
            zoom: default_zoom(),
            duration: 0.0,
            selected_clips: Vec::new(),
            is_snapping: true,
        }
    }
}

impl Timeline {
    pub const MIN_ZOOM: f64 = 0.1;
    pub const MAX_ZOOM: f64 = 10.0;

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    pub fn layer_index(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| &l.id == id)
    }

    pub fn main_video_layer(&self) -> Option<&Layer> {
        time_map::main_video_layer(&self.layers)
    }

    pub fn find_clip(&self, id: &ClipId) -> Option<(&Layer, &Clip)> {
        self.layers
            .iter()
            .find_map(|layer| layer.clip(id).map(|clip| (layer, clip)))
    }

    /// Returns `(layer index, clip index)` of a clip.
    pub(crate) fn locate_clip(&self, id: &ClipId) -> Result<(usize, usize), TimelineError> {
        self.layers
            .iter()
            .enumerate()
            .find_map(|(li, layer)| layer.clip_index(id).map(|ci| (li, ci)))
            .ok_or_else(|| TimelineError::ClipNotFound(id.clone()))
    }

    /// Index of the single main-video layer. Zero or several is a validation error.
    pub(crate) fn sole_main_video_index(&self) -> Result<usize, TimelineError> {
        let mut mains = self
            .layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_main_video)
            .map(|(i, _)| i);
        match (mains.next(), mains.next()) {
            (Some(idx), None) => Ok(idx),
            (None, _) => Err(invalid("timeline has no main video layer")),
            (Some(_), Some(_)) => Err(invalid("timeline has more than one main video layer")),
        }
    }

    pub fn clip_count(&self) -> usize {
        self.layers.iter().map(|l| l.clips.len()).sum()
    }

    pub fn effective_duration(&self) -> Seconds {
        time_map::effective_duration(&self.layers)
    }

    /// Length the playhead may travel: the main video's content when it has
    /// clips, otherwise the stored `duration`.
    pub fn playback_duration(&self) -> Seconds {
        match self.main_video_layer() {
            Some(main) if !main.clips.is_empty() => main.content_duration(),
            _ => self.duration,
        }
    }

    pub(crate) fn renumber_layers(&mut self) {
        for (idx, layer) in self.layers.iter_mut().enumerate() {
            layer.order = idx as u32;
        }
    }

    /// Brings a freshly loaded document into canonical form: layers ordered by
    /// rank, clips ordered by start, source offsets materialized and keyframes
    /// ordered by time.
    pub fn normalize(&mut self) {
        self.layers.sort_by_key(|l| l.order);
        self.renumber_layers();
        for layer in &mut self.layers {
            layer.sort_clips();
            for clip in &mut layer.clips {
                clip.canonicalize();
            }
        }
        self.zoom = self.zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM);
    }

    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.layers.iter().filter(|l| l.is_main_video).count() > 1 {
            return Err(invalid("timeline has more than one main video layer"));
        }
        let mut layer_ids = HashSet::new();
        let mut clip_ids = HashSet::new();
        for layer in &self.layers {
            if !layer_ids.insert(&layer.id) {
                return Err(invalid(format!("duplicate layer id {}", layer.id)));
            }
            layer.validate()?;
            for clip in &layer.clips {
                if !clip_ids.insert(&clip.id) {
                    return Err(invalid(format!("duplicate clip id {}", clip.id)));
                }
            }
        }
        let mut marker_ids = HashSet::new();
        for marker in &self.markers {
            if !marker_ids.insert(&marker.id) {
                return Err(invalid(format!("duplicate marker id {}", marker.id)));
            }
        }
        if self.duration < 0.0 || !self.duration.is_finite() {
            return Err(invalid("timeline duration must be a non-negative number"));
        }
        Ok(())
    }
}
