//! Conversion between timeline-time (the edited, gap-free sequence) and
//! source-time (positions in the original media file).
//!
//! Everything here is recomputed from the layer topology on every call. Edits
//! only rewrite timeline-time fields, so any cached mapping would silently go
//! stale after the next trim, split or delete.

use serde::{Deserialize, Serialize};

use crate::{Clip, Layer, Seconds, TIME_EPSILON};

/// How close source playback must get to a clip's source end before the next
/// clip is reported as a boundary.
pub const BOUNDARY_EPSILON: Seconds = 0.1;

pub fn main_video_layer(layers: &[Layer]) -> Option<&Layer> {
    layers.iter().find(|l| l.is_main_video)
}

/// Main-video clips ordered by timeline start, or `None` when there is nothing to map.
fn main_clips(layers: &[Layer]) -> Option<Vec<&Clip>> {
    let layer = main_video_layer(layers)?;
    if layer.clips.is_empty() {
        return None;
    }
    let mut clips: Vec<&Clip> = layer.clips.iter().collect();
    clips.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    Some(clips)
}

pub fn timeline_to_source(time: Seconds, layers: &[Layer]) -> Seconds {
    let Some(clips) = main_clips(layers) else {
        return time;
    };
    let time = time.max(0.0);
    let mut accumulated = 0.0;
    for clip in &clips {
        if time < accumulated + clip.duration {
            return clip.source_start() + (time - accumulated);
        }
        accumulated += clip.duration;
    }
    // Past the end: saturate at the last clip's source end.
    match clips.last() {
        Some(last) => last.source_end(),
        None => time,
    }
}

pub fn source_to_timeline(source_time: Seconds, layers: &[Layer]) -> Seconds {
    let Some(clips) = main_clips(layers) else {
        return source_time;
    };
    let mut timeline_time = 0.0;
    for clip in clips {
        let window_start = clip.source_start();
        let window_end = clip.source_end();
        if source_time >= window_start && source_time < window_end {
            return timeline_time + (source_time - window_start);
        }
        if source_time >= window_end {
            timeline_time += clip.duration;
        }
    }
    timeline_time
}

pub fn effective_duration(layers: &[Layer]) -> Seconds {
    main_video_layer(layers)
        .map(|layer| layer.content_duration())
        .unwrap_or(0.0)
}

/// The clip playback should jump to once the current clip's source runs out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipBoundary {
    pub clip: Clip,
    pub timeline_time: Seconds,
}

pub fn next_clip_boundary(source_time: Seconds, layers: &[Layer]) -> Option<ClipBoundary> {
    let clips = main_clips(layers)?;
    let mut accumulated = 0.0;
    for (idx, clip) in clips.iter().enumerate() {
        accumulated += clip.duration;
        if (source_time - clip.source_end()).abs() > BOUNDARY_EPSILON {
            continue;
        }
        if let Some(next) = clips.get(idx + 1) {
            return Some(ClipBoundary {
                clip: (*next).clone(),
                timeline_time: accumulated,
            });
        }
    }
    None
}

/// A contiguous source range kept by the edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSegment {
    pub start_time: Seconds,
    pub duration: Seconds,
}

impl SourceSegment {
    pub fn end_time(&self) -> Seconds {
        self.start_time + self.duration
    }
}

/// Source ranges the main video plays, in timeline order. Neighbouring clips
/// that are contiguous in the source collapse into one segment.
pub fn source_segments(layers: &[Layer]) -> Vec<SourceSegment> {
    let Some(clips) = main_clips(layers) else {
        return Vec::new();
    };
    let mut segments: Vec<SourceSegment> = Vec::with_capacity(clips.len());
    for clip in clips {
        match segments.last_mut() {
            Some(last) if (last.end_time() - clip.source_start()).abs() <= TIME_EPSILON => {
                last.duration += clip.duration;
            }
            _ => segments.push(SourceSegment {
                start_time: clip.source_start(),
                duration: clip.duration,
            }),
        }
    }
    segments
}
