use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::edit_operations::{
    add_clip, delete_with_gap_fill, insert_with_ripple, merge_clips, move_clip, remove_clip,
    split_clip, trim_clip, unmerge_clips,
};
use crate::{
    invalid, ActionType, Clip, ClipId, Keyframe, Layer, LayerId, Marker, MarkerId, MediaKind,
    Seconds, Timeline, TimelineError,
};

/// Exact bounds of a clip, recorded so a ripple can be reversed without drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipPosition {
    pub clip_id: ClipId,
    pub start_time: Seconds,
    pub end_time: Seconds,
}

impl ClipPosition {
    pub fn of(clip: &Clip) -> Self {
        Self {
            clip_id: clip.id.clone(),
            start_time: clip.start_time,
            end_time: clip.end_time,
        }
    }
}

/// Partial update of layer attributes. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_main_video: Option<bool>,
}

impl LayerPatch {
    /// Applies the patch and returns the patch that restores the previous values.
    fn apply(self, layer: &mut Layer) -> LayerPatch {
        let mut previous = LayerPatch::default();
        if let Some(name) = self.name {
            previous.name = Some(std::mem::replace(&mut layer.name, name));
        }
        if let Some(kind) = self.kind {
            previous.kind = Some(std::mem::replace(&mut layer.kind, kind));
        }
        if let Some(visible) = self.visible {
            previous.visible = Some(std::mem::replace(&mut layer.visible, visible));
        }
        if let Some(locked) = self.locked {
            previous.locked = Some(std::mem::replace(&mut layer.locked, locked));
        }
        if let Some(muted) = self.muted {
            previous.muted = Some(std::mem::replace(&mut layer.muted, muted));
        }
        if let Some(main) = self.is_main_video {
            previous.is_main_video = Some(std::mem::replace(&mut layer.is_main_video, main));
        }
        previous
    }
}

/// Partial update of clip attributes that do not affect timing.
/// Timing changes go through move/trim/split so overlap rules apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyframes: Option<Vec<Keyframe>>,
}

impl ClipPatch {
    fn apply(self, clip: &mut Clip) -> ClipPatch {
        let mut previous = ClipPatch::default();
        if let Some(kind) = self.kind {
            previous.kind = Some(std::mem::replace(&mut clip.kind, kind));
        }
        if let Some(source_ref) = self.source_ref {
            previous.source_ref = Some(std::mem::replace(&mut clip.source_ref, source_ref));
        }
        if let Some(properties) = self.properties {
            previous.properties = Some(std::mem::replace(&mut clip.properties, properties));
        }
        if let Some(mut keyframes) = self.keyframes {
            keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
            previous.keyframes = Some(std::mem::replace(&mut clip.keyframes, keyframes));
        }
        previous
    }
}

/// Every mutation of a [`Timeline`]. Applying a command returns the command
/// that reverses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TimelineCommand {
    AddLayer {
        layer: Layer,
        #[serde(default)]
        index: Option<usize>,
    },
    RemoveLayer {
        layer_id: LayerId,
    },
    UpdateLayer {
        layer_id: LayerId,
        patch: LayerPatch,
    },
    /// Full new bottom-to-top order. Ranks are renumbered 0..n-1.
    ReorderLayers {
        layer_ids: Vec<LayerId>,
    },
    AddClip {
        layer_id: LayerId,
        clip: Clip,
    },
    RemoveClip {
        clip_id: ClipId,
    },
    UpdateClip {
        clip_id: ClipId,
        patch: ClipPatch,
    },
    MoveClip {
        clip_id: ClipId,
        start_time: Seconds,
        #[serde(default)]
        layer_id: Option<LayerId>,
    },
    TrimClip {
        clip_id: ClipId,
        start_time: Seconds,
        end_time: Seconds,
    },
    SplitClip {
        clip_id: ClipId,
        split_time: Seconds,
        #[serde(default)]
        new_clip_id: Option<ClipId>,
    },
    MergeClips {
        layer_id: LayerId,
        clip_ids: Vec<ClipId>,
    },
    /// Reverses a merge: shrinks the surviving clip and re-creates the others.
    UnmergeClips {
        clip_id: ClipId,
        end_time: Seconds,
        keyframes: Vec<Keyframe>,
        removed: Vec<Clip>,
    },
    DeleteWithGapFill {
        clip_id: ClipId,
    },
    /// Reverses a gap-fill delete.
    InsertWithRipple {
        clip: Clip,
        #[serde(default)]
        shifted: Vec<ClipPosition>,
    },
    SetPlayhead {
        time: Seconds,
    },
    SetDuration {
        duration: Seconds,
    },
    SetZoom {
        zoom: f64,
    },
    SetSelection {
        clip_ids: Vec<ClipId>,
    },
    AddMarker {
        marker: Marker,
        #[serde(default)]
        index: Option<usize>,
    },
    RemoveMarker {
        marker_id: MarkerId,
    },
    UpdateMarker {
        marker: Marker,
    },
    /// Applies all commands or none of them.
    Batch {
        label: String,
        commands: Vec<TimelineCommand>,
    },
}

pub fn apply_command(
    timeline: &mut Timeline,
    command: TimelineCommand,
) -> Result<TimelineCommand, TimelineError> {
    match command {
        TimelineCommand::AddLayer { layer, index } => add_layer(timeline, layer, index),
        TimelineCommand::RemoveLayer { layer_id } => remove_layer(timeline, layer_id),
        TimelineCommand::UpdateLayer { layer_id, patch } => update_layer(timeline, layer_id, patch),
        TimelineCommand::ReorderLayers { layer_ids } => reorder_layers(timeline, layer_ids),
        TimelineCommand::AddClip { layer_id, clip } => add_clip(timeline, layer_id, clip),
        TimelineCommand::RemoveClip { clip_id } => remove_clip(timeline, clip_id),
        TimelineCommand::UpdateClip { clip_id, patch } => update_clip(timeline, clip_id, patch),
        TimelineCommand::MoveClip {
            clip_id,
            start_time,
            layer_id,
        } => move_clip(timeline, clip_id, start_time, layer_id),
        TimelineCommand::TrimClip {
            clip_id,
            start_time,
            end_time,
        } => trim_clip(timeline, clip_id, start_time, end_time),
        TimelineCommand::SplitClip {
            clip_id,
            split_time,
            new_clip_id,
        } => split_clip(timeline, clip_id, split_time, new_clip_id),
        TimelineCommand::MergeClips { layer_id, clip_ids } => {
            merge_clips(timeline, layer_id, clip_ids)
        }
        TimelineCommand::UnmergeClips {
            clip_id,
            end_time,
            keyframes,
            removed,
        } => unmerge_clips(timeline, clip_id, end_time, keyframes, removed),
        TimelineCommand::DeleteWithGapFill { clip_id } => delete_with_gap_fill(timeline, clip_id),
        TimelineCommand::InsertWithRipple { clip, shifted } => {
            insert_with_ripple(timeline, clip, shifted)
        }
        TimelineCommand::SetPlayhead { time } => set_playhead(timeline, time),
        TimelineCommand::SetDuration { duration } => set_duration(timeline, duration),
        TimelineCommand::SetZoom { zoom } => set_zoom(timeline, zoom),
        TimelineCommand::SetSelection { clip_ids } => set_selection(timeline, clip_ids),
        TimelineCommand::AddMarker { marker, index } => add_marker(timeline, marker, index),
        TimelineCommand::RemoveMarker { marker_id } => remove_marker(timeline, marker_id),
        TimelineCommand::UpdateMarker { marker } => update_marker(timeline, marker),
        TimelineCommand::Batch { label, commands } => apply_batch(timeline, label, commands),
    }
}

fn add_layer(
    timeline: &mut Timeline,
    mut layer: Layer,
    index: Option<usize>,
) -> Result<TimelineCommand, TimelineError> {
    if timeline.layer(&layer.id).is_some() {
        return Err(invalid(format!("layer id already exists: {}", layer.id)));
    }
    if layer.is_main_video && timeline.main_video_layer().is_some() {
        return Err(invalid("timeline already has a main video layer"));
    }
    layer.sort_clips();
    let mut seen = HashSet::new();
    for clip in &layer.clips {
        if !seen.insert(&clip.id) || timeline.find_clip(&clip.id).is_some() {
            return Err(invalid(format!("clip id already exists: {}", clip.id)));
        }
    }
    layer.validate()?;

    for clip in &mut layer.clips {
        clip.canonicalize();
    }
    let layer_id = layer.id.clone();
    let idx = index.unwrap_or(timeline.layers.len()).min(timeline.layers.len());
    timeline.layers.insert(idx, layer);
    timeline.renumber_layers();
    Ok(TimelineCommand::RemoveLayer { layer_id })
}

fn remove_layer(
    timeline: &mut Timeline,
    layer_id: LayerId,
) -> Result<TimelineCommand, TimelineError> {
    let idx = timeline
        .layer_index(&layer_id)
        .ok_or(TimelineError::LayerNotFound(layer_id))?;
    let layer = timeline.layers.remove(idx);
    timeline.renumber_layers();
    Ok(TimelineCommand::AddLayer {
        layer,
        index: Some(idx),
    })
}

fn update_layer(
    timeline: &mut Timeline,
    layer_id: LayerId,
    patch: LayerPatch,
) -> Result<TimelineCommand, TimelineError> {
    let idx = timeline
        .layer_index(&layer_id)
        .ok_or_else(|| TimelineError::LayerNotFound(layer_id.clone()))?;
    if patch.is_main_video == Some(true)
        && timeline
            .layers
            .iter()
            .any(|l| l.is_main_video && l.id != layer_id)
    {
        return Err(invalid("timeline already has a main video layer"));
    }
    let previous = patch.apply(&mut timeline.layers[idx]);
    Ok(TimelineCommand::UpdateLayer {
        layer_id,
        patch: previous,
    })
}

fn reorder_layers(
    timeline: &mut Timeline,
    layer_ids: Vec<LayerId>,
) -> Result<TimelineCommand, TimelineError> {
    if layer_ids.len() != timeline.layers.len() {
        return Err(invalid(format!(
            "reorder lists {} layers but the timeline has {}",
            layer_ids.len(),
            timeline.layers.len()
        )));
    }
    let mut seen = HashSet::new();
    for id in &layer_ids {
        if !seen.insert(id) {
            return Err(invalid(format!("layer {} listed twice in reorder", id)));
        }
        if timeline.layer(id).is_none() {
            return Err(TimelineError::LayerNotFound(id.clone()));
        }
    }

    let previous: Vec<LayerId> = timeline.layers.iter().map(|l| l.id.clone()).collect();
    let mut remaining = std::mem::take(&mut timeline.layers);
    for id in &layer_ids {
        if let Some(pos) = remaining.iter().position(|l| &l.id == id) {
            timeline.layers.push(remaining.remove(pos));
        }
    }
    timeline.renumber_layers();
    Ok(TimelineCommand::ReorderLayers {
        layer_ids: previous,
    })
}

fn update_clip(
    timeline: &mut Timeline,
    clip_id: ClipId,
    patch: ClipPatch,
) -> Result<TimelineCommand, TimelineError> {
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    let previous = patch.apply(&mut timeline.layers[li].clips[ci]);
    Ok(TimelineCommand::UpdateClip {
        clip_id,
        patch: previous,
    })
}

fn set_playhead(timeline: &mut Timeline, time: Seconds) -> Result<TimelineCommand, TimelineError> {
    if !time.is_finite() {
        return Err(invalid("playhead time must be finite"));
    }
    let previous = timeline.playhead_time;
    timeline.playhead_time = time.clamp(0.0, timeline.playback_duration().max(0.0));
    Ok(TimelineCommand::SetPlayhead { time: previous })
}

fn set_duration(
    timeline: &mut Timeline,
    duration: Seconds,
) -> Result<TimelineCommand, TimelineError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(invalid(format!("invalid timeline duration {}", duration)));
    }
    let previous = timeline.duration;
    let previous_playhead = timeline.playhead_time;
    timeline.duration = duration;
    let limit = timeline.playback_duration();
    if timeline.playhead_time > limit {
        timeline.playhead_time = limit;
    }
    if timeline.playhead_time == previous_playhead {
        Ok(TimelineCommand::SetDuration { duration: previous })
    } else {
        Ok(TimelineCommand::Batch {
            label: "Restore duration".to_string(),
            commands: vec![
                TimelineCommand::SetDuration { duration: previous },
                TimelineCommand::SetPlayhead {
                    time: previous_playhead,
                },
            ],
        })
    }
}

fn set_zoom(timeline: &mut Timeline, zoom: f64) -> Result<TimelineCommand, TimelineError> {
    if !zoom.is_finite() {
        return Err(invalid("zoom must be finite"));
    }
    let previous = timeline.zoom;
    timeline.zoom = zoom.clamp(Timeline::MIN_ZOOM, Timeline::MAX_ZOOM);
    Ok(TimelineCommand::SetZoom { zoom: previous })
}

fn set_selection(
    timeline: &mut Timeline,
    clip_ids: Vec<ClipId>,
) -> Result<TimelineCommand, TimelineError> {
    if let Some(missing) = clip_ids.iter().find(|id| timeline.find_clip(id).is_none()) {
        return Err(TimelineError::ClipNotFound(missing.clone()));
    }
    let previous = std::mem::replace(&mut timeline.selected_clips, clip_ids);
    Ok(TimelineCommand::SetSelection { clip_ids: previous })
}

fn add_marker(
    timeline: &mut Timeline,
    marker: Marker,
    index: Option<usize>,
) -> Result<TimelineCommand, TimelineError> {
    if timeline.marker(&marker.id).is_some() {
        return Err(invalid(format!("marker id already exists: {}", marker.id)));
    }
    if !marker.time.is_finite() || marker.time < 0.0 {
        return Err(invalid(format!("invalid marker time {}", marker.time)));
    }
    let marker_id = marker.id.clone();
    let idx = index.unwrap_or(timeline.markers.len()).min(timeline.markers.len());
    timeline.markers.insert(idx, marker);
    Ok(TimelineCommand::RemoveMarker { marker_id })
}

fn remove_marker(
    timeline: &mut Timeline,
    marker_id: MarkerId,
) -> Result<TimelineCommand, TimelineError> {
    let idx = timeline
        .markers
        .iter()
        .position(|m| m.id == marker_id)
        .ok_or(TimelineError::MarkerNotFound(marker_id))?;
    let marker = timeline.markers.remove(idx);
    Ok(TimelineCommand::AddMarker {
        marker,
        index: Some(idx),
    })
}

fn update_marker(
    timeline: &mut Timeline,
    marker: Marker,
) -> Result<TimelineCommand, TimelineError> {
    if !marker.time.is_finite() || marker.time < 0.0 {
        return Err(invalid(format!("invalid marker time {}", marker.time)));
    }
    let entry = timeline
        .markers
        .iter_mut()
        .find(|m| m.id == marker.id)
        .ok_or_else(|| TimelineError::MarkerNotFound(marker.id.clone()))?;
    let previous = std::mem::replace(entry, marker);
    Ok(TimelineCommand::UpdateMarker { marker: previous })
}

fn apply_batch(
    timeline: &mut Timeline,
    label: String,
    commands: Vec<TimelineCommand>,
) -> Result<TimelineCommand, TimelineError> {
    let backup = timeline.clone();
    let mut inverses = Vec::with_capacity(commands.len());
    for command in commands {
        match apply_command(timeline, command) {
            Ok(inverse) => inverses.push(inverse),
            Err(err) => {
                *timeline = backup;
                return Err(err);
            }
        }
    }
    inverses.reverse();
    Ok(TimelineCommand::Batch {
        label,
        commands: inverses,
    })
}

impl TimelineCommand {
    /// Fills in ids the command would otherwise generate while applying, so the
    /// recorded command replays identically.
    pub fn with_generated_ids(self) -> Self {
        match self {
            TimelineCommand::SplitClip {
                clip_id,
                split_time,
                new_clip_id: None,
            } => TimelineCommand::SplitClip {
                clip_id,
                split_time,
                new_clip_id: Some(ClipId::new()),
            },
            TimelineCommand::Batch { label, commands } => TimelineCommand::Batch {
                label,
                commands: commands
                    .into_iter()
                    .map(TimelineCommand::with_generated_ids)
                    .collect(),
            },
            other => other,
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            TimelineCommand::AddLayer { .. } => ActionType::AddLayer,
            TimelineCommand::RemoveLayer { .. } => ActionType::RemoveLayer,
            TimelineCommand::UpdateLayer { .. } => ActionType::UpdateLayer,
            TimelineCommand::ReorderLayers { .. } => ActionType::ReorderLayers,
            TimelineCommand::AddClip { .. } => ActionType::AddClip,
            TimelineCommand::RemoveClip { .. } => ActionType::RemoveClip,
            TimelineCommand::UpdateClip { .. } => ActionType::UpdateClip,
            TimelineCommand::MoveClip { .. } => ActionType::MoveClip,
            TimelineCommand::TrimClip { .. } => ActionType::TrimClip,
            TimelineCommand::SplitClip { .. } => ActionType::SplitClip,
            TimelineCommand::MergeClips { .. } => ActionType::MergeClips,
            TimelineCommand::UnmergeClips { .. } => ActionType::UnmergeClips,
            TimelineCommand::DeleteWithGapFill { .. } => ActionType::DeleteWithGapFill,
            TimelineCommand::InsertWithRipple { .. } => ActionType::InsertWithRipple,
            TimelineCommand::SetPlayhead { .. } => ActionType::SetPlayhead,
            TimelineCommand::SetDuration { .. } => ActionType::SetDuration,
            TimelineCommand::SetZoom { .. } => ActionType::SetZoom,
            TimelineCommand::SetSelection { .. } => ActionType::SetSelection,
            TimelineCommand::AddMarker { .. } => ActionType::AddMarker,
            TimelineCommand::RemoveMarker { .. } => ActionType::RemoveMarker,
            TimelineCommand::UpdateMarker { .. } => ActionType::UpdateMarker,
            TimelineCommand::Batch { .. } => ActionType::Batch,
        }
    }

    /// Human readable summary for the history panel.
    pub fn describe(&self) -> String {
        match self {
            TimelineCommand::AddLayer { layer, .. } => format!("Add layer \"{}\"", layer.name),
            TimelineCommand::RemoveLayer { layer_id } => format!("Remove layer {}", layer_id),
            TimelineCommand::UpdateLayer { layer_id, .. } => format!("Update layer {}", layer_id),
            TimelineCommand::ReorderLayers { .. } => "Reorder layers".to_string(),
            TimelineCommand::AddClip { clip, .. } => format!(
                "Add clip at {:.2}s ({:.2}s)",
                clip.start_time, clip.duration
            ),
            TimelineCommand::RemoveClip { clip_id } => format!("Remove clip {}", clip_id),
            TimelineCommand::UpdateClip { clip_id, .. } => format!("Update clip {}", clip_id),
            TimelineCommand::MoveClip {
                clip_id,
                start_time,
                ..
            } => format!("Move clip {} to {:.2}s", clip_id, start_time),
            TimelineCommand::TrimClip {
                clip_id,
                start_time,
                end_time,
            } => format!(
                "Trim clip {} to {:.2}s-{:.2}s",
                clip_id, start_time, end_time
            ),
            TimelineCommand::SplitClip {
                clip_id,
                split_time,
                ..
            } => format!("Split clip {} at {:.2}s", clip_id, split_time),
            TimelineCommand::MergeClips { clip_ids, .. } => {
                format!("Merge {} clips", clip_ids.len())
            }
            TimelineCommand::UnmergeClips { clip_id, .. } => format!("Unmerge clip {}", clip_id),
            TimelineCommand::DeleteWithGapFill { clip_id } => {
                format!("Delete clip {} and close gap", clip_id)
            }
            TimelineCommand::InsertWithRipple { clip, .. } => {
                format!("Insert clip {} at {:.2}s", clip.id, clip.start_time)
            }
            TimelineCommand::SetPlayhead { time } => format!("Set playhead to {:.2}s", time),
            TimelineCommand::SetDuration { duration } => {
                format!("Set duration to {:.2}s", duration)
            }
            TimelineCommand::SetZoom { zoom } => format!("Set zoom to {:.2}x", zoom),
            TimelineCommand::SetSelection { clip_ids } => {
                format!("Select {} clip(s)", clip_ids.len())
            }
            TimelineCommand::AddMarker { marker, .. } => format!("Add marker \"{}\"", marker.label),
            TimelineCommand::RemoveMarker { marker_id } => format!("Remove marker {}", marker_id),
            TimelineCommand::UpdateMarker { marker } => {
                format!("Update marker \"{}\"", marker.label)
            }
            TimelineCommand::Batch { label, .. } => label.clone(),
        }
    }

    /// Ids of the entities the command touches.
    pub fn affected_ids(&self) -> Vec<String> {
        match self {
            TimelineCommand::AddLayer { layer, .. } => vec![layer.id.to_string()],
            TimelineCommand::RemoveLayer { layer_id }
            | TimelineCommand::UpdateLayer { layer_id, .. } => vec![layer_id.to_string()],
            TimelineCommand::ReorderLayers { layer_ids } => {
                layer_ids.iter().map(ToString::to_string).collect()
            }
            TimelineCommand::AddClip { clip, .. }
            | TimelineCommand::InsertWithRipple { clip, .. } => vec![clip.id.to_string()],
            TimelineCommand::RemoveClip { clip_id }
            | TimelineCommand::UpdateClip { clip_id, .. }
            | TimelineCommand::MoveClip { clip_id, .. }
            | TimelineCommand::TrimClip { clip_id, .. }
            | TimelineCommand::DeleteWithGapFill { clip_id } => vec![clip_id.to_string()],
            TimelineCommand::SplitClip {
                clip_id,
                new_clip_id,
                ..
            } => std::iter::once(clip_id.to_string())
                .chain(new_clip_id.iter().map(ToString::to_string))
                .collect(),
            TimelineCommand::MergeClips { clip_ids, .. }
            | TimelineCommand::SetSelection { clip_ids } => {
                clip_ids.iter().map(ToString::to_string).collect()
            }
            TimelineCommand::UnmergeClips {
                clip_id, removed, ..
            } => std::iter::once(clip_id.to_string())
                .chain(removed.iter().map(|c| c.id.to_string()))
                .collect(),
            TimelineCommand::SetPlayhead { .. }
            | TimelineCommand::SetDuration { .. }
            | TimelineCommand::SetZoom { .. } => Vec::new(),
            TimelineCommand::AddMarker { marker, .. }
            | TimelineCommand::UpdateMarker { marker } => vec![marker.id.to_string()],
            TimelineCommand::RemoveMarker { marker_id } => vec![marker_id.to_string()],
            TimelineCommand::Batch { commands, .. } => {
                let mut ids: Vec<String> = Vec::new();
                for id in commands.iter().flat_map(TimelineCommand::affected_ids) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            }
        }
    }
}
