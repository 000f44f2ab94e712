/// Destructive clip edits. Each function validates fully before it mutates,
/// and returns the command that undoes it.
use crate::{
    invalid, Clip, ClipId, ClipPosition, Keyframe, LayerId, Seconds, Timeline, TimelineCommand,
    TimelineError, TIME_EPSILON,
};

pub(crate) fn add_clip(
    timeline: &mut Timeline,
    layer_id: LayerId,
    mut clip: Clip,
) -> Result<TimelineCommand, TimelineError> {
    let li = timeline
        .layer_index(&layer_id)
        .ok_or_else(|| TimelineError::LayerNotFound(layer_id.clone()))?;
    clip.validate()?;
    if timeline.find_clip(&clip.id).is_some() {
        return Err(invalid(format!("clip id already exists: {}", clip.id)));
    }
    if let Some(other) = timeline.layers[li].find_overlap(clip.start_time, clip.end_time, None) {
        return Err(invalid(format!(
            "clip {} would overlap clip {} on layer {}",
            clip.id, other.id, layer_id
        )));
    }
    clip.canonicalize();
    let clip_id = clip.id.clone();
    timeline.layers[li].insert_sorted(clip);
    Ok(TimelineCommand::RemoveClip { clip_id })
}

pub(crate) fn remove_clip(
    timeline: &mut Timeline,
    clip_id: ClipId,
) -> Result<TimelineCommand, TimelineError> {
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    let layer = &mut timeline.layers[li];
    let clip = layer.clips.remove(ci);
    Ok(TimelineCommand::AddClip {
        layer_id: layer.id.clone(),
        clip,
    })
}

pub(crate) fn move_clip(
    timeline: &mut Timeline,
    clip_id: ClipId,
    start_time: Seconds,
    target_layer: Option<LayerId>,
) -> Result<TimelineCommand, TimelineError> {
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    let target = match &target_layer {
        Some(id) => timeline
            .layer_index(id)
            .ok_or_else(|| TimelineError::LayerNotFound(id.clone()))?,
        None => li,
    };
    if !start_time.is_finite() || start_time < 0.0 {
        return Err(invalid(format!("cannot move clip {} to {}", clip_id, start_time)));
    }
    let clip = &timeline.layers[li].clips[ci];
    let end_time = start_time + clip.duration;
    if let Some(other) =
        timeline.layers[target].find_overlap(start_time, end_time, Some(&clip_id))
    {
        return Err(invalid(format!(
            "moving clip {} to {} would overlap clip {}",
            clip_id, start_time, other.id
        )));
    }

    let previous_start = clip.start_time;
    let previous_layer = timeline.layers[li].id.clone();
    let mut clip = timeline.layers[li].clips.remove(ci);
    clip.start_time = start_time;
    clip.end_time = end_time;
    timeline.layers[target].insert_sorted(clip);

    Ok(TimelineCommand::MoveClip {
        clip_id,
        start_time: previous_start,
        layer_id: Some(previous_layer),
    })
}

/// Rewrites the clip's timeline bounds. The source offset is left alone.
pub(crate) fn trim_clip(
    timeline: &mut Timeline,
    clip_id: ClipId,
    start_time: Seconds,
    end_time: Seconds,
) -> Result<TimelineCommand, TimelineError> {
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    if !start_time.is_finite() || !end_time.is_finite() || start_time < 0.0 {
        return Err(invalid(format!("invalid trim range for clip {}", clip_id)));
    }
    if end_time - start_time <= TIME_EPSILON {
        return Err(invalid(format!(
            "trim of clip {} leaves no content ({} .. {})",
            clip_id, start_time, end_time
        )));
    }
    let layer = &mut timeline.layers[li];
    if let Some(other) = layer.find_overlap(start_time, end_time, Some(&clip_id)) {
        return Err(invalid(format!(
            "trimmed clip {} would overlap clip {}",
            clip_id, other.id
        )));
    }
    let clip = &mut layer.clips[ci];
    let (previous_start, previous_end) = (clip.start_time, clip.end_time);
    clip.set_bounds(start_time, end_time);
    layer.sort_clips();
    Ok(TimelineCommand::TrimClip {
        clip_id,
        start_time: previous_start,
        end_time: previous_end,
    })
}

pub(crate) fn split_clip(
    timeline: &mut Timeline,
    clip_id: ClipId,
    split_time: Seconds,
    new_clip_id: Option<ClipId>,
) -> Result<TimelineCommand, TimelineError> {
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    let clip = &timeline.layers[li].clips[ci];
    if !clip.contains_time(split_time) {
        return Err(invalid(format!(
            "split point {} is outside clip {} ({} .. {})",
            split_time, clip_id, clip.start_time, clip.end_time
        )));
    }
    let new_id = new_clip_id.unwrap_or_else(ClipId::new);
    if timeline.find_clip(&new_id).is_some() {
        return Err(invalid(format!("clip id already exists: {}", new_id)));
    }

    let layer = &mut timeline.layers[li];
    let head = &mut layer.clips[ci];
    let (start, end) = (head.start_time, head.end_time);
    let (head_keys, tail_keys): (Vec<Keyframe>, Vec<Keyframe>) = head
        .keyframes
        .drain(..)
        .partition(|k| k.time < split_time);

    let mut tail = head.clone();
    tail.id = new_id.clone();
    tail.original_start_time = Some(head.source_start() + (split_time - start));
    tail.set_bounds(split_time, end);
    tail.keyframes = tail_keys;

    head.set_bounds(start, split_time);
    head.keyframes = head_keys;

    layer.clips.insert(ci + 1, tail);

    Ok(TimelineCommand::MergeClips {
        layer_id: layer.id.clone(),
        clip_ids: vec![clip_id, new_id],
    })
}

pub(crate) fn merge_clips(
    timeline: &mut Timeline,
    layer_id: LayerId,
    clip_ids: Vec<ClipId>,
) -> Result<TimelineCommand, TimelineError> {
    let li = timeline
        .layer_index(&layer_id)
        .ok_or_else(|| TimelineError::LayerNotFound(layer_id.clone()))?;
    if clip_ids.len() < 2 {
        return Err(invalid("merge needs at least two clips"));
    }
    let layer = &timeline.layers[li];
    let mut members: Vec<&Clip> = Vec::with_capacity(clip_ids.len());
    for id in &clip_ids {
        let clip = layer
            .clip(id)
            .ok_or_else(|| TimelineError::ClipNotFound(id.clone()))?;
        if members.iter().any(|c| c.id == clip.id) {
            return Err(invalid(format!("clip {} listed twice in merge", id)));
        }
        members.push(clip);
    }
    members.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

    let first = members[0];
    let last_end = members[members.len() - 1].end_time;
    if let Some(intruder) = layer
        .clips
        .iter()
        .filter(|c| !clip_ids.contains(&c.id))
        .find(|c| c.overlaps(first.start_time, last_end))
    {
        return Err(invalid(format!(
            "clip {} sits inside the merged span",
            intruder.id
        )));
    }

    let survivor_id = first.id.clone();
    let survivor_start = first.start_time;
    let previous_end = first.end_time;
    let previous_keyframes = first.keyframes.clone();
    let removed: Vec<Clip> = members[1..].iter().map(|c| (*c).clone()).collect();

    let layer = &mut timeline.layers[li];
    layer.clips.retain(|c| !removed.iter().any(|r| r.id == c.id));
    let survivor = layer
        .clips
        .iter_mut()
        .find(|c| c.id == survivor_id)
        .ok_or_else(|| TimelineError::ClipNotFound(survivor_id.clone()))?;
    survivor.set_bounds(survivor_start, last_end);
    for other in &removed {
        survivor.keyframes.extend(other.keyframes.iter().cloned());
    }
    survivor.keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));

    Ok(TimelineCommand::UnmergeClips {
        clip_id: survivor_id,
        end_time: previous_end,
        keyframes: previous_keyframes,
        removed,
    })
}

pub(crate) fn unmerge_clips(
    timeline: &mut Timeline,
    clip_id: ClipId,
    end_time: Seconds,
    keyframes: Vec<Keyframe>,
    removed: Vec<Clip>,
) -> Result<TimelineCommand, TimelineError> {
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    let survivor = &timeline.layers[li].clips[ci];
    if end_time - survivor.start_time <= TIME_EPSILON {
        return Err(invalid(format!("cannot shrink clip {} to {}", clip_id, end_time)));
    }
    for clip in &removed {
        clip.validate()?;
        if timeline.find_clip(&clip.id).is_some() {
            return Err(invalid(format!("clip id already exists: {}", clip.id)));
        }
    }
    let layer = &timeline.layers[li];
    let restored_span = |c: &Clip| {
        if c.id == clip_id {
            (c.start_time, end_time)
        } else {
            (c.start_time, c.end_time)
        }
    };
    for clip in &removed {
        let clash = layer.clips.iter().find(|c| {
            let (s, e) = restored_span(c);
            clip.overlaps(s, e)
        });
        if let Some(other) = clash {
            return Err(invalid(format!(
                "restored clip {} would overlap clip {}",
                clip.id, other.id
            )));
        }
    }

    let layer_id = layer.id.clone();
    let layer = &mut timeline.layers[li];
    let survivor = &mut layer.clips[ci];
    let start = survivor.start_time;
    survivor.set_bounds(start, end_time);
    survivor.keyframes = keyframes;

    let mut clip_ids = vec![clip_id];
    for clip in removed {
        clip_ids.push(clip.id.clone());
        layer.insert_sorted(clip);
    }
    Ok(TimelineCommand::MergeClips { layer_id, clip_ids })
}

/// Removes a main-video clip and pulls every later clip left by its duration.
/// Source offsets do not move, so the deleted source range is skipped on playback.
pub(crate) fn delete_with_gap_fill(
    timeline: &mut Timeline,
    clip_id: ClipId,
) -> Result<TimelineCommand, TimelineError> {
    let main = timeline.sole_main_video_index()?;
    let (li, ci) = timeline.locate_clip(&clip_id)?;
    if li != main {
        return Err(invalid(format!(
            "gap-fill delete only applies to the main video layer; clip {} is elsewhere",
            clip_id
        )));
    }
    let layer = &mut timeline.layers[li];
    let removed = layer.clips.remove(ci);
    let mut shifted = Vec::new();
    for clip in layer
        .clips
        .iter_mut()
        .filter(|c| c.start_time >= removed.end_time - TIME_EPSILON)
    {
        shifted.push(ClipPosition::of(clip));
        clip.shift(-removed.duration);
    }
    Ok(TimelineCommand::InsertWithRipple {
        clip: removed,
        shifted,
    })
}

/// Opens a gap at `clip.start_time` on the main video and inserts the clip.
/// Clips listed in `shifted` are restored to their recorded bounds; any other
/// later clip moves right by the clip's duration.
pub(crate) fn insert_with_ripple(
    timeline: &mut Timeline,
    mut clip: Clip,
    shifted: Vec<ClipPosition>,
) -> Result<TimelineCommand, TimelineError> {
    let main = timeline.sole_main_video_index()?;
    clip.validate()?;
    if timeline.find_clip(&clip.id).is_some() {
        return Err(invalid(format!("clip id already exists: {}", clip.id)));
    }
    let layer = &timeline.layers[main];
    if let Some(straddling) = layer.clips.iter().find(|c| c.contains_time(clip.start_time)) {
        return Err(invalid(format!(
            "cannot ripple-insert inside clip {}",
            straddling.id
        )));
    }

    clip.canonicalize();
    let layer = &mut timeline.layers[main];
    let insert_at = clip.start_time;
    for other in layer
        .clips
        .iter_mut()
        .filter(|c| c.start_time >= insert_at - TIME_EPSILON)
    {
        match shifted.iter().find(|p| p.clip_id == other.id) {
            Some(position) => {
                other.start_time = position.start_time;
                other.end_time = position.end_time;
            }
            None => other.shift(clip.duration),
        }
    }
    let clip_id = clip.id.clone();
    layer.insert_sorted(clip);
    Ok(TimelineCommand::DeleteWithGapFill { clip_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Layer, MediaKind};

    fn single_clip_timeline() -> Timeline {
        Timeline {
            layers: vec![Layer::main_video("main")
                .with_id("main")
                .with_clips(vec![Clip::new(MediaKind::Video, 0.0, 100.0).with_id("c1")])],
            ..Timeline::default()
        }
    }

    #[test]
    fn split_infers_source_offset_of_tail() {
        let mut timeline = single_clip_timeline();
        split_clip(&mut timeline, "c1".into(), 40.0, Some("c2".into())).unwrap();

        let clips = &timeline.layers[0].clips;
        assert_eq!(clips.len(), 2);
        assert_eq!((clips[0].start_time, clips[0].end_time), (0.0, 40.0));
        assert_eq!(clips[0].source_start(), 0.0);
        assert_eq!((clips[1].start_time, clips[1].end_time), (40.0, 100.0));
        assert_eq!(clips[1].source_start(), 40.0);
        assert_eq!(clips[1].duration, 60.0);
    }

    #[test]
    fn split_at_clip_edge_is_rejected() {
        let mut timeline = single_clip_timeline();
        let before = timeline.clone();
        let err = split_clip(&mut timeline, "c1".into(), 100.0, None).unwrap_err();
        assert!(matches!(err, TimelineError::Validation(_)));
        assert_eq!(timeline, before);
    }

    #[test]
    fn split_partitions_keyframes() {
        let mut timeline = single_clip_timeline();
        timeline.layers[0].clips[0].keyframes = vec![
            Keyframe::new(10.0, "opacity", serde_json::json!(1.0)),
            Keyframe::new(70.0, "opacity", serde_json::json!(0.0)),
        ];
        split_clip(&mut timeline, "c1".into(), 40.0, Some("c2".into())).unwrap();
        assert_eq!(timeline.layers[0].clips[0].keyframes.len(), 1);
        assert_eq!(timeline.layers[0].clips[1].keyframes[0].time, 70.0);
    }

    #[test]
    fn merge_rejects_missing_clip() {
        let mut timeline = single_clip_timeline();
        let err = merge_clips(&mut timeline, "main".into(), vec!["c1".into(), "nope".into()])
            .unwrap_err();
        assert_eq!(err, TimelineError::ClipNotFound("nope".into()));
    }

    #[test]
    fn merge_rejects_foreign_clip_inside_span() {
        let mut timeline = Timeline {
            layers: vec![Layer::main_video("main").with_id("main").with_clips(vec![
                Clip::new(MediaKind::Video, 0.0, 10.0).with_id("a"),
                Clip::new(MediaKind::Video, 10.0, 20.0).with_id("b"),
                Clip::new(MediaKind::Video, 20.0, 30.0).with_id("c"),
            ])],
            ..Timeline::default()
        };
        let err = merge_clips(&mut timeline, "main".into(), vec!["a".into(), "c".into()])
            .unwrap_err();
        assert!(matches!(err, TimelineError::Validation(_)));
    }

    #[test]
    fn gap_fill_shifts_followers_but_not_source() {
        let mut timeline = single_clip_timeline();
        split_clip(&mut timeline, "c1".into(), 40.0, Some("c2".into())).unwrap();
        delete_with_gap_fill(&mut timeline, "c1".into()).unwrap();

        let clips = &timeline.layers[0].clips;
        assert_eq!(clips.len(), 1);
        assert_eq!((clips[0].start_time, clips[0].end_time), (0.0, 60.0));
        assert_eq!(clips[0].original_start_time, Some(40.0));
    }

    #[test]
    fn gap_fill_outside_main_layer_is_rejected() {
        let mut timeline = single_clip_timeline();
        timeline.layers.push(
            Layer::new("music", MediaKind::Audio)
                .with_clips(vec![Clip::new(MediaKind::Audio, 0.0, 5.0).with_id("a1")]),
        );
        let err = delete_with_gap_fill(&mut timeline, "a1".into()).unwrap_err();
        assert!(matches!(err, TimelineError::Validation(_)));
    }

    #[test]
    fn trim_keeps_source_offset() {
        let mut timeline = single_clip_timeline();
        trim_clip(&mut timeline, "c1".into(), 10.0, 50.0).unwrap();
        let clip = &timeline.layers[0].clips[0];
        assert_eq!(clip.duration, 40.0);
        assert_eq!(clip.original_start_time, Some(0.0));
    }

    #[test]
    fn move_onto_neighbour_is_rejected() {
        let mut timeline = single_clip_timeline();
        timeline.layers[0]
            .insert_sorted(Clip::new(MediaKind::Video, 100.0, 120.0).with_id("c2"));
        let err = move_clip(&mut timeline, "c2".into(), 90.0, None).unwrap_err();
        assert!(matches!(err, TimelineError::Validation(_)));
        move_clip(&mut timeline, "c2".into(), 130.0, None).unwrap();
        let moved = timeline.layers[0].clip(&"c2".into()).unwrap();
        assert_eq!((moved.start_time, moved.end_time), (130.0, 150.0));
    }
}
