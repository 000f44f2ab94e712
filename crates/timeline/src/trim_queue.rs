//! Pending trim/delete/split intents that are committed together.

use serde::{Deserialize, Serialize};

use crate::{
    apply_command, invalid, now_millis, ClipId, LayerId, Seconds, Timeline, TimelineCommand,
    TimelineError, TIME_EPSILON,
};

string_id!(
    /// Identifier of a queued trim operation.
    TrimId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimKind {
    /// Keep only `[start_time, end_time)` of the affected clips.
    Trim,
    /// Cut `[start_time, end_time)` out of the layer.
    Delete,
    /// Cut the affected clip at `start_time`.
    Split,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimOperation {
    pub id: TrimId,
    pub kind: TrimKind,
    pub layer_id: LayerId,
    pub start_time: Seconds,
    pub end_time: Seconds,
    /// Clips the operation touched when it was queued.
    #[serde(default)]
    pub affected_segments: Vec<ClipId>,
    pub created_at: i64,
}

impl TrimOperation {
    pub fn new(
        kind: TrimKind,
        layer_id: impl Into<LayerId>,
        start_time: Seconds,
        end_time: Seconds,
    ) -> Self {
        Self {
            id: TrimId::new(),
            kind,
            layer_id: layer_id.into(),
            start_time,
            end_time,
            affected_segments: Vec::new(),
            created_at: now_millis(),
        }
    }

    pub fn split(layer_id: impl Into<LayerId>, time: Seconds) -> Self {
        Self::new(TrimKind::Split, layer_id, time, time)
    }

    fn validate(&self) -> Result<(), TimelineError> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() || self.start_time < 0.0 {
            return Err(invalid(format!(
                "trim range {}..{} is not valid",
                self.start_time, self.end_time
            )));
        }
        if self.kind != TrimKind::Split && self.end_time <= self.start_time {
            return Err(invalid(format!(
                "trim range must end after it starts ({} <= {})",
                self.end_time, self.start_time
            )));
        }
        Ok(())
    }

    fn affected(&self, timeline: &Timeline) -> Result<Vec<ClipId>, TimelineError> {
        let layer = timeline
            .layer(&self.layer_id)
            .ok_or_else(|| TimelineError::LayerNotFound(self.layer_id.clone()))?;
        let ids = layer
            .clips
            .iter()
            .filter(|c| match self.kind {
                TrimKind::Split => c.contains_time(self.start_time),
                TrimKind::Trim | TrimKind::Delete => c.overlaps(self.start_time, self.end_time),
            })
            .map(|c| c.id.clone())
            .collect();
        Ok(ids)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrimQueue {
    pending: Vec<TrimOperation>,
}

impl TrimQueue {
    pub fn from_operations(pending: Vec<TrimOperation>) -> Self {
        Self { pending }
    }

    /// Queues an operation after checking it would touch at least one clip.
    pub fn push(
        &mut self,
        timeline: &Timeline,
        mut operation: TrimOperation,
    ) -> Result<TrimId, TimelineError> {
        operation.validate()?;
        operation.affected_segments = operation.affected(timeline)?;
        if operation.affected_segments.is_empty() {
            return Err(invalid(format!(
                "{:?} at {}..{} touches no clip on layer {}",
                operation.kind, operation.start_time, operation.end_time, operation.layer_id
            )));
        }
        let id = operation.id.clone();
        self.pending.push(operation);
        Ok(id)
    }

    pub fn pending(&self) -> &[TrimOperation] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    /// Resolves the queue into one batch command, rehearsed on a scratch copy
    /// so the batch is known to apply cleanly.
    pub fn plan(&self, timeline: &Timeline) -> Result<TimelineCommand, TimelineError> {
        if self.pending.is_empty() {
            return Err(invalid("no pending trim operations"));
        }
        let mut scratch = timeline.clone();
        let mut commands = Vec::new();
        for operation in &self.pending {
            let staged = commands.len();
            plan_operation(&mut scratch, operation, &mut commands)?;
            if commands.len() == staged {
                return Err(invalid(format!(
                    "trim operation {} no longer touches any clip",
                    operation.id
                )));
            }
        }
        Ok(TimelineCommand::Batch {
            label: format!("Apply {} trim operation(s)", self.pending.len()),
            commands,
        })
    }
}

fn stage(
    scratch: &mut Timeline,
    commands: &mut Vec<TimelineCommand>,
    command: TimelineCommand,
) -> Result<(), TimelineError> {
    let command = command.with_generated_ids();
    apply_command(scratch, command.clone())?;
    commands.push(command);
    Ok(())
}

fn split_at(
    scratch: &mut Timeline,
    commands: &mut Vec<TimelineCommand>,
    layer_id: &LayerId,
    time: Seconds,
) -> Result<(), TimelineError> {
    let target = scratch
        .layer(layer_id)
        .and_then(|layer| layer.clips.iter().find(|c| c.contains_time(time)))
        .map(|c| c.id.clone());
    if let Some(clip_id) = target {
        stage(
            scratch,
            commands,
            TimelineCommand::SplitClip {
                clip_id,
                split_time: time,
                new_clip_id: None,
            },
        )?;
    }
    Ok(())
}

fn plan_operation(
    scratch: &mut Timeline,
    operation: &TrimOperation,
    commands: &mut Vec<TimelineCommand>,
) -> Result<(), TimelineError> {
    let layer = scratch
        .layer(&operation.layer_id)
        .ok_or_else(|| TimelineError::LayerNotFound(operation.layer_id.clone()))?;
    let (start, end) = (operation.start_time, operation.end_time);

    match operation.kind {
        TrimKind::Split => split_at(scratch, commands, &operation.layer_id, start),
        TrimKind::Trim => {
            let trims: Vec<TimelineCommand> = layer
                .clips
                .iter()
                .filter(|c| c.overlaps(start, end))
                .filter(|c| start > c.start_time + TIME_EPSILON || end < c.end_time - TIME_EPSILON)
                .map(|c| TimelineCommand::TrimClip {
                    clip_id: c.id.clone(),
                    start_time: c.start_time.max(start),
                    end_time: c.end_time.min(end),
                })
                .collect();
            for trim in trims {
                stage(scratch, commands, trim)?;
            }
            Ok(())
        }
        TrimKind::Delete => {
            let is_main = layer.is_main_video;
            split_at(scratch, commands, &operation.layer_id, start)?;
            split_at(scratch, commands, &operation.layer_id, end)?;
            let doomed: Vec<ClipId> = scratch
                .layer(&operation.layer_id)
                .map(|layer| {
                    layer
                        .clips
                        .iter()
                        .filter(|c| {
                            c.start_time >= start - TIME_EPSILON && c.end_time <= end + TIME_EPSILON
                        })
                        .map(|c| c.id.clone())
                        .collect()
                })
                .unwrap_or_default();
            // Latest first so gap-fill shifts never move a clip still to be removed.
            for clip_id in doomed.into_iter().rev() {
                let command = if is_main {
                    TimelineCommand::DeleteWithGapFill { clip_id }
                } else {
                    TimelineCommand::RemoveClip { clip_id }
                };
                stage(scratch, commands, command)?;
            }
            Ok(())
        }
    }
}
