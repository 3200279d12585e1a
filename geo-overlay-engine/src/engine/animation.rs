//! Animation scheduler for per-feature property transitions.
//!
//! One scheduler holds every running transition, keyed by
//! `(feature id, animation kind)`. It is advanced once per host frame by
//! `tick_animations`, which writes the eased values into the mesh index.
//!
//! ## Task Lifecycle
//!
//! ```text
//! start() ──> Active ──t == 1──> Completed
//!               │
//!               ├── superseded by start() ──> Cancelled
//!               └── cancel_feature() ──────> Cancelled
//! ```
//!
//! A superseding task starts from the value the old one had reached, so the
//! visible motion never jumps.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bevy::prelude::*;
use constants::animation::TASK_HISTORY_LIMIT;
use serde::Serialize;

use super::features::model::FeatureId;
use super::mesh::lifecycle::MeshIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimationKind {
    /// Vertical scale multiplier from near zero to one after creation.
    Rise,
    /// Extrusion height in meters.
    Height,
    /// Yaw offset in degrees swinging a rebuilt footprint into place.
    Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Only during construction; `start` stores tasks as `Active`.
    Pending,
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct AnimationTask {
    pub id: TaskId,
    pub feature_id: FeatureId,
    pub kind: AnimationKind,
    pub start: Duration,
    pub duration: Duration,
    pub from: f32,
    pub to: f32,
    pub state: TaskState,
}

/// Cubic ease-out, `1 - (1 - t)^3`.
pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

impl AnimationTask {
    /// Normalized progress in `[0, 1]` at clock time `now`.
    pub fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.start);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    pub fn value_at(&self, now: Duration) -> f32 {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }
        self.from + (self.to - self.from) * ease_out_cubic(t)
    }
}

/// Value produced for one task during a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationSample {
    pub feature_id: FeatureId,
    pub kind: AnimationKind,
    pub value: f32,
    pub finished: bool,
}

#[derive(Resource, Debug, Default)]
pub struct AnimationScheduler {
    next_id: u64,
    active: HashMap<(FeatureId, AnimationKind), AnimationTask>,
    history: VecDeque<(TaskId, TaskState)>,
}

impl AnimationScheduler {
    fn remember(&mut self, id: TaskId, state: TaskState) {
        if self.history.len() == TASK_HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back((id, state));
    }

    /// Start a transition for `(feature_id, kind)`.
    ///
    /// When a task for the same pair is still running it is cancelled and
    /// its current value replaces `from`.
    pub fn start(
        &mut self,
        feature_id: FeatureId,
        kind: AnimationKind,
        from: f32,
        to: f32,
        duration: Duration,
        now: Duration,
    ) -> TaskId {
        let key = (feature_id.clone(), kind);
        let from = match self.active.remove(&key) {
            Some(previous) => {
                let current = previous.value_at(now);
                self.remember(previous.id, TaskState::Cancelled);
                debug!("Superseded {:?} task {:?} for {} at {}", kind, previous.id, feature_id, current);
                current
            }
            None => from,
        };

        self.next_id += 1;
        let id = TaskId(self.next_id);
        let task = AnimationTask {
            id,
            feature_id,
            kind,
            start: now,
            duration,
            from,
            to,
            state: TaskState::Active,
        };
        self.active.insert(key, task);
        id
    }

    /// Cancel the running task for `(feature_id, kind)`, if any.
    pub fn cancel(&mut self, feature_id: &FeatureId, kind: AnimationKind) -> Option<TaskId> {
        let task = self.active.remove(&(feature_id.clone(), kind))?;
        self.remember(task.id, TaskState::Cancelled);
        Some(task.id)
    }

    /// Interpolated value of the running task for `(feature_id, kind)` at `now`.
    pub fn current_value(&self, feature_id: &FeatureId, kind: AnimationKind, now: Duration) -> Option<f32> {
        self.active_task(feature_id, kind).map(|task| task.value_at(now))
    }

    /// Cancel every running task of `feature_id`, returning how many were stopped.
    pub fn cancel_feature(&mut self, feature_id: &FeatureId) -> usize {
        let keys: Vec<_> = self
            .active
            .keys()
            .filter(|(id, _)| id == feature_id)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(task) = self.active.remove(key) {
                self.remember(task.id, TaskState::Cancelled);
            }
        }
        keys.len()
    }

    /// Advance every task to `now`. Finished tasks are snapped to their
    /// target, recorded as completed and dropped.
    pub fn tick(&mut self, now: Duration) -> Vec<AnimationSample> {
        let mut samples = Vec::with_capacity(self.active.len());
        let mut finished = Vec::new();

        for (key, task) in &self.active {
            let done = task.progress(now) >= 1.0;
            samples.push(AnimationSample {
                feature_id: task.feature_id.clone(),
                kind: task.kind,
                value: task.value_at(now),
                finished: done,
            });
            if done {
                finished.push(key.clone());
            }
        }

        for key in finished {
            if let Some(task) = self.active.remove(&key) {
                self.remember(task.id, TaskState::Completed);
            }
        }
        samples
    }

    /// Current state of a task, while it runs or among recent outcomes.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        if let Some(task) = self.active.values().find(|task| task.id == id) {
            return Some(task.state);
        }
        self.history
            .iter()
            .rev()
            .find(|(task_id, _)| *task_id == id)
            .map(|(_, state)| *state)
    }

    pub fn active_task(&self, feature_id: &FeatureId, kind: AnimationKind) -> Option<&AnimationTask> {
        self.active.get(&(feature_id.clone(), kind))
    }

    pub fn has_tasks_for(&self, feature_id: &FeatureId) -> bool {
        self.active.keys().any(|(id, _)| id == feature_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }
}

/// Advance the scheduler and write the eased values into mesh entries.
pub fn tick_animations(time: Res<Time>, mut scheduler: ResMut<AnimationScheduler>, mut index: ResMut<MeshIndex>) {
    if scheduler.is_idle() {
        return;
    }

    for sample in scheduler.tick(time.elapsed()) {
        let Some(entry) = index.get_mut(&sample.feature_id) else {
            continue;
        };
        match sample.kind {
            AnimationKind::Rise => entry.rise_scale = sample.value,
            AnimationKind::Height => entry.current_height = sample.value,
            AnimationKind::Rotation => entry.rotation_offset = sample.value,
        }
        if sample.finished {
            debug!("{:?} animation finished for {}", sample.kind, sample.feature_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn easing_hits_both_ends() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!(ease_out_cubic(0.5) > 0.5);
    }

    #[test]
    fn task_completes_with_exact_target() {
        let mut scheduler = AnimationScheduler::default();
        let id = FeatureId::new("a");
        let task = scheduler.start(id.clone(), AnimationKind::Height, 10.0, 30.0, ms(400), ms(0));
        assert_eq!(scheduler.state(task), Some(TaskState::Active));

        let mid = scheduler.tick(ms(200));
        assert!(mid[0].value > 10.0 && mid[0].value < 30.0 && !mid[0].finished);

        let end = scheduler.tick(ms(400));
        assert_eq!(end[0].value, 30.0);
        assert!(end[0].finished);
        assert_eq!(scheduler.state(task), Some(TaskState::Completed));
        assert!(scheduler.is_idle());
    }

    #[test]
    fn superseding_starts_from_current_value() {
        let mut scheduler = AnimationScheduler::default();
        let id = FeatureId::new("a");
        let first = scheduler.start(id.clone(), AnimationKind::Height, 0.0, 100.0, ms(1000), ms(0));
        let reached = scheduler.active_task(&id, AnimationKind::Height).unwrap().value_at(ms(500));

        let second = scheduler.start(id.clone(), AnimationKind::Height, 0.0, 20.0, ms(1000), ms(500));
        assert_eq!(scheduler.state(first), Some(TaskState::Cancelled));
        assert_eq!(scheduler.active_task(&id, AnimationKind::Height).unwrap().from, reached);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.state(second), Some(TaskState::Active));
    }

    #[test]
    fn kinds_run_independently_and_cancel_together() {
        let mut scheduler = AnimationScheduler::default();
        let id = FeatureId::new("a");
        let rise = scheduler.start(id.clone(), AnimationKind::Rise, 0.001, 1.0, ms(600), ms(0));
        let height = scheduler.start(id.clone(), AnimationKind::Height, 5.0, 9.0, ms(450), ms(0));
        scheduler.start(FeatureId::new("b"), AnimationKind::Rise, 0.001, 1.0, ms(600), ms(0));

        assert_eq!(scheduler.cancel_feature(&id), 2);
        assert_eq!(scheduler.state(rise), Some(TaskState::Cancelled));
        assert_eq!(scheduler.state(height), Some(TaskState::Cancelled));
        assert!(!scheduler.has_tasks_for(&id));
        assert_eq!(scheduler.active_count(), 1);
    }

    #[test]
    fn zero_duration_finishes_on_next_tick() {
        let mut scheduler = AnimationScheduler::default();
        scheduler.start(FeatureId::new("a"), AnimationKind::Rotation, -15.0, 0.0, Duration::ZERO, ms(10));
        let samples = scheduler.tick(ms(10));
        assert_eq!(samples[0].value, 0.0);
        assert!(samples[0].finished);
    }

    #[test]
    fn history_is_bounded() {
        let mut scheduler = AnimationScheduler::default();
        let first = scheduler.start(FeatureId::new("x"), AnimationKind::Rise, 0.0, 1.0, Duration::ZERO, ms(0));
        scheduler.tick(ms(0));
        for i in 0..TASK_HISTORY_LIMIT {
            scheduler.start(FeatureId::new(format!("f{i}")), AnimationKind::Rise, 0.0, 1.0, Duration::ZERO, ms(0));
            scheduler.tick(ms(0));
        }
        assert_eq!(scheduler.state(first), None);
    }
}
