//! Progress tracking for the most recent summarisation job.
//!
//! There is exactly one slot: every new job overwrites it, so `snapshot`
//! reports the latest job only. Each job gets a generation number and
//! writes from a job that has been superseded are ignored.

use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Progress is capped here until the job is explicitly completed
const MAX_RUNNING_PROGRESS: u8 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Tokenizing,
    Generating,
    PostProcessing,
    Complete,
}

/// Point-in-time view of the tracked job, as served by `GET /api/status`
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub in_progress: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub input_word_count: usize,
    pub estimated_time_seconds: f64,
    pub stage: Stage,
    pub progress: u8,
    pub elapsed_seconds: f64,
    pub time_remaining_seconds: f64,
}

struct Slot {
    generation: u64,
    in_progress: bool,
    started: Option<(Instant, DateTime<Utc>)>,
    input_word_count: usize,
    estimated_time_seconds: f64,
    stage: Stage,
    progress: u8,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            generation: 0,
            in_progress: false,
            started: None,
            input_word_count: 0,
            estimated_time_seconds: 0.0,
            stage: Stage::Idle,
            progress: 0,
        }
    }
}

#[derive(Default)]
pub struct JobTracker {
    slot: Mutex<Slot>,
}

/// Estimated processing time: 10 seconds per 500 words, clamped to [1, 30].
pub fn estimate_seconds(word_count: usize) -> f64 {
    (word_count as f64 / 500.0 * 10.0).clamp(1.0, 30.0)
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // A panic mid-update leaves plain data behind; keep serving it.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start tracking a new job, replacing whatever was tracked before.
    /// Returns the job's generation.
    pub fn reset(&self, input_text: &str) -> u64 {
        let word_count = input_text.split_whitespace().count();
        let mut slot = self.slot();
        let generation = slot.generation + 1;
        *slot = Slot {
            generation,
            in_progress: true,
            started: Some((Instant::now(), Utc::now())),
            input_word_count: word_count,
            estimated_time_seconds: estimate_seconds(word_count),
            stage: Stage::Tokenizing,
            progress: 0,
        };
        generation
    }

    /// Move job `generation` to `stage`. Ignored once the job is superseded or complete.
    pub fn advance(&self, generation: u64, stage: Stage, progress: u8) {
        let mut slot = self.slot();
        if slot.generation != generation || !slot.in_progress {
            return;
        }
        slot.stage = stage;
        slot.progress = progress.min(MAX_RUNNING_PROGRESS);
    }

    /// Mark job `generation` complete. Ignored once the job is superseded.
    pub fn complete(&self, generation: u64) {
        let mut slot = self.slot();
        if slot.generation != generation {
            return;
        }
        slot.in_progress = false;
        slot.stage = Stage::Complete;
        slot.progress = 100;
    }

    pub fn snapshot(&self) -> JobStatus {
        let slot = self.slot();
        let elapsed = slot
            .started
            .map(|(instant, _)| instant.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let (progress, remaining) = if slot.in_progress {
            let by_time = if slot.estimated_time_seconds > 0.0 {
                (elapsed / slot.estimated_time_seconds * 100.0) as u64
            } else {
                0
            };
            let progress = by_time
                .max(slot.progress as u64)
                .min(MAX_RUNNING_PROGRESS as u64) as u8;
            (progress, (slot.estimated_time_seconds - elapsed).max(0.0))
        } else {
            (slot.progress, 0.0)
        };

        JobStatus {
            in_progress: slot.in_progress,
            start_time: slot.started.map(|(_, wall)| wall),
            input_word_count: slot.input_word_count,
            estimated_time_seconds: slot.estimated_time_seconds,
            stage: slot.stage,
            progress,
            elapsed_seconds: elapsed,
            time_remaining_seconds: remaining,
        }
    }

    /// Start a job and get a handle that completes it when dropped.
    pub fn start(&self, input_text: &str) -> JobHandle<'_> {
        let generation = self.reset(input_text);
        JobHandle {
            tracker: self,
            generation,
        }
    }
}

/// Scope guard for one tracked job. Completion runs exactly once, on drop,
/// whether the job succeeded, failed, or panicked.
pub struct JobHandle<'a> {
    tracker: &'a JobTracker,
    generation: u64,
}

impl JobHandle<'_> {
    pub fn advance(&self, stage: Stage, progress: u8) {
        self.tracker.advance(self.generation, stage, progress);
    }
}

impl Drop for JobHandle<'_> {
    fn drop(&mut self) {
        self.tracker.complete(self.generation);
    }
}
