//! Progress and log reporting.
//!
//! The core only talks to a [`CompressionObserver`]; any front end (CLI, web
//! handler, desktop UI) implements it without the core knowing about it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::CompressionOutcome;

/// Receives progress checkpoints and transcript lines.
///
/// Both methods default to doing nothing so implementors only override what
/// they care about.
pub trait CompressionObserver {
    /// Called with the file name being processed and a percentage in `0..=100`.
    fn progress(&self, _filename: &str, _percent: u8) {}

    /// Called with a free-text line for the batch transcript.
    fn log(&self, _line: &str) {}
}

/// Observer that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl CompressionObserver for NoopObserver {}

/// State of one job tracked on a [`ProgressBoard`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Starting {
        filename: String,
    },
    Processing {
        filename: String,
        percent: u8,
    },
    Completed {
        filename: String,
        original_size_bytes: u64,
        compressed_size_bytes: u64,
        ratio_percent: f64,
        message: String,
    },
    Failed {
        filename: String,
        message: String,
    },
}

impl JobState {
    pub fn filename(&self) -> &str {
        match self {
            JobState::Starting { filename }
            | JobState::Processing { filename, .. }
            | JobState::Completed { filename, .. }
            | JobState::Failed { filename, .. } => filename,
        }
    }

    pub fn percent(&self) -> u8 {
        match self {
            JobState::Starting { .. } | JobState::Failed { .. } => 0,
            JobState::Processing { percent, .. } => *percent,
            JobState::Completed { .. } => 100,
        }
    }
}

/// Shared map of job id to [`JobState`] for front ends that run several
/// documents at once.
///
/// Cloning the board clones the handle, not the map.
#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    jobs: Arc<Mutex<HashMap<String, JobState>>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobState>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a job and return an observer that updates only that job.
    pub fn observer(&self, job_id: impl Into<String>, filename: impl Into<String>) -> JobObserver {
        let job_id = job_id.into();
        self.lock().insert(
            job_id.clone(),
            JobState::Starting {
                filename: filename.into(),
            },
        );
        JobObserver {
            board: self.clone(),
            job_id,
        }
    }

    /// Record the final outcome of a job.
    pub fn finish(&self, job_id: &str, outcome: &CompressionOutcome) {
        let mut jobs = self.lock();
        let filename = jobs
            .get(job_id)
            .map(|state| state.filename().to_string())
            .unwrap_or_default();

        let state = match (outcome.success, outcome.compressed_size_bytes, outcome.ratio_percent) {
            (true, Some(compressed), Some(ratio)) => JobState::Completed {
                filename,
                original_size_bytes: outcome.original_size_bytes,
                compressed_size_bytes: compressed,
                ratio_percent: ratio,
                message: outcome.message.clone(),
            },
            _ => JobState::Failed {
                filename,
                message: outcome.message.clone(),
            },
        };
        jobs.insert(job_id.to_string(), state);
    }

    pub fn get(&self, job_id: &str) -> Option<JobState> {
        self.lock().get(job_id).cloned()
    }

    pub fn remove(&self, job_id: &str) -> Option<JobState> {
        self.lock().remove(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Per-job handle handed to the engine.
#[derive(Debug, Clone)]
pub struct JobObserver {
    board: ProgressBoard,
    job_id: String,
}

impl JobObserver {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl CompressionObserver for JobObserver {
    fn progress(&self, filename: &str, percent: u8) {
        let mut jobs = self.board.lock();
        // Finished jobs keep their terminal state.
        if let Some(JobState::Completed { .. } | JobState::Failed { .. }) = jobs.get(&self.job_id) {
            return;
        }
        jobs.insert(
            self.job_id.clone(),
            JobState::Processing {
                filename: filename.to_string(),
                percent,
            },
        );
    }

    fn log(&self, line: &str) {
        log::debug!("[{}] {}", self.job_id, line);
    }
}
