/*
 * Copyright 2025 tablet-compaction
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Lifecycle of a submitted compaction job.
//!
//! ```text
//! Queued ──reserve──▶ Running ──complete──▶ Complete
//!   │  ▲                 │
//!   │  └────requeue──────┤
//!   │                    └──fail──▶ Failed
//!   └──cancel──▶ Canceled
//! ```
//!
//! `Complete`, `Canceled` and `Failed` are terminal. There is no edge from
//! `Running` to `Canceled`: a reserved job belongs to its compactor.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobStatus {
    Queued = 0,
    Running = 1,
    Complete = 2,
    Canceled = 3,
    Failed = 4,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Canceled | Self::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Complete,
            3 => Self::Canceled,
            4 => Self::Failed,
            _ => unreachable!("invalid job status {value}"),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Complete => "COMPLETE",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Status cell that only exposes the legal edges of the job state machine.
#[derive(Debug)]
pub(crate) struct AtomicJobStatus(AtomicU8);

impl AtomicJobStatus {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(JobStatus::Queued as u8))
    }

    pub(crate) fn load(&self) -> JobStatus {
        JobStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Queued -> Running. Exactly one caller wins for a given job.
    pub(crate) fn try_reserve(&self) -> bool {
        self.transition(JobStatus::Queued, JobStatus::Running)
    }

    /// Queued -> Canceled.
    pub(crate) fn try_cancel(&self) -> bool {
        self.transition(JobStatus::Queued, JobStatus::Canceled)
    }

    /// Running -> Complete.
    pub(crate) fn try_complete(&self) -> bool {
        self.transition(JobStatus::Running, JobStatus::Complete)
    }

    /// Running -> Queued, after tablet-side bookkeeping rejected a reservation.
    pub(crate) fn try_requeue(&self) -> bool {
        self.transition(JobStatus::Running, JobStatus::Queued)
    }

    /// Running -> Failed, once a job has been rejected too many times.
    pub(crate) fn try_fail(&self) -> bool {
        self.transition(JobStatus::Running, JobStatus::Failed)
    }

    fn transition(&self, from: JobStatus, to: JobStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn test_reserve_then_complete() {
        let status = AtomicJobStatus::new();
        assert_eq!(status.load(), JobStatus::Queued);
        assert!(status.try_reserve());
        assert_eq!(status.load(), JobStatus::Running);
        assert!(!status.try_cancel(), "running jobs can not be canceled");
        assert!(status.try_complete());
        assert_eq!(status.load(), JobStatus::Complete);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let canceled = AtomicJobStatus::new();
        assert!(canceled.try_cancel());
        assert!(!canceled.try_reserve());
        assert!(!canceled.try_complete());
        assert!(!canceled.try_requeue());
        assert!(canceled.load().is_terminal());

        let failed = AtomicJobStatus::new();
        assert!(failed.try_reserve());
        assert!(failed.try_fail());
        assert!(!failed.try_requeue());
        assert!(!failed.try_complete());
        assert_eq!(failed.load(), JobStatus::Failed);
    }

    #[test]
    fn test_requeue_allows_another_reservation() {
        let status = AtomicJobStatus::new();
        assert!(status.try_reserve());
        assert!(status.try_requeue());
        assert!(!status.load().is_terminal());
        assert!(status.try_reserve());
    }

    #[test]
    fn test_single_winner_under_contention() {
        let status = Arc::new(AtomicJobStatus::new());
        let winners = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let status = status.clone();
                let winners = winners.clone();
                std::thread::spawn(move || {
                    let won = if i % 2 == 0 {
                        status.try_reserve()
                    } else {
                        status.try_cancel()
                    };
                    if won {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_ne!(status.load(), JobStatus::Queued);
    }
}
