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

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::CompactionJob;
use super::status::{AtomicJobStatus, JobStatus};
use crate::common::{CompactionServiceId, ExternalCompactionId};
use crate::compactable::{Compactable, CompletionCallback};

/// Handle returned to whoever submitted a job.
///
/// Cloning the handle is cheap; all clones observe the same job.
#[derive(Clone)]
pub struct SubmittedJob {
    inner: Arc<ExternalJob>,
}

impl SubmittedJob {
    pub(crate) fn new(inner: Arc<ExternalJob>) -> Self {
        Self { inner }
    }

    pub fn job(&self) -> &CompactionJob {
        &self.inner.job
    }

    /// Current status of the job.
    ///
    /// A running job is reported complete as soon as its tablet no longer
    /// considers the reservation active. Nothing pushes that change to the
    /// handle, so a finished job may read as running until the next call.
    pub fn status(&self) -> JobStatus {
        self.inner.status()
    }

    /// Cancels the job if it is still in `expected_status`.
    ///
    /// Only queued jobs can be canceled. `false` after asking to cancel a
    /// queued job means a compactor won the race and the job is now assigned.
    pub fn cancel(&self, expected_status: JobStatus) -> bool {
        self.inner.cancel(expected_status)
    }

    /// Reservation id bound to the job once a compactor reserved it.
    pub fn external_compaction_id(&self) -> Option<ExternalCompactionId> {
        self.inner.ecid.get().copied()
    }
}

impl fmt::Debug for SubmittedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmittedJob")
            .field("job", &self.inner.job)
            .field("status", &self.inner.status.load())
            .field("ecid", &self.inner.ecid.get())
            .finish()
    }
}

/// Executor-side record behind a [`SubmittedJob`].
///
/// Edges into and out of `Queued` go through the `try_*` methods here so the
/// owning executor's queued gauge stays in step with the status cell.
pub(crate) struct ExternalJob {
    pub(crate) job: CompactionJob,
    pub(crate) status: AtomicJobStatus,
    pub(crate) compactable: Arc<dyn Compactable>,
    pub(crate) service: CompactionServiceId,
    pub(crate) ecid: OnceLock<ExternalCompactionId>,
    reservation_failures: AtomicU32,
    on_complete: Mutex<Option<CompletionCallback>>,
    queued: Arc<AtomicUsize>,
}

impl ExternalJob {
    pub(crate) fn new(
        job: CompactionJob,
        compactable: Arc<dyn Compactable>,
        service: CompactionServiceId,
        on_complete: CompletionCallback,
        queued: Arc<AtomicUsize>,
    ) -> Self {
        queued.fetch_add(1, Ordering::AcqRel);
        Self {
            job,
            status: AtomicJobStatus::new(),
            compactable,
            service,
            ecid: OnceLock::new(),
            reservation_failures: AtomicU32::new(0),
            on_complete: Mutex::new(Some(on_complete)),
            queued,
        }
    }

    /// Queued -> Running.
    pub(crate) fn try_reserve(&self) -> bool {
        self.leave_queue(self.status.try_reserve())
    }

    /// Queued -> Canceled.
    pub(crate) fn try_cancel(&self) -> bool {
        self.leave_queue(self.status.try_cancel())
    }

    /// Running -> Queued.
    pub(crate) fn try_requeue(&self) -> bool {
        // Counted before the edge: a cancel may follow the edge immediately.
        self.queued.fetch_add(1, Ordering::AcqRel);
        let requeued = self.status.try_requeue();
        if !requeued {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
        requeued
    }

    fn leave_queue(&self, left: bool) -> bool {
        if left {
            self.queued.fetch_sub(1, Ordering::AcqRel);
        }
        left
    }

    pub(crate) fn status(&self) -> JobStatus {
        let status = self.status.load();
        if status != JobStatus::Running {
            return status;
        }
        // Queued -> Running happens before the reservation id is bound.
        let Some(ecid) = self.ecid.get() else {
            return status;
        };
        if self.compactable.is_active(ecid) {
            return JobStatus::Running;
        }
        if self.status.try_complete() {
            self.run_completion_callback();
        }
        self.status.load()
    }

    pub(crate) fn cancel(&self, expected_status: JobStatus) -> bool {
        match expected_status {
            JobStatus::Queued => self.try_cancel(),
            _ => false,
        }
    }

    /// Counts a failed tablet-side reservation and returns the running total.
    pub(crate) fn record_reservation_failure(&self) -> u32 {
        self.reservation_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn run_completion_callback(&self) {
        let callback = self.on_complete.lock().take();
        if let Some(callback) = callback {
            callback(&self.compactable);
        }
    }
}
