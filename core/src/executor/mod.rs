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

//! Queue of compaction jobs waiting for an external compactor.
//!
//! Jobs are kept in a lock-free ordered map keyed by `(priority desc,
//! submission sequence)`. A job's status lives in the job itself, so
//! canceling a job only flips its status; the entry stays in the map until a
//! reservation or summary walks past it. Queued jobs are counted separately so
//! a summary never walks the map.

use std::cmp::Reverse;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_skiplist::SkipMap;

use crate::common::{CompactionExecutorId, CompactionServiceId, ExternalCompactionId};
use crate::compactable::{Compactable, CompletionCallback};
use crate::config::ExecutorConfig;
use crate::job::handle::ExternalJob;
use crate::job::{CompactionJob, JobStatus, SubmittedJob};
use crate::metadata::ExternalCompactionMetadata;
use crate::{CompactionError, Result};

type QueueKey = (Reverse<i64>, u64);

/// Point-in-time view of an executor's queue.
///
/// `top_priority` and `queued_count` are both zero when nothing is queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionQueueSummary {
    pub executor_name: String,
    pub top_priority: i64,
    pub queued_count: usize,
}

/// A job handed to a compactor together with the record the tablet persisted
/// for it.
#[derive(Debug, Clone)]
pub struct ExternalCompactionJob {
    ecid: ExternalCompactionId,
    job: CompactionJob,
    metadata: ExternalCompactionMetadata,
}

impl ExternalCompactionJob {
    pub fn external_compaction_id(&self) -> ExternalCompactionId {
        self.ecid
    }

    pub fn job(&self) -> &CompactionJob {
        &self.job
    }

    pub fn metadata(&self) -> &ExternalCompactionMetadata {
        &self.metadata
    }

    pub fn into_metadata(self) -> ExternalCompactionMetadata {
        self.metadata
    }
}

pub struct ExternalCompactionExecutor {
    id: CompactionExecutorId,
    config: ExecutorConfig,
    queue: SkipMap<QueueKey, Arc<ExternalJob>>,
    next_seq: AtomicU64,
    queued: Arc<AtomicUsize>,
    stopped: AtomicBool,
}

impl ExternalCompactionExecutor {
    pub fn new(id: CompactionExecutorId, config: ExecutorConfig) -> Self {
        Self {
            id,
            config,
            queue: SkipMap::new(),
            next_seq: AtomicU64::new(0),
            queued: Arc::new(AtomicUsize::new(0)),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &CompactionExecutorId {
        &self.id
    }

    /// Queues `job` for an external compactor.
    ///
    /// `on_complete` runs once, from whichever status query first observes
    /// that the tablet finished the compaction.
    pub fn submit(
        &self,
        service: CompactionServiceId,
        job: CompactionJob,
        compactable: Arc<dyn Compactable>,
        on_complete: CompletionCallback,
    ) -> SubmittedJob {
        let priority = job.priority();
        let kind = job.kind();
        let external = Arc::new(ExternalJob::new(
            job,
            compactable,
            service,
            on_complete,
            self.queued.clone(),
        ));

        if self.stopped.load(Ordering::SeqCst) {
            external.try_cancel();
            return SubmittedJob::new(external);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.enqueue((Reverse(priority), seq), &external);

        tracing::debug!(
            executor = %self.id,
            tablet = external.compactable.tablet_id(),
            priority,
            %kind,
            "queued external compaction"
        );
        SubmittedJob::new(external)
    }

    /// Hands the most urgent queued job to `compactor_id`.
    ///
    /// Returns `Ok(None)` when nothing is queued or when the most urgent job is
    /// below `min_priority`. An error from the tablet is returned as is, after
    /// the job was either put back in the queue or marked failed.
    pub async fn reserve(
        &self,
        min_priority: i64,
        compactor_id: &str,
        ecid: ExternalCompactionId,
    ) -> Result<Option<ExternalCompactionJob>> {
        if self.stopped.load(Ordering::SeqCst) {
            return Ok(None);
        }

        // Every pass removes an entry, so the entries seen on entry bound the
        // work done here even while other callers keep submitting.
        let observed = self.queue.len();
        for _ in 0..=observed {
            let Some(entry) = self.queue.pop_front() else {
                return Ok(None);
            };
            let key = *entry.key();
            let external = entry.value().clone();
            drop(entry);

            if external.status.load() != JobStatus::Queued {
                tracing::debug!(executor = %self.id, "discarded stale queue entry");
                continue;
            }
            if external.job.priority() < min_priority {
                self.enqueue(key, &external);
                return Ok(None);
            }
            if external.try_reserve() {
                return self.reserve_claimed(key, external, compactor_id, ecid).await;
            }
        }
        Ok(None)
    }

    async fn reserve_claimed(
        &self,
        key: QueueKey,
        external: Arc<ExternalJob>,
        compactor_id: &str,
        ecid: ExternalCompactionId,
    ) -> Result<Option<ExternalCompactionJob>> {
        let mut claim = Claim {
            executor: self,
            key,
            external: Some(external.clone()),
        };
        let reserved = external
            .compactable
            .reserve_external_compaction(&external.service, &external.job, compactor_id, &ecid)
            .await;
        claim.release();

        let metadata = match reserved {
            Ok(metadata) => metadata,
            Err(e) => {
                self.roll_back(key, &external, &e);
                return Err(e);
            }
        };

        if external.ecid.set(ecid).is_err() {
            return Err(CompactionError::Unexpected(format!(
                "job on {} was already bound to a reservation when reserving {ecid}",
                external.compactable.tablet_id()
            )));
        }

        tracing::info!(
            executor = %self.id,
            tablet = external.compactable.tablet_id(),
            compactor = compactor_id,
            %ecid,
            priority = external.job.priority(),
            "reserved external compaction"
        );

        Ok(Some(ExternalCompactionJob {
            ecid,
            job: external.job.clone(),
            metadata,
        }))
    }

    fn roll_back(&self, key: QueueKey, external: &Arc<ExternalJob>, cause: &CompactionError) {
        let failures = external.record_reservation_failure();
        let limit = self.config.max_reservation_failures;

        if failures < limit && external.try_requeue() {
            self.enqueue(key, external);
            tracing::warn!(
                executor = %self.id,
                tablet = external.compactable.tablet_id(),
                failures,
                limit,
                error = %cause,
                "external compaction reservation failed, job requeued"
            );
        } else if external.status.try_fail() {
            tracing::error!(
                executor = %self.id,
                tablet = external.compactable.tablet_id(),
                failures,
                error = %cause,
                "external compaction reservation failed too many times, job dropped"
            );
        }
    }

    /// Puts a queued job (back) in the map under `key`.
    ///
    /// A `stop` that ran before the insert landed drained the map without
    /// seeing the entry, so the stop flag is checked again afterwards.
    fn enqueue(&self, key: QueueKey, external: &Arc<ExternalJob>) {
        self.queue.insert(key, external.clone());
        if self.stopped.load(Ordering::SeqCst) && external.try_cancel() {
            self.queue.remove(&key);
        }
    }

    /// Summarizes the queued jobs without waiting on submitters or reservers.
    ///
    /// Only stale entries at the head of the map are visited.
    pub fn summarize(&self) -> CompactionQueueSummary {
        let mut top_priority = 0;
        while let Some(front) = self.queue.front() {
            if front.value().status.load() == JobStatus::Queued {
                top_priority = front.value().job.priority();
                break;
            }
            front.remove();
        }

        let queued_count = self.compactions_queued();
        CompactionQueueSummary {
            executor_name: self.id.external_name().to_owned(),
            top_priority: if queued_count == 0 { 0 } else { top_priority },
            queued_count,
        }
    }

    pub fn compactions_queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn cancel(&self, job: &SubmittedJob, expected_status: JobStatus) -> bool {
        job.cancel(expected_status)
    }

    pub fn status(&self, job: &SubmittedJob) -> JobStatus {
        job.status()
    }

    /// Cancels everything still queued. Later reservations find nothing and
    /// later submissions come back canceled.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);

        let mut canceled = 0;
        while let Some(entry) = self.queue.pop_front() {
            if entry.value().try_cancel() {
                canceled += 1;
            }
        }
        tracing::info!(executor = %self.id, canceled, "stopped external compaction executor");
    }
}

/// A job moved to `Running` whose tablet-side reservation has not answered yet.
///
/// Dropping an unreleased claim, which happens when the `reserve` future is
/// dropped while the tablet is working, returns the job to the queue under its
/// old key. The job never got a reservation id, so nothing else would ever
/// move it out of `Running`.
struct Claim<'a> {
    executor: &'a ExternalCompactionExecutor,
    key: QueueKey,
    external: Option<Arc<ExternalJob>>,
}

impl Claim<'_> {
    fn release(&mut self) {
        self.external = None;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let Some(external) = self.external.take() else {
            return;
        };
        if external.try_requeue() {
            self.executor.enqueue(self.key, &external);
            tracing::warn!(
                executor = %self.executor.id,
                tablet = external.compactable.tablet_id(),
                "external compaction reservation abandoned, job requeued"
            );
        }
    }
}
