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

//! Helpers shared by the unit tests and the integration suite.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::common::{CompactionExecutorId, CompactionServiceId, ExternalCompactionId, TabletFile};
use crate::compactable::{Compactable, CompletionCallback};
use crate::job::{CompactionJob, CompactionKind};
use crate::metadata::ExternalCompactionMetadata;
use crate::{CompactionError, Result};

pub const TABLET_DIR: &str = "hdfs://nn:8020/accumulo/tables/1/t-0000001";

/// A file in the test tablet directory.
pub fn tablet_file(name: &str) -> TabletFile {
    TabletFile::new(format!("{TABLET_DIR}/{name}")).unwrap()
}

pub fn executor_id(name: &str) -> CompactionExecutorId {
    CompactionExecutorId::external(name).unwrap()
}

/// A system compaction of `files` in the test tablet directory.
pub fn job(executor: &str, priority: i64, files: &[&str]) -> CompactionJob {
    CompactionJob::builder()
        .files(files.iter().map(|name| tablet_file(name)))
        .kind(CompactionKind::System)
        .priority(priority)
        .executor(executor_id(executor))
        .build()
        .unwrap()
}

pub fn noop_callback() -> CompletionCallback {
    Box::new(|_: &Arc<dyn Compactable>| {})
}

/// A `Compactable` that accepts every reservation unless told to fail.
///
/// It does no file bookkeeping: the record it returns carries the job's files
/// as inputs and nothing else.
pub struct TestCompactable {
    tablet_id: String,
    active: Mutex<HashSet<ExternalCompactionId>>,
    failures_left: AtomicU32,
    reservations: AtomicUsize,
}

impl TestCompactable {
    pub fn new(tablet_id: impl Into<String>) -> Self {
        Self {
            tablet_id: tablet_id.into(),
            active: Mutex::new(HashSet::new()),
            failures_left: AtomicU32::new(0),
            reservations: AtomicUsize::new(0),
        }
    }

    /// The next `count` reservations fail with [`CompactionError::Reservation`].
    pub fn fail_next_reservations(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn activate(&self, ecid: ExternalCompactionId) {
        self.active.lock().insert(ecid);
    }

    pub fn deactivate(&self, ecid: &ExternalCompactionId) {
        self.active.lock().remove(ecid);
    }

    /// Number of reservations that succeeded.
    pub fn reservations(&self) -> usize {
        self.reservations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compactable for TestCompactable {
    fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    async fn reserve_external_compaction(
        &self,
        _service: &CompactionServiceId,
        job: &CompactionJob,
        compactor_id: &str,
        ecid: &ExternalCompactionId,
    ) -> Result<ExternalCompactionMetadata> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failed {
            return Err(CompactionError::Reservation(format!(
                "{} refused reservation {ecid}",
                self.tablet_id
            )));
        }

        let seq = self.reservations.fetch_add(1, Ordering::SeqCst) + 1;
        let first = job
            .files()
            .first()
            .ok_or_else(|| CompactionError::Unexpected("job without files".to_owned()))?;
        let metadata = ExternalCompactionMetadata::builder()
            .job_files(job.files().iter().cloned())
            .next_files(Vec::<TabletFile>::new())
            .compact_tmp_name(first.sibling(&format!("A{seq:07}.rf_tmp"))?)
            .new_file(first.sibling(&format!("A{seq:07}.rf"))?)
            .compactor_id(compactor_id)
            .kind(job.kind())
            .priority(job.priority())
            .executor(job.executor().clone())
            .propagate_deletes(false)
            .selected_all(false)
            .build()?;

        self.activate(*ecid);
        Ok(metadata)
    }

    fn is_active(&self, ecid: &ExternalCompactionId) -> bool {
        self.active.lock().contains(ecid)
    }
}
