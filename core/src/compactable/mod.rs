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

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::common::{CompactionServiceId, ExternalCompactionId};
use crate::job::CompactionJob;
use crate::metadata::ExternalCompactionMetadata;

/// A tablet as seen by the compaction executors.
///
/// Executors never hold any of their own state while calling into a
/// `Compactable`, so implementations are free to take tablet-level locks here
/// even though planners may submit jobs while holding those same locks.
#[async_trait]
pub trait Compactable: Send + Sync + 'static {
    /// Short identifier used in logs, usually the tablet's extent.
    fn tablet_id(&self) -> &str;

    /// Performs the tablet-side bookkeeping for a job that was just claimed by
    /// `compactor_id`: verifies the job's files are still present, computes the
    /// next file set, allocates output files and durably records the
    /// reservation under `ecid`.
    ///
    /// An error means the reservation did not happen and nothing was persisted.
    async fn reserve_external_compaction(
        &self,
        service: &CompactionServiceId,
        job: &CompactionJob,
        compactor_id: &str,
        ecid: &ExternalCompactionId,
    ) -> Result<ExternalCompactionMetadata>;

    /// Whether the reservation `ecid` is still live. Unknown ids are not active.
    fn is_active(&self, ecid: &ExternalCompactionId) -> bool;
}

/// Invoked once when a submitted job is observed to have completed.
pub type CompletionCallback = Box<dyn FnOnce(&Arc<dyn Compactable>) + Send>;
