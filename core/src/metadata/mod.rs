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

//! Durable description of a reserved external compaction.
//!
//! A record is written by the tablet at the moment a job moves from queued to
//! running and is only read back for recovery and reporting. It is never
//! modified in place; confirming a commit produces a new record through
//! [`ExternalCompactionMetadata::with_compaction_id`].

use std::collections::BTreeSet;

use derive_builder::Builder;

use crate::common::{CompactionExecutorId, TabletFile};
use crate::job::CompactionKind;
use crate::{CompactionError, Result};

mod codec;

#[derive(Builder, Debug, Clone, PartialEq, Eq)]
#[builder(
    pattern = "owned",
    build_fn(validate = "Self::validate", error = "CompactionError")
)]
pub struct ExternalCompactionMetadata {
    #[builder(setter(custom))]
    job_files: BTreeSet<TabletFile>,
    #[builder(setter(custom))]
    next_files: BTreeSet<TabletFile>,
    compact_tmp_name: TabletFile,
    new_file: TabletFile,
    #[builder(setter(into))]
    compactor_id: String,
    kind: CompactionKind,
    priority: i64,
    executor: CompactionExecutorId,
    propagate_deletes: bool,
    selected_all: bool,
    #[builder(default, setter(strip_option))]
    compaction_id: Option<i64>,
}

impl ExternalCompactionMetadata {
    pub fn builder() -> ExternalCompactionMetadataBuilder {
        ExternalCompactionMetadataBuilder::default()
    }

    /// Files consumed by the compaction.
    pub fn job_files(&self) -> &BTreeSet<TabletFile> {
        &self.job_files
    }

    /// Files the tablet adopts once the compaction completes, in addition to
    /// [`Self::new_file`].
    pub fn next_files(&self) -> &BTreeSet<TabletFile> {
        &self.next_files
    }

    /// Where the compactor writes its output before the commit renames it.
    pub fn compact_tmp_name(&self) -> &TabletFile {
        &self.compact_tmp_name
    }

    /// Final name of the compaction output.
    pub fn new_file(&self) -> &TabletFile {
        &self.new_file
    }

    pub fn compactor_id(&self) -> &str {
        &self.compactor_id
    }

    pub fn kind(&self) -> CompactionKind {
        self.kind
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    pub fn executor(&self) -> &CompactionExecutorId {
        &self.executor
    }

    pub fn propagate_deletes(&self) -> bool {
        self.propagate_deletes
    }

    pub fn selected_all(&self) -> bool {
        self.selected_all
    }

    /// Set once the compaction is known to be committed.
    pub fn compaction_id(&self) -> Option<i64> {
        self.compaction_id
    }

    /// Returns the record that supersedes this one once the compaction commit
    /// has been confirmed.
    pub fn with_compaction_id(&self, compaction_id: i64) -> Self {
        Self {
            compaction_id: Some(compaction_id),
            ..self.clone()
        }
    }
}

impl ExternalCompactionMetadataBuilder {
    pub fn job_files<I>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = TabletFile>,
    {
        self.job_files = Some(files.into_iter().collect());
        self
    }

    pub fn next_files<I>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = TabletFile>,
    {
        self.next_files = Some(files.into_iter().collect());
        self
    }

    fn validate(&self) -> Result<()> {
        if let Some(job_files) = &self.job_files {
            if job_files.is_empty() {
                return Err(CompactionError::Validation(
                    "reservation has no input files".to_owned(),
                ));
            }
            if let Some(next_files) = &self.next_files {
                if let Some(file) = job_files.intersection(next_files).next() {
                    return Err(CompactionError::Validation(format!(
                        "{file} is both an input and a next file"
                    )));
                }
            }
        }
        if self.compactor_id.as_deref() == Some("") {
            return Err(CompactionError::Validation(
                "compactor id must not be empty".to_owned(),
            ));
        }
        if let (Some(tmp), Some(dest)) = (&self.compact_tmp_name, &self.new_file) {
            if tmp == dest {
                return Err(CompactionError::Validation(format!(
                    "temporary and final output are both {dest}"
                )));
            }
        }
        Ok(())
    }
}
