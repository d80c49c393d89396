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

use std::collections::BTreeSet;
use std::fmt;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::common::{CompactionExecutorId, TabletFile};
use crate::{CompactionError, Result};

pub mod handle;
pub mod status;

pub use handle::SubmittedJob;
pub use status::JobStatus;

/// Why a compaction was planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompactionKind {
    /// Triggered by the tablet's own compaction ratio.
    System,
    /// Requested by a user for a range of tablets.
    User,
    /// Driven by a file selector configured on the table.
    Selector,
}

impl fmt::Display for CompactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::System => "SYSTEM",
            Self::User => "USER",
            Self::Selector => "SELECTOR",
        };
        f.write_str(s)
    }
}

/// A candidate compaction produced by a planner. Immutable once built.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Hash)]
#[builder(
    pattern = "owned",
    build_fn(validate = "Self::validate", error = "CompactionError")
)]
pub struct CompactionJob {
    #[builder(setter(custom))]
    files: BTreeSet<TabletFile>,
    kind: CompactionKind,
    /// Higher is more urgent.
    priority: i64,
    executor: CompactionExecutorId,
}

impl CompactionJob {
    pub fn builder() -> CompactionJobBuilder {
        CompactionJobBuilder::default()
    }

    pub fn files(&self) -> &BTreeSet<TabletFile> {
        &self.files
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
}

impl CompactionJobBuilder {
    pub fn files<I>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = TabletFile>,
    {
        self.files = Some(files.into_iter().collect());
        self
    }

    fn validate(&self) -> Result<()> {
        let Some(files) = &self.files else {
            return Ok(());
        };
        if files.is_empty() {
            return Err(CompactionError::Validation(
                "a compaction job needs at least one file".to_owned(),
            ));
        }
        let foreign = files.first().and_then(|first| {
            files
                .iter()
                .find(|f| f.table_id() != first.table_id() || f.tablet_dir() != first.tablet_dir())
        });
        if let Some(file) = foreign {
            return Err(CompactionError::Validation(format!(
                "all files of a compaction job must belong to one tablet, {file} does not"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{executor_id, tablet_file};

    #[test]
    fn test_build_job() {
        let job = CompactionJob::builder()
            .files([tablet_file("F0001.rf"), tablet_file("F0002.rf")])
            .kind(CompactionKind::System)
            .priority(-7)
            .executor(executor_id("small"))
            .build()
            .unwrap();

        assert_eq!(job.files().len(), 2);
        assert_eq!(job.kind(), CompactionKind::System);
        assert_eq!(job.priority(), -7);
        assert_eq!(job.executor().external_name(), "small");
    }

    #[test]
    fn test_missing_field_is_a_validation_error() {
        let result = CompactionJob::builder()
            .files([tablet_file("F0001.rf")])
            .priority(1)
            .executor(executor_id("small"))
            .build();
        match result {
            Err(CompactionError::Validation(msg)) => assert!(msg.contains("kind")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_file_set() {
        let result = CompactionJob::builder()
            .files(Vec::<TabletFile>::new())
            .kind(CompactionKind::User)
            .priority(1)
            .executor(executor_id("small"))
            .build();
        assert!(matches!(result, Err(CompactionError::Validation(_))));
    }

    #[test]
    fn test_rejects_files_from_two_tablets() {
        let result = CompactionJob::builder()
            .files([
                TabletFile::new("file:/v/tables/1/t-1/F1.rf").unwrap(),
                TabletFile::new("file:/v/tables/1/t-2/F2.rf").unwrap(),
            ])
            .kind(CompactionKind::User)
            .priority(1)
            .executor(executor_id("small"))
            .build();
        assert!(matches!(result, Err(CompactionError::Validation(_))));
    }

    #[test]
    fn test_job_identity_is_value_based() {
        let a = crate::test_utils::job("small", 5, &["F1.rf", "F2.rf"]);
        let b = crate::test_utils::job("small", 5, &["F2.rf", "F1.rf"]);
        let c = crate::test_utils::job("small", 6, &["F1.rf", "F2.rf"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kind_serialized_names() {
        assert_eq!(
            serde_json::to_string(&CompactionKind::Selector).unwrap(),
            "\"SELECTOR\""
        );
        assert_eq!(CompactionKind::User.to_string(), "USER");
    }
}
