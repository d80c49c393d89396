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

pub mod common;
pub mod compactable;
pub mod config;
pub mod error;
pub mod executor;
pub mod job;
pub mod manager;
pub mod memory_tablet;
pub mod metadata;
pub mod test_utils;

pub use common::{CompactionExecutorId, CompactionServiceId, ExternalCompactionId, TabletFile};
pub use compactable::{Compactable, CompletionCallback};
pub use config::{CompactionManagerConfig, ExecutorConfig};
pub use error::{CompactionError, Result};
pub use executor::{CompactionQueueSummary, ExternalCompactionExecutor, ExternalCompactionJob};
pub use job::{CompactionJob, CompactionKind, JobStatus, SubmittedJob};
pub use manager::CompactionManager;
pub use memory_tablet::{MemoryTablet, RecoveryReport};
pub use metadata::ExternalCompactionMetadata;
