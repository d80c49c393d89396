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

use derive_builder::Builder;
use itertools::Itertools;
use serde::Deserialize;

use crate::common::CompactionExecutorId;
use crate::{CompactionError, Result};

pub const DEFAULT_MAX_RESERVATION_FAILURES: u32 = 3;

fn default_max_reservation_failures() -> u32 {
    DEFAULT_MAX_RESERVATION_FAILURES
}

/// Settings shared by every external compaction executor.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Deserialize)]
#[builder(
    pattern = "owned",
    build_fn(validate = "Self::validate", error = "CompactionError")
)]
#[serde(rename_all = "kebab-case")]
pub struct ExecutorConfig {
    /// How many times a reserved job may fail tablet-side bookkeeping before it
    /// is given up on. Below the limit the job goes back to the queue.
    #[builder(default = "DEFAULT_MAX_RESERVATION_FAILURES")]
    #[serde(default = "default_max_reservation_failures")]
    pub max_reservation_failures: u32,
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        check_max_reservation_failures(self.max_reservation_failures)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_reservation_failures: DEFAULT_MAX_RESERVATION_FAILURES,
        }
    }
}

impl ExecutorConfigBuilder {
    fn validate(&self) -> Result<()> {
        match self.max_reservation_failures {
            Some(max) => check_max_reservation_failures(max),
            None => Ok(()),
        }
    }
}

fn check_max_reservation_failures(max: u32) -> Result<()> {
    if max == 0 {
        return Err(CompactionError::Config(
            "max-reservation-failures must be at least 1".to_owned(),
        ));
    }
    Ok(())
}

/// The external executors (compactor queues) hosted by one server.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Deserialize)]
#[builder(
    pattern = "owned",
    build_fn(validate = "Self::validate", error = "CompactionError")
)]
#[serde(rename_all = "kebab-case")]
pub struct CompactionManagerConfig {
    #[builder(setter(custom))]
    pub executors: Vec<String>,

    #[builder(default)]
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl CompactionManagerConfig {
    pub fn builder() -> CompactionManagerConfigBuilder {
        CompactionManagerConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        check_executor_names(&self.executors)?;
        self.executor.validate()
    }

    pub fn executor_ids(&self) -> Result<Vec<CompactionExecutorId>> {
        self.executors
            .iter()
            .map(|name| CompactionExecutorId::external(name.as_str()))
            .collect()
    }
}

impl CompactionManagerConfigBuilder {
    pub fn executors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.executors = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn validate(&self) -> Result<()> {
        match &self.executors {
            Some(names) => check_executor_names(names),
            None => Ok(()),
        }
    }
}

fn check_executor_names(names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(CompactionError::Config(
            "at least one external executor is required".to_owned(),
        ));
    }
    for name in names {
        CompactionExecutorId::external(name.as_str())
            .map_err(|e| CompactionError::Config(e.to_string()))?;
    }
    let duplicates = names.iter().duplicates().join(", ");
    if !duplicates.is_empty() {
        return Err(CompactionError::Config(format!(
            "duplicate external executors: {duplicates}"
        )));
    }
    Ok(())
}
