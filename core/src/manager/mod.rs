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

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;

use crate::common::{CompactionExecutorId, CompactionServiceId, ExternalCompactionId};
use crate::compactable::{Compactable, CompletionCallback};
use crate::config::CompactionManagerConfig;
use crate::executor::{CompactionQueueSummary, ExternalCompactionExecutor, ExternalCompactionJob};
use crate::job::{CompactionJob, SubmittedJob};
use crate::{CompactionError, Result};

/// Routes jobs and reservation requests to the external executors of one
/// server.
pub struct CompactionManager {
    executors: HashMap<CompactionExecutorId, Arc<ExternalCompactionExecutor>>,
}

impl CompactionManager {
    pub fn new(config: CompactionManagerConfig) -> Result<Self> {
        config.validate()?;
        let executors = config
            .executor_ids()?
            .into_iter()
            .map(|id| {
                let executor = ExternalCompactionExecutor::new(id.clone(), config.executor.clone());
                (id, Arc::new(executor))
            })
            .collect();
        Ok(Self { executors })
    }

    /// Executor for the queue `name`, the external name of an executor id.
    pub fn executor(&self, name: &str) -> Result<&Arc<ExternalCompactionExecutor>> {
        let id = CompactionExecutorId::external(name)
            .map_err(|_| CompactionError::UnknownExecutor(name.to_owned()))?;
        self.executor_by_id(&id)
    }

    fn executor_by_id(
        &self,
        id: &CompactionExecutorId,
    ) -> Result<&Arc<ExternalCompactionExecutor>> {
        self.executors
            .get(id)
            .ok_or_else(|| CompactionError::UnknownExecutor(id.to_string()))
    }

    /// Queues `job` on the executor it names.
    pub fn submit(
        &self,
        service: CompactionServiceId,
        job: CompactionJob,
        compactable: Arc<dyn Compactable>,
        on_complete: CompletionCallback,
    ) -> Result<SubmittedJob> {
        let executor = self.executor_by_id(job.executor())?;
        Ok(executor.submit(service, job, compactable, on_complete))
    }

    pub async fn reserve_external_compaction(
        &self,
        queue_name: &str,
        min_priority: i64,
        compactor_id: &str,
        ecid: ExternalCompactionId,
    ) -> Result<Option<ExternalCompactionJob>> {
        self.executor(queue_name)?
            .reserve(min_priority, compactor_id, ecid)
            .await
    }

    /// Summaries of the executors that have queued work, by queue name.
    pub fn compaction_queue_summaries(&self) -> Vec<CompactionQueueSummary> {
        self.executors
            .values()
            .map(|executor| executor.summarize())
            .filter(|summary| summary.queued_count > 0)
            .sorted_by(|a, b| a.executor_name.cmp(&b.executor_name))
            .collect()
    }

    pub fn stop(&self) {
        for executor in self.executors.values() {
            executor.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use crate::job::JobStatus;
    use crate::test_utils::{TestCompactable, job, noop_callback};

    fn manager() -> CompactionManager {
        CompactionManager::new(
            CompactionManagerConfig::builder()
                .executors(["small", "large"])
                .executor(ExecutorConfig::default())
                .build()
                .unwrap(),
        )
        .unwrap()
    }

    fn submit(
        manager: &CompactionManager,
        executor: &str,
        priority: i64,
        file: &str,
    ) -> Result<SubmittedJob> {
        manager.submit(
            CompactionServiceId::new("default"),
            job(executor, priority, &[file]),
            Arc::new(TestCompactable::new("2;b;a")),
            noop_callback(),
        )
    }

    #[tokio::test]
    async fn test_routes_by_executor() {
        let manager = manager();
        let small = submit(&manager, "small", 10, "F1.rf").unwrap();
        let large = submit(&manager, "large", 20, "F2.rf").unwrap();

        let reserved = manager
            .reserve_external_compaction("small", 0, "c1", ExternalCompactionId::generate())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reserved.job(), small.job());
        assert_eq!(large.status(), JobStatus::Queued);
        assert_eq!(manager.executor("large").unwrap().compactions_queued(), 1);
    }

    #[tokio::test]
    async fn test_unknown_executor() {
        let manager = manager();
        assert!(matches!(
            submit(&manager, "medium", 1, "F1.rf"),
            Err(CompactionError::UnknownExecutor(_))
        ));
        let result = manager
            .reserve_external_compaction("medium", 0, "c1", ExternalCompactionId::generate())
            .await;
        assert!(matches!(result, Err(CompactionError::UnknownExecutor(_))));
        assert!(manager.executor("").is_err());
    }

    #[test]
    fn test_summaries_only_list_queued_work() {
        let manager = manager();
        assert!(manager.compaction_queue_summaries().is_empty());

        submit(&manager, "large", 4, "F1.rf").unwrap();
        submit(&manager, "large", 9, "F2.rf").unwrap();
        let summaries = manager.compaction_queue_summaries();
        assert_eq!(
            summaries,
            vec![CompactionQueueSummary {
                executor_name: "large".to_owned(),
                top_priority: 9,
                queued_count: 2,
            }]
        );
    }

    #[test]
    fn test_stop() {
        let manager = manager();
        let a = submit(&manager, "small", 4, "F1.rf").unwrap();
        let b = submit(&manager, "large", 4, "F2.rf").unwrap();
        manager.stop();
        assert_eq!(a.status(), JobStatus::Canceled);
        assert_eq!(b.status(), JobStatus::Canceled);
        assert!(manager.compaction_queue_summaries().is_empty());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = CompactionManagerConfig {
            executors: vec!["q1".to_owned(), "q1".to_owned()],
            executor: ExecutorConfig::default(),
        };
        assert!(matches!(
            CompactionManager::new(config),
            Err(CompactionError::Config(_))
        ));
    }
}
