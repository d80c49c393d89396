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

use rand::Rng;
use rand::seq::IndexedRandom;
use tablet_compaction_core::{
    Compactable, CompactionError, CompactionExecutorId, CompactionJob, CompactionKind,
    CompactionManager, CompactionManagerConfig, CompactionServiceId, ExternalCompactionId,
    ExternalCompactionJob, MemoryTablet, Result, SubmittedJob, TabletFile,
};

pub const VOLUME: &str = "hdfs://nn:8020/accumulo";

/// Shape of a generated workload.
#[derive(Debug, Clone)]
pub struct Workload {
    pub executors: Vec<String>,
    pub tablets: usize,
    pub files_per_tablet: usize,
    pub files_per_job: usize,
    /// Priorities are drawn uniformly from this range.
    pub priorities: std::ops::Range<i64>,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            executors: vec!["small".to_owned(), "large".to_owned()],
            tablets: 16,
            files_per_tablet: 12,
            files_per_job: 3,
            priorities: -50..50,
        }
    }
}

impl Workload {
    pub fn job_count(&self) -> usize {
        self.tablets * self.files_per_tablet.div_ceil(self.files_per_job)
    }

    pub fn manager(&self) -> Result<CompactionManager> {
        CompactionManager::new(
            CompactionManagerConfig::builder()
                .executors(self.executors.iter().cloned())
                .build()?,
        )
    }
}

pub struct SubmittedTablet {
    pub tablet: Arc<MemoryTablet>,
    pub jobs: Vec<SubmittedJob>,
}

pub fn tablet_dir(tablet: usize) -> String {
    format!("{VOLUME}/tables/7/t-{tablet:07}")
}

/// Creates the workload's tablets and submits disjoint jobs covering all of
/// their files.
pub fn populate(
    manager: &CompactionManager,
    workload: &Workload,
    rng: &mut impl Rng,
) -> Result<Vec<SubmittedTablet>> {
    let service = CompactionServiceId::new("default");
    let mut submitted = Vec::with_capacity(workload.tablets);

    for t in 0..workload.tablets {
        let dir = tablet_dir(t);
        let tablet = Arc::new(MemoryTablet::new(format!("7;t{t}"), dir.as_str())?);
        let files = (0..workload.files_per_tablet)
            .map(|f| TabletFile::new(format!("{dir}/F{f:07}.rf")))
            .collect::<Result<Vec<_>>>()?;
        tablet.add_files(files.iter().cloned())?;

        let mut jobs = Vec::new();
        for chunk in files.chunks(workload.files_per_job) {
            let executor = workload
                .executors
                .choose(rng)
                .map(|name| CompactionExecutorId::external(name.as_str()))
                .transpose()?
                .ok_or_else(|| CompactionError::Config("workload has no executors".to_owned()))?;
            let job = CompactionJob::builder()
                .files(chunk.iter().cloned())
                .kind(CompactionKind::System)
                .priority(rng.random_range(workload.priorities.clone()))
                .executor(executor)
                .build()?;
            jobs.push(manager.submit(
                service.clone(),
                job,
                tablet.clone(),
                Box::new(|_: &Arc<dyn Compactable>| {}),
            )?);
        }
        submitted.push(SubmittedTablet { tablet, jobs });
    }
    Ok(submitted)
}

/// Polls like a compactor until every queue is empty: pick the queue with the
/// most urgent job and ask for exactly that priority.
pub async fn run_compactor(
    manager: Arc<CompactionManager>,
    compactor_id: String,
) -> Result<Vec<ExternalCompactionJob>> {
    let mut reserved = Vec::new();
    loop {
        let summaries = manager.compaction_queue_summaries();
        let Some(best) = summaries.iter().max_by_key(|s| s.top_priority) else {
            break;
        };
        let job = manager
            .reserve_external_compaction(
                &best.executor_name,
                best.top_priority,
                &compactor_id,
                ExternalCompactionId::generate(),
            )
            .await?;
        if let Some(job) = job {
            reserved.push(job);
        }
        tokio::task::yield_now().await;
    }
    Ok(reserved)
}

/// Runs `compactors` polling tasks to completion and returns every reservation
/// they made.
pub async fn drain(
    manager: Arc<CompactionManager>,
    compactors: usize,
) -> anyhow::Result<Vec<ExternalCompactionJob>> {
    let tasks = (0..compactors)
        .map(|i| tokio::spawn(run_compactor(manager.clone(), format!("compactor-{i}:9133"))))
        .collect::<Vec<_>>();

    let mut reserved = Vec::new();
    for result in futures::future::join_all(tasks).await {
        reserved.extend(result??);
    }
    Ok(reserved)
}
