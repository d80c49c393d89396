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

//! Runs a few in-memory tablets against a pool of simulated compactors.
//!
//! Usage: `cargo run -p memory-tablet-demo -- [config.json]`

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use rand::Rng;
use tablet_compaction_core::{
    Compactable, CompactionExecutorId, CompactionJob, CompactionKind, CompactionManager,
    CompactionManagerConfig, CompactionServiceId, ExternalCompactionId, JobStatus, MemoryTablet,
    SubmittedJob, TabletFile,
};

const VOLUME: &str = "file:/tmp/accumulo";
const TABLETS: usize = 3;
const FILES_PER_TABLET: usize = 8;
const COMPACTORS: usize = 4;

fn load_config() -> anyhow::Result<CompactionManagerConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => CompactionManagerConfig::builder()
            .executors(["small", "large"])
            .build()?,
    };
    config.validate()?;
    Ok(config)
}

fn tablet_dir(t: usize) -> String {
    format!("{VOLUME}/tables/2/t-{t:04}")
}

/// Plans pairs of files for every tablet, larger pairs go to the last queue.
fn plan(
    manager: &CompactionManager,
    config: &CompactionManagerConfig,
    tablets: &[Arc<MemoryTablet>],
) -> anyhow::Result<Vec<SubmittedJob>> {
    let executors = config.executor_ids()?;
    let mut rng = rand::rng();
    let mut handles = Vec::new();

    for tablet in tablets {
        let files: Vec<TabletFile> = tablet.files().into_iter().collect();
        for (i, pair) in files.chunks(2).enumerate() {
            let executor: &CompactionExecutorId = &executors[i % executors.len()];
            let job = CompactionJob::builder()
                .files(pair.iter().cloned())
                .kind(CompactionKind::System)
                .priority(rng.random_range(0..100))
                .executor(executor.clone())
                .build()?;
            let tablet_id = tablet.tablet_id().to_owned();
            handles.push(manager.submit(
                CompactionServiceId::new("default"),
                job,
                tablet.clone(),
                Box::new(move |_: &Arc<dyn Compactable>| {
                    tracing::info!(tablet = tablet_id.as_str(), "compaction completed");
                }),
            )?);
        }
    }
    Ok(handles)
}

async fn compactor(
    name: String,
    manager: Arc<CompactionManager>,
    tablets: Arc<HashMap<String, Arc<MemoryTablet>>>,
    commit_ids: Arc<AtomicI64>,
) -> anyhow::Result<usize> {
    let mut done = 0;
    loop {
        let summaries = manager.compaction_queue_summaries();
        let Some(best) = summaries.iter().max_by_key(|s| s.top_priority) else {
            return Ok(done);
        };
        let ecid = ExternalCompactionId::generate();
        let Some(reserved) = manager
            .reserve_external_compaction(&best.executor_name, best.top_priority, &name, ecid)
            .await?
        else {
            continue;
        };

        let (pause, fail) = {
            let mut rng = rand::rng();
            (rng.random_range(5..50), rng.random_bool(0.1))
        };
        tokio::time::sleep(Duration::from_millis(pause)).await;

        let tablet_dir = reserved.metadata().new_file().dir().to_owned();
        let tablet = tablets
            .get(&tablet_dir)
            .ok_or_else(|| anyhow::anyhow!("no tablet for {tablet_dir}"))?;
        if fail {
            tablet.fail_external_compaction(&ecid)?;
            tracing::warn!(compactor = name.as_str(), %ecid, "compaction failed");
        } else {
            let commit_id = commit_ids.fetch_add(1, Ordering::Relaxed);
            tablet.commit_external_compaction(&ecid, commit_id)?;
            done += 1;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = load_config()?;
    let manager = Arc::new(CompactionManager::new(config.clone())?);

    let mut tablets = Vec::with_capacity(TABLETS);
    for t in 0..TABLETS {
        let dir = tablet_dir(t);
        let tablet = MemoryTablet::new(format!("2;t{t}"), dir.as_str())?;
        tablet.add_files(
            (0..FILES_PER_TABLET)
                .map(|f| TabletFile::new(format!("{dir}/F{f:07}.rf")))
                .collect::<tablet_compaction_core::Result<Vec<_>>>()?,
        )?;
        tablets.push(Arc::new(tablet));
    }

    let handles = plan(&manager, &config, &tablets)?;
    for summary in manager.compaction_queue_summaries() {
        tracing::info!(?summary, "queue");
    }

    let by_dir: Arc<HashMap<_, _>> = Arc::new(
        tablets
            .iter()
            .enumerate()
            .map(|(t, tablet)| (tablet_dir(t), tablet.clone()))
            .collect(),
    );
    let commit_ids = Arc::new(AtomicI64::new(1));
    let workers: Vec<_> = (0..COMPACTORS)
        .map(|c| {
            tokio::spawn(compactor(
                format!("compactor-{c}:9133"),
                manager.clone(),
                by_dir.clone(),
                commit_ids.clone(),
            ))
        })
        .collect();
    for worker in workers {
        let done = worker.await??;
        tracing::info!(done, "compactor finished");
    }

    let mut by_status: HashMap<JobStatus, usize> = HashMap::new();
    for handle in &handles {
        *by_status.entry(handle.status()).or_default() += 1;
    }
    tracing::info!(?by_status, "job statuses after the run");

    // Simulate a restart of every tablet from what it persisted.
    for (t, tablet) in tablets.iter().enumerate() {
        let (recovered, report) = MemoryTablet::recover(
            tablet.tablet_id(),
            tablet_dir(t),
            tablet.files(),
            tablet.persisted_records(),
        )?;
        tracing::info!(
            tablet = recovered.tablet_id(),
            files = recovered.files().len(),
            recovered = report.recovered.len(),
            committed = report.committed.len(),
            unrecoverable = report.unrecoverable.len(),
            "tablet restarted"
        );
    }

    manager.stop();
    Ok(())
}
