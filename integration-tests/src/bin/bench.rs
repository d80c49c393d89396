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

use rand::SeedableRng;
use rand::rngs::StdRng;
use tablet_compaction_integration_tests::test_utils::{Workload, drain, populate};
use tokio::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Usage:
    // cargo run --bin bench -- [compactors] [tablets] [rounds]
    let args: Vec<String> = std::env::args().collect();
    let compactors: usize = args.get(1).map(|s| s.parse()).transpose()?.unwrap_or(32);
    let tablets: usize = args.get(2).map(|s| s.parse()).transpose()?.unwrap_or(1_000);
    let rounds: usize = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(5);

    let workload = Workload {
        executors: vec!["small".to_owned(), "medium".to_owned(), "large".to_owned()],
        tablets,
        files_per_tablet: 30,
        files_per_job: 5,
        priorities: -1_000..1_000,
    };

    for round in 0..rounds {
        let manager = Arc::new(workload.manager()?);
        let submit_start = Instant::now();
        populate(&manager, &workload, &mut StdRng::seed_from_u64(round as u64))?;
        let submit_elapsed = submit_start.elapsed();

        let reserve_start = Instant::now();
        let reserved = drain(manager.clone(), compactors).await?;
        let reserve_elapsed = reserve_start.elapsed();

        anyhow::ensure!(
            reserved.len() == workload.job_count(),
            "reserved {} of {} jobs",
            reserved.len(),
            workload.job_count()
        );
        tracing::info!(
            round,
            jobs = reserved.len(),
            compactors,
            submit_ms = submit_elapsed.as_millis() as u64,
            reserve_ms = reserve_elapsed.as_millis() as u64,
            reservations_per_sec = reserved.len() as f64 / reserve_elapsed.as_secs_f64(),
            "bench round finished"
        );
    }

    Ok(())
}
