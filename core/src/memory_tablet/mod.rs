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

//! A tablet that keeps its file set and reservation records in memory.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use itertools::Itertools;
use parking_lot::RwLock;

use crate::common::{CompactionServiceId, ExternalCompactionId, TabletFile};
use crate::compactable::Compactable;
use crate::job::{CompactionJob, CompactionKind};
use crate::metadata::ExternalCompactionMetadata;
use crate::{CompactionError, Result};

/// In-memory [`Compactable`].
///
/// Reservation records are persisted as JSON, the same way a tablet stores
/// them in its metadata, so a new tablet can be rebuilt from them with
/// [`MemoryTablet::recover`].
#[derive(Debug)]
pub struct MemoryTablet {
    tablet_id: String,
    dir: String,
    state: RwLock<TabletState>,
}

#[derive(Debug, Default)]
struct TabletState {
    files: BTreeSet<TabletFile>,
    reservations: HashMap<ExternalCompactionId, ExternalCompactionMetadata>,
    persisted: BTreeMap<ExternalCompactionId, String>,
    next_file_seq: u64,
}

/// Outcome of rebuilding a tablet from persisted records.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Reservations that are live again.
    pub recovered: Vec<ExternalCompactionId>,
    /// Records of compactions whose commit was already confirmed.
    pub committed: Vec<ExternalCompactionId>,
    pub unrecoverable: Vec<UnrecoverableRecord>,
}

#[derive(Debug)]
pub struct UnrecoverableRecord {
    /// The key the record was stored under.
    pub key: String,
    pub error: CompactionError,
}

impl MemoryTablet {
    /// Creates an empty tablet whose files live under `dir`, a
    /// `<volume...>/tables/<tableId>/<tabletDir>` path.
    pub fn new(tablet_id: impl Into<String>, dir: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        // Any file name works, this only checks the directory layout.
        TabletFile::new(format!("{dir}/probe"))?;
        Ok(Self {
            tablet_id: tablet_id.into(),
            dir,
            state: RwLock::new(TabletState::default()),
        })
    }

    /// Rebuilds a tablet from its file set and the records it had persisted.
    ///
    /// Records that cannot be decoded, or that consume files the tablet no
    /// longer has, are reported and skipped.
    pub fn recover<F, R>(
        tablet_id: impl Into<String>,
        dir: impl Into<String>,
        files: F,
        records: R,
    ) -> Result<(Self, RecoveryReport)>
    where
        F: IntoIterator<Item = TabletFile>,
        R: IntoIterator<Item = (String, String)>,
    {
        let tablet = Self::new(tablet_id, dir)?;
        tablet.add_files(files)?;

        let mut report = RecoveryReport::default();
        {
            let mut state = tablet.state.write();
            for (key, json) in records {
                let decoded = key.parse::<ExternalCompactionId>().and_then(|ecid| {
                    ExternalCompactionMetadata::from_json(&json).map(|m| (ecid, m))
                });
                let (ecid, metadata) = match decoded {
                    Ok(decoded) => decoded,
                    Err(error) => {
                        tracing::error!(
                            tablet = tablet.tablet_id.as_str(),
                            key = key.as_str(),
                            %error,
                            "unrecoverable external compaction record"
                        );
                        report.unrecoverable.push(UnrecoverableRecord { key, error });
                        continue;
                    }
                };

                state.bump_file_seq(metadata.new_file());
                if metadata.compaction_id().is_some() {
                    state.persisted.insert(ecid, json);
                    report.committed.push(ecid);
                    continue;
                }
                if let Some(missing) = metadata.job_files().difference(&state.files).next() {
                    let error = CompactionError::Reservation(format!(
                        "input {missing} is no longer in the tablet"
                    ));
                    tracing::error!(
                        tablet = tablet.tablet_id.as_str(),
                        key = key.as_str(),
                        %error,
                        "unrecoverable external compaction record"
                    );
                    report.unrecoverable.push(UnrecoverableRecord { key, error });
                    continue;
                }

                state.persisted.insert(ecid, json);
                state.reservations.insert(ecid, metadata);
                report.recovered.push(ecid);
            }
        }

        tracing::info!(
            tablet = tablet.tablet_id.as_str(),
            recovered = report.recovered.len(),
            committed = report.committed.len(),
            unrecoverable = report.unrecoverable.len(),
            "recovered external compactions"
        );
        Ok((tablet, report))
    }

    /// Adds files to the tablet. Every file must live in the tablet directory.
    pub fn add_files<I>(&self, files: I) -> Result<()>
    where
        I: IntoIterator<Item = TabletFile>,
    {
        let files = files.into_iter().collect_vec();
        if let Some(foreign) = files.iter().find(|f| f.dir() != self.dir) {
            return Err(CompactionError::InvalidFile(format!(
                "{foreign} is not in tablet directory {}",
                self.dir
            )));
        }

        let mut state = self.state.write();
        for file in files {
            state.bump_file_seq(&file);
            state.files.insert(file);
        }
        Ok(())
    }

    pub fn files(&self) -> BTreeSet<TabletFile> {
        self.state.read().files.clone()
    }

    pub fn active_reservations(&self) -> Vec<ExternalCompactionId> {
        self.state.read().reservations.keys().copied().sorted().collect()
    }

    /// Persisted reservation records keyed by their reservation id.
    pub fn persisted_records(&self) -> Vec<(String, String)> {
        self.state
            .read()
            .persisted
            .iter()
            .map(|(ecid, json)| (ecid.to_string(), json.clone()))
            .collect()
    }

    /// Applies the output of a finished compaction: the inputs are replaced by
    /// the new file and the record is rewritten with `compaction_id`.
    pub fn commit_external_compaction(
        &self,
        ecid: &ExternalCompactionId,
        compaction_id: i64,
    ) -> Result<ExternalCompactionMetadata> {
        let mut state = self.state.write();
        let metadata = state
            .reservations
            .get(ecid)
            .ok_or_else(|| CompactionError::Reservation(format!("{ecid} is not active")))?;
        let committed = metadata.with_compaction_id(compaction_id);
        let json = committed.to_json()?;

        state.reservations.remove(ecid);
        for input in committed.job_files() {
            state.files.remove(input);
        }
        state.files.insert(committed.new_file().clone());
        state.persisted.insert(*ecid, json);

        tracing::info!(
            tablet = self.tablet_id.as_str(),
            %ecid,
            compaction_id,
            new_file = %committed.new_file(),
            "committed external compaction"
        );
        Ok(committed)
    }

    /// Ends a reservation without touching the file set.
    pub fn fail_external_compaction(&self, ecid: &ExternalCompactionId) -> Result<()> {
        let mut state = self.state.write();
        if state.reservations.remove(ecid).is_none() {
            return Err(CompactionError::Reservation(format!("{ecid} is not active")));
        }
        state.persisted.remove(ecid);
        tracing::warn!(tablet = self.tablet_id.as_str(), %ecid, "external compaction failed");
        Ok(())
    }

    fn file(&self, name: &str) -> Result<TabletFile> {
        TabletFile::new(format!("{}/{name}", self.dir))
    }
}

impl TabletState {
    fn claimed_by(&self, file: &TabletFile) -> Option<&ExternalCompactionId> {
        self.reservations
            .iter()
            .find(|(_, metadata)| metadata.job_files().contains(file))
            .map(|(ecid, _)| ecid)
    }

    /// Keeps allocated output names ahead of every `A<seq>` file seen.
    fn bump_file_seq(&mut self, file: &TabletFile) {
        let seq = file
            .file_name()
            .strip_prefix('A')
            .and_then(|rest| rest.split('.').next())
            .and_then(|digits| digits.parse::<u64>().ok());
        if let Some(seq) = seq {
            self.next_file_seq = self.next_file_seq.max(seq + 1);
        }
    }
}

#[async_trait]
impl Compactable for MemoryTablet {
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
        let mut state = self.state.write();

        if state.reservations.contains_key(ecid) {
            return Err(CompactionError::Reservation(format!(
                "{ecid} is already reserved"
            )));
        }
        for file in job.files() {
            if !state.files.contains(file) {
                return Err(CompactionError::Reservation(format!(
                    "{file} is no longer in tablet {}",
                    self.tablet_id
                )));
            }
            if let Some(other) = state.claimed_by(file) {
                return Err(CompactionError::Reservation(format!(
                    "{file} is already being compacted by {other}"
                )));
            }
        }

        let seq = state.next_file_seq;
        let inputs = job.files();
        let all_files = inputs == &state.files;
        let metadata = ExternalCompactionMetadata::builder()
            .job_files(inputs.iter().cloned())
            .next_files(state.files.difference(inputs).cloned())
            .compact_tmp_name(self.file(&format!("A{seq:07}.rf_tmp"))?)
            .new_file(self.file(&format!("A{seq:07}.rf"))?)
            .compactor_id(compactor_id)
            .kind(job.kind())
            .priority(job.priority())
            .executor(job.executor().clone())
            .propagate_deletes(!all_files)
            .selected_all(job.kind() != CompactionKind::System && all_files)
            .build()?;
        let json = metadata.to_json()?;

        state.next_file_seq = seq + 1;
        state.persisted.insert(*ecid, json);
        state.reservations.insert(*ecid, metadata.clone());
        Ok(metadata)
    }

    fn is_active(&self, ecid: &ExternalCompactionId) -> bool {
        self.state.read().reservations.contains_key(ecid)
    }
}
