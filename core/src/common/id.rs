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

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::{CompactionError, Result};

const ECID_PREFIX: &str = "ECID:";
const EXTERNAL_EXECUTOR_PREFIX: &str = "e.";

/// Identifier issued by the coordinator for a single external compaction.
///
/// The canonical text form is `ECID:<uuid>`, which is also how the id is
/// keyed in persisted tablet metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalCompactionId(Uuid);

impl ExternalCompactionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ExternalCompactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", ECID_PREFIX, self.0)
    }
}

impl FromStr for ExternalCompactionId {
    type Err = CompactionError;

    fn from_str(s: &str) -> Result<Self> {
        let uuid = s
            .strip_prefix(ECID_PREFIX)
            .ok_or_else(|| CompactionError::InvalidId(format!("missing `{ECID_PREFIX}` in {s}")))?;
        Uuid::parse_str(uuid)
            .map(Self)
            .map_err(|e| CompactionError::InvalidId(format!("{s}: {e}")))
    }
}

/// Identity of an external compaction executor, i.e. the queue compactors poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactionExecutorId(String);

impl CompactionExecutorId {
    /// Creates the id of the external executor serving queue `name`.
    pub fn external(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(CompactionError::InvalidId(format!(
                "invalid external executor name {name:?}"
            )));
        }
        Ok(Self(name))
    }

    /// Queue name as seen by compactors and the coordinator.
    pub fn external_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompactionExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", EXTERNAL_EXECUTOR_PREFIX, self.0)
    }
}

impl FromStr for CompactionExecutorId {
    type Err = CompactionError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.strip_prefix(EXTERNAL_EXECUTOR_PREFIX).ok_or_else(|| {
            CompactionError::InvalidId(format!(
                "executor id {s:?} is not an external executor id"
            ))
        })?;
        Self::external(name)
    }
}

/// Name of the compaction service a job was planned by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompactionServiceId(String);

impl CompactionServiceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompactionServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecid_text_form() {
        let ecid = ExternalCompactionId::generate();
        let text = ecid.to_string();
        assert!(text.starts_with("ECID:"));
        assert_eq!(text.parse::<ExternalCompactionId>().unwrap(), ecid);
    }

    #[test]
    fn test_ecid_rejects_bare_uuid() {
        let bare = Uuid::new_v4().to_string();
        assert!(matches!(
            bare.parse::<ExternalCompactionId>(),
            Err(CompactionError::InvalidId(_))
        ));
        assert!("ECID:not-a-uuid".parse::<ExternalCompactionId>().is_err());
    }

    #[test]
    fn test_executor_id_external_name() {
        let id = CompactionExecutorId::external("DCQ1").unwrap();
        assert_eq!(id.external_name(), "DCQ1");
        assert_eq!(id.to_string(), "e.DCQ1");
        assert_eq!("e.DCQ1".parse::<CompactionExecutorId>().unwrap(), id);
    }

    #[test]
    fn test_executor_id_validation() {
        assert!(CompactionExecutorId::external("").is_err());
        assert!(CompactionExecutorId::external("two words").is_err());
        assert!("i.small".parse::<CompactionExecutorId>().is_err());
    }
}
