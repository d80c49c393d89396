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
use std::ops::Range;
use std::str::FromStr;

use crate::{CompactionError, Result};

const TABLES_DIR: &str = "tables";

/// Reference to a data file owned by a tablet.
///
/// The path must have the layout `<volume...>/tables/<tableId>/<tabletDir>/<fileName>`.
/// Equality, ordering and hashing only look at the full path.
#[derive(Debug, Clone)]
pub struct TabletFile {
    path: String,
    table_id: Range<usize>,
    tablet_dir: Range<usize>,
    file_name: Range<usize>,
}

impl TabletFile {
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let invalid = |reason: &str| CompactionError::InvalidFile(format!("{path:?}: {reason}"));

        if path.ends_with('/') {
            return Err(invalid("path ends with a separator"));
        }

        let mut parts = path.rsplitn(5, '/');
        let (Some(file_name), Some(tablet_dir), Some(table_id), Some(tables), Some(volume)) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(invalid("too few path components"));
        };

        if tables != TABLES_DIR {
            return Err(invalid("missing tables directory"));
        }
        if volume.is_empty() || table_id.is_empty() || tablet_dir.is_empty() || file_name.is_empty()
        {
            return Err(invalid("empty path component"));
        }

        let file_start = path.len() - file_name.len();
        let dir_start = file_start - 1 - tablet_dir.len();
        let table_start = dir_start - 1 - table_id.len();

        Ok(Self {
            table_id: table_start..table_start + table_id.len(),
            tablet_dir: dir_start..dir_start + tablet_dir.len(),
            file_name: file_start..path.len(),
            path,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn table_id(&self) -> &str {
        &self.path[self.table_id.clone()]
    }

    pub fn tablet_dir(&self) -> &str {
        &self.path[self.tablet_dir.clone()]
    }

    pub fn file_name(&self) -> &str {
        &self.path[self.file_name.clone()]
    }

    /// Path of the directory holding this file, without a trailing separator.
    pub fn dir(&self) -> &str {
        &self.path[..self.file_name.start - 1]
    }

    /// Another file in the same tablet directory.
    pub fn sibling(&self, file_name: &str) -> Result<Self> {
        Self::new(format!("{}/{}", self.dir(), file_name))
    }
}

impl PartialEq for TabletFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for TabletFile {}

impl std::hash::Hash for TabletFile {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for TabletFile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TabletFile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Display for TabletFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl FromStr for TabletFile {
    type Err = CompactionError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
