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

//! JSON form of [`ExternalCompactionMetadata`].
//!
//! Records are persisted in tablet metadata and must stay readable across
//! versions. Field names below are part of the stored format: never rename or
//! remove one, and give every new field a default.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{DeserializeAs, DisplayFromStr, SerializeAs, serde_as};

use super::ExternalCompactionMetadata;
use crate::CompactionError;
use crate::common::{CompactionExecutorId, TabletFile};
use crate::job::CompactionKind;

#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonData {
    #[serde_as(as = "BTreeSet<DisplayFromStr>")]
    inputs: BTreeSet<TabletFile>,
    #[serde_as(as = "BTreeSet<DisplayFromStr>")]
    next_files: BTreeSet<TabletFile>,
    #[serde_as(as = "DisplayFromStr")]
    tmp: TabletFile,
    #[serde_as(as = "DisplayFromStr")]
    dest: TabletFile,
    compactor: String,
    kind: CompactionKind,
    #[serde_as(as = "ExternalName")]
    executor_id: CompactionExecutorId,
    priority: i64,
    prop_dels: bool,
    selected_all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compaction_id: Option<i64>,
}

/// Executor ids are stored by their bare external name.
struct ExternalName;

impl SerializeAs<CompactionExecutorId> for ExternalName {
    fn serialize_as<S>(source: &CompactionExecutorId, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(source.external_name())
    }
}

impl<'de> DeserializeAs<'de, CompactionExecutorId> for ExternalName {
    fn deserialize_as<D>(deserializer: D) -> Result<CompactionExecutorId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        CompactionExecutorId::external(name).map_err(serde::de::Error::custom)
    }
}

impl ExternalCompactionMetadata {
    /// Encodes the record in its stored form.
    ///
    /// Every field maps to a JSON string, number, bool or array of strings, so
    /// this does not fail for a record that passed the builder's checks. The
    /// `Result` mirrors `serde_json::to_string` and lets callers that persist
    /// the record use `?` alongside their storage errors.
    pub fn to_json(&self) -> crate::Result<String> {
        let data = JsonData {
            inputs: self.job_files.clone(),
            next_files: self.next_files.clone(),
            tmp: self.compact_tmp_name.clone(),
            dest: self.new_file.clone(),
            compactor: self.compactor_id.clone(),
            kind: self.kind,
            executor_id: self.executor.clone(),
            priority: self.priority,
            prop_dels: self.propagate_deletes,
            selected_all: self.selected_all,
            compaction_id: self.compaction_id,
        };
        Ok(serde_json::to_string(&data)?)
    }

    /// Decodes a stored record.
    ///
    /// Malformed JSON, a missing required field and a record that parses but
    /// breaks a metadata invariant all fail with
    /// [`CompactionError::Deserialization`].
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let data: JsonData = serde_json::from_str(json)?;

        let builder = Self::builder()
            .job_files(data.inputs)
            .next_files(data.next_files)
            .compact_tmp_name(data.tmp)
            .new_file(data.dest)
            .compactor_id(data.compactor)
            .kind(data.kind)
            .priority(data.priority)
            .executor(data.executor_id)
            .propagate_deletes(data.prop_dels)
            .selected_all(data.selected_all);
        let built = match data.compaction_id {
            Some(id) => builder.compaction_id(id).build(),
            None => builder.build(),
        };
        built.map_err(|e| match e {
            CompactionError::Validation(reason) => {
                CompactionError::Deserialization(serde::de::Error::custom(reason))
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::test_utils::{executor_id, tablet_file};

    fn metadata(compaction_id: Option<i64>) -> ExternalCompactionMetadata {
        let builder = ExternalCompactionMetadata::builder()
            .job_files([tablet_file("F0003.rf"), tablet_file("F0001.rf")])
            .next_files([tablet_file("F0007.rf"), tablet_file("F0005.rf")])
            .compact_tmp_name(tablet_file("A0009.rf_tmp"))
            .new_file(tablet_file("A0009.rf"))
            .compactor_id("localhost:9133")
            .kind(CompactionKind::Selector)
            .priority(-3)
            .executor(executor_id("DCQ1"))
            .propagate_deletes(true)
            .selected_all(true);
        match compaction_id {
            Some(id) => builder.compaction_id(id).build().unwrap(),
            None => builder.build().unwrap(),
        }
    }

    #[test]
    fn test_round_trip() {
        for compaction_id in [None, Some(17)] {
            let original = metadata(compaction_id);
            let json = original.to_json().unwrap();
            let decoded = ExternalCompactionMetadata::from_json(&json).unwrap();

            assert_eq!(decoded, original);
            assert_eq!(decoded.compaction_id(), compaction_id);
            assert_eq!(decoded.executor().external_name(), "DCQ1");
        }
    }

    #[test]
    fn test_field_names_are_stable() {
        let json = metadata(Some(5)).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        let object = value.as_object().unwrap();

        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "compactionId",
                "compactor",
                "dest",
                "executorId",
                "inputs",
                "kind",
                "nextFiles",
                "priority",
                "propDels",
                "selectedAll",
                "tmp",
            ]
        );
        assert_eq!(object["kind"], "SELECTOR");
        assert_eq!(object["executorId"], "DCQ1");
        assert_eq!(object["dest"], tablet_file("A0009.rf").path());
    }

    #[test]
    fn test_absent_commit_id_is_not_written() {
        let json = metadata(None).to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("compactionId").is_none());
    }

    #[test]
    fn test_file_order_does_not_matter() {
        let json = format!(
            r#"{{"inputs":["{a}","{b}"],"nextFiles":[],"tmp":"{tmp}","dest":"{dest}",
                "compactor":"c1","kind":"SYSTEM","executorId":"q","priority":1,
                "propDels":false,"selectedAll":false}}"#,
            a = tablet_file("F2.rf"),
            b = tablet_file("F1.rf"),
            tmp = tablet_file("A3.rf_tmp"),
            dest = tablet_file("A3.rf"),
        );
        let decoded = ExternalCompactionMetadata::from_json(&json).unwrap();
        let expected: BTreeSet<_> = [tablet_file("F1.rf"), tablet_file("F2.rf")].into();
        assert_eq!(decoded.job_files(), &expected);
        assert!(decoded.next_files().is_empty());
        assert_eq!(decoded.compaction_id(), None);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let mut value: Value = serde_json::from_str(&metadata(None).to_json().unwrap()).unwrap();
        value["addedInSomeLaterVersion"] = Value::from(vec![1, 2, 3]);
        let decoded = ExternalCompactionMetadata::from_json(&value.to_string()).unwrap();
        assert_eq!(decoded, metadata(None));
    }

    #[test]
    fn test_null_commit_id_reads_as_absent() {
        let mut value: Value = serde_json::from_str(&metadata(None).to_json().unwrap()).unwrap();
        value["compactionId"] = Value::Null;
        let decoded = ExternalCompactionMetadata::from_json(&value.to_string()).unwrap();
        assert_eq!(decoded.compaction_id(), None);
    }

    #[test]
    fn test_missing_required_field_fails() {
        for field in ["inputs", "nextFiles", "tmp", "dest", "compactor", "kind", "priority"] {
            let mut value: Value =
                serde_json::from_str(&metadata(None).to_json().unwrap()).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let result = ExternalCompactionMetadata::from_json(&value.to_string());
            assert!(
                matches!(result, Err(CompactionError::Deserialization(_))),
                "removing {field} should fail to decode"
            );
        }
    }

    #[test]
    fn test_malformed_values_fail() {
        let cases = [
            ("kind", Value::from("MAJOR")),
            ("priority", Value::from("high")),
            ("dest", Value::from("not/a/tablet/file")),
            ("executorId", Value::from("")),
            ("inputs", Value::from("F1.rf")),
        ];
        for (field, bad) in cases {
            let mut value: Value =
                serde_json::from_str(&metadata(None).to_json().unwrap()).unwrap();
            value[field] = bad;
            let result = ExternalCompactionMetadata::from_json(&value.to_string());
            assert!(
                matches!(result, Err(CompactionError::Deserialization(_))),
                "bad {field} should fail to decode"
            );
        }
        assert!(ExternalCompactionMetadata::from_json("not json").is_err());
    }

    #[test]
    fn test_encoding_a_valid_record_succeeds() {
        for compaction_id in [None, Some(0), Some(i64::MAX)] {
            let json = metadata(compaction_id).to_json().unwrap();
            assert!(serde_json::from_str::<Value>(&json).unwrap().is_object());
        }
    }

    #[test]
    fn test_records_breaking_invariants_fail_to_decode() {
        let base: Value = serde_json::from_str(&metadata(None).to_json().unwrap()).unwrap();
        let input = Value::from(tablet_file("F0001.rf").path());
        let cases = [
            ("inputs", Value::Array(Vec::new())),
            ("tmp", base["dest"].clone()),
            ("nextFiles", Value::Array(vec![input])),
            ("compactor", Value::from("")),
        ];
        for (field, bad) in cases {
            let mut value = base.clone();
            value[field] = bad;
            let result = ExternalCompactionMetadata::from_json(&value.to_string());
            match result {
                Err(CompactionError::Deserialization(e)) => assert!(e.is_data(), "{e}"),
                other => panic!("bad {field} should fail to decode, got {other:?}"),
            }
        }
    }
}
