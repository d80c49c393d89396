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

use derive_builder::UninitializedFieldError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompactionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Invalid tablet file: {0}")]
    InvalidFile(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Reservation failed: {0}")]
    Reservation(String),

    #[error("Unknown compaction executor: {0}")]
    UnknownExecutor(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<UninitializedFieldError> for CompactionError {
    fn from(e: UninitializedFieldError) -> Self {
        CompactionError::Validation(format!("missing required field `{}`", e.field_name()))
    }
}

pub type Result<T> = std::result::Result<T, CompactionError>;
