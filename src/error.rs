// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::{
    io,
    path::PathBuf,
};

use thiserror::Error;

use crate::backend::{
    BackendError,
    SafeModeError,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database corrupted")]
    DatabaseCorrupted,

    #[error("key/value pair has a bad size")]
    KeyValuePairBadSize,

    /// The map could not be grown any further, or the growth budget ran out.
    #[error("environment mapsize reached")]
    MapFull,

    /// Another writer resized the map more often than the retry budget allows.
    #[error("environment mapsize changed by another writer")]
    MapResized,

    #[error("environment maxreaders reached")]
    ReadersFull,

    #[error("attempted to write to a read-only environment")]
    ReadOnly,

    #[error("unsuitable environment path: {0:?}")]
    UnsuitableEnvironmentPath(PathBuf),

    #[error("I/O error: {0:?}")]
    IoError(#[from] io::Error),

    /// The bulk transaction was discarded and begun again after the map was
    /// resized. Every write made since the batch started must be replayed.
    #[error("bulk transaction restarted; replay the batch")]
    TransactionRestarted,

    #[cfg(feature = "lmdb")]
    #[error("lmdb error: {0}")]
    LmdbError(lmdb::Error),

    #[error("safe mode error: {0}")]
    SafeModeError(SafeModeError),
}

impl StoreError {
    pub(crate) fn from_backend<E: BackendError>(error: E) -> StoreError {
        error.into()
    }

    /// Whether this error is one of the conditions recovery handles, surfacing
    /// only because its retry budget ran out.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, StoreError::MapFull | StoreError::MapResized | StoreError::ReadersFull)
    }
}
