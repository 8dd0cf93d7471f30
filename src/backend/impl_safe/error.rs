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
    fmt,
    io,
    path::PathBuf,
};

use bincode::Error as BincodeError;

use crate::{
    backend::{
        common::Condition,
        traits::BackendError,
    },
    error::StoreError,
};

#[derive(Debug)]
pub enum ErrorImpl {
    KeyValuePairNotFound,
    KeyExist,
    KeyValuePairBadSize,
    MapFull,
    MapResized,
    ReadersFull,
    EnvPoisonError,
    EnvNotOpen,
    EnvReadOnly,
    MapSizeInUse,
    TxnPoisonError,
    WriterBusy,
    DatabaseCorrupted,
    DirectoryDoesNotExistError(PathBuf),
    IoError(io::Error),
    BincodeError(BincodeError),
}

impl ErrorImpl {
    /// The error an injected fault with the given condition produces.
    pub(crate) fn from_condition(condition: Condition) -> ErrorImpl {
        match condition {
            Condition::NotFound => ErrorImpl::KeyValuePairNotFound,
            Condition::KeyExist => ErrorImpl::KeyExist,
            Condition::MapFull => ErrorImpl::MapFull,
            Condition::MapResized => ErrorImpl::MapResized,
            Condition::ReadersFull => ErrorImpl::ReadersFull,
            Condition::Other => ErrorImpl::DatabaseCorrupted,
        }
    }
}

impl BackendError for ErrorImpl {
    fn condition(&self) -> Condition {
        match self {
            ErrorImpl::KeyValuePairNotFound => Condition::NotFound,
            ErrorImpl::KeyExist => Condition::KeyExist,
            ErrorImpl::MapFull => Condition::MapFull,
            ErrorImpl::MapResized => Condition::MapResized,
            ErrorImpl::ReadersFull => Condition::ReadersFull,
            _ => Condition::Other,
        }
    }
}

impl fmt::Display for ErrorImpl {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorImpl::KeyValuePairNotFound => write!(fmt, "KeyValuePairNotFound (safe mode)"),
            ErrorImpl::KeyExist => write!(fmt, "KeyExist (safe mode)"),
            ErrorImpl::KeyValuePairBadSize => write!(fmt, "KeyValuePairBadSize (safe mode)"),
            ErrorImpl::MapFull => write!(fmt, "MapFull (safe mode)"),
            ErrorImpl::MapResized => write!(fmt, "MapResized (safe mode)"),
            ErrorImpl::ReadersFull => write!(fmt, "ReadersFull (safe mode)"),
            ErrorImpl::EnvPoisonError => write!(fmt, "EnvPoisonError (safe mode)"),
            ErrorImpl::EnvNotOpen => write!(fmt, "EnvNotOpen (safe mode)"),
            ErrorImpl::EnvReadOnly => write!(fmt, "EnvReadOnly (safe mode)"),
            ErrorImpl::MapSizeInUse => write!(fmt, "MapSizeInUse (safe mode)"),
            ErrorImpl::TxnPoisonError => write!(fmt, "TxnPoisonError (safe mode)"),
            ErrorImpl::WriterBusy => write!(fmt, "WriterBusy (safe mode)"),
            ErrorImpl::DatabaseCorrupted => write!(fmt, "DatabaseCorrupted (safe mode)"),
            ErrorImpl::DirectoryDoesNotExistError(path) => write!(fmt, "DirectoryDoesNotExistError (safe mode): {:?}", path),
            ErrorImpl::IoError(e) => e.fmt(fmt),
            ErrorImpl::BincodeError(e) => e.fmt(fmt),
        }
    }
}

impl From<ErrorImpl> for StoreError {
    fn from(e: ErrorImpl) -> StoreError {
        match e {
            ErrorImpl::MapFull => StoreError::MapFull,
            ErrorImpl::MapResized => StoreError::MapResized,
            ErrorImpl::ReadersFull => StoreError::ReadersFull,
            ErrorImpl::KeyValuePairBadSize => StoreError::KeyValuePairBadSize,
            ErrorImpl::EnvReadOnly => StoreError::ReadOnly,
            ErrorImpl::DatabaseCorrupted | ErrorImpl::BincodeError(_) => StoreError::DatabaseCorrupted,
            ErrorImpl::DirectoryDoesNotExistError(path) => StoreError::UnsuitableEnvironmentPath(path),
            ErrorImpl::IoError(error) => StoreError::IoError(error),
            error => StoreError::SafeModeError(error),
        }
    }
}

impl From<io::Error> for ErrorImpl {
    fn from(e: io::Error) -> ErrorImpl {
        ErrorImpl::IoError(e)
    }
}

impl From<BincodeError> for ErrorImpl {
    fn from(e: BincodeError) -> ErrorImpl {
        ErrorImpl::BincodeError(e)
    }
}
