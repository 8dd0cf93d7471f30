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
    os::raw::c_int,
    path::PathBuf,
};

use crate::{
    backend::{
        common::Condition,
        traits::BackendError,
    },
    error::StoreError,
};

/// LMDB returns EACCES for write transactions on a read-only environment.
const EACCES: c_int = 13;

#[derive(Debug)]
pub enum ErrorImpl {
    LmdbError(lmdb::Error),
    DirectoryDoesNotExistError(PathBuf),
    UnsuitableEnvironmentPath(PathBuf),
    IoError(io::Error),
}

impl ErrorImpl {
    pub(crate) fn from_code(code: c_int) -> ErrorImpl {
        ErrorImpl::LmdbError(lmdb::Error::from_err_code(code))
    }
}

/// Turn an LMDB status code into a `Result`.
pub(crate) fn lmdb_result(code: c_int) -> Result<(), ErrorImpl> {
    if code == 0 {
        Ok(())
    } else {
        Err(ErrorImpl::from_code(code))
    }
}

impl BackendError for ErrorImpl {
    fn condition(&self) -> Condition {
        match self {
            ErrorImpl::LmdbError(lmdb::Error::NotFound) => Condition::NotFound,
            ErrorImpl::LmdbError(lmdb::Error::KeyExist) => Condition::KeyExist,
            ErrorImpl::LmdbError(lmdb::Error::MapFull) => Condition::MapFull,
            ErrorImpl::LmdbError(lmdb::Error::MapResized) => Condition::MapResized,
            ErrorImpl::LmdbError(lmdb::Error::ReadersFull) => Condition::ReadersFull,
            _ => Condition::Other,
        }
    }
}

impl fmt::Display for ErrorImpl {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorImpl::LmdbError(e) => e.fmt(fmt),
            ErrorImpl::DirectoryDoesNotExistError(path) => write!(fmt, "DirectoryDoesNotExistError: {:?}", path),
            ErrorImpl::UnsuitableEnvironmentPath(path) => write!(fmt, "UnsuitableEnvironmentPath: {:?}", path),
            ErrorImpl::IoError(e) => e.fmt(fmt),
        }
    }
}

impl From<ErrorImpl> for StoreError {
    fn from(e: ErrorImpl) -> StoreError {
        match e {
            ErrorImpl::LmdbError(lmdb::Error::MapFull) => StoreError::MapFull,
            ErrorImpl::LmdbError(lmdb::Error::MapResized) => StoreError::MapResized,
            ErrorImpl::LmdbError(lmdb::Error::ReadersFull) => StoreError::ReadersFull,
            ErrorImpl::LmdbError(lmdb::Error::Corrupted) => StoreError::DatabaseCorrupted,
            ErrorImpl::LmdbError(lmdb::Error::BadValSize) => StoreError::KeyValuePairBadSize,
            ErrorImpl::LmdbError(lmdb::Error::Other(EACCES)) => StoreError::ReadOnly,
            ErrorImpl::LmdbError(error) => StoreError::LmdbError(error),
            ErrorImpl::DirectoryDoesNotExistError(path) | ErrorImpl::UnsuitableEnvironmentPath(path) => {
                StoreError::UnsuitableEnvironmentPath(path)
            },
            ErrorImpl::IoError(error) => StoreError::IoError(error),
        }
    }
}

impl From<io::Error> for ErrorImpl {
    fn from(e: io::Error) -> ErrorImpl {
        ErrorImpl::IoError(e)
    }
}
