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
    fmt::{
        Debug,
        Display,
    },
    os::unix::io::RawFd,
    path::{
        Path,
        PathBuf,
    },
    sync::Arc,
};

use crate::{
    backend::common::{
        Condition,
        CursorOp,
        EnvironmentFlags,
        WriteFlags,
    },
    error::StoreError,
};

/// Callback for internal invariant violations reported by the engine. It runs
/// synchronously inside the engine call that detected the problem.
pub type AssertFn = Arc<dyn Fn(&str) + Send + Sync>;

pub trait BackendError: Debug + Display + Into<StoreError> {
    fn condition(&self) -> Condition;
}

pub trait BackendDatabase: Debug + Copy {}

/// An engine environment. Transactions and cursors keep the environment alive,
/// so dropping the last of them after the environment closes it.
pub trait BackendEnvironment: Debug + Sized {
    type Error: BackendError;
    type Database: BackendDatabase;
    type Transaction: BackendTransaction<Database = Self::Database, Error = Self::Error>;
    type Cursor: BackendCursor<Error = Self::Error>;

    fn create() -> Result<Self, Self::Error>;

    /// The file whose size reflects the current database size.
    fn data_path(path: &Path, flags: EnvironmentFlags) -> PathBuf;

    /// Set the memory map size; zero adopts the size currently in effect for
    /// the database, which another writer may have changed.
    fn set_map_size(&self, size: usize) -> Result<(), Self::Error>;

    fn open(&mut self, path: &Path, flags: EnvironmentFlags, mode: u32) -> Result<(), Self::Error>;

    fn fd(&self) -> Result<RawFd, Self::Error>;

    fn map_size(&self) -> Result<usize, Self::Error>;

    fn set_assert_fn(&mut self, assert_fn: Option<AssertFn>) -> Result<(), Self::Error>;

    fn begin_txn(&self, read_only: bool) -> Result<Self::Transaction, Self::Error>;

    fn open_db(&self, txn: &Self::Transaction) -> Result<Self::Database, Self::Error>;

    fn open_cursor(&self, txn: &Self::Transaction, db: Self::Database) -> Result<Self::Cursor, Self::Error>;
}

/// Dropping a transaction that was neither committed nor aborted aborts it.
pub trait BackendTransaction: Debug + Sized {
    type Error: BackendError;
    type Database: BackendDatabase;

    fn get(&self, db: Self::Database, key: &[u8]) -> Result<Vec<u8>, Self::Error>;

    fn put(&mut self, db: Self::Database, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<(), Self::Error>;

    fn del(&mut self, db: Self::Database, key: &[u8]) -> Result<(), Self::Error>;

    fn clear_db(&mut self, db: Self::Database) -> Result<(), Self::Error>;

    fn commit(self) -> Result<(), Self::Error>;

    fn abort(self);
}

/// Dropping a cursor closes it.
pub trait BackendCursor: Debug {
    type Error: BackendError;

    #[allow(clippy::type_complexity)]
    fn get(&mut self, key: Option<&[u8]>, op: CursorOp) -> Result<(Vec<u8>, Vec<u8>), Self::Error>;
}
