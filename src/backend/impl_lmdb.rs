// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

mod cursor;
mod environment;
mod error;
mod transaction;

use lmdb_sys as ffi;

use crate::backend::traits::BackendDatabase;

pub use cursor::CursorImpl;
pub use environment::EnvironmentImpl;
pub use error::ErrorImpl;
pub use transaction::TransactionImpl;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct DatabaseImpl(pub(crate) ffi::MDB_dbi);

impl BackendDatabase for DatabaseImpl {}
