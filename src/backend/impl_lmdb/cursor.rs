// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::rc::Rc;

use lmdb_sys as ffi;

use super::{
    environment::EnvHandle,
    error::lmdb_result,
    transaction::{
        empty_val,
        to_vec,
        val,
    },
    ErrorImpl,
};
use crate::backend::{
    common::CursorOp,
    traits::BackendCursor,
};

/// Must be dropped before the transaction it was opened in ends, unless that
/// transaction is read-only.
#[derive(Debug)]
pub struct CursorImpl {
    cursor: *mut ffi::MDB_cursor,
    _env: Rc<EnvHandle>,
}

impl CursorImpl {
    pub(crate) fn new(cursor: *mut ffi::MDB_cursor, env: Rc<EnvHandle>) -> CursorImpl {
        CursorImpl {
            cursor,
            _env: env,
        }
    }
}

impl Drop for CursorImpl {
    fn drop(&mut self) {
        unsafe { ffi::mdb_cursor_close(self.cursor) }
    }
}

impl BackendCursor for CursorImpl {
    type Error = ErrorImpl;

    fn get(&mut self, key: Option<&[u8]>, op: CursorOp) -> Result<(Vec<u8>, Vec<u8>), Self::Error> {
        let mut key = key.map_or_else(empty_val, val);
        let mut data = empty_val();
        lmdb_result(unsafe { ffi::mdb_cursor_get(self.cursor, &mut key, &mut data, op as u32 as _) })?;
        Ok(unsafe { (to_vec(&key), to_vec(&data)) })
    }
}
