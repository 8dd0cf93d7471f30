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
    os::raw::c_uint,
    ptr,
    rc::Rc,
    slice,
};

use lmdb_sys as ffi;

use super::{
    environment::EnvHandle,
    error::lmdb_result,
    DatabaseImpl,
    ErrorImpl,
};
use crate::backend::{
    common::WriteFlags,
    traits::BackendTransaction,
};

pub(crate) fn val(data: &[u8]) -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: data.len() as _,
        mv_data: data.as_ptr() as *mut _,
    }
}

pub(crate) fn empty_val() -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: 0,
        mv_data: ptr::null_mut(),
    }
}

/// Copy the bytes LMDB points at; they are only valid until the next update.
pub(crate) unsafe fn to_vec(val: &ffi::MDB_val) -> Vec<u8> {
    if val.mv_data.is_null() {
        return Vec::new();
    }
    slice::from_raw_parts(val.mv_data as *const u8, val.mv_size as usize).to_vec()
}

#[derive(Debug)]
pub struct TransactionImpl {
    txn: *mut ffi::MDB_txn,
    _env: Rc<EnvHandle>,
}

impl TransactionImpl {
    pub(crate) fn new(txn: *mut ffi::MDB_txn, env: Rc<EnvHandle>) -> TransactionImpl {
        TransactionImpl {
            txn,
            _env: env,
        }
    }

    pub(crate) fn txn(&self) -> *mut ffi::MDB_txn {
        self.txn
    }
}

impl Drop for TransactionImpl {
    fn drop(&mut self) {
        if !self.txn.is_null() {
            unsafe { ffi::mdb_txn_abort(self.txn) }
        }
    }
}

impl BackendTransaction for TransactionImpl {
    type Database = DatabaseImpl;
    type Error = ErrorImpl;

    fn get(&self, db: Self::Database, key: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let mut key = val(key);
        let mut data = empty_val();
        lmdb_result(unsafe { ffi::mdb_get(self.txn, db.0, &mut key, &mut data) })?;
        Ok(unsafe { to_vec(&data) })
    }

    fn put(&mut self, db: Self::Database, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<(), Self::Error> {
        let mut key = val(key);
        let mut data = val(value);
        lmdb_result(unsafe { ffi::mdb_put(self.txn, db.0, &mut key, &mut data, flags.bits() as c_uint) })
    }

    fn del(&mut self, db: Self::Database, key: &[u8]) -> Result<(), Self::Error> {
        let mut key = val(key);
        lmdb_result(unsafe { ffi::mdb_del(self.txn, db.0, &mut key, ptr::null_mut()) })
    }

    fn clear_db(&mut self, db: Self::Database) -> Result<(), Self::Error> {
        lmdb_result(unsafe { ffi::mdb_drop(self.txn, db.0, 0) })
    }

    fn commit(mut self) -> Result<(), Self::Error> {
        // The transaction is freed whether or not the commit succeeds.
        let txn = std::mem::replace(&mut self.txn, ptr::null_mut());
        lmdb_result(unsafe { ffi::mdb_txn_commit(txn) })
    }

    fn abort(self) {
        // dropped
    }
}
