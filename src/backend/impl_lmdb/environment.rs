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
    ffi::{
        CStr,
        CString,
    },
    fmt,
    mem::MaybeUninit,
    os::{
        raw::{
            c_char,
            c_uint,
            c_void,
        },
        unix::{
            ffi::OsStrExt,
            io::RawFd,
        },
    },
    panic::{
        self,
        AssertUnwindSafe,
    },
    path::{
        Path,
        PathBuf,
    },
    ptr,
    rc::Rc,
};

use lmdb_sys as ffi;

use super::{
    error::lmdb_result,
    CursorImpl,
    DatabaseImpl,
    ErrorImpl,
    TransactionImpl,
};
use crate::backend::{
    common::EnvironmentFlags,
    traits::{
        AssertFn,
        BackendEnvironment,
    },
};

const DEFAULT_DB_FILENAME: &str = "data.mdb";

/// `MDB_RDONLY` as passed to `mdb_txn_begin`.
const TXN_READ_ONLY: c_uint = 0x2_0000;

/// Owns the `MDB_env`; closed when the environment and every transaction and
/// cursor that refer to it are gone.
pub(crate) struct EnvHandle {
    pub(crate) env: *mut ffi::MDB_env,
    assert_fn: Option<Box<AssertFn>>,
}

impl fmt::Debug for EnvHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("EnvHandle").field("env", &self.env).field("assert_fn", &self.assert_fn.is_some()).finish()
    }
}

impl Drop for EnvHandle {
    fn drop(&mut self) {
        unsafe { ffi::mdb_env_close(self.env) }
    }
}

unsafe extern "C" fn assert_trampoline(env: *mut ffi::MDB_env, msg: *const c_char) {
    let assert_fn = ffi::mdb_env_get_userctx(env) as *const AssertFn;
    if assert_fn.is_null() || msg.is_null() {
        return;
    }
    let msg = CStr::from_ptr(msg).to_string_lossy();
    // Unwinding into C is undefined.
    let _ = panic::catch_unwind(AssertUnwindSafe(|| (*assert_fn)(&msg)));
}

#[derive(Debug)]
pub struct EnvironmentImpl {
    handle: Rc<EnvHandle>,
}

impl EnvironmentImpl {
    fn env(&self) -> *mut ffi::MDB_env {
        self.handle.env
    }
}

impl BackendEnvironment for EnvironmentImpl {
    type Cursor = CursorImpl;
    type Database = DatabaseImpl;
    type Error = ErrorImpl;
    type Transaction = TransactionImpl;

    fn create() -> Result<Self, Self::Error> {
        let mut env = ptr::null_mut();
        lmdb_result(unsafe { ffi::mdb_env_create(&mut env) })?;
        Ok(EnvironmentImpl {
            handle: Rc::new(EnvHandle {
                env,
                assert_fn: None,
            }),
        })
    }

    fn data_path(path: &Path, flags: EnvironmentFlags) -> PathBuf {
        if flags.contains(EnvironmentFlags::NO_SUB_DIR) {
            path.to_path_buf()
        } else {
            path.join(DEFAULT_DB_FILENAME)
        }
    }

    fn set_map_size(&self, size: usize) -> Result<(), Self::Error> {
        lmdb_result(unsafe { ffi::mdb_env_set_mapsize(self.env(), size as _) })
    }

    fn open(&mut self, path: &Path, flags: EnvironmentFlags, mode: u32) -> Result<(), Self::Error> {
        if !flags.contains(EnvironmentFlags::NO_SUB_DIR) && !path.is_dir() {
            return Err(ErrorImpl::DirectoryDoesNotExistError(path.into()));
        }
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| ErrorImpl::UnsuitableEnvironmentPath(path.into()))?;
        // The session cursor's read transaction may be open while a get
        // begins another one on the same thread.
        let flags = flags | EnvironmentFlags::NO_TLS;
        lmdb_result(unsafe { ffi::mdb_env_open(self.env(), c_path.as_ptr(), flags.bits() as c_uint, mode as _) })
    }

    fn fd(&self) -> Result<RawFd, Self::Error> {
        let mut fd = 0;
        lmdb_result(unsafe { ffi::mdb_env_get_fd(self.env(), &mut fd) })?;
        Ok(fd as RawFd)
    }

    fn map_size(&self) -> Result<usize, Self::Error> {
        let mut info = MaybeUninit::<ffi::MDB_envinfo>::uninit();
        lmdb_result(unsafe { ffi::mdb_env_info(self.env(), info.as_mut_ptr()) })?;
        let info = unsafe { info.assume_init() };
        Ok(info.me_mapsize as usize)
    }

    fn set_assert_fn(&mut self, assert_fn: Option<AssertFn>) -> Result<(), Self::Error> {
        // Transactions and cursors share the handle; the callback may only
        // change while nothing else refers to it.
        let handle = Rc::get_mut(&mut self.handle).ok_or(ErrorImpl::LmdbError(lmdb::Error::Invalid))?;
        handle.assert_fn = assert_fn.map(Box::new);
        let ctx = handle.assert_fn.as_deref().map_or(ptr::null_mut(), |f| f as *const AssertFn as *mut c_void);
        lmdb_result(unsafe { ffi::mdb_env_set_userctx(handle.env, ctx) })?;
        let trampoline = if ctx.is_null() {
            None
        } else {
            Some(assert_trampoline as unsafe extern "C" fn(*mut ffi::MDB_env, *const c_char))
        };
        lmdb_result(unsafe { ffi::mdb_env_set_assert(handle.env, trampoline) })
    }

    fn begin_txn(&self, read_only: bool) -> Result<Self::Transaction, Self::Error> {
        let flags = if read_only {
            TXN_READ_ONLY
        } else {
            0
        };
        let mut txn = ptr::null_mut();
        lmdb_result(unsafe { ffi::mdb_txn_begin(self.env(), ptr::null_mut(), flags, &mut txn) })?;
        Ok(TransactionImpl::new(txn, self.handle.clone()))
    }

    fn open_db(&self, txn: &Self::Transaction) -> Result<Self::Database, Self::Error> {
        let mut dbi = 0;
        lmdb_result(unsafe { ffi::mdb_dbi_open(txn.txn(), ptr::null(), 0, &mut dbi) })?;
        Ok(DatabaseImpl(dbi))
    }

    fn open_cursor(&self, txn: &Self::Transaction, db: Self::Database) -> Result<Self::Cursor, Self::Error> {
        let mut cursor = ptr::null_mut();
        lmdb_result(unsafe { ffi::mdb_cursor_open(txn.txn(), db.0, &mut cursor) })?;
        Ok(CursorImpl::new(cursor, self.handle.clone()))
    }
}
