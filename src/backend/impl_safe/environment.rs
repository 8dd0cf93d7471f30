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
    cmp,
    fmt,
    fs::{
        File,
        OpenOptions,
    },
    io::{
        Read,
        Seek,
        SeekFrom,
        Write,
    },
    os::unix::{
        fs::OpenOptionsExt,
        io::{
            AsRawFd,
            RawFd,
        },
    },
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};

use log::{
    debug,
    warn,
};
use serde_derive::{
    Deserialize,
    Serialize,
};

use super::{
    fault::Faults,
    CursorImpl,
    DatabaseImpl,
    ErrorImpl,
    FaultPoint,
    Snapshot,
    TransactionImpl,
};
use crate::backend::{
    common::{
        Condition,
        EnvironmentFlags,
    },
    traits::{
        AssertFn,
        BackendEnvironment,
    },
};

const DEFAULT_DB_FILENAME: &str = "data.safe.bin";

/// LMDB's default map size.
const DEFAULT_MAP_SIZE: usize = 10_485_760;

/// LMDB's default reader table size.
const DEFAULT_MAX_READERS: usize = 126;

#[derive(Deserialize)]
struct Image {
    map_size: u64,
    data: Snapshot,
}

#[derive(Serialize)]
struct ImageRef<'a> {
    map_size: u64,
    data: &'a Snapshot,
}

pub(crate) struct State {
    path: Option<PathBuf>,
    flags: EnvironmentFlags,
    file: Option<File>,
    pub(crate) committed: Arc<Snapshot>,
    /// Size of this environment's mapping.
    pub(crate) map_size: usize,
    /// Size currently recorded for the database, which another writer may
    /// have changed under us.
    live_map_size: usize,
    max_readers: usize,
    pub(crate) faults: Faults,
    assert_fn: Option<AssertFn>,
}

impl fmt::Debug for State {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("State")
            .field("path", &self.path)
            .field("flags", &self.flags)
            .field("map_size", &self.map_size)
            .field("live_map_size", &self.live_map_size)
            .field("entries", &self.committed.len())
            .field("faults", &self.faults)
            .field("assert_fn", &self.assert_fn.is_some())
            .finish()
    }
}

impl State {
    pub(crate) fn is_read_only(&self) -> bool {
        self.flags.contains(EnvironmentFlags::READ_ONLY)
    }

    /// Replace the file contents with `data` and make it the committed state.
    pub(crate) fn write_to_disk(&mut self, data: Arc<Snapshot>) -> Result<(), ErrorImpl> {
        let image = ImageRef {
            map_size: self.map_size as u64,
            data: &data,
        };
        let bytes = bincode::serialize(&image)?;
        let mut file = self.file.as_ref().ok_or(ErrorImpl::EnvNotOpen)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.set_len(bytes.len() as u64)?;
        if !self.flags.contains(EnvironmentFlags::NO_SYNC) {
            file.sync_all()?;
        }
        self.committed = data;
        Ok(())
    }

    fn load(&mut self, bytes: &[u8]) -> Result<(), ErrorImpl> {
        if bytes.is_empty() {
            return Ok(());
        }
        let Image {
            map_size,
            mut data,
        } = bincode::deserialize(bytes)?;
        data.recount();

        let map_size = map_size as usize;
        if data.used_bytes() > map_size {
            let msg = format!("database image holds {} bytes but its map size is {}", data.used_bytes(), map_size);
            match &self.assert_fn {
                Some(assert_fn) => assert_fn(&msg),
                None => warn!("{}", msg),
            }
        }
        if map_size > self.map_size {
            debug!("adopting stored map size {} over {}", map_size, self.map_size);
            self.map_size = map_size;
        }
        self.live_map_size = self.map_size;
        self.committed = Arc::new(data);
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<State>,
    ro_txns: Arc<()>,
    rw_txns: Arc<()>,
}

impl Shared {
    pub(crate) fn state(&self) -> Result<MutexGuard<State>, ErrorImpl> {
        self.state.lock().map_err(|_| ErrorImpl::EnvPoisonError)
    }

    /// State access for instrumentation, which must not fail.
    fn state_unchecked(&self) -> MutexGuard<State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn check_fault(&self, point: FaultPoint) -> Result<(), ErrorImpl> {
        self.state()?.faults.check(point)
    }

    fn readers(&self) -> usize {
        Arc::strong_count(&self.ro_txns) - 1
    }

    fn writers(&self) -> usize {
        Arc::strong_count(&self.rw_txns) - 1
    }
}

/// A pure-Rust engine that keeps the whole database in memory and persists it
/// to a single file on commit. It reproduces the conditions LMDB reports for
/// map exhaustion, foreign resizes and reader table exhaustion, and lets tests
/// script those conditions at any engine entry point.
#[derive(Debug)]
pub struct EnvironmentImpl {
    shared: Arc<Shared>,
}

impl EnvironmentImpl {
    /// Fail `times` consecutive calls at `point` with `condition`, after letting
    /// `skip` calls through.
    pub fn inject_fault(&self, point: FaultPoint, condition: Condition, skip: usize, times: usize) {
        self.shared.state_unchecked().faults.inject(point, condition, skip, times);
    }

    pub fn fail_next(&self, point: FaultPoint, condition: Condition) {
        self.inject_fault(point, condition, 0, 1);
    }

    pub fn clear_faults(&self) {
        self.shared.state_unchecked().faults.clear();
    }

    /// How many times `point` has been entered since the environment was created.
    pub fn call_count(&self, point: FaultPoint) -> usize {
        self.shared.state_unchecked().faults.calls(point)
    }

    /// Record a new map size for the database as another process growing (or
    /// shrinking) it would. The next transaction to begin reports MapResized.
    pub fn simulate_foreign_resize(&self, size: usize) {
        self.shared.state_unchecked().live_map_size = size;
    }

    pub fn set_max_readers(&self, max_readers: usize) {
        self.shared.state_unchecked().max_readers = max_readers;
    }

    /// Transactions begun and not yet committed, aborted or dropped.
    pub fn active_transactions(&self) -> usize {
        self.shared.readers() + self.shared.writers()
    }

    /// Committed entries.
    pub fn len(&self) -> usize {
        self.shared.state_unchecked().committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BackendEnvironment for EnvironmentImpl {
    type Cursor = CursorImpl;
    type Database = DatabaseImpl;
    type Error = ErrorImpl;
    type Transaction = TransactionImpl;

    fn create() -> Result<Self, Self::Error> {
        let state = State {
            path: None,
            flags: EnvironmentFlags::empty(),
            file: None,
            committed: Arc::new(Snapshot::new()),
            map_size: DEFAULT_MAP_SIZE,
            live_map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
            faults: Faults::default(),
            assert_fn: None,
        };
        Ok(EnvironmentImpl {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                ro_txns: Arc::new(()),
                rw_txns: Arc::new(()),
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
        let mut state = self.shared.state()?;
        if state.file.is_none() {
            if size != 0 {
                state.map_size = size;
                state.live_map_size = size;
            }
            return Ok(());
        }
        if self.active_transactions() > 0 {
            return Err(ErrorImpl::MapSizeInUse);
        }
        let size = if size == 0 {
            state.live_map_size
        } else {
            size
        };
        let size = cmp::max(size, state.committed.used_bytes());
        state.map_size = size;
        state.live_map_size = size;
        Ok(())
    }

    fn open(&mut self, path: &Path, flags: EnvironmentFlags, mode: u32) -> Result<(), Self::Error> {
        if !flags.contains(EnvironmentFlags::NO_SUB_DIR) && !path.is_dir() {
            return Err(ErrorImpl::DirectoryDoesNotExistError(path.to_path_buf()));
        }
        let honored =
            EnvironmentFlags::NO_SUB_DIR | EnvironmentFlags::READ_ONLY | EnvironmentFlags::NO_SYNC | EnvironmentFlags::NO_LOCK;
        let ignored = flags - honored;
        if !ignored.is_empty() {
            warn!("Ignoring `{:?}`", ignored);
        }

        let data_path = Self::data_path(path, flags);
        let mut file = if flags.contains(EnvironmentFlags::READ_ONLY) {
            File::open(&data_path)?
        } else {
            OpenOptions::new().read(true).write(true).create(true).mode(mode).open(&data_path)?
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut state = self.shared.state()?;
        state.flags = flags;
        state.load(&bytes)?;
        state.file = Some(file);
        state.path = Some(data_path);
        Ok(())
    }

    fn fd(&self) -> Result<RawFd, Self::Error> {
        let state = self.shared.state()?;
        state.file.as_ref().map(|file| file.as_raw_fd()).ok_or(ErrorImpl::EnvNotOpen)
    }

    fn map_size(&self) -> Result<usize, Self::Error> {
        Ok(self.shared.state()?.map_size)
    }

    fn set_assert_fn(&mut self, assert_fn: Option<AssertFn>) -> Result<(), Self::Error> {
        self.shared.state()?.assert_fn = assert_fn;
        Ok(())
    }

    fn begin_txn(&self, read_only: bool) -> Result<Self::Transaction, Self::Error> {
        let mut state = self.shared.state()?;
        state.faults.check(FaultPoint::Begin)?;
        if state.file.is_none() {
            return Err(ErrorImpl::EnvNotOpen);
        }
        if state.live_map_size != state.map_size {
            return Err(ErrorImpl::MapResized);
        }
        let slot = if read_only {
            if self.shared.readers() >= state.max_readers {
                return Err(ErrorImpl::ReadersFull);
            }
            self.shared.ro_txns.clone()
        } else {
            if state.is_read_only() {
                return Err(ErrorImpl::EnvReadOnly);
            }
            if self.shared.writers() > 0 {
                return Err(ErrorImpl::WriterBusy);
            }
            self.shared.rw_txns.clone()
        };
        Ok(TransactionImpl::new(self.shared.clone(), state.committed.clone(), state.map_size, read_only, slot))
    }

    fn open_db(&self, txn: &Self::Transaction) -> Result<Self::Database, Self::Error> {
        txn.check_usable()?;
        Ok(DatabaseImpl)
    }

    fn open_cursor(&self, txn: &Self::Transaction, _db: Self::Database) -> Result<Self::Cursor, Self::Error> {
        txn.check_usable()?;
        Ok(CursorImpl::new(self.shared.clone(), txn.data()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{
        AtomicUsize,
        Ordering,
    };

    use tempfile::Builder;

    use super::*;
    use crate::backend::{
        common::WriteFlags,
        traits::{
            BackendError,
            BackendTransaction,
        },
    };

    fn open_env(path: &Path) -> EnvironmentImpl {
        let mut env = EnvironmentImpl::create().expect("created");
        env.set_map_size(1 << 20).expect("map size");
        env.open(path, EnvironmentFlags::empty(), 0o644).expect("opened");
        env
    }

    #[test]
    fn test_commit_persists() {
        let root = Builder::new().prefix("test_commit_persists").tempdir().expect("tempdir");
        {
            let env = open_env(root.path());
            let mut txn = env.begin_txn(false).expect("txn");
            let db = env.open_db(&txn).expect("db");
            txn.put(db, b"foo", b"bar", WriteFlags::empty()).expect("put");
            txn.commit().expect("commit");
        }
        let env = open_env(root.path());
        let txn = env.begin_txn(true).expect("txn");
        assert_eq!(txn.get(DatabaseImpl, b"foo").expect("get"), b"bar");
        assert_eq!(env.len(), 1);
    }

    #[test]
    fn test_missing_directory() {
        let root = Builder::new().prefix("test_missing_directory").tempdir().expect("tempdir");
        let mut env = EnvironmentImpl::create().expect("created");
        let err = env.open(&root.path().join("nope"), EnvironmentFlags::empty(), 0o644).expect_err("no dir");
        assert!(matches!(err, ErrorImpl::DirectoryDoesNotExistError(_)));
    }

    #[test]
    fn test_map_full_poisons_transaction() {
        let root = Builder::new().prefix("test_map_full_poisons").tempdir().expect("tempdir");
        let mut env = EnvironmentImpl::create().expect("created");
        env.set_map_size(3 * 4096).expect("map size");
        env.open(root.path(), EnvironmentFlags::empty(), 0o644).expect("opened");

        let mut txn = env.begin_txn(false).expect("txn");
        let err = txn.put(DatabaseImpl, b"big", &[0u8; 8192], WriteFlags::empty()).expect_err("full");
        assert_eq!(err.condition(), Condition::MapFull);
        let err = txn.put(DatabaseImpl, b"small", b"x", WriteFlags::empty()).expect_err("poisoned");
        assert!(matches!(err, ErrorImpl::TxnPoisonError));
        drop(txn);

        env.set_map_size(6 * 4096).expect("grown");
        let mut txn = env.begin_txn(false).expect("txn");
        txn.put(DatabaseImpl, b"big", &[0u8; 8192], WriteFlags::empty()).expect("fits now");
        txn.commit().expect("commit");
    }

    #[test]
    fn test_set_map_size_refused_while_in_use() {
        let root = Builder::new().prefix("test_set_map_size_in_use").tempdir().expect("tempdir");
        let env = open_env(root.path());
        let txn = env.begin_txn(true).expect("txn");
        assert!(matches!(env.set_map_size(2 << 20), Err(ErrorImpl::MapSizeInUse)));
        txn.abort();
        assert_eq!(env.active_transactions(), 0);
        env.set_map_size(2 << 20).expect("resized");
        assert_eq!(env.map_size().expect("map size"), 2 << 20);
    }

    #[test]
    fn test_foreign_resize_is_reported_and_imported() {
        let root = Builder::new().prefix("test_foreign_resize").tempdir().expect("tempdir");
        let env = open_env(root.path());
        env.simulate_foreign_resize(1 << 19);

        let err = env.begin_txn(true).expect_err("resized");
        assert_eq!(err.condition(), Condition::MapResized);
        env.set_map_size(0).expect("imported");
        assert_eq!(env.map_size().expect("map size"), 1 << 19);
        env.begin_txn(true).expect("txn");
    }

    #[test]
    fn test_readers_full() {
        let root = Builder::new().prefix("test_readers_full").tempdir().expect("tempdir");
        let env = open_env(root.path());
        env.set_max_readers(1);
        let first = env.begin_txn(true).expect("txn");
        let err = env.begin_txn(true).expect_err("no slot");
        assert_eq!(err.condition(), Condition::ReadersFull);
        drop(first);
        env.begin_txn(true).expect("slot freed");
    }

    #[test]
    fn test_single_writer() {
        let root = Builder::new().prefix("test_single_writer").tempdir().expect("tempdir");
        let env = open_env(root.path());
        let _writer = env.begin_txn(false).expect("txn");
        assert!(matches!(env.begin_txn(false), Err(ErrorImpl::WriterBusy)));
        env.begin_txn(true).expect("readers still allowed");
    }

    #[test]
    fn test_read_only_refuses_writers() {
        let root = Builder::new().prefix("test_read_only").tempdir().expect("tempdir");
        drop(open_env(root.path()));

        let mut env = EnvironmentImpl::create().expect("created");
        env.open(root.path(), EnvironmentFlags::READ_ONLY, 0o644).expect("opened");
        assert!(matches!(env.begin_txn(false), Err(ErrorImpl::EnvReadOnly)));
        env.begin_txn(true).expect("reader");
    }

    #[test]
    fn test_oversized_image_reports_assertion() {
        let root = Builder::new().prefix("test_oversized_image").tempdir().expect("tempdir");
        let path = root.path().join(DEFAULT_DB_FILENAME);
        let mut data = Snapshot::new();
        data.put(b"key", &[7u8; 4096]);
        let bytes = bincode::serialize(&ImageRef {
            map_size: 4096,
            data: &data,
        })
        .expect("serialized");
        std::fs::write(&path, bytes).expect("written");

        let asserts = Arc::new(AtomicUsize::new(0));
        let counter = asserts.clone();
        let mut env = EnvironmentImpl::create().expect("created");
        env.set_assert_fn(Some(Arc::new(move |_: &str| {
            counter.fetch_add(1, Ordering::SeqCst);
        })))
        .expect("assert fn");
        env.open(root.path(), EnvironmentFlags::empty(), 0o644).expect("opened");
        assert_eq!(asserts.load(Ordering::SeqCst), 1);
        assert_eq!(env.len(), 1);
    }
}
