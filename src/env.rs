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
    convert::TryFrom,
    fmt,
    fs,
    os::unix::io::RawFd,
    path::Path,
    sync::Arc,
    thread,
    time::Duration,
};

use log::{
    debug,
    warn,
};

use crate::{
    backend::{
        AssertFn,
        BackendEnvironment,
        BackendError,
        BackendTransaction,
        EnvironmentFlags,
        OpenFlags,
        SessionFlags,
    },
    cursor_key::SavedKey,
    error::StoreError,
    recovery::{
        classify,
        Notification,
        Recovery,
        SizeLimits,
    },
};

/// Room reserved on top of the existing file size for metadata and the
/// transaction that opens the database.
pub const SLMDB_FUDGE: usize = 10240;

pub const DEFAULT_API_RETRY_LIMIT: usize = 30;

pub const DEFAULT_BULK_RETRY_LIMIT: usize = 2 * usize::BITS as usize;

pub const DEFAULT_READERS_FULL_BACKOFF: Duration = Duration::from_secs(1);

pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Called after a bulk transaction was restarted, before the operation that
/// triggered the restart returns `StoreError::TransactionRestarted`.
pub type RestartFn<C> = Box<dyn FnMut(&mut C)>;

/// Called after a map full, map resized or readers full condition was handled.
pub type NotifyFn<C> = Box<dyn FnMut(&mut C, Notification)>;

/// One setting for `Slmdb::control`.
pub enum Control<C> {
    RestartFn(RestartFn<C>),
    NotifyFn(NotifyFn<C>),
    AssertFn(AssertFn),
    Context(C),
    ApiRetryLimit(usize),
    BulkRetryLimit(usize),
}

impl<C> fmt::Debug for Control<C> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Control::RestartFn(_) => write!(fmt, "RestartFn"),
            Control::NotifyFn(_) => write!(fmt, "NotifyFn"),
            Control::AssertFn(_) => write!(fmt, "AssertFn"),
            Control::Context(_) => write!(fmt, "Context"),
            Control::ApiRetryLimit(limit) => write!(fmt, "ApiRetryLimit({})", limit),
            Control::BulkRetryLimit(limit) => write!(fmt, "BulkRetryLimit({})", limit),
        }
    }
}

/// Session configuration up to the point the database is opened.
pub struct SlmdbBuilder<C = ()> {
    limits: SizeLimits,
    api_retry_limit: usize,
    bulk_retry_limit: usize,
    readers_full_backoff: Duration,
    mode: u32,
    restart_fn: Option<RestartFn<C>>,
    notify_fn: Option<NotifyFn<C>>,
    assert_fn: Option<AssertFn>,
    context: C,
}

impl SlmdbBuilder<()> {
    /// Capture the map sizing. Nothing is allocated until `open`.
    pub fn init(curr_limit: usize, size_incr: usize, hard_limit: usize) -> SlmdbBuilder<()> {
        SlmdbBuilder::from_limits(SizeLimits::new(curr_limit, size_incr, hard_limit))
    }

    pub fn from_limits(limits: SizeLimits) -> SlmdbBuilder<()> {
        SlmdbBuilder::with_context(limits, ())
    }
}

impl<C> SlmdbBuilder<C> {
    /// Like `from_limits`, with the value every callback receives.
    pub fn with_context(limits: SizeLimits, context: C) -> SlmdbBuilder<C> {
        SlmdbBuilder {
            limits,
            api_retry_limit: DEFAULT_API_RETRY_LIMIT,
            bulk_retry_limit: DEFAULT_BULK_RETRY_LIMIT,
            readers_full_backoff: DEFAULT_READERS_FULL_BACKOFF,
            mode: DEFAULT_FILE_MODE,
            restart_fn: None,
            notify_fn: None,
            assert_fn: None,
            context,
        }
    }

    pub fn context(mut self, context: C) -> Self {
        self.context = context;
        self
    }

    pub fn restart_fn<F>(mut self, restart_fn: F) -> Self
    where
        F: FnMut(&mut C) + 'static,
    {
        self.restart_fn = Some(Box::new(restart_fn));
        self
    }

    pub fn notify_fn<F>(mut self, notify_fn: F) -> Self
    where
        F: FnMut(&mut C, Notification) + 'static,
    {
        self.notify_fn = Some(Box::new(notify_fn));
        self
    }

    pub fn assert_fn<F>(mut self, assert_fn: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.assert_fn = Some(Arc::new(assert_fn));
        self
    }

    pub fn api_retry_limit(mut self, limit: usize) -> Self {
        self.api_retry_limit = limit;
        self
    }

    pub fn bulk_retry_limit(mut self, limit: usize) -> Self {
        self.bulk_retry_limit = limit;
        self
    }

    /// How long to wait for a reader slot before trying again.
    pub fn readers_full_backoff(mut self, backoff: Duration) -> Self {
        self.readers_full_backoff = backoff;
        self
    }

    /// Permissions for a database file that has to be created.
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Open the database at `path`.
    ///
    /// An existing file larger than the configured map gets a map that fits
    /// it, raising the hard limit if need be. With `SessionFlags::BULK` a
    /// single write transaction is held open until `close`.
    pub fn open<E>(
        self,
        path: &Path,
        open_flags: OpenFlags,
        env_flags: EnvironmentFlags,
        session_flags: SessionFlags,
    ) -> Result<Slmdb<E, C>, StoreError>
    where
        E: BackendEnvironment,
    {
        let SlmdbBuilder {
            mut limits,
            api_retry_limit,
            bulk_retry_limit,
            readers_full_backoff,
            mode,
            restart_fn,
            notify_fn,
            assert_fn,
            context,
        } = self;

        let mut env = E::create().map_err(StoreError::from_backend)?;

        if limits.curr_limit < SLMDB_FUDGE {
            limits.curr_limit = SLMDB_FUDGE;
        }
        if limits.hard_limit < limits.curr_limit {
            limits.hard_limit = limits.curr_limit;
        }
        if let Ok(metadata) = fs::metadata(E::data_path(path, env_flags)) {
            let size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
            if size > limits.curr_limit - SLMDB_FUDGE {
                if size > limits.hard_limit {
                    limits.hard_limit = size;
                }
                limits.curr_limit = if size < limits.hard_limit.saturating_sub(SLMDB_FUDGE) {
                    size + SLMDB_FUDGE
                } else {
                    limits.hard_limit
                };
            }
        }

        env.set_map_size(limits.curr_limit).map_err(StoreError::from_backend)?;
        env.set_assert_fn(assert_fn).map_err(StoreError::from_backend)?;
        env.open(path, env_flags, mode).map_err(StoreError::from_backend)?;

        let read_only = env_flags.contains(EnvironmentFlags::READ_ONLY);
        let txn = env.begin_txn(read_only).map_err(StoreError::from_backend)?;
        let db = env.open_db(&txn).map_err(StoreError::from_backend)?;
        let fd = env.fd().map_err(StoreError::from_backend)?;

        let mut slmdb = Slmdb {
            cursor: None,
            txn: Some(txn),
            env,
            db,
            limits,
            open_flags,
            env_flags,
            session_flags,
            fd,
            saved_key: SavedKey::default(),
            api_retry_count: 0,
            api_retry_limit,
            bulk_retry_count: 0,
            bulk_retry_limit,
            readers_full_backoff,
            restart_fn,
            notify_fn,
            replaying: false,
            context,
        };
        slmdb.prepare()?;

        debug!("opened {:?} with map size {}", path, slmdb.limits.curr_limit);
        Ok(slmdb)
    }
}

impl<C> fmt::Debug for SlmdbBuilder<C> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("SlmdbBuilder")
            .field("limits", &self.limits)
            .field("api_retry_limit", &self.api_retry_limit)
            .field("bulk_retry_limit", &self.bulk_retry_limit)
            .field("readers_full_backoff", &self.readers_full_backoff)
            .field("mode", &format_args!("{:o}", self.mode))
            .finish_non_exhaustive()
    }
}

/// An open cursor and the read transaction it lives in. The cursor is
/// declared first so it is closed before its transaction ends.
#[derive(Debug)]
pub(crate) struct CursorState<E: BackendEnvironment> {
    pub(crate) cursor: E::Cursor,
    pub(crate) txn: E::Transaction,
}

/// A database session that hides map full, map resized and readers full
/// conditions from its caller.
///
/// Sessions are not synchronized; use one per thread. Fields drop in order,
/// so an open cursor is closed before any transaction, and every transaction
/// ends before the environment closes.
pub struct Slmdb<E: BackendEnvironment, C = ()> {
    pub(crate) cursor: Option<CursorState<E>>,
    pub(crate) txn: Option<E::Transaction>,
    pub(crate) env: E,
    pub(crate) db: E::Database,
    pub(crate) limits: SizeLimits,
    open_flags: OpenFlags,
    pub(crate) env_flags: EnvironmentFlags,
    session_flags: SessionFlags,
    fd: RawFd,
    pub(crate) saved_key: SavedKey,
    pub(crate) api_retry_count: usize,
    api_retry_limit: usize,
    bulk_retry_count: usize,
    bulk_retry_limit: usize,
    readers_full_backoff: Duration,
    restart_fn: Option<RestartFn<C>>,
    notify_fn: Option<NotifyFn<C>>,
    /// Set while `Slmdb::bulk` is running a batch it will replay.
    pub(crate) replaying: bool,
    context: C,
}

impl<E: BackendEnvironment, C> fmt::Debug for Slmdb<E, C> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("Slmdb")
            .field("env", &self.env)
            .field("limits", &self.limits)
            .field("open_flags", &self.open_flags)
            .field("env_flags", &self.env_flags)
            .field("session_flags", &self.session_flags)
            .field("txn", &self.txn.is_some())
            .field("cursor", &self.cursor.is_some())
            .field("bulk_retry_count", &self.bulk_retry_count)
            .finish_non_exhaustive()
    }
}

/// Lifecycle.
impl<E: BackendEnvironment, C> Slmdb<E, C> {
    /// Finish the transaction begun at open or at a bulk restart: truncate if
    /// asked to, and keep the transaction only if it is the bulk transaction.
    pub(crate) fn prepare(&mut self) -> Result<(), StoreError> {
        if self.open_flags.contains(OpenFlags::TRUNCATE) {
            if let Some(txn) = self.txn.as_mut() {
                txn.clear_db(self.db).map_err(StoreError::from_backend)?;
            }
            if !self.is_bulk() {
                if let Some(txn) = self.txn.take() {
                    txn.commit().map_err(StoreError::from_backend)?;
                }
            }
        } else if self.is_read_only() || !self.is_bulk() {
            if let Some(txn) = self.txn.take() {
                txn.abort();
            }
        }
        self.api_retry_count = 0;
        Ok(())
    }

    /// Commit the bulk transaction, if any, and close the database.
    ///
    /// A failed commit still resizes the map when the failure calls for it,
    /// so `curr_limit` and the notify callback stay accurate, but the commit
    /// is not reissued: its error is returned and the batch is lost.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.cursor = None;
        let status = match self.txn.take() {
            Some(txn) => match txn.commit() {
                Ok(()) => Ok(()),
                Err(err) => {
                    warn!("bulk commit failed at close: {}", err);
                    match classify(err.condition(), &self.limits) {
                        recovery @ Recovery::GrowMap {
                            ..
                        }
                        | recovery @ Recovery::ImportMapSize => {
                            if let Err(e) = self.apply(recovery) {
                                warn!("resizing after failed commit: {}", e);
                            }
                        },
                        Recovery::Backoff | Recovery::Unrecoverable => {},
                    }
                    Err(err.into())
                },
            },
            None => Ok(()),
        };
        debug!("closing with map size {}", self.limits.curr_limit);
        status
    }

    pub fn is_bulk(&self) -> bool {
        self.session_flags.contains(SessionFlags::BULK)
    }

    pub fn is_read_only(&self) -> bool {
        self.env_flags.contains(EnvironmentFlags::READ_ONLY)
    }
}

/// Recovery.
impl<E: BackendEnvironment, C> Slmdb<E, C> {
    /// Deal with an engine error from the operation in progress. The caller
    /// has already ended any transaction of its own.
    ///
    /// `Ok` means the operation should be retried. A call gets at most
    /// `api_retry_limit` engine attempts.
    ///
    /// In bulk mode a resized map costs the bulk transaction: a fresh one is
    /// begun and `StoreError::TransactionRestarted` tells the caller to replay
    /// its batch. That only happens when a restart callback is registered or
    /// the batch runs under `Slmdb::bulk`; otherwise the error is returned and
    /// the bulk transaction is left as it is.
    pub(crate) fn recover(&mut self, err: E::Error) -> Result<(), StoreError> {
        self.cursor = None;

        self.api_retry_count += 1;
        if self.api_retry_count >= self.api_retry_limit {
            warn!("giving up after {} attempts: {}", self.api_retry_count, err);
            return Err(err.into());
        }

        let recovery = classify(err.condition(), &self.limits);
        let resizes = match recovery {
            Recovery::Unrecoverable => return Err(err.into()),
            Recovery::GrowMap {
                ..
            }
            | Recovery::ImportMapSize => true,
            Recovery::Backoff => false,
        };

        let bulk = resizes && self.is_bulk() && self.txn.is_some();
        if bulk && self.restart_fn.is_none() && !self.replaying {
            // Nobody would replay the batch, so the bulk transaction stays.
            warn!("bulk transaction cannot be restarted: {}", err);
            return Err(err.into());
        }
        if bulk {
            if let Some(txn) = self.txn.take() {
                txn.abort();
            }
        }

        self.apply(recovery)?;

        if !bulk {
            return Ok(());
        }
        if self.bulk_retry_count >= self.bulk_retry_limit {
            warn!("bulk transaction restarted {} times, giving up", self.bulk_retry_count);
            return Err(err.into());
        }
        let txn = self.env.begin_txn(self.is_read_only()).map_err(StoreError::from_backend)?;
        self.txn = Some(txn);
        self.prepare()?;
        self.bulk_retry_count += 1;
        warn!("bulk transaction restarted after {} ({} of {})", err, self.bulk_retry_count, self.bulk_retry_limit);
        if let Some(restart_fn) = self.restart_fn.as_mut() {
            restart_fn(&mut self.context);
        }
        Err(StoreError::TransactionRestarted)
    }

    /// Carry out a recovery action and tell the notify callback about it.
    fn apply(&mut self, recovery: Recovery) -> Result<(), StoreError> {
        let notification = match recovery {
            Recovery::GrowMap {
                new_limit,
            } => {
                debug!("map full, growing map from {} to {}", self.limits.curr_limit, new_limit);
                self.env.set_map_size(new_limit).map_err(StoreError::from_backend)?;
                self.limits.curr_limit = new_limit;
                Notification::MapFull {
                    new_limit,
                }
            },
            Recovery::ImportMapSize => {
                self.env.set_map_size(0).map_err(StoreError::from_backend)?;
                let new_limit = self.env.map_size().map_err(StoreError::from_backend)?;
                debug!("map resized by another writer, from {} to {}", self.limits.curr_limit, new_limit);
                self.limits.curr_limit = new_limit;
                Notification::MapResized {
                    new_limit,
                }
            },
            Recovery::Backoff => {
                debug!("reader table full, waiting {:?}", self.readers_full_backoff);
                self.notify(Notification::ReadersFull);
                thread::sleep(self.readers_full_backoff);
                return Ok(());
            },
            Recovery::Unrecoverable => return Ok(()),
        };
        self.notify(notification);
        Ok(())
    }

    fn notify(&mut self, notification: Notification) {
        if let Some(notify_fn) = self.notify_fn.as_mut() {
            notify_fn(&mut self.context, notification);
        }
    }
}

/// Configuration and accessors.
impl<E: BackendEnvironment, C> Slmdb<E, C> {
    pub fn control<I>(&mut self, controls: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = Control<C>>,
    {
        for control in controls {
            match control {
                Control::RestartFn(restart_fn) => self.restart_fn = Some(restart_fn),
                Control::NotifyFn(notify_fn) => self.notify_fn = Some(notify_fn),
                Control::AssertFn(assert_fn) => self.set_assert_fn(Some(assert_fn))?,
                Control::Context(context) => self.context = context,
                Control::ApiRetryLimit(limit) => self.api_retry_limit = limit,
                Control::BulkRetryLimit(limit) => self.bulk_retry_limit = limit,
            }
        }
        Ok(())
    }

    pub fn set_restart_fn(&mut self, restart_fn: Option<RestartFn<C>>) {
        self.restart_fn = restart_fn;
    }

    pub fn set_notify_fn(&mut self, notify_fn: Option<NotifyFn<C>>) {
        self.notify_fn = notify_fn;
    }

    /// Replace the engine's assertion callback. LMDB only allows this while
    /// no transaction is open, so it fails during a bulk transaction.
    pub fn set_assert_fn(&mut self, assert_fn: Option<AssertFn>) -> Result<(), StoreError> {
        self.env.set_assert_fn(assert_fn).map_err(Into::into)
    }

    pub fn set_api_retry_limit(&mut self, limit: usize) {
        self.api_retry_limit = limit;
    }

    pub fn set_bulk_retry_limit(&mut self, limit: usize) {
        self.bulk_retry_limit = limit;
    }

    pub fn set_readers_full_backoff(&mut self, backoff: Duration) {
        self.readers_full_backoff = backoff;
    }

    /// The database file descriptor, for external locking.
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// The current memory map size.
    pub fn curr_limit(&self) -> usize {
        self.limits.curr_limit
    }

    pub fn limits(&self) -> SizeLimits {
        self.limits
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }
}
