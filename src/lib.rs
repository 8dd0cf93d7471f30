// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

#![cfg(unix)]

//! A key-value session on top of LMDB that recovers from the errors a
//! memory-mapped database throws at its users in normal operation:
//!
//! * the map is full (the map is grown and the operation retried),
//! * the map was resized by another process (the new size is imported),
//! * the reader table is full (the session waits and tries again).
//!
//! Callers see plain gets, puts, deletes and cursor steps. They only learn
//! about recovery through optional callbacks, or when a retry budget runs out.
//!
//! A session can also hold one write transaction open from `open` to `close`
//! ("bulk" mode) to load many entries at once. Growing the map in the middle
//! of such a batch discards the transaction when a restart callback is
//! registered; the operation that hit the problem returns
//! `StoreError::TransactionRestarted` and the caller starts the batch over.
//! `Slmdb::bulk` restarts and replays a batch without needing a callback.
//!
//! ```
//! use slmdb::{
//!     backend::SafeModeEnvironment,
//!     EnvironmentFlags,
//!     OpenFlags,
//!     SessionFlags,
//!     Slmdb,
//!     SlmdbBuilder,
//!     WriteFlags,
//! };
//! use tempfile::Builder;
//!
//! let root = Builder::new().prefix("simple-db").tempdir().unwrap();
//!
//! let mut session: Slmdb<SafeModeEnvironment> = SlmdbBuilder::init(1 << 20, 2, 1 << 30)
//!     .open(root.path(), OpenFlags::empty(), EnvironmentFlags::empty(), SessionFlags::empty())
//!     .unwrap();
//!
//! session.put(b"foo", b"bar", WriteFlags::empty()).unwrap();
//! assert_eq!(session.get(b"foo").unwrap(), Some(b"bar".to_vec()));
//! assert_eq!(session.get(b"baz").unwrap(), None);
//! session.close().unwrap();
//! ```
//!
//! Two engines implement the storage interface in `backend`: LMDB itself
//! (the `lmdb` feature) and a safe-mode engine written in Rust, which can
//! also script engine failures for testing.

mod cursor_key;
mod env;
mod readwrite;

pub mod backend;
pub mod error;
pub mod recovery;

pub use backend::{
    AssertFn,
    CursorOp,
    EnvironmentFlags,
    OpenFlags,
    SessionFlags,
    WriteFlags,
};
pub use env::{
    Control,
    NotifyFn,
    RestartFn,
    Slmdb,
    SlmdbBuilder,
    DEFAULT_API_RETRY_LIMIT,
    DEFAULT_BULK_RETRY_LIMIT,
    DEFAULT_FILE_MODE,
    DEFAULT_READERS_FULL_BACKOFF,
    SLMDB_FUDGE,
};
pub use error::StoreError;
pub use recovery::{
    Notification,
    SizeLimits,
};
