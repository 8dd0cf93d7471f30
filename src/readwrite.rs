// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::mem;

use log::debug;

use crate::{
    backend::{
        BackendCursor,
        BackendEnvironment,
        BackendError,
        BackendTransaction,
        Condition,
        CursorOp,
        EnvironmentFlags,
        WriteFlags,
    },
    env::{
        CursorState,
        Slmdb,
    },
    error::StoreError,
};

/// Reads and writes. Each call runs in the bulk transaction when there is
/// one, and otherwise in a transaction of its own. Recoverable engine errors
/// are retried until they clear or the retry budget runs out.
impl<E: BackendEnvironment, C> Slmdb<E, C> {
    /// The value stored under `key`, or `None` if there is none.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self.get_with_retry(key);
        self.api_retry_count = 0;
        result
    }

    /// Store `value` under `key`. Returns `false` if `WriteFlags::NO_OVERWRITE`
    /// was given and the key already exists.
    pub fn put(&mut self, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<bool, StoreError> {
        let result = self.put_with_retry(key, value, flags);
        self.api_retry_count = 0;
        result
    }

    /// Remove `key`. Returns `false` if it was not there.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool, StoreError> {
        let result = self.delete_with_retry(key);
        self.api_retry_count = 0;
        result
    }

    /// Move the session's cursor and return the entry it lands on, or `None`
    /// once iteration is over.
    ///
    /// The cursor survives recovery: if its transaction had to be closed, it
    /// is reopened at the last key it returned before stepping. With
    /// `EnvironmentFlags::NO_LOCK` the cursor is closed after every call.
    pub fn cursor_get(&mut self, op: CursorOp) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let result = self.cursor_get_with_retry(None, op);
        self.api_retry_count = 0;
        result
    }

    /// Position the cursor with `CursorOp::Set` or `CursorOp::SetRange`.
    pub fn cursor_get_at(&mut self, op: CursorOp, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let result = self.cursor_get_with_retry(Some(key), op);
        self.api_retry_count = 0;
        result
    }

    /// Run `batch` until it finishes without the bulk transaction being
    /// restarted underneath it. `batch` must redo all of its writes each time.
    ///
    /// The bulk transaction may be restarted while `batch` runs even when no
    /// restart callback is registered.
    pub fn bulk<T, F>(&mut self, mut batch: F) -> Result<T, StoreError>
    where
        F: FnMut(&mut Self) -> Result<T, StoreError>,
    {
        let replaying = mem::replace(&mut self.replaying, true);
        let result = loop {
            match batch(self) {
                Err(StoreError::TransactionRestarted) => debug!("replaying batch"),
                result => break result,
            }
        };
        self.replaying = replaying;
        result
    }

    fn get_with_retry(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        loop {
            let result = match self.txn.as_ref() {
                Some(txn) => txn.get(self.db, key),
                None => match self.env.begin_txn(true) {
                    Ok(txn) => {
                        let result = txn.get(self.db, key);
                        txn.abort();
                        result
                    },
                    Err(err) => Err(err),
                },
            };
            match result {
                Ok(value) => return Ok(Some(value)),
                Err(err) if err.condition() == Condition::NotFound => return Ok(None),
                Err(err) => self.recover(err)?,
            }
        }
    }

    fn put_with_retry(&mut self, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<bool, StoreError> {
        loop {
            let result = match self.txn.as_mut() {
                Some(txn) => txn.put(self.db, key, value, flags),
                None => match self.env.begin_txn(false) {
                    Ok(mut txn) => match txn.put(self.db, key, value, flags) {
                        Ok(()) => txn.commit(),
                        Err(err) => Err(err),
                    },
                    Err(err) => Err(err),
                },
            };
            match result {
                Ok(()) => return Ok(true),
                Err(err) if err.condition() == Condition::KeyExist => return Ok(false),
                Err(err) => self.recover(err)?,
            }
        }
    }

    fn delete_with_retry(&mut self, key: &[u8]) -> Result<bool, StoreError> {
        loop {
            let result = match self.txn.as_mut() {
                Some(txn) => txn.del(self.db, key),
                None => match self.env.begin_txn(false) {
                    Ok(mut txn) => match txn.del(self.db, key) {
                        Ok(()) => txn.commit(),
                        Err(err) => Err(err),
                    },
                    Err(err) => Err(err),
                },
            };
            match result {
                Ok(()) => return Ok(true),
                Err(err) if err.condition() == Condition::NotFound => return Ok(false),
                Err(err) => self.recover(err)?,
            }
        }
    }

    fn cursor_get_with_retry(
        &mut self,
        key: Option<&[u8]>,
        op: CursorOp,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        loop {
            match self.cursor_step(key, op) {
                Ok(entry) => return Ok(Some(entry)),
                Err(err) if err.condition() == Condition::NotFound => {
                    self.cursor = None;
                    self.saved_key.clear();
                    return Ok(None);
                },
                Err(err) => self.recover(err)?,
            }
        }
    }

    /// One cursor step. On error the cursor is closed.
    fn cursor_step(&mut self, key: Option<&[u8]>, op: CursorOp) -> Result<(Vec<u8>, Vec<u8>), E::Error> {
        let mut state = match self.cursor.take() {
            Some(state) => state,
            None => {
                let txn = self.env.begin_txn(true)?;
                let mut cursor = self.env.open_cursor(&txn, self.db)?;
                if let Some(saved) = self.saved_key.get().filter(|_| op.is_relative()) {
                    cursor.get(Some(saved), CursorOp::Set)?;
                }
                CursorState {
                    cursor,
                    txn,
                }
            },
        };

        let (key, value) = state.cursor.get(key, op)?;
        self.saved_key.save(&key);
        if !self.env_flags.contains(EnvironmentFlags::NO_LOCK) {
            self.cursor = Some(state);
        }
        Ok((key, value))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::Builder;

    use super::*;
    use crate::{
        backend::{
            FaultPoint,
            OpenFlags,
            SafeModeEnvironment,
            SessionFlags,
        },
        env::SlmdbBuilder,
        recovery::SizeLimits,
    };

    fn open(path: &std::path::Path, env_flags: EnvironmentFlags) -> Slmdb<SafeModeEnvironment> {
        SlmdbBuilder::from_limits(SizeLimits::default())
            .open(path, OpenFlags::empty(), env_flags, SessionFlags::empty())
            .expect("opened")
    }

    #[test]
    fn test_put_get_delete() {
        let root = Builder::new().prefix("test_put_get_delete").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::empty());

        assert!(session.put(b"foo", b"bar", WriteFlags::empty()).expect("put"));
        assert_eq!(session.get(b"foo").expect("get"), Some(b"bar".to_vec()));
        assert!(!session.put(b"foo", b"baz", WriteFlags::NO_OVERWRITE).expect("put"));
        assert_eq!(session.get(b"foo").expect("get"), Some(b"bar".to_vec()));
        assert!(session.put(b"foo", b"baz", WriteFlags::empty()).expect("put"));
        assert_eq!(session.get(b"foo").expect("get"), Some(b"baz".to_vec()));

        assert!(session.delete(b"foo").expect("delete"));
        assert!(!session.delete(b"foo").expect("delete"));
        assert_eq!(session.get(b"foo").expect("get"), None);
        assert_eq!(session.env().active_transactions(), 0);
    }

    #[test]
    fn test_commit_failure_retries_whole_put() {
        let root = Builder::new().prefix("test_commit_failure_retries").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::empty());
        session.env().fail_next(FaultPoint::Commit, Condition::MapResized);

        assert!(session.put(b"foo", b"bar", WriteFlags::empty()).expect("put"));
        assert_eq!(session.env().call_count(FaultPoint::Put), 2);
        assert_eq!(session.env().call_count(FaultPoint::Commit), 2);
        assert_eq!(session.get(b"foo").expect("get"), Some(b"bar".to_vec()));
    }

    #[test]
    fn test_unrecoverable_error_is_returned() {
        let root = Builder::new().prefix("test_unrecoverable").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::empty());
        session.env().fail_next(FaultPoint::Del, Condition::Other);

        let err = session.delete(b"foo").expect_err("corrupted");
        assert!(matches!(err, StoreError::DatabaseCorrupted));
        assert_eq!(session.env().call_count(FaultPoint::Del), 1);
        assert_eq!(session.api_retry_count, 0);
    }

    #[test]
    fn test_cursor_iterates_and_ends() {
        let root = Builder::new().prefix("test_cursor_iterates").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::empty());
        for key in &["k1", "k2", "k3"] {
            session.put(key.as_bytes(), b"v", WriteFlags::empty()).expect("put");
        }

        let mut keys = vec![];
        let mut op = CursorOp::First;
        while let Some((key, _)) = session.cursor_get(op).expect("step") {
            keys.push(key);
            op = CursorOp::Next;
        }
        assert_eq!(keys, vec![b"k1".to_vec(), b"k2".to_vec(), b"k3".to_vec()]);
        assert!(session.cursor.is_none());
        assert_eq!(session.saved_key.get(), None);
        assert_eq!(session.env().active_transactions(), 0);

        // A fresh Next after the end starts over.
        assert_eq!(session.cursor_get(CursorOp::Next).expect("next").map(|(k, _)| k), Some(b"k1".to_vec()));
    }

    #[test]
    fn test_cursor_resumes_after_recovery() {
        let root = Builder::new().prefix("test_cursor_resumes").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::empty());
        for key in &["k1", "k2", "k3"] {
            session.put(key.as_bytes(), b"v", WriteFlags::empty()).expect("put");
        }

        assert_eq!(session.cursor_get(CursorOp::First).expect("first").map(|(k, _)| k), Some(b"k1".to_vec()));
        session.env().fail_next(FaultPoint::CursorGet, Condition::MapResized);
        assert_eq!(session.cursor_get(CursorOp::Next).expect("next").map(|(k, _)| k), Some(b"k2".to_vec()));
    }

    #[test]
    fn test_cursor_seek() {
        let root = Builder::new().prefix("test_cursor_seek").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::NO_LOCK);
        for key in &["a", "c", "e"] {
            session.put(key.as_bytes(), key.as_bytes(), WriteFlags::empty()).expect("put");
        }

        assert_eq!(session.cursor_get_at(CursorOp::SetRange, b"b").expect("range"), Some((b"c".to_vec(), b"c".to_vec())));
        assert_eq!(session.cursor_get(CursorOp::Next).expect("next").map(|(k, _)| k), Some(b"e".to_vec()));
        assert_eq!(session.cursor_get_at(CursorOp::Set, b"b").expect("set"), None);
        assert_eq!(session.cursor_get(CursorOp::Last).expect("last").map(|(k, _)| k), Some(b"e".to_vec()));
        assert_eq!(session.cursor_get(CursorOp::Prev).expect("prev").map(|(k, _)| k), Some(b"c".to_vec()));
    }

    #[test]
    fn test_vanished_saved_key_ends_iteration() {
        let root = Builder::new().prefix("test_vanished_saved_key").tempdir().expect("tempdir");
        let mut session = open(root.path(), EnvironmentFlags::NO_LOCK);
        for key in &["k1", "k2", "k3"] {
            session.put(key.as_bytes(), b"v", WriteFlags::empty()).expect("put");
        }

        session.cursor_get(CursorOp::First).expect("first");
        session.delete(b"k1").expect("delete");
        assert_eq!(session.cursor_get(CursorOp::Next).expect("next"), None);
    }
}
