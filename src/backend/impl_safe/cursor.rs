// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use std::sync::Arc;

use super::{
    environment::Shared,
    ErrorImpl,
    FaultPoint,
    Snapshot,
};
use crate::backend::{
    common::CursorOp,
    traits::BackendCursor,
};

/// A cursor over the snapshot its transaction saw when the cursor was opened.
#[derive(Debug)]
pub struct CursorImpl {
    env: Arc<Shared>,
    data: Arc<Snapshot>,
    position: Option<Box<[u8]>>,
}

impl CursorImpl {
    pub(crate) fn new(env: Arc<Shared>, data: Arc<Snapshot>) -> CursorImpl {
        CursorImpl {
            env,
            data,
            position: None,
        }
    }
}

impl BackendCursor for CursorImpl {
    type Error = ErrorImpl;

    fn get(&mut self, key: Option<&[u8]>, op: CursorOp) -> Result<(Vec<u8>, Vec<u8>), Self::Error> {
        self.env.check_fault(FaultPoint::CursorGet)?;

        let data = &self.data;
        let position = self.position.as_deref();
        let found = match op {
            CursorOp::First => data.first(),
            CursorOp::Last => data.last(),
            CursorOp::Next => match position {
                Some(current) => data.after(current),
                None => data.first(),
            },
            CursorOp::Prev => match position {
                Some(current) => data.before(current),
                None => data.last(),
            },
            CursorOp::GetCurrent => position.and_then(|current| data.entry(current)),
            CursorOp::Set => data.entry(key.ok_or(ErrorImpl::KeyValuePairBadSize)?),
            CursorOp::SetRange => data.at_or_after(key.ok_or(ErrorImpl::KeyValuePairBadSize)?),
        };

        let (key, value) = match found {
            Some((key, value)) => (key.to_vec(), value.to_vec()),
            None => return Err(ErrorImpl::KeyValuePairNotFound),
        };
        self.position = Some(Box::from(key.as_slice()));
        Ok((key, value))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::Builder;

    use super::*;
    use crate::backend::{
        common::{
            Condition,
            EnvironmentFlags,
            WriteFlags,
        },
        impl_safe::EnvironmentImpl,
        traits::{
            BackendEnvironment,
            BackendError,
            BackendTransaction,
        },
    };

    #[test]
    fn test_cursor_walk() {
        let root = Builder::new().prefix("test_cursor_walk").tempdir().expect("tempdir");
        let mut env = EnvironmentImpl::create().expect("created");
        env.open(root.path(), EnvironmentFlags::empty(), 0o644).expect("opened");

        let mut txn = env.begin_txn(false).expect("txn");
        let db = env.open_db(&txn).expect("db");
        for key in &[b"k1", b"k2", b"k3"] {
            txn.put(db, *key, b"v", WriteFlags::empty()).expect("put");
        }
        txn.commit().expect("commit");

        let txn = env.begin_txn(true).expect("txn");
        let mut cursor = env.open_cursor(&txn, db).expect("cursor");
        assert_eq!(cursor.get(None, CursorOp::Next).expect("next").0, b"k1");
        assert_eq!(cursor.get(None, CursorOp::Next).expect("next").0, b"k2");
        assert_eq!(cursor.get(None, CursorOp::GetCurrent).expect("current").0, b"k2");
        assert_eq!(cursor.get(None, CursorOp::Prev).expect("prev").0, b"k1");
        assert_eq!(cursor.get(Some(&b"k3"[..]), CursorOp::Set).expect("set").0, b"k3");
        let err = cursor.get(None, CursorOp::Next).expect_err("end");
        assert_eq!(err.condition(), Condition::NotFound);
        assert_eq!(cursor.get(Some(&b"k20"[..]), CursorOp::SetRange).expect("range").0, b"k3");
        assert_eq!(cursor.get(None, CursorOp::Last).expect("last").0, b"k3");
        let err = cursor.get(Some(&b"k0"[..]), CursorOp::Set).expect_err("absent");
        assert_eq!(err.condition(), Condition::NotFound);
    }
}
