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
    database::MAX_KEY_SIZE,
    environment::Shared,
    DatabaseImpl,
    ErrorImpl,
    FaultPoint,
    Snapshot,
};
use crate::backend::{
    common::{
        Condition,
        WriteFlags,
    },
    traits::{
        BackendError,
        BackendTransaction,
    },
};

/// A transaction over a private copy of the committed snapshot. The copy is
/// only made on the first write, so readers share the committed data.
#[derive(Debug)]
pub struct TransactionImpl {
    env: Arc<Shared>,
    data: Arc<Snapshot>,
    map_size: usize,
    read_only: bool,
    poisoned: bool,
    _slot: Arc<()>,
}

impl TransactionImpl {
    pub(crate) fn new(
        env: Arc<Shared>,
        data: Arc<Snapshot>,
        map_size: usize,
        read_only: bool,
        slot: Arc<()>,
    ) -> TransactionImpl {
        TransactionImpl {
            env,
            data,
            map_size,
            read_only,
            poisoned: false,
            _slot: slot,
        }
    }

    pub(crate) fn check_usable(&self) -> Result<(), ErrorImpl> {
        if self.poisoned {
            Err(ErrorImpl::TxnPoisonError)
        } else {
            Ok(())
        }
    }

    pub(crate) fn data(&self) -> Arc<Snapshot> {
        self.data.clone()
    }

    fn check_writable(&self) -> Result<(), ErrorImpl> {
        self.check_usable()?;
        if self.read_only {
            return Err(ErrorImpl::EnvReadOnly);
        }
        Ok(())
    }

    /// MapFull and engine failures leave the transaction unusable.
    fn poison_on<T>(&mut self, result: Result<T, ErrorImpl>) -> Result<T, ErrorImpl> {
        if let Err(ref e) = result {
            match e.condition() {
                // Only begin reports these; an injected one leaves the
                // transaction intact.
                Condition::NotFound | Condition::KeyExist | Condition::MapResized | Condition::ReadersFull => {},
                _ => self.poisoned = true,
            }
        }
        result
    }

    fn try_put(&mut self, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<(), ErrorImpl> {
        self.env.check_fault(FaultPoint::Put)?;
        if key.is_empty() || key.len() > MAX_KEY_SIZE {
            return Err(ErrorImpl::KeyValuePairBadSize);
        }
        if flags.contains(WriteFlags::NO_OVERWRITE) && self.data.contains(key) {
            return Err(ErrorImpl::KeyExist);
        }
        if self.data.used_bytes_after_put(key, value) > self.map_size {
            return Err(ErrorImpl::MapFull);
        }
        Arc::make_mut(&mut self.data).put(key, value);
        Ok(())
    }

    fn try_del(&mut self, key: &[u8]) -> Result<(), ErrorImpl> {
        self.env.check_fault(FaultPoint::Del)?;
        if !self.data.contains(key) {
            return Err(ErrorImpl::KeyValuePairNotFound);
        }
        Arc::make_mut(&mut self.data).del(key).ok_or(ErrorImpl::KeyValuePairNotFound)
    }
}

impl BackendTransaction for TransactionImpl {
    type Database = DatabaseImpl;
    type Error = ErrorImpl;

    fn get(&self, _db: Self::Database, key: &[u8]) -> Result<Vec<u8>, Self::Error> {
        self.env.check_fault(FaultPoint::Get)?;
        self.check_usable()?;
        self.data.get(key).map(<[u8]>::to_vec).ok_or(ErrorImpl::KeyValuePairNotFound)
    }

    fn put(&mut self, _db: Self::Database, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<(), Self::Error> {
        self.check_writable()?;
        let result = self.try_put(key, value, flags);
        self.poison_on(result)
    }

    fn del(&mut self, _db: Self::Database, key: &[u8]) -> Result<(), Self::Error> {
        self.check_writable()?;
        let result = self.try_del(key);
        self.poison_on(result)
    }

    fn clear_db(&mut self, _db: Self::Database) -> Result<(), Self::Error> {
        self.check_writable()?;
        Arc::make_mut(&mut self.data).clear();
        Ok(())
    }

    fn commit(self) -> Result<(), Self::Error> {
        self.env.check_fault(FaultPoint::Commit)?;
        self.check_usable()?;
        if self.read_only {
            return Ok(());
        }
        let mut state = self.env.state()?;
        if self.data.used_bytes() > state.map_size {
            return Err(ErrorImpl::MapFull);
        }
        state.write_to_disk(self.data.clone())
    }

    fn abort(self) {
        // noop
    }
}
