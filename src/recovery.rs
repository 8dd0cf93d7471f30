// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Deciding what to do about an engine error. The decision is pure; carrying
//! it out is up to the session, see `Slmdb::recover`.

use serde_derive::{
    Deserialize,
    Serialize,
};

use crate::backend::Condition;

/// Memory map sizing for a session.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeLimits {
    /// Size of the memory map in bytes.
    pub curr_limit: usize,
    /// Factor the map grows by when it fills up.
    pub size_incr: usize,
    /// The map never grows past this.
    pub hard_limit: usize,
}

impl Default for SizeLimits {
    fn default() -> SizeLimits {
        SizeLimits {
            curr_limit: 16 * 1024 * 1024,
            size_incr: 2,
            hard_limit: isize::MAX as usize,
        }
    }
}

impl SizeLimits {
    pub fn new(curr_limit: usize, size_incr: usize, hard_limit: usize) -> SizeLimits {
        SizeLimits {
            curr_limit,
            size_incr,
            hard_limit,
        }
    }

    /// The next map size after the current one filled up, if there is one.
    pub fn grown(&self) -> Option<usize> {
        if self.curr_limit >= self.hard_limit {
            return None;
        }
        let new_limit = self.curr_limit.checked_mul(self.size_incr).map_or(self.hard_limit, |n| n.min(self.hard_limit));
        if new_limit > self.curr_limit {
            Some(new_limit)
        } else {
            None
        }
    }
}

/// What to do about an engine error.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Recovery {
    /// Map the database with `new_limit` bytes.
    GrowMap { new_limit: usize },
    /// Take over the map size another writer set, which may be smaller.
    ImportMapSize,
    /// Wait for a reader slot to free up.
    Backoff,
    Unrecoverable,
}

/// Sent to the notify callback after a recoverable error was dealt with.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Notification {
    MapFull { new_limit: usize },
    MapResized { new_limit: usize },
    ReadersFull,
}

pub fn classify(condition: Condition, limits: &SizeLimits) -> Recovery {
    match condition {
        Condition::MapFull => match limits.grown() {
            Some(new_limit) => Recovery::GrowMap {
                new_limit,
            },
            None => Recovery::Unrecoverable,
        },
        Condition::MapResized => Recovery::ImportMapSize,
        Condition::ReadersFull => Recovery::Backoff,
        Condition::NotFound | Condition::KeyExist | Condition::Other => Recovery::Unrecoverable,
    }
}
