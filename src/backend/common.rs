// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

use bitflags::bitflags;

bitflags! {
    /// Flags handed to the engine when the environment is opened. The bit values
    /// are the ones LMDB uses, so they can be passed straight through.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnvironmentFlags: u32 {
        const NO_SUB_DIR = 0x4000;
        const NO_SYNC = 0x1_0000;
        const READ_ONLY = 0x2_0000;
        const NO_META_SYNC = 0x4_0000;
        const WRITE_MAP = 0x8_0000;
        const MAP_ASYNC = 0x10_0000;
        const NO_TLS = 0x20_0000;
        /// The engine does no locking of its own; the caller serializes access
        /// with an external lock that may be released between calls.
        const NO_LOCK = 0x40_0000;
        const NO_READAHEAD = 0x80_0000;
        const NO_MEM_INIT = 0x100_0000;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteFlags: u32 {
        /// Fail with "key exists" instead of replacing an existing value.
        const NO_OVERWRITE = 0x10;
    }
}

bitflags! {
    /// How the database file itself is treated at open time.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        /// Drop every entry as part of opening.
        const TRUNCATE = 0x1;
    }
}

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SessionFlags: u32 {
        /// Hold a single write transaction open from `open` until `close`.
        const BULK = 0x1;
    }
}

/// Cursor positioning operations. The discriminants match LMDB's `MDB_cursor_op`.
#[repr(u32)]
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum CursorOp {
    First = 0,
    GetCurrent = 4,
    Last = 6,
    Next = 8,
    Prev = 12,
    Set = 15,
    SetRange = 17,
}

impl CursorOp {
    /// Whether the operation moves relative to the cursor's current position.
    pub(crate) fn is_relative(self) -> bool {
        matches!(self, CursorOp::GetCurrent | CursorOp::Next | CursorOp::Prev)
    }
}

/// What an engine error means to the recovery layer.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Condition {
    NotFound,
    KeyExist,
    MapFull,
    MapResized,
    ReadersFull,
    Other,
}
