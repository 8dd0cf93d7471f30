// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

//! Scripted failures for the safe-mode engine, so that every recoverable
//! condition can be produced on demand at a chosen engine entry point.

use std::collections::HashMap;

use super::ErrorImpl;
use crate::backend::common::Condition;

/// Engine entry points that can be made to fail.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Hash)]
pub enum FaultPoint {
    Begin,
    Get,
    Put,
    Del,
    Commit,
    CursorGet,
}

#[derive(Debug)]
struct Fault {
    point: FaultPoint,
    condition: Condition,
    skip: usize,
    remaining: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Faults {
    pending: Vec<Fault>,
    calls: HashMap<FaultPoint, usize>,
}

impl Faults {
    pub(crate) fn inject(&mut self, point: FaultPoint, condition: Condition, skip: usize, times: usize) {
        if times > 0 {
            self.pending.push(Fault {
                point,
                condition,
                skip,
                remaining: times,
            });
        }
    }

    /// Count a call at `point` and fail it if the oldest fault queued there is due.
    pub(crate) fn check(&mut self, point: FaultPoint) -> Result<(), ErrorImpl> {
        *self.calls.entry(point).or_insert(0) += 1;

        let fault = match self.pending.iter_mut().find(|f| f.point == point) {
            Some(fault) => fault,
            None => return Ok(()),
        };
        if fault.skip > 0 {
            fault.skip -= 1;
            return Ok(());
        }
        fault.remaining -= 1;
        let condition = fault.condition;
        self.pending.retain(|f| f.remaining > 0);
        Err(ErrorImpl::from_condition(condition))
    }

    pub(crate) fn calls(&self, point: FaultPoint) -> usize {
        self.calls.get(&point).copied().unwrap_or(0)
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
