// Copyright 2018-2019 Mozilla
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use
// this file except in compliance with the License. You may obtain a copy of the
// License at http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software distributed
// under the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR
// CONDITIONS OF ANY KIND, either express or implied. See the License for the
// specific language governing permissions and limitations under the License.

/// The last key a cursor returned, kept so the cursor can be repositioned
/// after its transaction had to be closed. The buffer only ever grows.
#[derive(Debug, Default)]
pub(crate) struct SavedKey {
    buf: Vec<u8>,
}

impl SavedKey {
    pub(crate) fn save(&mut self, key: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(key);
    }

    /// The saved position, if the cursor has one.
    pub(crate) fn get(&self) -> Option<&[u8]> {
        if self.buf.is_empty() {
            None
        } else {
            Some(&self.buf)
        }
    }

    /// Forget the position; iteration is over.
    pub(crate) fn clear(&mut self) {
        self.buf.clear();
    }

    #[cfg(test)]
    fn capacity(&self) -> usize {
        self.buf.capacity()
    }
}
