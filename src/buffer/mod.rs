// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod aligned;
mod pool;
mod slot;

pub use aligned::AlignedBuffer;
pub use pool::AcquiredSlot;
pub use pool::FrameBufferPool;
pub use slot::FrameLayout;
pub use slot::PlaneView;
pub use slot::SlotView;

pub(crate) use slot::FrameBufferSlot;

use std::fmt;

/// Stable identity of a slot inside its pool. This is the only handle the
/// decoder and the render path ever hold; it is resolved through
/// `FrameBufferPool::lookup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn as_i32(&self) -> i32 {
        self.0 as i32
    }

    /// Converts the integer stored in an output descriptor back into an id.
    /// Negative values mean "no slot".
    pub fn from_i32(value: i32) -> Option<Self> {
        u32::try_from(value).ok().map(Self)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
