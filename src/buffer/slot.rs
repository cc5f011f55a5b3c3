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

use super::AlignedBuffer;
use super::SlotId;
use crate::*;

/// Geometry of one plane of the picture currently held by a slot. |offset| is
/// relative to the start of the slot's storage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaneView {
    pub offset: usize,
    pub stride: usize,
    pub width: usize,
    pub height: usize,
}

/// Per-plane layout of the picture written into a slot. Only meaningful while
/// the slot is referenced.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub planes: [PlaneView; MAX_PLANE_COUNT],
    pub plane_count: usize,
}

impl FrameLayout {
    pub fn plane(&self, plane: Plane) -> Option<&PlaneView> {
        let index = plane.to_usize();
        if index < self.plane_count {
            Some(&self.planes[index])
        } else {
            None
        }
    }
}

/// Snapshot of a slot's bookkeeping, as returned by `FrameBufferPool::lookup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotView {
    pub id: SlotId,
    pub capacity: usize,
    pub reference_count: u32,
    pub reallocations: u32,
    pub frame: Option<FrameLayout>,
}

// Manages one AlignedBuffer and its reference information. Not thread-safe on
// its own; every method is called with the pool lock held.
#[derive(Debug)]
pub(crate) struct FrameBufferSlot {
    id: SlotId,
    buffer: Option<AlignedBuffer>,
    reference_count: u32,
    reallocations: u32,
    frame: Option<FrameLayout>,
}

impl FrameBufferSlot {
    pub(crate) fn new(id: SlotId) -> Self {
        Self {
            id,
            buffer: None,
            reference_count: 0,
            reallocations: 0,
            frame: None,
        }
    }

    pub(crate) fn id(&self) -> SlotId {
        self.id
    }

    pub(crate) fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, |buffer| buffer.len())
    }

    pub(crate) fn data(&self) -> Option<&AlignedBuffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn reference_count(&self) -> u32 {
        self.reference_count
    }

    pub(crate) fn in_use(&self) -> bool {
        self.reference_count != 0
    }

    pub(crate) fn add_reference(&mut self) {
        self.reference_count += 1;
    }

    pub(crate) fn remove_reference(&mut self) {
        self.reference_count -= 1;
        if self.reference_count == 0 {
            self.frame = None;
        }
    }

    // Reallocates the storage if the existing one doesn't have enough
    // capacity. Capacity never shrinks.
    pub(crate) fn maybe_reallocate(&mut self, size: usize, alignment: usize) -> DecoderResult<()> {
        let fits = match &self.buffer {
            Some(buffer) => buffer.len() >= size && buffer.alignment() >= alignment,
            None => false,
        };
        if fits {
            return Ok(());
        }
        // Free the old storage before asking for the new one.
        let size = std::cmp::max(size, self.capacity());
        self.buffer = None;
        self.buffer = Some(AlignedBuffer::try_new(size, alignment)?);
        self.reallocations += 1;
        Ok(())
    }

    pub(crate) fn set_frame(&mut self, frame: FrameLayout) {
        self.frame = Some(frame);
    }

    pub(crate) fn view(&self) -> SlotView {
        SlotView {
            id: self.id,
            capacity: self.capacity(),
            reference_count: self.reference_count,
            reallocations: self.reallocations,
            frame: self.frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_only_grows() {
        let mut slot = FrameBufferSlot::new(SlotId::new(0));
        assert_eq!(slot.capacity(), 0);
        slot.maybe_reallocate(1000, PICTURE_ALIGNMENT).unwrap();
        assert_eq!(slot.capacity(), 1000);
        assert_eq!(slot.view().reallocations, 1);
        slot.maybe_reallocate(500, PICTURE_ALIGNMENT).unwrap();
        assert_eq!(slot.capacity(), 1000);
        assert_eq!(slot.view().reallocations, 1);
        slot.maybe_reallocate(1001, PICTURE_ALIGNMENT).unwrap();
        assert_eq!(slot.capacity(), 1001);
        assert_eq!(slot.view().reallocations, 2);
    }

    #[test]
    fn failed_reallocation_leaves_slot_empty() {
        let mut slot = FrameBufferSlot::new(SlotId::new(0));
        slot.maybe_reallocate(64, PICTURE_ALIGNMENT).unwrap();
        assert_eq!(
            slot.maybe_reallocate(usize::MAX - 8, PICTURE_ALIGNMENT),
            Err(DecoderError::OutOfMemory)
        );
        assert_eq!(slot.capacity(), 0);
    }

    #[test]
    fn frame_layout_is_dropped_with_last_reference() {
        let mut slot = FrameBufferSlot::new(SlotId::new(3));
        slot.add_reference();
        slot.add_reference();
        slot.set_frame(FrameLayout {
            plane_count: 1,
            ..FrameLayout::default()
        });
        slot.remove_reference();
        assert!(slot.view().frame.is_some());
        slot.remove_reference();
        assert!(!slot.in_use());
        assert!(slot.view().frame.is_none());
    }
}
