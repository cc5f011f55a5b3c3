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

use super::FrameBufferSlot;
use super::FrameLayout;
use super::SlotId;
use super::SlotView;
use crate::*;

use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::MutexGuard;

/// A slot handed out by `FrameBufferPool::acquire`, with its storage.
#[derive(Debug)]
pub struct AcquiredSlot {
    pub id: SlotId,
    pub data: NonNull<u8>,
    pub capacity: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    slots: Vec<FrameBufferSlot>,
    // Stack of free slots; the most recently freed slot is reused first.
    free: Vec<SlotId>,
}

impl PoolState {
    fn slot_mut(&mut self, id: SlotId) -> DecoderResult<&mut FrameBufferSlot> {
        match self.slots.get_mut(id.index()) {
            Some(slot) => Ok(slot),
            None => DecoderError::invalid_slot(id.as_i32()),
        }
    }
}

/// Fixed-capacity set of reusable, reference counted frame buffers shared
/// between the decoder's worker threads and the caller's thread.
///
/// Concurrency contract: every operation takes the single pool-wide lock for
/// its whole duration, including any reallocation in `acquire`. No operation
/// blocks on another pool operation while holding it.
///
/// `flush` unconditionally destroys all storage. Callers must make sure that
/// the decoder has released every picture (by flushing or closing it) before
/// calling it; the pool does not check outstanding references.
#[derive(Debug)]
pub struct FrameBufferPool {
    max_frames: usize,
    state: Mutex<PoolState>,
}

impl Default for FrameBufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAMES)
    }
}

impl FrameBufferPool {
    pub fn new(max_frames: usize) -> Self {
        Self {
            max_frames,
            state: Mutex::new(PoolState {
                slots: Vec::with_capacity(max_frames),
                free: Vec::with_capacity(max_frames),
            }),
        }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panic while holding the lock cannot leave the counters half
        // updated, so a poisoned lock is still usable.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Hands out a free slot (or creates one while below capacity) whose
    /// storage holds at least |size| bytes. The returned slot has a reference
    /// count of 1.
    pub fn acquire(&self, size: usize, alignment: usize) -> DecoderResult<AcquiredSlot> {
        let mut state = self.lock();
        let id = match state.free.pop() {
            Some(id) => id,
            None => {
                if state.slots.len() >= self.max_frames {
                    // Maximum number of buffers is being used.
                    return DecoderError::out_of_memory();
                }
                let id = SlotId::new(internal_utils::u32_from_usize(state.slots.len())?);
                state.slots.push(FrameBufferSlot::new(id));
                log::trace!("frame buffer pool grew to {} slots", state.slots.len());
                id
            }
        };
        let slot = state.slot_mut(id)?;
        if let Err(err) = slot.maybe_reallocate(size, alignment) {
            // Keep the slot reusable instead of leaking it.
            state.free.push(id);
            return Err(err);
        }
        slot.add_reference();
        let capacity = slot.capacity();
        let data = match slot.data() {
            Some(buffer) => NonNull::new(buffer.as_ptr()),
            None => None,
        };
        match data {
            Some(data) => Ok(AcquiredSlot { id, data, capacity }),
            None => DecoderError::out_of_memory(),
        }
    }

    pub fn add_reference(&self, id: SlotId) -> DecoderResult<()> {
        let mut state = self.lock();
        let slot = state.slot_mut(id)?;
        if !slot.in_use() {
            // A free slot may be handed to the decoder at any time; reviving
            // it here would put it in the free stack and in use at once.
            return DecoderError::buffer_already_released();
        }
        slot.add_reference();
        Ok(())
    }

    pub fn release(&self, id: SlotId) -> DecoderResult<()> {
        let mut state = self.lock();
        let slot = state.slot_mut(id)?;
        if !slot.in_use() {
            return DecoderError::buffer_already_released();
        }
        slot.remove_reference();
        if !slot.in_use() {
            state.free.push(id);
        }
        Ok(())
    }

    /// Destroys every slot and its storage. See the type level documentation
    /// for the precondition.
    pub fn flush(&self) {
        let mut state = self.lock();
        log::debug!(
            "flushing frame buffer pool: {} slots, {} free",
            state.slots.len(),
            state.free.len()
        );
        state.slots.clear();
        state.free.clear();
    }

    /// O(1) lookup of a slot's bookkeeping. Not reference counted: callers
    /// must already hold a reference through other means.
    pub fn lookup(&self, id: SlotId) -> DecoderResult<SlotView> {
        let state = self.lock();
        match state.slots.get(id.index()) {
            Some(slot) => Ok(slot.view()),
            None => DecoderError::invalid_slot(id.as_i32()),
        }
    }

    pub(crate) fn set_frame_layout(&self, id: SlotId, frame: FrameLayout) -> DecoderResult<()> {
        let mut state = self.lock();
        let slot = state.slot_mut(id)?;
        let capacity = slot.capacity();
        for plane in &frame.planes[..frame.plane_count] {
            let span = internal_utils::plane_span(plane.stride, plane.width, plane.height)?;
            if plane.offset.checked_add(span).map_or(true, |end| end > capacity) {
                return DecoderError::invalid_argument();
            }
        }
        slot.set_frame(frame);
        Ok(())
    }

    /// Base address of a slot's storage, for resolving a `FrameLayout`.
    pub(crate) fn base_pointer(&self, id: SlotId) -> DecoderResult<*const u8> {
        let state = self.lock();
        match state.slots.get(id.index()).and_then(|slot| slot.data()) {
            Some(buffer) => Ok(buffer.as_ptr() as *const u8),
            None => DecoderError::invalid_slot(id.as_i32()),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn free_count(&self) -> usize {
        self.lock().free.len()
    }

    /// Sum of the reference counts of all slots.
    pub fn outstanding_references(&self) -> u32 {
        self.lock()
            .slots
            .iter()
            .map(|slot| slot.reference_count())
            .sum()
    }

    pub fn allocated_bytes(&self) -> usize {
        self.lock().slots.iter().map(|slot| slot.capacity()).sum()
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let state = self.lock();
        assert!(state.slots.len() <= self.max_frames);
        for slot in &state.slots {
            let free_entries = state.free.iter().filter(|id| **id == slot.id()).count();
            if slot.in_use() {
                assert_eq!(free_entries, 0, "slot {} is in use and free", slot.id());
            } else {
                assert_eq!(free_entries, 1, "slot {} is idle but not free", slot.id());
            }
        }
    }
}
