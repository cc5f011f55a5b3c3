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

use crate::*;

use std::alloc::Layout;
use std::ptr::NonNull;

/// Heap storage with a caller-chosen alignment, released on drop.
#[derive(Debug)]
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// # Safety: AlignedBuffer uniquely owns its allocation, like a Box<[u8]>.
unsafe impl Send for AlignedBuffer {}
// # Safety: Shared access only hands out shared slices.
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    pub fn try_new(size: usize, alignment: usize) -> DecoderResult<Self> {
        if size == 0 || !alignment.is_power_of_two() {
            return DecoderError::invalid_argument();
        }
        let layout = match Layout::from_size_align(size, alignment) {
            Ok(layout) => layout,
            Err(_) => return DecoderError::out_of_memory(),
        };
        // # Safety: layout has a non-zero size. The memory is zeroed so that
        // slices over it never expose uninitialized bytes.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, layout }),
            None => DecoderError::out_of_memory(),
        }
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn as_slice(&self) -> &[u8] {
        // # Safety: ptr is valid for len() initialized bytes for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // # Safety: ptr is valid for len() initialized bytes and self is borrowed mutably.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // # Safety: ptr was allocated in try_new() with exactly this layout.
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
