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

use super::*;

use ndk_sys::ANativeWindow;
use ndk_sys::ANativeWindow_Buffer;

use std::ptr::NonNull;

/// An acquired `ANativeWindow`. The reference is released on drop.
#[derive(Debug)]
pub struct NativeWindow {
    window: NonNull<ANativeWindow>,
    locked: bool,
}

// # Safety: ANativeWindow functions may be called from any thread.
unsafe impl Send for NativeWindow {}

impl NativeWindow {
    /// Acquires the window behind a `android.view.Surface`.
    ///
    /// # Safety
    /// |env| must be a valid JNI environment for the current thread and
    /// |surface| a live reference to a Surface object.
    pub unsafe fn from_surface(
        env: *mut ndk_sys::JNIEnv,
        surface: ndk_sys::jobject,
    ) -> DecoderResult<Self> {
        // # Safety: guaranteed by the caller.
        let window = unsafe { ndk_sys::ANativeWindow_fromSurface(env, surface) };
        match NonNull::new(window) {
            Some(window) => Ok(Self {
                window,
                locked: false,
            }),
            None => DecoderError::native_window_error(),
        }
    }
}

impl Drop for NativeWindow {
    fn drop(&mut self) {
        // # Safety: Calling a C function with valid parameters. self owns one
        // reference to the window.
        unsafe {
            if self.locked {
                ndk_sys::ANativeWindow_unlockAndPost(self.window.as_ptr());
            }
            ndk_sys::ANativeWindow_release(self.window.as_ptr());
        }
    }
}

impl RenderSurface for NativeWindow {
    fn same_surface(&self, other: &Self) -> bool {
        self.window == other.window
    }

    fn set_buffers_geometry(&mut self, width: u32, height: u32, format: i32) -> DecoderResult<()> {
        let width = i32_from_u32(width)?;
        let height = i32_from_u32(height)?;
        // # Safety: Calling a C function with valid parameters.
        let ret = unsafe {
            ndk_sys::ANativeWindow_setBuffersGeometry(self.window.as_ptr(), width, height, format)
        };
        if ret != 0 {
            log::error!("ANativeWindow_setBuffersGeometry returned {ret}");
            return DecoderError::native_window_error();
        }
        Ok(())
    }

    fn lock(&mut self) -> DecoderResult<LockedBuffer<'_>> {
        // # Safety: Zero initializing a C-struct. It is populated by
        // ANativeWindow_lock.
        let mut buffer: ANativeWindow_Buffer = unsafe { std::mem::zeroed() };
        // # Safety: Calling a C function with valid parameters.
        let ret = unsafe {
            ndk_sys::ANativeWindow_lock(self.window.as_ptr(), &mut buffer, std::ptr::null_mut())
        };
        if ret != 0 {
            log::error!("ANativeWindow_lock returned {ret}");
            return DecoderError::native_window_error();
        }
        if buffer.bits.is_null() {
            // # Safety: Calling a C function with valid parameters. The window
            // was locked above.
            unsafe { ndk_sys::ANativeWindow_unlockAndPost(self.window.as_ptr()) };
            return DecoderError::native_window_error();
        }
        self.locked = true;
        let width = usize_from_i32(buffer.width)?;
        let height = usize_from_i32(buffer.height)?;
        let stride = usize_from_i32(buffer.stride)?;
        let mut locked = LockedBuffer {
            data: &mut [],
            width,
            height,
            stride,
        };
        let size = locked.yv12_size();
        // # Safety: a locked YV12 window buffer holds stride * height luma
        // bytes followed by two chroma planes of 16-aligned half stride. It
        // stays mapped until unlock_and_post, which needs &mut self.
        locked.data = unsafe { std::slice::from_raw_parts_mut(buffer.bits as *mut u8, size) };
        Ok(locked)
    }

    fn unlock_and_post(&mut self) -> DecoderResult<()> {
        if !self.locked {
            return DecoderError::native_window_error();
        }
        self.locked = false;
        // # Safety: Calling a C function with valid parameters.
        let ret = unsafe { ndk_sys::ANativeWindow_unlockAndPost(self.window.as_ptr()) };
        if ret != 0 {
            log::error!("ANativeWindow_unlockAndPost returned {ret}");
            return DecoderError::native_window_error();
        }
        Ok(())
    }
}
