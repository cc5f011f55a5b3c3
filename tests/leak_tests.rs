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

use dav1d_jni::output::*;
use dav1d_jni::session::*;
use dav1d_jni::surface::MemorySurface;
use dav1d_jni::*;

use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::cell::Cell;

mod utils;
use utils::*;

// Counts live heap bytes per thread, so the test harness's own threads do
// not disturb the measurement.
struct CountingAllocator;

thread_local! {
    static LIVE_BYTES: Cell<isize> = const { Cell::new(0) };
}

fn adjust(delta: isize) {
    let _ = LIVE_BYTES.try_with(|live| live.set(live.get() + delta));
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = unsafe { System.alloc(layout) };
        if !ptr.is_null() {
            adjust(layout.size() as isize);
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) };
        adjust(-(layout.size() as isize));
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn live_bytes() -> isize {
    LIVE_BYTES.with(|live| live.get())
}

fn run_session(render_mode: RenderMode) {
    let mut session = Session::<SyntheticDecoder, MemorySurface>::open(&settings(render_mode)).unwrap();
    let mut frame = VideoFrame::new(OutputMode::SurfaceYuv);
    for index in 0..20u8 {
        let (width, bit_depth) = if index % 5 == 4 { (96, 10) } else { (64, 8) };
        let data = encode_frame(width, 36, bit_depth, PixelLayout::Yuv420, index);
        assert_eq!(session.decode(&data, index.into(), index == 10), Ok(DecodeStatus::Ok));
        assert_eq!(session.get_frame(&mut frame, false), Ok(FrameStatus::Ok));
        session
            .render_frame(Some(MemorySurface::new(u64::from(index / 7))), &mut frame)
            .unwrap();
        session.release_frame(&mut frame).unwrap();
    }
    // Close with a picture still queued in the decoder.
    let data = encode_frame(64, 36, 8, PixelLayout::Yuv420, 0);
    assert_eq!(session.decode(&data, 0, false), Ok(DecodeStatus::Ok));
    assert_eq!(session.decode(&data, 1, false), Ok(DecodeStatus::Ok));
    assert_eq!(session.get_frame(&mut frame, false), Ok(FrameStatus::Ok));
}

#[test]
fn sessions_release_all_memory() {
    for render_mode in [RenderMode::DirectToSurface, RenderMode::ConvertThenBuffer] {
        let before = live_bytes();
        run_session(render_mode);
        assert_eq!(live_bytes(), before, "{render_mode:?}");
    }
}
