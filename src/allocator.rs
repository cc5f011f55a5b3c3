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

//! Pull-model picture allocation: the decoder asks for storage for one
//! picture and gets plane pointers into a pooled, aligned buffer.

use crate::buffer::FrameBufferPool;
use crate::internal_utils::*;
use crate::session::StatusRegister;
use crate::*;

use std::sync::Arc;

/// What the decoder asks storage for.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PictureRequest {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub layout: PixelLayout,
}

/// Strides and sizes for one picture, padded the same way the decoder's
/// default allocator pads them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PictureGeometry {
    pub y_stride: usize,
    pub uv_stride: usize,
    pub y_size: usize,
    pub uv_size: usize,
    pub total_size: usize,
}

impl PictureGeometry {
    pub fn compute(request: &PictureRequest) -> DecoderResult<Self> {
        let high_bit_depth = request.bit_depth > 8;
        let aligned_width = round_up(usize_from_u32(request.width)?, 128);
        let aligned_height = round_up(usize_from_u32(request.height)?, 128);
        let has_chroma = request.layout.has_chroma();
        let mut y_stride = aligned_width << usize::from(high_bit_depth);
        let mut uv_stride =
            if has_chroma { y_stride >> request.layout.chroma_shift_x() } else { 0 };
        // Strides that are multiples of 1024 map consecutive rows of a
        // superblock onto the same cache sets. Pad them slightly.
        if y_stride % 1024 == 0 {
            y_stride += PICTURE_ALIGNMENT;
        }
        if has_chroma && uv_stride % 1024 == 0 {
            uv_stride += PICTURE_ALIGNMENT;
        }
        let y_size = y_stride
            .checked_mul(aligned_height)
            .ok_or(DecoderError::OutOfMemory)?;
        let uv_size = uv_stride
            .checked_mul(aligned_height >> request.layout.chroma_shift_y())
            .ok_or(DecoderError::OutOfMemory)?;
        let total_size = uv_size
            .checked_mul(2)
            .and_then(|x| x.checked_add(y_size))
            .and_then(|x| x.checked_add(PICTURE_ALIGNMENT))
            .ok_or(DecoderError::OutOfMemory)?;
        Ok(Self {
            y_stride,
            uv_stride,
            y_size,
            uv_size,
            total_size,
        })
    }
}

/// Storage handed back to the decoder for one picture. Chroma pointers are
/// null for monochrome pictures.
#[derive(Debug, Clone, Copy)]
pub struct PictureAllocation {
    pub slot: SlotId,
    pub planes: [*mut u8; MAX_PLANE_COUNT],
    pub strides: [usize; 2],
}

/// The allocator callback pair a decoder backend forwards to. Called from the
/// decoder's worker threads.
pub trait PictureAllocator: Send + Sync {
    fn alloc_picture(&self, request: &PictureRequest) -> DecoderResult<PictureAllocation>;
    fn release_picture(&self, slot: SlotId);
}

/// `PictureAllocator` backed by a session's frame buffer pool. Failures are
/// recorded in the session's wrapper status in addition to being returned.
pub struct PoolAllocator {
    pool: Arc<FrameBufferPool>,
    status: Arc<StatusRegister>,
}

impl PoolAllocator {
    pub fn new(pool: Arc<FrameBufferPool>, status: Arc<StatusRegister>) -> Self {
        Self { pool, status }
    }

    fn alloc_impl(&self, request: &PictureRequest) -> DecoderResult<PictureAllocation> {
        let geometry = PictureGeometry::compute(request)?;
        let slot = self
            .pool
            .acquire(geometry.total_size, PICTURE_ALIGNMENT)?;
        let base = slot.data.as_ptr();
        let mut planes = [std::ptr::null_mut(); MAX_PLANE_COUNT];
        planes[0] = base;
        if request.layout.has_chroma() {
            // # Safety: total_size covers y_size + 2 * uv_size and the slot's
            // capacity is at least total_size.
            unsafe {
                planes[1] = base.add(geometry.y_size);
                planes[2] = base.add(geometry.y_size + geometry.uv_size);
            }
        }
        Ok(PictureAllocation {
            slot: slot.id,
            planes,
            strides: [geometry.y_stride, geometry.uv_stride],
        })
    }
}

impl PictureAllocator for PoolAllocator {
    fn alloc_picture(&self, request: &PictureRequest) -> DecoderResult<PictureAllocation> {
        let result = self.alloc_impl(request);
        match &result {
            Ok(_) => self.status.set_status(Status::Ok),
            Err(err) => {
                self.status.record(err);
                log::error!("{err}");
            }
        }
        result
    }

    fn release_picture(&self, slot: SlotId) {
        match self.pool.release(slot) {
            Ok(()) => self.status.set_status(Status::Ok),
            Err(err) => {
                self.status.record(&err);
                log::error!("{err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn request(width: u32, height: u32, bit_depth: u8, layout: PixelLayout) -> PictureRequest {
        PictureRequest {
            width,
            height,
            bit_depth,
            layout,
        }
    }

    // (width, height, bit depth, layout) => (y_stride, uv_stride, total_size)
    #[test_case(1920, 1080, 8, PixelLayout::Yuv420, 1920, 960, 1920 * 1152 + 2 * 960 * 576 + 64; "1080p")]
    #[test_case(2000, 64, 8, PixelLayout::Yuv420, 2048 + 64, 1024 + 64, 2112 * 128 + 2 * 1088 * 64 + 64; "padded strides")]
    #[test_case(1280, 720, 8, PixelLayout::Yuv420, 1280, 640, 1280 * 768 + 2 * 640 * 384 + 64; "720p")]
    #[test_case(1280, 720, 10, PixelLayout::Yuv420, 2560, 1280, 2560 * 768 + 2 * 1280 * 384 + 64; "720p 10 bit")]
    #[test_case(100, 50, 8, PixelLayout::Yuv400, 128, 0, 128 * 128 + 64; "monochrome")]
    #[test_case(512, 64, 8, PixelLayout::Yuv444, 512, 512, 512 * 128 * 3 + 64; "444")]
    #[test_case(1024, 128, 8, PixelLayout::Yuv422, 1088, 512, 1088 * 128 + 2 * 512 * 128 + 64; "422 padded luma")]
    fn geometry(
        width: u32,
        height: u32,
        bit_depth: u8,
        layout: PixelLayout,
        y_stride: usize,
        uv_stride: usize,
        total_size: usize,
    ) {
        let geometry = PictureGeometry::compute(&request(width, height, bit_depth, layout)).unwrap();
        assert_eq!(geometry.y_stride, y_stride);
        assert_eq!(geometry.uv_stride, uv_stride);
        assert_eq!(geometry.total_size, total_size);
    }

    #[test]
    fn allocation_places_planes_back_to_back() {
        let pool = Arc::new(FrameBufferPool::new(2));
        let status = Arc::new(StatusRegister::default());
        let allocator = PoolAllocator::new(pool.clone(), status.clone());
        let allocation = allocator
            .alloc_picture(&request(64, 64, 8, PixelLayout::Yuv420))
            .unwrap();
        assert_eq!(allocation.strides, [128, 64]);
        let base = allocation.planes[0] as usize;
        assert_eq!(base % PICTURE_ALIGNMENT, 0);
        assert_eq!(allocation.planes[1] as usize - base, 128 * 128);
        assert_eq!(allocation.planes[2] as usize - base, 128 * 128 + 64 * 64);
        assert_eq!(pool.lookup(allocation.slot).unwrap().reference_count, 1);

        let mono = allocator
            .alloc_picture(&request(64, 64, 8, PixelLayout::Yuv400))
            .unwrap();
        assert!(mono.planes[1].is_null() && mono.planes[2].is_null());

        allocator.release_picture(allocation.slot);
        allocator.release_picture(mono.slot);
        assert_eq!(pool.outstanding_references(), 0);
        assert_eq!(status.status(), Status::Ok);
    }

    #[test]
    fn failures_are_recorded_in_the_status() {
        let pool = Arc::new(FrameBufferPool::new(1));
        let status = Arc::new(StatusRegister::default());
        let allocator = PoolAllocator::new(pool, status.clone());
        let first = allocator
            .alloc_picture(&request(16, 16, 8, PixelLayout::Yuv420))
            .unwrap();
        assert_eq!(
            allocator
                .alloc_picture(&request(16, 16, 8, PixelLayout::Yuv420))
                .err(),
            Some(DecoderError::OutOfMemory)
        );
        assert_eq!(status.status(), Status::OutOfMemory);
        allocator.release_picture(first.slot);
        allocator.release_picture(first.slot);
        assert_eq!(status.status(), Status::BufferAlreadyReleased);
    }
}
