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

#[cfg(feature = "dav1d")]
pub mod dav1d;

use crate::allocator::PictureAllocator;
use crate::internal_utils::*;
use crate::session::Settings;
use crate::*;

use std::sync::Arc;

/// Outcome of handing compressed data to a decoder.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum SendStatus {
    /// The decoder took all of the data.
    Consumed,
    /// The decoder is full. The data was dropped and must be sent again after
    /// pictures have been drained.
    Again,
}

/// Read-only description of a decoded picture. Plane data is borrowed from
/// the picture that owns this value.
#[derive(Debug)]
pub struct PictureInfo {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub layout: PixelLayout,
    pub strides: [usize; 2],
    pub timestamp: i64,
    /// Pool slot backing the planes, when the picture was allocated by a
    /// `PoolAllocator`.
    pub slot: Option<SlotId>,
    planes: [*const u8; MAX_PLANE_COUNT],
}

impl PictureInfo {
    /// # Safety
    /// Every non-null entry of |planes| must be valid for reads of
    /// `stride * (rows - 1) + row_bytes` bytes of its plane for as long as
    /// this value is alive, and must not be written to during that time.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn from_raw_parts(
        width: u32,
        height: u32,
        bit_depth: u8,
        layout: PixelLayout,
        planes: [*const u8; MAX_PLANE_COUNT],
        strides: [usize; 2],
        timestamp: i64,
        slot: Option<SlotId>,
    ) -> Self {
        Self {
            width,
            height,
            bit_depth,
            layout,
            strides,
            timestamp,
            slot,
            planes,
        }
    }

    pub fn plane_count(&self) -> usize {
        self.layout.plane_count()
    }

    pub fn bytes_per_sample(&self) -> usize {
        if self.bit_depth > 8 {
            2
        } else {
            1
        }
    }

    /// Width of |plane| in samples.
    pub fn plane_width(&self, plane: Plane) -> usize {
        let width = self.width as usize;
        match plane {
            Plane::Y => width,
            _ => {
                let shift = self.layout.chroma_shift_x();
                (width + (1 << shift) - 1) >> shift
            }
        }
    }

    pub fn plane_height(&self, plane: Plane) -> usize {
        let height = self.height as usize;
        match plane {
            Plane::Y => height,
            _ => {
                let shift = self.layout.chroma_shift_y();
                (height + (1 << shift) - 1) >> shift
            }
        }
    }

    pub fn stride(&self, plane: Plane) -> usize {
        self.strides[plane.stride_index()]
    }

    pub(crate) fn plane_ptr(&self, plane: Plane) -> *const u8 {
        self.planes[plane.to_usize()]
    }

    /// Bytes of |plane|, from its first sample to the last sample of its
    /// last row.
    pub fn plane_data(&self, plane: Plane) -> DecoderResult<&[u8]> {
        if plane.to_usize() >= self.plane_count() {
            return DecoderError::invalid_num_of_planes();
        }
        let ptr = self.plane_ptr(plane);
        if ptr.is_null() {
            return DecoderError::invalid_num_of_planes();
        }
        let row_bytes = self.plane_width(plane) * self.bytes_per_sample();
        let size = plane_span(self.stride(plane), row_bytes, self.plane_height(plane))?;
        // # Safety: guaranteed by the contract of from_raw_parts.
        Ok(unsafe { std::slice::from_raw_parts(ptr, size) })
    }

    /// Fails with InvalidNumOfPlanes unless every plane the layout needs is
    /// present.
    pub fn validate_planes(&self) -> DecoderResult<()> {
        for plane in &YUV_PLANES[..self.plane_count()] {
            self.plane_data(*plane)?;
        }
        if self.stride(Plane::Y) < self.plane_width(Plane::Y) * self.bytes_per_sample() {
            return DecoderError::invalid_argument();
        }
        Ok(())
    }
}

/// A picture returned by a decoder. Dropping it hands it back to the decoder,
/// which releases its storage through the allocator.
pub trait DecodedPicture {
    fn info(&self) -> &PictureInfo;
}

pub trait Decoder: Sized {
    type Picture: DecodedPicture;

    fn open(settings: &Settings, allocator: Arc<dyn PictureAllocator>) -> DecoderResult<Self>;
    // Hands |data| to the decoder. It is dropped if the decoder reports Again.
    fn send_data(&mut self, data: Vec<u8>, timestamp: i64) -> DecoderResult<SendStatus>;
    // Ok(None) means no picture is ready yet.
    fn get_picture(&mut self) -> DecoderResult<Option<Self::Picture>>;
    // Drops any input that was sent but not yet consumed.
    fn discard_pending(&mut self);
    // Drops all internal state. Every picture reference the decoder holds is
    // released before this returns.
    fn flush(&mut self);
    // Destruction must be implemented using Drop.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_chroma_plane_is_reported() {
        let luma = vec![0u8; 64 * 8];
        // # Safety: luma outlives info and the chroma pointers are null.
        let info = unsafe {
            PictureInfo::from_raw_parts(
                8,
                8,
                8,
                PixelLayout::Yuv420,
                [luma.as_ptr(), std::ptr::null(), std::ptr::null()],
                [64, 32],
                0,
                None,
            )
        };
        assert_eq!(info.plane_data(Plane::Y).unwrap().len(), 64 * 7 + 8);
        assert_eq!(info.validate_planes(), Err(DecoderError::InvalidNumOfPlanes));
    }

    #[test]
    fn chroma_dimensions_follow_the_layout() {
        // # Safety: no plane is ever read.
        let info = |layout| unsafe {
            PictureInfo::from_raw_parts(
                17,
                9,
                10,
                layout,
                [std::ptr::null(); MAX_PLANE_COUNT],
                [64, 64],
                0,
                None,
            )
        };
        let yuv420 = info(PixelLayout::Yuv420);
        assert_eq!((yuv420.plane_width(Plane::U), yuv420.plane_height(Plane::U)), (9, 5));
        let yuv422 = info(PixelLayout::Yuv422);
        assert_eq!((yuv422.plane_width(Plane::V), yuv422.plane_height(Plane::V)), (9, 9));
        let yuv444 = info(PixelLayout::Yuv444);
        assert_eq!((yuv444.plane_width(Plane::U), yuv444.plane_height(Plane::U)), (17, 9));
        assert_eq!(info(PixelLayout::Yuv400).plane_count(), 1);
        assert_eq!(yuv420.bytes_per_sample(), 2);
    }
}
