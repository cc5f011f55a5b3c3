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

/// A `RenderSurface` backed by host memory, laid out like an Android YV12
/// window buffer (luma stride rounded up to 16).
#[derive(Debug, Default)]
pub struct MemorySurface {
    id: u64,
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<u8>,
    locked: bool,
    geometry_changes: u32,
    posted_frames: u32,
}

impl MemorySurface {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn geometry(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn geometry_changes(&self) -> u32 {
        self.geometry_changes
    }

    pub fn posted_frames(&self) -> u32 {
        self.posted_frames
    }

    /// Rows of |plane| as last posted.
    pub fn plane(&self, plane: Plane) -> &[u8] {
        let y_size = self.stride * self.height;
        let uv_size = align_to_16(self.stride / 2) * self.height.div_ceil(2);
        let (start, size) = match plane {
            Plane::Y => (0, y_size),
            Plane::V => (y_size, uv_size),
            Plane::U => (y_size + uv_size, uv_size),
        };
        &self.data[start..start + size]
    }

    pub fn plane_stride(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => self.stride,
            _ => align_to_16(self.stride / 2),
        }
    }
}

impl RenderSurface for MemorySurface {
    fn same_surface(&self, other: &Self) -> bool {
        self.id == other.id
    }

    fn set_buffers_geometry(&mut self, width: u32, height: u32, format: i32) -> DecoderResult<()> {
        if width == 0 || height == 0 || format != IMAGE_FORMAT_YV12 || self.locked {
            return DecoderError::native_window_error();
        }
        self.width = usize_from_u32(width)?;
        self.height = usize_from_u32(height)?;
        self.stride = align_to_16(self.width);
        let size = self.stride * self.height
            + 2 * align_to_16(self.stride / 2) * self.height.div_ceil(2);
        self.data = vec![0u8; size];
        self.geometry_changes += 1;
        Ok(())
    }

    fn lock(&mut self) -> DecoderResult<LockedBuffer<'_>> {
        if self.locked || self.data.is_empty() {
            return DecoderError::native_window_error();
        }
        self.locked = true;
        Ok(LockedBuffer {
            data: &mut self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
        })
    }

    fn unlock_and_post(&mut self) -> DecoderResult<()> {
        if !self.locked {
            return DecoderError::native_window_error();
        }
        self.locked = false;
        self.posted_frames += 1;
        Ok(())
    }
}
