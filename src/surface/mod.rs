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

//! Output surfaces and the YV12 blit into a locked surface buffer.

mod memory;
#[cfg(target_os = "android")]
mod native_window;

pub use memory::MemorySurface;
#[cfg(target_os = "android")]
pub use native_window::NativeWindow;

use crate::internal_utils::*;
use crate::reformat::copy_plane;
use crate::*;

/// `ImageFormat.YV12`: Y plane, then V, then U. Chroma strides are half the
/// luma stride rounded up to 16.
pub const IMAGE_FORMAT_YV12: i32 = 0x32315659;

/// A locked surface buffer. |stride| is in pixels, which for YV12 is also
/// bytes.
#[derive(Debug)]
pub struct LockedBuffer<'a> {
    pub data: &'a mut [u8],
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

impl LockedBuffer<'_> {
    pub fn y_plane_size(&self) -> usize {
        self.stride * self.height
    }

    pub fn uv_stride(&self) -> usize {
        align_to_16(self.stride / 2)
    }

    pub fn uv_height(&self) -> usize {
        self.height.div_ceil(2)
    }

    /// Size of a complete YV12 buffer with this geometry.
    pub fn yv12_size(&self) -> usize {
        self.y_plane_size() + 2 * self.uv_stride() * self.uv_height()
    }
}

/// A window the decoder can render into.
pub trait RenderSurface {
    /// Whether |self| and |other| refer to the same underlying window.
    fn same_surface(&self, other: &Self) -> bool;
    fn set_buffers_geometry(&mut self, width: u32, height: u32, format: i32) -> DecoderResult<()>;
    fn lock(&mut self) -> DecoderResult<LockedBuffer<'_>>;
    fn unlock_and_post(&mut self) -> DecoderResult<()>;
}

/// One source plane for a blit.
#[derive(Debug, Clone, Copy)]
pub struct SourcePlane<'a> {
    pub data: &'a [u8],
    pub stride: usize,
    pub width: usize,
    pub height: usize,
}

/// 8-bit planar source frame. Missing chroma planes are rendered as neutral
/// grey.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceFrame<'a> {
    pub width: usize,
    pub height: usize,
    pub planes: [Option<SourcePlane<'a>>; MAX_PLANE_COUNT],
}

fn blit_plane(
    source: &Option<SourcePlane>,
    destination: &mut [u8],
    destination_stride: usize,
    max_width: usize,
    max_height: usize,
    fill_width: usize,
) -> DecoderResult<()> {
    match source {
        Some(source) => copy_plane(
            source.data,
            source.stride,
            destination,
            destination_stride,
            std::cmp::min(source.width, max_width),
            std::cmp::min(source.height, max_height),
        ),
        None => {
            for row in 0..max_height {
                let start = row * destination_stride;
                match destination.get_mut(start..start + fill_width) {
                    Some(row) => row.fill(128),
                    None => return DecoderError::invalid_argument(),
                }
            }
            Ok(())
        }
    }
}

/// Copies |frame| into a locked YV12 buffer: Y, then V, then U. Chroma rows
/// are limited to what both the source and the surface have.
pub fn render_planes(frame: &SourceFrame, buffer: &mut LockedBuffer) -> DecoderResult<()> {
    if buffer.data.len() < buffer.yv12_size() {
        return DecoderError::native_window_error();
    }
    let stride = buffer.stride;
    let width = std::cmp::min(frame.width, buffer.width);
    let height = std::cmp::min(frame.height, buffer.height);
    let y_plane_size = buffer.y_plane_size();
    let uv_stride = buffer.uv_stride();
    let uv_height = buffer.uv_height();
    let uv_width = std::cmp::min(frame.width.div_ceil(2), uv_stride);
    let chroma_rows = |plane: &Option<SourcePlane>| match plane {
        Some(plane) => std::cmp::min(uv_height, plane.height),
        None => std::cmp::min(uv_height, frame.height.div_ceil(2)),
    };

    let planes = &frame.planes;
    blit_plane(&planes[0], buffer.data, stride, width, height, width)?;
    let v_rows = chroma_rows(&planes[2]);
    blit_plane(
        &planes[2],
        &mut buffer.data[y_plane_size..],
        uv_stride,
        uv_width,
        v_rows,
        uv_width,
    )?;
    let v_plane_size = v_rows * uv_stride;
    blit_plane(
        &planes[1],
        &mut buffer.data[y_plane_size + v_plane_size..],
        uv_stride,
        uv_width,
        chroma_rows(&planes[1]),
        uv_width,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(data: &[u8], stride: usize, width: usize, height: usize) -> Option<SourcePlane<'_>> {
        Some(SourcePlane {
            data,
            stride,
            width,
            height,
        })
    }

    #[test]
    fn yv12_order_and_strides() {
        let y: Vec<u8> = (0..6 * 4).map(|x| x as u8).collect();
        let u = [10u8, 11, 12, 0, 13, 14, 15, 0];
        let v = [20u8, 21, 22, 0, 23, 24, 25, 0];
        let frame = SourceFrame {
            width: 6,
            height: 4,
            planes: [plane(&y, 6, 6, 4), plane(&u, 4, 3, 2), plane(&v, 4, 3, 2)],
        };
        // Stride 40 gives a 16-aligned chroma stride of 32.
        let mut data = vec![0u8; 40 * 4 + 2 * 32 * 2];
        let mut buffer = LockedBuffer {
            data: &mut data,
            width: 6,
            height: 4,
            stride: 40,
        };
        render_planes(&frame, &mut buffer).unwrap();
        assert_eq!(&data[0..6], &[0, 1, 2, 3, 4, 5]);
        assert_eq!(&data[40..46], &[6, 7, 8, 9, 10, 11]);
        assert_eq!(&data[160..163], &[20, 21, 22]);
        assert_eq!(&data[192..195], &[23, 24, 25]);
        assert_eq!(&data[224..227], &[10, 11, 12]);
        assert_eq!(&data[256..259], &[13, 14, 15]);
    }

    #[test]
    fn chroma_rows_are_limited_by_the_source() {
        let y = [1u8; 4 * 3];
        let u = [2u8; 2];
        let v = [3u8; 2];
        let frame = SourceFrame {
            width: 4,
            height: 3,
            planes: [plane(&y, 4, 4, 3), plane(&u, 2, 2, 1), plane(&v, 2, 2, 1)],
        };
        let mut data = vec![0u8; 16 * 3 + 2 * 16 * 2];
        let mut buffer = LockedBuffer {
            data: &mut data,
            width: 4,
            height: 3,
            stride: 16,
        };
        render_planes(&frame, &mut buffer).unwrap();
        // One V row, then U right after it.
        assert_eq!(&data[48..50], &[3, 3]);
        assert_eq!(&data[64..66], &[2, 2]);
        assert_eq!(&data[80..82], &[0, 0]);
    }

    #[test]
    fn monochrome_renders_grey_chroma() {
        let y = [9u8; 4 * 2];
        let frame = SourceFrame {
            width: 4,
            height: 2,
            planes: [plane(&y, 4, 4, 2), None, None],
        };
        let mut data = vec![0u8; 16 * 2 + 2 * 16];
        let mut buffer = LockedBuffer {
            data: &mut data,
            width: 4,
            height: 2,
            stride: 16,
        };
        render_planes(&frame, &mut buffer).unwrap();
        assert_eq!(&data[0..4], &[9; 4]);
        assert_eq!(&data[32..34], &[128, 128]);
        assert_eq!(&data[48..50], &[128, 128]);
    }

    #[test]
    fn short_surface_buffer_is_an_error() {
        let frame = SourceFrame::default();
        let mut data = vec![0u8; 10];
        let mut buffer = LockedBuffer {
            data: &mut data,
            width: 4,
            height: 2,
            stride: 16,
        };
        assert_eq!(
            render_planes(&frame, &mut buffer),
            Err(DecoderError::ANativeWindowError)
        );
    }
}
