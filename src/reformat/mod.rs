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

pub mod dither;

pub use dither::DitherMode;
pub use dither::Ditherer;

use crate::codecs::PictureInfo;
use crate::internal_utils::*;
use crate::*;

/// Copies |height| rows of |width| bytes, advancing each side by its own
/// stride. Bytes between |width| and the destination stride are not touched.
pub fn copy_plane(
    source: &[u8],
    source_stride: usize,
    destination: &mut [u8],
    destination_stride: usize,
    width: usize,
    height: usize,
) -> DecoderResult<()> {
    if height == 0 || width == 0 {
        return Ok(());
    }
    if source_stride < width
        || destination_stride < width
        || plane_span(source_stride, width, height)? > source.len()
        || plane_span(destination_stride, width, height)? > destination.len()
    {
        return DecoderError::invalid_argument();
    }
    for row in 0..height {
        let src = row * source_stride;
        let dst = row * destination_stride;
        destination[dst..dst + width].copy_from_slice(&source[src..src + width]);
    }
    Ok(())
}

/// Layout of an 8-bit planar frame in an output byte buffer: Y, then U, then
/// V, each plane |stride * rows| bytes long. Chroma is always 4:2:0 sized.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct YuvBufferLayout {
    pub width: usize,
    pub height: usize,
    pub y_stride: usize,
    pub uv_stride: usize,
}

impl YuvBufferLayout {
    pub fn new(width: usize, height: usize, y_stride: usize, uv_stride: usize) -> Self {
        Self {
            width,
            height,
            y_stride,
            uv_stride,
        }
    }

    /// The buffer layout a picture is delivered in. Strides are the picture's
    /// own strides. Monochrome pictures get a 16-aligned chroma stride so that
    /// neutral chroma planes can be stored.
    pub fn for_picture(info: &PictureInfo) -> Self {
        let width = info.width as usize;
        let uv_stride = if info.layout.has_chroma() {
            info.stride(Plane::U)
        } else {
            align_to_16(width.div_ceil(2))
        };
        Self::new(width, info.height as usize, info.stride(Plane::Y), uv_stride)
    }

    pub fn plane_width(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => self.width,
            _ => self.width.div_ceil(2),
        }
    }

    pub fn plane_height(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => self.height,
            _ => self.height.div_ceil(2),
        }
    }

    pub fn stride(&self, plane: Plane) -> usize {
        match plane {
            Plane::Y => self.y_stride,
            _ => self.uv_stride,
        }
    }

    pub fn plane_offset(&self, plane: Plane) -> usize {
        let y_size = self.y_stride * self.height;
        match plane {
            Plane::Y => 0,
            Plane::U => y_size,
            Plane::V => y_size + self.uv_stride * self.plane_height(Plane::U),
        }
    }

    pub fn required_size(&self) -> DecoderResult<usize> {
        let y_size = self.y_stride.checked_mul(self.height);
        let uv_size = self.uv_stride.checked_mul(self.plane_height(Plane::U));
        match (y_size, uv_size) {
            (Some(y_size), Some(uv_size)) => uv_size
                .checked_mul(2)
                .and_then(|x| x.checked_add(y_size))
                .ok_or(DecoderError::InvalidArgument),
            _ => DecoderError::invalid_argument(),
        }
    }
}

fn plane_extent(info: &PictureInfo, layout: &YuvBufferLayout, plane: Plane) -> (usize, usize) {
    (
        std::cmp::min(info.plane_width(plane), layout.plane_width(plane)),
        std::cmp::min(info.plane_height(plane), layout.plane_height(plane)),
    )
}

fn copy_frame(
    info: &PictureInfo,
    layout: &YuvBufferLayout,
    destination: &mut [u8],
) -> DecoderResult<()> {
    for plane in &YUV_PLANES[..info.plane_count()] {
        let (width, height) = plane_extent(info, layout, *plane);
        copy_plane(
            info.plane_data(*plane)?,
            info.stride(*plane),
            &mut destination[layout.plane_offset(*plane)..],
            layout.stride(*plane),
            width,
            height,
        )?;
    }
    Ok(())
}

fn convert_frame_10_to_8(
    info: &PictureInfo,
    layout: &YuvBufferLayout,
    destination: &mut [u8],
    ditherer: &mut Ditherer,
) -> DecoderResult<()> {
    let mut row16: Vec<u16> = Vec::new();
    for plane in &YUV_PLANES[..info.plane_count()] {
        let (width, height) = plane_extent(info, layout, *plane);
        let source = info.plane_data(*plane)?;
        let source_stride = info.stride(*plane);
        let destination_stride = layout.stride(*plane);
        let destination = &mut destination[layout.plane_offset(*plane)..];
        if height == 0 || width == 0 {
            continue;
        }
        if destination_stride < width
            || plane_span(destination_stride, width, height)? > destination.len()
        {
            return DecoderError::invalid_argument();
        }
        row16.resize(width, 0);
        for row in 0..height {
            let src = &source[row * source_stride..row * source_stride + width * 2];
            for (sample, bytes) in row16.iter_mut().zip(src.chunks_exact(2)) {
                *sample = u16::from_ne_bytes([bytes[0], bytes[1]]);
            }
            let dst = row * destination_stride;
            ditherer.dither_row(&row16, &mut destination[dst..dst + width]);
        }
    }
    Ok(())
}

fn fill_neutral_chroma(layout: &YuvBufferLayout, destination: &mut [u8]) {
    for plane in [Plane::U, Plane::V] {
        let width = layout.plane_width(plane);
        let stride = layout.stride(plane);
        let offset = layout.plane_offset(plane);
        for row in 0..layout.plane_height(plane) {
            let start = offset + row * stride;
            destination[start..start + width].fill(128);
        }
    }
}

/// Writes |info| as 8-bit planes into |destination| laid out as
/// `YuvBufferLayout::for_picture(info)`. 10-bit pictures are dithered down.
pub fn write_frame_to_buffer(
    info: &PictureInfo,
    destination: &mut [u8],
    ditherer: &mut Ditherer,
) -> DecoderResult<()> {
    let layout = YuvBufferLayout::for_picture(info);
    if destination.len() < layout.required_size()? {
        return DecoderError::buffer_resize_error();
    }
    match info.bit_depth {
        8 => copy_frame(info, &layout, destination)?,
        10 => convert_frame_10_to_8(info, &layout, destination, ditherer)?,
        _ => return DecoderError::bit_depth_12_not_supported_with_yuv(),
    }
    if !info.layout.has_chroma() {
        fill_neutral_chroma(&layout, destination);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;
    use test_case::test_matrix;

    #[test_matrix([1, 7, 16], [1, 3, 9], [0, 5])]
    fn copy_plane_leaves_padding_untouched(width: usize, height: usize, padding: usize) {
        let mut rng = rand::thread_rng();
        let stride = width + padding;
        let source: Vec<u8> = (0..stride * height).map(|_| rng.gen()).collect();
        let mut destination = vec![0xAAu8; stride * height];
        copy_plane(&source, stride, &mut destination, stride, width, height).unwrap();
        for row in 0..height {
            for col in 0..stride {
                let index = row * stride + col;
                if col < width {
                    assert_eq!(destination[index], source[index]);
                } else {
                    assert_eq!(destination[index], 0xAA);
                }
            }
        }
    }

    #[test]
    fn copy_plane_checks_bounds() {
        let source = [0u8; 10];
        let mut destination = [0u8; 10];
        assert!(copy_plane(&source, 4, &mut destination, 4, 4, 3).is_err());
        assert!(copy_plane(&source, 4, &mut destination, 4, 2, 3).is_ok());
        assert!(copy_plane(&source, 2, &mut destination, 4, 3, 2).is_err());
    }

    #[test]
    fn buffer_layout_offsets() {
        let layout = YuvBufferLayout::new(5, 3, 8, 4);
        assert_eq!(layout.plane_offset(Plane::U), 24);
        assert_eq!(layout.plane_offset(Plane::V), 32);
        assert_eq!(layout.required_size().unwrap(), 40);
        assert_eq!(layout.plane_width(Plane::V), 3);
    }

    fn picture(
        bit_depth: u8,
        layout: PixelLayout,
        planes: &[Vec<u8>; 3],
        strides: [usize; 2],
    ) -> PictureInfo {
        let ptr = |plane: &Vec<u8>| {
            if plane.is_empty() {
                std::ptr::null()
            } else {
                plane.as_ptr()
            }
        };
        // # Safety: the planes outlive the returned value in every test.
        unsafe {
            PictureInfo::from_raw_parts(
                4,
                2,
                bit_depth,
                layout,
                [ptr(&planes[0]), ptr(&planes[1]), ptr(&planes[2])],
                strides,
                0,
                None,
            )
        }
    }

    #[test]
    fn writes_8_bit_frames_plane_by_plane() {
        let planes = [
            (0..16).collect::<Vec<u8>>(),
            vec![100, 101, 0, 0],
            vec![200, 201, 0, 0],
        ];
        let info = picture(8, PixelLayout::Yuv420, &planes, [8, 4]);
        let mut destination = vec![0xEEu8; 8 * 2 + 4 * 2];
        let mut ditherer = Ditherer::new(DitherMode::RemainderCarry, None);
        write_frame_to_buffer(&info, &mut destination, &mut ditherer).unwrap();
        assert_eq!(&destination[0..4], &[0, 1, 2, 3]);
        assert_eq!(&destination[4..8], &[0xEE; 4]);
        assert_eq!(&destination[8..12], &[8, 9, 10, 11]);
        assert_eq!(&destination[16..18], &[100, 101]);
        assert_eq!(&destination[20..22], &[200, 201]);
    }

    #[test]
    fn writes_10_bit_frames_with_source_strides() {
        let luma: Vec<u8> = [400u16, 401, 402, 403, 0, 0, 8, 12, 16, 1023, 0, 0]
            .iter()
            .flat_map(|x| x.to_ne_bytes())
            .collect();
        let chroma = |value: u16| -> Vec<u8> {
            [value, value, 0, 0]
                .iter()
                .flat_map(|x| x.to_ne_bytes())
                .collect()
        };
        let planes = [luma, chroma(512), chroma(4)];
        let info = picture(10, PixelLayout::Yuv420, &planes, [12, 8]);
        let layout = YuvBufferLayout::for_picture(&info);
        assert_eq!(layout.required_size().unwrap(), 12 * 2 + 8 * 2);
        let mut destination = vec![0u8; 40];
        let mut ditherer = Ditherer::new(DitherMode::RemainderCarry, None);
        write_frame_to_buffer(&info, &mut destination, &mut ditherer).unwrap();
        assert_eq!(&destination[0..4], &[100, 100, 100, 100]);
        assert_eq!(&destination[12..16], &[2, 3, 4, 255]);
        assert_eq!(&destination[24..26], &[128, 128]);
        assert_eq!(&destination[32..34], &[1, 1]);
    }

    #[test]
    fn monochrome_gets_neutral_chroma() {
        let planes = [vec![7u8; 8], vec![], vec![]];
        let info = picture(8, PixelLayout::Yuv400, &planes, [4, 0]);
        let layout = YuvBufferLayout::for_picture(&info);
        assert_eq!(layout.uv_stride, 16);
        let mut destination = vec![0u8; layout.required_size().unwrap()];
        let mut ditherer = Ditherer::new(DitherMode::RemainderCarry, None);
        write_frame_to_buffer(&info, &mut destination, &mut ditherer).unwrap();
        assert_eq!(&destination[0..8], &[7; 8]);
        assert_eq!(&destination[8..10], &[128, 128]);
        assert_eq!(&destination[10..24], &[0; 14]);
        assert_eq!(&destination[24..26], &[128, 128]);
    }

    #[test]
    fn rejects_deep_pictures_and_small_buffers() {
        let planes = [vec![0u8; 32], vec![0u8; 16], vec![0u8; 16]];
        let info = picture(12, PixelLayout::Yuv420, &planes, [16, 8]);
        let mut ditherer = Ditherer::new(DitherMode::RemainderCarry, None);
        let mut destination = vec![0u8; 64];
        assert_eq!(
            write_frame_to_buffer(&info, &mut destination, &mut ditherer),
            Err(DecoderError::BitDepth12NotSupportedWithYuv)
        );
        let mut destination = vec![0u8; 47];
        assert_eq!(
            write_frame_to_buffer(&info, &mut destination, &mut ditherer),
            Err(DecoderError::BufferResizeError)
        );
    }
}
