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

// Not all functions are used from all test targets. So allow dead code in this module.
#![allow(dead_code)]

use dav1d_jni::allocator::*;
use dav1d_jni::codecs::*;
use dav1d_jni::session::*;
use dav1d_jni::*;

use std::collections::VecDeque;
use std::sync::Arc;

/// Pictures a `SyntheticDecoder` holds before it reports Again.
pub const QUEUE_CAPACITY: usize = 4;

/// Status returned for input that does not carry a valid header.
pub const MALFORMED_INPUT: i32 = -22;

const HEADER_SIZE: usize = 7;

/// Builds the input unit for one synthetic picture.
pub fn encode_frame(width: u16, height: u16, bit_depth: u8, layout: PixelLayout, seed: u8) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEADER_SIZE);
    data.extend_from_slice(&width.to_le_bytes());
    data.extend_from_slice(&height.to_le_bytes());
    data.push(bit_depth);
    data.push(match layout {
        PixelLayout::Yuv400 => 0,
        PixelLayout::Yuv420 => 1,
        PixelLayout::Yuv422 => 2,
        PixelLayout::Yuv444 => 3,
    });
    data.push(seed);
    data
}

/// Sample value the synthetic decoder writes at (x, y) of |plane|.
pub fn expected_sample(seed: u8, bit_depth: u8, plane: Plane, x: usize, y: usize) -> u16 {
    let range = if bit_depth > 8 { 1000 } else { 256 };
    ((usize::from(seed) + x + 2 * y + 50 * plane.to_usize()) % range) as u16
}

pub fn expected_sample_8bit(seed: u8, bit_depth: u8, plane: Plane, x: usize, y: usize) -> u8 {
    let value = expected_sample(seed, bit_depth, plane, x, y);
    if bit_depth > 8 {
        (value >> 2) as u8
    } else {
        value as u8
    }
}

struct Header {
    width: u32,
    height: u32,
    bit_depth: u8,
    layout: PixelLayout,
    seed: u8,
}

fn parse_header(data: &[u8]) -> Option<Header> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    let width = u32::from(u16::from_le_bytes([data[0], data[1]]));
    let height = u32::from(u16::from_le_bytes([data[2], data[3]]));
    let layout = match data[5] {
        0 => PixelLayout::Yuv400,
        1 => PixelLayout::Yuv420,
        2 => PixelLayout::Yuv422,
        3 => PixelLayout::Yuv444,
        _ => return None,
    };
    if width == 0 || height == 0 || !matches!(data[4], 8 | 10 | 12) {
        return None;
    }
    Some(Header {
        width,
        height,
        bit_depth: data[4],
        layout,
        seed: data[6],
    })
}

/// A picture produced by `SyntheticDecoder`. Its storage goes back to the
/// allocator when it is dropped.
pub struct SyntheticPicture {
    info: PictureInfo,
    allocator: Arc<dyn PictureAllocator>,
}

impl DecodedPicture for SyntheticPicture {
    fn info(&self) -> &PictureInfo {
        &self.info
    }
}

impl Drop for SyntheticPicture {
    fn drop(&mut self) {
        if let Some(slot) = self.info.slot {
            self.allocator.release_picture(slot);
        }
    }
}

/// `Decoder` that "decodes" a tiny header into a picture filled with a known
/// pattern, allocating through the session's allocator like libdav1d does.
pub struct SyntheticDecoder {
    allocator: Arc<dyn PictureAllocator>,
    queue: VecDeque<SyntheticPicture>,
    pub sent: usize,
}

impl SyntheticDecoder {
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    fn decode(&self, header: &Header, timestamp: i64) -> DecoderResult<SyntheticPicture> {
        let request = PictureRequest {
            width: header.width,
            height: header.height,
            bit_depth: header.bit_depth,
            layout: header.layout,
        };
        let allocation = self.allocator.alloc_picture(&request)?;
        let planes = allocation.planes.map(|plane| plane as *const u8);
        // The allocation stays valid until release_picture is called from
        // the picture's Drop.
        let info = unsafe {
            PictureInfo::from_raw_parts(
                header.width,
                header.height,
                header.bit_depth,
                header.layout,
                planes,
                allocation.strides,
                timestamp,
                Some(allocation.slot),
            )
        };
        for plane in &YUV_PLANES[..info.plane_count()] {
            let base = allocation.planes[plane.to_usize()];
            for y in 0..info.plane_height(*plane) {
                for x in 0..info.plane_width(*plane) {
                    let value = expected_sample(header.seed, header.bit_depth, *plane, x, y);
                    let offset = y * info.stride(*plane) + x * info.bytes_per_sample();
                    unsafe {
                        if header.bit_depth > 8 {
                            let bytes = value.to_ne_bytes();
                            *base.add(offset) = bytes[0];
                            *base.add(offset + 1) = bytes[1];
                        } else {
                            *base.add(offset) = value as u8;
                        }
                    }
                }
            }
        }
        Ok(SyntheticPicture {
            info,
            allocator: self.allocator.clone(),
        })
    }
}

impl Decoder for SyntheticDecoder {
    type Picture = SyntheticPicture;

    fn open(_settings: &Settings, allocator: Arc<dyn PictureAllocator>) -> DecoderResult<Self> {
        Ok(Self {
            allocator,
            queue: VecDeque::new(),
            sent: 0,
        })
    }

    fn send_data(&mut self, data: Vec<u8>, timestamp: i64) -> DecoderResult<SendStatus> {
        if data.is_empty() {
            return Ok(SendStatus::Consumed);
        }
        if self.queue.len() >= QUEUE_CAPACITY {
            return Ok(SendStatus::Again);
        }
        let header = parse_header(&data).ok_or(DecoderError::Library(MALFORMED_INPUT))?;
        let picture = self.decode(&header, timestamp)?;
        self.queue.push_back(picture);
        self.sent += 1;
        Ok(SendStatus::Consumed)
    }

    fn get_picture(&mut self) -> DecoderResult<Option<Self::Picture>> {
        Ok(self.queue.pop_front())
    }

    fn discard_pending(&mut self) {}

    fn flush(&mut self) {
        self.queue.clear();
    }
}

pub fn settings(render_mode: RenderMode) -> Settings {
    Settings {
        render_mode,
        dither: DitherMode::RemainderCarry,
        dither_seed: Some(7),
        ..Default::default()
    }
}
