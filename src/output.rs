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

/// Output mode of a decoder output buffer. Values match the player's
/// `C.VIDEO_OUTPUT_MODE_*` constants.
#[repr(i32)]
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub enum OutputMode {
    #[default]
    None = -1,
    Yuv = 0,
    SurfaceYuv = 1,
}

impl OutputMode {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => OutputMode::Yuv,
            1 => OutputMode::SurfaceYuv,
            _ => OutputMode::None,
        }
    }
}

pub const COLOR_SPACE_UNKNOWN: i32 = 0;

/// Caller-owned output descriptor a decoded picture is delivered into.
///
/// Every method may call back into the caller, so every method is fallible.
pub trait OutputBuffer {
    fn mode(&mut self) -> DecoderResult<OutputMode>;
    /// Resizes the data buffer for a frame of the given geometry. Ok(false)
    /// means the buffer could not be resized.
    fn init_for_yuv_frame(
        &mut self,
        width: u32,
        height: u32,
        y_stride: usize,
        uv_stride: usize,
        color_space: i32,
    ) -> DecoderResult<bool>;
    fn init_for_private_frame(&mut self, width: u32, height: u32) -> DecoderResult<()>;
    fn init(&mut self, timestamp: i64, mode: OutputMode) -> DecoderResult<()>;
    fn data(&mut self) -> DecoderResult<&mut [u8]>;
    fn width(&mut self) -> DecoderResult<u32>;
    fn height(&mut self) -> DecoderResult<u32>;
    fn yuv_strides(&mut self) -> DecoderResult<[usize; 2]>;
    /// Slot id of a frame delivered for direct rendering, or -1.
    fn decoder_private(&mut self) -> DecoderResult<i32>;
    fn set_decoder_private(&mut self, value: i32) -> DecoderResult<()>;
}

/// Native `OutputBuffer`.
#[derive(Debug)]
pub struct VideoFrame {
    pub mode: OutputMode,
    pub timestamp: i64,
    pub width: u32,
    pub height: u32,
    pub yuv_strides: [usize; 2],
    pub color_space: i32,
    pub decoder_private: i32,
    data: Vec<u8>,
}

impl Default for VideoFrame {
    fn default() -> Self {
        Self {
            mode: OutputMode::None,
            timestamp: 0,
            width: 0,
            height: 0,
            yuv_strides: [0, 0],
            color_space: COLOR_SPACE_UNKNOWN,
            decoder_private: -1,
            data: Vec::new(),
        }
    }
}

impl VideoFrame {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    // Size of a 4:2:0 frame with the given strides, if it is representable.
    fn yuv_frame_size(height: u32, y_stride: usize, uv_stride: usize) -> Option<usize> {
        let height = usize::try_from(height).ok()?;
        let y_size = y_stride.checked_mul(height)?;
        let uv_size = uv_stride.checked_mul(height.div_ceil(2))?;
        uv_size.checked_mul(2)?.checked_add(y_size)
    }
}

impl OutputBuffer for VideoFrame {
    fn mode(&mut self) -> DecoderResult<OutputMode> {
        Ok(self.mode)
    }

    fn init_for_yuv_frame(
        &mut self,
        width: u32,
        height: u32,
        y_stride: usize,
        uv_stride: usize,
        color_space: i32,
    ) -> DecoderResult<bool> {
        self.width = width;
        self.height = height;
        self.color_space = color_space;
        let size = match Self::yuv_frame_size(height, y_stride, uv_stride) {
            Some(size) => size,
            None => return Ok(false),
        };
        if self.data.len() < size {
            if self.data.try_reserve_exact(size - self.data.len()).is_err() {
                return Ok(false);
            }
            self.data.resize(size, 0);
        } else {
            self.data.truncate(size);
        }
        self.yuv_strides = [y_stride, uv_stride];
        Ok(true)
    }

    fn init_for_private_frame(&mut self, width: u32, height: u32) -> DecoderResult<()> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn init(&mut self, timestamp: i64, mode: OutputMode) -> DecoderResult<()> {
        self.timestamp = timestamp;
        self.mode = mode;
        Ok(())
    }

    fn data(&mut self) -> DecoderResult<&mut [u8]> {
        Ok(&mut self.data)
    }

    fn width(&mut self) -> DecoderResult<u32> {
        Ok(self.width)
    }

    fn height(&mut self) -> DecoderResult<u32> {
        Ok(self.height)
    }

    fn yuv_strides(&mut self) -> DecoderResult<[usize; 2]> {
        Ok(self.yuv_strides)
    }

    fn decoder_private(&mut self) -> DecoderResult<i32> {
        Ok(self.decoder_private)
    }

    fn set_decoder_private(&mut self, value: i32) -> DecoderResult<()> {
        self.decoder_private = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuv_frame_is_sized_for_4_2_0() {
        let mut frame = VideoFrame::new(OutputMode::Yuv);
        assert!(frame.init_for_yuv_frame(5, 5, 64, 32, COLOR_SPACE_UNKNOWN).unwrap());
        assert_eq!(frame.as_slice().len(), 64 * 5 + 2 * 32 * 3);
        assert_eq!(frame.yuv_strides().unwrap(), [64, 32]);
        assert!(frame.init_for_yuv_frame(2, 2, 16, 8, COLOR_SPACE_UNKNOWN).unwrap());
        assert_eq!(frame.as_slice().len(), 16 * 2 + 2 * 8);
        assert_eq!(frame.decoder_private().unwrap(), -1);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversized_frames_are_refused() {
        let mut frame = VideoFrame::new(OutputMode::Yuv);
        assert!(!frame
            .init_for_yuv_frame(1, u32::MAX, usize::MAX / 2, 0, COLOR_SPACE_UNKNOWN)
            .unwrap());
        assert!(!frame
            .init_for_yuv_frame(1, 1 << 20, 1 << 40, 0, COLOR_SPACE_UNKNOWN)
            .unwrap());
    }

    #[test]
    fn output_mode_from_integer() {
        assert_eq!(OutputMode::from_i32(0), OutputMode::Yuv);
        assert_eq!(OutputMode::from_i32(1), OutputMode::SurfaceYuv);
        assert_eq!(OutputMode::from_i32(7), OutputMode::None);
    }
}
