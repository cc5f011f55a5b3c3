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

pub mod allocator;
pub mod buffer;
pub mod codecs;
pub mod output;
pub mod reformat;
pub mod session;
pub mod surface;
pub mod utils;

mod internal_utils;

#[cfg(all(feature = "jni", target_os = "android"))]
mod jni_bridge;

pub use buffer::SlotId;
pub use output::OutputMode;
pub use reformat::DitherMode;
pub use utils::error::*;

/// Alignment (in bytes) of every picture buffer handed to the decoder.
pub const PICTURE_ALIGNMENT: usize = 64;

/// Default number of frame buffer slots a session may create.
pub const DEFAULT_MAX_FRAMES: usize = 32;

#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub enum PixelLayout {
    Yuv400,
    #[default]
    Yuv420,
    Yuv422,
    Yuv444,
}

impl PixelLayout {
    pub fn plane_count(&self) -> usize {
        match self {
            PixelLayout::Yuv400 => 1,
            PixelLayout::Yuv420 | PixelLayout::Yuv422 | PixelLayout::Yuv444 => 3,
        }
    }

    pub fn has_chroma(&self) -> bool {
        *self != PixelLayout::Yuv400
    }

    // Horizontal chroma subsampling shift. Monochrome reports 1 to match the
    // decoder's own stride computation; it has no chroma stride anyway.
    pub fn chroma_shift_x(&self) -> u32 {
        match self {
            PixelLayout::Yuv444 => 0,
            _ => 1,
        }
    }

    pub fn chroma_shift_y(&self) -> u32 {
        match self {
            PixelLayout::Yuv420 => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Plane {
    Y = 0,
    U = 1,
    V = 2,
}

impl Plane {
    pub fn to_usize(&self) -> usize {
        match self {
            Plane::Y => 0,
            Plane::U => 1,
            Plane::V => 2,
        }
    }

    // Index into the two-entry stride array used by decoded pictures: both
    // chroma planes share stride[1].
    pub(crate) fn stride_index(&self) -> usize {
        match self {
            Plane::Y => 0,
            _ => 1,
        }
    }
}

pub const MAX_PLANE_COUNT: usize = 3;
pub const YUV_PLANES: [Plane; MAX_PLANE_COUNT] = [Plane::Y, Plane::U, Plane::V];

/// How a session delivers pictures to a `SurfaceYuv` output.
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub enum RenderMode {
    /// The decoder's own buffer is kept alive and blitted straight to the surface.
    DirectToSurface,
    /// The picture is first copied (or converted) into the output's byte buffer.
    #[default]
    ConvertThenBuffer,
}
