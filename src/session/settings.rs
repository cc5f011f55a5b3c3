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

pub const MAX_THREADS: u32 = 256;

/// Per-session decoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Decoder worker threads. Clamped to 1..=MAX_THREADS when the session
    /// opens.
    pub threads: u32,
    /// Upper bound on the number of frame buffer slots.
    pub max_frames: usize,
    pub apply_grain: bool,
    pub operating_point: u8,
    pub all_layers: bool,
    /// Maximum picture area in pixels. 0 means unlimited.
    pub frame_size_limit: u32,
    pub render_mode: RenderMode,
    pub dither: DitherMode,
    /// Seed for the randomized dither. Drawn from the thread RNG when unset.
    pub dither_seed: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: 1,
            max_frames: DEFAULT_MAX_FRAMES,
            apply_grain: true,
            operating_point: 0,
            all_layers: false,
            frame_size_limit: 0,
            render_mode: Default::default(),
            dither: Default::default(),
            dither_seed: None,
        }
    }
}

impl Settings {
    pub fn with_threads(threads: i32) -> Self {
        Self {
            threads: u32::try_from(threads).unwrap_or(1),
            ..Default::default()
        }
    }

    pub(crate) fn clamped_threads(&self) -> u32 {
        self.threads.clamp(1, MAX_THREADS)
    }
}
