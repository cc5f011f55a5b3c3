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

use rand::rngs::StdRng;
use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;

/// 10-bit to 8-bit downconversion strategy. A session uses one strategy for
/// its whole lifetime.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DitherMode {
    /// Each sample is shifted down by two bits, with the (always reset)
    /// remainder of the previous sample carried in. Deterministic.
    RemainderCarry,
    /// Random bias from a two lane linear congruential generator is added to
    /// the dropped bits before truncating.
    Lcg,
}

impl Default for DitherMode {
    fn default() -> Self {
        if cfg!(any(target_arch = "aarch64", target_arch = "arm")) {
            DitherMode::Lcg
        } else {
            DitherMode::RemainderCarry
        }
    }
}

// Constants recommended in "Numerical Recipes".
const LCG_MULT: u32 = 1664525;
const LCG_INCR: u32 = 1013904223;

/// Converts one row of 10-bit samples into 8-bit samples. Returns the
/// remainder carried out of the row.
pub fn dither_row_remainder_carry(source: &[u16], destination: &mut [u8]) -> u32 {
    let mut sample: u32 = 0;
    for (src, dst) in source.iter().zip(destination.iter_mut()) {
        sample += u32::from(*src);
        *dst = (sample >> 2) as u8;
        sample = 0;
    }
    sample
}

/// Dither state. The LCG lanes advance once per 16 samples; the row tails
/// draw from a seeded RNG.
#[derive(Debug, Clone)]
pub struct Ditherer {
    mode: DitherMode,
    lanes: [u32; 2],
    rng: StdRng,
}

impl Ditherer {
    pub fn new(mode: DitherMode, seed: Option<u32>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(u64::from(seed)),
            None => StdRng::from_entropy(),
        };
        let lanes = [rng.gen(), rng.gen()];
        Self { mode, lanes, rng }
    }

    pub fn mode(&self) -> DitherMode {
        self.mode
    }

    pub fn dither_row(&mut self, source: &[u16], destination: &mut [u8]) {
        match self.mode {
            DitherMode::RemainderCarry => {
                dither_row_remainder_carry(source, destination);
            }
            DitherMode::Lcg => self.dither_row_lcg(source, destination),
        }
    }

    fn advance(&mut self) {
        for lane in &mut self.lanes {
            *lane = lane.wrapping_mul(LCG_MULT).wrapping_add(LCG_INCR);
        }
    }

    // Upper byte of each 16-bit half of the two lanes. The low bits of this
    // generator are poor, so only the upper ones are used.
    fn biases(&self) -> [u16; 4] {
        [
            (self.lanes[0] & 0xffff) as u16 >> 8,
            (self.lanes[0] >> 16) as u16 >> 8,
            (self.lanes[1] & 0xffff) as u16 >> 8,
            (self.lanes[1] >> 16) as u16 >> 8,
        ]
    }

    fn dither_row_lcg(&mut self, source: &[u16], destination: &mut [u8]) {
        let width = std::cmp::min(source.len(), destination.len());
        let block_end = width & !15;
        for (src, dst) in source[..block_end]
            .chunks_exact(16)
            .zip(destination[..block_end].chunks_exact_mut(16))
        {
            self.advance();
            let biases = self.biases();
            // Four rounds of four samples. Each round moves the bias up by
            // two bits within its byte.
            for round in 0..4 {
                for lane in 0..4 {
                    let index = round * 4 + lane;
                    let bias = (biases[lane] << (2 * round)) & 0xff;
                    let value = src[index].wrapping_shl(6).saturating_add(bias);
                    dst[index] = (value >> 8) as u8;
                }
            }
        }
        let mut random: u32 = 0;
        for j in block_end..width {
            if random == 0 {
                random = self.rng.next_u32();
            }
            let value = (u32::from(source[j]) + (random & 3)) >> 2;
            destination[j] = std::cmp::min(value, 255) as u8;
            random >>= 2;
        }
    }
}
