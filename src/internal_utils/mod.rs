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

pub(crate) fn usize_from_u32(value: u32) -> DecoderResult<usize> {
    usize::try_from(value).or(Err(DecoderError::InvalidArgument))
}

#[allow(dead_code)]
pub(crate) fn usize_from_i32(value: i32) -> DecoderResult<usize> {
    usize::try_from(value).or(Err(DecoderError::InvalidArgument))
}

pub(crate) fn u32_from_usize(value: usize) -> DecoderResult<u32> {
    u32::try_from(value).or(Err(DecoderError::InvalidArgument))
}

#[allow(dead_code)]
pub(crate) fn u32_from_i32(value: i32) -> DecoderResult<u32> {
    u32::try_from(value).or(Err(DecoderError::InvalidArgument))
}

#[allow(dead_code)]
pub(crate) fn usize_from_isize(value: isize) -> DecoderResult<usize> {
    usize::try_from(value).or(Err(DecoderError::InvalidArgument))
}

#[allow(dead_code)]
pub(crate) fn i32_from_u32(value: u32) -> DecoderResult<i32> {
    i32::try_from(value).or(Err(DecoderError::InvalidArgument))
}

/// Rounds |value| up to the next multiple of |alignment|, which must be a
/// power of two.
pub(crate) fn round_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

pub(crate) fn align_to_16(value: usize) -> usize {
    round_up(value, 16)
}

// Size of a plane whose last row is only |row_bytes| long.
pub(crate) fn plane_span(stride: usize, row_bytes: usize, rows: usize) -> DecoderResult<usize> {
    if rows == 0 {
        return Ok(0);
    }
    stride
        .checked_mul(rows - 1)
        .and_then(|x| x.checked_add(row_bytes))
        .ok_or(DecoderError::InvalidArgument)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_to_power_of_two() {
        assert_eq!(round_up(0, 128), 0);
        assert_eq!(round_up(1, 128), 128);
        assert_eq!(round_up(128, 128), 128);
        assert_eq!(round_up(1921, 128), 2048);
        assert_eq!(align_to_16(17), 32);
        assert_eq!(align_to_16(720 / 2), 368);
    }

    #[test]
    fn plane_span_excludes_trailing_padding() {
        assert_eq!(plane_span(64, 10, 3).unwrap(), 138);
        assert_eq!(plane_span(64, 10, 0).unwrap(), 0);
        assert!(plane_span(usize::MAX, 1, 3).is_err());
    }
}
