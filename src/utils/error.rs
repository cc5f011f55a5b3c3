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

use thiserror::Error;

/// Wrapper-level status codes. The integer values are part of the contract
/// with the Java layer and must not change.
#[repr(i32)]
#[derive(Debug, Default, PartialEq, Eq, Copy, Clone)]
pub enum Status {
    #[default]
    Ok = 0,
    OutOfMemory = -1,
    BufferAlreadyReleased = -2,
    InvalidNumOfPlanes = -3,
    BitDepth12NotSupportedWithYuv = -4,
    HighBitDepthNotSupportedWithSurfaceYuv = -5,
    ANativeWindowError = -6,
    BufferResizeError = -7,
    // Reserved. No code path in this crate depends on NEON availability.
    NeonNotSupported = -8,
}

impl Status {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            -1 => Some(Status::OutOfMemory),
            -2 => Some(Status::BufferAlreadyReleased),
            -3 => Some(Status::InvalidNumOfPlanes),
            -4 => Some(Status::BitDepth12NotSupportedWithYuv),
            -5 => Some(Status::HighBitDepthNotSupportedWithSurfaceYuv),
            -6 => Some(Status::ANativeWindowError),
            -7 => Some(Status::BufferResizeError),
            -8 => Some(Status::NeonNotSupported),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Status::Ok => "None.",
            Status::OutOfMemory => "Out of memory.",
            Status::BufferAlreadyReleased => "JNI buffer already released.",
            Status::InvalidNumOfPlanes => "Libdav1d decoded buffer has invalid number of planes.",
            Status::BitDepth12NotSupportedWithYuv => "Bit depth 12 is not supported with YUV.",
            Status::HighBitDepthNotSupportedWithSurfaceYuv => {
                "High bit depth (10 or 12 bits per pixel) output format is not supported with YUV \
                 surface."
            }
            Status::ANativeWindowError => "ANativeWindow error.",
            Status::BufferResizeError => "Buffer resize failed.",
            Status::NeonNotSupported => "Neon is not supported.",
        }
    }

    pub fn to_error(&self) -> Option<DecoderError> {
        match self {
            Status::Ok => None,
            Status::OutOfMemory => Some(DecoderError::OutOfMemory),
            Status::BufferAlreadyReleased => Some(DecoderError::BufferAlreadyReleased),
            Status::InvalidNumOfPlanes => Some(DecoderError::InvalidNumOfPlanes),
            Status::BitDepth12NotSupportedWithYuv => {
                Some(DecoderError::BitDepth12NotSupportedWithYuv)
            }
            Status::HighBitDepthNotSupportedWithSurfaceYuv => {
                Some(DecoderError::HighBitDepthNotSupportedWithSurfaceYuv)
            }
            Status::ANativeWindowError => Some(DecoderError::ANativeWindowError),
            Status::BufferResizeError => Some(DecoderError::BufferResizeError),
            Status::NeonNotSupported => Some(DecoderError::NeonNotSupported),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecoderError {
    #[error("Out of memory.")]
    OutOfMemory,
    #[error("JNI buffer already released.")]
    BufferAlreadyReleased,
    #[error("Libdav1d decoded buffer has invalid number of planes.")]
    InvalidNumOfPlanes,
    #[error("Bit depth 12 is not supported with YUV.")]
    BitDepth12NotSupportedWithYuv,
    #[error(
        "High bit depth (10 or 12 bits per pixel) output format is not supported with YUV surface."
    )]
    HighBitDepthNotSupportedWithSurfaceYuv,
    #[error("ANativeWindow error.")]
    ANativeWindowError,
    #[error("Buffer resize failed.")]
    BufferResizeError,
    #[error("Neon is not supported.")]
    NeonNotSupported,
    /// Negative status returned by the wrapped decoder library.
    #[error("decoder library returned {0}")]
    Library(i32),
    /// An output buffer callback left an exception pending in the caller.
    #[error("output buffer callback raised an exception")]
    CallbackException,
    #[error("frame buffer slot {0} does not exist")]
    InvalidSlot(i32),
    #[error("invalid argument")]
    InvalidArgument,
}

pub type DecoderResult<T> = Result<T, DecoderError>;

impl DecoderError {
    /// The wrapper status this error is recorded as, if any. Library errors
    /// are tracked on their own channel and callback exceptions surface in the
    /// caller directly.
    pub fn status(&self) -> Option<Status> {
        match self {
            DecoderError::OutOfMemory => Some(Status::OutOfMemory),
            DecoderError::BufferAlreadyReleased | DecoderError::InvalidSlot(_) => {
                Some(Status::BufferAlreadyReleased)
            }
            DecoderError::InvalidNumOfPlanes => Some(Status::InvalidNumOfPlanes),
            DecoderError::BitDepth12NotSupportedWithYuv => {
                Some(Status::BitDepth12NotSupportedWithYuv)
            }
            DecoderError::HighBitDepthNotSupportedWithSurfaceYuv => {
                Some(Status::HighBitDepthNotSupportedWithSurfaceYuv)
            }
            DecoderError::ANativeWindowError => Some(Status::ANativeWindowError),
            DecoderError::BufferResizeError => Some(Status::BufferResizeError),
            DecoderError::NeonNotSupported => Some(Status::NeonNotSupported),
            DecoderError::Library(_)
            | DecoderError::CallbackException
            | DecoderError::InvalidArgument => None,
        }
    }
}

// To be used instead of direct DecoderError variants in order to debug
// unexpected Err propagations as early as possible in the call stack.
#[allow(dead_code)]
impl DecoderError {
    fn on_error() {
        // Use std::intrinsics::breakpoint() or manually add a breakpoint here.
        // Alternatively, uncomment the following to print the stack trace.
        // println!("{}", std::backtrace::Backtrace::force_capture());
    }

    pub(crate) fn out_of_memory<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::OutOfMemory)
    }
    pub(crate) fn buffer_already_released<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::BufferAlreadyReleased)
    }
    pub(crate) fn invalid_num_of_planes<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::InvalidNumOfPlanes)
    }
    pub(crate) fn bit_depth_12_not_supported_with_yuv<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::BitDepth12NotSupportedWithYuv)
    }
    pub(crate) fn native_window_error<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::ANativeWindowError)
    }
    pub(crate) fn buffer_resize_error<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::BufferResizeError)
    }
    pub(crate) fn invalid_slot<T>(id: i32) -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::InvalidSlot(id))
    }
    pub(crate) fn invalid_argument<T>() -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::InvalidArgument)
    }
    pub(crate) fn library<T>(code: i32) -> DecoderResult<T> {
        DecoderError::on_error();
        Err(DecoderError::Library(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip_through_integers() {
        for code in -8..=0 {
            let status = Status::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert_eq!(Status::from_code(-9), None);
        assert_eq!(Status::from_code(1), None);
    }

    #[test]
    fn error_display_matches_status_message() {
        let errors = [
            DecoderError::OutOfMemory,
            DecoderError::BufferAlreadyReleased,
            DecoderError::InvalidNumOfPlanes,
            DecoderError::BitDepth12NotSupportedWithYuv,
            DecoderError::HighBitDepthNotSupportedWithSurfaceYuv,
            DecoderError::ANativeWindowError,
            DecoderError::BufferResizeError,
            DecoderError::NeonNotSupported,
        ];
        for err in errors {
            assert_eq!(err.to_string(), err.status().unwrap().message());
        }
        assert_eq!(DecoderError::Library(-11).status(), None);
        assert_eq!(
            DecoderError::InvalidSlot(3).status(),
            Some(Status::BufferAlreadyReleased)
        );
    }
}
