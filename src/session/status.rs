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

use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

/// The two sticky error channels of a session: the last status returned by
/// the decoder library and the last wrapper status. Both are written from the
/// caller's thread and from the decoder's allocator callbacks.
#[derive(Debug, Default)]
pub struct StatusRegister {
    library: AtomicI32,
    wrapper: AtomicI32,
}

impl StatusRegister {
    pub fn library_code(&self) -> i32 {
        self.library.load(Ordering::Acquire)
    }

    pub fn set_library_code(&self, code: i32) {
        self.library.store(code, Ordering::Release);
    }

    pub fn status(&self) -> Status {
        Status::from_code(self.wrapper.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set_status(&self, status: Status) {
        self.wrapper.store(status.code(), Ordering::Release);
    }

    /// Stores |err| on the channel it belongs to. Errors without a channel
    /// (callback exceptions, invalid arguments) leave both untouched.
    pub fn record(&self, err: &DecoderError) {
        match err {
            DecoderError::Library(code) => self.set_library_code(*code),
            _ => {
                if let Some(status) = err.status() {
                    self.set_status(status);
                }
            }
        }
    }

    pub fn error_message(&self) -> String {
        let code = self.library_code();
        if code != 0 {
            return format!("libdav1d unknown error ({code})");
        }
        self.status().message().into()
    }

    pub fn check(&self) -> DecoderResult<()> {
        let code = self.library_code();
        if code != 0 {
            return Err(DecoderError::Library(code));
        }
        match self.status().to_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
