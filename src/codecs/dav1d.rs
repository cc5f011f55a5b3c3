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

// The type of the fields from dav1d_sys::* are dependent on the version of
// dav1d. So allow clippy to ignore unnecessary cast warnings.
#![allow(clippy::unnecessary_cast)]

use crate::allocator::PictureAllocator;
use crate::allocator::PictureRequest;
use crate::codecs::DecodedPicture;
use crate::codecs::Decoder;
use crate::codecs::PictureInfo;
use crate::codecs::SendStatus;
use crate::internal_utils::*;
use crate::session::Settings;
use crate::*;

use dav1d_sys::*;

use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::sync::Arc;

// See https://code.videolan.org/videolan/dav1d/-/blob/9849ede1304da1443cfb4a86f197765081034205/include/dav1d/common.h#L55-59
const fn dav1d_err(errno: i32) -> i32 {
    if libc::EPERM > 0 {
        -errno
    } else {
        errno
    }
}
const DAV1D_EAGAIN: i32 = dav1d_err(libc::EAGAIN);
const DAV1D_EINVAL: i32 = dav1d_err(libc::EINVAL);
const DAV1D_ENOMEM: i32 = dav1d_err(libc::ENOMEM);

fn pixel_layout(layout: Dav1dPixelLayout) -> Option<PixelLayout> {
    match layout as u32 {
        0 => Some(PixelLayout::Yuv400),
        1 => Some(PixelLayout::Yuv420),
        2 => Some(PixelLayout::Yuv422),
        3 => Some(PixelLayout::Yuv444),
        _ => None,
    }
}

// The slot travels through Dav1dPicture::allocator_data as an integer, offset
// by one so that slot 0 is distinguishable from "no slot".
fn encode_slot(slot: SlotId) -> *mut c_void {
    (slot.index() + 1) as *mut c_void
}

fn decode_slot(allocator_data: *mut c_void) -> Option<SlotId> {
    match allocator_data as usize {
        0 => None,
        value => u32::try_from(value - 1).ok().map(SlotId::new),
    }
}

/// # Safety
/// C-callback. |cookie| is the Arc<dyn PictureAllocator> owned by the Dav1d
/// instance that registered this callback, and outlives the decoder context.
unsafe extern "C" fn alloc_picture_callback(picture: *mut Dav1dPicture, cookie: *mut c_void) -> i32 {
    if picture.is_null() || cookie.is_null() {
        return DAV1D_EINVAL;
    }
    // # Safety: see the function level comment.
    let allocator = unsafe { &*(cookie as *const Arc<dyn PictureAllocator>) };
    // # Safety: picture is a valid pointer provided by dav1d.
    let picture = unsafe { &mut *picture };
    let (width, height) = match (u32::try_from(picture.p.w), u32::try_from(picture.p.h)) {
        (Ok(width), Ok(height)) => (width, height),
        _ => return DAV1D_EINVAL,
    };
    let layout = match pixel_layout(picture.p.layout) {
        Some(layout) => layout,
        None => return DAV1D_EINVAL,
    };
    let request = PictureRequest {
        width,
        height,
        bit_depth: picture.p.bpc as u8,
        layout,
    };
    match allocator.alloc_picture(&request) {
        Ok(allocation) => {
            for (data, plane) in picture.data.iter_mut().zip(allocation.planes.iter()) {
                *data = *plane as *mut c_void;
            }
            picture.stride[0] = allocation.strides[0] as isize;
            picture.stride[1] = allocation.strides[1] as isize;
            picture.allocator_data = encode_slot(allocation.slot);
            0
        }
        Err(_) => DAV1D_ENOMEM,
    }
}

/// # Safety
/// C-callback. Same contract as alloc_picture_callback.
unsafe extern "C" fn release_picture_callback(picture: *mut Dav1dPicture, cookie: *mut c_void) {
    if picture.is_null() || cookie.is_null() {
        return;
    }
    // # Safety: see alloc_picture_callback.
    let allocator = unsafe { &*(cookie as *const Arc<dyn PictureAllocator>) };
    // # Safety: picture is a valid pointer provided by dav1d.
    let allocator_data = unsafe { (*picture).allocator_data };
    if let Some(slot) = decode_slot(allocator_data) {
        allocator.release_picture(slot);
    }
}

pub struct Dav1dPictureWrapper {
    picture: Dav1dPicture,
    info: PictureInfo,
}

fn picture_info(picture: &Dav1dPicture) -> DecoderResult<PictureInfo> {
    let layout = pixel_layout(picture.p.layout).ok_or(DecoderError::InvalidArgument)?;
    let planes = [
        picture.data[0] as *const u8,
        picture.data[1] as *const u8,
        picture.data[2] as *const u8,
    ];
    // # Safety: dav1d guarantees that the planes of a returned picture are
    // readable until dav1d_picture_unref, which is only called when the
    // wrapper holding this info is dropped.
    Ok(unsafe {
        PictureInfo::from_raw_parts(
            u32_from_i32(picture.p.w)?,
            u32_from_i32(picture.p.h)?,
            picture.p.bpc as u8,
            layout,
            planes,
            [
                usize_from_isize(picture.stride[0] as isize)?,
                usize_from_isize(picture.stride[1] as isize)?,
            ],
            picture.m.timestamp,
            decode_slot(picture.allocator_data),
        )
    })
}

impl Dav1dPictureWrapper {
    fn new(picture: Dav1dPicture) -> DecoderResult<Self> {
        let mut wrapper = Self {
            picture,
            // # Safety: no plane pointers.
            info: unsafe {
                PictureInfo::from_raw_parts(
                    0,
                    0,
                    0,
                    PixelLayout::default(),
                    [std::ptr::null(); MAX_PLANE_COUNT],
                    [0, 0],
                    0,
                    None,
                )
            },
        };
        // The wrapper owns the reference from here on, so an error below
        // still unrefs the picture.
        wrapper.info = picture_info(&wrapper.picture)?;
        Ok(wrapper)
    }
}

impl DecodedPicture for Dav1dPictureWrapper {
    fn info(&self) -> &PictureInfo {
        &self.info
    }
}

impl Drop for Dav1dPictureWrapper {
    fn drop(&mut self) {
        // # Safety: Calling a C function with valid parameters.
        unsafe {
            dav1d_picture_unref(&mut self.picture);
        }
    }
}

pub struct Dav1d {
    context: *mut Dav1dContext,
    // Input handed to dav1d_send_data that it has not consumed yet.
    data: Dav1dData,
    // Registered as the allocator cookie; must outlive |context|.
    #[allow(dead_code)]
    allocator: Box<Arc<dyn PictureAllocator>>,
}

// # Safety: the dav1d context may be used from any thread as long as calls are
// not concurrent, which &mut self guarantees.
unsafe impl Send for Dav1d {}

impl Dav1d {
    fn has_data(&self) -> bool {
        self.data.sz > 0 && !self.data.data.is_null()
    }
}

impl Decoder for Dav1d {
    type Picture = Dav1dPictureWrapper;

    fn open(settings: &Settings, allocator: Arc<dyn PictureAllocator>) -> DecoderResult<Self> {
        let allocator = Box::new(allocator);
        let mut settings_uninit: MaybeUninit<Dav1dSettings> = MaybeUninit::uninit();
        // # Safety: Calling a C function with valid parameters.
        unsafe { dav1d_default_settings(settings_uninit.as_mut_ptr()) };
        // # Safety: settings_uninit was initialized in the C function above.
        let mut dav1d_settings = unsafe { settings_uninit.assume_init() };
        dav1d_settings.n_threads = settings.clamped_threads() as _;
        dav1d_settings.apply_grain = if settings.apply_grain { 1 } else { 0 };
        dav1d_settings.operating_point = settings.operating_point as _;
        dav1d_settings.all_layers = if settings.all_layers { 1 } else { 0 };
        dav1d_settings.frame_size_limit = settings.frame_size_limit as _;
        dav1d_settings.logger.callback = None;
        dav1d_settings.allocator.cookie =
            (&*allocator) as *const Arc<dyn PictureAllocator> as *mut c_void;
        dav1d_settings.allocator.alloc_picture_callback = Some(alloc_picture_callback);
        dav1d_settings.allocator.release_picture_callback = Some(release_picture_callback);

        let mut context: *mut Dav1dContext = std::ptr::null_mut();
        // # Safety: Calling a C function with valid parameters.
        let ret = unsafe { dav1d_open(&mut context, &dav1d_settings) };
        if ret != 0 || context.is_null() {
            log::error!("dav1d_open returned {ret}");
            return DecoderError::library(if ret != 0 { ret } else { DAV1D_ENOMEM });
        }
        Ok(Self {
            context,
            // # Safety: Zero initializing a C-struct, as dav1d expects for
            // an empty Dav1dData.
            data: unsafe { std::mem::zeroed() },
            allocator,
        })
    }

    fn send_data(&mut self, data: Vec<u8>, timestamp: i64) -> DecoderResult<SendStatus> {
        self.discard_pending();
        if data.is_empty() {
            return Ok(SendStatus::Consumed);
        }
        // # Safety: Calling a C function with valid parameters.
        let buffer = unsafe { dav1d_data_create(&mut self.data, data.len()) };
        if buffer.is_null() {
            return DecoderError::out_of_memory();
        }
        // # Safety: dav1d_data_create returned a buffer of data.len() bytes.
        unsafe { std::slice::from_raw_parts_mut(buffer, data.len()) }.copy_from_slice(&data);
        self.data.m.timestamp = timestamp;
        // # Safety: Calling a C function with valid parameters.
        let ret = unsafe { dav1d_send_data(self.context, &mut self.data) };
        if ret == 0 {
            // Everything was consumed.
            return Ok(SendStatus::Consumed);
        }
        self.discard_pending();
        if ret == DAV1D_EAGAIN {
            return Ok(SendStatus::Again);
        }
        log::error!("dav1d_send_data returned {ret}");
        DecoderError::library(ret)
    }

    fn get_picture(&mut self) -> DecoderResult<Option<Dav1dPictureWrapper>> {
        // # Safety: Zero initializing a C-struct. It is populated by
        // dav1d_get_picture.
        let mut picture: Dav1dPicture = unsafe { std::mem::zeroed() };
        // # Safety: Calling a C function with valid parameters.
        let ret = unsafe { dav1d_get_picture(self.context, &mut picture) };
        if ret == DAV1D_EAGAIN {
            return Ok(None);
        }
        if ret < 0 {
            log::error!("dav1d_get_picture returned {ret}");
            return DecoderError::library(ret);
        }
        Dav1dPictureWrapper::new(picture).map(Some)
    }

    fn discard_pending(&mut self) {
        if self.has_data() {
            // # Safety: Calling a C function with valid parameters.
            unsafe { dav1d_data_unref(&mut self.data) };
        }
    }

    fn flush(&mut self) {
        // # Safety: Calling a C function with valid parameters.
        unsafe { dav1d_flush(self.context) };
    }
}

impl Drop for Dav1d {
    fn drop(&mut self) {
        self.discard_pending();
        // # Safety: Calling a C function with valid parameters. Every picture
        // is released through the allocator before dav1d_close returns, so
        // the cookie is not used afterwards.
        unsafe { dav1d_close(&mut self.context) };
    }
}
