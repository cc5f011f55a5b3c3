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

//! Native methods of `com.google.android.exoplayer2.ext.dav1d.Dav1dDecoder`.

use crate::codecs::dav1d::Dav1d;
use crate::internal_utils::*;
use crate::output::OutputBuffer;
use crate::output::OutputMode;
use crate::session::DecodeStatus;
use crate::session::FrameStatus;
use crate::session::Session;
use crate::session::Settings;
use crate::surface::NativeWindow;
use crate::*;

use jni::objects::JByteBuffer;
use jni::objects::JIntArray;
use jni::objects::JObject;
use jni::objects::JValue;
use jni::sys::jboolean;
use jni::sys::jint;
use jni::sys::jlong;
use jni::sys::jstring;
use jni::JNIEnv;

use std::sync::Mutex;
use std::sync::MutexGuard;

// Return codes of the native methods. Must match Dav1dDecoder.java.
const STATUS_ERROR: jint = 0;
const STATUS_OK: jint = 1;
const STATUS_DECODE_ONLY: jint = 2;
const STATUS_DECODE_AGAIN: jint = 3;

type JniSession = Session<Dav1d, NativeWindow>;

// The decoding and the rendering thread both call in, so the session sits
// behind a lock.
struct JniContext {
    session: Mutex<JniSession>,
}

impl JniContext {
    fn lock(&self) -> MutexGuard<'_, JniSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// # Safety
/// |context| must be 0 or a handle returned by dav1dInit that has not been
/// passed to dav1dClose.
unsafe fn context_from_handle<'a>(context: jlong) -> Option<&'a JniContext> {
    // # Safety: guaranteed by the caller.
    unsafe { (context as *const JniContext).as_ref() }
}

// Any failed JNI call either left a Java exception pending or cannot be
// recovered from here.
fn jni_error(err: jni::errors::Error) -> DecoderError {
    log::error!("JNI call failed: {err}");
    DecoderError::CallbackException
}

/// `VideoDecoderOutputBuffer` accessed through JNI.
struct JavaOutputBuffer<'a, 'local> {
    env: &'a mut JNIEnv<'local>,
    object: &'a JObject<'local>,
}

impl JavaOutputBuffer<'_, '_> {
    fn int_field(&mut self, name: &str) -> DecoderResult<i32> {
        self.env
            .get_field(self.object, name, "I")
            .and_then(|value| value.i())
            .map_err(jni_error)
    }
}

impl OutputBuffer for JavaOutputBuffer<'_, '_> {
    fn mode(&mut self) -> DecoderResult<OutputMode> {
        Ok(OutputMode::from_i32(self.int_field("mode")?))
    }

    fn init_for_yuv_frame(
        &mut self,
        width: u32,
        height: u32,
        y_stride: usize,
        uv_stride: usize,
        color_space: i32,
    ) -> DecoderResult<bool> {
        let args = [
            JValue::Int(i32_from_u32(width)?),
            JValue::Int(i32_from_u32(height)?),
            JValue::Int(i32::try_from(y_stride).or(Err(DecoderError::InvalidArgument))?),
            JValue::Int(i32::try_from(uv_stride).or(Err(DecoderError::InvalidArgument))?),
            JValue::Int(color_space),
        ];
        self.env
            .call_method(self.object, "initForYuvFrame", "(IIIII)Z", &args)
            .and_then(|value| value.z())
            .map_err(jni_error)
    }

    fn init_for_private_frame(&mut self, width: u32, height: u32) -> DecoderResult<()> {
        let args = [
            JValue::Int(i32_from_u32(width)?),
            JValue::Int(i32_from_u32(height)?),
        ];
        self.env
            .call_method(self.object, "initForPrivateFrame", "(II)V", &args)
            .map(|_| ())
            .map_err(jni_error)
    }

    fn init(&mut self, timestamp: i64, mode: OutputMode) -> DecoderResult<()> {
        let null = JObject::null();
        let args = [
            JValue::Long(timestamp),
            JValue::Int(mode as i32),
            JValue::Object(&null),
        ];
        self.env
            .call_method(self.object, "init", "(JILjava/nio/ByteBuffer;)V", &args)
            .map(|_| ())
            .map_err(jni_error)
    }

    fn data(&mut self) -> DecoderResult<&mut [u8]> {
        let object = self
            .env
            .get_field(self.object, "data", "Ljava/nio/ByteBuffer;")
            .and_then(|value| value.l())
            .map_err(jni_error)?;
        if object.is_null() {
            return DecoderError::buffer_resize_error();
        }
        let buffer = JByteBuffer::from(object);
        let address = self
            .env
            .get_direct_buffer_address(&buffer)
            .map_err(jni_error)?;
        let capacity = self
            .env
            .get_direct_buffer_capacity(&buffer)
            .map_err(jni_error)?;
        if address.is_null() {
            return DecoderError::buffer_resize_error();
        }
        // # Safety: a direct ByteBuffer's memory stays valid while the buffer
        // is reachable, and the output buffer object holds it for the whole
        // native call.
        Ok(unsafe { std::slice::from_raw_parts_mut(address, capacity) })
    }

    fn width(&mut self) -> DecoderResult<u32> {
        u32_from_i32(self.int_field("width")?)
    }

    fn height(&mut self) -> DecoderResult<u32> {
        u32_from_i32(self.int_field("height")?)
    }

    fn yuv_strides(&mut self) -> DecoderResult<[usize; 2]> {
        let object = self
            .env
            .get_field(self.object, "yuvStrides", "[I")
            .and_then(|value| value.l())
            .map_err(jni_error)?;
        if object.is_null() {
            return DecoderError::invalid_argument();
        }
        let array = JIntArray::from(object);
        let mut strides = [0i32; 2];
        self.env
            .get_int_array_region(&array, 0, &mut strides)
            .map_err(jni_error)?;
        Ok([
            usize_from_i32(strides[0])?,
            usize_from_i32(strides[1])?,
        ])
    }

    fn decoder_private(&mut self) -> DecoderResult<i32> {
        self.int_field("decoderPrivate")
    }

    fn set_decoder_private(&mut self, value: i32) -> DecoderResult<()> {
        self.env
            .set_field(self.object, "decoderPrivate", "I", JValue::Int(value))
            .map_err(jni_error)
    }
}

fn acquire_window(env: &JNIEnv, surface: &JObject) -> DecoderResult<Option<NativeWindow>> {
    if surface.is_null() {
        return Ok(None);
    }
    // # Safety: env belongs to the current thread and surface is a live local
    // reference.
    unsafe {
        NativeWindow::from_surface(env.get_raw() as *mut _, surface.as_raw() as *mut _)
    }
    .map(Some)
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dInit(
    _env: JNIEnv,
    _this: JObject,
    threads: jint,
) -> jlong {
    match JniSession::open(&Settings::with_threads(threads)) {
        Ok(session) => {
            let context = Box::new(JniContext {
                session: Mutex::new(session),
            });
            Box::into_raw(context) as jlong
        }
        Err(err) => {
            log::error!("failed to open decoder: {err}");
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dClose(
    _env: JNIEnv,
    _this: JObject,
    context: jlong,
) {
    if context == 0 {
        return;
    }
    // # Safety: the handle was created by Box::into_raw in dav1dInit and the
    // caller does not use it after this call.
    drop(unsafe { Box::from_raw(context as *mut JniContext) });
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dDecode(
    env: JNIEnv,
    _this: JObject,
    context: jlong,
    encoded_data: JObject,
    length: jint,
    time_us: jlong,
    reset: jboolean,
) -> jint {
    // # Safety: handle contract of dav1dInit.
    let Some(context) = (unsafe { context_from_handle(context) }) else {
        return STATUS_ERROR;
    };
    let mut session = context.lock();
    let buffer = JByteBuffer::from(encoded_data);
    let address = match env.get_direct_buffer_address(&buffer) {
        Ok(address) if !address.is_null() => address,
        _ => return STATUS_ERROR,
    };
    let capacity = env.get_direct_buffer_capacity(&buffer).unwrap_or(0);
    let length = match usize::try_from(length) {
        Ok(length) if length <= capacity => length,
        _ => return STATUS_ERROR,
    };
    // # Safety: address points to a direct buffer of at least length bytes
    // that is not modified during this call.
    let data = unsafe { std::slice::from_raw_parts(address as *const u8, length) };
    match session.decode(data, time_us, reset != 0) {
        Ok(DecodeStatus::Ok) => STATUS_OK,
        Ok(DecodeStatus::DecodeAgain) => STATUS_DECODE_AGAIN,
        Err(_) => STATUS_ERROR,
    }
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dGetFrame(
    mut env: JNIEnv,
    _this: JObject,
    context: jlong,
    output_buffer: JObject,
    decode_only: jboolean,
) -> jint {
    // # Safety: handle contract of dav1dInit.
    let Some(context) = (unsafe { context_from_handle(context) }) else {
        return STATUS_ERROR;
    };
    let mut output = JavaOutputBuffer {
        env: &mut env,
        object: &output_buffer,
    };
    match context.lock().get_frame(&mut output, decode_only != 0) {
        Ok(FrameStatus::Ok) => STATUS_OK,
        Ok(FrameStatus::DecodeOnly) => STATUS_DECODE_ONLY,
        Err(_) => STATUS_ERROR,
    }
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dSetSurface(
    env: JNIEnv,
    _this: JObject,
    context: jlong,
    surface: JObject,
) -> jint {
    // # Safety: handle contract of dav1dInit.
    let Some(context) = (unsafe { context_from_handle(context) }) else {
        return STATUS_ERROR;
    };
    let mut session = context.lock();
    match acquire_window(&env, &surface) {
        Ok(window) => {
            session.set_surface(window);
            STATUS_OK
        }
        Err(err) => {
            session.set_surface(None);
            session.status().record(&err);
            STATUS_ERROR
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dRenderFrame(
    mut env: JNIEnv,
    _this: JObject,
    context: jlong,
    surface: JObject,
    output_buffer: JObject,
) -> jint {
    // # Safety: handle contract of dav1dInit.
    let Some(context) = (unsafe { context_from_handle(context) }) else {
        return STATUS_ERROR;
    };
    let mut session = context.lock();
    let window = match acquire_window(&env, &surface) {
        Ok(window) => window,
        Err(err) => {
            session.set_surface(None);
            session.status().record(&err);
            return STATUS_ERROR;
        }
    };
    let mut output = JavaOutputBuffer {
        env: &mut env,
        object: &output_buffer,
    };
    match session.render_frame(window, &mut output) {
        Ok(()) => STATUS_OK,
        Err(_) => STATUS_ERROR,
    }
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dReleaseFrame(
    mut env: JNIEnv,
    _this: JObject,
    context: jlong,
    output_buffer: JObject,
) {
    // # Safety: handle contract of dav1dInit.
    let Some(context) = (unsafe { context_from_handle(context) }) else {
        return;
    };
    let mut output = JavaOutputBuffer {
        env: &mut env,
        object: &output_buffer,
    };
    // Failures are recorded in the session status.
    let _ = context.lock().release_frame(&mut output);
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dGetErrorMessage(
    env: JNIEnv,
    _this: JObject,
    context: jlong,
) -> jstring {
    // # Safety: handle contract of dav1dInit.
    let message = match unsafe { context_from_handle(context) } {
        Some(context) => context.lock().error_message(),
        None => "Failed to initialize JNI context.".into(),
    };
    match env.new_string(message) {
        Ok(message) => message.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

#[no_mangle]
pub extern "system" fn Java_com_google_android_exoplayer2_ext_dav1d_Dav1dDecoder_dav1dCheckError(
    _env: JNIEnv,
    _this: JObject,
    context: jlong,
) -> jint {
    // # Safety: handle contract of dav1dInit.
    match unsafe { context_from_handle(context) } {
        Some(context) => match context.lock().check_error() {
            Ok(()) => STATUS_OK,
            Err(_) => STATUS_ERROR,
        },
        None => STATUS_ERROR,
    }
}
