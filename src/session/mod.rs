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

mod settings;
mod status;

pub use settings::Settings;
pub use settings::MAX_THREADS;
pub use status::StatusRegister;

use crate::allocator::PictureAllocator;
use crate::allocator::PoolAllocator;
use crate::buffer::FrameBufferPool;
use crate::buffer::FrameLayout;
use crate::buffer::PlaneView;
use crate::codecs::DecodedPicture;
use crate::codecs::Decoder;
use crate::codecs::PictureInfo;
use crate::codecs::SendStatus;
use crate::internal_utils::*;
use crate::output::OutputBuffer;
use crate::output::OutputMode;
use crate::output::COLOR_SPACE_UNKNOWN;
use crate::reformat::write_frame_to_buffer;
use crate::reformat::Ditherer;
use crate::reformat::YuvBufferLayout;
use crate::surface::render_planes;
use crate::surface::RenderSurface;
use crate::surface::SourceFrame;
use crate::surface::SourcePlane;
use crate::surface::IMAGE_FORMAT_YV12;
use crate::*;

use std::sync::Arc;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum DecodeStatus {
    Ok,
    /// The decoder did not take the data. Drain pictures and send it again.
    DecodeAgain,
}

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FrameStatus {
    Ok,
    /// No displayable picture was produced by this call.
    DecodeOnly,
}

/// One open decoder instance with its frame buffer pool, render mode and
/// bound output surface.
///
/// Dropping the session closes the decoder before the pool's storage is
/// released, so no slot is referenced when it is freed.
pub struct Session<D: Decoder, S: RenderSurface> {
    // Must stay the first field: fields are dropped in declaration order.
    decoder: D,
    pool: Arc<FrameBufferPool>,
    status: Arc<StatusRegister>,
    render_mode: RenderMode,
    ditherer: Ditherer,
    surface: Option<S>,
    surface_width: u32,
    surface_height: u32,
}

impl<D: Decoder, S: RenderSurface> Session<D, S> {
    pub fn open(settings: &Settings) -> DecoderResult<Self> {
        let pool = Arc::new(FrameBufferPool::new(settings.max_frames));
        let status = Arc::new(StatusRegister::default());
        let allocator: Arc<dyn PictureAllocator> =
            Arc::new(PoolAllocator::new(pool.clone(), status.clone()));
        let decoder = D::open(settings, allocator)?;
        log::debug!(
            "opened decoder session: {} threads, {} frames, {:?}, {:?} dither",
            settings.clamped_threads(),
            settings.max_frames,
            settings.render_mode,
            settings.dither
        );
        Ok(Self {
            decoder,
            pool,
            status,
            render_mode: settings.render_mode,
            ditherer: Ditherer::new(settings.dither, settings.dither_seed),
            surface: None,
            surface_width: 0,
            surface_height: 0,
        })
    }

    pub fn pool(&self) -> &Arc<FrameBufferPool> {
        &self.pool
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn status(&self) -> &StatusRegister {
        &self.status
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    fn record_error(&self, err: &DecoderError) {
        self.status.record(err);
        log::error!("{err}");
    }

    /// Hands a copy of |data| to the decoder. With |reset|, pending input,
    /// decoder state and all pooled storage are dropped first; frames still
    /// held for direct rendering must have been released before.
    pub fn decode(
        &mut self,
        data: &[u8],
        timestamp: i64,
        reset: bool,
    ) -> DecoderResult<DecodeStatus> {
        if reset {
            log::debug!("resetting decoder session");
            self.decoder.discard_pending();
            self.decoder.flush();
            self.pool.flush();
        }
        let mut input: Vec<u8> = Vec::new();
        if input.try_reserve_exact(data.len()).is_err() {
            let err = DecoderError::OutOfMemory;
            self.record_error(&err);
            return Err(err);
        }
        input.extend_from_slice(data);
        match self.decoder.send_data(input, timestamp) {
            Ok(SendStatus::Consumed) => {
                self.status.set_library_code(0);
                Ok(DecodeStatus::Ok)
            }
            Ok(SendStatus::Again) => {
                self.status.set_library_code(0);
                Ok(DecodeStatus::DecodeAgain)
            }
            Err(err) => {
                self.record_error(&err);
                Err(err)
            }
        }
    }

    /// Retrieves the next decoded picture into |output|. With |decode_only|
    /// the picture is dropped and DecodeOnly is returned.
    pub fn get_frame(
        &mut self,
        output: &mut impl OutputBuffer,
        decode_only: bool,
    ) -> DecoderResult<FrameStatus> {
        let picture = match self.decoder.get_picture() {
            Ok(Some(picture)) => picture,
            Ok(None) => {
                self.status.set_library_code(0);
                return Ok(FrameStatus::DecodeOnly);
            }
            Err(err) => {
                self.record_error(&err);
                return Err(err);
            }
        };
        self.status.set_library_code(0);
        if decode_only {
            return Ok(FrameStatus::DecodeOnly);
        }
        let result = self.deliver(picture.info(), output);
        if let Err(err) = &result {
            self.record_error(err);
        }
        result
    }

    fn deliver(
        &mut self,
        info: &PictureInfo,
        output: &mut impl OutputBuffer,
    ) -> DecoderResult<FrameStatus> {
        info.validate_planes()?;
        let mode = output.mode()?;
        match mode {
            OutputMode::Yuv => self.deliver_to_buffer(info, output)?,
            OutputMode::SurfaceYuv => {
                if info.bit_depth != 8 && self.render_mode == RenderMode::DirectToSurface {
                    log::warn!(
                        "{}-bit output cannot be rendered directly, converting for the rest of \
                         the session",
                        info.bit_depth
                    );
                    self.render_mode = RenderMode::ConvertThenBuffer;
                }
                match self.render_mode {
                    RenderMode::DirectToSurface => self.deliver_direct(info, output)?,
                    RenderMode::ConvertThenBuffer => self.deliver_to_buffer(info, output)?,
                }
            }
            OutputMode::None => {
                log::debug!("output buffer has no output mode, dropping picture");
                return Ok(FrameStatus::Ok);
            }
        }
        output.init(info.timestamp, mode)?;
        Ok(FrameStatus::Ok)
    }

    fn deliver_to_buffer(
        &mut self,
        info: &PictureInfo,
        output: &mut impl OutputBuffer,
    ) -> DecoderResult<()> {
        let layout = YuvBufferLayout::for_picture(info);
        if !output.init_for_yuv_frame(
            info.width,
            info.height,
            layout.y_stride,
            layout.uv_stride,
            COLOR_SPACE_UNKNOWN,
        )? {
            return DecoderError::buffer_resize_error();
        }
        write_frame_to_buffer(info, output.data()?, &mut self.ditherer)
    }

    fn frame_layout(&self, info: &PictureInfo, slot: SlotId) -> DecoderResult<FrameLayout> {
        let base = self.pool.base_pointer(slot)? as usize;
        let mut frame = FrameLayout {
            plane_count: info.plane_count(),
            ..FrameLayout::default()
        };
        for plane in &YUV_PLANES[..info.plane_count()] {
            let offset = (info.plane_ptr(*plane) as usize)
                .checked_sub(base)
                .ok_or(DecoderError::InvalidArgument)?;
            frame.planes[plane.to_usize()] = PlaneView {
                offset,
                stride: info.stride(*plane),
                width: info.plane_width(*plane),
                height: info.plane_height(*plane),
            };
        }
        Ok(frame)
    }

    fn deliver_direct(
        &mut self,
        info: &PictureInfo,
        output: &mut impl OutputBuffer,
    ) -> DecoderResult<()> {
        let slot = match info.slot {
            Some(slot) => slot,
            None => return DecoderError::invalid_argument(),
        };
        // Keeps the slot alive after the decoder releases the picture.
        self.pool.add_reference(slot)?;
        let result = self
            .frame_layout(info, slot)
            .and_then(|frame| self.pool.set_frame_layout(slot, frame))
            .and_then(|_| output.init_for_private_frame(info.width, info.height))
            .and_then(|_| output.set_decoder_private(slot.as_i32()));
        if result.is_err() {
            // The caller never saw this frame; drop the extra reference.
            let _ = self.pool.release(slot);
        }
        result
    }

    /// Binds |surface|. Binding the surface that is already bound is a no-op;
    /// anything else drops the old surface and forces geometry negotiation on
    /// the next render.
    pub fn set_surface(&mut self, surface: Option<S>) {
        match (&self.surface, &surface) {
            (Some(current), Some(new)) if current.same_surface(new) => return,
            (None, None) => return,
            _ => {}
        }
        self.surface = surface;
        self.surface_width = 0;
        self.surface_height = 0;
    }

    /// Blits the frame held by |output| to |surface| (binding it first).
    pub fn render_frame(
        &mut self,
        surface: Option<S>,
        output: &mut impl OutputBuffer,
    ) -> DecoderResult<()> {
        let result = self.render_impl(surface, output);
        if let Err(err) = &result {
            self.record_error(err);
        }
        result
    }

    fn render_impl(
        &mut self,
        surface: Option<S>,
        output: &mut impl OutputBuffer,
    ) -> DecoderResult<()> {
        match self.render_mode {
            RenderMode::DirectToSurface => {
                let slot = match SlotId::from_i32(output.decoder_private()?) {
                    Some(slot) => slot,
                    None => return DecoderError::buffer_already_released(),
                };
                let frame = match self.pool.lookup(slot)?.frame {
                    Some(frame) => frame,
                    None => return DecoderError::buffer_already_released(),
                };
                let base = self.pool.base_pointer(slot)?;
                let mut source = SourceFrame {
                    width: frame.planes[0].width,
                    height: frame.planes[0].height,
                    ..SourceFrame::default()
                };
                for (index, plane) in frame.planes[..frame.plane_count].iter().enumerate() {
                    let size = plane_span(plane.stride, plane.width, plane.height)?;
                    // # Safety: set_frame_layout checked that the plane lies
                    // within the slot's storage. The frame holds a reference to
                    // the slot, so the storage is neither freed nor reused
                    // while |self| is borrowed mutably here.
                    let data = unsafe { std::slice::from_raw_parts(base.add(plane.offset), size) };
                    source.planes[index] = Some(SourcePlane {
                        data,
                        stride: plane.stride,
                        width: plane.width,
                        height: plane.height,
                    });
                }
                self.set_surface(surface);
                self.blit(&source)
            }
            RenderMode::ConvertThenBuffer => {
                let width = usize_from_u32(output.width()?)?;
                let height = usize_from_u32(output.height()?)?;
                let strides = output.yuv_strides()?;
                let layout = YuvBufferLayout::new(width, height, strides[0], strides[1]);
                let data = output.data()?;
                let mut source = SourceFrame {
                    width,
                    height,
                    ..SourceFrame::default()
                };
                for plane in YUV_PLANES {
                    let plane_width = layout.plane_width(plane);
                    let plane_height = layout.plane_height(plane);
                    let stride = layout.stride(plane);
                    let size = plane_span(stride, plane_width, plane_height)?;
                    let start = layout.plane_offset(plane);
                    let plane_data = match data.get(start..start + size) {
                        Some(plane_data) => plane_data,
                        None => return DecoderError::invalid_argument(),
                    };
                    source.planes[plane.to_usize()] = Some(SourcePlane {
                        data: plane_data,
                        stride,
                        width: plane_width,
                        height: plane_height,
                    });
                }
                self.set_surface(surface);
                self.blit(&source)
            }
        }
    }

    fn blit(&mut self, source: &SourceFrame) -> DecoderResult<()> {
        let surface = match self.surface.as_mut() {
            Some(surface) => surface,
            None => return DecoderError::native_window_error(),
        };
        let width = u32_from_usize(source.width)?;
        let height = u32_from_usize(source.height)?;
        if self.surface_width != width || self.surface_height != height {
            surface.set_buffers_geometry(width, height, IMAGE_FORMAT_YV12)?;
            self.surface_width = width;
            self.surface_height = height;
        }
        let mut buffer = surface.lock()?;
        let rendered = render_planes(source, &mut buffer);
        let posted = surface.unlock_and_post();
        rendered.and(posted)
    }

    /// Returns a frame delivered for direct rendering to the pool. A no-op
    /// unless the session renders directly.
    pub fn release_frame(&mut self, output: &mut impl OutputBuffer) -> DecoderResult<()> {
        if self.render_mode != RenderMode::DirectToSurface {
            return Ok(());
        }
        let id = output.decoder_private()?;
        output.set_decoder_private(-1)?;
        let result = match SlotId::from_i32(id) {
            Some(slot) => self.pool.release(slot),
            None => DecoderError::buffer_already_released(),
        };
        match &result {
            Ok(()) => self.status.set_status(Status::Ok),
            Err(err) => self.record_error(err),
        }
        result
    }

    pub fn error_message(&self) -> String {
        self.status.error_message()
    }

    pub fn check_error(&self) -> DecoderResult<()> {
        self.status.check()
    }
}

impl<D: Decoder, S: RenderSurface> Drop for Session<D, S> {
    fn drop(&mut self) {
        self.decoder.discard_pending();
        self.decoder.flush();
        log::debug!(
            "closing decoder session: {} slots, {} outstanding references",
            self.pool.slot_count(),
            self.pool.outstanding_references()
        );
        // The decoder is dropped (closed) next, then the pool.
    }
}
