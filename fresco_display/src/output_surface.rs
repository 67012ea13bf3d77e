// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Output surface that draws into a framebuffer owned by the embedding app.
//!
//! The parent app owns the GL context and the window; the compositor draws
//! into whatever framebuffer the app has bound and presents through the
//! app's swap. Because the app also touches GL state between our frames, the
//! stencil configuration is captured from the app every frame
//! ([`ScopedAppGlStateRestore`]) and reapplied before drawing.
//!
//! There is no recovery path for a lost context: the app's context is the
//! only one we have, so loss is logged and treated as fatal.

use std::collections::VecDeque;

use fresco_core::platform::GlContext;
use fresco_core::stencil::StencilState;
use fresco_core::time::HostTime;
use fresco_core::trace::SwapEvent;
use fresco_gpu::{SharedTraceSink, with_tracer};
use kurbo::Size;

/// GL state captured from the embedding app before the compositor draws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScopedAppGlStateRestore {
    stencil_state: StencilState,
    framebuffer_binding: u32,
}

impl ScopedAppGlStateRestore {
    /// Captures the app's stencil state and bound framebuffer.
    #[must_use]
    pub const fn new(stencil_state: StencilState, framebuffer_binding: u32) -> Self {
        Self {
            stencil_state,
            framebuffer_binding,
        }
    }

    /// The app's stencil state.
    #[must_use]
    pub const fn stencil_state(&self) -> &StencilState {
        &self.stencil_state
    }

    /// The framebuffer the app had bound.
    #[must_use]
    pub const fn framebuffer_binding(&self) -> u32 {
        self.framebuffer_binding
    }
}

/// Latency bookkeeping carried from input to present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencyInfo {
    /// Identifies the originating event.
    pub trace_id: i64,
    /// Filled in when the frame is swapped.
    pub swap_time: Option<HostTime>,
}

/// A frame handed to [`ParentOutputSurface::swap_buffers`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputSurfaceFrame {
    /// Size of the drawn frame in pixels.
    pub size: Size,
    /// Latency records for the input that produced this frame.
    pub latency_info: Vec<LatencyInfo>,
}

/// A swapped frame waiting for its completion acknowledgement.
#[derive(Clone, Debug, PartialEq)]
pub struct PresentedFrame {
    /// Presented-frame counter value.
    pub frame_index: u64,
    /// Presented size in pixels.
    pub size: Size,
    /// Latency records, stamped with the swap time.
    pub latency_info: Vec<LatencyInfo>,
}

/// Output surface drawing into the parent app's framebuffer.
pub struct ParentOutputSurface<C: GlContext> {
    context: C,
    surface_size: Size,
    has_alpha: bool,
    has_backbuffer: bool,
    stencil_state: StencilState,
    external_stencil_test: bool,
    frames_presented: u64,
    pending_swaps: VecDeque<PresentedFrame>,
    pub(crate) trace_sink: Option<SharedTraceSink>,
}

impl<C: GlContext> core::fmt::Debug for ParentOutputSurface<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ParentOutputSurface")
            .field("surface_size", &self.surface_size)
            .field("has_alpha", &self.has_alpha)
            .field("has_backbuffer", &self.has_backbuffer)
            .field("external_stencil_test", &self.external_stencil_test)
            .field("frames_presented", &self.frames_presented)
            .field("pending_swaps", &self.pending_swaps.len())
            .finish_non_exhaustive()
    }
}

impl<C: GlContext> ParentOutputSurface<C> {
    /// Wraps the app's GL context.
    pub fn new(context: C) -> Self {
        Self {
            context,
            surface_size: Size::ZERO,
            has_alpha: false,
            has_backbuffer: false,
            stencil_state: StencilState::DISABLED,
            external_stencil_test: false,
            frames_presented: 0,
            pending_swaps: VecDeque::new(),
            trace_sink: None,
        }
    }

    /// Reports swaps to `sink`.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: SharedTraceSink) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// The wrapped context.
    pub fn context(&self) -> &C {
        &self.context
    }

    /// The wrapped context, mutably.
    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    /// Current surface size in pixels.
    #[must_use]
    pub fn surface_size(&self) -> Size {
        self.surface_size
    }

    /// Whether the surface was reshaped with an alpha channel.
    #[must_use]
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Resizes the surface.
    ///
    /// # Panics
    ///
    /// Panics if `scale_factor` is not 1.0; the parent app draws at device
    /// scale and never asks the compositor to rescale. Panics on context loss.
    pub fn reshape(&mut self, size: Size, scale_factor: f32, has_alpha: bool) {
        assert!(
            scale_factor == 1.0,
            "parent output surface requires a scale factor of 1.0, got {scale_factor}"
        );
        self.check_context();
        self.surface_size = size;
        self.has_alpha = has_alpha;
        self.context.resize(size, has_alpha);
    }

    /// Binds the app's framebuffer as the draw target.
    pub fn bind_framebuffer(&mut self) {
        self.check_context();
        self.context.bind_framebuffer();
    }

    /// Marks the backbuffer as needed again after [`discard_backbuffer`].
    ///
    /// The app owns the actual buffer; this only tracks whether the
    /// compositor is allowed to draw.
    ///
    /// [`discard_backbuffer`]: Self::discard_backbuffer
    pub fn ensure_backbuffer(&mut self) {
        self.has_backbuffer = true;
    }

    /// Releases the backbuffer while the surface is hidden.
    pub fn discard_backbuffer(&mut self) {
        self.has_backbuffer = false;
    }

    /// Whether a backbuffer is currently held.
    #[must_use]
    pub fn has_backbuffer(&self) -> bool {
        self.has_backbuffer
    }

    /// Flushes and presents `frame`, returning its frame index.
    ///
    /// # Panics
    ///
    /// Panics on context loss.
    pub fn swap_buffers(&mut self, mut frame: OutputSurfaceFrame) -> u64 {
        self.check_context();
        self.context.flush();
        self.context.swap_buffers();

        let now = fresco_gpu::now();
        for info in &mut frame.latency_info {
            info.swap_time = Some(now);
        }
        self.frames_presented += 1;
        let frame_index = self.frames_presented;

        let event = SwapEvent {
            frame_index,
            width: pixels(frame.size.width),
            height: pixels(frame.size.height),
            timestamp: now,
        };
        with_tracer(self.trace_sink.as_ref(), |t| t.swap(&event));

        self.pending_swaps.push_back(PresentedFrame {
            frame_index,
            size: frame.size,
            latency_info: frame.latency_info,
        });
        frame_index
    }

    /// Acknowledges the oldest pending swap.
    pub fn did_swap_buffers_complete(&mut self) -> Option<PresentedFrame> {
        self.pending_swaps.pop_front()
    }

    /// Swaps issued but not yet acknowledged.
    #[must_use]
    pub fn pending_swap_count(&self) -> usize {
        self.pending_swaps.len()
    }

    /// Frames presented so far.
    #[must_use]
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Adopts the app's stencil state and applies it to the context.
    ///
    /// # Panics
    ///
    /// Panics on context loss.
    pub fn apply_external_stencil(&mut self, app_state: &ScopedAppGlStateRestore) {
        self.check_context();
        self.stencil_state = *app_state.stencil_state();
        self.update_stencil_test();
        self.context.set_stencil_state(&self.stencil_state);
    }

    /// Re-derives whether the external stencil test is active from the
    /// adopted stencil state.
    pub fn update_stencil_test(&mut self) {
        self.external_stencil_test = self.stencil_state.stencil_test_enabled;
    }

    /// Whether draws must honour the app's stencil test.
    #[must_use]
    pub fn has_external_stencil_test(&self) -> bool {
        self.external_stencil_test
    }

    /// The adopted stencil state.
    #[must_use]
    pub fn stencil_state(&self) -> &StencilState {
        &self.stencil_state
    }

    /// Handles loss of the app's GL context.
    ///
    /// # Panics
    ///
    /// Always.
    pub fn did_lose_context(&self) -> ! {
        tracing::error!(
            frames_presented = self.frames_presented,
            "parent output surface lost its GL context"
        );
        panic!("parent output surface GL context lost");
    }

    fn check_context(&self) {
        if self.context.is_context_lost() {
            self.did_lose_context();
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "surface sizes are small non-negative pixel counts"
)]
fn pixels(extent: f64) -> u32 {
    extent.max(0.0).round() as u32
}
