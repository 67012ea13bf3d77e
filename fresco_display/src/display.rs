// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-window display.
//!
//! A [`DisplayImpl`] owns one [`ParentOutputSurface`], the overlay validator,
//! and the frame sinks of its clients. It is driven from the display thread:
//!
//! 1. [`pump`](DisplayImpl::pump) drains every sink's requests.
//! 2. [`draw_and_swap`](DisplayImpl::draw_and_swap) composites the root
//!    sink's active frame, runs overlay promotion, and swaps.
//! 3. [`did_swap_buffers_complete`](DisplayImpl::did_swap_buffers_complete)
//!    retires the read fence of the oldest swap, releasing its resources to
//!    their clients.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use fresco_core::frame::CompositorFrame;
use fresco_core::id::{ClientId, FrameSinkId, SurfaceId};
use fresco_core::platform::{GlContext, OverlayCandidatesPlatform};
use fresco_core::sync::{CommandBufferId, CommandBufferNamespace, SyncPoint, SyncToken};
use fresco_gpu::SharedTraceSink;
use hashbrown::HashMap;
use kurbo::Size;

use crate::error::{FrameSinkError, Result};
use crate::frame_sink::{
    CompositorFrameSinkDelegate, CompositorFrameSinkImpl, CompositorFrameSinkRemote,
    DisplayClient,
};
use crate::output_surface::{OutputSurfaceFrame, ParentOutputSurface, PresentedFrame};
use crate::overlay::{
    BrowserCompositorOverlayValidator, OverlayConfig, OverlayOutcome, OverlayProcessor,
};
use crate::surfaces::{SurfaceIdAllocator, SurfacesState};

/// Display configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DisplayConfig {
    /// Overlay promotion settings.
    pub overlay: OverlayConfig,
    /// Swaps that may be outstanding before drawing is skipped.
    pub max_pending_swaps: usize,
    /// Whether the output surface keeps an alpha channel.
    pub has_alpha: bool,
}

impl DisplayConfig {
    /// Overlays on, double buffered.
    pub const DEFAULT: Self = Self {
        overlay: OverlayConfig::DEFAULT,
        max_pending_swaps: 2,
        has_alpha: false,
    };

    /// Composites everything with GL.
    #[must_use]
    pub const fn without_overlays() -> Self {
        Self {
            overlay: OverlayConfig::disabled(),
            ..Self::DEFAULT
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A window's display compositor.
pub struct DisplayImpl<C: GlContext, P: OverlayCandidatesPlatform> {
    config: DisplayConfig,
    surfaces: Arc<SurfacesState>,
    surface_ids: SurfaceIdAllocator,
    sinks: HashMap<ClientId, CompositorFrameSinkImpl>,
    root: Option<FrameSinkId>,
    output_surface: ParentOutputSurface<C>,
    validator: BrowserCompositorOverlayValidator<P>,
    overlay_processor: OverlayProcessor,
    last_overlay: OverlayOutcome,
    read_fences: VecDeque<SyncPoint>,
    trace_sink: Option<SharedTraceSink>,
}

impl<C: GlContext, P: OverlayCandidatesPlatform> fmt::Debug for DisplayImpl<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayImpl")
            .field("config", &self.config)
            .field("frame_sink_id", &self.surface_ids.frame_sink_id())
            .field("clients", &self.sinks.len())
            .field("root", &self.root)
            .field("output_surface", &self.output_surface)
            .field("read_fences", &self.read_fences)
            .finish_non_exhaustive()
    }
}

impl<C: GlContext, P: OverlayCandidatesPlatform> DisplayImpl<C, P> {
    /// Creates a display presenting through `context`.
    pub fn new(
        surfaces: Arc<SurfacesState>,
        context: C,
        platform: P,
        config: DisplayConfig,
    ) -> Self {
        // Registered so no client can bind the id surfaces are generated under.
        let frame_sink_id = loop {
            let id = FrameSinkId::new(surfaces.next_client_id(), 0);
            if surfaces.manager().register_frame_sink(id).is_ok() {
                break id;
            }
        };
        tracing::debug!(?frame_sink_id, "display created");
        Self {
            config,
            surfaces,
            surface_ids: SurfaceIdAllocator::new(frame_sink_id),
            sinks: HashMap::new(),
            root: None,
            output_surface: ParentOutputSurface::new(context),
            validator: BrowserCompositorOverlayValidator::new(platform, config.overlay),
            overlay_processor: OverlayProcessor::new(config.overlay),
            last_overlay: OverlayOutcome::default(),
            read_fences: VecDeque::new(),
            trace_sink: None,
        }
    }

    /// Reports swaps, overlay decisions, and frame sink events to `sink`.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: SharedTraceSink) -> Self {
        self.output_surface.trace_sink = Some(Arc::clone(&sink));
        self.overlay_processor.trace_sink = Some(Arc::clone(&sink));
        self.trace_sink = Some(sink);
        self
    }

    /// The shared surface state.
    #[must_use]
    pub fn surfaces(&self) -> &Arc<SurfacesState> {
        &self.surfaces
    }

    /// The output surface.
    pub fn output_surface(&self) -> &ParentOutputSurface<C> {
        &self.output_surface
    }

    /// The output surface, mutably; used for external stencil state.
    pub fn output_surface_mut(&mut self) -> &mut ParentOutputSurface<C> {
        &mut self.output_surface
    }

    /// The overlay validator.
    pub fn overlay_validator_mut(&mut self) -> &mut BrowserCompositorOverlayValidator<P> {
        &mut self.validator
    }

    /// What overlay processing did on the last drawn frame.
    #[must_use]
    pub fn last_overlay_outcome(&self) -> &OverlayOutcome {
        &self.last_overlay
    }

    /// Returns a surface id unique across every display in the process.
    pub fn generate_surface_id(&mut self) -> SurfaceId {
        self.surface_ids.generate_id()
    }

    /// Binds a frame sink for `client_id` and returns the client's end.
    pub fn create_client(
        &mut self,
        client_id: ClientId,
        client: Box<dyn DisplayClient>,
    ) -> Result<CompositorFrameSinkRemote> {
        if self.sinks.contains_key(&client_id) {
            return Err(FrameSinkError::DuplicateClient(client_id));
        }
        let (sink, remote) = CompositorFrameSinkImpl::bind(
            FrameSinkId::new(client_id, 0),
            Arc::clone(&self.surfaces),
            client,
            self.trace_sink.clone(),
        )?;
        self.sinks.insert(client_id, sink);
        Ok(remote)
    }

    /// Number of bound clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.sinks.len()
    }

    /// Chooses the frame sink whose surface fills the window.
    pub fn set_root_frame_sink(&mut self, frame_sink_id: Option<FrameSinkId>) {
        self.root = frame_sink_id;
    }

    /// The frame sink drawn by [`draw_and_swap`](Self::draw_and_swap).
    #[must_use]
    pub fn root_frame_sink(&self) -> Option<FrameSinkId> {
        self.root
    }

    /// Resizes the output surface.
    pub fn resize(&mut self, size: Size) {
        self.output_surface
            .reshape(size, 1.0, self.config.has_alpha);
    }

    /// Dispatches pending requests on every bound sink and drops the sinks
    /// whose clients disconnected.
    pub fn pump(&mut self) {
        let mut sinks = core::mem::take(&mut self.sinks);
        sinks.retain(|_, sink| sink.pump(self));
        debug_assert!(self.sinks.is_empty(), "sinks are only bound between pumps");
        self.sinks = sinks;
    }

    /// Draws the root surface's active frame and swaps.
    ///
    /// Returns the swapped frame index, or `None` when there is nothing to
    /// draw or too many swaps are outstanding.
    ///
    /// # Panics
    ///
    /// Panics if the GL context is lost.
    pub fn draw_and_swap(&mut self) -> Option<u64> {
        if self.output_surface.pending_swap_count() >= self.config.max_pending_swaps {
            tracing::trace!(
                pending = self.output_surface.pending_swap_count(),
                "draw skipped, swaps outstanding"
            );
            return None;
        }
        let root = self.root?;
        let sink = self.sinks.get_mut(&root.client_id)?;
        let surface_id = sink.surface_id()?;
        let mut frame = self
            .surfaces
            .manager()
            .surface(surface_id)?
            .active_frame()?
            .clone();

        let CompositorFrame {
            resources,
            render_passes,
            ..
        } = &mut frame;
        let root_pass = render_passes.last_mut()?;
        self.last_overlay = self
            .overlay_processor
            .process(&mut self.validator, resources, root_pass);

        self.output_surface.ensure_backbuffer();
        self.output_surface.bind_framebuffer();
        let frame_index = self.output_surface.swap_buffers(OutputSurfaceFrame {
            size: self.output_surface.surface_size(),
            latency_info: Vec::new(),
        });

        let read_done = self.surfaces.sync_point_manager().generate_sync_point();
        sink.mark_resources_read(SyncToken::new(
            CommandBufferNamespace::InProcess,
            CommandBufferId(0),
            read_done,
        ));
        self.read_fences.push_back(read_done);
        tracing::trace!(frame_index, ?surface_id, ?read_done, "frame swapped");

        for sink in self.sinks.values_mut() {
            sink.send_begin_frame(frame_index);
        }
        Some(frame_index)
    }

    /// Acknowledges the oldest swap: retires its read fence and hands
    /// released resources back to their clients.
    pub fn did_swap_buffers_complete(&mut self) -> Option<PresentedFrame> {
        let presented = self.output_surface.did_swap_buffers_complete()?;
        if let Some(read_done) = self.read_fences.pop_front() {
            self.surfaces
                .sync_point_manager()
                .retire_sync_point(read_done);
        }
        for sink in self.sinks.values_mut() {
            sink.return_resources();
        }
        Some(presented)
    }
}

impl<C: GlContext, P: OverlayCandidatesPlatform> CompositorFrameSinkDelegate
    for DisplayImpl<C, P>
{
    fn compositor_frame_sink_connection_lost(&mut self, frame_sink_id: FrameSinkId) {
        tracing::debug!(?frame_sink_id, "client disconnected");
        if self.root == Some(frame_sink_id) {
            self.root = None;
        }
    }
}

impl<C: GlContext, P: OverlayCandidatesPlatform> Drop for DisplayImpl<C, P> {
    fn drop(&mut self) {
        self.surfaces
            .manager()
            .invalidate_frame_sink(self.surface_ids.frame_sink_id());
    }
}
