// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor frame sinks.
//!
//! A client submits compositor frames through a [`CompositorFrameSinkRemote`];
//! the display side drains the requests with
//! [`CompositorFrameSinkImpl::pump`]. Each submitted frame becomes the active
//! frame of the sink's current surface, and the resources of the frame it
//! replaces are handed back to the client once the display has finished
//! reading them.
//!
//! ```text
//!  client ── SubmitCompositorFrame ──▶ sink ──▶ SurfaceManager
//!    ▲                                  │
//!    ├──── did_receive_compositor_frame_ack
//!    └──── reclaim_resources (after the read fence retires)
//! ```
//!
//! Dropping the remote is a connection loss. The sink destroys its surfaces
//! and tells its [`CompositorFrameSinkDelegate`] exactly once.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use fresco_core::frame::CompositorFrame;
use fresco_core::id::{FrameSinkId, LocalSurfaceId, ResourceId, SurfaceId};
use fresco_core::resource::{ResourceTracker, ReturnedResource};
use fresco_core::sync::SyncToken;
use fresco_core::trace::{ConnectionLostEvent, Endpoint, FrameSubmitEvent};
use fresco_gpu::{SharedTraceSink, with_tracer};

use crate::error::{FrameSinkError, Result};
use crate::surfaces::SurfacesState;

/// Client end of a frame sink: receives acks, returned resources, and begin
/// frames.
pub trait DisplayClient {
    /// A submitted frame was accepted.
    fn did_receive_compositor_frame_ack(&mut self);

    /// Resources the display no longer uses.
    fn reclaim_resources(&mut self, resources: &[ReturnedResource]);

    /// The display is about to draw; sent only while begin frames are
    /// requested.
    fn on_begin_frame(&mut self, frame_index: u64) {
        _ = frame_index;
    }
}

/// Owner of frame sinks, told when a sink's client goes away.
pub trait CompositorFrameSinkDelegate {
    /// The client of `frame_sink_id` disconnected; its surfaces are gone.
    fn compositor_frame_sink_connection_lost(&mut self, frame_sink_id: FrameSinkId);
}

/// A request from the client to its frame sink.
#[derive(Clone, Debug)]
pub enum CompositorFrameSinkRequest {
    /// Show `frame` on the surface identified by `local_id`.
    SubmitCompositorFrame {
        /// Local part of the target surface id.
        local_id: LocalSurfaceId,
        /// The frame.
        frame: CompositorFrame,
    },
    /// Start or stop begin-frame notifications.
    SetNeedsBeginFrame(bool),
    /// Drop the current surface and its frame.
    EvictFrame,
}

/// Client-side handle of a frame sink. Dropping it disconnects.
#[derive(Debug)]
pub struct CompositorFrameSinkRemote {
    frame_sink_id: FrameSinkId,
    sender: Sender<CompositorFrameSinkRequest>,
}

impl CompositorFrameSinkRemote {
    /// The sink this remote talks to.
    #[must_use]
    pub fn frame_sink_id(&self) -> FrameSinkId {
        self.frame_sink_id
    }

    /// Submits a frame for the surface `local_id`.
    pub fn submit_compositor_frame(
        &self,
        local_id: LocalSurfaceId,
        frame: CompositorFrame,
    ) -> Result<()> {
        self.send(CompositorFrameSinkRequest::SubmitCompositorFrame { local_id, frame })
    }

    /// Starts or stops begin-frame notifications.
    pub fn set_needs_begin_frame(&self, needs_begin_frame: bool) -> Result<()> {
        self.send(CompositorFrameSinkRequest::SetNeedsBeginFrame(
            needs_begin_frame,
        ))
    }

    /// Drops the current surface.
    pub fn evict_frame(&self) -> Result<()> {
        self.send(CompositorFrameSinkRequest::EvictFrame)
    }

    fn send(&self, request: CompositorFrameSinkRequest) -> Result<()> {
        self.sender
            .send(request)
            .map_err(|_| FrameSinkError::Disconnected)
    }
}

/// Display-side frame sink.
pub struct CompositorFrameSinkImpl {
    frame_sink_id: FrameSinkId,
    surfaces: Arc<SurfacesState>,
    requests: Receiver<CompositorFrameSinkRequest>,
    client: Box<dyn DisplayClient>,
    surface_id: Option<SurfaceId>,
    resources: ResourceTracker,
    locked: Vec<ResourceId>,
    needs_begin_frame: bool,
    connected: bool,
    trace_sink: Option<SharedTraceSink>,
}

impl fmt::Debug for CompositorFrameSinkImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositorFrameSinkImpl")
            .field("frame_sink_id", &self.frame_sink_id)
            .field("surface_id", &self.surface_id)
            .field("resources", &self.resources.len())
            .field("needs_begin_frame", &self.needs_begin_frame)
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl CompositorFrameSinkImpl {
    /// Registers `frame_sink_id` and binds it to a new channel.
    pub fn bind(
        frame_sink_id: FrameSinkId,
        surfaces: Arc<SurfacesState>,
        client: Box<dyn DisplayClient>,
        trace_sink: Option<SharedTraceSink>,
    ) -> Result<(Self, CompositorFrameSinkRemote)> {
        surfaces.manager().register_frame_sink(frame_sink_id)?;
        let (sender, requests) = crossbeam_channel::unbounded();
        tracing::debug!(?frame_sink_id, "frame sink bound");
        Ok((
            Self {
                frame_sink_id,
                surfaces,
                requests,
                client,
                surface_id: None,
                resources: ResourceTracker::new(),
                locked: Vec::new(),
                needs_begin_frame: false,
                connected: true,
                trace_sink,
            },
            CompositorFrameSinkRemote {
                frame_sink_id,
                sender,
            },
        ))
    }

    /// The sink id.
    #[must_use]
    pub fn frame_sink_id(&self) -> FrameSinkId {
        self.frame_sink_id
    }

    /// The surface the latest frame went to.
    #[must_use]
    pub fn surface_id(&self) -> Option<SurfaceId> {
        self.surface_id
    }

    /// Whether the client wants begin frames.
    #[must_use]
    pub fn needs_begin_frame(&self) -> bool {
        self.needs_begin_frame
    }

    /// Whether the client is still connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Handles every queued request, then returns released resources.
    ///
    /// Returns `false` once the client has disconnected.
    pub fn pump(&mut self, delegate: &mut dyn CompositorFrameSinkDelegate) -> bool {
        while self.connected {
            match self.requests.try_recv() {
                Ok(request) => self.handle(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.on_connection_lost(delegate),
            }
        }
        if self.connected {
            self.return_resources();
        }
        self.connected
    }

    fn handle(&mut self, request: CompositorFrameSinkRequest) {
        match request {
            CompositorFrameSinkRequest::SubmitCompositorFrame { local_id, frame } => {
                if let Err(error) = self.submit_compositor_frame(local_id, frame) {
                    tracing::warn!(frame_sink_id = ?self.frame_sink_id, %error, "frame rejected");
                }
            }
            CompositorFrameSinkRequest::SetNeedsBeginFrame(needs) => {
                self.set_needs_begin_frame(needs);
            }
            CompositorFrameSinkRequest::EvictFrame => self.evict_frame(),
        }
    }

    /// Validates `frame` and makes it the active frame of surface `local_id`.
    ///
    /// A rejected frame's resources are returned to the client immediately.
    pub fn submit_compositor_frame(
        &mut self,
        local_id: LocalSurfaceId,
        frame: CompositorFrame,
    ) -> Result<()> {
        if !local_id.is_valid() {
            self.reject(&frame);
            return Err(FrameSinkError::InvalidLocalSurfaceId(local_id));
        }
        if let Err(error) = frame.validate() {
            self.reject(&frame);
            return Err(error.into());
        }

        let surface_id = SurfaceId::new(self.frame_sink_id, local_id);
        let event = FrameSubmitEvent {
            surface: surface_id,
            frame_token: frame.metadata.frame_token,
            quads: count(frame.render_passes.iter().map(|p| p.quads.len()).sum()),
            resources: count(frame.resources.len()),
            timestamp: fresco_gpu::now(),
        };
        {
            let mut manager = self.surfaces.manager();
            if self.surface_id != Some(surface_id) {
                if let Err(error) = manager.create_surface(surface_id) {
                    drop(manager);
                    self.reject(&frame);
                    return Err(error);
                }
                if let Some(previous) = self.surface_id.replace(surface_id) {
                    _ = manager.destroy_surface(previous);
                }
            }

            self.resources.receive(&frame.resources);
            let referenced = frame.referenced_resources();
            self.resources.lock_for_frame(&referenced);
            let previous = core::mem::replace(&mut self.locked, referenced);
            self.resources.unlock_for_frame(&previous);
            manager.set_active_frame(surface_id, frame)?;
        }
        with_tracer(self.trace_sink.as_ref(), |t| t.frame_submit(&event));

        self.return_resources();
        self.client.did_receive_compositor_frame_ack();
        Ok(())
    }

    /// Starts or stops begin frames.
    pub fn set_needs_begin_frame(&mut self, needs_begin_frame: bool) {
        self.needs_begin_frame = needs_begin_frame;
    }

    /// Sends a begin frame if the client asked for them.
    pub fn send_begin_frame(&mut self, frame_index: u64) {
        if self.connected && self.needs_begin_frame {
            self.client.on_begin_frame(frame_index);
        }
    }

    /// Destroys the current surface and releases its frame's resources.
    pub fn evict_frame(&mut self) {
        if let Some(surface_id) = self.surface_id.take() {
            _ = self.surfaces.manager().destroy_surface(surface_id);
        }
        let locked = core::mem::take(&mut self.locked);
        self.resources.unlock_for_frame(&locked);
        self.return_resources();
    }

    /// Records that the display's reads of the active frame's resources
    /// complete when `fence` retires.
    pub fn mark_resources_read(&mut self, fence: SyncToken) {
        for &id in &self.locked {
            self.resources.mark_read(id, fence);
        }
    }

    /// Hands every unlocked resource whose read fence has retired back to
    /// the client.
    pub fn return_resources(&mut self) {
        let returned = self
            .resources
            .collect_returnable(&**self.surfaces.sync_point_manager());
        if !returned.is_empty() {
            self.client.reclaim_resources(&returned);
        }
    }

    fn reject(&mut self, frame: &CompositorFrame) {
        let returned: Vec<ReturnedResource> = frame
            .resources
            .iter()
            .map(|resource| ReturnedResource {
                id: resource.id,
                sync_token: resource.sync_token,
                count: 1,
                lost: false,
            })
            .collect();
        if !returned.is_empty() {
            self.client.reclaim_resources(&returned);
        }
    }

    fn on_connection_lost(&mut self, delegate: &mut dyn CompositorFrameSinkDelegate) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let destroyed = self
            .surfaces
            .manager()
            .invalidate_frame_sink(self.frame_sink_id);
        self.surface_id = None;
        self.locked.clear();
        let lost = self.resources.lose_all();
        tracing::debug!(
            frame_sink_id = ?self.frame_sink_id,
            surfaces = destroyed.len(),
            resources = lost.len(),
            "frame sink client disconnected"
        );

        let event = ConnectionLostEvent {
            endpoint: Endpoint::FrameSink(self.frame_sink_id),
            timestamp: fresco_gpu::now(),
        };
        with_tracer(self.trace_sink.as_ref(), |t| t.connection_lost(&event));
        delegate.compositor_frame_sink_connection_lost(self.frame_sink_id);
    }
}

impl Drop for CompositorFrameSinkImpl {
    fn drop(&mut self) {
        if self.connected {
            self.surfaces
                .manager()
                .invalidate_frame_sink(self.frame_sink_id);
        }
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use fresco_core::frame::{DrawQuad, Material, RenderPass};
    use fresco_core::id::{ClientId, RenderPassId};
    use fresco_core::resource::{ResourceFormat, TransferableResource};
    use fresco_core::sync::{CommandBufferId, CommandBufferNamespace};
    use fresco_gpu::SyncPointManager;
    use kurbo::{Rect, Size};
    use parking_lot::Mutex;

    #[derive(Debug, Default)]
    pub(crate) struct ClientLog {
        pub(crate) acks: u32,
        pub(crate) reclaimed: Vec<ReturnedResource>,
        pub(crate) begin_frames: Vec<u64>,
    }

    /// Client double sharing its log with the test.
    pub(crate) struct RecordingClient(pub(crate) Arc<Mutex<ClientLog>>);

    impl DisplayClient for RecordingClient {
        fn did_receive_compositor_frame_ack(&mut self) {
            self.0.lock().acks += 1;
        }

        fn reclaim_resources(&mut self, resources: &[ReturnedResource]) {
            self.0.lock().reclaimed.extend_from_slice(resources);
        }

        fn on_begin_frame(&mut self, frame_index: u64) {
            self.0.lock().begin_frames.push(frame_index);
        }
    }

    #[derive(Debug, Default)]
    struct LostSinks(Vec<FrameSinkId>);

    impl CompositorFrameSinkDelegate for LostSinks {
        fn compositor_frame_sink_connection_lost(&mut self, frame_sink_id: FrameSinkId) {
            self.0.push(frame_sink_id);
        }
    }

    pub(crate) fn resource(id: u32) -> TransferableResource {
        TransferableResource {
            id: ResourceId(id),
            format: ResourceFormat::Rgba8888,
            size: Size::new(64.0, 64.0),
            texture: id,
            sync_token: SyncToken::default(),
            is_overlay_candidate: false,
        }
    }

    /// A single-pass frame drawing each of `ids` as a texture quad.
    pub(crate) fn frame_using(ids: &[u32]) -> CompositorFrame {
        let mut pass = RenderPass::new(RenderPassId(1), Rect::new(0.0, 0.0, 64.0, 64.0));
        for &id in ids {
            pass.push_quad(DrawQuad::new(
                Rect::new(0.0, 0.0, 64.0, 64.0),
                Material::Texture {
                    resource: ResourceId(id),
                    uv_rect: Rect::new(0.0, 0.0, 1.0, 1.0),
                    premultiplied_alpha: true,
                    y_flipped: false,
                },
            ));
        }
        CompositorFrame {
            resources: ids.iter().map(|&id| resource(id)).collect(),
            render_passes: vec![pass],
            ..CompositorFrame::default()
        }
    }

    struct Harness {
        surfaces: Arc<SurfacesState>,
        sink: CompositorFrameSinkImpl,
        remote: CompositorFrameSinkRemote,
        log: Arc<Mutex<ClientLog>>,
    }

    fn harness() -> Harness {
        let surfaces = SurfacesState::new(Arc::new(SyncPointManager::new()));
        let log = Arc::new(Mutex::new(ClientLog::default()));
        let id = FrameSinkId::new(surfaces.next_client_id(), 0);
        let (sink, remote) = CompositorFrameSinkImpl::bind(
            id,
            Arc::clone(&surfaces),
            Box::new(RecordingClient(Arc::clone(&log))),
            None,
        )
        .expect("sink binds");
        Harness {
            surfaces,
            sink,
            remote,
            log,
        }
    }

    fn returned_ids(log: &Mutex<ClientLog>) -> Vec<u32> {
        log.lock().reclaimed.iter().map(|r| r.id.0).collect()
    }

    #[test]
    fn submitted_frame_becomes_active_and_is_acked() {
        let mut h = harness();
        let mut delegate = LostSinks::default();
        h.remote
            .submit_compositor_frame(LocalSurfaceId(1), frame_using(&[1]))
            .expect("remote is connected");
        assert!(h.sink.pump(&mut delegate));

        let surface_id = h.sink.surface_id().expect("surface was created");
        let manager = h.surfaces.manager();
        let surface = manager.surface(surface_id).expect("surface exists");
        assert!(surface.active_frame().is_some());
        assert_eq!(h.log.lock().acks, 1);
        assert!(h.log.lock().reclaimed.is_empty(), "resource 1 is in use");
    }

    #[test]
    fn invalid_frames_are_rejected_and_their_resources_returned() {
        let mut h = harness();
        let mut frame = frame_using(&[1]);
        frame.render_passes.clear();
        assert!(matches!(
            h.sink.submit_compositor_frame(LocalSurfaceId(1), frame),
            Err(FrameSinkError::InvalidFrame(_))
        ));
        assert_eq!(
            h.sink
                .submit_compositor_frame(LocalSurfaceId::INVALID, frame_using(&[2])),
            Err(FrameSinkError::InvalidLocalSurfaceId(LocalSurfaceId::INVALID))
        );
        assert_eq!(h.log.lock().acks, 0);
        assert_eq!(returned_ids(&h.log), vec![1, 2]);
        assert!(h.sink.surface_id().is_none());
    }

    #[test]
    fn resources_wait_for_their_read_fence() {
        let mut h = harness();
        let sync_points = Arc::clone(h.surfaces.sync_point_manager());
        h.sink
            .submit_compositor_frame(LocalSurfaceId(1), frame_using(&[1]))
            .expect("frame is valid");

        let read_done = sync_points.generate_sync_point();
        h.sink.mark_resources_read(SyncToken::new(
            CommandBufferNamespace::InProcess,
            CommandBufferId(0),
            read_done,
        ));

        h.sink
            .submit_compositor_frame(LocalSurfaceId(1), frame_using(&[2]))
            .expect("frame is valid");
        assert!(returned_ids(&h.log).is_empty(), "fence not retired yet");

        sync_points.retire_sync_point(read_done);
        h.sink.return_resources();
        assert_eq!(returned_ids(&h.log), vec![1]);
        assert_eq!(h.log.lock().reclaimed[0].sync_token.sync_point, read_done);
        assert_eq!(h.log.lock().acks, 2);
    }

    #[test]
    fn unreferenced_resources_come_straight_back() {
        let mut h = harness();
        let mut frame = frame_using(&[1]);
        frame.resources.push(resource(9));
        h.sink
            .submit_compositor_frame(LocalSurfaceId(1), frame)
            .expect("frame is valid");
        assert_eq!(returned_ids(&h.log), vec![9]);
    }

    #[test]
    fn new_local_id_replaces_the_surface() {
        let mut h = harness();
        h.sink
            .submit_compositor_frame(LocalSurfaceId(1), frame_using(&[]))
            .expect("frame is valid");
        let first = h.sink.surface_id().expect("surface exists");
        h.sink
            .submit_compositor_frame(LocalSurfaceId(2), frame_using(&[]))
            .expect("frame is valid");
        let second = h.sink.surface_id().expect("surface exists");

        assert_ne!(first, second);
        let manager = h.surfaces.manager();
        assert!(manager.surface(first).is_none());
        assert!(manager.surface(second).is_some());
    }

    #[test]
    fn evict_and_begin_frame_requests() {
        let mut h = harness();
        let mut delegate = LostSinks::default();
        h.remote
            .submit_compositor_frame(LocalSurfaceId(1), frame_using(&[4]))
            .expect("remote is connected");
        h.remote
            .set_needs_begin_frame(true)
            .expect("remote is connected");
        h.sink.pump(&mut delegate);
        assert!(h.sink.needs_begin_frame());
        h.sink.send_begin_frame(7);
        assert_eq!(h.log.lock().begin_frames, vec![7]);

        h.remote.evict_frame().expect("remote is connected");
        h.sink.pump(&mut delegate);
        assert!(h.sink.surface_id().is_none());
        assert_eq!(h.surfaces.manager().surface_count(), 0);
        assert_eq!(returned_ids(&h.log), vec![4]);
    }

    #[test]
    fn connection_loss_is_reported_once() {
        let Harness {
            surfaces,
            mut sink,
            remote,
            log: _log,
        } = harness();
        let mut delegate = LostSinks::default();
        remote
            .submit_compositor_frame(LocalSurfaceId(1), frame_using(&[1]))
            .expect("remote is connected");
        drop(remote);

        assert!(!sink.pump(&mut delegate));
        assert!(!sink.pump(&mut delegate));
        assert_eq!(delegate.0, vec![sink.frame_sink_id()]);
        assert!(!sink.is_connected());
        let manager = surfaces.manager();
        assert_eq!(manager.surface_count(), 0);
        assert!(!manager.is_frame_sink_registered(sink.frame_sink_id()));
    }

    #[test]
    fn frame_sink_ids_cannot_be_bound_twice() {
        let h = harness();
        let result = CompositorFrameSinkImpl::bind(
            h.sink.frame_sink_id(),
            Arc::clone(&h.surfaces),
            Box::new(RecordingClient(Arc::default())),
            None,
        );
        assert!(matches!(
            result,
            Err(FrameSinkError::DuplicateFrameSink(id)) if id == FrameSinkId::new(ClientId(1), 0)
        ));
    }
}
