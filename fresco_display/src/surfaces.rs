// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-process surface bookkeeping.
//!
//! [`SurfacesState`] is shared by every display in the process. It hands out
//! client ids, so frame sink ids never collide, and owns the
//! [`SurfaceManager`], which maps each live [`SurfaceId`] to its active frame.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use fresco_core::frame::CompositorFrame;
use fresco_core::id::{ClientId, FrameSinkId, LocalSurfaceId, SurfaceId};
use fresco_gpu::SyncPointManager;
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, MutexGuard};

use crate::error::{FrameSinkError, Result};

/// Allocates surface ids within one frame sink.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceIdAllocator {
    frame_sink_id: FrameSinkId,
    next_local_id: u32,
}

impl SurfaceIdAllocator {
    /// Creates an allocator for `frame_sink_id`.
    #[must_use]
    pub const fn new(frame_sink_id: FrameSinkId) -> Self {
        Self {
            frame_sink_id,
            next_local_id: 1,
        }
    }

    /// The frame sink ids are allocated for.
    #[must_use]
    pub const fn frame_sink_id(&self) -> FrameSinkId {
        self.frame_sink_id
    }

    /// Returns a surface id never returned before by this allocator.
    ///
    /// # Panics
    ///
    /// Panics if the local id space is exhausted.
    pub fn generate_id(&mut self) -> SurfaceId {
        assert!(
            self.next_local_id != u32::MAX,
            "local surface id space exhausted"
        );
        let local_id = LocalSurfaceId(self.next_local_id);
        self.next_local_id += 1;
        SurfaceId::new(self.frame_sink_id, local_id)
    }
}

/// A surface and the frame currently shown on it.
#[derive(Clone, Debug)]
pub struct Surface {
    id: SurfaceId,
    active_frame: Option<CompositorFrame>,
    frames_activated: u64,
}

impl Surface {
    /// The surface id.
    #[must_use]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    /// The frame currently shown, if any.
    #[must_use]
    pub fn active_frame(&self) -> Option<&CompositorFrame> {
        self.active_frame.as_ref()
    }

    /// Frames activated on this surface so far.
    #[must_use]
    pub fn frames_activated(&self) -> u64 {
        self.frames_activated
    }
}

/// Registered frame sinks and their surfaces.
#[derive(Debug, Default)]
pub struct SurfaceManager {
    frame_sinks: HashSet<FrameSinkId>,
    surfaces: HashMap<SurfaceId, Surface>,
}

impl SurfaceManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a frame sink so it may create surfaces.
    pub fn register_frame_sink(&mut self, id: FrameSinkId) -> Result<()> {
        if !self.frame_sinks.insert(id) {
            return Err(FrameSinkError::DuplicateFrameSink(id));
        }
        Ok(())
    }

    /// Unregisters a frame sink and destroys its surfaces.
    ///
    /// Returns the destroyed surface ids, sorted.
    pub fn invalidate_frame_sink(&mut self, id: FrameSinkId) -> Vec<SurfaceId> {
        self.frame_sinks.remove(&id);
        let mut doomed: Vec<SurfaceId> = self
            .surfaces
            .keys()
            .filter(|surface| surface.frame_sink_id == id)
            .copied()
            .collect();
        doomed.sort_unstable();
        for surface in &doomed {
            self.surfaces.remove(surface);
        }
        doomed
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn is_frame_sink_registered(&self, id: FrameSinkId) -> bool {
        self.frame_sinks.contains(&id)
    }

    /// Creates an empty surface.
    pub fn create_surface(&mut self, id: SurfaceId) -> Result<()> {
        if !self.frame_sinks.contains(&id.frame_sink_id) {
            return Err(FrameSinkError::UnknownFrameSink(id.frame_sink_id));
        }
        if !id.local_id.is_valid() {
            return Err(FrameSinkError::InvalidLocalSurfaceId(id.local_id));
        }
        if self.surfaces.contains_key(&id) {
            return Err(FrameSinkError::DuplicateSurface(id));
        }
        self.surfaces.insert(
            id,
            Surface {
                id,
                active_frame: None,
                frames_activated: 0,
            },
        );
        Ok(())
    }

    /// Destroys a surface, returning its last active frame.
    pub fn destroy_surface(&mut self, id: SurfaceId) -> Result<Option<CompositorFrame>> {
        self.surfaces
            .remove(&id)
            .map(|surface| surface.active_frame)
            .ok_or(FrameSinkError::UnknownSurface(id))
    }

    /// Makes `frame` the active frame of `id`, returning the one it replaces.
    pub fn set_active_frame(
        &mut self,
        id: SurfaceId,
        frame: CompositorFrame,
    ) -> Result<Option<CompositorFrame>> {
        let surface = self
            .surfaces
            .get_mut(&id)
            .ok_or(FrameSinkError::UnknownSurface(id))?;
        surface.frames_activated += 1;
        Ok(surface.active_frame.replace(frame))
    }

    /// Looks up a surface.
    #[must_use]
    pub fn surface(&self, id: SurfaceId) -> Option<&Surface> {
        self.surfaces.get(&id)
    }

    /// Number of live surfaces.
    #[must_use]
    pub fn surface_count(&self) -> usize {
        self.surfaces.len()
    }
}

/// Surface state shared by every display in the process.
pub struct SurfacesState {
    next_client_id: AtomicU32,
    manager: Mutex<SurfaceManager>,
    sync_points: Arc<SyncPointManager>,
}

impl fmt::Debug for SurfacesState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfacesState")
            .field("next_client_id", &self.next_client_id.load(Ordering::Relaxed))
            .field("manager", &*self.manager.lock())
            .finish_non_exhaustive()
    }
}

impl SurfacesState {
    /// Creates the shared state; resource fences are checked against
    /// `sync_points`.
    #[must_use]
    pub fn new(sync_points: Arc<SyncPointManager>) -> Arc<Self> {
        Arc::new(Self {
            next_client_id: AtomicU32::new(1),
            manager: Mutex::new(SurfaceManager::new()),
            sync_points,
        })
    }

    /// Allocates a process-unique client id.
    pub fn next_client_id(&self) -> ClientId {
        ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Locks the surface manager.
    pub fn manager(&self) -> MutexGuard<'_, SurfaceManager> {
        self.manager.lock()
    }

    /// The sync point manager used for resource fences.
    #[must_use]
    pub fn sync_point_manager(&self) -> &Arc<SyncPointManager> {
        &self.sync_points
    }
}
