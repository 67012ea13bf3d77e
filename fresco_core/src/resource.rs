// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transferable GPU resources and their lifetime tracking.
//!
//! A client hands [`TransferableResource`]s to the display compositor along
//! with each compositor frame. Quads *reference* resources by
//! [`ResourceId`]; they never own them. The display side must not hand a
//! resource back to the client while any frame still draws from it, nor
//! before the GPU has passed the sync point guarding its last read.
//!
//! [`ResourceTracker`] enforces that rule:
//!
//! ```text
//!   receive() ──► lock_for_frame() ──► unlock_for_frame() ──► [read fence]
//!                                                                 │
//!                       collect_returnable(&sync_points) ◄────────┘
//!                               │ (only once the fence has retired)
//!                               ▼
//!                        ReturnedResource
//! ```

use alloc::vec::Vec;

use hashbrown::HashMap;
use kurbo::Size;

use crate::id::ResourceId;
use crate::sync::{SyncPoint, SyncPointQuery, SyncToken};

/// Pixel format of a transferable resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ResourceFormat {
    /// 8-bit RGBA.
    #[default]
    Rgba8888,
    /// 8-bit BGRA.
    Bgra8888,
    /// 16-bit RGB 565.
    Rgb565,
    /// 8-bit single-channel alpha.
    Alpha8,
    /// Multi-planar YUV 4:2:0.
    Yuv420,
}

/// A GPU resource handed from a client to the display compositor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransferableResource {
    /// Client-assigned identifier.
    pub id: ResourceId,
    /// Pixel format.
    pub format: ResourceFormat,
    /// Dimensions in pixels.
    pub size: Size,
    /// Backing texture or mailbox name.
    pub texture: u32,
    /// Fence that must retire before the display may read the resource.
    pub sync_token: SyncToken,
    /// Whether the platform may scan this resource out as a hardware overlay.
    pub is_overlay_candidate: bool,
}

/// A resource handed back to the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReturnedResource {
    /// The resource being returned.
    pub id: ResourceId,
    /// Fence the client must wait on before reusing the resource.
    pub sync_token: SyncToken,
    /// How many receipts of this resource are being returned.
    pub count: u32,
    /// Whether the resource's contents were lost (context loss, teardown).
    pub lost: bool,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    resource: TransferableResource,
    receipts: u32,
    frame_locks: u32,
    read_fence: SyncToken,
}

/// Tracks which received resources are still in use.
///
/// Frames lock every resource they reference; when a frame is replaced its
/// locks are released. A resource becomes returnable only when it has no
/// locks *and* its read fence (set via [`mark_read`](Self::mark_read)) has
/// been retired.
#[derive(Debug, Default)]
pub struct ResourceTracker {
    entries: HashMap<ResourceId, Entry>,
}

impl ResourceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers resources received with a frame.
    ///
    /// Receiving an id that is already tracked bumps its receipt count and
    /// refreshes its descriptor.
    pub fn receive(&mut self, resources: &[TransferableResource]) {
        for resource in resources {
            self.entries
                .entry(resource.id)
                .and_modify(|e| {
                    e.resource = *resource;
                    e.receipts += 1;
                })
                .or_insert(Entry {
                    resource: *resource,
                    receipts: 1,
                    frame_locks: 0,
                    read_fence: SyncToken::default(),
                });
        }
    }

    /// Returns the descriptor of a tracked resource.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<&TransferableResource> {
        self.entries.get(&id).map(|e| &e.resource)
    }

    /// Returns whether the resource is tracked.
    #[must_use]
    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of tracked resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locks resources referenced by a frame that just became active.
    ///
    /// Unknown ids are ignored; frames are validated before they get here.
    pub fn lock_for_frame(&mut self, ids: &[ResourceId]) {
        for id in ids {
            if let Some(e) = self.entries.get_mut(id) {
                e.frame_locks += 1;
            }
        }
    }

    /// Releases the locks taken by [`lock_for_frame`](Self::lock_for_frame).
    pub fn unlock_for_frame(&mut self, ids: &[ResourceId]) {
        for id in ids {
            if let Some(e) = self.entries.get_mut(id) {
                e.frame_locks = e.frame_locks.saturating_sub(1);
            }
        }
    }

    /// Records the fence after which the display is done reading `id`.
    pub fn mark_read(&mut self, id: ResourceId, fence: SyncToken) {
        if let Some(e) = self.entries.get_mut(&id) {
            e.read_fence = fence;
        }
    }

    /// Removes and returns every resource that is unlocked and whose read
    /// fence has retired, ordered by id.
    pub fn collect_returnable(&mut self, sync_points: &dyn SyncPointQuery) -> Vec<ReturnedResource> {
        let mut ready: Vec<ResourceId> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.frame_locks == 0 && fence_retired(&e.read_fence, sync_points)
            })
            .map(|(id, _)| *id)
            .collect();
        ready.sort_unstable();

        ready
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|e| ReturnedResource {
                id: e.resource.id,
                sync_token: e.read_fence,
                count: e.receipts,
                lost: false,
            })
            .collect()
    }

    /// Drops every tracked resource and returns them all as lost.
    ///
    /// Used on teardown, when no further GPU reads can happen.
    pub fn lose_all(&mut self) -> Vec<ReturnedResource> {
        let mut all: Vec<ReturnedResource> = self
            .entries
            .drain()
            .map(|(_, e)| ReturnedResource {
                id: e.resource.id,
                sync_token: e.read_fence,
                count: e.receipts,
                lost: true,
            })
            .collect();
        all.sort_unstable_by_key(|r| r.id);
        all
    }
}

fn fence_retired(fence: &SyncToken, sync_points: &dyn SyncPointQuery) -> bool {
    !fence.has_data() || sync_points.is_retired(fence.sync_point)
}

/// A [`SyncPointQuery`] that treats every sync point up to a watermark as retired.
///
/// Useful where sync points retire in issue order, and in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetiredThrough(pub SyncPoint);

impl SyncPointQuery for RetiredThrough {
    fn is_retired(&self, sync_point: SyncPoint) -> bool {
        sync_point <= self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{CommandBufferId, CommandBufferNamespace};

    fn resource(id: u32) -> TransferableResource {
        TransferableResource {
            id: ResourceId(id),
            format: ResourceFormat::Rgba8888,
            size: Size::new(64.0, 64.0),
            texture: id + 100,
            sync_token: SyncToken::default(),
            is_overlay_candidate: false,
        }
    }

    fn fence(point: u32) -> SyncToken {
        SyncToken::new(
            CommandBufferNamespace::GpuIo,
            CommandBufferId(1),
            SyncPoint(point),
        )
    }

    #[test]
    fn locked_resources_are_not_returned() {
        let mut tracker = ResourceTracker::new();
        tracker.receive(&[resource(1), resource(2)]);
        tracker.lock_for_frame(&[ResourceId(1)]);

        let returned = tracker.collect_returnable(&RetiredThrough(SyncPoint(100)));
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].id, ResourceId(2));
        assert!(tracker.contains(ResourceId(1)));
    }

    #[test]
    fn resource_waits_for_read_fence_to_retire() {
        let mut tracker = ResourceTracker::new();
        tracker.receive(&[resource(7)]);
        tracker.lock_for_frame(&[ResourceId(7)]);
        tracker.unlock_for_frame(&[ResourceId(7)]);
        tracker.mark_read(ResourceId(7), fence(5));

        assert!(
            tracker
                .collect_returnable(&RetiredThrough(SyncPoint(4)))
                .is_empty()
        );

        let returned = tracker.collect_returnable(&RetiredThrough(SyncPoint(5)));
        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].sync_token, fence(5));
        assert!(!returned[0].lost);
        assert!(tracker.is_empty());
    }

    #[test]
    fn repeated_receipts_are_counted() {
        let mut tracker = ResourceTracker::new();
        tracker.receive(&[resource(3)]);
        tracker.receive(&[resource(3)]);
        let returned = tracker.collect_returnable(&RetiredThrough::default());
        assert_eq!(returned[0].count, 2);
    }

    #[test]
    fn lose_all_marks_everything_lost() {
        let mut tracker = ResourceTracker::new();
        tracker.receive(&[resource(2), resource(1)]);
        tracker.lock_for_frame(&[ResourceId(1), ResourceId(2)]);

        let lost = tracker.lose_all();
        assert_eq!(lost.len(), 2);
        assert_eq!(lost[0].id, ResourceId(1));
        assert!(lost.iter().all(|r| r.lost));
        assert!(tracker.is_empty());
    }
}
