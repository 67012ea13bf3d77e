// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame sink, surface, and resource identity types.
//!
//! A [`SurfaceId`] scopes the frames submitted by one frame sink. It pairs
//! the sink's [`FrameSinkId`] (which client, which sink) with a
//! [`LocalSurfaceId`] that the sink bumps whenever its size or scale changes.
//! Allocation lives in the display crate; core treats all ids as opaque.

use core::fmt;

/// Identifies a client connection (usually a renderer process).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ClientId(pub u32);

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

/// Identifies one compositor frame sink within a client.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameSinkId {
    /// The owning client.
    pub client_id: ClientId,
    /// Sink index within the client.
    pub sink_id: u32,
}

impl FrameSinkId {
    /// Creates a frame sink id.
    #[inline]
    #[must_use]
    pub const fn new(client_id: ClientId, sink_id: u32) -> Self {
        Self { client_id, sink_id }
    }
}

impl fmt::Debug for FrameSinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameSinkId({}, {})", self.client_id.0, self.sink_id)
    }
}

/// Sink-local part of a surface identifier.
///
/// Zero is reserved as "invalid"; allocators start at one.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalSurfaceId(pub u32);

impl LocalSurfaceId {
    /// The reserved invalid id.
    pub const INVALID: Self = Self(0);

    /// Returns whether this id was produced by an allocator.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for LocalSurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalSurfaceId({})", self.0)
    }
}

/// Opaque, process-unique identifier for a stream of compositor frames.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId {
    /// The frame sink that submits frames to this surface.
    pub frame_sink_id: FrameSinkId,
    /// The sink-local id.
    pub local_id: LocalSurfaceId,
}

impl SurfaceId {
    /// Creates a surface id.
    #[inline]
    #[must_use]
    pub const fn new(frame_sink_id: FrameSinkId, local_id: LocalSurfaceId) -> Self {
        Self {
            frame_sink_id,
            local_id,
        }
    }

    /// Returns whether the local part is valid.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.local_id.is_valid()
    }
}

impl fmt::Debug for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SurfaceId({}:{}:{})",
            self.frame_sink_id.client_id.0, self.frame_sink_id.sink_id, self.local_id.0
        )
    }
}

/// Client-assigned identifier of a [`TransferableResource`](crate::resource::TransferableResource).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(pub u32);

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceId({})", self.0)
    }
}

/// Identifies a render pass within one compositor frame.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RenderPassId(pub u64);

impl fmt::Debug for RenderPassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderPassId({})", self.0)
    }
}
