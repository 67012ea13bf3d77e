// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the hand-off pipeline.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! command-buffer service and the display compositor call at each stage. All
//! method bodies default to no-ops, so implementing only the events you care
//! about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.

use crate::id::{FrameSinkId, SurfaceId};
use crate::overlay::OverlayStrategy;
use crate::sync::{CommandBufferId, SyncPoint};
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted after the GPU thread processes a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlushEvent {
    /// The flushed command buffer.
    pub command_buffer: CommandBufferId,
    /// Put offset requested by the client.
    pub put_offset: u32,
    /// Get offset reached after processing.
    pub get_offset: u32,
    /// Commands executed by this flush.
    pub commands: u32,
    /// When processing finished.
    pub timestamp: HostTime,
}

/// Whether a sync point was inserted or retired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncPointPhase {
    /// Issued on the IPC thread.
    Inserted,
    /// Retired on the GPU thread.
    Retired,
}

/// Emitted when a sync point changes state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncPointEvent {
    /// The fence.
    pub sync_point: SyncPoint,
    /// What happened to it.
    pub phase: SyncPointPhase,
    /// When it happened.
    pub timestamp: HostTime,
}

/// Emitted when a frame sink accepts a compositor frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSubmitEvent {
    /// Surface the frame was submitted to.
    pub surface: SurfaceId,
    /// Client frame token.
    pub frame_token: u32,
    /// Quads across all passes.
    pub quads: u32,
    /// Resources transferred with the frame.
    pub resources: u32,
    /// When the frame was accepted.
    pub timestamp: HostTime,
}

/// Emitted after overlay processing for a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayEvent {
    /// Display frame counter.
    pub frame_index: u64,
    /// Strategy that promoted a candidate, if any did.
    pub strategy: Option<OverlayStrategy>,
    /// Candidates offered to the platform.
    pub candidates: u32,
    /// Candidates promoted to planes.
    pub promoted: u32,
    /// When processing finished.
    pub timestamp: HostTime,
}

/// Emitted when the output surface presents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapEvent {
    /// Display frame counter.
    pub frame_index: u64,
    /// Presented width in pixels.
    pub width: u32,
    /// Presented height in pixels.
    pub height: u32,
    /// When the swap was issued.
    pub timestamp: HostTime,
}

/// The endpoint whose peer went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A command buffer's IPC channel.
    CommandBuffer(CommandBufferId),
    /// A compositor frame sink's client channel.
    FrameSink(FrameSinkId),
}

/// Emitted when a connection error tears an endpoint down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionLostEvent {
    /// The torn-down endpoint.
    pub endpoint: Endpoint,
    /// When the loss was observed.
    pub timestamp: HostTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events.
///
/// All methods have default no-op implementations.
pub trait TraceSink {
    /// Called after a flush is processed.
    fn on_flush(&mut self, e: &FlushEvent) {
        _ = e;
    }

    /// Called when a sync point is inserted or retired.
    fn on_sync_point(&mut self, e: &SyncPointEvent) {
        _ = e;
    }

    /// Called when a frame sink accepts a frame.
    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        _ = e;
    }

    /// Called after overlay processing.
    fn on_overlay(&mut self, e: &OverlayEvent) {
        _ = e;
    }

    /// Called when the output surface swaps.
    fn on_swap(&mut self, e: &SwapEvent) {
        _ = e;
    }

    /// Called when an endpoint loses its connection.
    fn on_connection_lost(&mut self, e: &ConnectionLostEvent) {
        _ = e;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! emit {
    ($self:ident, $method:ident, $event:expr) => {{
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($event);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $event;
        }
    }};
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FlushEvent`].
    #[inline]
    pub fn flush(&mut self, e: &FlushEvent) {
        emit!(self, on_flush, e);
    }

    /// Emits a [`SyncPointEvent`].
    #[inline]
    pub fn sync_point(&mut self, e: &SyncPointEvent) {
        emit!(self, on_sync_point, e);
    }

    /// Emits a [`FrameSubmitEvent`].
    #[inline]
    pub fn frame_submit(&mut self, e: &FrameSubmitEvent) {
        emit!(self, on_frame_submit, e);
    }

    /// Emits an [`OverlayEvent`].
    #[inline]
    pub fn overlay(&mut self, e: &OverlayEvent) {
        emit!(self, on_overlay, e);
    }

    /// Emits a [`SwapEvent`].
    #[inline]
    pub fn swap(&mut self, e: &SwapEvent) {
        emit!(self, on_swap, e);
    }

    /// Emits a [`ConnectionLostEvent`].
    #[inline]
    pub fn connection_lost(&mut self, e: &ConnectionLostEvent) {
        emit!(self, on_connection_lost, e);
    }
}
