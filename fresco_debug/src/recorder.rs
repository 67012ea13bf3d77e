// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records, each led by a one-byte tag. [`decode`]
//! reads them back as an iterator of [`RecordedEvent`]; decoding stops at the
//! first unknown tag or truncated record.

use fresco_core::id::{ClientId, FrameSinkId, LocalSurfaceId, SurfaceId};
use fresco_core::overlay::OverlayStrategy;
use fresco_core::sync::{CommandBufferId, SyncPoint};
use fresco_core::time::HostTime;
use fresco_core::trace::{
    ConnectionLostEvent, Endpoint, FlushEvent, FrameSubmitEvent, OverlayEvent, SwapEvent,
    SyncPointEvent, SyncPointPhase, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FLUSH: u8 = 1;
const TAG_SYNC_POINT: u8 = 2;
const TAG_FRAME_SUBMIT: u8 = 3;
const TAG_OVERLAY: u8 = 4;
const TAG_SWAP: u8 = 5;
const TAG_CONNECTION_LOST: u8 = 6;

const ENDPOINT_COMMAND_BUFFER: u8 = 0;
const ENDPOINT_FRAME_SINK: u8 = 1;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_surface(&mut self, id: SurfaceId) {
        self.write_frame_sink(id.frame_sink_id);
        self.write_u32(id.local_id.0);
    }

    fn write_frame_sink(&mut self, id: FrameSinkId) {
        self.write_u32(id.client_id.0);
        self.write_u32(id.sink_id);
    }

    fn write_strategy(&mut self, strategy: Option<OverlayStrategy>) {
        self.write_u8(match strategy {
            None => 0,
            Some(OverlayStrategy::SingleOnTop) => 1,
            Some(OverlayStrategy::Underlay) => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_flush(&mut self, e: &FlushEvent) {
        self.write_u8(TAG_FLUSH);
        self.write_u64(e.command_buffer.0);
        self.write_u32(e.put_offset);
        self.write_u32(e.get_offset);
        self.write_u32(e.commands);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_sync_point(&mut self, e: &SyncPointEvent) {
        self.write_u8(TAG_SYNC_POINT);
        self.write_u32(e.sync_point.0);
        self.write_u8(match e.phase {
            SyncPointPhase::Inserted => 0,
            SyncPointPhase::Retired => 1,
        });
        self.write_u64(e.timestamp.ticks());
    }

    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        self.write_u8(TAG_FRAME_SUBMIT);
        self.write_surface(e.surface);
        self.write_u32(e.frame_token);
        self.write_u32(e.quads);
        self.write_u32(e.resources);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_overlay(&mut self, e: &OverlayEvent) {
        self.write_u8(TAG_OVERLAY);
        self.write_u64(e.frame_index);
        self.write_strategy(e.strategy);
        self.write_u32(e.candidates);
        self.write_u32(e.promoted);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        self.write_u8(TAG_SWAP);
        self.write_u64(e.frame_index);
        self.write_u32(e.width);
        self.write_u32(e.height);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_connection_lost(&mut self, e: &ConnectionLostEvent) {
        self.write_u8(TAG_CONNECTION_LOST);
        match e.endpoint {
            Endpoint::CommandBuffer(id) => {
                self.write_u8(ENDPOINT_COMMAND_BUFFER);
                self.write_u64(id.0);
            }
            Endpoint::FrameSink(id) => {
                self.write_u8(ENDPOINT_FRAME_SINK);
                self.write_frame_sink(id);
            }
        }
        self.write_u64(e.timestamp.ticks());
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`FlushEvent`].
    Flush(FlushEvent),
    /// A [`SyncPointEvent`].
    SyncPoint(SyncPointEvent),
    /// A [`FrameSubmitEvent`].
    FrameSubmit(FrameSubmitEvent),
    /// An [`OverlayEvent`].
    Overlay(OverlayEvent),
    /// A [`SwapEvent`].
    Swap(SwapEvent),
    /// A [`ConnectionLostEvent`].
    ConnectionLost(ConnectionLostEvent),
}

impl RecordedEvent {
    /// When the event happened.
    #[must_use]
    pub fn timestamp(&self) -> HostTime {
        match self {
            Self::Flush(e) => e.timestamp,
            Self::SyncPoint(e) => e.timestamp,
            Self::FrameSubmit(e) => e.timestamp,
            Self::Overlay(e) => e.timestamp,
            Self::Swap(e) => e.timestamp,
            Self::ConnectionLost(e) => e.timestamp,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_frame_sink(&mut self) -> Option<FrameSinkId> {
        Some(FrameSinkId::new(ClientId(self.read_u32()?), self.read_u32()?))
    }

    fn read_surface(&mut self) -> Option<SurfaceId> {
        Some(SurfaceId::new(
            self.read_frame_sink()?,
            LocalSurfaceId(self.read_u32()?),
        ))
    }

    fn read_strategy(&mut self) -> Option<Option<OverlayStrategy>> {
        Some(match self.read_u8()? {
            0 => None,
            1 => Some(OverlayStrategy::SingleOnTop),
            _ => Some(OverlayStrategy::Underlay),
        })
    }

    fn decode_flush(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Flush(FlushEvent {
            command_buffer: CommandBufferId(self.read_u64()?),
            put_offset: self.read_u32()?,
            get_offset: self.read_u32()?,
            commands: self.read_u32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_sync_point(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::SyncPoint(SyncPointEvent {
            sync_point: SyncPoint(self.read_u32()?),
            phase: match self.read_u8()? {
                0 => SyncPointPhase::Inserted,
                _ => SyncPointPhase::Retired,
            },
            timestamp: self.read_time()?,
        }))
    }

    fn decode_frame_submit(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameSubmit(FrameSubmitEvent {
            surface: self.read_surface()?,
            frame_token: self.read_u32()?,
            quads: self.read_u32()?,
            resources: self.read_u32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_overlay(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Overlay(OverlayEvent {
            frame_index: self.read_u64()?,
            strategy: self.read_strategy()?,
            candidates: self.read_u32()?,
            promoted: self.read_u32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_swap(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Swap(SwapEvent {
            frame_index: self.read_u64()?,
            width: self.read_u32()?,
            height: self.read_u32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_connection_lost(&mut self) -> Option<RecordedEvent> {
        let endpoint = match self.read_u8()? {
            ENDPOINT_COMMAND_BUFFER => Endpoint::CommandBuffer(CommandBufferId(self.read_u64()?)),
            ENDPOINT_FRAME_SINK => Endpoint::FrameSink(self.read_frame_sink()?),
            _ => return None,
        };
        Some(RecordedEvent::ConnectionLost(ConnectionLostEvent {
            endpoint,
            timestamp: self.read_time()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_FLUSH => self.decode_flush(),
            TAG_SYNC_POINT => self.decode_sync_point(),
            TAG_FRAME_SUBMIT => self.decode_frame_submit(),
            TAG_OVERLAY => self.decode_overlay(),
            TAG_SWAP => self.decode_swap(),
            TAG_CONNECTION_LOST => self.decode_connection_lost(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
