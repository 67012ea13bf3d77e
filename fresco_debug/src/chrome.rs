// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Command-buffer events land on one track per command buffer and display
//! events on one track per frame sink, so a flush and the frame that
//! consumed it line up in the viewer.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use fresco_core::time::{HostTime, Timebase};
use fresco_core::trace::{Endpoint, SyncPointPhase};

use crate::recorder::{RecordedEvent, decode};

/// Process id of the GPU service tracks.
const GPU_PID: u32 = 1;
/// Process id of the display compositor tracks.
const DISPLAY_PID: u32 = 2;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let ts = |t: HostTime| timebase.ticks_to_micros(t.ticks());
    let mut events: Vec<Value> = Vec::new();

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::Flush(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Flush",
                    "cat": "CommandBuffer",
                    "ts": ts(e.timestamp),
                    "pid": GPU_PID,
                    "tid": e.command_buffer.0,
                    "s": "t",
                    "args": {
                        "put_offset": e.put_offset,
                        "get_offset": e.get_offset,
                        "commands": e.commands,
                    }
                }));
            }
            RecordedEvent::SyncPoint(e) => {
                let name = match e.phase {
                    SyncPointPhase::Inserted => "InsertSyncPoint",
                    SyncPointPhase::Retired => "RetireSyncPoint",
                };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "SyncPoint",
                    "ts": ts(e.timestamp),
                    "pid": GPU_PID,
                    "tid": 0,
                    "s": "p",
                    "args": {
                        "sync_point": e.sync_point.0,
                    }
                }));
            }
            RecordedEvent::FrameSubmit(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "SubmitCompositorFrame",
                    "cat": "FrameSink",
                    "ts": ts(e.timestamp),
                    "pid": DISPLAY_PID,
                    "tid": e.surface.frame_sink_id.client_id.0,
                    "s": "t",
                    "args": {
                        "local_id": e.surface.local_id.0,
                        "frame_token": e.frame_token,
                        "quads": e.quads,
                        "resources": e.resources,
                    }
                }));
            }
            RecordedEvent::Overlay(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Overlay",
                    "cat": "Display",
                    "ts": ts(e.timestamp),
                    "pid": DISPLAY_PID,
                    "tid": 0,
                    "s": "t",
                    "args": {
                        "frame_index": e.frame_index,
                        "strategy": e.strategy.map(|s| format!("{s:?}")),
                        "candidates": e.candidates,
                        "promoted": e.promoted,
                    }
                }));
            }
            RecordedEvent::Swap(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "SwapBuffers",
                    "cat": "Display",
                    "ts": ts(e.timestamp),
                    "pid": DISPLAY_PID,
                    "tid": 0,
                    "s": "g",
                    "args": {
                        "frame_index": e.frame_index,
                        "width": e.width,
                        "height": e.height,
                    }
                }));
            }
            RecordedEvent::ConnectionLost(e) => {
                let (pid, tid, endpoint) = match e.endpoint {
                    Endpoint::CommandBuffer(id) => {
                        (GPU_PID, id.0, format!("command buffer {}", id.0))
                    }
                    Endpoint::FrameSink(id) => (
                        DISPLAY_PID,
                        u64::from(id.client_id.0),
                        format!("frame sink {}:{}", id.client_id.0, id.sink_id),
                    ),
                };
                events.push(json!({
                    "ph": "i",
                    "name": "ConnectionLost",
                    "cat": "Connection",
                    "ts": ts(e.timestamp),
                    "pid": pid,
                    "tid": tid,
                    "s": "p",
                    "args": {
                        "endpoint": endpoint,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use fresco_core::id::{ClientId, FrameSinkId};
    use fresco_core::sync::{CommandBufferId, SyncPoint};
    use fresco_core::trace::{
        ConnectionLostEvent, FlushEvent, SwapEvent, SyncPointEvent, TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_flush(&FlushEvent {
            command_buffer: CommandBufferId(2),
            put_offset: 8,
            get_offset: 8,
            commands: 1,
            timestamp: HostTime(1_000),
        });
        rec.on_sync_point(&SyncPointEvent {
            sync_point: SyncPoint(1),
            phase: SyncPointPhase::Retired,
            timestamp: HostTime(2_000),
        });
        rec.on_swap(&SwapEvent {
            frame_index: 1,
            width: 320,
            height: 240,
            timestamp: HostTime(3_000),
        });
        rec.on_connection_lost(&ConnectionLostEvent {
            endpoint: Endpoint::FrameSink(FrameSinkId::new(ClientId(5), 0)),
            timestamp: HostTime(4_000),
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 4);

        assert_eq!(parsed[0]["name"], "Flush");
        assert_eq!(parsed[0]["pid"], GPU_PID);
        assert_eq!(parsed[0]["tid"], 2);
        assert_eq!(parsed[0]["ts"], 1.0);

        assert_eq!(parsed[1]["name"], "RetireSyncPoint");
        assert_eq!(parsed[2]["name"], "SwapBuffers");
        assert_eq!(parsed[2]["args"]["width"], 320);

        assert_eq!(parsed[3]["name"], "ConnectionLost");
        assert_eq!(parsed[3]["pid"], DISPLAY_PID);
        assert_eq!(parsed[3]["args"]["endpoint"], "frame sink 5:0");
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty(), "no events recorded");
    }
}
