// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use fresco_core::time::{HostTime, Timebase};
use fresco_core::trace::{
    ConnectionLostEvent, Endpoint, FlushEvent, FrameSubmitEvent, OverlayEvent, SwapEvent,
    SyncPointEvent, SyncPointPhase, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn us(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_micros(t.ticks())
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_flush(&mut self, e: &FlushEvent) {
        let _ = writeln!(
            self.writer,
            "[flush] cb={} put={} get={} commands={} at {:.1}µs",
            e.command_buffer.0,
            e.put_offset,
            e.get_offset,
            e.commands,
            self.us(e.timestamp),
        );
    }

    fn on_sync_point(&mut self, e: &SyncPointEvent) {
        let phase = match e.phase {
            SyncPointPhase::Inserted => "insert",
            SyncPointPhase::Retired => "retire",
        };
        let _ = writeln!(
            self.writer,
            "[sync:{phase}] {} at {:.1}µs",
            e.sync_point.0,
            self.us(e.timestamp),
        );
    }

    fn on_frame_submit(&mut self, e: &FrameSubmitEvent) {
        let _ = writeln!(
            self.writer,
            "[submit] surface={}:{}:{} token={} quads={} resources={} at {:.1}µs",
            e.surface.frame_sink_id.client_id.0,
            e.surface.frame_sink_id.sink_id,
            e.surface.local_id.0,
            e.frame_token,
            e.quads,
            e.resources,
            self.us(e.timestamp),
        );
    }

    fn on_overlay(&mut self, e: &OverlayEvent) {
        let strategy = e
            .strategy
            .map_or_else(|| "none".to_owned(), |s| format!("{s:?}"));
        let _ = writeln!(
            self.writer,
            "[overlay] frame={} strategy={strategy} offered={} promoted={}",
            e.frame_index, e.candidates, e.promoted,
        );
    }

    fn on_swap(&mut self, e: &SwapEvent) {
        let _ = writeln!(
            self.writer,
            "[swap] frame={} {}x{} at {:.1}µs",
            e.frame_index,
            e.width,
            e.height,
            self.us(e.timestamp),
        );
    }

    fn on_connection_lost(&mut self, e: &ConnectionLostEvent) {
        let _ = match e.endpoint {
            Endpoint::CommandBuffer(id) => {
                writeln!(self.writer, "[lost] command buffer {}", id.0)
            }
            Endpoint::FrameSink(id) => writeln!(
                self.writer,
                "[lost] frame sink {}:{}",
                id.client_id.0, id.sink_id
            ),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fresco_core::id::{ClientId, FrameSinkId};
    use fresco_core::overlay::OverlayStrategy;
    use fresco_core::sync::CommandBufferId;

    fn output(sink: PrettyPrintSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_writer()).unwrap()
    }

    #[test]
    fn pretty_print_flush() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_flush(&FlushEvent {
            command_buffer: CommandBufferId(4),
            put_offset: 16,
            get_offset: 16,
            commands: 2,
            timestamp: HostTime(1_500),
        });
        let output = output(sink);
        assert!(output.starts_with("[flush] cb=4"), "got: {output}");
        assert!(output.contains("at 1.5µs"), "got: {output}");
    }

    #[test]
    fn pretty_print_overlay_and_loss() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new(), Timebase::NANOS);
        sink.on_overlay(&OverlayEvent {
            frame_index: 3,
            strategy: Some(OverlayStrategy::SingleOnTop),
            candidates: 1,
            promoted: 1,
            timestamp: HostTime(0),
        });
        sink.on_connection_lost(&ConnectionLostEvent {
            endpoint: Endpoint::FrameSink(FrameSinkId::new(ClientId(7), 0)),
            timestamp: HostTime(0),
        });
        let output = output(sink);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "[overlay] frame=3 strategy=SingleOnTop offered=1 promoted=1",
                "[lost] frame sink 7:0",
            ]
        );
    }
}
