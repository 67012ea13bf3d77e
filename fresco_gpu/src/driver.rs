// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU-thread half of a command buffer.
//!
//! The driver owns everything a command buffer needs while executing: the
//! ring buffer, registered transfer buffers and images, and the decoder. It
//! only ever runs on the GPU thread; clients see its progress through the
//! published [`CommandBufferState`].
//!
//! # Errors
//!
//! Parse and decode errors are sticky. The first one is recorded in
//! [`CommandBufferState::error`] and every later flush is ignored, so a
//! misbehaving client can only wedge its own command buffer.

use std::fmt;
use std::sync::Arc;

use fresco_core::sync::{CommandBufferId, SyncPoint};
use fresco_core::trace::{FlushEvent, SyncPointEvent, SyncPointPhase};

use crate::command::{CommandHeader, FIRST_DECODER_COMMAND, NOOP, SET_TOKEN};
use crate::command_buffer::CommandBufferConfig;
use crate::decoder::{CommandDecoder, DecodeError, DecoderContext};
use crate::error::{CommandBufferError, Result};
use crate::gpu_state::{SharedTraceSink, with_tracer};
use crate::image::{ImageDescriptor, ImageRegistry};
use crate::shared_memory::SharedMemory;
use crate::state::{CommandBufferState, ContextLostReason, ErrorKind, SharedState};
use crate::sync_point_manager::SyncPointManager;
use crate::time;
use crate::transfer_buffer::TransferBufferManager;

struct Ring {
    id: i32,
    memory: SharedMemory,
    entries: u32,
}

/// Executes one command buffer's commands on the GPU thread.
pub struct CommandBufferDriver {
    id: CommandBufferId,
    config: CommandBufferConfig,
    shared: Arc<SharedState>,
    state: CommandBufferState,
    ring: Option<Ring>,
    transfer_buffers: TransferBufferManager,
    images: ImageRegistry,
    decoder: Box<dyn CommandDecoder>,
    sync_points: Arc<SyncPointManager>,
    trace_sink: Option<SharedTraceSink>,
    destroyed: bool,
}

impl fmt::Debug for CommandBufferDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferDriver")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("ring", &self.ring.as_ref().map(|r| r.id))
            .field("transfer_buffers", &self.transfer_buffers.len())
            .field("images", &self.images.len())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl CommandBufferDriver {
    pub(crate) fn new(
        id: CommandBufferId,
        config: CommandBufferConfig,
        decoder: Box<dyn CommandDecoder>,
        shared: Arc<SharedState>,
        sync_points: Arc<SyncPointManager>,
        trace_sink: Option<SharedTraceSink>,
    ) -> Self {
        Self {
            id,
            config,
            shared,
            state: CommandBufferState::default(),
            ring: None,
            transfer_buffers: TransferBufferManager::new(config.max_transfer_buffer_bytes),
            images: ImageRegistry::new(),
            decoder,
            sync_points,
            trace_sink,
            destroyed: false,
        }
    }

    /// The command buffer this driver executes.
    #[must_use]
    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    /// The driver's current state.
    #[must_use]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Uses transfer buffer `id` as the ring buffer and rewinds to entry 0.
    pub fn set_get_buffer(&mut self, id: i32) -> Result<()> {
        self.ensure_usable()?;
        let memory = self
            .transfer_buffers
            .get(id)
            .cloned()
            .ok_or(CommandBufferError::UnknownTransferBuffer(id))?;
        if memory.len() < self.config.min_ring_bytes {
            return Err(CommandBufferError::RingBufferTooSmall {
                size: memory.len(),
                min: self.config.min_ring_bytes,
            });
        }
        let entries = memory.entry_count();
        self.ring = Some(Ring {
            id,
            memory,
            entries,
        });
        self.state.get_offset = 0;
        self.publish();
        tracing::debug!(command_buffer = ?self.id, ring = id, entries, "get buffer set");
        Ok(())
    }

    /// Executes every command between the get offset and `put_offset`.
    ///
    /// Returns the number of commands executed. A put offset outside the
    /// ring marks the buffer lost with [`ErrorKind::OutOfBounds`].
    pub fn flush(&mut self, put_offset: u32) -> u32 {
        if self.destroyed || self.state.is_lost() {
            return 0;
        }
        let Some(ring) = self.ring.as_ref() else {
            tracing::warn!(command_buffer = ?self.id, put_offset, "flush without a get buffer");
            return 0;
        };
        let entries = ring.entries;
        let memory = ring.memory.clone();

        if put_offset >= entries {
            self.fail(ErrorKind::OutOfBounds, ContextLostReason::CommandStream);
            self.publish();
            return 0;
        }

        let mut executed = 0;
        while self.state.get_offset != put_offset {
            match self.execute_one(&memory, entries, put_offset) {
                Ok(next) => {
                    self.state.get_offset = next;
                    executed += 1;
                }
                Err((kind, reason)) => {
                    self.fail(kind, reason);
                    break;
                }
            }
        }
        self.publish();

        let event = FlushEvent {
            command_buffer: self.id,
            put_offset,
            get_offset: self.state.get_offset,
            commands: executed,
            timestamp: time::now(),
        };
        with_tracer(self.trace_sink.as_ref(), |t| t.flush(&event));
        executed
    }

    /// Executes the command at the get offset and returns the next offset.
    fn execute_one(
        &mut self,
        memory: &SharedMemory,
        entries: u32,
        put_offset: u32,
    ) -> std::result::Result<u32, (ErrorKind, ContextLostReason)> {
        let get = self.state.get_offset;
        let stream_error = |kind| (kind, ContextLostReason::CommandStream);

        let header = memory
            .read_entries(get, 1)
            .map(|words| CommandHeader::decode(words[0]))
            .ok_or(stream_error(ErrorKind::OutOfBounds))?;
        if header.size == 0 {
            return Err(stream_error(ErrorKind::InvalidSize));
        }
        // Available entries before the put offset, without wrapping: a
        // command never straddles the end of the ring.
        let available = if get < put_offset {
            put_offset - get
        } else {
            entries - get
        };
        if header.size > available {
            return Err(stream_error(ErrorKind::OutOfBounds));
        }
        let args = memory
            .read_entries(get + 1, header.size - 1)
            .ok_or(stream_error(ErrorKind::OutOfBounds))?;

        match header.command {
            NOOP => {}
            SET_TOKEN => {
                let Some(&token) = args.first() else {
                    return Err(stream_error(ErrorKind::InvalidArguments));
                };
                self.state.token = i32::from_ne_bytes(token.to_ne_bytes());
            }
            command if command < FIRST_DECODER_COMMAND => {
                return Err(stream_error(ErrorKind::UnknownCommand));
            }
            command => {
                let cx = DecoderContext {
                    transfer_buffers: &self.transfer_buffers,
                    images: &self.images,
                };
                self.decoder
                    .decode(command, &args, &cx)
                    .map_err(decode_error_to_state)?;
            }
        }
        Ok((get + header.size) % entries)
    }

    /// Registers a shared-memory region under a client-chosen id.
    pub fn register_transfer_buffer(&mut self, id: i32, memory: SharedMemory) -> Result<()> {
        self.ensure_usable()?;
        self.transfer_buffers.register(id, memory)
    }

    /// Unregisters a transfer buffer.
    ///
    /// The ring keeps its own reference, so destroying the current get
    /// buffer does not interrupt command processing.
    pub fn destroy_transfer_buffer(&mut self, id: i32) -> Result<()> {
        self.transfer_buffers.destroy(id).map(|_| ())
    }

    /// Creates an image from a client buffer.
    pub fn create_image(&mut self, id: i32, descriptor: ImageDescriptor) -> Result<()> {
        self.ensure_usable()?;
        self.images.create(id, descriptor)
    }

    /// Destroys an image.
    pub fn destroy_image(&mut self, id: i32) -> Result<()> {
        self.images.destroy(id)
    }

    /// Retires `sync_point`, releasing everything waiting on it.
    pub fn retire_sync_point(&mut self, sync_point: SyncPoint) {
        self.sync_points.retire_sync_point(sync_point);
        let event = SyncPointEvent {
            sync_point,
            phase: SyncPointPhase::Retired,
            timestamp: time::now(),
        };
        with_tracer(self.trace_sink.as_ref(), |t| t.sync_point(&event));
    }

    /// Tears the driver down and marks the buffer lost.
    ///
    /// Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        let have_context = self.state.context_lost_reason != ContextLostReason::Guilty
            && self.state.context_lost_reason != ContextLostReason::Innocent;
        self.decoder.destroy(have_context);
        self.ring = None;
        self.transfer_buffers.clear();
        self.images.clear();
        if !self.state.is_lost() {
            self.state.error = ErrorKind::LostContext;
            self.state.context_lost_reason = ContextLostReason::Destroyed;
        }
        self.publish();
        tracing::debug!(command_buffer = ?self.id, "driver destroyed");
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.destroyed || self.state.is_lost() {
            return Err(CommandBufferError::Lost {
                kind: self.state.error,
                reason: self.state.context_lost_reason,
            });
        }
        Ok(())
    }

    fn fail(&mut self, kind: ErrorKind, reason: ContextLostReason) {
        self.state.error = kind;
        self.state.context_lost_reason = reason;
        tracing::warn!(
            command_buffer = ?self.id,
            error = ?kind,
            ?reason,
            get_offset = self.state.get_offset,
            "command buffer lost"
        );
    }

    fn publish(&self) {
        self.shared.publish(self.state);
    }
}

fn decode_error_to_state(error: DecodeError) -> (ErrorKind, ContextLostReason) {
    match error {
        DecodeError::UnknownCommand(_) => (ErrorKind::UnknownCommand, ContextLostReason::CommandStream),
        DecodeError::InvalidArguments(_) => {
            (ErrorKind::InvalidArguments, ContextLostReason::CommandStream)
        }
        DecodeError::OutOfMemory => (ErrorKind::OutOfMemory, ContextLostReason::Unknown),
        DecodeError::ContextLost(reason) => (ErrorKind::LostContext, reason),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::command::CommandWriter;
    use parking_lot::Mutex;

    /// Decoder that records what it executed.
    ///
    /// Command `FIRST_DECODER_COMMAND + 1` fails with a guilty context loss.
    pub(crate) struct RecordingDecoder {
        pub(crate) log: Arc<Mutex<Vec<(u32, Vec<u32>)>>>,
        pub(crate) destroyed: Arc<Mutex<Option<bool>>>,
    }

    impl RecordingDecoder {
        pub(crate) fn new() -> Self {
            Self {
                log: Arc::default(),
                destroyed: Arc::default(),
            }
        }
    }

    impl CommandDecoder for RecordingDecoder {
        fn decode(
            &mut self,
            command: u32,
            args: &[u32],
            _cx: &DecoderContext<'_>,
        ) -> std::result::Result<(), DecodeError> {
            if command == FIRST_DECODER_COMMAND + 1 {
                return Err(DecodeError::ContextLost(ContextLostReason::Guilty));
            }
            self.log.lock().push((command, args.to_vec()));
            Ok(())
        }

        fn destroy(&mut self, have_context: bool) {
            *self.destroyed.lock() = Some(have_context);
        }
    }

    fn driver_with(decoder: RecordingDecoder) -> (CommandBufferDriver, Arc<SharedState>) {
        let shared = Arc::new(SharedState::default());
        let driver = CommandBufferDriver::new(
            CommandBufferId(1),
            CommandBufferConfig::DEFAULT,
            Box::new(decoder),
            Arc::clone(&shared),
            Arc::new(SyncPointManager::new()),
            None,
        );
        (driver, shared)
    }

    fn ring(driver: &mut CommandBufferDriver, bytes: usize) -> CommandWriter {
        let memory = SharedMemory::new(bytes);
        driver
            .register_transfer_buffer(1, memory.clone())
            .expect("ring registration should succeed");
        driver.set_get_buffer(1).expect("set_get_buffer should succeed");
        CommandWriter::new(memory)
    }

    #[test]
    fn commands_execute_in_order() {
        let decoder = RecordingDecoder::new();
        let log = Arc::clone(&decoder.log);
        let (mut driver, shared) = driver_with(decoder);
        let mut writer = ring(&mut driver, 256);

        writer.push(FIRST_DECODER_COMMAND, &[1]);
        writer.push(FIRST_DECODER_COMMAND + 2, &[2, 3]);
        writer.push(NOOP, &[0, 0]);
        let put = writer.push(FIRST_DECODER_COMMAND, &[4]);

        assert_eq!(driver.flush(put), 4);
        assert_eq!(
            *log.lock(),
            vec![
                (FIRST_DECODER_COMMAND, vec![1]),
                (FIRST_DECODER_COMMAND + 2, vec![2, 3]),
                (FIRST_DECODER_COMMAND, vec![4]),
            ]
        );
        assert_eq!(shared.get().get_offset, put);
    }

    #[test]
    fn set_token_is_published() {
        let (mut driver, shared) = driver_with(RecordingDecoder::new());
        let mut writer = ring(&mut driver, 64);
        let put = writer.set_token(-7);
        driver.flush(put);
        assert_eq!(shared.get().token, -7);
        assert!(!shared.get().is_lost());
    }

    #[test]
    fn commands_survive_ring_wrap() {
        let decoder = RecordingDecoder::new();
        let log = Arc::clone(&decoder.log);
        let (mut driver, _shared) = driver_with(decoder);
        // 16 entries.
        let mut writer = ring(&mut driver, 64);

        let put = writer.push(FIRST_DECODER_COMMAND, &[0; 7]);
        driver.flush(put);
        let put = writer.push(FIRST_DECODER_COMMAND, &[1; 9]);
        assert_eq!(driver.flush(put), 2, "padding NOOP plus the command");
        assert_eq!(log.lock().len(), 2);
        assert_eq!(driver.state().get_offset, 10);
    }

    #[test]
    fn out_of_range_put_offset_marks_lost() {
        let (mut driver, shared) = driver_with(RecordingDecoder::new());
        let _writer = ring(&mut driver, 64);
        assert_eq!(driver.flush(16), 0);
        let state = shared.get();
        assert_eq!(state.error, ErrorKind::OutOfBounds);
        assert!(state.is_lost());

        // Sticky: nothing more runs.
        assert_eq!(driver.flush(0), 0);
        assert!(matches!(
            driver.register_transfer_buffer(2, SharedMemory::new(4)),
            Err(CommandBufferError::Lost { .. })
        ));
    }

    #[test]
    fn zero_sized_command_is_a_parse_error() {
        let (mut driver, shared) = driver_with(RecordingDecoder::new());
        let memory = SharedMemory::new(64);
        driver
            .register_transfer_buffer(1, memory.clone())
            .expect("register should succeed");
        driver.set_get_buffer(1).expect("set_get_buffer should succeed");
        memory.write_entries(0, &[CommandHeader::new(FIRST_DECODER_COMMAND, 0).encode()]);

        driver.flush(1);
        assert_eq!(shared.get().error, ErrorKind::InvalidSize);
    }

    #[test]
    fn reserved_command_ids_are_unknown() {
        let (mut driver, shared) = driver_with(RecordingDecoder::new());
        let mut writer = ring(&mut driver, 64);
        let put = writer.push(7, &[]);
        driver.flush(put);
        assert_eq!(shared.get().error, ErrorKind::UnknownCommand);
    }

    #[test]
    fn decoder_context_loss_is_recorded() {
        let decoder = RecordingDecoder::new();
        let destroyed = Arc::clone(&decoder.destroyed);
        let (mut driver, shared) = driver_with(decoder);
        let mut writer = ring(&mut driver, 64);
        writer.push(FIRST_DECODER_COMMAND + 1, &[]);
        let put = writer.push(FIRST_DECODER_COMMAND, &[]);

        assert_eq!(driver.flush(put), 0);
        let state = shared.get();
        assert_eq!(state.error, ErrorKind::LostContext);
        assert_eq!(state.context_lost_reason, ContextLostReason::Guilty);
        assert_eq!(state.get_offset, 0, "failing command is not consumed");

        driver.destroy();
        assert_eq!(*destroyed.lock(), Some(false));
        assert_eq!(shared.get().context_lost_reason, ContextLostReason::Guilty);
    }

    #[test]
    fn set_get_buffer_validates_and_rewinds() {
        let (mut driver, _shared) = driver_with(RecordingDecoder::new());
        assert_eq!(
            driver.set_get_buffer(9),
            Err(CommandBufferError::UnknownTransferBuffer(9))
        );
        driver
            .register_transfer_buffer(2, SharedMemory::new(8))
            .expect("register should succeed");
        assert!(matches!(
            driver.set_get_buffer(2),
            Err(CommandBufferError::RingBufferTooSmall { size: 8, .. })
        ));

        let mut writer = ring(&mut driver, 64);
        let put = writer.set_token(1);
        driver.flush(put);
        assert_ne!(driver.state().get_offset, 0);
        driver.set_get_buffer(1).expect("set_get_buffer should succeed");
        assert_eq!(driver.state().get_offset, 0);
    }

    #[test]
    fn destroy_marks_lost_once() {
        let decoder = RecordingDecoder::new();
        let destroyed = Arc::clone(&decoder.destroyed);
        let (mut driver, shared) = driver_with(decoder);
        driver.destroy();
        driver.destroy();
        let state = shared.get();
        assert_eq!(state.error, ErrorKind::LostContext);
        assert_eq!(state.context_lost_reason, ContextLostReason::Destroyed);
        assert_eq!(state.generation, 1);
        assert_eq!(*destroyed.lock(), Some(true));
    }

    #[test]
    fn retire_sync_point_reaches_manager() {
        let manager = Arc::new(SyncPointManager::new());
        let mut driver = CommandBufferDriver::new(
            CommandBufferId(3),
            CommandBufferConfig::DEFAULT,
            Box::new(RecordingDecoder::new()),
            Arc::new(SharedState::default()),
            Arc::clone(&manager),
            None,
        );
        let sp = manager.generate_sync_point();
        driver.retire_sync_point(sp);
        assert!(manager.is_sync_point_retired(sp));
    }
}
