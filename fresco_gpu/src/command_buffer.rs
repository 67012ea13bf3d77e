// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! IPC endpoint of a command buffer.
//!
//! [`CommandBufferImpl::create`] returns a connected pair: the service-side
//! [`CommandBufferImpl`], which owns a dedicated IPC thread, and the
//! [`CommandBufferClient`] used by the producer of commands.
//!
//! ```text
//!  CommandBufferClient ──request──▶ IPC thread ──post_task──▶ GPU thread
//!          ▲                           │                        │
//!          │       InsertSyncPoint ◀───┘                        │
//!          └──────────── CommandBufferState (publish) ◀─────────┘
//! ```
//!
//! Requests are executed in the order they were sent. `InsertSyncPoint` is
//! answered on the IPC thread, so issuing a fence never waits for GPU work;
//! retiring it is still ordered after every request sent before it.
//!
//! Dropping the client is a connection error: the driver is destroyed on the
//! GPU thread and the disconnection callback runs exactly once.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use fresco_core::sync::{CommandBufferId, CommandBufferNamespace, SyncPoint, SyncToken};
use fresco_core::trace::{ConnectionLostEvent, Endpoint, SyncPointEvent, SyncPointPhase};
use parking_lot::Mutex;

use crate::decoder::CommandDecoder;
use crate::driver::CommandBufferDriver;
use crate::error::{CommandBufferError, Result};
use crate::gpu_state::{GpuState, with_tracer};
use crate::image::ImageDescriptor;
use crate::shared_memory::SharedMemory;
use crate::state::{CommandBufferState, SharedState, in_range};
use crate::time;

/// Limits applied to a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandBufferConfig {
    /// Smallest ring buffer accepted by `set_get_buffer`, in bytes.
    pub min_ring_bytes: usize,
    /// Largest transfer buffer accepted, in bytes.
    pub max_transfer_buffer_bytes: usize,
    /// Requests that may be queued before the client blocks.
    pub channel_capacity: usize,
}

impl CommandBufferConfig {
    /// Settings for ordinary clients.
    pub const DEFAULT: Self = Self {
        min_ring_bytes: 64,
        max_transfer_buffer_bytes: 256 * 1024 * 1024,
        channel_capacity: 1024,
    };

    /// Settings for memory-constrained devices.
    #[must_use]
    pub const fn low_memory() -> Self {
        Self {
            min_ring_bytes: 64,
            max_transfer_buffer_bytes: 32 * 1024 * 1024,
            channel_capacity: 256,
        }
    }
}

impl Default for CommandBufferConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A request sent from the client to the service.
pub enum CommandBufferRequest {
    /// Use a transfer buffer as the ring buffer.
    SetGetBuffer(i32),
    /// Execute commands up to `put_offset`.
    Flush {
        /// New put offset in entries.
        put_offset: u32,
    },
    /// Register a shared-memory region.
    RegisterTransferBuffer {
        /// Client-chosen id; must be positive.
        id: i32,
        /// The region.
        memory: SharedMemory,
    },
    /// Unregister a shared-memory region.
    DestroyTransferBuffer(i32),
    /// Create an image from a client buffer.
    CreateImage {
        /// Client-chosen id.
        id: i32,
        /// Image parameters.
        descriptor: ImageDescriptor,
    },
    /// Destroy an image.
    DestroyImage(i32),
    /// Issue a sync point; answered without a GPU-thread round trip.
    InsertSyncPoint {
        /// Also retire it once prior requests have executed.
        retire: bool,
        /// Receives the new sync point.
        reply: Sender<SyncPoint>,
    },
    /// Retire a sync point after prior requests have executed.
    RetireSyncPoint(SyncPoint),
}

impl fmt::Debug for CommandBufferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetGetBuffer(id) => f.debug_tuple("SetGetBuffer").field(id).finish(),
            Self::Flush { put_offset } => f
                .debug_struct("Flush")
                .field("put_offset", put_offset)
                .finish(),
            Self::RegisterTransferBuffer { id, memory } => f
                .debug_struct("RegisterTransferBuffer")
                .field("id", id)
                .field("len", &memory.len())
                .finish(),
            Self::DestroyTransferBuffer(id) => {
                f.debug_tuple("DestroyTransferBuffer").field(id).finish()
            }
            Self::CreateImage { id, .. } => f
                .debug_struct("CreateImage")
                .field("id", id)
                .finish_non_exhaustive(),
            Self::DestroyImage(id) => f.debug_tuple("DestroyImage").field(id).finish(),
            Self::InsertSyncPoint { retire, .. } => f
                .debug_struct("InsertSyncPoint")
                .field("retire", retire)
                .finish_non_exhaustive(),
            Self::RetireSyncPoint(sp) => f.debug_tuple("RetireSyncPoint").field(sp).finish(),
        }
    }
}

/// Service side of a command buffer.
///
/// Dropping this handle does not tear anything down; the service lives until
/// the client disconnects.
pub struct CommandBufferImpl {
    id: CommandBufferId,
    ipc_thread: Option<JoinHandle<()>>,
}

impl fmt::Debug for CommandBufferImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferImpl")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl CommandBufferImpl {
    /// Creates a command buffer executing on `gpu`'s thread.
    ///
    /// `on_connection_error` runs once, on the GPU thread, after the driver
    /// has been destroyed.
    pub fn create(
        gpu: &Arc<GpuState>,
        config: CommandBufferConfig,
        decoder: Box<dyn CommandDecoder>,
        on_connection_error: impl FnOnce() + Send + 'static,
    ) -> Result<(Self, CommandBufferClient)> {
        let id = gpu.next_command_buffer_id();
        let shared = Arc::new(SharedState::default());
        let driver = Arc::new(Mutex::new(CommandBufferDriver::new(
            id,
            config,
            decoder,
            Arc::clone(&shared),
            Arc::clone(gpu.sync_point_manager()),
            gpu.trace_sink().cloned(),
        )));

        let (sender, receiver) = crossbeam_channel::bounded(config.channel_capacity.max(1));
        let service = IpcService {
            id,
            gpu: Arc::clone(gpu),
            driver,
            on_connection_error: Box::new(on_connection_error),
        };
        let ipc_thread = thread::Builder::new()
            .name(format!("fresco-cb-ipc-{}", id.0))
            .spawn(move || service.run(&receiver))
            .map_err(|_| CommandBufferError::ThreadSpawn("command buffer IPC"))?;
        tracing::debug!(command_buffer = ?id, "command buffer created");

        Ok((
            Self {
                id,
                ipc_thread: Some(ipc_thread),
            },
            CommandBufferClient {
                id,
                sender,
                shared,
            },
        ))
    }

    /// The command buffer id.
    #[must_use]
    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    /// Blocks until the IPC thread has observed the disconnect and handed
    /// teardown to the GPU thread.
    pub fn join(mut self) {
        if let Some(handle) = self.ipc_thread.take()
            && handle.join().is_err()
        {
            tracing::error!(command_buffer = ?self.id, "IPC thread panicked");
        }
    }
}

struct IpcService {
    id: CommandBufferId,
    gpu: Arc<GpuState>,
    driver: Arc<Mutex<CommandBufferDriver>>,
    on_connection_error: Box<dyn FnOnce() + Send>,
}

impl IpcService {
    fn run(self, receiver: &Receiver<CommandBufferRequest>) {
        while let Ok(request) = receiver.recv() {
            match request {
                CommandBufferRequest::InsertSyncPoint { retire, reply } => {
                    self.insert_sync_point(retire, &reply);
                }
                request => self.forward(request),
            }
        }
        self.disconnect();
    }

    fn insert_sync_point(&self, retire: bool, reply: &Sender<SyncPoint>) {
        let sync_point = self.gpu.sync_point_manager().generate_sync_point();
        let event = SyncPointEvent {
            sync_point,
            phase: SyncPointPhase::Inserted,
            timestamp: time::now(),
        };
        self.gpu.trace(|t| t.sync_point(&event));
        _ = reply.send(sync_point);
        if retire {
            self.forward(CommandBufferRequest::RetireSyncPoint(sync_point));
        }
    }

    fn forward(&self, request: CommandBufferRequest) {
        let driver = Arc::clone(&self.driver);
        let posted = self.gpu.post_task(move || {
            let mut driver = driver.lock();
            let id = driver.id();
            if let Err(error) = execute(&mut driver, request) {
                tracing::warn!(command_buffer = ?id, %error, "request failed");
            }
        });
        if posted.is_err() {
            tracing::warn!(command_buffer = ?self.id, "GPU thread gone, request dropped");
        }
    }

    fn disconnect(self) {
        tracing::debug!(command_buffer = ?self.id, "client disconnected");
        let Self {
            id,
            gpu,
            driver,
            on_connection_error,
        } = self;
        let trace_sink = gpu.trace_sink().cloned();
        let teardown = move || {
            driver.lock().destroy();
            let event = ConnectionLostEvent {
                endpoint: Endpoint::CommandBuffer(id),
                timestamp: time::now(),
            };
            with_tracer(trace_sink.as_ref(), |t| t.connection_lost(&event));
            on_connection_error();
        };
        if let Err(teardown) = gpu.post_task(teardown) {
            teardown();
        }
    }
}

fn execute(driver: &mut CommandBufferDriver, request: CommandBufferRequest) -> Result<()> {
    match request {
        CommandBufferRequest::SetGetBuffer(id) => driver.set_get_buffer(id),
        CommandBufferRequest::Flush { put_offset } => {
            driver.flush(put_offset);
            Ok(())
        }
        CommandBufferRequest::RegisterTransferBuffer { id, memory } => {
            driver.register_transfer_buffer(id, memory)
        }
        CommandBufferRequest::DestroyTransferBuffer(id) => driver.destroy_transfer_buffer(id),
        CommandBufferRequest::CreateImage { id, descriptor } => driver.create_image(id, descriptor),
        CommandBufferRequest::DestroyImage(id) => driver.destroy_image(id),
        CommandBufferRequest::RetireSyncPoint(sync_point) => {
            driver.retire_sync_point(sync_point);
            Ok(())
        }
        CommandBufferRequest::InsertSyncPoint { .. } => {
            unreachable!("sync points are inserted on the IPC thread")
        }
    }
}

/// Client side of a command buffer.
///
/// All methods are one-way sends except [`insert_sync_point`] and the
/// `wait_*` family. Dropping the client disconnects it.
///
/// [`insert_sync_point`]: Self::insert_sync_point
pub struct CommandBufferClient {
    id: CommandBufferId,
    sender: Sender<CommandBufferRequest>,
    shared: Arc<SharedState>,
}

impl fmt::Debug for CommandBufferClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferClient")
            .field("id", &self.id)
            .field("state", &self.shared.get())
            .finish_non_exhaustive()
    }
}

impl CommandBufferClient {
    /// The command buffer id.
    #[must_use]
    pub fn id(&self) -> CommandBufferId {
        self.id
    }

    /// Most recently published state.
    #[must_use]
    pub fn state(&self) -> CommandBufferState {
        self.shared.get()
    }

    /// Registers a shared-memory region under `id`.
    pub fn register_transfer_buffer(&self, id: i32, memory: SharedMemory) -> Result<()> {
        if id <= 0 {
            return Err(CommandBufferError::InvalidTransferBufferId(id));
        }
        self.send(CommandBufferRequest::RegisterTransferBuffer { id, memory })
    }

    /// Unregisters a shared-memory region.
    pub fn destroy_transfer_buffer(&self, id: i32) -> Result<()> {
        self.send(CommandBufferRequest::DestroyTransferBuffer(id))
    }

    /// Uses transfer buffer `id` as the ring buffer.
    pub fn set_get_buffer(&self, id: i32) -> Result<()> {
        self.send(CommandBufferRequest::SetGetBuffer(id))
    }

    /// Asks the service to execute commands up to `put_offset`.
    pub fn flush(&self, put_offset: u32) -> Result<()> {
        self.send(CommandBufferRequest::Flush { put_offset })
    }

    /// Creates an image from a client buffer.
    pub fn create_image(&self, id: i32, descriptor: ImageDescriptor) -> Result<()> {
        self.send(CommandBufferRequest::CreateImage { id, descriptor })
    }

    /// Destroys an image.
    pub fn destroy_image(&self, id: i32) -> Result<()> {
        self.send(CommandBufferRequest::DestroyImage(id))
    }

    /// Issues a sync point. With `retire`, the service retires it once every
    /// request sent before this one has executed.
    pub fn insert_sync_point(&self, retire: bool) -> Result<SyncPoint> {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.send(CommandBufferRequest::InsertSyncPoint { retire, reply })?;
        response.recv().map_err(|_| CommandBufferError::Disconnected)
    }

    /// Retires `sync_point` once every request sent before this one has
    /// executed.
    pub fn retire_sync_point(&self, sync_point: SyncPoint) -> Result<()> {
        self.send(CommandBufferRequest::RetireSyncPoint(sync_point))
    }

    /// Wraps `sync_point` into a token other contexts can wait on.
    #[must_use]
    pub fn sync_token(&self, sync_point: SyncPoint) -> SyncToken {
        SyncToken::new(CommandBufferNamespace::GpuIo, self.id, sync_point)
    }

    /// Blocks until the token lies in `[start, end]` (which may wrap) or the
    /// buffer is lost.
    pub fn wait_for_token_in_range(&self, start: i32, end: i32) -> CommandBufferState {
        self.shared.wait_until(|s| {
            if start <= end {
                start <= s.token && s.token <= end
            } else {
                start <= s.token || s.token <= end
            }
        })
    }

    /// Blocks until the get offset lies in `[start, end]` (which may wrap)
    /// or the buffer is lost.
    pub fn wait_for_get_offset_in_range(&self, start: u32, end: u32) -> CommandBufferState {
        self.shared.wait_until(|s| in_range(start, end, s.get_offset))
    }

    fn send(&self, request: CommandBufferRequest) -> Result<()> {
        let state = self.shared.get();
        if state.is_lost() {
            return Err(CommandBufferError::Lost {
                kind: state.error,
                reason: state.context_lost_reason,
            });
        }
        self.sender
            .send(request)
            .map_err(|_| CommandBufferError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandWriter, FIRST_DECODER_COMMAND};
    use crate::driver::tests::RecordingDecoder;
    use crate::state::{ContextLostReason, ErrorKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn connected(
        gpu: &Arc<GpuState>,
        decoder: RecordingDecoder,
    ) -> (CommandBufferImpl, CommandBufferClient, CommandWriter) {
        let (service, client) =
            CommandBufferImpl::create(gpu, CommandBufferConfig::DEFAULT, Box::new(decoder), || {})
                .expect("command buffer should start");
        let ring = SharedMemory::new(256);
        client
            .register_transfer_buffer(1, ring.clone())
            .expect("register should send");
        client.set_get_buffer(1).expect("set_get_buffer should send");
        (service, client, CommandWriter::new(ring))
    }

    #[test]
    fn flushed_commands_run_in_order_on_the_gpu_thread() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let decoder = RecordingDecoder::new();
        let log = Arc::clone(&decoder.log);
        let (_service, client, mut writer) = connected(&gpu, decoder);

        writer.push(FIRST_DECODER_COMMAND, &[10]);
        writer.push(FIRST_DECODER_COMMAND, &[20]);
        let put = writer.set_token(5);
        client.flush(put).expect("flush should send");

        let state = client.wait_for_token_in_range(5, 5);
        assert_eq!(state.token, 5);
        assert_eq!(state.get_offset, put);
        let seen: Vec<u32> = log.lock().iter().map(|(_, args)| args[0]).collect();
        assert_eq!(seen, vec![10, 20]);
    }

    #[test]
    fn wait_for_get_offset_observes_progress() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let (_service, client, mut writer) = connected(&gpu, RecordingDecoder::new());
        let put = writer.push(FIRST_DECODER_COMMAND, &[1, 2, 3]);
        client.flush(put).expect("flush should send");
        let state = client.wait_for_get_offset_in_range(put, put);
        assert_eq!(state.get_offset, put);
    }

    #[test]
    fn out_of_range_flush_loses_the_buffer() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let (_service, client, _writer) = connected(&gpu, RecordingDecoder::new());
        client.flush(10_000).expect("flush should send");

        let state = client.wait_for_token_in_range(1, 1);
        assert!(state.is_lost());
        assert_eq!(state.error, ErrorKind::OutOfBounds);
        assert!(matches!(
            client.flush(0),
            Err(CommandBufferError::Lost {
                kind: ErrorKind::OutOfBounds,
                ..
            })
        ));
    }

    #[test]
    fn inserted_sync_point_retires_after_prior_work() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let (_service, client, mut writer) = connected(&gpu, RecordingDecoder::new());
        let put = writer.set_token(3);
        client.flush(put).expect("flush should send");

        let sync_point = client
            .insert_sync_point(true)
            .expect("insert_sync_point should reply");
        assert!(sync_point.is_some());
        gpu.sync_point_manager().wait(sync_point);
        assert_eq!(client.state().token, 3, "retire is ordered after the flush");

        let token = client.sync_token(sync_point);
        assert!(token.has_data());
        assert_eq!(token.command_buffer_id, client.id());
    }

    #[test]
    fn explicit_retire_wakes_waiters() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let (_service, client, _writer) = connected(&gpu, RecordingDecoder::new());
        let sync_point = client
            .insert_sync_point(false)
            .expect("insert_sync_point should reply");
        assert!(!gpu.sync_point_manager().is_sync_point_retired(sync_point));
        client
            .retire_sync_point(sync_point)
            .expect("retire should send");
        gpu.sync_point_manager().wait(sync_point);
        assert!(gpu.sync_point_manager().is_sync_point_retired(sync_point));
    }

    #[test]
    fn disconnect_runs_callback_exactly_once() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let decoder = RecordingDecoder::new();
        let destroyed = Arc::clone(&decoder.destroyed);
        let calls = Arc::new(AtomicU32::new(0));
        let (service, client) = {
            let calls = Arc::clone(&calls);
            CommandBufferImpl::create(
                &gpu,
                CommandBufferConfig::DEFAULT,
                Box::new(decoder),
                move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                },
            )
            .expect("command buffer should start")
        };
        let shared = Arc::clone(&client.shared);

        drop(client);
        service.join();
        gpu.finish();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*destroyed.lock(), Some(true));
        let state = shared.get();
        assert_eq!(state.error, ErrorKind::LostContext);
        assert_eq!(state.context_lost_reason, ContextLostReason::Destroyed);
    }

    #[test]
    fn invalid_transfer_buffer_id_is_refused_client_side() {
        let gpu = GpuState::new().expect("GPU thread should start");
        let (_service, client) = CommandBufferImpl::create(
            &gpu,
            CommandBufferConfig::low_memory(),
            Box::new(RecordingDecoder::new()),
            || {},
        )
        .expect("command buffer should start");
        assert_eq!(
            client.register_transfer_buffer(-1, SharedMemory::new(64)),
            Err(CommandBufferError::InvalidTransferBufferId(-1))
        );
    }
}
