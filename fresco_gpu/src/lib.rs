// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPU command-buffer service.
//!
//! A client writes commands into a ring buffer it shares with the service
//! and calls `flush(put_offset)`; the service executes everything between its
//! get offset and the new put offset on the GPU thread, in order, and
//! publishes its progress back.
//!
//! # Threads
//!
//! - **GPU thread**: one per [`GpuState`]. Every [`CommandBufferDriver`] runs
//!   here, so commands from different command buffers never interleave
//!   mid-command.
//! - **IPC thread**: one per [`CommandBufferImpl`]. Receives
//!   [`CommandBufferRequest`]s, answers `InsertSyncPoint` directly, and
//!   forwards the rest to the GPU thread.
//!
//! # Sync points
//!
//! Sync points order work between independent command buffers. They are
//! issued by the [`SyncPointManager`] (monotonically increasing) and retired
//! on the GPU thread once the work that precedes them has executed. A
//! consumer holding a [`SyncToken`](fresco_core::sync::SyncToken) may use the
//! associated resource once its sync point has retired.
//!
//! # Decoding
//!
//! Only command framing and the common commands ([`command::NOOP`],
//! [`command::SET_TOKEN`]) are interpreted here. Everything else is handed
//! to a [`CommandDecoder`] supplied by the embedder.

pub mod command;
mod command_buffer;
mod decoder;
mod driver;
mod error;
mod gpu_state;
mod image;
mod shared_memory;
mod state;
mod sync_point_manager;
mod time;
mod transfer_buffer;

pub use command::{CommandHeader, CommandWriter};
pub use command_buffer::{
    CommandBufferClient, CommandBufferConfig, CommandBufferImpl, CommandBufferRequest,
};
pub use decoder::{CommandDecoder, DecodeError, DecoderContext};
pub use driver::CommandBufferDriver;
pub use error::{CommandBufferError, Result};
pub use gpu_state::{GpuState, SharedTraceSink, Task, with_tracer};
pub use image::{ImageDescriptor, ImageRegistry};
pub use shared_memory::{ENTRY_SIZE, SharedMemory};
pub use state::{CommandBufferState, ContextLostReason, ErrorKind};
pub use sync_point_manager::SyncPointManager;
pub use time::{now, timebase};
pub use transfer_buffer::TransferBufferManager;
