// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The GL backend seam.
//!
//! The driver only parses command framing; it never interprets GL commands.
//! Everything past the common commands is handed to a [`CommandDecoder`],
//! which owns validation of malformed commands.

use thiserror::Error;

use crate::image::ImageRegistry;
use crate::state::ContextLostReason;
use crate::transfer_buffer::TransferBufferManager;

/// Why a decoder rejected a command.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The decoder does not know the command id.
    #[error("unknown command {0}")]
    UnknownCommand(u32),
    /// The arguments are malformed.
    #[error("invalid arguments for command {0}")]
    InvalidArguments(u32),
    /// The backend could not allocate memory.
    #[error("out of memory")]
    OutOfMemory,
    /// The GL context was lost while executing.
    #[error("context lost: {0:?}")]
    ContextLost(ContextLostReason),
}

/// Resources a decoder may consult while executing a command.
#[derive(Debug)]
pub struct DecoderContext<'a> {
    /// Registered transfer buffers (upload sources and the like).
    pub transfer_buffers: &'a TransferBufferManager,
    /// Client-created images.
    pub images: &'a ImageRegistry,
}

/// Executes decoder-level commands on the GPU thread.
pub trait CommandDecoder: Send {
    /// Executes one command.
    fn decode(
        &mut self,
        command: u32,
        args: &[u32],
        cx: &DecoderContext<'_>,
    ) -> Result<(), DecodeError>;

    /// Releases backend objects. Called once when the driver is destroyed.
    fn destroy(&mut self, have_context: bool) {
        _ = have_context;
    }
}
