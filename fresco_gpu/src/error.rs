// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Command-buffer service errors.

use thiserror::Error;

use crate::state::{ContextLostReason, ErrorKind};

/// Errors returned by command-buffer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandBufferError {
    /// Transfer buffer ids must be positive.
    #[error("invalid transfer buffer id {0}")]
    InvalidTransferBufferId(i32),

    /// A transfer buffer with this id is already registered.
    #[error("transfer buffer {0} is already registered")]
    DuplicateTransferBuffer(i32),

    /// No transfer buffer with this id is registered.
    #[error("unknown transfer buffer {0}")]
    UnknownTransferBuffer(i32),

    /// A transfer buffer exceeds the configured size limit.
    #[error("transfer buffer of {size} bytes exceeds limit of {limit} bytes")]
    TransferBufferTooLarge {
        /// Requested size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The ring buffer is smaller than the configured minimum.
    #[error("ring buffer of {size} bytes is below minimum of {min} bytes")]
    RingBufferTooSmall {
        /// Requested size.
        size: usize,
        /// Configured minimum.
        min: usize,
    },

    /// An image with this id already exists.
    #[error("image {0} already exists")]
    DuplicateImage(i32),

    /// No image with this id exists.
    #[error("unknown image {0}")]
    UnknownImage(i32),

    /// An image was requested with a zero dimension.
    #[error("image {0} has an empty size")]
    EmptyImage(i32),

    /// The command buffer is in an error state.
    #[error("command buffer is lost ({kind:?}, {reason:?})")]
    Lost {
        /// The sticky error.
        kind: ErrorKind,
        /// Reason for context loss, if that was the error.
        reason: ContextLostReason,
    },

    /// The service side of the connection is gone.
    #[error("command buffer connection closed")]
    Disconnected,

    /// A service thread could not be started.
    #[error("failed to spawn the {0} thread")]
    ThreadSpawn(&'static str),
}

/// Result type for command-buffer operations.
pub type Result<T> = std::result::Result<T, CommandBufferError>;
