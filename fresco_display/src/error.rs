// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame sink and surface errors.

use fresco_core::frame::FrameValidationError;
use fresco_core::id::{ClientId, FrameSinkId, LocalSurfaceId, SurfaceId};
use thiserror::Error;

/// Errors returned by frame sinks, the surface manager, and the display.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameSinkError {
    /// The submitted frame is malformed.
    #[error("invalid compositor frame: {0}")]
    InvalidFrame(#[from] FrameValidationError),

    /// Frames must be submitted with a valid local surface id.
    #[error("invalid local surface id {0:?}")]
    InvalidLocalSurfaceId(LocalSurfaceId),

    /// The frame sink is already registered.
    #[error("frame sink {0:?} is already registered")]
    DuplicateFrameSink(FrameSinkId),

    /// The frame sink is not registered.
    #[error("unknown frame sink {0:?}")]
    UnknownFrameSink(FrameSinkId),

    /// A client with this id already exists on the display.
    #[error("client {0:?} already exists")]
    DuplicateClient(ClientId),

    /// The surface already exists.
    #[error("surface {0:?} already exists")]
    DuplicateSurface(SurfaceId),

    /// The surface does not exist.
    #[error("unknown surface {0:?}")]
    UnknownSurface(SurfaceId),

    /// The other end of the frame sink connection is gone.
    #[error("frame sink connection closed")]
    Disconnected,
}

/// Result type for display-side operations.
pub type Result<T> = std::result::Result<T, FrameSinkError>;
