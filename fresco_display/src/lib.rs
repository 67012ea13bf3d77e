// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display compositor side of Fresco.
//!
//! Clients submit compositor frames to frame sinks; a [`DisplayImpl`] draws
//! the root sink's active frame into the host app's framebuffer through a
//! [`ParentOutputSurface`], promoting suitable quads to hardware overlay
//! planes on the way.
//!
//! ```text
//!  client ─▶ CompositorFrameSinkRemote ─▶ CompositorFrameSinkImpl ─▶ SurfaceManager
//!                                                                        │
//!            DisplayImpl::draw_and_swap ◀────── root surface frame ──────┘
//!                 │
//!                 ├─▶ OverlayProcessor ─▶ BrowserCompositorOverlayValidator ─▶ platform
//!                 └─▶ ParentOutputSurface ─▶ GL context
//! ```
//!
//! # Resource lifetime
//!
//! A resource stays with the display while a frame referencing it is active
//! and until the display's reads of it are done. Each swap carries a read
//! fence, a sync point retired when the swap completes; released resources
//! are returned to their client only after that.
//!
//! # Threading
//!
//! Everything here runs on the display thread. The only shared state is the
//! process-wide [`SurfacesState`], whose surface manager sits behind a mutex.

mod display;
mod error;
mod frame_sink;
mod output_surface;
mod overlay;
mod surfaces;

pub use display::{DisplayConfig, DisplayImpl};
pub use error::{FrameSinkError, Result};
pub use frame_sink::{
    CompositorFrameSinkDelegate, CompositorFrameSinkImpl, CompositorFrameSinkRemote,
    CompositorFrameSinkRequest, DisplayClient,
};
pub use output_surface::{
    LatencyInfo, OutputSurfaceFrame, ParentOutputSurface, PresentedFrame, ScopedAppGlStateRestore,
};
pub use overlay::{
    BrowserCompositorOverlayValidator, MAX_OVERLAY_PLANES, OverlayCandidateValidator,
    OverlayConfig, OverlayOutcome, OverlayProcessor,
};
pub use surfaces::{Surface, SurfaceIdAllocator, SurfaceManager, SurfacesState};
