// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contracts the host implements for its GPU context and overlay hardware.
//!
//! Fresco never talks to a GL driver or a display controller directly. The
//! host provides:
//!
//! - **GL context**: implements [`GlContext`] so the output surface can
//!   flush, present, resize, and restore stencil state.
//!
//! - **Overlay platform**: implements [`OverlayCandidatesPlatform`] to
//!   answer which overlay planes the display hardware can scan out (on Linux
//!   this is the Ozone/DRM plane test).

use kurbo::Size;

use crate::overlay::OverlaySurfaceCandidate;
use crate::stencil::StencilState;

/// The GL context an output surface presents through.
pub trait GlContext {
    /// Issues all pending GL commands to the GPU.
    fn flush(&mut self);

    /// Presents the backbuffer.
    fn swap_buffers(&mut self);

    /// Resizes the default framebuffer.
    fn resize(&mut self, size: Size, has_alpha: bool);

    /// Binds the default framebuffer for drawing.
    fn bind_framebuffer(&mut self);

    /// Applies a stencil state snapshot.
    fn set_stencil_state(&mut self, state: &StencilState);

    /// Returns whether the context has been lost.
    fn is_context_lost(&self) -> bool;
}

/// Platform-specific overlay feasibility checks.
pub trait OverlayCandidatesPlatform {
    /// Marks each candidate the hardware can scan out by setting
    /// `overlay_handled`. Implementations may adjust `display_rect` of
    /// handled candidates; they must leave everything else untouched.
    fn check_overlay_support(&mut self, candidates: &mut [OverlaySurfaceCandidate]);
}
