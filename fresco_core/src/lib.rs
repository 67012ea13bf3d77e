// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core types for handing composited frames from a renderer to the display.
//!
//! `fresco_core` holds the data model shared by the GPU command-buffer
//! service (`fresco_gpu`) and the display compositor (`fresco_display`). It is
//! `no_std` compatible (with `alloc`) so that frame producers running in
//! constrained environments can build frames without pulling in threads.
//!
//! # Architecture
//!
//! ```text
//!   renderer compositor
//!       │  CompositorFrame (render passes, quads, TransferableResources)
//!       ▼
//!   frame sink ──► SurfaceId ──► display compositor
//!                                    │
//!                 ┌──────────────────┴───────────────┐
//!                 ▼                                  ▼
//!   overlay candidates ──► platform       GL context ──► swap
//!                 │
//!                 ▼
//!   ResourceTracker ──► ReturnedResource (after sync point retires)
//! ```
//!
//! **[`id`]**: Frame sink, surface, resource, and render pass identifiers.
//!
//! **[`sync`]**: Sync points and sync tokens, the ordering fences between
//! independent command buffers.
//!
//! **[`resource`]**: Transferable GPU resources and the
//! [`ResourceTracker`](resource::ResourceTracker) that keeps them alive until
//! the GPU is done with them.
//!
//! **[`frame`]**: Compositor frames, render passes, draw quads, and frame
//! validation.
//!
//! **[`overlay`]**: Overlay candidate descriptors exchanged with the
//! platform overlay layer.
//!
//! **[`stencil`]**: GL stencil state snapshots.
//!
//! **[`platform`]**: Traits the host implements for its GL context and
//! overlay hardware.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types with
//! a zero-overhead [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod frame;
pub mod id;
pub mod overlay;
pub mod platform;
pub mod resource;
pub mod stencil;
pub mod sync;
pub mod time;
pub mod trace;
