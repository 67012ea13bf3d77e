// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay candidate descriptors.
//!
//! An *overlay candidate* is a quad that display hardware might scan out
//! directly instead of compositing it into the main framebuffer. The display
//! compositor builds an [`OverlayCandidate`] for every eligible quad, the
//! validator translates it into the platform's [`OverlaySurfaceCandidate`],
//! and the platform answers which ones it can handle.

use alloc::vec::Vec;

use kurbo::{Affine, Rect, Size};

use crate::frame::{DrawQuad, Material};
use crate::id::ResourceId;
use crate::resource::{ResourceFormat, TransferableResource};

/// Scan-out buffer format understood by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    /// 8-bit RGBA.
    Rgba8888,
    /// 8-bit BGRA.
    Bgra8888,
    /// 16-bit RGB 565.
    Rgb565,
    /// Bi-planar YUV 4:2:0 (NV12).
    Yuv420BiPlanar,
}

impl BufferFormat {
    /// Maps a resource format to the scan-out format, if one exists.
    #[must_use]
    pub const fn from_resource_format(format: ResourceFormat) -> Option<Self> {
        match format {
            ResourceFormat::Rgba8888 => Some(Self::Rgba8888),
            ResourceFormat::Bgra8888 => Some(Self::Bgra8888),
            ResourceFormat::Rgb565 => Some(Self::Rgb565),
            ResourceFormat::Yuv420 => Some(Self::Yuv420BiPlanar),
            ResourceFormat::Alpha8 => None,
        }
    }
}

/// An overlay promotion heuristic.
///
/// Strategies are tried in order; the first one that promotes a candidate
/// wins for the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OverlayStrategy {
    /// Promote the front-most unoccluded quad to a plane above the main
    /// framebuffer.
    SingleOnTop,
    /// Promote a quad to a plane below the main framebuffer and punch a
    /// transparent hole where it was.
    Underlay,
}

/// Orientation of an overlay plane relative to its buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OverlayTransform {
    /// Not representable by the hardware.
    Invalid,
    /// No transform.
    #[default]
    None,
    /// Mirrored horizontally.
    FlipHorizontal,
    /// Mirrored vertically.
    FlipVertical,
    /// Rotated 90 degrees clockwise.
    Rotate90,
    /// Rotated 180 degrees.
    Rotate180,
    /// Rotated 270 degrees clockwise.
    Rotate270,
}

impl OverlayTransform {
    /// Classifies the linear part of `transform`.
    ///
    /// Only axis-aligned scales, flips, and quarter-turn rotations map to a
    /// valid overlay transform; anything else (shear, arbitrary rotation,
    /// flip combined with rotation) yields [`Invalid`](Self::Invalid).
    #[must_use]
    pub fn from_affine(transform: Affine) -> Self {
        let [a, b, c, d, _, _] = transform.as_coeffs();
        if b == 0.0 && c == 0.0 {
            match (a > 0.0, d > 0.0, a == 0.0 || d == 0.0) {
                (_, _, true) => Self::Invalid,
                (true, true, _) => Self::None,
                (false, true, _) => Self::FlipHorizontal,
                (true, false, _) => Self::FlipVertical,
                (false, false, _) => Self::Rotate180,
            }
        } else if a == 0.0 && d == 0.0 {
            if b > 0.0 && c < 0.0 {
                Self::Rotate90
            } else if b < 0.0 && c > 0.0 {
                Self::Rotate270
            } else {
                Self::Invalid
            }
        } else {
            Self::Invalid
        }
    }
}

/// A quad that may be promoted to a hardware overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayCandidate {
    /// Buffer format of the resource.
    pub format: BufferFormat,
    /// Plane orientation.
    pub transform: OverlayTransform,
    /// Where the plane lands, in target space.
    pub display_rect: Rect,
    /// Normalized crop of the buffer.
    pub uv_rect: Rect,
    /// Stacking order relative to the main plane (0). Negative is underlay.
    pub plane_z_order: i32,
    /// Buffer dimensions in pixels.
    pub buffer_size: Size,
    /// The resource to scan out.
    pub resource_id: ResourceId,
    /// Unclipped quad bounds in target space.
    pub quad_rect_in_target_space: Rect,
    /// Clip in target space (meaningful when `is_clipped`).
    pub clip_rect: Rect,
    /// Whether `clip_rect` applies.
    pub is_clipped: bool,
    /// Whether this candidate is the output surface's own backbuffer.
    pub use_output_surface_for_resource: bool,
    /// Set by the validator when the platform accepts the candidate.
    pub overlay_handled: bool,
}

impl OverlayCandidate {
    /// Builds a candidate from `quad` if it is eligible for promotion.
    ///
    /// Eligible quads sample an overlay-capable resource through an
    /// axis-aligned transform, are fully opaque (layer opacity 1.0), and have
    /// a scan-out format.
    #[must_use]
    pub fn from_draw_quad(
        quad: &DrawQuad,
        resources: &[TransferableResource],
    ) -> Option<Self> {
        if quad.opacity < 1.0 {
            return None;
        }
        let (resource_id, uv_rect) = match quad.material {
            Material::Texture {
                resource, uv_rect, ..
            }
            | Material::StreamVideo { resource, uv_rect } => (resource, uv_rect),
            Material::SolidColor { .. } | Material::RenderPass { .. } => return None,
        };
        let resource = resources.iter().find(|r| r.id == resource_id)?;
        if !resource.is_overlay_candidate {
            return None;
        }
        let format = BufferFormat::from_resource_format(resource.format)?;
        let transform = OverlayTransform::from_affine(quad.transform);
        if transform == OverlayTransform::Invalid {
            return None;
        }

        let quad_rect = quad.transform.transform_rect_bbox(quad.rect);
        Some(Self {
            format,
            transform,
            display_rect: quad_rect,
            uv_rect,
            plane_z_order: 0,
            buffer_size: resource.size,
            resource_id,
            quad_rect_in_target_space: quad_rect,
            clip_rect: quad.clip_rect.unwrap_or(Rect::ZERO),
            is_clipped: quad.clip_rect.is_some(),
            use_output_surface_for_resource: false,
            overlay_handled: false,
        })
    }
}

/// Candidates considered for one frame.
pub type OverlayCandidateList = Vec<OverlayCandidate>;

/// The platform's view of an overlay plane request.
///
/// Platforms set [`overlay_handled`](Self::overlay_handled) for planes they
/// can scan out, and may adjust [`display_rect`](Self::display_rect) (e.g. to
/// snap to hardware alignment).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlaySurfaceCandidate {
    /// Plane orientation.
    pub transform: OverlayTransform,
    /// Buffer format.
    pub format: BufferFormat,
    /// Buffer dimensions in pixels.
    pub buffer_size: Size,
    /// Destination rect on the display.
    pub display_rect: Rect,
    /// Normalized crop of the buffer.
    pub crop_rect: Rect,
    /// Clip rect on the display (meaningful when `is_clipped`).
    pub clip_rect: Rect,
    /// Whether `clip_rect` applies.
    pub is_clipped: bool,
    /// Stacking order relative to the main plane.
    pub plane_z_order: i32,
    /// Set by the platform when the plane can be scanned out.
    pub overlay_handled: bool,
}
