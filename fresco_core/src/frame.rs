// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositor frames: render passes of draw quads.
//!
//! A [`CompositorFrame`] is produced by a client's compositor and consumed by
//! the display compositor. It holds an ordered list of [`RenderPass`]es (the
//! root pass last) and the [`TransferableResource`]s its quads reference.
//! Within a pass, quads are stored front-to-back: index 0 is drawn on top.

use alloc::vec::Vec;

use kurbo::{Affine, Rect};

use crate::id::{RenderPassId, ResourceId};
use crate::resource::TransferableResource;

/// What a [`DrawQuad`] draws.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Material {
    /// A flat color, premultiplied RGBA.
    SolidColor {
        /// Premultiplied RGBA color.
        color: [f32; 4],
    },
    /// A texture resource.
    Texture {
        /// The resource sampled by this quad.
        resource: ResourceId,
        /// Normalized source rect within the texture.
        uv_rect: Rect,
        /// Whether the texture has premultiplied alpha.
        premultiplied_alpha: bool,
        /// Whether the texture is stored bottom-up.
        y_flipped: bool,
    },
    /// A video frame delivered through a stream texture.
    StreamVideo {
        /// The resource holding the current video frame.
        resource: ResourceId,
        /// Normalized source rect within the frame.
        uv_rect: Rect,
    },
    /// The output of another render pass in the same frame.
    RenderPass {
        /// The pass whose output is drawn.
        pass_id: RenderPassId,
    },
}

/// A single quad in a render pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawQuad {
    /// Quad geometry in its own content space.
    pub rect: Rect,
    /// Part of `rect` that is visible after occlusion culling.
    pub visible_rect: Rect,
    /// Maps content space into the render pass's target space.
    pub transform: Affine,
    /// Clip in target space, if any.
    pub clip_rect: Option<Rect>,
    /// Layer opacity applied to the quad.
    pub opacity: f32,
    /// Whether the quad's contents are fully opaque.
    pub contents_opaque: bool,
    /// What to draw.
    pub material: Material,
}

impl DrawQuad {
    /// Creates an unclipped, fully visible quad with identity transform.
    #[must_use]
    pub fn new(rect: Rect, material: Material) -> Self {
        Self {
            rect,
            visible_rect: rect,
            transform: Affine::IDENTITY,
            clip_rect: None,
            opacity: 1.0,
            contents_opaque: true,
            material,
        }
    }

    /// Creates an opaque solid-color quad.
    #[must_use]
    pub fn solid_color(rect: Rect, color: [f32; 4]) -> Self {
        Self::new(rect, Material::SolidColor { color })
    }

    /// Returns the resource this quad samples, if any.
    #[must_use]
    pub fn resource(&self) -> Option<ResourceId> {
        match self.material {
            Material::Texture { resource, .. } | Material::StreamVideo { resource, .. } => {
                Some(resource)
            }
            Material::SolidColor { .. } | Material::RenderPass { .. } => None,
        }
    }

    /// Returns the bounding box of the visible rect in target space,
    /// clipped by `clip_rect`.
    #[must_use]
    pub fn visible_rect_in_target(&self) -> Rect {
        let bounds = self.transform.transform_rect_bbox(self.visible_rect);
        match self.clip_rect {
            Some(clip) => bounds.intersect(clip),
            None => bounds,
        }
    }

    /// Returns whether the quad covers what is behind it.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.opacity >= 1.0 && self.contents_opaque
    }

    /// Returns whether the quad draws nothing visible.
    #[must_use]
    pub fn is_invisible(&self) -> bool {
        if self.opacity <= 0.0 {
            return true;
        }
        matches!(self.material, Material::SolidColor { color } if color[3] <= 0.0)
    }
}

/// One pass of a compositor frame.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderPass {
    /// Frame-unique pass identifier.
    pub id: RenderPassId,
    /// Output bounds in target space.
    pub output_rect: Rect,
    /// Area that changed since the previous frame.
    pub damage_rect: Rect,
    /// Maps this pass's target space into the root pass's space.
    pub transform_to_root: Affine,
    /// Quads, front-to-back.
    pub quads: Vec<DrawQuad>,
}

impl RenderPass {
    /// Creates an empty pass fully damaged over `output_rect`.
    #[must_use]
    pub fn new(id: RenderPassId, output_rect: Rect) -> Self {
        Self {
            id,
            output_rect,
            damage_rect: output_rect,
            transform_to_root: Affine::IDENTITY,
            quads: Vec::new(),
        }
    }

    /// Appends a quad behind all existing quads.
    pub fn push_quad(&mut self, quad: DrawQuad) {
        self.quads.push(quad);
    }
}

/// Per-frame metadata.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMetadata {
    /// Device scale factor the frame was produced at.
    pub device_scale_factor: f32,
    /// Client-chosen token echoed back in presentation feedback.
    pub frame_token: u32,
}

impl Default for FrameMetadata {
    fn default() -> Self {
        Self {
            device_scale_factor: 1.0,
            frame_token: 0,
        }
    }
}

/// A batch of render passes submitted for display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositorFrame {
    /// Frame metadata.
    pub metadata: FrameMetadata,
    /// Resources referenced by this frame's quads.
    pub resources: Vec<TransferableResource>,
    /// Render passes in dependency order; the root pass is last.
    pub render_passes: Vec<RenderPass>,
}

/// Why a [`CompositorFrame`] was rejected.
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum FrameValidationError {
    /// The frame has no render passes.
    #[error("compositor frame has no render passes")]
    NoRenderPasses,
    /// Two passes share an id.
    #[error("duplicate render pass {0:?}")]
    DuplicateRenderPass(RenderPassId),
    /// A render-pass quad references a pass that is not drawn before it.
    #[error("render pass {pass:?} references {referenced:?}, which is not an earlier pass")]
    UnknownRenderPass {
        /// The pass containing the quad.
        pass: RenderPassId,
        /// The referenced pass.
        referenced: RenderPassId,
    },
    /// A quad samples a resource the frame did not transfer.
    #[error("quad references untransferred resource {0:?}")]
    UnknownResource(ResourceId),
    /// The device scale factor is not a positive finite number.
    #[error("invalid device scale factor {0}")]
    InvalidScaleFactor(f32),
}

impl CompositorFrame {
    /// Returns the root render pass (the last one).
    #[must_use]
    pub fn root_pass(&self) -> Option<&RenderPass> {
        self.render_passes.last()
    }

    /// Returns the root render pass mutably.
    pub fn root_pass_mut(&mut self) -> Option<&mut RenderPass> {
        self.render_passes.last_mut()
    }

    /// Returns the ids of every resource sampled by a quad, sorted and
    /// deduplicated.
    #[must_use]
    pub fn referenced_resources(&self) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .render_passes
            .iter()
            .flat_map(|pass| pass.quads.iter())
            .filter_map(DrawQuad::resource)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Checks structural invariants.
    ///
    /// A valid frame has at least one pass, unique pass ids, render-pass
    /// quads that only reference earlier passes, and every sampled resource
    /// listed in [`resources`](Self::resources).
    pub fn validate(&self) -> Result<(), FrameValidationError> {
        let scale = self.metadata.device_scale_factor;
        if !(scale.is_finite() && scale > 0.0) {
            return Err(FrameValidationError::InvalidScaleFactor(scale));
        }
        if self.render_passes.is_empty() {
            return Err(FrameValidationError::NoRenderPasses);
        }

        let mut seen: Vec<RenderPassId> = Vec::with_capacity(self.render_passes.len());
        for pass in &self.render_passes {
            if seen.contains(&pass.id) {
                return Err(FrameValidationError::DuplicateRenderPass(pass.id));
            }
            for quad in &pass.quads {
                match quad.material {
                    Material::RenderPass { pass_id } if !seen.contains(&pass_id) => {
                        return Err(FrameValidationError::UnknownRenderPass {
                            pass: pass.id,
                            referenced: pass_id,
                        });
                    }
                    _ => {}
                }
                if let Some(id) = quad.resource() {
                    if !self.resources.iter().any(|r| r.id == id) {
                        return Err(FrameValidationError::UnknownResource(id));
                    }
                }
            }
            seen.push(pass.id);
        }
        Ok(())
    }
}
