// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Overlay promotion.
//!
//! Every frame, the [`OverlayProcessor`] looks for a quad in the root render
//! pass that the display hardware could scan out directly. It tries the
//! validator's strategies in order; the first strategy whose candidate the
//! platform accepts wins, and the quad is taken out of GL composition.
//!
//! ```text
//!  root pass ─▶ strategy ─▶ [primary plane, candidate] ─▶ validator ─▶ platform
//!                  ▲                                                     │
//!                  └─────────── overlay_handled / display_rect ◀─────────┘
//! ```
//!
//! # Strategies
//!
//! - [`SingleOnTop`](OverlayStrategy::SingleOnTop): the candidate is drawn
//!   above the primary plane, so nothing in front of it may overlap it.
//! - [`Underlay`](OverlayStrategy::Underlay): the candidate is placed below
//!   the primary plane and the quad is replaced by a transparent punch-out so
//!   the plane shows through.

use fresco_core::frame::{DrawQuad, RenderPass};
use fresco_core::id::ResourceId;
use fresco_core::overlay::{
    BufferFormat, OverlayCandidate, OverlayCandidateList, OverlayStrategy,
    OverlaySurfaceCandidate, OverlayTransform,
};
use fresco_core::platform::OverlayCandidatesPlatform;
use fresco_core::resource::TransferableResource;
use fresco_core::trace::OverlayEvent;
use fresco_gpu::{SharedTraceSink, with_tracer};
use kurbo::Rect;

/// Strategies tried by the browser compositor, in order.
const STRATEGIES: [OverlayStrategy; 2] = [OverlayStrategy::SingleOnTop, OverlayStrategy::Underlay];

/// Most planes offered to the platform at once: the primary plane and one
/// overlay.
pub const MAX_OVERLAY_PLANES: usize = 2;

/// Overlay settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Whether the processor tries to promote quads at all.
    pub overlays_enabled: bool,
    /// Initial software mirroring mode of the validator.
    pub software_mirror: bool,
}

impl OverlayConfig {
    /// Overlays on, no mirroring.
    pub const DEFAULT: Self = Self {
        overlays_enabled: true,
        software_mirror: false,
    };

    /// Everything composited through GL.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            overlays_enabled: false,
            software_mirror: false,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decides which overlay candidates the display can scan out.
pub trait OverlayCandidateValidator {
    /// Strategies to try, in order.
    fn strategies(&self) -> &[OverlayStrategy];

    /// Marks the candidates the hardware can handle.
    ///
    /// Sets `overlay_handled` on accepted candidates and may adjust their
    /// `display_rect`.
    fn check_overlay_support(&mut self, candidates: &mut OverlayCandidateList);
}

/// Validator for the browser compositor backed by an overlay platform.
///
/// While software mirroring is active the framebuffer is copied out for the
/// mirror, so no quad may leave it and every candidate stays un-promoted.
pub struct BrowserCompositorOverlayValidator<P: OverlayCandidatesPlatform> {
    platform: P,
    software_mirror_active: bool,
}

impl<P: OverlayCandidatesPlatform> core::fmt::Debug for BrowserCompositorOverlayValidator<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrowserCompositorOverlayValidator")
            .field("software_mirror_active", &self.software_mirror_active)
            .finish_non_exhaustive()
    }
}

impl<P: OverlayCandidatesPlatform> BrowserCompositorOverlayValidator<P> {
    /// Creates a validator delegating to `platform`.
    pub fn new(platform: P, config: OverlayConfig) -> Self {
        Self {
            platform,
            software_mirror_active: config.software_mirror,
        }
    }

    /// Enables or disables software mirroring.
    pub fn set_software_mirror_mode(&mut self, enabled: bool) {
        self.software_mirror_active = enabled;
    }

    /// Whether software mirroring is active.
    #[must_use]
    pub fn software_mirror_active(&self) -> bool {
        self.software_mirror_active
    }

    /// The wrapped platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the strategies in the order they are tried.
    #[must_use]
    pub fn get_strategies(&self) -> Vec<OverlayStrategy> {
        STRATEGIES.to_vec()
    }
}

impl<P: OverlayCandidatesPlatform> OverlayCandidateValidator
    for BrowserCompositorOverlayValidator<P>
{
    fn strategies(&self) -> &[OverlayStrategy] {
        &STRATEGIES
    }

    fn check_overlay_support(&mut self, candidates: &mut OverlayCandidateList) {
        if self.software_mirror_active {
            return;
        }
        debug_assert!(
            candidates.len() <= MAX_OVERLAY_PLANES,
            "at most {MAX_OVERLAY_PLANES} planes are validated at once"
        );

        let mut surfaces: Vec<OverlaySurfaceCandidate> =
            candidates.iter().map(to_surface_candidate).collect();
        self.platform.check_overlay_support(&mut surfaces);
        debug_assert_eq!(
            surfaces.len(),
            candidates.len(),
            "platform must answer every candidate"
        );

        for (candidate, surface) in candidates.iter_mut().zip(&surfaces) {
            candidate.overlay_handled = surface.overlay_handled;
            if surface.overlay_handled {
                candidate.display_rect = surface.display_rect;
            }
        }
    }
}

fn to_surface_candidate(candidate: &OverlayCandidate) -> OverlaySurfaceCandidate {
    OverlaySurfaceCandidate {
        transform: candidate.transform,
        format: candidate.format,
        buffer_size: candidate.buffer_size,
        display_rect: candidate.display_rect,
        crop_rect: candidate.uv_rect,
        clip_rect: candidate.clip_rect,
        is_clipped: candidate.is_clipped,
        plane_z_order: candidate.plane_z_order,
        overlay_handled: false,
    }
}

/// What overlay processing did to a render pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayOutcome {
    /// Strategy that promoted a quad, if any.
    pub strategy: Option<OverlayStrategy>,
    /// The promoted candidates (excluding the primary plane).
    pub promoted: OverlayCandidateList,
    /// Part of the pass damage that no longer needs compositing.
    pub removed_damage: Rect,
    /// Candidates offered to the validator across all attempts.
    pub candidates_offered: u32,
}

/// Runs overlay strategies over the root render pass.
#[derive(Default)]
pub struct OverlayProcessor {
    config: OverlayConfig,
    frame_index: u64,
    pub(crate) trace_sink: Option<SharedTraceSink>,
}

impl core::fmt::Debug for OverlayProcessor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OverlayProcessor")
            .field("config", &self.config)
            .field("frame_index", &self.frame_index)
            .finish_non_exhaustive()
    }
}

impl OverlayProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(config: OverlayConfig) -> Self {
        Self {
            config,
            frame_index: 0,
            trace_sink: None,
        }
    }

    /// Reports overlay decisions to `sink`.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: SharedTraceSink) -> Self {
        self.trace_sink = Some(sink);
        self
    }

    /// Tries each strategy of `validator` on `pass` until one promotes a quad.
    pub fn process(
        &mut self,
        validator: &mut dyn OverlayCandidateValidator,
        resources: &[TransferableResource],
        pass: &mut RenderPass,
    ) -> OverlayOutcome {
        self.frame_index += 1;
        let mut outcome = OverlayOutcome::default();

        if self.config.overlays_enabled {
            let strategies = validator.strategies().to_vec();
            for strategy in strategies {
                let attempt = match strategy {
                    OverlayStrategy::SingleOnTop => {
                        try_single_on_top(validator, resources, pass, &mut outcome)
                    }
                    OverlayStrategy::Underlay => {
                        try_underlay(validator, resources, pass, &mut outcome)
                    }
                };
                if let Some(candidate) = attempt {
                    outcome.strategy = Some(strategy);
                    if candidate.plane_z_order > 0 {
                        outcome.removed_damage = remove_damage(pass, candidate.display_rect);
                    }
                    outcome.promoted.push(candidate);
                    break;
                }
            }
        }

        tracing::trace!(
            frame_index = self.frame_index,
            strategy = ?outcome.strategy,
            offered = outcome.candidates_offered,
            "overlay processing done"
        );
        let event = OverlayEvent {
            frame_index: self.frame_index,
            strategy: outcome.strategy,
            candidates: outcome.candidates_offered,
            promoted: u32::from(outcome.strategy.is_some()),
            timestamp: fresco_gpu::now(),
        };
        with_tracer(self.trace_sink.as_ref(), |t| t.overlay(&event));
        outcome
    }
}

/// Promotes the front-most eligible quad that nothing in front of it covers.
fn try_single_on_top(
    validator: &mut dyn OverlayCandidateValidator,
    resources: &[TransferableResource],
    pass: &mut RenderPass,
    outcome: &mut OverlayOutcome,
) -> Option<OverlayCandidate> {
    for index in 0..pass.quads.len() {
        let quad = &pass.quads[index];
        let Some(mut candidate) = OverlayCandidate::from_draw_quad(quad, resources) else {
            continue;
        };
        if is_occluded(&pass.quads[..index], candidate.display_rect) {
            continue;
        }
        candidate.plane_z_order = 1;
        let Some(accepted) = validate(validator, pass, candidate, outcome) else {
            continue;
        };
        pass.quads.remove(index);
        return Some(accepted);
    }
    None
}

/// Promotes the front-most eligible quad under the primary plane and punches
/// a transparent hole where it was.
fn try_underlay(
    validator: &mut dyn OverlayCandidateValidator,
    resources: &[TransferableResource],
    pass: &mut RenderPass,
    outcome: &mut OverlayOutcome,
) -> Option<OverlayCandidate> {
    for index in 0..pass.quads.len() {
        let quad = pass.quads[index];
        let Some(mut candidate) = OverlayCandidate::from_draw_quad(&quad, resources) else {
            continue;
        };
        candidate.plane_z_order = -1;
        let Some(accepted) = validate(validator, pass, candidate, outcome) else {
            continue;
        };
        let mut punch_out = DrawQuad::solid_color(quad.rect, [0.0; 4]);
        punch_out.visible_rect = quad.visible_rect;
        punch_out.transform = quad.transform;
        punch_out.clip_rect = quad.clip_rect;
        punch_out.contents_opaque = false;
        pass.quads[index] = punch_out;
        return Some(accepted);
    }
    None
}

fn validate(
    validator: &mut dyn OverlayCandidateValidator,
    pass: &RenderPass,
    candidate: OverlayCandidate,
    outcome: &mut OverlayOutcome,
) -> Option<OverlayCandidate> {
    let mut list: OverlayCandidateList = vec![primary_plane(pass), candidate];
    outcome.candidates_offered += 1;
    validator.check_overlay_support(&mut list);
    let candidate = list.pop()?;
    candidate.overlay_handled.then_some(candidate)
}

/// The output surface's own plane, always at z-order 0.
fn primary_plane(pass: &RenderPass) -> OverlayCandidate {
    let output = pass.output_rect;
    OverlayCandidate {
        format: BufferFormat::Bgra8888,
        transform: OverlayTransform::None,
        display_rect: output,
        uv_rect: Rect::new(0.0, 0.0, 1.0, 1.0),
        plane_z_order: 0,
        buffer_size: output.size(),
        resource_id: ResourceId(0),
        quad_rect_in_target_space: output,
        clip_rect: Rect::ZERO,
        is_clipped: false,
        use_output_surface_for_resource: true,
        overlay_handled: false,
    }
}

fn is_occluded(in_front: &[DrawQuad], rect: Rect) -> bool {
    in_front.iter().any(|quad| {
        !quad.is_invisible() && !quad.visible_rect_in_target().intersect(rect).is_zero_area()
    })
}

/// Clears the pass damage when a plane above the primary one covers all of
/// it, returning what was cleared.
///
/// Underlays still need their punch-out drawn and never remove damage.
fn remove_damage(pass: &mut RenderPass, display_rect: Rect) -> Rect {
    let damage = pass.damage_rect;
    if damage.intersect(display_rect) != damage {
        return Rect::ZERO;
    }
    pass.damage_rect = Rect::ZERO;
    damage
}

#[cfg(test)]
mod tests {
    use super::*;
    use fresco_core::frame::Material;
    use fresco_core::id::RenderPassId;
    use fresco_core::resource::ResourceFormat;
    use fresco_core::sync::SyncToken;
    use kurbo::Size;

    /// Platform double: accepts candidates at the configured z-orders and
    /// optionally nudges the display rect.
    #[derive(Debug, Default)]
    struct FakePlatform {
        accept_z: Vec<i32>,
        adjust: Option<Rect>,
        calls: usize,
    }

    impl OverlayCandidatesPlatform for FakePlatform {
        fn check_overlay_support(&mut self, candidates: &mut [OverlaySurfaceCandidate]) {
            self.calls += 1;
            for candidate in candidates {
                if self.accept_z.contains(&candidate.plane_z_order) {
                    candidate.overlay_handled = true;
                    if let Some(rect) = self.adjust {
                        candidate.display_rect = rect;
                    }
                }
            }
        }
    }

    fn validator(accept_z: Vec<i32>) -> BrowserCompositorOverlayValidator<FakePlatform> {
        BrowserCompositorOverlayValidator::new(
            FakePlatform {
                accept_z,
                ..FakePlatform::default()
            },
            OverlayConfig::DEFAULT,
        )
    }

    fn resource(id: u32) -> TransferableResource {
        TransferableResource {
            id: ResourceId(id),
            format: ResourceFormat::Bgra8888,
            size: Size::new(200.0, 100.0),
            texture: id,
            sync_token: SyncToken::default(),
            is_overlay_candidate: true,
        }
    }

    fn video_quad(id: u32, rect: Rect) -> DrawQuad {
        DrawQuad::new(
            rect,
            Material::StreamVideo {
                resource: ResourceId(id),
                uv_rect: Rect::new(0.0, 0.0, 1.0, 1.0),
            },
        )
    }

    fn candidate(rect: Rect) -> OverlayCandidate {
        OverlayCandidate::from_draw_quad(&video_quad(1, rect), &[resource(1)])
            .expect("video quad should be eligible")
    }

    #[test]
    fn strategies_are_single_on_top_then_underlay() {
        let validator = validator(vec![]);
        assert_eq!(
            validator.get_strategies(),
            vec![OverlayStrategy::SingleOnTop, OverlayStrategy::Underlay]
        );
        assert_eq!(validator.strategies(), validator.get_strategies().as_slice());
    }

    #[test]
    fn accepted_candidates_keep_display_rect() {
        let mut validator = validator(vec![1]);
        let rect = Rect::new(10.5, 20.25, 110.5, 70.25);
        let mut list = vec![candidate(rect)];
        list[0].plane_z_order = 1;

        validator.check_overlay_support(&mut list);
        assert!(list[0].overlay_handled);
        assert_eq!(list[0].display_rect, rect);
    }

    #[test]
    fn platform_adjustments_are_written_back() {
        let adjusted = Rect::new(0.0, 0.0, 64.0, 64.0);
        let mut validator = BrowserCompositorOverlayValidator::new(
            FakePlatform {
                accept_z: vec![1],
                adjust: Some(adjusted),
                calls: 0,
            },
            OverlayConfig::DEFAULT,
        );
        let mut list = vec![candidate(Rect::new(0.0, 0.0, 50.0, 50.0))];
        list[0].plane_z_order = 1;
        validator.check_overlay_support(&mut list);
        assert!(list[0].overlay_handled);
        assert_eq!(list[0].display_rect, adjusted);
    }

    #[test]
    fn rejected_candidates_are_left_alone() {
        let mut validator = validator(vec![]);
        let rect = Rect::new(0.0, 0.0, 50.0, 50.0);
        let mut list = vec![candidate(rect)];
        validator.check_overlay_support(&mut list);
        assert!(!list[0].overlay_handled);
        assert_eq!(list[0].display_rect, rect);
    }

    #[test]
    fn software_mirror_makes_validation_a_no_op() {
        let mut validator = validator(vec![0, 1, -1]);
        validator.set_software_mirror_mode(true);
        let mut list = vec![candidate(Rect::new(0.0, 0.0, 50.0, 50.0))];
        let before = list.clone();

        validator.check_overlay_support(&mut list);
        assert_eq!(list, before);
        assert!(!list[0].overlay_handled);
        assert_eq!(validator.platform().calls, 0);
    }

    fn pass_with(quads: Vec<DrawQuad>) -> RenderPass {
        let mut pass = RenderPass::new(RenderPassId(1), Rect::new(0.0, 0.0, 400.0, 300.0));
        for quad in quads {
            pass.push_quad(quad);
        }
        pass
    }

    #[test]
    fn single_on_top_promotes_unoccluded_quad() {
        let video = Rect::new(0.0, 0.0, 200.0, 100.0);
        let mut pass = pass_with(vec![
            DrawQuad::solid_color(Rect::new(300.0, 200.0, 400.0, 300.0), [1.0; 4]),
            video_quad(1, video),
        ]);
        pass.damage_rect = Rect::new(10.0, 10.0, 50.0, 50.0);
        let mut validator = validator(vec![1]);
        let mut processor = OverlayProcessor::new(OverlayConfig::DEFAULT);

        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.strategy, Some(OverlayStrategy::SingleOnTop));
        assert_eq!(outcome.promoted.len(), 1);
        assert_eq!(outcome.promoted[0].display_rect, video);
        assert_eq!(pass.quads.len(), 1, "promoted quad leaves the pass");
        assert_eq!(pass.damage_rect, Rect::ZERO, "damage fully covered by the plane");
    }

    #[test]
    fn occluded_quad_falls_back_to_underlay() {
        let video = Rect::new(0.0, 0.0, 200.0, 100.0);
        let mut pass = pass_with(vec![
            DrawQuad::solid_color(Rect::new(50.0, 50.0, 150.0, 150.0), [1.0; 4]),
            video_quad(1, video),
        ]);
        let mut validator = validator(vec![1, -1]);
        let mut processor = OverlayProcessor::new(OverlayConfig::DEFAULT);

        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.strategy, Some(OverlayStrategy::Underlay));
        assert_eq!(outcome.promoted[0].plane_z_order, -1);
        assert_eq!(pass.quads.len(), 2);
        assert!(pass.quads[1].is_invisible(), "video replaced by a punch-out");
        assert_eq!(pass.quads[1].rect, video);
    }

    #[test]
    fn underlay_keeps_damage_for_the_punch_out() {
        let video = Rect::new(0.0, 0.0, 200.0, 100.0);
        let damage = Rect::new(10.0, 10.0, 40.0, 40.0);
        let mut pass = pass_with(vec![
            DrawQuad::solid_color(Rect::new(50.0, 50.0, 150.0, 150.0), [1.0; 4]),
            video_quad(1, video),
        ]);
        pass.damage_rect = damage;
        let mut validator = validator(vec![1, -1]);
        let mut processor = OverlayProcessor::new(OverlayConfig::DEFAULT);

        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.strategy, Some(OverlayStrategy::Underlay));
        assert_eq!(pass.damage_rect, damage, "punch-out must still be drawn");
        assert_eq!(outcome.removed_damage, Rect::ZERO);
    }

    #[test]
    fn partially_covered_damage_is_not_removed() {
        let video = Rect::new(0.0, 0.0, 200.0, 100.0);
        let damage = Rect::new(150.0, 50.0, 300.0, 200.0);
        let mut pass = pass_with(vec![video_quad(1, video)]);
        pass.damage_rect = damage;
        let mut validator = validator(vec![1]);
        let mut processor = OverlayProcessor::new(OverlayConfig::DEFAULT);

        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.strategy, Some(OverlayStrategy::SingleOnTop));
        assert_eq!(pass.damage_rect, damage);
        assert_eq!(outcome.removed_damage, Rect::ZERO);
    }

    #[test]
    fn software_mirror_keeps_every_quad_composited() {
        let mut pass = pass_with(vec![
            DrawQuad::solid_color(Rect::new(50.0, 50.0, 150.0, 150.0), [1.0; 4]),
            video_quad(1, Rect::new(0.0, 0.0, 200.0, 100.0)),
        ]);
        let before = pass.clone();
        let mut validator = validator(vec![0, 1, -1]);
        validator.set_software_mirror_mode(true);
        let mut processor = OverlayProcessor::new(OverlayConfig::DEFAULT);

        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.strategy, None);
        assert!(outcome.promoted.is_empty(), "nothing leaves GL composition");
        assert_eq!(pass, before);
        assert_eq!(validator.platform().calls, 0);
    }

    #[test]
    fn nothing_promoted_when_platform_refuses() {
        let mut pass = pass_with(vec![video_quad(1, Rect::new(0.0, 0.0, 10.0, 10.0))]);
        let before = pass.clone();
        let mut validator = validator(vec![]);
        let mut processor = OverlayProcessor::new(OverlayConfig::DEFAULT);

        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.strategy, None);
        assert_eq!(outcome.candidates_offered, 2);
        assert_eq!(pass, before);
    }

    #[test]
    fn disabled_processor_leaves_pass_untouched() {
        let mut pass = pass_with(vec![video_quad(1, Rect::new(0.0, 0.0, 10.0, 10.0))]);
        let mut validator = validator(vec![1, -1]);
        let mut processor = OverlayProcessor::new(OverlayConfig::disabled());
        let outcome = processor.process(&mut validator, &[resource(1)], &mut pass);
        assert_eq!(outcome.candidates_offered, 0);
        assert_eq!(pass.quads.len(), 1);
    }
}
