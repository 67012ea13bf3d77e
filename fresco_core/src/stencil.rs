// Copyright 2026 the Fresco Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GL stencil state snapshots.
//!
//! Some embedders (notably app-driven GL on Android) draw with the stencil
//! test enabled and expect the compositor to clip to it. The embedder's GL
//! state is captured into a [`StencilState`] before the compositor draws, and
//! reapplied every present.

/// Stencil comparison function.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilFunc {
    /// Never passes.
    Never,
    /// Passes if `ref < stencil`.
    Less,
    /// Passes if `ref <= stencil`.
    LessEqual,
    /// Passes if `ref > stencil`.
    Greater,
    /// Passes if `ref >= stencil`.
    GreaterEqual,
    /// Passes if `ref == stencil`.
    Equal,
    /// Passes if `ref != stencil`.
    NotEqual,
    /// Always passes.
    #[default]
    Always,
}

/// Action taken on the stored stencil value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    /// Keep the current value.
    #[default]
    Keep,
    /// Set to zero.
    Zero,
    /// Replace with the reference value.
    Replace,
    /// Increment, clamping at the maximum.
    Increment,
    /// Increment, wrapping to zero.
    IncrementWrap,
    /// Decrement, clamping at zero.
    Decrement,
    /// Decrement, wrapping to the maximum.
    DecrementWrap,
    /// Bitwise invert.
    Invert,
}

/// Stencil function and operations for one face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilFace {
    /// Comparison function.
    pub func: StencilFunc,
    /// Reference value.
    pub reference: i32,
    /// Mask applied to both reference and stored value before comparing.
    pub mask: u32,
    /// Action when the stencil test fails.
    pub fail_op: StencilOp,
    /// Action when the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOp,
    /// Action when both tests pass.
    pub pass_op: StencilOp,
    /// Bits of the stencil buffer that may be written.
    pub write_mask: u32,
}

impl Default for StencilFace {
    fn default() -> Self {
        Self {
            func: StencilFunc::Always,
            reference: 0,
            mask: u32::MAX,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            write_mask: u32::MAX,
        }
    }
}

/// Full stencil state of a GL context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct StencilState {
    /// Whether `GL_STENCIL_TEST` is enabled.
    pub stencil_test_enabled: bool,
    /// Front-facing state.
    pub front: StencilFace,
    /// Back-facing state.
    pub back: StencilFace,
}

impl StencilState {
    /// State with the stencil test disabled and GL defaults everywhere else.
    pub const DISABLED: Self = Self {
        stencil_test_enabled: false,
        front: StencilFace {
            func: StencilFunc::Always,
            reference: 0,
            mask: u32::MAX,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            write_mask: u32::MAX,
        },
        back: StencilFace {
            func: StencilFunc::Always,
            reference: 0,
            mask: u32::MAX,
            fail_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            write_mask: u32::MAX,
        },
    };

    /// Returns a copy with the stencil test toggled.
    #[must_use]
    pub const fn with_test_enabled(mut self, enabled: bool) -> Self {
        self.stencil_test_enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_constant_matches_default() {
        assert_eq!(StencilState::DISABLED, StencilState::default());
    }

    #[test]
    fn with_test_enabled_keeps_faces() {
        let mut state = StencilState::default();
        state.front.func = StencilFunc::Equal;
        let enabled = state.with_test_enabled(true);
        assert!(enabled.stencil_test_enabled);
        assert_eq!(enabled.front.func, StencilFunc::Equal);
    }
}
