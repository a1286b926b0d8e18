//! Render resolution policy
//!
//! Pages are rendered once per document at a scale derived from the device
//! pixel ratio. The ratio is clamped so a high-density display cannot blow up
//! the memory held by the cache, and the scale stays fixed for the whole
//! session so cache keys never depend on transient zoom.

/// Bounded render scale for one session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderScale {
    /// Points-to-pixels multiplier at a device pixel ratio of 1
    pub base: f32,
    /// Largest device pixel ratio honoured
    pub max_dpr: f32,
}

impl Default for RenderScale {
    fn default() -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            max_dpr: Self::DEFAULT_MAX_DPR,
        }
    }
}

impl RenderScale {
    pub const DEFAULT_BASE: f32 = 1.6;
    pub const DEFAULT_MAX_DPR: f32 = 2.0;

    #[must_use]
    pub fn new(base: f32, max_dpr: f32) -> Self {
        Self {
            base: Self::sanitize(base, Self::DEFAULT_BASE),
            max_dpr: Self::sanitize(max_dpr, Self::DEFAULT_MAX_DPR).max(1.0),
        }
    }

    /// Clamp the device pixel ratio to `[1, max_dpr]`, handling NaN/Inf
    #[must_use]
    pub fn clamp_dpr(&self, dpr: f32) -> f32 {
        if !dpr.is_finite() {
            1.0
        } else {
            dpr.clamp(1.0, self.max_dpr)
        }
    }

    /// Final scale handed to the renderer
    #[must_use]
    pub fn for_device_pixel_ratio(&self, dpr: f32) -> f32 {
        self.base * self.clamp_dpr(dpr)
    }

    fn sanitize(value: f32, fallback: f32) -> f32 {
        if value.is_finite() && value > 0.0 {
            value
        } else {
            fallback
        }
    }
}
