//! Ambient light estimation from camera exposure parameters.
//!
//! Uses the reflected-light-meter relation `L = (K · N²) / (t · S)` with the
//! effective aperture number of the front camera, then converts luminance to
//! illuminance via `E = (π / ρ) · L` under an assumed scene reflectance. The
//! result is smoothed with a fixed-alpha EMA so downstream gating does not
//! flicker frame to frame.

use serde::{Deserialize, Serialize};

/// Light estimator configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LightConfig {
    /// Reflected-light meter calibration constant.
    pub meter_k: f32,
    /// Effective aperture number of the sensor.
    pub aperture_n: f32,
    /// Assumed scene reflectance for the luminance-to-illuminance step.
    pub reflectance: f32,
    /// EMA smoothing factor in (0, 1].
    pub smoothing: f32,
    /// Minimum illuminance (lux) required before capture may proceed.
    pub min_lux: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            meter_k: 12.5,
            aperture_n: 1.8,
            reflectance: 0.18,
            smoothing: 0.25,
            min_lux: 80.0,
        }
    }
}

/// Exponentially smoothed illuminance estimate.
#[derive(Debug, Clone)]
pub struct LuxEstimator {
    cfg: LightConfig,
    ema: Option<f32>,
}

impl LuxEstimator {
    pub fn new(cfg: LightConfig) -> Self {
        Self { cfg, ema: None }
    }

    /// Feed one (exposure duration, sensor gain) pair.
    ///
    /// Degenerate inputs (non-positive or non-finite) are rejected without
    /// touching the smoothed estimate; propagating them would turn the EMA
    /// into NaN/Inf permanently.
    pub fn update(&mut self, exposure_s: f32, gain_iso: f32) -> Option<f32> {
        if !(exposure_s > 0.0 && exposure_s.is_finite() && gain_iso > 0.0 && gain_iso.is_finite())
        {
            log::trace!(
                "rejecting degenerate exposure sample t={} s={}",
                exposure_s,
                gain_iso
            );
            return self.ema;
        }

        let c = &self.cfg;
        let luminance = (c.meter_k * c.aperture_n * c.aperture_n) / (exposure_s * gain_iso);
        let lux = (std::f32::consts::PI / c.reflectance) * luminance;

        let a = c.smoothing;
        self.ema = Some(match self.ema {
            Some(prev) => prev * (1.0 - a) + lux * a,
            None => lux,
        });
        self.ema
    }

    /// Current smoothed illuminance, if any sample has been accepted.
    pub fn lux(&self) -> Option<f32> {
        self.ema
    }

    /// Whether capture is permitted under the current estimate.
    pub fn is_sufficient(&self) -> bool {
        self.ema.map(|e| e >= self.cfg.min_lux).unwrap_or(false)
    }

    pub fn reset(&mut self) {
        self.ema = None;
    }
}
