//! Canvas-wide configuration.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Physical tick spacing budget. Ticks closer than these distances on the
/// page would make labels collide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TickDensity {
    /// Minimum distance between major ticks, in metres.
    pub major_spacing: f64,
    /// Minimum distance between minor ticks, in metres.
    pub minor_spacing: f64,
    /// Length assumed for axes that do not declare one, in metres.
    pub default_axis_length: f64,
}

impl Default for TickDensity {
    fn default() -> Self {
        Self {
            major_spacing: 0.015,
            minor_spacing: 0.004,
            default_axis_length: 0.08,
        }
    }
}

impl TickDensity {
    pub fn majors_that_fit(&self, length: f64) -> f64 {
        length / self.major_spacing
    }

    pub fn minors_that_fit(&self, length: f64) -> f64 {
        length / self.minor_spacing
    }
}

/// How the display unit is appended to an axis label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisUnitStyle {
    /// `label ($u$)`
    Bracketed,
    /// `label / $u$`
    Ratio,
    /// `label [$u$]`
    Squared,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Search real and imaginary parts of each free variable.
    pub complex: bool,
    /// Initial simplex step as a fraction of each coordinate.
    pub initial_step: f64,
    pub min_inner_checks: usize,
    pub max_inner_checks: usize,
    pub min_outer_passes: usize,
    pub max_outer_passes: usize,
    pub max_dimensions: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            complex: false,
            initial_step: 0.05,
            min_inner_checks: 10,
            max_inner_checks: 50,
            min_outer_passes: 4,
            max_outer_passes: 20,
            max_dimensions: 16,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_step > 0.0 && self.initial_step.is_finite()) {
            bail!("initial_step must be positive.");
        }
        if self.max_inner_checks == 0 || self.max_outer_passes == 0 {
            bail!("iteration caps must be greater than zero.");
        }
        if self.min_inner_checks > self.max_inner_checks {
            bail!("min_inner_checks must not exceed max_inner_checks.");
        }
        if self.min_outer_passes > self.max_outer_passes {
            bail!("min_outer_passes must not exceed max_outer_passes.");
        }
        if self.max_dimensions == 0 {
            bail!("max_dimensions must be greater than zero.");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanvasSettings {
    pub significant_figures: usize,
    pub unit_style: AxisUnitStyle,
    pub density: TickDensity,
    pub solver: SolverSettings,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        Self {
            significant_figures: 8,
            unit_style: AxisUnitStyle::Ratio,
            density: TickDensity::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl CanvasSettings {
    pub fn validate(&self) -> Result<()> {
        if self.significant_figures == 0 || self.significant_figures > 17 {
            bail!("significant_figures must lie between 1 and 17.");
        }
        let d = &self.density;
        if !(d.major_spacing > 0.0 && d.minor_spacing > 0.0) {
            bail!("tick spacings must be positive.");
        }
        if !(d.default_axis_length > 0.0 && d.default_axis_length.is_finite()) {
            bail!("default_axis_length must be positive.");
        }
        self.solver.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_density_fits_expected_tick_counts() {
        let density = TickDensity::default();
        let majors = density.majors_that_fit(density.default_axis_length);
        let minors = density.minors_that_fit(density.default_axis_length);
        assert!((majors - 5.333333).abs() < 1e-5, "majors {majors}");
        assert!((minors - 20.0).abs() < 1e-9, "minors {minors}");
    }

    #[test]
    fn validation_rejects_bad_settings() {
        assert!(CanvasSettings::default().validate().is_ok());

        let mut settings = CanvasSettings::default();
        settings.solver.max_outer_passes = 0;
        let err = settings.validate().expect_err("zero passes should fail");
        assert!(err.to_string().contains("greater than zero"), "unexpected error: {err}");

        let mut settings = CanvasSettings::default();
        settings.significant_figures = 0;
        assert!(settings.validate().is_err());
    }
}
