//! The canvas: every axis of every plot, the expression scope they share,
//! settings, and the diagnostics collected while finalizing them.

use crate::axis::{Axis, AxisConfig, AxisId, Tick};
use crate::error::{AxisError, Diagnostic, Diagnostics};
use crate::expression::{Expression, Scope, Value};
use crate::link::{self, AxisMap, Propagation};
use crate::settings::CanvasSettings;
use crate::solver::{BoundedSimplexSolver, Equation, Objective, SolveReport};
use crate::ticking::{finalize_axis, TickContext};
use crate::units::Dimensions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// Finalized view of one axis, ready to hand to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSummary {
    pub id: AxisId,
    pub finalized: bool,
    pub min: f64,
    pub max: f64,
    pub log: bool,
    /// Display unit symbol; empty when dimensionless.
    pub unit: String,
    /// Factor converting SI values into display units.
    pub unit_multiplier: f64,
    pub label: Option<String>,
    pub major: Vec<Tick>,
    pub minor: Vec<Tick>,
}

impl AxisSummary {
    fn of(axis: &Axis) -> Self {
        let state = &axis.state;
        Self {
            id: axis.id,
            finalized: state.range_finalized && state.ticks_finalized,
            min: state.min,
            max: state.max,
            log: state.log,
            unit: state.display_unit.symbol.clone(),
            unit_multiplier: state.unit_multiplier(),
            label: state.label.clone(),
            major: state.major.clone(),
            minor: state.minor.clone(),
        }
    }
}

pub struct Canvas {
    settings: CanvasSettings,
    scope: Scope,
    axes: AxisMap,
    diagnostics: Diagnostics,
}

impl Canvas {
    pub fn new(settings: CanvasSettings) -> anyhow::Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            scope: Scope::with_si_units(),
            axes: AxisMap::new(),
            diagnostics: Diagnostics::new(),
        })
    }

    pub fn settings(&self) -> &CanvasSettings {
        &self.settings
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Defines a variable that format rules, link mappings and equations
    /// can refer to.
    pub fn define(&mut self, name: &str, value: Value) {
        self.scope.define(name, value);
    }

    /// Declares an axis, replacing any previous declaration with the same id.
    pub fn add_axis(&mut self, id: AxisId, config: AxisConfig) -> Result<(), AxisError> {
        let axis = Axis::new(id, config, &mut self.scope)?;
        self.axes.insert(id, axis);
        Ok(())
    }

    pub fn axis(&self, id: AxisId) -> Option<&Axis> {
        self.axes.get(&id)
    }

    pub fn axes(&self) -> impl Iterator<Item = &Axis> {
        self.axes.values()
    }

    /// Widens the usage of an axis to cover `values`, given in SI units of
    /// `unit`. Non-finite values, and non-positive values on logarithmic
    /// axes, are ignored. Has no effect on an axis that is already finalized
    /// until [`Canvas::reset`] is called.
    pub fn record_usage(
        &mut self,
        id: AxisId,
        values: &[f64],
        unit: Option<Dimensions>,
    ) -> Result<(), AxisError> {
        let Some(axis) = self.axes.get_mut(&id) else {
            return Err(AxisError::MissingAxis {
                what: id.to_string(),
            });
        };
        if let (Some(existing), Some(new)) = (axis.usage.unit, unit) {
            if !existing.matches(&new) {
                return Err(AxisError::unit_mismatch(
                    format!("data plotted against {id}"),
                    new,
                    existing,
                ));
            }
        }
        if unit.is_some() {
            axis.usage.unit = unit;
        }
        let log = axis.config.log;
        for &value in values {
            if !value.is_finite() || (log && value <= 0.0) {
                continue;
            }
            axis.usage.include(value);
        }
        Ok(())
    }

    /// Finalizes the range and ticks of every axis. Failures are local to
    /// the axis or link concerned and end up in the diagnostics; every axis
    /// is attempted. Finalized axes are left alone, so calling this twice
    /// changes nothing.
    pub fn finalize(&mut self) {
        let ids: Vec<AxisId> = self.axes.keys().copied().collect();
        let mut ctx = TickContext::new(&mut self.scope, &self.settings, &mut self.diagnostics);
        let mut reported = BTreeSet::new();
        let mut report = |ctx: &mut TickContext<'_>, err: AxisError| {
            if reported.insert(err.to_string()) {
                ctx.diagnostics.report(&err);
            }
        };

        for &id in &ids {
            let linked = self.axes.get(&id).is_some_and(|a| a.link().is_some());
            if linked {
                if let Err(err) = link::forward_propagate(&mut self.axes, id, Propagation::HardLimits, &mut ctx) {
                    report(&mut ctx, err);
                }
            }
        }
        for &id in &ids {
            let carries = self
                .axes
                .get(&id)
                .is_some_and(|a| a.link().is_some() && !a.usage.is_empty() && !a.state.range_finalized);
            if carries {
                if let Err(err) = link::back_propagate(&mut self.axes, id, &mut ctx) {
                    report(&mut ctx, err);
                }
            }
        }
        for &id in &ids {
            let range_pending = self.axes.get(&id).is_some_and(|a| !a.state.range_finalized);
            if range_pending {
                if let Err(err) = link::forward_propagate(&mut self.axes, id, Propagation::Range, &mut ctx) {
                    report(&mut ctx, err);
                }
            }
            if let Some(axis) = self.axes.get_mut(&id) {
                if !axis.state.ticks_finalized {
                    if let Err(err) = finalize_axis(axis, None, &mut ctx) {
                        report(&mut ctx, err);
                    }
                }
            }
        }
        debug!(axes = ids.len(), "canvas finalized");
    }

    /// Clears every finalized result. Recorded usage is kept, including usage
    /// carried in from linked axes.
    pub fn reset(&mut self) {
        for axis in self.axes.values_mut() {
            axis.reset();
        }
    }

    pub fn summaries(&self) -> Vec<AxisSummary> {
        self.axes.values().map(AxisSummary::of).collect()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn drain_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.drain()
    }

    /// Solves `equations` (each `left = right`) for the `free` variables,
    /// leaving the solution in the scope.
    pub fn solve(&mut self, equations: &[&str], free: &[&str]) -> Result<SolveReport, AxisError> {
        let equations = equations
            .iter()
            .map(|source| Equation::parse(source, &mut self.scope))
            .collect::<Result<Vec<_>, _>>()?;
        self.run_solver(&Objective::Solve(equations), free)
    }

    pub fn minimise(&mut self, expression: &str, free: &[&str]) -> Result<SolveReport, AxisError> {
        let expr = Expression::compile(expression, &mut self.scope)?;
        self.run_solver(&Objective::Minimise(expr), free)
    }

    pub fn maximise(&mut self, expression: &str, free: &[&str]) -> Result<SolveReport, AxisError> {
        let expr = Expression::compile(expression, &mut self.scope)?;
        self.run_solver(&Objective::Maximise(expr), free)
    }

    fn run_solver(&mut self, objective: &Objective, free: &[&str]) -> Result<SolveReport, AxisError> {
        let solver = BoundedSimplexSolver::new(self.settings.solver);
        let report = solver.solve(objective, free, &mut self.scope)?;
        if let Some(warning) = &report.warning {
            self.diagnostics.warn(warning.clone());
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisLink, Direction};
    use crate::error::Severity;
    use crate::units::METRE;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn canvas() -> Canvas {
        init_tracing();
        Canvas::new(CanvasSettings::default()).expect("default settings are valid")
    }

    fn x(plot: usize) -> AxisId {
        AxisId::new(plot, Direction::X, 1)
    }

    fn tick_values(summary: &AxisSummary) -> Vec<f64> {
        summary
            .major
            .iter()
            .map(|t| summary.min + t.position * (summary.max - summary.min))
            .collect()
    }

    #[test]
    fn linear_usage_gets_twenty_unit_majors() {
        let mut c = canvas();
        c.add_axis(x(0), AxisConfig::default()).expect("axis");
        c.record_usage(x(0), &[0.0, 12.5, 97.0], None).expect("usage");
        c.finalize();

        let summary = &c.summaries()[0];
        assert!(summary.finalized);
        assert_eq!((summary.min, summary.max), (0.0, 100.0));
        let values = tick_values(summary);
        assert_eq!(values.len(), 6, "{values:?}");
        for (value, expected) in values.iter().zip([0.0, 20.0, 40.0, 60.0, 80.0, 100.0]) {
            assert!((value - expected).abs() < 1e-9, "{values:?}");
        }
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn log_usage_gets_decade_majors() {
        let mut c = canvas();
        let config = AxisConfig {
            log: true,
            ..AxisConfig::default()
        };
        c.add_axis(x(0), config).expect("axis");
        c.record_usage(x(0), &[1.0, 9500.0, -4.0, f64::NAN], None).expect("usage");
        c.finalize();

        let axis = c.axis(x(0)).expect("axis");
        assert!(axis.state.min > 0.0 && axis.state.min < axis.state.max);
        let values: Vec<f64> = axis
            .state
            .major
            .iter()
            .map(|t| axis.state.inverse_position(t.position))
            .collect();
        for decade in [1.0, 10.0, 100.0, 1000.0, 10000.0] {
            assert!(
                values.iter().any(|v| (v / decade - 1.0).abs() < 1e-9),
                "{decade} missing from {values:?}"
            );
        }
    }

    #[test]
    fn linked_axes_on_different_plots_agree() {
        let mut c = canvas();
        c.add_axis(x(0), AxisConfig::default()).expect("axis");
        let linked = AxisConfig {
            link: Some(AxisLink {
                target: x(0),
                using: None,
            }),
            ..AxisConfig::default()
        };
        c.add_axis(x(1), linked).expect("axis");
        let metres = Some(Dimensions::base(METRE));
        c.record_usage(x(0), &[3.0, 40.0], metres).expect("usage");
        c.record_usage(x(1), &[-12.0, 8.0], metres).expect("usage");
        c.finalize();

        let a = c.axis(x(0)).expect("axis").state.clone();
        let b = c.axis(x(1)).expect("axis").state.clone();
        assert_eq!((a.min, a.max), (b.min, b.max));
        assert_eq!(a.data_unit, b.data_unit);
        assert_eq!(a.data_unit, Some(Dimensions::base(METRE)));
        // The range covers what was plotted on both plots.
        assert!(a.min <= -12.0 && a.max >= 40.0, "[{}, {}]", a.min, a.max);
        assert_eq!(a.major.len(), b.major.len());
    }

    #[test]
    fn single_value_is_padded() {
        let mut c = canvas();
        c.add_axis(x(0), AxisConfig::default()).expect("axis");
        c.record_usage(x(0), &[5.0, 5.0], None).expect("usage");
        c.finalize();
        let summary = &c.summaries()[0];
        assert!(summary.min < summary.max);
        assert!(summary.min <= 5.0 && summary.max >= 5.0);
        assert!(!summary.major.is_empty());
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut c = canvas();
        c.add_axis(x(0), AxisConfig::default()).expect("axis");
        c.add_axis(
            AxisId::new(0, Direction::Y, 1),
            AxisConfig {
                log: true,
                format: Some("'%.0f' % (y)".to_string()),
                ..AxisConfig::default()
            },
        )
        .expect("axis");
        c.record_usage(x(0), &[-3.3, 41.0], None).expect("usage");
        c.record_usage(AxisId::new(0, Direction::Y, 1), &[2.0, 700.0], None)
            .expect("usage");
        c.finalize();
        let first = c.summaries();
        c.finalize();
        let second = c.summaries();
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.min.to_bits(), b.min.to_bits());
            assert_eq!(a.max.to_bits(), b.max.to_bits());
            assert_eq!(a.major, b.major);
            assert_eq!(a.minor, b.minor);
        }
    }

    #[test]
    fn reset_picks_up_new_usage() {
        let mut c = canvas();
        c.add_axis(x(0), AxisConfig::default()).expect("axis");
        c.record_usage(x(0), &[0.0, 9.0], None).expect("usage");
        c.finalize();
        c.record_usage(x(0), &[95.0], None).expect("usage");
        c.finalize();
        assert_eq!(c.summaries()[0].max, 9.0);
        c.reset();
        c.finalize();
        assert_eq!(c.summaries()[0].max, 100.0);
    }

    #[test]
    fn link_cycle_does_not_stop_other_axes() {
        let mut c = canvas();
        let link_to = |target| AxisConfig {
            link: Some(AxisLink {
                target,
                using: None,
            }),
            ..AxisConfig::default()
        };
        c.add_axis(x(0), link_to(x(1))).expect("axis");
        c.add_axis(x(1), link_to(x(0))).expect("axis");
        c.add_axis(x(2), AxisConfig::default()).expect("axis");
        c.record_usage(x(0), &[1.0, 2.0], None).expect("usage");
        c.finalize();

        let entries = c.drain_diagnostics();
        assert!(
            entries
                .iter()
                .any(|d| d.severity == Severity::Error && d.message.contains("cycle")),
            "{entries:?}"
        );
        assert!(c.summaries().iter().all(|s| s.finalized));
        assert!(c.diagnostics().is_empty());
    }

    #[test]
    fn out_of_memory_is_reported_against_the_axis() {
        let mut c = canvas();
        let huge = AxisConfig {
            format: Some("'%.1f' % (x)".to_string()),
            length: Some(1e300),
            ..AxisConfig::default()
        };
        c.add_axis(x(0), huge).expect("axis");
        c.add_axis(x(1), AxisConfig::default()).expect("axis");
        c.record_usage(x(0), &[0.0, 1.0], None).expect("usage");
        c.record_usage(x(1), &[0.0, 1.0], None).expect("usage");
        c.finalize();

        let entries = c.drain_diagnostics();
        let oom: Vec<_> = entries
            .iter()
            .filter(|d| d.message.starts_with("out of memory"))
            .collect();
        assert_eq!(oom.len(), 1, "{entries:?}");
        assert_eq!(oom[0].severity, Severity::Error);

        let summaries = c.summaries();
        assert!(!summaries[0].finalized);
        assert!(summaries[0].major.is_empty() && summaries[0].minor.is_empty());
        assert!(summaries[1].finalized && !summaries[1].major.is_empty());
    }

    #[test]
    fn usage_in_conflicting_units_is_rejected() {
        let mut c = canvas();
        c.add_axis(x(0), AxisConfig::default()).expect("axis");
        c.record_usage(x(0), &[1.0], Some(Dimensions::base(METRE)))
            .expect("usage");
        let err = c
            .record_usage(x(0), &[2.0], Some(Dimensions::dimensionless()))
            .expect_err("units conflict");
        assert!(matches!(err, AxisError::UnitMismatch { .. }), "unexpected error: {err}");
        let err = c.record_usage(x(4), &[2.0], None).expect_err("no such axis");
        assert!(matches!(err, AxisError::MissingAxis { .. }), "unexpected error: {err}");
    }

    #[test]
    fn minimise_leaves_the_answer_in_scope() {
        let mut c = canvas();
        c.define("x", Value::real(1.0));
        let report = c.minimise("(x - 3)^2", &["x"]).expect("converges");
        let x = c.scope().get("x").and_then(|v| v.as_number()).expect("x defined").re();
        assert!((x - 3.0).abs() < 1e-6, "x = {x}");
        assert!(report.outer_iterations <= 20);
    }

    #[test]
    fn invalid_settings_are_refused() {
        let settings = CanvasSettings {
            significant_figures: 0,
            ..CanvasSettings::default()
        };
        assert!(Canvas::new(settings).is_err());
    }
}
