//! Range resolution: turns hard limits and observed usage into a finalized
//! `[min, max]` and settles the data and display units.

use crate::axis::Axis;
use crate::error::{AxisError, Diagnostics};
use crate::units::{Dimensions, DisplayUnit};
use tracing::debug;

/// Smallest bound a logarithmic axis is allowed to reach.
pub const LOG_FLOOR: f64 = 1e-10;

/// Relative separation below which a range counts as collapsed.
const DEGENERATE: f64 = 1e-14;

/// Finalizes the range of `axis` unless that has already happened, and
/// always re-derives its data and display units. Idempotent.
pub fn finalize_range(axis: &mut Axis, diagnostics: &mut Diagnostics) -> Result<(), AxisError> {
    let fresh = !axis.state.range_finalized;
    if fresh {
        if let (Some(hard), Some(used)) = (axis.hard.unit, axis.usage.unit) {
            if !hard.matches(&used) {
                return Err(AxisError::unit_mismatch(
                    format!("range of {}", axis.id),
                    used,
                    hard,
                ));
            }
        }
        let (min, max) = initial_bounds(axis, diagnostics);
        axis.state.log = axis.config.log;
        axis.state.min = min;
        axis.state.max = max;
    }

    settle_units(axis);

    if fresh {
        round_outward(axis);
        debug!(
            axis = %axis.id,
            usage_min = ?axis.usage.min,
            usage_max = ?axis.usage.max,
            min = axis.state.min,
            max = axis.state.max,
            "determined axis range"
        );
        if axis.config.reversed {
            std::mem::swap(&mut axis.state.min, &mut axis.state.max);
        }
        axis.state.range_finalized = true;
    }
    Ok(())
}

/// Bounds before rounding: hard limits, then usage, then defaults, with
/// log-axis clamping and degenerate-range padding applied.
fn initial_bounds(axis: &Axis, diagnostics: &mut Diagnostics) -> (f64, f64) {
    let log = axis.config.log;
    let mut min = axis.hard.min.or(axis.usage.min);
    let mut max = axis.hard.max.or(axis.usage.max);

    // Clamp before deriving a missing bound from the other one.
    if log {
        for bound in [max.as_mut(), min.as_mut()].into_iter().flatten() {
            if *bound <= 1e-200 {
                *bound = LOG_FLOOR;
                diagnostics.warn(format!(
                    "range for logarithmic {} set below zero; defaulting to {LOG_FLOOR:e}",
                    axis.id
                ));
            }
        }
    }

    let (mut min, mut max) = match (min, max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, if log { lo * 100.0 } else { lo + 20.0 }),
        (None, Some(hi)) => (if log { hi / 100.0 } else { hi - 20.0 }, hi),
        (None, None) if log => (1.0, 100.0),
        (None, None) => (0.0, 10.0),
    };

    let spread = (min - max).abs();
    if spread <= (DEGENERATE * min).abs() || spread <= (DEGENERATE * max).abs() {
        if axis.hard.both().is_some() {
            diagnostics.report(&AxisError::degenerate(format!(
                "specified minimum and maximum of {} are equal; reverting to alternative limits",
                axis.id
            )));
        }
        if log {
            if min > 1e-300 {
                min /= 10.0;
            }
            if max < 1e300 {
                max *= 10.0;
            }
        } else {
            let step = (1e-3 * min.abs()).max(1.0);
            min -= step;
            max += step;
        }
    }
    (min, max)
}

/// Fixes the data unit if it is still open and picks the display unit.
pub(crate) fn settle_units(axis: &mut Axis) {
    let dims: Dimensions = axis
        .state
        .data_unit
        .or(axis.usage.unit)
        .or(axis.hard.unit)
        .unwrap_or_default();
    axis.state.data_unit = Some(dims);

    let mut central = if axis.format.is_none() {
        axis.state.inverse_position(0.5)
    } else {
        1.0
    };
    if central == 0.0 {
        central = axis.state.inverse_position(0.25);
    }
    axis.state.display_unit =
        DisplayUnit::choose(&dims, central, axis.config.display_unit.as_ref());
}

/// Rounds bounds that were not hard-set outward to a round number of display
/// units.
fn round_outward(axis: &mut Axis) {
    let log = axis.state.log;
    let multiplier = axis.state.unit_multiplier();
    let mut lo = axis.state.min * multiplier;
    let mut hi = axis.state.max * multiplier;
    if log {
        lo = lo.log10();
        hi = hi.log10();
    }
    let step = 10f64.powf(((hi - lo).abs() / 5.0).log10().floor());
    lo = (lo / step).floor() * step;
    hi = (hi / step).ceil() * step;
    if log {
        lo = 10f64.powf(lo);
        hi = 10f64.powf(hi);
    }
    lo /= multiplier;
    hi /= multiplier;

    let usable = |v: f64| v.is_finite() && (!log || v > 1e-300);
    if axis.hard.min.is_none() && usable(lo) {
        axis.state.min = lo;
    }
    if axis.hard.max.is_none() && usable(hi) {
        axis.state.max = hi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisConfig, AxisId, Direction};
    use crate::error::Severity;
    use crate::expression::Scope;
    use crate::units::{PreferredUnit, METRE, SECOND};

    fn axis(config: AxisConfig) -> Axis {
        let mut scope = Scope::new();
        Axis::new(AxisId::new(0, Direction::X, 1), config, &mut scope).expect("valid axis")
    }

    fn resolve(axis: &mut Axis) -> (f64, f64, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        finalize_range(axis, &mut diagnostics).expect("range resolves");
        (axis.state.min, axis.state.max, diagnostics)
    }

    #[test]
    fn usage_is_rounded_outward() {
        let mut a = axis(AxisConfig::default());
        a.usage.include(0.0);
        a.usage.include(97.0);
        let (min, max, diagnostics) = resolve(&mut a);
        assert_eq!((min, max), (0.0, 100.0));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn hard_limits_are_used_verbatim() {
        let mut a = axis(AxisConfig {
            hard_min: Some(0.13),
            hard_max: Some(9.71),
            ..AxisConfig::default()
        });
        a.usage.include(-100.0);
        assert_eq!(resolve(&mut a).0, 0.13);
        assert_eq!(a.state.max, 9.71);
    }

    #[test]
    fn defaults_without_any_information() {
        let (min, max, _) = resolve(&mut axis(AxisConfig::default()));
        assert_eq!((min, max), (0.0, 10.0));
        let mut log = axis(AxisConfig {
            log: true,
            ..AxisConfig::default()
        });
        let (min, max, _) = resolve(&mut log);
        assert!((min - 1.0).abs() < 1e-12 && (max - 100.0).abs() < 1e-9, "[{min}, {max}]");
    }

    #[test]
    fn single_bound_gets_a_margin() {
        let mut a = axis(AxisConfig {
            hard_min: Some(3.0),
            ..AxisConfig::default()
        });
        let (min, max, _) = resolve(&mut a);
        assert_eq!((min, max), (3.0, 23.0));
    }

    #[test]
    fn single_point_is_padded() {
        let mut a = axis(AxisConfig::default());
        a.usage.include(5.0);
        let (min, max, _) = resolve(&mut a);
        assert!(min < max);
        assert!((min - 4.0).abs() < 1e-12 && (max - 6.0).abs() < 1e-12, "[{min}, {max}]");

        let mut log = axis(AxisConfig {
            log: true,
            ..AxisConfig::default()
        });
        log.usage.include(5.0);
        let (min, max, _) = resolve(&mut log);
        assert!(min > 0.0 && min < max, "[{min}, {max}]");
    }

    #[test]
    fn equal_hard_limits_warn_and_pad() {
        let mut a = axis(AxisConfig {
            hard_min: Some(2.0),
            hard_max: Some(2.0),
            ..AxisConfig::default()
        });
        let (min, max, diagnostics) = resolve(&mut a);
        assert_eq!((min, max), (1.0, 3.0));
        assert_eq!(diagnostics.entries().len(), 1);
        assert_eq!(diagnostics.entries()[0].severity, Severity::Warning);
    }

    #[test]
    fn log_axis_clamps_non_positive_bounds() {
        let mut a = axis(AxisConfig {
            log: true,
            hard_min: Some(-5.0),
            hard_max: Some(1000.0),
            ..AxisConfig::default()
        });
        let (min, max, diagnostics) = resolve(&mut a);
        assert_eq!(min, LOG_FLOOR);
        assert_eq!(max, 1000.0);
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn log_axis_derives_the_open_bound_from_the_clamped_one() {
        let mut a = axis(AxisConfig {
            log: true,
            hard_max: Some(-5.0),
            ..AxisConfig::default()
        });
        let (min, max, diagnostics) = resolve(&mut a);
        assert_eq!(max, LOG_FLOOR);
        assert!((min / 1e-12 - 1.0).abs() < 0.3, "min {min}");
        assert_eq!(diagnostics.entries().len(), 1);
    }

    #[test]
    fn log_usage_rounds_to_whole_decades() {
        let mut a = axis(AxisConfig {
            log: true,
            ..AxisConfig::default()
        });
        a.usage.include(1.0);
        a.usage.include(9500.0);
        let (min, max, _) = resolve(&mut a);
        assert!((min - 1.0).abs() < 1e-12, "min {min}");
        assert!((max - 10000.0).abs() < 1e-8, "max {max}");
    }

    #[test]
    fn reversed_axis_swaps_bounds() {
        let mut a = axis(AxisConfig {
            reversed: true,
            ..AxisConfig::default()
        });
        a.usage.include(0.0);
        a.usage.include(97.0);
        assert_eq!(resolve(&mut a).0, 100.0);
        assert_eq!(a.state.max, 0.0);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut a = axis(AxisConfig::default());
        a.usage.include(-3.3);
        a.usage.include(41.0);
        let first = resolve(&mut a);
        a.usage.include(1000.0);
        let second = resolve(&mut a);
        assert_eq!(first.0.to_bits(), second.0.to_bits());
        assert_eq!(first.1.to_bits(), second.1.to_bits());
    }

    #[test]
    fn rounding_happens_in_display_units() {
        let mut a = axis(AxisConfig {
            display_unit: Some(PreferredUnit {
                symbol: "km".to_string(),
                scale: 1e3,
                dims: Dimensions::base(METRE),
            }),
            ..AxisConfig::default()
        });
        a.usage.include(1234.0);
        a.usage.include(8765.0);
        a.usage.unit = Some(Dimensions::base(METRE));
        let (min, max, _) = resolve(&mut a);
        assert!((min - 1000.0).abs() < 1e-6 && (max - 9000.0).abs() < 1e-6, "[{min}, {max}]");
        assert_eq!(a.state.display_unit.symbol, "km");
    }

    #[test]
    fn conflicting_hard_and_data_units_fail() {
        let mut a = axis(AxisConfig {
            hard_unit: Some(Dimensions::base(SECOND)),
            ..AxisConfig::default()
        });
        a.usage.unit = Some(Dimensions::base(METRE));
        let err = finalize_range(&mut a, &mut Diagnostics::new()).expect_err("units conflict");
        assert!(matches!(err, AxisError::UnitMismatch { .. }), "unexpected error: {err}");
        assert!(!a.state.range_finalized);
    }
}
