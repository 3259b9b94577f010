//! Round-number ticking for plain axes: majors every 1, 2, 2.5 or 5 times a
//! power of ten (or every few decades on log axes), minors that subdivide
//! them, and two fallbacks for when that is impossible.

use crate::axis::{Axis, Tick};
use crate::catalog::{factorise, log_in_base, MAX_FACTORS};
use crate::label::TickLabeller;
use crate::ticking::TickContext;
use tracing::debug;

/// Most ticks placed on any axis.
pub const TICKS_MAXIMUM: usize = 256;

#[derive(Debug, Clone, PartialEq)]
struct Scheme {
    mantissas: Vec<u32>,
    separation: f64,
}

/// Mantissa sets for log axes: 1; 1, 3; 1, 2, 5; ... until two mantissas
/// round to the same integer, then every integer below the base.
fn log_schemes(base: u32, schemes: &mut Vec<Scheme>) {
    for divisor in 1u32.. {
        if schemes.len() > TICKS_MAXIMUM {
            return;
        }
        let mantissas: Vec<u32> = (0..divisor)
            .map(|i| f64::from(base).powf(f64::from(i) / f64::from(divisor)).round() as u32)
            .collect();
        if mantissas.windows(2).any(|w| w[0] == w[1]) {
            break;
        }
        schemes.push(Scheme {
            mantissas,
            separation: 1.0,
        });
    }
    if schemes.len() < TICKS_MAXIMUM {
        schemes.push(Scheme {
            mantissas: (1..base.min(TICKS_MAXIMUM as u32)).collect(),
            separation: 1.0,
        });
    }
}

/// Candidate schemes from coarsest to finest.
fn schemes(oom: f64, log: bool, base: u32, factors: &[u64]) -> Vec<Scheme> {
    let mut schemes = Vec::new();
    let mut level = 1;
    while 10f64.powi(level - 1) < 10.0 * TICKS_MAXIMUM as f64 {
        let scan = oom / 10f64.powi(level);
        if log && scan > 0.09 && scan < 0.11 {
            log_schemes(base, &mut schemes);
        } else {
            for &factor in factors.iter().rev() {
                let separation = factor as f64 * scan / 10.0;
                // Fractional decades are not allowed.
                if !log || (separation - separation.round()).abs() <= 1e-9 * separation.abs() {
                    schemes.push(Scheme {
                        mantissas: vec![1],
                        separation,
                    });
                }
            }
        }
        level += 1;
    }
    schemes
}

/// Tick values of `scheme` between `lo` and `hi`, in display units.
fn trial_values(scheme: &Scheme, outer: (f64, f64), range: (f64, f64), log: bool, base: u32) -> Vec<f64> {
    let (outer_min, outer_max) = outer;
    let (lo, hi) = range;
    let sep = scheme.separation;
    let steps = (outer_max - outer_min) / sep + 1.5;
    let mut values = Vec::new();
    let mut j = 0u32;
    'steps: while f64::from(j) < steps {
        for &mantissa in &scheme.mantissas {
            if values.len() >= TICKS_MAXIMUM {
                break 'steps;
            }
            let mut x = outer_min + f64::from(j) * sep;
            if x.abs() < 1e-6 * sep {
                x = 0.0;
            }
            if log {
                x = f64::from(base).powf(x);
            }
            x *= f64::from(mantissa);
            if x < lo || x > hi {
                continue;
            }
            values.push(x);
        }
        j += 1;
    }
    values
}

/// Ticks at round numbers. Falls back to evenly spaced ticks on
/// interpolated or zero-width axes.
pub fn round_number_ticks(axis: &mut Axis, auto_minor: bool, ctx: &mut TickContext<'_>) {
    let state = &axis.state;
    let multiplier = state.unit_multiplier();
    let mut lo = state.min * multiplier;
    let mut hi = state.max * multiplier;
    if state.interpolation.is_some() || lo == hi {
        evenly_spaced(axis, ctx);
        return;
    }
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    let log = state.log && hi >= 3.0 * lo;
    let base = if log { axis.config.log_base.round().max(2.0) as u32 } else { 10 };

    let length = axis.length(ctx.settings.density.default_axis_length);
    let majors_fit = ctx.settings.density.majors_that_fit(length);
    let minors_fit = ctx.settings.density.minors_that_fit(length);
    let factors = factorise(100, MAX_FACTORS, minors_fit as u64);

    let (span_lo, span_hi) = if log {
        let ln_base = f64::from(base).ln();
        (log_in_base(lo, ln_base), log_in_base(hi, ln_base))
    } else {
        (lo, hi)
    };
    let oom = 10f64.powf((span_hi - span_lo).log10().ceil());
    let outer = ((span_lo / oom).floor() * oom, (span_hi / oom).ceil() * oom);

    for major in [true, false] {
        if !major && !auto_minor {
            continue;
        }
        let fit = if major { majors_fit } else { minors_fit };
        let number_ticks = ((fit + 1.0) as usize).clamp(2, TICKS_MAXIMUM);
        let mut best: Vec<f64> = Vec::new();

        for scheme in schemes(oom, log, base, &factors) {
            let mut trial = trial_values(&scheme, outer, (lo, hi), log, base);
            if !major && !overlays_majors(axis, &mut trial, multiplier) {
                continue;
            }
            let mantissas = scheme.mantissas.len();
            let too_many = trial.len() > number_ticks
                || (major && crowded(axis, &trial, multiplier, fit));
            if log && !major && mantissas + 1 >= base as usize {
                if trial.len() > 3 * number_ticks {
                    break;
                }
                best = trial;
            } else if log && mantissas > 1 && too_many {
                continue;
            } else if too_many {
                break;
            } else if trial.len() > best.len() {
                best = trial;
            }
        }
        debug!(axis = %axis.id, major, ticks = best.len(), "stepped ticks chosen");

        let labeller = TickLabeller::for_axis(axis, ctx.settings.significant_figures)
            .with_log_base(f64::from(base));
        let mut ticks = Vec::with_capacity(best.len());
        for value in best {
            let position = axis.state.position(value / multiplier, 0);
            if !position.is_finite() {
                continue;
            }
            let label = if major {
                labeller.label(value / multiplier, ctx.scope, ctx.diagnostics)
            } else {
                String::new()
            };
            ticks.push(Tick { position, label });
        }
        if major {
            axis.state.major = ticks;
        } else {
            axis.state.minor = ticks;
        }
    }
}

/// Whether any two of `values` sit closer on the axis than one `fit`-th of
/// its length. Counting ticks is not enough where the position mapping is
/// not linear in the values.
fn crowded(axis: &Axis, values: &[f64], multiplier: f64, fit: f64) -> bool {
    let mut positions: Vec<f64> = values
        .iter()
        .map(|&x| axis.state.position(x / multiplier, 0))
        .filter(|p| p.is_finite())
        .collect();
    positions.sort_by(f64::total_cmp);
    let spacing = 1.0 / fit;
    positions
        .windows(2)
        .any(|w| w[1] - w[0] < spacing * (1.0 - 1e-9))
}

/// Every major tick must coincide with a trial tick; the coinciding trial
/// ticks are removed so that only the new minors remain.
fn overlays_majors(axis: &Axis, trial: &mut Vec<f64>, multiplier: f64) -> bool {
    for tick in &axis.state.major {
        let hit = trial.iter().position(|&x| {
            let position = axis.state.position(x / multiplier, 0);
            (position - tick.position).abs() <= 1e-4
        });
        match hit {
            Some(k) => {
                trial.remove(k);
            }
            None => return false,
        }
    }
    true
}

/// Last resort: labelled majors at equal fractions of the axis.
pub fn evenly_spaced(axis: &mut Axis, ctx: &mut TickContext<'_>) {
    let length = axis.length(ctx.settings.density.default_axis_length);
    let n = ((1.0 + ctx.settings.density.majors_that_fit(length)) as usize).clamp(3, 100);
    let labeller = TickLabeller::for_axis(axis, ctx.settings.significant_figures);
    let ticks = (0..n)
        .map(|i| {
            let position = i as f64 / (n - 1) as f64;
            let value = axis.state.inverse_position(position);
            Tick {
                position,
                label: labeller.label(value, ctx.scope, ctx.diagnostics),
            }
        })
        .collect();
    debug!(axis = %axis.id, ticks = n, "evenly spaced ticks");
    axis.state.major = ticks;
}

/// Copies the ticks of the axis this one is linked to, relabelling them
/// through this axis's format rule when it has one. Returns false when the
/// ticks cannot be shared.
pub fn linked_ticks(axis: &mut Axis, source: &Axis, auto_minor: bool, ctx: &mut TickContext<'_>) -> bool {
    let density = &ctx.settings.density;
    let default_length = density.default_axis_length;
    if axis.link_using.is_some()
        || !source.state.ticks_finalized
        || density.minors_that_fit(axis.length(default_length))
            != density.minors_that_fit(source.length(default_length))
    {
        return false;
    }

    let major = match &axis.format {
        None => source.state.major.clone(),
        Some(_) => {
            let labeller = TickLabeller::for_axis(axis, ctx.settings.significant_figures);
            source
                .state
                .major
                .iter()
                .map(|tick| {
                    let state = &axis.state;
                    let mut x = state.inverse_position(tick.position);
                    let below = state.inverse_position(tick.position - 1e-14);
                    let above = state.inverse_position(tick.position + 1e-14);
                    if below.is_finite()
                        && above.is_finite()
                        && ((below <= 0.0 && above >= 0.0) || (below >= 0.0 && above <= 0.0))
                    {
                        x = 0.0;
                    }
                    Tick {
                        position: tick.position,
                        label: labeller.label(x, ctx.scope, ctx.diagnostics),
                    }
                })
                .collect()
        }
    };
    axis.state.major = major;
    if auto_minor {
        axis.state.minor = source
            .state
            .minor
            .iter()
            .map(|tick| Tick {
                position: tick.position,
                label: String::new(),
            })
            .collect();
    }
    debug!(axis = %axis.id, source = %source.id, "sharing ticks with linked axis");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisConfig, AxisId, Direction};
    use crate::error::Diagnostics;
    use crate::expression::Scope;
    use crate::settings::CanvasSettings;

    fn axis(config: AxisConfig, min: f64, max: f64, scope: &mut Scope) -> Axis {
        let mut axis = Axis::new(AxisId::new(0, Direction::X, 1), config, scope).expect("valid axis");
        axis.state.min = min;
        axis.state.max = max;
        axis.state.log = axis.config.log;
        axis.state.range_finalized = true;
        axis
    }

    fn values(axis: &Axis, ticks: &[Tick]) -> Vec<f64> {
        ticks
            .iter()
            .map(|t| axis.state.inverse_position(t.position))
            .collect()
    }

    #[test]
    fn linear_range_steps_by_twenty() {
        let settings = CanvasSettings::default();
        let mut scope = Scope::new();
        let mut diagnostics = Diagnostics::new();
        let mut a = axis(AxisConfig::default(), 0.0, 100.0, &mut scope);
        let mut ctx = TickContext::new(&mut scope, &settings, &mut diagnostics);
        round_number_ticks(&mut a, true, &mut ctx);

        let majors = values(&a, &a.state.major);
        assert_eq!(majors.len(), 6);
        for (value, expected) in majors.iter().zip([0.0, 20.0, 40.0, 60.0, 80.0, 100.0]) {
            assert!((value - expected).abs() < 1e-9, "{majors:?}");
        }
        assert_eq!(a.state.major[1].label, "$20$");
        assert_eq!(a.state.minor.len(), 15);
        assert!(a.state.minor.iter().all(|t| t.label.is_empty()));
    }

    #[test]
    fn log_range_ticks_decades() {
        let settings = CanvasSettings::default();
        let mut scope = Scope::new();
        let mut diagnostics = Diagnostics::new();
        let config = AxisConfig {
            log: true,
            ..AxisConfig::default()
        };
        let mut a = axis(config, 1.0, 10000.0, &mut scope);
        let mut ctx = TickContext::new(&mut scope, &settings, &mut diagnostics);
        round_number_ticks(&mut a, true, &mut ctx);

        let majors = values(&a, &a.state.major);
        assert_eq!(majors.len(), 5, "{majors:?}");
        for (value, expected) in majors.iter().zip([1.0, 10.0, 100.0, 1000.0, 10000.0]) {
            assert!((value / expected - 1.0).abs() < 1e-9, "{majors:?}");
        }
        // Every integer mantissa between the decades.
        assert_eq!(a.state.minor.len(), 32);
    }

    #[test]
    fn narrow_log_range_keeps_majors_apart() {
        let settings = CanvasSettings::default();
        let mut scope = Scope::new();
        let mut diagnostics = Diagnostics::new();
        let config = AxisConfig {
            log: true,
            ..AxisConfig::default()
        };
        // The rounded range of usage [2, 3].
        let mut a = axis(config, 10f64.powf(0.3), 10f64.powf(0.48), &mut scope);
        let mut ctx = TickContext::new(&mut scope, &settings, &mut diagnostics);
        round_number_ticks(&mut a, false, &mut ctx);

        let spacing = 1.0 / settings.density.majors_that_fit(settings.density.default_axis_length);
        for pair in a.state.major.windows(2) {
            let gap = pair[1].position - pair[0].position;
            assert!(gap >= spacing * (1.0 - 1e-9), "gap {gap} below {spacing}");
        }
        let majors = values(&a, &a.state.major);
        assert_eq!(majors.len(), 5, "{majors:?}");
        for (value, expected) in majors.iter().zip([2.0, 2.25, 2.5, 2.75, 3.0]) {
            assert!((value - expected).abs() < 1e-9, "{majors:?}");
        }
    }

    #[test]
    fn zero_width_range_is_evenly_spaced() {
        let settings = CanvasSettings::default();
        let mut scope = Scope::new();
        let mut diagnostics = Diagnostics::new();
        let mut a = axis(AxisConfig::default(), 3.0, 3.0, &mut scope);
        let mut ctx = TickContext::new(&mut scope, &settings, &mut diagnostics);
        round_number_ticks(&mut a, true, &mut ctx);
        assert_eq!(a.state.major.len(), 6);
        assert_eq!(a.state.major[5].position, 1.0);
        assert!(a.state.minor.is_empty());
    }

    #[test]
    fn log_mantissas_stop_at_repeats() {
        let mut schemes = Vec::new();
        log_schemes(10, &mut schemes);
        let sets: Vec<Vec<u32>> = schemes.into_iter().map(|s| s.mantissas).collect();
        assert_eq!(sets[0], vec![1]);
        assert_eq!(sets[1], vec![1, 3]);
        assert_eq!(sets[2], vec![1, 2, 5]);
        assert_eq!(sets.last(), Some(&(1..10).collect::<Vec<_>>()));
    }

    #[test]
    fn linked_axis_shares_positions() {
        let settings = CanvasSettings::default();
        let mut scope = Scope::new();
        let mut diagnostics = Diagnostics::new();
        let mut source = axis(AxisConfig::default(), 0.0, 100.0, &mut scope);
        let mut ctx = TickContext::new(&mut scope, &settings, &mut diagnostics);
        round_number_ticks(&mut source, true, &mut ctx);
        source.state.ticks_finalized = true;

        let mut target = axis(
            AxisConfig {
                format: Some("'%.0f!' % (x)".to_string()),
                ..AxisConfig::default()
            },
            0.0,
            100.0,
            ctx.scope,
        );
        assert!(linked_ticks(&mut target, &source, true, &mut ctx));
        assert_eq!(target.state.major.len(), source.state.major.len());
        assert_eq!(target.state.major[0].label, "0!");
        assert_eq!(target.state.major[1].label, "20!");
        assert_eq!(target.state.minor.len(), source.state.minor.len());
    }
}
