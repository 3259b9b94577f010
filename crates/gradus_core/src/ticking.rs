//! Tick finalization for one axis: manual lists and stepped ticks, then the
//! automatic tickers.

use crate::axis::{Axis, ManualTick, Tick, TickSpec};
use crate::catalog::Catalog;
use crate::error::{AxisError, Diagnostics};
use crate::expression::Scope;
use crate::label::{self, TickLabeller};
use crate::range;
use crate::selector;
use crate::settings::CanvasSettings;
use crate::stepping;
use tracing::debug;

/// Most ticks a stepped specification places in one monotonic region.
const STEPPED_MAXIMUM: i32 = 100;

/// Everything a ticker needs besides the axis itself.
pub struct TickContext<'a> {
    pub scope: &'a mut Scope,
    pub settings: &'a CanvasSettings,
    pub diagnostics: &'a mut Diagnostics,
}

impl<'a> TickContext<'a> {
    pub fn new(
        scope: &'a mut Scope,
        settings: &'a CanvasSettings,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            scope,
            settings,
            diagnostics,
        }
    }
}

/// Result of the format-driven ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ticks { major: Vec<Tick>, minor: Vec<Tick> },
    /// No acceptable scheme; use round-number stepping instead.
    Fallback,
}

/// Finalizes the range and then the ticks of `axis`. `linked_to` is the
/// axis it links to, when that one is already finalized, and lets the two
/// share tick positions. Idempotent.
pub fn finalize_axis(
    axis: &mut Axis,
    linked_to: Option<&Axis>,
    ctx: &mut TickContext<'_>,
) -> Result<(), AxisError> {
    range::finalize_range(axis, ctx.diagnostics)?;
    if axis.state.ticks_finalized {
        return Ok(());
    }

    if let Err(err) = check_tick_units(axis) {
        axis.state.major.clear();
        axis.state.minor.clear();
        return Err(err);
    }

    axis.state.label = label::axis_label(
        axis.config.label.as_deref(),
        &axis.state.display_unit,
        ctx.settings.unit_style,
        axis.format.is_some(),
    );

    let minor = manual_ticks(axis, &axis.config.minor_ticks, false, ctx);
    let auto_minor = minor.is_none();
    if let Some(ticks) = minor {
        axis.state.minor = ticks;
    }
    let major = manual_ticks(axis, &axis.config.major_ticks, true, ctx);
    let auto_major = major.is_none();
    if let Some(ticks) = major {
        axis.state.major = ticks;
    }

    if auto_major {
        let outcome = if axis.format.is_some() || axis.state.interpolation.is_some() {
            automatic_ticks(axis, auto_minor, ctx)
        } else {
            Ok(TickOutcome::Fallback)
        };
        match outcome {
            Ok(TickOutcome::Ticks { major, minor }) => {
                axis.state.major = major;
                if auto_minor {
                    axis.state.minor = minor;
                }
            }
            Ok(TickOutcome::Fallback) => stepped_fallback(axis, linked_to, auto_minor, ctx),
            Err(err) => {
                axis.state.major.clear();
                axis.state.minor.clear();
                return Err(err);
            }
        }
    }

    axis.state.ticks_finalized = true;
    debug!(
        axis = %axis.id,
        major = axis.state.major.len(),
        minor = axis.state.minor.len(),
        "ticks finalized"
    );
    Ok(())
}

/// Format-driven ticking: sample the format arguments, pick a scheme and
/// place it. Heuristic failures come back as [`TickOutcome::Fallback`].
pub fn automatic_ticks(
    axis: &Axis,
    want_minor: bool,
    ctx: &mut TickContext<'_>,
) -> Result<TickOutcome, AxisError> {
    let density = &ctx.settings.density;
    let length = axis.length(density.default_axis_length);
    let majors_fit = density.majors_that_fit(length);
    let minors_fit = density.minors_that_fit(length);

    let catalog = match Catalog::sample(axis, majors_fit, minors_fit, ctx.scope) {
        Ok(catalog) => catalog,
        Err(AxisError::HeuristicFailure { message }) => {
            debug!(axis = %axis.id, %message, "falling back to stepped ticks");
            return Ok(TickOutcome::Fallback);
        }
        Err(err) => return Err(err),
    };
    let Some(marks) = selector::select(&catalog, majors_fit, minors_fit) else {
        debug!(axis = %axis.id, "no tick scheme found; falling back to stepped ticks");
        return Ok(TickOutcome::Fallback);
    };

    let labeller = TickLabeller::for_axis(axis, ctx.settings.significant_figures);
    let (major, minor) = selector::place(
        &catalog,
        &marks,
        axis,
        &labeller,
        true,
        want_minor,
        ctx.scope,
        ctx.diagnostics,
    );
    Ok(TickOutcome::Ticks { major, minor })
}

fn stepped_fallback(
    axis: &mut Axis,
    linked_to: Option<&Axis>,
    auto_minor: bool,
    ctx: &mut TickContext<'_>,
) {
    if let Some(source) = linked_to {
        if stepping::linked_ticks(axis, source, auto_minor, ctx) {
            return;
        }
    }
    stepping::round_number_ticks(axis, auto_minor, ctx);
}

/// Manual positions must share the unit of the data on the axis.
fn check_tick_units(axis: &Axis) -> Result<(), AxisError> {
    let log = axis.config.log;
    let manual = |spec: &TickSpec| match spec {
        TickSpec::Auto => false,
        TickSpec::List(_) => true,
        // A logarithmic axis needs somewhere to start multiplying from.
        TickSpec::Stepped { start, .. } => !log || start.is_some(),
    };
    if !manual(&axis.config.major_ticks) && !manual(&axis.config.minor_ticks) {
        return Ok(());
    }
    let ticks = axis.config.tick_unit.unwrap_or_default();
    let data = axis.state.data_dims();
    if ticks.matches(&data) {
        Ok(())
    } else {
        Err(AxisError::unit_mismatch(
            format!("manual ticks of {}", axis.id),
            ticks,
            data,
        ))
    }
}

/// Ticks from a manual specification, or `None` when it is automatic.
fn manual_ticks(
    axis: &Axis,
    spec: &TickSpec,
    major: bool,
    ctx: &mut TickContext<'_>,
) -> Option<Vec<Tick>> {
    match spec {
        TickSpec::Auto => None,
        TickSpec::List(list) => Some(listed_ticks(axis, list, major, ctx)),
        TickSpec::Stepped { start, step, end } => {
            Some(stepped_ticks(axis, *start, *step, *end, major, ctx))
        }
    }
}

fn tick_label(
    labeller: &TickLabeller<'_>,
    value: f64,
    given: Option<&str>,
    major: bool,
    ctx: &mut TickContext<'_>,
) -> String {
    match given {
        Some(text) => text.to_string(),
        None if !major => String::new(),
        None => labeller.label(value, ctx.scope, ctx.diagnostics),
    }
}

fn listed_ticks(
    axis: &Axis,
    list: &[ManualTick],
    major: bool,
    ctx: &mut TickContext<'_>,
) -> Vec<Tick> {
    let labeller = TickLabeller::for_axis(axis, ctx.settings.significant_figures);
    let mut ticks = Vec::new();
    for region in 0..axis.state.regions() {
        for tick in list {
            let position = axis.state.position(tick.value, region);
            if !position.is_finite() || !(0.0..=1.0).contains(&position) {
                continue;
            }
            let label = tick_label(&labeller, tick.value, tick.label.as_deref(), major, ctx);
            ticks.push(Tick { position, label });
        }
    }
    ticks
}

/// Ticks every `step` between `start` and `end`. Steps are multiplicative
/// on logarithmic axes; a negative step, or one below unity on a log axis,
/// counts down from the upper end instead.
fn stepped_ticks(
    axis: &Axis,
    start: Option<f64>,
    step: f64,
    end: Option<f64>,
    major: bool,
    ctx: &mut TickContext<'_>,
) -> Vec<Tick> {
    let state = &axis.state;
    let log = state.log;
    let mut step = step;
    let mut inverted = false;
    if step < 0.0 {
        step = -step;
        inverted = true;
    }
    if log {
        inverted = step < 1.0;
        if inverted {
            step = 1.0 / step;
        }
    }
    if !(step.is_finite() && step > 0.0) || (log && step == 1.0) {
        ctx.diagnostics.warn(format!(
            "tick step on {} does not advance; no ticks placed",
            axis.id
        ));
        return Vec::new();
    }
    let ln_step = step.ln();
    let (lower, upper) = if inverted { (end, start) } else { (start, end) };

    let labeller = TickLabeller::for_axis(axis, ctx.settings.significant_figures);
    let mut ticks = Vec::new();
    for region in 0..state.regions() {
        let (range_min, range_max, first) = match &state.interpolation {
            Some(table) => {
                let a = table.samples[table.turnings[region]];
                let b = table.samples[table.turnings[region + 1]];
                (a.min(b), a.max(b), table.samples[table.turnings[0]])
            }
            None => {
                let lo = state.min.min(state.max);
                (lo, state.min.max(state.max), lo)
            }
        };

        let mut t_min = lower.unwrap_or(first);
        let mut t_max = upper.unwrap_or(range_max);
        if t_min < range_min || (state.interpolation.is_some() && lower.is_none()) {
            if log {
                t_min *= (((range_min / t_min).ln() / ln_step).ceil() * ln_step).exp();
            } else {
                t_min += ((range_min - t_min) / step).ceil() * step;
            }
        }
        if t_max > range_max {
            if log {
                t_max /= (((t_max / range_max).ln() / ln_step).floor() * ln_step).exp();
            } else {
                t_max -= ((t_max - range_max) / step).floor() * step;
            }
        }

        for i in 0..STEPPED_MAXIMUM {
            let n = f64::from(i);
            let mut value = match (inverted, log) {
                (false, true) => t_min * step.powi(i),
                (false, false) => t_min + n * step,
                (true, true) => t_max / step.powi(i),
                (true, false) => t_max - n * step,
            };
            if (!inverted && value > t_max) || (inverted && value < t_min) {
                break;
            }
            if !log && value.abs() < (step * 1e-14).abs() {
                value = 0.0;
            }
            let position = state.position(value, region);
            if !position.is_finite() || !(0.0..=1.0).contains(&position) {
                continue;
            }
            let label = tick_label(&labeller, value, None, major, ctx);
            ticks.push(Tick { position, label });
        }
    }
    ticks
}
