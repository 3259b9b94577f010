//! Linked axes.
//!
//! An axis may declare that it shows the same quantity as another axis,
//! possibly on another plot, possibly through a mapping expression in terms
//! of the other axis's variable. Hard limits travel down a chain of links
//! before any range is decided, data usage travels down it so that the axis
//! at the bottom sees everything plotted along the chain, and the finalized
//! range of the bottom axis travels back up.

use crate::axis::{Axis, AxisId, HardLimits, Interpolation, INTERPOLATION_POINTS};
use crate::error::{AxisError, Diagnostics};
use crate::expression::{Expression, Scope, Value};
use crate::solver::{log_space_search, twinlog, SearchConfig};
use crate::ticking::{finalize_axis, TickContext};
use crate::units::{Dimensions, Quantity, BASE_UNITS};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::debug;

pub type AxisMap = BTreeMap<AxisId, Axis>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Copy hard limits from the bottom of a chain onto the axes above it.
    HardLimits,
    /// Finalize the bottom of a chain and hand its range to the axes above.
    Range,
}

/// Search used to invert a mapping for a numerical value.
const VALUE_SEARCH: SearchConfig = SearchConfig {
    initial_step: 0.1,
    steps_per_check: 4,
    min_inner_checks: 10,
    max_inner_checks: 50,
    min_outer_passes: 4,
    max_outer_passes: 20,
    single_pass: false,
};

/// Search used to recover one unit exponent of an inverted value.
const EXPONENT_SEARCH: SearchConfig = SearchConfig {
    single_pass: true,
    ..VALUE_SEARCH
};

/// Runs `f` on `target` mutably and `source` immutably, both taken from the
/// same map. Returns `None` when either is missing.
fn with_pair<R>(
    axes: &mut AxisMap,
    target: AxisId,
    source: AxisId,
    f: impl FnOnce(&mut Axis, &Axis) -> R,
) -> Option<R> {
    let mut axis = axes.remove(&target)?;
    let result = axes.get(&source).map(|source| f(&mut axis, source));
    axes.insert(target, axis);
    result
}

/// The axes reached by following links from `start`, `start` first. The
/// walk stops at an unlinked or already finalized axis, at a missing target
/// and where neighbouring units disagree.
fn link_chain(
    axes: &AxisMap,
    start: AxisId,
    mode: Propagation,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<AxisId>, AxisError> {
    if !axes.contains_key(&start) {
        return Err(AxisError::MissingAxis {
            what: start.to_string(),
        });
    }
    let mut chain = vec![start];
    let mut visited = BTreeSet::from([start]);
    let mut current = start;
    while let Some(axis) = axes.get(&current) {
        if axis.state.range_finalized {
            break;
        }
        let Some(link) = axis.link() else { break };
        let Some(next) = axes.get(&link.target) else {
            if chain.len() == 1 && mode == Propagation::HardLimits {
                diagnostics.report(&AxisError::MissingAxis {
                    what: format!("{}, the link target of {}", link.target, axis.id),
                });
            }
            break;
        };
        if let (Some(a), Some(b)) = (axis.known_unit(), next.known_unit()) {
            if !a.matches(&b) {
                break;
            }
        }
        if !visited.insert(link.target) {
            return Err(AxisError::LinkCycle {
                axis: link.target.to_string(),
            });
        }
        chain.push(link.target);
        current = link.target;
    }
    Ok(chain)
}

/// Propagates along the chain of links starting at `start`. In
/// [`Propagation::Range`] mode every axis on the chain ends up with a
/// finalized range and ticks.
pub fn forward_propagate(
    axes: &mut AxisMap,
    start: AxisId,
    mode: Propagation,
    ctx: &mut TickContext<'_>,
) -> Result<(), AxisError> {
    let chain = link_chain(axes, start, mode, ctx.diagnostics)?;
    let Some(&bottom) = chain.last() else {
        return Ok(());
    };
    if mode == Propagation::Range {
        if let Some(axis) = axes.get_mut(&bottom) {
            if !axis.state.range_finalized {
                finalize_axis(axis, None, ctx)?;
            }
        }
    }

    let requested = mode;
    let mut mode = mode;
    for pair in chain.windows(2).rev() {
        let (target_id, source_id) = (pair[0], pair[1]);
        let Some(target) = axes.get_mut(&target_id) else {
            break;
        };
        if target.state.range_finalized || target.link().is_none() {
            break;
        }
        if requested == Propagation::HardLimits && target.hard_limits_propagated {
            continue;
        }
        target.hard_limits_propagated = true;
        let mapped = target.link_using.is_some();

        if mode == Propagation::HardLimits {
            let Some(source_hard) = axes.get(&source_id).map(|s| s.hard) else {
                break;
            };
            if !mapped {
                if let Some(target) = axes.get_mut(&target_id) {
                    target.hard = source_hard;
                }
            } else if source_hard.both().is_some() {
                // A fully pinned axis can hand its range up straight away.
                if let Some(source) = axes.get_mut(&source_id) {
                    pin_to_hard_limits(source);
                }
                mode = Propagation::Range;
            } else if let Some(target) = axes.get_mut(&target_id) {
                target.hard = HardLimits::default();
            }
        }

        if mode == Propagation::Range {
            with_pair(axes, target_id, source_id, |target, source| {
                adopt_range(target, source, ctx)
            })
            .transpose()?;
        }
    }
    Ok(())
}

fn pin_to_hard_limits(axis: &mut Axis) {
    if let Some((min, max)) = axis.hard.both() {
        axis.state.min = min;
        axis.state.max = max;
        axis.state.log = axis.config.log;
        axis.state.data_unit = Some(axis.hard.unit.unwrap_or_default());
    }
}

/// Gives `target` the finalized range of the axis it links to, then
/// finalizes its ticks.
fn adopt_range(target: &mut Axis, source: &Axis, ctx: &mut TickContext<'_>) -> Result<(), AxisError> {
    target.state.log = source.state.log;
    target.state.min = source.state.min;
    target.state.max = source.state.max;
    if target.link_using.is_some() {
        let (table, dims) = sample_link(target, source, ctx.scope)?;
        target.state.interpolation = Some(Rc::new(table));
        target.state.data_unit = Some(dims);
    } else {
        if let (Some(ours), Some(theirs)) = (target.known_unit(), source.state.data_unit) {
            if !ours.matches(&theirs) {
                return Err(AxisError::unit_mismatch(
                    format!("link from {} to {}", target.id, source.id),
                    ours,
                    theirs,
                ));
            }
        }
        target.state.data_unit = source.state.data_unit;
        target.state.interpolation = source.state.interpolation.clone();
    }
    target.state.range_finalized = true;
    debug!(axis = %target.id, source = %source.id, "range taken from linked axis");
    finalize_axis(target, Some(source), ctx)
}

/// Samples the mapping of `target` across the range of `source` into a
/// piecewise-linear table, recording where the mapping turns.
pub fn sample_link(
    target: &Axis,
    source: &Axis,
    scope: &mut Scope,
) -> Result<(Interpolation, Dimensions), AxisError> {
    let Some(expr) = target.link_using.as_ref() else {
        return Err(AxisError::invalid_input(format!(
            "{} has no mapping to sample",
            target.id
        )));
    };
    let failure = |detail: String| {
        AxisError::algebraic(format!(
            "error encountered whilst evaluating axis linkage expression {}: {detail}",
            expr.source()
        ))
    };

    let mut samples = Vec::new();
    samples
        .try_reserve_exact(INTERPOLATION_POINTS)
        .map_err(|_| AxisError::out_of_memory(format!("sampling the link of {}", target.id)))?;
    let mut turnings = vec![0];
    let mut unit = target.known_unit();
    let mut previous_sign = None;

    let source_dims = source.state.data_dims();
    let mut binding = scope.bind(source.variable());
    for l in 0..INTERPOLATION_POINTS {
        let p = l as f64 / (INTERPOLATION_POINTS - 1) as f64;
        binding.set_quantity(source.state.inverse_position(p), source_dims);
        let value = expr
            .evaluate(binding.scope())
            .map_err(|err| failure(err.to_string()))?;
        let Some(q) = value.as_number() else {
            return Err(failure(format!(
                "object was not a number but an object of type <{}>",
                value.type_name()
            )));
        };
        if !q.is_real() {
            return Err(failure(
                "received a complex number; axes must have strictly real values at all points"
                    .to_string(),
            ));
        }
        if !q.re().is_finite() {
            return Err(failure("expression returned non-finite result".to_string()));
        }
        let dims = *unit.get_or_insert(q.dims);
        if !dims.matches(&q.dims) {
            return Err(AxisError::unit_mismatch(
                format!("axis linkage expression {}", expr.source()),
                q.dims,
                dims,
            ));
        }
        samples.push(q.re());

        if l > 0 {
            let step = samples[l] - samples[l - 1];
            let sign = if step > 0.0 {
                1
            } else if step < 0.0 {
                -1
            } else {
                continue;
            };
            if previous_sign.is_some_and(|s| s != sign) {
                turnings.push(l - 1);
            }
            previous_sign = Some(sign);
        }
    }
    turnings.push(INTERPOLATION_POINTS - 1);
    debug!(axis = %target.id, regions = turnings.len() - 1, "sampled axis link");
    Ok((
        Interpolation { samples, turnings },
        unit.unwrap_or_default(),
    ))
}

/// Pushes the usage of `start` down its chain of links, so that the axis
/// at the bottom covers everything plotted along the chain.
pub fn back_propagate(axes: &mut AxisMap, start: AxisId, ctx: &mut TickContext<'_>) -> Result<(), AxisError> {
    let mut visited = BTreeSet::from([start]);
    let mut source_id = start;
    loop {
        let Some(source) = axes.get(&source_id) else {
            break;
        };
        let Some(link) = source.link() else { break };
        if source.usage.is_empty() {
            break;
        }
        let target_id = link.target;
        if !axes.contains_key(&target_id) {
            break;
        }
        if !visited.insert(target_id) {
            return Err(AxisError::LinkCycle {
                axis: target_id.to_string(),
            });
        }
        let carried = with_pair(axes, target_id, source_id, |target, source| {
            carry_usage(target, source, ctx)
        });
        if carried != Some(true) {
            break;
        }
        source_id = target_id;
    }
    Ok(())
}

fn carry_usage(target: &mut Axis, source: &Axis, ctx: &mut TickContext<'_>) -> bool {
    if target.state.range_finalized {
        return false;
    }
    if let Some(expr) = &source.link_using {
        for value in [source.usage.min, source.usage.max].into_iter().flatten() {
            usage_through_mapping(value, target, source, expr, ctx);
        }
        return true;
    }
    if let (Some(theirs), Some(ours)) = (target.usage.unit, source.usage.unit) {
        if !theirs.matches(&ours) {
            let err = AxisError::unit_mismatch(
                format!(
                    "usage of {} propagated to {}; the axes have data with conflicting units",
                    source.id, target.id
                ),
                ours,
                theirs,
            );
            ctx.diagnostics.warn(err.to_string());
            return false;
        }
    }
    if let Some(min) = source.usage.min {
        if target.usage.min.map_or(true, |m| m > min) {
            target.usage.min = Some(min);
        }
    }
    if let Some(max) = source.usage.max {
        if target.usage.max.map_or(true, |m| m < max) {
            target.usage.max = Some(max);
        }
    }
    if source.usage.unit.is_some() {
        target.usage.unit = source.usage.unit;
    }
    true
}

/// Finds the value on `target` that the mapping of `source` sends to
/// `value`, and widens the usage of `target` to include it.
fn usage_through_mapping(
    value: f64,
    target: &mut Axis,
    source: &Axis,
    expr: &Expression,
    ctx: &mut TickContext<'_>,
) {
    if target.hard.both().is_some() {
        return;
    }
    let wanted = Quantity::real(value, source.usage.unit.unwrap_or_default());
    let context = format!(
        "could not propagate axis range information from {} to {} using expression <{}>",
        source.id,
        target.id,
        expr.source()
    );
    let found = match invert_mapping(expr, target.variable(), wanted, ctx.scope) {
        Ok(found) => found,
        Err(err) => {
            ctx.diagnostics.warn(format!(
                "{context}: {err}. Recommend setting an explicit range for {}.",
                target.id
            ));
            return;
        }
    };

    let problem = if target.hard.unit.is_some_and(|u| !u.matches(&found.dims)) {
        Some(format!(
            "propagated range has units of <{}> but the range of {} is set in other units",
            found.dims, target.id
        ))
    } else if target.usage.unit.is_some_and(|u| !u.matches(&found.dims)) {
        Some(format!(
            "propagated range has units of <{}> but {} has data plotted against it in other units",
            found.dims, target.id
        ))
    } else if !found.is_real() {
        Some("axis usage was a complex number".to_string())
    } else if !found.re().is_finite() {
        Some("axis usage was a non-finite number".to_string())
    } else {
        None
    };
    if let Some(problem) = problem {
        ctx.diagnostics.warn(format!("{context}: {problem}."));
        return;
    }

    target.usage.include(found.re());
    if source.usage.unit.is_some() {
        target.usage.unit = Some(found.dims);
    }
}

fn mapped_value(expr: &Expression, scope: &Scope) -> Result<Quantity, AxisError> {
    match expr.evaluate(scope) {
        Ok(Value::Number(q)) => Ok(q),
        Ok(other) => Err(AxisError::algebraic(format!(
            "{} returned <{}> rather than a number",
            expr.source(),
            other.type_name()
        ))),
        Err(err) => Err(AxisError::algebraic(err.to_string())),
    }
}

/// Numerically inverts `expr` at `wanted`: first the value, then each unit
/// exponent in turn.
fn invert_mapping(
    expr: &Expression,
    variable: &str,
    wanted: Quantity,
    scope: &mut Scope,
) -> Result<Quantity, AxisError> {
    let mut binding = scope.bind(variable);
    let mut guess = Quantity::dimensionless(1.0);

    let dims = guess.dims;
    let fit = log_space_search(&[guess.re()], &VALUE_SEARCH, |x| {
        binding.set(Value::Number(Quantity::real(x[0], dims)));
        let out = mapped_value(expr, binding.scope())?;
        Ok((twinlog(wanted.re()) - twinlog(out.re())).powi(2))
    })?;
    guess = Quantity::real(fit.values[0], dims);

    for k in 0..BASE_UNITS {
        let current = guess;
        let fit = log_space_search(&[1.0], &EXPONENT_SEARCH, |x| {
            let mut dims = current.dims;
            dims.0[k] = x[0];
            binding.set(Value::Number(Quantity::real(current.re(), dims)));
            let out = mapped_value(expr, binding.scope())?;
            Ok((twinlog(wanted.dims.0[k]) - twinlog(out.dims.0[k])).powi(2))
        })?;
        guess.dims.0[k] = fit.values[0];
    }
    guess.dims.snap_integers();
    Ok(guess)
}
