//! Bounded simplex solver.
//!
//! Solves equations and minimises or maximises expressions over free
//! variables whose solutions may lie many orders of magnitude away from the
//! starting guess. Each outer pass restarts a Nelder-Mead simplex in a
//! different reparametrisation of the search space: normalised linear on the
//! first pass, signed logarithms on the second and third, and normalised
//! linear again afterwards.

use crate::error::AxisError;
use crate::expression::{EvalError, Expression, Scope, Value};
use crate::settings::SolverSettings;
use crate::units::{Dimensions, Quantity};
use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Initial worst score; any finite objective value beats it.
pub(crate) const WORST_SCORE_INIT: f64 = -(f64::MAX / 1e10);

/// Pass number used by single-pass searches. Selects the normalised linear
/// parametrisation.
pub(crate) const SINGLE_PASS: usize = 999;

const TWINLOG_FLOOR: f64 = 1e-200;

/// Logarithm that stays finite and monotonic through zero and negative
/// values, used to compare the two sides of an equation.
pub fn twinlog(x: f64) -> f64 {
    if x > TWINLOG_FLOOR {
        x.ln()
    } else {
        2.0 * TWINLOG_FLOOR.ln() - (2.0 * TWINLOG_FLOOR - x).ln()
    }
}

/// Maps a real coordinate into search space for the given outer pass.
pub(crate) fn real_to_log(value: f64, pass: usize, norm: &mut f64) -> f64 {
    if pass == 1 || pass >= 4 {
        *norm = value.abs().max(1e-200);
        return value / *norm;
    }
    let a: f64 = if pass >= 3 { -500.0 } else { -2.0 };
    if value >= a.exp() {
        value.ln()
    } else {
        2.0 * a - (2.0 * a.exp() - value).ln()
    }
}

/// Inverse of [`real_to_log`].
pub(crate) fn log_to_real(value: f64, pass: usize, norm: f64) -> f64 {
    if pass == 1 || pass >= 4 {
        return value * norm;
    }
    let a: f64 = if pass >= 3 { -500.0 } else { -2.0 };
    if value >= a {
        value.exp()
    } else {
        2.0 * a.exp() - (2.0 * a - value).exp()
    }
}

/// Replaces non-finite objective values by a penalty just worse than the
/// worst finite value seen so far.
#[derive(Debug, Clone)]
pub(crate) struct ScoreTracker {
    worst: f64,
    pub gone_nan: bool,
}

impl ScoreTracker {
    pub fn new() -> Self {
        Self {
            worst: WORST_SCORE_INIT,
            gone_nan: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn score(&mut self, raw: f64) -> f64 {
        if raw.is_finite() {
            if raw > self.worst {
                self.worst = raw;
            }
            return raw;
        }
        if self.worst > WORST_SCORE_INIT {
            // Grow away from zero so negative scores also get worse.
            self.worst += self.worst.abs() * 0.1;
            return self.worst;
        }
        self.gone_nan = true;
        raw
    }
}

fn rank(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

/// Nelder-Mead simplex minimiser with fixed coefficients: reflection through
/// the centroid of the other vertices, expansion to twice that distance,
/// one-dimensional contraction by half, and shrinking towards the best
/// vertex when all else fails.
#[derive(Debug, Clone)]
pub struct NelderMead {
    vertices: Vec<DVector<f64>>,
    values: Vec<f64>,
}

impl NelderMead {
    pub fn new(
        start: &DVector<f64>,
        step: &DVector<f64>,
        f: &mut impl FnMut(&DVector<f64>) -> f64,
    ) -> Self {
        let n = start.len();
        let mut vertices = Vec::with_capacity(n + 1);
        let mut values = Vec::with_capacity(n + 1);
        values.push(f(start));
        vertices.push(start.clone());
        for i in 0..n {
            let mut v = start.clone();
            v[i] += step[i];
            values.push(f(&v));
            vertices.push(v);
        }
        Self { vertices, values }
    }

    /// Indices of the lowest and highest vertices, and the second-highest
    /// value.
    fn extremes(&self) -> (usize, usize, f64) {
        let (mut lo, mut hi) = (0, 0);
        let first = rank(self.values[0]);
        let (mut dlo, mut dhi, mut ds_hi) = (first, first, first);
        for (i, &value) in self.values.iter().enumerate().skip(1) {
            let y = rank(value);
            if y < dlo {
                dlo = y;
                lo = i;
            } else if y > dhi {
                ds_hi = dhi;
                dhi = y;
                hi = i;
            } else if y > ds_hi {
                ds_hi = y;
            }
        }
        (lo, hi, ds_hi)
    }

    /// Moves `corner` to `centroid + coeff * (corner - centroid)`, where the
    /// centroid excludes the corner itself.
    fn corner_move(&self, coeff: f64, corner: usize) -> DVector<f64> {
        let n = self.vertices.len() as f64;
        let mut centroid = DVector::zeros(self.vertices[0].len());
        for (i, v) in self.vertices.iter().enumerate() {
            if i != corner {
                centroid += v;
            }
        }
        centroid /= n - 1.0;
        &centroid + (&self.vertices[corner] - &centroid) * coeff
    }

    /// One simplex step. Returns false when shrinking produced a non-finite
    /// value, which ends the search.
    pub fn iterate(&mut self, f: &mut impl FnMut(&DVector<f64>) -> f64) -> bool {
        let (lo, hi, ds_hi) = self.extremes();

        let reflected = self.corner_move(-1.0, hi);
        let val = f(&reflected);
        if val.is_finite() && val < rank(self.values[lo]) {
            let expanded = self.corner_move(-2.0, hi);
            let val2 = f(&expanded);
            if val2.is_finite() && val2 < rank(self.values[lo]) {
                self.update(hi, expanded, val2);
            } else {
                self.update(hi, reflected, val);
            }
        } else if !val.is_finite() || val > ds_hi {
            if val.is_finite() && val <= rank(self.values[hi]) {
                self.update(hi, reflected, val);
            }
            let contracted = self.corner_move(0.5, hi);
            let val2 = f(&contracted);
            if val2.is_finite() && val2 <= rank(self.values[hi]) {
                self.update(hi, contracted, val2);
            } else if !self.shrink_towards(lo, f) {
                return false;
            }
        } else {
            self.update(hi, reflected, val);
        }
        true
    }

    fn update(&mut self, i: usize, vertex: DVector<f64>, value: f64) {
        self.vertices[i] = vertex;
        self.values[i] = value;
    }

    fn shrink_towards(&mut self, best: usize, f: &mut impl FnMut(&DVector<f64>) -> f64) -> bool {
        let anchor = self.vertices[best].clone();
        let mut ok = true;
        for i in 0..self.vertices.len() {
            if i == best {
                continue;
            }
            let v = (&self.vertices[i] + &anchor) * 0.5;
            let value = f(&v);
            if !value.is_finite() {
                ok = false;
            }
            self.update(i, v, value);
        }
        ok
    }

    fn best_index(&self) -> usize {
        let mut best = 0;
        for i in 1..self.values.len() {
            if rank(self.values[i]) < rank(self.values[best]) {
                best = i;
            }
        }
        best
    }

    pub fn minimum(&self) -> f64 {
        self.values[self.best_index()]
    }

    pub fn best(&self) -> &DVector<f64> {
        &self.vertices[self.best_index()]
    }
}

/// Knobs for [`log_space_search`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchConfig {
    pub initial_step: f64,
    pub steps_per_check: usize,
    pub min_inner_checks: usize,
    pub max_inner_checks: usize,
    pub min_outer_passes: usize,
    pub max_outer_passes: usize,
    /// Run exactly one pass in the normalised linear parametrisation.
    pub single_pass: bool,
}

impl SearchConfig {
    pub fn from_settings(settings: &SolverSettings, dimensions: usize) -> Self {
        Self {
            initial_step: settings.initial_step,
            steps_per_check: 2 + 2 * dimensions,
            min_inner_checks: settings.min_inner_checks,
            max_inner_checks: settings.max_inner_checks,
            min_outer_passes: settings.min_outer_passes,
            max_outer_passes: settings.max_outer_passes,
            single_pass: false,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SearchResult {
    pub values: Vec<f64>,
    pub minimum: f64,
    pub outer_passes: usize,
    /// First recoverable algebraic failure met during the search.
    pub warning: Option<String>,
}

struct Evaluator<'o, F> {
    objective: &'o mut F,
    norms: Vec<f64>,
    pass: usize,
    tracker: ScoreTracker,
    fatal: Option<AxisError>,
    last_algebraic: Option<String>,
    first_algebraic: Option<String>,
}

impl<F> Evaluator<'_, F>
where
    F: FnMut(&[f64]) -> Result<f64, AxisError>,
{
    fn real_values(&self, x: &DVector<f64>) -> Vec<f64> {
        x.iter()
            .zip(self.norms.iter())
            .map(|(v, norm)| log_to_real(*v, self.pass, *norm))
            .collect()
    }

    fn eval(&mut self, x: &DVector<f64>) -> f64 {
        if self.fatal.is_some() {
            return f64::NAN;
        }
        let real = self.real_values(x);
        let raw = match (self.objective)(&real) {
            Ok(v) => v,
            Err(AxisError::AlgebraicFailure { message }) => {
                if self.first_algebraic.is_none() {
                    self.first_algebraic = Some(message.clone());
                }
                self.last_algebraic = Some(message);
                f64::NAN
            }
            Err(err) => {
                self.fatal = Some(err);
                f64::NAN
            }
        };
        self.tracker.score(raw)
    }
}

/// Outer/inner simplex search shared by the solver and the axis-link fitter.
///
/// `objective` receives real-space coordinates. An `AlgebraicFailure` marks
/// an infeasible point; any other error aborts the search.
pub(crate) fn log_space_search<F>(
    start: &[f64],
    config: &SearchConfig,
    mut objective: F,
) -> Result<SearchResult, AxisError>
where
    F: FnMut(&[f64]) -> Result<f64, AxisError>,
{
    let n = start.len();
    let mut current = start.to_vec();
    let mut evaluator = Evaluator {
        objective: &mut objective,
        norms: vec![1.0; n],
        pass: 0,
        tracker: ScoreTracker::new(),
        fatal: None,
        last_algebraic: None,
        first_algebraic: None,
    };

    let mut size = 0.0;
    let mut pass_count = 0usize;
    let mut failed;
    loop {
        pass_count += 1;
        evaluator.pass = if config.single_pass { SINGLE_PASS } else { pass_count };
        let size_last2 = size;

        let mut norms = vec![1.0; n];
        let x0 = DVector::from_iterator(
            n,
            current
                .iter()
                .zip(norms.iter_mut())
                .map(|(v, norm)| real_to_log(*v, evaluator.pass, norm)),
        );
        evaluator.norms = norms;
        let step = x0.map(|v| {
            if v.abs() > 1e-6 {
                config.initial_step * v
            } else {
                config.initial_step
            }
        });

        // With no finite sample yet the run has gone NaN: there is nothing to
        // search from.
        evaluator.tracker.reset();
        evaluator.last_algebraic = None;
        evaluator.eval(&x0);
        if let Some(err) = evaluator.fatal.take() {
            return Err(err);
        }
        if evaluator.tracker.gone_nan {
            let reason = evaluator
                .last_algebraic
                .take()
                .unwrap_or_else(|| "objective is not finite".to_string());
            return Err(AxisError::algebraic(format!(
                "search has gone NaN at its starting point: {reason}"
            )));
        }

        let mut simplex = NelderMead::new(&x0, &step, &mut |x: &DVector<f64>| evaluator.eval(x));
        let mut checks = 0usize;
        failed = false;
        loop {
            checks += 1;
            for _ in 0..config.steps_per_check {
                if !simplex.iterate(&mut |x: &DVector<f64>| evaluator.eval(x)) {
                    failed = true;
                    break;
                }
            }
            if failed || evaluator.fatal.is_some() {
                break;
            }
            let size_last = size;
            size = simplex.minimum();
            if !(checks < config.min_inner_checks
                || (size < size_last && checks < config.max_inner_checks))
            {
                break;
            }
        }

        current = evaluator.real_values(simplex.best());
        if let Some(err) = evaluator.fatal.take() {
            return Err(err);
        }
        debug!(pass = pass_count, minimum = size, checks, "simplex pass finished");

        if config.single_pass {
            break;
        }
        let improving = size < size_last2;
        if !(pass_count < config.min_outer_passes
            || (!failed && improving && pass_count < config.max_outer_passes))
        {
            break;
        }
    }

    if failed || (!config.single_pass && pass_count >= config.max_outer_passes) {
        return Err(AxisError::convergence(format!(
            "simplex search did not settle within {pass_count} passes"
        )));
    }
    Ok(SearchResult {
        values: current,
        minimum: size,
        outer_passes: pass_count,
        warning: evaluator.first_algebraic,
    })
}

/// One equation `left = right`.
#[derive(Debug, Clone)]
pub struct Equation {
    pub left: Expression,
    pub right: Expression,
}

impl Equation {
    pub fn parse(source: &str, scope: &mut Scope) -> Result<Self, AxisError> {
        let Some((left, right)) = split_equation(source) else {
            return Err(AxisError::invalid_input(format!(
                "'{source}' is not an equation of the form a = b"
            )));
        };
        Ok(Self {
            left: Expression::compile(left, scope)?,
            right: Expression::compile(right, scope)?,
        })
    }
}

fn split_equation(source: &str) -> Option<(&str, &str)> {
    let bytes = source.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'=' {
            continue;
        }
        let prev = if i > 0 { bytes[i - 1] } else { b' ' };
        let next = bytes.get(i + 1).copied().unwrap_or(b' ');
        if matches!(prev, b'<' | b'>' | b'!' | b'=') || next == b'=' {
            continue;
        }
        return Some((&source[..i], &source[i + 1..]));
    }
    None
}

#[derive(Debug, Clone)]
pub enum Objective {
    Solve(Vec<Equation>),
    Minimise(Expression),
    Maximise(Expression),
}

/// Result of a successful solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    pub values: Vec<(String, Quantity)>,
    /// Final objective value (the residual when solving equations).
    pub residual: f64,
    pub outer_iterations: usize,
    pub warning: Option<String>,
}

pub struct BoundedSimplexSolver {
    settings: SolverSettings,
}

impl BoundedSimplexSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Searches for values of `free` that satisfy `objective`. On success the
    /// values are written into `scope`; on failure every free variable is
    /// set to NaN.
    pub fn solve(
        &self,
        objective: &Objective,
        free: &[&str],
        scope: &mut Scope,
    ) -> Result<SolveReport, AxisError> {
        self.settings
            .validate()
            .map_err(|e| AxisError::invalid_input(e.to_string()))?;
        let max = self.settings.max_dimensions;
        if free.is_empty() {
            return Err(AxisError::invalid_input("no free variables to solve for"));
        }
        if free.len() > max {
            return Err(AxisError::invalid_input(format!(
                "too many free variables; at most {max} are supported"
            )));
        }
        if let Objective::Solve(equations) = objective {
            if equations.is_empty() || equations.len() > max {
                return Err(AxisError::invalid_input(format!(
                    "between 1 and {max} equations are supported"
                )));
            }
        }

        let complex = self.settings.complex;
        let mut slots = Vec::with_capacity(free.len());
        let mut dims = Vec::with_capacity(free.len());
        let mut start = Vec::with_capacity(free.len() * 2);
        for name in free {
            let slot = scope.reserve(name);
            let initial = match scope.value(slot) {
                Some(Value::Number(q)) => *q,
                Some(Value::Text(_)) => {
                    return Err(AxisError::invalid_input(format!(
                        "free variable '{name}' holds a string"
                    )))
                }
                None => Quantity::dimensionless(1.0),
            };
            slots.push(slot);
            dims.push(initial.dims);
            start.push(initial.value.re);
            if complex {
                start.push(initial.value.im);
            }
        }

        let sign = match objective {
            Objective::Maximise(_) => -1.0,
            _ => 1.0,
        };
        let mut first_units: Option<Dimensions> = None;
        let config = SearchConfig::from_settings(&self.settings, start.len());

        let outcome = log_space_search(&start, &config, |x| {
            assign(scope, &slots, &dims, x, complex);
            let describe = |scope: &Scope| describe_values(scope, free, &slots);
            let raw = match objective {
                Objective::Solve(equations) => {
                    let mut accumulator = 0.0;
                    for (i, eq) in equations.iter().enumerate() {
                        let l = evaluate(&eq.left, scope, &describe)?;
                        let r = evaluate(&eq.right, scope, &describe)?;
                        if !l.dims.matches(&r.dims) {
                            return Err(AxisError::unit_mismatch(
                                format!(
                                    "equation {} ({} = {}): the two sides are not dimensionally compatible",
                                    i + 1,
                                    eq.left.source(),
                                    eq.right.source()
                                ),
                                l.dims,
                                r.dims,
                            ));
                        }
                        accumulator += (twinlog(l.value.re) - twinlog(r.value.re)).powi(2);
                        accumulator += (twinlog(l.value.im) - twinlog(r.value.im)).powi(2);
                    }
                    accumulator.sqrt()
                }
                Objective::Minimise(expr) | Objective::Maximise(expr) => {
                    let v = evaluate(expr, scope, &describe)?;
                    match &first_units {
                        None => first_units = Some(v.dims),
                        Some(units) if !units.matches(&v.dims) => {
                            return Err(AxisError::unit_mismatch(
                                "the function being optimised does not have consistent units",
                                units,
                                v.dims,
                            ))
                        }
                        Some(_) => {}
                    }
                    v.value.re
                }
            };
            Ok(raw * sign)
        });

        match outcome {
            Ok(result) => {
                assign(scope, &slots, &dims, &result.values, complex);
                let values = free
                    .iter()
                    .zip(slots.iter())
                    .filter_map(|(name, &slot)| {
                        scope.value(slot).and_then(|v| v.as_number()).map(|q| (name.to_string(), *q))
                    })
                    .collect();
                debug!(passes = result.outer_passes, residual = result.minimum, "solve converged");
                Ok(SolveReport {
                    values,
                    residual: result.minimum * sign,
                    outer_iterations: result.outer_passes,
                    warning: result.warning,
                })
            }
            Err(err) => {
                for (&slot, d) in slots.iter().zip(dims.iter()) {
                    scope.set(slot, Some(Value::quantity(f64::NAN, *d)));
                }
                Err(err)
            }
        }
    }
}

fn assign(scope: &mut Scope, slots: &[usize], dims: &[Dimensions], x: &[f64], complex: bool) {
    for (i, (&slot, d)) in slots.iter().zip(dims.iter()).enumerate() {
        let value = if complex {
            let im = x[2 * i + 1];
            // Treat negligible imaginary parts as exactly real.
            let im = if im.abs() <= 1e-15 * x[2 * i].abs() { 0.0 } else { im };
            Complex64::new(x[2 * i], im)
        } else {
            Complex64::new(x[i], 0.0)
        };
        scope.set(slot, Some(Value::Number(Quantity::new(value, *d))));
    }
}

fn describe_values(scope: &Scope, free: &[&str], slots: &[usize]) -> String {
    free.iter()
        .zip(slots.iter())
        .map(|(name, &slot)| match scope.value(slot) {
            Some(v) => format!("{name}={v}"),
            None => format!("{name}=?"),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn evaluate(
    expr: &Expression,
    scope: &Scope,
    describe: &dyn Fn(&Scope) -> String,
) -> Result<Quantity, AxisError> {
    match expr.evaluate_number(scope) {
        Ok(q) => Ok(q),
        Err(EvalError::Algebraic(message)) => Err(AxisError::algebraic(format!(
            "an algebraic error was encountered at {}: {message}",
            describe(scope)
        ))),
        Err(err) => Err(AxisError::Expression(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{METRE, SECOND};

    fn solver() -> BoundedSimplexSolver {
        BoundedSimplexSolver::new(SolverSettings::default())
    }

    #[test]
    fn log_reparametrisation_round_trips() {
        for pass in [1, 2, 3, 4, SINGLE_PASS] {
            for value in [1e-300, -3.5, 0.0, 0.1, 42.0, 7e12] {
                let mut norm = 1.0;
                let x = real_to_log(value, pass, &mut norm);
                let back = log_to_real(x, pass, norm);
                let tolerance = 1e-9 * value.abs().max(1e-12);
                assert!(
                    (back - value).abs() <= tolerance,
                    "pass {pass}: {value} came back as {back}"
                );
            }
        }
    }

    #[test]
    fn twinlog_is_monotonic_through_zero() {
        let samples = [-1.0, -1e-100, 0.0, 1e-200, 1e-100, 1.0];
        for pair in samples.windows(2) {
            assert!(twinlog(pair[0]) < twinlog(pair[1]), "{pair:?}");
        }
    }

    #[test]
    fn score_tracker_penalises_non_finite_values() {
        let mut tracker = ScoreTracker::new();
        assert!(tracker.score(f64::NAN).is_nan());
        assert!(tracker.gone_nan);

        let mut tracker = ScoreTracker::new();
        tracker.score(-10.0);
        let penalty = tracker.score(f64::INFINITY);
        assert!(penalty > -10.0, "penalty {penalty} must be worse than -10");
        assert!(!tracker.gone_nan);
    }

    #[test]
    fn nelder_mead_finds_quadratic_minimum() {
        let mut f = |x: &DVector<f64>| (x[0] - 1.0).powi(2) + 4.0 * (x[1] + 2.0).powi(2);
        let start = DVector::from_vec(vec![0.0, 0.0]);
        let step = DVector::from_vec(vec![0.5, 0.5]);
        let mut nm = NelderMead::new(&start, &step, &mut f);
        for _ in 0..400 {
            assert!(nm.iterate(&mut f));
        }
        let best = nm.best();
        assert!((best[0] - 1.0).abs() < 1e-4, "x = {}", best[0]);
        assert!((best[1] + 2.0).abs() < 1e-4, "y = {}", best[1]);
        assert!(nm.minimum() < 1e-8);
    }

    #[test]
    fn minimise_quadratic_from_one() {
        let mut scope = Scope::new();
        scope.define("x", Value::real(1.0));
        let expr = Expression::compile("(x - 3)^2", &mut scope).expect("compile");
        let report = solver()
            .solve(&Objective::Minimise(expr), &["x"], &mut scope)
            .expect("minimise should converge");
        assert!(report.outer_iterations < 20);
        let x = scope.get("x").and_then(|v| v.as_number()).expect("x set").re();
        assert!((x - 3.0).abs() < 1e-6, "x = {x}");
    }

    #[test]
    fn solve_single_equation() {
        let mut scope = Scope::new();
        let eq = Equation::parse("x^2 = 2", &mut scope).expect("parse");
        let report = solver()
            .solve(&Objective::Solve(vec![eq]), &["x"], &mut scope)
            .expect("solve should converge");
        let x = report.values[0].1.re();
        assert!((x - 2f64.sqrt()).abs() < 1e-6, "x = {x}");
        assert!(report.warning.is_none());
    }

    #[test]
    fn maximise_flips_the_objective() {
        let mut scope = Scope::new();
        scope.define("t", Value::real(0.5));
        let expr = Expression::compile("t * (4 - t)", &mut scope).expect("compile");
        solver()
            .solve(&Objective::Maximise(expr), &["t"], &mut scope)
            .expect("maximise should converge");
        let t = scope.get("t").and_then(|v| v.as_number()).expect("t").re();
        assert!((t - 2.0).abs() < 1e-5, "t = {t}");
    }

    #[test]
    fn mismatched_units_fail_before_iterating() {
        let mut scope = Scope::new();
        scope.define("x", Value::quantity(1.0, Dimensions::base(METRE)));
        scope.define("y", Value::quantity(1.0, Dimensions::base(SECOND)));
        let eq = Equation::parse("x = y", &mut scope).expect("parse");
        let err = solver()
            .solve(&Objective::Solve(vec![eq]), &["x"], &mut scope)
            .expect_err("units differ");
        match err {
            AxisError::UnitMismatch { left, right, .. } => {
                assert_eq!(left, "m");
                assert_eq!(right, "s");
            }
            other => panic!("expected unit mismatch, got {other:?}"),
        }
        let x = scope.get("x").and_then(|v| v.as_number()).expect("x");
        assert!(x.re().is_nan());
    }

    #[test]
    fn pass_cap_is_a_convergence_failure() {
        let settings = SolverSettings {
            min_outer_passes: 1,
            max_outer_passes: 1,
            ..SolverSettings::default()
        };
        let mut scope = Scope::new();
        let eq = Equation::parse("x * x = -1", &mut scope).expect("parse");
        let err = BoundedSimplexSolver::new(settings)
            .solve(&Objective::Solve(vec![eq]), &["x"], &mut scope)
            .expect_err("one pass is never enough");
        assert!(matches!(err, AxisError::ConvergenceFailure { .. }), "unexpected error: {err}");
        let x = scope.get("x").and_then(|v| v.as_number()).expect("x");
        assert!(x.re().is_nan());
    }

    #[test]
    fn complex_mode_finds_imaginary_roots() {
        let settings = SolverSettings {
            complex: true,
            ..SolverSettings::default()
        };
        let mut scope = Scope::new();
        let eq = Equation::parse("x * x = -1", &mut scope).expect("parse");
        let report = BoundedSimplexSolver::new(settings)
            .solve(&Objective::Solve(vec![eq]), &["x"], &mut scope)
            .expect("complex solve should converge");
        let root = report.values[0].1.value;
        assert!(root.re.abs() < 1e-6, "x = {root}");
        assert!((root.im.abs() - 1.0).abs() < 1e-6, "x = {root}");
        let stored = scope.get("x").and_then(|v| v.as_number()).expect("x");
        assert_eq!(stored.value, root);
    }

    #[test]
    fn unevaluable_start_has_gone_nan() {
        let mut scope = Scope::new();
        let expr = Expression::compile("1 / (x - x)", &mut scope).expect("compile");
        let err = solver()
            .solve(&Objective::Minimise(expr), &["x"], &mut scope)
            .expect_err("every sample divides by zero");
        match err {
            AxisError::AlgebraicFailure { message } => {
                assert!(message.contains("gone NaN"), "{message}");
                assert!(message.contains("division by zero"), "{message}");
            }
            other => panic!("expected algebraic failure, got {other:?}"),
        }
        let x = scope.get("x").and_then(|v| v.as_number()).expect("x");
        assert!(x.re().is_nan());
    }

    #[test]
    fn too_many_free_variables_is_rejected() {
        let mut scope = Scope::new();
        let expr = Expression::compile("a", &mut scope).expect("compile");
        let names: Vec<String> = (0..17).map(|i| format!("v{i}")).collect();
        let free: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let err = solver()
            .solve(&Objective::Minimise(expr), &free, &mut scope)
            .expect_err("17 unknowns");
        assert!(matches!(err, AxisError::InvalidInput { .. }), "unexpected error: {err}");
    }

    #[test]
    fn equation_split_ignores_comparisons() {
        assert_eq!(split_equation("a <= b = c"), Some(("a <= b ", " c")));
        assert_eq!(split_equation("a == b"), None);
    }
}
