//! Candidate tick locations for automatic ticking of formatted and
//! interpolated axes.
//!
//! The axis is cut into a few hundred short intervals and every argument of
//! the format rule is evaluated at each interval boundary. Wherever an
//! argument does something worth marking inside an interval (a discrete
//! value changes, a continuous value passes a round number) a
//! [`TickCandidate`] is filed against that interval. The selector then picks
//! whole families of candidates, identified by their [`SchemeKey`].

use crate::axis::Axis;
use crate::error::AxisError;
use crate::expression::{Expression, Scope, Value};
use tracing::debug;

/// Sampling intervals per major tick that fits on the axis.
pub const STEP_DUPLICITY: usize = 100;
/// Candidate slots reserved per argument and interval.
pub const MAX_TICKS_PER_INTERVAL: usize = 20;
/// Most factors kept by [`factorise`].
pub const MAX_FACTORS: usize = 32;
/// Power of the base by which throws and fractions are subdivided.
pub const FACTOR_MULTIPLY: i32 = 2;
/// Order of magnitude filed against zero crossings.
pub const ZERO_OOM: i32 = i32::MAX;
/// Sub-division priority filed against zero crossings.
pub const ZERO_PRIORITY: i32 = -10;

/// Divisors of `value` in ascending order, excluding 1 and `value`. At most
/// `max_factors` are returned, and leading factors are dropped while they
/// would divide `value` into more than `factor_max` parts.
pub fn factorise(value: u64, max_factors: usize, factor_max: u64) -> Vec<u64> {
    let mut low = Vec::new();
    let mut i = 2u64;
    while i.saturating_mul(i) <= value && low.len() < max_factors / 2 {
        if value % i == 0 {
            low.push(i);
        }
        i += 1;
    }
    let mut factors = low.clone();
    for &f in low.iter().rev() {
        let high = value / f;
        if factors.last() != Some(&high) && factors.len() < max_factors {
            factors.push(high);
        }
    }
    let skip = factors
        .iter()
        .take_while(|&&f| value / f > factor_max)
        .count();
    factors.drain(..skip);
    factors
}

/// Identifies a family of candidates that are placed together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemeKey {
    /// Index into [`Catalog::args`].
    pub arg: usize,
    /// Index into the argument's throw factors, for candidates spaced by a
    /// division of the argument's throw.
    pub throw_division: Option<usize>,
    pub oom: i32,
    pub sub_division: i32,
}

impl SchemeKey {
    /// A discrete argument changing value.
    pub fn change(arg: usize) -> Self {
        Self {
            arg,
            throw_division: Some(0),
            oom: 0,
            sub_division: 0,
        }
    }

    pub fn throw(arg: usize, factor: usize) -> Self {
        Self {
            arg,
            throw_division: Some(factor),
            oom: 0,
            sub_division: 0,
        }
    }

    pub fn zero(arg: usize) -> Self {
        Self::digit(arg, ZERO_OOM, ZERO_PRIORITY)
    }

    /// A continuous argument passing a multiple of `base^oom`; `priority`
    /// favours leading digits 1, 2 and 5.
    pub fn digit(arg: usize, oom: i32, priority: i32) -> Self {
        Self {
            arg,
            throw_division: None,
            oom,
            sub_division: priority,
        }
    }

    /// A continuous argument passing a multiple of `base^oom` times the
    /// fraction `factor / base^2`, with `sub_division` ranking the factor.
    pub fn fraction(arg: usize, oom: i32, sub_division: i32) -> Self {
        Self::digit(arg, oom, sub_division)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickCandidate {
    pub key: SchemeKey,
    /// Interval `j` spans sample `j - 1` to sample `j`.
    pub interval: usize,
    /// Argument value at which the tick sits.
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Samples {
    /// Whether the value changes across interval `j`.
    fn changes_at(&self, j: usize) -> bool {
        match self {
            Self::Numeric(v) => {
                let (a, b) = (v[j - 1], v[j]);
                !(a == b || (a.is_nan() && b.is_nan()))
            }
            Self::Text(v) => v[j - 1] != v[j],
        }
    }
}

/// One format argument sampled along the axis.
#[derive(Debug, Clone)]
pub struct ArgumentSample {
    /// Position of the argument in the format rule.
    pub id: usize,
    pub samples: Samples,
    pub continuous: bool,
    /// Too many changes to tick every one, too few to treat as continuous.
    pub vetoed: bool,
    pub changes: usize,
    /// Floor of the smallest finite sample.
    pub min: f64,
    pub max: f64,
    /// Whole units spanned by the argument; zero when unusable.
    pub throw: u64,
    pub throw_factors: Vec<u64>,
    /// How fast this argument moves compared with the others.
    pub score: u64,
    /// Orders of magnitude at which digit candidates were filed.
    pub oom_range: Option<(i32, i32)>,
}

impl ArgumentSample {
    fn new(id: usize, samples: Samples) -> Self {
        Self {
            id,
            samples,
            continuous: false,
            vetoed: false,
            changes: 0,
            min: f64::NAN,
            max: f64::NAN,
            throw: 0,
            throw_factors: Vec::new(),
            score: 0,
            oom_range: None,
        }
    }

    pub fn numeric(&self) -> Option<&[f64]> {
        match &self.samples {
            Samples::Numeric(v) => Some(v),
            Samples::Text(_) => None,
        }
    }

    fn summarise(&mut self, intervals: usize) {
        let (changes, min, max) = match &self.samples {
            Samples::Numeric(v) => {
                let mut min = f64::INFINITY;
                let mut max = f64::NEG_INFINITY;
                let mut changes = 0;
                for (j, &x) in v.iter().enumerate() {
                    if !x.is_finite() {
                        continue;
                    }
                    min = min.min(x);
                    max = max.max(x);
                    if j > 0 && v[j - 1].is_finite() && v[j - 1] != x {
                        changes += 1;
                    }
                }
                (changes, min, max)
            }
            Samples::Text(v) => (v.windows(2).filter(|w| w[0] != w[1]).count(), f64::NAN, f64::NAN),
        };
        self.changes = changes;
        self.continuous = matches!(self.samples, Samples::Numeric(_)) && changes > intervals / 4;
        self.vetoed = !self.continuous && changes > intervals / 100;
        if min.is_finite() && max.is_finite() {
            self.min = min;
            self.max = max;
        }
    }

    /// Splits the throw of a continuous argument into round divisions.
    fn divide_throw(&mut self, base: u64, minors_fit: f64) {
        if !self.continuous || !self.min.is_finite() {
            return;
        }
        let mut throw = self.max - self.min;
        if (throw - throw.round()).abs() < 1e-10 && ((throw % 2.0) - 1.0).abs() < 0.1 {
            throw = (throw + 0.5).ceil();
        }
        throw = (throw - 1e-10).ceil();
        let out_of_range = throw > 1e6
            || self.min < f64::from(i32::MIN) + 10.0
            || self.max > f64::from(i32::MAX) - 10.0;
        self.throw = if out_of_range { 0 } else { throw.max(0.0) as u64 };
        self.min = self.min.floor();
        let scale = base.pow((FACTOR_MULTIPLY - 1) as u32);
        self.throw_factors = factorise(self.throw * scale, MAX_FACTORS, (minors_fit * 1.2) as u64);
    }

    fn note_oom(&mut self, oom: i32) {
        self.oom_range = Some(match self.oom_range {
            Some((lo, hi)) => (lo.min(oom), hi.max(oom)),
            None => (oom, oom),
        });
    }
}

/// Every argument sample and candidate for one axis.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Number of sample points; intervals run from 1 to `intervals - 1`.
    pub intervals: usize,
    /// Arguments, sorted so that discrete ones come before continuous ones
    /// and slow movers before fast ones.
    pub args: Vec<ArgumentSample>,
    /// Candidates in interval order.
    pub candidates: Vec<TickCandidate>,
    /// Integer base used for digit candidates.
    pub log_base: u64,
    /// Factors of `log_base^2` used for fractional candidates.
    pub base_factors: Vec<u64>,
    /// Format arguments, indexed by [`ArgumentSample::id`].
    pub expressions: Vec<Expression>,
}

impl Catalog {
    /// Samples the format arguments of `axis` along its finalized range.
    ///
    /// Returns `HeuristicFailure` when the axis cannot be ticked this way, in
    /// which case round-number stepping should be used instead.
    pub fn sample(
        axis: &Axis,
        majors_fit: f64,
        minors_fit: f64,
        scope: &mut Scope,
    ) -> Result<Self, AxisError> {
        let intervals = ((2.0 + majors_fit) * STEP_DUPLICITY as f64) as usize;
        let expressions = argument_expressions(axis, majors_fit, scope)?;
        let dims = axis.state.data_dims();

        let mut args = Vec::with_capacity(expressions.len());
        {
            let mut binding = scope.bind(axis.variable());
            binding.set_quantity(axis.state.inverse_position(0.5), dims);
            for (id, expr) in expressions.iter().enumerate() {
                let samples = match expr.evaluate(binding.scope()) {
                    Ok(Value::Number(_)) => Samples::Numeric(allocate(intervals)?),
                    Ok(Value::Text(_)) => Samples::Text(allocate(intervals)?),
                    Err(err) => {
                        return Err(AxisError::heuristic(format!(
                            "format argument '{}' cannot be evaluated at the centre of {}: {err}",
                            expr.source(),
                            axis.id
                        )))
                    }
                };
                args.push(ArgumentSample::new(id, samples));
            }

            for j in 0..intervals {
                let t = j as f64 / (intervals - 1) as f64;
                binding.set_quantity(axis.state.inverse_position(t), dims);
                for (arg, expr) in args.iter_mut().zip(&expressions) {
                    let value = expr.evaluate(binding.scope());
                    match &mut arg.samples {
                        Samples::Numeric(v) => v.push(match value {
                            Ok(Value::Number(q)) if q.is_real() => q.re(),
                            _ => f64::NAN,
                        }),
                        Samples::Text(v) => v.push(match value {
                            Ok(Value::Text(s)) => s,
                            _ => String::new(),
                        }),
                    }
                }
            }
        }

        let log_base = if axis.state.log {
            axis.config.log_base.round().max(2.0) as u64
        } else {
            10
        };
        for arg in &mut args {
            arg.summarise(intervals);
            arg.divide_throw(log_base, minors_fit);
        }
        score_speeds(&mut args, intervals);
        args.sort_by(|a, b| {
            let rank = |s: &ArgumentSample| {
                (s.vetoed, s.continuous, if s.continuous { s.score } else { s.changes as u64 })
            };
            rank(a).cmp(&rank(b))
        });

        let base_factors = factorise(
            log_base * log_base,
            MAX_FACTORS,
            (minors_fit * 1.2) as u64,
        );
        let mut filer = Filer::new(args.len() * intervals * MAX_TICKS_PER_INTERVAL)?;
        let base = log_base as f64;
        for j in 1..intervals {
            for (i, arg) in args.iter_mut().enumerate() {
                if arg.vetoed {
                    continue;
                }
                if !arg.continuous {
                    if arg.samples.changes_at(j) {
                        filer.file(SchemeKey::change(i), j, 0.0);
                    }
                    continue;
                }
                let Samples::Numeric(values) = &arg.samples else {
                    continue;
                };
                let (xn, yn) = (values[j - 1], values[j]);
                if !xn.is_finite() || !yn.is_finite() {
                    continue;
                }
                file_throw_divisions(&mut filer, i, arg, j, xn, yn, base);
                file_digits(&mut filer, i, arg, j, xn, yn, base, &base_factors);
            }
        }
        if filer.overflowed {
            debug!(axis = %axis.id, "tick candidate buffer full; later candidates dropped");
        }
        debug!(
            axis = %axis.id,
            intervals,
            args = args.len(),
            candidates = filer.candidates.len(),
            "sampled tick candidates"
        );

        Ok(Self {
            intervals,
            args,
            candidates: filer.candidates,
            log_base,
            base_factors,
            expressions,
        })
    }

    /// Axis position of sample `j`.
    pub fn sample_position(&self, j: usize) -> f64 {
        j as f64 / (self.intervals - 1) as f64
    }
}

fn allocate<T>(n: usize) -> Result<Vec<T>, AxisError> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| AxisError::out_of_memory("sampling format arguments"))?;
    Ok(v)
}

/// The expressions whose values decide where ticks go: the format rule's
/// arguments, or the axis variable itself (its logarithm on wide log axes).
fn argument_expressions(
    axis: &Axis,
    majors_fit: f64,
    scope: &mut Scope,
) -> Result<Vec<Expression>, AxisError> {
    if let Some(rule) = &axis.format {
        if !rule.has_template() || rule.args().is_empty() {
            return Err(AxisError::heuristic(format!(
                "format rule of {} has no arguments to place ticks by",
                axis.id
            )));
        }
        return Ok(rule.args().to_vec());
    }
    let var = axis.variable();
    let state = &axis.state;
    let base = axis.config.log_base;
    let decades = ((state.max / state.min).ln() / base.ln()).abs();
    let source = if state.interpolation.is_none() && state.log && decades > majors_fit {
        format!("logn({var}, {base})")
    } else {
        var.to_string()
    };
    Ok(vec![Expression::compile(&source, scope)?])
}

/// Ranks arguments in every interval by how far they move, and accumulates a
/// score that is highest for the fastest movers.
fn score_speeds(args: &mut [ArgumentSample], intervals: usize) {
    let n = args.len();
    let mut order: Vec<(usize, f64)> = Vec::with_capacity(n);
    for j in 1..intervals {
        order.clear();
        for (i, arg) in args.iter().enumerate() {
            let delta = match &arg.samples {
                Samples::Numeric(v) => (v[j] - v[j - 1]).abs(),
                Samples::Text(_) => 0.0,
            };
            order.push((i, if delta.is_nan() { 0.0 } else { delta }));
        }
        order.sort_by(|a, b| b.1.total_cmp(&a.1));
        for (rank, &(i, _)) in order.iter().enumerate() {
            args[i].score += (n - rank) as u64;
        }
    }
}

struct Filer {
    candidates: Vec<TickCandidate>,
    capacity: usize,
    overflowed: bool,
}

impl Filer {
    fn new(capacity: usize) -> Result<Self, AxisError> {
        Ok(Self {
            candidates: allocate(capacity)?,
            capacity,
            overflowed: false,
        })
    }

    fn file(&mut self, key: SchemeKey, interval: usize, target: f64) {
        if self.candidates.len() < self.capacity {
            self.candidates.push(TickCandidate {
                key,
                interval,
                target,
            });
        } else {
            self.overflowed = true;
        }
    }
}

fn file_throw_divisions(
    filer: &mut Filer,
    i: usize,
    arg: &ArgumentSample,
    j: usize,
    xn: f64,
    yn: f64,
    base: f64,
) {
    let scale = base.powi(FACTOR_MULTIPLY - 1);
    for (k, &factor) in arg.throw_factors.iter().enumerate() {
        let factor = factor as f64;
        let step = factor / scale;
        let nd = (xn - arg.min) / step;
        let n = nd.round();
        if j == 1 && (nd - n).abs() < 1e-12 {
            filer.file(SchemeKey::throw(i, k), j, arg.min + n * step);
        }
        let n = ((xn - arg.min) / step).floor();
        let m = ((yn - arg.min) / step).floor();
        if n != m {
            filer.file(SchemeKey::throw(i, k), j, arg.min + n.max(m) * step);
        }
    }
}

/// Priority of a leading digit: 1 beats 2 and 5, which beat the rest.
fn digit_priority(leading: f64) -> i32 {
    if leading < 2.0 {
        -3
    } else if leading == 2.0 || leading == 5.0 {
        -2
    } else {
        -1
    }
}

/// Logarithm of `x` in the base whose natural log is `ln_base`, snapped to
/// the nearest integer when within rounding error of it, so that exact
/// powers of the base floor to their own exponent.
pub(crate) fn log_in_base(x: f64, ln_base: f64) -> f64 {
    let q = x.ln() / ln_base;
    let nearest = q.round();
    if q.is_finite() && (q - nearest).abs() < 1e-12 * nearest.abs().max(1.0) {
        nearest
    } else {
        q
    }
}

#[allow(clippy::too_many_arguments)]
fn file_digits(
    filer: &mut Filer,
    i: usize,
    arg: &mut ArgumentSample,
    j: usize,
    xn: f64,
    yn: f64,
    base: f64,
    base_factors: &[u64],
) {
    let ln_base = base.ln();
    let steps = (1e-15f64.ln() / ln_base).abs() as i32;
    let oom_x = log_in_base(xn.abs(), ln_base);
    let oom_y = log_in_base(yn.abs(), ln_base);
    let oom = if !oom_x.is_finite() {
        oom_y.floor()
    } else if !oom_y.is_finite() {
        oom_x.floor()
    } else {
        oom_x.max(oom_y).floor()
    };
    let level = |n: i32| (oom - f64::from(n)) as i32;
    let divisor = |n: i32| base.powf(oom - f64::from(n));

    let crosses_zero = (xn != 0.0 && yn == 0.0)
        || (xn == 0.0 && j == 1)
        || (xn < 0.0 && yn > 0.0)
        || (xn > 0.0 && yn < 0.0);
    let mut n = 0;
    if crosses_zero {
        filer.file(SchemeKey::zero(i), j, 0.0);
    } else if xn != 0.0 || yn != 0.0 {
        if j == 1 {
            for s in 0..steps {
                let d = divisor(s);
                if !d.is_finite() {
                    continue;
                }
                let q = xn / d;
                if (q.round() - q).abs() < 1e-12 {
                    let priority = if s > 0 { 0 } else { digit_priority(q.round().abs()) };
                    arg.note_oom(level(s));
                    filer.file(SchemeKey::digit(i, level(s), priority), j, q.round() * d);
                    break;
                }
            }
        }
        n = steps;
        for s in 0..steps {
            let d = divisor(s);
            if !d.is_finite() || (xn / d).floor() == (yn / d).floor() {
                continue;
            }
            let zn = if xn.abs() > yn.abs() { xn } else { yn };
            let priority = if s > 0 { 0 } else { digit_priority((zn / d).abs().round()) };
            arg.note_oom(level(s));
            filer.file(
                SchemeKey::digit(i, level(s), priority),
                j,
                (xn.max(yn) / d).floor() * d,
            );
            n = s;
            break;
        }
    }

    if n >= steps {
        return;
    }
    let base_sq = base.powi(FACTOR_MULTIPLY);
    let depth = if crosses_zero || j == 1 { steps } else { 3 };
    for m in ((n - depth)..=n).rev() {
        let d = divisor(m);
        if !d.is_finite() {
            continue;
        }
        let priority = if (xn / d).abs().floor() == 0.0 { 0 } else { -1 };
        for (o, &factor) in base_factors.iter().enumerate() {
            let factor = factor as f64;
            let xf = xn / d * base_sq / factor;
            let yf = yn / d * base_sq / factor;
            let key = SchemeKey::fraction(i, level(m), 2 * (o as i32 + 1) + priority);
            if xf.floor() != yf.floor() {
                filer.file(key, j, xf.floor().max(yf.floor()) * d / base_sq * factor);
            } else if j == 1 && (xf.round() - xf).abs() < 1e-12 {
                filer.file(key, j, xf.round() * d / base_sq * factor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::{AxisConfig, AxisId, Direction};

    fn axis(min: f64, max: f64, format: Option<&str>, scope: &mut Scope) -> Axis {
        let config = AxisConfig {
            format: format.map(str::to_string),
            ..AxisConfig::default()
        };
        let mut axis = Axis::new(AxisId::new(0, Direction::X, 1), config, scope).expect("valid axis");
        axis.state.min = min;
        axis.state.max = max;
        axis.state.range_finalized = true;
        axis
    }

    #[test]
    fn factorise_orders_and_trims() {
        assert_eq!(factorise(100, MAX_FACTORS, 20), vec![5, 10, 20, 25, 50]);
        assert_eq!(factorise(100, MAX_FACTORS, 24), vec![5, 10, 20, 25, 50]);
        assert_eq!(factorise(12, MAX_FACTORS, 100), vec![2, 3, 4, 6]);
        assert_eq!(factorise(49, MAX_FACTORS, 100), vec![7]);
        assert!(factorise(0, MAX_FACTORS, 100).is_empty());
        assert!(factorise(7, MAX_FACTORS, 100).is_empty());
    }

    #[test]
    fn plain_axis_samples_one_continuous_argument() {
        let mut scope = Scope::new();
        let a = axis(0.0, 100.0, None, &mut scope);
        let catalog = Catalog::sample(&a, 5.0, 20.0, &mut scope).expect("sampled");
        assert_eq!(catalog.intervals, 700);
        assert_eq!(catalog.args.len(), 1);
        let arg = &catalog.args[0];
        assert!(arg.continuous && !arg.vetoed);
        assert_eq!((arg.min, arg.throw), (0.0, 100));
        assert!(!arg.throw_factors.is_empty());

        assert!(catalog
            .candidates
            .iter()
            .any(|c| c.key == SchemeKey::zero(0) && c.interval == 1 && c.target == 0.0));
        assert!(catalog
            .candidates
            .iter()
            .all(|c| c.target >= -1e-9 && c.target <= 100.0 + 1e-9));
        assert!(catalog
            .candidates
            .windows(2)
            .all(|w| w[0].interval <= w[1].interval));
        assert_eq!(scope.get("x"), None);
    }

    #[test]
    fn text_argument_is_discrete() {
        let mut scope = Scope::new();
        let a = axis(
            0.0,
            100.0,
            Some("'%s' % (select(x < 50, 'low', 'high'))"),
            &mut scope,
        );
        let catalog = Catalog::sample(&a, 5.0, 20.0, &mut scope).expect("sampled");
        let arg = &catalog.args[0];
        assert!(!arg.continuous && !arg.vetoed);
        assert_eq!(arg.changes, 1);
        assert_eq!(catalog.candidates.len(), 1);
        let change = catalog.candidates[0];
        assert_eq!(change.key, SchemeKey::change(0));
        assert!((catalog.sample_position(change.interval) - 0.5).abs() < 2e-3);
    }

    #[test]
    fn bare_expression_format_is_rejected() {
        let mut scope = Scope::new();
        let a = axis(0.0, 1.0, Some("'tick'"), &mut scope);
        let err = Catalog::sample(&a, 5.0, 20.0, &mut scope).expect_err("no arguments");
        assert!(matches!(err, AxisError::HeuristicFailure { .. }), "unexpected error: {err}");
    }

    #[test]
    fn unevaluable_centre_is_a_heuristic_failure() {
        let mut scope = Scope::new();
        let a = axis(0.0, 1.0, Some("'%s' % (q)"), &mut scope);
        let err = Catalog::sample(&a, 5.0, 20.0, &mut scope).expect_err("undefined q");
        assert!(matches!(err, AxisError::HeuristicFailure { .. }), "unexpected error: {err}");
    }

    #[test]
    fn impossible_buffers_are_out_of_memory() {
        let err = Filer::new(usize::MAX).err().expect("cannot reserve usize::MAX candidates");
        assert!(matches!(err, AxisError::OutOfMemory { .. }), "unexpected error: {err}");

        let mut scope = Scope::new();
        let a = axis(0.0, 1.0, Some("'%.1f' % (x)"), &mut scope);
        let err = Catalog::sample(&a, 1e30, 20.0, &mut scope).expect_err("too many samples");
        assert!(matches!(err, AxisError::OutOfMemory { .. }), "unexpected error: {err}");
        assert_eq!(scope.get("x"), None);
    }

    #[test]
    fn powers_of_the_base_keep_their_exponent() {
        let ln10 = 10f64.ln();
        assert_eq!(log_in_base(1000.0, ln10), 3.0);
        assert_eq!(log_in_base(1e-6, ln10), -6.0);
        assert_eq!(log_in_base(1024.0, 2f64.ln()), 10.0);
        assert_eq!(log_in_base(999.0, ln10).floor(), 2.0);
        assert!(log_in_base(0.0, ln10).is_infinite());
    }

    #[test]
    fn wide_log_axis_samples_the_exponent() {
        let mut scope = Scope::new();
        let mut a = axis(1.0, 1e12, None, &mut scope);
        a.state.log = true;
        let catalog = Catalog::sample(&a, 5.0, 20.0, &mut scope).expect("sampled");
        assert_eq!(catalog.expressions[0].source(), "logn(x, 10)");
        let values = catalog.args[0].numeric().expect("numeric");
        assert!((values[0] - 0.0).abs() < 1e-9);
        assert!((values[values.len() - 1] - 12.0).abs() < 1e-9);
    }
}
