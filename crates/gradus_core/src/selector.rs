//! Chooses which candidate families become major and minor ticks, then
//! pins each chosen tick to its exact position.

use crate::axis::{Axis, Tick};
use crate::catalog::{ArgumentSample, Catalog, SchemeKey, Samples, TickCandidate};
use crate::error::Diagnostics;
use crate::expression::{Expression, Scope, Value};
use crate::label::TickLabeller;
use tracing::{debug, trace};

/// Most bisection steps spent locating one tick.
const MAX_BISECTIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mark {
    #[default]
    Unset,
    Major,
    Minor,
}

/// Major and minor counts of a scheme, `-1` standing for no scheme.
type Tally = (isize, isize);

const NO_TALLY: Tally = (-1, -1);

/// Result of laying one scheme over the marks accepted so far.
#[derive(Debug, Clone)]
pub struct Trial {
    pub marks: Vec<Mark>,
    pub majors: isize,
    pub minors: isize,
    /// False when two majors crowd each other, or the new minors are denser
    /// than the axis length allows.
    pub acceptable: bool,
}

impl Trial {
    fn tally(&self) -> Tally {
        (self.majors, self.minors)
    }
}

fn within_one(a: &TickCandidate, b: &TickCandidate) -> bool {
    b.interval + 1 >= a.interval && b.interval <= a.interval + 1
}

/// Marks every candidate of `key` on top of `input`. Majors displace any
/// tick already sitting at the same target; minors displace only minors.
/// `length` is the number of ticks of this kind that fit on the axis.
pub fn add_scheme(
    catalog: &Catalog,
    key: SchemeKey,
    input: &[Mark],
    major: bool,
    length: f64,
) -> Trial {
    let candidates = &catalog.candidates;
    let spacing = length / (catalog.intervals - 1) as f64;
    let mut marks = input.to_vec();
    let mut majors = 0;
    let mut minors = 0;
    let mut acceptable = true;
    let mut span: Option<(usize, usize)> = None;

    for i in 0..candidates.len() {
        let c = &candidates[i];
        if c.key == key && (major || marks[i] == Mark::Unset) {
            let mut abort = false;
            let neighbours = (0..i)
                .rev()
                .take_while(|&j| within_one(c, &candidates[j]))
                .chain((i + 1..candidates.len()).take_while(|&j| within_one(c, &candidates[j])));
            for j in neighbours.collect::<Vec<_>>() {
                if marks[j] == Mark::Unset || candidates[j].target != c.target {
                    continue;
                }
                if major || marks[j] == Mark::Minor {
                    marks[j] = Mark::Unset;
                } else {
                    abort = true;
                }
            }
            if !abort {
                marks[i] = if major { Mark::Major } else { Mark::Minor };
                span = Some(match span {
                    Some((lo, hi)) => (lo.min(c.interval), hi.max(c.interval)),
                    None => (c.interval, c.interval),
                });
            }
        }

        match marks[i] {
            Mark::Major => majors += 1,
            Mark::Minor => minors += 1,
            Mark::Unset => {}
        }
        if major && marks[i] == Mark::Major {
            if let Some(j) = (0..i).rev().find(|&j| marks[j] == Mark::Major) {
                let gap = c.interval.abs_diff(candidates[j].interval) as f64 * spacing;
                if gap < 1.0 {
                    acceptable = false;
                }
            }
        }
    }

    if !major {
        acceptable = match span {
            None => true,
            Some((lo, hi)) => {
                let count = (0..candidates.len())
                    .filter(|&i| {
                        marks[i] != Mark::Unset
                            && candidates[i].interval >= lo
                            && candidates[i].interval <= hi
                    })
                    .count();
                count <= 1 || spacing * (hi - lo) as f64 / (count - 1) as f64 > 1.0
            }
        };
    }

    Trial {
        marks,
        majors,
        minors,
        acceptable,
    }
}

fn count(marks: &[Mark]) -> Tally {
    marks.iter().fold((0, 0), |(majors, minors), m| match m {
        Mark::Major => (majors + 1, minors),
        Mark::Minor => (majors, minors + 1),
        Mark::Unset => (majors, minors),
    })
}

/// Picks tick schemes argument by argument. `None` when no major tick
/// could be placed at all.
pub fn select(catalog: &Catalog, majors_fit: f64, minors_fit: f64) -> Option<Vec<Mark>> {
    let mut accepted = vec![Mark::Unset; catalog.candidates.len()];
    for (i, arg) in catalog.args.iter().enumerate() {
        if arg.vetoed {
            continue;
        }
        if !arg.continuous {
            for (major, length) in [(true, majors_fit), (false, minors_fit)] {
                let trial = add_scheme(catalog, SchemeKey::change(i), &accepted, major, length);
                if trial.acceptable {
                    debug!(arg = i, major, ticks = trial.majors, "marking changes of discrete argument");
                    accepted = trial.marks;
                    break;
                }
            }
            continue;
        }

        let (throw_tally, throw_marks) = divide_throw(catalog, i, &accepted, majors_fit, minors_fit);
        let (base_tally, base_marks) = divide_base(catalog, i, &accepted, majors_fit, minors_fit);
        debug!(arg = i, ?throw_tally, ?base_tally, "compared tick schemes");
        if throw_wins(throw_tally, base_tally) {
            if throw_tally.0 > 0 {
                accepted = throw_marks;
            }
        } else if base_tally.0 > 0 {
            accepted = base_marks;
        }
    }
    accepted.contains(&Mark::Major).then_some(accepted)
}

/// Throw divisions win only on more majors, or as many majors and more
/// minors. A full tie goes to the base scheme.
fn throw_wins(throw: Tally, base: Tally) -> bool {
    throw > base
}

/// Majors at the coarsest acceptable division of the argument's throw, with
/// minors at a finer division that the major one is a multiple of.
fn divide_throw(
    catalog: &Catalog,
    i: usize,
    accepted: &[Mark],
    majors_fit: f64,
    minors_fit: f64,
) -> (Tally, Vec<Mark>) {
    let factors = &catalog.args[i].throw_factors;
    for k in 0..factors.len() {
        let trial = add_scheme(catalog, SchemeKey::throw(i, k), accepted, true, majors_fit);
        trace!(arg = i, factor = factors[k], ticks = trial.majors, pass = trial.acceptable, "throw division");
        if !trial.acceptable {
            continue;
        }
        let mut tally = trial.tally();
        let mut marks = trial.marks;
        for f in (0..k).filter(|&f| factors[k] % factors[f] == 0) {
            let minor = add_scheme(catalog, SchemeKey::throw(i, f), &marks, false, minors_fit);
            if minor.acceptable {
                tally = minor.tally();
                marks = minor.marks;
                break;
            }
        }
        return (tally, marks);
    }
    (NO_TALLY, Vec::new())
}

/// Lays a fraction scheme, optionally preceded by its odd-priority twin.
#[allow(clippy::too_many_arguments)]
fn fraction_pair(
    catalog: &Catalog,
    i: usize,
    oom: i32,
    index: usize,
    with_odd: bool,
    input: &[Mark],
    major: bool,
    length: f64,
) -> Trial {
    let even = SchemeKey::fraction(i, oom, 2 * (index as i32 + 1));
    if with_odd {
        let odd = SchemeKey::fraction(i, oom, 2 * (index as i32 + 1) - 1);
        let first = add_scheme(catalog, odd, input, major, length);
        if !first.acceptable {
            return first;
        }
        add_scheme(catalog, even, &first.marks, major, length)
    } else {
        add_scheme(catalog, even, input, major, length)
    }
}

/// Ticks at round numbers in the argument's own base: either fractions of
/// each order of magnitude, or 1, 2, 5 and friends layered downwards.
fn divide_base(
    catalog: &Catalog,
    i: usize,
    accepted: &[Mark],
    majors_fit: f64,
    minors_fit: f64,
) -> (Tally, Vec<Mark>) {
    let Some((oom_min, oom_max)) = catalog.args[i].oom_range else {
        return (NO_TALLY, Vec::new());
    };
    let factors = &catalog.base_factors;
    let mut new = accepted.to_vec();
    let mut previous = NO_TALLY;
    let mut best_fraction = NO_TALLY;
    let mut best_fraction_marks = Vec::new();

    let top = oom_max.saturating_add(1);
    for k in (oom_min..=top).rev() {
        let (majors_in, minors_in) = count(&new);

        // Fractions of this order of magnitude.
        let mut fraction_majors = -1;
        let mut chosen = None;
        'majors: for with_odd in [true, false] {
            for l in 0..factors.len() {
                let trial = fraction_pair(catalog, i, k, l, with_odd, &new, true, majors_fit);
                if trial.acceptable && trial.majors > majors_in {
                    fraction_majors = trial.majors;
                    chosen = Some((l, trial.marks));
                    break 'majors;
                }
            }
        }
        let (l_final, mut rough) = match chosen {
            Some((l, marks)) => (Some(l), marks),
            None => (None, new.clone()),
        };

        let mut fraction_minors = minors_in;
        'minors: for with_odd in [true, false] {
            for l in 0..factors.len() {
                if fraction_minors > minors_in {
                    break 'minors;
                }
                if l_final.is_some_and(|lf| factors[lf] % factors[l] != 0) {
                    continue;
                }
                let trial = fraction_pair(catalog, i, k, l, with_odd, &rough, false, minors_fit);
                fraction_majors = trial.majors;
                if trial.acceptable {
                    fraction_minors = trial.minors;
                    if trial.minors > minors_in {
                        rough = trial.marks;
                    }
                } else {
                    fraction_minors = minors_in;
                }
            }
        }
        let fraction = (fraction_majors, fraction_minors);
        if fraction > best_fraction {
            best_fraction = fraction;
            best_fraction_marks = rough;
        }

        // Whole digits: zero first, then 1, 1-2-5, 1-2-3-4... as majors until
        // they crowd, then as minors.
        let mut digits = previous;
        if k == top {
            let zero = add_scheme(catalog, SchemeKey::zero(i), &new, true, majors_fit);
            if zero.acceptable {
                new = zero.marks;
            }
        }
        let mut major = true;
        let mut priority = -3;
        while priority <= 0 {
            let length = if major { majors_fit } else { minors_fit };
            let trial = add_scheme(catalog, SchemeKey::digit(i, k, priority), &new, major, length);
            if trial.acceptable {
                digits = trial.tally();
                new = trial.marks;
                priority += 1;
            } else if major {
                major = false;
            } else {
                break;
            }
        }
        trace!(arg = i, oom = k, ?digits, ?fraction, "order of magnitude");

        if k < oom_max
            && digits == previous
            && fraction.0 <= digits.0
            && fraction.1 <= digits.1
        {
            break;
        }
        previous = digits;
    }

    if best_fraction > previous {
        (best_fraction, best_fraction_marks)
    } else {
        (previous, new)
    }
}

/// Turns accepted candidates into ticks, bisecting each one's interval to
/// find where its argument reaches the target. Only the kinds flagged in
/// `want_major` and `want_minor` are produced.
#[allow(clippy::too_many_arguments)]
pub fn place(
    catalog: &Catalog,
    marks: &[Mark],
    axis: &Axis,
    labeller: &TickLabeller<'_>,
    want_major: bool,
    want_minor: bool,
    scope: &mut Scope,
    diagnostics: &mut Diagnostics,
) -> (Vec<Tick>, Vec<Tick>) {
    let mut major = Vec::new();
    let mut minor = Vec::new();
    for (candidate, &mark) in catalog.candidates.iter().zip(marks) {
        let wanted = match mark {
            Mark::Major => want_major,
            Mark::Minor => want_minor,
            Mark::Unset => false,
        };
        if !wanted {
            continue;
        }
        let arg = &catalog.args[candidate.key.arg];
        let expr = &catalog.expressions[arg.id];
        let position = locate(catalog, arg, expr, candidate, axis, scope);

        let state = &axis.state;
        let mut x = state.inverse_position(position);
        let x1 = state.inverse_position(position - 1e-14);
        let x2 = state.inverse_position(position + 1e-14);
        if (x1 <= 0.0 && x2 >= 0.0) || (x1 >= 0.0 && x2 <= 0.0) {
            x = 0.0;
        }

        if mark == Mark::Major {
            major.push(Tick {
                position,
                label: labeller.label(x, scope, diagnostics),
            });
        } else {
            minor.push(Tick {
                position,
                label: String::new(),
            });
        }
    }
    (major, minor)
}

fn locate(
    catalog: &Catalog,
    arg: &ArgumentSample,
    expr: &Expression,
    candidate: &TickCandidate,
    axis: &Axis,
    scope: &mut Scope,
) -> f64 {
    let iv = candidate.interval;
    let mut lo = catalog.sample_position(iv - 1);
    let mut hi = catalog.sample_position(iv);
    let dims = axis.state.data_dims();
    let mut binding = scope.bind(axis.variable());

    for _ in 0..MAX_BISECTIONS {
        let mid = 0.5 * (lo + hi);
        binding.set_quantity(axis.state.inverse_position(mid), dims);
        let value = expr.evaluate(binding.scope());
        let move_lower = match &arg.samples {
            Samples::Text(v) => {
                let text = match &value {
                    Ok(Value::Text(s)) => s.as_str(),
                    _ => "",
                };
                text == v[iv - 1]
            }
            Samples::Numeric(v) => {
                let x = match &value {
                    Ok(Value::Number(q)) => q.re(),
                    _ => f64::NAN,
                };
                if arg.continuous {
                    let slope_positive = v[iv] >= v[iv - 1];
                    slope_positive ^ (x >= candidate.target)
                } else {
                    x == v[iv - 1]
                }
            }
        };
        if move_lower {
            lo = mid;
        } else {
            hi = mid;
        }
        if lo == hi {
            break;
        }
    }
    0.5 * (lo + hi)
}
