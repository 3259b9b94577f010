//! Physical dimensions, quantities and display units.
//!
//! A [`Dimensions`] vector holds one exponent per SI base unit. Every numeric
//! value that flows through the expression engine is a [`Quantity`]: a complex
//! payload tagged with its dimensions, always stored in SI base units.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BASE_UNITS: usize = 7;

/// Symbols of the SI base units, in exponent order.
pub const BASE_UNIT_SYMBOLS: [&str; BASE_UNITS] = ["m", "kg", "s", "A", "K", "mol", "cd"];

pub const METRE: usize = 0;
pub const KILOGRAM: usize = 1;
pub const SECOND: usize = 2;
pub const AMPERE: usize = 3;
pub const KELVIN: usize = 4;
pub const MOLE: usize = 5;
pub const CANDELA: usize = 6;

const EXPONENT_TOLERANCE: f64 = 1e-12;

const SI_PREFIXES: [(&str, f64); 9] = [
    ("p", 1e-12),
    ("n", 1e-9),
    ("\\mu ", 1e-6),
    ("m", 1e-3),
    ("", 1.0),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
];

/// Exponents of the SI base units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimensions(pub [f64; BASE_UNITS]);

impl Dimensions {
    pub const fn dimensionless() -> Self {
        Self([0.0; BASE_UNITS])
    }

    pub fn base(index: usize) -> Self {
        let mut exponents = [0.0; BASE_UNITS];
        exponents[index] = 1.0;
        Self(exponents)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|e| e.abs() < EXPONENT_TOLERANCE)
    }

    /// Dimensional equality, tolerant of rounding in fractional exponents.
    pub fn matches(&self, other: &Self) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() < EXPONENT_TOLERANCE)
    }

    pub fn multiply(&self, other: &Self) -> Self {
        let mut out = *self;
        for (e, o) in out.0.iter_mut().zip(other.0.iter()) {
            *e += o;
        }
        out
    }

    pub fn divide(&self, other: &Self) -> Self {
        let mut out = *self;
        for (e, o) in out.0.iter_mut().zip(other.0.iter()) {
            *e -= o;
        }
        out
    }

    pub fn powf(&self, power: f64) -> Self {
        let mut out = *self;
        for e in out.0.iter_mut() {
            *e *= power;
        }
        out
    }

    /// Rounds exponents lying within 1e-12 of an integer onto that integer.
    pub fn snap_integers(&mut self) {
        for e in self.0.iter_mut() {
            if (e.floor() - *e).abs() < EXPONENT_TOLERANCE {
                *e = e.floor();
            } else if (e.ceil() - *e).abs() < EXPONENT_TOLERANCE {
                *e = e.ceil();
            }
        }
    }

    /// The base-unit index when these dimensions are exactly one base unit to
    /// the first power.
    pub fn single_base(&self) -> Option<usize> {
        let mut found = None;
        for (i, e) in self.0.iter().enumerate() {
            if e.abs() < EXPONENT_TOLERANCE {
                continue;
            }
            if (e - 1.0).abs() >= EXPONENT_TOLERANCE || found.is_some() {
                return None;
            }
            found = Some(i);
        }
        found
    }

    /// LaTeX rendering used in axis labels, e.g. `m\,s^{-1}`.
    pub fn latex(&self) -> String {
        self.render("\\,", |e| format!("^{{{}}}", format_exponent(e)))
    }

    fn render(&self, separator: &str, exponent: impl Fn(f64) -> String) -> String {
        let mut parts = Vec::new();
        for (i, e) in self.0.iter().enumerate() {
            if e.abs() < EXPONENT_TOLERANCE {
                continue;
            }
            if (e - 1.0).abs() < EXPONENT_TOLERANCE {
                parts.push(BASE_UNIT_SYMBOLS[i].to_string());
            } else {
                parts.push(format!("{}{}", BASE_UNIT_SYMBOLS[i], exponent(*e)));
            }
        }
        parts.join(separator)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let text = self.render(" ", |e| format!("^{}", format_exponent(e)));
        write!(f, "{text}")
    }
}

fn format_exponent(e: f64) -> String {
    if e.fract() == 0.0 {
        format!("{}", e as i64)
    } else {
        format!("{e}")
    }
}

/// A complex value with physical dimensions, in SI base units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: Complex64,
    pub dims: Dimensions,
}

impl Quantity {
    pub fn new(value: Complex64, dims: Dimensions) -> Self {
        Self { value, dims }
    }

    pub fn real(value: f64, dims: Dimensions) -> Self {
        Self {
            value: Complex64::new(value, 0.0),
            dims,
        }
    }

    pub fn dimensionless(value: f64) -> Self {
        Self::real(value, Dimensions::dimensionless())
    }

    pub fn re(&self) -> f64 {
        self.value.re
    }

    pub fn is_real(&self) -> bool {
        self.value.im == 0.0
    }

    pub fn is_finite(&self) -> bool {
        self.value.re.is_finite() && self.value.im.is_finite()
    }
}

/// A user-preferred unit in which to display an axis, e.g. `km`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferredUnit {
    /// LaTeX symbol.
    pub symbol: String,
    /// Size of one display unit in SI base units.
    pub scale: f64,
    pub dims: Dimensions,
}

/// The unit an axis is labelled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayUnit {
    pub symbol: String,
    pub scale: f64,
}

impl Default for DisplayUnit {
    fn default() -> Self {
        Self {
            symbol: String::new(),
            scale: 1.0,
        }
    }
}

impl DisplayUnit {
    /// Factor converting SI values into display values.
    pub fn multiplier(&self) -> f64 {
        let m = 1.0 / self.scale;
        if m.is_finite() && m != 0.0 {
            m
        } else {
            1.0
        }
    }

    /// Picks the display unit for data of the given dimensions, whose typical
    /// magnitude (in SI) is `central`.
    pub fn choose(dims: &Dimensions, central: f64, preferred: Option<&PreferredUnit>) -> Self {
        if dims.is_dimensionless() {
            return Self::default();
        }
        if let Some(unit) = preferred {
            if unit.dims.matches(dims) && unit.scale.is_finite() && unit.scale > 0.0 {
                return Self {
                    symbol: unit.symbol.clone(),
                    scale: unit.scale,
                };
            }
        }
        match dims.single_base() {
            Some(KILOGRAM) => prefixed("g", 1e-3, central),
            Some(index) => prefixed(BASE_UNIT_SYMBOLS[index], 1.0, central),
            None => Self {
                symbol: dims.latex(),
                scale: 1.0,
            },
        }
    }
}

fn prefixed(root: &str, root_scale: f64, central: f64) -> DisplayUnit {
    let magnitude = (central / root_scale).abs();
    let mut chosen = ("", 1.0);
    if magnitude.is_finite() && magnitude > 0.0 {
        chosen = SI_PREFIXES[0];
        for prefix in SI_PREFIXES.iter() {
            if magnitude / prefix.1 >= 1.0 - 1e-12 {
                chosen = *prefix;
            }
        }
    } else if root_scale != 1.0 {
        chosen = ("k", 1e3);
    }
    DisplayUnit {
        symbol: format!("{}{}", chosen.0, root),
        scale: chosen.1 * root_scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_compose_and_compare() {
        let speed = Dimensions::base(METRE).divide(&Dimensions::base(SECOND));
        assert_eq!(speed.0[METRE], 1.0);
        assert_eq!(speed.0[SECOND], -1.0);
        assert!(speed.multiply(&Dimensions::base(SECOND)).matches(&Dimensions::base(METRE)));
        assert!(!speed.is_dimensionless());
        assert_eq!(format!("{speed}"), "m s^-1");
        assert_eq!(speed.latex(), "m\\,s^{-1}");
    }

    #[test]
    fn snap_integers_rounds_near_integers_only() {
        let mut dims = Dimensions([1.0 + 1e-13, -2.0 - 5e-13, 0.5, 0.0, 0.0, 0.0, 0.0]);
        dims.snap_integers();
        assert_eq!(dims.0[0], 1.0);
        assert_eq!(dims.0[1], -2.0);
        assert_eq!(dims.0[2], 0.5);
    }

    #[test]
    fn display_unit_picks_si_prefix_from_central_value() {
        let metres = Dimensions::base(METRE);
        let unit = DisplayUnit::choose(&metres, 2500.0, None);
        assert_eq!(unit.symbol, "km");
        assert!((unit.multiplier() - 1e-3).abs() < 1e-18);

        let unit = DisplayUnit::choose(&metres, 0.004, None);
        assert_eq!(unit.symbol, "mm");

        let mass = DisplayUnit::choose(&Dimensions::base(KILOGRAM), 2.0, None);
        assert_eq!(mass.symbol, "kg");
        assert!((mass.scale - 1.0).abs() < 1e-15);
    }

    #[test]
    fn preferred_unit_wins_when_dimensions_match() {
        let miles = PreferredUnit {
            symbol: "mi".to_string(),
            scale: 1609.344,
            dims: Dimensions::base(METRE),
        };
        let unit = DisplayUnit::choose(&Dimensions::base(METRE), 10.0, Some(&miles));
        assert_eq!(unit.symbol, "mi");

        let unit = DisplayUnit::choose(&Dimensions::base(SECOND), 10.0, Some(&miles));
        assert_eq!(unit.symbol, "s");
    }
}
