//! Axis declarations, finalized axis state and the value/position mapping.

use crate::error::AxisError;
use crate::expression::{Expression, Scope};
use crate::format::FormatRule;
use crate::units::{Dimensions, DisplayUnit, PreferredUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Number of samples in the piecewise-linear table of an axis defined
/// through a link mapping.
pub const INTERPOLATION_POINTS: usize = 2045;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    X,
    Y,
    Z,
    Color,
}

impl Direction {
    /// Name of the dummy variable bound while evaluating expressions for an
    /// axis in this direction.
    pub fn variable(self) -> &'static str {
        match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::Color => "c",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AxisId {
    pub plot: usize,
    pub direction: Direction,
    pub index: usize,
}

impl AxisId {
    pub fn new(plot: usize, direction: Direction, index: usize) -> Self {
        Self {
            plot,
            direction,
            index,
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "axis {}{} of plot {}",
            self.direction.variable(),
            self.index,
            self.plot
        )
    }
}

/// Link from one axis to another, optionally through a mapping expression
/// in terms of the target axis's variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisLink {
    pub target: AxisId,
    #[serde(default)]
    pub using: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualTick {
    /// Position in SI units.
    pub value: f64,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum TickSpec {
    #[default]
    Auto,
    /// Ticks every `step` from `start` to `end`; missing ends default to the
    /// axis range. Steps are multiplicative on logarithmic axes.
    Stepped {
        start: Option<f64>,
        step: f64,
        end: Option<f64>,
    },
    List(Vec<ManualTick>),
}

impl TickSpec {
    pub fn is_auto(&self) -> bool {
        matches!(self, Self::Auto)
    }
}

/// Per-axis declaration, as supplied by the plot data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisConfig {
    pub label: Option<String>,
    pub log: bool,
    pub log_base: f64,
    pub reversed: bool,
    /// Hard limits in SI units.
    pub hard_min: Option<f64>,
    pub hard_max: Option<f64>,
    pub hard_unit: Option<Dimensions>,
    pub display_unit: Option<PreferredUnit>,
    pub link: Option<AxisLink>,
    pub format: Option<String>,
    /// Physical length on the page in metres.
    pub length: Option<f64>,
    pub major_ticks: TickSpec,
    pub minor_ticks: TickSpec,
    /// Unit of manually specified tick positions.
    pub tick_unit: Option<Dimensions>,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            label: None,
            log: false,
            log_base: 10.0,
            reversed: false,
            hard_min: None,
            hard_max: None,
            hard_unit: None,
            display_unit: None,
            link: None,
            format: None,
            length: None,
            major_ticks: TickSpec::Auto,
            minor_ticks: TickSpec::Auto,
            tick_unit: None,
        }
    }
}

/// Extent of the data plotted against an axis, in SI units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: Option<Dimensions>,
}

impl Usage {
    pub fn include(&mut self, value: f64) {
        if self.min.map_or(true, |m| value < m) {
            self.min = Some(value);
        }
        if self.max.map_or(true, |m| value > m) {
            self.max = Some(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none() && self.unit.is_none()
    }
}

/// Hard range limits in force for an axis. Starts as the declared limits;
/// link propagation may replace them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HardLimits {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub unit: Option<Dimensions>,
}

impl HardLimits {
    pub fn both(&self) -> Option<(f64, f64)> {
        self.min.zip(self.max)
    }
}

/// Piecewise-linear sample table of a link-mapped axis. `turnings` holds the
/// sample indices bounding each monotonic region, first and last included.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolation {
    pub samples: Vec<f64>,
    pub turnings: Vec<usize>,
}

impl Interpolation {
    pub fn regions(&self) -> usize {
        self.turnings.len().saturating_sub(1).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Position along the axis, 0 at the start and 1 at the end.
    pub position: f64,
    pub label: String,
}

/// Everything finalization computes for an axis.
#[derive(Debug, Clone, Default)]
pub struct AxisState {
    pub range_finalized: bool,
    pub ticks_finalized: bool,
    pub min: f64,
    pub max: f64,
    pub log: bool,
    pub data_unit: Option<Dimensions>,
    pub display_unit: DisplayUnit,
    pub interpolation: Option<Rc<Interpolation>>,
    pub major: Vec<Tick>,
    pub minor: Vec<Tick>,
    pub label: Option<String>,
}

impl AxisState {
    pub fn data_dims(&self) -> Dimensions {
        self.data_unit.unwrap_or_default()
    }

    /// Factor converting SI values on this axis into display units.
    pub fn unit_multiplier(&self) -> f64 {
        self.display_unit.multiplier()
    }

    pub fn regions(&self) -> usize {
        self.interpolation.as_ref().map_or(1, |i| i.regions())
    }

    /// Where along the axis, from 0 to 1, the value falls. NaN when it is off
    /// the axis. `region` selects a monotonic region of an interpolated axis.
    pub fn position(&self, value: f64, region: usize) -> f64 {
        if let Some(table) = &self.interpolation {
            let (Some(&imin), Some(&imax)) = (table.turnings.get(region), table.turnings.get(region + 1))
            else {
                return f64::NAN;
            };
            let s = &table.samples;
            for i in imin..imax {
                if (s[i] < value && s[i + 1] >= value) || (s[i] > value && s[i + 1] <= value) {
                    let frac = (value - s[i]) / (s[i + 1] - s[i]);
                    return (i as f64 + frac) / (s.len() - 1) as f64;
                }
            }
            return f64::NAN;
        }
        let (lo, hi) = if self.max > self.min {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        if value < lo || value > hi {
            return f64::NAN;
        }
        if self.log {
            if value <= 0.0 {
                return f64::NAN;
            }
            (value.ln() - self.min.ln()) / (self.max.ln() - self.min.ln())
        } else {
            (value - self.min) / (self.max - self.min)
        }
    }

    /// The axis value at fractional position `t`.
    pub fn inverse_position(&self, t: f64) -> f64 {
        if let Some(table) = &self.interpolation {
            let last = table.samples.len() - 1;
            let scaled = t * last as f64;
            let i = scaled.floor();
            if i >= last as f64 {
                return table.samples[last];
            }
            if i < 0.0 {
                return table.samples[0];
            }
            let frac = scaled - i;
            let i = i as usize;
            return table.samples[i] * (1.0 - frac) + table.samples[i + 1] * frac;
        }
        if self.log {
            self.min * (self.max / self.min).powf(t)
        } else {
            self.min + t * (self.max - self.min)
        }
    }
}

/// An axis owned by a plot: its declaration, observed usage, compiled
/// expressions and finalized state.
#[derive(Debug, Clone)]
pub struct Axis {
    pub id: AxisId,
    pub config: AxisConfig,
    pub usage: Usage,
    pub hard: HardLimits,
    pub format: Option<FormatRule>,
    pub link_using: Option<Expression>,
    pub state: AxisState,
    /// Set once hard limits have been pushed up the link chain.
    pub(crate) hard_limits_propagated: bool,
}

impl Axis {
    pub fn new(id: AxisId, config: AxisConfig, scope: &mut Scope) -> Result<Self, AxisError> {
        if !(config.log_base > 1.0 && config.log_base.is_finite()) {
            return Err(AxisError::invalid_input(format!(
                "{id}: log_base must be greater than one"
            )));
        }
        if let Some(length) = config.length {
            if !(length > 0.0 && length.is_finite()) {
                return Err(AxisError::invalid_input(format!(
                    "{id}: length must be positive"
                )));
            }
        }
        let format = match &config.format {
            Some(source) => Some(FormatRule::parse(source, scope)?),
            None => None,
        };
        let link_using = match config.link.as_ref().and_then(|l| l.using.as_deref()) {
            Some(source) => Some(Expression::compile(source, scope)?),
            None => None,
        };
        let mut axis = Self {
            id,
            config,
            usage: Usage::default(),
            hard: HardLimits::default(),
            format,
            link_using,
            state: AxisState::default(),
            hard_limits_propagated: false,
        };
        axis.reset();
        Ok(axis)
    }

    pub fn link(&self) -> Option<&AxisLink> {
        self.config.link.as_ref()
    }

    pub fn variable(&self) -> &'static str {
        self.id.direction.variable()
    }

    /// Unit of the data on this axis, if any has been established.
    pub fn known_unit(&self) -> Option<Dimensions> {
        self.state.data_unit.or(self.usage.unit)
    }

    /// Physical length on the page, falling back to `default_length`.
    pub fn length(&self, default_length: f64) -> f64 {
        self.config.length.unwrap_or(default_length)
    }

    /// Clears finalized results so the next finalize recomputes them.
    pub fn reset(&mut self) {
        self.state = AxisState {
            log: self.config.log,
            ..AxisState::default()
        };
        self.hard = HardLimits {
            min: self.config.hard_min,
            max: self.config.hard_max,
            unit: self.config.hard_unit,
        };
        self.hard_limits_propagated = false;
    }
}
