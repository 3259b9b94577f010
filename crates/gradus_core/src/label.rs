//! Tick and axis label text.

use crate::axis::Axis;
use crate::error::Diagnostics;
use crate::expression::{Scope, Value};
use crate::format::FormatRule;
use crate::settings::AxisUnitStyle;
use crate::units::{Dimensions, DisplayUnit, Quantity};

/// Label used when a format rule fails to produce text.
pub const BAD_LABEL: &str = "{\\bf ?}";

/// Renders `x` to `significant_figures` figures, trimming trailing zeros.
/// Magnitudes outside the fixed-point window use LaTeX `\times10^{e}`.
pub fn numeric_display(x: f64, significant_figures: usize) -> String {
    if !x.is_finite() {
        return format!("{x}");
    }
    if x == 0.0 {
        return "0".to_string();
    }
    let sf = significant_figures.clamp(1, 17);
    let sci = format!("{:.*e}", sf - 1, x);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };
    if exponent >= -4 && exponent < sf as i32 {
        let decimals = (sf as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, x))
    } else {
        format!("{}\\times10^{{{}}}", trim_fraction(&mantissa), exponent)
    }
}

fn trim_fraction(text: &str) -> String {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text.to_string()
    }
}

/// Automatic tick label for a display-unit value on an axis of the given
/// logarithmic base, e.g. `$250$` or `$2.5\times 10^{6}$`.
pub fn auto_label(x: f64, log_base: f64, significant_figures: usize) -> String {
    let margin = 10f64.powi(1 - significant_figures as i32).max(1e-15);
    let magnitude = x.abs();
    let body = if magnitude < f64::MIN_POSITIVE * 100.0 {
        "0".to_string()
    } else if magnitude > 1e-3 && magnitude < 1e5 {
        numeric_display(x, significant_figures)
    } else {
        let sign = if x < 0.0 { "-" } else { "" };
        let mut e = (magnitude.ln() / log_base.ln()).floor();
        let mut m = magnitude / log_base.powf(e);
        if (m - log_base).abs() < margin {
            e += 1.0;
            m = 1.0;
        }
        let base = log_base as i64;
        let e = numeric_display(e, significant_figures);
        if (m - 1.0).abs() < margin {
            format!("{sign}{base}^{{{e}}}")
        } else {
            format!(
                "{sign}{}\\times {base}^{{{e}}}",
                numeric_display(m, significant_figures)
            )
        }
    };
    format!("${body}$")
}

/// Renders a tick label through a format rule, with the axis variable bound
/// to `value` (an SI quantity) for the duration of the call.
pub fn format_label(
    rule: &FormatRule,
    variable: &str,
    value: Quantity,
    scope: &mut Scope,
    significant_figures: usize,
    diagnostics: &mut Diagnostics,
) -> String {
    let mut binding = scope.bind(variable);
    binding.set(Value::quantity(value.re(), value.dims));
    match rule.render(binding.scope(), significant_figures) {
        Ok(text) => text,
        Err(err) => {
            diagnostics.error(format!(
                "Error encountered whilst using format string {}: {err}",
                rule.source()
            ));
            BAD_LABEL.to_string()
        }
    }
}

/// Labels the major ticks of one axis, through its format rule when it has
/// one and with [`auto_label`] otherwise.
#[derive(Debug, Clone, Copy)]
pub struct TickLabeller<'a> {
    format: Option<&'a FormatRule>,
    variable: &'static str,
    dims: Dimensions,
    multiplier: f64,
    log_base: f64,
    significant_figures: usize,
}

impl<'a> TickLabeller<'a> {
    pub fn for_axis(axis: &'a Axis, significant_figures: usize) -> Self {
        Self {
            format: axis.format.as_ref(),
            variable: axis.variable(),
            dims: axis.state.data_dims(),
            multiplier: axis.state.unit_multiplier(),
            log_base: axis.config.log_base,
            significant_figures,
        }
    }

    pub fn with_log_base(mut self, log_base: f64) -> Self {
        self.log_base = log_base;
        self
    }

    /// Label for the tick at `value`, given in SI units.
    pub fn label(&self, value: f64, scope: &mut Scope, diagnostics: &mut Diagnostics) -> String {
        match self.format {
            Some(rule) => format_label(
                rule,
                self.variable,
                Quantity::real(value, self.dims),
                scope,
                self.significant_figures,
                diagnostics,
            ),
            None => auto_label(value * self.multiplier, self.log_base, self.significant_figures),
        }
    }
}

/// Final axis title: the base label with the display unit appended in the
/// configured style. Formatted and dimensionless axes keep the bare label.
pub fn axis_label(
    label: Option<&str>,
    unit: &DisplayUnit,
    style: AxisUnitStyle,
    formatted: bool,
) -> Option<String> {
    let label = label?;
    if formatted || unit.symbol.is_empty() {
        return Some(label.to_string());
    }
    let u = &unit.symbol;
    Some(match style {
        AxisUnitStyle::Bracketed => format!("{label} (${u}$)"),
        AxisUnitStyle::Ratio => format!("{label} / ${u}$"),
        AxisUnitStyle::Squared => format!("{label} [${u}$]"),
    })
}
