//! Plain data shapes exchanged with JavaScript, and their conversions.

use anyhow::{anyhow, bail, Result};
use gradus_core::expression::Value;
use gradus_core::solver::SolveReport;
use gradus_core::units::{Dimensions, Quantity, BASE_UNITS};
use gradus_core::{AxisId, AxisSummary, Diagnostic, Direction};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

pub(crate) fn parse_direction(name: &str) -> Result<Direction> {
    match name.to_ascii_lowercase().as_str() {
        "x" => Ok(Direction::X),
        "y" => Ok(Direction::Y),
        "z" => Ok(Direction::Z),
        "c" | "color" | "colour" => Ok(Direction::Color),
        other => bail!("Unknown axis direction '{}'", other),
    }
}

pub(crate) fn axis_id(plot: u32, direction: &str, index: u32) -> Result<AxisId> {
    Ok(AxisId::new(
        plot as usize,
        parse_direction(direction)?,
        index as usize,
    ))
}

/// Exponents of the SI base units, in the order metre, kilogram, second,
/// ampere, kelvin, mole, candela.
pub(crate) fn dimensions(exponents: &[f64]) -> Result<Dimensions> {
    if exponents.len() != BASE_UNITS {
        bail!(
            "Expected {} unit exponents, got {}",
            BASE_UNITS,
            exponents.len()
        );
    }
    if exponents.iter().any(|e| !e.is_finite()) {
        bail!("Unit exponents must be finite");
    }
    let mut dims = [0.0; BASE_UNITS];
    dims.copy_from_slice(exponents);
    Ok(Dimensions(dims))
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum VariableWire {
    Number(f64),
    Text(String),
    Quantity {
        re: f64,
        #[serde(default)]
        im: f64,
        #[serde(default)]
        dims: Option<Vec<f64>>,
    },
}

impl VariableWire {
    pub(crate) fn into_value(self) -> Result<Value> {
        match self {
            Self::Number(value) => Ok(Value::real(value)),
            Self::Text(text) => Ok(Value::Text(text)),
            Self::Quantity { re, im, dims } => {
                let dims = match dims {
                    Some(exponents) => dimensions(&exponents)?,
                    None => Dimensions::dimensionless(),
                };
                Ok(Value::Number(Quantity::new(Complex64::new(re, im), dims)))
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuantityWire {
    pub name: String,
    pub re: f64,
    pub im: f64,
    pub dims: Vec<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SolveWire {
    pub values: Vec<QuantityWire>,
    pub residual: f64,
    pub outer_iterations: usize,
    pub warning: Option<String>,
}

impl From<SolveReport> for SolveWire {
    fn from(report: SolveReport) -> Self {
        let values = report
            .values
            .into_iter()
            .map(|(name, quantity)| QuantityWire {
                name,
                re: quantity.value.re,
                im: quantity.value.im,
                dims: quantity.dims.0.to_vec(),
            })
            .collect();
        Self {
            values,
            residual: report.residual,
            outer_iterations: report.outer_iterations,
            warning: report.warning,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FinalizeWire {
    pub axes: Vec<AxisSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

pub(crate) fn missing_axis(id: AxisId) -> anyhow::Error {
    anyhow!("No {}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_accept_both_spellings_of_colour() {
        assert_eq!(parse_direction("X").unwrap(), Direction::X);
        assert_eq!(parse_direction("c").unwrap(), Direction::Color);
        assert_eq!(parse_direction("colour").unwrap(), Direction::Color);
        assert!(parse_direction("w").is_err());
    }

    #[test]
    fn axis_ids_carry_plot_and_index() {
        let id = axis_id(3, "y", 2).expect("valid id");
        assert_eq!(id, AxisId::new(3, Direction::Y, 2));
    }

    #[test]
    fn dimensions_need_seven_finite_exponents() {
        let dims = dimensions(&[1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0]).expect("velocity");
        assert_eq!(dims.0[0], 1.0);
        assert_eq!(dims.0[2], -1.0);
        assert!(dimensions(&[1.0, 0.0]).is_err());
        assert!(dimensions(&[f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn variables_become_values() {
        let number = VariableWire::Number(2.5).into_value().unwrap();
        assert_eq!(number, Value::real(2.5));

        let text = VariableWire::Text("hello".to_string()).into_value().unwrap();
        assert_eq!(text.as_text(), Some("hello"));

        let quantity = VariableWire::Quantity {
            re: 1.0,
            im: 2.0,
            dims: Some(vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        }
        .into_value()
        .unwrap();
        let q = quantity.as_number().expect("number");
        assert_eq!(q.value, Complex64::new(1.0, 2.0));
        assert_eq!(q.dims.0[1], 1.0);
    }

    #[test]
    fn solve_reports_flatten_complex_values() {
        let report = SolveReport {
            values: vec![("a".to_string(), Quantity::dimensionless(3.0))],
            residual: 1e-12,
            outer_iterations: 2,
            warning: None,
        };
        let wire = SolveWire::from(report);
        assert_eq!(wire.values.len(), 1);
        assert_eq!(wire.values[0].name, "a");
        assert_eq!(wire.values[0].re, 3.0);
        assert_eq!(wire.values[0].im, 0.0);
        assert_eq!(wire.values[0].dims, vec![0.0; BASE_UNITS]);
    }
}
