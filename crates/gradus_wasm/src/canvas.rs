//! WASM wrapper around the axis canvas.

use crate::wire::{axis_id, dimensions, missing_axis, FinalizeWire, SolveWire, VariableWire};
use gradus_core::{AxisConfig, Canvas, CanvasSettings};
use js_sys::Float64Array;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

fn is_absent(value: &JsValue) -> bool {
    value.is_undefined() || value.is_null()
}

fn to_js_error(err: anyhow::Error) -> JsValue {
    JsValue::from_str(&format!("{:#}", err))
}

#[wasm_bindgen]
pub struct WasmCanvas {
    canvas: Canvas,
}

#[wasm_bindgen]
impl WasmCanvas {
    #[wasm_bindgen(constructor)]
    pub fn new(settings_val: JsValue) -> Result<WasmCanvas, JsValue> {
        console_error_panic_hook::set_once();
        let settings: CanvasSettings = if is_absent(&settings_val) {
            CanvasSettings::default()
        } else {
            from_value(settings_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid canvas settings: {}", e)))?
        };
        let canvas = Canvas::new(settings).map_err(to_js_error)?;
        Ok(WasmCanvas { canvas })
    }

    pub fn add_axis(
        &mut self,
        plot: u32,
        direction: &str,
        index: u32,
        config_val: JsValue,
    ) -> Result<(), JsValue> {
        let id = axis_id(plot, direction, index).map_err(to_js_error)?;
        let config: AxisConfig = if is_absent(&config_val) {
            AxisConfig::default()
        } else {
            from_value(config_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid axis config: {}", e)))?
        };
        self.canvas
            .add_axis(id, config)
            .map_err(|e| JsValue::from_str(&format!("Failed to add {}: {}", id, e)))
    }

    /// Records data plotted against an axis. `unit_val` is either absent or
    /// an array of seven SI base-unit exponents.
    pub fn record_usage(
        &mut self,
        plot: u32,
        direction: &str,
        index: u32,
        values: Vec<f64>,
        unit_val: JsValue,
    ) -> Result<(), JsValue> {
        let id = axis_id(plot, direction, index).map_err(to_js_error)?;
        let unit = if is_absent(&unit_val) {
            None
        } else {
            let exponents: Vec<f64> = from_value(unit_val)
                .map_err(|e| JsValue::from_str(&format!("Invalid unit: {}", e)))?;
            Some(dimensions(&exponents).map_err(to_js_error)?)
        };
        self.canvas
            .record_usage(id, &values, unit)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub fn define_variable(&mut self, name: &str, value_val: JsValue) -> Result<(), JsValue> {
        let wire: VariableWire = from_value(value_val)
            .map_err(|e| JsValue::from_str(&format!("Invalid value for '{}': {}", name, e)))?;
        let value = wire.into_value().map_err(to_js_error)?;
        self.canvas.define(name, value);
        Ok(())
    }

    /// Finalizes every axis and returns `{ axes, diagnostics }`. Diagnostics
    /// are drained, so each is reported once.
    pub fn finalize(&mut self) -> Result<JsValue, JsValue> {
        self.canvas.finalize();
        let payload = FinalizeWire {
            axes: self.canvas.summaries(),
            diagnostics: self.canvas.drain_diagnostics(),
        };
        to_value(&payload).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn reset(&mut self) {
        self.canvas.reset();
    }

    /// Positions, from 0 to 1 along the axis, of its major or minor ticks.
    pub fn tick_positions(
        &self,
        plot: u32,
        direction: &str,
        index: u32,
        major: bool,
    ) -> Result<Float64Array, JsValue> {
        let id = axis_id(plot, direction, index).map_err(to_js_error)?;
        let axis = self
            .canvas
            .axis(id)
            .ok_or_else(|| to_js_error(missing_axis(id)))?;
        let ticks = if major {
            &axis.state.major
        } else {
            &axis.state.minor
        };
        let positions: Vec<f64> = ticks.iter().map(|tick| tick.position).collect();
        Ok(Float64Array::from(positions.as_slice()))
    }

    pub fn solve(&mut self, equations: Vec<String>, free: Vec<String>) -> Result<JsValue, JsValue> {
        let equations: Vec<&str> = equations.iter().map(String::as_str).collect();
        let free: Vec<&str> = free.iter().map(String::as_str).collect();
        let report = self
            .canvas
            .solve(&equations, &free)
            .map_err(|e| JsValue::from_str(&format!("Solve failed: {}", e)))?;
        to_value(&SolveWire::from(report))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn minimise(&mut self, expression: &str, free: Vec<String>) -> Result<JsValue, JsValue> {
        let free: Vec<&str> = free.iter().map(String::as_str).collect();
        let report = self
            .canvas
            .minimise(expression, &free)
            .map_err(|e| JsValue::from_str(&format!("Minimise failed: {}", e)))?;
        to_value(&SolveWire::from(report))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    pub fn maximise(&mut self, expression: &str, free: Vec<String>) -> Result<JsValue, JsValue> {
        let free: Vec<&str> = free.iter().map(String::as_str).collect();
        let report = self
            .canvas
            .maximise(expression, &free)
            .map_err(|e| JsValue::from_str(&format!("Maximise failed: {}", e)))?;
        to_value(&SolveWire::from(report))
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn wasm_canvas_finalizes_recorded_usage() {
        let mut canvas = WasmCanvas::new(JsValue::UNDEFINED).expect("canvas should build");
        canvas
            .add_axis(0, "x", 1, JsValue::UNDEFINED)
            .expect("axis should be added");
        canvas
            .record_usage(0, "x", 1, vec![0.0, 95.0], JsValue::NULL)
            .expect("usage should be recorded");
        let result = canvas.finalize();
        assert!(result.is_ok(), "expected finalize to succeed");

        let positions = canvas
            .tick_positions(0, "x", 1, true)
            .expect("axis exists")
            .to_vec();
        assert!(!positions.is_empty());
        assert!(positions.iter().all(|t| (0.0..=1.0).contains(t)));
    }

    #[wasm_bindgen_test]
    fn wasm_canvas_rejects_unknown_directions() {
        let mut canvas = WasmCanvas::new(JsValue::NULL).expect("canvas should build");
        assert!(canvas.add_axis(0, "w", 1, JsValue::UNDEFINED).is_err());
    }

    #[wasm_bindgen_test]
    fn wasm_canvas_minimises_defined_variables() {
        let mut canvas = WasmCanvas::new(JsValue::UNDEFINED).expect("canvas should build");
        canvas
            .define_variable("a", JsValue::from_f64(1.0))
            .expect("variable should be defined");
        let result = canvas.minimise("(a - 3)^2", vec!["a".to_string()]);
        assert!(result.is_ok(), "expected minimisation to succeed");
    }

    #[wasm_bindgen_test]
    fn wasm_canvas_accepts_serialized_axis_configs() {
        let mut canvas = WasmCanvas::new(JsValue::UNDEFINED).expect("canvas should build");
        let config = AxisConfig {
            log: true,
            ..AxisConfig::default()
        };
        canvas
            .add_axis(0, "y", 1, to_value(&config).expect("config"))
            .expect("axis should be added");
        canvas
            .record_usage(0, "y", 1, vec![1.0, 1000.0], JsValue::UNDEFINED)
            .expect("usage should be recorded");
        let payload = canvas.finalize().expect("finalize");
        assert!(payload.is_object());
    }
}
