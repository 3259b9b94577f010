//! JavaScript bindings for `gradus_core`.

mod canvas;
mod wire;

pub use canvas::WasmCanvas;
