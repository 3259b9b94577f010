pub mod axis;
pub mod canvas;
pub mod catalog;
pub mod error;
pub mod expression;
pub mod format;
pub mod label;
pub mod link;
pub mod range;
pub mod selector;
pub mod settings;
pub mod solver;
pub mod stepping;
pub mod ticking;
/// The `gradus_core` crate decides the extent of plot axes and where their
/// tick marks go.
///
/// Given the data plotted against each axis, any hard limits, and optional
/// links between axes, it settles a numeric range and a physical unit for
/// every axis, then chooses major and minor ticks that land on round values
/// of the axis labels.
///
/// Key components:
/// - **Canvas**: owns the axes, the shared expression scope and settings; `finalize` runs everything.
/// - **Range**: hard limits, usage, log clamping, padding and outward rounding.
/// - **Link**: hard-limit, usage and range propagation along chains of linked axes, including through mapping expressions.
/// - **Catalog / Selector**: format-driven ticking that samples the label rule and assembles a consistent tick scheme.
/// - **Stepping**: classical round-number ticks, linked-axis tick sharing and evenly spaced ticks.
/// - **Solver**: a bounded Nelder-Mead search over values spanning many orders of magnitude.
/// - **Expression / Units**: a bytecode VM over dimensioned complex quantities and strings.
pub mod units;

pub use axis::{Axis, AxisConfig, AxisId, AxisLink, Direction, ManualTick, Tick, TickSpec};
pub use canvas::{AxisSummary, Canvas};
pub use error::{AxisError, Diagnostic, Diagnostics, Severity};
pub use settings::{AxisUnitStyle, CanvasSettings, SolverSettings, TickDensity};
