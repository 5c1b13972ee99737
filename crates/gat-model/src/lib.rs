//! Ties the input preparer, linear power-flow solve, output projector, and
//! model facade into one calculation engine built on `gat-core`'s store,
//! topology, math-state cache, and solver registry.

pub mod calculate;
pub mod input;
pub mod model;
pub mod output;

pub use calculate::{solve_complex_linear, solve_power_flow_island};
pub use input::{build_store, prepare_power_flow_input, PowerFlowIslandInput};
pub use model::{
    ensure_supported, write_scenario_rows, BatchParameter, CacheKind, CalculationInfo, CalculationMethod,
    CalculationOptions, CalculationSymmetry, CalculationType, Model, ScenarioRows, ShortCircuitVoltageScaling,
};
