//! The Model Facade: owns a frozen-topology `ComponentStore` plus its math
//! state cache, and exposes the same update/calculate surface whether
//! called directly for one scenario or driven, per scenario, by the batch
//! dispatcher.
//!
//! Grounded on `main_model/model.hpp`'s single entry-point facade over
//! construction, update, and calculation, with the calculation method
//! space narrowed to the one strategy this engine implements (linear
//! power flow — see `DESIGN.md`'s Open Question record).

use std::collections::HashMap;

use num_complex::Complex64;

use gat_core::component::{Component, ComponentKind};
use gat_core::error::GatError;
use gat_core::ids::ID;
use gat_core::mathstate::MathState;
use gat_core::store::ComponentStore;
use gat_core::topology::{ComponentTopology, TopologyBuilder};
use gat_io::dataset::Dataset;
use gat_scenarios::{apply_scenario_with_caches, restore, SequenceCache};

use crate::calculate::solve_power_flow_island;
use crate::input::{build_store, prepare_power_flow_input};
use crate::output;

/// Which calculation domain to run (spec's `calculation_type`). Only
/// `PowerFlow` is implemented; the others are accepted so callers can
/// construct the full enum, but rejected at `calculate` time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationType {
    PowerFlow,
    StateEstimation,
    ShortCircuit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationSymmetry {
    Symmetric,
    Asymmetric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculationMethod {
    NewtonRaphson,
    Linear,
    LinearCurrent,
    IterativeCurrent,
    IterativeLinear,
    Iec60909,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortCircuitVoltageScaling {
    Minimum,
    Maximum,
}

#[derive(Debug, Clone)]
pub struct CalculationOptions {
    pub calculation_type: CalculationType,
    pub calculation_symmetry: CalculationSymmetry,
    pub calculation_method: CalculationMethod,
    pub err_tol: f64,
    pub max_iter: i64,
    pub threading: i64,
    pub short_circuit_voltage_scaling: ShortCircuitVoltageScaling,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            calculation_type: CalculationType::PowerFlow,
            calculation_symmetry: CalculationSymmetry::Symmetric,
            calculation_method: CalculationMethod::Linear,
            err_tol: 1e-8,
            max_iter: 20,
            threading: -1,
            short_circuit_voltage_scaling: ShortCircuitVoltageScaling::Maximum,
        }
    }
}

/// Whether an `update` call should remember the inverse so
/// `restore_components` can revert it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Cached,
    Permanent,
}

/// Timer/counter accumulator keyed by name. Merging two accumulators takes
/// the max of any key ending in `_iterations` (the worst case across
/// scenarios/threads matters, not the total) and sums everything else.
#[derive(Debug, Clone, Default)]
pub struct CalculationInfo(pub HashMap<String, f64>);

impl CalculationInfo {
    pub fn record(&mut self, key: &str, value: f64) {
        self.0.insert(key.to_string(), value);
    }

    pub fn merge(&mut self, other: &CalculationInfo) {
        for (key, &value) in &other.0 {
            let entry = self.0.entry(key.clone()).or_insert(0.0);
            if key.ends_with("_iterations") {
                *entry = entry.max(value);
            } else {
                *entry += value;
            }
        }
    }

    pub fn as_map(&self) -> &HashMap<String, f64> {
        &self.0
    }
}

/// Completion summary returned by `calculate`: the real per-scenario
/// results are written into `target_data`, this just confirms how many
/// scenarios were run.
#[derive(Debug, Clone, Copy)]
pub struct BatchParameter {
    pub n_scenarios: usize,
}

/// One scenario's worth of projected output rows, grouped by component
/// kind. The batch dispatcher accumulates these across scenarios the same
/// way `Model::calculate`'s own sequential loop does, so both paths share
/// `write_scenario_rows`.
#[derive(Debug, Default)]
pub struct ScenarioRows {
    pub node: Vec<gat_io::dataset::ElementRecord>,
    pub source: Vec<gat_io::dataset::ElementRecord>,
    pub sym_load: Vec<gat_io::dataset::ElementRecord>,
    pub asym_load: Vec<gat_io::dataset::ElementRecord>,
    pub shunt: Vec<gat_io::dataset::ElementRecord>,
    pub line: Vec<gat_io::dataset::ElementRecord>,
    pub link: Vec<gat_io::dataset::ElementRecord>,
    pub transformer: Vec<gat_io::dataset::ElementRecord>,
    pub three_winding_transformer: Vec<gat_io::dataset::ElementRecord>,
    pub sym_voltage_sensor: Vec<gat_io::dataset::ElementRecord>,
    pub asym_voltage_sensor: Vec<gat_io::dataset::ElementRecord>,
    pub sym_power_sensor: Vec<gat_io::dataset::ElementRecord>,
    pub asym_power_sensor: Vec<gat_io::dataset::ElementRecord>,
    pub current_sensor: Vec<gat_io::dataset::ElementRecord>,
    pub fault: Vec<gat_io::dataset::ElementRecord>,
    pub transformer_tap_regulator: Vec<gat_io::dataset::ElementRecord>,
}

/// Reject any `calculation_type`/`calculation_method` combination this
/// engine doesn't implement end to end. Shared by `Model::calculate` and
/// the batch dispatcher, which both need to fail before spawning any work.
pub fn ensure_supported(options: &CalculationOptions) -> Result<(), GatError> {
    if options.calculation_type != CalculationType::PowerFlow {
        return Err(GatError::MissingCaseForEnum(format!(
            "calculation_type {:?} is not implemented",
            options.calculation_type
        )));
    }
    if !matches!(options.calculation_method, CalculationMethod::Linear | CalculationMethod::Default) {
        return Err(GatError::MissingCaseForEnum(format!(
            "calculation_method {:?} is not implemented",
            options.calculation_method
        )));
    }
    Ok(())
}

pub struct Model {
    system_frequency: f64,
    store: ComponentStore,
    comp_topo: ComponentTopology,
    islands: Vec<gat_core::topology::MathTopology>,
    math_state: MathState,
    calculation_info: CalculationInfo,
    pending_inverses: Vec<(ID, gat_core::component::ComponentUpdate)>,
}

impl Model {
    pub fn new(system_frequency: f64, input_dataset: &Dataset) -> Result<Self, GatError> {
        let store = build_store(input_dataset)?;
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        Ok(Self {
            system_frequency,
            store,
            comp_topo,
            islands,
            math_state: MathState::new(),
            calculation_info: CalculationInfo::default(),
            pending_inverses: Vec::new(),
        })
    }

    pub fn system_frequency(&self) -> f64 {
        self.system_frequency
    }

    pub fn all_component_count(&self) -> HashMap<&'static str, usize> {
        self.store.all_component_count()
    }

    /// Fill `out_positions` with each `ids[i]`'s position within its
    /// group's bucket (the within-kind index `ComponentStore` assigns at
    /// construction).
    pub fn get_indexer(&self, component_name: &str, ids: &[ID], out_positions: &mut [i64]) -> Result<(), GatError> {
        let kind = ComponentKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == component_name)
            .ok_or_else(|| GatError::DatasetError(format!("unknown component `{component_name}`")))?;
        if out_positions.len() != ids.len() {
            return Err(GatError::DatasetError(
                "get_indexer: out_positions length must match ids length".into(),
            ));
        }
        for (i, &id) in ids.iter().enumerate() {
            let coord = self.store.get_idx_by_id(id, Some(kind))?;
            out_positions[i] = coord.pos;
        }
        Ok(())
    }

    /// Apply one update-shape dataset's scenario 0 to the live store. With
    /// `CacheKind::Cached`, the inverse is appended to the pending list so
    /// a later `restore_components` can undo it; `Permanent` discards the
    /// inverse immediately.
    pub fn update(&mut self, update_data: &Dataset, cache_kind: CacheKind) -> Result<(), GatError> {
        let (change, inverses) = apply_scenario_with_caches(&mut self.store, update_data, 0, None)?;
        if change.topo {
            self.math_state.invalidate_topology();
            let (islands, comp_topo) = TopologyBuilder::new(&self.store).build();
            self.islands = islands;
            self.comp_topo = comp_topo;
        } else if change.param {
            self.math_state.invalidate_parameters(std::iter::empty());
        }
        match cache_kind {
            CacheKind::Cached => self.pending_inverses.extend(inverses),
            CacheKind::Permanent => {}
        }
        Ok(())
    }

    /// Revert every cached update applied since the last
    /// `restore_components` call (or since construction).
    pub fn restore_components(&mut self) -> Result<(), GatError> {
        restore(&mut self.store, &self.pending_inverses)?;
        self.pending_inverses.clear();
        self.math_state.invalidate_parameters(std::iter::empty());
        Ok(())
    }

    pub fn calculation_info(&self) -> &HashMap<String, f64> {
        self.calculation_info.as_map()
    }

    /// An owned copy of this model's accumulator, for a batch worker to
    /// merge into a dispatcher-wide total after its partition finishes.
    pub fn calculation_info_snapshot(&self) -> CalculationInfo {
        self.calculation_info.clone()
    }

    /// A fresh worker clone: same store, topology, and frequency, but an
    /// empty math-state cache (the Y-bus is per-process and not worth
    /// shipping across threads) and no pending inverses. Grounded on the
    /// dispatcher's per-thread model clone.
    pub fn fork(&self) -> Model {
        Model {
            system_frequency: self.system_frequency,
            store: self.store.clone(),
            comp_topo: self.comp_topo.clone(),
            islands: self.islands.clone(),
            math_state: MathState::new(),
            calculation_info: CalculationInfo::default(),
            pending_inverses: Vec::new(),
        }
    }

    /// Run one scenario: apply `update_data`'s scenario (if given), solve,
    /// restore via the applied inverses, and return the projected rows.
    /// The primitive both `calculate`'s sequential loop and the batch
    /// dispatcher's per-thread loop drive.
    pub fn calculate_scenario(&mut self, update_data: Option<(&Dataset, usize)>) -> Result<ScenarioRows, GatError> {
        self.calculate_scenario_cached(update_data, None)
    }

    /// Build the independent-kind ID→coordinate caches for `update_data`
    /// against this model's own store, for a caller (the batch dispatcher)
    /// that drives many forked models against the same dataset and wants to
    /// build the cache exactly once rather than per fork.
    pub fn build_update_caches(&self, update_data: &Dataset) -> Result<HashMap<ComponentKind, SequenceCache>, GatError> {
        gat_scenarios::build_caches(&self.store, update_data)
    }

    /// Same as [`Model::calculate_scenario`], but with `caches` (built once
    /// per dataset by [`gat_scenarios::build_caches`]) passed through to the
    /// update engine so independent-kind ID lookups skip the store's hash
    /// map on every scenario.
    pub fn calculate_scenario_cached(
        &mut self,
        update_data: Option<(&Dataset, usize)>,
        caches: Option<&HashMap<ComponentKind, SequenceCache>>,
    ) -> Result<ScenarioRows, GatError> {
        if let Some((dataset, scenario)) = update_data {
            let (change, inverses) = apply_scenario_with_caches(&mut self.store, dataset, scenario, caches)?;
            if change.topo {
                self.math_state.invalidate_topology();
                let (islands, comp_topo) = TopologyBuilder::new(&self.store).build();
                self.islands = islands;
                self.comp_topo = comp_topo;
            }
            let result = self.run_one();
            restore(&mut self.store, &inverses)?;
            self.math_state.invalidate_parameters(std::iter::empty());
            Ok(self.collect_rows(&result?))
        } else {
            let v_bus = self.run_one()?;
            Ok(self.collect_rows(&v_bus))
        }
    }

    /// Run `calculate` for every scenario named by `update_data` (or one
    /// scenario against the current state, if `update_data` is absent),
    /// writing one result row per component per scenario into
    /// `target_data`. Sequential; the threaded equivalent lives in
    /// `gat-batch`'s dispatcher, which drives the same per-scenario
    /// primitive (`calculate_scenario`) from cloned models.
    pub fn calculate(
        &mut self,
        options: &CalculationOptions,
        target_data: &mut Dataset,
        update_data: Option<&Dataset>,
    ) -> Result<BatchParameter, GatError> {
        ensure_supported(options)?;

        let caches = update_data
            .map(|d| gat_scenarios::build_caches(&self.store, d))
            .transpose()?;
        let n_scenarios = update_data.map(|d| d.batch_size().max(1)).unwrap_or(1);
        let mut rows = Vec::with_capacity(n_scenarios);
        for scenario in 0..n_scenarios {
            rows.push(self.calculate_scenario_cached(update_data.map(|d| (d, scenario)), caches.as_ref())?);
        }

        write_scenario_rows(target_data, n_scenarios, &rows)?;
        self.calculation_info.record("n_scenarios", n_scenarios as f64);
        Ok(BatchParameter { n_scenarios })
    }

    /// Solve every island once against the store's current state, via
    /// `MathState`'s cache (building Y-bus only when stale).
    fn run_one(&mut self) -> Result<Vec<Vec<Complex64>>, GatError> {
        self.math_state.prepare(gat_core::component::Symmetry::Symmetric, &self.store, &self.comp_topo, &self.islands)?;
        let inputs = prepare_power_flow_input(&self.store, &self.comp_topo, &self.islands);
        let backend = gat_core::solver::SolverKind::default().build_solver();
        let mut v_bus = Vec::with_capacity(self.islands.len());
        for (island_idx, input) in inputs.iter().enumerate() {
            let y = self
                .math_state
                .y_bus_of(gat_core::component::Symmetry::Symmetric, island_idx)
                .ok_or_else(|| GatError::SparseMatrixError(format!("island {island_idx} has no Y-bus")))?;
            v_bus.push(solve_power_flow_island(y, input, backend.as_ref())?);
        }
        Ok(v_bus)
    }

    fn collect_rows(&self, v_bus: &[Vec<Complex64>]) -> ScenarioRows {
        let mut rows = ScenarioRows::default();
        rows.node = output::node_outputs(&self.store, &self.comp_topo, v_bus).iter().map(output::node_output_record).collect();
        for (kind, o) in output::appliance_outputs(&self.store, &self.comp_topo, v_bus) {
            let row = output::appliance_output_record(&o);
            match kind {
                ComponentKind::Source => rows.source.push(row),
                ComponentKind::SymLoad => rows.sym_load.push(row),
                ComponentKind::AsymLoad => rows.asym_load.push(row),
                ComponentKind::Shunt => rows.shunt.push(row),
                _ => unreachable!(),
            }
        }
        for (kind, o) in output::branch_outputs(&self.store, &self.comp_topo, &self.islands, v_bus) {
            let row = output::branch_output_record(&o);
            match kind {
                ComponentKind::Line => rows.line.push(row),
                ComponentKind::Link => rows.link.push(row),
                ComponentKind::Transformer => rows.transformer.push(row),
                _ => unreachable!(),
            }
        }
        rows.three_winding_transformer = output::three_winding_transformer_outputs(&self.store, &self.comp_topo, &self.islands, v_bus)
            .iter()
            .map(output::branch3_output_record)
            .collect();
        rows.transformer_tap_regulator = output::null_regulator_outputs(&self.store).iter().map(output::regulator_output_record).collect();
        let (voltage_sensors, power_sensors) = output::null_sensor_outputs(&self.store);
        for (kind, o) in voltage_sensors {
            let row = output::voltage_sensor_output_record(&o);
            match kind {
                ComponentKind::SymVoltageSensor => rows.sym_voltage_sensor.push(row),
                ComponentKind::AsymVoltageSensor => rows.asym_voltage_sensor.push(row),
                _ => unreachable!(),
            }
        }
        for (kind, o) in power_sensors {
            let row = output::power_sensor_output_record(&o);
            match kind {
                ComponentKind::SymPowerSensor => rows.sym_power_sensor.push(row),
                ComponentKind::AsymPowerSensor => rows.asym_power_sensor.push(row),
                ComponentKind::CurrentSensor => rows.current_sensor.push(row),
                _ => unreachable!(),
            }
        }
        rows.fault = output::null_fault_outputs(&self.store).iter().map(output::fault_output_record).collect();
        rows
    }
}

fn write_output_buffer(
    target_data: &mut Dataset,
    kind: ComponentKind,
    n_scenarios: usize,
    rows: Vec<gat_io::dataset::ElementRecord>,
) -> Result<(), GatError> {
    if rows.is_empty() {
        return Ok(());
    }
    let total = rows.len();
    let per_scenario = total / n_scenarios.max(1);
    target_data.add_buffer(kind, per_scenario as i64, total, None, rows)
}

/// Flatten per-scenario `ScenarioRows` (in scenario order) into one buffer
/// per component kind and write them into `target_data`. Shared by
/// `Model::calculate` and the batch dispatcher, which assembles its
/// `Vec<ScenarioRows>` from per-thread results merged back into scenario
/// order before calling this.
pub fn write_scenario_rows(target_data: &mut Dataset, n_scenarios: usize, rows: &[ScenarioRows]) -> Result<(), GatError> {
    write_output_buffer(target_data, ComponentKind::Node, n_scenarios, rows.iter().flat_map(|r| r.node.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::Source, n_scenarios, rows.iter().flat_map(|r| r.source.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::SymLoad, n_scenarios, rows.iter().flat_map(|r| r.sym_load.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::AsymLoad, n_scenarios, rows.iter().flat_map(|r| r.asym_load.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::Shunt, n_scenarios, rows.iter().flat_map(|r| r.shunt.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::Line, n_scenarios, rows.iter().flat_map(|r| r.line.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::Link, n_scenarios, rows.iter().flat_map(|r| r.link.clone()).collect())?;
    write_output_buffer(target_data, ComponentKind::Transformer, n_scenarios, rows.iter().flat_map(|r| r.transformer.clone()).collect())?;
    write_output_buffer(
        target_data,
        ComponentKind::ThreeWindingTransformer,
        n_scenarios,
        rows.iter().flat_map(|r| r.three_winding_transformer.clone()).collect(),
    )?;
    write_output_buffer(
        target_data,
        ComponentKind::SymVoltageSensor,
        n_scenarios,
        rows.iter().flat_map(|r| r.sym_voltage_sensor.clone()).collect(),
    )?;
    write_output_buffer(
        target_data,
        ComponentKind::AsymVoltageSensor,
        n_scenarios,
        rows.iter().flat_map(|r| r.asym_voltage_sensor.clone()).collect(),
    )?;
    write_output_buffer(
        target_data,
        ComponentKind::SymPowerSensor,
        n_scenarios,
        rows.iter().flat_map(|r| r.sym_power_sensor.clone()).collect(),
    )?;
    write_output_buffer(
        target_data,
        ComponentKind::AsymPowerSensor,
        n_scenarios,
        rows.iter().flat_map(|r| r.asym_power_sensor.clone()).collect(),
    )?;
    write_output_buffer(
        target_data,
        ComponentKind::CurrentSensor,
        n_scenarios,
        rows.iter().flat_map(|r| r.current_sensor.clone()).collect(),
    )?;
    write_output_buffer(target_data, ComponentKind::Fault, n_scenarios, rows.iter().flat_map(|r| r.fault.clone()).collect())?;
    write_output_buffer(
        target_data,
        ComponentKind::TransformerTapRegulator,
        n_scenarios,
        rows.iter().flat_map(|r| r.transformer_tap_regulator.clone()).collect(),
    )
}
