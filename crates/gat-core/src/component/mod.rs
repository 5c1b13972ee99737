//! The sixteen component variants a model can store, plus the small set of
//! cross-cutting types (`Symmetry`, `MeasuredTerminalType`, `UpdateChange`)
//! every variant is described in terms of.
//!
//! Mirrors an enum-dispatch idiom for graph elements (one tagged sum type
//! per node/edge role), generalized from "bus/gen/load/shunt" to the full
//! heterogeneous variant set of `container.hpp`'s `RetrievableTypes`.

mod appliance;
mod branch;
mod fault;
mod node;
mod regulator;
mod sensor;

pub use appliance::{ApplianceOutput, ApplianceUpdate, AsymLoad, LoadGenType, Shunt, Source, SymLoad};
pub use branch::{
    Branch3Output, Branch3Update, BranchOutput, BranchUpdate, Line, Link, ThreeWindingTransformer, Transformer,
    TransformerTapSide, WindingConnection,
};
pub use fault::{Fault, FaultOutput, FaultPhase, FaultType, FaultUpdate};
pub use node::{Node, NodeOutput, NodeUpdate};
pub use regulator::{RegulatedObjectKind, RegulatorOutput, RegulatorUpdate, TapChangingStrategy, TransformerTapRegulator};
pub use sensor::{
    AsymPowerSensor, AsymVoltageSensor, CurrentSensor, MeasuredTerminalType, PowerSensorOutput, SensorUpdate,
    SymPowerSensor, SymVoltageSensor, VoltageSensorOutput,
};

use crate::ids::ID;

/// Which symmetric/asymmetric representation a calculation is running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Symmetry {
    Symmetric,
    Asymmetric,
}

/// Result of applying an update record to a component: which caches it
/// invalidates. A status-bit edit always sets `topo`; any physical-parameter
/// edit sets `param`. Both may be true (e.g. a branch's `from_status` and
/// `r1` changing together).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateChange {
    pub topo: bool,
    pub param: bool,
}

impl UpdateChange {
    pub const NONE: UpdateChange = UpdateChange {
        topo: false,
        param: false,
    };

    pub fn merge(self, other: UpdateChange) -> UpdateChange {
        UpdateChange {
            topo: self.topo || other.topo,
            param: self.param || other.param,
        }
    }
}

/// A discriminant naming one of the sixteen component variants, used for
/// metadata lookup, dataset shape validation, and dispatcher bucketing.
/// Mirrors `container.hpp`'s compile-time type index, made a runtime enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Node,
    Line,
    Link,
    Transformer,
    ThreeWindingTransformer,
    Source,
    SymLoad,
    AsymLoad,
    Shunt,
    SymVoltageSensor,
    AsymVoltageSensor,
    SymPowerSensor,
    AsymPowerSensor,
    CurrentSensor,
    Fault,
    TransformerTapRegulator,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 16] = [
        ComponentKind::Node,
        ComponentKind::Line,
        ComponentKind::Link,
        ComponentKind::Transformer,
        ComponentKind::ThreeWindingTransformer,
        ComponentKind::Source,
        ComponentKind::SymLoad,
        ComponentKind::AsymLoad,
        ComponentKind::Shunt,
        ComponentKind::SymVoltageSensor,
        ComponentKind::AsymVoltageSensor,
        ComponentKind::SymPowerSensor,
        ComponentKind::AsymPowerSensor,
        ComponentKind::CurrentSensor,
        ComponentKind::Fault,
        ComponentKind::TransformerTapRegulator,
    ];

    /// Name used on the wire (dataset component name, envelope keys).
    pub fn name(self) -> &'static str {
        match self {
            ComponentKind::Node => "node",
            ComponentKind::Line => "line",
            ComponentKind::Link => "link",
            ComponentKind::Transformer => "transformer",
            ComponentKind::ThreeWindingTransformer => "three_winding_transformer",
            ComponentKind::Source => "source",
            ComponentKind::SymLoad => "sym_load",
            ComponentKind::AsymLoad => "asym_load",
            ComponentKind::Shunt => "shunt",
            ComponentKind::SymVoltageSensor => "sym_voltage_sensor",
            ComponentKind::AsymVoltageSensor => "asym_voltage_sensor",
            ComponentKind::SymPowerSensor => "sym_power_sensor",
            ComponentKind::AsymPowerSensor => "asym_power_sensor",
            ComponentKind::CurrentSensor => "current_sensor",
            ComponentKind::Fault => "fault",
            ComponentKind::TransformerTapRegulator => "transformer_tap_regulator",
        }
    }

    /// Whether this kind is a two-terminal branch (contributes two directed
    /// edges to the topology graph).
    pub fn is_branch(self) -> bool {
        matches!(self, ComponentKind::Line | ComponentKind::Link | ComponentKind::Transformer)
    }

    pub fn is_branch3(self) -> bool {
        matches!(self, ComponentKind::ThreeWindingTransformer)
    }

    /// Whether this kind can seed an island (closed sources only, checked
    /// separately at the instance level).
    pub fn is_source(self) -> bool {
        matches!(self, ComponentKind::Source)
    }

    pub fn is_appliance(self) -> bool {
        matches!(
            self,
            ComponentKind::Source | ComponentKind::SymLoad | ComponentKind::AsymLoad | ComponentKind::Shunt
        )
    }

    pub fn is_sensor(self) -> bool {
        matches!(
            self,
            ComponentKind::SymVoltageSensor
                | ComponentKind::AsymVoltageSensor
                | ComponentKind::SymPowerSensor
                | ComponentKind::AsymPowerSensor
                | ComponentKind::CurrentSensor
        )
    }
}

/// A tagged sum of every component variant a store can hold. Generalizes the
/// teacher's `Node`/`Edge` graph-element enums to the full non-graph variant
/// set this domain needs.
#[derive(Debug, Clone)]
pub enum Component {
    Node(Node),
    Line(Line),
    Link(Link),
    Transformer(Transformer),
    ThreeWindingTransformer(ThreeWindingTransformer),
    Source(Source),
    SymLoad(SymLoad),
    AsymLoad(AsymLoad),
    Shunt(Shunt),
    SymVoltageSensor(SymVoltageSensor),
    AsymVoltageSensor(AsymVoltageSensor),
    SymPowerSensor(SymPowerSensor),
    AsymPowerSensor(AsymPowerSensor),
    CurrentSensor(CurrentSensor),
    Fault(Fault),
    TransformerTapRegulator(TransformerTapRegulator),
}

impl Component {
    pub fn id(&self) -> ID {
        match self {
            Component::Node(c) => c.id,
            Component::Line(c) => c.id,
            Component::Link(c) => c.id,
            Component::Transformer(c) => c.id,
            Component::ThreeWindingTransformer(c) => c.id,
            Component::Source(c) => c.id,
            Component::SymLoad(c) => c.id,
            Component::AsymLoad(c) => c.id,
            Component::Shunt(c) => c.id,
            Component::SymVoltageSensor(c) => c.id,
            Component::AsymVoltageSensor(c) => c.id,
            Component::SymPowerSensor(c) => c.id,
            Component::AsymPowerSensor(c) => c.id,
            Component::CurrentSensor(c) => c.id,
            Component::Fault(c) => c.id,
            Component::TransformerTapRegulator(c) => c.id,
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            Component::Node(_) => ComponentKind::Node,
            Component::Line(_) => ComponentKind::Line,
            Component::Link(_) => ComponentKind::Link,
            Component::Transformer(_) => ComponentKind::Transformer,
            Component::ThreeWindingTransformer(_) => ComponentKind::ThreeWindingTransformer,
            Component::Source(_) => ComponentKind::Source,
            Component::SymLoad(_) => ComponentKind::SymLoad,
            Component::AsymLoad(_) => ComponentKind::AsymLoad,
            Component::Shunt(_) => ComponentKind::Shunt,
            Component::SymVoltageSensor(_) => ComponentKind::SymVoltageSensor,
            Component::AsymVoltageSensor(_) => ComponentKind::AsymVoltageSensor,
            Component::SymPowerSensor(_) => ComponentKind::SymPowerSensor,
            Component::AsymPowerSensor(_) => ComponentKind::AsymPowerSensor,
            Component::CurrentSensor(_) => ComponentKind::CurrentSensor,
            Component::Fault(_) => ComponentKind::Fault,
            Component::TransformerTapRegulator(_) => ComponentKind::TransformerTapRegulator,
        }
    }

    /// Apply a matching update record, reporting what kind of cache it
    /// invalidates. Panics if `update`'s variant does not match `self`'s —
    /// callers resolve the component by ID first, so a mismatch is a
    /// programming error in the update dataset's component tagging, not a
    /// runtime condition to recover from.
    pub fn apply_update(&mut self, update: &ComponentUpdate) -> UpdateChange {
        match (self, update) {
            (Component::Node(c), ComponentUpdate::Node(u)) => c.apply(u),
            (Component::Line(c), ComponentUpdate::Branch(u)) => c.apply(u),
            (Component::Link(c), ComponentUpdate::Branch(u)) => c.apply(u),
            (Component::Transformer(c), ComponentUpdate::Branch(u)) => c.apply(u),
            (Component::ThreeWindingTransformer(c), ComponentUpdate::Branch3(u)) => c.apply(u),
            (Component::Source(c), ComponentUpdate::Appliance(u)) => c.apply(u),
            (Component::SymLoad(c), ComponentUpdate::Appliance(u)) => c.apply(u),
            (Component::AsymLoad(c), ComponentUpdate::Appliance(u)) => c.apply(u),
            (Component::Shunt(c), ComponentUpdate::Appliance(u)) => c.apply(u),
            (Component::SymVoltageSensor(c), ComponentUpdate::Sensor(u)) => c.apply(u),
            (Component::AsymVoltageSensor(c), ComponentUpdate::Sensor(u)) => c.apply(u),
            (Component::SymPowerSensor(c), ComponentUpdate::Sensor(u)) => c.apply(u),
            (Component::AsymPowerSensor(c), ComponentUpdate::Sensor(u)) => c.apply(u),
            (Component::CurrentSensor(c), ComponentUpdate::Sensor(u)) => c.apply(u),
            (Component::Fault(c), ComponentUpdate::Fault(u)) => c.apply(u),
            (Component::TransformerTapRegulator(c), ComponentUpdate::Regulator(u)) => c.apply(u),
            (component, update) => panic!(
                "update variant {:?} does not match component kind {:?}",
                update.kind_name(),
                component.kind()
            ),
        }
    }

    /// Produce the inverse of `update` as observed against this component's
    /// *current* (pre-apply) state. Callers capture this before calling
    /// `apply_update` so a later `restore` can undo the edit.
    pub fn inverse_update(&self, update: &ComponentUpdate) -> ComponentUpdate {
        match (self, update) {
            (Component::Node(c), ComponentUpdate::Node(u)) => ComponentUpdate::Node(c.inverse(u)),
            (Component::Line(c), ComponentUpdate::Branch(u)) => ComponentUpdate::Branch(c.inverse(u)),
            (Component::Link(c), ComponentUpdate::Branch(u)) => ComponentUpdate::Branch(c.inverse(u)),
            (Component::Transformer(c), ComponentUpdate::Branch(u)) => ComponentUpdate::Branch(c.inverse(u)),
            (Component::ThreeWindingTransformer(c), ComponentUpdate::Branch3(u)) => ComponentUpdate::Branch3(c.inverse(u)),
            (Component::Source(c), ComponentUpdate::Appliance(u)) => ComponentUpdate::Appliance(c.inverse(u)),
            (Component::SymLoad(c), ComponentUpdate::Appliance(u)) => ComponentUpdate::Appliance(c.inverse(u)),
            (Component::AsymLoad(c), ComponentUpdate::Appliance(u)) => ComponentUpdate::Appliance(c.inverse(u)),
            (Component::Shunt(c), ComponentUpdate::Appliance(u)) => ComponentUpdate::Appliance(c.inverse(u)),
            (Component::SymVoltageSensor(c), ComponentUpdate::Sensor(u)) => ComponentUpdate::Sensor(c.inverse(u)),
            (Component::AsymVoltageSensor(c), ComponentUpdate::Sensor(u)) => ComponentUpdate::Sensor(c.inverse(u)),
            (Component::SymPowerSensor(c), ComponentUpdate::Sensor(u)) => ComponentUpdate::Sensor(c.inverse(u)),
            (Component::AsymPowerSensor(c), ComponentUpdate::Sensor(u)) => ComponentUpdate::Sensor(c.inverse(u)),
            (Component::CurrentSensor(c), ComponentUpdate::Sensor(u)) => ComponentUpdate::Sensor(c.inverse(u)),
            (Component::Fault(c), ComponentUpdate::Fault(u)) => ComponentUpdate::Fault(c.inverse(u)),
            (Component::TransformerTapRegulator(c), ComponentUpdate::Regulator(u)) => ComponentUpdate::Regulator(c.inverse(u)),
            (component, update) => panic!(
                "update variant {:?} does not match component kind {:?}",
                update.kind_name(),
                component.kind()
            ),
        }
    }

    /// Node IDs this component's terminals reference, in terminal order.
    /// Empty for components with no topological endpoint (none in this set,
    /// but kept total rather than partial for sensors/regulators which
    /// reference an object rather than a node directly).
    pub fn node_refs(&self) -> Vec<ID> {
        match self {
            Component::Node(_) => vec![],
            Component::Line(c) => vec![c.from_node, c.to_node],
            Component::Link(c) => vec![c.from_node, c.to_node],
            Component::Transformer(c) => vec![c.from_node, c.to_node],
            Component::ThreeWindingTransformer(c) => vec![c.node_1, c.node_2, c.node_3],
            Component::Source(c) => vec![c.node],
            Component::SymLoad(c) => vec![c.node],
            Component::AsymLoad(c) => vec![c.node],
            Component::Shunt(c) => vec![c.node],
            Component::SymVoltageSensor(c) => vec![c.measured_object],
            Component::AsymVoltageSensor(c) => vec![c.measured_object],
            Component::SymPowerSensor(c) => vec![c.measured_object],
            Component::AsymPowerSensor(c) => vec![c.measured_object],
            Component::CurrentSensor(c) => vec![c.measured_object],
            Component::Fault(c) => c.fault_object.into_iter().collect(),
            Component::TransformerTapRegulator(c) => vec![c.regulated_object],
        }
    }
}

/// A tagged sum of every per-kind update record, dispatched against a
/// [`Component`] by [`Component::apply_update`]/[`Component::inverse_update`].
/// One variant covers every two-terminal branch kind (`Line`/`Link`/
/// `Transformer`) and every single-terminal appliance kind (`Source`/
/// `SymLoad`/`AsymLoad`/`Shunt`), since their update fields already overlap
/// enough that the per-kind `apply` methods share one update struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ComponentUpdate {
    Node(NodeUpdate),
    Branch(BranchUpdate),
    Branch3(Branch3Update),
    Appliance(ApplianceUpdate),
    Sensor(SensorUpdate),
    Fault(FaultUpdate),
    Regulator(RegulatorUpdate),
}

impl ComponentUpdate {
    pub fn id(&self) -> ID {
        match self {
            ComponentUpdate::Node(u) => u.id,
            ComponentUpdate::Branch(u) => u.id,
            ComponentUpdate::Branch3(u) => u.id,
            ComponentUpdate::Appliance(u) => u.id,
            ComponentUpdate::Sensor(u) => u.id,
            ComponentUpdate::Fault(u) => u.id,
            ComponentUpdate::Regulator(u) => u.id,
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            ComponentUpdate::Node(_) => "node",
            ComponentUpdate::Branch(_) => "branch",
            ComponentUpdate::Branch3(_) => "branch3",
            ComponentUpdate::Appliance(_) => "appliance",
            ComponentUpdate::Sensor(_) => "sensor",
            ComponentUpdate::Fault(_) => "fault",
            ComponentUpdate::Regulator(_) => "regulator",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_have_distinct_names() {
        let mut names: Vec<&str> = ComponentKind::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ComponentKind::ALL.len());
    }

    #[test]
    fn branch_kinds_are_two_terminal() {
        assert!(ComponentKind::Line.is_branch());
        assert!(!ComponentKind::ThreeWindingTransformer.is_branch());
        assert!(ComponentKind::ThreeWindingTransformer.is_branch3());
    }

    #[test]
    fn apply_update_dispatches_by_matching_variant() {
        let mut component = Component::Source(Source {
            id: 6,
            node: 1,
            status: true,
            u_ref: 1.05,
            u_ref_angle: 0.0,
            sk: None,
            rx_ratio: None,
            z01_ratio: None,
        });
        let update = ComponentUpdate::Appliance(ApplianceUpdate {
            id: 6,
            status: Some(false),
            ..Default::default()
        });
        let inverse = component.inverse_update(&update);
        let change = component.apply_update(&update);
        assert!(change.topo);
        if let Component::Source(s) = &component {
            assert!(!s.status);
        } else {
            unreachable!()
        }
        component.apply_update(&inverse);
        if let Component::Source(s) = &component {
            assert!(s.status);
        } else {
            unreachable!()
        }
    }

    #[test]
    #[should_panic(expected = "does not match component kind")]
    fn apply_update_panics_on_kind_mismatch() {
        let mut component = Component::Node(Node { id: 1, u_rated: 10_000.0 });
        let update = ComponentUpdate::Fault(FaultUpdate {
            id: 1,
            ..Default::default()
        });
        component.apply_update(&update);
    }
}
