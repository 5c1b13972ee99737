//! # gat-core: steady-state and short-circuit model engine
//!
//! Owns the typed heterogeneous component store, the topology builder that
//! turns component-level connectivity into per-island math graphs, the
//! math-state cache that keeps per-island Y-bus matrices valid across
//! updates, and the process-wide dataset metadata registry every layer above
//! (update engine, batch dispatcher, serializer) consults for shape and
//! type information.
//!
//! ## Modules
//!
//! - [`ids`] - caller-facing `ID` and internal `Idx`/`Idx2D`/`Idx2DBranch3` coordinates
//! - [`component`] - the sixteen component variants, their update records, and outputs
//! - [`store`] - `ComponentStore`, the typed heterogeneous container
//! - [`metadata`] - `MetaDataset`, the process-wide attribute/shape registry
//! - [`topology`] - `TopologyBuilder`, `MathTopology`, `ComponentTopology`
//! - [`mathstate`] - `MathState`, the per-symmetry Y-bus validity cache
//! - [`error`] - `GatError`, the crate-wide error type
//! - [`solver`] - pluggable dense linear-system backend and registry
//! - [`diagnostics`] - severity-tagged issue collection for validation reporting
//! - [`units`] - compile-time unit safety for power system quantities

pub mod component;
pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod mathstate;
pub mod metadata;
pub mod solver;
pub mod store;
pub mod topology;
pub mod units;

pub use component::{
    ApplianceUpdate, Branch3Update, BranchUpdate, Component, ComponentKind, ComponentUpdate,
    FaultUpdate, NodeUpdate, RegulatorUpdate, SensorUpdate, Symmetry, UpdateChange,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, ImportDiagnostics, ImportStats, Severity};
pub use error::{GatError, GatResult};
pub use ids::{Idx, Idx2D, Idx2DBranch3, ID, NONE_IDX};
pub use mathstate::{CacheState, MathState, SymmetryCache, YBusParams};
pub use metadata::{attributes_of, permitted_components, CType, DatasetShape, MetaAttribute, MetaComponent, MetaDataset};
pub use solver::{register_solver, FaerSolver, GaussSolver, LinearSystemBackend, SolverKind};
pub use store::ComponentStore;
pub use topology::{ComponentTopology, GroupedIndexVector, MathTopology, TopologyBuilder};
pub use units::{
    AdmittancePu, CurrentPu, Degrees, ImpedancePu, Kiloamperes, Kilovolts, Megavars,
    MegavoltAmperes, Megawatts, PerUnit, Radians,
};
