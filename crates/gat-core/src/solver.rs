//! Pluggable dense linear-system backend used by the math-state cache's
//! solver instances, plus a data-driven registry so a caller can select one
//! by name at runtime (`SolverKind::from_str`) or register their own.

pub mod backend;
pub mod registry;

pub use backend::{FaerSolver, GaussSolver, LinearSystemBackend};
pub use registry::{register_solver, SolverKind};
