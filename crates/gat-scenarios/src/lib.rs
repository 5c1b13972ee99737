//! # gat-scenarios: the update engine
//!
//! Translates one scenario of an update-shape [`gat_io::Dataset`] into edits
//! against a `gat_core::ComponentStore`, capturing the inverse needed to roll
//! a `cached`-mode batch calculation back to its pre-update state, and
//! classifying whether a dataset's component update layout is independent
//! across scenarios so the id-to-coordinate lookup can be hoisted out of the
//! per-scenario loop.

pub mod engine;

pub use engine::{
    apply_scenario, apply_scenario_for_kind, apply_scenario_with_caches, build_caches,
    build_sequence_cache, element_to_update, is_update_independent, restore, SequenceCache,
};
