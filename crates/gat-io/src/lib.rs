//! # gat-io: dataset representation and wire serialization
//!
//! Bridges `gat_core::ComponentStore` to the outside world: a batch-aware,
//! row/columnar [`dataset::Dataset`] representation, and the tagged
//! binary/JSON [`serialize`] layer that encodes and decodes it.

pub mod dataset;
pub mod serialize;

pub use dataset::{AttrValue, ComponentBuffer, ComponentSlot, Dataset, ElementRecord};
pub use serialize::{deserialize_dataset, from_binary, from_json, serialize_dataset, to_binary, to_json_pretty, Envelope, Value};
