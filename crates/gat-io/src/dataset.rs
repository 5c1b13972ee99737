//! The typed, batch-aware dataset representation that sits between the wire
//! encodings (see [`crate::serialize`]) and `gat_core::ComponentStore`.
//!
//! A [`Dataset`] is an ordered collection of per-component buffers, each
//! either row-based (a flat sequence of element records) or columnar (a set
//! of named attribute columns, possibly sparse). Grounded on
//! `auxiliary/dataset.hpp`'s `ConstDataset`/`MutableDataset` pair, collapsed
//! here into a single owned representation since this crate does not need
//! the original's separate read/write-handle split.

use std::collections::BTreeMap;

use gat_core::component::ComponentKind;
use gat_core::error::GatError;

/// A single attribute value. Mirrors the metadata registry's `CType` tags,
/// plus `Nil` for "not provided" (which decodes to NaN for numeric columns).
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Nil,
    Int8(i8),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Double3([f64; 3]),
}

impl AttrValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            AttrValue::Double(v) => *v,
            AttrValue::Int32(v) => *v as f64,
            AttrValue::Int64(v) => *v as f64,
            AttrValue::Int8(v) => *v as f64,
            AttrValue::Double3(_) | AttrValue::Nil => f64::NAN,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            AttrValue::Int32(v) => Some(*v),
            AttrValue::Int8(v) => Some(*v as i32),
            AttrValue::Int64(v) => Some(*v as i32),
            _ => None,
        }
    }

    pub fn is_nil_or_nan(&self) -> bool {
        matches!(self, AttrValue::Nil) || matches!(self, AttrValue::Double(v) if v.is_nan())
    }
}

/// One element record: attribute name to value, always including `id`.
pub type ElementRecord = BTreeMap<String, AttrValue>;

/// Storage shape for one component's buffer within a dataset.
#[derive(Debug, Clone)]
pub enum ComponentBuffer {
    /// A flat sequence of element records, `elements_per_scenario` (or
    /// `indptr`-sliced) wide per scenario.
    Row(Vec<ElementRecord>),
    /// A set of named attribute columns, each the same total length as the
    /// row form would be. A columnar buffer with zero columns is "present
    /// but all-implicit-NaN" per the dataset invariant.
    Columnar(BTreeMap<String, Vec<AttrValue>>),
}

/// One component's slot within a [`Dataset`]: its buffer plus the
/// scenario-partitioning metadata (uniform `elements_per_scenario` or a
/// ragged `indptr`) and an optional declared positional attribute order.
#[derive(Debug, Clone)]
pub struct ComponentSlot {
    pub kind: ComponentKind,
    pub buffer: ComponentBuffer,
    /// `None` denotes the ragged case (`indptr` is authoritative instead).
    pub elements_per_scenario: Option<i64>,
    pub indptr: Option<Vec<i64>>,
    pub attribute_order: Option<Vec<String>>,
}

impl ComponentSlot {
    fn total_elements(&self) -> usize {
        match &self.buffer {
            ComponentBuffer::Row(rows) => rows.len(),
            ComponentBuffer::Columnar(cols) => cols.values().map(|c| c.len()).next().unwrap_or(0),
        }
    }

    fn is_columnar(&self) -> bool {
        matches!(self.buffer, ComponentBuffer::Columnar(_))
    }

    /// Element-index range `[start, end)` for `scenario` within this slot.
    fn scenario_range(&self, scenario: usize) -> Result<(usize, usize), GatError> {
        if let Some(indptr) = &self.indptr {
            let start = *indptr.get(scenario).ok_or_else(|| {
                GatError::DatasetError(format!("scenario {scenario} out of range for indptr"))
            })?;
            let end = *indptr.get(scenario + 1).ok_or_else(|| {
                GatError::DatasetError(format!("scenario {scenario} out of range for indptr"))
            })?;
            Ok((start as usize, end as usize))
        } else {
            let eps = self.elements_per_scenario.unwrap_or(0).max(0) as usize;
            let start = scenario * eps;
            Ok((start, start + eps))
        }
    }
}

/// An ordered collection of per-component buffers describing `batch_size`
/// scenarios (a non-batch dataset is `batch_size == 1`).
#[derive(Debug, Clone)]
pub struct Dataset {
    pub is_batch: bool,
    pub batch_size: usize,
    order: Vec<ComponentKind>,
    slots: BTreeMap<ComponentKind, ComponentSlot>,
}

impl Dataset {
    pub fn new(is_batch: bool, batch_size: usize) -> Self {
        Self {
            is_batch,
            batch_size,
            order: Vec::new(),
            slots: BTreeMap::new(),
        }
    }

    /// Register a row-based buffer for `kind`. `indptr`, when given, must
    /// start at 0, end at `total_elements`, and have `batch_size + 1`
    /// entries; otherwise the buffer is uniform and
    /// `total_elements == elements_per_scenario * batch_size`.
    pub fn add_buffer(
        &mut self,
        kind: ComponentKind,
        elements_per_scenario: i64,
        total_elements: usize,
        indptr: Option<Vec<i64>>,
        rows: Vec<ElementRecord>,
    ) -> Result<(), GatError> {
        if self.slots.contains_key(&kind) {
            return Err(GatError::DatasetError(format!(
                "duplicate component `{}` in dataset",
                kind.name()
            )));
        }
        if rows.len() != total_elements {
            return Err(GatError::DatasetError(format!(
                "`{}`: total_elements {} does not match supplied row count {}",
                kind.name(),
                total_elements,
                rows.len()
            )));
        }
        match &indptr {
            Some(p) => {
                if p.len() != self.batch_size + 1 {
                    return Err(GatError::DatasetError(format!(
                        "`{}`: indptr length {} != batch_size+1 ({})",
                        kind.name(),
                        p.len(),
                        self.batch_size + 1
                    )));
                }
                if p.first() != Some(&0) || p.last() != Some(&(total_elements as i64)) {
                    return Err(GatError::DatasetError(format!(
                        "`{}`: ragged indptr must start at 0 and end at total_elements",
                        kind.name()
                    )));
                }
            }
            None => {
                let expected = elements_per_scenario.max(0) as usize * self.batch_size;
                if expected != total_elements {
                    return Err(GatError::DatasetError(format!(
                        "`{}`: uniform elements_per_scenario {} * batch_size {} != total_elements {}",
                        kind.name(),
                        elements_per_scenario,
                        self.batch_size,
                        total_elements
                    )));
                }
            }
        }
        let eps = if indptr.is_some() { None } else { Some(elements_per_scenario) };
        self.order.push(kind);
        self.slots.insert(
            kind,
            ComponentSlot {
                kind,
                buffer: ComponentBuffer::Row(rows),
                elements_per_scenario: eps,
                indptr,
                attribute_order: None,
            },
        );
        Ok(())
    }

    /// Register (or extend) a columnar attribute buffer for `kind`, marking
    /// the slot columnar. The first call for a given `kind` establishes its
    /// scenario partitioning from `data.len()` as a single uniform scenario
    /// count (`elements_per_scenario = data.len() / batch_size`).
    pub fn add_attribute_buffer(
        &mut self,
        kind: ComponentKind,
        attribute: &str,
        data: Vec<AttrValue>,
    ) -> Result<(), GatError> {
        if !self.slots.contains_key(&kind) {
            self.order.push(kind);
            let eps = if self.batch_size == 0 {
                0
            } else {
                (data.len() / self.batch_size) as i64
            };
            self.slots.insert(
                kind,
                ComponentSlot {
                    kind,
                    buffer: ComponentBuffer::Columnar(BTreeMap::new()),
                    elements_per_scenario: Some(eps),
                    indptr: None,
                    attribute_order: None,
                },
            );
        }
        let entry = self.slots.get_mut(&kind).expect("just inserted or already present");
        match &mut entry.buffer {
            ComponentBuffer::Columnar(cols) => {
                cols.insert(attribute.to_string(), data);
            }
            ComponentBuffer::Row(_) => {
                return Err(GatError::DatasetError(format!(
                    "`{}` already registered as a row buffer, cannot add attribute column",
                    kind.name()
                )));
            }
        }
        Ok(())
    }

    pub fn is_columnar(&self, kind: ComponentKind) -> bool {
        self.slots.get(&kind).map(|s| s.is_columnar()).unwrap_or(false)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.order.iter().copied()
    }

    pub fn slot(&self, kind: ComponentKind) -> Option<&ComponentSlot> {
        self.slots.get(&kind)
    }

    /// Number of elements `kind` carries in `scenario` (ragged-aware).
    pub fn elements_per_scenario(&self, kind: ComponentKind, scenario: usize) -> Result<usize, GatError> {
        let slot = self
            .slots
            .get(&kind)
            .ok_or_else(|| GatError::DatasetError(format!("no buffer for component `{}`", kind.name())))?;
        let (start, end) = slot.scenario_range(scenario)?;
        Ok(end - start)
    }

    /// Row-based view into `scenario`'s element slice.
    pub fn get_span(&self, kind: ComponentKind, scenario: usize) -> Result<&[ElementRecord], GatError> {
        let slot = self
            .slots
            .get(&kind)
            .ok_or_else(|| GatError::DatasetError(format!("no buffer for component `{}`", kind.name())))?;
        let (start, end) = slot.scenario_range(scenario)?;
        match &slot.buffer {
            ComponentBuffer::Row(rows) => rows.get(start..end).ok_or_else(|| {
                GatError::DatasetError(format!("`{}`: scenario {scenario} range out of bounds", kind.name()))
            }),
            ComponentBuffer::Columnar(_) => Err(GatError::DatasetError(format!(
                "`{}` is columnar; use get_column",
                kind.name()
            ))),
        }
    }

    /// Columnar view into `scenario`'s slice of `attribute`. Missing
    /// attributes in a columnar buffer (or the buffer not existing) are
    /// treated as all-NaN rather than an error, matching the dataset's
    /// sparse-columnar convention.
    pub fn get_column(&self, kind: ComponentKind, attribute: &str, scenario: usize) -> Result<Vec<AttrValue>, GatError> {
        let Some(slot) = self.slots.get(&kind) else {
            return Ok(Vec::new());
        };
        let (start, end) = slot.scenario_range(scenario)?;
        match &slot.buffer {
            ComponentBuffer::Columnar(cols) => match cols.get(attribute) {
                Some(col) => Ok(col.get(start..end).unwrap_or(&[]).to_vec()),
                None => Ok(vec![AttrValue::Nil; end - start]),
            },
            ComponentBuffer::Row(rows) => Ok(rows[start..end]
                .iter()
                .map(|r| r.get(attribute).cloned().unwrap_or(AttrValue::Nil))
                .collect()),
        }
    }

    pub fn total_elements(&self, kind: ComponentKind) -> usize {
        self.slots.get(&kind).map(|s| s.total_elements()).unwrap_or(0)
    }

    pub fn set_attribute_order(&mut self, kind: ComponentKind, order: Vec<String>) {
        if let Some(slot) = self.slots.get_mut(&kind) {
            slot.attribute_order = Some(order);
        }
    }

    pub fn attribute_order(&self, kind: ComponentKind) -> Option<&[String]> {
        self.slots.get(&kind).and_then(|s| s.attribute_order.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i32) -> ElementRecord {
        let mut r = ElementRecord::new();
        r.insert("id".into(), AttrValue::Int32(id));
        r
    }

    #[test]
    fn uniform_buffer_round_trips() {
        let mut ds = Dataset::new(true, 2);
        ds.add_buffer(ComponentKind::Node, 2, 4, None, vec![row(1), row(2), row(3), row(4)])
            .unwrap();
        assert_eq!(ds.elements_per_scenario(ComponentKind::Node, 0).unwrap(), 2);
        let span = ds.get_span(ComponentKind::Node, 1).unwrap();
        assert_eq!(span.len(), 2);
        assert_eq!(span[0].get("id").unwrap().as_i32(), Some(3));
    }

    #[test]
    fn ragged_buffer_rejects_indptr_not_starting_at_zero() {
        let mut ds = Dataset::new(true, 2);
        let err = ds
            .add_buffer(ComponentKind::Node, -1, 3, Some(vec![1, 1, 3]), vec![row(1), row(2), row(3)])
            .unwrap_err();
        assert!(matches!(err, GatError::DatasetError(_)));
    }

    #[test]
    fn ragged_buffer_valid_case() {
        let mut ds = Dataset::new(true, 2);
        ds.add_buffer(ComponentKind::Node, -1, 3, Some(vec![0, 1, 3]), vec![row(1), row(2), row(3)])
            .unwrap();
        assert_eq!(ds.elements_per_scenario(ComponentKind::Node, 0).unwrap(), 1);
        assert_eq!(ds.elements_per_scenario(ComponentKind::Node, 1).unwrap(), 2);
    }

    #[test]
    fn duplicate_component_rejected() {
        let mut ds = Dataset::new(false, 1);
        ds.add_buffer(ComponentKind::Node, 1, 1, None, vec![row(1)]).unwrap();
        let err = ds.add_buffer(ComponentKind::Node, 1, 1, None, vec![row(2)]).unwrap_err();
        assert!(matches!(err, GatError::DatasetError(_)));
    }

    #[test]
    fn columnar_buffer_missing_attribute_is_nan() {
        let mut ds = Dataset::new(false, 1);
        ds.add_attribute_buffer(ComponentKind::SymLoad, "id", vec![AttrValue::Int32(7)])
            .unwrap();
        assert!(ds.is_columnar(ComponentKind::SymLoad));
        let col = ds.get_column(ComponentKind::SymLoad, "p_specified", 0).unwrap();
        assert_eq!(col.len(), 1);
        assert!(matches!(col[0], AttrValue::Nil));
    }
}
