//! The typed heterogeneous component store.
//!
//! Grounded on `container.hpp`'s `Container<RetrievableTypes<...>,
//! StorageableTypes...>`: one contiguous `Vec<T>` per stored kind, a
//! caller-ID → `(group, pos)` index, and a cumulative-size table computed
//! once at `set_construction_complete` that makes supertype-range lookups
//! (`seq_of`) O(1) instead of O(groups). Translated from the C++ CRTP
//! static-dispatch table into an enum-tagged store the way a `Node`/`Edge`
//! graph-element pair is dispatched, generalized to sixteen variants
//! instead of four.

use std::collections::HashMap;

use crate::component::{Component, ComponentKind};
use crate::error::GatError;
use crate::ids::{Idx, Idx2D, ID};

/// One bucket per `ComponentKind`, holding that kind's components in
/// insertion order. `group` in `Idx2D` indexes into `ComponentKind::ALL`;
/// `pos` indexes within the bucket.
#[derive(Debug, Default, Clone)]
pub struct ComponentStore {
    groups: Vec<Vec<Component>>,
    id_index: HashMap<ID, Idx2D>,
    /// Cumulative count of components up to and including each group,
    /// computed once construction completes (`container.hpp`'s
    /// `cum_size_`, built via `std::inclusive_scan`).
    cum_size: Vec<Idx>,
    construction_complete: bool,
}

impl ComponentStore {
    pub fn new() -> Self {
        let groups = ComponentKind::ALL.iter().map(|_| Vec::new()).collect();
        Self {
            groups,
            id_index: HashMap::new(),
            cum_size: Vec::new(),
            construction_complete: false,
        }
    }

    fn group_index(kind: ComponentKind) -> usize {
        ComponentKind::ALL
            .iter()
            .position(|k| *k == kind)
            .expect("ComponentKind::ALL is exhaustive")
    }

    /// Reserve capacity in the bucket for `kind`. No-op after
    /// construction-complete (components are never added past that point,
    /// so reserving would be meaningless).
    pub fn reserve(&mut self, kind: ComponentKind, additional: usize) {
        assert!(
            !self.construction_complete,
            "cannot reserve after construction is complete"
        );
        self.groups[Self::group_index(kind)].reserve(additional);
    }

    /// Insert a component. Fails with `ConflictId` if its ID is already
    /// present. Panics (as the C++ original asserts) if construction is
    /// already complete — this is a programming error, not a runtime one.
    pub fn emplace(&mut self, component: Component) -> Result<Idx2D, GatError> {
        assert!(
            !self.construction_complete,
            "cannot emplace after construction is complete"
        );
        let id = component.id();
        if self.id_index.contains_key(&id) {
            return Err(GatError::ConflictId(id));
        }
        let group = Self::group_index(component.kind()) as Idx;
        let bucket = &mut self.groups[group as usize];
        let pos = bucket.len() as Idx;
        bucket.push(component);
        let coord = Idx2D::new(group, pos);
        self.id_index.insert(id, coord);
        Ok(coord)
    }

    /// Resolve a caller ID to its store coordinate, verifying it belongs to
    /// a kind compatible with `expected` (`None` accepts any kind).
    pub fn get_idx_by_id(&self, id: ID, expected: Option<ComponentKind>) -> Result<Idx2D, GatError> {
        let coord = *self.id_index.get(&id).ok_or(GatError::IdNotFound(id))?;
        if let Some(kind) = expected {
            let actual = self.groups[coord.group as usize][coord.pos as usize].kind();
            if actual != kind {
                return Err(GatError::IdWrongType(id));
            }
        }
        Ok(coord)
    }

    pub fn get_by_coord(&self, coord: Idx2D) -> Option<&Component> {
        if coord.is_none() {
            return None;
        }
        self.groups
            .get(coord.group as usize)
            .and_then(|bucket| bucket.get(coord.pos as usize))
    }

    pub fn get_by_coord_mut(&mut self, coord: Idx2D) -> Option<&mut Component> {
        if coord.is_none() {
            return None;
        }
        self.groups
            .get_mut(coord.group as usize)
            .and_then(|bucket| bucket.get_mut(coord.pos as usize))
    }

    pub fn get_by_id(&self, id: ID) -> Result<&Component, GatError> {
        let coord = self.get_idx_by_id(id, None)?;
        Ok(self.get_by_coord(coord).expect("id_index coordinate must be valid"))
    }

    /// Number of components stored under `kind`.
    pub fn count(&self, kind: ComponentKind) -> usize {
        self.groups[Self::group_index(kind)].len()
    }

    pub fn iter(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.groups[Self::group_index(kind)].iter()
    }

    pub fn all_component_count(&self) -> HashMap<&'static str, usize> {
        ComponentKind::ALL
            .iter()
            .map(|k| (k.name(), self.count(*k)))
            .filter(|(_, n)| *n > 0)
            .collect()
    }

    /// Freeze the store: no more `emplace` calls are permitted, and the
    /// cumulative-size table used by `seq_of` is computed.
    pub fn set_construction_complete(&mut self) {
        let mut running: Idx = 0;
        let mut cum = Vec::with_capacity(self.groups.len());
        for bucket in &self.groups {
            running += bucket.len() as Idx;
            cum.push(running);
        }
        self.cum_size = cum;
        self.construction_complete = true;
    }

    pub fn is_construction_complete(&self) -> bool {
        self.construction_complete
    }

    /// Linearized position of `coord` within the supertype range spanned by
    /// all groups (i.e. across all component kinds, group-then-position
    /// order). Mirrors `container.hpp::get_seq`.
    pub fn seq_of(&self, coord: Idx2D) -> Idx {
        assert!(
            self.construction_complete,
            "seq_of requires construction to be complete"
        );
        let preceding: Idx = if coord.group == 0 {
            0
        } else {
            self.cum_size[coord.group as usize - 1]
        };
        preceding + coord.pos
    }

    /// Total number of components across all kinds (valid only once
    /// construction is complete).
    pub fn total_size(&self) -> Idx {
        self.cum_size.last().copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Node;

    fn node(id: ID, u_rated: f64) -> Component {
        Component::Node(Node { id, u_rated })
    }

    #[test]
    fn emplace_and_lookup_roundtrip() {
        let mut store = ComponentStore::new();
        let coord1 = store.emplace(node(1, 10_000.0)).unwrap();
        let coord2 = store.emplace(node(2, 10_000.0)).unwrap();
        assert_eq!(store.get_idx_by_id(1, Some(ComponentKind::Node)).unwrap(), coord1);
        assert_eq!(store.get_idx_by_id(2, None).unwrap(), coord2);
    }

    #[test]
    fn duplicate_id_is_conflict() {
        let mut store = ComponentStore::new();
        store.emplace(node(1, 10_000.0)).unwrap();
        let err = store.emplace(node(1, 10_000.0)).unwrap_err();
        assert!(matches!(err, GatError::ConflictId(1)));
    }

    #[test]
    fn unknown_id_not_found() {
        let store = ComponentStore::new();
        let err = store.get_idx_by_id(99, None).unwrap_err();
        assert!(matches!(err, GatError::IdNotFound(99)));
    }

    #[test]
    fn wrong_type_rejected() {
        let mut store = ComponentStore::new();
        store.emplace(node(1, 10_000.0)).unwrap();
        let err = store
            .get_idx_by_id(1, Some(ComponentKind::Line))
            .unwrap_err();
        assert!(matches!(err, GatError::IdWrongType(1)));
    }

    #[test]
    fn seq_of_matches_construction_order_after_complete() {
        let mut store = ComponentStore::new();
        let coord1 = store.emplace(node(1, 10_000.0)).unwrap();
        let coord2 = store.emplace(node(2, 10_000.0)).unwrap();
        store.set_construction_complete();
        assert_eq!(store.seq_of(coord1), 0);
        assert_eq!(store.seq_of(coord2), 1);
        assert_eq!(store.total_size(), 2);
    }

    #[test]
    #[should_panic(expected = "cannot emplace after construction is complete")]
    fn emplace_after_complete_panics() {
        let mut store = ComponentStore::new();
        store.set_construction_complete();
        let _ = store.emplace(node(1, 10_000.0));
    }
}
