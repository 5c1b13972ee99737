//! The math-state cache: per-island Y-bus matrices and their validity,
//! kept separately for the symmetric and asymmetric representations.
//!
//! Grounded on `main_core/math_state.hpp` and `main_core/y_bus.hpp`'s
//! "parameters published as a shared, reference-counted record; a solver
//! subscribes and is told when the record changes" design. The engine
//! itself does not own a solver — solvers are an external pluggable
//! strategy — so this module stops at producing a coherent
//! `Arc<YBusParams>` per island and recording whether the *next* solve can
//! reuse it, matching `gat-algo::sparse::ybus::SparseYBus`'s CSR
//! construction style but keyed per island instead of per whole network,
//! and storing one combined complex matrix instead of split G/B (the
//! engine downstream only ever wants `Y = G + jB` as a unit).

use std::collections::HashSet;
use std::sync::Arc;

use num_complex::Complex64;
use sprs::{CsMat, TriMat};

use crate::component::{Component, ComponentKind, LoadGenType, Symmetry};
use crate::error::GatError;
use crate::ids::{Idx, ID};
use crate::store::ComponentStore;
use crate::topology::{ComponentTopology, MathTopology};

/// One island's admittance matrix, shared between the cache and whatever
/// solver instance is using it. Publishing a new record (rather than
/// mutating the old one) is what lets a solver's "parameters changed"
/// callback be a cheap pointer comparison.
#[derive(Debug, Clone)]
pub struct YBusParams {
    pub n_bus: usize,
    pub y: CsMat<Complex64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    TopologyOnly,
    ParametersStale,
    Ready,
}

/// Cache for a single symmetry mode: one Y-bus per island, plus its
/// cache-validity state.
#[derive(Debug, Default)]
pub struct SymmetryCache {
    pub state: Vec<CacheState>,
    pub y_bus: Vec<Option<Arc<YBusParams>>>,
}

/// The full math-state cache: topology validity shared across symmetries,
/// plus one `SymmetryCache` each for symmetric/asymmetric.
#[derive(Debug, Default)]
pub struct MathState {
    pub topology_valid: bool,
    pub last_symmetry_mode: Option<Symmetry>,
    pub changed_components: HashSet<ID>,
    pub symmetric: SymmetryCache,
    pub asymmetric: SymmetryCache,
}

impl MathState {
    pub fn new() -> Self {
        Self::default()
    }

    fn cache_mut(&mut self, sym: Symmetry) -> &mut SymmetryCache {
        match sym {
            Symmetry::Symmetric => &mut self.symmetric,
            Symmetry::Asymmetric => &mut self.asymmetric,
        }
    }

    /// Mark both symmetries' Y-bus stale because topology changed (an
    /// `update{topo}`).
    pub fn invalidate_topology(&mut self) {
        self.topology_valid = false;
        self.symmetric.y_bus.clear();
        self.symmetric.state.clear();
        self.asymmetric.y_bus.clear();
        self.asymmetric.state.clear();
    }

    /// Mark parameters stale for both symmetries (an `update{param}`).
    pub fn invalidate_parameters(&mut self, changed: impl IntoIterator<Item = ID>) {
        self.changed_components.extend(changed);
        for cache in [&mut self.symmetric, &mut self.asymmetric] {
            for state in &mut cache.state {
                if *state == CacheState::Ready {
                    *state = CacheState::ParametersStale;
                }
            }
        }
    }

    /// Ensure the Y-bus and (conceptually) solver set for `sym` are
    /// coherent with the current topology and parameters.
    pub fn prepare(
        &mut self,
        sym: Symmetry,
        store: &ComponentStore,
        comp_topo: &ComponentTopology,
        islands: &[MathTopology],
    ) -> Result<(), GatError> {
        if !self.topology_valid {
            self.symmetric.y_bus.clear();
            self.symmetric.state.clear();
            self.asymmetric.y_bus.clear();
            self.asymmetric.state.clear();
            self.topology_valid = true;
            self.changed_components.clear();
        }

        let n_islands = islands.len();
        {
            let cache = self.cache_mut(sym);
            if cache.y_bus.len() != n_islands {
                cache.y_bus = vec![None; n_islands];
                cache.state = vec![CacheState::Empty; n_islands];
            }
        }

        let use_incremental = self.last_symmetry_mode == Some(sym);

        for island_idx in 0..n_islands {
            let needs_build = {
                let cache = self.cache_mut(sym);
                matches!(cache.state[island_idx], CacheState::Empty | CacheState::ParametersStale)
            };
            if needs_build {
                let params = build_island_ybus(store, comp_topo, &islands[island_idx], island_idx as Idx, sym)?;
                let _ = use_incremental; // incremental refresh reuses sparsity only; value rebuild is the same either way here.
                let cache = self.cache_mut(sym);
                cache.y_bus[island_idx] = Some(Arc::new(params));
                cache.state[island_idx] = CacheState::Ready;
            }
        }

        self.last_symmetry_mode = Some(sym);
        self.changed_components.clear();
        Ok(())
    }

    pub fn y_bus_of(&self, sym: Symmetry, island: usize) -> Option<&Arc<YBusParams>> {
        match sym {
            Symmetry::Symmetric => self.symmetric.y_bus.get(island).and_then(|o| o.as_ref()),
            Symmetry::Asymmetric => self.asymmetric.y_bus.get(island).and_then(|o| o.as_ref()),
        }
    }
}

fn build_island_ybus(
    store: &ComponentStore,
    comp_topo: &ComponentTopology,
    island: &MathTopology,
    island_idx: Idx,
    _sym: Symmetry,
) -> Result<YBusParams, GatError> {
    let n_bus = island.n_node;
    let mut triplet = TriMat::new((n_bus, n_bus));

    let node_u_rated: std::collections::HashMap<ID, f64> = store
        .iter(ComponentKind::Node)
        .filter_map(|c| match c {
            Component::Node(node) => Some((node.id, node.u_rated)),
            _ => None,
        })
        .collect();

    let mut stamp_series = |from: i64, to: i64, y_series: Complex64, y_shunt_half: Complex64, tap: f64, shift_rad: f64| {
        if from < 0 && to < 0 {
            return;
        }
        let tau = if tap.abs() < 1e-12 { 1.0 } else { tap };
        let tau2 = tau * tau;
        let shift = Complex64::from_polar(1.0, -shift_rad);
        if from >= 0 {
            let y_ii = y_series / tau2 + y_shunt_half;
            triplet.add_triplet(from as usize, from as usize, y_ii);
        }
        if to >= 0 {
            let y_jj = y_series + y_shunt_half;
            triplet.add_triplet(to as usize, to as usize, y_jj);
        }
        if from >= 0 && to >= 0 {
            let y_ij = -y_series / tau * shift.conj();
            let y_ji = -y_series / tau * shift;
            triplet.add_triplet(from as usize, to as usize, y_ij);
            triplet.add_triplet(to as usize, from as usize, y_ji);
        }
    };

    for component in store.iter(ComponentKind::Line) {
        let Component::Line(line) = component else { continue };
        let Some(coord) = comp_topo.coupling.get(&line.id) else { continue };
        if coord.is_none() || coord.group != island_idx {
            continue;
        }
        let (from, to) = island.branches[coord.pos as usize];
        let z = Complex64::new(line.r1, line.x1);
        if z.norm() < 1e-12 {
            return Err(GatError::SparseMatrixError(format!("line {} has zero impedance", line.id)));
        }
        let y_shunt_half = Complex64::new(0.0, line.c1 / 2.0);
        stamp_series(from, to, z.inv(), y_shunt_half, 1.0, 0.0);
    }

    for component in store.iter(ComponentKind::Link) {
        let Component::Link(link) = component else { continue };
        let Some(coord) = comp_topo.coupling.get(&link.id) else { continue };
        if coord.is_none() || coord.group != island_idx {
            continue;
        }
        let (from, to) = island.branches[coord.pos as usize];
        // Zero-impedance link: model as a very high admittance tie rather
        // than a literal singular branch, matching a linear solver's usual
        // treatment of switches.
        let y_series = Complex64::new(1.0e6, 0.0);
        stamp_series(from, to, y_series, Complex64::new(0.0, 0.0), 1.0, 0.0);
    }

    for component in store.iter(ComponentKind::Transformer) {
        let Component::Transformer(xfmr) = component else { continue };
        let Some(coord) = comp_topo.coupling.get(&xfmr.id) else { continue };
        if coord.is_none() || coord.group != island_idx {
            continue;
        }
        let (from, to) = island.branches[coord.pos as usize];
        let z_base = xfmr.u2 * xfmr.u2 / xfmr.sn;
        let z_pu = Complex64::new(xfmr.pk * z_base / xfmr.sn, xfmr.uk * z_base);
        if z_pu.norm() < 1e-12 {
            return Err(GatError::SparseMatrixError(format!(
                "transformer {} has zero impedance",
                xfmr.id
            )));
        }
        stamp_series(from, to, z_pu.inv(), Complex64::new(0.0, 0.0), 1.0, xfmr.phase_shift().value());
    }

    for component in store.iter(ComponentKind::Shunt) {
        let Component::Shunt(shunt) = component else { continue };
        if !shunt.status {
            continue;
        }
        let Some(coord) = comp_topo.coupling.get(&shunt.id) else { continue };
        if coord.is_none() || coord.group != island_idx {
            continue;
        }
        let Some(&node_bus_pos) = comp_topo.node_positions.get(&shunt.node) else {
            continue;
        };
        triplet.add_triplet(node_bus_pos as usize, node_bus_pos as usize, Complex64::new(shunt.g1, shunt.b1));
    }

    // A constant-impedance load behaves like a shunt whose admittance is
    // derived from its specified power at rated voltage (Y = conj(S) /
    // u_rated^2) and is folded directly into the bus diagonal the same way
    // `Shunt`'s own g1/b1 is stamped above, rather than injected as current
    // in `PowerFlowIslandInput::s_bus` (see `gat-model::input`).
    for component in store.iter(ComponentKind::SymLoad) {
        let Component::SymLoad(load) = component else { continue };
        if !load.status || load.load_gen_type != LoadGenType::ConstImpedance {
            continue;
        }
        let Some(coord) = comp_topo.coupling.get(&load.id) else { continue };
        if coord.is_none() || coord.group != island_idx {
            continue;
        }
        let Some(&node_bus_pos) = comp_topo.node_positions.get(&load.node) else {
            continue;
        };
        let Some(&u_rated) = node_u_rated.get(&load.node) else {
            continue;
        };
        let y = Complex64::new(load.p_specified, -load.q_specified) / (u_rated * u_rated);
        triplet.add_triplet(node_bus_pos as usize, node_bus_pos as usize, y);
    }

    for component in store.iter(ComponentKind::AsymLoad) {
        let Component::AsymLoad(load) = component else { continue };
        if !load.status || load.load_gen_type != LoadGenType::ConstImpedance {
            continue;
        }
        let Some(coord) = comp_topo.coupling.get(&load.id) else { continue };
        if coord.is_none() || coord.group != island_idx {
            continue;
        }
        let Some(&node_bus_pos) = comp_topo.node_positions.get(&load.node) else {
            continue;
        };
        let Some(&u_rated) = node_u_rated.get(&load.node) else {
            continue;
        };
        let p: f64 = load.p_specified.iter().sum();
        let q: f64 = load.q_specified.iter().sum();
        let y = Complex64::new(p, -q) / (u_rated * u_rated);
        triplet.add_triplet(node_bus_pos as usize, node_bus_pos as usize, y);
    }

    for component in store.iter(ComponentKind::ThreeWindingTransformer) {
        let Component::ThreeWindingTransformer(t3) = component else { continue };
        let Some(coords) = comp_topo.branch3_coupling.get(&t3.id) else { continue };

        // Pairwise short-circuit impedances, all referred to winding 1's own
        // rated voltage/power rather than the per-pair rating convention a
        // real nameplate uses — a simplification consistent with this
        // engine's flat per-unit system (the two-winding `Transformer` stamp
        // above likewise treats `u2^2/sn` as directly usable impedance).
        let z_base = t3.u1 * t3.u1 / t3.sn_1;
        let z_pair = |uk: f64, pk: f64| Complex64::new(pk * z_base / t3.sn_1, uk * z_base);
        let z12 = z_pair(t3.uk_12, t3.pk_12);
        let z13 = z_pair(t3.uk_13, t3.pk_13);
        let z23 = z_pair(t3.uk_23, t3.pk_23);

        // Star-equivalent: the three pairwise legs resolve to one series
        // impedance per winding, referenced to the eliminated star point.
        let z = [0.5 * (z12 + z13 - z23), 0.5 * (z12 + z23 - z13), 0.5 * (z13 + z23 - z12)];

        for (k, coord) in coords.iter().enumerate() {
            if coord.is_none() || coord.group != island_idx {
                continue;
            }
            if z[k].norm() < 1e-12 {
                return Err(GatError::SparseMatrixError(format!(
                    "three-winding transformer {} winding {} has zero impedance",
                    t3.id,
                    k + 1
                )));
            }
            let (from, to) = island.branches[coord.pos as usize];
            // The star point is not itself a math bus (see
            // `topology::TopologyBuilder::couple_branches`), so each winding
            // stamps as an independent one-sided branch (`to == -1`) rather
            // than a true three-way mutual coupling between windings.
            stamp_series(from, to, z[k].inv(), Complex64::new(0.0, 0.0), 1.0, 0.0);
        }
    }

    Ok(YBusParams {
        n_bus,
        y: triplet.to_csr(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Line, Link, Node, Source};
    use crate::topology::TopologyBuilder;

    fn three_node_store() -> ComponentStore {
        let mut store = ComponentStore::new();
        store.emplace(Component::Node(Node { id: 1, u_rated: 10_000.0 })).unwrap();
        store.emplace(Component::Node(Node { id: 2, u_rated: 10_000.0 })).unwrap();
        store.emplace(Component::Node(Node { id: 3, u_rated: 10_000.0 })).unwrap();
        store
            .emplace(Component::Line(Line {
                id: 4,
                from_node: 1,
                to_node: 2,
                from_status: true,
                to_status: true,
                r1: 10.0,
                x1: 0.0,
                c1: 0.0,
                tan1: 0.0,
                r0: None,
                x0: None,
                c0: None,
                tan0: None,
                i_n: None,
            }))
            .unwrap();
        store
            .emplace(Component::Link(Link {
                id: 5,
                from_node: 2,
                to_node: 3,
                from_status: true,
                to_status: true,
            }))
            .unwrap();
        store
            .emplace(Component::Source(Source {
                id: 6,
                node: 1,
                status: true,
                u_ref: 1.05,
                u_ref_angle: 0.0,
                sk: None,
                rx_ratio: None,
                z01_ratio: None,
            }))
            .unwrap();
        store.set_construction_complete();
        store
    }

    #[test]
    fn prepare_builds_one_ybus_per_island() {
        let store = three_node_store();
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        let mut state = MathState::new();
        state.prepare(Symmetry::Symmetric, &store, &comp_topo, &islands).unwrap();
        assert_eq!(state.symmetric.y_bus.len(), 1);
        assert!(state.y_bus_of(Symmetry::Symmetric, 0).is_some());
    }

    #[test]
    fn topology_invalidation_clears_both_symmetries() {
        let store = three_node_store();
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        let mut state = MathState::new();
        state.prepare(Symmetry::Symmetric, &store, &comp_topo, &islands).unwrap();
        state.invalidate_topology();
        assert!(state.symmetric.y_bus.is_empty());
        assert!(!state.topology_valid);
    }

    fn three_winding_store() -> ComponentStore {
        three_winding_store_with_status(true)
    }

    fn three_winding_store_with_status(status_3: bool) -> ComponentStore {
        use crate::component::{ThreeWindingTransformer, TransformerTapSide, WindingConnection};

        let mut store = ComponentStore::new();
        store.emplace(Component::Node(Node { id: 1, u_rated: 110_000.0 })).unwrap();
        store.emplace(Component::Node(Node { id: 2, u_rated: 20_000.0 })).unwrap();
        store.emplace(Component::Node(Node { id: 3, u_rated: 10_000.0 })).unwrap();
        store
            .emplace(Component::Source(Source {
                id: 4,
                node: 1,
                status: true,
                u_ref: 1.0,
                u_ref_angle: 0.0,
                sk: None,
                rx_ratio: None,
                z01_ratio: None,
            }))
            .unwrap();
        store
            .emplace(Component::ThreeWindingTransformer(ThreeWindingTransformer {
                id: 5,
                node_1: 1,
                node_2: 2,
                node_3: 3,
                status_1: true,
                status_2: true,
                status_3,
                u1: 110_000.0,
                u2: 20_000.0,
                u3: 10_000.0,
                sn_1: 1.0e7,
                sn_2: 1.0e7,
                sn_3: 5.0e6,
                uk_12: 0.1,
                uk_13: 0.11,
                uk_23: 0.09,
                pk_12: 5.0e4,
                pk_13: 5.5e4,
                pk_23: 4.5e4,
                i0: 0.0,
                p0: 0.0,
                winding_1: WindingConnection::WyeGrounded,
                winding_2: WindingConnection::WyeGrounded,
                winding_3: WindingConnection::WyeGrounded,
                clock_12: 0,
                clock_13: 0,
                tap_side: TransformerTapSide::FromSide,
                tap_pos: 0,
                tap_min: -5,
                tap_max: 5,
                tap_nom: 0,
                tap_size: 0.01,
            }))
            .unwrap();
        store.set_construction_complete();
        store
    }

    fn diagonal(y: &CsMat<Complex64>, pos: usize) -> Complex64 {
        let mut total = Complex64::new(0.0, 0.0);
        for (val, (row, col)) in y.iter() {
            if row == pos && col == pos {
                total += *val;
            }
        }
        total
    }

    #[test]
    fn three_winding_transformer_stamps_every_terminal() {
        let store = three_winding_store();
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        assert_eq!(islands.len(), 1);
        let params = build_island_ybus(&store, &comp_topo, &islands[0], 0, Symmetry::Symmetric).unwrap();
        for pos in 0..3 {
            assert!(diagonal(&params.y, pos).norm() > 0.0, "terminal {pos} diagonal should be stamped");
        }
    }

    #[test]
    fn three_winding_transformer_with_open_winding_leaves_that_branch_unstamped() {
        let store = three_winding_store_with_status(false);
        let (islands, comp_topo) = TopologyBuilder::new(&store).build();
        let coords = comp_topo.branch3_coupling.get(&5).unwrap();
        let island0 = &islands[coords[0].group as usize];
        // The open terminal's branch stub has no bus at either end.
        assert_eq!(island0.branches[coords[2].pos as usize], (-1, -1));

        let params = build_island_ybus(&store, &comp_topo, island0, coords[0].group, Symmetry::Symmetric).unwrap();
        assert!(diagonal(&params.y, 0).norm() > 0.0);
        assert!(diagonal(&params.y, 1).norm() > 0.0);
    }
}
