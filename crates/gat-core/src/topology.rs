//! The topology builder: component-level connectivity → per-island math
//! graphs.
//!
//! Grounded on `topology.hpp`: `GlobalGraph`/`GlobalDFSVisitor` become a
//! `petgraph::graph::DiGraph` walked with an explicit DFS (kept explicit,
//! not `petgraph::visit::Dfs`, because the visitor needs to accumulate
//! phase shift and distinguish true back edges from anti-parallel
//! duplicates along the way — the same reason the original hand-rolls its
//! DFS instead of using a generic graph library's visitor). Island seeding,
//! back-edge-driven cyclic-node detection, and the 4-node minimum-degree
//! reorder threshold are implemented as in the original's `dfs_search` /
//! `reorder_node`.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};

use crate::component::{Component, ComponentKind};
use crate::ids::{Idx, Idx2D, ID};
use crate::store::ComponentStore;

/// Ragged per-group list of element indices, in either a dense
/// (label-per-element) or sparse (indptr) representation. Mirrors
/// `common/grouped_index_vector.hpp`.
#[derive(Debug, Clone)]
pub enum GroupedIndexVector {
    Dense { labels: Vec<Idx>, n_groups: usize },
    Sparse { indptr: Vec<Idx> },
}

impl GroupedIndexVector {
    pub fn dense(labels: Vec<Idx>, n_groups: usize) -> Self {
        GroupedIndexVector::Dense { labels, n_groups }
    }

    pub fn from_sorted_groups(mut group_of_element: Vec<(Idx, Idx)>, n_groups: usize) -> Self {
        group_of_element.sort_by_key(|(g, _)| *g);
        let labels = group_of_element.into_iter().map(|(g, _)| g).collect();
        GroupedIndexVector::Dense { labels, n_groups }
    }

    pub fn group_count(&self) -> usize {
        match self {
            GroupedIndexVector::Dense { n_groups, .. } => *n_groups,
            GroupedIndexVector::Sparse { indptr } => indptr.len().saturating_sub(1),
        }
    }

    /// Indices of elements belonging to `group`.
    pub fn elements_of(&self, group: Idx) -> Vec<Idx> {
        match self {
            GroupedIndexVector::Dense { labels, .. } => labels
                .iter()
                .enumerate()
                .filter(|(_, g)| **g == group)
                .map(|(i, _)| i as Idx)
                .collect(),
            GroupedIndexVector::Sparse { indptr } => {
                let start = indptr[group as usize];
                let end = indptr[group as usize + 1];
                (start..end).collect()
            }
        }
    }
}

/// Per-island mathematical graph: bus count, branch endpoint pairs, slack
/// bus, phase shifts, and the coupling of appliances/sensors into grouped
/// index vectors.
#[derive(Debug, Clone)]
pub struct MathTopology {
    pub n_node: usize,
    /// (from_pos, to_pos) per math branch, `-1` for a disconnected end.
    pub branches: Vec<(Idx, Idx)>,
    pub slack_bus: Idx,
    pub phase_shift: Vec<f64>,
    pub is_radial: bool,
    /// Fill-in edges recorded by the minimum-degree reorder (empty for
    /// radial islands).
    pub fill_in: Vec<(Idx, Idx)>,
    pub sources_per_bus: GroupedIndexVector,
    pub sym_loads_per_bus: GroupedIndexVector,
    pub asym_loads_per_bus: GroupedIndexVector,
    pub shunts_per_bus: GroupedIndexVector,
    /// Voltage sensors (`SymVoltageSensor`/`AsymVoltageSensor`), grouped by
    /// the bus position of the node they measure.
    pub voltage_sensors_per_bus: GroupedIndexVector,
}

/// Every component's coordinate onto the math model it was coupled into.
#[derive(Debug, Default, Clone)]
pub struct ComponentTopology {
    pub node_positions: HashMap<ID, Idx>,
    /// Which island a node belongs to; absent for a node with no closed
    /// path to any source.
    pub node_island: HashMap<ID, Idx>,
    pub coupling: HashMap<ID, Idx2D>,
    /// For three-terminal branches: one `Idx2D` per terminal.
    pub branch3_coupling: HashMap<ID, [Idx2D; 3]>,
}

struct DfsState {
    island: Idx,
    predecessor: HashMap<NodeIndex, NodeIndex>,
    phase_shift: HashMap<NodeIndex, f64>,
    order: Vec<NodeIndex>,
    back_edges: Vec<(NodeIndex, NodeIndex)>,
}

fn dfs_from(
    graph: &DiGraph<(), f64>,
    source: NodeIndex,
    island: Idx,
    assigned: &mut HashMap<NodeIndex, Idx>,
) -> DfsState {
    let mut state = DfsState {
        island,
        predecessor: HashMap::new(),
        phase_shift: HashMap::new(),
        order: Vec::new(),
        back_edges: Vec::new(),
    };
    state.phase_shift.insert(source, 0.0);
    assigned.insert(source, island);

    let mut stack = vec![source];
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    visited.insert(source);

    // Explicit iterative DFS (mirrors GlobalDFSVisitor's discover/tree/back
    // edge callbacks rather than relying on a generic visitor trait).
    while let Some(node) = stack.pop() {
        state.order.push(node);
        for edge in graph.edges(node) {
            let target = edge.target();
            let shift = *edge.weight();
            if !visited.contains(&target) {
                visited.insert(target);
                assigned.insert(target, island);
                state.predecessor.insert(target, node);
                let node_shift = state.phase_shift[&node];
                state.phase_shift.insert(target, node_shift + shift);
                stack.push(target);
            } else if state.predecessor.get(&node).copied() != Some(target) {
                // Anti-parallel duplicate edges (predecessor mismatch is
                // the genuine back-edge test from topology.hpp).
                if state.predecessor.get(&target) != Some(&node) {
                    state.back_edges.push((node, target));
                }
            }
        }
    }
    state
}

/// Mark every node lying on a cycle by walking predecessors from each
/// back-edge endpoint toward the source until a previously-marked node is
/// reached (`topology.hpp::reorder_node`'s cyclic-node discovery).
fn cyclic_nodes(state: &DfsState) -> HashSet<NodeIndex> {
    let mut marked = HashSet::new();
    for &(from, to) in &state.back_edges {
        for mut cur in [from, to] {
            while marked.insert(cur) {
                match state.predecessor.get(&cur) {
                    Some(&p) => cur = p,
                    None => break,
                }
            }
        }
    }
    marked
}

/// Approximate minimum-degree ordering over the cyclic subgraph. Sized for
/// the small islands this engine targets: repeatedly picks the
/// lowest-degree remaining node, mirroring the greedy min-degree heuristic
/// in `sparse_ordering.hpp` without its incremental elimination-graph
/// bookkeeping.
fn minimum_degree_order(nodes: &[NodeIndex], adjacency: &HashMap<NodeIndex, HashSet<NodeIndex>>) -> Vec<NodeIndex> {
    let mut remaining: HashSet<NodeIndex> = nodes.iter().copied().collect();
    let mut degree: HashMap<NodeIndex, usize> = nodes
        .iter()
        .map(|n| (*n, adjacency.get(n).map(|s| s.len()).unwrap_or(0)))
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while !remaining.is_empty() {
        let next = *remaining
            .iter()
            .min_by_key(|n| (degree[n], n.index()))
            .expect("remaining is non-empty");
        remaining.remove(&next);
        order.push(next);
        if let Some(neighbors) = adjacency.get(&next) {
            for n in neighbors {
                if remaining.contains(n) {
                    if let Some(d) = degree.get_mut(n) {
                        *d = d.saturating_sub(1);
                    }
                }
            }
        }
    }
    order
}

/// Builds one `MathTopology` per island plus the component coupling, from
/// the store's current component graph.
pub struct TopologyBuilder<'a> {
    store: &'a ComponentStore,
}

impl<'a> TopologyBuilder<'a> {
    pub fn new(store: &'a ComponentStore) -> Self {
        Self { store }
    }

    pub fn build(&self) -> (Vec<MathTopology>, ComponentTopology) {
        let (graph, node_id_to_idx) = self.build_directed_graph();
        let idx_to_node_id: HashMap<NodeIndex, ID> =
            node_id_to_idx.iter().map(|(id, idx)| (*idx, *id)).collect();

        let mut assigned: HashMap<NodeIndex, Idx> = HashMap::new();
        let mut islands: Vec<MathTopology> = Vec::new();
        let mut comp_topo = ComponentTopology::default();

        for component in self.store.iter(ComponentKind::Source) {
            let Component::Source(source) = component else {
                continue;
            };
            if !source.status {
                comp_topo.coupling.insert(source.id, Idx2D::NONE);
                continue;
            }
            let Some(&node_idx) = node_id_to_idx.get(&source.node) else {
                comp_topo.coupling.insert(source.id, Idx2D::NONE);
                continue;
            };
            if assigned.contains_key(&node_idx) {
                // Node already claimed by an earlier source's island; this
                // source still couples into that island at the slack
                // position's node, but does not reseed a DFS.
                let island = assigned[&node_idx];
                comp_topo
                    .coupling
                    .insert(source.id, Idx2D::new(island, 0));
                continue;
            }

            let island_group = islands.len() as Idx;
            let state = dfs_from(&graph, node_idx, island_group, &mut assigned);
            let is_radial = state.back_edges.is_empty();

            let node_order: Vec<NodeIndex> = if is_radial {
                let mut order = state.order.clone();
                order.reverse();
                order
            } else {
                let cyclic = cyclic_nodes(&state);
                let mut non_cyclic: Vec<NodeIndex> =
                    state.order.iter().rev().filter(|n| !cyclic.contains(n)).copied().collect();
                let mut cyclic_nodes_vec: Vec<NodeIndex> = state.order.iter().filter(|n| cyclic.contains(n)).copied().collect();
                if cyclic_nodes_vec.len() >= 4 {
                    let mut adjacency: HashMap<NodeIndex, HashSet<NodeIndex>> = HashMap::new();
                    for &n in &cyclic_nodes_vec {
                        if let Some(&p) = state.predecessor.get(&n) {
                            if cyclic.contains(&p) {
                                adjacency.entry(n).or_default().insert(p);
                                adjacency.entry(p).or_default().insert(n);
                            }
                        }
                    }
                    for &(a, b) in &state.back_edges {
                        adjacency.entry(a).or_default().insert(b);
                        adjacency.entry(b).or_default().insert(a);
                    }
                    cyclic_nodes_vec = minimum_degree_order(&cyclic_nodes_vec, &adjacency);
                }
                non_cyclic.append(&mut cyclic_nodes_vec);
                non_cyclic
            };

            let mut pos_of: HashMap<NodeIndex, Idx> = HashMap::new();
            for (pos, &n) in node_order.iter().enumerate() {
                pos_of.insert(n, pos as Idx);
                if let Some(&id) = idx_to_node_id.get(&n) {
                    comp_topo.node_positions.insert(id, pos as Idx);
                    comp_topo.node_island.insert(id, island_group);
                }
            }

            let slack_bus = pos_of[&node_idx];
            let mut phase_shift = vec![0.0; node_order.len()];
            for (&n, &pos) in &pos_of {
                phase_shift[pos as usize] = *state.phase_shift.get(&n).unwrap_or(&0.0);
            }

            let fill_in = if is_radial {
                Vec::new()
            } else {
                state
                    .back_edges
                    .iter()
                    .map(|&(a, b)| {
                        (
                            *pos_of.get(&a).unwrap_or(&0),
                            *pos_of.get(&b).unwrap_or(&0),
                        )
                    })
                    .collect()
            };

            comp_topo
                .coupling
                .insert(source.id, Idx2D::new(island_group, slack_bus));

            islands.push(MathTopology {
                n_node: node_order.len(),
                branches: Vec::new(),
                slack_bus,
                phase_shift,
                is_radial,
                fill_in,
                sources_per_bus: GroupedIndexVector::dense(vec![], 0),
                sym_loads_per_bus: GroupedIndexVector::dense(vec![], 0),
                asym_loads_per_bus: GroupedIndexVector::dense(vec![], 0),
                shunts_per_bus: GroupedIndexVector::dense(vec![], 0),
                voltage_sensors_per_bus: GroupedIndexVector::dense(vec![], 0),
            });
        }

        self.couple_branches(&node_id_to_idx, &assigned, &mut islands, &mut comp_topo);
        self.couple_appliances(&assigned, &node_id_to_idx, &mut islands, &mut comp_topo);
        self.couple_sensors(&assigned, &node_id_to_idx, &mut islands, &mut comp_topo);

        (islands, comp_topo)
    }

    fn build_directed_graph(&self) -> (DiGraph<(), f64>, HashMap<ID, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut node_id_to_idx = HashMap::new();

        for component in self.store.iter(ComponentKind::Node) {
            let Component::Node(node) = component else {
                continue;
            };
            node_id_to_idx.insert(node.id, graph.add_node(()));
        }

        let mut get_or_internal = |graph: &mut DiGraph<(), f64>, id: ID, map: &mut HashMap<ID, NodeIndex>| -> NodeIndex {
            *map.entry(id).or_insert_with(|| graph.add_node(()))
        };

        for component in self.store.iter(ComponentKind::Line) {
            let Component::Line(line) = component else { continue };
            if !line.is_closed() {
                continue;
            }
            if let (Some(&from), Some(&to)) =
                (node_id_to_idx.get(&line.from_node), node_id_to_idx.get(&line.to_node))
            {
                graph.add_edge(from, to, 0.0);
                graph.add_edge(to, from, 0.0);
            }
        }

        for component in self.store.iter(ComponentKind::Link) {
            let Component::Link(link) = component else { continue };
            if !link.is_closed() {
                continue;
            }
            if let (Some(&from), Some(&to)) =
                (node_id_to_idx.get(&link.from_node), node_id_to_idx.get(&link.to_node))
            {
                graph.add_edge(from, to, 0.0);
                graph.add_edge(to, from, 0.0);
            }
        }

        for component in self.store.iter(ComponentKind::Transformer) {
            let Component::Transformer(xfmr) = component else { continue };
            if !xfmr.is_closed() {
                continue;
            }
            if let (Some(&from), Some(&to)) =
                (node_id_to_idx.get(&xfmr.from_node), node_id_to_idx.get(&xfmr.to_node))
            {
                let shift = xfmr.phase_shift().value();
                graph.add_edge(from, to, shift);
                graph.add_edge(to, from, -shift);
            }
        }

        // Three-winding transformers allocate a synthetic internal node
        // `n_node + k` and couple three pairs of directed edges into it
        // (topology.hpp's three-way coupling).
        let base_n_node = node_id_to_idx.len() as ID;
        for (k, component) in self.store.iter(ComponentKind::ThreeWindingTransformer).enumerate() {
            let Component::ThreeWindingTransformer(t3) = component else { continue };
            let internal_id = base_n_node + k as ID;
            let internal = get_or_internal(&mut graph, internal_id, &mut node_id_to_idx);
            for (node_id, status) in [
                (t3.node_1, t3.status_1),
                (t3.node_2, t3.status_2),
                (t3.node_3, t3.status_3),
            ] {
                if !status {
                    continue;
                }
                if let Some(&n) = node_id_to_idx.get(&node_id) {
                    graph.add_edge(n, internal, 0.0);
                    graph.add_edge(internal, n, 0.0);
                }
            }
        }

        (graph, node_id_to_idx)
    }

    fn couple_branches(
        &self,
        node_id_to_idx: &HashMap<ID, NodeIndex>,
        assigned: &HashMap<NodeIndex, Idx>,
        islands: &mut [MathTopology],
        comp_topo: &mut ComponentTopology,
    ) {
        // Position lookup by (island, node_id) reconstructed from
        // comp_topo.node_positions populated during DFS.
        let node_pos = |node_id: ID| -> Option<(Idx, Idx)> {
            let idx = *node_id_to_idx.get(&node_id)?;
            let island = *assigned.get(&idx)?;
            let pos = *comp_topo.node_positions.get(&node_id)?;
            Some((island, pos))
        };

        let mut couple_two_terminal = |id: ID, from_node: ID, to_node: ID, from_closed: bool, to_closed: bool| {
            let from = if from_closed { node_pos(from_node) } else { None };
            let to = if to_closed { node_pos(to_node) } else { None };
            let island = from.map(|(g, _)| g).or(to.map(|(g, _)| g));
            let Some(island) = island else {
                comp_topo.coupling.insert(id, Idx2D::NONE);
                return;
            };
            let from_pos = from.map(|(_, p)| p).unwrap_or(-1);
            let to_pos = to.map(|(_, p)| p).unwrap_or(-1);
            let branch_list = &mut islands[island as usize].branches;
            let pos = branch_list.len() as Idx;
            branch_list.push((from_pos, to_pos));
            comp_topo.coupling.insert(id, Idx2D::new(island, pos));
        };

        for component in self.store.iter(ComponentKind::Line) {
            let Component::Line(line) = component else { continue };
            couple_two_terminal(line.id, line.from_node, line.to_node, line.from_status, line.to_status);
        }
        for component in self.store.iter(ComponentKind::Link) {
            let Component::Link(link) = component else { continue };
            couple_two_terminal(link.id, link.from_node, link.to_node, link.from_status, link.to_status);
        }
        for component in self.store.iter(ComponentKind::Transformer) {
            let Component::Transformer(xfmr) = component else { continue };
            couple_two_terminal(xfmr.id, xfmr.from_node, xfmr.to_node, xfmr.from_status, xfmr.to_status);
        }

        for component in self.store.iter(ComponentKind::ThreeWindingTransformer) {
            let Component::ThreeWindingTransformer(t3) = component else { continue };
            let terminals = [
                (t3.node_1, t3.status_1),
                (t3.node_2, t3.status_2),
                (t3.node_3, t3.status_3),
            ];
            let mut island = None;
            for (node_id, closed) in terminals {
                if closed {
                    if let Some((g, _)) = node_pos(node_id) {
                        island = Some(g);
                        break;
                    }
                }
            }
            let Some(island) = island else {
                comp_topo.branch3_coupling.insert(t3.id, [Idx2D::NONE; 3]);
                continue;
            };
            let mut coords = [Idx2D::NONE; 3];
            for (k, (node_id, closed)) in terminals.into_iter().enumerate() {
                let pos_opt = if closed { node_pos(node_id) } else { None };
                let from_pos = pos_opt.map(|(_, p)| p).unwrap_or(-1);
                let branch_list = &mut islands[island as usize].branches;
                let pos = branch_list.len() as Idx;
                branch_list.push((from_pos, -1));
                coords[k] = Idx2D::new(island, pos);
            }
            comp_topo.branch3_coupling.insert(t3.id, coords);
        }
    }

    fn couple_appliances(
        &self,
        assigned: &HashMap<NodeIndex, Idx>,
        node_id_to_idx: &HashMap<ID, NodeIndex>,
        islands: &mut [MathTopology],
        comp_topo: &mut ComponentTopology,
    ) {
        let node_pos = |node_id: ID| -> Option<(Idx, Idx)> {
            let idx = *node_id_to_idx.get(&node_id)?;
            let island = *assigned.get(&idx)?;
            let pos = *comp_topo.node_positions.get(&node_id)?;
            Some((island, pos))
        };

        let mut per_island_groups: Vec<(Vec<(Idx, Idx)>, Vec<(Idx, Idx)>, Vec<(Idx, Idx)>, Vec<(Idx, Idx)>)> =
            vec![(Vec::new(), Vec::new(), Vec::new(), Vec::new()); islands.len()];

        for component in self.store.iter(ComponentKind::SymLoad) {
            let Component::SymLoad(load) = component else { continue };
            match node_pos(load.node) {
                Some((island, bus_pos)) => {
                    let list = &mut per_island_groups[island as usize].1;
                    let slot = list.len() as Idx;
                    list.push((bus_pos, slot));
                    comp_topo.coupling.insert(load.id, Idx2D::new(island, slot));
                }
                None => {
                    comp_topo.coupling.insert(load.id, Idx2D::NONE);
                }
            }
        }

        for component in self.store.iter(ComponentKind::AsymLoad) {
            let Component::AsymLoad(load) = component else { continue };
            match node_pos(load.node) {
                Some((island, bus_pos)) => {
                    let list = &mut per_island_groups[island as usize].2;
                    let slot = list.len() as Idx;
                    list.push((bus_pos, slot));
                    comp_topo.coupling.insert(load.id, Idx2D::new(island, slot));
                }
                None => {
                    comp_topo.coupling.insert(load.id, Idx2D::NONE);
                }
            }
        }

        for component in self.store.iter(ComponentKind::Shunt) {
            let Component::Shunt(shunt) = component else { continue };
            match node_pos(shunt.node) {
                Some((island, bus_pos)) => {
                    let list = &mut per_island_groups[island as usize].3;
                    let slot = list.len() as Idx;
                    list.push((bus_pos, slot));
                    comp_topo.coupling.insert(shunt.id, Idx2D::new(island, slot));
                }
                None => {
                    comp_topo.coupling.insert(shunt.id, Idx2D::NONE);
                }
            }
        }

        for component in self.store.iter(ComponentKind::Source) {
            let Component::Source(source) = component else { continue };
            if let Some((island, bus_pos)) = node_pos(source.node) {
                let list = &mut per_island_groups[island as usize].0;
                let slot = list.len() as Idx;
                list.push((bus_pos, slot));
            }
        }

        for (island, (sources, sym_loads, asym_loads, shunts)) in per_island_groups.into_iter().enumerate() {
            let n_bus = islands[island].n_node;
            islands[island].sources_per_bus = GroupedIndexVector::from_sorted_groups(sources, n_bus);
            islands[island].sym_loads_per_bus = GroupedIndexVector::from_sorted_groups(sym_loads, n_bus);
            islands[island].asym_loads_per_bus = GroupedIndexVector::from_sorted_groups(asym_loads, n_bus);
            islands[island].shunts_per_bus = GroupedIndexVector::from_sorted_groups(shunts, n_bus);
        }
    }

    /// Couple every sensor kind into the math model (spec step 7's "couple
    /// appliances and sensors"). Voltage sensors always measure a node and
    /// group into `voltage_sensors_per_bus` the same way an appliance groups
    /// into its own per-bus vector. Power/current sensors measure whatever
    /// `measured_terminal_type` names — a node, a branch end, a branch3 leg,
    /// or an appliance — so they are coupled onto that object's own already-
    /// resolved `Idx2D` (recorded earlier by `couple_branches`/
    /// `couple_appliances`) rather than into a bus group of their own.
    fn couple_sensors(
        &self,
        assigned: &HashMap<NodeIndex, Idx>,
        node_id_to_idx: &HashMap<ID, NodeIndex>,
        islands: &mut [MathTopology],
        comp_topo: &mut ComponentTopology,
    ) {
        use crate::component::MeasuredTerminalType;

        let node_pos = |node_id: ID| -> Option<(Idx, Idx)> {
            let idx = *node_id_to_idx.get(&node_id)?;
            let island = *assigned.get(&idx)?;
            let pos = *comp_topo.node_positions.get(&node_id)?;
            Some((island, pos))
        };

        let mut voltage_groups: Vec<Vec<(Idx, Idx)>> = vec![Vec::new(); islands.len()];

        let mut couple_voltage = |id: ID, measured_object: ID, voltage_groups: &mut Vec<Vec<(Idx, Idx)>>, comp_topo: &mut ComponentTopology| {
            match node_pos(measured_object) {
                Some((island, bus_pos)) => {
                    let list = &mut voltage_groups[island as usize];
                    let slot = list.len() as Idx;
                    list.push((bus_pos, slot));
                    comp_topo.coupling.insert(id, Idx2D::new(island, slot));
                }
                None => {
                    comp_topo.coupling.insert(id, Idx2D::NONE);
                }
            }
        };

        for component in self.store.iter(ComponentKind::SymVoltageSensor) {
            let Component::SymVoltageSensor(sensor) = component else { continue };
            couple_voltage(sensor.id, sensor.measured_object, &mut voltage_groups, comp_topo);
        }
        for component in self.store.iter(ComponentKind::AsymVoltageSensor) {
            let Component::AsymVoltageSensor(sensor) = component else { continue };
            couple_voltage(sensor.id, sensor.measured_object, &mut voltage_groups, comp_topo);
        }

        for (island, group) in voltage_groups.into_iter().enumerate() {
            let n_bus = islands[island].n_node;
            islands[island].voltage_sensors_per_bus = GroupedIndexVector::from_sorted_groups(group, n_bus);
        }

        // Power/current sensors couple onto whichever object they measure;
        // that object was coupled earlier in `build`, so its `Idx2D` is
        // already resolvable by ID.
        let mut couple_terminal = |id: ID,
                                    measured_object: ID,
                                    terminal: MeasuredTerminalType,
                                    comp_topo: &mut ComponentTopology| {
            let coord = match terminal {
                MeasuredTerminalType::Node => node_pos(measured_object)
                    .map(|(island, pos)| Idx2D::new(island, pos))
                    .unwrap_or(Idx2D::NONE),
                MeasuredTerminalType::Source
                | MeasuredTerminalType::Shunt
                | MeasuredTerminalType::Load
                | MeasuredTerminalType::Generator
                | MeasuredTerminalType::BranchFrom
                | MeasuredTerminalType::BranchTo => {
                    comp_topo.coupling.get(&measured_object).copied().unwrap_or(Idx2D::NONE)
                }
                MeasuredTerminalType::Branch3_1 => comp_topo
                    .branch3_coupling
                    .get(&measured_object)
                    .map(|c| c[0])
                    .unwrap_or(Idx2D::NONE),
                MeasuredTerminalType::Branch3_2 => comp_topo
                    .branch3_coupling
                    .get(&measured_object)
                    .map(|c| c[1])
                    .unwrap_or(Idx2D::NONE),
                MeasuredTerminalType::Branch3_3 => comp_topo
                    .branch3_coupling
                    .get(&measured_object)
                    .map(|c| c[2])
                    .unwrap_or(Idx2D::NONE),
            };
            comp_topo.coupling.insert(id, coord);
        };

        for component in self.store.iter(ComponentKind::SymPowerSensor) {
            let Component::SymPowerSensor(sensor) = component else { continue };
            couple_terminal(sensor.id, sensor.measured_object, sensor.measured_terminal_type, comp_topo);
        }
        for component in self.store.iter(ComponentKind::AsymPowerSensor) {
            let Component::AsymPowerSensor(sensor) = component else { continue };
            couple_terminal(sensor.id, sensor.measured_object, sensor.measured_terminal_type, comp_topo);
        }
        for component in self.store.iter(ComponentKind::CurrentSensor) {
            let Component::CurrentSensor(sensor) = component else { continue };
            couple_terminal(sensor.id, sensor.measured_object, sensor.measured_terminal_type, comp_topo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, Line, LoadGenType, Node, Source, SymLoad};

    fn three_node_radial_store() -> ComponentStore {
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
            .emplace(Component::Link(crate::component::Link {
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
        store
            .emplace(Component::SymLoad(SymLoad {
                id: 7,
                node: 3,
                status: true,
                load_gen_type: LoadGenType::ConstImpedance,
                p_specified: 0.5e6,
                q_specified: 0.0,
            }))
            .unwrap();
        store.set_construction_complete();
        store
    }

    #[test]
    fn radial_network_forms_one_island_with_three_buses() {
        let store = three_node_radial_store();
        let builder = TopologyBuilder::new(&store);
        let (islands, comp_topo) = builder.build();
        assert_eq!(islands.len(), 1);
        assert_eq!(islands[0].n_node, 3);
        assert!(islands[0].is_radial);
        assert_eq!(islands[0].branches.len(), 2);
        assert!(comp_topo.coupling.contains_key(&7));
    }

    #[test]
    fn voltage_sensor_couples_to_its_measured_node() {
        let mut store = three_node_radial_store();
        store
            .emplace(Component::SymVoltageSensor(crate::component::SymVoltageSensor {
                id: 20,
                measured_object: 3,
                u_sigma: 1.0,
                u_measured: 10_000.0,
                u_angle_measured: None,
            }))
            .unwrap();
        store.set_construction_complete();
        let builder = TopologyBuilder::new(&store);
        let (islands, comp_topo) = builder.build();
        let coord = comp_topo.coupling.get(&20).copied().unwrap();
        assert!(!coord.is_none());
        assert_eq!(islands[0].voltage_sensors_per_bus.group_count(), islands[0].n_node);
    }

    #[test]
    fn power_sensor_couples_onto_its_measured_load() {
        let mut store = three_node_radial_store();
        store
            .emplace(Component::SymPowerSensor(crate::component::SymPowerSensor {
                id: 21,
                measured_object: 7,
                measured_terminal_type: crate::component::MeasuredTerminalType::Load,
                power_sigma: 1.0,
                p_measured: 100.0,
                q_measured: 10.0,
            }))
            .unwrap();
        store.set_construction_complete();
        let builder = TopologyBuilder::new(&store);
        let (_islands, comp_topo) = builder.build();
        assert_eq!(comp_topo.coupling.get(&21), comp_topo.coupling.get(&7));
    }

    #[test]
    fn isolated_load_is_coupled_to_none() {
        let mut store = three_node_radial_store();
        let _ = store;
        // Construct a fresh store with a load on an island-less node.
        let mut store2 = ComponentStore::new();
        store2.emplace(Component::Node(Node { id: 1, u_rated: 10_000.0 })).unwrap();
        store2
            .emplace(Component::SymLoad(SymLoad {
                id: 2,
                node: 1,
                status: true,
                load_gen_type: LoadGenType::ConstImpedance,
                p_specified: 1.0,
                q_specified: 0.0,
            }))
            .unwrap();
        store2.set_construction_complete();
        let builder = TopologyBuilder::new(&store2);
        let (_islands, comp_topo) = builder.build();
        assert_eq!(comp_topo.coupling.get(&2), Some(&Idx2D::NONE));
    }
}
