//! The Batch Dispatcher: runs `calculate` once per scenario named by an
//! update dataset, striping scenarios across a fixed pool of worker
//! threads that each own a forked `Model`.
//!
//! Grounded on `main_core/batch_calculation_runner.hpp`'s cache-warm-up +
//! thread pool + per-thread apply/calculate/restore loop, adapted to
//! `std::thread` (the runner never suspends mid-scenario, so there is
//! nothing for an async runtime to interleave) and to `gat-model`'s
//! `ScenarioRows` so a thread's results slot back into global scenario
//! order without sharing a `Dataset` writer across threads.

use std::sync::Arc;
use std::thread;

use std::collections::HashMap;

use gat_core::component::ComponentKind;
use gat_core::error::GatError;
use gat_io::dataset::Dataset;
use gat_model::{ensure_supported, write_scenario_rows, BatchParameter, CalculationInfo, CalculationOptions, Model, ScenarioRows};
use gat_scenarios::{is_update_independent, SequenceCache};

/// Resolve `threading` (spec's `-1` sequential / `0` hardware / `>=1`
/// explicit convention) to an actual worker count, capped at one thread
/// per scenario — spinning up more threads than scenarios buys nothing.
fn thread_count(threading: i64, n_scenarios: usize) -> usize {
    let requested = if threading < 0 {
        1
    } else if threading == 0 {
        num_cpus::get()
    } else {
        threading as usize
    };
    requested.clamp(1, n_scenarios.max(1))
}

/// Strided partition of `[0, n)` into `n_threads` subranges: thread `t`
/// gets `t, t + n_threads, t + 2*n_threads, ...`. Striding (rather than
/// contiguous chunks) keeps threads roughly balanced when a dataset's
/// early scenarios are cheaper to apply than its later ones.
fn strided_partition(n: usize, n_threads: usize) -> Vec<Vec<usize>> {
    let mut parts = vec![Vec::new(); n_threads];
    for i in 0..n {
        parts[i % n_threads].push(i);
    }
    parts
}

/// Prime a forked model's math-state cache with one calculate against its
/// unmodified base state, before any scenario is applied. A base state
/// that is not solvable on its own (an islanded bus with no closed source
/// path, or a not-yet-observable island) is expected here and is not a
/// dispatch failure — only per-scenario errors are.
fn warm_up(model: &mut Model) -> Result<(), GatError> {
    match model.calculate_scenario(None) {
        Ok(_) => Ok(()),
        Err(GatError::SparseMatrixError(_)) | Err(GatError::NotObservableError(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

struct WorkerOutcome {
    rows: Vec<(usize, ScenarioRows)>,
    info: CalculationInfo,
    failures: Vec<(usize, String)>,
}

fn run_worker(
    mut model: Model,
    update_data: Arc<Dataset>,
    caches: Arc<HashMap<ComponentKind, SequenceCache>>,
    scenarios: Vec<usize>,
) -> WorkerOutcome {
    let mut rows = Vec::with_capacity(scenarios.len());
    let mut failures = Vec::new();
    for scenario in scenarios {
        match model.calculate_scenario_cached(Some((update_data.as_ref(), scenario)), Some(caches.as_ref())) {
            Ok(scenario_rows) => rows.push((scenario, scenario_rows)),
            Err(e) => {
                failures.push((scenario, e.to_string()));
                // The apply/restore pair in `calculate_scenario` already
                // unwound the store on the success path; a mid-calculate
                // failure can leave it mutated, so a fresh fork is the only
                // way back to a known-good state for the next scenario.
                model = model.fork();
            }
        }
    }
    WorkerOutcome { rows, info: model.calculation_info_snapshot(), failures }
}

/// Run `calculate` for every scenario named by `update_data`, against
/// copies of `base_model` split across a worker pool sized by
/// `options.threading`, merging projected rows into `target_data` in
/// scenario order and per-thread counters via `CalculationInfo::merge`.
pub fn dispatch(
    base_model: &Model,
    update_data: &Dataset,
    target_data: &mut Dataset,
    options: &CalculationOptions,
) -> Result<BatchParameter, GatError> {
    ensure_supported(options)?;

    if update_data.components().next().is_none() {
        // No component buffer at all: there is nothing to stripe across
        // scenarios, so run one calculate straight into scenario 0 against
        // the base model's own state.
        let mut model = base_model.fork();
        let scenario_rows = model.calculate_scenario(None)?;
        write_scenario_rows(target_data, 1, std::slice::from_ref(&scenario_rows))?;
        return Ok(BatchParameter { n_scenarios: 1 });
    }

    let n_scenarios = update_data.batch_size().max(1);
    if update_data.batch_size() == 0 {
        return Ok(BatchParameter { n_scenarios: 0 });
    }

    let mut warm = base_model.fork();
    warm_up(&mut warm)?;

    let independent_kinds = ComponentKind::ALL.iter().filter(|&&k| is_update_independent(update_data, k)).count() as f64;
    let caches = Arc::new(warm.build_update_caches(update_data)?);

    let n_threads = thread_count(options.threading, n_scenarios);
    let partitions = strided_partition(n_scenarios, n_threads);
    let update_data = Arc::new(update_data.clone());

    let handles: Vec<_> = partitions
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|scenarios| {
            let model = warm.fork();
            let update_data = Arc::clone(&update_data);
            let caches = Arc::clone(&caches);
            thread::spawn(move || run_worker(model, update_data, caches, scenarios))
        })
        .collect();

    let mut ordered = vec![None; n_scenarios];
    let mut info = CalculationInfo::default();
    let mut failures = Vec::new();
    for handle in handles {
        let outcome = handle.join().map_err(|_| GatError::Other("batch worker thread panicked".into()))?;
        for (scenario, rows) in outcome.rows {
            ordered[scenario] = Some(rows);
        }
        info.merge(&outcome.info);
        failures.extend(outcome.failures);
    }

    if !failures.is_empty() {
        return Err(GatError::BatchCalculationError(failures));
    }

    let rows: Vec<ScenarioRows> = ordered.into_iter().map(|r| r.expect("every scenario index was assigned to a partition")).collect();
    write_scenario_rows(target_data, n_scenarios, &rows)?;

    info.record("n_scenarios", n_scenarios as f64);
    info.record("independent_update_kinds", independent_kinds);
    Ok(BatchParameter { n_scenarios })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gat_core::component::ComponentKind;
    use gat_io::dataset::{AttrValue, ElementRecord};

    fn row(pairs: &[(&str, AttrValue)]) -> ElementRecord {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn dummy_network_dataset() -> Dataset {
        let mut ds = Dataset::new(false, 1);
        ds.add_buffer(
            ComponentKind::Node,
            2,
            2,
            None,
            vec![
                row(&[("id", AttrValue::Int32(1)), ("u_rated", AttrValue::Double(10_000.0))]),
                row(&[("id", AttrValue::Int32(2)), ("u_rated", AttrValue::Double(10_000.0))]),
            ],
        )
        .unwrap();
        ds.add_buffer(
            ComponentKind::Link,
            1,
            1,
            None,
            vec![row(&[
                ("id", AttrValue::Int32(3)),
                ("from_node", AttrValue::Int32(1)),
                ("to_node", AttrValue::Int32(2)),
                ("from_status", AttrValue::Int8(1)),
                ("to_status", AttrValue::Int8(1)),
            ])],
        )
        .unwrap();
        ds.add_buffer(
            ComponentKind::Source,
            1,
            1,
            None,
            vec![row(&[
                ("id", AttrValue::Int32(4)),
                ("node", AttrValue::Int32(1)),
                ("status", AttrValue::Int8(1)),
                ("u_ref", AttrValue::Double(1.05)),
            ])],
        )
        .unwrap();
        ds.add_buffer(
            ComponentKind::SymLoad,
            1,
            1,
            None,
            vec![row(&[
                ("id", AttrValue::Int32(5)),
                ("node", AttrValue::Int32(2)),
                ("status", AttrValue::Int8(1)),
                ("p_specified", AttrValue::Double(500_000.0)),
                ("q_specified", AttrValue::Double(0.0)),
            ])],
        )
        .unwrap();
        ds
    }

    fn batch_update_dataset(n_scenarios: usize) -> Dataset {
        let mut ds = Dataset::new(true, n_scenarios);
        let rows: Vec<ElementRecord> = (0..n_scenarios)
            .map(|i| row(&[("id", AttrValue::Int32(5)), ("p_specified", AttrValue::Double(400_000.0 + i as f64 * 1_000.0))]))
            .collect();
        ds.add_buffer(ComponentKind::SymLoad, 1, n_scenarios as i64, None, rows).unwrap();
        ds
    }

    #[test]
    fn dispatch_writes_one_result_row_per_scenario() {
        let input = dummy_network_dataset();
        let model = Model::new(50.0, &input).unwrap();
        let updates = batch_update_dataset(4);
        let mut target = Dataset::new(false, 4);
        let options = CalculationOptions { threading: 2, ..CalculationOptions::default() };

        let result = dispatch(&model, &updates, &mut target, &options).unwrap();
        assert_eq!(result.n_scenarios, 4);
        let span = target.get_span(ComponentKind::Node, 0).unwrap();
        assert_eq!(span.len(), 2);
        let span = target.get_span(ComponentKind::Node, 3).unwrap();
        assert_eq!(span.len(), 2);
    }

    #[test]
    fn zero_batch_size_runs_nothing() {
        let input = dummy_network_dataset();
        let model = Model::new(50.0, &input).unwrap();
        let mut updates = Dataset::new(true, 0);
        updates.add_buffer(ComponentKind::SymLoad, 0, 0, None, vec![]).unwrap();
        let mut target = Dataset::new(false, 1);
        let options = CalculationOptions::default();

        let result = dispatch(&model, &updates, &mut target, &options).unwrap();
        assert_eq!(result.n_scenarios, 0);
    }

    #[test]
    fn update_dataset_with_no_component_buffers_runs_one_scenario_zero() {
        let input = dummy_network_dataset();
        let model = Model::new(50.0, &input).unwrap();
        let updates = Dataset::new(true, 3);
        let mut target = Dataset::new(false, 1);
        let options = CalculationOptions::default();

        let result = dispatch(&model, &updates, &mut target, &options).unwrap();
        assert_eq!(result.n_scenarios, 1);
        let span = target.get_span(ComponentKind::Node, 0).unwrap();
        assert_eq!(span.len(), 2);
    }

    #[test]
    fn thread_count_clamps_to_scenario_count() {
        assert_eq!(thread_count(8, 3), 3);
        assert_eq!(thread_count(-1, 10), 1);
        assert_eq!(thread_count(2, 10), 2);
    }

    #[test]
    fn strided_partition_covers_every_index_once() {
        let parts = strided_partition(7, 3);
        let mut all: Vec<usize> = parts.into_iter().flatten().collect();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
