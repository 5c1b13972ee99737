//! Linear power-flow solve.
//!
//! Grounded on `gat-core`'s pluggable [`LinearSystemBackend`] registry: the
//! backend only solves real dense systems, so a complex n-bus admittance
//! system is expanded into a real 2n×2n block system
//! `[[Re(A), -Im(A)], [Im(A), Re(A)]]` before being handed to whichever
//! backend `SolverKind` resolves to. This is the one `calculation_method`
//! this engine implements end to end; every other method named by the
//! calculation options enum is rejected with `GatError::MissingCaseForEnum`
//! (see `DESIGN.md`).

use num_complex::Complex64;
use sprs::CsMat;

use gat_core::error::GatError;
use gat_core::mathstate::YBusParams;
use gat_core::solver::LinearSystemBackend;

use crate::input::PowerFlowIslandInput;

fn dense_from_sparse(y: &CsMat<Complex64>, n: usize) -> Vec<Vec<Complex64>> {
    let mut dense = vec![vec![Complex64::new(0.0, 0.0); n]; n];
    for (val, (row, col)) in y.iter() {
        dense[row][col] += *val;
    }
    dense
}

/// Solve a complex dense linear system `a * x = b` via a real backend by
/// expanding to a `2n`-dimensional real system and splitting the result
/// back into `n` complex values.
pub fn solve_complex_linear(
    backend: &dyn LinearSystemBackend,
    a: &[Vec<Complex64>],
    b: &[Complex64],
) -> Result<Vec<Complex64>, GatError> {
    let n = a.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if b.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(GatError::Solver("complex linear system is not square".into()));
    }

    let mut real = vec![vec![0.0_f64; 2 * n]; 2 * n];
    for i in 0..n {
        for j in 0..n {
            real[i][j] = a[i][j].re;
            real[i][j + n] = -a[i][j].im;
            real[i + n][j] = a[i][j].im;
            real[i + n][j + n] = a[i][j].re;
        }
    }
    let mut rhs = vec![0.0_f64; 2 * n];
    for i in 0..n {
        rhs[i] = b[i].re;
        rhs[i + n] = b[i].im;
    }

    let solution = backend
        .solve(&real, &rhs)
        .map_err(|e| GatError::Solver(e.to_string()))?;

    Ok((0..n).map(|i| Complex64::new(solution[i], solution[i + n])).collect())
}

/// Linearized one-shot power-flow solve for a single island: the slack bus
/// is held fixed at its source voltage, every other bus starts flat
/// (`1.0∠0`), current injections are computed once from specified power
/// (`I = conj(S / V)`), and the reduced system (slack row/column removed)
/// is solved for the remaining bus voltages.
pub fn solve_power_flow_island(
    y: &YBusParams,
    input: &PowerFlowIslandInput,
    backend: &dyn LinearSystemBackend,
) -> Result<Vec<Complex64>, GatError> {
    let n = input.n_bus;
    if n == 0 {
        return Ok(Vec::new());
    }
    let dense = dense_from_sparse(&y.y, n);

    let mut v = vec![Complex64::new(1.0, 0.0); n];
    v[input.slack_bus] = input.slack_voltage;

    let current = |s: Complex64, volt: Complex64| -> Complex64 {
        if volt.norm() < 1e-12 {
            Complex64::new(0.0, 0.0)
        } else {
            (s / volt).conj()
        }
    };

    let remaining: Vec<usize> = (0..n).filter(|&i| i != input.slack_bus).collect();
    let m = remaining.len();
    if m == 0 {
        return Ok(v);
    }

    let mut a = vec![vec![Complex64::new(0.0, 0.0); m]; m];
    let mut b = vec![Complex64::new(0.0, 0.0); m];
    for (row, &bus) in remaining.iter().enumerate() {
        for (col, &other) in remaining.iter().enumerate() {
            a[row][col] = dense[bus][other];
        }
        b[row] = current(input.s_bus[bus], v[bus]) - dense[bus][input.slack_bus] * input.slack_voltage;
    }

    let solved = solve_complex_linear(backend, &a, &b)?;
    for (idx, &bus) in remaining.iter().enumerate() {
        v[bus] = solved[idx];
    }
    Ok(v)
}
