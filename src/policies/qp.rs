//! Long-only quadratic programs solved with Clarabel.

use crate::error::{BacktestError, Result};
use clarabel::algebra::*;
use clarabel::solver::*;
use nalgebra::{DMatrix, DVector};

/// Solve
///
/// ```text
/// minimize    ½ wᵗ P w + qᵗ w
/// subject to  1ᵗ w = 1
///             w_i >= lower_bound
/// ```
///
/// `p` must be symmetric positive semidefinite.
pub fn solve_budget_qp(p: &DMatrix<f64>, q: &DVector<f64>, lower_bound: f64) -> Result<DVector<f64>> {
    let n = p.nrows();
    if p.ncols() != n || q.len() != n {
        return Err(BacktestError::InvalidInput(format!(
            "QP dimensions do not match: P is {}x{}, q has {}",
            p.nrows(),
            p.ncols(),
            q.len()
        )));
    }
    if lower_bound * n as f64 > 1.0 {
        return Err(BacktestError::OptimizationError(format!(
            "Lower bound {} is infeasible for {} assets with a unit budget",
            lower_bound, n
        )));
    }

    // Upper triangle of P in CSC format.
    let mut p_data = Vec::new();
    let mut p_indices = Vec::new();
    let mut p_indptr = vec![0];
    for j in 0..n {
        for i in 0..=j {
            let val = p[(i, j)];
            if val != 0.0 {
                p_data.push(val);
                p_indices.push(i);
            }
        }
        p_indptr.push(p_data.len());
    }
    let p_csc = CscMatrix::new(n, n, p_indptr, p_indices, p_data);

    let q_vec: Vec<f64> = q.iter().cloned().collect();

    // Row 0: budget equality. Rows 1..=n: -w_j + s_j = -lower_bound, s_j >= 0.
    let mut a_data = Vec::new();
    let mut a_indices = Vec::new();
    let mut a_indptr = vec![0];
    for j in 0..n {
        a_data.push(1.0);
        a_indices.push(0);

        a_data.push(-1.0);
        a_indices.push(1 + j);

        a_indptr.push(a_data.len());
    }
    let a = CscMatrix::new(1 + n, n, a_indptr, a_indices, a_data);

    let mut b = vec![1.0];
    b.extend(vec![-lower_bound; n]);

    let cones = [ZeroConeT(1), NonnegativeConeT(n)];

    let settings = DefaultSettingsBuilder::default()
        .max_iter(200)
        .verbose(false)
        .build()
        .map_err(|e| BacktestError::OptimizationError(format!("Failed to build settings: {}", e)))?;

    let mut solver = DefaultSolver::new(&p_csc, &q_vec, &a, &b, &cones, settings).map_err(|e| {
        BacktestError::OptimizationError(format!("Failed to create solver: {:?}", e))
    })?;

    solver.solve();

    if !matches!(
        solver.solution.status,
        SolverStatus::Solved | SolverStatus::AlmostSolved
    ) {
        return Err(BacktestError::OptimizationError(format!(
            "Optimization failed with status: {:?}",
            solver.solution.status
        )));
    }

    // Clamp solver noise back onto the feasible set.
    Ok(DVector::from_iterator(
        n,
        solver.solution.x.iter().map(|&w| w.max(lower_bound)),
    ))
}
