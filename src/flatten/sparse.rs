//! Sparse linear least-squares for the conformal map.
//!
//! The system `A x ≈ b` is stored in CSR form and solved with
//! Jacobi-preconditioned conjugate gradient on the normal equations
//! (`AᵀA x = Aᵀb`) without ever forming `AᵀA`.

use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

use crate::budget::BudgetClock;
use crate::error::{Result, SolverError};

/// Overdetermined sparse system `A x ≈ b`.
#[derive(Debug, Clone)]
pub(crate) struct LeastSquares {
    matrix: CsrMatrix<f64>,
    rhs: DVector<f64>,
}

/// Outcome of a least-squares solve.
#[derive(Debug, Clone)]
pub(crate) struct Solution {
    pub x: DVector<f64>,
    pub iterations: usize,
    pub residual: f64,
}

impl LeastSquares {
    /// Build the system from `(row, col, value)` triplets; duplicates are summed.
    pub(crate) fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: &[(usize, usize, f64)],
        rhs: DVector<f64>,
    ) -> Self {
        let mut coo = CooMatrix::new(num_rows, num_cols);
        for &(row, col, val) in triplets {
            if val.abs() > 1e-15 {
                coo.push(row, col, val);
            }
        }
        Self {
            matrix: CsrMatrix::from(&coo),
            rhs,
        }
    }

    pub(crate) fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    /// Compute A * v.
    fn mul_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut result = DVector::zeros(self.matrix.nrows());
        for (row_idx, row) in self.matrix.row_iter().enumerate() {
            let mut sum = 0.0;
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values()) {
                sum += val * v[col_idx];
            }
            result[row_idx] = sum;
        }
        result
    }

    /// Compute Aᵀ * v.
    fn mul_transpose_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut result = DVector::zeros(self.matrix.ncols());
        for (row_idx, row) in self.matrix.row_iter().enumerate() {
            let v_row = v[row_idx];
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values()) {
                result[col_idx] += val * v_row;
            }
        }
        result
    }

    /// Diagonal of AᵀA (squared column norms).
    fn normal_diagonal(&self) -> DVector<f64> {
        let mut diag = DVector::zeros(self.matrix.ncols());
        for row in self.matrix.row_iter() {
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values()) {
                diag[col_idx] += val * val;
            }
        }
        diag
    }

    /// Solves `min ‖A x − b‖` starting from `x0`.
    ///
    /// Stops when `‖Aᵀr‖ / ‖Aᵀb‖ < tolerance`.
    ///
    /// # Errors
    ///
    /// - `SolverError::SolverFailure` if a column has no equations or the
    ///   iteration breaks down before converging (singular system)
    /// - `SolverError::Timeout` if the clock runs out first
    #[allow(clippy::many_single_char_names)]
    pub(crate) fn solve(
        &self,
        x0: DVector<f64>,
        tolerance: f64,
        clock: &BudgetClock,
    ) -> Result<Solution> {
        let diag = self.normal_diagonal();
        if let Some(col) = diag.iter().position(|&d| d <= 1e-30) {
            return Err(SolverError::SolverFailure(format!(
                "unknown {col} does not appear in any equation"
            ))
            .into());
        }
        let precondition = |v: &DVector<f64>| v.component_div(&diag);

        let atb_norm = self.mul_transpose_vec(&self.rhs).norm();
        let mut x = x0;
        let mut r = &self.rhs - self.mul_vec(&x);
        let mut g = self.mul_transpose_vec(&r);
        if atb_norm < 1e-300 || g.norm() / atb_norm.max(1e-300) < tolerance {
            let residual = r.norm();
            return Ok(Solution {
                x,
                iterations: 0,
                residual,
            });
        }

        let mut z = precondition(&g);
        let mut p = z.clone();
        let mut g_dot_z = g.dot(&z);

        let mut iterations = 0;
        loop {
            clock.check(iterations)?;
            iterations += 1;

            let q = self.mul_vec(&p);
            let q_dot_q = q.dot(&q);
            if q_dot_q <= 1e-300 {
                // Search direction lies in the null space of A.
                return Err(SolverError::SolverFailure(format!(
                    "singular system: breakdown after {iterations} iterations"
                ))
                .into());
            }
            let alpha = g_dot_z / q_dot_q;
            x += alpha * &p;
            r -= alpha * &q;

            g = self.mul_transpose_vec(&r);
            if g.norm() / atb_norm < tolerance {
                break;
            }

            z = precondition(&g);
            let g_dot_z_new = g.dot(&z);
            let beta = g_dot_z_new / g_dot_z.max(1e-300);
            g_dot_z = g_dot_z_new;
            p = &z + beta * &p;
        }

        Ok(Solution {
            residual: r.norm(),
            x,
            iterations,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::budget::SolverBudget;
    use approx::assert_abs_diff_eq;

    fn clock() -> BudgetClock {
        BudgetClock::start("test", SolverBudget::new(), 1000)
    }

    #[test]
    fn square_system_is_solved_exactly() {
        // [2 1; 1 3] x = [3; 5]  →  x = [0.8, 1.4]
        let system = LeastSquares::from_triplets(
            2,
            2,
            &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)],
            DVector::from_vec(vec![3.0, 5.0]),
        );
        let sol = system.solve(DVector::zeros(2), 1e-12, &clock()).unwrap();
        assert_abs_diff_eq!(sol.x[0], 0.8, epsilon = 1e-9);
        assert_abs_diff_eq!(sol.x[1], 1.4, epsilon = 1e-9);
        assert!(sol.residual < 1e-9);
    }

    #[test]
    fn overdetermined_least_squares() {
        // Fit x to [1, 2, 3] with three equations x = b_i  →  mean 2.
        let system = LeastSquares::from_triplets(
            3,
            1,
            &[(0, 0, 1.0), (1, 0, 1.0), (2, 0, 1.0)],
            DVector::from_vec(vec![1.0, 2.0, 3.0]),
        );
        let sol = system.solve(DVector::zeros(1), 1e-12, &clock()).unwrap();
        assert_abs_diff_eq!(sol.x[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sol.residual, 2.0_f64.sqrt(), epsilon = 1e-9);
    }

    #[test]
    fn duplicate_triplets_are_summed() {
        let system = LeastSquares::from_triplets(
            1,
            1,
            &[(0, 0, 1.0), (0, 0, 1.0)],
            DVector::from_vec(vec![4.0]),
        );
        let sol = system.solve(DVector::zeros(1), 1e-12, &clock()).unwrap();
        assert_abs_diff_eq!(sol.x[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_column_is_a_failure() {
        let system = LeastSquares::from_triplets(
            1,
            2,
            &[(0, 0, 1.0)],
            DVector::from_vec(vec![1.0]),
        );
        let err = system.solve(DVector::zeros(2), 1e-12, &clock()).unwrap_err();
        assert!(err.to_string().contains("solver failure"));
    }

    #[test]
    fn rhs_orthogonal_to_range_is_trivial() {
        // Two identical columns: the normal matrix is singular.
        let system = LeastSquares::from_triplets(
            2,
            2,
            &[(0, 0, 1.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 1.0)],
            DVector::from_vec(vec![1.0, -1.0]),
        );
        // The right-hand side is orthogonal to range(A): Aᵀb = 0, trivially solved.
        let sol = system.solve(DVector::zeros(2), 1e-12, &clock()).unwrap();
        assert_eq!(sol.iterations, 0);
    }

    #[test]
    fn zero_iteration_budget_times_out() {
        let system = LeastSquares::from_triplets(
            2,
            2,
            &[(0, 0, 2.0), (0, 1, 1.0), (1, 0, 1.0), (1, 1, 3.0)],
            DVector::from_vec(vec![3.0, 5.0]),
        );
        let clock = BudgetClock::start("test", SolverBudget::new().with_max_iterations(1), 0);
        // One iteration is allowed, which is not enough to converge here.
        let err = system.solve(DVector::zeros(2), 1e-14, &clock).unwrap_err();
        assert!(err.is_timeout());
    }
}
