use faer::Mat;

pub type DenseMatrix = Mat<f64>;

const SINGULAR_PIVOT_EPSILON: f64 = 1.0e-15;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LuError {
    #[error("LU factorization requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("LU factorization requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LuDecomposition {
    lu: DenseMatrix,
    pivots: Vec<usize>,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LuError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[self.pivots[row]];
            for col in 0..row {
                value -= self.lu[(row, col)] * forward[col];
            }
            forward[row] = value;
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lu[(row, col)] * solution[col];
            }

            let diagonal = self.lu[(row, row)];
            if diagonal.abs() <= SINGULAR_PIVOT_EPSILON {
                return Err(LuError::SingularMatrix { pivot_index: row });
            }

            solution[row] = value / diagonal;
        }

        Ok(solution)
    }
}

pub fn lu_factorize(matrix: &DenseMatrix) -> Result<LuDecomposition, LuError> {
    let dimension = validate_square_shape(matrix)?;
    let mut lu = matrix.clone();
    let mut pivots: Vec<usize> = (0..dimension).collect();

    for pivot_col in 0..dimension {
        let (pivot_row, pivot_magnitude) = select_pivot_row(&lu, pivot_col);
        if pivot_magnitude <= SINGULAR_PIVOT_EPSILON {
            return Err(LuError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            swap_rows(&mut lu, pivot_col, pivot_row);
            pivots.swap(pivot_col, pivot_row);
        }

        let pivot = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            lu[(row, pivot_col)] /= pivot;
            let multiplier = lu[(row, pivot_col)];
            for col in (pivot_col + 1)..dimension {
                let updated = lu[(row, col)] - multiplier * lu[(pivot_col, col)];
                lu[(row, col)] = updated;
            }
        }
    }

    Ok(LuDecomposition { lu, pivots })
}

pub fn lu_solve(matrix: &DenseMatrix, rhs: &[f64]) -> Result<Vec<f64>, LuError> {
    lu_factorize(matrix)?.solve(rhs)
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, LuError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(LuError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LuError::NonSquareMatrix { rows, cols });
    }

    Ok(rows)
}

fn select_pivot_row(matrix: &DenseMatrix, pivot_col: usize) -> (usize, f64) {
    let dimension = matrix.nrows();
    let mut best_row = pivot_col;
    let mut best_magnitude = matrix[(pivot_col, pivot_col)].abs();

    for row in (pivot_col + 1)..dimension {
        let magnitude = matrix[(row, pivot_col)].abs();
        if magnitude > best_magnitude {
            best_magnitude = magnitude;
            best_row = row;
        }
    }

    (best_row, best_magnitude)
}

fn swap_rows(matrix: &mut DenseMatrix, first: usize, second: usize) {
    for col in 0..matrix.ncols() {
        let held = matrix[(first, col)];
        matrix[(first, col)] = matrix[(second, col)];
        matrix[(second, col)] = held;
    }
}

#[cfg(test)]
mod tests {
    use super::{DenseMatrix, LuError, lu_factorize, lu_solve};

    fn matrix_from_rows(rows: &[&[f64]]) -> DenseMatrix {
        let mut matrix = DenseMatrix::zeros(rows.len(), rows[0].len());
        for (row_index, row) in rows.iter().enumerate() {
            for (col_index, &value) in row.iter().enumerate() {
                matrix[(row_index, col_index)] = value;
            }
        }
        matrix
    }

    #[test]
    fn lu_solve_recovers_known_solution() {
        let matrix = matrix_from_rows(&[
            &[4.0, 1.0, 0.0],
            &[1.0, 3.0, -1.0],
            &[0.0, -1.0, 2.0],
        ]);
        // Right-hand side chosen so the solution is [1, 2, 3].
        let rhs = [6.0, 4.0, 4.0];

        let solution = lu_solve(&matrix, &rhs).expect("solvable system");
        let expected = [1.0, 2.0, 3.0];
        for (actual, target) in solution.iter().zip(expected.iter()) {
            assert!((actual - target).abs() < 1.0e-12);
        }
    }

    #[test]
    fn lu_solve_pivots_when_leading_entry_is_zero() {
        let matrix = matrix_from_rows(&[&[0.0, 1.0], &[2.0, 0.0]]);
        let solution = lu_solve(&matrix, &[3.0, 4.0]).expect("pivoted system");
        assert!((solution[0] - 2.0).abs() < 1.0e-12);
        assert!((solution[1] - 3.0).abs() < 1.0e-12);
    }

    #[test]
    fn lu_factorize_rejects_singular_matrix() {
        let matrix = matrix_from_rows(&[&[1.0, 2.0], &[2.0, 4.0]]);
        let error = lu_factorize(&matrix).expect_err("rank-deficient matrix should fail");
        assert!(matches!(error, LuError::SingularMatrix { .. }));
    }

    #[test]
    fn lu_factorize_rejects_non_square_shapes() {
        let matrix = DenseMatrix::zeros(2, 3);
        assert_eq!(
            lu_factorize(&matrix).expect_err("shape mismatch"),
            LuError::NonSquareMatrix { rows: 2, cols: 3 }
        );

        let empty = DenseMatrix::zeros(0, 0);
        assert_eq!(
            lu_factorize(&empty).expect_err("empty matrix"),
            LuError::EmptyMatrix
        );
    }

    #[test]
    fn lu_solve_rejects_rhs_length_mismatch() {
        let matrix = matrix_from_rows(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let decomposition = lu_factorize(&matrix).expect("identity factorizes");
        assert_eq!(
            decomposition.solve(&[1.0]).expect_err("short rhs"),
            LuError::RhsLengthMismatch {
                expected: 2,
                actual: 1,
            }
        );
    }
}
