use helyx_core::{HelyxCoreError, LduMatrix, Matrix};
use num_traits::Float;

/// Dense matrix stored in row-major order, used as a direct reference
/// solver for small systems.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T: Float + bytemuck::Pod + Default + Send + Sync + std::fmt::Debug> {
    rows: usize,
    cols: usize,
    data: Vec<T>, // data[row * cols + col]
}

impl<T: Float + bytemuck::Pod + Default + Send + Sync + std::fmt::Debug> DenseMatrix<T> {
    pub fn new(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, HelyxCoreError> {
        if data.len() != rows * cols {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "Data length ({}) does not match dimensions ({}x{})",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::zero(); rows * cols],
        }
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&T> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut T> {
        if row < self.rows && col < self.cols {
            self.data.get_mut(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn mul_vec(&self, x: &[T]) -> Result<Vec<T>, HelyxCoreError> {
        if x.len() != self.cols {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "vector of {} entries for {} columns",
                x.len(),
                self.cols
            )));
        }
        Ok(self
            .data
            .chunks(self.cols.max(1))
            .take(self.rows)
            .map(|row| row.iter().zip(x).fold(T::zero(), |acc, (&a, &b)| acc + a * b))
            .collect())
    }

    /// Gaussian elimination with partial pivoting.
    pub fn solve(&self, b: &[T]) -> Result<Vec<T>, HelyxCoreError> {
        if !self.is_square() || b.len() != self.rows {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "cannot solve a {}x{} system with {} right-hand side entries",
                self.rows,
                self.cols,
                b.len()
            )));
        }
        let n = self.rows;
        let mut a = self.data.clone();
        let mut x = b.to_vec();

        for k in 0..n {
            let pivot = (k..n)
                .max_by(|&i, &j| {
                    a[i * n + k]
                        .abs()
                        .partial_cmp(&a[j * n + k].abs())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .unwrap_or(k);
            if a[pivot * n + k] == T::zero() {
                return Err(HelyxCoreError::SingularBlock { row: k });
            }
            if pivot != k {
                for col in 0..n {
                    a.swap(k * n + col, pivot * n + col);
                }
                x.swap(k, pivot);
            }
            for i in k + 1..n {
                let factor = a[i * n + k] / a[k * n + k];
                for col in k..n {
                    let akc = a[k * n + col];
                    a[i * n + col] = a[i * n + col] - factor * akc;
                }
                let xk = x[k];
                x[i] = x[i] - factor * xk;
            }
        }
        for k in (0..n).rev() {
            let mut value = x[k];
            for col in k + 1..n {
                value = value - a[k * n + col] * x[col];
            }
            x[k] = value / a[k * n + k];
        }
        Ok(x)
    }
}

impl DenseMatrix<f64> {
    /// Expands the internal coefficients of an LDU matrix.
    pub fn from_ldu(matrix: &LduMatrix) -> Self {
        let n = matrix.size();
        let mut dense = Self::zeros(n, n);
        for (cell, &d) in matrix.diag().iter().enumerate() {
            dense.data[cell * n + cell] = d;
        }
        let l = matrix.addressing().lower_addr();
        let u = matrix.addressing().upper_addr();
        for face in 0..l.len() {
            dense.data[l[face] * n + u[face]] += matrix.upper()[face];
            dense.data[u[face] * n + l[face]] += matrix.lower()[face];
        }
        dense
    }
}

impl<T: Float + bytemuck::Pod + Default + Send + Sync + std::fmt::Debug> Matrix for DenseMatrix<T> {
    type Value = T;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helyx_core::LduAddressing;
    use std::sync::Arc;

    #[test]
    fn test_solve_needs_pivoting() {
        let a = DenseMatrix::new(2, 2, vec![0.0, 1.0, 2.0, 1.0]).unwrap();
        let x = a.solve(&[1.0, 3.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_ldu_places_triangles() {
        let addressing = Arc::new(LduAddressing::new(2, vec![0], vec![1], vec![]).unwrap());
        let matrix = LduMatrix::from_coeffs(addressing, vec![3.0, 4.0], vec![-1.0], Some(vec![-2.0])).unwrap();
        let dense = DenseMatrix::from_ldu(&matrix);
        assert_eq!(dense.data(), &[3.0, -1.0, -2.0, 4.0]);
    }

    #[test]
    fn test_singular_rejected() {
        let a = DenseMatrix::new(2, 2, vec![1.0, 2.0, 2.0, 4.0]).unwrap();
        assert!(matches!(a.solve(&[1.0, 2.0]), Err(HelyxCoreError::SingularBlock { .. })));
    }
}
