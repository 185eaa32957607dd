use crate::error::HelyxCoreError;
use crate::traits::Matrix;

/// An assembled matrix in Compressed Sparse Row (CSR) form.
///
/// LDU matrices are converted to this form for inspection and for comparing
/// an assembled system against a hand-built reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    col_indices: Vec<usize>,
    /// Start of each row in `values`; `rows + 1` entries.
    row_ptr: Vec<usize>,
}

impl SparseMatrix {
    /// Builds a CSR matrix from coordinate entries. Entries that land on the
    /// same (row, col) are summed, which is how face contributions to a
    /// shared diagonal combine.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<Triplete>) -> Result<Self, HelyxCoreError> {
        if let Some(t) = triplets.iter().find(|t| t.row >= rows || t.col >= cols) {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "entry ({}, {}) outside a {}x{} matrix",
                t.row, t.col, rows, cols
            )));
        }
        triplets.sort_unstable_by_key(|t| (t.row, t.col));

        let mut values: Vec<f64> = Vec::with_capacity(triplets.len());
        let mut col_indices: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut row_ptr = vec![0usize; rows + 1];
        let mut last: Option<(usize, usize)> = None;
        for Triplete { row, col, value } in triplets {
            match values.last_mut() {
                Some(v) if last == Some((row, col)) => *v += value,
                _ => {
                    values.push(value);
                    col_indices.push(col);
                    row_ptr[row + 1] += 1;
                    last = Some((row, col));
                }
            }
        }
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        Ok(SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        })
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Stored value at (row, col); `None` outside the sparsity pattern.
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        (self.row_ptr[row]..self.row_ptr[row + 1])
            .find(|&i| self.col_indices[i] == col)
            .map(|i| self.values[i])
    }

    /// `y = A x`
    pub fn mul_vec(&self, x: &[f64]) -> Result<Vec<f64>, HelyxCoreError> {
        if x.len() != self.cols {
            return Err(HelyxCoreError::InvalidDimensions(format!(
                "Vector length ({}) must match matrix columns ({})",
                x.len(),
                self.cols
            )));
        }
        let y = (0..self.rows)
            .map(|r| {
                (self.row_ptr[r]..self.row_ptr[r + 1])
                    .map(|i| self.values[i] * x[self.col_indices[i]])
                    .sum()
            })
            .collect();
        Ok(y)
    }

    /// Stored entries in row order.
    pub fn iter(&self) -> impl Iterator<Item = Triplete> + '_ {
        (0..self.rows).flat_map(move |row| {
            (self.row_ptr[row]..self.row_ptr[row + 1]).map(move |i| Triplete {
                row,
                col: self.col_indices[i],
                value: self.values[i],
            })
        })
    }
}

/// One coordinate entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triplete {
    row: usize,
    col: usize,
    value: f64,
}

impl Triplete {
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Triplete { row, col, value }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Matrix for SparseMatrix {
    type Value = f64;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let triplets = vec![
            Triplete::new(1, 1, 2.0),
            Triplete::new(0, 0, 1.0),
            Triplete::new(1, 1, -0.5),
            Triplete::new(0, 1, 3.0),
        ];
        let matrix = SparseMatrix::from_triplets(2, 2, triplets).unwrap();
        assert_eq!(matrix.dims(), (2, 2));
        assert_eq!(matrix.nnz(), 3);
        assert_eq!(matrix.get(0, 0), Some(1.0));
        assert_eq!(matrix.get(0, 1), Some(3.0));
        assert_eq!(matrix.get(1, 1), Some(1.5));
        assert_eq!(matrix.get(1, 0), None);
    }

    #[test]
    fn test_from_triplets_out_of_bounds() {
        let result = SparseMatrix::from_triplets(2, 2, vec![Triplete::new(2, 0, 1.0)]);
        match result.err().unwrap() {
            HelyxCoreError::InvalidDimensions(msg) => assert!(msg.contains("outside a 2x2 matrix")),
            _ => panic!("Expected InvalidDimensions error"),
        }
    }

    #[test]
    fn test_mul_vec_and_iter() {
        let triplets = vec![Triplete::new(0, 0, 2.0), Triplete::new(0, 1, -1.0), Triplete::new(1, 1, 3.0)];
        let matrix = SparseMatrix::from_triplets(2, 2, triplets).unwrap();
        assert_eq!(matrix.mul_vec(&[1.0, 2.0]).unwrap(), vec![0.0, 6.0]);
        assert!(matrix.mul_vec(&[1.0]).is_err());
        let entries: Vec<_> = matrix.iter().map(|t| (t.row(), t.col(), t.value())).collect();
        assert_eq!(entries, vec![(0, 0, 2.0), (0, 1, -1.0), (1, 1, 3.0)]);
    }
}
