//! Per-row block coefficients with a runtime shape tag.
//!
//! A [`CoeffField`] holds one coefficient per matrix row (or per face) for a
//! system with `N` coupled components. The shape is one of
//!
//! * `Scalar` - the same factor on every component,
//! * `Linear` - a diagonal block, one factor per component,
//! * `Square` - a dense `N x N` block coupling components.
//!
//! Arithmetic between two fields requires the same shape. Widening
//! (`to_linear`, `to_square`, `widen_to`) is always explicit and lossless;
//! narrowing (`truncate_to_linear`, `truncate_to_scalar`) is explicit and
//! drops information.

use crate::error::{HelyxCoreError, Result};
use crate::fatal_error;
use std::ops::{AddAssign, MulAssign, SubAssign};

pub type LinearCoeff<const N: usize> = [f64; N];
pub type SquareCoeff<const N: usize> = [[f64; N]; N];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoeffShape {
    Scalar,
    Linear,
    Square,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CoeffField<const N: usize> {
    Scalar(Vec<f64>),
    Linear(Vec<LinearCoeff<N>>),
    Square(Vec<SquareCoeff<N>>),
}

fn square_diagonal<const N: usize>(d: &[f64; N]) -> SquareCoeff<N> {
    let mut block = [[0.0; N]; N];
    for i in 0..N {
        block[i][i] = d[i];
    }
    block
}

/// Solves the dense `N x N` system `block x = b` by Gaussian elimination
/// with partial pivoting.
fn solve_block<const N: usize>(block: &SquareCoeff<N>, b: &[f64; N]) -> Option<[f64; N]> {
    let mut a = *block;
    let mut x = *b;
    for col in 0..N {
        let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < f64::MIN_POSITIVE {
            return None;
        }
        a.swap(col, pivot);
        x.swap(col, pivot);
        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            x[row] -= factor * x[col];
        }
    }
    for row in (0..N).rev() {
        let mut acc = x[row];
        for k in row + 1..N {
            acc -= a[row][k] * x[k];
        }
        x[row] = acc / a[row][row];
    }
    Some(x)
}

impl<const N: usize> CoeffField<N> {
    /// A zero field of the given shape and length.
    pub fn new(shape: CoeffShape, size: usize) -> Self {
        match shape {
            CoeffShape::Scalar => CoeffField::Scalar(vec![0.0; size]),
            CoeffShape::Linear => CoeffField::Linear(vec![[0.0; N]; size]),
            CoeffShape::Square => CoeffField::Square(vec![[[0.0; N]; N]; size]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CoeffField::Scalar(c) => c.len(),
            CoeffField::Linear(c) => c.len(),
            CoeffField::Square(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> CoeffShape {
        match self {
            CoeffField::Scalar(_) => CoeffShape::Scalar,
            CoeffField::Linear(_) => CoeffShape::Linear,
            CoeffField::Square(_) => CoeffShape::Square,
        }
    }

    pub fn negate(&mut self) {
        *self *= -1.0;
    }

    pub fn set_zero(&mut self) {
        *self = Self::new(self.shape(), self.len());
    }

    /// Copy promoted to the linear shape. Each diagonal slot of a linear
    /// entry takes the scalar value.
    pub fn to_linear(&self) -> CoeffField<N> {
        match self {
            CoeffField::Scalar(c) => CoeffField::Linear(c.iter().map(|&s| [s; N]).collect()),
            CoeffField::Linear(_) => self.clone(),
            CoeffField::Square(_) => fatal_error!(
                "CoeffField::to_linear",
                format!("CoeffField<{}>", N),
                "cannot widen a square field to linear; use truncate_to_linear"
            ),
        }
    }

    /// Copy promoted to the square shape with zero off-diagonal slots.
    pub fn to_square(&self) -> CoeffField<N> {
        match self {
            CoeffField::Scalar(c) => {
                CoeffField::Square(c.iter().map(|&s| square_diagonal(&[s; N])).collect())
            }
            CoeffField::Linear(c) => CoeffField::Square(c.iter().map(square_diagonal).collect()),
            CoeffField::Square(_) => self.clone(),
        }
    }

    /// Widens in place to `shape`. Narrowing requests are fatal.
    pub fn widen_to(&mut self, shape: CoeffShape) {
        if shape < self.shape() {
            fatal_error!(
                "CoeffField::widen_to",
                format!("CoeffField<{}>", N),
                "cannot widen {:?} to {:?}",
                self.shape(),
                shape
            );
        }
        match shape {
            CoeffShape::Scalar => {}
            CoeffShape::Linear => *self = self.to_linear(),
            CoeffShape::Square => *self = self.to_square(),
        }
    }

    /// Drops the off-diagonal slots of a square field.
    pub fn truncate_to_linear(&self) -> CoeffField<N> {
        match self {
            CoeffField::Square(c) => CoeffField::Linear(
                c.iter()
                    .map(|block| {
                        let mut d = [0.0; N];
                        for i in 0..N {
                            d[i] = block[i][i];
                        }
                        d
                    })
                    .collect(),
            ),
            _ => self.to_linear(),
        }
    }

    /// Collapses every entry to the average of its diagonal.
    pub fn truncate_to_scalar(&self) -> CoeffField<N> {
        CoeffField::Scalar((0..self.len()).map(|row| self.component_average(row)).collect())
    }

    /// Diagonal component `cmpt` of the entry in `row`.
    pub fn diag_component(&self, row: usize, cmpt: usize) -> f64 {
        match self {
            CoeffField::Scalar(c) => c[row],
            CoeffField::Linear(c) => c[row][cmpt],
            CoeffField::Square(c) => c[row][cmpt][cmpt],
        }
    }

    pub fn component_average(&self, row: usize) -> f64 {
        (0..N).map(|d| self.diag_component(row, d)).sum::<f64>() / N as f64
    }

    /// Full block of the entry in `row`.
    pub fn block(&self, row: usize) -> SquareCoeff<N> {
        match self {
            CoeffField::Scalar(c) => square_diagonal(&[c[row]; N]),
            CoeffField::Linear(c) => square_diagonal(&c[row]),
            CoeffField::Square(c) => c[row],
        }
    }

    /// Entry in `row` applied to `v`.
    pub fn apply(&self, row: usize, v: &[f64; N]) -> [f64; N] {
        let mut out = [0.0; N];
        match self {
            CoeffField::Scalar(c) => {
                for i in 0..N {
                    out[i] = c[row] * v[i];
                }
            }
            CoeffField::Linear(c) => {
                for i in 0..N {
                    out[i] = c[row][i] * v[i];
                }
            }
            CoeffField::Square(c) => {
                for i in 0..N {
                    out[i] = (0..N).map(|j| c[row][i][j] * v[j]).sum();
                }
            }
        }
        out
    }

    /// Transpose of the entry in `row` applied to `v`.
    pub fn apply_transpose(&self, row: usize, v: &[f64; N]) -> [f64; N] {
        match self {
            CoeffField::Square(c) => {
                let mut out = [0.0; N];
                for i in 0..N {
                    out[i] = (0..N).map(|j| c[row][j][i] * v[j]).sum();
                }
                out
            }
            _ => self.apply(row, v),
        }
    }

    /// Solves `entry(row) x = v`.
    pub fn inverse_apply(&self, row: usize, v: &[f64; N]) -> Result<[f64; N]> {
        let singular = || HelyxCoreError::SingularBlock { row };
        match self {
            CoeffField::Scalar(c) => {
                if c[row] == 0.0 {
                    return Err(singular());
                }
                let mut out = *v;
                out.iter_mut().for_each(|x| *x /= c[row]);
                Ok(out)
            }
            CoeffField::Linear(c) => {
                let mut out = *v;
                for i in 0..N {
                    if c[row][i] == 0.0 {
                        return Err(singular());
                    }
                    out[i] /= c[row][i];
                }
                Ok(out)
            }
            CoeffField::Square(c) => solve_block(&c[row], v).ok_or_else(singular),
        }
    }

    /// Overwrites entry `row` with `other`'s entry `other_row`, widening this
    /// field first if needed.
    pub fn set_row(&mut self, row: usize, other: &CoeffField<N>, other_row: usize) {
        if other.shape() > self.shape() {
            self.widen_to(other.shape());
        }
        match self {
            CoeffField::Scalar(a) => a[row] = 0.0,
            CoeffField::Linear(a) => a[row] = [0.0; N],
            CoeffField::Square(a) => a[row] = [[0.0; N]; N],
        }
        self.add_to_row(row, other, other_row);
    }

    /// Adds `other`'s entry `other_row` into this field's entry `row`,
    /// widening this field first if `other` has the wider shape.
    pub fn add_to_row(&mut self, row: usize, other: &CoeffField<N>, other_row: usize) {
        if other.shape() > self.shape() {
            self.widen_to(other.shape());
        }
        match (self, other) {
            (CoeffField::Scalar(a), CoeffField::Scalar(b)) => a[row] += b[other_row],
            (CoeffField::Linear(a), CoeffField::Scalar(b)) => {
                a[row].iter_mut().for_each(|x| *x += b[other_row])
            }
            (CoeffField::Linear(a), CoeffField::Linear(b)) => {
                for i in 0..N {
                    a[row][i] += b[other_row][i];
                }
            }
            (CoeffField::Square(a), b) => {
                let block = b.block(other_row);
                for i in 0..N {
                    for j in 0..N {
                        a[row][i][j] += block[i][j];
                    }
                }
            }
            (CoeffField::Scalar(_), _) | (CoeffField::Linear(_), CoeffField::Square(_)) => {
                unreachable!("target was widened to the source shape")
            }
        }
    }

    /// Multiplies each entry by the matching per-row factor.
    pub fn scale_rows(&mut self, factors: &[f64]) {
        if factors.len() != self.len() {
            fatal_error!(
                "CoeffField::scale_rows",
                format!("CoeffField<{}>", N),
                "size mismatch: field {} factors {}",
                self.len(),
                factors.len()
            );
        }
        match self {
            CoeffField::Scalar(c) => c.iter_mut().zip(factors).for_each(|(x, s)| *x *= s),
            CoeffField::Linear(c) => c
                .iter_mut()
                .zip(factors)
                .for_each(|(x, s)| x.iter_mut().for_each(|v| *v *= s)),
            CoeffField::Square(c) => c.iter_mut().zip(factors).for_each(|(x, s)| {
                x.iter_mut()
                    .for_each(|r| r.iter_mut().for_each(|v| *v *= s))
            }),
        }
    }

    /// Applies `f` to every stored number.
    fn for_each_value(&mut self, f: impl Fn(&mut f64)) {
        match self {
            CoeffField::Scalar(c) => c.iter_mut().for_each(f),
            CoeffField::Linear(c) => c.iter_mut().for_each(|x| x.iter_mut().for_each(&f)),
            CoeffField::Square(c) => c
                .iter_mut()
                .for_each(|x| x.iter_mut().for_each(|r| r.iter_mut().for_each(&f))),
        }
    }

    fn check_compatible(&self, other: &CoeffField<N>, operation: &str) {
        if self.shape() != other.shape() {
            fatal_error!(
                operation,
                format!("CoeffField<{}>", N),
                "incompatible shapes {:?} and {:?}; widen explicitly first",
                self.shape(),
                other.shape()
            );
        }
        if self.len() != other.len() {
            fatal_error!(
                operation,
                format!("CoeffField<{}>", N),
                "size mismatch: {} and {}",
                self.len(),
                other.len()
            );
        }
    }

    fn combine(&mut self, other: &CoeffField<N>, sign: f64) {
        match (self, other) {
            (CoeffField::Scalar(a), CoeffField::Scalar(b)) => {
                a.iter_mut().zip(b).for_each(|(x, y)| *x += sign * y)
            }
            (CoeffField::Linear(a), CoeffField::Linear(b)) => {
                a.iter_mut().zip(b).for_each(|(x, y)| {
                    x.iter_mut().zip(y).for_each(|(xi, yi)| *xi += sign * yi)
                })
            }
            (CoeffField::Square(a), CoeffField::Square(b)) => {
                a.iter_mut().zip(b).for_each(|(x, y)| {
                    x.iter_mut().zip(y).for_each(|(xr, yr)| {
                        xr.iter_mut().zip(yr).for_each(|(xi, yi)| *xi += sign * yi)
                    })
                })
            }
            _ => unreachable!("shapes checked by caller"),
        }
    }
}

impl<const N: usize> AddAssign<&CoeffField<N>> for CoeffField<N> {
    fn add_assign(&mut self, other: &CoeffField<N>) {
        self.check_compatible(other, "CoeffField::operator+=");
        self.combine(other, 1.0);
    }
}

impl<const N: usize> SubAssign<&CoeffField<N>> for CoeffField<N> {
    fn sub_assign(&mut self, other: &CoeffField<N>) {
        self.check_compatible(other, "CoeffField::operator-=");
        self.combine(other, -1.0);
    }
}

impl<const N: usize> MulAssign<f64> for CoeffField<N> {
    fn mul_assign(&mut self, s: f64) {
        self.for_each_value(|x| *x *= s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_preserves_diagonal() {
        let scalar: CoeffField<3> = CoeffField::Scalar(vec![1.5, -2.0, 4.0]);
        let linear = scalar.to_linear();
        let square = linear.to_square();
        for row in 0..3 {
            let original = match &scalar {
                CoeffField::Scalar(c) => c[row],
                _ => unreachable!(),
            };
            for cmpt in 0..3 {
                assert_eq!(linear.diag_component(row, cmpt), original);
                assert_eq!(square.diag_component(row, cmpt), original);
            }
            let block = square.block(row);
            for i in 0..3 {
                for j in 0..3 {
                    if i != j {
                        assert_eq!(block[i][j], 0.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_truncation_is_explicit_and_lossy() {
        let mut block = [[0.0; 2]; 2];
        block[0][0] = 2.0;
        block[0][1] = 5.0;
        block[1][1] = 4.0;
        let square: CoeffField<2> = CoeffField::Square(vec![block]);
        assert_eq!(square.truncate_to_linear(), CoeffField::Linear(vec![[2.0, 4.0]]));
        assert_eq!(square.truncate_to_scalar(), CoeffField::Scalar(vec![3.0]));
        assert_ne!(square.truncate_to_linear().to_square(), square);
    }

    #[test]
    fn test_arithmetic_same_shape() {
        let mut a: CoeffField<2> = CoeffField::Linear(vec![[1.0, 2.0], [3.0, 4.0]]);
        let b: CoeffField<2> = CoeffField::Linear(vec![[1.0, 1.0], [1.0, 1.0]]);
        a += &b;
        assert_eq!(a, CoeffField::Linear(vec![[2.0, 3.0], [4.0, 5.0]]));
        a -= &b;
        a *= 2.0;
        assert_eq!(a, CoeffField::Linear(vec![[2.0, 4.0], [6.0, 8.0]]));
        a.scale_rows(&[0.5, 0.0]);
        assert_eq!(a, CoeffField::Linear(vec![[1.0, 2.0], [0.0, 0.0]]));
        a.negate();
        assert_eq!(a, CoeffField::Linear(vec![[-1.0, -2.0], [-0.0, -0.0]]));
    }

    #[test]
    #[should_panic(expected = "incompatible shapes")]
    fn test_mixing_shapes_is_fatal() {
        let mut a: CoeffField<3> = CoeffField::new(CoeffShape::Scalar, 2);
        let b: CoeffField<3> = CoeffField::new(CoeffShape::Linear, 2);
        a += &b;
    }

    #[test]
    #[should_panic(expected = "size mismatch")]
    fn test_length_mismatch_is_fatal() {
        let mut a: CoeffField<3> = CoeffField::new(CoeffShape::Scalar, 2);
        let b: CoeffField<3> = CoeffField::new(CoeffShape::Scalar, 3);
        a -= &b;
    }

    #[test]
    #[should_panic(expected = "cannot widen")]
    fn test_widen_to_narrower_is_fatal() {
        let mut a: CoeffField<3> = CoeffField::new(CoeffShape::Square, 1);
        a.widen_to(CoeffShape::Linear);
    }

    #[test]
    fn test_apply_and_inverse() {
        let square: CoeffField<2> = CoeffField::Square(vec![[[4.0, 1.0], [2.0, 3.0]]]);
        let v = [1.0, 2.0];
        let av = square.apply(0, &v);
        assert_eq!(av, [6.0, 8.0]);
        let back = square.inverse_apply(0, &av).unwrap();
        assert!((back[0] - 1.0).abs() < 1e-12);
        assert!((back[1] - 2.0).abs() < 1e-12);
        assert_eq!(square.apply_transpose(0, &v), [8.0, 7.0]);

        let singular: CoeffField<2> = CoeffField::Linear(vec![[1.0, 0.0]]);
        assert!(matches!(
            singular.inverse_apply(0, &v),
            Err(HelyxCoreError::SingularBlock { row: 0 })
        ));
    }

    #[test]
    fn test_add_to_row_widens_target() {
        let mut target: CoeffField<2> = CoeffField::Scalar(vec![1.0, 1.0]);
        let source: CoeffField<2> = CoeffField::Linear(vec![[2.0, 3.0]]);
        target.add_to_row(1, &source, 0);
        assert_eq!(target, CoeffField::Linear(vec![[1.0, 1.0], [3.0, 4.0]]));
    }
}
