// Vector kernels shared by the LDU matrix and the solvers.
// All reductions run left to right so a given input always produces the
// same bits, which keeps parallel reductions reproducible.

use num_traits::Float;

/// `y = alpha * x + y`
pub fn axpy<T: Float>(alpha: T, x: &[T], y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = *yi + alpha * xi;
    }
}

/// `y = x + beta * y`
pub fn xpby<T: Float>(x: &[T], beta: T, y: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, &xi) in y.iter_mut().zip(x) {
        *yi = xi + beta * *yi;
    }
}

pub fn dot<T: Float>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());
    x.iter()
        .zip(y)
        .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
}

pub fn sum<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &a| acc + a)
}

pub fn sum_mag<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &a| acc + a.abs())
}

pub fn max_mag<T: Float>(x: &[T]) -> T {
    x.iter().fold(T::zero(), |acc, &a| acc.max(a.abs()))
}

/// `z = x * y` component by component.
pub fn elementwise_mul<T: Float>(x: &[T], y: &[T], z: &mut [T]) {
    debug_assert_eq!(x.len(), y.len());
    debug_assert_eq!(x.len(), z.len());
    for ((zi, &xi), &yi) in z.iter_mut().zip(x).zip(y) {
        *zi = xi * yi;
    }
}

/// `r = b - ax`
pub fn residual_of<T: Float>(b: &[T], ax: &[T], r: &mut [T]) {
    for ((ri, &bi), &ai) in r.iter_mut().zip(b).zip(ax) {
        *ri = bi - ai;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axpy_and_dot() {
        let x = [1.0, 2.0, 3.0];
        let mut y = [1.0, 1.0, 1.0];
        axpy(2.0, &x, &mut y);
        assert_eq!(y, [3.0, 5.0, 7.0]);
        assert_eq!(dot(&x, &y), 3.0 + 10.0 + 21.0);
    }

    #[test]
    fn test_xpby() {
        let x = [1.0, 1.0];
        let mut y = [2.0, 4.0];
        xpby(&x, 0.5, &mut y);
        assert_eq!(y, [2.0, 3.0]);
    }

    #[test]
    fn test_magnitudes() {
        let x = [-3.0_f64, 1.0, 2.0];
        assert_eq!(sum(&x), 0.0);
        assert_eq!(sum_mag(&x), 6.0);
        assert_eq!(max_mag(&x), 3.0);
    }
}
