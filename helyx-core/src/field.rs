use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

pub type Scalar = f64;
pub type Vector = [f64; 3];
pub type SphericalTensor = [f64; 1];
pub type SymmTensor = [f64; 6];
pub type Tensor = [f64; 9];

/// Per-cell value type carried by fields, sources and boundary coefficients.
///
/// Arithmetic is component-wise; `cmpt_multiply` is the component product
/// used when a coefficient of the same rank multiplies a value.
pub trait FieldValue:
    Copy + Debug + PartialEq + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const N_COMPONENTS: usize;
    const TYPE_NAME: &'static str;

    fn zero() -> Self {
        Self::default()
    }

    fn uniform(v: f64) -> Self;

    fn component(&self, d: usize) -> f64;

    fn set_component(&mut self, d: usize, v: f64);

    fn from_components(components: &[f64]) -> Option<Self> {
        if components.len() != Self::N_COMPONENTS {
            return None;
        }
        let mut value = Self::zero();
        for (d, &c) in components.iter().enumerate() {
            value.set_component(d, c);
        }
        Some(value)
    }

    fn map_components(self, f: impl Fn(f64) -> f64) -> Self {
        let mut out = self;
        for d in 0..Self::N_COMPONENTS {
            out.set_component(d, f(self.component(d)));
        }
        out
    }

    fn zip_map(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut out = self;
        for d in 0..Self::N_COMPONENTS {
            out.set_component(d, f(self.component(d), other.component(d)));
        }
        out
    }

    fn add(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a + b)
    }

    fn sub(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a - b)
    }

    fn neg(self) -> Self {
        self.map_components(|a| -a)
    }

    fn scale(self, s: f64) -> Self {
        self.map_components(|a| a * s)
    }

    fn cmpt_multiply(self, other: Self) -> Self {
        self.zip_map(other, |a, b| a * b)
    }

    fn cmpt_av(&self) -> f64 {
        (0..Self::N_COMPONENTS).map(|d| self.component(d)).sum::<f64>() / Self::N_COMPONENTS as f64
    }

    fn mag(&self) -> f64 {
        (0..Self::N_COMPONENTS)
            .map(|d| self.component(d).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

impl FieldValue for f64 {
    const N_COMPONENTS: usize = 1;
    const TYPE_NAME: &'static str = "scalar";

    fn uniform(v: f64) -> Self {
        v
    }

    fn component(&self, _d: usize) -> f64 {
        *self
    }

    fn set_component(&mut self, _d: usize, v: f64) {
        *self = v;
    }

    fn mag(&self) -> f64 {
        self.abs()
    }
}

macro_rules! impl_field_value_for_array {
    ($n:literal, $name:literal) => {
        impl FieldValue for [f64; $n] {
            const N_COMPONENTS: usize = $n;
            const TYPE_NAME: &'static str = $name;

            fn uniform(v: f64) -> Self {
                [v; $n]
            }

            fn component(&self, d: usize) -> f64 {
                self[d]
            }

            fn set_component(&mut self, d: usize, v: f64) {
                self[d] = v;
            }
        }
    };
}

impl_field_value_for_array!(1, "sphericalTensor");
impl_field_value_for_array!(3, "vector");
impl_field_value_for_array!(6, "symmTensor");
impl_field_value_for_array!(9, "tensor");

/// Extracts component `d` of every value.
pub fn component<T: FieldValue>(values: &[T], d: usize) -> Vec<f64> {
    values.iter().map(|v| v.component(d)).collect()
}

/// Writes `cmpt` back into component `d` of every value.
pub fn replace_component<T: FieldValue>(values: &mut [T], d: usize, cmpt: &[f64]) {
    debug_assert_eq!(values.len(), cmpt.len());
    for (v, &c) in values.iter_mut().zip(cmpt) {
        v.set_component(d, c);
    }
}

pub fn dot(a: &Vector, b: &Vector) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vector_arithmetic() {
        let a: Vector = [1.0, 2.0, 3.0];
        let b: Vector = [0.5, 0.5, 0.5];
        assert_eq!(a.add(b), [1.5, 2.5, 3.5]);
        assert_eq!(a.sub(b).neg(), [-0.5, -1.5, -2.5]);
        assert_eq!(a.cmpt_multiply(b), [0.5, 1.0, 1.5]);
        assert_eq!(a.cmpt_av(), 2.0);
        assert_eq!(dot(&a, &b), 3.0);
    }

    #[test]
    fn test_component_round_trip() {
        let mut values: Vec<Vector> = vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let y = component(&values, 1);
        assert_eq!(y, vec![2.0, 5.0]);
        replace_component(&mut values, 1, &[0.0, 0.0]);
        assert_eq!(values, vec![[1.0, 0.0, 3.0], [4.0, 0.0, 6.0]]);
    }

    #[test]
    fn test_from_components() {
        assert_eq!(<f64 as FieldValue>::from_components(&[2.0]), Some(2.0));
        assert_eq!(Vector::from_components(&[1.0, 2.0]), None);
        assert_eq!(SymmTensor::TYPE_NAME, "symmTensor");
    }
}
