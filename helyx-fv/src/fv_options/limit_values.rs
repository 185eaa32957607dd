use super::{Components, FieldMut, FvOption, OptionBase};
use crate::error::{OptionError, Result};
use crate::fv_mesh::FvMesh;
use crate::vol_field::VolField;
use helyx_core::{Dictionary, FieldValue};
use std::sync::Arc;

/// Clamps fields into `[min, max]` in the selected cells after they are
/// solved. A single bound applies to every component.
#[derive(Debug, Clone)]
pub struct LimitValues {
    base: OptionBase,
    fields: Vec<String>,
    min: Option<Components>,
    max: Option<Components>,
}

impl LimitValues {
    pub const TYPE_NAME: &'static str = "limitValues";

    pub fn new(name: &str, dict: &Dictionary, mesh: &Arc<FvMesh>) -> std::result::Result<Self, OptionError> {
        let base = OptionBase::new(name, Self::TYPE_NAME, dict, mesh)?;
        let coeffs = base.coeffs();
        if !coeffs.found("fields") {
            return Err(OptionError::MissingKeyword(name.to_string(), "fields".to_string()));
        }
        let fields = coeffs.words("fields")?;
        let min: Option<Components> = coeffs.lookup_or_default("min", None)?;
        let max: Option<Components> = coeffs.lookup_or_default("max", None)?;
        if min.is_none() && max.is_none() {
            return Err(OptionError::MissingKeyword(name.to_string(), "min or max".to_string()));
        }
        Ok(Self { base, fields, min, max })
    }

    pub fn construct(
        name: &str,
        dict: &Dictionary,
        mesh: &Arc<FvMesh>,
    ) -> std::result::Result<Box<dyn FvOption>, OptionError> {
        Ok(Box::new(Self::new(name, dict, mesh)?))
    }

    fn bound<T: FieldValue>(&self, bound: &Option<Components>, cmpt: usize) -> std::result::Result<Option<f64>, OptionError> {
        let Some(bound) = bound else {
            return Ok(None);
        };
        match bound.as_slice() {
            [single] => Ok(Some(*single)),
            values if values.len() == T::N_COMPONENTS => Ok(Some(values[cmpt])),
            _ => Err(OptionError::UnsupportedFieldType(
                self.base.name().to_string(),
                T::TYPE_NAME.to_string(),
            )),
        }
    }

    fn limit<T: FieldValue>(&self, field: &mut VolField<T>) -> Result<()> {
        let mut n_limited = 0;
        for cmpt in 0..T::N_COMPONENTS {
            let lo = self.bound::<T>(&self.min, cmpt)?.unwrap_or(f64::NEG_INFINITY);
            let hi = self.bound::<T>(&self.max, cmpt)?.unwrap_or(f64::INFINITY);
            for &cell in self.base.cells() {
                let value = field.internal()[cell].component(cmpt);
                let limited = value.clamp(lo, hi);
                if limited != value {
                    field.internal_mut()[cell].set_component(cmpt, limited);
                    n_limited += 1;
                }
            }
        }
        if n_limited > 0 {
            log::debug!("{}: limited {} values of {}", self.base.name(), n_limited, field.name());
            field.correct_boundary_conditions();
        }
        Ok(())
    }
}

impl FvOption for LimitValues {
    fn base(&self) -> &OptionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OptionBase {
        &mut self.base
    }

    fn source_fields(&self) -> Vec<(String, String)> {
        let region = self.base.mesh().name().to_string();
        self.fields.iter().map(|f| (f.clone(), region.clone())).collect()
    }

    fn correct(&mut self, field: FieldMut<'_>) -> Result<()> {
        match field {
            FieldMut::Scalar(f) => self.limit(f),
            FieldMut::Vector(f) => self.limit(f),
            FieldMut::SphericalTensor(f) => self.limit(f),
            FieldMut::SymmTensor(f) => self.limit(f),
            FieldMut::Tensor(f) => self.limit(f),
        }
    }
}
