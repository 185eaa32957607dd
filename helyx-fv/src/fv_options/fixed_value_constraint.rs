use super::{Components, Equation, FieldMut, FvOption, OptionBase, typed_value};
use crate::error::{FvError, OptionError, Result};
use crate::fv_matrix::FvMatrix;
use crate::fv_mesh::FvMesh;
use crate::vol_field::VolField;
use helyx_core::{Dictionary, FieldValue};
use std::sync::Arc;

/// Holds fields at fixed values in the selected cells.
#[derive(Debug, Clone)]
pub struct FixedValueConstraint {
    base: OptionBase,
    field_values: Vec<(String, Components)>,
}

impl FixedValueConstraint {
    pub const TYPE_NAME: &'static str = "fixedValueConstraint";

    pub fn new(name: &str, dict: &Dictionary, mesh: &Arc<FvMesh>) -> std::result::Result<Self, OptionError> {
        let base = OptionBase::new(name, Self::TYPE_NAME, dict, mesh)?;
        if !base.coeffs().found("fieldValues") {
            return Err(OptionError::MissingKeyword(name.to_string(), "fieldValues".to_string()));
        }
        let values = base.coeffs().sub_dict("fieldValues")?;
        let field_values = values
            .toc()
            .into_iter()
            .map(|field| Ok((field.to_string(), values.lookup(field)?)))
            .collect::<std::result::Result<Vec<_>, OptionError>>()?;
        Ok(Self { base, field_values })
    }

    pub fn construct(
        name: &str,
        dict: &Dictionary,
        mesh: &Arc<FvMesh>,
    ) -> std::result::Result<Box<dyn FvOption>, OptionError> {
        Ok(Box::new(Self::new(name, dict, mesh)?))
    }

    fn fix<T: FieldValue>(&self, eqn: &mut FvMatrix<T>, psi: &mut VolField<T>, field_i: usize) -> Result<()> {
        let value: T = typed_value(self.base.name(), self.field_values[field_i].1.as_slice())?;
        let cells = self.base.cells();
        eqn.set_values(psi, cells, &vec![value; cells.len()]);
        Ok(())
    }
}

impl FvOption for FixedValueConstraint {
    fn base(&self) -> &OptionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OptionBase {
        &mut self.base
    }

    fn source_fields(&self) -> Vec<(String, String)> {
        let region = self.base.mesh().name().to_string();
        self.field_values.iter().map(|(f, _)| (f.clone(), region.clone())).collect()
    }

    fn constrain(&mut self, eqn: Equation<'_>, psi: FieldMut<'_>, field_i: usize) -> Result<()> {
        log::debug!("{}: constraining {}", self.base.name(), eqn.psi_name());
        match (eqn, psi) {
            (Equation::Scalar(m), FieldMut::Scalar(f)) => self.fix(m, f, field_i),
            (Equation::Vector(m), FieldMut::Vector(f)) => self.fix(m, f, field_i),
            (Equation::SphericalTensor(m), FieldMut::SphericalTensor(f)) => self.fix(m, f, field_i),
            (Equation::SymmTensor(m), FieldMut::SymmTensor(f)) => self.fix(m, f, field_i),
            (Equation::Tensor(m), FieldMut::Tensor(f)) => self.fix(m, f, field_i),
            (Equation::BlockVector(_), _) => {
                Err(OptionError::UnsupportedFieldType(self.base.name().to_string(), "blockVector".to_string()).into())
            }
            (eqn, psi) => Err(FvError::FieldError(format!(
                "{}: equation of {} {} does not match field {}",
                self.base.name(),
                eqn.type_name(),
                eqn.psi_name(),
                psi.name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fvm::{self, Dimensioned};
    use helyx_core::DimensionSet;

    #[test]
    fn test_constrained_cell_keeps_value_after_solve() {
        let mesh = Arc::new(FvMesh::one_dimensional("fluid", 5, 1.0, 1.0).unwrap());
        let dict = Dictionary::from_json_str(
            "hold",
            r#"{"type": "fixedValueConstraint", "active": true,
                "fixedValueConstraintCoeffs": {"selectionMode": "cellSet", "cells": [2],
                "fieldValues": {"T": 7.0}}}"#,
        )
        .unwrap();
        let mut option = FixedValueConstraint::new("hold", &dict, &mesh).unwrap();
        option.set_source_names();
        assert_eq!(option.apply_to_field("T", "fluid"), Some(0));

        let mut t = VolField::uniform("T", mesh, DimensionSet::temperature(), 0.0);
        t.set_fixed_value("left", 1.0).unwrap();
        let mut eqn = fvm::laplacian(Dimensioned::dimensionless(1.0), &t);
        option
            .constrain(Equation::Scalar(&mut eqn), FieldMut::Scalar(&mut t), 0)
            .unwrap();
        assert_eq!(t.internal()[2], 7.0);

        let controls = helyx_lsolver::SolverControls::new("PCG").with_tolerance(1e-12, 0.0);
        eqn.solve(&mut t, &controls).unwrap();
        assert!((t.internal()[2] - 7.0).abs() < 1e-8);
    }

    #[test]
    fn test_mismatched_field_is_rejected() {
        let mesh = Arc::new(FvMesh::one_dimensional("fluid", 2, 1.0, 1.0).unwrap());
        let dict = Dictionary::from_json_str(
            "hold",
            r#"{"type": "fixedValueConstraint", "fieldValues": {"T": 1.0}}"#,
        )
        .unwrap();
        let mut option = FixedValueConstraint::new("hold", &dict, &mesh).unwrap();
        let t = VolField::uniform("T", mesh.clone(), DimensionSet::temperature(), 0.0);
        let mut u = VolField::uniform("U", mesh, DimensionSet::velocity(), [0.0; 3]);
        let mut eqn = FvMatrix::new(&t, DimensionSet::temperature());
        let result = option.constrain(Equation::Scalar(&mut eqn), FieldMut::Vector(&mut u), 0);
        assert!(matches!(result, Err(FvError::FieldError(_))));
    }
}
