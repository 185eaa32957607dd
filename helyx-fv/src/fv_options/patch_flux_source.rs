use super::{Components, Equation, FvOption, OptionBase, typed_value};
use crate::error::{OptionError, Result};
use crate::fv_matrix::FvMatrix;
use crate::fv_mesh::FvMesh;
use helyx_core::{Dictionary, FieldValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Uniform flux per unit area entering the cells next to some patches.
#[derive(Debug, Clone)]
pub struct PatchFluxSource {
    base: OptionBase,
    field: String,
    patches: Vec<usize>,
    flux: Components,
}

impl PatchFluxSource {
    pub const TYPE_NAME: &'static str = "patchFluxSource";

    pub fn new(name: &str, dict: &Dictionary, mesh: &Arc<FvMesh>) -> std::result::Result<Self, OptionError> {
        let base = OptionBase::new(name, Self::TYPE_NAME, dict, mesh)?;
        let coeffs = base.coeffs();
        for key in ["field", "patches", "flux"] {
            if !coeffs.found(key) {
                return Err(OptionError::MissingKeyword(name.to_string(), key.to_string()));
            }
        }
        let field: String = coeffs.lookup("field")?;
        let patches = coeffs
            .words("patches")?
            .iter()
            .map(|patch| {
                mesh.find_patch(patch).ok_or_else(|| {
                    OptionError::BadValue(
                        name.to_string(),
                        "patches".to_string(),
                        format!("mesh {} has no patch {}", mesh.name(), patch),
                    )
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let flux = coeffs.lookup("flux")?;
        Ok(Self {
            base,
            field,
            patches,
            flux,
        })
    }

    pub fn construct(
        name: &str,
        dict: &Dictionary,
        mesh: &Arc<FvMesh>,
    ) -> std::result::Result<Box<dyn FvOption>, OptionError> {
        Ok(Box::new(Self::new(name, dict, mesh)?))
    }

    fn add_flux<T: FieldValue>(&self, eqn: &mut FvMatrix<T>, patch: usize) -> Result<()> {
        let flux: T = typed_value(self.base.name(), self.flux.as_slice())?;
        let mesh = Arc::clone(self.base.mesh());
        let fv_patch = mesh.patch(patch);
        let source = eqn.source_mut();
        for (&cell, &area) in fv_patch.face_cells.iter().zip(&fv_patch.mag_sf) {
            source[cell] = source[cell].sub(flux.scale(area));
        }
        Ok(())
    }
}

impl FvOption for PatchFluxSource {
    fn base(&self) -> &OptionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OptionBase {
        &mut self.base
    }

    fn boundary_source_fields_and_patches(&self) -> BTreeMap<String, Vec<usize>> {
        BTreeMap::from([(self.field.clone(), self.patches.clone())])
    }

    fn add_boundary_sup(&mut self, eqn: Equation<'_>, _patch_i: usize, patch: usize) -> Result<()> {
        log::debug!(
            "{}: adding flux on patch {} to {}",
            self.base.name(),
            self.base.mesh().patch(patch).name,
            eqn.psi_name()
        );
        match eqn {
            Equation::Scalar(m) => self.add_flux(m, patch),
            Equation::Vector(m) => self.add_flux(m, patch),
            Equation::SphericalTensor(m) => self.add_flux(m, patch),
            Equation::SymmTensor(m) => self.add_flux(m, patch),
            Equation::Tensor(m) => self.add_flux(m, patch),
            Equation::BlockVector(_) => {
                Err(OptionError::UnsupportedFieldType(self.base.name().to_string(), "blockVector".to_string()).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vol_field::VolField;
    use helyx_core::DimensionSet;

    #[test]
    fn test_flux_enters_wall_cells() {
        let mesh = Arc::new(FvMesh::one_dimensional("solid", 3, 1.0, 2.0).unwrap());
        let dict = Dictionary::from_json_str(
            "heatFlux",
            r#"{"type": "patchFluxSource", "field": "T", "patches": ["right"], "flux": 5.0}"#,
        )
        .unwrap();
        let mut option = PatchFluxSource::new("heatFlux", &dict, &mesh).unwrap();
        option.set_source_names();
        assert_eq!(option.apply_to_boundary_field_and_patch("T", 1), Some(0));
        assert_eq!(option.apply_to_boundary_field_and_patch("T", 0), None);

        let t = VolField::uniform("T", mesh, DimensionSet::temperature(), 0.0);
        let mut eqn = FvMatrix::new(&t, DimensionSet::temperature());
        option.add_boundary_sup(Equation::Scalar(&mut eqn), 0, 1).unwrap();
        assert_eq!(eqn.source(), &[0.0, 0.0, -10.0]);
    }

    #[test]
    fn test_unknown_patch_rejected() {
        let mesh = Arc::new(FvMesh::one_dimensional("solid", 3, 1.0, 2.0).unwrap());
        let dict = Dictionary::from_json_str(
            "heatFlux",
            r#"{"type": "patchFluxSource", "field": "T", "patches": "top", "flux": 5.0}"#,
        )
        .unwrap();
        assert!(matches!(
            PatchFluxSource::new("heatFlux", &dict, &mesh),
            Err(OptionError::BadValue(_, _, _))
        ));
    }
}
