use super::{Components, Equation, FvOption, OptionBase, typed_value};
use crate::error::{OptionError, Result};
use crate::fv_block_matrix::BlockVectorSystem;
use crate::fv_matrix::FvMatrix;
use crate::fv_mesh::FvMesh;
use crate::vol_field::VolField;
use helyx_core::{CoeffField, Dictionary, FieldValue, Vector};
use helyx_lsolver::solver_performance::SMALL;
use std::sync::Arc;

/// How the injection rates relate to the selected volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeMode {
    /// Rates are totals over the selection and are divided by its volume.
    Absolute,
    /// Rates are per unit volume.
    Specific,
}

impl VolumeMode {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "absolute" => Some(Self::Absolute),
            "specific" => Some(Self::Specific),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Injection {
    field: String,
    su: Components,
    sp: f64,
}

/// `Su + SuSp(Sp, psi)` on the selected cells, per field.
#[derive(Debug, Clone)]
pub struct SemiImplicitSource {
    base: OptionBase,
    volume_mode: VolumeMode,
    injections: Vec<Injection>,
}

impl SemiImplicitSource {
    pub const TYPE_NAME: &'static str = "semiImplicitSource";

    pub fn new(name: &str, dict: &Dictionary, mesh: &Arc<FvMesh>) -> std::result::Result<Self, OptionError> {
        let base = OptionBase::new(name, Self::TYPE_NAME, dict, mesh)?;
        let coeffs = base.coeffs();

        let mode: String = coeffs.lookup_or_default("volumeMode", "absolute".to_string())?;
        let volume_mode = VolumeMode::from_name(&mode).ok_or_else(|| {
            OptionError::BadValue(
                name.to_string(),
                "volumeMode".to_string(),
                format!("{} is not one of [\"absolute\", \"specific\"]", mode),
            )
        })?;

        let mut injections = Vec::new();
        if coeffs.found("injectionRateSuSp") {
            let rates = coeffs.sub_dict("injectionRateSuSp")?;
            for field in rates.toc() {
                let (su, sp): (Components, f64) = rates.lookup(field)?;
                injections.push(Injection {
                    field: field.to_string(),
                    su,
                    sp,
                });
            }
        } else if coeffs.found("injectionRateSu") || coeffs.found("injectionRateSp") {
            let su_rates = coeffs.optional_sub_dict("injectionRateSu");
            let sp_rates = coeffs.optional_sub_dict("injectionRateSp");
            let mut fields: Vec<&str> = Vec::new();
            let listed = [("injectionRateSu", &su_rates), ("injectionRateSp", &sp_rates)];
            for (key, rates) in listed {
                if !coeffs.found(key) {
                    continue;
                }
                for field in rates.toc() {
                    if !fields.contains(&field) {
                        fields.push(field);
                    }
                }
            }
            for field in fields {
                injections.push(Injection {
                    field: field.to_string(),
                    su: su_rates.lookup_or_default(field, Components::One(0.0))?,
                    sp: sp_rates.lookup_or_default(field, 0.0)?,
                });
            }
        } else {
            return Err(OptionError::MissingKeyword(name.to_string(), "injectionRateSuSp".to_string()));
        }

        Ok(Self {
            base,
            volume_mode,
            injections,
        })
    }

    pub fn construct(
        name: &str,
        dict: &Dictionary,
        mesh: &Arc<FvMesh>,
    ) -> std::result::Result<Box<dyn FvOption>, OptionError> {
        Ok(Box::new(Self::new(name, dict, mesh)?))
    }

    pub fn volume_mode(&self) -> VolumeMode {
        self.volume_mode
    }

    fn v_dash(&self) -> f64 {
        match self.volume_mode {
            VolumeMode::Absolute => self.base.v(),
            VolumeMode::Specific => 1.0,
        }
    }

    /// Per-cell `(Su, Sp)` over the mesh, zero outside the selection.
    fn cell_rates<T: FieldValue>(&self, field_i: usize, rho: Option<&[f64]>) -> Result<(Vec<T>, Vec<f64>)> {
        let injection = &self.injections[field_i];
        let su: T = typed_value(self.base.name(), injection.su.as_slice())?;
        let scale = 1.0 / (self.v_dash() + SMALL);
        let n_cells = self.base.mesh().n_cells();

        let mut su_cells = vec![T::zero(); n_cells];
        let mut sp_cells = vec![0.0; n_cells];
        for &cell in self.base.cells() {
            let r = rho.map_or(1.0, |rho| rho[cell]);
            su_cells[cell] = su.scale(scale * r);
            sp_cells[cell] = injection.sp * scale * r;
        }
        Ok((su_cells, sp_cells))
    }

    fn add_to_matrix<T: FieldValue>(&self, eqn: &mut FvMatrix<T>, field_i: usize, rho: Option<&[f64]>) -> Result<()> {
        let (su, sp) = self.cell_rates::<T>(field_i, rho)?;
        eqn.add_su(&su);
        let psi = eqn.psi_values().to_vec();
        eqn.add_su_sp(&sp, &psi);
        Ok(())
    }

    /// Block systems take Sp fully implicit.
    fn add_to_block(&self, eqn: &mut BlockVectorSystem, field_i: usize, rho: Option<&[f64]>) -> Result<()> {
        let (su, sp) = self.cell_rates::<Vector>(field_i, rho)?;
        let volumes = self.base.mesh().volumes();
        let implicit = CoeffField::Scalar(sp.iter().zip(volumes).map(|(s, v)| s * v).collect());
        let diag = eqn.matrix_mut().diag_mut();
        for cell in 0..implicit.len() {
            diag.add_to_row(cell, &implicit, cell);
        }
        for ((b, s), v) in eqn.source_mut().iter_mut().zip(&su).zip(volumes) {
            *b = b.sub(s.scale(*v));
        }
        Ok(())
    }

    fn add(&self, eqn: Equation<'_>, field_i: usize, rho: Option<&[f64]>) -> Result<()> {
        log::debug!("{}: adding source to {}", self.base.name(), eqn.psi_name());
        match eqn {
            Equation::Scalar(m) => self.add_to_matrix(m, field_i, rho),
            Equation::Vector(m) => self.add_to_matrix(m, field_i, rho),
            Equation::SphericalTensor(m) => self.add_to_matrix(m, field_i, rho),
            Equation::SymmTensor(m) => self.add_to_matrix(m, field_i, rho),
            Equation::Tensor(m) => self.add_to_matrix(m, field_i, rho),
            Equation::BlockVector(s) => self.add_to_block(s, field_i, rho),
        }
    }
}

impl FvOption for SemiImplicitSource {
    fn base(&self) -> &OptionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut OptionBase {
        &mut self.base
    }

    fn source_fields(&self) -> Vec<(String, String)> {
        let region = self.base.mesh().name().to_string();
        self.injections.iter().map(|i| (i.field.clone(), region.clone())).collect()
    }

    fn add_sup(&mut self, eqn: Equation<'_>, field_i: usize) -> Result<()> {
        self.add(eqn, field_i, None)
    }

    fn add_sup_rho(&mut self, rho: &VolField<f64>, eqn: Equation<'_>, field_i: usize) -> Result<()> {
        self.add(eqn, field_i, Some(rho.internal()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helyx_core::DimensionSet;

    fn mesh() -> Arc<FvMesh> {
        Arc::new(FvMesh::one_dimensional("fluid", 4, 2.0, 1.0).unwrap())
    }

    fn source(text: &str) -> SemiImplicitSource {
        let dict = Dictionary::from_json_str("heater", text).unwrap();
        SemiImplicitSource::new("heater", &dict, &mesh()).unwrap()
    }

    #[test]
    fn test_absolute_rate_spreads_over_selection() {
        let mut option = source(
            r#"{"type": "semiImplicitSource", "active": true,
                "semiImplicitSourceCoeffs": {"volumeMode": "absolute", "selectionMode": "cellSet",
                "cells": [0, 1], "injectionRateSuSp": {"T": [2.0, 0.0]}}}"#,
        );
        option.set_source_names();
        let t = VolField::uniform("T", mesh(), DimensionSet::temperature(), 1.0);
        let mut eqn = FvMatrix::new(&t, DimensionSet::temperature());
        option.add_sup(Equation::Scalar(&mut eqn), 0).unwrap();

        // selection volume 1.0, cell volume 0.5
        assert!((eqn.source()[0] + 1.0).abs() < 1e-12);
        assert!((eqn.source()[1] + 1.0).abs() < 1e-12);
        assert_eq!(eqn.source()[2], 0.0);
    }

    #[test]
    fn test_negative_sp_is_explicit_in_psi() {
        let mut option = source(
            r#"{"type": "semiImplicitSource",
                "semiImplicitSourceCoeffs": {"volumeMode": "specific",
                "injectionRateSu": {}, "injectionRateSp": {"T": -2.0}}}"#,
        );
        let t = VolField::uniform("T", mesh(), DimensionSet::temperature(), 3.0);
        let mut eqn = FvMatrix::new(&t, DimensionSet::temperature());
        option.add_sup(Equation::Scalar(&mut eqn), 0).unwrap();
        assert!(eqn.diag().iter().all(|&d| d == 0.0));
        // -V*Sp*psi = 0.5*2*3
        assert!(eqn.source().iter().all(|&b| (b - 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_vector_rate_needs_three_components() {
        let mut option = source(
            r#"{"type": "semiImplicitSource",
                "semiImplicitSourceCoeffs": {"volumeMode": "specific", "injectionRateSuSp": {"U": [1.0, 0.0]}}}"#,
        );
        let u = VolField::uniform("U", mesh(), DimensionSet::velocity(), [0.0; 3]);
        let mut eqn = FvMatrix::new(&u, DimensionSet::velocity());
        assert!(option.add_sup(Equation::Vector(&mut eqn), 0).is_err());
    }

    #[test]
    fn test_rho_scales_block_source() {
        let mut option = source(
            r#"{"type": "semiImplicitSource",
                "semiImplicitSourceCoeffs": {"volumeMode": "specific",
                "injectionRateSuSp": {"U": [[1.0, 0.0, 0.0], 4.0]}}}"#,
        );
        let mesh = mesh();
        let mut rho = VolField::uniform("rho", mesh.clone(), DimensionSet::dimensionless(), 2.0);
        rho.internal_mut()[3] = 0.0;
        let mut system = BlockVectorSystem::new("U", Arc::clone(mesh.addressing()));
        option.add_sup_rho(&rho, Equation::BlockVector(&mut system), 0).unwrap();

        assert!((system.source()[0][0] + 1.0).abs() < 1e-9);
        assert_eq!(system.source()[3], [0.0; 3]);
        assert!((system.matrix().diag().unwrap().diag_component(1, 2) - 4.0).abs() < 1e-9);
    }
}
