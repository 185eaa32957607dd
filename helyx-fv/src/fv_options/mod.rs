//! Run-time selectable finite-volume sources and constraints.
//!
//! An option names the fields it acts on. [`OptionList`] hands each
//! equation to every active option that applies to its field, marks the
//! field as applied and, at the end of a step, warns about declared fields
//! that were never touched.

mod fixed_value_constraint;
mod limit_values;
mod patch_flux_source;
mod semi_implicit_source;

pub use fixed_value_constraint::FixedValueConstraint;
pub use limit_values::LimitValues;
pub use patch_flux_source::PatchFluxSource;
pub use semi_implicit_source::{SemiImplicitSource, VolumeMode};

use crate::error::{OptionError, Result};
use crate::fv_block_matrix::BlockVectorSystem;
use crate::fv_matrix::FvMatrix;
use crate::fv_mesh::FvMesh;
use crate::vol_field::VolField;
use helyx_core::{DimensionSet, Dictionary, FieldValue, SphericalTensor, SymmTensor, Tensor, Vector};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Point of the solution sequence an option is tied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecHook {
    Constrain,
    Correct,
    Operator,
    OuterCorrect,
    Solve,
    None,
}

impl ExecHook {
    pub const NAMES: [&'static str; 6] = ["constrain", "correct", "operator", "outerCorrect", "solve", "none"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "constrain" => Some(Self::Constrain),
            "correct" => Some(Self::Correct),
            "operator" => Some(Self::Operator),
            "outerCorrect" => Some(Self::OuterCorrect),
            "solve" => Some(Self::Solve),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// An equation handed to an option, by the rank of its unknown.
#[derive(Debug)]
pub enum Equation<'a> {
    Scalar(&'a mut FvMatrix<f64>),
    Vector(&'a mut FvMatrix<Vector>),
    SphericalTensor(&'a mut FvMatrix<SphericalTensor>),
    SymmTensor(&'a mut FvMatrix<SymmTensor>),
    Tensor(&'a mut FvMatrix<Tensor>),
    BlockVector(&'a mut BlockVectorSystem),
}

impl Equation<'_> {
    pub fn psi_name(&self) -> &str {
        match self {
            Equation::Scalar(m) => m.psi_name(),
            Equation::Vector(m) => m.psi_name(),
            Equation::SphericalTensor(m) => m.psi_name(),
            Equation::SymmTensor(m) => m.psi_name(),
            Equation::Tensor(m) => m.psi_name(),
            Equation::BlockVector(s) => s.name(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Equation::Scalar(_) => f64::TYPE_NAME,
            Equation::Vector(_) => Vector::TYPE_NAME,
            Equation::SphericalTensor(_) => SphericalTensor::TYPE_NAME,
            Equation::SymmTensor(_) => SymmTensor::TYPE_NAME,
            Equation::Tensor(_) => Tensor::TYPE_NAME,
            Equation::BlockVector(_) => "blockVector",
        }
    }

    pub fn reborrow(&mut self) -> Equation<'_> {
        match self {
            Equation::Scalar(m) => Equation::Scalar(m),
            Equation::Vector(m) => Equation::Vector(m),
            Equation::SphericalTensor(m) => Equation::SphericalTensor(m),
            Equation::SymmTensor(m) => Equation::SymmTensor(m),
            Equation::Tensor(m) => Equation::Tensor(m),
            Equation::BlockVector(s) => Equation::BlockVector(s),
        }
    }
}

/// A field handed to an option, by rank.
#[derive(Debug)]
pub enum FieldMut<'a> {
    Scalar(&'a mut VolField<f64>),
    Vector(&'a mut VolField<Vector>),
    SphericalTensor(&'a mut VolField<SphericalTensor>),
    SymmTensor(&'a mut VolField<SymmTensor>),
    Tensor(&'a mut VolField<Tensor>),
}

impl FieldMut<'_> {
    pub fn name(&self) -> &str {
        match self {
            FieldMut::Scalar(f) => f.name(),
            FieldMut::Vector(f) => f.name(),
            FieldMut::SphericalTensor(f) => f.name(),
            FieldMut::SymmTensor(f) => f.name(),
            FieldMut::Tensor(f) => f.name(),
        }
    }

    pub fn reborrow(&mut self) -> FieldMut<'_> {
        match self {
            FieldMut::Scalar(f) => FieldMut::Scalar(f),
            FieldMut::Vector(f) => FieldMut::Vector(f),
            FieldMut::SphericalTensor(f) => FieldMut::SphericalTensor(f),
            FieldMut::SymmTensor(f) => FieldMut::SymmTensor(f),
            FieldMut::Tensor(f) => FieldMut::Tensor(f),
        }
    }
}

/// Matrix types that can be wrapped as an [`Equation`].
pub trait AsEquation {
    fn as_equation(&mut self) -> Equation<'_>;
}

macro_rules! impl_as_equation {
    ($type:ty, $variant:ident) => {
        impl AsEquation for FvMatrix<$type> {
            fn as_equation(&mut self) -> Equation<'_> {
                Equation::$variant(self)
            }
        }
    };
}

impl_as_equation!(f64, Scalar);
impl_as_equation!(Vector, Vector);
impl_as_equation!(SphericalTensor, SphericalTensor);
impl_as_equation!(SymmTensor, SymmTensor);
impl_as_equation!(Tensor, Tensor);

impl AsEquation for BlockVectorSystem {
    fn as_equation(&mut self) -> Equation<'_> {
        Equation::BlockVector(self)
    }
}

/// Cell selection of an option.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    All,
    CellSet(Vec<usize>),
}

/// State shared by every option: identity, activity, cell selection and
/// the applied bookkeeping of its fields and boundary patches.
#[derive(Debug, Clone)]
pub struct OptionBase {
    name: String,
    type_name: String,
    mesh: Arc<FvMesh>,
    coeffs: Dictionary,
    active: bool,
    mrf: bool,
    exec_hook: ExecHook,
    selection: Selection,
    cells: Vec<usize>,
    v: f64,
    field_names: Vec<String>,
    region_names: Vec<String>,
    applied: Vec<bool>,
    boundary_patch_ids: BTreeMap<String, Vec<usize>>,
    boundary_applied: BTreeMap<String, Vec<bool>>,
}

impl OptionBase {
    /// Reads the common entries. Coefficients come from `<type>Coeffs` when
    /// present, otherwise from the option dictionary itself.
    pub fn new(
        name: &str,
        type_name: &str,
        dict: &Dictionary,
        mesh: &Arc<FvMesh>,
    ) -> std::result::Result<Self, OptionError> {
        let coeffs = dict.optional_sub_dict(&format!("{}Coeffs", type_name));
        let hook_name: String = dict.lookup_or_default("hookOp", "none".to_string())?;
        let exec_hook = ExecHook::from_name(&hook_name).ok_or_else(|| {
            OptionError::BadValue(
                name.to_string(),
                "hookOp".to_string(),
                format!("{} is not one of {:?}", hook_name, ExecHook::NAMES),
            )
        })?;

        let mode: String = coeffs.lookup_or_default("selectionMode", "all".to_string())?;
        let selection = match mode.as_str() {
            "all" => Selection::All,
            "cellSet" => {
                if !coeffs.found("cells") {
                    return Err(OptionError::MissingKeyword(name.to_string(), "cells".to_string()));
                }
                Selection::CellSet(coeffs.lookup("cells")?)
            }
            other => {
                return Err(OptionError::BadValue(
                    name.to_string(),
                    "selectionMode".to_string(),
                    format!("{} is not one of [\"all\", \"cellSet\"]", other),
                ));
            }
        };
        let cells: Vec<usize> = match &selection {
            Selection::All => (0..mesh.n_cells()).collect(),
            Selection::CellSet(cells) => cells.clone(),
        };
        if let Some(&bad) = cells.iter().find(|&&c| c >= mesh.n_cells()) {
            return Err(OptionError::BadValue(
                name.to_string(),
                "cells".to_string(),
                format!("cell {} outside mesh {} of {} cells", bad, mesh.name(), mesh.n_cells()),
            ));
        }
        let v = cells.iter().map(|&c| mesh.volumes()[c]).sum();

        log::info!("Source: {}", name);
        Ok(Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            mesh: Arc::clone(mesh),
            active: dict.lookup_switch_or_default("active", false)?,
            mrf: dict.lookup_switch_or_default("MRF", false)?,
            coeffs,
            exec_hook,
            selection,
            cells,
            v,
            field_names: Vec::new(),
            region_names: Vec::new(),
            applied: Vec::new(),
            boundary_patch_ids: BTreeMap::new(),
            boundary_applied: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn mesh(&self) -> &Arc<FvMesh> {
        &self.mesh
    }

    pub fn coeffs(&self) -> &Dictionary {
        &self.coeffs
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn cells(&self) -> &[usize] {
        &self.cells
    }

    /// Volume of the selected cells.
    pub fn v(&self) -> f64 {
        self.v
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn applied(&self) -> &[bool] {
        &self.applied
    }

    pub fn boundary_patch_ids(&self) -> &BTreeMap<String, Vec<usize>> {
        &self.boundary_patch_ids
    }

    /// Replaces the targeted fields and patches and clears every applied
    /// flag.
    pub fn reset_source_names(&mut self, fields: Vec<(String, String)>, patches: BTreeMap<String, Vec<usize>>) {
        let (field_names, region_names) = fields.into_iter().unzip();
        self.field_names = field_names;
        self.region_names = region_names;
        self.applied = vec![false; self.field_names.len()];
        self.boundary_applied = patches.iter().map(|(k, v)| (k.clone(), vec![false; v.len()])).collect();
        self.boundary_patch_ids = patches;
    }

    pub fn apply_to_field(&self, field_name: &str, region_name: &str) -> Option<usize> {
        self.field_names
            .iter()
            .zip(&self.region_names)
            .position(|(f, r)| f == field_name && r == region_name)
    }

    pub fn apply_to_boundary_field_and_patch(&self, field_name: &str, patch: usize) -> Option<usize> {
        self.boundary_patch_ids.get(field_name)?.iter().position(|&p| p == patch)
    }

    pub fn set_applied(&mut self, field_i: usize) {
        if let Some(flag) = self.applied.get_mut(field_i) {
            *flag = true;
        }
    }

    pub fn set_boundary_applied(&mut self, field_name: &str, patch_i: usize) {
        if let Some(flag) = self.boundary_applied.get_mut(field_name).and_then(|f| f.get_mut(patch_i)) {
            *flag = true;
        }
    }

    /// Warns about declared fields never handed to the option. Returns
    /// their names.
    pub fn check_applied(&self) -> Vec<String> {
        let mut unused = Vec::new();
        for (field, &applied) in self.field_names.iter().zip(&self.applied) {
            if !applied {
                log::warn!("Source {} defined for field {} but never used", self.name, field);
                unused.push(field.clone());
            }
        }
        unused
    }

    /// Warns about declared boundary sources never applied. Returns the
    /// `(field, patch name)` pairs.
    pub fn check_boundary_applied(&self) -> Vec<(String, String)> {
        let mut unused = Vec::new();
        for (field, flags) in &self.boundary_applied {
            for (i, &applied) in flags.iter().enumerate() {
                if applied {
                    continue;
                }
                let patch = self.boundary_patch_ids[field][i];
                let patch_name = self.mesh.patch(patch).name.clone();
                log::warn!(
                    "Boundary source {} defined for field {}, patch {} but never used",
                    self.name,
                    field,
                    patch_name
                );
                unused.push((field.clone(), patch_name));
            }
        }
        unused
    }
}

/// A finite-volume source or constraint. Every hook defaults to doing
/// nothing, so an option only implements the ones it needs.
pub trait FvOption: Debug {
    fn base(&self) -> &OptionBase;

    fn base_mut(&mut self) -> &mut OptionBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn type_name(&self) -> &str {
        self.base().type_name()
    }

    fn is_active(&self) -> bool {
        self.base().active()
    }

    fn is_mrf(&self) -> bool {
        self.base().mrf
    }

    fn exec_hook(&self) -> ExecHook {
        self.base().exec_hook
    }

    /// `(field, region)` pairs the option acts on.
    fn source_fields(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Patch indices per field for boundary sources.
    fn boundary_source_fields_and_patches(&self) -> BTreeMap<String, Vec<usize>> {
        BTreeMap::new()
    }

    fn set_source_names(&mut self) {
        let fields = self.source_fields();
        let patches = self.boundary_source_fields_and_patches();
        self.base_mut().reset_source_names(fields, patches);
    }

    fn apply_to_field(&self, field_name: &str, region_name: &str) -> Option<usize> {
        self.base().apply_to_field(field_name, region_name)
    }

    fn apply_to_boundary_field_and_patch(&self, field_name: &str, patch: usize) -> Option<usize> {
        self.base().apply_to_boundary_field_and_patch(field_name, patch)
    }

    fn add_sup(&mut self, _eqn: Equation<'_>, _field_i: usize) -> Result<()> {
        Ok(())
    }

    fn add_sup_rho(&mut self, _rho: &VolField<f64>, _eqn: Equation<'_>, _field_i: usize) -> Result<()> {
        Ok(())
    }

    /// Phase-weighted source; forwards `alpha*rho` to [`FvOption::add_sup_rho`].
    fn add_sup_alpha_rho(
        &mut self,
        alpha: &VolField<f64>,
        rho: &VolField<f64>,
        eqn: Equation<'_>,
        field_i: usize,
    ) -> Result<()> {
        let alpha_rho = alpha.product(rho)?;
        self.add_sup_rho(&alpha_rho, eqn, field_i)
    }

    fn add_boundary_sup(&mut self, _eqn: Equation<'_>, _field_i: usize, _patch: usize) -> Result<()> {
        Ok(())
    }

    fn constrain(&mut self, _eqn: Equation<'_>, _psi: FieldMut<'_>, _field_i: usize) -> Result<()> {
        Ok(())
    }

    fn correct(&mut self, _field: FieldMut<'_>) -> Result<()> {
        Ok(())
    }

    fn check_applied(&self) -> Vec<String> {
        self.base().check_applied()
    }

    fn check_boundary_applied(&self) -> Vec<(String, String)> {
        self.base().check_boundary_applied()
    }
}

/// A per-field coefficient: a number for scalar fields, a list of
/// components otherwise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Components {
    One(f64),
    Many(Vec<f64>),
}

impl Components {
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Components::One(value) => std::slice::from_ref(value),
            Components::Many(values) => values,
        }
    }
}

/// The value of `T` with `components`.
pub(crate) fn typed_value<T: FieldValue>(option: &str, components: &[f64]) -> std::result::Result<T, OptionError> {
    T::from_components(components)
        .ok_or_else(|| OptionError::UnsupportedFieldType(option.to_string(), T::TYPE_NAME.to_string()))
}

pub type OptionConstructor =
    fn(&str, &Dictionary, &Arc<FvMesh>) -> std::result::Result<Box<dyn FvOption>, OptionError>;

/// Constructor table of option types, owned by its user.
#[derive(Debug, Clone, Default)]
pub struct OptionRegistry {
    constructors: BTreeMap<String, OptionConstructor>,
}

impl OptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in option types.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SemiImplicitSource::TYPE_NAME, SemiImplicitSource::construct);
        registry.register(FixedValueConstraint::TYPE_NAME, FixedValueConstraint::construct);
        registry.register(LimitValues::TYPE_NAME, LimitValues::construct);
        registry.register(PatchFluxSource::TYPE_NAME, PatchFluxSource::construct);
        registry
    }

    pub fn register(&mut self, type_name: &str, constructor: OptionConstructor) {
        self.constructors.insert(type_name.to_string(), constructor);
    }

    pub fn type_names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Builds the option named `name` from its dictionary's `type`.
    pub fn construct(
        &self,
        name: &str,
        dict: &Dictionary,
        mesh: &Arc<FvMesh>,
    ) -> std::result::Result<Box<dyn FvOption>, OptionError> {
        if !dict.found("type") {
            return Err(OptionError::MissingKeyword(name.to_string(), "type".to_string()));
        }
        let type_name: String = dict.lookup("type")?;
        log::info!("Selecting finite volume options model type {}", type_name);
        let constructor = self
            .constructors
            .get(&type_name)
            .ok_or_else(|| OptionError::UnknownType(type_name.clone(), self.type_names()))?;
        let mut option = constructor(name, dict, mesh)?;
        option.set_source_names();
        Ok(option)
    }
}

/// The options of one region, applied in dictionary order.
#[derive(Debug)]
pub struct OptionList {
    mesh: Arc<FvMesh>,
    options: Vec<Box<dyn FvOption>>,
}

impl OptionList {
    /// One option per sub-dictionary of `dict`.
    pub fn new(mesh: &Arc<FvMesh>, dict: &Dictionary, registry: &OptionRegistry) -> Result<Self> {
        let mut options: Vec<Box<dyn FvOption>> = Vec::new();
        for name in dict.toc() {
            if !dict.is_dict(name) {
                continue;
            }
            if options.iter().any(|o| o.name() == name) {
                return Err(OptionError::DuplicateName(name.to_string()).into());
            }
            let option_dict = dict.sub_dict(name)?;
            options.push(registry.construct(name, &option_dict, mesh)?);
        }
        Ok(Self {
            mesh: Arc::clone(mesh),
            options,
        })
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn options(&self) -> &[Box<dyn FvOption>] {
        &self.options
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Box<dyn FvOption>> {
        self.options.iter_mut().find(|o| o.name() == name)
    }

    /// Active options applying to `field_name` in this region, with their
    /// field index, marked as applied.
    fn applicable(&mut self, field_name: &str) -> impl Iterator<Item = (&mut Box<dyn FvOption>, usize)> {
        let region = self.mesh.name().to_string();
        let field_name = field_name.to_string();
        self.options.iter_mut().filter_map(move |option| {
            if !option.is_active() {
                return None;
            }
            let field_i = option.apply_to_field(&field_name, &region)?;
            option.base_mut().set_applied(field_i);
            log::debug!("Applying source {} to field {}", option.name(), field_name);
            Some((option, field_i))
        })
    }

    pub fn add_sup(&mut self, mut eqn: Equation<'_>) -> Result<()> {
        let field_name = eqn.psi_name().to_string();
        for (option, field_i) in self.applicable(&field_name) {
            option.add_sup(eqn.reborrow(), field_i)?;
        }
        Ok(())
    }

    pub fn add_sup_rho(&mut self, rho: &VolField<f64>, mut eqn: Equation<'_>) -> Result<()> {
        let field_name = eqn.psi_name().to_string();
        for (option, field_i) in self.applicable(&field_name) {
            option.add_sup_rho(rho, eqn.reborrow(), field_i)?;
        }
        Ok(())
    }

    pub fn add_sup_alpha_rho(&mut self, alpha: &VolField<f64>, rho: &VolField<f64>, mut eqn: Equation<'_>) -> Result<()> {
        let field_name = eqn.psi_name().to_string();
        for (option, field_i) in self.applicable(&field_name) {
            option.add_sup_alpha_rho(alpha, rho, eqn.reborrow(), field_i)?;
        }
        Ok(())
    }

    /// Source matrix of `psi` to put on the right-hand side of its
    /// equation: `eqn == options(psi)`.
    pub fn sources<T: FieldValue>(&mut self, psi: &VolField<T>, dimensions: DimensionSet) -> Result<FvMatrix<T>>
    where
        FvMatrix<T>: AsEquation,
    {
        let mut matrix = FvMatrix::new(psi, dimensions);
        self.add_sup(matrix.as_equation())?;
        Ok(matrix)
    }

    pub fn add_boundary_sup(&mut self, mut eqn: Equation<'_>) -> Result<()> {
        let field_name = eqn.psi_name().to_string();
        for option in self.options.iter_mut().filter(|o| o.is_active()) {
            for patch in 0..self.mesh.patches().len() {
                let Some(patch_i) = option.apply_to_boundary_field_and_patch(&field_name, patch) else {
                    continue;
                };
                option.base_mut().set_boundary_applied(&field_name, patch_i);
                option.add_boundary_sup(eqn.reborrow(), patch_i, patch)?;
            }
        }
        Ok(())
    }

    pub fn constrain(&mut self, mut eqn: Equation<'_>, mut psi: FieldMut<'_>) -> Result<()> {
        let field_name = eqn.psi_name().to_string();
        for (option, field_i) in self.applicable(&field_name) {
            option.constrain(eqn.reborrow(), psi.reborrow(), field_i)?;
        }
        Ok(())
    }

    pub fn correct(&mut self, mut field: FieldMut<'_>) -> Result<()> {
        let field_name = field.name().to_string();
        for (option, _) in self.applicable(&field_name) {
            option.correct(field.reborrow())?;
        }
        Ok(())
    }

    /// Resets every option's applied flags.
    pub fn reset_applied(&mut self) {
        self.options.iter_mut().for_each(|o| o.set_source_names());
    }

    /// End-of-step diagnostic over all options; returns the number of
    /// unused declarations.
    pub fn check_applied(&self) -> usize {
        self.options
            .iter()
            .map(|o| o.check_applied().len() + o.check_boundary_applied().len())
            .sum()
    }
}
