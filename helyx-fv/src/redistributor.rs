//! Redistribution of Lagrangian fields between ranks.
//!
//! Fields live in an [`ObjectStore`] as named objects tagged with a class
//! name. Every rank discovers the names it holds; the lists are merged so
//! that all ranks walk the same fields in the same order, each field is
//! moved with a [`DistributionMap`] and written on the target side only
//! where entries remain.

use crate::error::{FvError, Result};
use helyx_core::parallel::list_unique_union;
use helyx_core::{Communicator, DistributionMap, FieldValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named, encoded object of some class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoObject {
    pub name: String,
    pub class_name: String,
    pub bytes: Vec<u8>,
}

/// Source and target of the objects of one cloud on one rank.
pub trait ObjectStore {
    /// Names of the objects of `class_name`, sorted.
    fn names(&self, class_name: &str) -> Vec<String>;

    fn read_object(&self, name: &str) -> Option<&IoObject>;

    fn write_object(&mut self, object: IoObject);
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryObjectStore {
    objects: BTreeMap<String, IoObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn names(&self, class_name: &str) -> Vec<String> {
        self.objects
            .values()
            .filter(|o| o.class_name == class_name)
            .map(|o| o.name.clone())
            .collect()
    }

    fn read_object(&self, name: &str) -> Option<&IoObject> {
        self.objects.get(name)
    }

    fn write_object(&mut self, object: IoObject) {
        self.objects.insert(object.name.clone(), object);
    }
}

/// A per-entity container that can be stored and redistributed.
pub trait IoContainer: Sized {
    fn class_name() -> String;

    /// Further class names read as this container.
    fn alias_class_names() -> Vec<String> {
        Vec::new()
    }

    fn empty() -> Self;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn distribute<C: Communicator>(&mut self, map: &DistributionMap, comm: &C) -> Result<()>;

    fn encode(&self) -> Result<Vec<u8>>;

    fn decode(object: &IoObject) -> Result<Self>;

    fn to_object(&self, name: &str) -> Result<IoObject> {
        Ok(IoObject {
            name: name.to_string(),
            class_name: Self::class_name(),
            bytes: self.encode()?,
        })
    }

    /// The stored object, or an empty container when this rank has none.
    fn read_if_present(store: &dyn ObjectStore, name: &str) -> Result<Self> {
        match store.read_object(name) {
            Some(object) => Self::decode(object),
            None => Ok(Self::empty()),
        }
    }
}

/// One value per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoField<T> {
    pub values: Vec<T>,
}

impl<T: FieldValue> IoContainer for IoField<T> {
    fn class_name() -> String {
        format!("{}Field", T::TYPE_NAME)
    }

    fn empty() -> Self {
        Self { values: Vec::new() }
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn distribute<C: Communicator>(&mut self, map: &DistributionMap, comm: &C) -> Result<()> {
        Ok(map.distribute(comm, &mut self.values)?)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&self.values)?)
    }

    fn decode(object: &IoObject) -> Result<Self> {
        Ok(Self {
            values: rmp_serde::from_slice(&object.bytes)?,
        })
    }
}

/// A list of values per entity, stored as offsets into one flat list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactIoField<T> {
    offsets: Vec<usize>,
    values: Vec<T>,
}

impl<T: FieldValue> CompactIoField<T> {
    pub fn from_lists(lists: Vec<Vec<T>>) -> Self {
        let mut offsets = Vec::with_capacity(lists.len() + 1);
        offsets.push(0);
        let mut values = Vec::new();
        for list in lists {
            values.extend(list);
            offsets.push(values.len());
        }
        Self { offsets, values }
    }

    pub fn to_lists(&self) -> Vec<Vec<T>> {
        self.offsets.windows(2).map(|w| self.values[w[0]..w[1]].to_vec()).collect()
    }

    pub fn list(&self, entity: usize) -> &[T] {
        &self.values[self.offsets[entity]..self.offsets[entity + 1]]
    }

    /// Class of the same data stored one list at a time.
    pub fn list_class_name() -> String {
        format!("{}FieldField", T::TYPE_NAME)
    }

    fn check(self) -> Result<Self> {
        let consistent = self.offsets.first() == Some(&0)
            && self.offsets.windows(2).all(|w| w[0] <= w[1])
            && self.offsets.last() == Some(&self.values.len());
        if !consistent {
            return Err(FvError::FieldError(format!(
                "compact list of {} values has inconsistent offsets",
                self.values.len()
            )));
        }
        Ok(self)
    }
}

impl<T: FieldValue> IoContainer for CompactIoField<T> {
    fn class_name() -> String {
        format!("{}FieldCompactList", T::TYPE_NAME)
    }

    fn alias_class_names() -> Vec<String> {
        vec![Self::list_class_name()]
    }

    fn empty() -> Self {
        Self::from_lists(Vec::new())
    }

    fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    fn distribute<C: Communicator>(&mut self, map: &DistributionMap, comm: &C) -> Result<()> {
        let mut lists = self.to_lists();
        map.distribute(comm, &mut lists)?;
        *self = Self::from_lists(lists);
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    fn decode(object: &IoObject) -> Result<Self> {
        if object.class_name == Self::list_class_name() {
            let lists: Vec<Vec<T>> = rmp_serde::from_slice(&object.bytes)?;
            return Ok(Self::from_lists(lists));
        }
        let field: Self = rmp_serde::from_slice(&object.bytes)?;
        field.check()
    }
}

/// Moves the fields of one cloud according to `map`. All methods are
/// collective over `comm`.
#[derive(Debug)]
pub struct LagrangianRedistributor<'a, C: Communicator> {
    map: &'a DistributionMap,
    comm: &'a C,
}

impl<'a, C: Communicator> LagrangianRedistributor<'a, C> {
    pub fn new(map: &'a DistributionMap, comm: &'a C) -> Self {
        Self { map, comm }
    }

    /// Names of `class_name` objects held on any rank, identical on every
    /// rank, restricted to `selected` unless it is empty.
    pub fn filter_objects(
        &self,
        store: &dyn ObjectStore,
        class_name: &str,
        selected: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let names = self.comm.combine_gather(store.names(class_name), list_unique_union)?;
        let names: Vec<String> = self.comm.combine_scatter(names)?;
        if selected.is_empty() {
            return Ok(names);
        }
        Ok(names.into_iter().filter(|n| selected.contains(n)).collect())
    }

    fn container_names<F: IoContainer>(&self, store: &dyn ObjectStore, selected: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut names = self.filter_objects(store, &F::class_name(), selected)?;
        for alias in F::alias_class_names() {
            names.extend(self.filter_objects(store, &alias, selected)?);
        }
        Ok(names)
    }

    /// Reads, moves and writes every selected container of type `F`.
    /// Returns the names processed.
    pub fn redistribute<F: IoContainer>(
        &self,
        source: &dyn ObjectStore,
        target: &mut dyn ObjectStore,
        selected: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let names = self.container_names::<F>(source, selected)?;
        if !names.is_empty() {
            log::info!("Redistributing lagrangian {}s", F::class_name());
        }
        for name in &names {
            log::info!("    {}", name);
            let mut field = F::read_if_present(source, name)?;
            field.distribute(self.map, self.comm)?;
            if !field.is_empty() {
                target.write_object(field.to_object(name)?);
            }
        }
        Ok(names)
    }

    pub fn redistribute_fields<T: FieldValue>(
        &self,
        source: &dyn ObjectStore,
        target: &mut dyn ObjectStore,
        selected: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        self.redistribute::<IoField<T>>(source, target, selected)
    }

    /// Per-entity lists, stored compactly or not; written compactly.
    pub fn redistribute_field_fields<T: FieldValue>(
        &self,
        source: &dyn ObjectStore,
        target: &mut dyn ObjectStore,
        selected: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        self.redistribute::<CompactIoField<T>>(source, target, selected)
    }

    /// Reads the selected containers of type `F` so they can be moved
    /// together with the particles later. Ranks without an object get an
    /// empty one.
    pub fn read_fields<F: IoContainer>(
        &self,
        source: &dyn ObjectStore,
        selected: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, F>> {
        let names = self.container_names::<F>(source, selected)?;
        if !names.is_empty() {
            log::info!("Reading lagrangian {}s", F::class_name());
        }
        names
            .into_iter()
            .map(|name| {
                log::info!("    {}", name);
                let field = F::read_if_present(source, &name)?;
                Ok((name, field))
            })
            .collect()
    }

    /// Moves previously read containers and writes the non-empty ones.
    pub fn redistribute_stored<F: IoContainer>(
        &self,
        fields: BTreeMap<String, F>,
        target: &mut dyn ObjectStore,
    ) -> Result<()> {
        if !fields.is_empty() {
            log::info!("Redistributing lagrangian {}s", F::class_name());
        }
        for (name, mut field) in fields {
            log::info!("    {}", name);
            field.distribute(self.map, self.comm)?;
            if !field.is_empty() {
                target.write_object(field.to_object(&name)?);
            }
        }
        Ok(())
    }
}
