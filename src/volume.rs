//! Logical and physical volumes.
//!
//! A [`LogicalVolume`] owns a shape, an optional material, a set of auxiliary
//! [`Parameters`] and its daughter [`PhysicalVolume`]s. A physical volume
//! places a shared logical volume inside its mother through an
//! [`ArrayPlacement`]. The same logical volume may be placed at many points,
//! so the model is a DAG of `Arc<LogicalVolume>` nodes.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::sync::Arc;

use crate::error::{GeomError, Result};
use crate::model;
use crate::replica::ArrayPlacement;
use crate::shape::Shape;

/// Prefix of mapping directives in the auxiliary parameters.
pub const MAPPING_PREFIX: &str = "mapping.";
/// Prefix, after [`MAPPING_PREFIX`], of per-daughter ID directives.
pub const DAUGHTER_ID_PREFIX: &str = "daughter_id.";
/// Key of the material reference in the auxiliary parameters.
pub const MATERIAL_REF_KEY: &str = "material.ref";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::Placement;

    fn leaf(name: &str) -> Arc<LogicalVolume> {
        LogicalVolume::new(name, Shape::Sphere { radius: 1.0 }).into_shared()
    }

    #[test]
    fn daughter_id_directives() {
        let mut params = Parameters::new();
        params.set_daughter_id("module", "[module:column+0]");
        params.set("other.key", "value");
        assert!(params.has_daughter_id("module"));
        assert!(!params.has_daughter_id("frame"));
        assert_eq!(params.fetch_daughter_id("module").unwrap(), "[module:column+0]");
        assert!(matches!(
            params.fetch_daughter_id("frame"),
            Err(GeomError::NotFound { .. })
        ));
        let mapping: Vec<_> = params.starting_with(MAPPING_PREFIX).collect();
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn duplicate_and_locked_daughters_are_rejected() {
        let mut mother = LogicalVolume::new("mother.log", Shape::Sphere { radius: 10.0 });
        let pv = PhysicalVolume::new("a.phys", leaf("a.log"), Placement::identity()).unwrap();
        mother.add_physical(pv.clone()).unwrap();
        assert!(mother.add_physical(pv.clone()).is_err());
        assert_eq!(mother.physical("a.phys").unwrap().mother(), Some("mother.log"));

        mother.lock();
        let other = PhysicalVolume::new("b.phys", leaf("b.log"), Placement::identity()).unwrap();
        assert!(matches!(mother.add_physical(other), Err(GeomError::Locked(_))));
        assert!(mother.parameters_mut().is_err());
    }

    #[test]
    fn material_is_kept_in_parameters() {
        let mut lv = LogicalVolume::new("lv", Shape::Sphere { radius: 1.0 });
        assert_eq!(lv.material(), None);
        lv.set_material("lead").unwrap();
        assert_eq!(lv.material(), Some("lead"));
        assert_eq!(lv.parameters().get(MATERIAL_REF_KEY), Some("lead"));
    }
}

/// Auxiliary string properties attached to a logical volume.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    entries: BTreeMap<String, String>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose key starts with `prefix`, in key order.
    pub fn starting_with<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.entries
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn daughter_id_key(label: &str) -> String {
        format!("{}{}{}", MAPPING_PREFIX, DAUGHTER_ID_PREFIX, label)
    }

    pub fn set_daughter_id(&mut self, label: &str, directive: impl Into<String>) {
        self.set(Self::daughter_id_key(label), directive);
    }

    pub fn has_daughter_id(&self, label: &str) -> bool {
        self.has_key(&Self::daughter_id_key(label))
    }

    /// The ID directive declared for the daughter labelled `label`.
    pub fn fetch_daughter_id(&self, label: &str) -> Result<&str> {
        self.get(&Self::daughter_id_key(label))
            .ok_or_else(|| GeomError::not_found("daughter ID directive", label))
    }
}

/// A node of the model tree.
#[derive(Debug, Clone)]
pub struct LogicalVolume {
    name: String,
    shape: Shape,
    parameters: Parameters,
    physicals: BTreeMap<String, PhysicalVolume>,
    locked: bool,
}

impl LogicalVolume {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            parameters: Parameters::new(),
            physicals: BTreeMap::new(),
            locked: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn material(&self) -> Option<&str> {
        self.parameters.get(MATERIAL_REF_KEY)
    }

    pub fn set_material(&mut self, material: &str) -> Result<()> {
        self.parameters_mut()?.set(MATERIAL_REF_KEY, material);
        Ok(())
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> Result<&mut Parameters> {
        if self.locked {
            return Err(GeomError::Locked(format!("logical volume '{}'", self.name)));
        }
        Ok(&mut self.parameters)
    }

    /// Adds a daughter under its own name and records `self` as its mother.
    pub fn add_physical(&mut self, mut physical: PhysicalVolume) -> Result<()> {
        if self.locked {
            return Err(GeomError::Locked(format!("logical volume '{}'", self.name)));
        }
        match self.physicals.entry(physical.name.clone()) {
            btree_map::Entry::Occupied(_) => Err(GeomError::Schema(format!(
                "physical volume '{}' is already placed in '{}'",
                physical.name, self.name
            ))),
            btree_map::Entry::Vacant(slot) => {
                physical.mother = Some(self.name.clone());
                slot.insert(physical);
                Ok(())
            }
        }
    }

    pub fn physicals(&self) -> &BTreeMap<String, PhysicalVolume> {
        &self.physicals
    }

    pub fn has_physical(&self, name: &str) -> bool {
        self.physicals.contains_key(name)
    }

    pub fn physical(&self, name: &str) -> Result<&PhysicalVolume> {
        self.physicals
            .get(name)
            .ok_or_else(|| GeomError::not_found("physical volume", name))
    }

    pub fn is_leaf(&self) -> bool {
        self.physicals.is_empty()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Locks the volume and shares it so it can be placed as a daughter.
    pub fn into_shared(mut self) -> Arc<Self> {
        self.lock();
        Arc::new(self)
    }
}

impl fmt::Display for LogicalVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Logical volume '{}'", self.name)?;
        writeln!(f, "|-- Shape     : {}", self.shape.name())?;
        writeln!(f, "|-- Material  : {}", self.material().unwrap_or("<none>"))?;
        writeln!(f, "|-- Parameters: {}", self.parameters.len())?;
        write!(f, "`-- Physicals : {}", self.physicals.len())?;
        for (i, (name, pv)) in self.physicals.iter().enumerate() {
            let tag = if i + 1 == self.physicals.len() { "`--" } else { "|--" };
            write!(
                f,
                "\n    {} '{}' -> '{}' ({})",
                tag,
                name,
                pv.logical.name(),
                pv.placement.describe()
            )?;
        }
        Ok(())
    }
}

/// A placement of a logical volume inside a mother logical volume.
#[derive(Debug, Clone)]
pub struct PhysicalVolume {
    name: String,
    logical: Arc<LogicalVolume>,
    placement: ArrayPlacement,
    mother: Option<String>,
}

impl PhysicalVolume {
    pub fn new(
        name: impl Into<String>,
        logical: Arc<LogicalVolume>,
        placement: impl Into<ArrayPlacement>,
    ) -> Result<Self> {
        let placement = placement.into();
        placement.validate()?;
        Ok(Self {
            name: name.into(),
            logical,
            placement,
            mother: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The daughter label, i.e. the name without its physical suffix.
    pub fn label(&self) -> Result<&str> {
        model::label_from_physical_name(&self.name)
    }

    pub fn logical(&self) -> &Arc<LogicalVolume> {
        &self.logical
    }

    pub fn placement(&self) -> &ArrayPlacement {
        &self.placement
    }

    pub fn number_of_items(&self) -> usize {
        self.placement.number_of_items()
    }

    /// Name of the mother logical volume, once placed.
    pub fn mother(&self) -> Option<&str> {
        self.mother.as_deref()
    }
}
