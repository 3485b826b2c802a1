//! Geometry models and the factory that owns them.
//!
//! A model is a named root logical volume. The [`ModelFactory`] collects
//! models while the geometry is described and must be locked before any
//! mapping can be built from it.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::error::{GeomError, Result};
use crate::volume::LogicalVolume;

/// Suffix appended to a label to name a physical volume.
pub const PHYSICAL_SUFFIX: &str = ".phys";
/// Suffix appended to a model name to name its logical volume.
pub const LOGICAL_SUFFIX: &str = ".log";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn physical_names() {
        assert_eq!(physical_name("module"), "module.phys");
        assert_eq!(physical_array_name("module", 4), "module.phys.__0..3__");
        assert_eq!(
            physical_grid_name("pixel", 3, 2),
            "pixel.phys.__0..2____0..1__"
        );
        assert_eq!(logical_name("world"), "world.log");
    }

    #[test]
    fn labels_are_extracted_from_physical_names() {
        assert_eq!(label_from_physical_name("module.phys").unwrap(), "module");
        assert_eq!(
            label_from_physical_name(&physical_array_name("layer", 5)).unwrap(),
            "layer"
        );
        assert!(matches!(
            label_from_physical_name("module"),
            Err(GeomError::Syntax { .. })
        ));
        assert!(label_from_physical_name(".phys").is_err());
    }

    #[test]
    fn factory_lifecycle() {
        let mut factory = ModelFactory::new();
        factory
            .add_model("world", LogicalVolume::new("world.log", Shape::Sphere { radius: 1.0 }))
            .unwrap();
        assert!(factory.model("world").unwrap().logical().is_locked());
        assert!(factory
            .add_model("world", LogicalVolume::new("w", Shape::Sphere { radius: 1.0 }))
            .is_err());
        assert!(matches!(
            factory.logical("detector"),
            Err(GeomError::NotFound { .. })
        ));

        assert!(!factory.is_locked());
        factory.lock();
        assert!(factory.is_locked());
        assert!(matches!(
            factory.add_model("late", LogicalVolume::new("late.log", Shape::Sphere { radius: 1.0 })),
            Err(GeomError::Locked(_))
        ));
        assert_eq!(factory.len(), 1);
    }
}

/// `<label>.phys`
pub fn physical_name(label: &str) -> String {
    format!("{}{}", label, PHYSICAL_SUFFIX)
}

/// `<label>.phys.__0..N-1__`, the name of a one-dimensional array.
pub fn physical_array_name(label: &str, items: usize) -> String {
    format!(
        "{}{}.__0..{}__",
        label,
        PHYSICAL_SUFFIX,
        items.saturating_sub(1)
    )
}

/// `<label>.phys.__0..C-1____0..R-1__`, the name of a grid.
pub fn physical_grid_name(label: &str, columns: usize, rows: usize) -> String {
    format!(
        "{}{}.__0..{}____0..{}__",
        label,
        PHYSICAL_SUFFIX,
        columns.saturating_sub(1),
        rows.saturating_sub(1)
    )
}

/// `<model>.log`
pub fn logical_name(model: &str) -> String {
    format!("{}{}", model, LOGICAL_SUFFIX)
}

/// Strips the physical suffix, and anything after it, from a physical
/// volume name.
pub fn label_from_physical_name(name: &str) -> Result<&str> {
    match name.rfind(PHYSICAL_SUFFIX) {
        Some(0) => Err(GeomError::syntax(name, "empty physical volume label")),
        Some(pos) => Ok(&name[..pos]),
        None => Err(GeomError::syntax(
            name,
            format!("missing '{}' suffix in physical volume name", PHYSICAL_SUFFIX),
        )),
    }
}

/// A named model and its root logical volume.
#[derive(Debug, Clone)]
pub struct Model {
    name: String,
    logical: Arc<LogicalVolume>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn logical(&self) -> &Arc<LogicalVolume> {
        &self.logical
    }
}

/// Dictionary of models, frozen by [`ModelFactory::lock`].
#[derive(Debug, Clone, Default)]
pub struct ModelFactory {
    models: BTreeMap<String, Model>,
    locked: bool,
}

impl ModelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model. Its logical volume is locked and shared.
    pub fn add_model(&mut self, name: impl Into<String>, logical: LogicalVolume) -> Result<()> {
        self.add_shared_model(name, logical.into_shared())
    }

    pub fn add_shared_model(
        &mut self,
        name: impl Into<String>,
        logical: Arc<LogicalVolume>,
    ) -> Result<()> {
        let name = name.into();
        if self.locked {
            return Err(GeomError::Locked("model factory".to_string()));
        }
        if self.models.contains_key(&name) {
            return Err(GeomError::Schema(format!("model '{}' already exists", name)));
        }
        debug!("adding model '{}' (logical '{}')", name, logical.name());
        self.models.insert(name.clone(), Model { name, logical });
        Ok(())
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn model(&self, name: &str) -> Result<&Model> {
        self.models
            .get(name)
            .ok_or_else(|| GeomError::not_found("model", name))
    }

    pub fn logical(&self, name: &str) -> Result<&Arc<LogicalVolume>> {
        self.model(name).map(Model::logical)
    }

    pub fn models(&self) -> &BTreeMap<String, Model> {
        &self.models
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn lock(&mut self) {
        debug!("locking model factory with {} models", self.models.len());
        self.locked = true;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }
}
