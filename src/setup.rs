//! Geometry setup files.
//!
//! A setup file is a TOML document holding the category schema followed by
//! the logical volumes, leaf volumes first:
//!
//! ```toml
//! [[category]]
//! name = "world"
//! type = 0
//! addresses = ["world"]
//!
//! [[volume]]
//! name = "plate"
//! shape = { kind = "box", x = 10.0, y = 10.0, z = 1.0 }
//! material = "lead"
//!
//! [[volume]]
//! name = "world"
//! shape = { kind = "box", x = 100.0, y = 100.0, z = 100.0 }
//!
//! [[volume.daughter]]
//! label = "plate"
//! volume = "plate"
//! id = "plate"
//! placement = { kind = "linear", count = 3, step = [0.0, 0.0, 2.0], basic = { translation = [0.0, 0.0, -2.0] } }
//! ```
//!
//! Every volume becomes a model of the same name whose logical volume is
//! `<name>.log`. Daughters are named after their label and placement kind.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::id_mgr::{CategoryDecl, IdManager, SchemaDecl};
use crate::id_rule::IdInfo;
use crate::model::{self, ModelFactory};
use crate::placement::Placement;
use crate::replica::ArrayPlacement;
use crate::shape::Shape;
use crate::volume::{LogicalVolume, PhysicalVolume};


/// A daughter placement inside a volume declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaughterDecl {
    pub label: String,
    /// Name of a previously declared volume.
    pub volume: String,
    /// ID directive, stored as `mapping.daughter_id.<label>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "default_placement")]
    pub placement: ArrayPlacement,
}

fn default_placement() -> ArrayPlacement {
    ArrayPlacement::single(Placement::identity())
}

/// A logical volume declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeDecl {
    pub name: String,
    pub shape: Shape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, rename = "daughter", skip_serializing_if = "Vec::is_empty")]
    pub daughters: Vec<DaughterDecl>,
}

/// The whole setup document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetupDecl {
    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryDecl>,
    #[serde(default, rename = "volume")]
    pub volumes: Vec<VolumeDecl>,
}

/// A loaded geometry: its schema and its locked model factory.
#[derive(Debug, Clone)]
pub struct Setup {
    pub id_mgr: IdManager,
    pub factory: ModelFactory,
}

impl Setup {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read setup file {:?}", path))?;
        let setup =
            Self::from_toml_str(&text).with_context(|| format!("invalid setup file {:?}", path))?;
        info!(
            "loaded setup {:?}: {} categories, {} models",
            path,
            setup.id_mgr.len(),
            setup.factory.len()
        );
        Ok(setup)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let decl: SetupDecl = toml::from_str(text).context("failed to parse setup")?;
        Self::from_decl(&decl)
    }

    pub fn from_decl(decl: &SetupDecl) -> Result<Self> {
        let id_mgr = IdManager::from_decl(&SchemaDecl {
            categories: decl.categories.clone(),
        })
        .context("invalid category schema")?;

        let mut factory = ModelFactory::new();
        let mut built: HashMap<&str, Arc<LogicalVolume>> = HashMap::new();
        for volume in &decl.volumes {
            if built.contains_key(volume.name.as_str()) {
                bail!("volume '{}' is declared twice", volume.name);
            }
            let logical = build_volume(volume, &id_mgr, &built)
                .with_context(|| format!("invalid volume '{}'", volume.name))?;
            factory.add_shared_model(volume.name.clone(), Arc::clone(&logical))?;
            built.insert(&volume.name, logical);
        }
        factory.lock();

        Ok(Self { id_mgr, factory })
    }
}

fn build_volume(
    decl: &VolumeDecl,
    id_mgr: &IdManager,
    built: &HashMap<&str, Arc<LogicalVolume>>,
) -> Result<Arc<LogicalVolume>> {
    let mut logical = LogicalVolume::new(model::logical_name(&decl.name), decl.shape.clone());
    {
        let parameters = logical.parameters_mut()?;
        for (key, value) in &decl.parameters {
            parameters.set(key.as_str(), value.as_str());
        }
    }
    if let Some(material) = &decl.material {
        logical.set_material(material)?;
    }

    for daughter in &decl.daughters {
        let target = built.get(daughter.volume.as_str()).ok_or_else(|| {
            anyhow!(
                "daughter '{}' refers to volume '{}', which is not declared before '{}'",
                daughter.label,
                daughter.volume,
                decl.name
            )
        })?;

        if let Some(directive) = &daughter.id {
            let id_info: IdInfo = directive
                .parse()
                .with_context(|| format!("invalid ID directive for daughter '{}'", daughter.label))?;
            if !id_mgr.has_category(id_info.category()) {
                bail!(
                    "ID directive '{}' of daughter '{}' names an unknown category",
                    directive,
                    daughter.label
                );
            }
            logical
                .parameters_mut()?
                .set_daughter_id(&daughter.label, directive.as_str());
        }

        let name = match &daughter.placement {
            ArrayPlacement::Single { .. } => model::physical_name(&daughter.label),
            ArrayPlacement::Grid { columns, rows, .. } => {
                model::physical_grid_name(&daughter.label, *columns, *rows)
            }
            other => model::physical_array_name(&daughter.label, other.number_of_items()),
        };
        let physical = PhysicalVolume::new(name, Arc::clone(target), daughter.placement.clone())
            .with_context(|| format!("invalid placement for daughter '{}'", daughter.label))?;
        logical.add_physical(physical)?;
    }

    Ok(logical.into_shared())
}
