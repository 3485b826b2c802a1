//! Geometry ID mapping.
//!
//! Describe a nested volume model ([`volume`], [`model`]) and a category
//! schema ([`id_mgr`]), then walk the model with [`mapping::Mapping`] to get a
//! [`geom_map::GeomMap`] from geometry IDs to world placements.

pub mod error;
pub mod geom_id;
pub mod geom_map;
pub mod id_mgr;
pub mod id_rule;
pub mod mapping;
pub mod model;
pub mod output;
pub mod placement;
pub mod replica;
pub mod settings;
pub mod setup;
pub mod shape;
pub mod volume;

pub use error::{GeomError, Result};
pub use geom_id::GeomId;
pub use geom_map::{GeomInfo, GeomMap};
pub use id_mgr::IdManager;
pub use mapping::{BuildReport, Mapping, MappingConfig};
pub use model::ModelFactory;
pub use placement::Placement;
